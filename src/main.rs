use clap::Parser;

use deskpilot::access::AccessController;
use deskpilot::bootstrap::{self, Collaborators};
use deskpilot::cli_args::{Cli, Commands, PermissionsAction};
use deskpilot::config::Config;
use deskpilot::events::NullSink;
use deskpilot::types::Command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Run(args) => {
            let events = bootstrap::build_events(&config)?;
            let assistant = bootstrap::build(&config, Collaborators::host(), events)?;
            let text = args.text.join(" ");
            let result = assistant
                .pipeline
                .process(Command::new(text, args.source.into()))
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Doctor => {
            use deskpilot::providers::ModelProvider as _;
            use deskpilot::router::Reachability;

            let local = bootstrap::build_local_provider(&config)?;
            let remotes = bootstrap::build_remote_providers(&config)?;
            let probe = deskpilot::router::HttpProbe::new();

            let local_ok = local.is_available().await;
            println!(
                "local ({}): {}",
                config.local.model,
                if local_ok { "ok" } else { "unavailable" }
            );
            if remotes.is_empty() {
                println!("remote: none configured");
            }
            for remote in remotes {
                let ok = remote.is_available().await;
                println!(
                    "remote {}: {}",
                    remote.name(),
                    if ok { "configured" } else { "unavailable" }
                );
            }
            let online = probe
                .is_reachable(
                    &config.routing.probe_url,
                    std::time::Duration::from_secs(config.routing.probe_timeout_secs),
                )
                .await;
            println!("connectivity: {}", if online { "ok" } else { "offline" });
        }
        Commands::Permissions(args) => {
            let access = AccessController::new(
                &config,
                Box::new(deskpilot::access::permissions::AutoGrantConsent),
                std::sync::Arc::new(NullSink),
            )?;
            match args.action {
                PermissionsAction::List => {
                    let permissions = access.list_permissions();
                    if permissions.is_empty() {
                        println!("no stored permissions");
                    }
                    for (target, granted) in permissions {
                        println!("{target}: {}", if granted { "allow" } else { "deny" });
                    }
                }
                PermissionsAction::Grant { target } => {
                    access.grant(&target)?;
                    println!("granted: {target}");
                }
                PermissionsAction::Deny { target } => {
                    access.deny(&target)?;
                    println!("denied: {target}");
                }
                PermissionsAction::Revoke { target } => {
                    if access.revoke(&target)? {
                        println!("revoked: {target}");
                    } else {
                        println!("no record for: {target}");
                    }
                }
            }
        }
    }
    Ok(())
}
