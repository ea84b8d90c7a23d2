use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::json;

use crate::capability::SpeechSynthesis;
use crate::dispatch::CapabilityDispatcher;
use crate::events::{Event, EventKind, EventSink};
use crate::intent::IntentResolver;
use crate::types::{Command, CommandSource, ExecutionResult, IntentKind};

const NOT_UNDERSTOOD: &str = "Sorry, I didn't understand that command.";

/// Top-level sequencing for one command and the single user-visible error
/// boundary. Resolution and dispatch are infallible by construction; the
/// boundary here additionally converts a panic anywhere below into a
/// spoken/returned failure so no trigger ever ends silently.
pub struct CommandPipeline {
    resolver: IntentResolver,
    dispatcher: CapabilityDispatcher,
    speech: Arc<dyn SpeechSynthesis>,
    events: Arc<dyn EventSink>,
    busy: AtomicBool,
}

/// Clears the busy flag when dropped, so the pipeline is never left
/// permanently busy however a command ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CommandPipeline {
    pub fn new(
        resolver: IntentResolver,
        dispatcher: CapabilityDispatcher,
        speech: Arc<dyn SpeechSynthesis>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            speech,
            events,
            busy: AtomicBool::new(false),
        }
    }

    /// Admission-controlled entry for trigger surfaces (wake word, API
    /// accept loop). A trigger arriving while a command is in flight is
    /// dropped with a logged notice, not queued; stale commands must not
    /// execute late.
    pub async fn try_process(&self, command: Command) -> Option<ExecutionResult> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.events.emit(Event::new(
                EventKind::CommandDroppedBusy,
                json!({"text": command.text}),
            ));
            return None;
        }
        let _guard = BusyGuard(&self.busy);
        Some(self.process(command).await)
    }

    /// The produced interface: always returns a complete
    /// `ExecutionResult` and always emits a response.
    pub async fn process(&self, command: Command) -> ExecutionResult {
        let source = command.source;
        let outcome = std::panic::AssertUnwindSafe(self.process_inner(command))
            .catch_unwind()
            .await;
        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                self.events.emit(Event::new(
                    EventKind::Error,
                    json!({"msg": format!("command processing panicked: {detail}")}),
                ));
                let message = format!("Sorry, an error occurred: {detail}");
                self.respond(&message, source);
                ExecutionResult::fail(message)
            }
        }
    }

    async fn process_inner(&self, command: Command) -> ExecutionResult {
        self.events.emit(Event::new(
            EventKind::CommandReceived,
            json!({"text": command.text, "source": command.source}),
        ));

        let intent = self.resolver.resolve(&command.text).await;
        if intent.kind == IntentKind::Unknown {
            self.respond(NOT_UNDERSTOOD, command.source);
            return ExecutionResult::fail(NOT_UNDERSTOOD);
        }

        let result = self.dispatcher.dispatch(&intent).await;
        self.respond(&result.message, command.source);
        result
    }

    /// Speech only for local-device commands, and never blocking: the
    /// busy flag is released while the announcement may still be playing.
    fn respond(&self, message: &str, source: CommandSource) {
        let spoken = source == CommandSource::LocalDevice && self.speech.enabled();
        if spoken {
            self.speech.speak(message, false);
        }
        self.events.emit(Event::new(
            EventKind::ResponseEmitted,
            json!({"message": message, "spoken": spoken}),
        ));
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected internal error".to_string()
    }
}
