//! Route this process's own WARN and ERROR log events into the message tail.
//!
//! While the live region owns the terminal, anything written to stderr would
//! tear the display. The binary installs [`LogCaptureLayer`] instead of a
//! `fmt` layer so those events show up alongside build diagnostics.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::log_sanitize::sanitize_message;
use crate::state::BuildState;

/// Collects the `message` field plus any other fields as `key=value`.
#[derive(Default)]
struct EventText {
    message: String,
    fields: String,
}

impl EventText {
    fn into_line(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        write!(self.fields, "{name}={value}").ok();
    }
}

impl Visit for EventText {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            write!(self.message, "{value:?}").ok();
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

pub struct LogCaptureLayer {
    state: Arc<BuildState>,
}

impl LogCaptureLayer {
    pub fn new(state: Arc<BuildState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for LogCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        let prefix = if level == Level::ERROR {
            "error"
        } else if level == Level::WARN {
            "warning"
        } else {
            return;
        };
        let mut text = EventText::default();
        event.record(&mut text);
        let line = sanitize_message(&text.into_line());
        self.state
            .messages()
            .append(format!("{prefix}: buildwatch: {line}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Importance;
    use tracing::{info, warn};
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn warnings_land_in_the_tail_and_info_does_not() {
        let state = Arc::new(BuildState::new(1, 10, Importance::High));
        let subscriber =
            tracing_subscriber::registry().with(LogCaptureLayer::new(state.clone()));

        tracing::subscriber::with_default(subscriber, || {
            info!("ignored");
            warn!(node_id = 9, "dropping build event");
            tracing::error!("repaint\nfailed");
        });

        assert_eq!(
            state.messages().last_n(10),
            vec![
                "warning: buildwatch: dropping build event node_id=9",
                "error: buildwatch: repaint failed",
            ]
        );
    }

    #[test]
    fn dropped_sink_events_are_visible_on_the_dashboard() {
        use crate::events::BuildEventSink;

        let state = Arc::new(BuildState::new(1, 10, Importance::High));
        let subscriber =
            tracing_subscriber::registry().with(LogCaptureLayer::new(state.clone()));

        tracing::subscriber::with_default(subscriber, || {
            state.target_started(1, 42, "Build");
        });

        let tail = state.messages().last_n(1);
        assert_eq!(tail.len(), 1);
        assert!(tail[0].starts_with("warning: buildwatch: dropping build event"));
        assert!(tail[0].contains("42"), "line: {}", tail[0]);
    }
}
