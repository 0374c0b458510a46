//! Session event log: one append-only JSON-lines file per session,
//! written only when [`crate::config::Config::log_dir`] is set.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::ids::ContextId;

/// One loggable session event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A rescore completed for the given context.
    Rescore { context_id: usize },
    /// A display was requested.
    Display { context_id: usize, display_type: String },
    /// A frame was liked or unliked.
    Like { frame_id: usize, liked: bool },
    /// A frame was bookmarked.
    Bookmark { frame_id: usize },
    /// An answer was submitted to the evaluation server.
    Submit { frame_id: usize, result: String },
}

/// Appends session events to `log_dir/<context_id>.jsonl`, one JSON
/// object per line. A missing `log_dir` makes every call a silent no-op,
/// matching the original's optional logger.
#[derive(Debug, Default)]
pub struct EventLog {
    log_dir: Option<PathBuf>,
}

impl EventLog {
    /// Builds a logger writing under `log_dir`, or a no-op logger if
    /// `log_dir` is `None`.
    #[must_use]
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        Self { log_dir }
    }

    /// Appends `event` for `context_id`. Errors are logged via `tracing`
    /// and otherwise swallowed: a broken event log must never fail the
    /// API call it's attached to.
    pub fn record(&self, context_id: ContextId, event: &Event) {
        let Some(dir) = &self.log_dir else { return };
        let path = dir.join(format!("{}.jsonl", context_id.get()));
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(%err, "failed to serialize session event");
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(err) = result {
            tracing::warn!(%err, path = %path.display(), "failed to append session event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_log_dir_is_a_silent_noop() {
        let log = EventLog::new(None);
        log.record(ContextId::new(0), &Event::Bookmark { frame_id: 1 });
    }

    #[test]
    fn records_event_to_configured_directory() {
        let dir = std::env::temp_dir().join(format!("hunter-core-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let log = EventLog::new(Some(dir.clone()));
        log.record(ContextId::new(0), &Event::Bookmark { frame_id: 7 });
        let contents = std::fs::read_to_string(dir.join("0.jsonl")).unwrap();
        assert!(contents.contains("\"frame_id\":7"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
