//! "Cases received" notifications.

use crate::case::Case;
use crate::form::Form;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Error returned by a listener.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ListenerError {
    /// Description of the failure.
    pub message: String,
}

impl ListenerError {
    /// Creates a listener error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Receives the cases touched by a processed form.
pub trait CasesReceivedListener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called after the form's case effects are saved.
    fn cases_received(&self, form: &Form, cases: &[Case]) -> Result<(), ListenerError>;
}

/// Dispatches processed forms to registered listeners.
///
/// A failing listener is logged and does not affect the others or the
/// caller.
#[derive(Default)]
pub struct CasesReceivedFeed {
    listeners: RwLock<Vec<Arc<dyn CasesReceivedListener>>>,
}

impl std::fmt::Debug for CasesReceivedFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasesReceivedFeed")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl CasesReceivedFeed {
    /// Creates an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn subscribe(&self, listener: Arc<dyn CasesReceivedListener>) {
        self.listeners.write().push(listener);
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Notifies every listener. Returns the number of failures.
    pub fn publish(&self, form: &Form, cases: &[Case]) -> usize {
        let listeners = self.listeners.read().clone();
        let mut failures = 0;
        for listener in listeners {
            if let Err(e) = listener.cases_received(form, cases) {
                failures += 1;
                error!(
                    listener = listener.name(),
                    form_id = %form.id,
                    error = %e,
                    "cases received listener failed"
                );
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl CasesReceivedListener for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn cases_received(&self, form: &Form, cases: &[Case]) -> Result<(), ListenerError> {
            self.seen
                .lock()
                .push(format!("{}:{}", form.id, cases.len()));
            Ok(())
        }
    }

    struct Failing;

    impl CasesReceivedListener for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn cases_received(&self, _: &Form, _: &[Case]) -> Result<(), ListenerError> {
            Err(ListenerError::new("boom"))
        }
    }

    #[test]
    fn failures_are_contained() {
        let feed = CasesReceivedFeed::new();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        feed.subscribe(Arc::new(Failing));
        feed.subscribe(recorder.clone());
        assert_eq!(feed.listener_count(), 2);

        let form = Form::new("f1", Utc::now(), serde_json::Value::Null);
        let failures = feed.publish(&form, &[Case::new("c1", None)]);
        assert_eq!(failures, 1);
        assert_eq!(*recorder.seen.lock(), vec!["f1:1".to_string()]);
    }
}
