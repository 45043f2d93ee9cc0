use std::sync::Arc;

use crate::session::Session;
use crate::status::Status;

/// `(session) -> Status`, the function wrapped by a Handler leaf node
/// (§3, §4.7). A single function is attached per handler node and
/// replaced wholesale on override — handlers are never chained, unlike
/// conditions (§9).
#[derive(Clone)]
pub struct HandlerFn {
    label: &'static str,
    body: Arc<dyn Fn(&mut Session) -> anyhow::Result<Status> + Send + Sync>,
}

impl HandlerFn {
    /// Wrap a fallible handler body. An `Err` is treated as `Status::Failure`
    /// for that handler and logged at `error!`, never propagated (§7
    /// `HandlerException`).
    pub fn fallible(
        label: &'static str,
        body: impl Fn(&mut Session) -> anyhow::Result<Status> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label,
            body: Arc::new(body),
        }
    }

    /// Wrap an infallible handler body.
    pub fn new(label: &'static str, body: impl Fn(&mut Session) -> Status + Send + Sync + 'static) -> Self {
        Self::fallible(label, move |session| Ok(body(session)))
    }

    /// Build a handler that only runs for a given `process_type`;
    /// mismatched process types return `Status::Failure` without
    /// invoking the inner body (§4.7).
    pub fn typed(
        label: &'static str,
        process_type: &'static str,
        body: impl Fn(&mut Session) -> Status + Send + Sync + 'static,
    ) -> Self {
        Self::new(label, move |session| {
            if session.process().process_type() == process_type {
                body(session)
            } else {
                Status::Failure
            }
        })
    }

    pub fn invoke(&self, session: &mut Session) -> Status {
        match (self.body)(session) {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(
                    handler = self.label,
                    process_id = %session.process().id(),
                    error = %err,
                    "handler raised an error, treated as failure"
                );
                Status::Failure
            }
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}
