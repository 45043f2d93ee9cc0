use thiserror::Error;

use crate::path::NodePath;

/// Caller-visible failure kinds (§7).
///
/// `PolicyRejection` never reaches a caller as an `Err` — rejected
/// operations are no-ops, logged at `warn!` and absorbed (§7
/// "Propagation policy"). The variant still exists so the internal
/// warning helper (`crate::policy::reject`) has one place to format a
/// consistent message; it is constructed only to be turned into a log
/// line, never returned.
///
/// `HandlerException` / `ConditionException` likewise never surface —
/// a handler or condition that panics-as-error is caught at the call
/// site and turned into `Status::Failure` / `false` plus a log line.
/// They're kept here for documentation/testing purposes (callers can
/// match on them in the rare case they bubble out of a user-supplied
/// closure that chose to return one deliberately).
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Invalid tree structure: a Handler at the builder root without a
    /// layer, an Inverter with no child at execute time, a duplicate
    /// sibling id within one construction call, or a malformed merge.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-fatal: attempted modification of a read-only node, or a kind
    /// change without `REPLACE_NODE`. Logged and dropped, never
    /// returned to a `Builder`/`Merge` caller.
    #[error("policy rejection at {path}: {reason}")]
    PolicyRejection { path: NodePath, reason: String },

    /// A contract was violated: `resume`/`fail` when not `Waiting`,
    /// `cancel` before the first `execute`, or data access with a
    /// missing key or a type mismatch.
    #[error("contract violation: {0}")]
    Contract(String),

    /// A handler function returned an error instead of a `Status`.
    /// Treated as `Status::Failure` for that handler; never propagated.
    #[error("handler {path} raised an error: {source}")]
    HandlerException {
        path: NodePath,
        #[source]
        source: anyhow::Error,
    },

    /// A condition predicate returned an error instead of a `bool`.
    /// Treated as `false`; never propagated.
    #[error("condition on {path} raised an error: {source}")]
    ConditionException {
        path: NodePath,
        #[source]
        source: anyhow::Error,
    },
}

pub type ProcessResult<T> = std::result::Result<T, ProcessError>;
