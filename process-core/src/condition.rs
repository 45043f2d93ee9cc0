use std::sync::Arc;

use crate::process::Process;

/// `(process) -> bool`, gating node eligibility (§3, §4.7).
///
/// An exception from the inner predicate is treated as `false` and logged
/// at `warn!` — see `Condition::evaluate`.
#[derive(Clone)]
pub struct Condition {
    label: &'static str,
    predicate: Arc<dyn Fn(&Process) -> anyhow::Result<bool> + Send + Sync>,
}

impl Condition {
    /// Wrap a fallible predicate. Prefer this when the predicate can
    /// meaningfully fail (e.g. a downstream lookup); the failure is
    /// swallowed to `false` per §7 `ConditionException` semantics.
    pub fn fallible(
        label: &'static str,
        predicate: impl Fn(&Process) -> anyhow::Result<bool> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label,
            predicate: Arc::new(predicate),
        }
    }

    /// Wrap an infallible predicate.
    pub fn new(label: &'static str, predicate: impl Fn(&Process) -> bool + Send + Sync + 'static) -> Self {
        Self::fallible(label, move |p| Ok(predicate(p)))
    }

    /// Build a condition that only applies to processes of a given
    /// `process_type`; processes of any other type fail the condition
    /// (§4.7: "typed variants adapt to a specific process subtype ...
    /// failing (false) on type mismatch").
    pub fn typed(
        label: &'static str,
        process_type: &'static str,
        predicate: impl Fn(&Process) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(label, move |p| p.process_type() == process_type && predicate(p))
    }

    /// Evaluate the predicate, swallowing any error as `false` (§7).
    pub fn evaluate(&self, process: &Process) -> bool {
        match (self.predicate)(process) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(
                    condition = self.label,
                    process_id = %process.id(),
                    error = %err,
                    "condition raised an error, treated as false"
                );
                false
            }
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

/// Short-circuit AND over an ordered list of conditions; empty means
/// always eligible (§3).
pub fn all_hold(conditions: &[Condition], process: &Process) -> bool {
    conditions.iter().all(|c| c.evaluate(process))
}
