use bitflags::bitflags;

use crate::path::NodePath;

bitflags! {
    /// Controls how an existing node reacts to a later configuration
    /// operation (construction, merge, or registration) addressing the
    /// same sibling id (§6).
    ///
    /// `IGNORE_CHANGES` on either the existing node or the incoming
    /// operation always wins over any `OVERRIDE_*` flag the incoming
    /// operation carries — see `NodeUpdatePolicy::allows_structural_change`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeUpdatePolicy: u16 {
        /// Keep existing attributes where possible; do not replace kind;
        /// do not merge conditions.
        const NONE = 0;

        /// Existing node is structurally frozen: attribute and
        /// child-replacement operations are rejected.
        const IGNORE_CHANGES = 1 << 0;

        /// Nested builder lambdas for this node are not invoked.
        const IGNORE_BUILDER = 1 << 1;

        /// Allows replacing a node of one kind with another of the same id.
        const REPLACE_NODE = 1 << 2;

        /// Replace the handler function on a handler node.
        const OVERRIDE_HANDLER = 1 << 3;

        /// Replace conditions with the incoming list (empty list clears).
        const OVERRIDE_CONDITIONS = 1 << 4;

        /// Append incoming conditions to existing.
        const MERGE_CONDITIONS = 1 << 5;

        /// Replace priority; otherwise keep existing.
        const OVERRIDE_PRIORITY = 1 << 6;

        /// Update Parallel success threshold.
        const OVERRIDE_PARALLEL_NUM_SUCCESS = 1 << 7;

        /// Update Parallel failure threshold.
        const OVERRIDE_PARALLEL_NUM_FAILURE = 1 << 8;

        /// Update Parallel threshold mode.
        const OVERRIDE_THRESHOLD_MODE = 1 << 9;

        /// `IGNORE_CHANGES | IGNORE_BUILDER`.
        const READONLY = Self::IGNORE_CHANGES.bits() | Self::IGNORE_BUILDER.bits();

        /// Alias for `OVERRIDE_HANDLER`.
        const DEFAULT_HANDLER = Self::OVERRIDE_HANDLER.bits();

        /// Alias for `NONE`.
        const DEFAULT_LAYER = Self::NONE.bits();
    }
}

impl Default for NodeUpdatePolicy {
    fn default() -> Self {
        NodeUpdatePolicy::NONE
    }
}

impl NodeUpdatePolicy {
    /// Read-only precedence rule (§6): a structural change (replace,
    /// re-handle, child mutation beyond nested append, priority/condition
    /// change) is refused if *either* the existing node's policy or the
    /// incoming operation's policy carries `IGNORE_CHANGES`. `OVERRIDE_*`
    /// flags on the incoming side never defeat this.
    pub fn allows_structural_change(existing: NodeUpdatePolicy, incoming: NodeUpdatePolicy) -> bool {
        !existing.contains(NodeUpdatePolicy::IGNORE_CHANGES)
            && !incoming.contains(NodeUpdatePolicy::IGNORE_CHANGES)
    }

    /// Whether a nested builder lambda should still run over the existing
    /// node even though its structure is frozen (§4.2 step 3): true unless
    /// the existing node's policy also carries `IGNORE_BUILDER`.
    pub fn allows_nested_builder(existing: NodeUpdatePolicy) -> bool {
        !existing.contains(NodeUpdatePolicy::IGNORE_BUILDER)
    }
}

/// Recompute a node's conditions after a configuration operation (§4.2
/// "Condition updates"). `existing` and `incoming` are ordered predicate
/// lists; the caller owns evaluating them, this only decides which list
/// survives.
pub fn update_conditions<T: Clone>(
    policy: NodeUpdatePolicy,
    existing: &[T],
    incoming: &[T],
) -> Vec<T> {
    if incoming.is_empty() && policy.contains(NodeUpdatePolicy::OVERRIDE_CONDITIONS) {
        Vec::new()
    } else if !policy.contains(NodeUpdatePolicy::OVERRIDE_CONDITIONS)
        && !policy.contains(NodeUpdatePolicy::MERGE_CONDITIONS)
    {
        existing.to_vec()
    } else if policy.contains(NodeUpdatePolicy::OVERRIDE_CONDITIONS) {
        incoming.to_vec()
    } else {
        let mut merged = existing.to_vec();
        merged.extend_from_slice(incoming);
        merged
    }
}

/// Emit the standard `PolicyRejection` warning log line (§7: never
/// surfaced to the caller, always absorbed).
pub fn reject(path: &NodePath, reason: impl Into<String>) {
    let reason = reason.into();
    tracing::warn!(path = %path, source = "builder", reason = %reason, "policy rejection");
}
