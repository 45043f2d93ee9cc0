use crate::node::{Node, NodeKind, ParallelNode, ThresholdMode};
use crate::path::NodePath;
use crate::policy::{self, update_conditions, NodeUpdatePolicy};

/// The Merge Engine (§4.6): a pure function over two trees producing a
/// third. Shared by `TreeBuilder::merge` (§4.2) and `Manager`'s
/// registration/composition folding (§4.3).
///
/// - Layer nodes with matching id and kind: children merge recursively
///   ("decorators merge").
/// - Handler nodes with matching id: `source` (higher precedence) replaces
///   `target` wholesale, unless `target` is read-only ("handlers
///   override").
/// - Mismatched kinds at the same id: only replaced when `source`'s policy
///   carries `REPLACE_NODE` and neither side is read-only; otherwise the
///   target is kept and the incoming subtree dropped with a warning.
///
/// Stable: a retained child keeps its relative order among retained
/// siblings; newly attached children are appended (§4.6 "The merge is
/// stable").
pub fn merge_into(target: &mut Node, source: Node, path: &NodePath) {
    if target.kind() == source.kind() && target.kind().is_layer() {
        if !NodeUpdatePolicy::allows_structural_change(target.policy(), source.policy()) {
            policy::reject(path, "layer is read-only, children merge dropped");
            return;
        }
        merge_layer_attributes(target, &source, path);
        merge_children_from(target, source, path);
    } else if target.kind() == NodeKind::Handler && source.kind() == NodeKind::Handler {
        replace_handler(target, source, path);
    } else {
        replace_mismatched_kind(target, source, path);
    }
}

fn merge_layer_attributes(target: &mut Node, source: &Node, path: &NodePath) {
    let source_policy = source.policy();
    if source_policy.contains(NodeUpdatePolicy::OVERRIDE_PRIORITY) {
        target.meta_mut().priority = source.priority();
    }
    let merged = update_conditions(source_policy, target.conditions(), source.conditions());
    target.meta_mut().conditions = merged;

    if let (Node::Parallel(t), Node::Parallel(s)) = (target, source) {
        merge_parallel_thresholds(t, s);
    }
    let _ = path;
}

fn merge_parallel_thresholds(target: &mut ParallelNode, source: &ParallelNode) {
    if source.meta.policy.contains(NodeUpdatePolicy::OVERRIDE_PARALLEL_NUM_SUCCESS) {
        target.success_threshold = source.success_threshold;
    }
    if source.meta.policy.contains(NodeUpdatePolicy::OVERRIDE_PARALLEL_NUM_FAILURE) {
        target.failure_threshold = source.failure_threshold;
    }
    if source.meta.policy.contains(NodeUpdatePolicy::OVERRIDE_THRESHOLD_MODE) {
        target.threshold_mode = source.threshold_mode;
    }
}

fn merge_children_from(target: &mut Node, source: Node, path: &NodePath) {
    match source {
        Node::Sequence(n) | Node::Selector(n) => merge_child_list(target, n.children, path),
        Node::Parallel(n) => merge_child_list(target, n.children, path),
        Node::Inverter(n) => {
            if let Some(source_child) = n.child {
                let id = source_child.id().to_string();
                let child_path = path.push(id.as_str());
                match target.get_child_mut(&id) {
                    Some(existing) => merge_into(existing, *source_child, &child_path),
                    None => target.add_child(*source_child),
                }
            }
        }
        Node::Handler(_) => {}
    }
}

fn merge_child_list(target: &mut Node, source_children: Vec<Node>, path: &NodePath) {
    for source_child in source_children {
        let id = source_child.id().to_string();
        let child_path = path.push(id.as_str());
        match target.get_child_mut(&id) {
            Some(existing) => merge_into(existing, source_child, &child_path),
            None => target.add_child(source_child),
        }
    }
}

fn replace_handler(target: &mut Node, source: Node, path: &NodePath) {
    if target.policy().contains(NodeUpdatePolicy::IGNORE_CHANGES) {
        policy::reject(path, "handler is read-only, override dropped");
        return;
    }
    let order = target.order();
    let mut source = source;
    source.meta_mut().order = order;
    *target = source;
}

fn replace_mismatched_kind(target: &mut Node, source: Node, path: &NodePath) {
    let allowed = NodeUpdatePolicy::allows_structural_change(target.policy(), source.policy())
        && source.policy().contains(NodeUpdatePolicy::REPLACE_NODE);
    if allowed {
        let order = target.order();
        let mut source = source;
        source.meta_mut().order = order;
        *target = source;
    } else {
        policy::reject(
            path,
            format!(
                "kind mismatch ({:?} vs {:?}) without REPLACE_NODE",
                target.kind(),
                source.kind()
            ),
        );
    }
}

/// Fold `source` into `target` as a top-level merge (§4.2 "Merge
/// operation"): same id + same layer kind recurses; otherwise, if a child
/// of `target` matches the source root's id, merge into it; otherwise
/// attach the whole subtree as a new child.
pub fn merge_root(target: &mut Node, source: Node) {
    let root_path = NodePath::from_segments(vec![source.id().to_string()]);
    if target.id() == source.id() && target.kind() == source.kind() {
        merge_into(target, source, &NodePath::root());
        return;
    }
    let id = source.id().to_string();
    match target.get_child_mut(&id) {
        Some(existing) => merge_into(existing, source, &root_path),
        None => target.add_child(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerFn;
    use crate::node::{HandlerNode, InverterNode, LayerNode, NodeMeta};
    use crate::status::Status;

    fn seq(id: &str, policy: NodeUpdatePolicy, children: Vec<Node>) -> Node {
        let mut meta = NodeMeta::new(id, 0);
        meta.policy = policy;
        Node::Sequence(LayerNode { meta, children })
    }

    fn leaf(id: &str, status: Status) -> Node {
        Node::Handler(HandlerNode {
            meta: NodeMeta::new(id, 0),
            handler: Some(HandlerFn::new("h", move |_| status)),
        })
    }

    /// §8 "Read-only integrity ... no later registration ... changes its
    /// ... children (where applicable)": a layer registered `IGNORE_CHANGES`
    /// must not gain or lose children from a later merge.
    #[test]
    fn readonly_layer_rejects_child_merge() {
        let mut target = seq("secured", NodeUpdatePolicy::IGNORE_CHANGES, vec![leaf("a", Status::Success)]);
        let source = seq("secured", NodeUpdatePolicy::NONE, vec![leaf("b", Status::Success)]);
        merge_into(&mut target, source, &NodePath::root());
        assert_eq!(target.children().len(), 1);
        assert_eq!(target.children()[0].id(), "a");
    }

    #[test]
    fn non_readonly_layer_merges_children() {
        let mut target = seq("x", NodeUpdatePolicy::NONE, vec![leaf("a", Status::Success)]);
        let source = seq("x", NodeUpdatePolicy::NONE, vec![leaf("b", Status::Success)]);
        merge_into(&mut target, source, &NodePath::root());
        assert_eq!(target.children().len(), 2);
    }

    /// Matching `Inverter` nodes merge their single child the same way
    /// matching layer nodes merge their child lists, instead of silently
    /// dropping it.
    #[test]
    fn matching_inverters_merge_their_child() {
        let mut target = Node::Inverter(InverterNode { meta: NodeMeta::new("inv", 0), child: None });
        let mut source = Node::Inverter(InverterNode { meta: NodeMeta::new("inv", 0), child: None });
        source.add_child(leaf("child", Status::Failure));
        merge_into(&mut target, source, &NodePath::root());
        assert_eq!(target.children().len(), 1);
        assert_eq!(target.children()[0].id(), "child");
    }

    #[test]
    fn matching_inverters_attached_child_merges_with_existing() {
        let mut target = Node::Inverter(InverterNode { meta: NodeMeta::new("inv", 0), child: None });
        target.add_child(leaf("child", Status::Success));
        let mut source = Node::Inverter(InverterNode { meta: NodeMeta::new("inv", 0), child: None });
        source.add_child(leaf("child", Status::Failure));
        merge_into(&mut target, source, &NodePath::root());
        assert_eq!(target.children().len(), 1);
    }
}
