use std::collections::HashMap;
use std::sync::RwLock;

use crate::builder::TreeBuilder;
use crate::error::ProcessResult;
use crate::merge;
use crate::node::{LayerNode, Node, NodeMeta};

/// Selects which registry layers contribute to a composed root (§4.3).
///
/// The source carries two divergent definitions of this enum, one using a
/// left-shift-of-zero bit expression; §9's Open Questions note says not to
/// reproduce that literally. This follows the functional names the tests
/// exercise instead of any particular bit pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextMode {
    /// Use only the `Process`'s own `processing()` + `WithProcessing()`;
    /// the registry is not consulted at all.
    Local,
    /// Include the global entry only.
    Global,
    /// Global plus the first candidate instance that has a registered tree.
    MatchFirst,
    /// Global plus every candidate instance that has a registered tree.
    All,
}

type Key = (String, Option<String>);

/// Process-wide store of configuration trees keyed by `(process-type,
/// optional instance-id)` (§4.3). Registration and lookup are safe under
/// concurrent calls; composing a root never mutates a stored entry, only
/// clones of it (§5).
pub struct Manager {
    entries: RwLock<HashMap<Key, Node>>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// §4.3 `Register<TProcess>`: builds a tree from `builder` and stores
    /// it under `(process_type, instance)`. A repeated registration for the
    /// same key merges into the existing registered tree, so definers can
    /// self-register incrementally (§4.3).
    pub fn register(
        &self,
        process_type: impl Into<String>,
        instance: Option<&str>,
        builder: TreeBuilder,
    ) -> ProcessResult<()> {
        let tree = builder.build()?;
        self.register_tree(process_type, instance, tree)
    }

    /// Lower-level form of [`Manager::register`] for a tree that's already
    /// been built (e.g. by a caller accumulating several builders before
    /// registering).
    pub fn register_tree(
        &self,
        process_type: impl Into<String>,
        instance: Option<&str>,
        tree: Node,
    ) -> ProcessResult<()> {
        let key = (process_type.into(), instance.map(str::to_owned));
        let mut entries = self.entries.write().expect("registry lock poisoned");
        match entries.get_mut(&key) {
            Some(existing) => merge::merge_root(existing, tree),
            None => {
                entries.insert(key, tree);
            }
        }
        Ok(())
    }

    /// §6 `CreateRootNode(id) -> Sequence root`: the empty-root fallback
    /// used whenever a requested key has no registered entry.
    pub fn create_root_node(id: impl Into<String>) -> Node {
        Node::Sequence(LayerNode { meta: NodeMeta::new(id, 0), children: Vec::new() })
    }

    /// §4.3 `GetRootNode`: composes a fresh root for one execution.
    ///
    /// Returns the composed root plus the subset of `instances` that
    /// actually had a registered tree and so contributed to composition.
    pub fn get_root_node(
        &self,
        process_type: &str,
        context_mode: ContextMode,
        instances: &[String],
    ) -> (Node, Vec<String>) {
        if context_mode == ContextMode::Local {
            return (Self::create_root_node(process_type), Vec::new());
        }

        let entries = self.entries.read().expect("registry lock poisoned");
        let mut root = entries
            .get(&(process_type.to_string(), None))
            .cloned()
            .unwrap_or_else(|| Self::create_root_node(process_type));

        if context_mode == ContextMode::Global {
            return (root, Vec::new());
        }

        let mut matched = Vec::new();
        for instance in instances {
            let key = (process_type.to_string(), Some(instance.clone()));
            if let Some(tree) = entries.get(&key) {
                merge::merge_root(&mut root, tree.clone());
                matched.push(instance.clone());
                if context_mode == ContextMode::MatchFirst {
                    break;
                }
            }
        }
        (root, matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerFn;
    use crate::policy::NodeUpdatePolicy;
    use crate::status::{Priority, Status};

    fn leaf(id: &'static str, status: Status) -> TreeBuilder {
        TreeBuilder::new().sequence(id, NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
            b.handler(id, NodeUpdatePolicy::NONE, Priority::Normal, vec![], HandlerFn::new(id, move |_| status))
        })
    }

    #[test]
    fn global_only_when_no_instances_requested() {
        let manager = Manager::new();
        manager.register("widget", None, leaf("g", Status::Success)).unwrap();
        let (root, matched) = manager.get_root_node("widget", ContextMode::Global, &["inst-1".to_string()]);
        assert_eq!(root.id(), "g");
        assert!(matched.is_empty());
    }

    #[test]
    fn match_first_stops_at_first_present_instance() {
        let manager = Manager::new();
        manager.register_tree("widget", None, Manager::create_root_node("root")).unwrap();
        manager
            .register_tree(
                "widget",
                Some("b"),
                Node::Sequence(LayerNode { meta: NodeMeta::new("root", 0), children: Vec::new() }),
            )
            .unwrap();
        let (_, matched) = manager.get_root_node(
            "widget",
            ContextMode::MatchFirst,
            &["a".to_string(), "b".to_string(), "c".to_string()],
        );
        assert_eq!(matched, vec!["b".to_string()]);
    }

    #[test]
    fn all_mode_matches_every_present_instance_in_order() {
        let manager = Manager::new();
        for inst in ["a", "c"] {
            manager
                .register_tree(
                    "widget",
                    Some(inst),
                    Node::Sequence(LayerNode { meta: NodeMeta::new("root", 0), children: Vec::new() }),
                )
                .unwrap();
        }
        let (_, matched) = manager.get_root_node(
            "widget",
            ContextMode::All,
            &["a".to_string(), "b".to_string(), "c".to_string()],
        );
        assert_eq!(matched, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn local_mode_ignores_the_registry_entirely() {
        let manager = Manager::new();
        manager.register("widget", None, leaf("g", Status::Failure)).unwrap();
        let (root, matched) = manager.get_root_node("widget", ContextMode::Local, &[]);
        assert!(root.children().is_empty());
        assert!(matched.is_empty());
    }

    #[test]
    fn repeated_registration_merges_into_existing_entry() {
        let manager = Manager::new();
        manager.register("widget", None, leaf("root", Status::Success)).unwrap();
        let second = TreeBuilder::new()
            .sequence("root", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                b.handler("extra", NodeUpdatePolicy::NONE, Priority::Normal, vec![], HandlerFn::new("extra", |_| Status::Success))
            })
            .build()
            .unwrap();
        manager.register_tree("widget", None, second).unwrap();
        let (root, _) = manager.get_root_node("widget", ContextMode::Global, &[]);
        assert_eq!(root.children().len(), 2);
    }

    #[test]
    fn composition_never_mutates_stored_entries() {
        let manager = Manager::new();
        manager.register("widget", None, leaf("root", Status::Success)).unwrap();
        let (mut composed, _) = manager.get_root_node("widget", ContextMode::Global, &[]);
        composed.add_child(Node::Sequence(LayerNode { meta: NodeMeta::new("scratch", 99), children: Vec::new() }));
        let (fresh, _) = manager.get_root_node("widget", ContextMode::Global, &[]);
        assert_eq!(fresh.children().len(), 1);
    }
}
