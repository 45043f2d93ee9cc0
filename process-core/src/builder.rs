use crate::condition::Condition;
use crate::error::ProcessError;
use crate::handler::HandlerFn;
use crate::merge;
use crate::node::{HandlerNode, InverterNode, LayerNode, Node, NodeKind, NodeMeta, ParallelNode, ThresholdMode};
use crate::path::NodePath;
use crate::policy::{self, update_conditions, NodeUpdatePolicy};

/// A child-storage slot a node owns: either the ordered `Vec<Node>` a layer
/// keeps, or the single optional child an `Inverter` keeps (§4.1). Unifies
/// the upsert/merge logic below over both shapes.
enum Slot<'a> {
    Vec(&'a mut Vec<Node>),
    One(&'a mut Option<Box<Node>>),
}

impl<'a> Slot<'a> {
    fn position(&self, id: &str) -> Option<usize> {
        match self {
            Slot::Vec(v) => v.iter().position(|c| c.id() == id),
            Slot::One(o) => o.as_deref().filter(|c| c.id() == id).map(|_| 0),
        }
    }

    fn get(&self, idx: usize) -> &Node {
        match self {
            Slot::Vec(v) => &v[idx],
            Slot::One(o) => o.as_deref().expect("slot index 0 requires an occupied single slot"),
        }
    }

    fn get_mut(&mut self, idx: usize) -> &mut Node {
        match self {
            Slot::Vec(v) => &mut v[idx],
            Slot::One(o) => o.as_deref_mut().expect("slot index 0 requires an occupied single slot"),
        }
    }

    fn len(&self) -> usize {
        match self {
            Slot::Vec(v) => v.len(),
            Slot::One(o) => if o.is_some() { 1 } else { 0 },
        }
    }

    /// A new id into an empty single slot occupies it; a new id into an
    /// occupied single slot replaces it (an `Inverter` has room for one
    /// child).
    fn push(&mut self, node: Node) {
        match self {
            Slot::Vec(v) => v.push(node),
            Slot::One(o) => *o = Some(Box::new(node)),
        }
    }

    fn set(&mut self, idx: usize, node: Node) {
        match self {
            Slot::Vec(v) => v[idx] = node,
            Slot::One(o) => {
                let _ = idx;
                *o = Some(Box::new(node));
            }
        }
    }
}

/// What a single builder call wants to place or update.
#[derive(Clone)]
enum NewNode {
    Sequence,
    Selector,
    Inverter,
    Parallel {
        success_threshold: usize,
        failure_threshold: usize,
        threshold_mode: ThresholdMode,
    },
    Handler(HandlerFn),
}

impl NewNode {
    fn kind(&self) -> NodeKind {
        match self {
            NewNode::Sequence => NodeKind::Sequence,
            NewNode::Selector => NodeKind::Selector,
            NewNode::Inverter => NodeKind::Inverter,
            NewNode::Parallel { .. } => NodeKind::Parallel,
            NewNode::Handler(_) => NodeKind::Handler,
        }
    }
}

fn build_node(meta: NodeMeta, spec: NewNode) -> Node {
    match spec {
        NewNode::Sequence => Node::Sequence(LayerNode { meta, children: Vec::new() }),
        NewNode::Selector => Node::Selector(LayerNode { meta, children: Vec::new() }),
        NewNode::Inverter => Node::Inverter(InverterNode { meta, child: None }),
        NewNode::Parallel { success_threshold, failure_threshold, threshold_mode } => {
            Node::Parallel(ParallelNode { meta, children: Vec::new(), success_threshold, failure_threshold, threshold_mode })
        }
        NewNode::Handler(handler) => Node::Handler(HandlerNode { meta, handler: Some(handler) }),
    }
}

fn slot_of(node: &mut Node) -> Option<Slot<'_>> {
    match node {
        Node::Sequence(n) => Some(Slot::Vec(&mut n.children)),
        Node::Selector(n) => Some(Slot::Vec(&mut n.children)),
        Node::Parallel(n) => Some(Slot::Vec(&mut n.children)),
        Node::Inverter(n) => Some(Slot::One(&mut n.child)),
        Node::Handler(_) => None,
    }
}

enum UpsertOutcome {
    Ready(usize),
    Skip,
}

fn apply_attribute_overrides(node: &mut Node, policy: NodeUpdatePolicy, priority: crate::status::Priority, conditions: &[Condition]) {
    if policy.contains(NodeUpdatePolicy::OVERRIDE_PRIORITY) {
        node.meta_mut().priority = priority;
    }
    let merged = update_conditions(policy, node.conditions(), conditions);
    node.meta_mut().conditions = merged;
}

fn apply_handler_override(node: &mut Node, policy: NodeUpdatePolicy, spec: &NewNode) {
    if let (Node::Handler(existing), NewNode::Handler(incoming)) = (node, spec) {
        if policy.contains(NodeUpdatePolicy::OVERRIDE_HANDLER) {
            existing.handler = Some(incoming.clone());
        }
    }
}

fn apply_parallel_overrides(node: &mut Node, policy: NodeUpdatePolicy, spec: &NewNode) {
    if let (
        Node::Parallel(existing),
        NewNode::Parallel { success_threshold, failure_threshold, threshold_mode },
    ) = (node, spec)
    {
        if policy.contains(NodeUpdatePolicy::OVERRIDE_PARALLEL_NUM_SUCCESS) {
            existing.success_threshold = *success_threshold;
        }
        if policy.contains(NodeUpdatePolicy::OVERRIDE_PARALLEL_NUM_FAILURE) {
            existing.failure_threshold = *failure_threshold;
        }
        if policy.contains(NodeUpdatePolicy::OVERRIDE_THRESHOLD_MODE) {
            existing.threshold_mode = *threshold_mode;
        }
    }
}

/// §4.2 step 1-4: place or update a sibling named `id` within `slot`.
fn upsert(
    slot: &mut Slot,
    id: &str,
    node_policy: NodeUpdatePolicy,
    priority: crate::status::Priority,
    conditions: Vec<Condition>,
    spec: NewNode,
) -> UpsertOutcome {
    let new_kind = spec.kind();
    match slot.position(id) {
        None => {
            let order = slot.len() as u64;
            let mut meta = NodeMeta::new(id, order);
            meta.priority = priority;
            meta.conditions = conditions;
            meta.policy = node_policy;
            slot.push(build_node(meta, spec));
            UpsertOutcome::Ready(slot.len().saturating_sub(1))
        }
        Some(pos) => {
            let existing_policy = slot.get(pos).policy();
            if existing_policy.contains(NodeUpdatePolicy::IGNORE_CHANGES) {
                return if NodeUpdatePolicy::allows_nested_builder(existing_policy) {
                    UpsertOutcome::Ready(pos)
                } else {
                    UpsertOutcome::Skip
                };
            }
            let existing_kind = slot.get(pos).kind();
            if existing_kind == new_kind {
                let existing = slot.get_mut(pos);
                apply_attribute_overrides(existing, node_policy, priority, &conditions);
                apply_handler_override(existing, node_policy, &spec);
                apply_parallel_overrides(existing, node_policy, &spec);
                if node_policy.contains(NodeUpdatePolicy::REPLACE_NODE) {
                    let order = slot.get(pos).order();
                    let mut meta = NodeMeta::new(id, order);
                    meta.priority = slot.get(pos).priority();
                    meta.conditions = slot.get(pos).conditions().to_vec();
                    meta.policy = node_policy;
                    slot.set(pos, build_node(meta, spec));
                }
                UpsertOutcome::Ready(pos)
            } else if node_policy.contains(NodeUpdatePolicy::REPLACE_NODE) {
                let order = slot.get(pos).order();
                let mut meta = NodeMeta::new(id, order);
                meta.priority = priority;
                meta.conditions = conditions;
                meta.policy = node_policy;
                slot.set(pos, build_node(meta, spec));
                UpsertOutcome::Ready(pos)
            } else {
                policy::reject(
                    &NodePath::from_segments(vec![id.to_string()]),
                    format!("kind mismatch ({existing_kind:?} vs {new_kind:?}) without REPLACE_NODE"),
                );
                UpsertOutcome::Skip
            }
        }
    }
}

fn recurse(slot: &mut Slot, idx: usize, build: impl FnOnce(LayerBuilder) -> LayerBuilder) {
    if let Some(child_slot) = slot_of(slot.get_mut(idx)) {
        let lb = LayerBuilder { slot: child_slot };
        let _ = build(lb);
    }
}

/// Scoped builder bound to one node's children, handed to nested closures
/// passed to `TreeBuilder::sequence`/`selector`/`parallel`/`inverter` (§4.2
/// "nested lambdas receive a sub-builder bound to the child being
/// constructed").
pub struct LayerBuilder<'n> {
    slot: Slot<'n>,
}

impl<'n> LayerBuilder<'n> {
    pub fn handler(
        mut self,
        id: impl Into<String>,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        handler: HandlerFn,
    ) -> Self {
        let id = id.into();
        upsert(&mut self.slot, &id, node_policy, priority, conditions, NewNode::Handler(handler));
        self
    }

    pub fn sequence(
        mut self,
        id: impl Into<String>,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        build: impl FnOnce(LayerBuilder) -> LayerBuilder,
    ) -> Self {
        let id = id.into();
        if let UpsertOutcome::Ready(idx) = upsert(&mut self.slot, &id, node_policy, priority, conditions, NewNode::Sequence) {
            recurse(&mut self.slot, idx, build);
        }
        self
    }

    pub fn selector(
        mut self,
        id: impl Into<String>,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        build: impl FnOnce(LayerBuilder) -> LayerBuilder,
    ) -> Self {
        let id = id.into();
        if let UpsertOutcome::Ready(idx) = upsert(&mut self.slot, &id, node_policy, priority, conditions, NewNode::Selector) {
            recurse(&mut self.slot, idx, build);
        }
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn parallel(
        mut self,
        id: impl Into<String>,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        success_threshold: usize,
        failure_threshold: usize,
        threshold_mode: ThresholdMode,
        build: impl FnOnce(LayerBuilder) -> LayerBuilder,
    ) -> Self {
        let id = id.into();
        let spec = NewNode::Parallel { success_threshold, failure_threshold, threshold_mode };
        if let UpsertOutcome::Ready(idx) = upsert(&mut self.slot, &id, node_policy, priority, conditions, spec) {
            recurse(&mut self.slot, idx, build);
        }
        self
    }

    pub fn inverter(
        mut self,
        id: impl Into<String>,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        build: impl FnOnce(LayerBuilder) -> LayerBuilder,
    ) -> Self {
        let id = id.into();
        if let UpsertOutcome::Ready(idx) = upsert(&mut self.slot, &id, node_policy, priority, conditions, NewNode::Inverter) {
            recurse(&mut self.slot, idx, build);
        }
        self
    }

    /// §4.2 "Merge operation" applied at this scope: same id and kind as an
    /// existing child recurses; otherwise the subtree is attached new.
    pub fn merge(mut self, subtree: Node) -> Self {
        let id = subtree.id().to_string();
        match self.slot.position(&id) {
            Some(idx) => {
                let existing = self.slot.get_mut(idx);
                merge::merge_into(existing, subtree, &NodePath::from_segments(vec![id]));
            }
            None => self.slot.push(subtree),
        }
        self
    }

    pub fn remove_node(mut self, id: &str) -> Self {
        match &mut self.slot {
            Slot::Vec(v) => v.retain(|c| c.id() != id),
            Slot::One(o) => {
                if o.as_deref().map(Node::id) == Some(id) {
                    *o = None;
                }
            }
        }
        self
    }
}

/// Fluent construction API rooted at a single layer node (§4.2). Nested
/// closures receive a [`LayerBuilder`] scoped to the child being built.
///
/// `ConfigurationError`s (a `Handler` at the root, an empty build) are
/// deferred until [`TreeBuilder::build`] so every construction call can
/// return `Self` uniformly for chaining (§7 "ConfigurationError surfaces to
/// the caller of Execute/Build").
pub struct TreeBuilder {
    root: Option<Node>,
    error: Option<ProcessError>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self { root: None, error: None }
    }

    fn place<B: FnOnce(LayerBuilder) -> LayerBuilder>(
        &mut self,
        id: String,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        spec: NewNode,
        build: Option<B>,
    ) {
        if self.error.is_some() {
            return;
        }
        match self.root.take() {
            None => {
                let mut meta = NodeMeta::new(id, 0);
                meta.priority = priority;
                meta.conditions = conditions;
                meta.policy = node_policy;
                let mut node = build_node(meta, spec);
                if let Some(build) = build {
                    if let Some(child_slot) = slot_of(&mut node) {
                        let lb = LayerBuilder { slot: child_slot };
                        let _ = build(lb);
                    }
                }
                self.root = Some(node);
            }
            Some(mut root) => {
                if let Some(mut slot) = slot_of(&mut root) {
                    if let UpsertOutcome::Ready(idx) = upsert(&mut slot, &id, node_policy, priority, conditions, spec) {
                        if let Some(build) = build {
                            recurse(&mut slot, idx, build);
                        }
                    }
                } else {
                    tracing::warn!(id = %id, "tree root has no child storage; operation dropped");
                }
                self.root = Some(root);
            }
        }
    }

    pub fn sequence(
        mut self,
        id: impl Into<String>,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        build: impl FnOnce(LayerBuilder) -> LayerBuilder,
    ) -> Self {
        self.place(id.into(), node_policy, priority, conditions, NewNode::Sequence, Some(build));
        self
    }

    pub fn selector(
        mut self,
        id: impl Into<String>,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        build: impl FnOnce(LayerBuilder) -> LayerBuilder,
    ) -> Self {
        self.place(id.into(), node_policy, priority, conditions, NewNode::Selector, Some(build));
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn parallel(
        mut self,
        id: impl Into<String>,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        success_threshold: usize,
        failure_threshold: usize,
        threshold_mode: ThresholdMode,
        build: impl FnOnce(LayerBuilder) -> LayerBuilder,
    ) -> Self {
        let spec = NewNode::Parallel { success_threshold, failure_threshold, threshold_mode };
        self.place(id.into(), node_policy, priority, conditions, spec, Some(build));
        self
    }

    pub fn inverter(
        mut self,
        id: impl Into<String>,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        build: impl FnOnce(LayerBuilder) -> LayerBuilder,
    ) -> Self {
        self.place(id.into(), node_policy, priority, conditions, NewNode::Inverter, Some(build));
        self
    }

    /// §4.2 step 1: "If no current root exists, fail (for Handler)."
    pub fn handler(
        mut self,
        id: impl Into<String>,
        node_policy: NodeUpdatePolicy,
        priority: crate::status::Priority,
        conditions: Vec<Condition>,
        handler: HandlerFn,
    ) -> Self {
        let id = id.into();
        if self.root.is_none() && self.error.is_none() {
            self.error = Some(ProcessError::Configuration(format!(
                "handler '{id}' cannot be a tree root; builders must start with a layer node"
            )));
            return self;
        }
        self.place(id, node_policy, priority, conditions, NewNode::Handler(handler), None::<fn(LayerBuilder) -> LayerBuilder>);
        self
    }

    pub fn merge(mut self, subtree: Node) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.root.take() {
            None => self.root = Some(subtree),
            Some(mut root) => {
                merge::merge_root(&mut root, subtree);
                self.root = Some(root);
            }
        }
        self
    }

    pub fn remove_node(mut self, id: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        let is_root = self.root.as_ref().is_some_and(|r| r.id() == id);
        if is_root {
            self.root = None;
            return self;
        }
        if let Some(root) = self.root.as_mut() {
            if let Some(mut slot) = slot_of(root) {
                match &mut slot {
                    Slot::Vec(v) => v.retain(|c| c.id() != id),
                    Slot::One(o) => {
                        if o.as_deref().map(Node::id) == Some(id) {
                            *o = None;
                        }
                    }
                }
            }
        }
        self
    }

    pub fn build(self) -> Result<Node, ProcessError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.root
            .ok_or_else(|| ProcessError::Configuration("builder produced no root node".into()))
    }
}
