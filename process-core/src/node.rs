use crate::condition::{all_hold, Condition};
use crate::error::ProcessError;
use crate::handler::HandlerFn;
use crate::path::NodePath;
use crate::policy::NodeUpdatePolicy;
use crate::process::Process;
use crate::session::Session;
use crate::status::{Priority, Status};

/// Discriminates the five node kinds without borrowing into a particular
/// variant (§3, §4.1). Used by the builder and merge engine to decide
/// whether two same-id nodes "match" (layer-vs-layer recurse, handler-vs-
/// handler replace) or differ (only `REPLACE_NODE` allows swapping kinds).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Sequence,
    Selector,
    Parallel,
    Inverter,
    Handler,
}

impl NodeKind {
    pub fn is_layer(self) -> bool {
        !matches!(self, NodeKind::Handler)
    }
}

/// Attributes shared by every node kind (§3 "Node (common attributes)").
#[derive(Clone)]
pub struct NodeMeta {
    pub id: String,
    pub order: u64,
    pub priority: Priority,
    pub conditions: Vec<Condition>,
    pub policy: NodeUpdatePolicy,
    pub status: Status,
}

impl NodeMeta {
    pub fn new(id: impl Into<String>, order: u64) -> Self {
        Self {
            id: id.into(),
            order,
            priority: Priority::default(),
            conditions: Vec::new(),
            policy: NodeUpdatePolicy::default(),
            status: Status::Unknown,
        }
    }
}

/// Threshold-selection rule a `Parallel` node applies when both its success
/// and failure thresholds would be met by the same round (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ThresholdMode {
    #[default]
    SuccessPriority,
    FailurePriority,
}

/// A `Sequence` or `Selector` layer: an ordered, id-keyed collection of
/// children combined by AND (Sequence) or OR (Selector) semantics (§4.1).
#[derive(Clone)]
pub struct LayerNode {
    pub meta: NodeMeta,
    pub children: Vec<Node>,
}

/// A `Parallel` layer: evaluates every eligible child and aggregates by
/// threshold rather than short-circuiting (§3, §4.1).
#[derive(Clone)]
pub struct ParallelNode {
    pub meta: NodeMeta,
    pub children: Vec<Node>,
    pub success_threshold: usize,
    pub failure_threshold: usize,
    pub threshold_mode: ThresholdMode,
}

/// An `Inverter`: a unary wrapper that flips SUCCESS/FAILURE and passes
/// WAITING/CANCELLED through unchanged (§3, §4.1).
#[derive(Clone)]
pub struct InverterNode {
    pub meta: NodeMeta,
    pub child: Option<Box<Node>>,
}

/// A `Handler` leaf: wraps a single function from session to status (§3).
#[derive(Clone)]
pub struct HandlerNode {
    pub meta: NodeMeta,
    pub handler: Option<HandlerFn>,
}

/// A tagged union over the five node kinds (§9 "dynamic-dispatch tree ...
/// maps naturally to a tagged variant with an execute/resume/fail/cancel
/// dispatcher").
#[derive(Clone)]
pub enum Node {
    Sequence(LayerNode),
    Selector(LayerNode),
    Parallel(ParallelNode),
    Inverter(InverterNode),
    Handler(HandlerNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Sequence(_) => NodeKind::Sequence,
            Node::Selector(_) => NodeKind::Selector,
            Node::Parallel(_) => NodeKind::Parallel,
            Node::Inverter(_) => NodeKind::Inverter,
            Node::Handler(_) => NodeKind::Handler,
        }
    }

    pub fn meta(&self) -> &NodeMeta {
        match self {
            Node::Sequence(n) | Node::Selector(n) => &n.meta,
            Node::Parallel(n) => &n.meta,
            Node::Inverter(n) => &n.meta,
            Node::Handler(n) => &n.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut NodeMeta {
        match self {
            Node::Sequence(n) | Node::Selector(n) => &mut n.meta,
            Node::Parallel(n) => &mut n.meta,
            Node::Inverter(n) => &mut n.meta,
            Node::Handler(n) => &mut n.meta,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    pub fn order(&self) -> u64 {
        self.meta().order
    }

    pub fn priority(&self) -> Priority {
        self.meta().priority
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.meta().conditions
    }

    pub fn policy(&self) -> NodeUpdatePolicy {
        self.meta().policy
    }

    pub fn status(&self) -> Status {
        self.meta().status
    }

    pub fn set_status(&mut self, status: Status) {
        self.meta_mut().status = status;
    }

    /// §3: "an exception from a predicate is treated as false."
    pub fn conditions_hold(&self, process: &Process) -> bool {
        all_hold(self.conditions(), process)
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Sequence(n) | Node::Selector(n) => &n.children,
            Node::Parallel(n) => &n.children,
            Node::Inverter(n) => n.child.as_deref().map(std::slice::from_ref).unwrap_or(&[]),
            Node::Handler(_) => &[],
        }
    }

    pub fn get_child(&self, id: &str) -> Option<&Node> {
        self.children().iter().find(|c| c.id() == id)
    }

    pub fn get_child_mut(&mut self, id: &str) -> Option<&mut Node> {
        match self {
            Node::Sequence(n) | Node::Selector(n) => n.children.iter_mut().find(|c| c.id() == id),
            Node::Parallel(n) => n.children.iter_mut().find(|c| c.id() == id),
            Node::Inverter(n) => n.child.as_deref_mut().filter(|c| c.id() == id),
            Node::Handler(_) => None,
        }
    }

    pub fn remove_child(&mut self, id: &str) -> Option<Node> {
        match self {
            Node::Sequence(n) | Node::Selector(n) => {
                let idx = n.children.iter().position(|c| c.id() == id)?;
                Some(n.children.remove(idx))
            }
            Node::Parallel(n) => {
                let idx = n.children.iter().position(|c| c.id() == id)?;
                Some(n.children.remove(idx))
            }
            Node::Inverter(n) => {
                if n.child.as_deref().map(Node::id) == Some(id) {
                    n.child.take().map(|b| *b)
                } else {
                    None
                }
            }
            Node::Handler(_) => None,
        }
    }

    /// Appends a child to a layer's children, assigning it the next
    /// available `order` (vector position at append time — see §4.1
    /// "Order of a replaced node is preserved ... a new node receives the
    /// next available order").
    pub fn add_child(&mut self, mut child: Node) {
        match self {
            Node::Sequence(n) | Node::Selector(n) => {
                child.meta_mut().order = n.children.len() as u64;
                n.children.push(child);
            }
            Node::Parallel(n) => {
                child.meta_mut().order = n.children.len() as u64;
                n.children.push(child);
            }
            Node::Inverter(n) => {
                child.meta_mut().order = 0;
                n.child = Some(Box::new(child));
            }
            Node::Handler(_) => panic!("Handler cannot have children"),
        }
    }

    /// Recursively reassigns `order` to match each layer's current child
    /// vector position, the authoritative tie-break source for one
    /// execution (§4.4 step 4, §3 ordering invariant).
    pub fn reorder(&mut self) {
        match self {
            Node::Sequence(n) | Node::Selector(n) => {
                for (i, child) in n.children.iter_mut().enumerate() {
                    child.meta_mut().order = i as u64;
                    child.reorder();
                }
            }
            Node::Parallel(n) => {
                for (i, child) in n.children.iter_mut().enumerate() {
                    child.meta_mut().order = i as u64;
                    child.reorder();
                }
            }
            Node::Inverter(n) => {
                if let Some(child) = n.child.as_mut() {
                    child.meta_mut().order = 0;
                    child.reorder();
                }
            }
            Node::Handler(_) => {}
        }
    }

    /// Deterministic evaluation order over a layer's children: descending
    /// priority, ascending `order` (§3 invariant, §4.5).
    pub fn eval_order(children: &[Node]) -> Vec<usize> {
        let mut idxs: Vec<usize> = (0..children.len()).collect();
        idxs.sort_by(|&a, &b| {
            children[b]
                .priority()
                .cmp(&children[a].priority())
                .then(children[a].order().cmp(&children[b].order()))
        });
        idxs
    }

    /// Fresh, from-scratch evaluation (§4.1 per-kind algorithms).
    pub fn execute(&mut self, session: &mut Session) -> Status {
        let status = self.execute_inner(session);
        self.set_status(status);
        tracing::debug!(
            node_id = self.id(),
            kind = ?self.kind(),
            status = ?status,
            process_id = %session.process().id(),
            "node executed"
        );
        status
    }

    fn execute_inner(&mut self, session: &mut Session) -> Status {
        match self {
            Node::Sequence(n) => layer_execute(&mut n.children, LayerRule::Sequence, session),
            Node::Selector(n) => layer_execute(&mut n.children, LayerRule::Selector, session),
            Node::Parallel(n) => parallel_execute(n, session),
            Node::Inverter(n) => match n.child.as_deref_mut() {
                None => Status::Unknown,
                Some(child) => {
                    let st = child.execute(session);
                    st.inverted()
                }
            },
            Node::Handler(n) => handler_execute(n, session),
        }
    }

    /// Resume routing (§4.1 "Resume/Fail routing"). `force` turns the
    /// addressed handler's resumption into an unconditional FAILURE
    /// (§4.1 `fail(path)`) instead of invoking its function.
    pub fn continue_node(&mut self, session: &mut Session, path: &NodePath, force: bool) -> Result<Status, ProcessError> {
        let status = self.continue_inner(session, path, force)?;
        self.set_status(status);
        Ok(status)
    }

    fn continue_inner(&mut self, session: &mut Session, path: &NodePath, force: bool) -> Result<Status, ProcessError> {
        match self {
            Node::Sequence(n) => layer_continue(&mut n.children, LayerRule::Sequence, session, path, force),
            Node::Selector(n) => layer_continue(&mut n.children, LayerRule::Selector, session, path, force),
            Node::Parallel(n) => parallel_continue(n, session, path, force),
            Node::Inverter(n) => {
                let child = n
                    .child
                    .as_deref_mut()
                    .ok_or_else(|| ProcessError::Configuration("Inverter has no child to resume".into()))?;
                let rest = if path.is_root() {
                    NodePath::root()
                } else {
                    let (head, rest) = path.split_first().expect("non-root path has a head segment");
                    if head != child.id() {
                        return Err(ProcessError::Configuration(format!("no child named '{head}'")));
                    }
                    rest
                };
                let st = child.continue_node(session, &rest, force)?;
                Ok(st.inverted())
            }
            Node::Handler(n) => {
                if !path.is_root() {
                    return Err(ProcessError::Configuration(format!(
                        "path '{path}' descends past handler '{}'",
                        n.meta.id
                    )));
                }
                if n.meta.status != Status::Waiting {
                    return Err(ProcessError::Contract(format!(
                        "handler '{}' is not waiting",
                        n.meta.id
                    )));
                }
                Ok(if force {
                    Status::Failure
                } else {
                    handler_invoke(n, session)
                })
            }
        }
    }

    /// §4.1 "cancel() on any node: sets its status to CANCELLED,
    /// recursively cancels all children, returns CANCELLED. No handler
    /// function is invoked."
    pub fn cancel(&mut self) -> Status {
        match self {
            Node::Sequence(n) | Node::Selector(n) => {
                for child in n.children.iter_mut() {
                    child.cancel();
                }
            }
            Node::Parallel(n) => {
                for child in n.children.iter_mut() {
                    child.cancel();
                }
            }
            Node::Inverter(n) => {
                if let Some(child) = n.child.as_deref_mut() {
                    child.cancel();
                }
            }
            Node::Handler(_) => {}
        }
        self.set_status(Status::Cancelled);
        Status::Cancelled
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LayerRule {
    Sequence,
    Selector,
}

fn layer_execute(children: &mut [Node], rule: LayerRule, session: &mut Session) -> Status {
    let order = Node::eval_order(children);
    for idx in order {
        if !children[idx].conditions_hold(session.process()) {
            continue;
        }
        let st = children[idx].execute(session);
        match outcome(rule, st) {
            Outcome::Continue => continue,
            Outcome::Return(status) => return status,
        }
    }
    match rule {
        LayerRule::Sequence => Status::Success,
        LayerRule::Selector => Status::Failure,
    }
}

enum Outcome {
    Continue,
    Return(Status),
}

fn outcome(rule: LayerRule, status: Status) -> Outcome {
    match (rule, status) {
        (LayerRule::Sequence, Status::Success) => Outcome::Continue,
        (LayerRule::Sequence, Status::Failure) => Outcome::Return(Status::Failure),
        (LayerRule::Selector, Status::Failure) => Outcome::Continue,
        (LayerRule::Selector, Status::Success) => Outcome::Return(Status::Success),
        (_, Status::Waiting) => Outcome::Return(Status::Waiting),
        (_, Status::Cancelled) => Outcome::Return(Status::Cancelled),
        (_, Status::Unknown) => Outcome::Return(Status::Unknown),
    }
}

fn layer_continue(
    children: &mut [Node],
    rule: LayerRule,
    session: &mut Session,
    path: &NodePath,
    force: bool,
) -> Result<Status, ProcessError> {
    let order = Node::eval_order(children);

    let resume_pos = if path.is_root() {
        order
            .iter()
            .position(|&i| children[i].status() == Status::Waiting)
            .ok_or_else(|| ProcessError::Contract("no waiting child to resume".into()))?
    } else {
        let (head, _) = path.split_first().expect("non-root path has a head segment");
        order
            .iter()
            .position(|&i| children[i].id() == head)
            .ok_or_else(|| ProcessError::Configuration(format!("no child named '{head}'")))?
    };

    let idx = order[resume_pos];
    let rest = if path.is_root() {
        NodePath::root()
    } else {
        path.split_first().unwrap().1
    };
    let resumed_status = children[idx].continue_node(session, &rest, force)?;

    match outcome(rule, resumed_status) {
        Outcome::Return(status) => return Ok(status),
        Outcome::Continue => {}
    }

    for &idx in &order[resume_pos + 1..] {
        if !children[idx].conditions_hold(session.process()) {
            continue;
        }
        let st = children[idx].execute(session);
        match outcome(rule, st) {
            Outcome::Continue => continue,
            Outcome::Return(status) => return Ok(status),
        }
    }
    Ok(match rule {
        LayerRule::Sequence => Status::Success,
        LayerRule::Selector => Status::Failure,
    })
}

fn parallel_execute(n: &mut ParallelNode, session: &mut Session) -> Status {
    let order = Node::eval_order(&n.children);
    let mut success = 0usize;
    let mut failure = 0usize;
    let mut waiting = 0usize;
    for idx in order {
        if !n.children[idx].conditions_hold(session.process()) {
            continue;
        }
        let st = n.children[idx].execute(session);
        match st {
            Status::Cancelled => {
                for child in n.children.iter_mut() {
                    child.cancel();
                }
                return Status::Cancelled;
            }
            Status::Success => success += 1,
            Status::Failure => failure += 1,
            Status::Waiting => waiting += 1,
            Status::Unknown => {}
        }
    }
    parallel_aggregate(n, success, failure, waiting)
}

fn parallel_continue(
    n: &mut ParallelNode,
    session: &mut Session,
    path: &NodePath,
    force: bool,
) -> Result<Status, ProcessError> {
    let order = Node::eval_order(&n.children);
    let idx = if path.is_root() {
        order
            .iter()
            .copied()
            .find(|&i| n.children[i].status() == Status::Waiting)
            .ok_or_else(|| ProcessError::Contract("no waiting child to resume".into()))?
    } else {
        let (head, _) = path.split_first().expect("non-root path has a head segment");
        order
            .iter()
            .copied()
            .find(|&i| n.children[i].id() == head)
            .ok_or_else(|| ProcessError::Configuration(format!("no child named '{head}'")))?
    };
    let rest = if path.is_root() {
        NodePath::root()
    } else {
        path.split_first().unwrap().1
    };
    let resumed = n.children[idx].continue_node(session, &rest, force)?;
    if resumed == Status::Cancelled {
        for child in n.children.iter_mut() {
            child.cancel();
        }
        return Ok(Status::Cancelled);
    }

    let (mut success, mut failure, mut waiting) = (0usize, 0usize, 0usize);
    for child in n.children.iter() {
        match child.status() {
            Status::Success => success += 1,
            Status::Failure => failure += 1,
            Status::Waiting => waiting += 1,
            Status::Unknown | Status::Cancelled => {}
        }
    }
    Ok(parallel_aggregate(n, success, failure, waiting))
}

/// §3 "Parallel thresholds", §8 "Parallel threshold law". `0` on either
/// threshold means "all eligible children" for that round.
fn parallel_aggregate(n: &ParallelNode, success: usize, failure: usize, waiting: usize) -> Status {
    let eligible = success + failure + waiting;
    let success_threshold = if n.success_threshold == 0 { eligible } else { n.success_threshold };
    let failure_threshold = if n.failure_threshold == 0 { eligible } else { n.failure_threshold };

    let success_ok = success >= success_threshold;
    let failure_ok = failure >= failure_threshold;

    if success_ok && failure_ok {
        match n.threshold_mode {
            ThresholdMode::SuccessPriority => Status::Success,
            ThresholdMode::FailurePriority => Status::Failure,
        }
    } else if success_ok {
        Status::Success
    } else if failure_ok {
        Status::Failure
    } else if waiting > 0 {
        Status::Waiting
    } else {
        Status::Failure
    }
}

fn handler_execute(n: &mut HandlerNode, session: &mut Session) -> Status {
    if !all_hold(&n.meta.conditions, session.process()) {
        return Status::Success;
    }
    handler_invoke(n, session)
}

fn handler_invoke(n: &mut HandlerNode, session: &mut Session) -> Status {
    match n.handler.as_ref() {
        Some(h) => h.invoke(session),
        None => {
            tracing::error!(node_id = %n.meta.id, "handler node has no attached function");
            Status::Failure
        }
    }
}
