use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::data::DataStore;
use crate::error::{ProcessError, ProcessResult};
use crate::merge;
use crate::node::Node;
use crate::path::NodePath;
use crate::registry::{ContextMode, Manager};
use crate::session::Session;
use crate::status::Status;

/// A subtree constructor attached to a `Process` instance: `processing()`
/// supplies the type's defaults, `WithProcessing()` supplies a per-instance
/// local override merged on top of it (§3, §4.4). Both are plain closures
/// rather than a generic trait method — the source's virtual-method
/// override is expressed here as a fixed composition order instead (§9).
pub type ProcessingHook = Arc<dyn Fn() -> Node + Send + Sync>;

/// What a `Process` retains between `Execute` and a later `Resume`/`Fail`/
/// `Cancel` (§3 "Lifecycle and ownership": "A Process exclusively owns its
/// cached composed root during and after its first execution").
enum ExecState {
    /// `Execute` has never been called.
    Fresh,
    /// Suspended on a `Waiting` status; the composed root and the manager
    /// binding used to build it are retained so `Resume`/`Fail` can address
    /// it without the caller supplying a manager again.
    Suspended {
        manager: Arc<Manager>,
        context_mode: ContextMode,
        matched_instances: Vec<String>,
        root: Node,
    },
    /// A terminal status has been cached; further `Execute` calls return it
    /// unchanged (§3 invariant, §4.4 step 1).
    Terminated(Status),
}

/// A stateful work item (§3, §4.4): owns a keyed data store, drives a
/// composed tree through `Execute`/`Resume`/`Fail`/`Cancel`, and caches its
/// terminal result.
pub struct Process {
    id: String,
    process_type: String,
    created_at: DateTime<Utc>,
    data: DataStore,
    processing_hook: Option<ProcessingHook>,
    with_processing_hook: Option<ProcessingHook>,
    exec: ExecState,
}

impl Process {
    pub fn new(process_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            process_type: process_type.into(),
            created_at: Utc::now(),
            data: DataStore::new(),
            processing_hook: None,
            with_processing_hook: None,
            exec: ExecState::Fresh,
        }
    }

    /// Attaches the `processing()` hook: the default subtree this process
    /// type contributes on top of whatever the registry composed (§4.4
    /// step 3).
    pub fn processing(mut self, hook: impl Fn() -> Node + Send + Sync + 'static) -> Self {
        self.processing_hook = Some(Arc::new(hook));
        self
    }

    /// Attaches the `WithProcessing()` hook: a local override merged after
    /// `processing()`, the highest-precedence layer (§4.4 step 3).
    pub fn with_processing(mut self, hook: impl Fn() -> Node + Send + Sync + 'static) -> Self {
        self.with_processing_hook = Some(Arc::new(hook));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn process_type(&self) -> &str {
        &self.process_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// §3 "isExecuted": true once `Execute` has run at least once,
    /// regardless of whether it's currently waiting or has terminated.
    pub fn is_executed(&self) -> bool {
        !matches!(self.exec, ExecState::Fresh)
    }

    /// §3 "isCompleted": true once a terminal status has been cached.
    pub fn is_completed(&self) -> bool {
        matches!(self.exec, ExecState::Terminated(_))
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.exec, ExecState::Suspended { .. })
    }

    /// §3 "isCancelled".
    pub fn is_cancelled(&self) -> bool {
        matches!(self.exec, ExecState::Terminated(Status::Cancelled))
    }

    /// §3 "cachedResult": `Some` once a terminal status has been recorded.
    pub fn cached_result(&self) -> Option<Status> {
        match self.exec {
            ExecState::Terminated(status) => Some(status),
            _ => None,
        }
    }

    pub fn set_data<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.data.set(key, value);
    }

    /// §4.4: "`GetData<T>(key)` throws on missing key or type mismatch."
    pub fn get_data<T: Clone + Send + Sync + 'static>(&self, key: &str) -> ProcessResult<T> {
        self.data.get(key)
    }

    /// §4.4: "`TryGetData<T>(key, out v)` returns false on either."
    pub fn try_get_data<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.data.try_get(key)
    }

    /// §4.4 `Execute`. Composes global → matched instances (via `manager`,
    /// according to `context_mode`) → `processing()` → `WithProcessing()`,
    /// reorders the result, and runs it. Returns the cached result without
    /// re-running anything once a terminal status exists (step 1).
    ///
    /// Calling `Execute` again while `Waiting` is a contract violation —
    /// the caller must route through `resume`/`fail`/`cancel` instead; the
    /// source spec doesn't say so explicitly, but treating a stray Execute
    /// as a silent restart would violate "executes its composed tree at
    /// most once" (§3 invariant), so we reject it (see `DESIGN.md`).
    pub fn execute(
        &mut self,
        manager: &Arc<Manager>,
        context_mode: ContextMode,
        instances: &[String],
    ) -> ProcessResult<Status> {
        match &self.exec {
            ExecState::Terminated(status) => return Ok(*status),
            ExecState::Suspended { .. } => {
                return Err(ProcessError::Contract(
                    "execute called while process is waiting; use resume/fail/cancel".into(),
                ))
            }
            ExecState::Fresh => {}
        }

        let (mut root, matched) = manager.get_root_node(&self.process_type, context_mode, instances);
        if let Some(hook) = self.processing_hook.clone() {
            merge::merge_root(&mut root, hook());
        }
        if let Some(hook) = self.with_processing_hook.clone() {
            merge::merge_root(&mut root, hook());
        }
        root.reorder();

        let status = {
            let mut session = Session::bind(manager, self, context_mode, matched.clone());
            root.execute(&mut session)
        };

        self.exec = if status.is_terminal() {
            ExecState::Terminated(status)
        } else {
            ExecState::Suspended {
                manager: Arc::clone(manager),
                context_mode,
                matched_instances: matched,
                root,
            }
        };
        Ok(status)
    }

    /// §4.4 `Resume`: re-invokes the `Waiting` handler addressed by `path`
    /// (or, if `path` is root, the first `Waiting` descendant) and
    /// recomputes upward.
    pub fn resume(&mut self, path: impl Into<NodePath>) -> ProcessResult<Status> {
        self.continue_waiting(path.into(), false)
    }

    /// §4.4 `Fail`: as `resume`, but forces the addressed handler straight
    /// to `Failure` without invoking its function.
    pub fn fail(&mut self, path: impl Into<NodePath>) -> ProcessResult<Status> {
        self.continue_waiting(path.into(), true)
    }

    fn continue_waiting(&mut self, path: NodePath, force: bool) -> ProcessResult<Status> {
        let (manager, context_mode, matched_instances, mut root) =
            match std::mem::replace(&mut self.exec, ExecState::Fresh) {
                ExecState::Suspended { manager, context_mode, matched_instances, root } => {
                    (manager, context_mode, matched_instances, root)
                }
                other => {
                    self.exec = other;
                    return Err(ProcessError::Contract(
                        "resume/fail called while process is not waiting".into(),
                    ));
                }
            };

        let result = {
            let mut session = Session::bind(&manager, self, context_mode, matched_instances.clone());
            root.continue_node(&mut session, &path, force)
        };

        match result {
            Ok(status) => {
                self.exec = if status.is_terminal() {
                    ExecState::Terminated(status)
                } else {
                    ExecState::Suspended { manager, context_mode, matched_instances, root }
                };
                Ok(status)
            }
            Err(err) => {
                // Contract says a failed resume/fail must not mutate the
                // process (§4.4 "Failure semantics"); restore the waiting
                // state exactly as it was.
                self.exec = ExecState::Suspended { manager, context_mode, matched_instances, root };
                Err(err)
            }
        }
    }

    /// §4.4 `Cancel`: valid only once `Execute` has run at least once;
    /// unconditionally transitions to `Cancelled`, cancelling any retained
    /// subtree without invoking handler functions (§4.1 `cancel()`).
    pub fn cancel(&mut self) -> ProcessResult<Status> {
        if matches!(self.exec, ExecState::Fresh) {
            return Err(ProcessError::Contract(
                "cancel called before the process has ever been executed".into(),
            ));
        }
        if let ExecState::Suspended { mut root, .. } =
            std::mem::replace(&mut self.exec, ExecState::Terminated(Status::Cancelled))
        {
            root.cancel();
        }
        Ok(Status::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use crate::handler::HandlerFn;
    use crate::node::ThresholdMode;
    use crate::policy::NodeUpdatePolicy;

    fn manager_with_sequence(process_type: &str, handler_status: Status) -> Arc<Manager> {
        let manager = Manager::new();
        let tree = TreeBuilder::new()
            .sequence(process_type, NodeUpdatePolicy::NONE, crate::status::Priority::Normal, vec![], |b| {
                b.handler(
                    "h",
                    NodeUpdatePolicy::NONE,
                    crate::status::Priority::Normal,
                    vec![],
                    HandlerFn::new("h", move |_| handler_status),
                )
            })
            .build()
            .unwrap();
        manager.register_tree(process_type, None, tree).unwrap();
        Arc::new(manager)
    }

    #[test]
    fn execute_caches_terminal_result() {
        let manager = manager_with_sequence("demo", Status::Success);
        let mut process = Process::new("demo");
        let first = process.execute(&manager, ContextMode::Global, &[]).unwrap();
        assert_eq!(first, Status::Success);
        assert!(process.is_completed());
        let second = process.execute(&manager, ContextMode::Global, &[]).unwrap();
        assert_eq!(second, Status::Success);
    }

    #[test]
    fn execute_while_waiting_is_a_contract_violation() {
        let manager = manager_with_sequence("demo", Status::Waiting);
        let mut process = Process::new("demo");
        assert_eq!(process.execute(&manager, ContextMode::Global, &[]).unwrap(), Status::Waiting);
        assert!(process.execute(&manager, ContextMode::Global, &[]).is_err());
    }

    #[test]
    fn resume_requires_waiting_state() {
        let manager = manager_with_sequence("demo", Status::Success);
        let mut process = Process::new("demo");
        process.execute(&manager, ContextMode::Global, &[]).unwrap();
        assert!(process.resume(NodePath::root()).is_err());
    }

    #[test]
    fn cancel_requires_prior_execute() {
        let mut process = Process::new("demo");
        assert!(process.cancel().is_err());
    }

    #[test]
    fn cancel_after_execute_is_sticky() {
        let manager = manager_with_sequence("demo", Status::Waiting);
        let mut process = Process::new("demo");
        process.execute(&manager, ContextMode::Global, &[]).unwrap();
        assert_eq!(process.cancel().unwrap(), Status::Cancelled);
        assert!(process.is_cancelled());
    }

    #[test]
    fn data_round_trips_and_rejects_bad_access() {
        let mut process = Process::new("demo");
        process.set_data("count", 7i64);
        assert_eq!(process.get_data::<i64>("count").unwrap(), 7);
        assert!(process.get_data::<String>("count").is_err());
        assert!(process.get_data::<i64>("missing").is_err());
    }

    #[test]
    fn with_processing_overrides_processing_which_overrides_registry() {
        let manager = Manager::new();
        let global = TreeBuilder::new()
            .sequence("demo", NodeUpdatePolicy::NONE, crate::status::Priority::Normal, vec![], |b| {
                b.handler(
                    "slot",
                    NodeUpdatePolicy::NONE,
                    crate::status::Priority::Normal,
                    vec![],
                    HandlerFn::new("Global", |_| Status::Success),
                )
            })
            .build()
            .unwrap();
        manager.register_tree("demo", None, global).unwrap();
        let manager = Arc::new(manager);

        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log2 = log.clone();
        let log3 = log.clone();
        let mut process = Process::new("demo")
            .processing(move || {
                let log2 = log2.clone();
                TreeBuilder::new()
                    .sequence("demo", NodeUpdatePolicy::NONE, crate::status::Priority::Normal, vec![], |b| {
                        b.handler(
                            "slot",
                            NodeUpdatePolicy::OVERRIDE_HANDLER,
                            crate::status::Priority::Normal,
                            vec![],
                            HandlerFn::new("processing", move |_| {
                                log2.lock().unwrap().push("processing");
                                Status::Success
                            }),
                        )
                    })
                    .build()
                    .unwrap()
            })
            .with_processing(move || {
                let log3 = log3.clone();
                TreeBuilder::new()
                    .sequence("demo", NodeUpdatePolicy::NONE, crate::status::Priority::Normal, vec![], |b| {
                        b.handler(
                            "slot",
                            NodeUpdatePolicy::OVERRIDE_HANDLER,
                            crate::status::Priority::Normal,
                            vec![],
                            HandlerFn::new("WithProcessing", move |_| {
                                log3.lock().unwrap().push("WithProcessing");
                                Status::Success
                            }),
                        )
                    })
                    .build()
                    .unwrap()
            });

        let status = process.execute(&manager, ContextMode::Global, &[]).unwrap();
        assert_eq!(status, Status::Success);
        assert_eq!(*log.lock().unwrap(), vec!["WithProcessing"]);
        let _ = ThresholdMode::SuccessPriority;
    }
}
