use crate::process::Process;
use crate::registry::{ContextMode, Manager};

/// A single `Execute`/`Resume`/`Fail` call, scoped to one `Process` and the
/// composed root it drives (§4.5).
///
/// Sessions do not outlive the call that created them; the per-node
/// statuses they cause to be written live on the composed root retained by
/// the `Process`, not on the `Session` itself (§3 "Lifecycle and
/// ownership"). The composed root is therefore threaded through
/// `Node::execute`/`continue_node` as a separate `&mut Node`, not stored on
/// `Session`.
pub struct Session<'a> {
    manager: &'a Manager,
    process: &'a mut Process,
    context_mode: ContextMode,
    matched_instances: Vec<String>,
}

impl<'a> Session<'a> {
    pub fn bind(
        manager: &'a Manager,
        process: &'a mut Process,
        context_mode: ContextMode,
        matched_instances: Vec<String>,
    ) -> Self {
        Self {
            manager,
            process,
            context_mode,
            matched_instances,
        }
    }

    pub fn manager(&self) -> &Manager {
        self.manager
    }

    pub fn process(&self) -> &Process {
        self.process
    }

    pub fn process_mut(&mut self) -> &mut Process {
        self.process
    }

    pub fn context_mode(&self) -> ContextMode {
        self.context_mode
    }

    pub fn matched_instances(&self) -> &[String] {
        &self.matched_instances
    }
}
