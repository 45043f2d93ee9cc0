//! A hierarchical, behavior-tree-style execution engine with multi-layer
//! configuration merging, deterministic cooperative scheduling, and
//! external resume/fail/cancel control.
//!
//! A [`process::Process`] is a data-carrying work item; executing it runs a
//! tree of typed [`node::Node`]s (built with [`builder::TreeBuilder`])
//! whose leaves are handler functions. The same process type can be
//! configured by up to four layers — a global tree, per-instance trees
//! registered in a [`registry::Manager`], and a process's own `processing()`
//! and `WithProcessing()` hooks — composed at execution time by the
//! [`merge`] engine.

pub mod builder;
pub mod condition;
pub mod data;
pub mod error;
pub mod handler;
pub mod merge;
pub mod node;
pub mod path;
pub mod policy;
pub mod process;
pub mod registry;
pub mod session;
pub mod status;

pub use builder::{LayerBuilder, TreeBuilder};
pub use condition::Condition;
pub use data::DataStore;
pub use error::{ProcessError, ProcessResult};
pub use handler::HandlerFn;
pub use node::{Node, NodeKind, ThresholdMode};
pub use path::NodePath;
pub use policy::NodeUpdatePolicy;
pub use process::Process;
pub use registry::{ContextMode, Manager};
pub use session::Session;
pub use status::{Priority, Status};
