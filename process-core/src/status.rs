use serde::{Deserialize, Serialize};

/// Outcome of evaluating a node (or a whole composed tree).
///
/// `Success`, `Failure`, and `Cancelled` are terminal for the node that
/// produced them; `Waiting` is suspended and requires an external
/// `resume`/`fail`/`cancel` to progress; `Unknown` is the pre-execution
/// state and never escapes a single evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Unknown,
    Success,
    Failure,
    Waiting,
    Cancelled,
}

impl Status {
    /// `Success`, `Failure`, and `Cancelled` are terminal within an execution;
    /// `Waiting` is suspended and `Unknown` is the initial state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Failure | Status::Cancelled)
    }

    pub fn is_waiting(self) -> bool {
        matches!(self, Status::Waiting)
    }

    pub fn is_cancelled(self) -> bool {
        matches!(self, Status::Cancelled)
    }

    /// `inv(SUCCESS)=FAILURE`, `inv(FAILURE)=SUCCESS`, `inv(WAITING)=WAITING`,
    /// `inv(CANCELLED)=CANCELLED`. `Unknown` inverts to itself — an Inverter
    /// with no child never reaches this (see `LayerNode::execute`).
    pub fn inverted(self) -> Status {
        match self {
            Status::Success => Status::Failure,
            Status::Failure => Status::Success,
            other => other,
        }
    }
}

/// Totally ordered execution priority. Higher priority runs first within a
/// layer; ties break on ascending insertion order (`Node::order`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Background,
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverter_law() {
        assert_eq!(Status::Success.inverted(), Status::Failure);
        assert_eq!(Status::Failure.inverted(), Status::Success);
        assert_eq!(Status::Waiting.inverted(), Status::Waiting);
        assert_eq!(Status::Cancelled.inverted(), Status::Cancelled);
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert!(Priority::Low > Priority::Background);
    }

    #[test]
    fn default_priority_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
