//! Role of a process in the message-passing topology.

use serde::{Deserialize, Serialize};

/// Which side of the coordinator/worker split a process plays.
///
/// Each component reports the side it plays (`Scheduler::role`,
/// `WorkerAgent::role`) and tags its log spans with it; nothing derives it
/// from a process rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Runs the evolutionary loop and dispatches evaluation tasks
    Coordinator,
    /// Evaluates tasks sent by the coordinator
    Worker,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Coordinator => write!(f, "coordinator"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_log_field() {
        assert_eq!(Role::Coordinator.to_string(), "coordinator");
        assert_eq!(Role::Worker.to_string(), "worker");
    }
}
