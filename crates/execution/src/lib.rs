//! Execution layer - message protocol, links, scheduling and workers.

#![warn(missing_docs)]

pub mod message;
pub mod link;
pub mod channel;
pub mod tcp;
pub mod scheduler;
pub mod worker;
pub mod transport;

pub use message::{Message, Tag, Task, TaskResult};
pub use link::{CoordinatorLink, Result, TransportError, WorkerLink};
pub use channel::{cluster, ChannelCoordinator, ChannelWorker};
pub use tcp::{TcpCoordinator, TcpWorker};
pub use scheduler::{DispatchReport, Scheduler, SchedulerConfig, SchedulerError};
pub use worker::{WorkerAgent, WorkerState, WorkerSummary};
pub use transport::{DistributedTransport, EvaluationError, EvaluationTransport, LocalTransport};
