mod ids;
pub use ids::{ExecutorId, FrameworkId, NodeId, OfferId, TaskId};

mod resources;
pub use resources::{CPUS, MEM, ResourceDemand, Resources};

mod offer;
pub use offer::ResourceOffer;

mod filters;
pub use filters::Filters;

mod task_state;
pub use task_state::TaskState;

mod task_status;
pub use task_status::TaskStatus;

mod task;
pub use task::{ExecutorInfo, TaskAssignment, TaskDescriptor};

mod execution;
pub use execution::ExecutionResult;

/// Position of a command in the work queue.
///
/// A retried task gets a fresh [`TaskId`] but keeps the work unit it executes.
pub type WorkUnit = usize;
