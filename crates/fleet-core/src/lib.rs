//! Scheduler side of the fleet framework.
//!
//! The [`Scheduler`] consumes transport callbacks one at a time, keeps the [`TaskRegistry`],
//! and asks the pure [`OfferMatcher`] what to launch against every offer.

pub mod error;
pub use error::CoreError;

pub mod driver;
pub use driver::{DriverError, SchedulerDriver};

pub mod matcher;
pub use matcher::{OfferMatcher, OfferPlan, TaskBinding};

pub mod policy;
pub use policy::RetryPolicy;

pub mod registry;
pub use registry::{StatusOutcome, TaskRecord, TaskRegistry};

pub mod scheduler;
pub use scheduler::{Phase, RunSummary, Scheduler, SchedulerConfig, SchedulerEvent};

pub mod workqueue;
pub use workqueue::{load_work_queue, parse_work_queue};
