pub mod scheduler;

pub use scheduler::{JobConfig, JobError, JobScheduler};
