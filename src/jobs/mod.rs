//! Background job system
//!
//! Post-commit work (auto-watching repositories for new team members) is
//! queued here and executed by workers outside the team transaction.

mod config;
mod in_memory;
mod registry;
mod worker;


pub use config::JobsConfig;
pub use in_memory::InMemoryJobQueue;
pub use registry::JobRegistry;
pub use worker::{JobWorker, WorkerPool};
