//! Transaction Executor Adapters
//!
//! - `subprocess`: runs the external executor program per batch
//! - `dry_run`: logs what would be submitted and executes nothing
//! - `report`: parses the executor's stdout summary

pub mod dry_run;
pub mod report;
pub mod subprocess;

pub use dry_run::DryRunExecutor;
pub use subprocess::{SubprocessExecutor, SubprocessExecutorConfig};
