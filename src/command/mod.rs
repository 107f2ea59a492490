//! Command pipeline
//!
//! Converts a validated Intent into executed processes:
//! Intent -> route -> CommandPlan -> build -> ArgumentVectors -> gate

pub mod builder;
pub mod executor;
pub mod router;

pub use builder::{build, ArgumentVector};
pub use executor::{preview, ProcessRunner, RunOptions, SystemRunner};
pub use router::{route, CommandPlan, Operation, PlanStep};
