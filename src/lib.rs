pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod progress;
pub mod report;
pub mod selector;
pub mod util;

pub use error::SqueezeError;
pub use selector::{RunResult, RunStatus, TargetSizeSelector};
