pub mod config;
pub mod deploy_args;
pub mod env;
pub mod error;
pub mod helm;
pub mod image_pull;
pub mod kubectl;
pub mod log;
pub mod pipeline;
pub mod runner;
pub mod settings;
pub mod shell;

pub use error::{Error, Result};
pub use pipeline::{Pipeline, RunReport, Step, StepStatus};
