//! Pipeline driver: turns FASTA inputs into a workflow engine run.

mod config;
mod driver;
mod engine;
mod error;
mod inputs;
mod lock;

pub use config::{annotation_target, DriverConfig, InvalidInputPolicy, Sample, SlurmOptions};
pub use driver::PipelineDriver;
pub use engine::SnakemakeEngine;
pub use inputs::absolutize;
