//! STACKFLOW Runtime
//!
//! Runs the stack transformation: folds matching flows over every
//! scheduled component, materializes generated fields and enforces that
//! the finished stack is concrete and driver-resolvable.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod generate;
pub mod monitor;
pub mod pipeline;
pub mod resources;

pub use engine::{EngineConfig, StackEngine};
pub use error::{BuildError, IncompleteComponent};
pub use generate::{GeneratedFieldError, Materializer, DEFAULT_PLACEHOLDER};
pub use monitor::{Metrics, NoProgress, ProgressSink};
pub use pipeline::{FlowRun, PipelineRunner};
pub use resources::{drivers_in_use, merged_resources, resources_for_driver, strip_meta, DriverResource};
