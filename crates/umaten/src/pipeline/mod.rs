pub mod cancel;
pub mod error;
pub mod progress;
pub mod retry;
pub mod runner;

pub use cancel::CancelSignal;
pub use error::{ErrorClass, JobFailure, Stage};
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use retry::{DelayPolicy, NoDelay, RandomDelay};
pub use runner::{Collaborators, PipelineExecutor};
