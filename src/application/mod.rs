pub mod orchestrator;

#[cfg(test)]
pub use orchestrator::NoStatus;
pub use orchestrator::{Orchestrator, StatusSink};
