//! Evaluation session: inputs, status and the controller that talks to the service.

pub mod controller;
mod errors;
mod jobs;
pub mod state;
pub mod types;
pub mod view_model;

pub use controller::EvaluationController;
pub use errors::SessionError;
pub use state::{Effect, SessionEvent, SessionState, SessionStatus};

#[cfg(test)]
mod controller_tests;
