//! Client side of the remote Evaluation Service.
//!
//! The service parses NetCDF files, computes metrics and renders plots. This
//! module only knows its HTTP contract: `POST /get-variables`, `POST /evaluate`
//! and plot image downloads relative to the service origin.

mod http;
pub mod multipart;
pub(crate) mod wire;

pub use http::HttpEvaluationService;

use crate::session::types::{EvaluationRequest, EvaluationResult, PlotRef, UploadFile};

/// Failures reported by an [`EvaluationService`] call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Operations the session needs from the Evaluation Service.
///
/// Calls block; the session controller runs them on worker threads.
pub trait EvaluationService: Send + Sync + 'static {
    /// List the variables available in an observation file.
    fn fetch_variables(&self, file: &UploadFile) -> Result<Vec<String>, ServiceError>;

    /// Compute the requested metrics and plots.
    fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResult, ServiceError>;

    /// Download one server-rendered plot image.
    fn fetch_plot(&self, plot: &PlotRef) -> Result<Vec<u8>, ServiceError>;
}
