use std::sync::Arc;
use std::time::{Duration, Instant};

use super::jobs::{JobMessage, SessionJobs};
use super::state::{SessionEvent, SessionState, SessionStatus};
use super::types::{CalculationMode, MetricId, PlotRef, UploadFile};
use super::view_model::{self, SessionView};
use super::SessionError;
use crate::config::SessionSettings;
use crate::service::EvaluationService;

/// Owns one evaluation session and mediates every call to the Evaluation Service.
///
/// Operations return as soon as the state has been updated. Network calls run on
/// worker threads; call [`poll_background_jobs`](Self::poll_background_jobs) from
/// the event loop to apply their results.
pub struct EvaluationController<S: EvaluationService> {
    state: SessionState,
    jobs: SessionJobs<S>,
}

impl<S: EvaluationService> EvaluationController<S> {
    pub fn new(service: S) -> Self {
        Self::from_shared(Arc::new(service), CalculationMode::default())
    }

    /// Start a session with the configured defaults applied.
    ///
    /// Invalid default metric names are skipped with a warning. A name listed
    /// more than once is selected once.
    pub fn with_settings(service: S, settings: &SessionSettings) -> Self {
        let mut controller = Self::from_shared(Arc::new(service), settings.default_calc_mode);
        for name in &settings.default_metrics {
            if let Err(err) = controller.select_metric(name) {
                tracing::warn!("Ignoring default metric '{name}': {err}");
            }
        }
        controller
    }

    /// Start a session on a service shared with other owners.
    pub fn from_shared(service: Arc<S>, mode: CalculationMode) -> Self {
        Self {
            state: SessionState::new(mode),
            jobs: SessionJobs::new(service),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn service(&self) -> &S {
        self.jobs.service()
    }

    /// Snapshot for rendering.
    pub fn view(&self) -> SessionView {
        view_model::session_view(&self.state)
    }

    /// Store the observation file and start variable discovery for it.
    pub fn set_observation_file(&mut self, file: UploadFile) -> Result<(), SessionError> {
        tracing::info!(file = file.name(), bytes = file.len(), "Observation file set");
        self.dispatch(SessionEvent::ObservationFileSet(file))
    }

    pub fn set_simulation_file(&mut self, file: UploadFile) -> Result<(), SessionError> {
        tracing::info!(file = file.name(), bytes = file.len(), "Simulation file set");
        self.dispatch(SessionEvent::SimulationFileSet(file))
    }

    /// Flip a metric in or out of the selection. Returns whether it is now selected.
    pub fn toggle_metric(&mut self, id: &str) -> Result<bool, SessionError> {
        let id = MetricId::new(id)?;
        self.dispatch(SessionEvent::MetricToggled(id.clone()))?;
        Ok(self.state.metrics().contains(&id))
    }

    /// Add a metric unless it is already selected.
    fn select_metric(&mut self, id: &str) -> Result<(), SessionError> {
        let id = MetricId::new(id)?;
        if self.state.metrics().contains(&id) {
            return Ok(());
        }
        self.dispatch(SessionEvent::MetricToggled(id))
    }

    pub fn set_calculation_mode(&mut self, mode: CalculationMode) {
        match self.state.dispatch(SessionEvent::CalculationModeChanged(mode)) {
            Ok(None) => tracing::debug!(%mode, "Calculation mode set"),
            Ok(Some(effect)) => self.jobs.run(effect),
            Err(err) => tracing::warn!("Calculation mode not changed: {err}"),
        }
    }

    /// Set the mode from its name; unknown names are a `Validation` error.
    pub fn set_calculation_mode_named(&mut self, name: &str) -> Result<(), SessionError> {
        let mode = name.parse::<CalculationMode>()?;
        self.set_calculation_mode(mode);
        Ok(())
    }

    pub fn select_variable(&mut self, name: &str) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::VariableSelected(name.to_string()))
    }

    /// Submit the current inputs. Returns the submission id.
    ///
    /// Fails with `Precondition` and issues no request when inputs are missing
    /// or an evaluation is already running.
    pub fn submit_evaluation(&mut self) -> Result<u64, SessionError> {
        if let Err(err) = self.dispatch(SessionEvent::SubmitEvaluation) {
            tracing::warn!("Evaluation not submitted: {err}");
            return Err(err);
        }
        let id = self.state.in_flight_request().unwrap_or_default();
        tracing::info!(
            id,
            metrics = self.state.metrics().len(),
            mode = %self.state.mode(),
            variable = self.state.selected_variable(),
            "Evaluation submitted"
        );
        Ok(id)
    }

    /// True while any started service call has not reported back.
    pub fn has_pending_work(&self) -> bool {
        self.jobs.outstanding() > 0
    }

    /// Apply every finished background result. Returns how many were received.
    pub fn poll_background_jobs(&mut self) -> usize {
        let mut received = 0;
        while let Some(message) = self.jobs.try_recv() {
            self.apply_job_message(message);
            received += 1;
        }
        received
    }

    /// Block until all background calls have reported back or `timeout` passes.
    ///
    /// Returns `false` on timeout. Intended for headless callers.
    pub fn wait_until_settled(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.poll_background_jobs();
        while self.has_pending_work() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if let Some(message) = self.jobs.recv_timeout(deadline - now) {
                self.apply_job_message(message);
            }
        }
        true
    }

    /// Download a plot image from the service. Blocks the caller.
    pub fn fetch_plot(&self, plot: &PlotRef) -> Result<Vec<u8>, SessionError> {
        self.jobs.service().fetch_plot(plot).map_err(SessionError::from)
    }

    fn dispatch(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        if let Some(effect) = self.state.dispatch(event)? {
            self.jobs.run(effect);
        }
        Ok(())
    }

    fn apply_job_message(&mut self, message: JobMessage) {
        let event = match message {
            JobMessage::VariablesFetched { token, result } => match result {
                Ok(variables) => {
                    if variables.is_empty() {
                        tracing::warn!(token, "Observation file lists no variables");
                    }
                    SessionEvent::VariablesReceived { token, variables }
                }
                Err(err) => SessionEvent::VariablesFetchFailed {
                    token,
                    error: err.into(),
                },
            },
            JobMessage::EvaluationFinished { id, result } => match result {
                Ok(result) => SessionEvent::EvaluationSucceeded { id, result },
                Err(err) => SessionEvent::EvaluationFailed {
                    id,
                    error: err.into(),
                },
            },
        };
        match self.state.dispatch(event) {
            Ok(_) => self.log_outcome(),
            Err(SessionError::StaleResponseDiscarded { token }) => {
                tracing::debug!(token, "Discarded superseded service response");
            }
            Err(err) => tracing::warn!("Service response rejected: {err}"),
        }
    }

    fn log_outcome(&self) {
        match self.state.status() {
            SessionStatus::Ready => {
                if let Some(result) = self.state.result() {
                    tracing::info!(
                        metrics = result.metrics.len(),
                        plots = result.plots.len(),
                        "Evaluation finished"
                    );
                }
            }
            SessionStatus::Failed => {
                if let Some(err) = self.state.evaluation_error() {
                    tracing::warn!("Evaluation failed: {err}");
                }
            }
            _ => {
                if let Some(err) = self.state.variables_error() {
                    tracing::warn!("Variable discovery failed: {err}");
                } else if self.state.pending_variables_token().is_none() {
                    tracing::info!(count = self.state.variables().len(), "Variables loaded");
                }
            }
        }
    }
}
