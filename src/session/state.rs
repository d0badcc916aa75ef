//! Event-driven state machine for one evaluation workflow.
//!
//! Every input change and every service response is a [`SessionEvent`]. Events
//! that need the network return an [`Effect`]; nothing else may request a call.
//! The session status is derived from the stored fields on demand rather than
//! tracked as a separate flag.

use super::types::{
    CalculationMode, EvaluationRequest, EvaluationResult, MetricId, MetricSelection, UploadFile,
    UploadSlot,
};
use super::SessionError;

/// Coarse session status shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Required inputs are missing.
    Idle,
    /// A variable-discovery request for the observation file is outstanding.
    FetchingVariables,
    /// All inputs are present and an evaluation may be submitted.
    ReadyToSubmit,
    /// An evaluation request is in flight.
    Evaluating,
    /// The last evaluation succeeded and no input has changed since its reply arrived.
    Ready,
    /// The last evaluation failed and no input has changed since its reply arrived.
    Failed,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::FetchingVariables => "Fetching variables",
            Self::ReadyToSubmit => "Ready to evaluate",
            Self::Evaluating => "Evaluating",
            Self::Ready => "Results ready",
            Self::Failed => "Evaluation failed",
        }
    }
}

/// Inputs to the state machine.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    ObservationFileSet(UploadFile),
    SimulationFileSet(UploadFile),
    MetricToggled(MetricId),
    CalculationModeChanged(CalculationMode),
    VariableSelected(String),
    SubmitEvaluation,
    VariablesReceived {
        token: u64,
        variables: Vec<String>,
    },
    VariablesFetchFailed {
        token: u64,
        error: SessionError,
    },
    EvaluationSucceeded {
        id: u64,
        result: EvaluationResult,
    },
    EvaluationFailed {
        id: u64,
        error: SessionError,
    },
}

/// Network work requested by a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Ask the service for the variables in `file`; the answer must carry `token`.
    FetchVariables { token: u64, file: UploadFile },
    /// Submit the snapshot to `/evaluate`.
    Evaluate(EvaluationRequest),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Succeeded,
    Failed,
}

/// All client-side state of one evaluation workflow.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    simulation: Option<UploadFile>,
    observation: Option<UploadFile>,
    variables: Vec<String>,
    selected_variable: String,
    metrics: MetricSelection,
    mode: CalculationMode,
    last_variables_token: u64,
    pending_variables_token: Option<u64>,
    variables_error: Option<SessionError>,
    last_request_id: u64,
    in_flight: Option<u64>,
    result: Option<EvaluationResult>,
    evaluation_error: Option<SessionError>,
    outcome: Option<Outcome>,
}

impl SessionState {
    pub fn new(mode: CalculationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Apply one event. On error the state is left untouched.
    pub fn dispatch(&mut self, event: SessionEvent) -> Result<Option<Effect>, SessionError> {
        match event {
            SessionEvent::ObservationFileSet(file) => self.set_observation(file).map(Some),
            SessionEvent::SimulationFileSet(file) => {
                file.validate(UploadSlot::Simulation)?;
                self.simulation = Some(file);
                self.inputs_changed();
                Ok(None)
            }
            SessionEvent::MetricToggled(id) => {
                self.metrics.toggle(id);
                self.inputs_changed();
                Ok(None)
            }
            SessionEvent::CalculationModeChanged(mode) => {
                if self.mode != mode {
                    self.mode = mode;
                    self.inputs_changed();
                }
                Ok(None)
            }
            SessionEvent::VariableSelected(name) => {
                self.select_variable(name)?;
                Ok(None)
            }
            SessionEvent::SubmitEvaluation => self.submit().map(|req| Some(Effect::Evaluate(req))),
            SessionEvent::VariablesReceived { token, variables } => {
                self.accept_variables_token(token)?;
                self.variables = variables
                    .into_iter()
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect();
                self.selected_variable = self.variables.first().cloned().unwrap_or_default();
                self.variables_error = None;
                Ok(None)
            }
            SessionEvent::VariablesFetchFailed { token, error } => {
                self.accept_variables_token(token)?;
                self.variables.clear();
                self.selected_variable.clear();
                self.variables_error = Some(error);
                Ok(None)
            }
            SessionEvent::EvaluationSucceeded { id, result } => {
                self.accept_evaluation_id(id)?;
                self.result = Some(result);
                self.outcome = Some(Outcome::Succeeded);
                Ok(None)
            }
            SessionEvent::EvaluationFailed { id, error } => {
                self.accept_evaluation_id(id)?;
                self.evaluation_error = Some(error);
                self.outcome = Some(Outcome::Failed);
                Ok(None)
            }
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.in_flight.is_some() {
            return SessionStatus::Evaluating;
        }
        match self.outcome {
            Some(Outcome::Succeeded) => return SessionStatus::Ready,
            Some(Outcome::Failed) => return SessionStatus::Failed,
            None => {}
        }
        if self.pending_variables_token.is_some() {
            SessionStatus::FetchingVariables
        } else if self.is_eligible() {
            SessionStatus::ReadyToSubmit
        } else {
            SessionStatus::Idle
        }
    }

    /// Both files present, at least one metric, and nothing in flight.
    pub fn is_eligible(&self) -> bool {
        self.simulation.is_some()
            && self.observation.is_some()
            && !self.metrics.is_empty()
            && self.in_flight.is_none()
    }

    /// Whether `SubmitEvaluation` would currently be accepted.
    pub fn can_submit(&self) -> bool {
        self.precondition_failure().is_none()
    }

    pub fn simulation(&self) -> Option<&UploadFile> {
        self.simulation.as_ref()
    }

    pub fn observation(&self) -> Option<&UploadFile> {
        self.observation.as_ref()
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn selected_variable(&self) -> &str {
        &self.selected_variable
    }

    pub fn metrics(&self) -> &MetricSelection {
        &self.metrics
    }

    pub fn mode(&self) -> CalculationMode {
        self.mode
    }

    pub fn result(&self) -> Option<&EvaluationResult> {
        self.result.as_ref()
    }

    pub fn evaluation_error(&self) -> Option<&SessionError> {
        self.evaluation_error.as_ref()
    }

    pub fn variables_error(&self) -> Option<&SessionError> {
        self.variables_error.as_ref()
    }

    pub fn pending_variables_token(&self) -> Option<u64> {
        self.pending_variables_token
    }

    pub fn in_flight_request(&self) -> Option<u64> {
        self.in_flight
    }

    fn set_observation(&mut self, file: UploadFile) -> Result<Effect, SessionError> {
        file.validate(UploadSlot::Observation)?;
        self.last_variables_token += 1;
        let token = self.last_variables_token;
        self.observation = Some(file.clone());
        self.variables.clear();
        self.selected_variable.clear();
        self.variables_error = None;
        self.pending_variables_token = Some(token);
        self.inputs_changed();
        Ok(Effect::FetchVariables { token, file })
    }

    fn select_variable(&mut self, name: String) -> Result<(), SessionError> {
        let name = name.trim().to_string();
        if !name.is_empty() && !self.variables.contains(&name) {
            return Err(SessionError::Validation(format!(
                "Variable '{name}' is not in the observation file"
            )));
        }
        if self.selected_variable != name {
            self.selected_variable = name;
            self.inputs_changed();
        }
        Ok(())
    }

    fn submit(&mut self) -> Result<EvaluationRequest, SessionError> {
        if let Some(reason) = self.precondition_failure() {
            return Err(SessionError::Precondition(reason.to_string()));
        }
        let (Some(simulation), Some(observation)) =
            (self.simulation.clone(), self.observation.clone())
        else {
            return Err(SessionError::Precondition("Both files are required".into()));
        };
        self.last_request_id += 1;
        let request = EvaluationRequest {
            id: self.last_request_id,
            simulation,
            observation,
            metrics: self.metrics.as_slice().to_vec(),
            variable: self.selected_variable.clone(),
            mode: self.mode,
        };
        self.in_flight = Some(request.id);
        self.result = None;
        self.evaluation_error = None;
        self.outcome = None;
        Ok(request)
    }

    fn precondition_failure(&self) -> Option<&'static str> {
        if self.in_flight.is_some() {
            return Some("An evaluation is already running");
        }
        if self.simulation.is_none() {
            return Some("Upload a simulation file first");
        }
        if self.observation.is_none() {
            return Some("Upload an observation file first");
        }
        if self.metrics.is_empty() {
            return Some("Select at least one metric");
        }
        if self.pending_variables_token.is_some() {
            return Some("Variables are still being read from the observation file");
        }
        None
    }

    fn accept_variables_token(&mut self, token: u64) -> Result<(), SessionError> {
        if self.pending_variables_token != Some(token) {
            return Err(SessionError::StaleResponseDiscarded { token });
        }
        self.pending_variables_token = None;
        Ok(())
    }

    fn accept_evaluation_id(&mut self, id: u64) -> Result<(), SessionError> {
        if self.in_flight != Some(id) {
            return Err(SessionError::StaleResponseDiscarded { token: id });
        }
        self.in_flight = None;
        Ok(())
    }

    // A finished outcome only describes the inputs it was computed from.
    fn inputs_changed(&mut self) {
        self.outcome = None;
    }
}
