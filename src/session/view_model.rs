//! Helpers to convert session state into flat view structs for display.

use super::state::{SessionState, SessionStatus};
use super::types::{CalculationMode, MetricId, PlotRef};

/// Everything a front end needs to render the session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionView {
    pub status: SessionStatus,
    pub status_label: &'static str,
    pub can_submit: bool,
    pub simulation_file: Option<String>,
    pub observation_file: Option<String>,
    pub variables: Vec<String>,
    pub selected_variable: String,
    pub metric_options: Vec<MetricOptionView>,
    pub mode: CalculationMode,
    pub mode_options: Vec<CalculationMode>,
    pub results: Vec<MetricRowView>,
    pub plots: Vec<PlotRef>,
    /// Latest failure worth showing, evaluation errors first.
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricOptionView {
    pub id: String,
    pub checked: bool,
    /// False for ids the service is not known to implement.
    pub known: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricRowView {
    pub name: String,
    pub value: String,
}

pub fn session_view(state: &SessionState) -> SessionView {
    let status = state.status();
    SessionView {
        status,
        status_label: status.label(),
        can_submit: state.can_submit(),
        simulation_file: state.simulation().map(|file| file.name().to_string()),
        observation_file: state.observation().map(|file| file.name().to_string()),
        variables: state.variables().to_vec(),
        selected_variable: state.selected_variable().to_string(),
        metric_options: metric_options(state),
        mode: state.mode(),
        mode_options: CalculationMode::ALL.to_vec(),
        results: result_rows(state),
        plots: state
            .result()
            .map(|result| result.plots.clone())
            .unwrap_or_default(),
        error: state
            .evaluation_error()
            .or(state.variables_error())
            .map(ToString::to_string),
    }
}

/// Known metrics in their fixed order, then any custom picks.
fn metric_options(state: &SessionState) -> Vec<MetricOptionView> {
    let selected = state.metrics();
    let mut options: Vec<MetricOptionView> = MetricId::KNOWN
        .iter()
        .map(|id| MetricOptionView {
            id: (*id).to_string(),
            checked: selected.iter().any(|picked| picked.as_str() == *id),
            known: true,
        })
        .collect();
    options.extend(
        selected
            .iter()
            .filter(|id| !id.is_known())
            .map(|id| MetricOptionView {
                id: id.as_str().to_string(),
                checked: true,
                known: false,
            }),
    );
    options
}

fn result_rows(state: &SessionState) -> Vec<MetricRowView> {
    let Some(result) = state.result() else {
        return Vec::new();
    };
    result
        .metrics
        .iter()
        .map(|(name, value)| MetricRowView {
            name: name.clone(),
            value: value.to_string(),
        })
        .collect()
}
