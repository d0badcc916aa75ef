use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::controller::EvaluationController;
use super::state::SessionStatus;
use super::types::{
    CalculationMode, EvaluationRequest, EvaluationResult, MetricValue, PlotRef, UploadFile,
};
use super::SessionError;
use crate::config::SessionSettings;
use crate::service::{EvaluationService, ServiceError};

type VariablesReply = Result<Vec<String>, ServiceError>;
type EvaluateReply = Result<EvaluationResult, ServiceError>;

const MAE: &str = "Mean Absolute Error (MAE)";
const WAIT: Duration = Duration::from_secs(5);

/// Service double whose replies can be held back until a test releases them.
#[derive(Default)]
struct GatedService {
    variable_gates: Mutex<HashMap<String, Receiver<VariablesReply>>>,
    evaluate_gate: Mutex<Option<Receiver<EvaluateReply>>>,
    evaluate_calls: AtomicUsize,
    last_request: Mutex<Option<EvaluationRequest>>,
}

impl GatedService {
    fn gate_variables(&self, file_name: &str) -> Sender<VariablesReply> {
        let (tx, rx) = channel();
        self.variable_gates
            .lock()
            .unwrap()
            .insert(file_name.to_string(), rx);
        tx
    }

    fn gate_evaluate(&self) -> Sender<EvaluateReply> {
        let (tx, rx) = channel();
        *self.evaluate_gate.lock().unwrap() = Some(rx);
        tx
    }

    fn evaluate_calls(&self) -> usize {
        self.evaluate_calls.load(Ordering::SeqCst)
    }
}

fn closed_gate() -> ServiceError {
    ServiceError::Transport("gate closed".into())
}

impl EvaluationService for GatedService {
    fn fetch_variables(&self, file: &UploadFile) -> VariablesReply {
        let gate = self.variable_gates.lock().unwrap().remove(file.name());
        match gate {
            Some(rx) => rx.recv().unwrap_or_else(|_| Err(closed_gate())),
            None => Ok(vec!["t2m".into()]),
        }
    }

    fn evaluate(&self, request: &EvaluationRequest) -> EvaluateReply {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        let gate = self.evaluate_gate.lock().unwrap().take();
        match gate {
            Some(rx) => rx.recv().unwrap_or_else(|_| Err(closed_gate())),
            None => Ok(mae_result(0.5)),
        }
    }

    fn fetch_plot(&self, plot: &PlotRef) -> Result<Vec<u8>, ServiceError> {
        Ok(plot.as_str().as_bytes().to_vec())
    }
}

fn mae_result(value: f64) -> EvaluationResult {
    let mut result = EvaluationResult::default();
    result
        .metrics
        .insert(MAE.to_string(), MetricValue::Number(value));
    result.plots.push(PlotRef::new("/static/plots/mae.png"));
    result
}

fn nc(name: &str) -> UploadFile {
    UploadFile::new(name, b"CDF\x01data".to_vec())
}

fn poll_until(
    controller: &mut EvaluationController<GatedService>,
    mut done: impl FnMut(&EvaluationController<GatedService>) -> bool,
) {
    let deadline = Instant::now() + WAIT;
    loop {
        controller.poll_background_jobs();
        if done(controller) {
            return;
        }
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Observation discovered, simulation set, MAE selected.
fn ready_controller() -> EvaluationController<GatedService> {
    let mut controller = EvaluationController::new(GatedService::default());
    controller.set_observation_file(nc("obs.nc")).unwrap();
    controller.set_simulation_file(nc("sim.nc")).unwrap();
    controller.toggle_metric(MAE).unwrap();
    assert!(controller.wait_until_settled(WAIT));
    assert_eq!(controller.status(), SessionStatus::ReadyToSubmit);
    controller
}

#[test]
fn out_of_order_discovery_keeps_newest_catalog() {
    let mut controller = EvaluationController::new(GatedService::default());
    let release_a = controller.service().gate_variables("a.nc");
    let release_b = controller.service().gate_variables("b.nc");

    controller.set_observation_file(nc("a.nc")).unwrap();
    controller.set_observation_file(nc("b.nc")).unwrap();
    assert_eq!(controller.status(), SessionStatus::FetchingVariables);

    release_b.send(Ok(vec!["v_b".into()])).unwrap();
    poll_until(&mut controller, |c| !c.state().variables().is_empty());
    release_a.send(Ok(vec!["v_a".into()])).unwrap();
    assert!(controller.wait_until_settled(WAIT));

    assert_eq!(controller.state().variables(), ["v_b".to_string()]);
    assert_eq!(controller.state().selected_variable(), "v_b");
    assert_eq!(controller.state().observation().unwrap().name(), "b.nc");
}

#[test]
fn submit_and_receive_results() {
    let mut controller = ready_controller();
    controller.set_calculation_mode(CalculationMode::Temporal);

    let id = controller.submit_evaluation().unwrap();
    assert!(controller.wait_until_settled(WAIT));

    assert_eq!(controller.status(), SessionStatus::Ready);
    let result = controller.state().result().unwrap();
    assert_eq!(result.metrics.get(MAE), Some(&MetricValue::Number(0.5)));
    let request = controller
        .service()
        .last_request
        .lock()
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(request.id, id);
    assert_eq!(request.variable, "t2m");
    assert_eq!(request.mode, CalculationMode::Temporal);
    assert_eq!(request.metrics.len(), 1);
}

#[test]
fn missing_inputs_never_reach_the_service() {
    let mut controller = EvaluationController::new(GatedService::default());
    controller.set_simulation_file(nc("sim.nc")).unwrap();
    controller.toggle_metric(MAE).unwrap();

    let err = controller.submit_evaluation().unwrap_err();
    assert!(matches!(err, SessionError::Precondition(_)));
    assert!(!controller.has_pending_work());
    assert_eq!(controller.service().evaluate_calls(), 0);
    assert_eq!(controller.status(), SessionStatus::Idle);
}

#[test]
fn server_error_can_be_retried() {
    let mut controller = ready_controller();
    let release = controller.service().gate_evaluate();
    controller.submit_evaluation().unwrap();
    release
        .send(Err(ServiceError::Status {
            status: 500,
            message: "boom".into(),
        }))
        .unwrap();
    assert!(controller.wait_until_settled(WAIT));

    assert_eq!(controller.status(), SessionStatus::Failed);
    assert_eq!(
        controller.state().evaluation_error(),
        Some(&SessionError::Service {
            status: Some(500),
            message: "boom".into(),
        })
    );
    assert!(controller.state().simulation().is_some());
    assert_eq!(controller.state().metrics().len(), 1);
    assert!(controller.view().error.unwrap().contains("boom"));

    controller.submit_evaluation().unwrap();
    assert!(controller.wait_until_settled(WAIT));
    assert_eq!(controller.status(), SessionStatus::Ready);
    assert!(controller.state().evaluation_error().is_none());
    assert_eq!(controller.service().evaluate_calls(), 2);
}

#[test]
fn second_submit_is_rejected_while_evaluating() {
    let mut controller = ready_controller();
    let release = controller.service().gate_evaluate();
    controller.submit_evaluation().unwrap();

    let err = controller.submit_evaluation().unwrap_err();
    assert!(matches!(err, SessionError::Precondition(_)));
    assert_eq!(controller.status(), SessionStatus::Evaluating);

    release.send(Ok(mae_result(1.0))).unwrap();
    assert!(controller.wait_until_settled(WAIT));
    assert_eq!(controller.service().evaluate_calls(), 1);
    assert_eq!(controller.status(), SessionStatus::Ready);
}

#[test]
fn discovery_failure_keeps_files() {
    let mut controller = EvaluationController::new(GatedService::default());
    let release = controller.service().gate_variables("obs.nc");
    controller.set_simulation_file(nc("sim.nc")).unwrap();
    controller.set_observation_file(nc("obs.nc")).unwrap();
    release
        .send(Err(ServiceError::Transport("connection refused".into())))
        .unwrap();
    assert!(controller.wait_until_settled(WAIT));

    assert!(matches!(
        controller.state().variables_error(),
        Some(SessionError::Transport(_))
    ));
    assert!(controller.state().observation().is_some());
    assert!(controller.state().variables().is_empty());
    assert_eq!(controller.status(), SessionStatus::Idle);
}

#[test]
fn settings_seed_mode_and_metrics() {
    let settings = SessionSettings {
        default_calc_mode: CalculationMode::Spatial,
        default_metrics: vec![MAE.into(), "   ".into()],
    };
    let controller = EvaluationController::with_settings(GatedService::default(), &settings);
    assert_eq!(controller.state().mode(), CalculationMode::Spatial);
    assert_eq!(controller.state().metrics().len(), 1);
}

#[test]
fn repeated_default_metrics_are_selected_once() {
    const RMSE: &str = "Root Mean Square Error (RMSE)";
    let settings = SessionSettings {
        default_calc_mode: CalculationMode::Overall,
        default_metrics: vec![MAE.into(), MAE.into()],
    };
    let controller = EvaluationController::with_settings(GatedService::default(), &settings);
    assert_eq!(controller.state().metrics().len(), 1);

    let settings = SessionSettings {
        default_calc_mode: CalculationMode::Overall,
        default_metrics: vec![MAE.into(), RMSE.into(), MAE.into()],
    };
    let mut controller = EvaluationController::with_settings(GatedService::default(), &settings);
    let ids: Vec<&str> = controller
        .state()
        .metrics()
        .as_slice()
        .iter()
        .map(|id| id.as_str())
        .collect();
    assert_eq!(ids, [MAE, RMSE]);

    assert!(!controller.toggle_metric(MAE).unwrap());
    assert_eq!(controller.state().metrics().len(), 1);
}

#[test]
fn named_mode_rejects_unknown_values() {
    let mut controller = EvaluationController::new(GatedService::default());
    controller.set_calculation_mode_named("Spatial").unwrap();
    assert_eq!(controller.state().mode(), CalculationMode::Spatial);
    assert!(matches!(
        controller.set_calculation_mode_named("hourly"),
        Err(SessionError::Validation(_))
    ));
    assert_eq!(controller.state().mode(), CalculationMode::Spatial);
}

#[test]
fn fetch_plot_goes_through_the_service() {
    let controller = EvaluationController::new(GatedService::default());
    let bytes = controller
        .fetch_plot(&PlotRef::new("/static/plots/mae.png"))
        .unwrap();
    assert_eq!(bytes, b"/static/plots/mae.png");
}
