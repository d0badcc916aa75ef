use url::Url;

use super::multipart::{MultipartForm, NETCDF_CONTENT_TYPE};
use super::{EvaluationService, ServiceError, wire};
use crate::config::{ConfigError, ServiceSettings};
use crate::http_client::{self, RetryPolicy};
use crate::session::types::{EvaluationRequest, EvaluationResult, PlotRef, UploadFile};

const VARIABLES_PATH: &str = "get-variables";
const EVALUATE_PATH: &str = "evaluate";

/// Blocking HTTP client for the Evaluation Service.
#[derive(Debug, Clone)]
pub struct HttpEvaluationService {
    base: Url,
    variables_url: Url,
    evaluate_url: Url,
    agent: ureq::Agent,
    retry: RetryPolicy,
    max_response_bytes: usize,
    max_plot_bytes: usize,
}

impl HttpEvaluationService {
    pub fn new(settings: &ServiceSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let base = settings.parsed_base_url()?;
        let join = |path: &str| {
            base.join(path).map_err(|err| ConfigError::InvalidBaseUrl {
                url: settings.base_url.clone(),
                reason: err.to_string(),
            })
        };
        Ok(Self {
            variables_url: join(VARIABLES_PATH)?,
            evaluate_url: join(EVALUATE_PATH)?,
            base,
            agent: http_client::build_agent(settings.timeouts()),
            retry: settings.retry.policy(),
            max_response_bytes: settings.max_response_bytes,
            max_plot_bytes: settings.max_plot_bytes,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL of a plot; origin-relative paths resolve against the service origin.
    pub fn resolve_plot(&self, plot: &PlotRef) -> Result<Url, ServiceError> {
        self.base.join(plot.as_str()).map_err(|err| {
            ServiceError::InvalidResponse(format!("Bad plot reference '{plot}': {err}"))
        })
    }

    fn post_form(&self, url: &Url, form: MultipartForm) -> Result<String, ServiceError> {
        let (content_type, body) = form.finish();
        self.retry.run(
            || {
                let result = self
                    .agent
                    .post(url.as_str())
                    .set("Accept", "application/json")
                    .set("Content-Type", &content_type)
                    .send_bytes(&body);
                let response = self.check_response(result)?;
                http_client::read_capped_text(response, self.max_response_bytes)
                    .map_err(ServiceError::InvalidResponse)
            },
            |err| matches!(err, ServiceError::Transport(_)),
        )
    }

    fn check_response(
        &self,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<ureq::Response, ServiceError> {
        match result {
            Ok(response) if (200..300).contains(&response.status()) => Ok(response),
            Ok(response) => Err(self.status_error(response.status(), response)),
            Err(ureq::Error::Status(code, response)) => Err(self.status_error(code, response)),
            Err(ureq::Error::Transport(transport)) => Err(map_transport(&transport)),
        }
    }

    fn status_error(&self, status: u16, response: ureq::Response) -> ServiceError {
        let body = http_client::read_capped_text(response, self.max_response_bytes)
            .unwrap_or_else(|err| err);
        ServiceError::Status {
            status,
            message: wire::error_message(&body),
        }
    }
}

impl EvaluationService for HttpEvaluationService {
    fn fetch_variables(&self, file: &UploadFile) -> Result<Vec<String>, ServiceError> {
        tracing::debug!(file = file.name(), url = %self.variables_url, "Requesting variable list");
        let form =
            MultipartForm::new().file("file", file.name(), NETCDF_CONTENT_TYPE, file.bytes());
        let body = self.post_form(&self.variables_url, form)?;
        wire::parse_variables_response(&body)
    }

    fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResult, ServiceError> {
        let metrics: Vec<&str> = request.metrics.iter().map(|id| id.as_str()).collect();
        let metrics_json = serde_json::to_string(&metrics)
            .map_err(|err| ServiceError::InvalidResponse(format!("metrics encoding: {err}")))?;
        let mut form = MultipartForm::new()
            .file(
                "simulationFile",
                request.simulation.name(),
                NETCDF_CONTENT_TYPE,
                request.simulation.bytes(),
            )
            .file(
                "observationFile",
                request.observation.name(),
                NETCDF_CONTENT_TYPE,
                request.observation.bytes(),
            )
            .text("metrics", &metrics_json);
        if !request.variable.is_empty() {
            form = form.text("variable", &request.variable);
        }
        let form = form.text("calcMode", request.mode.wire_name());
        tracing::debug!(id = request.id, url = %self.evaluate_url, "Submitting evaluation");
        let body = self.post_form(&self.evaluate_url, form)?;
        wire::parse_evaluate_response(&body)
    }

    fn fetch_plot(&self, plot: &PlotRef) -> Result<Vec<u8>, ServiceError> {
        let url = self.resolve_plot(plot)?;
        let response = self.check_response(self.agent.get(url.as_str()).call())?;
        http_client::read_capped(response, self.max_plot_bytes)
            .map_err(|err| ServiceError::InvalidResponse(format!("plot {plot}: {err}")))
    }
}

fn map_transport(transport: &ureq::Transport) -> ServiceError {
    if http_client::is_timeout(transport) {
        ServiceError::Timeout(transport.to_string())
    } else {
        ServiceError::Transport(transport.to_string())
    }
}
