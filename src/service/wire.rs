//! JSON shapes exchanged with the Evaluation Service.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::ServiceError;
use crate::session::types::{EvaluationResult, MetricValue, ObservationGrid, PlotRef};

#[derive(Debug, Deserialize)]
struct VariablesResponseWire {
    variables: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateResponseWire {
    #[serde(default)]
    results: BTreeMap<String, MetricValue>,
    plot_url: Option<String>,
    #[serde(default)]
    plot_urls: Vec<String>,
    observation_data: Option<ObservationGrid>,
}

#[derive(Debug, Deserialize)]
struct ErrorBodyWire {
    error: Option<String>,
    message: Option<String>,
}

pub(crate) fn parse_variables_response(body: &str) -> Result<Vec<String>, ServiceError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidResponse("Empty response body".into()));
    }
    let parsed: VariablesResponseWire = serde_json::from_str(trimmed)
        .map_err(|err| ServiceError::InvalidResponse(format!("{err}: {}", excerpt(trimmed))))?;
    Ok(parsed.variables)
}

pub(crate) fn parse_evaluate_response(body: &str) -> Result<EvaluationResult, ServiceError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidResponse("Empty response body".into()));
    }
    let parsed: EvaluateResponseWire = serde_json::from_str(trimmed)
        .map_err(|err| ServiceError::InvalidResponse(format!("{err}: {}", excerpt(trimmed))))?;
    Ok(EvaluationResult {
        metrics: parsed.results,
        plots: normalize_plots(parsed.plot_urls, parsed.plot_url),
        observation: parsed.observation_data,
    })
}

/// Merge the legacy single `plotUrl` into the `plotUrls` list.
///
/// `plotUrls` order is kept, blanks are dropped and the legacy entry is appended
/// only when it is not already listed.
pub(crate) fn normalize_plots(plot_urls: Vec<String>, plot_url: Option<String>) -> Vec<PlotRef> {
    let mut plots: Vec<PlotRef> = Vec::with_capacity(plot_urls.len() + 1);
    for url in plot_urls.into_iter().chain(plot_url) {
        let url = url.trim();
        if url.is_empty() || plots.iter().any(|plot| plot.as_str() == url) {
            continue;
        }
        plots.push(PlotRef::new(url));
    }
    plots
}

/// Pull a readable message out of an error response body.
pub(crate) fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<ErrorBodyWire>(trimmed) {
            if let Some(message) = parsed.error.or(parsed.message) {
                return message;
            }
        }
    }
    if trimmed.is_empty() {
        return "empty response body".into();
    }
    excerpt(trimmed)
}

fn excerpt(text: &str) -> String {
    const MAX_CHARS: usize = 200;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_CHARS).collect();
    cut.push('…');
    cut
}
