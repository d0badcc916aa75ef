use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::SessionError;

/// File extensions accepted for NetCDF uploads.
pub const NETCDF_EXTENSIONS: &[&str] = &["nc", "nc4", "netcdf", "cdf"];

/// Which upload slot a file belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UploadSlot {
    Simulation,
    Observation,
}

impl UploadSlot {
    /// Human-readable slot name used in messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Simulation => "simulation",
            Self::Observation => "observation",
        }
    }
}

/// An uploaded file: raw bytes plus the name the user picked.
///
/// Bytes are shared so request snapshots can hold the file without copying it.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    name: String,
    bytes: Arc<[u8]>,
}

impl UploadFile {
    /// Wrap an in-memory blob.
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping its file name.
    pub fn from_path(path: &Path) -> Result<Self, SessionError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SessionError::Validation(format!("{} has no file name", path.display()))
            })?;
        let bytes = std::fs::read(path).map_err(|err| {
            SessionError::Validation(format!("Failed to read {}: {err}", path.display()))
        })?;
        Ok(Self::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check that the file looks like a NetCDF upload for the given slot.
    pub fn validate(&self, slot: UploadSlot) -> Result<(), SessionError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(SessionError::Validation(format!(
                "The {} file has no name",
                slot.label()
            )));
        }
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let is_netcdf = extension
            .as_deref()
            .is_some_and(|ext| NETCDF_EXTENSIONS.contains(&ext));
        if !is_netcdf {
            return Err(SessionError::Validation(format!(
                "The {} file {name} is not a NetCDF (.nc) file",
                slot.label()
            )));
        }
        if self.bytes.is_empty() {
            return Err(SessionError::Validation(format!(
                "The {} file {name} is empty",
                slot.label()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Identifier of an evaluation metric as the service names it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(String);

impl MetricId {
    /// Metrics the Evaluation Service implements out of the box.
    pub const KNOWN: &'static [&'static str] =
        &["Mean Absolute Error (MAE)", "Root Mean Square Error (RMSE)"];

    /// Build an id from user input; blank ids are rejected.
    pub fn new(id: impl AsRef<str>) -> Result<Self, SessionError> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(SessionError::Validation("Metric id is empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        Self::KNOWN.contains(&self.0.as_str())
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique metric ids in the order the user picked them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricSelection {
    ids: Vec<MetricId>,
}

impl MetricSelection {
    /// Add the id if absent, remove it if present. Returns whether it is now selected.
    pub fn toggle(&mut self, id: MetricId) -> bool {
        if let Some(index) = self.ids.iter().position(|existing| existing == &id) {
            self.ids.remove(index);
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    pub fn contains(&self, id: &MetricId) -> bool {
        self.ids.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricId> {
        self.ids.iter()
    }

    pub fn as_slice(&self) -> &[MetricId] {
        &self.ids
    }
}

/// Axis along which metrics are aggregated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationMode {
    #[default]
    Overall,
    Spatial,
    Temporal,
}

impl CalculationMode {
    pub const ALL: [Self; 3] = [Self::Overall, Self::Spatial, Self::Temporal];

    /// Name sent in the `calcMode` form field.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Overall => "overall",
            Self::Spatial => "spatial",
            Self::Temporal => "temporal",
        }
    }
}

impl fmt::Display for CalculationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for CalculationMode {
    type Err = SessionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.wire_name() == lowered)
            .ok_or_else(|| {
                SessionError::Validation(format!(
                    "Unknown calculation mode '{}' (expected overall, spatial or temporal)",
                    value.trim()
                ))
            })
    }
}

/// Immutable snapshot of everything one `/evaluate` call sends.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationRequest {
    /// Submission id, unique and increasing within a session.
    pub id: u64,
    pub simulation: UploadFile,
    pub observation: UploadFile,
    pub metrics: Vec<MetricId>,
    /// Selected variable; empty lets the service pick its default.
    pub variable: String,
    pub mode: CalculationMode,
}

/// Value computed for a single metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    /// Text such as `"Metric not implemented"`.
    Text(String),
    Structured(serde_json::Value),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
            Self::Structured(value) => write!(f, "{value}"),
        }
    }
}

/// Reference to a server-rendered plot image, usually an origin-relative path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlotRef(String);

impl PlotRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observation field coordinates and values echoed back by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationGrid {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// Nested value array as the service sent it (lat x lon, possibly with a time axis).
    pub values: serde_json::Value,
}

/// Outcome of a successful evaluation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationResult {
    pub metrics: BTreeMap<String, MetricValue>,
    pub plots: Vec<PlotRef>,
    pub observation: Option<ObservationGrid>,
}
