// Response documents returned by the scanning service.
//
// Unknown fields are collected into `extra` maps so that `--json` output
// reproduces what the server sent instead of only the fields modelled here.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// License name shown for components the service could not identify.
pub const UNKNOWN_LICENSE: &str = "UNKNOWN";

/// Analysis state as reported by the single-character `status` code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScanStatus {
    Busy,
    Ready,
    Other(String),
}

impl From<String> for ScanStatus {
    fn from(code: String) -> Self {
        match code.as_str() {
            "B" => ScanStatus::Busy,
            "R" => ScanStatus::Ready,
            _ => ScanStatus::Other(code),
        }
    }
}

impl From<ScanStatus> for String {
    fn from(status: ScanStatus) -> Self {
        match status {
            ScanStatus::Busy => "B".to_string(),
            ScanStatus::Ready => "R".to_string(),
            ScanStatus::Other(code) => code,
        }
    }
}

impl ScanStatus {
    /// Anything except busy is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanStatus::Busy)
    }
}

/// Envelope of upload, result and rescan responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub results: ScanResult,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One snapshot of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub status: ScanStatus,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub sha1sum: Option<String>,
    #[serde(default)]
    pub report_url: Option<String>,
    /// Only meaningful once the status is ready.
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScanResult {
    pub fn is_ready(&self) -> bool {
        self.status == ScanStatus::Ready
    }

    /// Sorted, de-duplicated `lib (version)` labels.
    pub fn component_labels(&self) -> BTreeSet<String> {
        self.components.iter().map(Component::label).collect()
    }

    /// Sorted, de-duplicated license names.
    pub fn license_names(&self) -> BTreeSet<String> {
        self.components
            .iter()
            .map(|c| c.license_name().to_string())
            .collect()
    }

    pub fn vulnerable_components(&self) -> usize {
        self.components.iter().filter(|c| c.is_vulnerable()).count()
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        self.summary.as_ref().and_then(|s| s.verdict.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub verdict: Option<Verdict>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub short: String,
    #[serde(default)]
    pub detailed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A third-party or open source element detected inside an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub lib: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub license: Option<License>,
    #[serde(default)]
    pub vulns: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Component {
    /// Version reduced to its first token, or `None` when absent or blank.
    pub fn normalized_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .map(clean_version)
            .filter(|v| !v.is_empty())
    }

    pub fn license_name(&self) -> &str {
        self.license
            .as_ref()
            .map(|l| l.name.as_str())
            .unwrap_or(UNKNOWN_LICENSE)
    }

    /// True when the service listed any vulnerability for this component.
    pub fn is_vulnerable(&self) -> bool {
        match &self.vulns {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    /// Display label; (lib, normalized version) is the identity for display.
    pub fn label(&self) -> String {
        match self.normalized_version() {
            Some(version) => format!("{} ({})", self.lib, version),
            None => self.lib.clone(),
        }
    }
}

/// Trim whitespace and keep the text before the first space.
pub fn clean_version(version: &str) -> &str {
    version.trim().split(' ').next().unwrap_or("")
}

/// A group applications can be uploaded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GroupList {
    pub groups: Vec<Group>,
}

/// Entry of the application listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSummary {
    pub id: u64,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AppList {
    pub products: Vec<AppSummary>,
}
