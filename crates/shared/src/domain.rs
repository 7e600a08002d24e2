use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::UnknownDepthTier;

/// Placeholder the service writes into step annotations that carry nothing.
pub const ABSENT_SENTINEL: &str = "-";

/// Pipeline stage number as sent by the service (1, 2 or 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layer(pub u8);

impl Layer {
    pub const QA_DOC: Layer = Layer(1);
    pub const CASE_LIST: Layer = Layer(2);
    pub const CASE_DETAIL: Layer = Layer(3);

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "QA documentation",
            2 => "Case list",
            3 => "Detailed cases",
            _ => "Unknown layer",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthTier {
    #[default]
    Smoke,
    Regression,
    Full,
    Atomary,
}

impl DepthTier {
    pub const ALL: [DepthTier; 4] = [
        DepthTier::Smoke,
        DepthTier::Regression,
        DepthTier::Full,
        DepthTier::Atomary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DepthTier::Smoke => "smoke",
            DepthTier::Regression => "regression",
            DepthTier::Full => "full",
            DepthTier::Atomary => "atomary",
        }
    }

    /// Inclusive range of case counts the service aims for at this tier.
    pub fn expected_cases(self) -> (u32, u32) {
        match self {
            DepthTier::Smoke => (1, 5),
            DepthTier::Regression => (5, 10),
            DepthTier::Full => (11, 30),
            DepthTier::Atomary => (31, 100),
        }
    }

    pub fn label(self) -> String {
        let (min, max) = self.expected_cases();
        let name = match self {
            DepthTier::Smoke => "Smoke",
            DepthTier::Regression => "Regression",
            DepthTier::Full => "Full",
            DepthTier::Atomary => "Atomary",
        };
        format!("{name} ({min}-{max} cases)")
    }
}

impl fmt::Display for DepthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepthTier {
    type Err = UnknownDepthTier;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        DepthTier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownDepthTier(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Normal => "Normal",
            Priority::Low => "Low",
        }
    }
}

impl From<String> for Priority {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

impl From<Option<String>> for Priority {
    fn from(raw: Option<String>) -> Self {
        raw.map(Priority::from).unwrap_or_default()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", rename_all = "snake_case")]
pub enum CaseType {
    #[default]
    Positive,
    Negative,
    Boundary,
    Integration,
    Security,
}

impl CaseType {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseType::Positive => "positive",
            CaseType::Negative => "negative",
            CaseType::Boundary => "boundary",
            CaseType::Integration => "integration",
            CaseType::Security => "security",
        }
    }
}

impl From<String> for CaseType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "negative" => CaseType::Negative,
            "boundary" => CaseType::Boundary,
            "integration" => CaseType::Integration,
            "security" => CaseType::Security,
            _ => CaseType::Positive,
        }
    }
}

impl From<Option<String>> for CaseType {
    fn from(raw: Option<String>) -> Self {
        raw.map(CaseType::from).unwrap_or_default()
    }
}

impl fmt::Display for CaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn absent() -> String {
    ABSENT_SENTINEL.to_string()
}

/// Reads an explicit `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_absent<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(absent))
}

/// One action of a test case with its expected-result annotations.
///
/// Annotations are kept as received (a `null` reads as `-`) so an export round-trips them;
/// use the accessors to read them with the `-` sentinel folded to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: String,
    #[serde(default = "absent", deserialize_with = "null_as_absent")]
    pub test_data: String,
    #[serde(default = "absent", deserialize_with = "null_as_absent")]
    pub ui: String,
    #[serde(default = "absent", deserialize_with = "null_as_absent")]
    pub api: String,
    #[serde(default = "absent", deserialize_with = "null_as_absent")]
    pub db: String,
}

impl Step {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            test_data: absent(),
            ui: absent(),
            api: absent(),
            db: absent(),
        }
    }

    pub fn test_data(&self) -> Option<&str> {
        present(&self.test_data)
    }

    pub fn ui(&self) -> Option<&str> {
        present(&self.ui)
    }

    pub fn api(&self) -> Option<&str> {
        present(&self.api)
    }

    pub fn db(&self) -> Option<&str> {
        present(&self.db)
    }
}

/// Returns `None` for empty annotations and the `-` placeholder.
pub fn present(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == ABSENT_SENTINEL {
        None
    } else {
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub case_type: CaseType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<Step>,
}

/// Marker for the case currently being detailed in layer 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
    pub name: String,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let ratio = (u64::from(self.current) * 100) / u64::from(self.total);
        ratio.min(100) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub xml: String,
    pub csv: String,
    pub md: String,
}
