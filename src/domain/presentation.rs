//! Operator-facing rendering of scan outcomes

use serde::Serialize;

/// Color class of a presented outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Success,
    Warning,
    Error,
}

impl Tone {
    pub fn icon(&self) -> &'static str {
        match self {
            Tone::Success => "check-circle",
            Tone::Warning => "exclamation-triangle",
            Tone::Error => "times-circle",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Tone::Success => "success",
            Tone::Warning => "warning",
            Tone::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presentation {
    pub tone: Tone,
    pub icon: &'static str,
    pub color: &'static str,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One line of the recent-activity log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentScanEntry {
    pub name: String,
    /// Local wall-clock time of the scan, preformatted
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}
