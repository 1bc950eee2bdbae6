use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::UnitSet;
use crate::allowlist::CommandUnit;
use crate::error::GatewayError;

/// Explanation text for a unit that ran but printed nothing at all.
pub const NO_OUTPUT_NOTE: &str = "Command produced no output.";

static SEVERITY_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(healthy|warning|critical)\b").expect("Failed to compile severity regex")
});

/// How a unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitStatus {
    /// Not on the allowlist; nothing was executed.
    Rejected,
    /// Spawn failure, timeout or non-zero exit.
    ExecutionFailed,
    /// Executed successfully and explained.
    Explained,
    /// Executed successfully but the backend produced no explanation.
    ExplanationFailed,
}

/// Severity marker found in a health-probe explanation. Display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Severity {
    Healthy,
    Warning,
    Critical,
    #[default]
    Unknown,
}

impl Severity {
    /// First marker in `text`: ✅ / ⚠️ / 🔴, or the words healthy / warning /
    /// critical in any case. `Unknown` when none appears.
    pub fn detect(text: &str) -> Self {
        let mut found: Vec<(usize, Severity)> = [
            ("✅", Severity::Healthy),
            ("⚠", Severity::Warning),
            ("🔴", Severity::Critical),
        ]
        .into_iter()
        .filter_map(|(marker, severity)| text.find(marker).map(|pos| (pos, severity)))
        .collect();

        if let Some(word) = SEVERITY_WORD.find(text) {
            let severity = match word.as_str().to_ascii_lowercase().as_str() {
                "healthy" => Severity::Healthy,
                "warning" => Severity::Warning,
                _ => Severity::Critical,
            };
            found.push((word.start(), severity));
        }

        found
            .into_iter()
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, severity)| severity)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Healthy => "Healthy",
            Severity::Warning => "Warning",
            Severity::Critical => "Critical",
            Severity::Unknown => "Unknown",
        }
    }
}

/// Everything reported back for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutcome {
    pub unit: CommandUnit,
    /// Probe name in probe-set mode.
    pub probe: Option<String>,
    pub status: UnitStatus,
    pub description: Option<String>,
    /// Captured output, or the error text standing in for it.
    pub raw_output: Option<String>,
    pub explanation_text: Option<String>,
    pub severity: Option<Severity>,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<u64>,
    pub timed_out: bool,
    pub errors: Vec<GatewayError>,
}

impl UnitOutcome {
    pub fn rejected(unit: CommandUnit, probe: Option<String>) -> Self {
        let command = unit.trimmed().to_string();
        Self {
            unit,
            probe,
            status: UnitStatus::Rejected,
            description: None,
            raw_output: None,
            explanation_text: None,
            severity: None,
            exit_code: None,
            duration_ms: None,
            timed_out: false,
            errors: vec![GatewayError::ValidationRejected { command }],
        }
    }

    pub fn command(&self) -> &str {
        self.unit.trimmed()
    }

    /// Probe name in probe-set mode, the command otherwise.
    pub fn label(&self) -> &str {
        self.probe.as_deref().unwrap_or_else(|| self.command())
    }

    /// Whether the command ran and exited 0.
    pub fn executed_ok(&self) -> bool {
        matches!(
            self.status,
            UnitStatus::Explained | UnitStatus::ExplanationFailed
        )
    }

    /// First recorded error, rendered for people.
    pub fn failure_message(&self) -> Option<String> {
        self.errors.first().map(ToString::to_string)
    }

    /// Explanation if there is one, else the failure message.
    pub fn display_text(&self) -> String {
        match self.explanation_text.as_deref() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => self.failure_message().unwrap_or_default(),
        }
    }

    /// Marker-prefixed line used in the explain response.
    pub fn explanation_line(&self) -> String {
        let command = self.command();
        match self.status {
            UnitStatus::Rejected => {
                format!("❌ {command} → Command '{command}' is not allowed.")
            }
            UnitStatus::Explained => format!("🔹 {command} → {}", self.display_text()),
            UnitStatus::ExecutionFailed | UnitStatus::ExplanationFailed => {
                format!("⚠️ {command} → {}", self.display_text())
            }
        }
    }

    /// `"<label> → <text>"`, used in the health summary.
    pub fn summary_line(&self) -> String {
        format!("{} → {}", self.label(), self.display_text())
    }
}

/// Outcomes of one request, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResponse {
    pub unit_set: UnitSet,
    pub outcomes: Vec<UnitOutcome>,
}

impl AggregateResponse {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn explanations(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(UnitOutcome::explanation_line)
            .collect()
    }

    pub fn summary_lines(&self) -> Vec<String> {
        self.outcomes.iter().map(UnitOutcome::summary_line).collect()
    }

    /// Outcomes keyed by probe name. `None` outside probe-set mode.
    pub fn probe_map(&self) -> Option<BTreeMap<&str, &UnitOutcome>> {
        if self.unit_set != UnitSet::FixedProbeSet {
            return None;
        }
        Some(self.outcomes.iter().map(|o| (o.label(), o)).collect())
    }
}
