use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an automation run.
///
/// ```text
/// pending -> in-progress -> completed
///                        -> failed
///                        <-> paused
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Paused,
}

impl AutomationStatus {
    pub const ALL: [AutomationStatus; 5] = [
        AutomationStatus::Pending,
        AutomationStatus::InProgress,
        AutomationStatus::Completed,
        AutomationStatus::Failed,
        AutomationStatus::Paused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationStatus::Pending => "pending",
            AutomationStatus::InProgress => "in-progress",
            AutomationStatus::Completed => "completed",
            AutomationStatus::Failed => "failed",
            AutomationStatus::Paused => "paused",
        }
    }

    /// Completed and failed runs never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AutomationStatus::Completed | AutomationStatus::Failed)
    }

    /// Whether a run in this status may move to `next`. Staying put is allowed.
    pub fn can_transition_to(&self, next: AutomationStatus) -> bool {
        use AutomationStatus::*;

        *self == next
            || matches!(
                (self, next),
                (Pending, InProgress)
                    | (InProgress, Completed)
                    | (InProgress, Failed)
                    | (InProgress, Paused)
                    | (Paused, InProgress)
            )
    }
}

impl fmt::Display for AutomationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutomationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid automation status '{}'", s))
    }
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in-progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    /// Statuses that close a step and stamp its end time.
    pub fn is_finished(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "in-progress" => Ok(StepStatus::InProgress),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            other => Err(format!("invalid step status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutomationPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl FromStr for AutomationPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AutomationPriority::Low),
            "medium" => Ok(AutomationPriority::Medium),
            "high" => Ok(AutomationPriority::High),
            "critical" => Ok(AutomationPriority::Critical),
            other => Err(format!("invalid automation priority '{}'", other)),
        }
    }
}

/// One timed step of a run. `id` is caller-chosen and stable across updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutomationStep {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    /// Percent complete, 0 to 100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Automation fields attached to a ticket, stored beside the tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutomationRecord {
    pub ticket_number: u64,
    pub status: AutomationStatus,
    /// Steps in insertion order.
    #[serde(default)]
    pub steps: Vec<AutomationStep>,
    /// `[<ISO timestamp>] <text>` lines, oldest first.
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub priority: AutomationPriority,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    /// Wall time of the run in whole minutes; set once the run ends.
    #[serde(default)]
    pub actual_minutes: Option<i64>,
}

impl AutomationRecord {
    /// Defaults of a ticket whose automation never ran.
    pub fn untouched(ticket_number: u64) -> Self {
        Self {
            ticket_number,
            status: AutomationStatus::Pending,
            steps: Vec::new(),
            logs: Vec::new(),
            priority: AutomationPriority::Medium,
            start_time: None,
            end_time: None,
            estimated_minutes: None,
            actual_minutes: None,
        }
    }

    pub fn step(&self, id: &str) -> Option<&AutomationStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Append a log line stamped with `at`.
    pub fn log(&mut self, at: DateTime<Utc>, text: &str) {
        self.logs
            .push(format!("[{}] {}", crate::iso_timestamp(at), text));
    }

    /// Close the run at `at` and derive the actual duration from the start.
    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.end_time = Some(at);
        if let Some(start) = self.start_time {
            self.actual_minutes = Some(elapsed_minutes(start, at));
        }
    }
}

/// Whole minutes from `start` to `end`, halves rounded up.
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds();
    (millis + 30_000).div_euclid(60_000)
}

/// Read-only view returned by status queries.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AutomationSnapshot {
    /// False when automation never ran for this ticket; the other fields are
    /// then the defaults.
    pub started: bool,
    #[serde(flatten)]
    pub record: AutomationRecord,
}

/// Parameters for starting a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartAutomation {
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub priority: Option<String>,
}

/// Partial update of a run. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub step: Option<StepUpdate>,
    #[serde(default)]
    pub log: Option<String>,
}

/// Step fields to merge into the step with the same `id`, or to append.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepUpdate {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<i64>,
    #[serde(default)]
    pub details: Option<String>,
}
