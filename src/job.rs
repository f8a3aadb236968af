//! The `Job` record and its options.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique token assigned at enqueue; never reused.
pub type JobId = Uuid;

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

/// Retry backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffOptions {
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    pub delay: u64,
}

/// Options frozen at enqueue except for the retry counters in `Job` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    pub attempts: u32,
    pub backoff: Option<BackoffOptions>,
    pub delay: u64,
    pub timeout: u64,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
    /// Recognized but unused in the core (reserved).
    pub priority: i64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: None,
            delay: 0,
            timeout: 0,
            remove_on_complete: false,
            remove_on_fail: false,
            priority: 0,
        }
    }
}

/// The central entity: one unit of work with a payload and scheduling
/// options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub data: serde_json::Value,
    pub options: JobOptions,
    pub created_at: i64,
    pub status: JobStatus,
    pub attempts_made: u32,
    pub failed_reason: Option<String>,
    pub stack_trace: Vec<String>,
    pub return_value: Option<serde_json::Value>,
}

impl Job {
    pub fn new(name: impl Into<String>, data: serde_json::Value, options: JobOptions) -> Self {
        let status = if options.delay > 0 {
            JobStatus::Delayed
        } else {
            JobStatus::Waiting
        };

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            data,
            options,
            created_at: Utc::now().timestamp_millis(),
            status,
            attempts_made: 0,
            failed_reason: None,
            stack_trace: Vec::new(),
            return_value: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}
