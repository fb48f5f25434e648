//! Shared types used across ReachGrid crates.

use std::fmt;
use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Serialize};

/// A monitored URL.
///
/// Identity is the normalized URL string, so two targets parsed from the
/// same text compare equal and hash the same. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    url: Arc<Url>,
}

impl Target {
    /// Parse an absolute URL. Returns `None` for relative or host-less input.
    pub fn parse(input: &str) -> Option<Self> {
        let url = Url::parse(input.trim()).ok()?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return None;
        }
        Some(Self { url: Arc::new(url) })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Host name, used as the short label in console reports.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or(self.url.as_str())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Coarse grouping of probe failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// An awaited probe ran out of time.
    Timeout,
    /// Connection refused, reset, or DNS failure.
    Connection,
    /// TLS handshake or certificate failure.
    Tls,
    Other,
}

impl FailureCategory {
    pub fn label(&self) -> &'static str {
        match self {
            FailureCategory::Timeout => "timeout",
            FailureCategory::Connection => "connection",
            FailureCategory::Tls => "tls",
            FailureCategory::Other => "other",
        }
    }
}

/// The raw result of one probe attempt. Exactly one is produced per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The HTTP exchange completed.
    Response {
        status: u16,
        /// Value of the `server` response header, if any.
        server: Option<String>,
    },
    /// A speculative probe hit its short deadline. Says nothing about health.
    Canceled,
    /// Transport error, awaited timeout, or a crashed request task.
    Failed {
        category: FailureCategory,
        message: String,
    },
}

impl ProbeOutcome {
    pub fn response(status: u16) -> Self {
        ProbeOutcome::Response {
            status,
            server: None,
        }
    }

    pub fn failed(category: FailureCategory, message: impl Into<String>) -> Self {
        ProbeOutcome::Failed {
            category,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProbeOutcome::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable reason for a non-success outcome.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            ProbeOutcome::Response { status, server } if !is_success_status(*status) => {
                Some(format!(
                    "HTTP {status}, server={}",
                    server.as_deref().unwrap_or("N/A")
                ))
            }
            ProbeOutcome::Failed { category, message } => {
                Some(format!("{}: {message}", category.label()))
            }
            _ => None,
        }
    }
}

/// What an outcome means for the target's health accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCategory {
    Success,
    Failure,
    Canceled,
}

impl ResultCategory {
    pub const ALL: [ResultCategory; 3] = [
        ResultCategory::Success,
        ResultCategory::Failure,
        ResultCategory::Canceled,
    ];
}

/// Map a raw outcome to its accounting category.
pub fn classify(outcome: &ProbeOutcome) -> ResultCategory {
    match outcome {
        ProbeOutcome::Response { status, .. } if is_success_status(*status) => {
            ResultCategory::Success
        }
        ProbeOutcome::Response { .. } => ResultCategory::Failure,
        ProbeOutcome::Canceled => ResultCategory::Canceled,
        ProbeOutcome::Failed { .. } => ResultCategory::Failure,
    }
}

fn is_success_status(status: u16) -> bool {
    (200..=299).contains(&status)
}
