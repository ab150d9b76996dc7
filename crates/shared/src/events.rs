//! Progress and outcome types reported while a model is being pulled.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

// Numbers must start at a token boundary, so "v2.1.5 MB" and "1100%" don't match.
static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d.])(\d+(?:\.\d+)?) MB").expect("valid size pattern")
});
static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\d.])(\d{1,3})%").expect("valid percent pattern"));

/// One line of pull output with whatever numbers could be read from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullProgress {
    pub line: String,
    /// Size in megabytes, if the line mentions one.
    pub size_mb: Option<f64>,
    /// Percent complete, if the line mentions one.
    pub percent: Option<u8>,
}

impl PullProgress {
    /// Parse a raw output line. Missing numbers are left as `None`.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        Self {
            line: line.to_string(),
            size_mb: parse_size_mb(line),
            percent: parse_percent(line),
        }
    }

    /// Render as a status message for the model being pulled.
    pub fn describe(&self, model: &str) -> String {
        match (self.size_mb, self.percent) {
            (Some(size), Some(percent)) => format!(
                "Downloading model {} with {} MB size ... {}%",
                model, size, percent
            ),
            (Some(size), None) => format!("Downloading model {} with {} MB size", model, size),
            (None, Some(percent)) => format!("Downloading model {} ... {}%", model, percent),
            (None, None) => format!("Downloading model {}: {}", model, self.line),
        }
    }
}

/// Last `<number> MB` in the text.
pub fn parse_size_mb(text: &str) -> Option<f64> {
    SIZE_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1)?.as_str().parse::<f64>().ok())
        .last()
}

/// Last `<n>%` in the text with n <= 100.
pub fn parse_percent(text: &str) -> Option<u8> {
    PERCENT_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1)?.as_str().parse::<u8>().ok())
        .filter(|p| *p <= 100)
        .last()
}

/// How a pull ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PullOutcome {
    /// The runtime reported success. Numbers are the last ones seen, if any.
    Completed {
        size_mb: Option<f64>,
        percent: Option<u8>,
    },
    Failed {
        reason: String,
    },
}
