//! Leveled step results.
//!
//! A `StepResult` is created when a step starts processing and collects an
//! ordered list of messages tagged with a level. Recording an error flips the
//! success flag; merging another result intersects the flags.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Severity of a single result message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One message recorded on a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMessage {
    #[serde(rename = "type")]
    pub level: MessageLevel,
    pub message: String,
}

/// Outcome of processing one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    step_type: String,
    success: bool,
    messages: Vec<StepMessage>,
}

impl StepResult {
    /// A successful result with no messages yet.
    pub fn success(step_type: impl Into<String>) -> Self {
        Self {
            step_type: step_type.into(),
            success: true,
            messages: Vec::new(),
        }
    }

    /// A result carrying a single error message.
    pub fn failure(step_type: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::success(step_type);
        result.add_error(message);
        result
    }

    pub fn add_debug(&mut self, message: impl Into<String>) {
        self.push(MessageLevel::Debug, message.into());
    }

    pub fn add_info(&mut self, message: impl Into<String>) {
        self.push(MessageLevel::Info, message.into());
    }

    pub fn add_warn(&mut self, message: impl Into<String>) {
        self.push(MessageLevel::Warn, message.into());
    }

    /// Record an error. The result is no longer successful.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.push(MessageLevel::Error, message.into());
        self.success = false;
    }

    /// Append every message of `other` and intersect the success flags.
    pub fn merge(&mut self, other: StepResult) {
        self.success = self.success && other.success;
        self.messages.extend(other.messages);
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn step_type(&self) -> &str {
        &self.step_type
    }

    /// Messages in insertion order, optionally restricted to one level.
    pub fn messages(&self, level: Option<MessageLevel>) -> Vec<&StepMessage> {
        self.messages
            .iter()
            .filter(|m| level.is_none_or(|l| m.level == l))
            .collect()
    }

    /// Message texts at the given level, joined for log output.
    pub fn joined(&self, level: MessageLevel) -> String {
        self.messages(Some(level))
            .iter()
            .map(|m| m.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn push(&mut self, level: MessageLevel, message: String) {
        self.messages.push(StepMessage { level, message });
    }
}

/// True when every result in an import ledger succeeded.
pub fn all_succeeded(results: &[StepResult]) -> bool {
    results.iter().all(StepResult::is_success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_starts_empty() {
        let result = StepResult::success("setSiteOptions");
        assert!(result.is_success());
        assert!(result.messages(None).is_empty());
        assert_eq!(result.step_type(), "setSiteOptions");
    }

    #[test]
    fn test_add_error_marks_failure() {
        let mut result = StepResult::success("runSql");
        result.add_info("starting");
        assert!(result.is_success());

        result.add_error("boom");
        assert!(!result.is_success());
        assert_eq!(result.messages(None).len(), 2);
    }

    #[test]
    fn test_warn_does_not_fail() {
        let mut result = StepResult::success("installPlugin");
        result.add_warn("already active");
        result.add_debug("noise");
        assert!(result.is_success());
    }

    #[test]
    fn test_messages_filtered_by_level() {
        let mut result = StepResult::success("installTheme");
        result.add_info("a");
        result.add_debug("b");
        result.add_info("c");

        let infos = result.messages(Some(MessageLevel::Info));
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].message, "a");
        assert_eq!(infos[1].message, "c");
        assert_eq!(result.joined(MessageLevel::Info), "a; c");
    }

    #[test]
    fn test_merge_appends_and_intersects() {
        let mut own = StepResult::success("runSql");
        own.add_info("own");

        let mut other = StepResult::success("runSql");
        other.add_debug("x");
        other.add_error("y");

        own.merge(other);
        assert!(!own.is_success());
        let texts: Vec<_> = own.messages(None).iter().map(|m| m.message.clone()).collect();
        assert_eq!(texts, vec!["own", "x", "y"]);
    }

    #[test]
    fn test_merge_success_keeps_failure() {
        let mut own = StepResult::failure("a", "bad");
        own.merge(StepResult::success("a"));
        assert!(!own.is_success());
    }

    #[test]
    fn test_all_succeeded() {
        let ok = StepResult::success("a");
        let bad = StepResult::failure("b", "nope");
        assert!(all_succeeded(&[ok.clone()]));
        assert!(!all_succeeded(&[ok, bad]));
    }

    #[test]
    fn test_level_parse_and_display() {
        assert_eq!("warn".parse::<MessageLevel>().ok(), Some(MessageLevel::Warn));
        assert_eq!(MessageLevel::Error.to_string(), "error");
    }
}
