//! Job lifecycle payloads.
//!
//! [`JobEventData`] is the body of the `new` and `ret` events a worker
//! publishes; [`JobProgressData`] is the body of its `progress` events.
//! Field names on the wire (`fun`, `jid`, `return`) are kept compatible with
//! existing event listeners.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CallError;

/// User recorded on events when the caller does not name one.
pub const DEFAULT_USER: &str = "UNKNOWN";

/// The client interface a job was dispatched through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Runner,
    Wheel,
}

impl ClientKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Runner => "runner",
            Self::Wheel => "wheel",
        }
    }

    /// Tag prefix used when none is configured.
    pub const fn default_tag_prefix(self) -> &'static str {
        match self {
            Self::Runner => "run",
            Self::Wheel => "wheel",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown client kind: {0}")]
pub struct UnknownClientKind(pub String);

impl FromStr for ClientKind {
    type Err = UnknownClientKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "runner" => Ok(Self::Runner),
            "wheel" => Ok(Self::Wheel),
            other => Err(UnknownClientKind(other.to_string())),
        }
    }
}

/// Structured description of a contained invocation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub client: ClientKind,
    pub function: String,
    pub category: String,
    pub message: String,
}

impl FailureSummary {
    pub fn new(
        client: ClientKind,
        function: impl Into<String>,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            client,
            function: function.into(),
            category: category.into(),
            message: message.into(),
        }
    }

    pub fn from_call_error(client: ClientKind, function: &str, err: &CallError) -> Self {
        Self::new(client, function, err.category(), err.to_string())
    }
}

impl fmt::Display for FailureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Exception occurred in {} {}: {}: {}",
            self.client, self.function, self.category, self.message
        )
    }
}

/// Payload of a job's `new` and `ret` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEventData {
    /// `<client>.<function>`, e.g. `runner.test.arg`.
    #[serde(rename = "fun")]
    pub function: String,

    #[serde(rename = "jid")]
    pub job_id: String,

    pub user: String,

    /// Function result, or the rendered failure summary.
    #[serde(rename = "return", default, skip_serializing_if = "Option::is_none")]
    pub ret: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureSummary>,
}

impl JobEventData {
    /// Payload of the `new` event.
    pub fn started(
        client: ClientKind,
        function: &str,
        job_id: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            function: format!("{client}.{function}"),
            job_id: job_id.into(),
            user: user.into(),
            ret: None,
            success: None,
            error: None,
        }
    }

    /// Record a successful return.
    pub fn succeed(&mut self, value: Value) {
        self.ret = Some(value);
        self.success = Some(true);
        self.error = None;
    }

    /// Record a contained failure.
    pub fn fail(&mut self, summary: FailureSummary) {
        self.ret = Some(Value::String(summary.to_string()));
        self.success = Some(false);
        self.error = Some(summary);
    }

    /// Payload of a `progress` event carrying `data`.
    pub fn progress(&self, data: Value) -> JobProgressData {
        JobProgressData {
            function: self.function.clone(),
            job_id: self.job_id.clone(),
            user: self.user.clone(),
            data,
        }
    }
}

/// Payload of a job's `progress` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgressData {
    #[serde(rename = "fun")]
    pub function: String,

    #[serde(rename = "jid")]
    pub job_id: String,

    pub user: String,

    /// Whatever the function reported.
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::InvocationError;

    #[test]
    fn client_kind_round_trips_through_str() {
        assert_eq!("runner".parse::<ClientKind>().unwrap(), ClientKind::Runner);
        assert_eq!(ClientKind::Wheel.to_string(), "wheel");
        assert!("local".parse::<ClientKind>().is_err());
    }

    #[test]
    fn default_tag_prefixes() {
        assert_eq!(ClientKind::Runner.default_tag_prefix(), "run");
        assert_eq!(ClientKind::Wheel.default_tag_prefix(), "wheel");
    }

    #[test]
    fn failure_summary_renders_human_readable_line() {
        let err: CallError = InvocationError::Unavailable("test.nope".into()).into();
        let summary = FailureSummary::from_call_error(ClientKind::Runner, "test.nope", &err);
        assert_eq!(summary.category, "InvocationError");
        assert_eq!(
            summary.to_string(),
            "Exception occurred in runner test.nope: InvocationError: Function 'test.nope' is unavailable"
        );
    }

    #[test]
    fn started_payload_has_no_result_fields() {
        let data = JobEventData::started(ClientKind::Runner, "test.ping", "123", "alice");
        let wire = serde_json::to_value(&data).unwrap();
        assert_eq!(
            wire,
            json!({"fun": "runner.test.ping", "jid": "123", "user": "alice"})
        );
    }

    #[test]
    fn progress_payload_shares_job_identity() {
        let data = JobEventData::started(ClientKind::Runner, "test.stream", "9", "alice");
        let wire = serde_json::to_value(data.progress(json!({"message": "1% done"}))).unwrap();
        assert_eq!(
            wire,
            json!({
                "fun": "runner.test.stream",
                "jid": "9",
                "user": "alice",
                "data": {"message": "1% done"}
            })
        );
    }

    #[test]
    fn succeeded_payload_carries_return() {
        let mut data = JobEventData::started(ClientKind::Wheel, "key.list", "1", DEFAULT_USER);
        data.succeed(json!(["a", "b"]));
        let wire = serde_json::to_value(&data).unwrap();
        assert_eq!(wire["return"], json!(["a", "b"]));
        assert_eq!(wire["success"], json!(true));
        assert!(wire.get("error").is_none());
    }

    #[test]
    fn failed_payload_carries_summary_and_rendering() {
        let mut data = JobEventData::started(ClientKind::Runner, "test.exception", "1", "bob");
        data.fail(FailureSummary::new(
            ClientKind::Runner,
            "test.exception",
            "Exception",
            "boom",
        ));
        let wire = serde_json::to_value(&data).unwrap();
        assert_eq!(wire["success"], json!(false));
        assert_eq!(
            wire["return"],
            json!("Exception occurred in runner test.exception: Exception: boom")
        );
        assert_eq!(wire["error"]["category"], json!("Exception"));

        let back: JobEventData = serde_json::from_value(wire).unwrap();
        assert_eq!(back, data);
    }
}
