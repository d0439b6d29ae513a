use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl VerificationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, VerificationStatus::Completed | VerificationStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::InProgress => "in_progress",
            VerificationStatus::Completed => "completed",
            VerificationStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationResult {
    Verified,
    Failed,
}

impl VerificationResult {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "verified" | "passed" | "approved" | "success" => Some(VerificationResult::Verified),
            "failed" | "rejected" | "denied" => Some(VerificationResult::Failed),
            _ => None,
        }
    }
}

/// Map an Au10tix `status` string onto local status and result.
pub fn map_external_status(value: &str) -> (VerificationStatus, Option<VerificationResult>) {
    match value.to_ascii_lowercase().as_str() {
        "completed" | "success" | "verified" | "passed" | "approved" => (
            VerificationStatus::Completed,
            Some(VerificationResult::Verified),
        ),
        "failed" | "rejected" | "denied" => (
            VerificationStatus::Completed,
            Some(VerificationResult::Failed),
        ),
        "in_progress" | "processing" | "pending" => (VerificationStatus::InProgress, None),
        _ => (VerificationStatus::Pending, None),
    }
}

/// The person being verified, as submitted from the portal form.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubjectData {
    #[validate(length(min = 1, message = "firstName is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "lastName is required"))]
    pub last_name: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

impl SubjectData {
    /// `userData` block of a workflow request: non-empty fields only.
    pub fn workflow_user_data(&self) -> Map<String, Value> {
        let fields = [
            ("firstName", Some(&self.first_name)),
            ("lastName", Some(&self.last_name)),
            ("email", Some(&self.email)),
            ("phoneNumber", self.phone_number.as_ref()),
            ("dateOfBirth", self.date_of_birth.as_ref()),
        ];

        fields
            .into_iter()
            .filter_map(|(key, value)| {
                let value = value?.trim();
                (!value.is_empty()).then(|| (key.to_string(), Value::String(value.to_string())))
            })
            .collect()
    }
}

/// Handle on the Au10tix workflow backing a local session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSessionRef {
    pub id: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSession {
    pub id: Uuid,
    pub subject: SubjectData,
    pub status: VerificationStatus,
    pub result: Option<VerificationResult>,
    pub score: Option<f64>,
    pub data: Option<Value>,
    pub external: Option<ExternalSessionRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Sequence number of the last refresh committed to this session.
    #[serde(skip)]
    pub refresh_seq: u64,
}

impl VerificationSession {
    pub fn new(
        subject: SubjectData,
        external: Option<ExternalSessionRef>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            status: VerificationStatus::Pending,
            result: None,
            score: None,
            data: None,
            external,
            created_at: now,
            updated_at: now,
            refresh_seq: 0,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    /// Fold a successful poll into this session.
    ///
    /// `result` is only ever set together with a completed status.
    pub fn apply(&mut self, outcome: PolledOutcome, now: DateTime<Utc>) {
        if let Some((status, result)) = outcome.status {
            self.status = status;
            self.result = result;
        }
        if let Some(score) = outcome.score {
            self.score = Some(score);
        }
        if self.status == VerificationStatus::Completed {
            if let Some(result) = outcome.result {
                self.result = Some(result);
            }
        }
        self.data = Some(outcome.raw);
        self.updated_at = now;
    }

    pub fn status_message(&self) -> &'static str {
        match (self.status, self.result) {
            (VerificationStatus::Pending, _) => {
                "Verification is pending - waiting for user to complete Au10tix workflow"
            }
            (VerificationStatus::InProgress, _) => {
                "Verification is in progress - Au10tix is processing the submission"
            }
            (VerificationStatus::Completed, Some(VerificationResult::Verified)) => {
                "Verification completed successfully"
            }
            (VerificationStatus::Completed, _) => "Verification completed but failed validation",
            (VerificationStatus::Failed, _) => "Verification failed",
        }
    }
}

/// Fields recovered from an Au10tix result body.
#[derive(Debug, Clone)]
pub struct PolledOutcome {
    pub status: Option<(VerificationStatus, Option<VerificationResult>)>,
    pub result: Option<VerificationResult>,
    pub score: Option<f64>,
    pub raw: Value,
}

impl PolledOutcome {
    pub fn from_body(raw: Value) -> Self {
        let status = raw
            .get("status")
            .and_then(Value::as_str)
            .map(map_external_status);
        let result = raw
            .get("result")
            .and_then(Value::as_str)
            .and_then(VerificationResult::parse);
        let score = raw.get("score").and_then(Value::as_f64);

        Self {
            status,
            result,
            score,
            raw,
        }
    }
}
