use crate::config::Au10tixSettings;
use crate::error::PortalError;
use crate::models::SubjectData;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use serde_json::{json, Value};
use service_core::observability::TracedClientExt;

const USER_AGENT: &str = "SelfServicePortal/1.0";

/// Built-in demo token; sessions started with it never reach Au10tix.
pub const DEMO_FALLBACK_TOKEN: &str = "au10tix-demo-fallback-token";

/// Result lookups, most specific first. Status-style endpoints come last.
pub const RESULT_ENDPOINTS: &[&str] = &[
    "/result/v2/results/person/{id}",
    "/api/v2/results/{id}",
    "/api/v1/results/{id}",
    "/results/{id}",
    "/workflow/v1/results/{id}",
    "/secure-me/v2/results/{id}",
    "/api/v1/sessions/{id}",
    "/v1/sessions/{id}",
    "/sessions/{id}",
    "/workflow/v1/sessions/{id}",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Configuration,
    StaticFallback,
}

impl TokenSource {
    pub fn is_demo(self) -> bool {
        self == TokenSource::StaticFallback
    }
}

pub struct ResolvedToken {
    pub token: Secret<String>,
    pub source: TokenSource,
}

/// Configured token, else the demo fallback when allowed.
pub fn resolve_token(settings: &Au10tixSettings) -> Result<ResolvedToken, PortalError> {
    if let Some(token) = settings
        .token
        .as_ref()
        .filter(|t| !t.expose_secret().trim().is_empty())
    {
        return Ok(ResolvedToken {
            token: token.clone(),
            source: TokenSource::Configuration,
        });
    }

    if !settings.allow_demo_fallback {
        return Err(PortalError::Configuration(
            "no Au10tix token configured and demo fallback is disabled".to_string(),
        ));
    }

    let fallback = settings
        .fallback_token
        .as_ref()
        .map(|t| t.expose_secret().trim().to_string())
        .unwrap_or_else(|| DEMO_FALLBACK_TOKEN.to_string());
    if fallback.is_empty() {
        return Err(PortalError::Configuration(
            "Au10tix fallback token is empty".to_string(),
        ));
    }

    Ok(ResolvedToken {
        token: Secret::new(fallback),
        source: TokenSource::StaticFallback,
    })
}

/// What workflow creation hands back.
#[derive(Debug, Clone)]
pub struct WorkflowSession {
    pub session_id: Option<String>,
    pub session_url: String,
}

#[derive(Debug, Clone)]
pub enum PollResult {
    Found { endpoint: String, body: Value },
    NotReady { last_error: Option<String> },
}

/// The slice of the Au10tix API the tracker drives.
#[async_trait]
pub trait VerificationApi: Send + Sync {
    async fn create_workflow(
        &self,
        api_base: &str,
        token: &str,
        subject: &SubjectData,
    ) -> Result<WorkflowSession, PortalError>;

    /// Try every result endpoint until one answers 200.
    ///
    /// Only a 401 fails the whole attempt.
    async fn fetch_result(
        &self,
        api_base: &str,
        token: &str,
        external_id: &str,
    ) -> Result<PollResult, PortalError>;
}

pub struct Au10tixClient {
    client: Client,
    workflow_name: String,
}

impl Au10tixClient {
    pub fn new(settings: &Au10tixSettings) -> Result<Self, PortalError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            workflow_name: settings.workflow_name.clone(),
        })
    }

    fn workflow_body(subject: &SubjectData) -> Value {
        json!({
            "workflowOptions": {},
            "serviceOptions": {
                "secureme": {
                    "shortUrl": true,
                    "requestTypes": {
                        "idFront": ["file", "camera"],
                        "idBack": ["file", "camera"],
                        "faceCompare": ["camera"]
                    }
                }
            },
            "userData": subject.workflow_user_data(),
        })
    }
}

#[async_trait]
impl VerificationApi for Au10tixClient {
    async fn create_workflow(
        &self,
        api_base: &str,
        token: &str,
        subject: &SubjectData,
    ) -> Result<WorkflowSession, PortalError> {
        let url = format!(
            "{}/workflow/v1/workflows/person/{}",
            api_base, self.workflow_name
        );
        tracing::info!(url = %url, "Creating Au10tix workflow");

        let response = self
            .client
            .traced_post(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(&Self::workflow_body(subject))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), body = %text, "Au10tix workflow creation failed");
            return Err(PortalError::external(status, text));
        }

        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let session_url = body
            .pointer("/response/securemeLink")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or(PortalError::IncompleteResponse {
                service: "Au10tix workflow",
                field: "securemeLink",
            })?
            .to_string();
        let session_id = body
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string);

        tracing::info!(session_id = ?session_id, "Au10tix workflow created");
        Ok(WorkflowSession {
            session_id,
            session_url,
        })
    }

    async fn fetch_result(
        &self,
        api_base: &str,
        token: &str,
        external_id: &str,
    ) -> Result<PollResult, PortalError> {
        let mut last_error = None;

        for template in RESULT_ENDPOINTS {
            let path = template.replace("{id}", external_id);
            let url = format!("{}{}", api_base, path);

            let mut request = self
                .client
                .traced_get(&url)
                .bearer_auth(token)
                .header("Accept", "application/json");
            if path.contains("result") {
                request = request.query(&[("includeDetailed", "true")]);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(endpoint = %path, error = %e, "Au10tix endpoint unreachable");
                    last_error = Some(format!("{}: {}", path, e));
                    continue;
                }
            };

            let status = response.status();
            match status {
                StatusCode::OK => {
                    let text = response.text().await?;
                    match serde_json::from_str::<Value>(&text) {
                        Ok(body) => {
                            tracing::info!(endpoint = %path, "Au10tix result endpoint answered");
                            return Ok(PollResult::Found {
                                endpoint: path,
                                body,
                            });
                        }
                        Err(e) => {
                            last_error = Some(format!("{}: unparseable body: {}", path, e));
                        }
                    }
                }
                StatusCode::NOT_FOUND => {
                    tracing::debug!(endpoint = %path, "Au10tix endpoint not found, trying next");
                }
                StatusCode::UNAUTHORIZED => {
                    let text = response.text().await.unwrap_or_default();
                    tracing::warn!(endpoint = %path, "Au10tix rejected the token");
                    return Err(PortalError::external(status, text));
                }
                _ => {
                    let text = response.text().await.unwrap_or_default();
                    tracing::warn!(endpoint = %path, status = status.as_u16(), "Au10tix endpoint error");
                    last_error = Some(format!("{}: HTTP {}: {}", path, status.as_u16(), text));
                }
            }
        }

        Ok(PollResult::NotReady { last_error })
    }
}
