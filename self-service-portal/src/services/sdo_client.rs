use crate::config::{LoginPasswordField, SdoSettings};
use crate::error::PortalError;
use crate::models::Credential;
use crate::utils::extract::{self, FieldPath};
use chrono::Utc;
use metrics::counter;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use service_core::observability::TracedClientExt;
use std::net::IpAddr;
use std::sync::LazyLock;

pub const USER_AGENT: &str = "SelfServicePortal/1.0";

const LOGIN_TOKEN_PATHS: &[FieldPath] = &[&["token"], &["accessToken"], &["data", "token"]];

static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]{1,61}[a-zA-Z0-9](?:\.[a-zA-Z]{2,})+$")
        .expect("domain pattern")
});

/// Turn operator input such as `tenant.example.io/` into the admin API root,
/// `https://tenant.example.io/admin`.
///
/// An explicit `http://` is kept; bare hosts get `https://`.
pub fn normalize_base_url(raw: &str) -> Result<String, PortalError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(PortalError::InvalidRequest(
            "SDO URL is required".to_string(),
        ));
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let invalid = || PortalError::InvalidRequest(format!("Invalid SDO URL: {}", raw.trim()));
    let mut url = Url::parse(&candidate).map_err(|_| invalid())?;

    let host_ok = url.host_str().is_some_and(|host| {
        host == "localhost" || host.parse::<IpAddr>().is_ok() || DOMAIN.is_match(host)
    });
    if !host_ok {
        return Err(invalid());
    }

    let path = url.path().trim_end_matches('/').to_string();
    let path = if path.ends_with("/admin") {
        path
    } else {
        format!("{}/admin", path)
    };
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvitationKind {
    Octopus,
    Fido,
}

/// Body of an invitation request; SDO accepts either shape.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum InvitationRequest {
    Types {
        invite: bool,
        #[serde(rename = "invitationTypes")]
        invitation_types: Vec<String>,
    },
    Single {
        #[serde(rename = "type")]
        kind: InvitationKind,
    },
}

#[derive(Debug, Clone)]
pub struct InvitationOutcome {
    pub invitation_id: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalCheck {
    pub accessible: bool,
    pub status_code: u16,
    pub portal_url: String,
}

pub struct SdoClient {
    client: Client,
    settings: SdoSettings,
}

impl SdoClient {
    pub fn new(settings: SdoSettings) -> Result<Self, PortalError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, settings })
    }

    /// Log in against the admin API and return the resulting credential.
    pub async fn login(
        &self,
        raw_url: Option<&str>,
        email: &str,
        password: &str,
    ) -> Result<Credential, PortalError> {
        let raw_url = raw_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.settings.default_url.as_str());
        let base_url = normalize_base_url(raw_url)?;
        let login_url = format!("{}/api/auth/login", base_url);

        let mut body = json!({ "email": email });
        body[self.settings.login_password_field.as_str()] = json!(password);
        if self.settings.include_oa_flag
            && self.settings.login_password_field == LoginPasswordField::Password
        {
            body["oa"] = json!(false);
        }

        tracing::info!(base_url = %base_url, email = %email, "Authenticating against SDO");

        let response = self
            .client
            .traced_post(&login_url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .inspect_err(|_| record("login", "transport_error"))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            record("login", "rejected");
            tracing::warn!(status = status.as_u16(), "SDO login rejected");
            return Err(PortalError::external(status, text));
        }

        let doc: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let token = extract::first_match(&doc, LOGIN_TOKEN_PATHS, |v| {
            v.as_str().is_some_and(|s| !s.is_empty())
        })
        .and_then(Value::as_str)
        .ok_or(PortalError::IncompleteResponse {
            service: "SDO login",
            field: "token",
        })?;

        let credential = Credential::from_parts(token, &base_url, email, Utc::now())
            .ok_or_else(|| PortalError::InvalidRequest("Incomplete SDO credential".to_string()))?;

        record("login", "ok");
        tracing::info!(
            base_url = %base_url,
            token_length = credential.token_len(),
            "SDO authentication succeeded"
        );
        Ok(credential)
    }

    /// Directory members matching `term`.
    pub async fn search_users(
        &self,
        credential: &Credential,
        term: &str,
    ) -> Result<Vec<Value>, PortalError> {
        let url = format!(
            "{}/api/directories/explorer/members/search",
            credential.base_url()
        );
        let page_size = self.settings.search_page_size.to_string();

        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(credential.bearer())
            .header("Content-Type", "application/json")
            .query(&[
                ("path", self.settings.directory_path.as_str()),
                ("pageSize", page_size.as_str()),
                ("search", term),
            ])
            .send()
            .await
            .inspect_err(|_| record("search", "transport_error"))?;

        let doc = self.read_json("search", response).await?;
        let users = extract::extract_users(&doc);
        tracing::info!(term = %term, count = users.len(), "SDO directory search completed");
        Ok(users)
    }

    pub async fn send_invitation(
        &self,
        credential: &Credential,
        user_id: &str,
        request: &InvitationRequest,
    ) -> Result<InvitationOutcome, PortalError> {
        let url = self.endpoint(credential, &["api", "users", user_id, "invitations"])?;

        let response = self
            .client
            .traced_post(url.as_str())
            .bearer_auth(credential.bearer())
            .json(request)
            .send()
            .await
            .inspect_err(|_| record("invite", "transport_error"))?;

        let raw = self.read_json("invite", response).await?;
        let invitation_id = extract::extract_invitation_id(&raw);
        if invitation_id.is_none() {
            tracing::warn!(user_id = %user_id, "Invitation sent but no invitation id recognised");
        }
        tracing::info!(user_id = %user_id, invitation_id = ?invitation_id, "Invitation sent");

        Ok(InvitationOutcome { invitation_id, raw })
    }

    pub async fn invitation_details(
        &self,
        credential: &Credential,
        invitation_id: &str,
    ) -> Result<Value, PortalError> {
        let url = self.endpoint(credential, &["api", "invitations", invitation_id])?;

        let response = self
            .client
            .traced_get(url.as_str())
            .bearer_auth(credential.bearer())
            .send()
            .await
            .inspect_err(|_| record("invitation_details", "transport_error"))?;

        self.read_json("invitation_details", response).await
    }

    /// Whether the admin portal answers at all.
    pub async fn check_portal(&self, credential: &Credential) -> PortalCheck {
        let portal_url = credential.base_url().to_string();
        match self
            .client
            .traced_get(&portal_url)
            .bearer_auth(credential.bearer())
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                PortalCheck {
                    accessible: status.is_success() || status.is_redirection(),
                    status_code: status.as_u16(),
                    portal_url,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, portal_url = %portal_url, "SDO portal unreachable");
                PortalCheck {
                    accessible: false,
                    status_code: 0,
                    portal_url,
                }
            }
        }
    }

    /// Subject-facing enrollment link for an invitation.
    pub fn enrollment_url(&self, host: &str, invitation_id: &str) -> String {
        format!(
            "https://{}{}?invitation={}",
            host, self.settings.enroll_path, invitation_id
        )
    }

    /// Host used for enrollment links when no credential is at hand.
    pub fn default_host(&self) -> String {
        normalize_base_url(&self.settings.default_url)
            .ok()
            .and_then(|url| Url::parse(&url).ok())
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| self.settings.default_url.clone())
    }

    fn endpoint(&self, credential: &Credential, segments: &[&str]) -> Result<Url, PortalError> {
        let mut url = Url::parse(credential.base_url())
            .map_err(|e| PortalError::InvalidRequest(format!("Invalid SDO URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| PortalError::InvalidRequest("SDO URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_json(
        &self,
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<Value, PortalError> {
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            record(operation, "unauthorized");
            tracing::warn!(operation, "SDO rejected the session token");
            return Err(PortalError::external(status, text));
        }
        if !status.is_success() {
            record(operation, "error");
            tracing::warn!(operation, status = status.as_u16(), body = %text, "SDO call failed");
            return Err(PortalError::external(status, text));
        }

        record(operation, "ok");
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

fn record(operation: &'static str, outcome: &'static str) {
    counter!("sdo_requests_total", "operation" => operation, "outcome" => outcome).increment(1);
}
