use crate::error::PortalError;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Payload of an Au10tix bearer token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Au10tixClaims {
    #[serde(default)]
    pub iat: Option<i64>,
    pub exp: i64,
    #[serde(default)]
    pub scp: Vec<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub bos_url: Option<String>,
    #[serde(default)]
    pub client_organization_name: Option<String>,
    #[serde(default)]
    pub client_organization_id: Option<i64>,
}

impl Au10tixClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.exp
    }

    /// API base URL from the token, or `fallback`, without a trailing slash.
    pub fn api_base_url<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(fallback)
            .trim_end_matches('/')
    }
}

/// Decode the claims of a JWT-shaped token without verifying its signature.
///
/// The token is only used for routing and expiry; Au10tix itself checks it.
pub fn decode_claims(token: &str) -> Result<Au10tixClaims, PortalError> {
    let parts: Vec<&str> = token.trim().split('.').collect();

    if parts.len() != 3 {
        return Err(PortalError::InvalidToken("expected three segments".to_string()));
    }

    // Some issuers pad the payload segment
    let payload = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| PortalError::InvalidToken(format!("payload is not base64url: {}", e)))?;

    serde_json::from_slice(&payload)
        .map_err(|e| PortalError::InvalidToken(format!("payload is not valid claims: {}", e)))
}

/// Decode and reject expired tokens.
pub fn decode_unexpired(token: &str, now: DateTime<Utc>) -> Result<Au10tixClaims, PortalError> {
    let claims = decode_claims(token)?;
    if claims.is_expired(now) {
        return Err(PortalError::TokenExpired);
    }
    Ok(claims)
}

/// Build an unsigned token around `claims`. Test and demo helper.
pub fn encode_unsigned(claims: &serde_json::Value) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}
