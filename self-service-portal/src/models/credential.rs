use chrono::{DateTime, Utc};
use reqwest::Url;
use secrecy::{ExposeSecret, Secret};

/// An SDO admin credential. Only ever constructed complete.
#[derive(Debug, Clone)]
pub struct Credential {
    token: Secret<String>,
    base_url: Url,
    email: String,
    acquired_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from raw parts, or `None` if any part is empty or
    /// the base URL is not an absolute http(s) URL.
    pub fn from_parts(
        token: &str,
        base_url: &str,
        email: &str,
        acquired_at: DateTime<Utc>,
    ) -> Option<Self> {
        if token.trim().is_empty() || email.trim().is_empty() {
            return None;
        }
        let base_url = Url::parse(base_url.trim()).ok()?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.host_str().is_none() {
            return None;
        }
        Some(Self {
            token: Secret::new(token.to_string()),
            base_url,
            email: email.to_string(),
            acquired_at,
        })
    }

    pub fn token(&self) -> &Secret<String> {
        &self.token
    }

    pub fn bearer(&self) -> &str {
        self.token.expose_secret()
    }

    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn host(&self) -> &str {
        self.base_url.host_str().unwrap_or_default()
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn token_len(&self) -> usize {
        self.token.expose_secret().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_any_missing_part() {
        let now = Utc::now();
        assert!(Credential::from_parts("", "https://sdo.example.com/admin", "a@b.c", now).is_none());
        assert!(Credential::from_parts("tok", "", "a@b.c", now).is_none());
        assert!(Credential::from_parts("tok", "https://sdo.example.com/admin", " ", now).is_none());
    }

    #[test]
    fn rejects_relative_or_non_http_urls() {
        let now = Utc::now();
        assert!(Credential::from_parts("tok", "sdo.example.com", "a@b.c", now).is_none());
        assert!(Credential::from_parts("tok", "ftp://sdo.example.com", "a@b.c", now).is_none());
    }

    #[test]
    fn base_url_has_no_trailing_slash() {
        let cred =
            Credential::from_parts("tok", "https://sdo.example.com/admin/", "a@b.c", Utc::now())
                .unwrap();
        assert_eq!(cred.base_url(), "https://sdo.example.com/admin");
        assert_eq!(cred.host(), "sdo.example.com");
        assert_eq!(cred.token_len(), 3);
    }
}
