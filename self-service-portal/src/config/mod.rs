use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub observability: ObservabilitySettings,
    pub portal: PortalSettings,
    #[serde(default)]
    pub sdo: SdoSettings,
    #[serde(default)]
    pub au10tix: Au10tixSettings,
    #[serde(default)]
    pub verification: VerificationSettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Mark the session cookie `Secure`. Enable behind HTTPS.
    #[serde(default)]
    pub secure_cookies: bool,
    /// How long in-flight requests may run after a shutdown signal.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl ServerSettings {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Deserialize, Clone)]
pub struct ObservabilitySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP collector endpoint. Traces are not exported when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

/// The single operator account allowed into the portal.
#[derive(Deserialize, Clone)]
pub struct PortalSettings {
    pub admin_username: String,
    pub admin_password: Secret<String>,
}

/// Name of the secret field in the SDO login body.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoginPasswordField {
    #[default]
    Password,
    Oa,
}

impl LoginPasswordField {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginPasswordField::Password => "password",
            LoginPasswordField::Oa => "oa",
        }
    }
}

/// How a freshly acquired SDO credential is written into the session.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStorage {
    /// Token, base URL and email stored in the session itself.
    #[default]
    Direct,
    /// Token kept in a process-wide table, session holds its reference id.
    TokenReference,
    /// Whole credential kept in a process-wide table.
    FullReference,
}

#[derive(Deserialize, Clone)]
pub struct SdoSettings {
    /// Admin host used when a login request does not name one.
    #[serde(default = "default_sdo_url")]
    pub default_url: String,
    /// Service account used to connect automatically after portal login.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<Secret<String>>,
    #[serde(default)]
    pub login_password_field: LoginPasswordField,
    /// Send `"oa": false` alongside the password.
    #[serde(default = "default_true")]
    pub include_oa_flag: bool,
    #[serde(default)]
    pub credential_storage: CredentialStorage,
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,
    /// Base64 of the directory root ("root").
    #[serde(default = "default_directory_path")]
    pub directory_path: String,
    #[serde(default = "default_sdo_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_enroll_path")]
    pub enroll_path: String,
}

fn default_sdo_url() -> String {
    "amitmt.doubleoctopus.io".to_string()
}

fn default_true() -> bool {
    true
}

fn default_search_page_size() -> u32 {
    10
}

fn default_directory_path() -> String {
    "cm9vdA".to_string()
}

fn default_sdo_timeout_secs() -> u64 {
    15
}

fn default_enroll_path() -> String {
    "/enroll".to_string()
}

impl Default for SdoSettings {
    fn default() -> Self {
        Self {
            default_url: default_sdo_url(),
            email: None,
            password: None,
            login_password_field: LoginPasswordField::default(),
            include_oa_flag: true,
            credential_storage: CredentialStorage::default(),
            search_page_size: default_search_page_size(),
            directory_path: default_directory_path(),
            timeout_secs: default_sdo_timeout_secs(),
            enroll_path: default_enroll_path(),
        }
    }
}

impl SdoSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Clone)]
pub struct Au10tixSettings {
    #[serde(default)]
    pub token: Option<Secret<String>>,
    /// Used when the token claims carry no `apiUrl`.
    #[serde(default = "default_au10tix_base_url")]
    pub base_url: String,
    #[serde(default = "default_workflow_name")]
    pub workflow_name: String,
    #[serde(default = "default_au10tix_timeout_secs")]
    pub timeout_secs: u64,
    /// Fall back to the demo token when no token is configured.
    #[serde(default = "default_true")]
    pub allow_demo_fallback: bool,
    /// Overrides the built-in demo token.
    #[serde(default)]
    pub fallback_token: Option<Secret<String>>,
}

fn default_au10tix_base_url() -> String {
    "https://eus-api.au10tixservicesstaging.com".to_string()
}

fn default_workflow_name() -> String {
    "Au10tix201".to_string()
}

fn default_au10tix_timeout_secs() -> u64 {
    30
}

impl Default for Au10tixSettings {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_au10tix_base_url(),
            workflow_name: default_workflow_name(),
            timeout_secs: default_au10tix_timeout_secs(),
            allow_demo_fallback: true,
            fallback_token: None,
        }
    }
}

impl Au10tixSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Clone)]
pub struct VerificationSettings {
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Sessions older than this are left to manual status checks.
    #[serde(default = "default_auto_poll_max_age_secs")]
    pub auto_poll_max_age_secs: i64,
}

fn default_retention_hours() -> i64 {
    24
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_auto_poll_max_age_secs() -> i64 {
    3600
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            auto_poll_max_age_secs: default_auto_poll_max_age_secs(),
        }
    }
}

impl VerificationSettings {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours)
    }

    pub fn auto_poll_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.auto_poll_max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;

    // Run from the crate directory or from the workspace root
    let configuration_directory = if base_path.ends_with("self-service-portal") {
        base_path.join("config")
    } else {
        base_path.join("self-service-portal").join("config")
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_fall_back_to_defaults() {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
server:
  host: 127.0.0.1
  port: 8080
portal:
  admin_username: admin
  admin_password: admin
"#,
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.sdo.search_page_size, 10);
        assert_eq!(settings.sdo.login_password_field, LoginPasswordField::Password);
        assert_eq!(settings.sdo.credential_storage, CredentialStorage::Direct);
        assert_eq!(settings.au10tix.workflow_name, "Au10tix201");
        assert!(settings.au10tix.allow_demo_fallback);
        assert_eq!(settings.verification.retention_hours, 24);
        assert_eq!(settings.verification.poll_interval(), Duration::from_secs(30));
        assert_eq!(settings.server.shutdown_grace_secs, 30);
    }

    #[test]
    fn enum_options_parse_from_yaml() {
        let sdo: SdoSettings = config::Config::builder()
            .add_source(config::File::from_str(
                "login_password_field: oa\ncredential_storage: full_reference\n",
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(sdo.login_password_field, LoginPasswordField::Oa);
        assert_eq!(sdo.credential_storage, CredentialStorage::FullReference);
        assert_eq!(sdo.default_url, "amitmt.doubleoctopus.io");
    }
}
