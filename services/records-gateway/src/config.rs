//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The session cookie is loaded from RECORDS_SESSION_COOKIE or
//! session_cookie_file and the optional initial access token from
//! RECORDS_ACCESS_TOKEN. Neither is ever read from the TOML itself.

use common::Secret;
use serde::{Deserialize, Deserializer};
use session_auth::{DEFAULT_ENTRY_POINT_PATH, DEFAULT_RENEWAL_PATH, DEFAULT_RENEWAL_TIMEOUT_SECS};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use transport::Url;

pub const SESSION_COOKIE_ENV: &str = "RECORDS_SESSION_COOKIE";
pub const ACCESS_TOKEN_ENV: &str = "RECORDS_ACCESS_TOKEN";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub backend: BackendConfig,
    pub auth: AuthConfig,
}

/// Inbound listener settings
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Per upstream request
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(deserialize_with = "deserialize_url")]
    pub url: Url,
}

/// Credential renewal and session teardown
///
/// `renewal_url` and `entry_point` default to well-known paths on the backend.
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default, deserialize_with = "deserialize_opt_url")]
    pub renewal_url: Option<Url>,
    #[serde(default, deserialize_with = "deserialize_opt_url")]
    pub entry_point: Option<Url>,
    #[serde(default = "default_renewal_timeout")]
    pub renewal_timeout_secs: u64,
    #[serde(default)]
    pub session_cookie_file: Option<PathBuf>,
    #[serde(skip)]
    pub session_cookie: Option<Secret<String>>,
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
}

fn deserialize_url<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Url, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Url::parse(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_opt_url<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Url>, D::Error> {
    deserialize_url(deserializer).map(Some)
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

fn default_renewal_timeout() -> u64 {
    DEFAULT_RENEWAL_TIMEOUT_SECS
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AuthConfig {
    pub fn renewal_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_timeout_secs)
    }
}

/// Append `path_and_query` to the backend base URL, keeping any path prefix
/// the backend is mounted under.
pub fn backend_join(backend: &Url, path_and_query: &str) -> Result<Url, String> {
    let raw = format!("{}{}", backend.as_str().trim_end_matches('/'), path_and_query);
    Url::parse(&raw).map_err(|e| format!("invalid target {raw}: {e}"))
}

impl Config {
    /// Load configuration from a TOML file, then overlay secrets from the
    /// environment.
    ///
    /// Session cookie resolution order:
    /// 1. RECORDS_SESSION_COOKIE env var
    /// 2. session_cookie_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        require_http("backend.url", &config.backend.url)?;
        require_http("auth.renewal_url", &config.renewal_url()?)?;
        config.entry_point()?;

        if config.gateway.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if config.gateway.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if config.auth.renewal_timeout_secs == 0 {
            return Err(common::Error::Config(
                "renewal_timeout_secs must be greater than 0".into(),
            ));
        }

        if let Ok(cookie) = std::env::var(SESSION_COOKIE_ENV) {
            config.auth.session_cookie = non_empty(cookie);
        } else if let Some(ref cookie_file) = config.auth.session_cookie_file {
            let cookie = std::fs::read_to_string(cookie_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read session_cookie_file {}: {e}",
                    cookie_file.display()
                ))
            })?;
            config.auth.session_cookie = non_empty(cookie);
        }

        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            config.auth.access_token = non_empty(token);
        }

        Ok(config)
    }

    /// Renewal endpoint, defaulting to `DEFAULT_RENEWAL_PATH` on the backend.
    pub fn renewal_url(&self) -> common::Result<Url> {
        self.auth_url(self.auth.renewal_url.as_ref(), DEFAULT_RENEWAL_PATH)
    }

    /// Where users are sent once the session is torn down.
    pub fn entry_point(&self) -> common::Result<Url> {
        self.auth_url(self.auth.entry_point.as_ref(), DEFAULT_ENTRY_POINT_PATH)
    }

    fn auth_url(&self, configured: Option<&Url>, default_path: &str) -> common::Result<Url> {
        match configured {
            Some(url) => Ok(url.clone()),
            None => backend_join(&self.backend.url, default_path).map_err(|e| {
                common::Error::Config(format!("cannot derive {default_path} from backend.url: {e}"))
            }),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("records-gateway.toml")
    }
}

fn require_http(field: &str, url: &Url) -> common::Result<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(common::Error::Config(format!(
            "{field} must use http or https, got scheme: {other}"
        ))),
    }
}

fn non_empty(value: String) -> Option<Secret<String>> {
    let value = value.trim();
    (!value.is_empty()).then(|| Secret::new(value.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serializes tests that touch process environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_secret_env() {
        unsafe {
            remove_env(SESSION_COOKIE_ENV);
            remove_env(ACCESS_TOKEN_ENV);
        }
    }

    const VALID: &str = r#"
[gateway]
listen_addr = "127.0.0.1:8080"

[backend]
url = "https://records.example.com"

[auth]
renewal_url = "https://records.example.com/api/auth/refresh"
entry_point = "https://records.example.com/login"
"#;

    fn write(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("records-gateway.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_applies_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = TempDir::new().unwrap();

        let config = Config::load(&write(&dir, VALID)).unwrap();
        assert_eq!(config.gateway.max_connections, 1000);
        assert_eq!(config.gateway.timeout(), Duration::from_secs(60));
        assert_eq!(config.auth.renewal_timeout(), Duration::from_secs(10));
        assert_eq!(config.backend.url.as_str(), "https://records.example.com/");
        assert_eq!(config.entry_point().unwrap().path(), "/login");
        assert_eq!(
            config.renewal_url().unwrap().as_str(),
            "https://records.example.com/api/auth/refresh"
        );
        assert!(config.auth.session_cookie.is_none());
        assert!(config.auth.access_token.is_none());
    }

    #[test]
    fn auth_urls_default_to_backend_paths() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = TempDir::new().unwrap();
        let contents = r#"
[gateway]
listen_addr = "127.0.0.1:8080"

[backend]
url = "https://records.example.com/app/"

[auth]
"#;
        let config = Config::load(&write(&dir, contents)).unwrap();
        assert_eq!(
            config.renewal_url().unwrap().as_str(),
            "https://records.example.com/app/api/auth/refresh"
        );
        assert_eq!(
            config.entry_point().unwrap().as_str(),
            "https://records.example.com/app/login"
        );
    }

    #[test]
    fn non_http_renewal_url_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let contents = VALID.replace(
            "https://records.example.com/api/auth/refresh",
            "ws://records.example.com/api/auth/refresh",
        );
        let err = Config::load(&write(&dir, &contents)).unwrap_err();
        assert!(err.to_string().contains("auth.renewal_url"), "got: {err}");
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(Config::load(Path::new("/nonexistent/records-gateway.toml")).is_err());
    }

    #[test]
    fn load_invalid_toml_fails() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&write(&dir, "not valid {{{{ toml")).unwrap_err();
        assert!(matches!(err, common::Error::Toml(_)), "got: {err:?}");
    }

    #[test]
    fn non_http_backend_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let contents = VALID.replace("https://records.example.com\"", "ftp://records.example.com\"");
        let err = Config::load(&write(&dir, &contents)).unwrap_err();
        assert!(err.to_string().contains("backend.url"), "got: {err}");
    }

    #[test]
    fn zero_values_are_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = TempDir::new().unwrap();
        for (field, section) in [
            ("timeout_secs = 0", "[gateway]"),
            ("max_connections = 0", "[gateway]"),
            ("renewal_timeout_secs = 0", "[auth]"),
        ] {
            let contents = VALID.replace(section, &format!("{section}\n{field}"));
            let err = Config::load(&write(&dir, &contents)).unwrap_err();
            assert!(
                err.to_string().contains("greater than 0"),
                "{field} must be rejected, got: {err}"
            );
        }
    }

    #[test]
    fn secrets_come_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = TempDir::new().unwrap();
        unsafe {
            set_env(SESSION_COOKIE_ENV, "sid=env");
            set_env(ACCESS_TOKEN_ENV, "at_env\n");
        }
        let config = Config::load(&write(&dir, VALID)).unwrap();
        clear_secret_env();

        assert_eq!(config.auth.session_cookie.unwrap().expose(), "sid=env");
        assert_eq!(config.auth.access_token.unwrap().expose(), "at_env");
    }

    #[test]
    fn session_cookie_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = TempDir::new().unwrap();
        let cookie_path = dir.path().join("cookie");
        std::fs::write(&cookie_path, "sid=file\n").unwrap();
        let contents = format!(
            "{VALID}session_cookie_file = \"{}\"\n",
            cookie_path.display()
        );

        let config = Config::load(&write(&dir, &contents)).unwrap();
        assert_eq!(config.auth.session_cookie.unwrap().expose(), "sid=file");
    }

    #[test]
    fn env_cookie_overrides_missing_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let contents = format!("{VALID}session_cookie_file = \"/nonexistent/cookie\"\n");
        unsafe { set_env(SESSION_COOKIE_ENV, "sid=env") };
        let config = Config::load(&write(&dir, &contents));
        clear_secret_env();

        assert_eq!(config.unwrap().auth.session_cookie.unwrap().expose(), "sid=env");
    }

    #[test]
    fn missing_cookie_file_is_an_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = TempDir::new().unwrap();
        let contents = format!("{VALID}session_cookie_file = \"/nonexistent/cookie\"\n");
        let err = Config::load(&write(&dir, &contents)).unwrap_err();
        assert!(err.to_string().contains("session_cookie_file"), "got: {err}");
    }

    #[test]
    fn blank_cookie_file_yields_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = TempDir::new().unwrap();
        let cookie_path = dir.path().join("cookie");
        std::fs::write(&cookie_path, "  \n").unwrap();
        let contents = format!(
            "{VALID}session_cookie_file = \"{}\"\n",
            cookie_path.display()
        );
        let config = Config::load(&write(&dir, &contents)).unwrap();
        assert!(config.auth.session_cookie.is_none());
    }

    #[test]
    fn resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("records-gateway.toml"));

        unsafe { set_env("CONFIG_PATH", "/env/gateway.toml") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("/env/gateway.toml"));
        assert_eq!(
            Config::resolve_path(Some("/cli/gateway.toml")),
            PathBuf::from("/cli/gateway.toml"),
            "CLI arg must take precedence over CONFIG_PATH"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
