//! Player configuration.
//!
//! Settings are resolved in order of precedence from highest to lowest:
//! 1. Command line arguments (applied by the binary)
//! 2. Environment variables (`TUNER_CORS_PROXY`, `TUNER_TRUSTED_HOSTS`)
//! 3. The TOML configuration file
//! 4. Hard coded defaults
//!
//! # Example
//!
//! ```toml
//! cors_proxy = "https://proxy.example.org/?"
//! trusted_hosts = ["stream.example.com", "icecast.example.net"]
//! load_timeout = 12
//! stall_retries = 3
//! verify_streams = true
//! volume = 0.8
//! ```

use std::{env, fs, path::Path, time::Duration};

use serde::Deserialize;
use veil::Redact;

use crate::{
    error::{Error, Result},
    store::clamp_volume,
};

/// Environment variable with the CORS proxy prefix.
pub const ENV_CORS_PROXY: &str = "TUNER_CORS_PROXY";

/// Environment variable with a comma-separated trusted host list.
pub const ENV_TRUSTED_HOSTS: &str = "TUNER_TRUSTED_HOSTS";

#[derive(Redact, Clone, PartialEq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    pub user_agent: String,

    /// Prefix prepended to stream URLs of untrusted hosts.
    ///
    /// Proxies frequently carry an API key in their prefix, so this is
    /// redacted from debug output.
    #[redact]
    pub cors_proxy: Option<String>,

    /// Streaming hosts that are reached directly. Subdomains match too.
    pub trusted_hosts: Vec<String>,

    /// How long a single candidate may take to become ready.
    pub load_timeout: Duration,

    /// Reload attempts after a stall before the stream is given up.
    pub stall_retries: u32,

    /// Delay before the first reload after a stall; doubles per attempt.
    pub stall_backoff: Duration,

    pub verify_streams: bool,
    pub verify_timeout: Duration,

    /// Initial volume in `[0.0, 1.0]`.
    pub volume: f32,
}

/// On-disk representation. Every key is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct File {
    cors_proxy: Option<String>,
    trusted_hosts: Option<Vec<String>>,
    load_timeout: Option<u64>,
    stall_retries: Option<u32>,
    stall_backoff: Option<u64>,
    verify_streams: Option<bool>,
    verify_timeout: Option<u64>,
    volume: Option<f32>,
}

impl Config {
    pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(12);
    pub const DEFAULT_STALL_RETRIES: u32 = 3;
    pub const DEFAULT_STALL_BACKOFF: Duration = Duration::from_secs(1);
    pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_VOLUME: f32 = 0.8;

    /// Creates a configuration with defaults and no proxy.
    ///
    /// # Errors
    ///
    /// Returns an error when the `User-Agent` cannot be built from the
    /// package and operating system names.
    pub fn new() -> Result<Self> {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
        {
            return Err(Error::internal(format!(
                "application name and/or version invalid (\"{app_name}\"; \"{app_version}\")"
            )));
        }

        let os_name = match env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version()
            .filter(|version| !version.is_empty() && !version.contains(illegal_chars))
            .unwrap_or_else(|| String::from("0"));

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})");
        trace!("user agent: {user_agent}");

        Ok(Self {
            app_name,
            app_version,
            user_agent,
            cors_proxy: None,
            trusted_hosts: Vec::new(),
            load_timeout: Self::DEFAULT_LOAD_TIMEOUT,
            stall_retries: Self::DEFAULT_STALL_RETRIES,
            stall_backoff: Self::DEFAULT_STALL_BACKOFF,
            verify_streams: true,
            verify_timeout: Self::DEFAULT_VERIFY_TIMEOUT,
            volume: Self::DEFAULT_VOLUME,
        })
    }

    /// Loads the configuration file, then applies environment overrides.
    ///
    /// A missing file is not an error: defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::new()?;

        match fs::read_to_string(path) {
            Ok(contents) => {
                config.merge_toml(&contents)?;
                debug!("loaded configuration from {}", path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, using defaults", path.display());
            }
            Err(e) => return Err(e.into()),
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Merges TOML settings on top of the current values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` on malformed TOML, unknown keys or
    /// out-of-range values.
    pub fn merge_toml(&mut self, contents: &str) -> Result<()> {
        let file: File = toml::from_str(contents)?;

        if let Some(proxy) = file.cors_proxy {
            self.set_cors_proxy(&proxy)?;
        }
        if let Some(hosts) = file.trusted_hosts {
            self.trusted_hosts = normalize_hosts(hosts);
        }
        if let Some(secs) = file.load_timeout {
            if secs == 0 {
                return Err(Error::invalid_argument("load_timeout must be positive"));
            }
            self.load_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = file.stall_retries {
            self.stall_retries = retries;
        }
        if let Some(secs) = file.stall_backoff {
            self.stall_backoff = Duration::from_secs(secs);
        }
        if let Some(verify) = file.verify_streams {
            self.verify_streams = verify;
        }
        if let Some(secs) = file.verify_timeout {
            self.verify_timeout = Duration::from_secs(secs);
        }
        if let Some(volume) = file.volume {
            self.volume = clamp_volume(volume).ok_or_else(|| {
                Error::invalid_argument(format!("volume {volume} is not a number"))
            })?;
        }

        Ok(())
    }

    /// Applies `TUNER_CORS_PROXY` and `TUNER_TRUSTED_HOSTS`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the proxy prefix is not an absolute
    /// HTTP(S) URL.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(proxy) = env::var(ENV_CORS_PROXY) {
            self.set_cors_proxy(&proxy)?;
        }
        if let Ok(hosts) = env::var(ENV_TRUSTED_HOSTS) {
            self.trusted_hosts = normalize_hosts(hosts.split(','));
        }
        Ok(())
    }

    /// Sets the proxy prefix. An empty value disables proxying.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the prefix is not an absolute HTTP(S)
    /// URL. The previous prefix is kept in that case.
    pub fn set_cors_proxy(&mut self, proxy: &str) -> Result<()> {
        let proxy = proxy.trim();
        if proxy.is_empty() {
            self.cors_proxy = None;
            return Ok(());
        }

        match url::Url::parse(proxy) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
                self.cors_proxy = Some(proxy.to_owned());
                Ok(())
            }
            // The prefix may carry a key, so it is not echoed back.
            _ => Err(Error::invalid_argument(
                "cors proxy must be an absolute http(s) url",
            )),
        }
    }
}

fn normalize_hosts<I, S>(hosts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    hosts
        .into_iter()
        .map(|host| host.as_ref().trim().trim_start_matches("*.").to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new().unwrap();
        assert_eq!(config.load_timeout, Duration::from_secs(12));
        assert_eq!(config.stall_retries, 3);
        assert!(config.cors_proxy.is_none());
        assert!(config.user_agent.starts_with("tuner/"));
    }

    #[test]
    fn merges_toml() {
        let mut config = Config::new().unwrap();
        config
            .merge_toml(
                r#"
                cors_proxy = "https://proxy.example.org/?"
                trusted_hosts = ["Stream.Example.com", "*.icecast.example.net", " "]
                load_timeout = 15
                volume = 1.4
                "#,
            )
            .unwrap();

        assert_eq!(
            config.cors_proxy.as_deref(),
            Some("https://proxy.example.org/?")
        );
        assert_eq!(
            config.trusted_hosts,
            vec!["stream.example.com", "icecast.example.net"]
        );
        assert_eq!(config.load_timeout, Duration::from_secs(15));
        assert!((config.volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_unknown_keys_and_zero_timeout() {
        let mut config = Config::new().unwrap();
        assert!(config.merge_toml("cors = \"x\"").is_err());
        assert!(config.merge_toml("load_timeout = 0").is_err());
    }

    #[test]
    fn proxy_is_redacted() {
        let mut config = Config::new().unwrap();
        config
            .set_cors_proxy("https://proxy.example.org/?key=secret&url=")
            .unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn rejects_proxy_without_scheme() {
        let mut config = Config::new().unwrap();
        config.set_cors_proxy("https://proxy.example.org/?").unwrap();

        let err = config.set_cors_proxy("proxy.example.org/?url=").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidArgument);
        assert!(config
            .merge_toml(r#"cors_proxy = "ftp://proxy.example.org/""#)
            .is_err());
        assert_eq!(
            config.cors_proxy.as_deref(),
            Some("https://proxy.example.org/?")
        );

        config.set_cors_proxy(" ").unwrap();
        assert!(config.cors_proxy.is_none());
    }
}
