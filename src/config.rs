//! Gateway configuration
//!
//! [`GatewayConfig`] is assembled either through [`GatewayConfig::builder`] or
//! from `MODELGATE_*` environment variables with [`GatewayConfig::from_env`]:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `MODELGATE_HOST` / `MODELGATE_PORT` | bind address (`0.0.0.0:3000`) |
//! | `MODELGATE_ENV` | `development` or `production` |
//! | `MODELGATE_PLUGINS_DIR` | root of descriptor plugins |
//! | `MODELGATE_API_KEYS` | `id:key[:user]`, comma separated |
//! | `MODELGATE_INVOCATION_TIMEOUT_SECS` | per-invocation timeout |
//! | `MODELGATE_MAX_FILE_SIZE` / `MODELGATE_MAX_FILES` | default upload limits |
//! | `MODELGATE_LOG_LEVEL` / `MODELGATE_LOG_FORMAT` / `MODELGATE_LOG_FILE` | logging |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::ApiKeyRecord;
use crate::error::{GatewayError, Result};
use crate::telemetry::{OutputFormat, SubscriberConfig, parse_level};
use crate::upload::UploadPolicy;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

const ONE_MIB: usize = 1024 * 1024;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Error responses include the source chain
    #[default]
    Development,
    /// Error responses omit the source chain
    Production,
}

impl Environment {
    /// Whether this is a production deployment.
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl FromStr for Environment {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "test" | "local" => Ok(Self::Development),
            _ => Err(GatewayError::Configuration(format!(
                "Invalid environment: {s}. Valid options: development, production"
            ))),
        }
    }
}

/// Everything needed to start a gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listening address
    pub bind_addr: SocketAddr,
    /// Deployment environment
    pub environment: Environment,
    /// Root directory of descriptor plugins
    pub plugins_dir: Option<PathBuf>,
    /// Accepted API keys; empty disables authentication
    pub api_keys: Vec<ApiKeyRecord>,
    /// Upper bound for a single strategy call
    pub invocation_timeout: Option<Duration>,
    /// Limits for inferred upload policies
    pub upload: UploadPolicy,
    /// Maximum request body size in bytes
    pub body_limit: usize,
    /// Logging
    pub telemetry: SubscriberConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let upload = UploadPolicy::default();
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            environment: Environment::default(),
            plugins_dir: None,
            api_keys: Vec::new(),
            invocation_timeout: None,
            body_limit: default_body_limit(&upload),
            upload,
            telemetry: SubscriberConfig::default(),
        }
    }
}

/// Room for a full multipart upload under `upload`, plus text fields.
fn default_body_limit(upload: &UploadPolicy) -> usize {
    upload
        .max_file_size
        .saturating_mul(upload.max_files)
        .saturating_add(ONE_MIB)
}

impl GatewayConfig {
    /// Create a new builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Read the configuration from `MODELGATE_*` variables.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();

        let host = match env_var("MODELGATE_HOST") {
            Some(host) if host.eq_ignore_ascii_case("localhost") => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Some(host) => host
                .parse::<IpAddr>()
                .map_err(|_| invalid("MODELGATE_HOST", &host))?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };
        let port = parse_env::<u16>("MODELGATE_PORT")?.unwrap_or(DEFAULT_PORT);
        builder = builder.bind_addr(SocketAddr::new(host, port));

        if let Some(env) = env_var("MODELGATE_ENV") {
            builder = builder.environment(env.parse()?);
        }
        if let Some(dir) = env_var("MODELGATE_PLUGINS_DIR") {
            builder = builder.plugins_dir(dir);
        }
        if let Some(keys) = env_var("MODELGATE_API_KEYS") {
            builder = builder.api_keys(parse_api_keys(&keys)?);
        }
        if let Some(secs) = parse_env::<u64>("MODELGATE_INVOCATION_TIMEOUT_SECS")? {
            builder = builder.invocation_timeout(Duration::from_secs(secs));
        }

        let mut upload = UploadPolicy::default();
        if let Some(size) = parse_env::<usize>("MODELGATE_MAX_FILE_SIZE")? {
            upload = upload.with_max_file_size(size);
        }
        if let Some(count) = parse_env::<usize>("MODELGATE_MAX_FILES")? {
            upload = upload.with_max_files(count);
        }
        builder = builder.upload_policy(upload);

        let mut telemetry = SubscriberConfig::builder();
        if let Some(level) = env_var("MODELGATE_LOG_LEVEL") {
            telemetry = telemetry.log_level(
                parse_level(&level).map_err(|_| invalid("MODELGATE_LOG_LEVEL", &level))?,
            );
        }
        if let Some(format) = env_var("MODELGATE_LOG_FORMAT") {
            let format = format
                .parse::<OutputFormat>()
                .map_err(|_| invalid("MODELGATE_LOG_FORMAT", &format))?;
            telemetry = telemetry.output_format(format);
        }
        if let Some(file) = env_var("MODELGATE_LOG_FILE") {
            telemetry = telemetry.log_file(PathBuf::from(file));
        }
        builder = builder.telemetry(telemetry.build());

        builder.build()
    }
}

/// Builder for [`GatewayConfig`]
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    bind_addr: Option<SocketAddr>,
    environment: Option<Environment>,
    plugins_dir: Option<PathBuf>,
    api_keys: Vec<ApiKeyRecord>,
    invocation_timeout: Option<Duration>,
    upload: Option<UploadPolicy>,
    body_limit: Option<usize>,
    telemetry: Option<SubscriberConfig>,
}

impl GatewayConfigBuilder {
    /// Set the listening address
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Set the environment
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Set the plugins directory
    pub fn plugins_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugins_dir = Some(dir.into());
        self
    }

    /// Accept one more API key
    pub fn api_key(mut self, key: ApiKeyRecord) -> Self {
        self.api_keys.push(key);
        self
    }

    /// Replace the accepted API keys
    pub fn api_keys(mut self, keys: Vec<ApiKeyRecord>) -> Self {
        self.api_keys = keys;
        self
    }

    /// Bound every strategy call
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = Some(timeout);
        self
    }

    /// Set the limits for inferred upload policies
    pub fn upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload = Some(policy);
        self
    }

    /// Set the request body limit
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = Some(bytes);
        self
    }

    /// Set the logging configuration
    pub fn telemetry(mut self, telemetry: SubscriberConfig) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<GatewayConfig> {
        let defaults = GatewayConfig::default();
        let upload = self.upload.unwrap_or(defaults.upload);
        if upload.max_files == 0 || upload.max_file_size == 0 {
            return Err(GatewayError::Configuration(
                "Upload limits must be greater than zero".to_string(),
            ));
        }
        if self.invocation_timeout.is_some_and(|t| t.is_zero()) {
            return Err(GatewayError::Configuration(
                "Invocation timeout must be greater than zero".to_string(),
            ));
        }

        Ok(GatewayConfig {
            bind_addr: self.bind_addr.unwrap_or(defaults.bind_addr),
            environment: self.environment.unwrap_or_default(),
            plugins_dir: self.plugins_dir,
            api_keys: self.api_keys,
            invocation_timeout: self.invocation_timeout,
            body_limit: self.body_limit.unwrap_or_else(|| default_body_limit(&upload)),
            upload,
            telemetry: self.telemetry.unwrap_or_default(),
        })
    }
}

/// Parse `id:key[:user]` entries separated by commas.
pub fn parse_api_keys(raw: &str) -> Result<Vec<ApiKeyRecord>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':').map(str::trim);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(key), user) if !id.is_empty() && !key.is_empty() => {
                    let record = ApiKeyRecord::new(id, key);
                    Ok(match user.filter(|u| !u.is_empty()) {
                        Some(user) => record.with_user(user),
                        None => record,
                    })
                }
                _ => Err(GatewayError::Configuration(format!(
                    "Invalid MODELGATE_API_KEYS entry for key '{}': expected id:key[:user]",
                    entry.split(':').next().unwrap_or_default()
                ))),
            }
        })
        .collect()
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>> {
    env_var(key)
        .map(|value| value.parse::<T>().map_err(|_| invalid(key, &value)))
        .transpose()
}

fn invalid(key: &str, value: &str) -> GatewayError {
    GatewayError::Configuration(format!("Invalid value for {key}: '{value}'"))
}
