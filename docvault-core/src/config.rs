//! Store configuration.
//!
//! Every setting can be given explicitly through [`StoreConfigBuilder`]. Anything left
//! unset is looked up in the environment when the builder is resolved, and falls back to
//! a built-in default when the environment has nothing usable. Resolution never fails:
//! malformed numbers are logged and replaced by their defaults.

use std::{fmt, time::Duration};

use tracing::{info, warn};

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";
/// Default server port.
pub const DEFAULT_PORT: u16 = 27017;
/// Default database name.
pub const DEFAULT_DATABASE: &str = "ss-sprava-krvi";
/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "donor";
/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_HOST: &str = "API_MONGODB_HOST";
pub const ENV_PORT: &str = "API_MONGODB_PORT";
pub const ENV_USERNAME: &str = "API_MONGODB_USERNAME";
pub const ENV_PASSWORD: &str = "API_MONGODB_PASSWORD";
pub const ENV_DATABASE: &str = "API_MONGODB_DATABASE";
pub const ENV_COLLECTION: &str = "API_MONGODB_COLLECTION";
pub const ENV_TIMEOUT_SECONDS: &str = "API_MONGODB_TIMEOUT_SECONDS";

/// Fully resolved connection and collection settings for a document store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub collection: String,
    /// Upper bound for every individual store operation.
    pub timeout: Duration,
}

impl StoreConfig {
    /// Creates a builder with nothing set.
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Resolves a configuration purely from the environment and defaults.
    pub fn from_env() -> Self {
        Self::builder().resolve()
    }

    /// Returns the same settings bound to another collection.
    ///
    /// Stores that share a connection differ only in their collection.
    pub fn for_collection(&self, collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..self.clone()
        }
    }

    /// Connection string for the configured server, with credentials when a username is set.
    pub fn connection_uri(&self) -> String {
        if self.username.is_empty() {
            format!("mongodb://{}:{}", self.host, self.port)
        } else {
            format!(
                "mongodb://{}:{}@{}:{}",
                self.username, self.password, self.host, self.port
            )
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// Password is never printed.
impl fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "//{}@{}:{}/{}/{}",
            self.username, self.host, self.port, self.database, self.collection
        )
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for [`StoreConfig`] with per-field overrides.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use docvault::config::StoreConfig;
///
/// let config = StoreConfig::builder()
///     .collection("unit")
///     .timeout(Duration::from_secs(5))
///     .resolve();
/// ```
#[derive(Debug, Clone, Default)]
pub struct StoreConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
    collection: Option<String>,
    timeout: Option<Duration>,
}

impl StoreConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the per-operation timeout. A zero duration counts as unset.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Fills unset fields from the process environment, then from defaults.
    pub fn resolve(self) -> StoreConfig {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Fills unset fields from `lookup`, then from defaults.
    ///
    /// Empty strings for host, database and collection count as unset. An unparsable
    /// port or timeout logs a warning and the default is used.
    pub fn resolve_with<F>(self, lookup: F) -> StoreConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |explicit: Option<String>, env: &str, default: &str| {
            explicit
                .filter(|value| !value.is_empty())
                .or_else(|| lookup(env))
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let port = self.port.filter(|port| *port != 0).unwrap_or_else(|| {
            match lookup(ENV_PORT) {
                None => DEFAULT_PORT,
                Some(raw) => match raw.trim().parse::<u16>() {
                    Ok(port) if port != 0 => port,
                    _ => {
                        warn!(value = %raw, default = DEFAULT_PORT, "invalid port value, using default");
                        DEFAULT_PORT
                    }
                },
            }
        });

        let timeout = self.timeout.unwrap_or_else(|| match lookup(ENV_TIMEOUT_SECONDS) {
            None => DEFAULT_TIMEOUT,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(seconds) if seconds > 0 => Duration::from_secs(seconds),
                _ => {
                    warn!(
                        value = %raw,
                        default = DEFAULT_TIMEOUT.as_secs(),
                        "invalid timeout value, using default"
                    );
                    DEFAULT_TIMEOUT
                }
            },
        });

        let config = StoreConfig {
            host: text(self.host, ENV_HOST, DEFAULT_HOST),
            port,
            username: self.username.or_else(|| lookup(ENV_USERNAME)).unwrap_or_default(),
            password: self.password.or_else(|| lookup(ENV_PASSWORD)).unwrap_or_default(),
            database: text(self.database, ENV_DATABASE, DEFAULT_DATABASE),
            collection: text(self.collection, ENV_COLLECTION, DEFAULT_COLLECTION),
            timeout,
        };

        info!(config = %config, timeout = ?config.timeout, "resolved document store config");
        config
    }
}
