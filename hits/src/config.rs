use {
    std::{fmt, fs, net::{IpAddr, Ipv4Addr}, path::PathBuf, time::Duration},
    serde::Deserialize,
    thiserror::Error,
};

pub const ENV_DATABASE_URL: &str = "databaseUrl";
pub const ENV_USERNAME: &str = "username";
pub const ENV_PASSWORD: &str = "password";
pub const ENV_DRIVER_NAME: &str = "driverName";

pub const DRIVER_SQLITE: &str = "sqlite";

const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {reason}")]
    FailedToRead { path: PathBuf, reason: String },

    #[error("failed to parse config: {reason}")]
    FailedToParse { reason: String },

    #[error("database url is not set, use databaseUrl env variable or database.url in config file")]
    MissingDatabaseUrl,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub database: DatabaseSection,

    /// Size of the pool running database work. Defaults to the number of cpus.
    pub worker_threads: Option<usize>,
}

impl ServerConfig {
    pub fn load(file_path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&file_path)
            .map_err(|err| ConfigError::FailedToRead {
                path: file_path.clone(),
                reason: err.to_string(),
            })?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yml::from_str(content)
            .map_err(|err| ConfigError::FailedToParse {
                reason: err.to_string(),
            })
    }

    /// Overrides database settings with the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_vars(|name| std::env::var(name).ok())
    }

    /// Empty values are treated as not set.
    pub fn with_env_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database.url = Some(url);
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            self.database.username = Some(username);
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.database.password = Some(password);
        }
        if let Some(driver) = lookup(ENV_DRIVER_NAME) {
            self.database.driver = Some(driver);
        }

        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http.port = port;
        self
    }

    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics = Some(MetricsConfig { port });
        self
    }

    pub fn with_increment_mode(mut self, increment_mode: IncrementMode) -> Self {
        self.database.increment_mode = Some(increment_mode);
        self
    }

    pub fn database(&self) -> Result<DatabaseConfig, ConfigError> {
        let section = &self.database;
        let url = section.url.clone().ok_or(ConfigError::MissingDatabaseUrl)?;

        Ok(DatabaseConfig {
            url,
            username: section.username.clone(),
            password: section.password.clone(),
            driver: section.driver.clone().unwrap_or_else(|| DRIVER_SQLITE.to_owned()),
            busy_timeout: section.busy_timeout_ms.map(Duration::from_millis),
            increment_mode: section.increment_mode.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: IpAddr,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

fn default_http_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

#[derive(Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct MetricsConfig {
    pub port: u16,
}

/// Database settings as written in the config file, before environment overrides.
#[derive(Deserialize, Clone, Default, Eq, PartialEq)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub driver: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    pub increment_mode: Option<IncrementMode>,
}

impl fmt::Debug for DatabaseSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSection")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("driver", &self.driver)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .field("increment_mode", &self.increment_mode)
            .finish()
    }
}

#[derive(Deserialize, Clone, Copy, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum IncrementMode {
    /// SELECT followed by UPDATE with no transaction. Concurrent requests for the same sequence
    /// can lose increments.
    #[default]
    ReadThenWrite,

    /// SELECT and UPDATE inside one `BEGIN IMMEDIATE` transaction.
    Transactional,
}

/// Everything a request needs to open its database connection.
#[derive(Clone, Eq, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub driver: String,
    pub busy_timeout: Option<Duration>,
    pub increment_mode: IncrementMode,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            driver: DRIVER_SQLITE.to_owned(),
            busy_timeout: None,
            increment_mode: IncrementMode::default(),
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = Some(busy_timeout);
        self
    }

    pub fn with_increment_mode(mut self, increment_mode: IncrementMode) -> Self {
        self.increment_mode = increment_mode;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("driver", &self.driver)
            .field("busy_timeout", &self.busy_timeout)
            .field("increment_mode", &self.increment_mode)
            .finish()
    }
}
