use {
    std::{collections::HashMap, sync::Arc},
    crate::{
        config::{DatabaseConfig, DRIVER_SQLITE},
        sql::{BoxedConnection, SqlError, SqliteConnection},
    },
};

/// Names the built-in sqlite driver is registered under.
pub const SQLITE_DRIVER_NAMES: &[&str] = &[DRIVER_SQLITE, "sqlite3", "org.sqlite.JDBC"];

pub trait Driver {
    fn connect(&self, config: &DatabaseConfig) -> Result<BoxedConnection, SqlError>;

    /// Whether `username` and `password` from the config are used when connecting.
    fn supports_credentials(&self) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct BoxedDriver {
    inner: Arc<Box<dyn Driver + Send + Sync>>,
}

impl BoxedDriver {
    pub fn new<T: Driver + Send + Sync + 'static>(inner: T) -> Self {
        Self {
            inner: Arc::new(Box::new(inner)),
        }
    }
}

impl Driver for BoxedDriver {
    fn connect(&self, config: &DatabaseConfig) -> Result<BoxedConnection, SqlError> {
        self.inner.connect(config)
    }

    fn supports_credentials(&self) -> bool {
        self.inner.supports_credentials()
    }
}

pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn connect(&self, config: &DatabaseConfig) -> Result<BoxedConnection, SqlError> {
        let connection = SqliteConnection::open(&config.url)?;
        let connection = match config.busy_timeout {
            Some(busy_timeout) => connection.with_busy_timeout(busy_timeout)?,
            None => connection,
        };
        Ok(Box::new(connection))
    }

    // sqlite has no authentication
    fn supports_credentials(&self) -> bool {
        false
    }
}

/// Drivers available to the handler, looked up by the configured driver name on every request.
#[derive(Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, BoxedDriver>,
}

impl DriverRegistry {
    pub fn empty() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    pub fn with_driver(mut self, name: impl Into<String>, driver: BoxedDriver) -> Self {
        self.drivers.insert(name.into(), driver);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<BoxedDriver> {
        self.drivers.get(name).cloned()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let sqlite = BoxedDriver::new(SqliteDriver);
        SQLITE_DRIVER_NAMES.iter()
            .fold(Self::empty(), |registry, name| registry.with_driver(*name, sqlite.clone()))
    }
}

#[cfg(test)]
mod tests {
    use {
        std::time::Duration,
        crate::sql::{Query, SqlConnection},
        super::*,
    };

    #[test]
    fn default_drivers() {
        let registry = DriverRegistry::default();
        for name in ["org.sqlite.JDBC", "sqlite", "sqlite3"] {
            assert!(!registry.resolve(name).unwrap().supports_credentials());
        }
        assert!(registry.resolve("mysql").is_none());
        assert!(registry.resolve("SQLITE").is_none());
    }

    #[test]
    fn sqlite_connect() {
        let driver = DriverRegistry::default().resolve(DRIVER_SQLITE).unwrap();
        assert!(!driver.supports_credentials());

        let config = DatabaseConfig::new(":memory:")
            .with_credentials("ignored", "ignored")
            .with_busy_timeout(Duration::from_millis(100));
        let mut connection = driver.connect(&config).unwrap();
        let row = connection.query(Query::new("select 1 as one")).unwrap().first().unwrap();
        assert_eq!(1, row.get_integer("one").unwrap());
    }

    #[test]
    fn sqlite_connect_failure() {
        let driver = SqliteDriver;
        let result = driver.connect(&DatabaseConfig::new("/this/directory/does/not/exist/hits.db"));
        assert!(matches!(result, Err(SqlError::ConnectionOpen { .. })));
    }
}
