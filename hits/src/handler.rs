use {
    tracing::{info, error, warn, debug},
    hits_core::{CounterRequest, SequenceCounter, VisitCountResponse, VISIT_COUNT_UNKNOWN},
    crate::{
        config::{DatabaseConfig, IncrementMode},
        driver::{BoxedDriver, Driver, DriverRegistry},
        error::CounterError,
        sql::{BoxedConnection, Query, SqlConnection},
    },
};

const QUERY_SELECT_SEQUENCE: &str = "SELECT * FROM website_hit_sequence WHERE sequence_name = ?";
const QUERY_UPDATE_SEQUENCE: &str = "UPDATE website_hit_sequence SET sequence_count = ? WHERE id = ?";
const QUERY_CHECK_TABLE: &str = "SELECT 1 FROM website_hit_sequence LIMIT 1";

/// Increments and returns named visit counters.
///
/// Every request opens its own connection, runs one SELECT and one UPDATE and closes the
/// connection again. With [`IncrementMode::ReadThenWrite`] nothing guards the pair, so concurrent
/// requests for the same sequence can both read `N` and both write `N + 1`.
pub struct CounterHandler {
    config: DatabaseConfig,
    drivers: DriverRegistry,
}

impl CounterHandler {
    pub fn new(config: DatabaseConfig) -> Self {
        Self::with_drivers(config, DriverRegistry::default())
    }

    pub fn with_drivers(config: DatabaseConfig, drivers: DriverRegistry) -> Self {
        Self {
            config,
            drivers,
        }
    }

    pub fn handle(&self, request: &CounterRequest) -> VisitCountResponse {
        let sequence_name = match request.sequence() {
            Some(v) => v,
            None => return VisitCountResponse::missing_sequence(),
        };

        match self.increment(sequence_name) {
            Ok(visit_count) => {
                info!("API call success, sequence: {sequence_name:?}, visit_count: {visit_count}");
                VisitCountResponse::counted(visit_count)
            },
            Err(err) => {
                error!("API call failed: {err}, sequence: {sequence_name:?}, details: {err:?}");
                VisitCountResponse::internal_error()
            }
        }
    }

    /// Returns the new count. A sequence that does not exist counts as `-1`, so the result is `0`
    /// and the update changes no rows.
    pub fn increment(&self, sequence_name: &str) -> Result<i64, CounterError> {
        let mut connection = self.connect()?;

        match self.config.increment_mode {
            IncrementMode::ReadThenWrite => increment_sequence(connection.as_mut(), sequence_name),
            IncrementMode::Transactional => increment_sequence_in_transaction(connection.as_mut(), sequence_name),
        }
    }

    /// Opens one connection and checks that the sequence table is there, used at startup.
    pub fn check_connection(&self) -> Result<(), CounterError> {
        let driver = self.driver()?;
        if self.config.has_credentials() && !driver.supports_credentials() {
            warn!("database driver {:?} does not use credentials, username and password are ignored", self.config.driver);
        }

        let mut connection = driver.connect(&self.config)
            .map_err(|err| CounterError::ConnectionFailed { reason: err.to_string() })?;
        connection.query(Query::new(QUERY_CHECK_TABLE))
            .map_err(|err| CounterError::QueryFailed { reason: err.to_string() })?;

        Ok(())
    }

    fn driver(&self) -> Result<BoxedDriver, CounterError> {
        self.drivers.resolve(&self.config.driver)
            .ok_or_else(|| CounterError::DriverUnavailable {
                driver: self.config.driver.clone(),
            })
    }

    fn connect(&self) -> Result<BoxedConnection, CounterError> {
        self.driver()?
            .connect(&self.config)
            .map_err(|err| CounterError::ConnectionFailed { reason: err.to_string() })
    }
}

fn find_sequence(connection: &mut dyn SqlConnection, sequence_name: &str) -> Result<Option<SequenceCounter>, CounterError> {
    let query_failed = |reason: String| CounterError::QueryFailed { reason };

    let row = match connection.query(Query::new(QUERY_SELECT_SEQUENCE).bind(sequence_name))
        .map_err(|err| query_failed(err.to_string()))?
        .first() {
        Some(v) => v,
        None => return Ok(None),
    };

    Ok(Some(SequenceCounter {
        id: row.get_integer("id").map_err(|err| query_failed(err.to_string()))?,
        sequence_name: sequence_name.to_owned(),
        sequence_count: row.get_integer("sequence_count").map_err(|err| query_failed(err.to_string()))?,
    }))
}

fn increment_sequence(connection: &mut dyn SqlConnection, sequence_name: &str) -> Result<i64, CounterError> {
    let (id, count) = match find_sequence(connection, sequence_name)? {
        Some(counter) => (counter.id, counter.sequence_count),
        None => (VISIT_COUNT_UNKNOWN, VISIT_COUNT_UNKNOWN),
    };

    let visit_count = count.checked_add(1)
        .ok_or_else(|| CounterError::UpdateFailed {
            reason: format!("sequence_count overflow for id {id}"),
        })?;

    let updated = connection.execute(Query::new(QUERY_UPDATE_SEQUENCE).bind(visit_count).bind(id))
        .map_err(|err| CounterError::UpdateFailed { reason: err.to_string() })?;
    if updated == 0 {
        debug!("sequence {sequence_name:?} does not exist, nothing updated");
    }

    Ok(visit_count)
}

fn increment_sequence_in_transaction(connection: &mut dyn SqlConnection, sequence_name: &str) -> Result<i64, CounterError> {
    connection.execute(Query::new("BEGIN IMMEDIATE"))
        .map_err(|err| CounterError::QueryFailed { reason: err.to_string() })?;

    let result = increment_sequence(connection, sequence_name)
        .and_then(|visit_count| {
            connection.execute(Query::new("COMMIT"))
                .map(|_| visit_count)
                .map_err(|err| CounterError::UpdateFailed { reason: err.to_string() })
        });

    if result.is_err() {
        if let Err(err) = connection.execute(Query::new("ROLLBACK")) {
            // the transaction is dropped with the connection anyway
            warn!("failed to rollback increment of {sequence_name:?}: {err}");
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use {
        std::sync::{Arc, atomic::{AtomicUsize, Ordering}},
        crate::sql::{QueryResult, Row, SqlError, Value},
        super::*,
    };

    struct CountingDriver {
        connections: Arc<AtomicUsize>,
    }

    impl Driver for CountingDriver {
        fn connect(&self, _config: &DatabaseConfig) -> Result<BoxedConnection, SqlError> {
            self.connections.fetch_add(1, Ordering::SeqCst);
            Err(SqlError::ConnectionOpen { reason: "connection refused".to_owned() })
        }
    }

    /// Answers the SELECT with a fixed row and records the UPDATE parameters.
    struct FixedConnection {
        row: Option<(i64, i64)>,
        updates: Arc<std::sync::Mutex<Vec<Query>>>,
    }

    impl SqlConnection for FixedConnection {
        fn query(&mut self, query: Query) -> Result<QueryResult, SqlError> {
            assert_eq!(QUERY_SELECT_SEQUENCE, query.stmt());
            let names: Arc<[String]> = vec!["id".to_owned(), "sequence_name".to_owned(), "sequence_count".to_owned()].into();
            Ok(QueryResult {
                rows: self.row.iter()
                    .map(|(id, count)| Row::new(names.clone(), vec![
                        (*id).into(),
                        query.params()[0].clone(),
                        (*count).into(),
                    ]))
                    .collect(),
            })
        }

        fn execute(&mut self, query: Query) -> Result<usize, SqlError> {
            self.updates.lock().unwrap().push(query);
            Ok(if self.row.is_some() { 1 } else { 0 })
        }
    }

    fn counting_handler() -> (CounterHandler, Arc<AtomicUsize>) {
        let connections = Arc::new(AtomicUsize::new(0));
        let drivers = DriverRegistry::empty()
            .with_driver("counting", BoxedDriver::new(CountingDriver { connections: connections.clone() }));
        let handler = CounterHandler::with_drivers(DatabaseConfig::new("counting://").with_driver("counting"), drivers);
        (handler, connections)
    }

    #[test]
    fn missing_sequence_does_not_connect() {
        let (handler, connections) = counting_handler();

        for request in [
            CounterRequest::new(),
            CounterRequest::new().with_sequence(""),
            CounterRequest::new().with_sequence(" \t "),
        ] {
            assert_eq!(VisitCountResponse::missing_sequence(), handler.handle(&request));
        }

        assert_eq!(0, connections.load(Ordering::SeqCst));
    }

    #[test]
    fn connection_failure() {
        let (handler, connections) = counting_handler();
        let response = handler.handle(&CounterRequest::new().with_sequence("homepage"));
        assert_eq!(VisitCountResponse::internal_error(), response);
        assert_eq!(1, connections.load(Ordering::SeqCst));
        assert_eq!(
            Err(CounterError::ConnectionFailed { reason: "failed to open connection: connection refused".to_owned() }),
            handler.increment("homepage")
        );
    }

    #[test]
    fn driver_unavailable() {
        let handler = CounterHandler::new(DatabaseConfig::new(":memory:").with_driver("com.mysql.jdbc.Driver"));
        assert_eq!(
            Err(CounterError::DriverUnavailable { driver: "com.mysql.jdbc.Driver".to_owned() }),
            handler.increment("homepage")
        );
        assert_eq!(VisitCountResponse::internal_error(), handler.handle(&CounterRequest::new().with_sequence("homepage")));
        assert!(handler.check_connection().is_err());
    }

    #[test]
    fn increment_existing() {
        let updates = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut connection = FixedConnection { row: Some((3, 41)), updates: updates.clone() };

        assert_eq!(Ok(42), increment_sequence(&mut connection, "homepage"));

        let updates = updates.lock().unwrap();
        assert_eq!(1, updates.len());
        assert_eq!(QUERY_UPDATE_SEQUENCE, updates[0].stmt());
        assert_eq!(vec![Value::Integer(42), Value::Integer(3)], updates[0].params().to_vec());
    }

    #[test]
    fn increment_missing_updates_sentinel_id() {
        let updates = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut connection = FixedConnection { row: None, updates: updates.clone() };

        assert_eq!(Ok(0), increment_sequence(&mut connection, "unknown"));
        assert_eq!(vec![Value::Integer(0), Value::Integer(-1)], updates.lock().unwrap()[0].params().to_vec());
    }

    #[test]
    fn increment_overflow() {
        let updates = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut connection = FixedConnection { row: Some((1, i64::MAX)), updates: updates.clone() };

        assert!(matches!(increment_sequence(&mut connection, "homepage"), Err(CounterError::UpdateFailed { .. })));
        assert!(updates.lock().unwrap().is_empty());
    }
}
