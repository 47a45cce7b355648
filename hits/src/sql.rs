use {
    std::{sync::Arc, time::Duration},
    thiserror::Error,
    rusqlite::{Connection, OpenFlags, params_from_iter, ToSql, types::{ToSqlOutput, ValueRef}},
};

#[derive(Debug, Clone)]
pub struct Query {
    stmt: String,
    params: Vec<Value>,
}

impl Query {
    pub fn new(stmt: impl Into<String>) -> Self {
        Self {
            stmt: stmt.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: impl Into<Value>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn stmt(&self) -> &str {
        &self.stmt
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

#[derive(Debug)]
pub struct QueryResult {
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn first(self) -> Option<Row> {
        self.rows.into_iter().next()
    }
}

#[derive(Debug, Clone)]
pub struct Row {
    names: Arc<[String]>,
    pub columns: Vec<Value>,
}

impl Row {
    pub fn new(names: Arc<[String]>, columns: Vec<Value>) -> Self {
        Self {
            names,
            columns,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names.iter()
            .position(|v| v.eq_ignore_ascii_case(name))
            .and_then(|index| self.columns.get(index))
    }

    pub fn get_integer(&self, name: &str) -> Result<i64, SqlError> {
        match self.get(name) {
            Some(Value::Integer(v)) => Ok(*v),
            Some(_) => Err(SqlError::UnexpectedType { column: name.to_owned() }),
            None => Err(SqlError::MissingColumn { column: name.to_owned() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum SqlError {
    #[error("failed to open connection: {reason}")]
    ConnectionOpen { reason: String },

    #[error("failed to execute statement: {reason}")]
    Statement { reason: String },

    #[error("column not found: {column}")]
    MissingColumn { column: String },

    #[error("column has unexpected type: {column}")]
    UnexpectedType { column: String },
}

impl From<rusqlite::Error> for SqlError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Statement { reason: err.to_string() }
    }
}

/// A single open database connection. Dropping it closes the connection.
pub trait SqlConnection {
    /// Runs a statement that returns rows.
    fn query(&mut self, query: Query) -> Result<QueryResult, SqlError>;

    /// Runs a statement that returns no rows, returns the number of rows changed.
    fn execute(&mut self, query: Query) -> Result<usize, SqlError>;
}

pub type BoxedConnection = Box<dyn SqlConnection + Send>;

const IN_MEMORY: &str = ":memory:";

pub struct SqliteConnection {
    connection: Connection,
}

impl SqliteConnection {
    /// `location` is a file path, `:memory:` or a `file:` uri. Database files are never created,
    /// the file has to exist already.
    pub fn open(location: &str) -> Result<Self, SqlError> {
        let connection = if location == IN_MEMORY {
            Connection::open_in_memory()
        } else {
            Connection::open_with_flags(
                location,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        };

        Ok(Self {
            connection: connection
                .map_err(|err| SqlError::ConnectionOpen {
                    reason: err.to_string(),
                })?,
        })
    }

    pub fn with_busy_timeout(self, busy_timeout: Duration) -> Result<Self, SqlError> {
        self.connection.busy_timeout(busy_timeout)?;
        Ok(self)
    }
}

impl SqlConnection for SqliteConnection {
    fn query(&mut self, query: Query) -> Result<QueryResult, SqlError> {
        let mut stmt = self.connection.prepare(&query.stmt)?;
        let names: Arc<[String]> = stmt.column_names().into_iter().map(|v| v.to_owned()).collect();
        let result_columns = names.len();

        let mut rows = stmt.query(params_from_iter(query.params.iter()))?;

        let mut result_rows = Vec::new();
        while let Some(row) = rows.next()? {
            let mut row_columns = Vec::with_capacity(result_columns);
            for column in 0..result_columns {
                row_columns.push(match row.get_ref(column)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => Value::Integer(v),
                    ValueRef::Real(v) => Value::Real(v),
                    ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
                    ValueRef::Blob(v) => Value::Blob(v.to_owned()),
                });
            }
            result_rows.push(Row::new(names.clone(), row_columns));
        }

        Ok(QueryResult { rows: result_rows })
    }

    fn execute(&mut self, query: Query) -> Result<usize, SqlError> {
        Ok(self.connection.execute(&query.stmt, params_from_iter(query.params.iter()))?)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Self::Null => ValueRef::Null,
            Self::Integer(v) => ValueRef::Integer(*v),
            Self::Real(v) => ValueRef::Real(*v),
            Self::Text(v) => ValueRef::Text(v.as_bytes()),
            Self::Blob(v) => ValueRef::Blob(v),
        }))
    }
}
