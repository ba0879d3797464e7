//! SQL execution over `may_postgres`.
//!
//! [`SqlExecutor`] is the seam between the Postgres gateways and a live
//! connection. [`PgExecutor`] is the production implementation; it times
//! every statement and records failures when the `metrics` feature is on.

use crate::error::GatewayError;
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Blocking statement execution
///
/// Calls made from inside a `may` coroutine yield to the scheduler while
/// waiting on the server.
pub trait SqlExecutor {
    /// Run a statement and return the number of rows affected
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, GatewayError>;

    /// Run a query expected to return exactly one row
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, GatewayError>;

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, GatewayError>;

    /// Run a query and return its first row, if any
    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, GatewayError> {
        Ok(self.query_all(query, params)?.into_iter().next())
    }
}

/// Executor backed by a single `may_postgres::Client`
#[derive(Clone)]
pub struct PgExecutor {
    client: Client,
}

impl PgExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// `SELECT 1` round trip
    pub fn check_health(&self) -> Result<bool, GatewayError> {
        crate::connection::check_connection_health(&self.client)
            .map_err(|e| GatewayError::Unavailable(e.to_string()))
    }

    fn timed<T>(
        &self,
        operation: &'static str,
        query: &str,
        run: impl FnOnce(&Client) -> Result<T, may_postgres::Error>,
    ) -> Result<T, GatewayError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::store_call_span(operation, "sql").entered();

        let start = Instant::now();
        let result = run(&self.client).map_err(|e| {
            log::debug!("{operation} failed: {e}; sql: {query}");
            #[cfg(feature = "metrics")]
            METRICS.record_gateway_failure(operation);
            GatewayError::from(e)
        });
        #[cfg(feature = "metrics")]
        METRICS.record_store_call(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;
        result
    }
}

impl SqlExecutor for PgExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, GatewayError> {
        self.timed("execute", query, |c| c.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, GatewayError> {
        self.timed("query_one", query, |c| c.query_one(query, params))
    }

    fn query_all(
        &self,
        query: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<Row>, GatewayError> {
        self.timed("query_all", query, |c| c.query(query, params))
    }
}
