//! Connections that rendered statements run on.
//!
//! Two kinds of connection exist in this crate: a client checked out of the
//! pool, and the transaction [`Executor::write`](crate::Executor::write) opens
//! on one. Both run a [`BuiltQuery`] as rendered, so its SQL and arguments
//! never travel separately.

use crate::error::{OrmError, OrmResult};
use crate::qb::BuiltQuery;
use futures_core::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_postgres::Row;

/// A connection that runs rendered statements.
///
/// Repository reads take `&impl GenericClient`, so a read can join an open
/// transaction instead of checking out another client.
pub trait GenericClient: Send + Sync {
    /// Run `built` and collect every row.
    fn query(&self, built: &BuiltQuery) -> impl Future<Output = OrmResult<Vec<Row>>> + Send;

    /// Run `built` and keep the first row, if any. Further rows are dropped.
    fn query_opt(
        &self,
        built: &BuiltQuery,
    ) -> impl Future<Output = OrmResult<Option<Row>>> + Send {
        async move { Ok(self.query(built).await?.into_iter().next()) }
    }

    /// Run `built` and return the number of affected rows.
    fn execute(&self, built: &BuiltQuery) -> impl Future<Output = OrmResult<u64>> + Send;
}

/// A connection that can hand rows over as they arrive.
pub trait StreamingClient: GenericClient {
    fn query_stream(&self, built: &BuiltQuery) -> impl Future<Output = OrmResult<RowStream>> + Send;
}

impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, built: &BuiltQuery) -> OrmResult<Vec<Row>> {
        tokio_postgres::Client::query(self, built.sql.as_str(), &built.params_ref())
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn execute(&self, built: &BuiltQuery) -> OrmResult<u64> {
        tokio_postgres::Client::execute(self, built.sql.as_str(), &built.params_ref())
            .await
            .map_err(OrmError::from_db_error)
    }
}

impl StreamingClient for deadpool_postgres::Client {
    async fn query_stream(&self, built: &BuiltQuery) -> OrmResult<RowStream> {
        let rows = tokio_postgres::Client::query_raw(self, built.sql.as_str(), built.params_ref())
            .await
            .map_err(OrmError::from_db_error)?;
        Ok(RowStream::new(rows))
    }
}

impl GenericClient for deadpool_postgres::Transaction<'_> {
    async fn query(&self, built: &BuiltQuery) -> OrmResult<Vec<Row>> {
        tokio_postgres::Transaction::query(self, built.sql.as_str(), &built.params_ref())
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn execute(&self, built: &BuiltQuery) -> OrmResult<u64> {
        tokio_postgres::Transaction::execute(self, built.sql.as_str(), &built.params_ref())
            .await
            .map_err(OrmError::from_db_error)
    }
}

impl StreamingClient for deadpool_postgres::Transaction<'_> {
    async fn query_stream(&self, built: &BuiltQuery) -> OrmResult<RowStream> {
        let rows = tokio_postgres::Transaction::query_raw(self, built.sql.as_str(), built.params_ref())
            .await
            .map_err(OrmError::from_db_error)?;
        Ok(RowStream::new(rows))
    }
}

/// Rows of a streamed query, with driver errors classified like every other
/// error in the crate.
#[must_use]
pub struct RowStream {
    rows: Pin<Box<dyn Stream<Item = Result<Row, tokio_postgres::Error>> + Send>>,
}

impl RowStream {
    pub(crate) fn new<S>(rows: S) -> Self
    where
        S: Stream<Item = Result<Row, tokio_postgres::Error>> + Send + 'static,
    {
        Self {
            rows: Box::pin(rows),
        }
    }
}

impl Stream for RowStream {
    type Item = OrmResult<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rows
            .as_mut()
            .poll_next(cx)
            .map(|next| next.map(|row| row.map_err(OrmError::from_db_error)))
    }
}
