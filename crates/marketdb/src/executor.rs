//! Runs rendered statements against a database.
//!
//! Reads take any [`GenericClient`] (a pooled client or an open transaction).
//! Writes take a pooled client and run in their own transaction, which is
//! re-run as a whole when Postgres reports a serialization failure or a
//! deadlock.

use crate::client::{GenericClient, RowStream, StreamingClient};
use crate::config::StoreConfig;
use crate::error::{OrmError, OrmResult};
use crate::log::SqlLogger;
use crate::qb::BuiltQuery;
use crate::row::FromRow;
use futures_core::Stream;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Debug, Clone)]
pub struct Executor {
    logger: SqlLogger,
    max_serialization_retries: u32,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(SqlLogger::default(), 3)
    }
}

impl Executor {
    pub fn new(logger: SqlLogger, max_serialization_retries: u32) -> Self {
        Self {
            logger,
            max_serialization_retries,
        }
    }

    pub fn from_config(config: &StoreConfig) -> OrmResult<Self> {
        Ok(Self::new(
            config.logging.sql_logger()?,
            config.executor.max_serialization_retries,
        ))
    }

    pub fn logger(&self) -> &SqlLogger {
        &self.logger
    }

    pub fn max_serialization_retries(&self) -> u32 {
        self.max_serialization_retries
    }

    /// Run a query and scan every row.
    pub async fn fetch_all<T: FromRow>(
        &self,
        conn: &impl GenericClient,
        tag: &str,
        built: &BuiltQuery,
    ) -> OrmResult<Vec<T>> {
        self.logger.statement(tag, built);
        let rows = conn.query(built).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// Run a query and scan the first row.
    ///
    /// Zero rows is [`OrmError::NotFound`] carrying the selection description.
    pub async fn fetch_one<T: FromRow>(
        &self,
        conn: &impl GenericClient,
        tag: &str,
        built: &BuiltQuery,
    ) -> OrmResult<T> {
        match self.fetch_opt(conn, tag, built).await? {
            Some(record) => Ok(record),
            None => Err(not_found(tag, built)),
        }
    }

    /// Run a query and scan the first row, if any.
    pub async fn fetch_opt<T: FromRow>(
        &self,
        conn: &impl GenericClient,
        tag: &str,
        built: &BuiltQuery,
    ) -> OrmResult<Option<T>> {
        self.logger.statement(tag, built);
        let row = conn.query_opt(built).await?;
        row.as_ref().map(T::from_row).transpose()
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(
        &self,
        conn: &impl GenericClient,
        tag: &str,
        built: &BuiltQuery,
    ) -> OrmResult<u64> {
        self.logger.statement(tag, built);
        conn.execute(built).await
    }

    /// Run a query and scan rows as they arrive.
    pub async fn fetch_stream<T: FromRow>(
        &self,
        conn: &impl StreamingClient,
        tag: &str,
        built: &BuiltQuery,
    ) -> OrmResult<RecordStream<T>> {
        self.logger.statement(tag, built);
        let rows = conn.query_stream(built).await?;
        Ok(RecordStream::new(rows))
    }

    /// Run a write in its own transaction and scan the rows it returns.
    ///
    /// Commits on success and rolls back on any error. A serialization
    /// failure or deadlock re-runs the whole transaction, at most
    /// `max_serialization_retries` more times.
    pub async fn write<T: FromRow>(
        &self,
        client: &mut deadpool_postgres::Client,
        tag: &str,
        built: &BuiltQuery,
    ) -> OrmResult<Vec<T>> {
        let mut retry = RetryBudget::new(self.max_serialization_retries, OrmError::is_retryable);
        loop {
            match self.write_once(client, tag, built).await {
                Err(err) if retry.should_retry(tag, &err) => continue,
                result => return result,
            }
        }
    }

    /// Like [`Executor::write`], for statements that return exactly one row.
    pub async fn write_one<T: FromRow>(
        &self,
        client: &mut deadpool_postgres::Client,
        tag: &str,
        built: &BuiltQuery,
    ) -> OrmResult<T> {
        let mut records = self.write::<T>(client, tag, built).await?;
        match records.len() {
            0 => Err(not_found(tag, built)),
            1 => Ok(records.remove(0)),
            got => Err(OrmError::too_many_rows(1, got)),
        }
    }

    async fn write_once<T: FromRow>(
        &self,
        client: &mut deadpool_postgres::Client,
        tag: &str,
        built: &BuiltQuery,
    ) -> OrmResult<Vec<T>> {
        crate::transaction!(client, tx, { self.fetch_all::<T>(&tx, tag, built).await })
    }
}

/// Decides whether a failed attempt is re-run.
///
/// Each accepted retry is counted and logged at WARN; once `max_retries`
/// retries were granted, every further failure is final.
#[derive(Debug)]
pub(crate) struct RetryBudget {
    max_retries: u32,
    retries: u32,
    retryable: fn(&OrmError) -> bool,
}

impl RetryBudget {
    pub(crate) fn new(max_retries: u32, retryable: fn(&OrmError) -> bool) -> Self {
        Self {
            max_retries,
            retries: 0,
            retryable,
        }
    }

    pub(crate) fn should_retry(&mut self, tag: &str, err: &OrmError) -> bool {
        if !(self.retryable)(err) || self.retries >= self.max_retries {
            return false;
        }
        self.retries += 1;
        tracing::warn!(
            target: "marketdb.sql",
            tag,
            attempt = self.retries,
            error = %err,
            "retrying write transaction"
        );
        true
    }
}

fn not_found(tag: &str, built: &BuiltQuery) -> OrmError {
    OrmError::not_found(format!("{tag}: no row matches {}", built.description))
}

/// A stream of scanned records.
#[must_use]
pub struct RecordStream<T> {
    rows: RowStream,
    _record: PhantomData<fn() -> T>,
}

impl<T> RecordStream<T> {
    fn new(rows: RowStream) -> Self {
        Self {
            rows,
            _record: PhantomData,
        }
    }
}

impl<T: FromRow> Stream for RecordStream<T> {
    type Item = OrmResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.rows).poll_next(cx) {
            Poll::Ready(Some(Ok(row))) => Poll::Ready(Some(T::from_row(&row))),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
