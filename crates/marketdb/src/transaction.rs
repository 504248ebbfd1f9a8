//! Transaction helper macro.
//!
//! Repository writes go through [`crate::Executor::write`], which manages its
//! own transaction. Use [`transaction!`] when several statements must commit
//! together; the transaction it opens implements [`crate::GenericClient`].
//!
//! ```ignore
//! let mut client = pool.get().await?;
//! marketdb::transaction!(&mut client, tx, {
//!     let market = markets.insert_query(&new_market)?;
//!     executor.fetch_one::<Market>(&tx, "markets.create", &market).await?;
//!     Ok(())
//! })?;
//! ```

/// Runs the given block inside a database transaction.
///
/// - Begins a transaction via `$client.transaction().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `marketdb::OrmResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($client:expr, $tx:ident, $body:block) => {{
        let $tx = ($client)
            .transaction()
            .await
            .map_err($crate::OrmError::from_db_error)?;

        let __marketdb_tx_result = async { $body }.await;
        match __marketdb_tx_result {
            Ok(value) => {
                $tx.commit()
                    .await
                    .map_err($crate::OrmError::from_db_error)?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::OrmError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}
