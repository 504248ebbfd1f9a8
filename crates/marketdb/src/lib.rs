//! # marketdb
//!
//! Postgres storage for trading-market metadata: data sources, markets,
//! trading pairs, prices, OHLCVT candles and wallets.
//!
//! ## Features
//!
//! - **Dynamic SQL**: every repository renders its statements with the
//!   [`qb`] builder; placeholders are numbered once, at render time
//! - **Composable filters**: nested AND/OR brackets and value/range lists
//! - **Safe defaults**: an empty WHERE is `1=1`, an UPDATE requires SET
//! - **Transactional writes**: commit/rollback with serialization-conflict retry
//! - **Transaction-friendly reads**: pass a transaction anywhere a `GenericClient` is expected
//! - **Structured logging**: every statement is traced under `marketdb.sql`
//!
//! ## Query Builder (qb)
//!
//! ```ignore
//! use marketdb::{params, qb};
//!
//! let mut update = qb::update("core.markets");
//! update.set_update("symbol", "BTC-USDT");
//! update.and_where_value("id = ?", 7i64);
//! let built = update.generate_sql()?;
//! // UPDATE core.markets SET symbol = $1 WHERE (id = $2)
//! ```
//!
//! ## Repositories
//!
//! ```ignore
//! let store = Arc::new(Store::from_config(&StoreConfig::load("marketdb.toml")?)?);
//! let services = Services::new(store);
//! let btc = services.markets.get(&MarketSelect::BySymbol("BTC".into())).await?;
//! ```

pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod executor;
pub mod log;
pub mod pool;
pub mod prelude;
pub mod qb;
pub mod row;
pub mod service;
pub mod transaction;

pub use client::{GenericClient, RowStream, StreamingClient};
pub use config::{DatabaseConfig, ExecutorConfig, LoggingConfig, StoreConfig};
pub use error::{OrmError, OrmResult};
pub use executor::{Executor, RecordStream};
pub use log::SqlLogger;
pub use pool::{create_pool, create_pool_with_tls};
pub use qb::{BuiltQuery, FilterBracket, Param, QueryBuilder, ValueFilter};
pub use row::{FromRow, RowExt};
pub use service::{Services, Store};
