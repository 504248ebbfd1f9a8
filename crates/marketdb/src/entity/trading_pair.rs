//! Trading pairs: a base market quoted in a quote market on one data source.
//!
//! Reads join both markets and the data source so a pair carries its symbols
//! and source name. Writes only touch `core.trading_pairs` and re-read the
//! joined record afterwards.

use crate::client::StreamingClient;
use crate::entity::{
    DataSource, DataSourceRepo, DataSourceSelect, Lookup, Market, MarketRepo, MarketSelect, Page,
};
use crate::error::{OrmError, OrmResult};
use crate::executor::RecordStream;
use crate::params;
use crate::qb::{self, BuiltQuery, FilterBracket, QueryBuilder, ValueFilter};
use crate::row::{FromRow, RowExt};
use crate::service::Store;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_postgres::Row;

pub const TABLE: &str = "core.trading_pairs";

const PAIR_COLUMNS: &[&str] = &[
    "p.id",
    "p.base_market_id",
    "p.quote_market_id",
    "p.data_source_id",
    "p.tick_size",
    "p.decimals",
];

/// Largest number of decimal places a pair may quote with.
pub const MAX_DECIMALS: i16 = 18;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingPair {
    pub id: i64,
    pub base_market_id: i64,
    pub quote_market_id: i64,
    pub data_source_id: i64,
    pub base_symbol: String,
    pub quote_symbol: String,
    pub data_source: String,
    pub tick_size: Decimal,
    pub decimals: i16,
}

impl FromRow for TradingPair {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get_column("id")?,
            base_market_id: row.try_get_column("base_market_id")?,
            quote_market_id: row.try_get_column("quote_market_id")?,
            data_source_id: row.try_get_column("data_source_id")?,
            base_symbol: row.try_get_column("base_symbol")?,
            quote_symbol: row.try_get_column("quote_symbol")?,
            data_source: row.try_get_column("data_source")?,
            tick_size: row.try_get_column("tick_size")?,
            decimals: row.try_get_column("decimals")?,
        })
    }
}

/// A new pair, addressed by its natural key.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTradingPair {
    pub base_symbol: String,
    pub quote_symbol: String,
    pub data_source: String,
    pub tick_size: Decimal,
    pub decimals: i16,
}

impl NewTradingPair {
    pub fn validate(&self) -> OrmResult<()> {
        if self.base_symbol == self.quote_symbol {
            return Err(OrmError::validation(format!(
                "base and quote market must differ ({})",
                self.base_symbol
            )));
        }
        check_tick_size(self.tick_size)?;
        check_decimals(self.decimals)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TradingPairPatch {
    pub tick_size: Option<Decimal>,
    pub decimals: Option<i16>,
}

impl TradingPairPatch {
    pub fn validate(&self) -> OrmResult<()> {
        if let Some(tick_size) = self.tick_size {
            check_tick_size(tick_size)?;
        }
        if let Some(decimals) = self.decimals {
            check_decimals(decimals)?;
        }
        Ok(())
    }
}

fn check_tick_size(tick_size: Decimal) -> OrmResult<()> {
    if tick_size <= Decimal::ZERO {
        return Err(OrmError::validation(format!(
            "tick size must be positive, got {tick_size}"
        )));
    }
    Ok(())
}

fn check_decimals(decimals: i16) -> OrmResult<()> {
    if !(0..=MAX_DECIMALS).contains(&decimals) {
        return Err(OrmError::validation(format!(
            "decimals must be within 0..={MAX_DECIMALS}, got {decimals}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradingPairSelect {
    ById(i64),
    ByKey {
        base_symbol: String,
        quote_symbol: String,
        data_source: String,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TradingPairFilter {
    pub base_symbol: Option<String>,
    pub quote_symbol: Option<String>,
    pub data_source: Option<String>,
    /// Matches any of the values or ranges.
    pub tick_size: Vec<ValueFilter<Decimal>>,
    pub decimals: Vec<ValueFilter<i16>>,
    pub page: Page,
}

/// The joined projection shared by `get` and `list`.
fn joined_select() -> QueryBuilder {
    let mut qb = qb::select("core.trading_pairs p");
    qb.select(PAIR_COLUMNS)
        .join("JOIN core.markets b ON b.id = p.base_market_id")
        .select(&["b.symbol AS base_symbol"])
        .join("JOIN core.markets q ON q.id = p.quote_market_id")
        .select(&["q.symbol AS quote_symbol"])
        .join("JOIN core.data_sources s ON s.id = p.data_source_id")
        .select(&["s.name AS data_source"]);
    qb
}

/// `INSERT` of a pair whose markets and data source were already resolved.
/// Returns only the new id; the joined record is read back separately.
pub fn insert_query(
    new: &NewTradingPair,
    base: &Market,
    quote: &Market,
    source: &DataSource,
) -> OrmResult<BuiltQuery> {
    let mut qb = qb::insert(TABLE);
    qb.set_insert_field(&[
        "base_market_id",
        "quote_market_id",
        "data_source_id",
        "tick_size",
        "decimals",
    ]);
    qb.set_insert_values(params![base.id, quote.id, source.id, new.tick_size, new.decimals])?;
    qb.set_return_fields(&["id"]);
    qb.generate_sql()
}

/// Validated `UPDATE` by id, returning the id.
pub fn update_query(id: i64, patch: &TradingPairPatch) -> OrmResult<BuiltQuery> {
    patch.validate()?;
    let mut qb = qb::update(TABLE);
    qb.set_update_opt("tick_size", patch.tick_size)
        .set_update_opt("decimals", patch.decimals)
        .and_where_value("id = ?", id)
        .set_return_fields(&["id"]);
    qb.generate_sql()
}

/// Joined lookup. `ByKey` matches on market symbols and the source name,
/// not on ids.
pub fn select_query(select: &TradingPairSelect) -> OrmResult<BuiltQuery> {
    let mut qb = joined_select();
    match select {
        TradingPairSelect::ById(id) => {
            qb.and_where_value("p.id = ?", *id);
        }
        TradingPairSelect::ByKey {
            base_symbol,
            quote_symbol,
            data_source,
        } => {
            qb.and_where_value("b.symbol = ?", base_symbol.clone())
                .and_where_value("q.symbol = ?", quote_symbol.clone())
                .and_where_value("s.name = ?", data_source.clone());
        }
    }
    qb.generate_sql()
}

/// Joined listing with symbol, source, tick size and decimals filters.
pub fn list_query(filter: &TradingPairFilter) -> OrmResult<BuiltQuery> {
    let mut qb = joined_select();
    qb.and_where_opt("b.symbol = ?", filter.base_symbol.clone())
        .and_where_opt("q.symbol = ?", filter.quote_symbol.clone())
        .and_where_opt("s.name = ?", filter.data_source.clone())
        .and_bracket(FilterBracket::any_of("p.tick_size", filter.tick_size.iter().cloned()))
        .and_bracket(FilterBracket::any_of("p.decimals", filter.decimals.iter().cloned()))
        .order_by("p.id ASC");
    filter.page.apply(&mut qb);
    qb.generate_sql()
}

#[derive(Clone)]
pub struct TradingPairRepo {
    store: Arc<Store>,
    markets: MarketRepo,
    data_sources: DataSourceRepo,
}

impl TradingPairRepo {
    pub fn new(store: Arc<Store>, markets: MarketRepo, data_sources: DataSourceRepo) -> Self {
        Self {
            store,
            markets,
            data_sources,
        }
    }

    /// Resolve both markets and the data source concurrently, then insert.
    pub async fn create(&self, new: &NewTradingPair) -> OrmResult<TradingPair> {
        new.validate()?;

        let base_select = MarketSelect::BySymbol(new.base_symbol.clone());
        let quote_select = MarketSelect::BySymbol(new.quote_symbol.clone());
        let source_select = DataSourceSelect::ByName(new.data_source.clone());
        let (base, quote, source) = tokio::join!(
            self.markets.find(&base_select),
            self.markets.find(&quote_select),
            self.data_sources.find(&source_select),
        );
        let base = base?.require("base market")?;
        let quote = quote?.require("quote market")?;
        let source = source?.require("data source")?;

        let built = insert_query(new, &base, &quote, &source)?;
        let id: i64 = {
            let mut client = self.store.client().await?;
            self.store
                .executor()
                .write_one(&mut client, "trading_pairs.create", &built)
                .await?
        };
        self.get(&TradingPairSelect::ById(id)).await
    }

    pub async fn update(&self, id: i64, patch: &TradingPairPatch) -> OrmResult<TradingPair> {
        let built = update_query(id, patch)?;
        let id: i64 = {
            let mut client = self.store.client().await?;
            self.store
                .executor()
                .write_one(&mut client, "trading_pairs.update", &built)
                .await?
        };
        self.get(&TradingPairSelect::ById(id)).await
    }

    pub async fn get(&self, select: &TradingPairSelect) -> OrmResult<TradingPair> {
        let built = select_query(select)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_one(&client, "trading_pairs.get", &built)
            .await
    }

    pub async fn find(&self, select: &TradingPairSelect) -> OrmResult<Lookup<TradingPair>> {
        Lookup::from_result(self.get(select).await)
    }

    pub async fn list(&self, filter: &TradingPairFilter) -> OrmResult<Vec<TradingPair>> {
        let built = list_query(filter)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_all(&client, "trading_pairs.list", &built)
            .await
    }

    /// Stream matching pairs over a caller-held connection.
    pub async fn list_stream<C: StreamingClient>(
        &self,
        conn: &C,
        filter: &TradingPairFilter,
    ) -> OrmResult<RecordStream<TradingPair>> {
        let built = list_query(filter)?;
        self.store
            .executor()
            .fetch_stream(conn, "trading_pairs.list_stream", &built)
            .await
    }
}
