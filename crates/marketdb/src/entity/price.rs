//! Price observations for a trading pair.

use crate::entity::{Lookup, Page, TradingPairRepo, TradingPairSelect};
use crate::error::{OrmError, OrmResult};
use crate::params;
use crate::qb::{self, BuiltQuery, FilterBracket, ValueFilter};
use crate::row::{FromRow, RowExt};
use crate::service::Store;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_postgres::Row;

pub const TABLE: &str = "core.prices";

const COLUMNS: &[&str] = &["id", "pair_id", "price", "observed_at"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Price {
    pub id: i64,
    pub pair_id: i64,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl FromRow for Price {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get_column("id")?,
            pair_id: row.try_get_column("pair_id")?,
            price: row.try_get_column("price")?,
            observed_at: row.try_get_column("observed_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPrice {
    pub pair_id: i64,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PricePatch {
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceSelect {
    ById(i64),
    ByKey {
        pair_id: i64,
        observed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PriceFilter {
    pub pair_id: Option<i64>,
    /// Matches any of the instants or time ranges.
    pub observed_at: Vec<ValueFilter<DateTime<Utc>>>,
    pub page: Page,
}

/// Multi-row insert. The slice must not be empty.
pub fn insert_many_query(prices: &[NewPrice]) -> OrmResult<BuiltQuery> {
    if prices.is_empty() {
        return Err(OrmError::validation("no prices to insert"));
    }
    let mut qb = qb::insert(TABLE);
    qb.set_insert_field(&["pair_id", "price", "observed_at"]);
    for price in prices {
        qb.set_insert_values(params![price.pair_id, price.price, price.observed_at])?;
    }
    qb.set_return_fields(COLUMNS);
    qb.generate_sql()
}

pub fn update_query(id: i64, patch: &PricePatch) -> OrmResult<BuiltQuery> {
    let mut qb = qb::update(TABLE);
    qb.set_update_opt("price", patch.price)
        .and_where_value("id = ?", id)
        .set_return_fields(COLUMNS);
    qb.generate_sql()
}

/// Lookup by id or by `(pair_id, observed_at)`.
pub fn select_query(select: &PriceSelect) -> OrmResult<BuiltQuery> {
    let mut qb = qb::select(TABLE);
    qb.select(COLUMNS);
    match select {
        PriceSelect::ById(id) => {
            qb.and_where_value("id = ?", *id);
        }
        PriceSelect::ByKey {
            pair_id,
            observed_at,
        } => {
            qb.and_where_value("pair_id = ?", *pair_id)
                .and_where_value("observed_at = ?", *observed_at);
        }
    }
    qb.generate_sql()
}

/// Newest first.
pub fn list_query(filter: &PriceFilter) -> OrmResult<BuiltQuery> {
    let mut qb = qb::select(TABLE);
    qb.select(COLUMNS)
        .and_where_opt("pair_id = ?", filter.pair_id)
        .and_bracket(FilterBracket::any_of(
            "observed_at",
            filter.observed_at.iter().cloned(),
        ))
        .order_by("observed_at DESC");
    filter.page.apply(&mut qb);
    qb.generate_sql()
}

#[derive(Clone)]
pub struct PriceRepo {
    store: Arc<Store>,
    pairs: TradingPairRepo,
}

impl PriceRepo {
    pub fn new(store: Arc<Store>, pairs: TradingPairRepo) -> Self {
        Self { store, pairs }
    }

    pub async fn create(&self, new: &NewPrice) -> OrmResult<Price> {
        let mut created = self.create_many(std::slice::from_ref(new)).await?;
        created
            .pop()
            .ok_or_else(|| OrmError::Other("insert returned no row".to_string()))
    }

    /// Insert a batch in one statement after checking every referenced pair.
    pub async fn create_many(&self, prices: &[NewPrice]) -> OrmResult<Vec<Price>> {
        if prices.is_empty() {
            return Ok(Vec::new());
        }
        let pair_ids: BTreeSet<i64> = prices.iter().map(|p| p.pair_id).collect();
        self.require_pairs(pair_ids).await?;

        let built = insert_many_query(prices)?;
        let mut client = self.store.client().await?;
        self.store
            .executor()
            .write(&mut client, "prices.create_many", &built)
            .await
    }

    /// Look up every pair concurrently; the first missing one fails the batch.
    async fn require_pairs(&self, pair_ids: BTreeSet<i64>) -> OrmResult<()> {
        let mut lookups = JoinSet::new();
        for pair_id in pair_ids {
            let pairs = self.pairs.clone();
            lookups.spawn(async move { pairs.find(&TradingPairSelect::ById(pair_id)).await });
        }
        while let Some(joined) = lookups.join_next().await {
            let lookup: Lookup<_> =
                joined.map_err(|e| OrmError::Other(format!("pair lookup task failed: {e}")))??;
            lookup.require("trading pair")?;
        }
        Ok(())
    }

    pub async fn update(&self, id: i64, patch: &PricePatch) -> OrmResult<Price> {
        let built = update_query(id, patch)?;
        let mut client = self.store.client().await?;
        self.store
            .executor()
            .write_one(&mut client, "prices.update", &built)
            .await
    }

    pub async fn get(&self, select: &PriceSelect) -> OrmResult<Price> {
        let built = select_query(select)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_one(&client, "prices.get", &built)
            .await
    }

    pub async fn list(&self, filter: &PriceFilter) -> OrmResult<Vec<Price>> {
        let built = list_query(filter)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_all(&client, "prices.list", &built)
            .await
    }
}
