//! Markets: the tradable symbols (assets, currencies) a data source lists.

use crate::entity::{Lookup, Page};
use crate::error::{OrmError, OrmResult};
use crate::params;
use crate::qb::{self, BuiltQuery, FilterBracket, ValueFilter};
use crate::row::{FromRow, RowExt};
use crate::service::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_postgres::Row;

pub const TABLE: &str = "core.markets";

const COLUMNS: &[&str] = &["id", "symbol", "name", "type", "data_source_id"];

/// Stored as `SMALLINT` in the `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Crypto,
    Fiat,
    Stock,
    Commodity,
}

impl MarketType {
    pub fn code(self) -> i16 {
        match self {
            MarketType::Crypto => 1,
            MarketType::Fiat => 2,
            MarketType::Stock => 3,
            MarketType::Commodity => 4,
        }
    }
}

impl TryFrom<i16> for MarketType {
    type Error = OrmError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(MarketType::Crypto),
            2 => Ok(MarketType::Fiat),
            3 => Ok(MarketType::Stock),
            4 => Ok(MarketType::Commodity),
            other => Err(OrmError::decode("type", format!("unknown market type {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Market {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub market_type: MarketType,
    pub data_source_id: i64,
}

impl FromRow for Market {
    fn from_row(row: &Row) -> OrmResult<Self> {
        let code: i16 = row.try_get_column("type")?;
        Ok(Self {
            id: row.try_get_column("id")?,
            symbol: row.try_get_column("symbol")?,
            name: row.try_get_column("name")?,
            market_type: MarketType::try_from(code)?,
            data_source_id: row.try_get_column("data_source_id")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMarket {
    pub symbol: String,
    pub name: String,
    pub market_type: MarketType,
    pub data_source_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarketPatch {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub market_type: Option<MarketType>,
    pub data_source_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketSelect {
    ById(i64),
    BySymbol(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarketFilter {
    pub symbols: Vec<String>,
    pub market_type: Option<MarketType>,
    pub data_source_id: Option<i64>,
    pub page: Page,
}

/// `INSERT` returning the full row; the market type is stored by its code.
pub fn insert_query(new: &NewMarket) -> OrmResult<BuiltQuery> {
    let mut qb = qb::insert(TABLE);
    qb.set_insert_field(&["symbol", "name", "type", "data_source_id"]);
    qb.set_insert_values(params![
        new.symbol.clone(),
        new.name.clone(),
        new.market_type.code(),
        new.data_source_id
    ])?;
    qb.set_return_fields(COLUMNS);
    qb.generate_sql()
}

pub fn update_query(id: i64, patch: &MarketPatch) -> OrmResult<BuiltQuery> {
    let mut qb = qb::update(TABLE);
    qb.set_update_opt("symbol", patch.symbol.clone())
        .set_update_opt("name", patch.name.clone())
        .set_update_opt("type", patch.market_type.map(MarketType::code))
        .set_update_opt("data_source_id", patch.data_source_id)
        .and_where_value("id = ?", id)
        .set_return_fields(COLUMNS);
    qb.generate_sql()
}

pub fn select_query(select: &MarketSelect) -> OrmResult<BuiltQuery> {
    let mut qb = qb::select(TABLE);
    qb.select(COLUMNS);
    match select {
        MarketSelect::ById(id) => qb.and_where_value("id = ?", *id),
        MarketSelect::BySymbol(symbol) => qb.and_where_value("symbol = ?", symbol.clone()),
    };
    qb.generate_sql()
}

/// Markets ordered by symbol. An empty `symbols` list does not narrow.
pub fn list_query(filter: &MarketFilter) -> OrmResult<BuiltQuery> {
    let mut qb = qb::select(TABLE);
    qb.select(COLUMNS)
        .and_bracket(FilterBracket::any_of(
            "symbol",
            filter.symbols.iter().cloned().map(ValueFilter::single),
        ))
        .and_where_opt("type = ?", filter.market_type.map(MarketType::code))
        .and_where_opt("data_source_id = ?", filter.data_source_id)
        .order_by("symbol ASC");
    filter.page.apply(&mut qb);
    qb.generate_sql()
}

#[derive(Clone)]
pub struct MarketRepo {
    store: Arc<Store>,
}

impl MarketRepo {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: &NewMarket) -> OrmResult<Market> {
        let built = insert_query(new)?;
        let mut client = self.store.client().await?;
        self.store
            .executor()
            .write_one(&mut client, "markets.create", &built)
            .await
    }

    pub async fn update(&self, id: i64, patch: &MarketPatch) -> OrmResult<Market> {
        let built = update_query(id, patch)?;
        let mut client = self.store.client().await?;
        self.store
            .executor()
            .write_one(&mut client, "markets.update", &built)
            .await
    }

    pub async fn get(&self, select: &MarketSelect) -> OrmResult<Market> {
        let built = select_query(select)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_one(&client, "markets.get", &built)
            .await
    }

    pub async fn find(&self, select: &MarketSelect) -> OrmResult<Lookup<Market>> {
        Lookup::from_result(self.get(select).await)
    }

    pub async fn list(&self, filter: &MarketFilter) -> OrmResult<Vec<Market>> {
        let built = list_query(filter)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_all(&client, "markets.list", &built)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_type_codes_round_trip() {
        for ty in [
            MarketType::Crypto,
            MarketType::Fiat,
            MarketType::Stock,
            MarketType::Commodity,
        ] {
            assert_eq!(MarketType::try_from(ty.code()).unwrap(), ty);
        }
        assert!(matches!(
            MarketType::try_from(9i16),
            Err(OrmError::Decode { .. })
        ));
    }

    #[test]
    fn test_insert_query() {
        let built = insert_query(&NewMarket {
            symbol: "BTC".into(),
            name: "Bitcoin".into(),
            market_type: MarketType::Crypto,
            data_source_id: 2,
        })
        .unwrap();
        assert_eq!(
            built.sql,
            "INSERT INTO core.markets (symbol, name, type, data_source_id) VALUES ($1, $2, $3, $4) \
             RETURNING id, symbol, name, type, data_source_id"
        );
        assert_eq!(built.args.describe(), vec!["BTC", "Bitcoin", "1", "2"]);
    }

    #[test]
    fn test_partial_update_only_sets_present_fields() {
        let patch = MarketPatch {
            market_type: Some(MarketType::Fiat),
            ..Default::default()
        };
        let built = update_query(11, &patch).unwrap();
        assert_eq!(
            built.sql,
            "UPDATE core.markets SET type = $1 WHERE (id = $2) \
             RETURNING id, symbol, name, type, data_source_id"
        );
        assert_eq!(built.args.describe(), vec!["2", "11"]);
    }

    #[test]
    fn test_list_filters_and_page() {
        let filter = MarketFilter {
            symbols: vec!["BTC".into()],
            market_type: Some(MarketType::Crypto),
            data_source_id: Some(3),
            page: Page::new(20, 40),
        };
        let built = list_query(&filter).unwrap();
        assert_eq!(
            built.sql,
            "SELECT id, symbol, name, type, data_source_id FROM core.markets \
             WHERE ((symbol = $1) AND type = $2 AND data_source_id = $3) \
             ORDER BY symbol ASC LIMIT 20 OFFSET 40"
        );
        assert_eq!(
            built.description,
            "(symbol = BTC) AND type = 1 AND data_source_id = 3"
        );
    }

    #[test]
    fn test_market_type_from_json() {
        let filter: MarketFilter = serde_json::from_str(r#"{"market_type": "stock"}"#).unwrap();
        assert_eq!(filter.market_type, Some(MarketType::Stock));
        assert!(filter.symbols.is_empty());
    }
}
