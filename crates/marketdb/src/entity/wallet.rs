//! Wallets: an owner's address for one market on one data source.

use crate::entity::{DataSourceRepo, DataSourceSelect, MarketRepo, MarketSelect, Page};
use crate::error::{OrmError, OrmResult};
use crate::params;
use crate::qb::{self, BuiltQuery};
use crate::row::{FromRow, RowExt};
use crate::service::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_postgres::Row;

pub const TABLE: &str = "core.wallets";

const COLUMNS: &[&str] = &[
    "id",
    "owner",
    "address",
    "market_id",
    "data_source_id",
    "label",
    "metadata",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wallet {
    pub id: i64,
    pub owner: String,
    pub address: String,
    pub market_id: i64,
    pub data_source_id: i64,
    pub label: Option<String>,
    /// Free-form `JSONB` attributes.
    pub metadata: serde_json::Value,
}

impl FromRow for Wallet {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get_column("id")?,
            owner: row.try_get_column("owner")?,
            address: row.try_get_column("address")?,
            market_id: row.try_get_column("market_id")?,
            data_source_id: row.try_get_column("data_source_id")?,
            label: row.try_get_column("label")?,
            metadata: row.try_get_column("metadata")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWallet {
    pub owner: String,
    pub address: String,
    pub market_id: i64,
    pub data_source_id: i64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
}

fn empty_metadata() -> serde_json::Value {
    serde_json::json!({})
}

impl NewWallet {
    pub fn validate(&self) -> OrmResult<()> {
        if self.owner.trim().is_empty() || self.address.trim().is_empty() {
            return Err(OrmError::validation("wallet owner and address are required"));
        }
        check_metadata(&self.metadata)
    }
}

fn check_metadata(metadata: &serde_json::Value) -> OrmResult<()> {
    if !metadata.is_object() {
        return Err(OrmError::validation(format!(
            "wallet metadata must be a JSON object, got {metadata}"
        )));
    }
    Ok(())
}

/// `label: Some(None)` clears the label.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletPatch {
    pub label: Option<Option<String>>,
    pub metadata: Option<serde_json::Value>,
}

impl WalletPatch {
    /// Replacement metadata must be an object, as on insert.
    pub fn validate(&self) -> OrmResult<()> {
        match &self.metadata {
            Some(metadata) => check_metadata(metadata),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletSelect {
    ById(i64),
    ByKey { owner: String, address: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletFilter {
    pub owner: Option<String>,
    pub market_id: Option<i64>,
    /// Resolved against `core.markets` in a subquery.
    pub market_symbol: Option<String>,
    pub data_source_id: Option<i64>,
    pub page: Page,
}

/// `INSERT` returning the stored row. Does not run [`NewWallet::validate`].
pub fn insert_query(new: &NewWallet) -> OrmResult<BuiltQuery> {
    let mut qb = qb::insert(TABLE);
    qb.set_insert_field(&COLUMNS[1..]);
    qb.set_insert_values(params![
        new.owner.clone(),
        new.address.clone(),
        new.market_id,
        new.data_source_id,
        new.label.clone(),
        new.metadata.clone()
    ])?;
    qb.set_return_fields(COLUMNS);
    qb.generate_sql()
}

/// Validated `UPDATE ... WHERE id = ?`; an empty patch is `NoOpUpdate`.
pub fn update_query(id: i64, patch: &WalletPatch) -> OrmResult<BuiltQuery> {
    patch.validate()?;
    let mut qb = qb::update(TABLE);
    qb.set_update_opt("label", patch.label.clone())
        .set_update_opt("metadata", patch.metadata.clone())
        .and_where_value("id = ?", id)
        .set_return_fields(COLUMNS);
    qb.generate_sql()
}

/// Single-row lookup by id or by `(owner, address)`.
pub fn select_query(select: &WalletSelect) -> OrmResult<BuiltQuery> {
    let mut qb = qb::select(TABLE);
    qb.select(COLUMNS);
    match select {
        WalletSelect::ById(id) => {
            qb.and_where_value("id = ?", *id);
        }
        WalletSelect::ByKey { owner, address } => {
            qb.and_where_value("owner = ?", owner.clone())
                .and_where_value("address = ?", address.clone());
        }
    }
    qb.generate_sql()
}

pub fn list_query(filter: &WalletFilter) -> OrmResult<BuiltQuery> {
    let mut qb = qb::select(TABLE);
    qb.select(COLUMNS)
        .and_where_opt("owner = ?", filter.owner.clone())
        .and_where_opt("market_id = ?", filter.market_id)
        .and_where_opt(
            "market_id IN (SELECT id FROM core.markets WHERE symbol = ?)",
            filter.market_symbol.clone(),
        )
        .and_where_opt("data_source_id = ?", filter.data_source_id)
        .order_by("owner ASC")
        .order_by("id ASC");
    filter.page.apply(&mut qb);
    qb.generate_sql()
}

#[derive(Clone)]
pub struct WalletRepo {
    store: Arc<Store>,
    markets: MarketRepo,
    data_sources: DataSourceRepo,
}

impl WalletRepo {
    pub fn new(store: Arc<Store>, markets: MarketRepo, data_sources: DataSourceRepo) -> Self {
        Self {
            store,
            markets,
            data_sources,
        }
    }

    /// Check the market and data source concurrently, then insert.
    pub async fn create(&self, new: &NewWallet) -> OrmResult<Wallet> {
        new.validate()?;

        let market_select = MarketSelect::ById(new.market_id);
        let source_select = DataSourceSelect::ById(new.data_source_id);
        let (market, source) = tokio::join!(
            self.markets.find(&market_select),
            self.data_sources.find(&source_select),
        );
        market?.require("market")?;
        source?.require("data source")?;

        let built = insert_query(new)?;
        let mut client = self.store.client().await?;
        self.store
            .executor()
            .write_one(&mut client, "wallets.create", &built)
            .await
    }

    pub async fn update(&self, id: i64, patch: &WalletPatch) -> OrmResult<Wallet> {
        let built = update_query(id, patch)?;
        let mut client = self.store.client().await?;
        self.store
            .executor()
            .write_one(&mut client, "wallets.update", &built)
            .await
    }

    pub async fn get(&self, select: &WalletSelect) -> OrmResult<Wallet> {
        let built = select_query(select)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_one(&client, "wallets.get", &built)
            .await
    }

    pub async fn list(&self, filter: &WalletFilter) -> OrmResult<Vec<Wallet>> {
        let built = list_query(filter)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_all(&client, "wallets.list", &built)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_wallet() -> NewWallet {
        NewWallet {
            owner: "alice".into(),
            address: "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh".into(),
            market_id: 1,
            data_source_id: 2,
            label: Some("cold".into()),
            metadata: json!({"tier": 1}),
        }
    }

    #[test]
    fn test_insert_query() {
        let built = insert_query(&new_wallet()).unwrap();
        assert_eq!(
            built.sql,
            "INSERT INTO core.wallets \
             (owner, address, market_id, data_source_id, label, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, owner, address, market_id, data_source_id, label, metadata"
        );
        assert_eq!(built.args.len(), 6);
    }

    #[test]
    fn test_new_wallet_from_json_defaults_metadata() {
        let wallet: NewWallet = serde_json::from_str(
            r#"{"owner": "bob", "address": "0xabc", "market_id": 4, "data_source_id": 1}"#,
        )
        .unwrap();
        assert_eq!(wallet.metadata, json!({}));
        assert_eq!(wallet.label, None);
        assert!(wallet.validate().is_ok());

        let bad = NewWallet {
            metadata: json!([1, 2]),
            ..new_wallet()
        };
        assert!(matches!(bad.validate(), Err(OrmError::Validation(_))));
    }

    #[test]
    fn test_list_by_market_symbol_uses_subquery() {
        let filter = WalletFilter {
            owner: Some("alice".into()),
            market_symbol: Some("BTC".into()),
            ..Default::default()
        };
        let built = list_query(&filter).unwrap();
        assert_eq!(
            built.sql,
            "SELECT id, owner, address, market_id, data_source_id, label, metadata \
             FROM core.wallets WHERE (owner = $1 AND \
             market_id IN (SELECT id FROM core.markets WHERE symbol = $2)) \
             ORDER BY owner ASC, id ASC"
        );
        assert_eq!(
            built.description,
            "owner = alice AND market_id IN (SELECT id FROM core.markets WHERE symbol = BTC)"
        );
    }

    #[test]
    fn test_update_label_before_where() {
        let patch = WalletPatch {
            label: Some(Some("hot".into())),
            metadata: None,
        };
        let built = update_query(8, &patch).unwrap();
        assert!(built
            .sql
            .starts_with("UPDATE core.wallets SET label = $1 WHERE (id = $2)"));
        assert_eq!(built.args.describe(), vec!["Some(\"hot\")", "8"]);
    }

    #[test]
    fn test_update_rejects_non_object_metadata() {
        let patch: WalletPatch = serde_json::from_str(r#"{"metadata": [1, 2]}"#).unwrap();
        assert!(matches!(patch.validate(), Err(OrmError::Validation(_))));
        assert!(matches!(update_query(8, &patch), Err(OrmError::Validation(_))));

        let patch = WalletPatch {
            metadata: Some(json!({"tier": 2})),
            ..Default::default()
        };
        let built = update_query(8, &patch).unwrap();
        assert!(built.sql.starts_with("UPDATE core.wallets SET metadata = $1 WHERE (id = $2)"));
    }
}
