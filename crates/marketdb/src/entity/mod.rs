//! Market metadata entities and their repositories.
//!
//! Every table lives in the `core` schema. Each entity module exposes:
//!
//! - the record (scanned with [`crate::FromRow`]),
//! - a `New…` input for `create` and a `…Patch` for partial `update`,
//! - a `…Select` enum naming the ways one record can be addressed,
//! - a `…Filter` for `list`,
//! - the statement constructors (`insert_query`, `update_query`,
//!   `select_query`, `list_query`) as plain functions,
//! - a repository that runs them through the shared [`crate::Store`].

pub mod data_source;
pub mod lookup;
pub mod market;
pub mod ohlcvt;
pub mod price;
pub mod trading_pair;
pub mod wallet;

pub use data_source::{
    DataSource, DataSourceFilter, DataSourcePatch, DataSourceRepo, DataSourceSelect,
    NewDataSource,
};
pub use lookup::Lookup;
pub use market::{Market, MarketFilter, MarketPatch, MarketRepo, MarketSelect, MarketType, NewMarket};
pub use ohlcvt::{NewOhlcvt, Ohlcvt, OhlcvtFilter, OhlcvtPatch, OhlcvtRepo, OhlcvtSelect};
pub use price::{NewPrice, Price, PriceFilter, PricePatch, PriceRepo, PriceSelect};
pub use trading_pair::{
    NewTradingPair, TradingPair, TradingPairFilter, TradingPairPatch, TradingPairRepo,
    TradingPairSelect,
};
pub use wallet::{NewWallet, Wallet, WalletFilter, WalletPatch, WalletRepo, WalletSelect};

use crate::qb::QueryBuilder;
use serde::Deserialize;

/// Paging for `list` queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    pub(crate) fn apply(&self, qb: &mut QueryBuilder) {
        if let Some(limit) = self.limit {
            qb.limit(limit);
        }
        if let Some(offset) = self.offset {
            qb.offset(offset);
        }
    }
}
