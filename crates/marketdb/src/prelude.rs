//! Convenient imports for typical `marketdb` usage.
//!
//! ```ignore
//! use marketdb::prelude::*;
//! ```

pub use crate::entity::{
    DataSourceFilter, DataSourceSelect, Lookup, MarketFilter, MarketSelect, MarketType,
    OhlcvtFilter, OhlcvtSelect, Page, PriceFilter, PriceSelect, TradingPairFilter,
    TradingPairSelect, WalletFilter, WalletSelect,
};
pub use crate::qb::{self, FilterBracket, ValueFilter};
pub use crate::{
    FromRow, GenericClient, OrmError, OrmResult, RowExt, Services, Store, StoreConfig, params,
};
