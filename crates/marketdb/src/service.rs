//! The shared store and the repository graph built on top of it.
//!
//! ```ignore
//! dotenvy::dotenv().ok();
//! let config = marketdb::StoreConfig::load("marketdb.toml")?;
//! let services = marketdb::Services::new(Arc::new(marketdb::Store::from_config(&config)?));
//! let pair = services.trading_pairs.get(&TradingPairSelect::ById(1)).await?;
//! ```

use crate::config::StoreConfig;
use crate::entity::{
    DataSourceRepo, MarketRepo, OhlcvtRepo, PriceRepo, TradingPairRepo, WalletRepo,
};
use crate::error::OrmResult;
use crate::executor::Executor;
use crate::pool::create_pool;
use deadpool_postgres::Pool;
use std::sync::Arc;

/// A connection pool plus the executor every repository runs statements with.
pub struct Store {
    pool: Pool,
    executor: Executor,
}

impl Store {
    pub fn new(pool: Pool, executor: Executor) -> Self {
        Self { pool, executor }
    }

    pub fn from_config(config: &StoreConfig) -> OrmResult<Self> {
        let pool = create_pool(&config.database)?;
        let executor = Executor::from_config(config)?;
        tracing::info!(
            target: "marketdb",
            pool_max_size = config.database.pool_max_size,
            max_serialization_retries = executor.max_serialization_retries(),
            "store ready"
        );
        Ok(Self::new(pool, executor))
    }

    /// Check out a pooled connection.
    pub async fn client(&self) -> OrmResult<deadpool_postgres::Client> {
        Ok(self.pool.get().await?)
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

/// Every repository, wired once at start-up around one shared [`Store`].
#[derive(Clone)]
pub struct Services {
    pub store: Arc<Store>,
    pub data_sources: DataSourceRepo,
    pub markets: MarketRepo,
    pub trading_pairs: TradingPairRepo,
    pub prices: PriceRepo,
    pub candles: OhlcvtRepo,
    pub wallets: WalletRepo,
}

impl Services {
    pub fn new(store: Arc<Store>) -> Self {
        let data_sources = DataSourceRepo::new(store.clone());
        let markets = MarketRepo::new(store.clone());
        let trading_pairs =
            TradingPairRepo::new(store.clone(), markets.clone(), data_sources.clone());
        let prices = PriceRepo::new(store.clone(), trading_pairs.clone());
        let candles = OhlcvtRepo::new(store.clone(), trading_pairs.clone());
        let wallets = WalletRepo::new(store.clone(), markets.clone(), data_sources.clone());
        Self {
            store,
            data_sources,
            markets,
            trading_pairs,
            prices,
            candles,
            wallets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    #[test]
    fn test_services_share_one_store() {
        // Building a pool does not connect.
        let pool = create_pool(&DatabaseConfig {
            url: "postgres://localhost/markets".to_string(),
            pool_max_size: 2,
        })
        .unwrap();
        let store = Arc::new(Store::new(pool, Executor::default()));
        let services = Services::new(store.clone());

        assert!(Arc::ptr_eq(&services.store, &store));
        assert_eq!(services.store.pool().status().max_size, 2);
        let clone = services.clone();
        assert!(Arc::ptr_eq(&clone.store, &store));
    }
}
