//! Connection pool utilities

use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolBuilder, RecyclingMethod};
use tokio_postgres::NoTls;
use tokio_postgres::Socket;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};

/// Create a pool from the `[database]` section, without TLS.
///
/// ```ignore
/// let config = marketdb::StoreConfig::load("marketdb.toml")?;
/// let pool = marketdb::create_pool(&config.database)?;
/// let client = pool.get().await?;
/// ```
pub fn create_pool(config: &DatabaseConfig) -> OrmResult<Pool> {
    let max_size = config.pool_max_size;
    create_pool_with_tls(&config.url, NoTls, |builder| builder.max_size(max_size))
}

/// Create a pool with a custom TLS connector and pool tuning.
pub fn create_pool_with_tls<T>(
    database_url: &str,
    tls: T,
    configure_pool: impl FnOnce(PoolBuilder) -> PoolBuilder,
) -> OrmResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| OrmError::Connection(e.to_string()))?;

    let manager_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, tls, manager_config);
    configure_pool(Pool::builder(mgr))
        .build()
        .map_err(|e| OrmError::Pool(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_a_connection_error() {
        let config = DatabaseConfig {
            url: "not a url =".to_string(),
            pool_max_size: 4,
        };
        assert!(matches!(create_pool(&config), Err(OrmError::Connection(_))));
    }
}
