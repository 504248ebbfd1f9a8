//! Data sources: the exchanges and feeds market data is collected from.

use crate::entity::{Lookup, Page};
use crate::error::OrmResult;
use crate::params;
use crate::qb::{self, BuiltQuery, FilterBracket, ValueFilter};
use crate::row::{FromRow, RowExt};
use crate::service::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_postgres::Row;

pub const TABLE: &str = "core.data_sources";

const COLUMNS: &[&str] = &["id", "name", "kind", "url", "created_at"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSource {
    pub id: i64,
    pub name: String,
    /// Free-form category, e.g. `exchange` or `aggregator`.
    pub kind: String,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FromRow for DataSource {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get_column("id")?,
            name: row.try_get_column("name")?,
            kind: row.try_get_column("kind")?,
            url: row.try_get_column("url")?,
            created_at: row.try_get_column("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDataSource {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Partial update. `url: Some(None)` clears the URL.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DataSourcePatch {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub url: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceSelect {
    ById(i64),
    ByName(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DataSourceFilter {
    /// Matches any of the names. Empty means no constraint.
    pub names: Vec<String>,
    pub kind: Option<String>,
    pub page: Page,
}

pub fn insert_query(new: &NewDataSource) -> OrmResult<BuiltQuery> {
    let mut qb = qb::insert(TABLE);
    qb.set_insert_field(&["name", "kind", "url"]);
    qb.set_insert_values(params![new.name.clone(), new.kind.clone(), new.url.clone()])?;
    qb.set_return_fields(COLUMNS);
    qb.generate_sql()
}

/// `UPDATE ... WHERE id = ?` over the fields present in `patch`.
pub fn update_query(id: i64, patch: &DataSourcePatch) -> OrmResult<BuiltQuery> {
    let mut qb = qb::update(TABLE);
    qb.set_update_opt("name", patch.name.clone())
        .set_update_opt("kind", patch.kind.clone())
        .set_update_opt("url", patch.url.clone())
        .and_where_value("id = ?", id)
        .set_return_fields(COLUMNS);
    qb.generate_sql()
}

pub fn select_query(select: &DataSourceSelect) -> OrmResult<BuiltQuery> {
    let mut qb = qb::select(TABLE);
    qb.select(COLUMNS);
    match select {
        DataSourceSelect::ById(id) => qb.and_where_value("id = ?", *id),
        DataSourceSelect::ByName(name) => qb.and_where_value("name = ?", name.clone()),
    };
    qb.generate_sql()
}

pub fn list_query(filter: &DataSourceFilter) -> OrmResult<BuiltQuery> {
    let mut qb = qb::select(TABLE);
    qb.select(COLUMNS)
        .and_bracket(FilterBracket::any_of(
            "name",
            filter.names.iter().cloned().map(ValueFilter::single),
        ))
        .and_where_opt("kind = ?", filter.kind.clone())
        .order_by("name ASC");
    filter.page.apply(&mut qb);
    qb.generate_sql()
}

#[derive(Clone)]
pub struct DataSourceRepo {
    store: Arc<Store>,
}

impl DataSourceRepo {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: &NewDataSource) -> OrmResult<DataSource> {
        let built = insert_query(new)?;
        let mut client = self.store.client().await?;
        self.store
            .executor()
            .write_one(&mut client, "data_sources.create", &built)
            .await
    }

    pub async fn update(&self, id: i64, patch: &DataSourcePatch) -> OrmResult<DataSource> {
        let built = update_query(id, patch)?;
        let mut client = self.store.client().await?;
        self.store
            .executor()
            .write_one(&mut client, "data_sources.update", &built)
            .await
    }

    pub async fn get(&self, select: &DataSourceSelect) -> OrmResult<DataSource> {
        let built = select_query(select)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_one(&client, "data_sources.get", &built)
            .await
    }

    pub async fn find(&self, select: &DataSourceSelect) -> OrmResult<Lookup<DataSource>> {
        Lookup::from_result(self.get(select).await)
    }

    pub async fn list(&self, filter: &DataSourceFilter) -> OrmResult<Vec<DataSource>> {
        let built = list_query(filter)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_all(&client, "data_sources.list", &built)
            .await
    }
}
