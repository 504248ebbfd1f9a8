//! OHLCVT candles: open, high, low, close, volume and trade count per
//! timeframe bucket.

use crate::client::StreamingClient;
use crate::entity::{Page, TradingPairRepo, TradingPairSelect};
use crate::error::{OrmError, OrmResult};
use crate::executor::RecordStream;
use crate::params;
use crate::qb::{self, BuiltQuery, FilterBracket, ValueFilter};
use crate::row::{FromRow, RowExt};
use crate::service::Store;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_postgres::Row;

pub const TABLE: &str = "core.ohlcvt";

const COLUMNS: &[&str] = &[
    "id",
    "pair_id",
    "timeframe",
    "open_time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "trades",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ohlcvt {
    pub id: i64,
    pub pair_id: i64,
    /// Bucket width, e.g. `1m`, `1h`, `1d`.
    pub timeframe: String,
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trades: i64,
}

impl FromRow for Ohlcvt {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get_column("id")?,
            pair_id: row.try_get_column("pair_id")?,
            timeframe: row.try_get_column("timeframe")?,
            open_time: row.try_get_column("open_time")?,
            open: row.try_get_column("open")?,
            high: row.try_get_column("high")?,
            low: row.try_get_column("low")?,
            close: row.try_get_column("close")?,
            volume: row.try_get_column("volume")?,
            trades: row.try_get_column("trades")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOhlcvt {
    pub pair_id: i64,
    pub timeframe: String,
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trades: i64,
}

impl NewOhlcvt {
    /// `low <= open, close <= high`, non-negative volume and trade count.
    pub fn validate(&self) -> OrmResult<()> {
        check_candle(self.open, self.high, self.low, self.close)?;
        if self.volume < Decimal::ZERO || self.trades < 0 {
            return Err(OrmError::validation(format!(
                "negative volume or trade count at {}",
                self.open_time
            )));
        }
        if self.timeframe.trim().is_empty() {
            return Err(OrmError::validation("timeframe must not be empty"));
        }
        Ok(())
    }
}

fn check_candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> OrmResult<()> {
    let within = |v: Decimal| low <= v && v <= high;
    if !(within(open) && within(close)) {
        return Err(OrmError::validation(format!(
            "inconsistent candle: open {open}, high {high}, low {low}, close {close}"
        )));
    }
    Ok(())
}

/// Partial update of a candle that is still forming.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OhlcvtPatch {
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub trades: Option<i64>,
}

impl OhlcvtPatch {
    /// Checks what the patch alone can tell: `low <= close <= high` among the
    /// fields present, non-negative volume and trade count. The stored open
    /// price is not consulted.
    pub fn validate(&self) -> OrmResult<()> {
        let bounds = [
            (self.low, self.high),
            (self.low, self.close),
            (self.close, self.high),
        ];
        for (lower, upper) in bounds {
            if let (Some(lower), Some(upper)) = (lower, upper) {
                if lower > upper {
                    return Err(OrmError::validation(format!(
                        "inconsistent candle patch: high {:?}, low {:?}, close {:?}",
                        self.high, self.low, self.close
                    )));
                }
            }
        }
        if self.volume.is_some_and(|v| v < Decimal::ZERO) || self.trades.is_some_and(|t| t < 0) {
            return Err(OrmError::validation("negative volume or trade count in candle patch"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OhlcvtSelect {
    ById(i64),
    ByKey {
        pair_id: i64,
        timeframe: String,
        open_time: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OhlcvtFilter {
    pub pair_id: Option<i64>,
    pub timeframe: Option<String>,
    pub open_time: Vec<ValueFilter<DateTime<Utc>>>,
    pub trades: Vec<ValueFilter<i64>>,
    pub page: Page,
}

/// Multi-row `INSERT` for a batch of candles, numbered row by row.
///
/// An empty batch is a validation error. Candles are not validated here;
/// [`OhlcvtRepo::create_many`] does that before calling in.
pub fn insert_many_query(candles: &[NewOhlcvt]) -> OrmResult<BuiltQuery> {
    if candles.is_empty() {
        return Err(OrmError::validation("no candles to insert"));
    }
    let mut qb = qb::insert(TABLE);
    qb.set_insert_field(&COLUMNS[1..]);
    for c in candles {
        qb.set_insert_values(params![
            c.pair_id,
            c.timeframe.clone(),
            c.open_time,
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume,
            c.trades
        ])?;
    }
    qb.set_return_fields(COLUMNS);
    qb.generate_sql()
}

/// Validated partial update by id.
pub fn update_query(id: i64, patch: &OhlcvtPatch) -> OrmResult<BuiltQuery> {
    patch.validate()?;
    let mut qb = qb::update(TABLE);
    qb.set_update_opt("high", patch.high)
        .set_update_opt("low", patch.low)
        .set_update_opt("close", patch.close)
        .set_update_opt("volume", patch.volume)
        .set_update_opt("trades", patch.trades)
        .and_where_value("id = ?", id)
        .set_return_fields(COLUMNS);
    qb.generate_sql()
}

pub fn select_query(select: &OhlcvtSelect) -> OrmResult<BuiltQuery> {
    let mut qb = qb::select(TABLE);
    qb.select(COLUMNS);
    match select {
        OhlcvtSelect::ById(id) => {
            qb.and_where_value("id = ?", *id);
        }
        OhlcvtSelect::ByKey {
            pair_id,
            timeframe,
            open_time,
        } => {
            qb.and_where_value("pair_id = ?", *pair_id)
                .and_where_value("timeframe = ?", timeframe.clone())
                .and_where_value("open_time = ?", *open_time);
        }
    }
    qb.generate_sql()
}

/// Candles in `open_time` order. `open_time` and `trades` take lists of
/// values and ranges, each list OR-ed inside its own bracket.
pub fn list_query(filter: &OhlcvtFilter) -> OrmResult<BuiltQuery> {
    let mut qb = qb::select(TABLE);
    qb.select(COLUMNS)
        .and_where_opt("pair_id = ?", filter.pair_id)
        .and_where_opt("timeframe = ?", filter.timeframe.clone())
        .and_bracket(FilterBracket::any_of("open_time", filter.open_time.iter().cloned()))
        .and_bracket(FilterBracket::any_of("trades", filter.trades.iter().cloned()))
        .order_by("open_time ASC");
    filter.page.apply(&mut qb);
    qb.generate_sql()
}

#[derive(Clone)]
pub struct OhlcvtRepo {
    store: Arc<Store>,
    pairs: TradingPairRepo,
}

impl OhlcvtRepo {
    pub fn new(store: Arc<Store>, pairs: TradingPairRepo) -> Self {
        Self { store, pairs }
    }

    pub async fn create(&self, new: &NewOhlcvt) -> OrmResult<Ohlcvt> {
        let mut created = self.create_many(std::slice::from_ref(new)).await?;
        created
            .pop()
            .ok_or_else(|| OrmError::Other("insert returned no row".to_string()))
    }

    /// Insert candles in one statement.
    ///
    /// All candles of a batch must belong to the same pair.
    pub async fn create_many(&self, candles: &[NewOhlcvt]) -> OrmResult<Vec<Ohlcvt>> {
        let Some(first) = candles.first() else {
            return Ok(Vec::new());
        };
        if let Some(other) = candles.iter().find(|c| c.pair_id != first.pair_id) {
            return Err(OrmError::validation(format!(
                "candle batch mixes pairs {} and {}",
                first.pair_id, other.pair_id
            )));
        }
        for candle in candles {
            candle.validate()?;
        }
        self.pairs
            .find(&TradingPairSelect::ById(first.pair_id))
            .await?
            .require("trading pair")?;

        let built = insert_many_query(candles)?;
        let mut client = self.store.client().await?;
        self.store
            .executor()
            .write(&mut client, "ohlcvt.create_many", &built)
            .await
    }

    pub async fn update(&self, id: i64, patch: &OhlcvtPatch) -> OrmResult<Ohlcvt> {
        let built = update_query(id, patch)?;
        let mut client = self.store.client().await?;
        self.store
            .executor()
            .write_one(&mut client, "ohlcvt.update", &built)
            .await
    }

    pub async fn get(&self, select: &OhlcvtSelect) -> OrmResult<Ohlcvt> {
        let built = select_query(select)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_one(&client, "ohlcvt.get", &built)
            .await
    }

    pub async fn list(&self, filter: &OhlcvtFilter) -> OrmResult<Vec<Ohlcvt>> {
        let built = list_query(filter)?;
        let client = self.store.client().await?;
        self.store
            .executor()
            .fetch_all(&client, "ohlcvt.list", &built)
            .await
    }

    /// Stream matching candles over a caller-held connection.
    pub async fn list_stream<C: StreamingClient>(
        &self,
        conn: &C,
        filter: &OhlcvtFilter,
    ) -> OrmResult<RecordStream<Ohlcvt>> {
        let built = list_query(filter)?;
        self.store
            .executor()
            .fetch_stream(conn, "ohlcvt.list_stream", &built)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(minute: u32) -> NewOhlcvt {
        NewOhlcvt {
            pair_id: 3,
            timeframe: "1m".into(),
            open_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            open: Decimal::new(100, 0),
            high: Decimal::new(110, 0),
            low: Decimal::new(95, 0),
            close: Decimal::new(105, 0),
            volume: Decimal::new(125, 1),
            trades: 42,
        }
    }

    #[test]
    fn test_insert_many_two_candles() {
        let built = insert_many_query(&[candle(0), candle(1)]).unwrap();
        assert!(built.sql.starts_with(
            "INSERT INTO core.ohlcvt \
             (pair_id, timeframe, open_time, open, high, low, close, volume, trades) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9), ($10, $11, $12, $13, $14, $15, $16, $17, $18)"
        ));
        assert_eq!(built.args.len(), 18);
        assert_eq!(built.args.describe()[10], "1m");
    }

    #[test]
    fn test_candle_validation() {
        assert!(candle(0).validate().is_ok());

        let mut broken = candle(0);
        broken.close = Decimal::new(120, 0);
        assert!(matches!(broken.validate(), Err(OrmError::Validation(_))));

        let mut negative = candle(0);
        negative.trades = -1;
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_patch_validation() {
        let patch: OhlcvtPatch = serde_json::from_str(r#"{"high": "1", "low": "5"}"#).unwrap();
        assert!(matches!(patch.validate(), Err(OrmError::Validation(_))));
        assert!(matches!(update_query(9, &patch), Err(OrmError::Validation(_))));

        let close_above_high = OhlcvtPatch {
            high: Some(Decimal::new(110, 0)),
            close: Some(Decimal::new(111, 0)),
            ..Default::default()
        };
        assert!(close_above_high.validate().is_err());

        let negative_volume = OhlcvtPatch {
            volume: Some(Decimal::new(-1, 0)),
            ..Default::default()
        };
        assert!(negative_volume.validate().is_err());

        let ok = OhlcvtPatch {
            high: Some(Decimal::new(112, 0)),
            close: Some(Decimal::new(111, 0)),
            trades: Some(43),
            ..Default::default()
        };
        let built = update_query(9, &ok).unwrap();
        assert!(built
            .sql
            .starts_with("UPDATE core.ohlcvt SET high = $1, close = $2, trades = $3 WHERE (id = $4)"));
    }

    #[test]
    fn test_list_trade_count_ranges() {
        let filter = OhlcvtFilter {
            pair_id: Some(3),
            timeframe: Some("1h".into()),
            trades: vec![ValueFilter::at_least(1000), ValueFilter::from(10..=20)],
            ..Default::default()
        };
        let built = list_query(&filter).unwrap();
        assert!(built.sql.ends_with(
            "FROM core.ohlcvt WHERE (pair_id = $1 AND timeframe = $2 AND \
             (trades >= $3 OR (trades >= $4 AND trades <= $5))) ORDER BY open_time ASC"
        ));
        assert_eq!(built.args.describe(), vec!["3", "1h", "1000", "10", "20"]);
    }

    #[test]
    fn test_trade_filter_from_json() {
        let filter: OhlcvtFilter = serde_json::from_str(
            r#"{"trades": [{"single": 7}, {"range": {"lower": {"Excluded": 50}, "upper": "Unbounded"}}]}"#,
        )
        .unwrap();
        let built = list_query(&filter).unwrap();
        assert!(built.sql.contains("WHERE ((trades = $1 OR trades > $2))"));
    }

    #[test]
    fn test_select_by_key() {
        let built = select_query(&OhlcvtSelect::ByKey {
            pair_id: 3,
            timeframe: "1d".into(),
            open_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        })
        .unwrap();
        assert!(built
            .sql
            .ends_with("WHERE (pair_id = $1 AND timeframe = $2 AND open_time = $3)"));
        assert_eq!(
            built.description,
            "pair_id = 3 AND timeframe = 1d AND open_time = 2024-03-01T00:00:00Z"
        );
    }
}
