//! Integration tests for the qb module.

use crate::error::OrmError;
use crate::params;
use crate::qb::{FilterBracket, Mode, QueryBuilder, ValueFilter, insert, select, update};

/// Every `$n` in `sql`, in text order.
fn placeholders(sql: &str) -> Vec<usize> {
    let mut found = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '$' {
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            if let Ok(n) = digits.parse() {
                found.push(n);
            }
        }
    }
    found
}

#[test]
fn test_insert_single_row() {
    let mut qb = QueryBuilder::new(Mode::Insert, "core.markets");
    qb.set_insert_field(&["symbol", "type"]);
    qb.set_insert_values(params!["BTC-USD", 1i32]).unwrap();

    let built = qb.generate_sql().unwrap();
    assert_eq!(
        built.sql,
        "INSERT INTO core.markets (symbol, type) VALUES ($1, $2)"
    );
    assert_eq!(built.args.describe(), vec!["BTC-USD", "1"]);
}

#[test]
fn test_insert_batch_numbers_row_major() {
    let mut qb = insert("core.prices");
    qb.set_insert_field(&["pair_id", "price", "observed_at"]);
    for i in 0..4i64 {
        qb.set_insert_values(params![i, i * 100, i * 1000]).unwrap();
    }
    qb.set_return_fields(&["id"]);

    let built = qb.generate_sql().unwrap();
    assert_eq!(built.args.len(), 3 * 4);
    assert_eq!(placeholders(&built.sql), (1..=12).collect::<Vec<_>>());
    assert!(built.sql.starts_with(
        "INSERT INTO core.prices (pair_id, price, observed_at) VALUES ($1, $2, $3), ($4, $5, $6)"
    ));
    assert!(built.sql.ends_with(" RETURNING id"));
    assert_eq!(
        built.args.describe(),
        vec!["0", "0", "0", "1", "100", "1000", "2", "200", "2000", "3", "300", "3000"]
    );
}

#[test]
fn test_insert_value_count_mismatch_leaves_builder_untouched() {
    let mut qb = insert("core.markets");
    qb.set_insert_field(&["symbol", "type"]);

    let err = qb.set_insert_values(params!["BTC-USD"]).unwrap_err();
    assert!(matches!(err, OrmError::Structural(_)));

    qb.set_insert_values(params!["ETH-USD", 2i16]).unwrap();
    let built = qb.generate_sql().unwrap();
    assert_eq!(built.args.describe(), vec!["ETH-USD", "2"]);
}

#[test]
fn test_insert_without_rows_uses_default_values() {
    let built = insert("core.data_sources").generate_sql().unwrap();
    assert_eq!(built.sql, "INSERT INTO core.data_sources DEFAULT VALUES");
}

#[test]
fn test_insert_empty_row_is_structural() {
    let mut qb = insert("core.markets");
    let err = qb.set_insert_values(params![]).unwrap_err();
    assert!(matches!(err, OrmError::Structural(_)));

    // the refused row leaves a builder that still renders valid SQL
    let built = qb.generate_sql().unwrap();
    assert_eq!(built.sql, "INSERT INTO core.markets DEFAULT VALUES");
    assert!(built.args.is_empty());
}

#[test]
fn test_insert_with_where_filter_is_structural() {
    let mut qb = insert("core.markets");
    qb.set_insert_field(&["symbol"]);
    qb.set_insert_values(params!["BTC-USD"]).unwrap();
    qb.and_where_value("id = ?", 1i64);

    match qb.generate_sql() {
        Err(OrmError::Structural(message)) => assert!(message.contains("id = 1")),
        other => panic!("expected structural error, got {other:?}"),
    }

    // an empty nested bracket renders nothing and is accepted
    let mut qb = insert("core.markets");
    qb.and_bracket(FilterBracket::or());
    assert!(qb.generate_sql().is_ok());
}

#[test]
fn test_insert_returning_falls_back_to_select_fields() {
    let mut qb = insert("core.markets");
    qb.set_insert_field(&["symbol"]);
    qb.set_insert_values(params!["SOL-USD"]).unwrap();
    qb.select(&["id", "symbol"]);

    let built = qb.generate_sql().unwrap();
    assert_eq!(
        built.sql,
        "INSERT INTO core.markets (symbol) VALUES ($1) RETURNING id, symbol"
    );
}

#[test]
fn test_update_numbers_set_before_where() {
    let mut qb = update("core.markets");
    qb.and_where_value("id = ?", 7i64);
    qb.set_update("symbol", "BTC-USDT");
    qb.set_update("type", 2i16);
    qb.and_where_value("data_source_id = ?", 3i64);

    let built = qb.generate_sql().unwrap();
    assert_eq!(
        built.sql,
        "UPDATE core.markets SET symbol = $1, type = $2 WHERE (id = $3 AND data_source_id = $4)"
    );
    assert_eq!(built.args.describe(), vec!["BTC-USDT", "2", "7", "3"]);
}

#[test]
fn test_update_reassignment_keeps_first_position() {
    let mut qb = update("core.markets");
    qb.set_update("symbol", "A");
    qb.set_update("type", 1i16);
    qb.set_update("symbol", "B");
    qb.and_where_value("id = ?", 1i64);

    let built = qb.generate_sql().unwrap();
    assert_eq!(
        built.sql,
        "UPDATE core.markets SET symbol = $1, type = $2 WHERE (id = $3)"
    );
    assert_eq!(built.args.describe(), vec!["B", "1", "1"]);
}

#[test]
fn test_update_without_assignments_is_refused() {
    let mut qb = update("core.markets");
    qb.and_where_value("id = ?", 1i64);
    qb.set_update_opt::<String>("symbol", None);

    assert!(!qb.is_updatable());
    let err = qb.generate_sql().unwrap_err();
    assert!(err.is_no_op_update());
}

#[test]
fn test_select_without_filter_uses_tautology() {
    let built = select("core.markets").generate_sql().unwrap();
    assert_eq!(built.sql, "SELECT * FROM core.markets WHERE 1=1");
    assert!(built.args.is_empty());
    assert_eq!(built.description, "1=1");
}

#[test]
fn test_select_fields_append_across_calls() {
    let mut qb = select("core.trading_pairs p");
    qb.select(&["p.id", "p.tick_size"]);
    qb.join("JOIN core.markets b ON b.id = p.base_market_id");
    qb.select(&["b.symbol AS base_symbol"]);
    qb.and_where_value("b.symbol = ?", "BTC");

    let built = qb.generate_sql().unwrap();
    assert_eq!(
        built.sql,
        "SELECT p.id, p.tick_size, b.symbol AS base_symbol FROM core.trading_pairs p \
         JOIN core.markets b ON b.id = p.base_market_id WHERE (b.symbol = $1)"
    );
    assert_eq!(built.description, "b.symbol = BTC");
}

#[test]
fn test_select_where_order_does_not_change_semantics() {
    let mut first = select("core.markets");
    first.and_where_value("symbol = ?", "BTC-USD");
    first.and_where_value("type = ?", 1i16);

    let mut second = select("core.markets");
    second.and_where_value("type = ?", 1i16);
    second.and_where_value("symbol = ?", "BTC-USD");

    let a = first.generate_sql().unwrap();
    let b = second.generate_sql().unwrap();
    assert_eq!(a.sql, "SELECT * FROM core.markets WHERE (symbol = $1 AND type = $2)");
    assert_eq!(b.sql, "SELECT * FROM core.markets WHERE (type = $1 AND symbol = $2)");
    assert_eq!(a.args.describe(), vec!["BTC-USD", "1"]);
    assert_eq!(b.args.describe(), vec!["1", "BTC-USD"]);
}

#[test]
fn test_select_with_range_brackets_and_paging() {
    let mut qb = select("core.trading_pairs");
    qb.and_where_value("data_source_id = ?", 2i64);
    qb.and_bracket(FilterBracket::any_of(
        "tick_size",
        vec![ValueFilter::single(5i64), ValueFilter::from(10i64..20)],
    ));
    qb.and_bracket(FilterBracket::any_of(
        "decimals",
        vec![ValueFilter::at_most(8i16)],
    ));
    qb.order_by("id ASC").limit(50).offset(100);

    let built = qb.generate_sql().unwrap();
    assert_eq!(
        built.sql,
        "SELECT * FROM core.trading_pairs WHERE (data_source_id = $1 AND \
         (tick_size = $2 OR (tick_size >= $3 AND tick_size < $4)) AND (decimals <= $5)) \
         ORDER BY id ASC LIMIT 50 OFFSET 100"
    );
    assert_eq!(built.args.describe(), vec!["2", "5", "10", "20", "8"]);
    assert_eq!(
        built.description,
        "data_source_id = 2 AND (tick_size = 5 OR (tick_size >= 10 AND tick_size < 20)) AND (decimals <= 8)"
    );
}

#[test]
fn test_generate_sql_is_idempotent() {
    let mut qb = update("core.wallets");
    qb.set_update("label", "cold");
    qb.and_bracket(
        FilterBracket::or()
            .set_filter_value("owner = ?", "alice")
            .set_filter_value("owner = ?", "bob"),
    );

    let a = qb.generate_sql().unwrap();
    let b = qb.generate_sql().unwrap();
    assert_eq!(a.sql, b.sql);
    assert_eq!(a.args.describe(), b.args.describe());
    assert_eq!(a.description, b.description);
}

#[test]
fn test_escaped_question_mark_reaches_sql() {
    let mut qb = select("core.wallets");
    qb.and_where_value("metadata ?? ?", "tier");
    qb.and_where("label LIKE '%??%'", params![]);

    let built = qb.generate_sql().unwrap();
    assert_eq!(
        built.sql,
        "SELECT * FROM core.wallets WHERE (metadata ? $1 AND label LIKE '%?%')"
    );
    assert_eq!(built.args.len(), 1);
    assert_eq!(built.description, "metadata ? tier AND label LIKE '%?%'");
}

#[test]
fn test_bad_where_template_fails_before_rendering() {
    let mut qb = select("core.markets");
    qb.and_where("symbol = ? OR symbol = ?", params!["BTC-USD"]);
    let err = qb.generate_sql().unwrap_err();
    assert!(matches!(err, OrmError::Structural(_)));
}
