//! Statement builder shared by every repository.

use crate::error::{OrmError, OrmResult};
use crate::qb::filter::FilterBracket;
use crate::qb::param::{Args, Param};
use crate::qb::sequencer::ArgSequencer;
use tokio_postgres::types::ToSql;

/// Statement kind, fixed when the builder is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Insert,
    Update,
    Select,
}

/// A rendered statement: SQL text, its positional arguments, and a
/// human-readable rendering of the WHERE predicate.
///
/// `description` is only meant for logs and error messages.
#[derive(Clone, Debug)]
pub struct BuiltQuery {
    pub sql: String,
    pub args: Args,
    pub description: String,
}

impl BuiltQuery {
    /// Get parameters as references for tokio-postgres.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.args.as_refs()
    }
}

/// Accumulates the parts of one INSERT, UPDATE or SELECT statement.
///
/// Setters only record; nothing is numbered until [`QueryBuilder::generate_sql`],
/// which renders every fragment through a single [`ArgSequencer`] in text
/// order.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    mode: Mode,
    table: String,
    insert_fields: Vec<String>,
    insert_rows: Vec<Vec<Param>>,
    /// Ordered by first assignment; re-assigning keeps the position.
    update_assignments: Vec<(String, Param)>,
    select_fields: Vec<String>,
    joins: Vec<String>,
    root_filter: FilterBracket,
    return_fields: Vec<String>,
    order_by: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl QueryBuilder {
    /// Create an empty builder bound to one table and one statement kind.
    pub fn new(mode: Mode, table: &str) -> Self {
        Self {
            mode,
            table: table.to_string(),
            insert_fields: Vec::new(),
            insert_rows: Vec::new(),
            update_assignments: Vec::new(),
            select_fields: Vec::new(),
            joins: Vec::new(),
            root_filter: FilterBracket::and(),
            return_fields: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    // ==================== INSERT ====================

    /// Append insert columns. Duplicates are not detected.
    pub fn set_insert_field(&mut self, names: &[&str]) -> &mut Self {
        self.insert_fields
            .extend(names.iter().map(|name| name.to_string()));
        self
    }

    /// Append one row of insert values.
    ///
    /// The row must have one value per insert field and at least one value;
    /// otherwise the builder is left untouched and a structural error is
    /// returned. A table filled from column defaults is inserted by adding no
    /// row at all, which renders `DEFAULT VALUES`.
    pub fn set_insert_values(&mut self, row: Vec<Param>) -> OrmResult<&mut Self> {
        if row.is_empty() {
            return Err(OrmError::structural(format!(
                "empty insert row for {}",
                self.table
            )));
        }
        if row.len() != self.insert_fields.len() {
            return Err(OrmError::structural(format!(
                "field/value count mismatch for {}: {} field(s), {} value(s)",
                self.table,
                self.insert_fields.len(),
                row.len()
            )));
        }
        self.insert_rows.push(row);
        Ok(self)
    }

    /// Append columns for the `RETURNING` clause.
    pub fn set_return_fields(&mut self, fields: &[&str]) -> &mut Self {
        self.return_fields
            .extend(fields.iter().map(|field| field.to_string()));
        self
    }

    // ==================== UPDATE ====================

    /// Assign `field = value`. Assigning the same field again replaces the
    /// value in place.
    pub fn set_update<T: ToSql + Send + Sync + 'static>(&mut self, field: &str, value: T) -> &mut Self {
        self.set_update_param(field, Param::new(value))
    }

    pub fn set_update_param(&mut self, field: &str, value: Param) -> &mut Self {
        match self
            .update_assignments
            .iter_mut()
            .find(|(existing, _)| existing == field)
        {
            Some((_, slot)) => *slot = value,
            None => self.update_assignments.push((field.to_string(), value)),
        }
        self
    }

    /// Assign `field = value` when a value is present.
    pub fn set_update_opt<T: ToSql + Send + Sync + 'static>(
        &mut self,
        field: &str,
        value: Option<T>,
    ) -> &mut Self {
        if let Some(v) = value {
            self.set_update(field, v);
        }
        self
    }

    /// Whether at least one assignment exists. An UPDATE must not be rendered
    /// otherwise.
    pub fn is_updatable(&self) -> bool {
        !self.update_assignments.is_empty()
    }

    // ==================== SELECT / shared ====================

    /// Append projected expressions. Repeated calls accumulate, which lets an
    /// entity absorb the columns of a joined entity.
    pub fn select(&mut self, fields: &[&str]) -> &mut Self {
        self.select_fields
            .extend(fields.iter().map(|field| field.to_string()));
        self
    }

    /// Append a raw join clause, e.g. `LEFT JOIN core.markets b ON b.id = p.base_id`.
    ///
    /// The clause is emitted verbatim and must come from code, never from input.
    pub fn join(&mut self, clause: &str) -> &mut Self {
        self.joins.push(clause.to_string());
        self
    }

    /// AND a leaf predicate into the WHERE clause.
    ///
    /// Each `?` is a placeholder and `??` is a literal `?`, so
    /// `metadata ?? ?` tests for a JSONB key.
    pub fn and_where(&mut self, template: &str, args: Vec<Param>) -> &mut Self {
        self.root_filter.add_filter(template, args);
        self
    }

    /// AND a single-argument predicate into the WHERE clause.
    pub fn and_where_value<T: ToSql + Send + Sync + 'static>(
        &mut self,
        template: &str,
        value: T,
    ) -> &mut Self {
        self.and_where(template, vec![Param::new(value)])
    }

    /// AND a single-argument predicate when a value is present.
    pub fn and_where_opt<T: ToSql + Send + Sync + 'static>(
        &mut self,
        template: &str,
        value: Option<T>,
    ) -> &mut Self {
        if let Some(v) = value {
            self.and_where_value(template, v);
        }
        self
    }

    /// AND a whole sub-tree into the WHERE clause.
    pub fn and_bracket(&mut self, bracket: FilterBracket) -> &mut Self {
        self.root_filter.add_bracket(bracket);
        self
    }

    pub fn order_by(&mut self, expr: &str) -> &mut Self {
        self.order_by.push(expr.to_string());
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    // ==================== Build ====================

    /// Render the statement.
    ///
    /// Rendering does not consume or mutate the builder; two calls on the same
    /// state produce identical text and arguments.
    ///
    /// An INSERT has no WHERE clause, so an insert builder carrying filters is
    /// a structural error.
    pub fn generate_sql(&self) -> OrmResult<BuiltQuery> {
        if self.mode == Mode::Insert && !self.root_filter.is_empty() {
            return Err(OrmError::structural(format!(
                "insert into {} cannot carry a WHERE filter ({})",
                self.table,
                self.root_filter.describe()
            )));
        }
        self.root_filter.validate()?;

        let mut seq = ArgSequencer::new();
        let sql = match self.mode {
            Mode::Insert => self.build_insert(&mut seq),
            Mode::Update => {
                if !self.is_updatable() {
                    return Err(OrmError::NoOpUpdate(self.table.clone()));
                }
                self.build_update(&mut seq)
            }
            Mode::Select => self.build_select(&mut seq),
        };

        Ok(BuiltQuery {
            sql,
            args: seq.finish(),
            description: self.selection_description(),
        })
    }

    /// The WHERE predicate with values inlined, e.g. `symbol = BTC-USD`.
    pub fn selection_description(&self) -> String {
        self.root_filter.describe()
    }

    fn build_insert(&self, seq: &mut ArgSequencer) -> String {
        let mut sql = if self.insert_rows.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            let rows: Vec<String> = self
                .insert_rows
                .iter()
                .map(|row| {
                    let placeholders: Vec<String> =
                        row.iter().map(|value| seq.bind(value.clone())).collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES {}",
                self.table,
                self.insert_fields.join(", "),
                rows.join(", ")
            )
        };
        self.push_returning(&mut sql);
        sql
    }

    fn build_update(&self, seq: &mut ArgSequencer) -> String {
        // SET placeholders are bound before any WHERE placeholder.
        let set_parts: Vec<String> = self
            .update_assignments
            .iter()
            .map(|(field, value)| format!("{} = {}", field, seq.bind(value.clone())))
            .collect();

        let mut sql = format!("UPDATE {} SET {}", self.table, set_parts.join(", "));
        sql.push_str(" WHERE ");
        sql.push_str(&self.root_filter.render(seq));
        self.push_returning(&mut sql);
        sql
    }

    fn build_select(&self, seq: &mut ArgSequencer) -> String {
        let fields = if self.select_fields.is_empty() {
            "*".to_string()
        } else {
            self.select_fields.join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", fields, self.table);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(" WHERE ");
        sql.push_str(&self.root_filter.render(seq));

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    /// `RETURNING` uses the explicit return fields, falling back to the
    /// projected fields.
    fn push_returning(&self, sql: &mut String) {
        let cols = if !self.return_fields.is_empty() {
            &self.return_fields
        } else {
            &self.select_fields
        };
        if !cols.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&cols.join(", "));
        }
    }
}
