use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

/// Accumulated predicate and shape of a statement over the tracks table.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    clauses: Vec<String>,
    values: Vec<Value>,
    group_string: Option<String>,
    order_string: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// Escapes LIKE wildcards in a literal prefix.
pub fn like_prefix(prefix: &str) -> String {
    let mut result = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if ch == '%' || ch == '_' || ch == '\\' {
            result.push('\\');
        }
        result.push(ch);
    }
    result.push('%');
    result
}

impl QueryOptions {
    pub fn new() -> QueryOptions {
        QueryOptions::default()
    }

    pub fn filter(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    pub fn filter_value<T>(&mut self, clause: &str, value: T)
    where
        T: Into<Value>,
    {
        self.clauses.push(clause.to_string());
        self.values.push(value.into());
    }

    pub fn filter_values(&mut self, clause: &str, values: Vec<Value>) {
        self.clauses.push(clause.to_string());
        self.values.extend(values);
    }

    /// Restricts to tracks whose path starts with `prefix`.
    pub fn filter_path(&mut self, prefix: &str) {
        self.filter_value("tracks.path LIKE ? ESCAPE '\\'", like_prefix(prefix));
    }

    /// Restricts to tracks carrying the given value of a tag table.
    pub fn filter_tag(&mut self, table: &str, value_id: i64) {
        self.filter_value(
            &format!(
                "tracks.docidx IN (SELECT docidx FROM {0}_tracks WHERE {0}_id = ?)",
                table
            ),
            value_id,
        );
    }

    pub fn group_string(&mut self, group_string: &str) {
        self.group_string = Some(group_string.to_string());
    }

    pub fn order_string(&mut self, order_string: &str) {
        self.order_string = Some(order_string.to_string());
    }

    pub fn limit(&mut self, limit: i64) {
        self.limit = Some(limit);
    }

    pub fn offset(&mut self, offset: i64) {
        self.offset = Some(offset);
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Subquery selecting the docidx of every matching track.
    pub fn docidx_subquery(&self) -> String {
        format!("SELECT tracks.docidx FROM tracks{}", self.where_clause())
    }

    fn sql(&self, select_from: &str) -> String {
        let mut sql = select_from.to_string();

        sql += &self.where_clause();

        if let Some(group) = &self.group_string {
            sql += " GROUP BY ";
            sql += group;
        }

        if let Some(order) = &self.order_string {
            sql += " ORDER BY ";
            sql += order;
        }

        if let Some(limit) = self.limit {
            sql += &format!(" LIMIT {}", limit);
        }

        if let Some(offset) = self.offset {
            if self.limit.is_none() {
                sql += " LIMIT -1";
            }
            sql += &format!(" OFFSET {}", offset);
        }

        sql
    }

    /// Identifies the statement and its bound values.
    pub fn cache_key(&self, select_from: &str) -> String {
        format!("{} {:?}", self.sql(select_from), self.values)
    }

    pub fn get_total(&self, conn: &Connection, select_from: &str) -> Result<i64, rusqlite::Error> {
        let sql = self.sql(select_from);

        let mut st = conn.prepare(&sql)?;

        st.query_row(params_from_iter(self.values.iter()), |row| row.get(0))
    }

    pub fn query_map<T, F>(&self, conn: &Connection, select_from: &str, f: F) -> Result<Vec<T>, rusqlite::Error>
    where
        F: FnMut(&Row) -> Result<T, rusqlite::Error>,
    {
        let sql = self.sql(select_from);
        trace!("query '{}' {:?}", sql, self.values);

        let mut st = conn.prepare(&sql)?;
        let rows = st.query_map(params_from_iter(self.values.iter()), f)?;
        rows.collect()
    }

    pub fn query_ids(&self, conn: &Connection, select_from: &str) -> Result<Vec<i64>, rusqlite::Error> {
        self.query_map(conn, select_from, |row| row.get(0))
    }
}
