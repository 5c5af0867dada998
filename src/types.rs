use std::{collections::BTreeMap, fmt, iter::FusedIterator, slice};

/// Rows returned by a read.
///
/// Every row has exactly one cell per column; this is checked when the result is decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub(crate) columns: Vec<String>,
    pub(crate) data: Vec<Vec<String>>,
    pub(crate) records_read: u64,
    pub(crate) time_ms: f64,
}

impl QueryResult {
    /// Column names in server order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw row matrix in server order.
    pub fn data(&self) -> &[Vec<String>] {
        &self.data
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row `index` as a column-name mapping.
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.data.get(index).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// All rows in server order. Each call starts from the first row.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            columns: &self.columns,
            inner: self.data.iter(),
        }
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|col| col == name)?;
        Some(self.data.iter().map(|row| row[idx].as_str()).collect())
    }

    pub fn into_data(self) -> Vec<Vec<String>> {
        self.data
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = Row<'a>;
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows()
    }
}

/// One row viewed as an ordered column-name → cell mapping.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [String],
}

impl<'a> Row<'a> {
    /// Cell under column `name`. With repeated column names, the first one wins.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        let idx = self.columns.iter().position(|col| col == name)?;
        self.values.get(idx).map(String::as_str)
    }

    /// `(column, cell)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    pub fn values(&self) -> &'a [String] {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Owned copy keyed by column name.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(col, value)| (col.to_owned(), value.to_owned()))
            .collect()
    }
}

impl fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over the rows of a [`QueryResult`].
#[derive(Clone, Debug)]
pub struct Rows<'a> {
    columns: &'a [String],
    inner: slice::Iter<'a, Vec<String>>,
}

impl<'a> Iterator for Rows<'a> {
    type Item = Row<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let columns = self.columns;
        self.inner.next().map(|values| Row { columns, values })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for Rows<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let columns = self.columns;
        self.inner.next_back().map(|values| Row { columns, values })
    }
}

impl ExactSizeIterator for Rows<'_> {}

impl FusedIterator for Rows<'_> {}

/// Counters reported by a mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CommitResult {
    pub databases_created: u64,
    pub databases_deleted: u64,
    pub tables_created: u64,
    pub tables_deleted: u64,
    pub records_written: u64,
    pub records_deleted: u64,
    pub time_ms: f64,
}

impl CommitResult {
    /// Sum of all six counters, saturating at `u64::MAX`.
    pub fn affected_rows(&self) -> u64 {
        [
            self.databases_created,
            self.databases_deleted,
            self.tables_created,
            self.tables_deleted,
            self.records_written,
            self.records_deleted,
        ]
        .into_iter()
        .fold(0, u64::saturating_add)
    }
}

/// Result of [`Session::execute`](crate::Session::execute).
#[derive(Clone, Debug, PartialEq)]
pub enum ExecuteResult {
    Query(QueryResult),
    Commit(CommitResult),
}

impl ExecuteResult {
    /// `"query"` or `"commit"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Query(_) => "query",
            Self::Commit(_) => "commit",
        }
    }

    pub fn as_query(&self) -> Option<&QueryResult> {
        match self {
            Self::Query(result) => Some(result),
            Self::Commit(_) => None,
        }
    }

    pub fn as_commit(&self) -> Option<&CommitResult> {
        match self {
            Self::Commit(result) => Some(result),
            Self::Query(_) => None,
        }
    }
}

/// Outcome of a successful `AUTH JWT` exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthInfo {
    pub authenticated: bool,
    /// `Name <email>` of the identity the server bound to this connection.
    pub identity: String,
    /// Seconds until the token expires, if it carries an expiry.
    pub expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::{CommitResult, QueryResult};

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec!["id".to_owned(), "value".to_owned()],
            data: vec![
                vec!["1".to_owned(), "hello".to_owned()],
                vec!["2".to_owned(), "world".to_owned()],
            ],
            records_read: 2,
            time_ms: 0.5,
        }
    }

    #[test]
    fn row_lookup_by_name() {
        let result = sample();
        let row = result.row(1).expect("row 1 exists");
        assert_eq!(row.get("id"), Some("2"));
        assert_eq!(row.get("value"), Some("world"));
        assert_eq!(row.get("missing"), None);
        assert!(result.row(2).is_none());
    }

    #[test]
    fn row_iter_preserves_column_order() {
        let result = sample();
        let row = result.row(0).expect("row 0 exists");
        let pairs: Vec<_> = row.iter().collect();
        assert_eq!(pairs, vec![("id", "1"), ("value", "hello")]);
        assert_eq!(format!("{row:?}"), r#"{"id": "1", "value": "hello"}"#);
    }

    #[test]
    fn iteration_is_restartable_and_matches_indexing() {
        let result = sample();
        let first: Vec<_> = result.rows().map(|row| row.to_map()).collect();
        let second: Vec<_> = (&result).into_iter().map(|row| row.to_map()).collect();
        assert_eq!(first, second);
        assert_eq!(result.rows().len(), result.len());

        for (idx, row) in result.rows().enumerate() {
            assert_eq!(Some(row), result.row(idx));
        }
    }

    #[test]
    fn column_projection() {
        let result = sample();
        assert_eq!(result.column("value"), Some(vec!["hello", "world"]));
        assert_eq!(result.column("nope"), None);
    }

    #[test]
    fn affected_rows_sums_all_counters() {
        assert_eq!(CommitResult::default().affected_rows(), 0);

        let result = CommitResult {
            databases_created: 1,
            databases_deleted: 2,
            tables_created: 3,
            tables_deleted: 4,
            records_written: 5,
            records_deleted: 6,
            time_ms: 1.0,
        };
        assert_eq!(result.affected_rows(), 21);
    }

    #[test]
    fn affected_rows_saturates() {
        let result = CommitResult {
            records_written: u64::MAX,
            records_deleted: 2,
            ..CommitResult::default()
        };
        assert_eq!(result.affected_rows(), u64::MAX);
    }
}
