use chrono::NaiveDateTime;

/// A decoded but untyped table: named columns of optional text cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextTable {
    pub headers: Vec<String>,
    /// Column-major cells; every column has the same length.
    pub columns: Vec<Vec<Option<String>>>,
    /// Issue time of a forecast product.
    pub issued: Option<NaiveDateTime>,
}

impl TextTable {
    /// Builds a table from rows; short rows are padded with empty cells and
    /// cells beyond the header are dropped.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let mut columns = vec![Vec::with_capacity(rows.len()); headers.len()];
        for row in rows {
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.push(cells.next().flatten());
            }
        }
        Self {
            headers,
            columns,
            issued: None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name.trim())
    }

    pub fn cell(&self, column: usize, row: usize) -> Option<&str> {
        self.columns
            .get(column)
            .and_then(|c| c.get(row))
            .and_then(|cell| cell.as_deref())
    }
}

/// Turns an empty or blank cell into `None`.
pub(crate) fn non_blank(cell: impl Into<String>) -> Option<String> {
    let cell = cell.into();
    if cell.trim().is_empty() {
        None
    } else {
        Some(cell)
    }
}
