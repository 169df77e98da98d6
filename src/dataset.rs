//! The working dataset: a time-indexed panel of named numeric columns,
//! mutated in place by the Period Driver (component E's data side).
//!
//! Grounded in the original implementation's `solve_model` (`output_data_array`
//! / `var_col_index`), but stored row-major with an `IndexMap` column index
//! rather than a separate numpy array plus dict, matching how the corpus
//! keeps a dense table alongside a name→index map.

use indexmap::IndexMap;

use crate::error::ModelError;

/// A two-dimensional array of doubles: rows are time periods (caller-ordered,
/// never reordered), columns are named variables. Column lookups are
/// case-insensitive; the stored key is always lowercase.
#[derive(Debug, Clone)]
pub struct Panel {
    data: Vec<f64>,
    nrows: usize,
    ncols: usize,
    columns: IndexMap<String, usize>,
}

impl Panel {
    /// A zero-filled panel with the given columns and row count.
    pub fn new(column_names: &[String], nrows: usize) -> Self {
        let mut columns = IndexMap::new();
        for (i, name) in column_names.iter().enumerate() {
            columns.insert(name.to_lowercase(), i);
        }
        Panel {
            data: vec![0.0; nrows * column_names.len()],
            nrows,
            ncols: column_names.len(),
            columns,
        }
    }

    /// Build a panel from row-major data, validating every row has the same
    /// width as `column_names`.
    pub fn from_rows(column_names: &[String], rows: Vec<Vec<f64>>) -> Result<Self, ModelError> {
        let ncols = column_names.len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != ncols {
                return Err(ModelError::InputShapeMismatch {
                    message: format!(
                        "row {i} has {} cells, expected {ncols} (one per column)",
                        row.len()
                    ),
                });
            }
        }
        let nrows = rows.len();
        let mut data = Vec::with_capacity(nrows * ncols);
        for row in rows {
            data.extend(row);
        }
        let mut columns = IndexMap::new();
        for (i, name) in column_names.iter().enumerate() {
            columns.insert(name.to_lowercase(), i);
        }
        Ok(Panel {
            data,
            nrows,
            ncols,
            columns,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.get(&name.to_lowercase()).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Read the cell at `(row, name)`. Returns `None` if the column is
    /// unknown or the row is out of range.
    pub fn get(&self, row: usize, name: &str) -> Option<f64> {
        let col = self.column_index(name)?;
        self.data.get(row * self.ncols + col).copied()
    }

    /// Write the cell at `(row, name)`. Returns `None` (and writes nothing)
    /// if the column is unknown or the row is out of range.
    pub fn set(&mut self, row: usize, name: &str, value: f64) -> Option<()> {
        let col = self.column_index(name)?;
        if row >= self.nrows {
            return None;
        }
        self.data[row * self.ncols + col] = value;
        Some(())
    }
}
