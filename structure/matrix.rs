use super::StructureError;
use ndarray::{Array2, ArrayView1};

/// Binary sample-by-feature matrix. Rows are samples, columns are features.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleMatrix {
    data: Array2<u8>,
}

impl SampleMatrix {
    /// Wraps a dense matrix after checking that every entry is 0 or 1.
    pub fn new(data: Array2<u8>) -> Result<Self, StructureError> {
        if let Some(((row, column), &value)) = data.indexed_iter().find(|(_, v)| **v > 1) {
            return Err(StructureError::NonBinaryValue { row, column, value });
        }
        Ok(Self { data })
    }

    /// Builds a matrix from row vectors. All rows must share a length.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, StructureError> {
        let n_features = rows.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(rows.len() * n_features);
        for (row, values) in rows.iter().enumerate() {
            if values.len() != n_features {
                return Err(StructureError::RaggedRows {
                    row,
                    found: values.len(),
                    expected: n_features,
                });
            }
            flat.extend_from_slice(values);
        }
        let data = Array2::from_shape_vec((rows.len(), n_features), flat)
            .map_err(|_| StructureError::RaggedRows {
                row: 0,
                found: 0,
                expected: n_features,
            })?;
        Self::new(data)
    }

    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, u8> {
        self.data.row(index)
    }

    pub fn column(&self, index: usize) -> ArrayView1<'_, u8> {
        self.data.column(index)
    }

    /// Manhattan distance between two sample rows.
    pub fn row_distance(&self, a: usize, b: usize) -> f64 {
        let mismatches = self
            .data
            .row(a)
            .iter()
            .zip(self.data.row(b).iter())
            .filter(|(x, y)| x != y)
            .count();
        mismatches as f64
    }
}
