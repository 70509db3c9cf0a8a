//! Named numeric arrays handed to an engine.
//!
//! Arrays are stored column-major (first index fastest), the layout of the
//! model language and of R's `dump` format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Dense numeric array with 0, 1 or more dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    dims: Vec<usize>,
    values: Vec<f64>,
}

impl Array {
    /// Scalar value.
    #[must_use]
    pub fn scalar(value: f64) -> Self {
        Self {
            dims: Vec::new(),
            values: vec![value],
        }
    }

    /// One-dimensional array.
    #[must_use]
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            dims: vec![values.len()],
            values,
        }
    }

    /// Array from column-major values.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `values.len()` is not the product of
    /// `dims`.
    pub fn from_column_major(dims: Vec<usize>, values: Vec<f64>) -> SimResult<Self> {
        let expected: usize = dims.iter().product();
        if expected != values.len() {
            return Err(SimError::dimension_mismatch(
                "array",
                format!("{expected} values for dims {dims:?}"),
                values.len(),
            ));
        }
        Ok(Self { dims, values })
    }

    /// Dimensions; empty for a scalar.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Values in column-major order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Total number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the array holds no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the array is a scalar.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Value of a scalar (or the first cell).
    #[must_use]
    pub fn first(&self) -> Option<f64> {
        self.values.first().copied()
    }

    /// Column-major offset of a 1-based position, or `None` when out of range.
    #[must_use]
    pub fn offset(&self, position: &[usize]) -> Option<usize> {
        column_major_offset(&self.dims, position)
    }

    /// Value at a 1-based position.
    #[must_use]
    pub fn get(&self, position: &[usize]) -> Option<f64> {
        self.offset(position).map(|k| self.values[k])
    }
}

/// Column-major offset of a 1-based position within `dims`.
///
/// A scalar (`dims` empty) accepts the empty position and `[1]`.
#[must_use]
pub fn column_major_offset(dims: &[usize], position: &[usize]) -> Option<usize> {
    if dims.is_empty() {
        return match position {
            [] | [1] => Some(0),
            _ => None,
        };
    }
    if position.len() != dims.len() {
        return None;
    }
    let mut offset = 0;
    let mut stride = 1;
    for (&index, &extent) in position.iter().zip(dims) {
        if index == 0 || index > extent {
            return None;
        }
        offset += (index - 1) * stride;
        stride *= extent;
    }
    Some(offset)
}

/// 1-based position of a column-major offset.
#[must_use]
pub fn column_major_position(dims: &[usize], mut offset: usize) -> Vec<usize> {
    dims.iter()
        .map(|&extent| {
            let index = offset % extent + 1;
            offset /= extent;
            index
        })
        .collect()
}

/// Label of one cell, e.g. `y[3,2]`; scalars are the bare name.
#[must_use]
pub fn cell_label(name: &str, dims: &[usize], offset: usize) -> String {
    if dims.is_empty() {
        return name.to_string();
    }
    let position: Vec<String> = column_major_position(dims, offset)
        .iter()
        .map(ToString::to_string)
        .collect();
    format!("{name}[{}]", position.join(","))
}

/// Named arrays, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    entries: BTreeMap<String, Array>,
}

impl DataSet {
    /// Empty data set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an array.
    pub fn insert(&mut self, name: impl Into<String>, array: Array) {
        self.entries.insert(name.into(), array);
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, array: Array) -> Self {
        self.insert(name, array);
        self
    }

    /// Look up an array.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Array> {
        self.entries.get(name)
    }

    /// Whether `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of arrays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
