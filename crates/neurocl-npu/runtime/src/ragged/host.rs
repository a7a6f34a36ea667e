// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, RuntimeError};

/// Host-side ragged array
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaggedArray {
    buf: Vec<f32>,
    starts: Vec<usize>,
    shape0s: Vec<usize>,
    shape1s: Vec<usize>,
}

impl RaggedArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// One vector row per item
    pub fn from_vectors<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[f32]>,
    {
        let mut array = Self::new();
        for row in rows {
            array.push_vector(row.as_ref());
        }
        array
    }

    /// One matrix row per item
    pub fn from_matrices<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a Array2<f32>>,
    {
        let mut array = Self::new();
        for row in rows {
            array.push_matrix(row);
        }
        array
    }

    /// Append a vector row and return its index
    pub fn push_vector(&mut self, data: &[f32]) -> usize {
        self.push_row(data.iter().copied(), data.len(), 1)
    }

    /// Append a matrix row (stored row-major) and return its index
    pub fn push_matrix(&mut self, data: &Array2<f32>) -> usize {
        let (rows, cols) = data.dim();
        self.push_row(data.iter().copied(), rows, cols)
    }

    fn push_row(&mut self, data: impl Iterator<Item = f32>, shape0: usize, shape1: usize) -> usize {
        self.starts.push(self.buf.len());
        self.shape0s.push(shape0);
        self.shape1s.push(shape1);
        self.buf.extend(data);
        self.starts.len() - 1
    }

    /// Assemble from raw parts (used when reading back device arrays)
    pub(crate) fn from_parts(
        buf: Vec<f32>,
        starts: Vec<usize>,
        shape0s: Vec<usize>,
        shape1s: Vec<usize>,
    ) -> Self {
        Self {
            buf,
            starts,
            shape0s,
            shape1s,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn buf(&self) -> &[f32] {
        &self.buf
    }

    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    pub fn shape0s(&self) -> &[usize] {
        &self.shape0s
    }

    pub fn shape1s(&self) -> &[usize] {
        &self.shape1s
    }

    /// Element count of row `i`
    pub fn row_len(&self, i: usize) -> usize {
        self.shape0s[i] * self.shape1s[i]
    }

    /// Flat data of row `i`
    pub fn row(&self, i: usize) -> Result<&[f32]> {
        self.check_row(i)?;
        let start = self.starts[i];
        Ok(&self.buf[start..start + self.row_len(i)])
    }

    /// Mutable flat data of row `i`
    pub fn row_mut(&mut self, i: usize) -> Result<&mut [f32]> {
        self.check_row(i)?;
        let start = self.starts[i];
        let len = self.row_len(i);
        Ok(&mut self.buf[start..start + len])
    }

    /// Row `i` viewed as a `shape0 x shape1` matrix
    pub fn matrix(&self, i: usize) -> Result<ArrayView2<'_, f32>> {
        let data = self.row(i)?;
        ArrayView2::from_shape((self.shape0s[i], self.shape1s[i]), data)
            .map_err(|e| RuntimeError::Device(format!("row {} has inconsistent shape: {}", i, e)))
    }

    fn check_row(&self, i: usize) -> Result<()> {
        if i >= self.len() {
            return Err(RuntimeError::RowOutOfRange {
                row: i,
                len: self.len(),
            });
        }
        Ok(())
    }
}
