// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::trace;

use super::host::RaggedArray;
use crate::error::{Result, RuntimeError};
use crate::kernel::ScalarType;
use crate::traits::{Device, DeviceBuffer};

/// Ragged array whose data lives on a device
///
/// Row metadata stays on the host; planners copy the tables they need into
/// each kernel's metadata buffer. [`DeviceRaggedArray::select`] yields a view
/// over a subset of rows that shares the same device allocation.
pub struct DeviceRaggedArray<D: Device> {
    device: Arc<D>,
    buffer: D::Buffer,
    starts: Vec<usize>,
    shape0s: Vec<usize>,
    shape1s: Vec<usize>,
}

impl<D: Device> Clone for DeviceRaggedArray<D> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
            buffer: self.buffer.clone(),
            starts: self.starts.clone(),
            shape0s: self.shape0s.clone(),
            shape1s: self.shape1s.clone(),
        }
    }
}

impl<D: Device> std::fmt::Debug for DeviceRaggedArray<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRaggedArray")
            .field("device", &self.device.name())
            .field("buffer", &self.buffer)
            .field("rows", &self.starts.len())
            .finish()
    }
}

impl<D: Device> DeviceRaggedArray<D> {
    /// Upload a host ragged array
    pub fn from_host(device: Arc<D>, host: &RaggedArray, label: &str) -> Result<Self> {
        let buffer = device.alloc_f32(host.buf(), label)?;
        trace!(
            target: "neurocl-runtime",
            "[RAGGED] Uploaded '{}': {} rows, {} elements",
            label,
            host.len(),
            host.buf().len()
        );
        Ok(Self {
            device,
            buffer,
            starts: host.starts().to_vec(),
            shape0s: host.shape0s().to_vec(),
            shape1s: host.shape1s().to_vec(),
        })
    }

    /// Zero-filled array with the given `(shape0, shape1)` rows
    pub fn zeros(device: Arc<D>, shapes: &[(usize, usize)], label: &str) -> Result<Self> {
        let mut starts = Vec::with_capacity(shapes.len());
        let mut total = 0;
        for (shape0, shape1) in shapes {
            starts.push(total);
            total += shape0 * shape1;
        }
        let buffer = device.alloc_f32(&vec![0.0; total], label)?;
        Ok(Self {
            device,
            buffer,
            starts,
            shape0s: shapes.iter().map(|s| s.0).collect(),
            shape1s: shapes.iter().map(|s| s.1).collect(),
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Backing device allocation
    pub fn buffer(&self) -> &D::Buffer {
        &self.buffer
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.buffer.scalar_type()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
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

    /// Element counts of all rows
    pub fn lengths(&self) -> Vec<usize> {
        (0..self.len()).map(|i| self.row_len(i)).collect()
    }

    /// True if every row is a vector
    pub fn is_vector_batch(&self) -> bool {
        self.shape1s.iter().all(|&s| s == 1)
    }

    /// View over a subset of rows, in the given order
    pub fn select(&self, rows: &[usize]) -> Result<Self> {
        for &row in rows {
            self.check_row(row)?;
        }
        Ok(Self {
            device: Arc::clone(&self.device),
            buffer: self.buffer.clone(),
            starts: rows.iter().map(|&r| self.starts[r]).collect(),
            shape0s: rows.iter().map(|&r| self.shape0s[r]).collect(),
            shape1s: rows.iter().map(|&r| self.shape1s[r]).collect(),
        })
    }

    /// Read row `i` back to the host (call after `finish`)
    pub fn read_row(&self, i: usize) -> Result<Vec<f32>> {
        self.check_row(i)?;
        let start = self.starts[i];
        self.device
            .read_f32(&self.buffer, start..start + self.row_len(i))
    }

    /// Overwrite row `i` from host data of matching length
    pub fn write_row(&self, i: usize, data: &[f32]) -> Result<()> {
        self.check_row(i)?;
        if data.len() != self.row_len(i) {
            return Err(RuntimeError::OutOfBounds {
                start: self.starts[i],
                end: self.starts[i] + data.len(),
                len: self.starts[i] + self.row_len(i),
            });
        }
        self.device.write_f32(&self.buffer, self.starts[i], data)
    }

    /// Copy every row back into a packed host array
    pub fn to_host(&self) -> Result<RaggedArray> {
        let mut buf = Vec::new();
        let mut starts = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            starts.push(buf.len());
            buf.extend(self.read_row(i)?);
        }
        Ok(RaggedArray::from_parts(
            buf,
            starts,
            self.shape0s.clone(),
            self.shape1s.clone(),
        ))
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
