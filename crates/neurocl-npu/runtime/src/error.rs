// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for runtime operations

use crate::kernel::ScalarType;

/// Runtime errors
///
/// Device errors are never retried: they propagate unmodified to the caller
/// and are considered fatal for the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// Kernel source could not be compiled for the device
    #[error("Kernel '{kernel}' failed to compile: {reason}")]
    Compile {
        /// Kernel name
        kernel: String,
        /// Compiler diagnostic
        reason: String,
    },

    /// Argument list does not match the kernel's declared buffers
    #[error("Kernel '{kernel}' argument binding failed: {reason}")]
    Bind {
        /// Kernel name
        kernel: String,
        /// What did not match
        reason: String,
    },

    /// Kernel launch failed on the device
    #[error("Kernel '{kernel}' launch failed: {reason}")]
    Launch {
        /// Kernel name
        kernel: String,
        /// Failure description
        reason: String,
    },

    /// Buffer element type differs from the requested one
    #[error("Buffer type mismatch: expected {expected:?}, got {actual:?}")]
    BufferTypeMismatch {
        /// Requested element type
        expected: ScalarType,
        /// Actual element type
        actual: ScalarType,
    },

    /// Element range outside a buffer
    #[error("Buffer range {start}..{end} out of bounds for buffer of {len} elements")]
    OutOfBounds {
        /// First element
        start: usize,
        /// One past the last element
        end: usize,
        /// Buffer length in elements
        len: usize,
    },

    /// Ragged-array row index outside the array
    #[error("Row {row} out of range for ragged array with {len} rows")]
    RowOutOfRange {
        /// Requested row
        row: usize,
        /// Number of rows
        len: usize,
    },

    /// No usable device
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Any other device failure (mapping, queue submission, lost device)
    #[error("Device error: {0}")]
    Device(String),
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
