// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for planning and running simulations

use neurocl_npu_runtime::RuntimeError;

/// Engine errors
///
/// Everything except [`EngineError::Runtime`] is a configuration problem
/// detected while building plans; device errors pass through unmodified.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// A batch has a different number of rows than the base batch
    #[error("Row count mismatch: '{name}' has {actual} rows, expected {expected}")]
    RowCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A parameter row is neither a scalar nor as long as its base row
    #[error("{name}.shape0s[{row}] must be 1 or {expected} (not {actual})")]
    BroadcastLength {
        name: String,
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// An input or output row differs in length from its base row
    #[error("{name}.shape0s[{row}] must be {expected} (not {actual})")]
    LengthMismatch {
        name: String,
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// The same name is bound twice in one kernel
    #[error("Name clash: '{0}' is used more than once")]
    NameClash(String),

    /// A vector was required but the row is a matrix
    #[error("'{name}' must be a batch of vectors (row {row} has {shape1} columns)")]
    NonVectorSignal {
        name: String,
        row: usize,
        shape1: usize,
    },

    /// A compile-time constant is NaN or infinite
    #[error("Constant '{name}' is not finite ({value})")]
    InvalidConstant { name: String, value: f32 },

    /// The fragment assigns a parameter or constant
    #[error("'{0}' is read-only and cannot be assigned")]
    ReadOnlyAssignment(String),

    /// A host function could not be lowered to kernel source
    #[error("Cannot translate function '{name}': {reason}")]
    Translation { name: String, reason: String },

    /// Plan dependencies contain a cycle
    #[error("Execution graph has a circular dependency involving '{0}'")]
    CircularDependency(String),

    /// Probe rings hold samples that were never drained
    #[error("Probe buffers must be drained before running (row {row} holds {buffered} samples)")]
    ProbeBufferNotDrained { row: usize, buffered: usize },

    #[error("Unknown signal id {0}")]
    UnknownSignal(usize),

    #[error("Unknown probe id {0}")]
    UnknownProbe(usize),

    #[error("Unknown plan id {0}")]
    UnknownPlan(usize),

    /// Any other invalid setup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Device failure (compile, bind, launch, transfer)
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
