// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Parameter broadcast protocol
//!
//! A parameter is either a compile-time constant or a ragged batch whose
//! rows are each a full vector (one value per element of the base row) or a
//! scalar broadcast across the base row. Any other row length is a
//! configuration error.

use neurocl_npu_runtime::{Device, DeviceRaggedArray};

use crate::error::{EngineError, Result};

/// Value source of a named parameter
pub enum ParamArg<D: Device> {
    /// Per-row values on the device
    Ragged(DeviceRaggedArray<D>),
    /// Literal baked into the kernel source
    Constant(f32),
}

impl<D: Device> Clone for ParamArg<D> {
    fn clone(&self) -> Self {
        match self {
            ParamArg::Ragged(array) => ParamArg::Ragged(array.clone()),
            ParamArg::Constant(value) => ParamArg::Constant(*value),
        }
    }
}

impl<D: Device> std::fmt::Debug for ParamArg<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamArg::Ragged(array) => f.debug_tuple("Ragged").field(array).finish(),
            ParamArg::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
        }
    }
}

/// How a parameter row is applied to its base row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    /// One value per element
    Vector,
    /// One value for the whole row
    Scalar,
    /// Same literal for every row
    Constant,
}

/// Classify every row of a ragged parameter against the base row lengths
pub fn resolve_rows<D: Device>(
    name: &str,
    base_lengths: &[usize],
    param: &DeviceRaggedArray<D>,
) -> Result<Vec<Broadcast>> {
    if param.len() != base_lengths.len() {
        return Err(EngineError::RowCountMismatch {
            name: name.to_string(),
            expected: base_lengths.len(),
            actual: param.len(),
        });
    }
    base_lengths
        .iter()
        .enumerate()
        .map(|(row, &expected)| {
            let shape1 = param.shape1s()[row];
            if shape1 != 1 {
                return Err(EngineError::NonVectorSignal {
                    name: name.to_string(),
                    row,
                    shape1,
                });
            }
            match param.shape0s()[row] {
                1 => Ok(Broadcast::Scalar),
                actual if actual == expected => Ok(Broadcast::Vector),
                actual => Err(EngineError::BroadcastLength {
                    name: name.to_string(),
                    row,
                    expected,
                    actual,
                }),
            }
        })
        .collect()
}

/// Reject constants that cannot be written as a literal
pub fn check_constant(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() {
        return Err(EngineError::InvalidConstant {
            name: name.to_string(),
            value,
        });
    }
    Ok(())
}

/// Resolve a parameter of either kind
pub fn resolve<D: Device>(
    name: &str,
    base_lengths: &[usize],
    param: &ParamArg<D>,
) -> Result<Vec<Broadcast>> {
    match param {
        ParamArg::Ragged(array) => resolve_rows(name, base_lengths, array),
        ParamArg::Constant(value) => {
            check_constant(name, *value)?;
            Ok(vec![Broadcast::Constant; base_lengths.len()])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurocl_npu_runtime::{HostDevice, RaggedArray};
    use std::sync::Arc;

    fn ragged(rows: &[&[f32]]) -> DeviceRaggedArray<HostDevice> {
        let host = RaggedArray::from_vectors(rows.iter().copied());
        DeviceRaggedArray::from_host(Arc::new(HostDevice::new()), &host, "p").unwrap()
    }

    #[test]
    fn test_scalar_and_vector_rows() {
        let p = ragged(&[&[1.0], &[1.0, 2.0, 3.0], &[4.0]]);
        let kinds = resolve_rows("p", &[4, 3, 1], &p).unwrap();
        assert_eq!(
            kinds,
            vec![Broadcast::Scalar, Broadcast::Vector, Broadcast::Scalar]
        );
    }

    #[test]
    fn test_illegal_length_names_row_and_lengths() {
        let p = ragged(&[&[1.0], &[1.0, 2.0]]);
        let err = resolve_rows("gain", &[4, 3], &p).unwrap_err();
        assert_eq!(
            err,
            EngineError::BroadcastLength {
                name: "gain".to_string(),
                row: 1,
                expected: 3,
                actual: 2
            }
        );
        assert_eq!(err.to_string(), "gain.shape0s[1] must be 1 or 3 (not 2)");
    }

    #[test]
    fn test_row_count_mismatch() {
        let p = ragged(&[&[1.0]]);
        assert!(matches!(
            resolve_rows("p", &[1, 1], &p),
            Err(EngineError::RowCountMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_constant_rejected() {
        assert!(check_constant("tau", 0.02).is_ok());
        assert!(matches!(
            check_constant("tau", f32::NAN),
            Err(EngineError::InvalidConstant { .. })
        ));
        let kinds = resolve::<HostDevice>("c", &[2, 2], &ParamArg::Constant(1.0)).unwrap();
        assert_eq!(kinds, vec![Broadcast::Constant; 2]);
    }
}
