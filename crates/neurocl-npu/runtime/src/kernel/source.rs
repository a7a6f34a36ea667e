// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Kernel source: rendered text plus the structured description devices need

use super::fragment::Fragment;

/// Binding slot of the integer metadata buffer in every kernel
pub const META_BINDING: usize = 0;

/// Element type of a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    F32,
    I32,
}

impl ScalarType {
    /// WGSL type name
    pub fn wgsl_name(self) -> &'static str {
        match self {
            ScalarType::F32 => "f32",
            ScalarType::I32 => "i32",
        }
    }

    /// Element size in bytes
    pub fn size_bytes(self) -> usize {
        4
    }
}

/// Access mode of a kernel binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    ReadWrite,
}

/// One declared kernel binding
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDecl {
    pub name: String,
    pub scalar: ScalarType,
    pub access: Access,
}

impl BufferDecl {
    pub fn new(name: impl Into<String>, scalar: ScalarType, access: Access) -> Self {
        Self {
            name: name.into(),
            scalar,
            access,
        }
    }
}

/// Global and local launch sizes (two dimensions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    /// Total work-items per dimension (multiple of `local`)
    pub global: [usize; 2],
    /// Work-group size per dimension
    pub local: [usize; 2],
}

impl LaunchGeometry {
    pub fn new(global: [usize; 2], local: [usize; 2]) -> Self {
        Self { global, local }
    }

    /// Number of work-groups per dimension
    pub fn work_groups(&self) -> [usize; 2] {
        [
            self.global[0].div_ceil(self.local[0].max(1)),
            self.global[1].div_ceil(self.local[1].max(1)),
        ]
    }

    /// Total work-items launched
    pub fn n_work_items(&self) -> usize {
        self.global[0] * self.global[1]
    }
}

/// Iteration regime of an elementwise kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// One work-item per (element, row) pair on a 2-D grid
    Block,
    /// One work-item per contiguous run of `n_elements` elements of the
    /// concatenated rows
    Flattened { n_elements: usize },
}

impl Regime {
    /// Regime selected by the planner's `n_elements` knob (0 = block)
    pub fn from_n_elements(n_elements: usize) -> Self {
        if n_elements == 0 {
            Regime::Block
        } else {
            Regime::Flattened { n_elements }
        }
    }
}

/// Role of a named scalar in an elementwise kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRole {
    Input,
    Output,
    Param,
}

/// Where a named variable lives on the device
///
/// `starts` and `shape0s` are offsets of per-row tables inside the metadata
/// buffer. `shape0s` is only present for parameters (broadcast flag).
#[derive(Debug, Clone, PartialEq)]
pub struct VarBinding {
    pub name: String,
    pub role: VarRole,
    pub binding: usize,
    pub starts: usize,
    pub shape0s: Option<usize>,
}

/// Elementwise kernel over a ragged batch
#[derive(Debug, Clone, PartialEq)]
pub struct ElementwiseBody {
    pub n_rows: usize,
    pub regime: Regime,
    /// Number of flattened work-items doing real work (0 for block kernels)
    pub n_items: usize,
    /// Meta offset of the per-row lengths table
    pub lengths: usize,
    pub vars: Vec<VarBinding>,
    pub constants: Vec<(String, f32)>,
    pub fragment: Fragment,
}

/// Probe sampling kernel
///
/// Binding slots of the counters, sample source and ring buffer, plus meta
/// offsets of the per-row tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeBody {
    pub n_rows: usize,
    pub countdowns: usize,
    pub bufpositions: usize,
    pub periods: usize,
    pub x: usize,
    pub y: usize,
    pub x_starts: usize,
    pub x_shape0s: usize,
    pub y_starts: usize,
    pub y_lengths: usize,
    /// Work-items per row cooperating on the copy
    pub local_width: usize,
}

/// Direct-function kernel: one work-item per row
#[derive(Debug, Clone, PartialEq)]
pub struct DirectBody {
    pub n_rows: usize,
    pub x: usize,
    pub y: usize,
    pub x_starts: usize,
    pub x_lengths: usize,
    pub y_starts: usize,
    pub y_lengths: usize,
    /// Name the fragment uses for the input vector
    pub arg_name: String,
    pub fragment: Fragment,
}

/// Structured kernel description
#[derive(Debug, Clone, PartialEq)]
pub enum KernelBody {
    Elementwise(ElementwiseBody),
    Probe(ProbeBody),
    Direct(DirectBody),
}

/// Complete kernel source
///
/// `text` is the rendered device program (WGSL); `body` carries the same
/// kernel in structured form for devices that interpret rather than compile.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSource {
    pub name: String,
    pub text: String,
    pub bindings: Vec<BufferDecl>,
    pub local_size: [usize; 2],
    pub body: KernelBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_groups_round_up() {
        let g = LaunchGeometry::new([130, 3], [64, 1]);
        assert_eq!(g.work_groups(), [3, 3]);
        assert_eq!(g.n_work_items(), 390);
    }

    #[test]
    fn test_regime_from_n_elements() {
        assert_eq!(Regime::from_n_elements(0), Regime::Block);
        assert_eq!(
            Regime::from_n_elements(4),
            Regime::Flattened { n_elements: 4 }
        );
    }
}
