// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Kernel intermediate representation
//!
//! Planners produce a [`KernelSource`]; devices compile it. The rendered
//! text targets GPU devices, the structured [`KernelBody`] lets the host
//! device execute the identical kernel.

mod fragment;
mod source;
mod validate;
mod walk;

pub use fragment::{BinaryOp, Builtin, CmpOp, Cond, Expr, Fragment, Stmt, DIRECT_OUTPUT_NAME};
pub use source::{
    Access, BufferDecl, DirectBody, ElementwiseBody, KernelBody, KernelSource, LaunchGeometry,
    ProbeBody, Regime, ScalarType, VarBinding, VarRole, META_BINDING,
};
pub use validate::{is_identifier, validate_source};
pub use walk::{chunk, flattened_work_items, Chunk, RowCursor, WalkStep};
