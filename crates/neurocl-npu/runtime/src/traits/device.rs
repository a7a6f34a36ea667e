// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Device trait: the compile / bind / launch / transfer contract

use core::fmt;
use core::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, RuntimeError};
use crate::kernel::{BufferDecl, KernelSource, LaunchGeometry, ScalarType};

/// Process-unique identity of a device allocation
///
/// Views over the same allocation (ragged-array row subsets) share the id,
/// which lets the planner bind each allocation only once per kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl BufferId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        BufferId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// Handle to a device allocation
///
/// Cloning is cheap and shares ownership: the allocation lives as long as any
/// clone does. Plans keep clones of every buffer they bind.
pub trait DeviceBuffer: Clone + Send + Sync + fmt::Debug {
    /// Identity of the underlying allocation
    fn id(&self) -> BufferId;

    /// Number of elements
    fn len(&self) -> usize;

    /// Element type
    fn scalar_type(&self) -> ScalarType;

    /// True if the buffer holds no elements
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute device with a single in-order command queue
///
/// Launches may run asynchronously; [`Device::finish`] blocks until every
/// submitted launch has completed. Reads are only meaningful after a
/// `finish` that follows the writing launch.
pub trait Device: Send + Sync + 'static {
    /// Device allocation handle
    type Buffer: DeviceBuffer;

    /// Compiled kernel program
    type Program: Send + Sync;

    /// Program with its argument list bound
    type Kernel: Send + Sync;

    /// Device name for logging/debugging
    fn name(&self) -> &str;

    /// Largest work-group (total work-items) the device supports
    fn max_work_group_size(&self) -> usize;

    /// Allocate a float buffer initialised from host data
    fn alloc_f32(&self, data: &[f32], label: &str) -> Result<Self::Buffer>;

    /// Allocate an integer buffer initialised from host data
    fn alloc_i32(&self, data: &[i32], label: &str) -> Result<Self::Buffer>;

    /// Compile kernel source into an executable program
    fn compile(&self, source: &KernelSource) -> Result<Self::Program>;

    /// Bind a fixed argument list (one buffer per declared binding)
    fn bind(&self, program: &Self::Program, args: &[Self::Buffer]) -> Result<Self::Kernel>;

    /// Enqueue one launch of a bound kernel
    fn launch(&self, kernel: &Self::Kernel, geometry: &LaunchGeometry) -> Result<()>;

    /// Block until all enqueued work has completed
    fn finish(&self) -> Result<()>;

    /// Copy a range of a float buffer back to the host
    fn read_f32(&self, buffer: &Self::Buffer, range: Range<usize>) -> Result<Vec<f32>>;

    /// Copy a range of an integer buffer back to the host
    fn read_i32(&self, buffer: &Self::Buffer, range: Range<usize>) -> Result<Vec<i32>>;

    /// Overwrite part of a float buffer with host data
    fn write_f32(&self, buffer: &Self::Buffer, offset: usize, data: &[f32]) -> Result<()>;

    /// Fill an integer buffer with a constant
    fn fill_i32(&self, buffer: &Self::Buffer, value: i32) -> Result<()>;
}

/// Check an argument list against a kernel's declared bindings
///
/// Shared by every device implementation so binding errors read the same
/// everywhere.
pub fn check_bindings<B: DeviceBuffer>(
    kernel: &str,
    decls: &[BufferDecl],
    args: &[B],
) -> Result<()> {
    if decls.len() != args.len() {
        return Err(RuntimeError::Bind {
            kernel: kernel.to_string(),
            reason: format!("expected {} buffers, got {}", decls.len(), args.len()),
        });
    }
    for (index, (decl, arg)) in decls.iter().zip(args).enumerate() {
        if decl.scalar != arg.scalar_type() {
            return Err(RuntimeError::Bind {
                kernel: kernel.to_string(),
                reason: format!(
                    "binding {} ('{}') expects {:?}, got {:?}",
                    index,
                    decl.name,
                    decl.scalar,
                    arg.scalar_type()
                ),
            });
        }
        if args[..index].iter().any(|other| other.id() == arg.id()) {
            return Err(RuntimeError::Bind {
                kernel: kernel.to_string(),
                reason: format!("{} is bound more than once (binding {})", arg.id(), index),
            });
        }
    }
    Ok(())
}

/// Validate an element range against a buffer length
pub(crate) fn check_range(range: &Range<usize>, len: usize) -> Result<()> {
    if range.start > range.end || range.end > len {
        return Err(RuntimeError::OutOfBounds {
            start: range.start,
            end: range.end,
            len,
        });
    }
    Ok(())
}
