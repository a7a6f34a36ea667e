// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Binding tables, metadata packing and launch-size helpers shared by all
//! planners

use neurocl_npu_runtime::kernel::{Access, BufferDecl, Expr, Fragment, ScalarType};
use neurocl_npu_runtime::{Device, DeviceBuffer};

use crate::error::{EngineError, Result};

/// Packs per-row integer tables into one metadata buffer
#[derive(Debug, Default)]
pub(crate) struct MetaBuilder {
    data: Vec<i32>,
}

impl MetaBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a table and return its offset
    pub(crate) fn section<I>(&mut self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = usize>,
    {
        let offset = self.data.len();
        for value in values {
            let value = i32::try_from(value).map_err(|_| {
                EngineError::Configuration(format!(
                    "metadata value {} does not fit a 32-bit index",
                    value
                ))
            })?;
            self.data.push(value);
        }
        Ok(offset)
    }

    pub(crate) fn into_vec(self) -> Vec<i32> {
        self.data
    }
}

/// Kernel bindings with each device allocation declared once
///
/// Slot 0 is reserved for the metadata buffer.
pub(crate) struct BindingTable<D: Device> {
    decls: Vec<BufferDecl>,
    buffers: Vec<D::Buffer>,
}

impl<D: Device> BindingTable<D> {
    pub(crate) fn new() -> Self {
        Self {
            decls: vec![BufferDecl::new("meta", ScalarType::I32, Access::Read)],
            buffers: Vec::new(),
        }
    }

    /// Slot of `buffer`, adding it on first use; write access wins
    pub(crate) fn bind(&mut self, label: &str, buffer: &D::Buffer, access: Access) -> usize {
        if let Some(pos) = self.buffers.iter().position(|b| b.id() == buffer.id()) {
            let slot = pos + 1;
            if access == Access::ReadWrite {
                self.decls[slot].access = Access::ReadWrite;
            }
            return slot;
        }
        self.buffers.push(buffer.clone());
        self.decls
            .push(BufferDecl::new(label, buffer.scalar_type(), access));
        self.buffers.len()
    }

    pub(crate) fn decls(&self) -> &[BufferDecl] {
        &self.decls
    }

    /// Argument list with the metadata buffer in slot 0
    pub(crate) fn into_args(self, meta: D::Buffer) -> Vec<D::Buffer> {
        let mut args = Vec::with_capacity(self.buffers.len() + 1);
        args.push(meta);
        args.extend(self.buffers);
        args
    }
}

/// Power-of-two work-group width covering `wanted` items, capped by the
/// configured and device limits
pub(crate) fn work_group_width(device_max: usize, cap: usize, wanted: usize) -> usize {
    wanted
        .max(1)
        .next_power_of_two()
        .min(cap.max(1))
        .min(device_max.max(1))
}

pub(crate) fn round_up(n: usize, multiple: usize) -> usize {
    n.div_ceil(multiple.max(1)) * multiple.max(1)
}

/// Arithmetic operations per evaluation of a fragment
pub(crate) fn fragment_flops(fragment: &Fragment) -> u64 {
    let mut flops = 0;
    fragment.visit_exprs(&mut |e| {
        if matches!(e, Expr::Binary(..) | Expr::Neg(_) | Expr::Call(..)) {
            flops += 1;
        }
    });
    flops
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurocl_npu_runtime::HostDevice;

    #[test]
    fn test_meta_sections_are_appended() {
        let mut meta = MetaBuilder::new();
        assert_eq!(meta.section([3, 4]).unwrap(), 0);
        assert_eq!(meta.section([5]).unwrap(), 2);
        assert_eq!(meta.into_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn test_shared_buffer_bound_once() {
        let device = HostDevice::new();
        let a = device.alloc_f32(&[0.0; 4], "a").unwrap();
        let b = device.alloc_f32(&[0.0; 4], "b").unwrap();
        let mut table = BindingTable::<HostDevice>::new();
        assert_eq!(table.bind("a", &a, Access::Read), 1);
        assert_eq!(table.bind("b", &b, Access::Read), 2);
        assert_eq!(table.bind("a-again", &a.clone(), Access::ReadWrite), 1);
        assert_eq!(table.decls().len(), 3);
        assert_eq!(table.decls()[1].access, Access::ReadWrite);
        assert_eq!(table.decls()[2].access, Access::Read);
    }

    #[test]
    fn test_work_group_width() {
        assert_eq!(work_group_width(256, 256, 5), 8);
        assert_eq!(work_group_width(256, 64, 1000), 64);
        assert_eq!(work_group_width(32, 256, 1000), 32);
        assert_eq!(work_group_width(256, 256, 0), 1);
        assert_eq!(round_up(65, 64), 128);
        assert_eq!(round_up(0, 64), 0);
    }
}
