// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use core::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::interpreter;
use crate::error::{Result, RuntimeError};
use crate::kernel::{validate_source, KernelSource, LaunchGeometry, ScalarType};
use crate::traits::{check_bindings, check_range, BufferId, Device, DeviceBuffer};

/// Default work-group limit, matching common GPU limits
const DEFAULT_MAX_WORK_GROUP_SIZE: usize = 256;

#[derive(Debug)]
pub(crate) enum HostData {
    F32(Vec<f32>),
    I32(Vec<i32>),
}

impl HostData {
    pub(crate) fn len(&self) -> usize {
        match self {
            HostData::F32(v) => v.len(),
            HostData::I32(v) => v.len(),
        }
    }
}

/// Buffer in host memory
#[derive(Debug, Clone)]
pub struct HostBuffer {
    id: BufferId,
    scalar: ScalarType,
    len: usize,
    pub(crate) data: Arc<RwLock<HostData>>,
}

impl DeviceBuffer for HostBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn len(&self) -> usize {
        self.len
    }

    fn scalar_type(&self) -> ScalarType {
        self.scalar
    }
}

/// Validated kernel
#[derive(Debug, Clone)]
pub struct HostProgram {
    source: Arc<KernelSource>,
}

/// Kernel with arguments bound
#[derive(Debug, Clone)]
pub struct HostKernel {
    source: Arc<KernelSource>,
    args: Vec<HostBuffer>,
}

/// CPU device interpreting kernel bodies
///
/// Launches execute synchronously, so `finish` only has to report success.
#[derive(Debug)]
pub struct HostDevice {
    name: String,
    max_work_group_size: usize,
    launches: AtomicU64,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::with_max_work_group_size(DEFAULT_MAX_WORK_GROUP_SIZE)
    }

    /// Host device reporting a custom work-group limit
    pub fn with_max_work_group_size(max_work_group_size: usize) -> Self {
        Self {
            name: "Host (reference)".to_string(),
            max_work_group_size: max_work_group_size.max(1),
            launches: AtomicU64::new(0),
        }
    }

    /// Number of kernel launches executed so far
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }

    fn alloc(&self, data: HostData, scalar: ScalarType, label: &str) -> HostBuffer {
        let buffer = HostBuffer {
            id: BufferId::next(),
            scalar,
            len: data.len(),
            data: Arc::new(RwLock::new(data)),
        };
        trace!(
            target: "neurocl-runtime",
            "[HOST] Allocated {} '{}' ({} x {:?})",
            buffer.id,
            label,
            buffer.len,
            scalar
        );
        buffer
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for HostDevice {
    type Buffer = HostBuffer;
    type Program = HostProgram;
    type Kernel = HostKernel;

    fn name(&self) -> &str {
        &self.name
    }

    fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    fn alloc_f32(&self, data: &[f32], label: &str) -> Result<HostBuffer> {
        Ok(self.alloc(HostData::F32(data.to_vec()), ScalarType::F32, label))
    }

    fn alloc_i32(&self, data: &[i32], label: &str) -> Result<HostBuffer> {
        Ok(self.alloc(HostData::I32(data.to_vec()), ScalarType::I32, label))
    }

    fn compile(&self, source: &KernelSource) -> Result<HostProgram> {
        validate_source(source).map_err(|reason| RuntimeError::Compile {
            kernel: source.name.clone(),
            reason,
        })?;
        let work_group: usize = source.local_size.iter().product();
        if work_group > self.max_work_group_size {
            return Err(RuntimeError::Compile {
                kernel: source.name.clone(),
                reason: format!(
                    "work-group of {} exceeds device limit {}",
                    work_group, self.max_work_group_size
                ),
            });
        }
        debug!(target: "neurocl-runtime", "[HOST] Compiled kernel '{}'", source.name);
        Ok(HostProgram {
            source: Arc::new(source.clone()),
        })
    }

    fn bind(&self, program: &HostProgram, args: &[HostBuffer]) -> Result<HostKernel> {
        check_bindings(&program.source.name, &program.source.bindings, args)?;
        Ok(HostKernel {
            source: Arc::clone(&program.source),
            args: args.to_vec(),
        })
    }

    fn launch(&self, kernel: &HostKernel, geometry: &LaunchGeometry) -> Result<()> {
        self.launches.fetch_add(1, Ordering::Relaxed);
        interpreter::execute(&kernel.source, &kernel.args, geometry)
    }

    fn finish(&self) -> Result<()> {
        Ok(())
    }

    fn read_f32(&self, buffer: &HostBuffer, range: Range<usize>) -> Result<Vec<f32>> {
        check_range(&range, buffer.len)?;
        match &*buffer.data.read() {
            HostData::F32(v) => Ok(v[range].to_vec()),
            HostData::I32(_) => Err(RuntimeError::BufferTypeMismatch {
                expected: ScalarType::F32,
                actual: ScalarType::I32,
            }),
        }
    }

    fn read_i32(&self, buffer: &HostBuffer, range: Range<usize>) -> Result<Vec<i32>> {
        check_range(&range, buffer.len)?;
        match &*buffer.data.read() {
            HostData::I32(v) => Ok(v[range].to_vec()),
            HostData::F32(_) => Err(RuntimeError::BufferTypeMismatch {
                expected: ScalarType::I32,
                actual: ScalarType::F32,
            }),
        }
    }

    fn write_f32(&self, buffer: &HostBuffer, offset: usize, data: &[f32]) -> Result<()> {
        let range = offset..offset + data.len();
        check_range(&range, buffer.len)?;
        match &mut *buffer.data.write() {
            HostData::F32(v) => {
                v[range].copy_from_slice(data);
                Ok(())
            }
            HostData::I32(_) => Err(RuntimeError::BufferTypeMismatch {
                expected: ScalarType::F32,
                actual: ScalarType::I32,
            }),
        }
    }

    fn fill_i32(&self, buffer: &HostBuffer, value: i32) -> Result<()> {
        match &mut *buffer.data.write() {
            HostData::I32(v) => {
                v.fill(value);
                Ok(())
            }
            HostData::F32(_) => Err(RuntimeError::BufferTypeMismatch {
                expected: ScalarType::I32,
                actual: ScalarType::F32,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_read_write_round_trip() {
        let device = HostDevice::new();
        let buf = device.alloc_f32(&[1.0, 2.0, 3.0], "x").unwrap();
        device.write_f32(&buf, 1, &[7.0]).unwrap();
        assert_eq!(device.read_f32(&buf, 0..3).unwrap(), vec![1.0, 7.0, 3.0]);
    }

    #[test]
    fn test_out_of_bounds_read() {
        let device = HostDevice::new();
        let buf = device.alloc_f32(&[1.0], "x").unwrap();
        assert_eq!(
            device.read_f32(&buf, 0..2).unwrap_err(),
            RuntimeError::OutOfBounds {
                start: 0,
                end: 2,
                len: 1
            }
        );
    }

    #[test]
    fn test_type_mismatch() {
        let device = HostDevice::new();
        let buf = device.alloc_i32(&[1, 2], "ints").unwrap();
        assert!(matches!(
            device.read_f32(&buf, 0..1),
            Err(RuntimeError::BufferTypeMismatch { .. })
        ));
        device.fill_i32(&buf, 5).unwrap();
        assert_eq!(device.read_i32(&buf, 0..2).unwrap(), vec![5, 5]);
    }

    #[test]
    fn test_buffer_ids_are_unique_and_shared_by_clones() {
        let device = HostDevice::new();
        let a = device.alloc_f32(&[0.0], "a").unwrap();
        let b = device.alloc_f32(&[0.0], "b").unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }
}
