// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # WGPU Device
//!
//! Cross-platform GPU device (Metal/Vulkan/DirectX) running the rendered
//! WGSL of each kernel. Every buffer is a storage buffer usable as a copy
//! source and destination; reads go through a mapped staging buffer.

use core::ops::Range;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, RuntimeError};
use crate::kernel::{
    validate_source, Access, BufferDecl, KernelSource, LaunchGeometry, ScalarType,
};
use crate::traits::{check_bindings, check_range, BufferId, Device, DeviceBuffer};

/// GPU buffer handle
#[derive(Debug, Clone)]
pub struct WgpuBuffer {
    id: BufferId,
    scalar: ScalarType,
    len: usize,
    buffer: Arc<wgpu::Buffer>,
}

impl DeviceBuffer for WgpuBuffer {
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

/// Compiled compute pipeline
///
/// The bind-group layout is built from the declared bindings, so slots the
/// shader never touches still accept their buffer.
pub struct WgpuProgram {
    name: String,
    pipeline: Arc<wgpu::ComputePipeline>,
    layout: wgpu::BindGroupLayout,
    bindings: Vec<BufferDecl>,
}

/// Pipeline with its bind group
pub struct WgpuKernel {
    name: String,
    pipeline: Arc<wgpu::ComputePipeline>,
    bind_group: wgpu::BindGroup,
}

/// WGPU compute device
pub struct WgpuDevice {
    name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    max_work_group_size: usize,
}

impl WgpuDevice {
    /// Open the first high-performance adapter
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RuntimeError::DeviceUnavailable("Failed to find WGPU adapter".to_string()))?;

        let adapter_info = adapter.get_info();
        let name = format!("WGPU ({} - {:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("neurocl device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| RuntimeError::DeviceUnavailable(format!("Failed to create device: {}", e)))?;

        let limits = device.limits();
        let max_work_group_size = (limits.max_compute_invocations_per_workgroup as usize)
            .min(limits.max_compute_workgroup_size_x as usize);

        info!(target: "neurocl-runtime", "[WGPU] Opened {}", name);
        Ok(Self {
            name,
            device,
            queue,
            max_work_group_size,
        })
    }

    fn alloc_bytes(&self, bytes: &[u8], len: usize, scalar: ScalarType, label: &str) -> WgpuBuffer {
        // Zero-sized storage bindings are invalid; keep one padding element.
        let size = (bytes.len().max(scalar.size_bytes())) as u64;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        if !bytes.is_empty() {
            self.queue.write_buffer(&buffer, 0, bytes);
        }
        WgpuBuffer {
            id: BufferId::next(),
            scalar,
            len,
            buffer: Arc::new(buffer),
        }
    }

    fn read_words<T: bytemuck::Pod>(&self, buffer: &WgpuBuffer, range: Range<usize>) -> Result<Vec<T>> {
        check_range(&range, buffer.len)?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let word = buffer.scalar.size_bytes() as u64;
        let offset = range.start as u64 * word;
        let size = range.len() as u64 * word;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("neurocl readback staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("neurocl readback"),
            });
        encoder.copy_buffer_to_buffer(&buffer.buffer, offset, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| RuntimeError::Device("Failed to receive buffer map result".to_string()))?
            .map_err(|e| RuntimeError::Device(format!("Failed to map buffer: {:?}", e)))?;

        let data = slice.get_mapped_range();
        let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(values)
    }

    fn expect_type(buffer: &WgpuBuffer, expected: ScalarType) -> Result<()> {
        if buffer.scalar != expected {
            return Err(RuntimeError::BufferTypeMismatch {
                expected,
                actual: buffer.scalar,
            });
        }
        Ok(())
    }
}

impl Device for WgpuDevice {
    type Buffer = WgpuBuffer;
    type Program = WgpuProgram;
    type Kernel = WgpuKernel;

    fn name(&self) -> &str {
        &self.name
    }

    fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    fn alloc_f32(&self, data: &[f32], label: &str) -> Result<WgpuBuffer> {
        Ok(self.alloc_bytes(bytemuck::cast_slice(data), data.len(), ScalarType::F32, label))
    }

    fn alloc_i32(&self, data: &[i32], label: &str) -> Result<WgpuBuffer> {
        Ok(self.alloc_bytes(bytemuck::cast_slice(data), data.len(), ScalarType::I32, label))
    }

    fn compile(&self, source: &KernelSource) -> Result<WgpuProgram> {
        validate_source(source).map_err(|reason| RuntimeError::Compile {
            kernel: source.name.clone(),
            reason,
        })?;

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = source
            .bindings
            .iter()
            .enumerate()
            .map(|(slot, decl)| wgpu::BindGroupLayoutEntry {
                binding: slot as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: decl.access == Access::Read,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&source.name),
                entries: &layout_entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&source.name),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&source.name),
                source: wgpu::ShaderSource::Wgsl(source.text.as_str().into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&source.name),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: "main",
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RuntimeError::Compile {
                kernel: source.name.clone(),
                reason: err.to_string(),
            });
        }

        debug!(target: "neurocl-runtime", "[WGPU] Compiled kernel '{}'", source.name);
        Ok(WgpuProgram {
            name: source.name.clone(),
            pipeline: Arc::new(pipeline),
            layout,
            bindings: source.bindings.clone(),
        })
    }

    fn bind(&self, program: &WgpuProgram, args: &[WgpuBuffer]) -> Result<WgpuKernel> {
        check_bindings(&program.name, &program.bindings, args)?;

        let entries: Vec<wgpu::BindGroupEntry<'_>> = args
            .iter()
            .enumerate()
            .map(|(i, arg)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: arg.buffer.as_entire_binding(),
            })
            .collect();

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.name),
            layout: &program.layout,
            entries: &entries,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RuntimeError::Bind {
                kernel: program.name.clone(),
                reason: err.to_string(),
            });
        }

        Ok(WgpuKernel {
            name: program.name.clone(),
            pipeline: Arc::clone(&program.pipeline),
            bind_group,
        })
    }

    fn launch(&self, kernel: &WgpuKernel, geometry: &LaunchGeometry) -> Result<()> {
        let [groups_x, groups_y] = geometry.work_groups();
        if groups_x == 0 || groups_y == 0 {
            return Ok(());
        }
        let limit = self.device.limits().max_compute_workgroups_per_dimension as usize;
        if groups_x > limit || groups_y > limit {
            return Err(RuntimeError::Launch {
                kernel: kernel.name.clone(),
                reason: format!(
                    "{}x{} work-groups exceed the per-dimension limit {}",
                    groups_x, groups_y, limit
                ),
            });
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&kernel.name),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&kernel.name),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &kernel.bind_group, &[]);
            pass.dispatch_workgroups(groups_x as u32, groups_y as u32, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }

    fn read_f32(&self, buffer: &WgpuBuffer, range: Range<usize>) -> Result<Vec<f32>> {
        Self::expect_type(buffer, ScalarType::F32)?;
        self.read_words(buffer, range)
    }

    fn read_i32(&self, buffer: &WgpuBuffer, range: Range<usize>) -> Result<Vec<i32>> {
        Self::expect_type(buffer, ScalarType::I32)?;
        self.read_words(buffer, range)
    }

    fn write_f32(&self, buffer: &WgpuBuffer, offset: usize, data: &[f32]) -> Result<()> {
        Self::expect_type(buffer, ScalarType::F32)?;
        check_range(&(offset..offset + data.len()), buffer.len)?;
        if !data.is_empty() {
            self.queue.write_buffer(
                &buffer.buffer,
                (offset * ScalarType::F32.size_bytes()) as u64,
                bytemuck::cast_slice(data),
            );
        }
        Ok(())
    }

    fn fill_i32(&self, buffer: &WgpuBuffer, value: i32) -> Result<()> {
        Self::expect_type(buffer, ScalarType::I32)?;
        if buffer.len > 0 {
            let data = vec![value; buffer.len];
            self.queue
                .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(&data));
        }
        Ok(())
    }
}
