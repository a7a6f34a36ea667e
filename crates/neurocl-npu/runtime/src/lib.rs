// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! # neurocl Runtime
//!
//! Device abstraction for ragged-batch kernels.
//!
//! This crate provides:
//! - **Traits**: [`Device`] and [`DeviceBuffer`], the compile/bind/launch
//!   contract every execution target implements
//! - **Kernel IR**: the restricted elementwise language, kernel bodies and
//!   launch geometry
//! - **Ragged arrays**: host and device packings of variable-length rows
//! - **Host device** (always available): reference interpreter
//! - **WGPU device** (behind `gpu` feature): GPU execution of the rendered
//!   WGSL
//!
//! ## Features
//!
//! - `default` = `[]` (host device only)
//! - `gpu` = WGPU device
//!
//! ## Usage
//!
//! ```rust
//! use neurocl_npu_runtime::{Device, HostDevice};
//! let device = HostDevice::new();
//! let buffer = device.alloc_f32(&[1.0, 2.0], "x").unwrap();
//! assert_eq!(device.read_f32(&buffer, 0..2).unwrap(), vec![1.0, 2.0]);
//! ```

pub mod error;
pub mod host_impl;
pub mod kernel;
pub mod ragged;
pub mod traits;

#[cfg(feature = "gpu")]
pub mod wgpu_impl;

pub use error::{Result, RuntimeError};
pub use host_impl::HostDevice;
pub use ragged::{DeviceRaggedArray, RaggedArray};
pub use traits::{BufferId, Device, DeviceBuffer};

#[cfg(feature = "gpu")]
pub use wgpu_impl::WgpuDevice;
