// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Device abstraction traits
//!
//! The engine only talks to devices through [`Device`]: compile kernel
//! source, bind a fixed argument list, launch, wait, and move data between
//! host and device. The host reference device and the wgpu device both
//! implement it, so the same plans run everywhere.

mod device;

pub use device::{check_bindings, BufferId, Device, DeviceBuffer};
pub(crate) use device::check_range;
