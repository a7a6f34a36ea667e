// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Host reference device
//!
//! Executes kernels on the CPU by interpreting their structured body with
//! the exact launch semantics of a GPU device: block grids with
//! out-of-range work-items idle, flattened row walks, and the probe
//! kernel's copy/barrier/update phases. Always available, so every plan
//! and simulator test runs without GPU hardware.

mod device;
mod interpreter;

pub use device::{HostBuffer, HostDevice, HostKernel, HostProgram};
