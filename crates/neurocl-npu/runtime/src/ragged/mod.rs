// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ragged arrays: many variable-shaped rows packed into one flat buffer
//!
//! Row `i` occupies `buf[starts[i] .. starts[i] + shape0s[i] * shape1s[i]]`
//! in row-major order. Vectors are rows with `shape1 == 1`.

mod device;
mod host;

pub use device::DeviceRaggedArray;
pub use host::RaggedArray;
