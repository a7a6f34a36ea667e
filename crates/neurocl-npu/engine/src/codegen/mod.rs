// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Kernel source generation
//!
//! Source text is composed from the typed kernel description (bindings,
//! variables, metadata offsets, fragment tree) rather than from string
//! templates, so generation is testable without compiling anything.

pub mod wgsl;
