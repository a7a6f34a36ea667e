// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # neurocl Neural Models (Host Reference)
//!
//! Scalar, host-side versions of the neuron update rules that the engine
//! lowers to device kernels:
//! - **LIF**: sub-stepped voltage/refractory integrator producing spikes
//! - **LIF rate**: analytic steady-state firing rate
//!
//! The engine builds its kernel fragments from the same constants
//! ([`SubStep`], [`V_THRESHOLD`]) so host and device results agree to the
//! last bit on an IEEE float device.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod models;

pub use models::{
    LIFModel, LIFParameters, LIFState, ModelParameters, NeuronModel, SubStep, V_THRESHOLD,
};
