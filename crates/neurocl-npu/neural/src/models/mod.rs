// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Neuron models
//!
//! Each model exposes its update rule through [`NeuronModel`] so tests and
//! host fallbacks can step neurons without a device.

mod lif;
mod traits;

pub use lif::{LIFModel, LIFParameters, LIFState, SubStep, V_THRESHOLD};
pub use traits::{ModelParameters, NeuronModel};
