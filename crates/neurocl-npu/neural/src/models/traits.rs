// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Model traits shared by all neuron models

/// Neuron model trait
///
/// A model owns no per-neuron data: state and parameters are passed in so a
/// single model instance can step any number of neurons.
pub trait NeuronModel {
    /// Model-specific parameters
    type Parameters: ModelParameters;

    /// Model-specific mutable state
    type State;

    /// Human readable model name for logging
    fn model_name(&self) -> &'static str;

    /// Advance one neuron by one simulation tick of length `dt` seconds,
    /// internally split into `upsample` sub-steps.
    ///
    /// Returns `true` if the neuron spiked during the tick. An `upsample` of
    /// zero leaves the state untouched and returns `false`.
    fn step(
        &self,
        params: &Self::Parameters,
        state: &mut Self::State,
        input: f32,
        dt: f64,
        upsample: usize,
    ) -> bool;

    /// Steady-state firing rate (Hz) for a constant input
    fn rate(&self, params: &Self::Parameters, input: f32) -> f32;
}

/// Parameter validation shared by all models
pub trait ModelParameters {
    /// Check that the parameters describe a usable neuron
    fn validate(&self) -> Result<(), &'static str>;

    /// Number of scalar parameters the model carries per neuron
    fn parameter_count() -> usize;
}
