// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # LIF (Leaky Integrate-and-Fire) Neuron Model
//!
//! ## Model Dynamics
//!
//! ```text
//! Per sub-step (sub_dt = dt / upsample):
//!     dV = (sub_dt / tau_rc) × (J − V)
//!     V += dV
//!
//! Refractory suppression (W = remaining refractory time):
//!     if V < 0 or W > 2·sub_dt:      V = 0
//!     else if W > sub_dt:            V ×= 1 − (W − sub_dt) / sub_dt
//!
//! Spike:
//!     if V > 1:
//!         overshoot = sub_dt × (V − 1) / dV
//!         W = tau_ref − overshoot + sub_dt
//!         V = 0
//!     else:
//!         W −= sub_dt
//!
//! Steady-state rate:
//!     rate = 1 / (tau_ref + tau_rc × log1p(1 / max(J − 1, 0)))
//! ```
//!
//! A tick reports a spike if any of its sub-steps spiked; sub-stepping exists
//! for integration accuracy, so a tick never reports more than one spike.

use super::traits::{ModelParameters, NeuronModel};

/// Firing threshold (voltage is normalised so the threshold is 1)
pub const V_THRESHOLD: f32 = 1.0;

/// Sub-step constants for one tick split into `upsample` integration steps
///
/// Both the host reference and the generated kernels use these exact f32
/// values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubStep {
    /// Sub-step length in seconds
    pub dt: f32,
    /// Reciprocal of the sub-step length
    pub dt_inv: f32,
    /// Twice the sub-step length (deep-refractory bound)
    pub two_dt: f32,
}

impl SubStep {
    /// Split a tick of `dt` seconds into `upsample` sub-steps
    ///
    /// # Panics
    /// Panics if `upsample` is zero.
    pub fn new(dt: f64, upsample: usize) -> Self {
        assert!(upsample > 0, "upsample must be at least 1");
        let sub_dt = (dt / upsample as f64) as f32;
        Self {
            dt: sub_dt,
            dt_inv: (upsample as f64 / dt) as f32,
            two_dt: 2.0 * sub_dt,
        }
    }
}

/// LIF (Leaky Integrate-and-Fire) neuron model
#[derive(Debug, Clone, Copy, Default)]
pub struct LIFModel;

impl LIFModel {
    /// Create a new LIF model instance
    pub fn new() -> Self {
        Self
    }

    /// One integration sub-step. Returns `true` on a threshold crossing.
    #[inline(always)]
    pub fn sub_step(
        &self,
        params: &LIFParameters,
        state: &mut LIFState,
        current: f32,
        sub: &SubStep,
    ) -> bool {
        let dv = (sub.dt / params.tau_rc) * (current - state.voltage);
        state.voltage += dv;

        if state.voltage < 0.0 || state.refractory_time > sub.two_dt {
            state.voltage = 0.0;
        } else if state.refractory_time > sub.dt {
            state.voltage *= 1.0 - (state.refractory_time - sub.dt) * sub.dt_inv;
        }

        if state.voltage > V_THRESHOLD {
            let overshoot = sub.dt * (state.voltage - V_THRESHOLD) / dv;
            state.refractory_time = params.tau_ref - overshoot + sub.dt;
            state.voltage = 0.0;
            true
        } else {
            state.refractory_time -= sub.dt;
            false
        }
    }
}

impl NeuronModel for LIFModel {
    type Parameters = LIFParameters;
    type State = LIFState;

    fn model_name(&self) -> &'static str {
        "Leaky Integrate-and-Fire (LIF)"
    }

    fn step(
        &self,
        params: &LIFParameters,
        state: &mut LIFState,
        input: f32,
        dt: f64,
        upsample: usize,
    ) -> bool {
        if upsample == 0 {
            return false;
        }
        let sub = SubStep::new(dt, upsample);
        let mut spiked = false;
        for _ in 0..upsample {
            spiked |= self.sub_step(params, state, input, &sub);
        }
        spiked
    }

    fn rate(&self, params: &LIFParameters, input: f32) -> f32 {
        let j = (input - 1.0).max(0.0);
        if j > 0.0 {
            1.0 / (params.tau_ref + params.tau_rc * (1.0 / j).ln_1p())
        } else {
            0.0
        }
    }
}

/// LIF model-specific parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LIFParameters {
    /// Membrane time constant (seconds)
    pub tau_rc: f32,

    /// Refractory period (seconds)
    pub tau_ref: f32,
}

impl LIFParameters {
    /// Create LIF parameters with custom values
    pub fn with_values(tau_rc: f32, tau_ref: f32) -> Self {
        Self { tau_rc, tau_ref }
    }
}

impl Default for LIFParameters {
    fn default() -> Self {
        Self {
            tau_rc: 0.02,
            tau_ref: 0.002,
        }
    }
}

impl ModelParameters for LIFParameters {
    fn validate(&self) -> Result<(), &'static str> {
        if !(self.tau_rc.is_finite() && self.tau_rc > 0.0) {
            return Err("LIF: tau_rc must be finite and > 0");
        }
        if !(self.tau_ref.is_finite() && self.tau_ref >= 0.0) {
            return Err("LIF: tau_ref must be finite and >= 0");
        }
        Ok(())
    }

    fn parameter_count() -> usize {
        2 // tau_rc + tau_ref
    }
}

/// Per-neuron LIF state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LIFState {
    /// Membrane voltage (threshold = 1)
    pub voltage: f32,

    /// Remaining refractory time (seconds)
    pub refractory_time: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_spikes(current: f32, upsample: usize, steps: usize) -> usize {
        let model = LIFModel::new();
        let params = LIFParameters::default();
        let mut state = LIFState::default();
        (0..steps)
            .filter(|_| model.step(&params, &mut state, current, 0.001, upsample))
            .count()
    }

    #[test]
    fn test_lif_below_threshold_never_spikes() {
        assert_eq!(count_spikes(0.9, 1, 1000), 0);
        assert_eq!(count_spikes(1.0, 4, 1000), 0);
    }

    #[test]
    fn test_lif_spike_rate_matches_analytic_rate() {
        let model = LIFModel::new();
        let params = LIFParameters::default();
        let expected = model.rate(&params, 2.0);
        assert!((expected - 63.04).abs() < 0.01);

        for upsample in [1, 2, 4, 8] {
            let spikes = count_spikes(2.0, upsample, 1000) as f32;
            assert!(
                (spikes - expected).abs() <= 2.0,
                "upsample={} gave {} spikes, expected ~{}",
                upsample,
                spikes,
                expected
            );
        }
    }

    #[test]
    fn test_lif_resets_after_spike() {
        let model = LIFModel::new();
        let params = LIFParameters::default();
        let mut state = LIFState {
            voltage: 0.999,
            refractory_time: 0.0,
        };
        assert!(model.step(&params, &mut state, 5.0, 0.001, 1));
        assert_eq!(state.voltage, 0.0);
        assert!(state.refractory_time > 0.0 && state.refractory_time <= params.tau_ref + 0.001);
    }

    #[test]
    fn test_lif_refractory_holds_voltage_at_zero() {
        let model = LIFModel::new();
        let params = LIFParameters::default();
        let mut state = LIFState {
            voltage: 0.0,
            refractory_time: 0.01,
        };
        model.step(&params, &mut state, 2.0, 0.001, 1);
        assert_eq!(state.voltage, 0.0);
        assert!((state.refractory_time - 0.009).abs() < 1e-6);
    }

    #[test]
    fn test_lif_zero_upsample_is_a_no_op() {
        let model = LIFModel::new();
        let params = LIFParameters::default();
        let before = LIFState {
            voltage: 0.999,
            refractory_time: 0.0,
        };
        let mut state = before;
        assert!(!model.step(&params, &mut state, 5.0, 0.001, 0));
        assert_eq!(state, before);
    }

    #[test]
    fn test_lif_rate_zero_at_or_below_threshold() {
        let model = LIFModel::new();
        let params = LIFParameters::default();
        assert_eq!(model.rate(&params, 1.0), 0.0);
        assert_eq!(model.rate(&params, -3.0), 0.0);
        assert!(model.rate(&params, 1.5) > 0.0);
    }

    #[test]
    fn test_substep_constants() {
        let sub = SubStep::new(0.001, 4);
        assert!((sub.dt - 0.00025).abs() < 1e-9);
        assert!((sub.dt_inv - 4000.0).abs() < 1e-3);
        assert_eq!(sub.two_dt, 2.0 * sub.dt);
    }

    #[test]
    fn test_parameter_validation() {
        assert!(LIFParameters::default().validate().is_ok());
        assert!(LIFParameters::with_values(0.0, 0.002).validate().is_err());
        assert!(LIFParameters::with_values(0.02, -1.0).validate().is_err());
        assert_eq!(LIFParameters::parameter_count(), 2);
    }
}
