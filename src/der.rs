//! Boundary to the external DER (inverter) model.
//!
//! The controllers treat the inverter as a black box: a set of named settings
//! is applied, then `run(voltage, frequency, dc_power)` yields the active and
//! reactive power the inverter would produce. [`ReferenceDer`] is a small
//! stand-in with piecewise-linear Volt-VAR and Volt-Watt curves so the crate
//! runs end-to-end; real studies plug in their own [`DerModel`].

use serde::Deserialize;

/// Named settings applied before each DER call.
///
/// Reactive power is signed: positive injects, negative absorbs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DerSettings {
    /// Nameplate active power (W).
    pub np_p_max: f64,
    /// Nameplate apparent power (VA).
    pub np_va_max: f64,
    /// Maximum absorbed reactive power (var, positive magnitude).
    pub np_q_max_abs: f64,
    /// Maximum injected reactive power (var).
    pub np_q_max_inj: f64,
    /// Enables the Q(V) curve.
    pub qv_mode_enable: bool,
    /// Enables the P(V) curtailment curve.
    pub pv_mode_enable: bool,
    /// Volt-Watt knee where curtailment starts (pu).
    pub pv_curve_v1: f64,
    /// Volt-Watt knee where curtailment reaches `pv_curve_p2` (pu).
    pub pv_curve_v2: f64,
    /// Active power fraction at and above `pv_curve_v2`.
    pub pv_curve_p2: f64,
    /// Volt-VAR curve voltages (pu), ascending.
    pub qv_curve_v: [f64; 4],
    /// Volt-VAR curve reactive power as a fraction of the relevant Q limit.
    pub qv_curve_q: [f64; 4],
}

impl Default for DerSettings {
    fn default() -> Self {
        Self {
            np_p_max: 7500.0,
            np_va_max: 7500.0,
            np_q_max_abs: 4500.0,
            np_q_max_inj: 4500.0,
            qv_mode_enable: false,
            pv_mode_enable: false,
            pv_curve_v1: 1.05,
            pv_curve_v2: 1.06,
            pv_curve_p2: 0.0,
            qv_curve_v: [0.92, 0.98, 1.02, 1.08],
            qv_curve_q: [0.44, 0.0, 0.0, -0.44],
        }
    }
}

/// Operating point handed to the DER model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerInput {
    /// Terminal voltage (pu).
    pub v_pu: f64,
    /// Grid frequency (Hz).
    pub freq_hz: f64,
    /// Available DC power (W).
    pub p_dc_w: f64,
}

/// Active and reactive power produced by the DER.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerOutput {
    pub p_w: f64,
    pub q_var: f64,
}

/// External inverter model consulted once per evaluated agent and step.
pub trait DerModel {
    /// Runs the model at `input` under `settings`.
    fn run(&self, settings: &DerSettings, input: DerInput) -> DerOutput;
}

/// Minimal inverter with nameplate limits, a Q(V) curve, and a P(V) curve.
///
/// Reactive power has priority over active power when the apparent power
/// limit binds. Frequency is accepted but has no effect.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceDer;

impl ReferenceDer {
    fn volt_var_q(settings: &DerSettings, v_pu: f64) -> f64 {
        let frac = interpolate(&settings.qv_curve_v, &settings.qv_curve_q, v_pu);
        if frac >= 0.0 {
            frac * settings.np_q_max_inj
        } else {
            frac * settings.np_q_max_abs
        }
    }

    fn volt_watt_frac(settings: &DerSettings, v_pu: f64) -> f64 {
        let v1 = settings.pv_curve_v1;
        let v2 = settings.pv_curve_v2;
        if v_pu <= v1 {
            1.0
        } else if v_pu >= v2 || v2 <= v1 {
            settings.pv_curve_p2
        } else {
            1.0 + (settings.pv_curve_p2 - 1.0) * (v_pu - v1) / (v2 - v1)
        }
    }
}

impl DerModel for ReferenceDer {
    fn run(&self, settings: &DerSettings, input: DerInput) -> DerOutput {
        let mut p = input.p_dc_w.clamp(0.0, settings.np_p_max);
        if settings.pv_mode_enable {
            p = p.min(settings.np_p_max * Self::volt_watt_frac(settings, input.v_pu));
        }

        let q = if settings.qv_mode_enable {
            Self::volt_var_q(settings, input.v_pu)
        } else {
            0.0
        };
        let va = settings.np_va_max;
        let q = q
            .clamp(-settings.np_q_max_abs, settings.np_q_max_inj)
            .clamp(-va, va);

        if p * p + q * q > va * va {
            p = (va * va - q * q).max(0.0).sqrt().min(p);
        }

        DerOutput { p_w: p, q_var: q }
    }
}

/// Piecewise-linear interpolation over ascending `xs`, flat outside the range.
fn interpolate(xs: &[f64; 4], ys: &[f64; 4], x: f64) -> f64 {
    if x <= xs[0] {
        return ys[0];
    }
    for i in 1..xs.len() {
        if x <= xs[i] {
            let span = xs[i] - xs[i - 1];
            if span <= 0.0 {
                return ys[i];
            }
            return ys[i - 1] + (ys[i] - ys[i - 1]) * (x - xs[i - 1]) / span;
        }
    }
    ys[xs.len() - 1]
}
