//! A linear voltage-sensitivity stand-in for a radial low-voltage feeder.
//!
//! Each bus sees its own injection only:
//!
//! ```text
//! v = v_base + s(n) * P + s(n) * x_over_r * Q
//! ```
//!
//! where `s(n)` grows linearly from `dv_dp_near` at the first bus to
//! `dv_dp_far` at the last. Positive `P`/`Q` are injections into the grid.
//! This is not a power-flow solver.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::info;

use crate::error::{SimError, SimResult};

use super::protocol::{
    EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest, SimKind, Simulator, Time,
};

pub const MODEL: &str = "Bus";
/// Input and output: active power injection (MW).
pub const ATTR_P_MW: &str = "p_mw";
/// Input and output: reactive power injection (Mvar).
pub const ATTR_Q_MVAR: &str = "q_mvar";
/// Output: bus voltage (pu).
pub const ATTR_V_PU: &str = "v_pu";

/// Sensitivities of the feeder stand-in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeederConfig {
    /// Voltage with no injection (pu).
    pub v_base_pu: f64,
    /// dV/dP at the bus nearest the transformer (pu/MW).
    pub dv_dp_near: f64,
    /// dV/dP at the end of the feeder (pu/MW).
    pub dv_dp_far: f64,
    /// Ratio of reactive to active voltage sensitivity.
    pub x_over_r: f64,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            v_base_pu: 1.02,
            dv_dp_near: 2.0,
            dv_dp_far: 12.0,
            x_over_r: 0.4,
        }
    }
}

/// Everything the feeder simulator needs at `init`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeederSimConfig {
    pub feeder: FeederConfig,
    /// Self-step cadence (s).
    pub step_size: Time,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Injection {
    p_mw: f64,
    q_mvar: f64,
}

/// Time-based feeder simulator with one entity per bus.
#[derive(Debug, Default)]
pub struct SensitivityFeeder {
    config: FeederConfig,
    step_size: Time,
    buses: Vec<EntityId>,
    /// Latest injection per bus; held until a new one arrives.
    injections: BTreeMap<EntityId, Injection>,
}

impl SensitivityFeeder {
    pub fn new() -> Self {
        Self::default()
    }

    /// dV/dP of bus `index` along the feeder.
    pub fn sensitivity(&self, index: usize) -> f64 {
        let c = &self.config;
        let n = self.buses.len();
        if n <= 1 {
            return c.dv_dp_near;
        }
        let frac = index.min(n - 1) as f64 / (n - 1) as f64;
        c.dv_dp_near + (c.dv_dp_far - c.dv_dp_near) * frac
    }

    /// Voltage of bus `index` for its latest injection.
    pub fn voltage(&self, index: usize) -> Option<f64> {
        let eid = self.buses.get(index)?;
        let inj = self.injections.get(eid).copied().unwrap_or_default();
        let s = self.sensitivity(index);
        Some(self.config.v_base_pu + s * inj.p_mw + s * self.config.x_over_r * inj.q_mvar)
    }

    fn index_of(&self, eid: &str) -> SimResult<usize> {
        self.buses
            .iter()
            .position(|b| b == eid)
            .ok_or_else(|| SimError::unknown_entity(eid))
    }
}

impl Simulator for SensitivityFeeder {
    type Config = FeederSimConfig;

    fn init(&mut self, sid: &str, config: FeederSimConfig) -> SimResult<Meta> {
        info!(
            sid,
            v_base_pu = config.feeder.v_base_pu,
            dv_dp_near = config.feeder.dv_dp_near,
            dv_dp_far = config.feeder.dv_dp_far,
            step_size = config.step_size,
            "feeder initialised"
        );
        self.config = config.feeder;
        self.step_size = config.step_size;
        Ok(Meta::new(SimKind::TimeBased).with_model(
            MODEL,
            ModelMeta {
                public: true,
                params: Vec::new(),
                attrs: vec![ATTR_P_MW, ATTR_Q_MVAR, ATTR_V_PU],
                trigger: Vec::new(),
                self_steps: true,
            },
        ))
    }

    fn create(&mut self, num: usize, model: &str) -> SimResult<Vec<EntityId>> {
        if model != MODEL {
            return Err(SimError::UnknownModel {
                model: model.to_string(),
            });
        }
        let start = self.buses.len();
        let ids: Vec<EntityId> = (start..start + num).map(|i| format!("{MODEL}_{i}")).collect();
        self.buses.extend(ids.iter().cloned());
        Ok(ids)
    }

    fn step(&mut self, time: Time, inputs: &Inputs, _max_advance: Time) -> SimResult<Option<Time>> {
        for eid in inputs.entities() {
            self.index_of(eid)?;
        }
        for eid in inputs.entities() {
            let inj = self.injections.entry(eid.to_string()).or_default();
            if let Some(p) = inputs.sum(eid, ATTR_P_MW) {
                inj.p_mw = p;
            }
            if let Some(q) = inputs.sum(eid, ATTR_Q_MVAR) {
                inj.q_mvar = q;
            }
        }
        Ok(Some(time + self.step_size))
    }

    fn get_data(&self, request: &OutputRequest) -> SimResult<OutputData> {
        let mut data = OutputData::default();
        for (eid, attrs) in request.iter() {
            let index = self.index_of(eid)?;
            let inj = self.injections.get(eid).copied().unwrap_or_default();
            for attr in attrs {
                let value = match attr.as_str() {
                    ATTR_V_PU => self.voltage(index),
                    ATTR_P_MW => Some(inj.p_mw),
                    ATTR_Q_MVAR => Some(inj.q_mvar),
                    _ => return Err(SimError::unknown_attribute(eid, attr)),
                };
                data.set(eid, attr, value);
            }
        }
        Ok(data)
    }
}
