//! PV generation adapter.
//!
//! Turns irradiance into generated power for each PV entity and applies a
//! curtailment modifier commanded from outside. The modifier compounds
//! multiplicatively with every command and relaxes back towards 1 with a
//! 15-minute time constant when no command arrives.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::devices::pv_panel::{PanelParams, PvPanel};
use crate::error::{SimError, SimResult};

use super::protocol::{
    EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest, SimKind, Simulator, Time,
};

/// Model name offered by the adapter.
pub const MODEL: &str = "PV";
/// Output: generated power (MW).
pub const ATTR_P_GEN: &str = "p_gen";
/// Input: direct normal irradiance (W/m²).
pub const ATTR_DNI: &str = "dni";
/// Input and output: curtailment modifier in (0, 1].
pub const ATTR_MODIFIER: &str = "modifier";

/// Relaxation time constant of the modifier (s).
pub const RELAX_TIME_CONSTANT_S: f64 = 900.0;

/// Relaxes `modifier` towards 1 over `dt_s` seconds.
pub fn relax_modifier(modifier: f64, dt_s: f64) -> f64 {
    let f = (-dt_s / RELAX_TIME_CONSTANT_S).exp();
    1.0 - f + f * modifier
}

/// Adapter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PvAdapterConfig {
    /// Wall-clock time of simulated time zero.
    pub start: NaiveDateTime,
    /// Self-scheduling cadence (s). `None` disables self-steps.
    pub step_size: Option<Time>,
    /// Report generation as negative power (load-centric convention).
    pub gen_neg: bool,
    /// Panel used by [`Simulator::create`].
    pub panel: PanelParams,
}

#[derive(Debug, Clone)]
struct PvEntity {
    panel: PvPanel,
    modifier: f64,
    /// Time of the last step that touched this entity; -1 before the first.
    last_step: i64,
    /// Signed generated power before the modifier, from the latest DNI.
    base_power: Option<f64>,
}

/// Hybrid simulator owning every PV entity of a scenario.
pub struct PvAdapter {
    config: Option<PvAdapterConfig>,
    entities: BTreeMap<EntityId, PvEntity>,
    counter: usize,
    /// Generated power of the most recent step only.
    cache: BTreeMap<EntityId, f64>,
    next_self_step: Time,
}

impl Default for PvAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PvAdapter {
    pub fn new() -> Self {
        Self {
            config: None,
            entities: BTreeMap::new(),
            counter: 0,
            cache: BTreeMap::new(),
            next_self_step: 0,
        }
    }

    fn config(&self) -> SimResult<&PvAdapterConfig> {
        self.config.as_ref().ok_or_else(|| SimError::InvalidInput {
            what: "PV adapter used before init".to_string(),
        })
    }

    /// Creates `num` entities with their own panel parameters.
    pub fn create_with(&mut self, num: usize, params: &PanelParams) -> SimResult<Vec<EntityId>> {
        let start = self.config()?.start;
        let mut ids = Vec::with_capacity(num);
        for _ in 0..num {
            let eid = format!("{MODEL}_{}", self.counter);
            self.counter += 1;
            self.entities.insert(
                eid.clone(),
                PvEntity {
                    panel: PvPanel::new(params.clone(), start),
                    modifier: 1.0,
                    last_step: -1,
                    base_power: None,
                },
            );
            ids.push(eid);
        }
        Ok(ids)
    }

    /// Current modifier of `eid`.
    pub fn modifier(&self, eid: &str) -> Option<f64> {
        self.entities.get(eid).map(|e| e.modifier)
    }

    /// Wall-clock time of the panel behind `eid`.
    pub fn panel_clock(&self, eid: &str) -> Option<NaiveDateTime> {
        self.entities.get(eid).map(|e| e.panel.clock())
    }
}

impl Simulator for PvAdapter {
    type Config = PvAdapterConfig;

    fn init(&mut self, sid: &str, config: PvAdapterConfig) -> SimResult<Meta> {
        info!(sid, step_size = ?config.step_size, gen_neg = config.gen_neg, "PV adapter initialised");
        self.config = Some(config);
        self.next_self_step = 0;
        Ok(Meta::new(SimKind::Hybrid).with_model(
            MODEL,
            ModelMeta {
                public: true,
                params: vec!["lat", "area", "efficiency", "el_tilt", "az_tilt"],
                attrs: vec![ATTR_P_GEN, ATTR_DNI, ATTR_MODIFIER],
                trigger: vec![ATTR_DNI, ATTR_MODIFIER],
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
        let params = self.config()?.panel.clone();
        self.create_with(num, &params)
    }

    fn step(&mut self, time: Time, inputs: &Inputs, _max_advance: Time) -> SimResult<Option<Time>> {
        let (gen_neg, step_size) = {
            let config = self.config()?;
            (config.gen_neg, config.step_size)
        };
        let t = i64::try_from(time).map_err(|_| SimError::InvalidInput {
            what: format!("time {time} out of range"),
        })?;

        for eid in inputs.entities() {
            if !self.entities.contains_key(eid) {
                return Err(SimError::unknown_entity(eid));
            }
            let command = inputs.first(eid, ATTR_MODIFIER);
            if let Some(command) = command.filter(|c| !(*c > 0.0 && *c <= 1.0)) {
                return Err(SimError::InvalidInput {
                    what: format!("modifier command {command} for {eid} outside (0, 1]"),
                });
            }
        }

        self.cache = BTreeMap::new();
        for eid in inputs.entities() {
            let Some(entity) = self.entities.get_mut(eid) else {
                continue;
            };
            let command = inputs.first(eid, ATTR_MODIFIER);

            let dt = t - entity.last_step;
            if dt != 0 {
                entity.modifier = relax_modifier(entity.modifier, dt as f64);
            }

            if let Some(command) = command {
                entity.modifier *= command;
                debug!(time, eid, command, modifier = entity.modifier, "modifier command");
            }

            if let Some(dni) = inputs.first(eid, ATTR_DNI) {
                let mut power = entity.panel.power(dni);
                if dt != 0 {
                    entity.panel.step_time(dt);
                }
                if gen_neg {
                    power = -power;
                }
                entity.base_power = Some(power);
            }

            if let Some(base) = entity.base_power {
                self.cache.insert(eid.to_string(), base * entity.modifier);
            }
            entity.last_step = t;
        }

        match step_size {
            Some(step) if time == self.next_self_step => {
                self.next_self_step = time + step;
                Ok(Some(self.next_self_step))
            }
            _ => Ok(None),
        }
    }

    fn get_data(&self, request: &OutputRequest) -> SimResult<OutputData> {
        let mut data = OutputData::default();
        for (eid, attrs) in request.iter() {
            let entity = self
                .entities
                .get(eid)
                .ok_or_else(|| SimError::unknown_entity(eid))?;
            for attr in attrs {
                let value = match attr.as_str() {
                    ATTR_P_GEN => self.cache.get(eid).copied(),
                    ATTR_MODIFIER => Some(entity.modifier),
                    _ => return Err(SimError::unknown_attribute(eid, attr)),
                };
                data.set(eid, attr, value);
            }
        }
        Ok(data)
    }
}
