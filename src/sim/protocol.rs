//! Stepping contract shared by every co-simulated component.
//!
//! A scheduler drives a [`Simulator`] through four calls: `init` once with a
//! fixed configuration, `create` to instantiate entities, `step` with a
//! time-stamped batch of inputs, and `get_data` to read outputs back.

use std::collections::BTreeMap;

use crate::error::SimResult;

/// Simulated time in seconds since the scenario start.
pub type Time = u64;

/// Entity identifier, unique within one simulator (e.g. `"Agent_3"`).
pub type EntityId = String;

/// How a simulator is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimKind {
    /// Stepped only when one of its trigger inputs changes.
    EventBased,
    /// Triggered by inputs and may also request its own next step.
    Hybrid,
    /// Stepped on its own fixed cadence.
    TimeBased,
}

/// Capabilities of one model offered by a simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    /// Whether the scheduler may instantiate this model directly.
    pub public: bool,
    /// Creation parameters accepted by the model.
    pub params: Vec<&'static str>,
    /// Every attribute name the model recognises, inputs and outputs.
    pub attrs: Vec<&'static str>,
    /// Attributes whose arrival triggers a step.
    pub trigger: Vec<&'static str>,
    /// Whether the model schedules its own wakeups.
    pub self_steps: bool,
}

/// Capability set returned by [`Simulator::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub kind: SimKind,
    pub models: BTreeMap<&'static str, ModelMeta>,
}

impl Meta {
    pub fn new(kind: SimKind) -> Self {
        Self {
            kind,
            models: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, name: &'static str, model: ModelMeta) -> Self {
        self.models.insert(name, model);
        self
    }

    /// Looks up the metadata for `name`.
    pub fn model(&self, name: &str) -> Option<&ModelMeta> {
        self.models.get(name)
    }
}

/// Time-stamped input batch: entity → attribute → source → value.
///
/// Several sources may feed the same attribute; consumers always take the
/// first one in source-id order so that aggregation is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    entries: BTreeMap<EntityId, BTreeMap<String, BTreeMap<String, f64>>>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for `eid.attr` coming from `source`.
    pub fn insert(&mut self, eid: &str, attr: &str, source: &str, value: f64) {
        self.entries
            .entry(eid.to_string())
            .or_default()
            .entry(attr.to_string())
            .or_default()
            .insert(source.to_string(), value);
    }

    /// Builder form of [`Inputs::insert`].
    pub fn with(mut self, eid: &str, attr: &str, source: &str, value: f64) -> Self {
        self.insert(eid, attr, source, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entity ids present in this batch, in order.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// First value (by source id) delivered to `eid.attr`, if any.
    pub fn first(&self, eid: &str, attr: &str) -> Option<f64> {
        self.entries
            .get(eid)?
            .get(attr)?
            .values()
            .next()
            .copied()
    }

    /// Sum over every source delivering `eid.attr`, if any delivered.
    pub fn sum(&self, eid: &str, attr: &str) -> Option<f64> {
        let sources = self.entries.get(eid)?.get(attr)?;
        if sources.is_empty() {
            return None;
        }
        Some(sources.values().sum())
    }

    /// Every `(source, value)` delivering `eid.attr`, in source order.
    pub fn sources(&self, eid: &str, attr: &str) -> impl Iterator<Item = (&str, f64)> {
        self.entries
            .get(eid)
            .and_then(|attrs| attrs.get(attr))
            .into_iter()
            .flat_map(|sources| sources.iter().map(|(src, v)| (src.as_str(), *v)))
    }

    /// Attribute names delivered to `eid`, in order.
    pub fn attrs(&self, eid: &str) -> impl Iterator<Item = &str> {
        self.entries
            .get(eid)
            .into_iter()
            .flat_map(|attrs| attrs.keys().map(String::as_str))
    }
}

/// Output request: entity → attribute names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputRequest {
    entries: BTreeMap<EntityId, Vec<String>>,
}

impl OutputRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `attrs` to the request for `eid`.
    pub fn with(mut self, eid: &str, attrs: &[&str]) -> Self {
        self.entries
            .entry(eid.to_string())
            .or_default()
            .extend(attrs.iter().map(|a| a.to_string()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(eid, attrs)| (eid.as_str(), attrs.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of [`Simulator::get_data`].
///
/// A value is `None` when the entity exists but the attribute has never been
/// computed. `time` is the availability timestamp attached when the simulator
/// models an output delay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputData {
    pub entities: BTreeMap<EntityId, BTreeMap<String, Option<f64>>>,
    pub time: Option<Time>,
}

impl OutputData {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn set(&mut self, eid: &str, attr: &str, value: Option<f64>) {
        self.entities
            .entry(eid.to_string())
            .or_default()
            .insert(attr.to_string(), value);
    }

    /// Value of `eid.attr`, flattening "not requested" and "not computed".
    pub fn value(&self, eid: &str, attr: &str) -> Option<f64> {
        self.entities.get(eid)?.get(attr).copied().flatten()
    }

    /// Attaches `step_time + delay` when a positive delay is configured and
    /// the result set is non-empty. Values are never altered.
    pub fn delayed(mut self, step_time: Time, delay: Option<Time>) -> Self {
        match delay {
            Some(delay) if delay > 0 && !self.is_empty() => {
                self.time = Some(step_time + delay);
            }
            _ => {}
        }
        self
    }
}

/// The contract every co-simulated component satisfies.
pub trait Simulator {
    /// Fixed configuration handed over once at initialisation.
    type Config;

    /// Applies `config` and returns the simulator's capability set.
    fn init(&mut self, sid: &str, config: Self::Config) -> SimResult<Meta>;

    /// Creates `num` entities of `model` and returns their ids in order.
    fn create(&mut self, num: usize, model: &str) -> SimResult<Vec<EntityId>>;

    /// Consumes `inputs` for `time` and returns the next self-scheduled
    /// wakeup, if any.
    fn step(&mut self, time: Time, inputs: &Inputs, max_advance: Time) -> SimResult<Option<Time>>;

    /// Returns the requested attribute values.
    fn get_data(&self, request: &OutputRequest) -> SimResult<OutputData>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_source_wins_in_id_order() {
        let inputs = Inputs::new()
            .with("Agent_0", "v_pu", "Grid.Bus_2", 1.02)
            .with("Agent_0", "v_pu", "Grid.Bus_1", 1.04);
        assert_eq!(inputs.first("Agent_0", "v_pu"), Some(1.04));
        assert_eq!(inputs.first("Agent_0", "p_dc"), None);
        assert_eq!(inputs.first("Agent_1", "v_pu"), None);
    }

    #[test]
    fn sum_adds_every_source() {
        let inputs = Inputs::new()
            .with("Bus_0", "p_mw", "Ctrl.Agent_0", 0.25)
            .with("Bus_0", "p_mw", "Ctrl.Agent_1", 0.5);
        assert_eq!(inputs.sum("Bus_0", "p_mw"), Some(0.75));
        assert_eq!(inputs.sum("Bus_0", "q_mvar"), None);
    }

    #[test]
    fn delay_marker_only_on_non_empty_results() {
        let empty = OutputData::default().delayed(60, Some(5));
        assert_eq!(empty.time, None);

        let mut data = OutputData::default();
        data.set("Agent_0", "p_mw", Some(0.1));
        let data = data.delayed(60, Some(5));
        assert_eq!(data.time, Some(65));
        assert_eq!(data.value("Agent_0", "p_mw"), Some(0.1));
    }

    #[test]
    fn zero_or_missing_delay_attaches_nothing() {
        let mut data = OutputData::default();
        data.set("Agent_0", "p_mw", Some(0.1));
        assert_eq!(data.clone().delayed(60, Some(0)).time, None);
        assert_eq!(data.delayed(60, None).time, None);
    }

    #[test]
    fn output_request_accumulates_attrs() {
        let req = OutputRequest::new()
            .with("PV_0", &["p_gen"])
            .with("PV_0", &["modifier"]);
        let collected: Vec<_> = req.iter().collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].1, ["p_gen".to_string(), "modifier".to_string()]);
    }
}
