//! In-memory data collector.
//!
//! A single `Monitor` entity accepts any attribute from any source and keeps
//! the full history as source → attribute → time → value.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::error::{SimError, SimResult};

use super::protocol::{
    EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest, SimKind, Simulator, Time,
};

pub const MODEL: &str = "Monitor";

/// Series of one attribute of one source, keyed by time.
pub type Series = BTreeMap<Time, f64>;

#[derive(Debug, Clone, Default)]
pub struct Collector {
    eid: Option<EntityId>,
    data: BTreeMap<String, BTreeMap<String, Series>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded series of `source.attr`.
    pub fn series(&self, source: &str, attr: &str) -> Option<&Series> {
        self.data.get(source)?.get(attr)
    }

    /// Source ids that delivered anything, in order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Every series of `attr`, across sources.
    pub fn series_of<'a>(&'a self, attr: &'a str) -> impl Iterator<Item = (&'a str, &'a Series)> {
        self.data
            .iter()
            .filter_map(move |(src, attrs)| attrs.get(attr).map(|s| (src.as_str(), s)))
    }

    /// Total number of recorded samples.
    pub fn sample_count(&self) -> usize {
        self.data
            .values()
            .flat_map(|attrs| attrs.values())
            .map(BTreeMap::len)
            .sum()
    }
}

impl Simulator for Collector {
    type Config = ();

    fn init(&mut self, sid: &str, _config: ()) -> SimResult<Meta> {
        info!(sid, "collector initialised");
        Ok(Meta::new(SimKind::EventBased).with_model(
            MODEL,
            ModelMeta {
                public: true,
                params: Vec::new(),
                attrs: Vec::new(),
                trigger: Vec::new(),
                self_steps: false,
            },
        ))
    }

    fn create(&mut self, num: usize, model: &str) -> SimResult<Vec<EntityId>> {
        if model != MODEL {
            return Err(SimError::UnknownModel {
                model: model.to_string(),
            });
        }
        if num != 1 || self.eid.is_some() {
            return Err(SimError::InvalidInput {
                what: "only one Monitor instance can be created".to_string(),
            });
        }
        self.eid = Some(MODEL.to_string());
        Ok(vec![MODEL.to_string()])
    }

    fn step(&mut self, time: Time, inputs: &Inputs, _max_advance: Time) -> SimResult<Option<Time>> {
        for eid in inputs.entities() {
            if self.eid.as_deref() != Some(eid) {
                return Err(SimError::unknown_entity(eid));
            }
        }
        let Some(eid) = self.eid.as_deref() else {
            return Ok(None);
        };
        let mut recorded = 0;
        for attr in inputs.attrs(eid) {
            for (src, value) in inputs.sources(eid, attr) {
                self.data
                    .entry(src.to_string())
                    .or_default()
                    .entry(attr.to_string())
                    .or_default()
                    .insert(time, value);
                recorded += 1;
            }
        }
        debug!(time, recorded, "collector step");
        Ok(None)
    }

    fn get_data(&self, request: &OutputRequest) -> SimResult<OutputData> {
        for (eid, attrs) in request.iter() {
            if self.eid.as_deref() != Some(eid) {
                return Err(SimError::unknown_entity(eid));
            }
            if let Some(attr) = attrs.first() {
                return Err(SimError::unknown_attribute(eid, attr));
            }
        }
        Ok(OutputData::default())
    }
}

impl fmt::Display for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (src, attrs) in &self.data {
            writeln!(f, "- {src}:")?;
            for (attr, series) in attrs {
                let values: Vec<String> = series.iter().map(|(t, v)| format!("{t}: {v}")).collect();
                writeln!(f, "  - {attr}: {{{}}}", values.join(", "))?;
            }
        }
        Ok(())
    }
}
