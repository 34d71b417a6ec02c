//! Time-based simulator publishing direct normal irradiance.

use chrono::{Duration, NaiveDateTime};
use tracing::info;

use crate::devices::irradiance::IrradianceSource;
use crate::error::{SimError, SimResult};

use super::protocol::{
    EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest, SimKind, Simulator, Time,
};

pub const MODEL: &str = "Data";
/// Output: direct normal irradiance (W/m²).
pub const ATTR_DNI: &str = "dni";

#[derive(Debug, Clone)]
pub struct IrradianceSimConfig {
    pub start: NaiveDateTime,
    pub step_size: Time,
    pub source: IrradianceSource,
}

/// Publishes the same DNI reading on every entity it creates.
#[derive(Default)]
pub struct IrradianceSim {
    config: Option<IrradianceSimConfig>,
    entities: Vec<EntityId>,
    current: Option<f64>,
    last_time: Option<Time>,
}

impl IrradianceSim {
    pub fn new() -> Self {
        Self::default()
    }

    /// DNI published by the most recent step.
    pub fn current(&self) -> Option<f64> {
        self.current
    }
}

impl Simulator for IrradianceSim {
    type Config = IrradianceSimConfig;

    fn init(&mut self, sid: &str, config: IrradianceSimConfig) -> SimResult<Meta> {
        info!(sid, start = %config.start, step_size = config.step_size, "irradiance source initialised");
        self.config = Some(config);
        Ok(Meta::new(SimKind::TimeBased).with_model(
            MODEL,
            ModelMeta {
                public: true,
                params: Vec::new(),
                attrs: vec![ATTR_DNI],
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
        let start = self.entities.len();
        let ids: Vec<EntityId> = (start..start + num).map(|i| format!("{MODEL}_{i}")).collect();
        self.entities.extend(ids.iter().cloned());
        Ok(ids)
    }

    fn step(&mut self, time: Time, _inputs: &Inputs, _max_advance: Time) -> SimResult<Option<Time>> {
        let config = self.config.as_mut().ok_or_else(|| SimError::InvalidInput {
            what: "irradiance source stepped before init".to_string(),
        })?;
        if self.last_time != Some(time) {
            let offset = i64::try_from(time).map_err(|_| SimError::InvalidInput {
                what: format!("time {time} out of range"),
            })?;
            let clock = config.start + Duration::seconds(offset);
            self.current = Some(config.source.dni_at(time, clock));
            self.last_time = Some(time);
        }
        Ok(Some(time + config.step_size))
    }

    fn get_data(&self, request: &OutputRequest) -> SimResult<OutputData> {
        let mut data = OutputData::default();
        for (eid, attrs) in request.iter() {
            if !self.entities.iter().any(|e| e == eid) {
                return Err(SimError::unknown_entity(eid));
            }
            for attr in attrs {
                if attr != ATTR_DNI {
                    return Err(SimError::unknown_attribute(eid, attr));
                }
                data.set(eid, attr, self.current);
            }
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::irradiance::{
        DATE_FORMAT, IrradianceSeries, SyntheticIrradiance, SyntheticParams,
    };

    fn start() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2016-01-01 11:00:00", DATE_FORMAT).unwrap()
    }

    fn recorded() -> IrradianceSim {
        let mut sim = IrradianceSim::new();
        let series = IrradianceSeries::from_samples(vec![(0, 100.0), (60, 200.0)]);
        sim.init(
            "DNI",
            IrradianceSimConfig {
                start: start(),
                step_size: 60,
                source: IrradianceSource::Recorded(series),
            },
        )
        .unwrap();
        sim.create(1, MODEL).unwrap();
        sim
    }

    fn dni(sim: &IrradianceSim) -> Option<f64> {
        sim.get_data(&OutputRequest::new().with("Data_0", &[ATTR_DNI]))
            .unwrap()
            .value("Data_0", ATTR_DNI)
    }

    #[test]
    fn publishes_series_on_its_cadence() {
        let mut sim = recorded();
        assert_eq!(dni(&sim), None);
        assert_eq!(sim.step(0, &Inputs::new(), 0).unwrap(), Some(60));
        assert_eq!(dni(&sim), Some(100.0));
        assert_eq!(sim.step(60, &Inputs::new(), 0).unwrap(), Some(120));
        assert_eq!(dni(&sim), Some(200.0));
    }

    #[test]
    fn repeated_step_does_not_resample() {
        let mut sim = IrradianceSim::new();
        sim.init(
            "DNI",
            IrradianceSimConfig {
                start: start(),
                step_size: 60,
                source: IrradianceSource::Synthetic(SyntheticIrradiance::new(
                    SyntheticParams::default(),
                    7,
                )),
            },
        )
        .unwrap();
        sim.create(1, MODEL).unwrap();
        sim.step(0, &Inputs::new(), 0).unwrap();
        let first = sim.current();
        sim.step(0, &Inputs::new(), 0).unwrap();
        assert_eq!(sim.current(), first);
    }

    #[test]
    fn rejects_unknown_entity_and_attribute() {
        let sim = recorded();
        assert!(sim
            .get_data(&OutputRequest::new().with("Data_1", &[ATTR_DNI]))
            .is_err());
        assert!(sim
            .get_data(&OutputRequest::new().with("Data_0", &["ghi"]))
            .is_err());
    }
}
