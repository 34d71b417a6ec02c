//! Direct normal irradiance (DNI) time series.
//!
//! Two sources are offered: a recorded series read from CSV, and a seeded
//! synthetic clear-sky profile with temporally correlated cloud cover.

use std::io::Read;
use std::path::Path;

use chrono::{NaiveDateTime, Timelike};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;

use crate::error::{SimError, SimResult};
use crate::sim::protocol::Time;

/// Date format used in irradiance CSV files and scenario start dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Minimum cloud multiplier (heavy overcast).
const MULTIPLIER_MIN: f64 = 0.2;
/// Maximum cloud multiplier (clear sky).
const MULTIPLIER_MAX: f64 = 1.0;

#[derive(Debug, Deserialize)]
struct Record {
    date: String,
    dni: f64,
}

/// Recorded DNI samples keyed by seconds since the scenario start.
///
/// Lookups between samples hold the most recent one; lookups past the end
/// hold the last sample.
#[derive(Debug, Clone, PartialEq)]
pub struct IrradianceSeries {
    samples: Vec<(Time, f64)>,
}

impl IrradianceSeries {
    /// Builds a series from `(offset, dni)` pairs, sorted by offset.
    pub fn from_samples(mut samples: Vec<(Time, f64)>) -> Self {
        samples.sort_by_key(|(t, _)| *t);
        Self { samples }
    }

    /// Reads a `date,dni` CSV file. Rows before `start` are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a row does not parse, or
    /// no row falls at or after `start`.
    pub fn from_csv_path(path: &Path, start: NaiveDateTime) -> SimResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file, start)
    }

    /// Reads `date,dni` CSV records from any reader.
    pub fn from_csv_reader(reader: impl Read, start: NaiveDateTime) -> SimResult<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut samples = Vec::new();
        for record in rdr.deserialize() {
            let record: Record = record?;
            let date = NaiveDateTime::parse_from_str(&record.date, DATE_FORMAT).map_err(|e| {
                SimError::InvalidInput {
                    what: format!("bad date \"{}\" in irradiance data: {e}", record.date),
                }
            })?;
            let offset = (date - start).num_seconds();
            if let Ok(offset) = Time::try_from(offset) {
                samples.push((offset, record.dni));
            }
        }
        if samples.is_empty() {
            return Err(SimError::InvalidInput {
                what: "irradiance data has no samples at or after the start date".to_string(),
            });
        }
        Ok(Self::from_samples(samples))
    }

    /// DNI at `t`: the latest sample at or before `t`, or zero before the
    /// first one.
    pub fn at(&self, t: Time) -> f64 {
        let idx = self.samples.partition_point(|(ts, _)| *ts <= t);
        if idx == 0 {
            0.0
        } else {
            self.samples[idx - 1].1
        }
    }
}

/// Parameters of the synthetic irradiance profile.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntheticParams {
    /// Clear-sky DNI at solar noon (W/m²).
    pub peak_dni: f64,
    /// Local hour of sunrise.
    pub sunrise_hour: f64,
    /// Local hour of sunset.
    pub sunset_hour: f64,
    /// AR(1) correlation of the cloud multiplier (0.0–1.0).
    pub cloud_alpha: f64,
    /// Standard deviation of the AR(1) innovation.
    pub cloud_noise_std: f64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            peak_dni: 850.0,
            sunrise_hour: 6.0,
            sunset_hour: 18.0,
            cloud_alpha: 0.9,
            cloud_noise_std: 0.2,
        }
    }
}

/// Half-sine clear-sky DNI between sunrise and sunset, scaled by an AR(1)
/// cloud multiplier:
///
/// ```text
/// m(t) = alpha * m(t-1) + (1 - alpha) * (1 + epsilon(t))
/// ```
///
/// clamped to \[0.2, 1.0\].
#[derive(Debug, Clone)]
pub struct SyntheticIrradiance {
    params: SyntheticParams,
    multiplier: f64,
    rng: StdRng,
}

impl SyntheticIrradiance {
    pub fn new(params: SyntheticParams, seed: u64) -> Self {
        Self {
            params,
            multiplier: 1.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Clear-sky DNI at `clock`, without clouds.
    pub fn clear_sky(&self, clock: NaiveDateTime) -> f64 {
        let p = &self.params;
        let hour = f64::from(clock.hour())
            + f64::from(clock.minute()) / 60.0
            + f64::from(clock.second()) / 3600.0;
        if hour <= p.sunrise_hour || hour >= p.sunset_hour {
            return 0.0;
        }
        let frac = (hour - p.sunrise_hour) / (p.sunset_hour - p.sunrise_hour);
        p.peak_dni * (std::f64::consts::PI * frac).sin()
    }

    /// Advances the cloud multiplier and returns the DNI at `clock`.
    pub fn sample(&mut self, clock: NaiveDateTime) -> f64 {
        let epsilon = gaussian_noise(&mut self.rng, self.params.cloud_noise_std);
        let alpha = self.params.cloud_alpha;
        self.multiplier = (alpha * self.multiplier + (1.0 - alpha) * (1.0 + epsilon))
            .clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
        self.clear_sky(clock) * self.multiplier
    }
}

/// Where the irradiance simulator gets its DNI from.
#[derive(Debug, Clone)]
pub enum IrradianceSource {
    Recorded(IrradianceSeries),
    Synthetic(SyntheticIrradiance),
}

impl IrradianceSource {
    /// DNI at offset `t` whose wall-clock time is `clock`.
    pub fn dni_at(&mut self, t: Time, clock: NaiveDateTime) -> f64 {
        match self {
            IrradianceSource::Recorded(series) => series.at(t),
            IrradianceSource::Synthetic(synth) => synth.sample(clock),
        }
    }
}

/// Gaussian noise via the Box-Muller transform.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2016-01-01 11:00:00", DATE_FORMAT).unwrap()
    }

    #[test]
    fn csv_offsets_are_relative_to_start() {
        let data = "date,dni\n\
                    2016-01-01 10:59:00,100\n\
                    2016-01-01 11:00:00,200\n\
                    2016-01-01 11:01:00,300\n";
        let series = IrradianceSeries::from_csv_reader(data.as_bytes(), start()).unwrap();
        assert_eq!(series.samples.len(), 2);
        assert_eq!(series.at(0), 200.0);
        assert_eq!(series.at(59), 200.0);
        assert_eq!(series.at(60), 300.0);
        assert_eq!(series.at(10_000), 300.0);
    }

    #[test]
    fn csv_with_bad_date_is_rejected() {
        let data = "date,dni\nyesterday,100\n";
        let err = IrradianceSeries::from_csv_reader(data.as_bytes(), start());
        assert!(matches!(err, Err(SimError::InvalidInput { .. })));
    }

    #[test]
    fn csv_with_no_usable_rows_is_rejected() {
        let data = "date,dni\n2015-01-01 00:00:00,100\n";
        assert!(IrradianceSeries::from_csv_reader(data.as_bytes(), start()).is_err());
    }

    #[test]
    fn series_is_zero_before_first_sample() {
        let series = IrradianceSeries::from_samples(vec![(120, 5.0), (60, 4.0)]);
        assert_eq!(series.at(0), 0.0);
        assert_eq!(series.at(60), 4.0);
        assert_eq!(series.at(130), 5.0);
    }

    #[test]
    fn clear_sky_peaks_at_midday_and_is_dark_at_night() {
        let synth = SyntheticIrradiance::new(SyntheticParams::default(), 1);
        let noon = NaiveDateTime::parse_from_str("2016-06-01 12:00:00", DATE_FORMAT).unwrap();
        let night = NaiveDateTime::parse_from_str("2016-06-01 22:00:00", DATE_FORMAT).unwrap();
        assert!((synth.clear_sky(noon) - 850.0).abs() < 1e-9);
        assert_eq!(synth.clear_sky(night), 0.0);
    }

    #[test]
    fn synthetic_is_bounded_and_deterministic() {
        let mut a = SyntheticIrradiance::new(SyntheticParams::default(), 42);
        let mut b = SyntheticIrradiance::new(SyntheticParams::default(), 42);
        let mut clock = start();
        for _ in 0..120 {
            let va = a.sample(clock);
            let vb = b.sample(clock);
            assert_eq!(va, vb);
            assert!(va >= 0.0 && va <= a.clear_sky(clock) + 1e-9);
            clock += chrono::Duration::seconds(60);
        }
    }

    #[test]
    fn zero_noise_is_zero() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
    }
}
