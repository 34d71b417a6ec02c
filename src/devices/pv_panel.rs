//! Physical PV panel: direct normal irradiance to electrical power.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use serde::Deserialize;

/// Fixed physical parameters of a panel installation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PanelParams {
    /// Latitude of the installation (degrees, north positive).
    pub lat: f64,
    /// Panel area (m²).
    pub area: f64,
    /// Conversion efficiency (0.0–1.0).
    pub efficiency: f64,
    /// Elevation tilt from horizontal (degrees).
    pub el_tilt: f64,
    /// Azimuth of the panel normal relative to south, west positive (degrees).
    pub az_tilt: f64,
}

impl Default for PanelParams {
    fn default() -> Self {
        Self {
            lat: 53.07,
            area: 30.0,
            efficiency: 0.2,
            el_tilt: 32.0,
            az_tilt: 0.0,
        }
    }
}

/// Sun elevation and azimuth (degrees). Azimuth is measured from south,
/// west positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
}

/// A panel with its own clock.
///
/// The clock starts at the scenario start date and is advanced explicitly by
/// [`PvPanel::step_time`]; the sun position is derived from it using the
/// declination / hour-angle approximation in local solar time.
#[derive(Debug, Clone)]
pub struct PvPanel {
    params: PanelParams,
    clock: NaiveDateTime,
}

impl PvPanel {
    pub fn new(params: PanelParams, start: NaiveDateTime) -> Self {
        Self {
            params,
            clock: start,
        }
    }

    /// Current panel time.
    pub fn clock(&self) -> NaiveDateTime {
        self.clock
    }

    /// Advances the panel clock by `dt_s` seconds.
    pub fn step_time(&mut self, dt_s: i64) {
        if let Some(next) = self.clock.checked_add_signed(Duration::seconds(dt_s)) {
            self.clock = next;
        }
    }

    /// Sun position at the current panel time.
    pub fn sun_position(&self) -> SunPosition {
        let day = f64::from(self.clock.ordinal());
        let hour = f64::from(self.clock.hour())
            + f64::from(self.clock.minute()) / 60.0
            + f64::from(self.clock.second()) / 3600.0;

        let lat = self.params.lat.to_radians();
        let decl = (23.45_f64).to_radians() * (2.0 * std::f64::consts::PI * (284.0 + day) / 365.0).sin();
        let hour_angle = (15.0 * (hour - 12.0)).to_radians();

        let sin_el = lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos();
        let elevation = sin_el.clamp(-1.0, 1.0).asin();

        // Azimuth from south, west positive.
        let azimuth = hour_angle
            .sin()
            .atan2(hour_angle.cos() * lat.sin() - decl.tan() * lat.cos());

        SunPosition {
            elevation_deg: elevation.to_degrees(),
            azimuth_deg: azimuth.to_degrees(),
        }
    }

    /// Cosine of the angle between the sun beam and the panel normal, floored
    /// at zero. Zero while the sun is below the horizon.
    pub fn incidence_factor(&self) -> f64 {
        let sun = self.sun_position();
        if sun.elevation_deg <= 0.0 {
            return 0.0;
        }
        let el = sun.elevation_deg.to_radians();
        let tilt = self.params.el_tilt.to_radians();
        let rel_az = (sun.azimuth_deg - self.params.az_tilt).to_radians();
        (el.sin() * tilt.cos() + el.cos() * tilt.sin() * rel_az.cos()).max(0.0)
    }

    /// Electrical output (MW) for a direct normal irradiance of `dni` (W/m²).
    pub fn power(&self, dni: f64) -> f64 {
        let p = &self.params;
        dni.max(0.0) * p.area * p.efficiency * self.incidence_factor() * 1e-6
    }
}
