//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

use crate::der::DerSettings;
use crate::devices::irradiance::{DATE_FORMAT, SyntheticParams};
use crate::devices::pv_panel::PanelParams;
use crate::sim::controller::{ControlLaw, ControllerConfig};
use crate::sim::feeder::FeederConfig;
use crate::sim::protocol::Time;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the Volt-VAR scenario. Load from TOML
/// with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Horizon, timing and population.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Control law and its coefficients.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Inverter limits and curves handed to the DER model.
    #[serde(default)]
    pub der: DerSettings,
    /// PV installations.
    #[serde(default)]
    pub pv: PvConfig,
    /// Irradiance source.
    #[serde(default)]
    pub irradiance: IrradianceConfig,
    /// Feeder voltage stand-in.
    #[serde(default)]
    pub feeder: FeederConfig,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Wall-clock time of simulated time zero (`YYYY-MM-DD HH:MM:SS`).
    pub start_date: String,
    /// Horizon (s, exclusive).
    pub end: Time,
    /// Lockstep interval (s).
    pub step_size: Time,
    /// Number of control agents, one per feeder bus.
    pub agents: usize,
    /// Seed of the synthetic irradiance profile.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_date: "2016-01-01 11:00:00".to_string(),
            end: 3600,
            step_size: 60,
            agents: 48,
            seed: 42,
        }
    }
}

/// PV installations. Agents share them round-robin.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PvConfig {
    /// Number of PV entities.
    pub count: usize,
    /// Report generation as negative power.
    pub gen_neg: bool,
    /// Let the adapter self-schedule on the simulation step.
    pub self_steps: bool,
    pub panel: PanelParams,
}

impl Default for PvConfig {
    fn default() -> Self {
        Self {
            count: 1,
            gen_neg: false,
            self_steps: false,
            panel: PanelParams::default(),
        }
    }
}

/// Irradiance source: a `date,dni` CSV file when `csv` is set, otherwise the
/// synthetic profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IrradianceConfig {
    pub csv: Option<PathBuf>,
    pub synthetic: SyntheticParams,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.step_size"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the default scenario: Volt-VAR control on 48 agents.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the baseline scenario running `law`.
    pub fn with_law(law: ControlLaw) -> Self {
        let mut cfg = Self::baseline();
        cfg.controller.law = law;
        cfg
    }

    /// Available preset names, one per control law.
    pub const PRESETS: &[&str] = &["no_generation", "uncontrolled", "volt_var", "volt_watt"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        ControlLaw::from_name(name).map(Self::with_law).ok_or_else(|| {
            ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )
        })
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Parsed `simulation.start_date`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the date does not match `YYYY-MM-DD HH:MM:SS`.
    pub fn start(&self) -> Result<NaiveDateTime, ConfigError> {
        NaiveDateTime::parse_from_str(&self.simulation.start_date, DATE_FORMAT).map_err(|e| {
            ConfigError::new(
                "simulation.start_date",
                format!("\"{}\": {e}", self.simulation.start_date),
            )
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if let Err(e) = self.start() {
            errors.push(e);
        }
        if s.step_size == 0 {
            errors.push(ConfigError::new("simulation.step_size", "must be > 0"));
        }
        if s.end == 0 {
            errors.push(ConfigError::new("simulation.end", "must be > 0"));
        }
        if s.agents == 0 {
            errors.push(ConfigError::new("simulation.agents", "must be > 0"));
        }

        let c = &self.controller;
        for (field, value) in [
            ("controller.alpha_q", c.alpha_q),
            ("controller.alpha_curtail", c.alpha_curtail),
            ("controller.alpha_recover", c.alpha_recover),
            ("controller.curtail_margin", c.curtail_margin),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                errors.push(ConfigError::new(field, "must be in (0.0, 1.0]"));
            }
        }
        if c.freq_hz <= 0.0 {
            errors.push(ConfigError::new("controller.freq_hz", "must be > 0"));
        }

        let d = &self.der;
        for (field, value) in [
            ("der.np_p_max", d.np_p_max),
            ("der.np_va_max", d.np_va_max),
            ("der.np_q_max_abs", d.np_q_max_abs),
            ("der.np_q_max_inj", d.np_q_max_inj),
        ] {
            if value <= 0.0 {
                errors.push(ConfigError::new(field, "must be > 0"));
            }
        }
        if d.pv_curve_v1 >= d.pv_curve_v2 {
            errors.push(ConfigError::new("der.pv_curve_v1", "must be < der.pv_curve_v2"));
        }
        if d.qv_curve_v.windows(2).any(|w| w[0] > w[1]) {
            errors.push(ConfigError::new("der.qv_curve_v", "must be non-decreasing"));
        }

        let pv = &self.pv;
        if pv.count == 0 {
            errors.push(ConfigError::new("pv.count", "must be > 0"));
        }
        if pv.panel.area <= 0.0 {
            errors.push(ConfigError::new("pv.panel.area", "must be > 0"));
        }
        if !(pv.panel.efficiency > 0.0 && pv.panel.efficiency <= 1.0) {
            errors.push(ConfigError::new("pv.panel.efficiency", "must be in (0.0, 1.0]"));
        }
        if !(-90.0..=90.0).contains(&pv.panel.lat) {
            errors.push(ConfigError::new("pv.panel.lat", "must be in [-90, 90]"));
        }

        let syn = &self.irradiance.synthetic;
        if syn.sunrise_hour >= syn.sunset_hour {
            errors.push(ConfigError::new(
                "irradiance.synthetic.sunrise_hour",
                "must be < irradiance.synthetic.sunset_hour",
            ));
        }
        if !(0.0..=1.0).contains(&syn.cloud_alpha) {
            errors.push(ConfigError::new(
                "irradiance.synthetic.cloud_alpha",
                "must be in [0.0, 1.0]",
            ));
        }
        if syn.peak_dni < 0.0 {
            errors.push(ConfigError::new("irradiance.synthetic.peak_dni", "must be >= 0"));
        }

        let f = &self.feeder;
        if f.dv_dp_near < 0.0 || f.dv_dp_far < 0.0 {
            errors.push(ConfigError::new("feeder.dv_dp_near", "sensitivities must be >= 0"));
        }

        errors
    }
}
