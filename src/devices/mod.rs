//! Physical models behind the simulators.

/// Recorded and synthetic direct normal irradiance.
pub mod irradiance;
/// PV panel with sun position and incidence.
pub mod pv_panel;

pub use irradiance::{IrradianceSeries, IrradianceSource, SyntheticIrradiance};
pub use pv_panel::{PanelParams, PvPanel};
