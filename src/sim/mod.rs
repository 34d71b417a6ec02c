/// Lockstep clock over the scenario horizon.
pub mod clock;
pub mod collector;
pub mod controller;
/// Linear voltage-sensitivity feeder stand-in.
pub mod feeder;
pub mod irradiance;
pub mod kpi;
pub mod protocol;
pub mod pv_adapter;
pub mod types;
