//! Co-simulation of local Volt-VAR and Volt-Watt control loops for PV
//! inverters on a low-voltage feeder.

pub mod config;
pub mod der;
pub mod devices;
pub mod error;
pub mod runner;
/// Stepping protocol, simulators and run summary.
pub mod sim;
