//! Post-hoc run summary computed from collected series.

use std::fmt;

use super::collector::Collector;
use super::controller::ATTR_P_DC;
use super::feeder::{ATTR_P_MW, ATTR_Q_MVAR, ATTR_V_PU};

/// Voltage above which a bus sample counts as an over-voltage (pu).
pub const OVERVOLTAGE_PU: f64 = 1.05;

/// Aggregate indicators of a complete run.
///
/// Computed from the collector so that the summary and the recorded series
/// cannot disagree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Highest bus voltage seen (pu).
    pub peak_voltage_pu: f64,
    /// Number of (bus, step) samples above [`OVERVOLTAGE_PU`].
    pub overvoltage_samples: usize,
    /// DC power offered to the agents, integrated over the run (MWh).
    pub available_mwh: f64,
    /// Active power injected at the buses, integrated over the run (MWh).
    pub delivered_mwh: f64,
    /// Share of the available energy that was not delivered (%).
    pub curtailment_pct: f64,
    /// Mean bus reactive power injection (Mvar).
    pub mean_q_mvar: f64,
}

impl RunSummary {
    /// Computes the summary from the collector.
    ///
    /// # Arguments
    ///
    /// * `collector` - Series recorded during the run
    /// * `dt_hours` - Duration of one step in hours
    pub fn from_collector(collector: &Collector, dt_hours: f64) -> Self {
        let mut peak = f64::NEG_INFINITY;
        let mut over = 0;
        for (_, series) in collector.series_of(ATTR_V_PU) {
            for &v in series.values() {
                peak = peak.max(v);
                if v > OVERVOLTAGE_PU {
                    over += 1;
                }
            }
        }

        let energy = |attr: &str| -> f64 {
            collector
                .series_of(attr)
                .flat_map(|(_, s)| s.values())
                .sum::<f64>()
                * dt_hours
        };
        let available = energy(ATTR_P_DC);
        let delivered = energy(ATTR_P_MW);

        let (q_sum, q_n) = collector
            .series_of(ATTR_Q_MVAR)
            .flat_map(|(_, s)| s.values())
            .fold((0.0_f64, 0usize), |(sum, n), q| (sum + q, n + 1));

        Self {
            peak_voltage_pu: if peak.is_finite() { peak } else { 0.0 },
            overvoltage_samples: over,
            available_mwh: available,
            delivered_mwh: delivered,
            curtailment_pct: if available > 0.0 {
                100.0 * (available - delivered) / available
            } else {
                0.0
            },
            mean_q_mvar: if q_n > 0 { q_sum / q_n as f64 } else { 0.0 },
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "Peak bus voltage:      {:.4} pu", self.peak_voltage_pu)?;
        writeln!(
            f,
            "Over-voltage samples:  {} (> {OVERVOLTAGE_PU} pu)",
            self.overvoltage_samples
        )?;
        writeln!(f, "Available PV energy:   {:.6} MWh", self.available_mwh)?;
        writeln!(f, "Delivered PV energy:   {:.6} MWh", self.delivered_mwh)?;
        writeln!(f, "Curtailment:           {:.1}%", self.curtailment_pct)?;
        write!(f, "Mean reactive power:   {:.6} Mvar", self.mean_q_mvar)
    }
}
