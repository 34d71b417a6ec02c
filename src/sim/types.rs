//! Per-step record produced by the scenario runner.

use std::fmt;

use super::protocol::Time;

/// Complete record of one lockstep of a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    /// Simulation time (s).
    pub time: Time,
    /// Direct normal irradiance (W/m²).
    pub dni: f64,
    /// Generated power summed over PV entities (MW).
    pub p_gen_mw: f64,
    /// Agents whose control law ran this step.
    pub evaluated_agents: usize,
    /// Active power injected across all buses (MW).
    pub p_injected_mw: f64,
    /// Reactive power injected across all buses (Mvar).
    pub q_injected_mvar: f64,
    /// Lowest bus voltage after the feeder step (pu).
    pub v_min_pu: f64,
    /// Highest bus voltage after the feeder step (pu).
    pub v_max_pu: f64,
    /// Buses above the over-voltage limit.
    pub overvoltage_buses: usize,
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>5}s | dni={:>6.1} W/m2  p_gen={:.5} MW | active={:>3} | \
             P={:.5} MW  Q={:+.5} Mvar | v=[{:.4}, {:.4}] pu  over={}",
            self.time,
            self.dni,
            self.p_gen_mw,
            self.evaluated_agents,
            self.p_injected_mw,
            self.q_injected_mvar,
            self.v_min_pu,
            self.v_max_pu,
            self.overvoltage_buses,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_one_line() {
        let record = StepRecord {
            time: 60,
            dni: 512.0,
            p_gen_mw: 0.0042,
            evaluated_agents: 48,
            p_injected_mw: 0.2,
            q_injected_mvar: -0.01,
            v_min_pu: 1.021,
            v_max_pu: 1.061,
            overvoltage_buses: 3,
        };
        let text = record.to_string();
        assert!(!text.contains('\n'));
        assert!(text.starts_with("t=   60s"));
        assert!(text.contains("over=3"));
    }
}
