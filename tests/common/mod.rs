//! Shared test fixtures for integration tests.

use std::cell::Cell;
use std::rc::Rc;

use pv_control_sim::config::ScenarioConfig;
use pv_control_sim::der::{DerInput, DerModel, DerOutput, DerSettings, ReferenceDer};
use pv_control_sim::sim::controller::{
    ATTR_P_DC, ATTR_P_MW, ATTR_Q_MVAR, ATTR_V_PU, ControlLaw, ControllerConfig,
    ControllerSettings, ControllerSim, MODEL,
};
use pv_control_sim::sim::protocol::{Inputs, OutputRequest, Simulator};

/// DER stub: active power is a fixed fraction of the DC power, reactive
/// power a fixed value (var).
#[derive(Debug, Clone, Copy)]
pub struct StubDer {
    pub p_frac: f64,
    pub q_var: f64,
}

impl DerModel for StubDer {
    fn run(&self, _settings: &DerSettings, input: DerInput) -> DerOutput {
        DerOutput {
            p_w: input.p_dc_w * self.p_frac,
            q_var: self.q_var,
        }
    }
}

/// DER stub whose active-power fraction can be changed between steps
/// through a shared handle.
#[derive(Debug, Clone, Default)]
pub struct DialDer {
    pub p_frac: Rc<Cell<f64>>,
}

impl DerModel for DialDer {
    fn run(&self, _settings: &DerSettings, input: DerInput) -> DerOutput {
        DerOutput {
            p_w: input.p_dc_w * self.p_frac.get(),
            q_var: 0.0,
        }
    }
}

/// Controller running `law` with default coefficients and `agents` agents.
pub fn controller<D: DerModel>(law: ControlLaw, der: D, agents: usize) -> ControllerSim<D> {
    let mut sim = ControllerSim::new(der);
    sim.init(
        "Ctrl",
        ControllerSettings {
            control: ControllerConfig {
                law,
                ..ControllerConfig::default()
            },
            der: DerSettings::default(),
        },
    )
    .expect("init");
    sim.create(agents, MODEL).expect("create");
    sim
}

/// Default 48-agent controller on the reference DER.
pub fn reference_controller(law: ControlLaw) -> ControllerSim<ReferenceDer> {
    controller(law, ReferenceDer, 48)
}

/// Voltage and DC power for one agent.
pub fn agent_inputs(eid: &str, v_pu: f64, p_dc_mw: f64) -> Inputs {
    Inputs::new()
        .with(eid, ATTR_V_PU, "Grid.Bus_0", v_pu)
        .with(eid, ATTR_P_DC, "PV.PV_0", p_dc_mw)
}

/// `(q_mvar, p_mw)` currently served for `eid`.
pub fn setpoint<D: DerModel>(sim: &ControllerSim<D>, eid: &str) -> (Option<f64>, Option<f64>) {
    let data = sim
        .get_data(&OutputRequest::new().with(eid, &[ATTR_Q_MVAR, ATTR_P_MW]))
        .expect("get_data");
    (data.value(eid, ATTR_Q_MVAR), data.value(eid, ATTR_P_MW))
}

/// Ten-minute scenario with 8 agents running `law`.
pub fn short_scenario(law: ControlLaw) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::with_law(law);
    cfg.simulation.end = 600;
    cfg.simulation.agents = 8;
    cfg
}
