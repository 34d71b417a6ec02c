//! Per-agent inverter control engine.
//!
//! One engine serves every agent of a scenario. Each step it reads the bus
//! voltage and available DC power of every agent that received inputs,
//! consults the DER model, and filters the result through the configured
//! [`ControlLaw`]. Agents whose voltage does not exceed the threshold are
//! skipped and keep returning their last committed setpoint.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::der::{DerInput, DerModel, DerSettings};
use crate::error::{SimError, SimResult};

use super::protocol::{
    EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest, SimKind, Simulator, Time,
};

/// Model name offered by the controller simulator.
pub const MODEL: &str = "Ctrl";
/// Input: bus voltage (pu).
pub const ATTR_V_PU: &str = "v_pu";
/// Input: available DC power (MW).
pub const ATTR_P_DC: &str = "p_dc";
/// Output: reactive power setpoint (Mvar).
pub const ATTR_Q_MVAR: &str = "q_mvar";
/// Output: active power setpoint (MW).
pub const ATTR_P_MW: &str = "p_mw";

const OUTPUT_ATTRS: [&str; 2] = [ATTR_Q_MVAR, ATTR_P_MW];
const W_PER_MW: f64 = 1_000_000.0;

/// Control law applied to every agent of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlLaw {
    /// Baseline without distributed generation: P and Q forced to zero.
    NoGeneration,
    /// Generation without control: DER active power, zero reactive power.
    Uncontrolled,
    /// Smoothed Q(V) reactive support, DER active power.
    VoltVar,
    /// Ramp-limited P(V) curtailment, zero reactive power.
    VoltWatt,
}

impl ControlLaw {
    pub const ALL: [ControlLaw; 4] = [
        ControlLaw::NoGeneration,
        ControlLaw::Uncontrolled,
        ControlLaw::VoltVar,
        ControlLaw::VoltWatt,
    ];

    /// Snake-case name, as used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            ControlLaw::NoGeneration => "no_generation",
            ControlLaw::Uncontrolled => "uncontrolled",
            ControlLaw::VoltVar => "volt_var",
            ControlLaw::VoltWatt => "volt_watt",
        }
    }

    /// Parses a snake-case name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|law| law.name() == name)
    }

    /// DER settings for this law: the shared limits, plus the Q(V) mode for
    /// Volt-VAR and the P(V) mode for Volt-Watt.
    fn der_settings(self, base: &DerSettings) -> DerSettings {
        DerSettings {
            qv_mode_enable: self == ControlLaw::VoltVar,
            pv_mode_enable: self == ControlLaw::VoltWatt,
            ..base.clone()
        }
    }
}

/// Coefficients of the control loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub law: ControlLaw,
    /// Seconds added to the availability time of every non-empty result.
    /// Zero disables the marker.
    pub output_delay: Time,
    /// Agents are evaluated only when voltage is strictly above this (pu).
    pub threshold_pu: f64,
    /// Grid frequency passed to the DER model (Hz).
    pub freq_hz: f64,
    /// Volt-VAR smoothing factor.
    pub alpha_q: f64,
    /// Volt-Watt ramp factor while the DER requests curtailment.
    pub alpha_curtail: f64,
    /// Volt-Watt ramp factor while recovering towards available power.
    pub alpha_recover: f64,
    /// DER power below `curtail_margin · P_dc` counts as a curtailment request.
    pub curtail_margin: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            law: ControlLaw::VoltVar,
            output_delay: 5,
            threshold_pu: 1.0,
            freq_hz: 60.0,
            alpha_q: 0.2,
            alpha_curtail: 0.05,
            alpha_recover: 0.5,
            curtail_margin: 0.999,
        }
    }
}

/// Everything the controller simulator needs at `init`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerSettings {
    pub control: ControllerConfig,
    pub der: DerSettings,
}

/// Reactive/active setpoint pair, in Mvar and MW.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoint {
    pub q_mvar: f64,
    pub p_mw: f64,
}

impl Setpoint {
    fn attr(&self, name: &str) -> Option<f64> {
        match name {
            ATTR_Q_MVAR => Some(self.q_mvar),
            ATTR_P_MW => Some(self.p_mw),
            _ => None,
        }
    }
}

/// Filter state and last committed output of one agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentState {
    /// Smoothed reactive power (Mvar), Volt-VAR only.
    pub q_smoothed: f64,
    /// Ramp-limited active power (MW), Volt-Watt only. `None` until the
    /// first evaluation.
    pub p_ramped: Option<f64>,
    /// Output of the most recent evaluation. Survives steps in which the
    /// agent is idle.
    pub committed: Option<Setpoint>,
}

/// Controller simulator holding every agent of a scenario.
pub struct ControllerSim<D: DerModel> {
    der: D,
    settings: ControllerSettings,
    der_settings: DerSettings,
    agents: BTreeMap<EntityId, AgentState>,
    next_index: usize,
    time: Time,
    /// Results of the most recent step only; replaced at every step.
    step_outputs: BTreeMap<EntityId, Setpoint>,
    initialised: bool,
}

impl<D: DerModel> ControllerSim<D> {
    pub fn new(der: D) -> Self {
        Self {
            der,
            settings: ControllerSettings::default(),
            der_settings: DerSettings::default(),
            agents: BTreeMap::new(),
            next_index: 0,
            time: 0,
            step_outputs: BTreeMap::new(),
            initialised: false,
        }
    }

    pub fn law(&self) -> ControlLaw {
        self.settings.control.law
    }

    /// State of `eid`, if it exists.
    pub fn agent(&self, eid: &str) -> Option<&AgentState> {
        self.agents.get(eid)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Setpoints computed by the most recent step.
    pub fn step_outputs(&self) -> &BTreeMap<EntityId, Setpoint> {
        &self.step_outputs
    }

    fn meta() -> Meta {
        Meta::new(SimKind::EventBased).with_model(
            MODEL,
            ModelMeta {
                public: true,
                params: Vec::new(),
                attrs: vec![ATTR_V_PU, ATTR_P_DC, ATTR_Q_MVAR, ATTR_P_MW],
                trigger: vec![ATTR_V_PU, ATTR_P_DC],
                self_steps: false,
            },
        )
    }

    /// Runs the control law for one agent and returns its new setpoint.
    fn evaluate(&self, state: &mut AgentState, v_pu: f64, p_dc_mw: f64) -> Setpoint {
        let ctl = &self.settings.control;
        let p_dc_w = p_dc_mw * W_PER_MW;
        let out = self.der.run(
            &self.der_settings,
            DerInput {
                v_pu,
                freq_hz: ctl.freq_hz,
                p_dc_w,
            },
        );
        let p_der = out.p_w / W_PER_MW;
        let q_der = out.q_var / W_PER_MW;

        match ctl.law {
            ControlLaw::NoGeneration => Setpoint {
                q_mvar: 0.0,
                p_mw: 0.0,
            },
            ControlLaw::Uncontrolled => Setpoint {
                q_mvar: 0.0,
                p_mw: p_der,
            },
            ControlLaw::VoltVar => {
                state.q_smoothed = ctl.alpha_q * q_der + (1.0 - ctl.alpha_q) * state.q_smoothed;
                Setpoint {
                    q_mvar: state.q_smoothed,
                    p_mw: p_der,
                }
            }
            ControlLaw::VoltWatt => {
                let prev = state.p_ramped.unwrap_or(p_der);
                let next = if p_der < p_dc_mw * ctl.curtail_margin {
                    prev + ctl.alpha_curtail * (p_der - prev)
                } else {
                    prev + ctl.alpha_recover * (p_dc_mw - prev)
                };
                let next = next.min(p_dc_mw);
                state.p_ramped = Some(next);
                Setpoint {
                    q_mvar: 0.0,
                    p_mw: next,
                }
            }
        }
    }
}

impl<D: DerModel> Simulator for ControllerSim<D> {
    type Config = ControllerSettings;

    fn init(&mut self, sid: &str, config: ControllerSettings) -> SimResult<Meta> {
        self.der_settings = config.control.law.der_settings(&config.der);
        info!(
            sid,
            law = config.control.law.name(),
            output_delay = config.control.output_delay,
            "controller initialised"
        );
        self.settings = config;
        self.initialised = true;
        Ok(Self::meta())
    }

    fn create(&mut self, num: usize, model: &str) -> SimResult<Vec<EntityId>> {
        if model != MODEL {
            return Err(SimError::UnknownModel {
                model: model.to_string(),
            });
        }
        let start = self.next_index;
        let ids: Vec<EntityId> = (start..start + num).map(|i| format!("Agent_{i}")).collect();
        for eid in &ids {
            self.agents.insert(eid.clone(), AgentState::default());
        }
        self.next_index += num;
        debug!(count = num, first = start, "agents created");
        Ok(ids)
    }

    fn step(&mut self, time: Time, inputs: &Inputs, _max_advance: Time) -> SimResult<Option<Time>> {
        if !self.initialised {
            return Err(SimError::InvalidInput {
                what: "controller stepped before init".to_string(),
            });
        }
        if let Some(eid) = inputs.entities().find(|eid| !self.agents.contains_key(*eid)) {
            return Err(SimError::unknown_entity(eid));
        }
        self.time = time;
        self.step_outputs = BTreeMap::new();
        let threshold = self.settings.control.threshold_pu;

        for eid in inputs.entities() {
            let Some(mut state) = self.agents.get(eid).cloned() else {
                continue;
            };
            let (Some(v_pu), Some(p_dc_mw)) =
                (inputs.first(eid, ATTR_V_PU), inputs.first(eid, ATTR_P_DC))
            else {
                warn!(time, eid, "agent stepped without voltage and dc power, holding");
                continue;
            };
            // NaN readings hold as well
            if !(v_pu > threshold) {
                continue;
            }

            let setpoint = self.evaluate(&mut state, v_pu, p_dc_mw);
            debug!(
                time,
                eid,
                v_pu,
                p_dc_mw,
                p_mw = setpoint.p_mw,
                q_mvar = setpoint.q_mvar,
                "agent evaluated"
            );
            state.committed = Some(setpoint);
            self.agents.insert(eid.to_string(), state);
            self.step_outputs.insert(eid.to_string(), setpoint);
        }

        Ok(None)
    }

    fn get_data(&self, request: &OutputRequest) -> SimResult<OutputData> {
        let mut data = OutputData::default();
        for (eid, attrs) in request.iter() {
            let state = self
                .agents
                .get(eid)
                .ok_or_else(|| SimError::unknown_entity(eid))?;
            let current = self.step_outputs.get(eid).or(state.committed.as_ref());
            for attr in attrs {
                if !OUTPUT_ATTRS.contains(&attr.as_str()) {
                    return Err(SimError::unknown_attribute(eid, attr));
                }
                data.set(eid, attr, current.and_then(|sp| sp.attr(attr)));
            }
        }
        let delay = Some(self.settings.control.output_delay);
        Ok(data.delayed(self.time, delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::der::DerOutput;

    /// DER stub returning fixed fractions of the DC power, in W/var.
    struct FixedDer {
        p_frac: f64,
        q_var: f64,
    }

    impl DerModel for FixedDer {
        fn run(&self, _settings: &DerSettings, input: DerInput) -> DerOutput {
            DerOutput {
                p_w: input.p_dc_w * self.p_frac,
                q_var: self.q_var,
            }
        }
    }

    fn controller(law: ControlLaw, p_frac: f64, q_var: f64) -> ControllerSim<FixedDer> {
        let mut sim = ControllerSim::new(FixedDer { p_frac, q_var });
        let settings = ControllerSettings {
            control: ControllerConfig {
                law,
                ..ControllerConfig::default()
            },
            der: DerSettings::default(),
        };
        sim.init("Ctrl-0", settings).ok();
        sim.create(2, MODEL).ok();
        sim
    }

    fn inputs(v_pu: f64, p_dc: f64) -> Inputs {
        Inputs::new()
            .with("Agent_0", ATTR_V_PU, "Grid.Bus_0", v_pu)
            .with("Agent_0", ATTR_P_DC, "PV.PV_0", p_dc)
    }

    fn read(sim: &ControllerSim<FixedDer>) -> (Option<f64>, Option<f64>) {
        let data = sim
            .get_data(&OutputRequest::new().with("Agent_0", &[ATTR_Q_MVAR, ATTR_P_MW]))
            .unwrap();
        (
            data.value("Agent_0", ATTR_Q_MVAR),
            data.value("Agent_0", ATTR_P_MW),
        )
    }

    #[test]
    fn law_names_round_trip() {
        for law in ControlLaw::ALL {
            assert_eq!(ControlLaw::from_name(law.name()), Some(law));
        }
        assert_eq!(ControlLaw::from_name("droop"), None);
    }

    #[test]
    fn law_enables_only_its_own_der_mode() {
        let base = DerSettings::default();
        let vv = ControlLaw::VoltVar.der_settings(&base);
        assert!(vv.qv_mode_enable && !vv.pv_mode_enable);
        let vw = ControlLaw::VoltWatt.der_settings(&base);
        assert!(vw.pv_mode_enable && !vw.qv_mode_enable);
        let un = ControlLaw::Uncontrolled.der_settings(&base);
        assert!(!un.pv_mode_enable && !un.qv_mode_enable);
    }

    #[test]
    fn create_numbers_agents_contiguously_across_calls() {
        let mut sim = controller(ControlLaw::Uncontrolled, 1.0, 0.0);
        let more = sim.create(3, MODEL).unwrap();
        assert_eq!(more, ["Agent_2", "Agent_3", "Agent_4"]);
        assert_eq!(sim.agent_count(), 5);
    }

    #[test]
    fn create_rejects_unknown_model() {
        let mut sim = controller(ControlLaw::Uncontrolled, 1.0, 0.0);
        assert!(matches!(
            sim.create(1, "PV"),
            Err(SimError::UnknownModel { .. })
        ));
    }

    #[test]
    fn no_generation_forces_zero() {
        let mut sim = controller(ControlLaw::NoGeneration, 1.0, -1000.0);
        sim.step(0, &inputs(1.03, 0.004), 0).unwrap();
        assert_eq!(read(&sim), (Some(0.0), Some(0.0)));
    }

    #[test]
    fn uncontrolled_passes_der_power_in_mw() {
        let mut sim = controller(ControlLaw::Uncontrolled, 0.5, -1000.0);
        sim.step(0, &inputs(1.03, 0.004), 0).unwrap();
        let (q, p) = read(&sim);
        assert_eq!(q, Some(0.0));
        assert!((p.unwrap() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn volt_var_smooths_from_zero() {
        let mut sim = controller(ControlLaw::VoltVar, 1.0, -1000.0);
        sim.step(0, &inputs(1.03, 0.004), 0).unwrap();
        let (q, p) = read(&sim);
        assert!((q.unwrap() - (-0.0002)).abs() < 1e-12);
        assert!((p.unwrap() - 0.004).abs() < 1e-12);

        sim.step(60, &inputs(1.03, 0.004), 0).unwrap();
        let expected = 0.2 * -0.001 + 0.8 * -0.0002;
        assert!((read(&sim).0.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn volt_watt_first_step_seeds_from_der_then_ramps_down_slowly() {
        let mut sim = controller(ControlLaw::VoltWatt, 0.5, 0.0);
        sim.step(0, &inputs(1.055, 0.004), 0).unwrap();
        // prev seeded with the DER value, so the first ramp is a no-op
        assert!((read(&sim).1.unwrap() - 0.002).abs() < 1e-12);

        let mut full = controller(ControlLaw::VoltWatt, 1.0, 0.0);
        full.step(0, &inputs(1.03, 0.004), 0).unwrap();
        assert!((read(&full).1.unwrap() - 0.004).abs() < 1e-12);
    }

    #[test]
    fn volt_watt_recovers_towards_dc_power() {
        let mut sim = controller(ControlLaw::VoltWatt, 0.5, 0.0);
        sim.step(0, &inputs(1.055, 0.004), 0).unwrap();
        sim.der.p_frac = 1.0;
        sim.step(60, &inputs(1.03, 0.004), 0).unwrap();
        let p = read(&sim).1.unwrap();
        assert!((p - (0.002 + 0.5 * 0.002)).abs() < 1e-12, "p = {p}");
    }

    #[test]
    fn volt_watt_never_exceeds_dc_power() {
        let mut sim = controller(ControlLaw::VoltWatt, 1.0, 0.0);
        sim.step(0, &inputs(1.03, 0.004), 0).unwrap();
        sim.step(60, &inputs(1.03, 0.001), 0).unwrap();
        assert!(read(&sim).1.unwrap() <= 0.001);
    }

    #[test]
    fn below_threshold_holds_previous_output() {
        let mut sim = controller(ControlLaw::Uncontrolled, 1.0, 0.0);
        sim.step(0, &inputs(1.03, 0.004), 0).unwrap();
        let before = read(&sim);
        sim.step(60, &inputs(1.0, 0.001), 0).unwrap();
        sim.step(120, &inputs(0.97, 0.002), 0).unwrap();
        assert!(sim.step_outputs().is_empty());
        assert_eq!(read(&sim), before);
    }

    #[test]
    fn never_evaluated_agent_reads_as_absent() {
        let sim = controller(ControlLaw::Uncontrolled, 1.0, 0.0);
        assert_eq!(read(&sim), (None, None));
    }

    #[test]
    fn missing_input_is_a_no_op() {
        let mut sim = controller(ControlLaw::Uncontrolled, 1.0, 0.0);
        let partial = Inputs::new().with("Agent_0", ATTR_V_PU, "Grid.Bus_0", 1.04);
        sim.step(0, &partial, 0).unwrap();
        assert_eq!(sim.agent("Agent_0"), Some(&AgentState::default()));
    }

    #[test]
    fn step_rejects_unknown_agent() {
        let mut sim = controller(ControlLaw::Uncontrolled, 1.0, 0.0);
        let bad = Inputs::new().with("Agent_7", ATTR_V_PU, "Grid.Bus_0", 1.04);
        assert!(matches!(
            sim.step(0, &bad, 0),
            Err(SimError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn rejected_step_leaves_agents_unchanged() {
        let mut sim = controller(ControlLaw::VoltVar, 1.0, -1500.0);
        sim.step(0, &inputs(1.04, 0.004), 0).unwrap();
        let agent = sim.agent("Agent_0").cloned();
        let outputs = sim.step_outputs().clone();

        let mixed = inputs(1.07, 0.004)
            .with("Agent_99", ATTR_V_PU, "Grid.Bus_1", 1.07)
            .with("Agent_99", ATTR_P_DC, "PV.PV_0", 0.004);
        assert!(matches!(
            sim.step(60, &mixed, 0),
            Err(SimError::UnknownEntity { ref eid }) if eid == "Agent_99"
        ));
        assert_eq!(sim.agent("Agent_0").cloned(), agent);
        assert_eq!(sim.step_outputs(), &outputs);

        let data = sim
            .get_data(&OutputRequest::new().with("Agent_0", &[ATTR_P_MW]))
            .unwrap();
        assert_eq!(data.time, Some(5));
    }

    #[test]
    fn nan_voltage_holds_previous_output() {
        let mut sim = controller(ControlLaw::VoltVar, 1.0, -1500.0);
        sim.step(0, &inputs(1.04, 0.004), 0).unwrap();
        let before = read(&sim);
        let agent = sim.agent("Agent_0").cloned();

        sim.step(60, &inputs(f64::NAN, 0.004), 0).unwrap();
        assert!(sim.step_outputs().is_empty());
        assert_eq!(read(&sim), before);
        assert_eq!(sim.agent("Agent_0").cloned(), agent);
    }

    #[test]
    fn step_before_init_fails() {
        let mut sim = ControllerSim::new(FixedDer {
            p_frac: 1.0,
            q_var: 0.0,
        });
        assert!(sim.step(0, &Inputs::new(), 0).is_err());
    }

    #[test]
    fn get_data_attaches_delay_marker() {
        let mut sim = controller(ControlLaw::Uncontrolled, 1.0, 0.0);
        sim.step(120, &inputs(1.03, 0.004), 0).unwrap();
        let data = sim
            .get_data(&OutputRequest::new().with("Agent_0", &[ATTR_P_MW]))
            .unwrap();
        assert_eq!(data.time, Some(125));

        let empty = sim.get_data(&OutputRequest::new()).unwrap();
        assert_eq!(empty.time, None);
    }
}
