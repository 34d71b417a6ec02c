//! Fixed-order lockstep runner wiring the simulators of one scenario.
//!
//! Every step runs irradiance → PV → controllers → feeder → collector.
//! Controllers read the bus voltages left by the previous feeder step, and
//! their setpoints reach the feeder once their availability time is due.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::config::ScenarioConfig;
use crate::der::DerModel;
use crate::devices::irradiance::{IrradianceSeries, IrradianceSource, SyntheticIrradiance};
use crate::error::{SimError, SimResult};
use crate::sim::clock::Clock;
use crate::sim::collector::{self, Collector};
use crate::sim::controller::{self, ControlLaw, ControllerSettings, ControllerSim};
use crate::sim::feeder::{self, FeederSimConfig, SensitivityFeeder};
use crate::sim::irradiance::{self, IrradianceSim, IrradianceSimConfig};
use crate::sim::kpi::{OVERVOLTAGE_PU, RunSummary};
use crate::sim::protocol::{EntityId, Inputs, OutputData, OutputRequest, Simulator, Time};
use crate::sim::pv_adapter::{self, PvAdapter, PvAdapterConfig};
use crate::sim::types::StepRecord;

const SID_DNI: &str = "DNI";
const SID_PV: &str = "PV";
const SID_CTRL: &str = "Ctrl";
const SID_GRID: &str = "Grid";
const SID_COLLECTOR: &str = "Collector";

fn source(sid: &str, eid: &str) -> String {
    format!("{sid}.{eid}")
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub law: ControlLaw,
    pub agents: usize,
    pub steps: Vec<StepRecord>,
    pub summary: RunSummary,
    pub collector: Collector,
}

/// One scenario's simulators and wiring.
///
/// Generic over the DER model so studies can plug in their own inverter.
pub struct Scenario<D: DerModel> {
    end: Time,
    step_size: Time,
    law: ControlLaw,
    dni_sim: IrradianceSim,
    pv: PvAdapter,
    ctrl: ControllerSim<D>,
    grid: SensitivityFeeder,
    collector: Collector,
    dni_eid: EntityId,
    pv_eids: Vec<EntityId>,
    agents: Vec<EntityId>,
    buses: Vec<EntityId>,
    monitor: EntityId,
    /// Controller results waiting for their availability time.
    pending: VecDeque<(Time, OutputData)>,
}

impl<D: DerModel> Scenario<D> {
    /// Builds and initialises every simulator of `config`.
    ///
    /// # Errors
    ///
    /// Returns the first validation error, or an error from reading the
    /// irradiance CSV or from a simulator's `init`/`create`.
    pub fn new(config: &ScenarioConfig, der: D) -> SimResult<Self> {
        if let Some(err) = config.validate().into_iter().next() {
            return Err(err.into());
        }
        let sim = &config.simulation;
        let start = config.start()?;

        let source_kind = match &config.irradiance.csv {
            Some(path) => IrradianceSource::Recorded(IrradianceSeries::from_csv_path(path, start)?),
            None => IrradianceSource::Synthetic(SyntheticIrradiance::new(
                config.irradiance.synthetic.clone(),
                sim.seed,
            )),
        };
        let mut dni_sim = IrradianceSim::new();
        dni_sim.init(
            SID_DNI,
            IrradianceSimConfig {
                start,
                step_size: sim.step_size,
                source: source_kind,
            },
        )?;
        let dni_eid = first(dni_sim.create(1, irradiance::MODEL)?)?;

        let mut pv = PvAdapter::new();
        pv.init(
            SID_PV,
            PvAdapterConfig {
                start,
                step_size: config.pv.self_steps.then_some(sim.step_size),
                gen_neg: config.pv.gen_neg,
                panel: config.pv.panel.clone(),
            },
        )?;
        let pv_eids = pv.create(config.pv.count, pv_adapter::MODEL)?;

        let mut ctrl = ControllerSim::new(der);
        ctrl.init(
            SID_CTRL,
            ControllerSettings {
                control: config.controller.clone(),
                der: config.der.clone(),
            },
        )?;
        let agents = ctrl.create(sim.agents, controller::MODEL)?;

        let mut grid = SensitivityFeeder::new();
        grid.init(
            SID_GRID,
            FeederSimConfig {
                feeder: config.feeder.clone(),
                step_size: sim.step_size,
            },
        )?;
        let buses = grid.create(sim.agents, feeder::MODEL)?;

        let mut collector = Collector::new();
        collector.init(SID_COLLECTOR, ())?;
        let monitor = first(collector.create(1, collector::MODEL)?)?;

        info!(
            law = config.controller.law.name(),
            agents = agents.len(),
            pv = pv_eids.len(),
            end = sim.end,
            step_size = sim.step_size,
            "scenario built"
        );

        Ok(Self {
            end: sim.end,
            step_size: sim.step_size,
            law: config.controller.law,
            dni_sim,
            pv,
            ctrl,
            grid,
            collector,
            dni_eid,
            pv_eids,
            agents,
            buses,
            monitor,
            pending: VecDeque::new(),
        })
    }

    /// PV entity feeding agent `index`.
    fn pv_for(&self, index: usize) -> &str {
        &self.pv_eids[index % self.pv_eids.len()]
    }

    /// Executes one lockstep at time `t`.
    ///
    /// # Errors
    ///
    /// Propagates any simulator error.
    pub fn step(&mut self, t: Time) -> SimResult<StepRecord> {
        // irradiance
        self.dni_sim.step(t, &Inputs::new(), self.end)?;
        let dni = self
            .dni_sim
            .get_data(&OutputRequest::new().with(&self.dni_eid, &[irradiance::ATTR_DNI]))?
            .value(&self.dni_eid, irradiance::ATTR_DNI)
            .unwrap_or(0.0);

        // PV
        let dni_src = source(SID_DNI, &self.dni_eid);
        let mut pv_inputs = Inputs::new();
        let mut pv_request = OutputRequest::new();
        for eid in &self.pv_eids {
            pv_inputs.insert(eid, pv_adapter::ATTR_DNI, &dni_src, dni);
            pv_request = pv_request.with(eid, &[pv_adapter::ATTR_P_GEN]);
        }
        self.pv.step(t, &pv_inputs, self.end)?;
        let p_gen = self.pv.get_data(&pv_request)?;

        // controllers, on the voltages of the previous feeder step
        let mut v_request = OutputRequest::new();
        for bus in &self.buses {
            v_request = v_request.with(bus, &[feeder::ATTR_V_PU]);
        }
        let voltages = self.grid.get_data(&v_request)?;

        let mut ctrl_inputs = Inputs::new();
        let mut ctrl_request = OutputRequest::new();
        for (i, (agent, bus)) in self.agents.iter().zip(&self.buses).enumerate() {
            if let Some(v) = voltages.value(bus, feeder::ATTR_V_PU) {
                ctrl_inputs.insert(agent, controller::ATTR_V_PU, &source(SID_GRID, bus), v);
            }
            let pv_eid = self.pv_for(i);
            if let Some(p) = p_gen.value(pv_eid, pv_adapter::ATTR_P_GEN) {
                ctrl_inputs.insert(agent, controller::ATTR_P_DC, &source(SID_PV, pv_eid), p);
            }
            ctrl_request =
                ctrl_request.with(agent, &[controller::ATTR_Q_MVAR, controller::ATTR_P_MW]);
        }
        self.ctrl.step(t, &ctrl_inputs, self.end)?;
        let evaluated_agents = self.ctrl.step_outputs().len();
        let setpoints = self.ctrl.get_data(&ctrl_request)?;
        self.pending.push_back((setpoints.time.unwrap_or(t), setpoints));

        // feeder, with every setpoint that is due
        let mut grid_inputs = Inputs::new();
        while self.pending.front().is_some_and(|(due, _)| *due <= t) {
            let Some((_, data)) = self.pending.pop_front() else {
                break;
            };
            for (agent, bus) in self.agents.iter().zip(&self.buses) {
                let src = source(SID_CTRL, agent);
                if let Some(p) = data.value(agent, controller::ATTR_P_MW) {
                    grid_inputs.insert(bus, feeder::ATTR_P_MW, &src, p);
                }
                if let Some(q) = data.value(agent, controller::ATTR_Q_MVAR) {
                    grid_inputs.insert(bus, feeder::ATTR_Q_MVAR, &src, q);
                }
            }
        }
        self.grid.step(t, &grid_inputs, self.end)?;

        // collector
        let mut bus_request = OutputRequest::new();
        for bus in &self.buses {
            bus_request = bus_request.with(
                bus,
                &[feeder::ATTR_V_PU, feeder::ATTR_P_MW, feeder::ATTR_Q_MVAR],
            );
        }
        let bus_data = self.grid.get_data(&bus_request)?;

        let mut record = StepRecord {
            time: t,
            dni,
            p_gen_mw: 0.0,
            evaluated_agents,
            p_injected_mw: 0.0,
            q_injected_mvar: 0.0,
            v_min_pu: f64::INFINITY,
            v_max_pu: f64::NEG_INFINITY,
            overvoltage_buses: 0,
        };
        let mut monitor_inputs = Inputs::new();
        let monitor = self.monitor.as_str();
        monitor_inputs.insert(monitor, irradiance::ATTR_DNI, &dni_src, dni);
        for eid in &self.pv_eids {
            if let Some(p) = p_gen.value(eid, pv_adapter::ATTR_P_GEN) {
                record.p_gen_mw += p;
                monitor_inputs.insert(monitor, pv_adapter::ATTR_P_GEN, &source(SID_PV, eid), p);
            }
        }
        for agent in &self.agents {
            if let Some(p_dc) = ctrl_inputs.first(agent, controller::ATTR_P_DC) {
                monitor_inputs.insert(
                    monitor,
                    controller::ATTR_P_DC,
                    &source(SID_CTRL, agent),
                    p_dc,
                );
            }
        }
        for bus in &self.buses {
            let src = source(SID_GRID, bus);
            for attr in [feeder::ATTR_V_PU, feeder::ATTR_P_MW, feeder::ATTR_Q_MVAR] {
                if let Some(value) = bus_data.value(bus, attr) {
                    monitor_inputs.insert(monitor, attr, &src, value);
                }
            }
            if let Some(v) = bus_data.value(bus, feeder::ATTR_V_PU) {
                record.v_min_pu = record.v_min_pu.min(v);
                record.v_max_pu = record.v_max_pu.max(v);
                if v > OVERVOLTAGE_PU {
                    record.overvoltage_buses += 1;
                }
            }
            record.p_injected_mw += bus_data.value(bus, feeder::ATTR_P_MW).unwrap_or(0.0);
            record.q_injected_mvar += bus_data.value(bus, feeder::ATTR_Q_MVAR).unwrap_or(0.0);
        }
        self.collector.step(t, &monitor_inputs, self.end)?;

        debug!(
            time = t,
            dni,
            evaluated_agents,
            v_max_pu = record.v_max_pu,
            "step complete"
        );
        Ok(record)
    }

    /// Runs every step of the horizon and summarises the run.
    ///
    /// # Errors
    ///
    /// Propagates the first simulator error.
    pub fn run(mut self) -> SimResult<RunReport> {
        let mut clock = Clock::new(self.end, self.step_size);
        let mut steps = Vec::with_capacity(usize::try_from(clock.steps()).unwrap_or(0));
        while let Some(t) = clock.tick() {
            steps.push(self.step(t)?);
        }

        let dt_hours = self.step_size as f64 / 3600.0;
        let summary = RunSummary::from_collector(&self.collector, dt_hours);
        info!(
            law = self.law.name(),
            steps = steps.len(),
            peak_voltage_pu = summary.peak_voltage_pu,
            overvoltage_samples = summary.overvoltage_samples,
            curtailment_pct = summary.curtailment_pct,
            "run finished"
        );
        Ok(RunReport {
            law: self.law,
            agents: self.agents.len(),
            steps,
            summary,
            collector: self.collector,
        })
    }
}

fn first(ids: Vec<EntityId>) -> SimResult<EntityId> {
    ids.into_iter().next().ok_or_else(|| SimError::InvalidInput {
        what: "simulator created no entity".to_string(),
    })
}

/// Builds `config` with `der` and runs it to the end.
///
/// # Errors
///
/// See [`Scenario::new`] and [`Scenario::run`].
pub fn run_scenario<D: DerModel>(config: &ScenarioConfig, der: D) -> SimResult<RunReport> {
    Scenario::new(config, der)?.run()
}
