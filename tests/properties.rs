//! Property tests for the control laws and the PV modifier.

mod common;

use chrono::NaiveDateTime;
use proptest::prelude::*;

use common::{DialDer, StubDer};
use pv_control_sim::devices::irradiance::DATE_FORMAT;
use pv_control_sim::devices::pv_panel::PanelParams;
use pv_control_sim::sim::controller::ControlLaw;
use pv_control_sim::sim::protocol::{Inputs, Simulator};
use pv_control_sim::sim::pv_adapter::{
    ATTR_MODIFIER, MODEL, PvAdapter, PvAdapterConfig, relax_modifier,
};

fn adapter() -> PvAdapter {
    let mut pv = PvAdapter::new();
    pv.init(
        "PV",
        PvAdapterConfig {
            start: NaiveDateTime::parse_from_str("2016-01-01 11:00:00", DATE_FORMAT).unwrap(),
            step_size: None,
            gen_neg: false,
            panel: PanelParams::default(),
        },
    )
    .unwrap();
    pv.create(1, MODEL).unwrap();
    pv
}

proptest! {
    #[test]
    fn stale_hold_keeps_last_output(
        law_idx in 0usize..4,
        low_voltages in prop::collection::vec(0.9_f64..=1.0, 1..20),
    ) {
        let law = ControlLaw::ALL[law_idx];
        let mut sim = common::controller(law, StubDer { p_frac: 0.7, q_var: -900.0 }, 1);
        sim.step(0, &common::agent_inputs("Agent_0", 1.06, 0.005), 0).unwrap();
        let held = common::setpoint(&sim, "Agent_0");
        let state = sim.agent("Agent_0").cloned();

        for (i, v) in low_voltages.into_iter().enumerate() {
            let t = 60 * (i as u64 + 1);
            sim.step(t, &common::agent_inputs("Agent_0", v, 0.005), 0).unwrap();
            prop_assert_eq!(common::setpoint(&sim, "Agent_0"), held);
            prop_assert_eq!(sim.agent("Agent_0").cloned(), state.clone());
        }
    }

    #[test]
    fn volt_var_error_decays_geometrically(
        q_new_var in -4500.0_f64..4500.0,
        steps in 1usize..30,
    ) {
        let mut sim = common::controller(
            ControlLaw::VoltVar,
            StubDer { p_frac: 1.0, q_var: q_new_var },
            1,
        );
        let q_new = q_new_var / 1e6;
        for t in 1..=steps {
            sim.step(60 * t as u64, &common::agent_inputs("Agent_0", 1.04, 0.004), 0).unwrap();
            let q = common::setpoint(&sim, "Agent_0").0.unwrap();
            let expected = 0.8_f64.powi(t as i32) * q_new.abs();
            prop_assert!(((q - q_new).abs() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn volt_watt_never_exceeds_dc_power(
        seq in prop::collection::vec((1.0001_f64..1.1, 0.0_f64..0.01, 0.0_f64..1.0), 1..40),
    ) {
        let der = DialDer::default();
        let dial = der.p_frac.clone();
        let mut sim = common::controller(ControlLaw::VoltWatt, der, 1);
        for (i, (v, p_dc, frac)) in seq.into_iter().enumerate() {
            dial.set(frac);
            sim.step(60 * i as u64, &common::agent_inputs("Agent_0", v, p_dc), 0).unwrap();
            let p = common::setpoint(&sim, "Agent_0").1.unwrap();
            prop_assert!(p <= p_dc + 1e-15, "p={} p_dc={}", p, p_dc);
        }
    }

    #[test]
    fn volt_watt_ramp_is_asymmetric(
        p_dc in 0.001_f64..0.01,
        first_frac in 0.0_f64..=1.0,
        second_frac in 0.0_f64..=1.0,
    ) {
        let der = DialDer::default();
        let dial = der.p_frac.clone();
        let mut sim = common::controller(ControlLaw::VoltWatt, der, 1);
        dial.set(first_frac);
        sim.step(0, &common::agent_inputs("Agent_0", 1.05, p_dc), 0).unwrap();
        let prev = sim.agent("Agent_0").and_then(|a| a.p_ramped).unwrap();

        dial.set(second_frac);
        sim.step(60, &common::agent_inputs("Agent_0", 1.05, p_dc), 0).unwrap();
        let next = sim.agent("Agent_0").and_then(|a| a.p_ramped).unwrap();

        let p_der = p_dc * second_frac;
        if p_der < 0.999 * p_dc {
            prop_assert!((next - prev).abs() <= 0.05 * (p_der - prev).abs() + 1e-15);
        } else {
            prop_assert!((next - prev).abs() <= 0.5 * (p_dc - prev).abs() + 1e-15);
        }
    }

    #[test]
    fn relaxation_moves_towards_one(m in 0.01_f64..=1.0, dt in 0.0_f64..100_000.0) {
        let relaxed = relax_modifier(m, dt);
        prop_assert!(relaxed >= m - 1e-15);
        prop_assert!(relaxed <= 1.0 + 1e-15);
        let f = (-dt / 900.0).exp();
        prop_assert!((relaxed - (1.0 - f + f * m)).abs() < 1e-15);
    }

    #[test]
    fn adapter_relaxes_commanded_modifier(command in 0.05_f64..=1.0, dt in 1u64..20_000) {
        let mut pv = adapter();
        let cmd = Inputs::new().with("PV_0", ATTR_MODIFIER, "Ctrl.Agent_0", command);
        pv.step(0, &cmd, 0).unwrap();
        // relaxation over the 1 s since the initial -1 s, then the command
        let after_cmd = relax_modifier(1.0, 1.0) * command;
        prop_assert!((pv.modifier("PV_0").unwrap() - after_cmd).abs() < 1e-12);

        let touch = Inputs::new().with("PV_0", "dni", "DNI.Data_0", 500.0);
        pv.step(dt, &touch, 0).unwrap();
        let expected = relax_modifier(after_cmd, dt as f64);
        prop_assert!((pv.modifier("PV_0").unwrap() - expected).abs() < 1e-12);

        // re-stepping at the same time does not relax again
        pv.step(dt, &touch, 0).unwrap();
        prop_assert!((pv.modifier("PV_0").unwrap() - expected).abs() < 1e-12);
    }
}

#[test]
fn relaxation_limit_is_one() {
    assert!((relax_modifier(0.1, 1e7) - 1.0).abs() < 1e-12);
    assert_eq!(relax_modifier(0.3, 0.0), 0.3);
}
