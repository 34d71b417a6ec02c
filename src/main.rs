//! PV control co-simulation entry point: CLI wiring and scenario selection.

use std::io;
use std::path::{Path, PathBuf};
use std::process;

use tracing_subscriber::EnvFilter;

use pv_control_sim::config::ScenarioConfig;
use pv_control_sim::der::ReferenceDer;
use pv_control_sim::runner::run_scenario;
use pv_control_sim::sim::controller::ControlLaw;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    law: Option<ControlLaw>,
    agents: Option<usize>,
    irradiance: Option<PathBuf>,
    seed_override: Option<u64>,
    quiet: bool,
    print_results: bool,
}

fn print_help() {
    eprintln!("pv-control-sim: PV inverter local-control co-simulation");
    eprintln!();
    eprintln!("Usage: pv-control-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --law <name>             Override the control law");
    eprintln!("  --agents <n>             Override the number of agents");
    eprintln!("  --irradiance <path>      Read DNI from a date,dni CSV file");
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --quiet                  Print the summary only");
    eprintln!("  --print-results          Dump every collected series");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the volt_var preset is used.");
    eprintln!("Set RUST_LOG (e.g. RUST_LOG=debug) for simulator logs.");
}

/// Returns the value following `args[*i]`, or exits with an error.
fn value<'a>(args: &'a [String], i: &mut usize, what: &str) -> &'a str {
    *i += 1;
    match args.get(*i) {
        Some(v) => v.as_str(),
        None => {
            eprintln!("error: {} requires {what}", args[*i - 1]);
            process::exit(1);
        }
    }
}

fn parse<T: std::str::FromStr>(flag: &str, raw: &str, kind: &str) -> T {
    raw.parse::<T>().unwrap_or_else(|_| {
        eprintln!("error: {flag} value \"{raw}\" is not a valid {kind}");
        process::exit(1);
    })
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        law: None,
        agents: None,
        irradiance: None,
        seed_override: None,
        quiet: false,
        print_results: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                cli.scenario_path = Some(value(&args, &mut i, "a path argument").to_string());
            }
            "--preset" => {
                cli.preset = Some(value(&args, &mut i, "a name argument").to_string());
            }
            "--law" => {
                let name = value(&args, &mut i, "a law name");
                match ControlLaw::from_name(name) {
                    Some(law) => cli.law = Some(law),
                    None => {
                        eprintln!(
                            "error: unknown law \"{name}\", available: {}",
                            ScenarioConfig::PRESETS.join(", ")
                        );
                        process::exit(1);
                    }
                }
            }
            "--agents" => {
                let raw = value(&args, &mut i, "a count argument");
                cli.agents = Some(parse("--agents", raw, "count"));
            }
            "--irradiance" => {
                cli.irradiance = Some(PathBuf::from(value(&args, &mut i, "a path argument")));
            }
            "--seed" => {
                let raw = value(&args, &mut i, "a u64 argument");
                cli.seed_override = Some(parse("--seed", raw, "u64"));
            }
            "--quiet" => cli.quiet = true,
            "--print-results" => cli.print_results = true,
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = parse_args();

    // --scenario takes priority, then --preset, then the default
    let loaded = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    let mut scenario = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(law) = cli.law {
        scenario.controller.law = law;
    }
    if let Some(agents) = cli.agents {
        scenario.simulation.agents = agents;
    }
    if let Some(path) = cli.irradiance {
        scenario.irradiance.csv = Some(path);
    }
    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let report = match run_scenario(&scenario, ReferenceDer) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    if !cli.quiet {
        for step in &report.steps {
            println!("{step}");
        }
        println!();
    }
    if cli.print_results {
        print!("{}", report.collector);
        println!();
    }

    println!("Law: {}  Agents: {}", report.law.name(), report.agents);
    println!("{}", report.summary);
}
