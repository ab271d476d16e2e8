//! End-to-end runs from a text description to recorded trajectories.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use approx::assert_relative_eq;
use phs_core::data::Window;
use phs_core::{dsl, GradientScheme, Method, PhsCore, PhsError, Simulation, SimulationConfig};

/// Series RLC driven by a voltage source, with a hardening capacitor.
const DUFFING_RLC: &str = "\
.label rlc
.const R 0.5
.storage q = q^2/2 + q^4/4
.storage phi = phi^2/2
.dissip i = R*i
.port vin iin
.connect q phi
.connect i phi
.connect phi vin
";

fn scratch_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("phs_core_{}_{}_{}", prefix, std::process::id(), nanos));
    dir
}

fn energy(x: &[f64]) -> f64 {
    let (q, phi) = (x[0], x[1]);
    q * q / 2.0 + q.powi(4) / 4.0 + phi * phi / 2.0
}

fn run(config: SimulationConfig, nt: usize) -> Simulation {
    let core = PhsCore::from_ast(&dsl::parse(DUFFING_RLC).unwrap()).unwrap();
    let method = Method::new(&core, &config).unwrap();
    let fs = config.fs;
    let u: Vec<Vec<f64>> = (0..nt)
        .map(|n| vec![(2.0 * std::f64::consts::PI * 5.0 * n as f64 / fs).sin()])
        .collect();

    let mut sim = Simulation::new(&method).unwrap();
    sim.init(Some(&u), None, Some(&[0.2, 0.0]), None).unwrap();
    let summary = sim.process().unwrap();
    assert_eq!(summary.steps, nt);
    assert_eq!(summary.nonconverged_steps, 0);
    sim
}

#[test]
fn power_balance_holds_at_every_step() {
    let dir = scratch_dir("power_balance_holds_at_every_step");
    let config = SimulationConfig::new()
        .with_sample_rate(1000.0)
        .with_tolerance(1e-12)
        .with_max_iterations(50)
        .with_path(&dir);
    let sim = run(config, 500);
    let data = sim.data();

    let dte = data.dt_e(None).unwrap();
    let pd = data.pd(None).unwrap();
    let ps = data.ps(None).unwrap();
    assert_eq!(dte.len(), 500);
    for ((dte, pd), ps) in dte.iter().zip(&pd).zip(&ps) {
        assert!(*pd >= 0.0);
        assert_relative_eq!(*dte, ps - pd, epsilon = 1e-8);
    }
}

#[test]
fn discrete_gradient_tracks_stored_energy() {
    let dir = scratch_dir("discrete_gradient_tracks_stored_energy");
    let config = SimulationConfig::new()
        .with_sample_rate(1000.0)
        .with_tolerance(1e-12)
        .with_max_iterations(50)
        .with_path(&dir);
    let sim = run(config, 200);
    let data = sim.data();

    let x = data.read("x", None).unwrap();
    let dte = data.dt_e(None).unwrap();
    for n in 0..x.len() - 1 {
        let de = energy(&x[n + 1]) - energy(&x[n]);
        assert_relative_eq!(de, dte[n] / 1000.0, epsilon = 1e-10);
    }
}

#[test]
fn windowed_reads_follow_load_options() {
    let dir = scratch_dir("windowed_reads_follow_load_options");
    let config = SimulationConfig::new()
        .with_sample_rate(1000.0)
        .with_gradient(GradientScheme::Trapezoidal)
        .with_tolerance(1e-12)
        .with_max_iterations(50)
        .with_path(&dir);
    let sim = run(config, 100);
    let data = sim.data();

    let window = Window::all().with_range(10, Some(50)).with_decim(10);
    let t = data.t(Some(window)).unwrap();
    assert_eq!(t, vec![0.01, 0.02, 0.03, 0.04]);
    let x = data.read("x", Some(window)).unwrap();
    let all = data.read("x", None).unwrap();
    assert_eq!(x, vec![all[10].clone(), all[20].clone(), all[30].clone(), all[40].clone()]);
}

#[test]
fn mismatched_inputs_are_rejected() {
    let dir = scratch_dir("mismatched_inputs_are_rejected");
    let config = SimulationConfig::new().with_path(&dir);
    let core = PhsCore::from_ast(&dsl::parse(DUFFING_RLC).unwrap()).unwrap();
    let method = Method::new(&core, &config).unwrap();
    let mut sim = Simulation::new(&method).unwrap();

    let too_wide = vec![vec![1.0, 2.0]; 3];
    assert!(matches!(
        sim.init(Some(&too_wide), None, None, None),
        Err(PhsError::DimensionError { .. })
    ));
}
