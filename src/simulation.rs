//! File-backed simulation runs.
//!
//! A [`Simulation`] reads its inputs from a [`Data`] folder, runs the
//! numerical core over every step and records the trajectories back into
//! the same folder.

use tracing::{info, instrument};

use crate::data::{Data, RowWriter, SequenceIter, Window};
use crate::error::{PhsError, Result};
use crate::method::Method;
use crate::model::Dims;
use crate::numerics::NumericalCore;

/// Group names recorded at each step.
const RECORDED_GROUPS: [&str; 3] = ["x", "dx", "w"];

/// Expression names recorded at each step.
const RECORDED_EXPRS: [&str; 3] = ["y", "dxH", "z"];

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: usize,
    /// Steps whose implicit solve stopped on the iteration cap.
    pub nonconverged_steps: usize,
    /// Largest iteration count seen in any step.
    pub max_iterations: usize,
}

/// A method compiled and attached to a data folder.
#[derive(Debug)]
pub struct Simulation {
    label: String,
    dims: Dims,
    core: NumericalCore,
    data: Data,
}

impl Simulation {
    /// Compile `method` and attach to the data folder from its configuration.
    pub fn new(method: &Method) -> Result<Self> {
        let data = Data::open(method.config())?;
        Self::with_data(method, data)
    }

    pub fn with_data(method: &Method, data: Data) -> Result<Self> {
        Ok(Self {
            label: method.label().to_string(),
            dims: method.dims(),
            core: NumericalCore::new(method)?,
            data,
        })
    }

    pub fn core(&self) -> &NumericalCore {
        &self.core
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Write inputs, parameters and the initial state; see
    /// [`Data::init_data`].
    pub fn init(
        &mut self,
        sequ: Option<&[Vec<f64>]>,
        seqp: Option<&[Vec<f64>]>,
        x0: Option<&[f64]>,
        nt: Option<usize>,
    ) -> Result<usize> {
        self.data.init_data(self.dims, sequ, seqp, x0, nt)
    }

    /// Run every step and record the trajectories.
    ///
    /// Row `n` of `x` holds the state at `t = n / fs`, before step `n`;
    /// the other records hold the quantities computed during step `n`.
    #[instrument(skip(self), fields(label = %self.label))]
    pub fn process(&mut self) -> Result<RunSummary> {
        let nt = self.data.nt().ok_or_else(|| PhsError::InvalidSimulationParam {
            message: "simulation data not initialized".to_string(),
        })?;
        let x0 = self.data.x0()?;
        self.core.init_state(&x0)?;

        let mut seq_u = self.data.seq("u", Some(Window::all())).iter()?;
        let mut seq_p = self.data.seq("p", Some(Window::all())).iter()?;

        let store = self.data.store();
        let mut groups = RECORDED_GROUPS
            .iter()
            .map(|name| store.writer(name))
            .collect::<Result<Vec<RowWriter>>>()?;
        let mut exprs = RECORDED_EXPRS
            .iter()
            .map(|name| store.writer(name))
            .collect::<Result<Vec<RowWriter>>>()?;

        info!(nt, fs = self.core.config().fs, "simulation started");

        let mut summary = RunSummary::default();
        for n in 0..nt {
            let u = next_row(&mut seq_u, "u", n)?;
            let p = next_row(&mut seq_p, "p", n)?;

            let x = self.core.get("x")?;
            let report = self.core.update(Some(u.as_slice()), Some(p.as_slice()))?;
            summary.steps += 1;
            summary.max_iterations = summary.max_iterations.max(report.max_iterations());
            if !report.converged {
                summary.nonconverged_steps += 1;
            }

            for (name, writer) in RECORDED_GROUPS.iter().zip(groups.iter_mut()) {
                if *name == "x" {
                    writer.write_row(&x)?;
                } else {
                    writer.write_row(&self.core.get(name)?)?;
                }
            }
            for (name, writer) in RECORDED_EXPRS.iter().zip(exprs.iter_mut()) {
                writer.write_row(self.core.value(name)?.as_slice())?;
            }
        }

        for writer in groups.into_iter().chain(exprs) {
            writer.finish()?;
        }

        info!(
            steps = summary.steps,
            nonconverged = summary.nonconverged_steps,
            max_iterations = summary.max_iterations,
            "simulation finished"
        );
        Ok(summary)
    }
}

fn next_row(seq: &mut SequenceIter, name: &str, n: usize) -> Result<Vec<f64>> {
    seq.next().transpose()?.ok_or_else(|| PhsError::InvalidSimulationParam {
        message: format!("sequence '{}' ended at step {}", name, n),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::model::PhsCore;
    use approx::assert_relative_eq;

    fn lc(config: &SimulationConfig) -> Method {
        let ast = crate::dsl::parse(".storage q = q^2/2\n.storage phi = phi^2/2\n.connect q phi\n").unwrap();
        Method::new(&PhsCore::from_ast(&ast).unwrap(), config).unwrap()
    }

    #[test]
    fn test_requires_init() {
        let dir = crate::data::scratch_dir("test_requires_init");
        let config = SimulationConfig::new().with_path(&dir);
        let mut sim = Simulation::new(&lc(&config)).unwrap();
        assert!(matches!(sim.process(), Err(PhsError::InvalidSimulationParam { .. })));
    }

    #[test]
    fn test_records_every_step() {
        let dir = crate::data::scratch_dir("test_records_every_step");
        let config = SimulationConfig::new().with_sample_rate(100.0).with_path(&dir);
        let mut sim = Simulation::new(&lc(&config)).unwrap();
        sim.init(None, None, Some(&[1.0, 0.0]), Some(50)).unwrap();
        let summary = sim.process().unwrap();
        assert_eq!(summary.steps, 50);
        assert_eq!(summary.nonconverged_steps, 0);

        let x = sim.data().read("x", None).unwrap();
        assert_eq!(x.len(), 50);
        assert_eq!(x[0], vec![1.0, 0.0]);
        assert_eq!(sim.data().read("y", None).unwrap(), vec![Vec::<f64>::new(); 50]);

        // lossless oscillator: the recorded energy derivative vanishes
        for dte in sim.data().dt_e(None).unwrap() {
            assert_relative_eq!(dte, 0.0, epsilon = 1e-10);
        }
    }
}
