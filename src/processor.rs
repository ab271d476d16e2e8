//! Sample-by-sample processing through one input and one output port.
//!
//! Wraps a [`NumericalCore`] so audio frontends can push a mono signal into
//! the input of one port and read the output of another. Other inputs and
//! all parameters are held at their last set values.

use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::dsl;
use crate::error::{PhsError, Result};
use crate::method::Method;
use crate::model::PhsCore;
use crate::numerics::NumericalCore;

/// Streaming processor over a compiled method.
#[derive(Debug, Clone)]
pub struct PortProcessor {
    core: NumericalCore,
    input: usize,
    output: usize,
    u: Vec<f64>,
    p: Vec<f64>,
    steps: usize,
    nonconverged: usize,
}

impl PortProcessor {
    /// Process through port `input` (signal into `u[input]`) and read
    /// `y[output]`.
    pub fn new(core: NumericalCore, input: usize, output: usize) -> Result<Self> {
        let ny = core.ny();
        if input >= ny {
            return Err(PhsError::InvalidSimulationParam {
                message: format!("input port {} out of range ({} ports)", input, ny),
            });
        }
        if output >= ny {
            return Err(PhsError::InvalidSimulationParam {
                message: format!("output port {} out of range ({} ports)", output, ny),
            });
        }
        let np = core.np();
        Ok(Self {
            core,
            input,
            output,
            u: vec![0.0; ny],
            p: vec![0.0; np],
            steps: 0,
            nonconverged: 0,
        })
    }

    /// Parse a description, derive its method and compile it.
    pub fn from_source(source: &str, config: &SimulationConfig, input: usize, output: usize) -> Result<Self> {
        let ast = dsl::parse(source)?;
        let core = PhsCore::from_ast(&ast)?;
        let method = Method::new(&core, config)?;
        let runtime = NumericalCore::new(&method)?;
        info!(
            label = method.label(),
            fs = config.fs,
            nx = method.nx(),
            ny = method.ny(),
            "processor ready"
        );
        Self::new(runtime, input, output)
    }

    pub fn core(&self) -> &NumericalCore {
        &self.core
    }

    /// Set the inputs of every port; the streamed port is overwritten on
    /// each sample.
    pub fn set_inputs(&mut self, u: &[f64]) -> Result<()> {
        if u.len() != self.u.len() {
            return Err(PhsError::dimension("u", self.u.len(), u.len()));
        }
        self.u.copy_from_slice(u);
        Ok(())
    }

    /// Set the runtime parameters.
    pub fn set_params(&mut self, p: &[f64]) -> Result<()> {
        if p.len() != self.p.len() {
            return Err(PhsError::dimension("p", self.p.len(), p.len()));
        }
        self.p.copy_from_slice(p);
        Ok(())
    }

    /// Advance one sample.
    pub fn process_sample(&mut self, sample: f64) -> Result<f64> {
        self.u[self.input] = sample;
        let report = self.core.update(Some(self.u.as_slice()), Some(self.p.as_slice()))?;
        self.steps += 1;
        if !report.converged {
            self.nonconverged += 1;
        }
        let y = self.core.value("y")?;
        Ok(y.as_slice().get(self.output).copied().unwrap_or(0.0))
    }

    /// Process `input` into `output` (the shorter length wins).
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.process_sample(f64::from(*x))? as f32;
        }
        Ok(())
    }

    /// Samples processed so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Samples whose implicit solve stopped on the iteration cap.
    pub fn nonconverged_steps(&self) -> usize {
        self.nonconverged
    }

    /// Set the state and clear the counters.
    pub fn reset(&mut self, x0: &[f64]) -> Result<()> {
        self.core.init_state(x0)?;
        debug!(steps = self.steps, nonconverged = self.nonconverged, "processor reset");
        self.steps = 0;
        self.nonconverged = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Series RC driven by a voltage source; the resistor is voltage
    /// controlled and the port output is the loop current.
    const RC: &str = "\
.const C 1m
.const R 1k
.storage q = q^2/(2*C)
.dissip vr = vr/R
.port vin iin
.connect q vr
.connect vr vin
";

    #[test]
    fn test_port_range_checked() {
        let config = SimulationConfig::new();
        assert!(PortProcessor::from_source(RC, &config, 0, 0).is_ok());
        assert!(matches!(
            PortProcessor::from_source(RC, &config, 1, 0),
            Err(PhsError::InvalidSimulationParam { .. })
        ));
    }

    #[test]
    fn test_step_response_settles() {
        let config = SimulationConfig::new().with_sample_rate(1000.0);
        let mut proc = PortProcessor::from_source(RC, &config, 0, 0).unwrap();
        let mut last = 0.0;
        for _ in 0..20_000 {
            last = proc.process_sample(1.0).unwrap();
        }
        // the capacitor charges to the source voltage and the current dies out
        assert_relative_eq!(last, 0.0, epsilon = 1e-6);
        let q = proc.core().get("x").unwrap()[0];
        assert_relative_eq!(q, 1e-3, epsilon = 1e-8);
        assert_eq!(proc.steps(), 20_000);
        assert_eq!(proc.nonconverged_steps(), 0);
    }

    #[test]
    fn test_set_inputs_keeps_streamed_port() {
        let config = SimulationConfig::new().with_sample_rate(1000.0);
        let mut a = PortProcessor::from_source(RC, &config, 0, 0).unwrap();
        let mut b = a.clone();
        assert!(matches!(a.set_inputs(&[1.0, 2.0]), Err(PhsError::DimensionError { .. })));
        a.set_inputs(&[5.0]).unwrap();
        assert_eq!(a.process_sample(0.5).unwrap(), b.process_sample(0.5).unwrap());
    }

    #[test]
    fn test_block_processing_matches_samples() {
        let config = SimulationConfig::new().with_sample_rate(1000.0);
        let mut a = PortProcessor::from_source(RC, &config, 0, 0).unwrap();
        let mut b = a.clone();
        let input: Vec<f32> = (0..64).map(|i| (i as f32 * 0.1).sin()).collect();
        let mut out = vec![0.0f32; 64];
        a.process_block(&input, &mut out).unwrap();
        for (x, y) in input.iter().zip(&out) {
            assert_eq!(b.process_sample(f64::from(*x)).unwrap() as f32, *y);
        }
    }
}
