//! WASM bindings.
//!
//! JavaScript-friendly wrapper around [`PortProcessor`] for use in an
//! AudioWorklet.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { WasmPhsSim } from 'phs_core';
//!
//! await init();
//!
//! const model = `
//!   .const C 1u
//!   .const R 10k
//!   .storage q = q^2/(2*C)
//!   .dissip vr = vr/R
//!   .port vin iin
//!   .connect q vr
//!   .connect vr vin
//! `;
//!
//! const sim = new WasmPhsSim(model, 48000);
//!
//! // In AudioWorkletProcessor.process():
//! sim.process_block(inputs[0][0], outputs[0][0]);
//! ```

use wasm_bindgen::prelude::*;

use crate::config::{SimulationConfig, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use crate::error::PhsError;
use crate::processor::PortProcessor;

/// Install the panic hook so panics show up in the browser console.
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

fn js_error(e: PhsError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Port-Hamiltonian model driven sample by sample from JavaScript.
///
/// The signal enters port 0 and the output of port 0 is returned, unless
/// other ports are chosen with [`WasmPhsSim::with_config`].
#[wasm_bindgen]
pub struct WasmPhsSim {
    processor: PortProcessor,
    sample_rate: f64,
}

#[wasm_bindgen]
impl WasmPhsSim {
    /// Compile a model description at the given sample rate.
    #[wasm_bindgen(constructor)]
    pub fn new(model: &str, sample_rate: f64) -> Result<WasmPhsSim, JsValue> {
        Self::with_config(model, sample_rate, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, 0, 0)
    }

    /// Compile with explicit solver settings and port routing.
    #[wasm_bindgen]
    pub fn with_config(
        model: &str,
        sample_rate: f64,
        max_iterations: usize,
        tolerance: f64,
        input_port: usize,
        output_port: usize,
    ) -> Result<WasmPhsSim, JsValue> {
        let config = SimulationConfig::new()
            .with_sample_rate(sample_rate)
            .with_max_iterations(max_iterations)
            .with_tolerance(tolerance);
        let processor = PortProcessor::from_source(model, &config, input_port, output_port).map_err(js_error)?;
        Ok(WasmPhsSim { processor, sample_rate })
    }

    /// Process a block in place of `output`.
    ///
    /// A failing step writes silence for the rest of the block.
    #[wasm_bindgen]
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let start = self.processor.steps();
        if self.processor.process_block(input, output).is_err() {
            let done = self.processor.steps() - start;
            for y in output.iter_mut().skip(done) {
                *y = 0.0;
            }
        }
    }

    /// Process a block into a new array.
    #[wasm_bindgen]
    pub fn process_block_alloc(&mut self, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0; input.len()];
        self.process_block(input, &mut output);
        output
    }

    #[wasm_bindgen(getter)]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current state vector.
    #[wasm_bindgen]
    pub fn state(&self) -> Vec<f64> {
        self.processor.core().get("x").unwrap_or_default()
    }

    /// Set the inputs of every port; the streamed port is overwritten on
    /// each sample.
    #[wasm_bindgen]
    pub fn set_inputs(&mut self, inputs: &[f64]) -> Result<(), JsValue> {
        self.processor.set_inputs(inputs).map_err(js_error)
    }

    /// Set the runtime parameters.
    #[wasm_bindgen]
    pub fn set_params(&mut self, params: &[f64]) -> Result<(), JsValue> {
        self.processor.set_params(params).map_err(js_error)
    }

    /// Number of samples whose implicit solve hit the iteration cap.
    #[wasm_bindgen(getter)]
    pub fn nonconverged_steps(&self) -> usize {
        self.processor.nonconverged_steps()
    }
}

/// Library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[wasm_bindgen]
pub fn default_sample_rate() -> f64 {
    crate::config::DEFAULT_SAMPLE_RATE
}
