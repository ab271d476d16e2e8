//! # PHS Core
//!
//! Discretization and simulation of port-Hamiltonian systems.
//!
//! This library provides:
//! - A symbolic description of a system: storage function, dissipation
//!   laws, ports and a structure matrix
//! - Derivation of a passive-guaranteed discrete-time method (discrete
//!   gradients, linear/nonlinear split, fixed-point iterations)
//! - Compilation of the method's expressions to stack bytecode and a
//!   runtime that advances the system sample by sample
//! - A text description language, file-backed simulation runs with power
//!   balance post-processing, and audio streaming
//!
//! ## Architecture
//!
//! - [`symbolic`] - Expressions, matrices and the symbolic linear algebra
//!   utilities (`inverse`, `matvecprod`)
//! - [`model`] - The symbolic system ([`PhsCore`])
//! - [`method`] - Discrete-time method derivation ([`Method`])
//! - [`numerics`] - Expression compilation and the runtime ([`NumericalCore`])
//! - [`dsl`] - Parser for the core description language
//! - [`data`] / [`simulation`] - Trajectory storage and file-backed runs
//! - [`processor`] / [`audio`] - Streaming through one port
//!
//! ## Usage
//!
//! ```no_run
//! use phs_core::{Method, NumericalCore, PhsCore, SimulationConfig};
//!
//! # fn main() -> phs_core::Result<()> {
//! let ast = phs_core::dsl::parse(
//!     ".storage q = q^2/2\n.storage phi = phi^2/2\n.connect q phi\n",
//! )?;
//! let core = PhsCore::from_ast(&ast)?;
//! let method = Method::new(&core, &SimulationConfig::new().with_sample_rate(100.0))?;
//! let mut runtime = NumericalCore::new(&method)?;
//! runtime.init_state(&[1.0, 0.0])?;
//! for _ in 0..100 {
//!     runtime.update(None, None)?;
//! }
//! println!("x = {:?}", runtime.get("x")?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Numerical Method
//!
//! For each time step `T = 1 / fs` the increment `dx` solves
//! `[dx/T; w; -y] = M [dxH(x, dx); z(w); u]`, where `dxH` is a discrete
//! gradient of the storage function. Linear states and dissipations are
//! solved in closed form; the remaining unknowns are found by fixed-point
//! iteration on a Newton update, stopped on tolerance or on `maxit`.

pub mod config;
pub mod data;
pub mod dsl;
pub mod error;
pub mod method;
pub mod model;
pub mod numerics;
pub mod processor;
pub mod simulation;
pub mod symbolic;

#[cfg(feature = "cli")]
pub mod audio;

// Re-export main types for convenience
pub use config::{GradientScheme, SimulationConfig, DEFAULT_SAMPLE_RATE};
pub use error::{PhsError, Result};
pub use method::Method;
pub use model::PhsCore;
pub use numerics::{NumericalCore, NumericalEval, StepReport};
pub use simulation::{RunSummary, Simulation};

// WASM bindings
#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::WasmPhsSim;
