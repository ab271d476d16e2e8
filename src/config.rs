//! Simulation configuration.
//!
//! Every option has a default and can be overridden per instance, either
//! through the `with_*` builder methods or from a JSON document. A runtime
//! copies its configuration at construction; it never changes afterward.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PhsError, Result};

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;

/// Default cap on fixed-point iterations per implicit solve.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Default global numerical tolerance.
pub const DEFAULT_TOLERANCE: f64 = f64::EPSILON;

/// Discretization of the storage gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradientScheme {
    /// Discrete gradient (energy-exact)
    #[default]
    #[serde(rename = "discret", alias = "discrete")]
    Discrete,
    /// Gradient evaluated at `x + theta * dx`
    #[serde(rename = "theta")]
    Theta,
    /// Mean of the gradient at `x` and `x + dx`
    #[serde(rename = "trapez", alias = "trapezoidal")]
    Trapezoidal,
}

/// Target language for the external code emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputLanguage {
    #[default]
    #[serde(rename = "rust")]
    Rust,
    #[serde(rename = "c++", alias = "cpp")]
    Cpp,
}

/// Window used by the data readers: rows `imin..imax`, one out of `decim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub imin: usize,
    pub imax: Option<usize>,
    pub decim: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            imin: 0,
            imax: None,
            decim: 1,
        }
    }
}

/// Configuration for method derivation and simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Sample rate in Hz.
    pub fs: f64,
    /// Gradient discretization.
    pub grad: GradientScheme,
    /// Theta parameter for [`GradientScheme::Theta`].
    pub theta: f64,
    /// Split linear (explicit) from nonlinear (implicit) computation.
    pub split: bool,
    /// Maximum fixed-point iterations.
    pub maxit: usize,
    /// Global numerical tolerance.
    pub eps: f64,
    /// Code emission target (unused by the native runtime).
    pub lang: OutputLanguage,
    /// Folder holding trajectory data.
    pub path: Option<PathBuf>,
    /// Default window for data readers.
    pub load: LoadOptions,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fs: DEFAULT_SAMPLE_RATE,
            grad: GradientScheme::Discrete,
            theta: 0.0,
            split: true,
            maxit: DEFAULT_MAX_ITERATIONS,
            eps: DEFAULT_TOLERANCE,
            lang: OutputLanguage::Rust,
            path: None,
            load: LoadOptions::default(),
        }
    }
}

impl SimulationConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sample rate.
    pub fn with_sample_rate(mut self, fs: f64) -> Self {
        self.fs = fs;
        self
    }

    /// Set the gradient discretization.
    pub fn with_gradient(mut self, grad: GradientScheme) -> Self {
        self.grad = grad;
        self
    }

    /// Use the theta scheme with the given parameter.
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.grad = GradientScheme::Theta;
        self.theta = theta;
        self
    }

    /// Enable or disable the linear/nonlinear split.
    pub fn with_split(mut self, split: bool) -> Self {
        self.split = split;
        self
    }

    /// Set the maximum fixed-point iterations.
    pub fn with_max_iterations(mut self, maxit: usize) -> Self {
        self.maxit = maxit;
        self
    }

    /// Set the global numerical tolerance.
    ///
    /// The default (machine epsilon) usually runs every implicit solve up
    /// to `maxit`; 1e-12 is a good compromise for audio rates.
    pub fn with_tolerance(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Set the data folder.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the default data window.
    pub fn with_load(mut self, load: LoadOptions) -> Self {
        self.load = load;
        self
    }

    /// Sampling period `1 / fs`.
    pub fn dt(&self) -> f64 {
        1.0 / self.fs
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.fs.is_finite() && self.fs > 0.0) {
            return Err(PhsError::config(format!("sample rate must be positive, got {}", self.fs)));
        }
        if !(0.0..=1.0).contains(&self.theta) {
            return Err(PhsError::config(format!("theta must lie in [0, 1], got {}", self.theta)));
        }
        if !(self.eps >= 0.0) {
            return Err(PhsError::config(format!("eps must be non-negative, got {}", self.eps)));
        }
        if self.load.decim == 0 {
            return Err(PhsError::config("load.decim must be at least 1"));
        }
        if let Some(imax) = self.load.imax {
            if imax < self.load.imin {
                return Err(PhsError::config(format!(
                    "load window is empty: imin {} > imax {}",
                    self.load.imin, imax
                )));
            }
        }
        Ok(())
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input).map_err(|source| PhsError::ConfigParse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PhsError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grad, GradientScheme::Discrete);
        assert!(config.split);
        assert_eq!(config.maxit, DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{ "fs": 44100, "grad": "trapez", "maxit": 5, "lang": "c++", "load": { "decim": 4 } }"#,
        )
        .unwrap();
        assert_eq!(config.fs, 44_100.0);
        assert_eq!(config.grad, GradientScheme::Trapezoidal);
        assert_eq!(config.maxit, 5);
        assert_eq!(config.lang, OutputLanguage::Cpp);
        assert_eq!(config.load.decim, 4);
        assert_eq!(config.load.imin, 0);
        assert_eq!(config.eps, DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SimulationConfig::new().with_sample_rate(0.0).validate().is_err());
        assert!(SimulationConfig::new().with_theta(1.5).validate().is_err());
        assert!(SimulationConfig::new().with_tolerance(f64::NAN).validate().is_err());
        assert!(SimulationConfig::from_json_str(r#"{ "load": { "decim": 0 } }"#).is_err());
    }

    #[test]
    fn test_zero_iteration_cap_is_valid() {
        let config = SimulationConfig::from_json_str(r#"{ "maxit": 0 }"#).unwrap();
        assert_eq!(config.maxit, 0);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            SimulationConfig::from_json_str("{ fs: "),
            Err(PhsError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_roundtrip_through_json() {
        let config = SimulationConfig::new().with_theta(0.5).with_split(false);
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(SimulationConfig::from_json_str(&text).unwrap(), config);
    }
}
