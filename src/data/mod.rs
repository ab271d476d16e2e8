//! Simulation data: input sequences, recorded trajectories and power
//! balance post-processing.
//!
//! Every trajectory lives in a [`DataStore`] folder, one file per group or
//! expression name (`x`, `dx`, `w`, `u`, `p`, `y`, `dxH`, `z`, plus `x0`
//! for the initial state). Readers take a [`Window`] so long records can
//! be decimated without loading them whole.
//!
//! Power conventions follow the structure `[dx/dt; w; -y] = M [dxH; z; u]`:
//! the stored energy varies as `dtE = ps - pd` with
//!
//! - `dtE = sum(dx * fs * dxH)`, the discrete time derivative of `H`,
//! - `pd = sum(w * z)`, the dissipated power,
//! - `ps = sum(u * y)`, the power received through the ports.

mod store;
mod window;

pub use store::{DataStore, RowWriter, Sequence, SequenceIter};
pub use window::Window;

use tracing::debug;

use crate::config::SimulationConfig;
use crate::error::{PhsError, Result};
use crate::model::Dims;

/// Trajectory data attached to one simulation.
#[derive(Debug, Clone)]
pub struct Data {
    store: DataStore,
    fs: f64,
    window: Window,
    nt: Option<usize>,
}

impl Data {
    /// Attach to the data folder named in `config`.
    pub fn open(config: &SimulationConfig) -> Result<Self> {
        let path = config.path.as_ref().ok_or_else(|| PhsError::InvalidSimulationParam {
            message: "no data folder configured".to_string(),
        })?;
        Ok(Self::with_store(DataStore::open(path)?, config))
    }

    pub fn with_store(store: DataStore, config: &SimulationConfig) -> Self {
        Self {
            store,
            fs: config.fs,
            window: Window::from(config.load),
            nt: None,
        }
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Number of time steps, once known.
    pub fn nt(&self) -> Option<usize> {
        self.nt
    }

    /// Default window, from the configuration's load options.
    pub fn window(&self) -> Window {
        self.window
    }

    /// Write the input sequences and the initial state.
    ///
    /// The number of steps comes from `sequ`, then `seqp`, then `nt`.
    /// Missing sequences are filled with zeros, as is a missing `x0`.
    /// Returns the number of steps.
    pub fn init_data(
        &mut self,
        dims: Dims,
        sequ: Option<&[Vec<f64>]>,
        seqp: Option<&[Vec<f64>]>,
        x0: Option<&[f64]>,
        nt: Option<usize>,
    ) -> Result<usize> {
        let nt = sequ
            .map(<[_]>::len)
            .or_else(|| seqp.map(<[_]>::len))
            .or(nt)
            .ok_or_else(|| PhsError::InvalidSimulationParam {
                message: "number of time steps is unknown: provide input sequences or nt".to_string(),
            })?;

        self.write_input("u", sequ, dims.y, nt)?;
        self.write_input("p", seqp, dims.p, nt)?;

        let x0 = match x0 {
            Some(x0) if x0.len() != dims.x => return Err(PhsError::dimension("x0", dims.x, x0.len())),
            Some(x0) => x0.to_vec(),
            None => vec![0.0; dims.x],
        };
        self.store.write_rows("x0", [x0])?;

        debug!(nt, path = %self.store.root().display(), "simulation data initialized");
        self.nt = Some(nt);
        Ok(nt)
    }

    fn write_input(&self, name: &str, seq: Option<&[Vec<f64>]>, width: usize, nt: usize) -> Result<()> {
        match seq {
            Some(rows) => {
                if rows.len() != nt {
                    return Err(PhsError::dimension(format!("{} (steps)", name), nt, rows.len()));
                }
                if let Some(row) = rows.iter().find(|r| r.len() != width) {
                    return Err(PhsError::dimension(name, width, row.len()));
                }
                self.store.write_rows(name, rows)?;
            }
            None => {
                self.store.write_rows(name, std::iter::repeat(vec![0.0; width]).take(nt))?;
            }
        }
        Ok(())
    }

    /// Stored initial state.
    pub fn x0(&self) -> Result<Vec<f64>> {
        let mut rows = self.store.read_rows("x0", Window::all())?;
        rows.pop().ok_or_else(|| PhsError::DataFormat {
            path: self.store.path_of("x0").display().to_string(),
            row: 0,
            message: "empty initial state".to_string(),
        })
    }

    /// Time instants `n / fs` for the steps inside `window`.
    pub fn t(&self, window: Option<Window>) -> Result<Vec<f64>> {
        let nt = self.nt.ok_or_else(|| PhsError::InvalidSimulationParam {
            message: "number of time steps is unknown: call init_data first".to_string(),
        })?;
        let fs = self.fs;
        Ok(window
            .unwrap_or(self.window)
            .apply(0..nt)
            .map(|n| n as f64 / fs)
            .collect())
    }

    /// Restartable reader over a stored sequence.
    pub fn seq(&self, name: &str, window: Option<Window>) -> Sequence {
        self.store.sequence(name, window.unwrap_or(self.window))
    }

    /// Read a stored sequence whole.
    pub fn read(&self, name: &str, window: Option<Window>) -> Result<Vec<Vec<f64>>> {
        self.seq(name, window).iter()?.collect()
    }

    /// Read the `ind`-th value of every row of a stored sequence.
    pub fn read_component(&self, name: &str, ind: usize, window: Option<Window>) -> Result<Vec<f64>> {
        self.seq(name, window)
            .with_component(ind)
            .iter()?
            .map(|row| row.map(|r| r[0]))
            .collect()
    }

    /// Discrete time derivative of the stored energy.
    pub fn dt_e(&self, window: Option<Window>) -> Result<Vec<f64>> {
        let fs = self.fs;
        self.scalar_product("dx", "dxH", window, |a, b| a * fs * b)
    }

    /// Dissipated power.
    pub fn pd(&self, window: Option<Window>) -> Result<Vec<f64>> {
        self.scalar_product("w", "z", window, |a, b| a * b)
    }

    /// Power received through the ports.
    pub fn ps(&self, window: Option<Window>) -> Result<Vec<f64>> {
        self.scalar_product("u", "y", window, |a, b| a * b)
    }

    fn scalar_product(
        &self,
        lhs: &str,
        rhs: &str,
        window: Option<Window>,
        term: impl Fn(f64, f64) -> f64,
    ) -> Result<Vec<f64>> {
        let a = self.seq(lhs, window).iter()?;
        let b = self.seq(rhs, window).iter()?;
        a.zip(b)
            .map(|(ra, rb)| {
                let (ra, rb) = (ra?, rb?);
                if ra.len() != rb.len() {
                    return Err(PhsError::dimension(format!("{}.{}", lhs, rhs), ra.len(), rb.len()));
                }
                Ok(ra.iter().zip(&rb).map(|(&x, &y)| term(x, y)).sum())
            })
            .collect()
    }
}

/// Fresh directory under the system temp folder for file-backed tests.
#[cfg(test)]
pub(crate) fn scratch_dir(prefix: &str) -> std::path::PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "phs_core_{}_{}_{}_{}",
        prefix,
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn data(dir: &std::path::Path) -> Data {
        let config = SimulationConfig::new().with_sample_rate(10.0).with_path(dir);
        Data::open(&config).unwrap()
    }

    fn dims() -> Dims {
        Dims { x: 2, w: 1, y: 1, p: 0 }
    }

    #[test]
    fn test_init_data_defaults() {
        let dir = scratch_dir("test_init_data_defaults");
        let mut data = data(&dir);
        assert_eq!(data.init_data(dims(), None, None, None, Some(3)).unwrap(), 3);
        assert_eq!(data.read("u", None).unwrap(), vec![vec![0.0]; 3]);
        assert_eq!(data.read("p", None).unwrap(), vec![Vec::<f64>::new(); 3]);
        assert_eq!(data.x0().unwrap(), vec![0.0, 0.0]);
        assert_eq!(data.t(None).unwrap(), vec![0.0, 0.1, 0.2]);
    }

    #[test]
    fn test_init_data_steps_from_inputs() {
        let dir = scratch_dir("test_init_data_steps_from_inputs");
        let mut data = data(&dir);
        let u = vec![vec![1.0], vec![2.0]];
        let nt = data.init_data(dims(), Some(&u), None, Some(&[0.5, -0.5]), Some(99)).unwrap();
        assert_eq!(nt, 2);
        assert_eq!(data.read("u", None).unwrap(), u);
        assert_eq!(data.x0().unwrap(), vec![0.5, -0.5]);
    }

    #[test]
    fn test_init_data_errors() {
        let dir = scratch_dir("test_init_data_errors");
        let mut data = data(&dir);
        assert!(matches!(
            data.init_data(dims(), None, None, None, None),
            Err(PhsError::InvalidSimulationParam { .. })
        ));
        assert!(matches!(
            data.init_data(dims(), None, None, Some(&[1.0]), Some(2)),
            Err(PhsError::DimensionError { .. })
        ));
        let u = vec![vec![1.0, 2.0]];
        assert!(matches!(
            data.init_data(dims(), Some(&u), None, None, None),
            Err(PhsError::DimensionError { .. })
        ));
        assert!(data.t(None).is_err());
    }

    #[test]
    fn test_no_folder_configured() {
        assert!(matches!(
            Data::open(&SimulationConfig::new()),
            Err(PhsError::InvalidSimulationParam { .. })
        ));
    }

    #[test]
    fn test_power_products() {
        let dir = scratch_dir("test_power_products");
        let data = data(&dir);
        let store = data.store();
        store.write_rows("dx", [[0.1, 0.2], [0.0, -0.1]]).unwrap();
        store.write_rows("dxH", [[1.0, 2.0], [3.0, 4.0]]).unwrap();
        store.write_rows("w", [[2.0], [3.0]]).unwrap();
        store.write_rows("z", [[0.5], [1.0]]).unwrap();
        store.write_rows("u", [[1.0], [-1.0]]).unwrap();
        store.write_rows("y", [[4.0], [2.0]]).unwrap();

        let dte = data.dt_e(None).unwrap();
        assert_relative_eq!(dte[0], 5.0, epsilon = 1e-12);
        assert_relative_eq!(dte[1], -4.0, epsilon = 1e-12);
        assert_eq!(data.pd(None).unwrap(), vec![1.0, 3.0]);
        assert_eq!(data.ps(None).unwrap(), vec![4.0, -2.0]);

        let second = Window::all().with_range(1, None);
        assert_eq!(data.pd(Some(second)).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_read_component() {
        let dir = scratch_dir("test_read_component");
        let mut data = data(&dir);
        let u = vec![vec![1.0], vec![2.0], vec![3.0]];
        data.init_data(dims(), Some(&u), None, None, None).unwrap();
        data.store().write_rows("x", [[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]).unwrap();

        assert_eq!(data.read_component("x", 1, None).unwrap(), vec![0.2, 0.4, 0.6]);
        let tail = Window::all().with_range(1, None);
        assert_eq!(data.read_component("u", 0, Some(tail)).unwrap(), vec![2.0, 3.0]);
        assert!(matches!(
            data.read_component("x", 2, None),
            Err(PhsError::DimensionError { .. })
        ));
    }
}
