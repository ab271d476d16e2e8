//! Index windows for reading trajectories.

use crate::config::LoadOptions;

/// Rows `imin..imax` (all remaining rows when `imax` is `None`), keeping one
/// out of `decim`.
///
/// Decimation is counted from row 0, not from `imin`: row `i` is kept when
/// `i % decim == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub imin: usize,
    pub imax: Option<usize>,
    pub decim: usize,
}

impl Default for Window {
    fn default() -> Self {
        Self::all()
    }
}

impl From<LoadOptions> for Window {
    fn from(load: LoadOptions) -> Self {
        Self {
            imin: load.imin,
            imax: load.imax,
            decim: load.decim,
        }
    }
}

impl Window {
    /// Every row.
    pub fn all() -> Self {
        Self {
            imin: 0,
            imax: None,
            decim: 1,
        }
    }

    pub fn with_range(mut self, imin: usize, imax: Option<usize>) -> Self {
        self.imin = imin;
        self.imax = imax;
        self
    }

    pub fn with_decim(mut self, decim: usize) -> Self {
        self.decim = decim;
        self
    }

    /// Whether row `i` belongs to the window.
    pub fn contains(&self, i: usize) -> bool {
        i >= self.imin && self.imax.map_or(true, |imax| i < imax) && i % self.decim.max(1) == 0
    }

    /// Whether no row at or after `i` can belong to the window.
    pub fn is_past(&self, i: usize) -> bool {
        self.imax.is_some_and(|imax| i >= imax)
    }

    /// Filter an iterator of rows through the window.
    pub fn apply<I: Iterator>(self, rows: I) -> impl Iterator<Item = I::Item> {
        rows.enumerate()
            .take_while(move |(i, _)| !self.is_past(*i))
            .filter(move |(i, _)| self.contains(*i))
            .map(|(_, row)| row)
    }
}
