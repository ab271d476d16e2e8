//! On-disk trajectory storage.
//!
//! A store is a folder holding one text file per named sequence
//! (`<folder>/<name>.txt`). Each line is one time step: the values of the
//! sequence at that step as a JSON array, so a sequence of width 0 is a
//! file of `[]` lines. Non-finite values are written as `null` and read
//! back as NaN.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use super::Window;
use crate::error::{PhsError, Result};

/// Folder of named sequences.
#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    /// Open (and create if needed) a data folder.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| io_error(&root, source))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `name`.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.txt", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    /// Truncate `name` and return a writer for it.
    pub fn writer(&self, name: &str) -> Result<RowWriter> {
        let path = self.path_of(name);
        let file = File::create(&path).map_err(|source| io_error(&path, source))?;
        Ok(RowWriter {
            path,
            out: BufWriter::new(file),
            rows: 0,
        })
    }

    /// Replace `name` with the given rows.
    pub fn write_rows<R, I>(&self, name: &str, rows: I) -> Result<usize>
    where
        R: AsRef<[f64]>,
        I: IntoIterator<Item = R>,
    {
        let mut writer = self.writer(name)?;
        for row in rows {
            writer.write_row(row.as_ref())?;
        }
        writer.finish()
    }

    /// Restartable reader over `name`, restricted to `window`.
    pub fn sequence(&self, name: &str, window: Window) -> Sequence {
        Sequence {
            path: self.path_of(name),
            window,
            component: None,
        }
    }

    /// Read all rows of `name` inside `window`.
    pub fn read_rows(&self, name: &str, window: Window) -> Result<Vec<Vec<f64>>> {
        self.sequence(name, window).iter()?.collect()
    }
}

/// Buffered line writer for one sequence.
#[derive(Debug)]
pub struct RowWriter {
    path: PathBuf,
    out: BufWriter<File>,
    rows: usize,
}

impl RowWriter {
    pub fn write_row(&mut self, row: &[f64]) -> Result<()> {
        let line = serde_json::to_string(row)?;
        writeln!(self.out, "{}", line).map_err(|source| io_error(&self.path, source))?;
        self.rows += 1;
        Ok(())
    }

    /// Number of rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and close; returns the number of rows written.
    pub fn finish(mut self) -> Result<usize> {
        self.out.flush().map_err(|source| io_error(&self.path, source))?;
        Ok(self.rows)
    }
}

/// A named sequence that can be read any number of times.
///
/// Each call to [`Sequence::iter`] re-opens the backing file, so a sequence
/// can be consumed again after a previous pass.
#[derive(Debug, Clone)]
pub struct Sequence {
    path: PathBuf,
    window: Window,
    component: Option<usize>,
}

impl Sequence {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Restrict every row to its `ind`-th value.
    ///
    /// Rows then have length 1; a row too short for `ind` is a
    /// [`PhsError::DimensionError`].
    pub fn with_component(mut self, ind: usize) -> Self {
        self.component = Some(ind);
        self
    }

    pub fn component(&self) -> Option<usize> {
        self.component
    }

    /// Start a new pass over the sequence.
    pub fn iter(&self) -> Result<SequenceIter> {
        let file = File::open(&self.path).map_err(|source| io_error(&self.path, source))?;
        Ok(SequenceIter {
            path: self.path.clone(),
            lines: BufReader::new(file).lines(),
            window: self.window,
            component: self.component,
            row: 0,
        })
    }
}

/// One pass over a [`Sequence`].
pub struct SequenceIter {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    window: Window,
    component: Option<usize>,
    row: usize,
}

impl SequenceIter {
    fn select(&self, row: Vec<f64>) -> Result<Vec<f64>> {
        match self.component {
            None => Ok(row),
            Some(ind) => row.get(ind).map(|&v| vec![v]).ok_or_else(|| PhsError::DimensionError {
                what: format!("{} row {}", self.path.display(), self.row),
                expected: format!("more than {} values", ind),
                actual: row.len().to_string(),
            }),
        }
    }
}

fn parse_row(line: &str) -> Result<Vec<f64>> {
    let values: Vec<Option<f64>> = serde_json::from_str(line)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

impl Iterator for SequenceIter {
    type Item = Result<Vec<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.window.is_past(self.row) {
                return None;
            }
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(source) => return Some(Err(io_error(&self.path, source))),
            };
            let keep = self.window.contains(self.row);
            let parsed = keep.then(|| parse_row(&line).and_then(|row| self.select(row)));
            self.row += 1;
            if let Some(row) = parsed {
                return Some(row);
            }
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PhsError {
    PhsError::DataIo {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_twice() {
        let dir = super::super::scratch_dir("test_write_then_read_twice");
        let store = DataStore::open(&dir).unwrap();
        let rows = vec![vec![1.0, -2.5], vec![0.1, 1e-300], vec![3.0, 4.0]];
        assert_eq!(store.write_rows("x", &rows).unwrap(), 3);

        let seq = store.sequence("x", Window::all());
        let first: Vec<Vec<f64>> = seq.iter().unwrap().map(|r| r.unwrap()).collect();
        let second: Vec<Vec<f64>> = seq.iter().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(first, rows);
        assert_eq!(second, rows);
    }

    #[test]
    fn test_empty_rows_and_window() {
        let dir = super::super::scratch_dir("test_empty_rows_and_window");
        let store = DataStore::open(dir.join("nested")).unwrap();
        store.write_rows("u", vec![Vec::<f64>::new(); 4]).unwrap();
        assert_eq!(store.read_rows("u", Window::all()).unwrap(), vec![Vec::<f64>::new(); 4]);

        store.write_rows("t", (0..10).map(|i| vec![i as f64])).unwrap();
        let window = Window::all().with_range(1, Some(8)).with_decim(2);
        let got = store.read_rows("t", window).unwrap();
        assert_eq!(got, vec![vec![2.0], vec![4.0], vec![6.0]]);
    }

    #[test]
    fn test_missing_and_malformed() {
        let dir = super::super::scratch_dir("test_missing_and_malformed");
        let store = DataStore::open(&dir).unwrap();
        assert!(!store.contains("nope"));
        assert!(matches!(
            store.sequence("nope", Window::all()).iter(),
            Err(PhsError::DataIo { .. })
        ));

        std::fs::write(store.path_of("bad"), "[1, 2]\n[3, \"abc\"]\n1 2\n").unwrap();
        let rows: Vec<Result<Vec<f64>>> = store.sequence("bad", Window::all()).iter().unwrap().collect();
        assert_eq!(rows[0].as_ref().unwrap(), &vec![1.0, 2.0]);
        assert!(matches!(rows[1], Err(PhsError::DataJson(_))));
        assert!(matches!(rows[2], Err(PhsError::DataJson(_))));
    }

    #[test]
    fn test_component_selection() {
        let dir = super::super::scratch_dir("test_component_selection");
        let store = DataStore::open(&dir).unwrap();
        store.write_rows("x", [[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]).unwrap();

        let second = store.sequence("x", Window::all().with_decim(2)).with_component(1);
        let rows: Vec<Vec<f64>> = second.iter().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows, vec![vec![10.0], vec![30.0]]);

        let beyond = store.sequence("x", Window::all()).with_component(2);
        assert!(matches!(beyond.iter().unwrap().next(), Some(Err(PhsError::DimensionError { .. }))));
    }

    #[test]
    fn test_rows_are_json_arrays() {
        let dir = super::super::scratch_dir("test_rows_are_json_arrays");
        let store = DataStore::open(&dir).unwrap();
        store.write_rows("y", [vec![0.5, -2.0], vec![], vec![f64::NAN]]).unwrap();

        let text = std::fs::read_to_string(store.path_of("y")).unwrap();
        assert_eq!(text, "[0.5,-2.0]\n[]\n[null]\n");

        let rows = store.read_rows("y", Window::all()).unwrap();
        assert_eq!(rows[0], vec![0.5, -2.0]);
        assert!(rows[1].is_empty());
        assert!(rows[2][0].is_nan());
    }
}
