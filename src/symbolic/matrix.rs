//! Dense symbolic matrices and the two guarded primitives used throughout
//! method derivation: [`inverse`] and [`matvecprod`].

use std::collections::BTreeMap;

use super::expr::{Expr, Symbol};
use crate::error::{PhsError, Result};

/// Dense matrix of expressions (row-major).
#[derive(Debug, Clone, PartialEq)]
pub struct SymMatrix {
    rows: usize,
    cols: usize,
    data: Vec<Expr>,
}

impl SymMatrix {
    /// Matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![Expr::zero(); rows * cols],
        }
    }

    /// Identity matrix of size `n`.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, Expr::one());
        }
        m
    }

    /// Build from a list of rows. All rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<Expr>>) -> Result<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(nrows * ncols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != ncols {
                return Err(PhsError::dimension(format!("matrix row {}", i), ncols, row.len()));
            }
            data.extend(row);
        }
        Ok(Self {
            rows: nrows,
            cols: ncols,
            data,
        })
    }

    /// Build from numeric rows.
    pub fn from_f64(rows: &[&[f64]]) -> Result<Self> {
        Self::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|v| Expr::num(*v)).collect())
                .collect(),
        )
    }

    /// Jacobian `∂exprs_i / ∂symbols_j`.
    pub fn jacobian(exprs: &[Expr], symbols: &[Symbol]) -> Self {
        let mut m = Self::zeros(exprs.len(), symbols.len());
        for (i, e) in exprs.iter().enumerate() {
            for (j, s) in symbols.iter().enumerate() {
                m.set(i, j, e.diff(s));
            }
        }
        m
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Whether the matrix is square.
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> &Expr {
        &self.data[row * self.cols + col]
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: Expr) {
        self.data[row * self.cols + col] = value;
    }

    /// Row as a slice.
    pub fn row(&self, row: usize) -> &[Expr] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Whether every entry is the constant zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(Expr::is_zero)
    }

    /// Block selected by row and column indices.
    pub fn submatrix(&self, rows: &[usize], cols: &[usize]) -> Self {
        let mut m = Self::zeros(rows.len(), cols.len());
        for (i, &r) in rows.iter().enumerate() {
            for (j, &c) in cols.iter().enumerate() {
                m.set(i, j, self.get(r, c).clone());
            }
        }
        m
    }

    /// Matrix product.
    pub fn mul(&self, other: &SymMatrix) -> Result<Self> {
        if self.cols != other.rows {
            return Err(PhsError::dimension("matrix product", self.cols, other.rows));
        }
        let mut m = Self::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for j in 0..other.cols {
                let terms = (0..self.cols).map(|k| self.get(i, k).clone() * other.get(k, j).clone());
                m.set(i, j, Expr::sum(terms));
            }
        }
        Ok(m)
    }

    /// Element-wise difference.
    pub fn sub(&self, other: &SymMatrix) -> Result<Self> {
        if self.shape() != other.shape() {
            return Err(PhsError::DimensionError {
                what: "matrix difference".to_string(),
                expected: format!("{:?}", self.shape()),
                actual: format!("{:?}", other.shape()),
            });
        }
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a.clone() - b.clone())
                .collect(),
        })
    }

    /// Apply `f` to every entry.
    pub fn map(&self, f: impl Fn(&Expr) -> Expr) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Substitute numeric values into every entry.
    pub fn subs_num(&self, map: &BTreeMap<Symbol, f64>) -> Self {
        self.map(|e| e.subs_num(map))
    }

    /// Re-simplify every entry.
    pub fn simplify(&self) -> Self {
        self.map(Expr::simplify)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for j in 0..self.cols {
            self.data.swap(a * self.cols + j, b * self.cols + j);
        }
    }
}

/// Inverse of a square matrix by Gauss–Jordan elimination.
///
/// Pivots are chosen among non-zero entries, preferring numeric entries of
/// largest magnitude. A symbolic candidate is rejected when it vanishes at
/// every sample point, so cancellations hidden by
/// unexpanded products still report [`PhsError::SingularMatrix`]. A symbolic
/// pivot that vanishes only for some argument values is not detected.
pub fn inverse(mat: &SymMatrix, simplify: bool) -> Result<SymMatrix> {
    if !mat.is_square() {
        return Err(PhsError::DimensionError {
            what: "matrix inverse".to_string(),
            expected: "square matrix".to_string(),
            actual: format!("{:?}", mat.shape()),
        });
    }
    let n = mat.rows();
    let mut a = mat.clone();
    let mut inv = SymMatrix::identity(n);

    for k in 0..n {
        let pivot_row = select_pivot(&a, k).ok_or(PhsError::SingularMatrix { column: k })?;
        a.swap_rows(k, pivot_row);
        inv.swap_rows(k, pivot_row);

        // Normalize pivot row
        let scale = Expr::power(a.get(k, k).clone(), Expr::num(-1.0));
        for j in 0..n {
            a.set(k, j, a.get(k, j).clone() * scale.clone());
            inv.set(k, j, inv.get(k, j).clone() * scale.clone());
        }

        // Eliminate column k from every other row
        for i in 0..n {
            if i == k || a.get(i, k).is_zero() {
                continue;
            }
            let factor = a.get(i, k).clone();
            for j in 0..n {
                let aij = a.get(i, j).clone() - factor.clone() * a.get(k, j).clone();
                a.set(i, j, aij);
                let vij = inv.get(i, j).clone() - factor.clone() * inv.get(k, j).clone();
                inv.set(i, j, vij);
            }
        }
    }

    Ok(if simplify { inv.simplify() } else { inv })
}

fn select_pivot(a: &SymMatrix, k: usize) -> Option<usize> {
    let n = a.rows();
    let numeric = (k..n)
        .filter_map(|i| a.get(i, k).as_num().map(|v| (i, v.abs())))
        .filter(|(_, v)| *v > 0.0)
        .max_by(|x, y| x.1.total_cmp(&y.1))
        .map(|(i, _)| i);
    numeric.or_else(|| (k..n).find(|&i| a.get(i, k).as_num().is_none() && !vanishes(a.get(i, k))))
}

/// Number of sample points used by [`vanishes`].
const SAMPLE_POINTS: usize = 3;

/// Relative size below which a sampled value counts as zero.
const SAMPLE_TOLERANCE: f64 = 1e-10;

/// Whether a symbolic expression is zero at every sample point.
///
/// Each free symbol gets a distinct value in `[0.25, 1.25)` per point. A
/// value is zero when it is small relative to the sum of the magnitudes of
/// the top-level terms; non-finite values never count as zero.
fn vanishes(e: &Expr) -> bool {
    if let Some(v) = e.as_num() {
        return v == 0.0;
    }
    let symbols = e.free_symbols();
    (0..SAMPLE_POINTS).all(|k| {
        let point: BTreeMap<Symbol, f64> = symbols
            .iter()
            .enumerate()
            .map(|(j, s)| {
                let v = ((j + 1) as f64 * std::f64::consts::SQRT_2 + (k + 1) as f64 * 0.5772).fract() + 0.25;
                (s.clone(), v)
            })
            .collect();
        let value = match e.subs_num(&point).as_num() {
            Some(v) if v.is_finite() => v,
            _ => return false,
        };
        let scale = match e {
            Expr::Add(items) => items
                .iter()
                .filter_map(|t| t.subs_num(&point).as_num())
                .map(f64::abs)
                .sum::<f64>(),
            _ => value.abs(),
        };
        value.abs() <= SAMPLE_TOLERANCE * scale
    })
}

/// Product of a `(m, n)` matrix with a length-`n` vector.
///
/// Always returns a flat vector of length `m`, including the degenerate
/// cases `n == 0` (all zeros) and `m == 1` (one element).
pub fn matvecprod(mat: &SymMatrix, vec: &[Expr]) -> Result<Vec<Expr>> {
    let (m, n) = mat.shape();
    if vec.len() != n {
        return Err(PhsError::dimension("matrix-vector product", n, vec.len()));
    }
    if n == 0 {
        return Ok(vec![Expr::zero(); m]);
    }
    Ok((0..m)
        .map(|i| Expr::sum(mat.row(i).iter().zip(vec).map(|(a, b)| a.clone() * b.clone())))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn numeric(m: &SymMatrix, vals: &BTreeMap<Symbol, f64>) -> Vec<f64> {
        let mut out = Vec::new();
        for i in 0..m.rows() {
            for j in 0..m.cols() {
                out.push(m.get(i, j).subs_num(vals).as_num().expect("numeric entry"));
            }
        }
        out
    }

    #[test]
    fn test_matvecprod_single_row_is_wrapped() {
        let m = SymMatrix::from_f64(&[&[1.0, 1.0, 1.0]]).unwrap();
        let v = vec![Expr::num(1.0), Expr::num(2.0), Expr::num(3.0)];
        let r = matvecprod(&m, &v).unwrap();
        assert_eq!(r, vec![Expr::num(6.0)]);
    }

    #[test]
    fn test_matvecprod_empty_vector_gives_zeros() {
        let m = SymMatrix::zeros(3, 0);
        let r = matvecprod(&m, &[]).unwrap();
        assert_eq!(r, vec![Expr::zero(); 3]);
    }

    #[test]
    fn test_matvecprod_length_mismatch() {
        let m = SymMatrix::zeros(2, 2);
        let err = matvecprod(&m, &[Expr::one()]).unwrap_err();
        assert!(matches!(err, PhsError::DimensionError { .. }));
    }

    #[test]
    fn test_matvecprod_symbolic() {
        let m = SymMatrix::from_rows(vec![
            vec![Expr::var("a"), Expr::zero()],
            vec![Expr::one(), Expr::var("b")],
        ])
        .unwrap();
        let r = matvecprod(&m, &[Expr::var("x"), Expr::var("y")]).unwrap();
        assert_eq!(r[0], Expr::var("a") * Expr::var("x"));
        assert_eq!(r[1], Expr::var("x") + Expr::var("b") * Expr::var("y"));
    }

    #[test]
    fn test_inverse_numeric_roundtrip() {
        let m = SymMatrix::from_f64(&[&[0.0, 2.0, 1.0], &[1.0, 0.0, 0.0], &[3.0, 1.0, 4.0]]).unwrap();
        let inv = inverse(&m, true).unwrap();
        let id = inv.mul(&m).unwrap();
        let vals = numeric(&id, &BTreeMap::new());
        let expected = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        for (a, b) in vals.iter().zip(expected) {
            assert_relative_eq!(*a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_inverse_symbolic_roundtrip() {
        let (a, b, c) = (Expr::var("a"), Expr::var("b"), Expr::var("c"));
        let m = SymMatrix::from_rows(vec![
            vec![Expr::one() + a.clone(), b.clone()],
            vec![c.clone(), Expr::num(2.0)],
        ])
        .unwrap();
        let inv = inverse(&m, false).unwrap();
        let id = inv.mul(&m).unwrap();
        let vals: BTreeMap<Symbol, f64> = [("a", 0.7), ("b", -1.3), ("c", 0.4)]
            .into_iter()
            .map(|(n, v)| (Symbol::new(n), v))
            .collect();
        let got = numeric(&id, &vals);
        for (k, v) in got.iter().enumerate() {
            let expected = if k == 0 || k == 3 { 1.0 } else { 0.0 };
            assert_relative_eq!(*v, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_inverse_singular() {
        let m = SymMatrix::from_f64(&[&[1.0, 2.0], &[0.0, 0.0]]).unwrap();
        assert!(matches!(
            inverse(&m, false),
            Err(PhsError::SingularMatrix { column: 1 })
        ));
    }

    #[test]
    fn test_inverse_detects_hidden_cancellation() {
        // second row is `a` times the first, which only shows after expansion
        let (a, b) = (Expr::var("a"), Expr::var("b"));
        let m = SymMatrix::from_rows(vec![
            vec![a.clone() + b.clone(), Expr::one()],
            vec![a.clone().powi(2) + a.clone() * b.clone(), a.clone()],
        ])
        .unwrap();
        assert!(matches!(inverse(&m, true), Err(PhsError::SingularMatrix { column: 1 })));
    }

    #[test]
    fn test_vanishes() {
        let (a, b) = (Expr::var("a"), Expr::var("b"));
        let hidden = a.clone() - (a.clone().powi(2) + a.clone() * b.clone()) / (a.clone() + b.clone());
        assert!(vanishes(&hidden));
        assert!(!vanishes(&(a.clone() - b.clone())));
        assert!(!vanishes(&(a.clone() * b)));
        assert!(vanishes(&Expr::zero()));
    }

    #[test]
    fn test_inverse_requires_square() {
        let m = SymMatrix::zeros(2, 3);
        assert!(matches!(inverse(&m, false), Err(PhsError::DimensionError { .. })));
    }

    #[test]
    fn test_jacobian() {
        let (x, y) = (Symbol::new("x"), Symbol::new("y"));
        let f = vec![Expr::sym(&x) * Expr::sym(&y), Expr::sym(&x).powi(2)];
        let j = SymMatrix::jacobian(&f, &[x.clone(), y.clone()]);
        assert_eq!(j.get(0, 0), &Expr::sym(&y));
        assert_eq!(j.get(0, 1), &Expr::sym(&x));
        assert_eq!(j.get(1, 0), &(Expr::num(2.0) * Expr::sym(&x)));
        assert!(j.get(1, 1).is_zero());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn matvecprod_has_row_count_length(m in 0usize..5, n in 0usize..5) {
                let mat = SymMatrix::zeros(m, n);
                let v = vec![Expr::one(); n];
                prop_assert_eq!(matvecprod(&mat, &v).unwrap().len(), m);
            }

            #[test]
            fn inverse_of_diagonally_dominant_roundtrips(vals in prop::collection::vec(-1.0_f64..1.0, 9)) {
                let mut rows = [[0.0; 3]; 3];
                for i in 0..3 {
                    for j in 0..3 {
                        rows[i][j] = vals[3 * i + j] + if i == j { 4.0 } else { 0.0 };
                    }
                }
                let m = SymMatrix::from_f64(&[&rows[0], &rows[1], &rows[2]]).unwrap();
                let id = inverse(&m, false).unwrap().mul(&m).unwrap();
                for i in 0..3 {
                    for j in 0..3 {
                        let v = id.get(i, j).as_num().unwrap();
                        let e = if i == j { 1.0 } else { 0.0 };
                        prop_assert!((v - e).abs() < 1e-9);
                    }
                }
            }
        }
    }
}
