//! Small dense matrices for the network evaluators.
//!
//! Layout is row-major with `cols` values per row, the same layout a
//! [`ParameterGroup`](ds_types::ParameterGroup) uses, so a weight group slice
//! can be wrapped without copying its shape logic.

use ds_types::{internal_error, DsResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub cols: usize,
    pub rows: usize,
    pub data: Vec<f64>,
}

impl Matrix {
    pub fn new(cols: usize, rows: usize, data: Vec<f64>) -> DsResult<Self> {
        if data.len() != cols * rows {
            return Err(internal_error!(
                "matrix {cols}x{rows} needs {} values, got {}",
                cols * rows,
                data.len()
            ));
        }
        Ok(Self { cols, rows, data })
    }

    pub fn zeros(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            data: vec![0.0; cols * rows],
        }
    }

    /// A single row vector.
    pub fn row(data: Vec<f64>) -> Self {
        Self {
            cols: data.len(),
            rows: 1,
            data,
        }
    }

    fn rows_iter(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.cols.max(1))
    }

    /// `m · nᵀ`: every row of `n` dotted with every row of `m`.
    ///
    /// The result has `m.rows` columns and `n.rows` rows. Both operands must
    /// have the same column count.
    pub fn mul_t(&self, n: &Matrix) -> DsResult<Matrix> {
        if self.cols != n.cols {
            return Err(internal_error!("mul_t column mismatch: {} != {}", self.cols, n.cols));
        }
        let mut data = Vec::with_capacity(self.rows * n.rows);
        for nn in n.rows_iter() {
            for mm in self.rows_iter() {
                data.push(dot(mm, nn));
            }
        }
        Ok(Matrix {
            cols: self.rows,
            rows: n.rows,
            data,
        })
    }

    /// Element-wise sum; `n` is broadcast when it is shorter than `self`.
    pub fn add(&self, n: &Matrix) -> DsResult<Matrix> {
        let (lena, lenb) = (self.data.len(), n.data.len());
        if lenb == 0 || lena % lenb != 0 {
            return Err(internal_error!("cannot broadcast {lenb} values over {lena}"));
        }
        Ok(Matrix {
            cols: self.cols,
            rows: self.rows,
            data: self
                .data
                .iter()
                .enumerate()
                .map(|(i, v)| v + n.data[i % lenb])
                .collect(),
        })
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Matrix {
        Matrix {
            cols: self.cols,
            rows: self.rows,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// `+1` for positive values, `-1` otherwise.
    pub fn step(&self) -> Matrix {
        self.map(|v| if v > 0.0 { 1.0 } else { -1.0 })
    }

    /// Split rectification: each value becomes the pair
    /// `[min(v, 0), max(v, 0)]`, doubling the column count.
    pub fn everett(&self) -> Matrix {
        let data = self
            .data
            .iter()
            .flat_map(|&v| [v.min(0.0), v.max(0.0)])
            .collect();
        Matrix {
            cols: 2 * self.cols,
            rows: self.rows,
            data,
        }
    }

    /// Second-order Taylor approximation of softmax, normalised over the
    /// whole matrix: `(1 + v + v²/2) / Σ(1 + v + v²/2)`.
    pub fn taylor_softmax(&self) -> Matrix {
        let taylor = |v: f64| 1.0 + v + v * v / 2.0;
        let sum: f64 = self.data.iter().map(|&v| taylor(v)).sum();
        self.map(|v| taylor(v) / sum)
    }

    /// Scale every row to unit length; all-zero rows are left as they are.
    pub fn normalize(&self) -> Matrix {
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.rows_iter() {
            let sum: f64 = row.iter().map(|v| v * v).sum();
            let length = if sum == 0.0 { 1.0 } else { sum.sqrt() };
            data.extend(row.iter().map(|v| v / length));
        }
        Matrix {
            cols: self.cols,
            rows: self.rows,
            data,
        }
    }

    /// Index of the largest value.
    pub fn argmax(&self) -> usize {
        self.data
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
                if v > bv {
                    (i, v)
                } else {
                    (bi, bv)
                }
            })
            .0
    }

    /// Dot-product attention of each row of `keys` over the rows of
    /// `queries`, read out of `values`.
    ///
    /// For one key row the scores against every query row are softmaxed and
    /// used to weight the value rows; the weighted sum is softmaxed again.
    /// The result has one row per key row and `values.cols` columns.
    pub fn self_attention(queries: &Matrix, keys: &Matrix, values: &Matrix) -> DsResult<Matrix> {
        if queries.cols != keys.cols || queries.rows != values.rows {
            return Err(internal_error!(
                "attention shapes do not line up: queries {}x{}, keys {}x{}, values {}x{}",
                queries.cols,
                queries.rows,
                keys.cols,
                keys.rows,
                values.cols,
                values.rows
            ));
        }
        let mut data = Vec::with_capacity(keys.rows * values.cols);
        let mut scores = vec![0.0; queries.rows];
        for key in keys.rows_iter() {
            for (score, query) in scores.iter_mut().zip(queries.rows_iter()) {
                *score = dot(key, query);
            }
            softmax(&mut scores);

            let mut outputs = vec![0.0; values.cols];
            for (&weight, row) in scores.iter().zip(values.rows_iter()) {
                for (out, v) in outputs.iter_mut().zip(row) {
                    *out += weight * v;
                }
            }
            softmax(&mut outputs);
            data.extend(outputs);
        }
        Ok(Matrix {
            cols: values.cols,
            rows: keys.rows,
            data,
        })
    }
}

fn dot(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// In-place softmax, shifted by the largest value.
fn softmax(values: &mut [f64]) {
    let max = values.iter().copied().fold(0.0, f64::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}
