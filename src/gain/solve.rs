//! Least-squares exposure equalization over overlap statistics.
//!
//! For sources `i` and `j` seen together at `N_ij` overlap pixels, with mean brightness
//! `I_ij` (source `i`) and `I_ji` (source `j`), the gains minimize
//!
//! `sum_ij N_ij * ((g_i * I_ij - g_j * I_ji)^2 / SIGMA_N^2 + (1 - g_i)^2 / SIGMA_G^2)`
//!
//! which keeps every gain near 1 while pulling overlapping sources together. Each source
//! carries one prior observation of itself so sources without overlap solve to exactly 1.

use nalgebra::{DMatrix, DVector};

/// Brightness noise sigma.
pub const SIGMA_N: f64 = 10.0;
/// Gain prior sigma.
pub const SIGMA_G: f64 = 0.1;

/// Pairwise overlap accumulator for one output template.
#[derive(Clone, Debug)]
pub(crate) struct OverlapStats {
    sources: usize,
    count: Vec<f64>,
    sum: Vec<f64>,
}

impl OverlapStats {
    pub(crate) fn new(sources: usize) -> Self {
        Self {
            sources,
            count: vec![0.0; sources * sources],
            sum: vec![0.0; sources * sources],
        }
    }

    /// Record one overlap pixel given `(source, brightness)` for each contribution.
    pub(crate) fn observe(&mut self, samples: &[(usize, f32)]) {
        for (a, &(i, li)) in samples.iter().enumerate() {
            for &(j, lj) in samples.iter().skip(a + 1) {
                if i == j {
                    continue;
                }
                self.add(i, j, li);
                self.add(j, i, lj);
            }
        }
    }

    fn add(&mut self, i: usize, j: usize, brightness: f32) {
        let k = i * self.sources + j;
        self.count[k] += 1.0;
        self.sum[k] += f64::from(brightness);
    }

    /// Overlap pixel count between `i` and `j`.
    pub(crate) fn count(&self, i: usize, j: usize) -> f64 {
        self.count[i * self.sources + j]
    }

    /// Mean brightness of source `i` where it overlaps `j`.
    pub(crate) fn mean(&self, i: usize, j: usize) -> f64 {
        let n = self.count(i, j);
        if n > 0.0 {
            self.sum[i * self.sources + j] / n
        } else {
            0.0
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count.iter().all(|&c| c == 0.0)
    }
}

/// Solve the normal equations; `None` when the system is singular or the result is not finite.
pub(crate) fn solve_gains(stats: &OverlapStats) -> Option<Vec<f32>> {
    let n = stats.sources;
    let alpha = 1.0 / (SIGMA_N * SIGMA_N);
    let beta = 1.0 / (SIGMA_G * SIGMA_G);

    let mut a = DMatrix::<f64>::zeros(n, n);
    let mut b = DVector::<f64>::zeros(n);
    for i in 0..n {
        a[(i, i)] += beta;
        b[i] += beta;
        for j in 0..n {
            if i == j {
                continue;
            }
            let nij = stats.count(i, j);
            if nij == 0.0 {
                continue;
            }
            let iij = stats.mean(i, j);
            let iji = stats.mean(j, i);
            a[(i, i)] += beta * nij + 2.0 * alpha * iij * iij * nij;
            b[i] += beta * nij;
            a[(i, j)] -= 2.0 * alpha * iij * iji * nij;
        }
    }

    let solved = a.lu().solve(&b)?;
    if solved.iter().any(|g| !g.is_finite()) {
        return None;
    }
    Some(solved.iter().map(|&g| g as f32).collect())
}

#[cfg(test)]
#[path = "../../tests/unit/gain/solve.rs"]
mod tests;
