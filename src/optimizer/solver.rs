//! Constrained Sharpe maximisation
//!
//! Projected-gradient ascent with backtracking. The feasible set is the
//! capped simplex `{sum(w) = 1, 0 <= w <= cap}`, optionally intersected with
//! the half-space `{mu . w >= target}`; projections onto the intersection use
//! Dykstra's alternating algorithm.

const MAX_ITERATIONS: usize = 2_000;
const MIN_STEP: f64 = 1e-12;
const CONVERGENCE: f64 = 1e-12;
const DYKSTRA_ITERATIONS: usize = 5_000;
const BISECTION_ITERATIONS: usize = 200;

pub(crate) struct Problem<'a> {
    pub returns: &'a [f64],
    pub covariance: &'a [Vec<f64>],
    pub risk_free_rate: f64,
    pub cap: f64,
    pub target: Option<f64>,
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

/// Portfolio standard deviation; tiny negative variances from an
/// indefinite heuristic matrix clamp to zero
pub(crate) fn volatility(covariance: &[Vec<f64>], weights: &[f64]) -> f64 {
    dot(weights, &mat_vec(covariance, weights)).max(0.0).sqrt()
}

impl Problem<'_> {
    fn sharpe(&self, w: &[f64]) -> f64 {
        let vol = volatility(self.covariance, w);
        if vol == 0.0 {
            0.0
        } else {
            (dot(self.returns, w) - self.risk_free_rate) / vol
        }
    }

    fn gradient(&self, w: &[f64]) -> Vec<f64> {
        let sigma_w = mat_vec(self.covariance, w);
        let variance = dot(w, &sigma_w).max(0.0);
        let vol = variance.sqrt();
        if vol == 0.0 {
            return self.returns.to_vec();
        }
        let excess = dot(self.returns, w) - self.risk_free_rate;

        self.returns
            .iter()
            .zip(&sigma_w)
            .map(|(mu, sw)| mu / vol - excess * sw / (variance * vol))
            .collect()
    }

    fn project(&self, v: &[f64]) -> Vec<f64> {
        match self.target {
            None => project_capped_simplex(v, self.cap),
            Some(target) => project_intersection(v, self.returns, target, self.cap),
        }
    }

    /// Ascend from the projected equal-weight point
    pub fn solve(&self) -> Vec<f64> {
        let n = self.returns.len();
        let mut w = self.project(&vec![1.0 / n as f64; n]);
        let mut value = self.sharpe(&w);

        for _ in 0..MAX_ITERATIONS {
            let grad = self.gradient(&w);
            let mut step = 1.0;
            let mut improved = None;

            while step > MIN_STEP {
                let trial: Vec<f64> = w.iter().zip(&grad).map(|(x, g)| x + step * g).collect();
                let candidate = self.project(&trial);
                let candidate_value = self.sharpe(&candidate);
                if candidate_value > value {
                    improved = Some((candidate, candidate_value));
                    break;
                }
                step *= 0.5;
            }

            let Some((next, next_value)) = improved else {
                break;
            };

            let moved: f64 = w.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
            w = next;
            value = next_value;
            if moved < CONVERGENCE {
                break;
            }
        }

        w
    }
}

/// Euclidean projection onto `{sum(w) = 1, 0 <= w <= cap}`; requires
/// `len * cap >= 1`. Finds the shift `tau` with `sum(clamp(v - tau)) = 1`.
pub(crate) fn project_capped_simplex(v: &[f64], cap: f64) -> Vec<f64> {
    let clamped_sum = |tau: f64| -> f64 { v.iter().map(|x| (x - tau).clamp(0.0, cap)).sum() };

    let max = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = v.iter().copied().fold(f64::INFINITY, f64::min);
    let (mut lo, mut hi) = (min - cap, max);

    for _ in 0..BISECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if clamped_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let tau = 0.5 * (lo + hi);
    v.iter().map(|x| (x - tau).clamp(0.0, cap)).collect()
}

fn project_halfspace(v: &[f64], normal: &[f64], bound: f64) -> Vec<f64> {
    let value = dot(normal, v);
    let norm_sq = dot(normal, normal);
    if value >= bound || norm_sq == 0.0 {
        return v.to_vec();
    }
    let shift = (bound - value) / norm_sq;
    v.iter().zip(normal).map(|(x, n)| x + shift * n).collect()
}

/// Dykstra's algorithm; the returned point lies exactly in the capped
/// simplex and within solver tolerance of the half-space
pub(crate) fn project_intersection(v: &[f64], returns: &[f64], target: f64, cap: f64) -> Vec<f64> {
    let n = v.len();
    let mut x = v.to_vec();
    let mut p = vec![0.0; n];
    let mut q = vec![0.0; n];
    let mut y = project_capped_simplex(&x, cap);

    for _ in 0..DYKSTRA_ITERATIONS {
        let shifted: Vec<f64> = x.iter().zip(&p).map(|(a, b)| a + b).collect();
        y = project_capped_simplex(&shifted, cap);
        p = shifted.iter().zip(&y).map(|(a, b)| a - b).collect();

        let shifted: Vec<f64> = y.iter().zip(&q).map(|(a, b)| a + b).collect();
        let next = project_halfspace(&shifted, returns, target);
        q = shifted.iter().zip(&next).map(|(a, b)| a - b).collect();

        let change: f64 = x.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        if change < CONVERGENCE && dot(returns, &y) >= target - 1e-10 {
            break;
        }
    }

    y
}

/// Highest return any capped-simplex point can reach: fill the best
/// assets to the cap in order
pub(crate) fn max_attainable_return(returns: &[f64], cap: f64) -> f64 {
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut remaining = 1.0_f64;
    let mut total = 0.0;
    for r in sorted {
        if remaining <= 0.0 {
            break;
        }
        let w = remaining.min(cap);
        total += w * r;
        remaining -= w;
    }
    total
}

/// Scale `weights` to sum to 1 while keeping every entry at or below `cap`.
/// Entries already at the cap are frozen and the rest rescaled until stable.
pub(crate) fn water_fill(weights: &[f64], cap: f64) -> Vec<f64> {
    let mut out = weights.to_vec();
    let mut frozen = vec![false; out.len()];

    for _ in 0..out.len() + 1 {
        let frozen_sum: f64 = out.iter().zip(&frozen).filter(|(_, f)| **f).map(|(w, _)| w).sum();
        let free_sum: f64 = out.iter().zip(&frozen).filter(|(_, f)| !**f).map(|(w, _)| w).sum();
        if free_sum <= 0.0 {
            break;
        }

        let scale = (1.0 - frozen_sum) / free_sum;
        let mut clamped = false;
        for (w, f) in out.iter_mut().zip(frozen.iter_mut()) {
            if *f {
                continue;
            }
            *w *= scale;
            if *w >= cap {
                *w = cap;
                *f = true;
                clamped = true;
            }
        }
        if !clamped {
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(v: &[f64]) -> f64 {
        v.iter().sum()
    }

    #[test]
    fn test_capped_simplex_projection() {
        let w = project_capped_simplex(&[0.9, 0.05, 0.05, 0.0], 0.4);
        assert!((sum(&w) - 1.0).abs() < 1e-9);
        assert!(w.iter().all(|x| *x >= 0.0 && *x <= 0.4 + 1e-12));
        assert!((w[0] - 0.4).abs() < 1e-9);

        let already = project_capped_simplex(&[0.25; 4], 0.5);
        assert!(already.iter().all(|x| (x - 0.25).abs() < 1e-9));
    }

    #[test]
    fn test_intersection_meets_target() {
        let returns = [0.02, 0.05, 0.10];
        let w = project_intersection(&[1.0 / 3.0; 3], &returns, 0.07, 0.6);
        assert!((sum(&w) - 1.0).abs() < 1e-9);
        assert!(dot(&returns, &w) >= 0.07 - 1e-6);
        assert!(w.iter().all(|x| *x >= 0.0 && *x <= 0.6 + 1e-12));
    }

    #[test]
    fn test_max_attainable_return() {
        let r = max_attainable_return(&[0.05, 0.09, 0.07], 0.4);
        assert!((r - (0.4 * 0.09 + 0.4 * 0.07 + 0.2 * 0.05)).abs() < 1e-12);
    }

    #[test]
    fn test_water_fill_respects_cap() {
        let w = water_fill(&[0.3, 0.3, 0.1], 0.4);
        assert!((sum(&w) - 1.0).abs() < 1e-12);
        assert!(w.iter().all(|x| *x <= 0.4 + 1e-12));
        assert!((w[0] - 0.4).abs() < 1e-12);
        assert!((w[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_solver_prefers_better_sharpe() {
        // Two uncorrelated assets; the second has a far better ratio
        let returns = [0.05, 0.10];
        let covariance = vec![vec![0.04, 0.0], vec![0.0, 0.01]];
        let problem = Problem {
            returns: &returns,
            covariance: &covariance,
            risk_free_rate: 0.0,
            cap: 1.0,
            target: None,
        };
        let w = problem.solve();

        // Analytic tangency weights are proportional to inv(S) mu = (1.25, 10)
        assert!((w[1] - 10.0 / 11.25).abs() < 1e-4);
        assert!((sum(&w) - 1.0).abs() < 1e-9);
    }
}
