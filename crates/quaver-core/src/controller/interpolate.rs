//! Curve fitting for smooth marker transitions
//!
//! A fit is attempted as a not-a-knot cubic spline first. When that tier
//! cannot be built (too few points or a singular system) the next tier is
//! tried: quadratic spline, then straight lines, then nearest neighbour.

use thiserror::Error;

/// Pivots smaller than this (relative to the row scale) count as singular
const SINGULAR_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("{tier} fit needs {needed} distinct points, got {got}")]
    TooFewPoints { tier: &'static str, needed: usize, got: usize },
    #[error("{tier} fit is singular")]
    Singular { tier: &'static str },
}

/// Index of the segment `[xs[i], xs[i + 1]]` containing `x`
fn segment(xs: &[f64], x: f64) -> usize {
    let upper = xs.partition_point(|&v| v <= x);
    upper.saturating_sub(1).min(xs.len().saturating_sub(2))
}

/// Sort by x and drop repeated x values, keeping the last y seen
fn dedup_points(xs: &[f64], ys: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut points: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut out_x: Vec<f64> = Vec::with_capacity(points.len());
    let mut out_y: Vec<f64> = Vec::with_capacity(points.len());
    for (x, y) in points {
        if out_x.last() == Some(&x) {
            if let Some(last) = out_y.last_mut() {
                *last = y;
            }
            continue;
        }
        out_x.push(x);
        out_y.push(y);
    }
    (out_x, out_y)
}

fn require_points(tier: &'static str, needed: usize, got: usize) -> Result<(), FitError> {
    if got < needed {
        return Err(FitError::TooFewPoints { tier, needed, got });
    }
    Ok(())
}

/// Solve `a * x = b` in place by Gaussian elimination with partial pivoting
fn solve_dense(
    mut a: Vec<Vec<f64>>,
    mut b: Vec<f64>,
    tier: &'static str,
) -> Result<Vec<f64>, FitError> {
    let n = b.len();
    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0f64, |acc, v| acc.max(v.abs()))
        .max(f64::MIN_POSITIVE);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot_row][col].abs() <= SINGULAR_TOLERANCE * scale {
            return Err(FitError::Singular { tier });
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            let (upper, lower) = a.split_at_mut(row);
            for (target, pivot) in lower[0][col..].iter_mut().zip(&upper[col][col..]) {
                *target -= factor * pivot;
            }
            let pivot_rhs = b[col];
            b[row] -= factor * pivot_rhs;
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(FitError::Singular { tier });
    }
    Ok(x)
}

/// Cubic spline with not-a-knot end conditions, stored as second derivatives
#[derive(Debug, Clone)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    second: Vec<f64>,
}

impl CubicSpline {
    pub fn fit(xs: &[f64], ys: &[f64]) -> Result<Self, FitError> {
        let n = xs.len();
        require_points("cubic", 4, n)?;
        let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();

        let mut a = vec![vec![0.0; n]; n];
        let mut b = vec![0.0; n];

        // third derivative continuous across the second knot
        a[0][0] = -h[1];
        a[0][1] = h[0] + h[1];
        a[0][2] = -h[0];

        for i in 1..n - 1 {
            a[i][i - 1] = h[i - 1];
            a[i][i] = 2.0 * (h[i - 1] + h[i]);
            a[i][i + 1] = h[i];
            b[i] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
        }

        // and across the second-to-last knot
        a[n - 1][n - 3] = -h[n - 2];
        a[n - 1][n - 2] = h[n - 3] + h[n - 2];
        a[n - 1][n - 1] = -h[n - 3];

        let second = solve_dense(a, b, "cubic")?;
        Ok(Self { xs: xs.to_vec(), ys: ys.to_vec(), second })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let i = segment(&self.xs, x);
        let h = self.xs[i + 1] - self.xs[i];
        let t = x - self.xs[i];
        let u = self.xs[i + 1] - x;
        let (m0, m1) = (self.second[i], self.second[i + 1]);
        m0 * u.powi(3) / (6.0 * h)
            + m1 * t.powi(3) / (6.0 * h)
            + (self.ys[i] / h - m0 * h / 6.0) * u
            + (self.ys[i + 1] / h - m1 * h / 6.0) * t
    }
}

/// C1 quadratic spline; the first segment is the parabola through the
/// first three points
#[derive(Debug, Clone)]
pub struct QuadraticSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    slopes: Vec<f64>,
    curvatures: Vec<f64>,
}

impl QuadraticSpline {
    pub fn fit(xs: &[f64], ys: &[f64]) -> Result<Self, FitError> {
        let n = xs.len();
        require_points("quadratic", 3, n)?;
        let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
        let d: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

        let leading = (d[1] - d[0]) / (xs[2] - xs[0]);
        let mut slope = d[0] - leading * h[0];

        let mut slopes = Vec::with_capacity(n - 1);
        let mut curvatures = Vec::with_capacity(n - 1);
        for i in 0..n - 1 {
            let curvature = (d[i] - slope) / h[i];
            slopes.push(slope);
            curvatures.push(curvature);
            slope += 2.0 * curvature * h[i];
        }
        if slopes.iter().chain(&curvatures).any(|v| !v.is_finite()) {
            return Err(FitError::Singular { tier: "quadratic" });
        }
        Ok(Self { xs: xs.to_vec(), ys: ys.to_vec(), slopes, curvatures })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let i = segment(&self.xs, x);
        let t = x - self.xs[i];
        self.ys[i] + self.slopes[i] * t + self.curvatures[i] * t * t
    }
}

#[derive(Debug, Clone)]
pub struct LinearCurve {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl LinearCurve {
    pub fn fit(xs: &[f64], ys: &[f64]) -> Result<Self, FitError> {
        require_points("linear", 2, xs.len())?;
        Ok(Self { xs: xs.to_vec(), ys: ys.to_vec() })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let i = segment(&self.xs, x);
        lerp(self.xs[i], self.ys[i], self.xs[i + 1], self.ys[i + 1], x)
    }
}

/// Straight line through `(x0, y0)` and `(x1, y1)` evaluated at `x`
pub fn lerp(x0: f64, y0: f64, x1: f64, y1: f64, x: f64) -> f64 {
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

#[derive(Debug, Clone)]
pub struct NearestCurve {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl NearestCurve {
    pub fn fit(xs: &[f64], ys: &[f64]) -> Result<Self, FitError> {
        require_points("nearest", 1, xs.len())?;
        Ok(Self { xs: xs.to_vec(), ys: ys.to_vec() })
    }

    /// Equidistant points resolve to the earlier marker
    pub fn eval(&self, x: f64) -> f64 {
        if self.xs.len() == 1 {
            return self.ys[0];
        }
        let i = segment(&self.xs, x);
        if x - self.xs[i] <= self.xs[i + 1] - x { self.ys[i] } else { self.ys[i + 1] }
    }
}

/// The smoothest curve the data supports
#[derive(Debug, Clone)]
pub enum SmoothCurve {
    Cubic(CubicSpline),
    Quadratic(QuadraticSpline),
    Linear(LinearCurve),
    Nearest(NearestCurve),
}

impl SmoothCurve {
    pub fn fit(xs: &[f64], ys: &[f64]) -> Result<Self, FitError> {
        let (xs, ys) = dedup_points(xs, ys);

        let err = match CubicSpline::fit(&xs, &ys) {
            Ok(c) => return Ok(Self::Cubic(c)),
            Err(e) => e,
        };
        tracing::debug!(%err, "falling back to quadratic fit");

        let err = match QuadraticSpline::fit(&xs, &ys) {
            Ok(q) => return Ok(Self::Quadratic(q)),
            Err(e) => e,
        };
        tracing::debug!(%err, "falling back to linear fit");

        let err = match LinearCurve::fit(&xs, &ys) {
            Ok(l) => return Ok(Self::Linear(l)),
            Err(e) => e,
        };
        tracing::debug!(%err, "falling back to nearest-neighbour fit");

        NearestCurve::fit(&xs, &ys).map(Self::Nearest)
    }

    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Self::Cubic(c) => c.eval(x),
            Self::Quadratic(q) => q.eval(x),
            Self::Linear(l) => l.eval(x),
            Self::Nearest(n) => n.eval(x),
        }
    }

    pub fn tier(&self) -> &'static str {
        match self {
            Self::Cubic(_) => "cubic",
            Self::Quadratic(_) => "quadratic",
            Self::Linear(_) => "linear",
            Self::Nearest(_) => "nearest",
        }
    }
}
