//! Globally adaptive Gauss-Kronrod (7/15) quadrature.
//!
//! Follows the QUADPACK `QAG` scheme: the interval with the largest error estimate is
//! bisected until the summed estimate meets `max(abs_tol, rel_tol * |I|)` or the
//! subdivision cap is reached. The error estimate uses the QUADPACK rescaling of
//! `|K15 - G7|`, which is conservative for smooth integrands.
//!
//! Reference: Piessens et al., *QUADPACK* (1983), routines `QK15` and `QAG`.

use super::MathError;

/// Kronrod abscissae on `[0, 1]`, descending; odd indices are the Gauss nodes.
const XGK: [f64; 8] = [
    0.991_455_371_120_812_6,
    0.949_107_912_342_758_5,
    0.864_864_423_359_769_1,
    0.741_531_185_599_394_4,
    0.586_087_235_467_691_1,
    0.405_845_151_377_397_2,
    0.207_784_955_007_898_5,
    0.0,
];

const WGK: [f64; 8] = [
    0.022_935_322_010_529_22,
    0.063_092_092_629_978_55,
    0.104_790_010_322_250_2,
    0.140_653_259_715_525_9,
    0.169_004_726_639_267_9,
    0.190_350_578_064_785_4,
    0.204_432_940_075_298_9,
    0.209_482_141_084_727_8,
];

/// Gauss 7-point weights for `XGK[1]`, `XGK[3]`, `XGK[5]`, `XGK[7]`.
const WG: [f64; 4] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
];

/// Outcome of [`integrate_adaptive`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureResult {
    pub value: f64,
    pub abs_error: f64,
    /// Number of sub-intervals in the final partition.
    pub intervals: usize,
    /// True when the error estimate met the requested tolerance.
    pub converged: bool,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    a: f64,
    b: f64,
    value: f64,
    error: f64,
}

fn gauss_kronrod_15<F>(f: &F, a: f64, b: f64) -> Segment
where
    F: Fn(f64) -> f64,
{
    let center = 0.5 * (a + b);
    let half = 0.5 * (b - a);

    let f_center = f(center);
    let mut res_k = f_center * WGK[7];
    let mut res_g = f_center * WG[3];
    let mut res_abs = res_k.abs();

    let mut f1 = [0.0_f64; 7];
    let mut f2 = [0.0_f64; 7];
    for j in 0..7 {
        let dx = half * XGK[j];
        let lo = f(center - dx);
        let hi = f(center + dx);
        f1[j] = lo;
        f2[j] = hi;
        res_k += WGK[j] * (lo + hi);
        res_abs += WGK[j] * (lo.abs() + hi.abs());
        if j % 2 == 1 {
            res_g += WG[j / 2] * (lo + hi);
        }
    }

    let mean = 0.5 * res_k;
    let mut res_asc = WGK[7] * (f_center - mean).abs();
    for j in 0..7 {
        res_asc += WGK[j] * ((f1[j] - mean).abs() + (f2[j] - mean).abs());
    }

    let value = res_k * half;
    let res_abs = res_abs * half.abs();
    let res_asc = res_asc * half.abs();
    let mut error = ((res_k - res_g) * half).abs();

    if res_asc != 0.0 && error != 0.0 {
        error = res_asc * (200.0 * error / res_asc).powf(1.5).min(1.0);
    }
    if res_abs > f64::MIN_POSITIVE / (50.0 * f64::EPSILON) {
        error = error.max(50.0 * f64::EPSILON * res_abs);
    }

    Segment { a, b, value, error }
}

/// Integrates `f` over `[a, b]` with globally adaptive 15-point Gauss-Kronrod.
///
/// Returns `Ok` with `converged == false` when the subdivision cap is hit before the
/// tolerance is met; the caller decides whether that estimate is usable.
///
/// # Errors
/// - [`MathError::InvalidInput`] for a non-finite interval, non-positive tolerances or a
///   zero subdivision cap.
/// - [`MathError::NonConvergence`] when the integrand produces a non-finite value.
///
/// # Examples
/// ```rust
/// use normprod::math::integrate_adaptive;
///
/// let r = integrate_adaptive(|x: f64| x.sin(), 0.0, std::f64::consts::PI, 1e-12, 1e-12, 50)
///     .unwrap();
/// assert!(r.converged);
/// assert!((r.value - 2.0).abs() < 1e-12);
/// ```
pub fn integrate_adaptive<F>(
    f: F,
    a: f64,
    b: f64,
    abs_tol: f64,
    rel_tol: f64,
    max_subdivisions: usize,
) -> Result<QuadratureResult, MathError>
where
    F: Fn(f64) -> f64,
{
    if !a.is_finite() || !b.is_finite() {
        return Err(MathError::InvalidInput("integration bounds must be finite"));
    }
    if !(abs_tol > 0.0) || !(rel_tol > 0.0) {
        return Err(MathError::InvalidInput("tolerances must be positive"));
    }
    if max_subdivisions == 0 {
        return Err(MathError::InvalidInput("max_subdivisions must be > 0"));
    }
    if a == b {
        return Ok(QuadratureResult {
            value: 0.0,
            abs_error: 0.0,
            intervals: 1,
            converged: true,
        });
    }

    let first = gauss_kronrod_15(&f, a, b);
    if !first.value.is_finite() || !first.error.is_finite() {
        return Err(MathError::NonConvergence);
    }

    let mut segments = Vec::with_capacity(max_subdivisions.min(1024));
    segments.push(first);
    let mut total = first.value;
    let mut total_error = first.error;

    loop {
        let tolerance = abs_tol.max(rel_tol * total.abs());
        if total_error <= tolerance {
            return Ok(QuadratureResult {
                value: total,
                abs_error: total_error,
                intervals: segments.len(),
                converged: true,
            });
        }
        if segments.len() >= max_subdivisions {
            break;
        }

        let (worst, _) = segments
            .iter()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |(bi, be), (i, s)| {
                if s.error > be { (i, s.error) } else { (bi, be) }
            });
        let seg = segments.swap_remove(worst);
        let mid = 0.5 * (seg.a + seg.b);
        if mid <= seg.a || mid >= seg.b {
            // Interval no longer splittable in floating point.
            segments.push(seg);
            break;
        }

        let left = gauss_kronrod_15(&f, seg.a, mid);
        let right = gauss_kronrod_15(&f, mid, seg.b);
        if !left.value.is_finite() || !right.value.is_finite() {
            return Err(MathError::NonConvergence);
        }

        total += left.value + right.value - seg.value;
        total_error += left.error + right.error - seg.error;
        segments.push(left);
        segments.push(right);
    }

    // Re-sum from the partition to shed accumulated cancellation in the running totals.
    let value = segments.iter().map(|s| s.value).sum::<f64>();
    let abs_error = segments.iter().map(|s| s.error).sum::<f64>();
    Ok(QuadratureResult {
        value,
        abs_error,
        intervals: segments.len(),
        converged: abs_error <= abs_tol.max(rel_tol * value.abs()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{normal_cdf, normal_pdf};
    use approx::assert_relative_eq;

    #[test]
    fn integrates_polynomials_exactly_in_one_pass() {
        let r = integrate_adaptive(|x| x.powi(4), 0.0, 1.0, 1e-14, 1e-14, 10).unwrap();
        assert_relative_eq!(r.value, 0.2, epsilon = 1e-14);
        assert_eq!(r.intervals, 1);
        assert!(r.converged);
    }

    #[test]
    fn normal_density_mass_over_ten_sigma() {
        let (mu, sigma) = (100.0, 35.8305);
        let r = integrate_adaptive(
            |x| normal_pdf(x, mu, sigma),
            mu - 10.0 * sigma,
            mu + 10.0 * sigma,
            1e-12,
            1e-10,
            200,
        )
        .unwrap();
        assert!(r.converged);
        assert_relative_eq!(r.value, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn step_integrand_converges_by_refinement() {
        let r = integrate_adaptive(
            |x| if x < 0.3 { 1.0 } else { 0.0 },
            0.0,
            1.0,
            1e-9,
            1e-9,
            200,
        )
        .unwrap();
        assert!(r.intervals > 1);
        assert_relative_eq!(r.value, 0.3, epsilon = 1e-8);
    }

    #[test]
    fn reports_non_convergence_when_cap_is_hit() {
        let r = integrate_adaptive(|x| (1.0 / x).sin(), 1e-6, 1.0, 1e-14, 1e-14, 3).unwrap();
        assert!(!r.converged);
        assert!(r.intervals <= 3);
    }

    #[test]
    fn sharp_cdf_transition_is_resolved() {
        let r = integrate_adaptive(
            |x| normal_cdf(x, 0.5, 1e-4),
            0.0,
            1.0,
            1e-10,
            1e-10,
            200,
        )
        .unwrap();
        assert!(r.converged);
        assert_relative_eq!(r.value, 0.5, epsilon = 1e-8);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(integrate_adaptive(|x| x, 0.0, f64::INFINITY, 1e-8, 1e-8, 10).is_err());
        assert!(integrate_adaptive(|x| x, 0.0, 1.0, 0.0, 1e-8, 10).is_err());
        assert!(integrate_adaptive(|x| x, 0.0, 1.0, 1e-8, 1e-8, 0).is_err());
        assert_eq!(
            integrate_adaptive(|_| f64::NAN, 0.0, 1.0, 1e-8, 1e-8, 10),
            Err(MathError::NonConvergence)
        );
    }
}
