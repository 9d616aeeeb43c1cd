//! One-dimensional root finders.

use super::MathError;

/// Brent's method on a sign-change bracket `[a, b]`.
///
/// Converges when the bracket half-width falls below `x_tol + r_tol * |x|` or the
/// function value is exactly zero. Guaranteed to converge for continuous `f` given a
/// genuine sign change.
///
/// # Errors
/// - [`MathError::NoSignChange`] when `f(a)` and `f(b)` share a sign.
/// - [`MathError::NonConvergence`] after `max_iter` iterations.
///
/// # Examples
/// ```rust
/// use normprod::math::brent;
///
/// let root = brent(|x| x * x - 2.0, 0.0, 2.0, 1e-14, 0.0, 100).unwrap();
/// assert!((root - 2.0_f64.sqrt()).abs() < 1e-12);
/// ```
pub fn brent<F>(
    f: F,
    a: f64,
    b: f64,
    x_tol: f64,
    r_tol: f64,
    max_iter: usize,
) -> Result<f64, MathError>
where
    F: Fn(f64) -> f64,
{
    if !(x_tol > 0.0) || !(r_tol >= 0.0) {
        return Err(MathError::InvalidInput("x_tol must be > 0 and r_tol >= 0"));
    }
    if max_iter == 0 {
        return Err(MathError::InvalidInput("max_iter must be > 0"));
    }

    let mut x_pre = a;
    let mut x_cur = b;
    let mut f_pre = f(x_pre);
    let mut f_cur = f(x_cur);

    if f_pre == 0.0 {
        return Ok(x_pre);
    }
    if f_cur == 0.0 {
        return Ok(x_cur);
    }
    if f_pre.signum() == f_cur.signum() {
        return Err(MathError::NoSignChange);
    }

    let mut x_blk = 0.0;
    let mut f_blk = 0.0;
    let mut s_pre = 0.0;
    let mut s_cur = 0.0;

    for _ in 0..max_iter {
        if f_pre != 0.0 && f_cur != 0.0 && f_pre.signum() != f_cur.signum() {
            x_blk = x_pre;
            f_blk = f_pre;
            s_pre = x_cur - x_pre;
            s_cur = s_pre;
        }
        if f_blk.abs() < f_cur.abs() {
            x_pre = x_cur;
            x_cur = x_blk;
            x_blk = x_pre;
            f_pre = f_cur;
            f_cur = f_blk;
            f_blk = f_pre;
        }

        let delta = 0.5 * (x_tol + r_tol * x_cur.abs());
        let s_bis = 0.5 * (x_blk - x_cur);
        if f_cur == 0.0 || s_bis.abs() < delta {
            return Ok(x_cur);
        }

        if s_pre.abs() > delta && f_cur.abs() < f_pre.abs() {
            let s_try = if x_pre == x_blk {
                // secant
                -f_cur * (x_cur - x_pre) / (f_cur - f_pre)
            } else {
                // inverse quadratic interpolation
                let d_pre = (f_pre - f_cur) / (x_pre - x_cur);
                let d_blk = (f_blk - f_cur) / (x_blk - x_cur);
                -f_cur * (f_blk * d_blk - f_pre * d_pre) / (d_blk * d_pre * (f_blk - f_pre))
            };
            if 2.0 * s_try.abs() < s_pre.abs().min(3.0 * s_bis.abs() - delta) {
                s_pre = s_cur;
                s_cur = s_try;
            } else {
                s_pre = s_bis;
                s_cur = s_bis;
            }
        } else {
            s_pre = s_bis;
            s_cur = s_bis;
        }

        x_pre = x_cur;
        f_pre = f_cur;
        if s_cur.abs() > delta {
            x_cur += s_cur;
        } else {
            x_cur += if s_bis > 0.0 { delta } else { -delta };
        }
        f_cur = f(x_cur);
    }

    Err(MathError::NonConvergence)
}

/// Derivative-free secant iteration started from `x0` and `x1`.
///
/// Stops when `|f(x)| <= f_tol` or the step is below `x_tol * (1 + |x|)`.
///
/// # Errors
/// [`MathError::NonConvergence`] on a flat secant, a non-finite iterate, or after
/// `max_iter` steps.
pub fn secant<F>(
    f: F,
    x0: f64,
    x1: f64,
    x_tol: f64,
    f_tol: f64,
    max_iter: usize,
) -> Result<f64, MathError>
where
    F: Fn(f64) -> f64,
{
    if !(x_tol > 0.0) || !(f_tol >= 0.0) {
        return Err(MathError::InvalidInput("x_tol must be > 0 and f_tol >= 0"));
    }
    if max_iter == 0 {
        return Err(MathError::InvalidInput("max_iter must be > 0"));
    }

    let mut x_prev = x0;
    let mut x = x1;
    let mut f_prev = f(x_prev);
    let mut fx = f(x);

    for _ in 0..max_iter {
        if !fx.is_finite() || !x.is_finite() {
            return Err(MathError::NonConvergence);
        }
        if fx.abs() <= f_tol {
            return Ok(x);
        }
        let denom = fx - f_prev;
        if denom == 0.0 {
            return Err(MathError::NonConvergence);
        }
        let x_next = x - fx * (x - x_prev) / denom;
        if (x_next - x).abs() <= x_tol * (1.0 + x.abs()) {
            return Ok(x_next);
        }
        x_prev = x;
        f_prev = fx;
        x = x_next;
        fx = f(x);
    }

    Err(MathError::NonConvergence)
}
