//! Closed-form proximal operators shared by all update rules.
//!
//! Both solvers are pure functions. The pointwise form handles the
//! elastic-net penalty `l1*|w| + (l2/2)*w^2`; the group form additionally
//! applies an L1/2 (group-lasso) penalty over a whole embedding, zeroing
//! it as a unit when the dual norm falls under the group threshold.

/// Pointwise soft-threshold.
///
/// Solves `argmin_w 0.5*(1/eta)*(w - eta*z)^2 + l1*|w| + (l2/2)*w^2`, i.e.
/// returns `0` when `|z| <= l1` and `(z - sign(z)*l1) / (l2 + 1/eta)`
/// otherwise. The sign convention is `z > 0` implies `w > 0`; callers in
/// the FTRL family pass `-z` for their dual variable.
///
/// # Example
///
/// ```
/// use fmps_optimizer::prox;
///
/// assert_eq!(prox(0.0, 0.1, 0.1, 0.0), 0.0);
/// assert_eq!(prox(0.05, 0.1, 0.1, 0.0), 0.0);
/// assert!((prox(0.5, 0.1, 0.1, 0.0) - 0.04).abs() < 1e-6);
/// ```
#[inline]
pub fn prox(z: f32, eta: f32, l1: f32, l2: f32) -> f32 {
    if z.abs() <= l1 {
        0.0
    } else if z > 0.0 {
        (z - l1) / (l2 + 1.0 / eta)
    } else {
        (z + l1) / (l2 + 1.0 / eta)
    }
}

/// Group soft-threshold over a whole embedding.
///
/// The coordinates are first shrunk pointwise by `l1`, then the group
/// decision is taken on the L2 norm `R` of the shrunk vector: when
/// `R < l1_2 * sqrt(n)` the entire embedding is zeroed and the group goes
/// inactive. Otherwise each coordinate gets the FTRL-style closed form
/// `w_i = -(1/(l2 + 1/eta_i)) * (1 - l1_2/R) * s_i`.
///
/// `etas` carries the per-coordinate effective learning rates; the caller
/// derives them from the embedding's own `alpha`/`beta`, which may differ
/// from the linear weight's.
///
/// Returns whether the group is active. Output is written into `w`.
///
/// # Panics
///
/// Panics if `z`, `etas` and `w` do not all have the same length.
pub fn prox_group(z: &[f32], etas: &[f32], l1: f32, l2: f32, l1_2: f32, w: &mut [f32]) -> bool {
    assert_eq!(z.len(), etas.len());
    assert_eq!(z.len(), w.len());

    let n = z.len();
    let shrink = |zi: f32| -> f32 {
        if zi.abs() <= l1 {
            0.0
        } else if zi > 0.0 {
            zi - l1
        } else {
            zi + l1
        }
    };

    let norm_sq: f32 = z.iter().map(|&zi| shrink(zi) * shrink(zi)).sum();
    let radius = norm_sq.sqrt();

    if radius < l1_2 * (n as f32).sqrt() {
        w.fill(0.0);
        return false;
    }

    // radius > 0 here whenever l1_2 > 0; with l1_2 == 0 the scale is 1.
    let scale = if l1_2 > 0.0 { 1.0 - l1_2 / radius } else { 1.0 };
    for i in 0..n {
        w[i] = -(1.0 / (l2 + 1.0 / etas[i])) * scale * shrink(z[i]);
    }
    true
}
