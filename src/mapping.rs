//! Inversion of the isoparametric mapping: recover the reference coordinates
//! of a physical point inside a curvilinear quad or hex element.
//!
//! The forward map `x(r) = sum_n N_n(r) x_n` is polynomial; its inverse is
//! computed with a damped Newton iteration on the residual `pt - x(r)`, using
//! the adjugate of the Jacobian so the linear solve is exact for any spatial
//! dimension. Reference coordinates are clamped to a slightly enlarged
//! reference element so the iteration tolerates exterior points without
//! wandering off, and the iteration stops as soon as the residual grows.
//!
//! Non-convergence is not an error: the caller gets the best reference
//! location found and the inside/outside flag, mirroring the donor-search
//! usage where most queried points lie outside most candidate elements.
use crate::{
    basis::{element_shape, ShapeBasis},
    linalg::{adjugate_into, determinant},
    Error, Point, Result,
};
use gauss_quad::GaussLegendre;
use log::debug;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// Newton iteration cap for the inverse mapping
pub const MAX_NEWTON_ITER: usize = 20;
/// Fraction of the Newton step actually taken
pub const NEWTON_DAMPING: f64 = 0.8;
/// Reference coordinates are kept within `[-REF_CLAMP, REF_CLAMP]`
pub const REF_CLAMP: f64 = 1.01;
/// A point is inside the element if all its reference coordinates are
/// within `[-1 - INSIDE_TOL, 1 + INSIDE_TOL]`
pub const INSIDE_TOL: f64 = 1e-10;

/// Axis-aligned bounding box of a flat coordinate buffer
#[must_use]
pub fn bounding_box<const D: usize>(xv: &[f64]) -> (Point<D>, Point<D>) {
    let mut lo = Point::<D>::from_element(f64::MAX);
    let mut hi = Point::<D>::from_element(f64::MIN);
    for x in xv.chunks(D) {
        for d in 0..D {
            lo[d] = lo[d].min(x[d]);
            hi[d] = hi[d].max(x[d]);
        }
    }
    (lo, hi)
}

/// Physical position of a reference-space location
#[must_use]
pub fn physical_position<const D: usize>(
    basis: &dyn ShapeBasis,
    xv: &[f64],
    loc: &Point<D>,
) -> Point<D> {
    let shape = basis.shape(loc.as_slice());
    let mut pos = Point::<D>::zeros();
    for (n, s) in shape.iter().enumerate() {
        for d in 0..D {
            pos[d] += s * xv[n * D + d];
        }
    }
    pos
}

/// Reference coordinates of physical point `pt` in the element with node
/// coordinates `xv`, and whether the point lies inside the element.
///
/// The Newton iteration starts from the element center, takes damped steps
/// and clamps the iterate to the slightly enlarged reference element. The
/// convergence tolerance scales with the smallest bounding-box edge. For a
/// point outside the element the returned location is the clamped iterate
/// where the search stopped.
#[must_use]
pub fn ref_location<const D: usize>(
    basis: &dyn ShapeBasis,
    xv: &[f64],
    pt: &Point<D>,
) -> (Point<D>, bool) {
    let n_nodes = basis.n_nodes();
    debug_assert_eq!(basis.dim(), D);
    debug_assert_eq!(xv.len(), n_nodes * D);

    let (lo, hi) = bounding_box::<D>(xv);
    let mut h = f64::MAX;
    for d in 0..D {
        h = h.min(hi[d] - lo[d]);
    }
    let tol = 1e-10 * h;

    let mut r = Point::<D>::zeros();
    let mut shape = vec![0.0; n_nodes];
    let mut deriv = vec![0.0; n_nodes * D];
    let mut jac = vec![0.0; D * D];
    let mut adj = vec![0.0; D * D];
    let mut prev_norm = f64::MAX;

    for iter in 0..MAX_NEWTON_ITER {
        basis.shape_into(r.as_slice(), &mut shape);
        let mut f = *pt;
        for n in 0..n_nodes {
            for d in 0..D {
                f[d] -= shape[n] * xv[n * D + d];
            }
        }
        let norm = f.norm();
        if norm < tol {
            break;
        }
        if norm > prev_norm {
            debug!("Newton residual grew at iteration {iter}: |f| = {norm:.3e}");
            break;
        }
        prev_norm = norm;

        basis.deriv_into(r.as_slice(), &mut deriv);
        jac.fill(0.0);
        for n in 0..n_nodes {
            for d in 0..D {
                for e in 0..D {
                    jac[d * D + e] += deriv[n * D + e] * xv[n * D + d];
                }
            }
        }
        let det = determinant(&jac, D);
        if det == 0.0 {
            debug!("singular Jacobian at iteration {iter}");
            break;
        }
        adjugate_into(&jac, &mut adj, D);

        for d in 0..D {
            let mut dr = 0.0;
            for e in 0..D {
                dr += adj[d * D + e] * f[e];
            }
            r[d] = (NEWTON_DAMPING * dr / det + r[d]).clamp(-REF_CLAMP, REF_CLAMP);
        }
    }

    let inside = (0..D).all(|d| r[d].abs() <= 1.0 + INSIDE_TOL);
    (r, inside)
}

pub(crate) fn element_basis<const D: usize>(xv: &[f64]) -> Result<Box<dyn ShapeBasis>> {
    if xv.len() % D != 0 {
        return Err(Error::from(&format!(
            "coordinate buffer of {} entries is not a multiple of the dimension {D}",
            xv.len()
        )));
    }
    element_shape::<D>(xv.len() / D)
}

/// [`ref_location`] with the basis inferred from the coordinate buffer
pub fn locate_point<const D: usize>(xv: &[f64], pt: &Point<D>) -> Result<(Point<D>, bool)> {
    let basis = element_basis::<D>(xv)?;
    Ok(ref_location(basis.as_ref(), xv, pt))
}

/// Interpolation weights of physical point `pt` in the element with node
/// coordinates `xv`: the shape-function values at the reference location
/// found by [`ref_location`]. The weights sum to 1 and reduce to the `k`-th
/// unit vector when `pt` is the `k`-th node.
pub fn interpolation_weights<const D: usize>(xv: &[f64], pt: &Point<D>) -> Result<(Vec<f64>, bool)> {
    let basis = element_basis::<D>(xv)?;
    let (r, inside) = ref_location(basis.as_ref(), xv, pt);
    Ok((basis.shape(r.as_slice()), inside))
}

/// Volume (area in 2-D) of the element with node coordinates `xv`, by
/// Gauss-Legendre quadrature of the Jacobian determinant.
///
/// A non-positive determinant at any quadrature point means the element is
/// inverted or degenerate and yields an error.
pub fn element_volume<const D: usize>(xv: &[f64]) -> Result<f64> {
    let basis = element_basis::<D>(xv)?;
    let n_nodes = basis.n_nodes();

    // Smallest tensor rule with at least as many points as element nodes
    let mut n_1d: usize = 2;
    while n_1d.pow(D as u32) < n_nodes {
        n_1d += 1;
    }
    let rule = GaussLegendre::new(n_1d)
        .map_err(|e| Error::from(&format!("cannot build a {n_1d}-point Gauss rule: {e:?}")))?;
    let pts = rule.into_node_weight_pairs();

    let n_quad = n_1d.pow(D as u32);
    let basis = basis.as_ref();
    let tables = (0..n_quad)
        .into_par_iter()
        .map(|q| {
            let mut loc = [0.0; D];
            let mut w = 1.0;
            let mut rem = q;
            for l in &mut loc {
                let (x, wd) = pts[rem % n_1d];
                *l = x;
                w *= wd;
                rem /= n_1d;
            }
            (w, basis.deriv(&loc))
        })
        .collect::<Vec<_>>();

    let mut vol = 0.0;
    let mut jac = vec![0.0; D * D];
    for (w, deriv) in &tables {
        jac.fill(0.0);
        for n in 0..n_nodes {
            for d in 0..D {
                for e in 0..D {
                    jac[d * D + e] += deriv[n * D + e] * xv[n * D + d];
                }
            }
        }
        let det = determinant(&jac, D);
        if det <= 0.0 {
            return Err(Error::from(&format!(
                "non-positive Jacobian determinant ({det:.3e}): the element is inverted or degenerate"
            )));
        }
        vol += w * det;
    }
    Ok(vol)
}

#[cfg(test)]
mod tests {
    use super::{
        bounding_box, element_volume, interpolation_weights, locate_point, physical_position,
        ref_location,
    };
    use crate::{
        assert_delta,
        basis::element_shape,
        ordering::{hex_node_map, quad_node_map},
        Point, Result,
    };
    use env_logger::Env;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn _init_log(level: &str) {
        env_logger::Builder::from_env(Env::default().default_filter_or(level))
            .format_timestamp(None)
            .init();
    }

    const fn ref_coord(i: usize, n_side: usize) -> f64 {
        2.0 * (i as f64) / ((n_side - 1) as f64) - 1.0
    }

    /// Node coordinates of a quad element: the reference nodes pushed
    /// through `warp`, in external ordering
    fn quad_coords<F: Fn(f64, f64) -> [f64; 2]>(n_nodes: usize, warp: F) -> Vec<f64> {
        let map = quad_node_map(n_nodes).unwrap();
        let n_side = (n_nodes as f64).sqrt().round() as usize;
        let mut xv = Vec::with_capacity(2 * n_nodes);
        for &ijk in &map.ext_to_ijk {
            let x = warp(ref_coord(ijk % n_side, n_side), ref_coord(ijk / n_side, n_side));
            xv.extend_from_slice(&x);
        }
        xv
    }

    fn hex_coords<F: Fn(f64, f64, f64) -> [f64; 3]>(n_nodes: usize, warp: F) -> Vec<f64> {
        let map = hex_node_map(n_nodes).unwrap();
        let n_side = (n_nodes as f64).cbrt().round() as usize;
        let mut xv = Vec::with_capacity(3 * n_nodes);
        for &ijk in &map.ext_to_ijk {
            let x = warp(
                ref_coord(ijk % n_side, n_side),
                ref_coord((ijk / n_side) % n_side, n_side),
                ref_coord(ijk / (n_side * n_side), n_side),
            );
            xv.extend_from_slice(&x);
        }
        xv
    }

    #[test]
    fn test_bounding_box() {
        let xv = quad_coords(4, |x, y| [2.0 * x + 1.0, 3.0 * y - 1.0]);
        let (lo, hi) = bounding_box::<2>(&xv);
        assert_delta!(lo[0], -1.0, 1e-12);
        assert_delta!(hi[0], 3.0, 1e-12);
        assert_delta!(lo[1], -4.0, 1e-12);
        assert_delta!(hi[1], 2.0, 1e-12);
    }

    #[test]
    fn test_physical_position() -> Result<()> {
        let xv = quad_coords(9, |x, y| [x + 2.0, y - 1.0]);
        let basis = element_shape::<2>(9)?;
        let pos = physical_position(basis.as_ref(), &xv, &Point::<2>::new(0.5, -0.25));
        assert_delta!(pos[0], 2.5, 1e-12);
        assert_delta!(pos[1], -1.25, 1e-12);
        Ok(())
    }

    #[test]
    fn test_newton_quad() -> Result<()> {
        let warp = |x: f64, y: f64| {
            [
                1.5f64.mul_add(x, 0.2 * y) + 0.1 * x * y,
                2.0f64.mul_add(y, -0.3 * x) + 0.08 * x * x,
            ]
        };
        let mut rng = StdRng::seed_from_u64(1234);
        for n_nodes in [4, 9, 16] {
            let xv = quad_coords(n_nodes, warp);
            let basis = element_shape::<2>(n_nodes)?;
            for _ in 0..10 {
                let r0 =
                    Point::<2>::new(1.8 * rng.random::<f64>() - 0.9, 1.8 * rng.random::<f64>() - 0.9);
                let pt = physical_position(basis.as_ref(), &xv, &r0);
                let (r, inside) = ref_location(basis.as_ref(), &xv, &pt);
                assert!(inside);
                assert_delta!(r[0], r0[0], 1e-8);
                assert_delta!(r[1], r0[1], 1e-8);
                let back = physical_position(basis.as_ref(), &xv, &r);
                assert_delta!((back - pt).norm(), 0.0, 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn test_newton_hex() -> Result<()> {
        let warp = |x: f64, y: f64, z: f64| {
            [
                x + 0.1 * y * z,
                1.3f64.mul_add(y, 0.05 * x * x),
                2.0f64.mul_add(z, 0.1 * x),
            ]
        };
        let mut rng = StdRng::seed_from_u64(5678);
        for n_nodes in [8, 27] {
            let xv = hex_coords(n_nodes, warp);
            let basis = element_shape::<3>(n_nodes)?;
            for _ in 0..10 {
                let r0 = Point::<3>::new(
                    1.8 * rng.random::<f64>() - 0.9,
                    1.8 * rng.random::<f64>() - 0.9,
                    1.8 * rng.random::<f64>() - 0.9,
                );
                let pt = physical_position(basis.as_ref(), &xv, &r0);
                let (r, inside) = ref_location(basis.as_ref(), &xv, &pt);
                assert!(inside);
                for d in 0..3 {
                    assert_delta!(r[d], r0[d], 1e-8);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_newton_outside() -> Result<()> {
        let xv = quad_coords(4, |x, y| [x, y]);
        let (r, inside) = locate_point::<2>(&xv, &Point::<2>::new(5.0, 0.0))?;
        assert!(!inside);
        // The iterate stays clamped to the enlarged reference element
        assert!(r[0] <= 1.01 + 1e-12);
        let (_, inside) = locate_point::<2>(&xv, &Point::<2>::new(0.3, -0.7))?;
        assert!(inside);
        Ok(())
    }

    #[test]
    fn test_interpolation_weights() -> Result<()> {
        let xv = quad_coords(9, |x, y| [2.0f64.mul_add(x, 0.1 * y), 1.5 * y]);
        // At a node, the weights reduce to the unit vector of that node
        for k in 0..9 {
            let pt = Point::<2>::new(xv[2 * k], xv[2 * k + 1]);
            let (w, inside) = interpolation_weights::<2>(&xv, &pt)?;
            assert!(inside);
            let sum: f64 = w.iter().sum();
            assert_delta!(sum, 1.0, 1e-9);
            for (i, &wi) in w.iter().enumerate() {
                let expected = if i == k { 1.0 } else { 0.0 };
                assert_delta!(wi, expected, 1e-8);
            }
        }
        Ok(())
    }

    #[test]
    fn test_volume() -> Result<()> {
        // Quad scaled by 2 in x: twice the reference area
        let xv = quad_coords(4, |x, y| [2.0 * x, y]);
        assert_delta!(element_volume::<2>(&xv)?, 8.0, 1e-12);

        let xv = quad_coords(9, |x, y| [x, y]);
        assert_delta!(element_volume::<2>(&xv)?, 4.0, 1e-12);

        let xv = hex_coords(8, |x, y, z| [x, y, z]);
        assert_delta!(element_volume::<3>(&xv)?, 8.0, 1e-12);

        let xv = hex_coords(27, |x, y, z| [x, 2.0 * y, z]);
        assert_delta!(element_volume::<3>(&xv)?, 16.0, 1e-12);
        Ok(())
    }

    #[test]
    fn test_volume_curved() -> Result<()> {
        // Quadratic warp: x = xi + 0.1 eta^2, y = eta. det J = 1 everywhere,
        // so the area is unchanged
        let xv = quad_coords(9, |x, y| [x + 0.1 * y * y, y]);
        assert_delta!(element_volume::<2>(&xv)?, 4.0, 1e-10);
        Ok(())
    }

    #[test]
    fn test_inverted_element() {
        // Mirrored in x: negative Jacobian everywhere
        let xv = quad_coords(4, |x, y| [-x, y]);
        assert!(element_volume::<2>(&xv).is_err());

        let xv = hex_coords(8, |x, y, z| [-x, y, z]);
        assert!(element_volume::<3>(&xv).is_err());
    }

    #[test]
    fn test_bad_buffers() {
        assert!(locate_point::<2>(&[0.0; 7], &Point::<2>::zeros()).is_err());
        assert!(element_volume::<2>(&[0.0; 14]).is_err());
        assert!(element_volume::<3>(&[0.0; 30]).is_err());
    }
}
