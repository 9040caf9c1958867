//! Face / element intersection by constrained minimization.
//!
//! A face pierces an element iff some point of the face lies inside the
//! element. The search runs a Nelder-Mead simplex over the face parametric
//! coordinates, minimizing how far outside the element the mapped face point
//! is; the face boundary is enforced as a hard constraint by ranking
//! infeasible trial points above every feasible value. The landscape is not
//! smooth (the reference location is itself the result of a clamped Newton
//! iteration), which is why a derivative-free simplex search is used.
use crate::{
    basis::{face_shape, ShapeBasis},
    mapping::{element_basis, physical_position, ref_location},
    Error, Point, Result,
};

/// Nelder-Mead iteration cap
pub const MAX_NM_ITER: usize = 200;
/// Penalty below which a face point counts as inside the element
pub const INTERSECT_EPS: f64 = 2e-8;
/// Initial simplex size in the face parametric space, 2-D problems
pub const NM_SIZE_2D: f64 = 0.75;
/// Initial simplex size in the face parametric space, 3-D problems
pub const NM_SIZE_3D: f64 = 0.3;

/// Vertices of a regular simplex of `x0.len() + 1` points, with all vertices
/// at distance `size` from `x0` and equal pairwise distances
#[must_use]
pub fn regular_simplex(x0: &[f64], size: f64) -> Vec<Vec<f64>> {
    let n = x0.len();
    let mut verts = vec![vec![0.0; n]; n + 1];
    // Unit vertices: |v_i| = 1 and v_i . v_j = -1/n. Each column j has one
    // positive entry d_j on vertex j and a common value c_j on all later
    // vertices.
    verts[0][0] = 1.0;
    let mut sumsq = 0.0;
    for i in 1..=n {
        let d_prev = verts[i - 1][i - 1];
        let c = (-1.0 / n as f64 - sumsq) / d_prev;
        for v in verts.iter_mut().skip(i) {
            v[i - 1] = c;
        }
        sumsq += c * c;
        if i < n {
            verts[i][i] = (1.0 - sumsq).sqrt();
        }
    }
    for v in &mut verts {
        for (d, x) in v.iter_mut().enumerate() {
            *x = size.mul_add(*x, x0[d]);
        }
    }
    verts
}

/// Location and value of a minimum found by [`nelder_mead`]
#[derive(Debug)]
pub struct Minimum {
    /// Coordinates of the minimum
    pub x: Vec<f64>,
    /// Objective value (not the constrained score) at `x`
    pub f: f64,
}

fn affine(centroid: &[f64], worst: &[f64], t: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(worst)
        .map(|(&c, &w)| t.mul_add(c - w, c))
        .collect()
}

fn simplex_diameter(verts: &[Vec<f64>]) -> f64 {
    let mut diam: f64 = 0.0;
    for (i, a) in verts.iter().enumerate() {
        for b in verts.iter().skip(i + 1) {
            let d2: f64 = a.iter().zip(b).map(|(&x, &y)| (x - y) * (x - y)).sum();
            diam = diam.max(d2.sqrt());
        }
    }
    diam
}

/// Minimize `objective` with a Nelder-Mead simplex started as a regular
/// simplex of the given `size` around `x0`.
///
/// Points where `constraint > 0` are infeasible; they are scored as
/// `1e10 * (1 + violation)` so that any feasible point beats any infeasible
/// one and the simplex contracts toward the feasible region. The iteration
/// stops at the cap, when the best feasible value reaches 0 (the objective
/// floor of the penalty functions used here), or when the simplex has
/// collapsed.
#[must_use]
pub fn nelder_mead<O, C>(x0: &[f64], size: f64, objective: O, constraint: C) -> Minimum
where
    O: Fn(&[f64]) -> f64,
    C: Fn(&[f64]) -> f64,
{
    const INFEASIBLE: f64 = 1e10;
    let n = x0.len();
    let score = |x: &[f64]| {
        let g = constraint(x);
        if g > 0.0 {
            INFEASIBLE * (1.0 + g)
        } else {
            objective(x)
        }
    };

    let mut verts = regular_simplex(x0, size);
    let mut scores = verts.iter().map(|v| score(v)).collect::<Vec<_>>();

    for _ in 0..MAX_NM_ITER {
        let mut order = (0..=n).collect::<Vec<_>>();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
        let (best, second, worst) = (order[0], order[n - 1], order[n]);

        if scores[best] <= 0.0 || simplex_diameter(&verts) < 1e-12 {
            break;
        }

        let mut centroid = vec![0.0; n];
        for (i, v) in verts.iter().enumerate() {
            if i != worst {
                for (c, &x) in centroid.iter_mut().zip(v) {
                    *c += x;
                }
            }
        }
        for c in &mut centroid {
            *c /= n as f64;
        }

        let refl = affine(&centroid, &verts[worst], 1.0);
        let f_refl = score(&refl);
        if f_refl < scores[best] {
            let exp = affine(&centroid, &verts[worst], 2.0);
            let f_exp = score(&exp);
            if f_exp < f_refl {
                verts[worst] = exp;
                scores[worst] = f_exp;
            } else {
                verts[worst] = refl;
                scores[worst] = f_refl;
            }
        } else if f_refl < scores[second] {
            verts[worst] = refl;
            scores[worst] = f_refl;
        } else {
            // Contract outside if the reflection improved on the worst
            // vertex, inside otherwise
            let t = if f_refl < scores[worst] { 0.5 } else { -0.5 };
            let cont = affine(&centroid, &verts[worst], t);
            let f_cont = score(&cont);
            if f_cont < scores[worst].min(f_refl) {
                verts[worst] = cont;
                scores[worst] = f_cont;
            } else {
                // Shrink all vertices toward the best one
                let keep = verts[best].clone();
                for (i, v) in verts.iter_mut().enumerate() {
                    if i != best {
                        for (x, &k) in v.iter_mut().zip(&keep) {
                            *x = 0.5 * (*x + k);
                        }
                    }
                }
                for (i, v) in verts.iter().enumerate() {
                    if i != best {
                        scores[i] = score(v);
                    }
                }
            }
        }
    }

    let mut best = 0;
    for i in 1..=n {
        if scores[i] < scores[best] {
            best = i;
        }
    }
    Minimum {
        f: scores[best],
        x: verts.swap_remove(best),
    }
}

/// Physical position of face parametric coordinates `u` on the face with
/// node coordinates `fxv`
#[must_use]
pub fn face_position<const D: usize>(basis: &dyn ShapeBasis, fxv: &[f64], u: &[f64]) -> Point<D> {
    let shape = basis.shape(u);
    let mut pos = Point::<D>::zeros();
    for (n, s) in shape.iter().enumerate() {
        for d in 0..D {
            pos[d] += s * fxv[n * D + d];
        }
    }
    pos
}

/// Unit normal of a linear face given its corner coordinates: the right-hand
/// side of the traversal in 2-D (outward for a counterclockwise boundary),
/// the cross product of the diagonals in 3-D
pub fn face_normal<const D: usize>(fxv: &[f64]) -> Result<Point<D>> {
    let mut n = Point::<D>::zeros();
    match D {
        2 => {
            if fxv.len() < 4 {
                return Err(Error::from("a 2D face needs at least 2 nodes"));
            }
            n[0] = fxv[3] - fxv[1];
            n[1] = fxv[0] - fxv[2];
        }
        3 => {
            if fxv.len() < 12 {
                return Err(Error::from("a 3D face needs at least 4 nodes"));
            }
            let d1 = [fxv[6] - fxv[0], fxv[7] - fxv[1], fxv[8] - fxv[2]];
            let d2 = [fxv[9] - fxv[3], fxv[10] - fxv[4], fxv[11] - fxv[5]];
            n[0] = d1[1].mul_add(d2[2], -d1[2] * d2[1]);
            n[1] = d1[2].mul_add(d2[0], -d1[0] * d2[2]);
            n[2] = d1[0].mul_add(d2[1], -d1[1] * d2[0]);
        }
        _ => return Err(Error::from("only 2D and 3D faces are supported")),
    }
    let norm = n.norm();
    if norm < f64::EPSILON {
        return Err(Error::from("degenerate face"));
    }
    Ok(n / norm)
}

/// Test whether the face with node coordinates `fxv` pierces the element
/// with node coordinates `exv`.
///
/// The deepest face point is searched with [`nelder_mead`] over the face
/// parametric coordinates, minimizing `max(0, max_i |r_i| - 1)` where `r` is
/// the reference location of the mapped face point in the element. If no
/// face point gets inside the element the result is a zero vector; otherwise
/// it is the displacement from the deepest face point to its closest image
/// on the element boundary, which is nonzero and bounded by the element
/// diameter.
pub fn intersection_depth<const D: usize>(fxv: &[f64], exv: &[f64]) -> Result<Point<D>> {
    if fxv.len() % D != 0 {
        return Err(Error::from(&format!(
            "face coordinate buffer of {} entries is not a multiple of the dimension {D}",
            fxv.len()
        )));
    }
    let fbasis = face_shape::<D>(fxv.len() / D)?;
    let ebasis = element_basis::<D>(exv)?;

    let objective = |u: &[f64]| {
        let pt = face_position::<D>(fbasis.as_ref(), fxv, u);
        let (r, _) = ref_location(ebasis.as_ref(), exv, &pt);
        let mut worst: f64 = 0.0;
        for d in 0..D {
            worst = worst.max(r[d].abs());
        }
        (worst - 1.0).max(0.0)
    };
    // The search must stay on the face
    let constraint = |u: &[f64]| {
        let mut g: f64 = 0.0;
        for &ud in u {
            g = g.max(ud.abs() - 1.0);
        }
        g
    };

    let x0 = vec![0.0; D - 1];
    let size = if D == 2 { NM_SIZE_2D } else { NM_SIZE_3D };
    let min = nelder_mead(&x0, size, objective, constraint);

    if min.f >= INTERSECT_EPS {
        return Ok(Point::<D>::zeros());
    }

    // Push the largest reference coordinate of the deepest face point to the
    // element boundary and measure the displacement in physical space
    let pt = face_position::<D>(fbasis.as_ref(), fxv, &min.x);
    let (r, _) = ref_location(ebasis.as_ref(), exv, &pt);
    let mut k = 0;
    for d in 1..D {
        if r[d].abs() > r[k].abs() {
            k = d;
        }
    }
    let mut rb = r;
    rb[k] = if r[k] < 0.0 { -1.0 } else { 1.0 };
    let ptb = physical_position(ebasis.as_ref(), exv, &rb);
    Ok(ptb - pt)
}

#[cfg(test)]
mod tests {
    use super::{face_normal, intersection_depth, nelder_mead, regular_simplex};
    use crate::assert_delta;

    #[test]
    fn test_regular_simplex() {
        for n in 1..=4 {
            let x0 = vec![0.0; n];
            let verts = regular_simplex(&x0, 1.0);
            assert_eq!(verts.len(), n + 1);
            for (i, a) in verts.iter().enumerate() {
                let norm: f64 = a.iter().map(|&x| x * x).sum::<f64>().sqrt();
                assert_delta!(norm, 1.0, 1e-12);
                for b in verts.iter().skip(i + 1) {
                    let dot: f64 = a.iter().zip(b).map(|(&x, &y)| x * y).sum();
                    assert_delta!(dot, -1.0 / n as f64, 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_simplex_translated() {
        let verts = regular_simplex(&[1.0, -2.0], 0.5);
        for v in &verts {
            let dist = (v[0] - 1.0).hypot(v[1] + 2.0);
            assert_delta!(dist, 0.5, 1e-12);
        }
    }

    #[test]
    fn test_nelder_mead_quadratic() {
        let min = nelder_mead(
            &[0.0, 0.0],
            0.5,
            |u| (u[0] - 0.3).powi(2) + (u[1] + 0.2).powi(2),
            |u| u.iter().fold(0.0f64, |g, &x| g.max(x.abs() - 1.0)),
        );
        assert_delta!(min.x[0], 0.3, 1e-3);
        assert_delta!(min.x[1], -0.2, 1e-3);
        assert!(min.f < 1e-6);
    }

    #[test]
    fn test_nelder_mead_constrained_boundary() {
        // Unconstrained minimum at x = 2, outside the feasible box: the
        // search must settle on the boundary x = 1
        let min = nelder_mead(
            &[0.0],
            0.75,
            |u| (u[0] - 2.0).powi(2),
            |u| u[0].abs() - 1.0,
        );
        assert_delta!(min.x[0], 1.0, 1e-3);
        assert_delta!(min.f, 1.0, 1e-2);
    }

    #[test]
    fn test_face_normal() {
        let n = face_normal::<2>(&[0.0, 0.0, 2.0, 0.0]).unwrap();
        assert_delta!(n[0], 0.0, 1e-12);
        assert_delta!(n[1], -1.0, 1e-12);

        let n = face_normal::<3>(&[
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
        ])
        .unwrap();
        assert_delta!(n[0], 0.0, 1e-12);
        assert_delta!(n[1], 0.0, 1e-12);
        assert_delta!(n[2], 1.0, 1e-12);

        // Degenerate: all corners identical
        assert!(face_normal::<2>(&[1.0, 1.0, 1.0, 1.0]).is_err());
    }

    /// Unit quad element [-1,1]^2, corner nodes in external order
    const QUAD: [f64; 8] = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0];
    /// Unit hex element [-1,1]^3
    const HEX: [f64; 24] = [
        -1.0, -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, -1.0, -1.0, -1.0, 1.0, 1.0,
        -1.0, 1.0, 1.0, 1.0, 1.0, -1.0, 1.0, 1.0,
    ];

    #[test]
    fn test_face_outside() {
        // 2D: an edge fully to the right of the quad
        let fxv = [2.0, -1.0, 2.0, 1.0];
        let disp = intersection_depth::<2>(&fxv, &QUAD).unwrap();
        assert_eq!(disp[0], 0.0);
        assert_eq!(disp[1], 0.0);

        // 3D: a face above the hex
        let fxv = [
            -1.0, -1.0, 3.0, 1.0, -1.0, 3.0, 1.0, 1.0, 3.0, -1.0, 1.0, 3.0,
        ];
        let disp = intersection_depth::<3>(&fxv, &HEX).unwrap();
        for d in 0..3 {
            assert_eq!(disp[d], 0.0);
        }
    }

    #[test]
    fn test_face_piercing_2d() {
        // A vertical segment through the middle of the quad
        let fxv = [0.0, -2.0, 0.0, 2.0];
        let disp = intersection_depth::<2>(&fxv, &QUAD).unwrap();
        let norm = disp.norm();
        assert!(norm > 0.1);
        // Bounded by the element diameter
        assert!(norm <= 2.0 * 2.0_f64.sqrt() + 1e-9);
        // The push to the boundary is along x for this configuration
        assert_delta!(disp[1], 0.0, 1e-9);
    }

    #[test]
    fn test_face_piercing_3d() {
        // A large horizontal face slicing the hex at z = 0
        let fxv = [
            -2.0, -2.0, 0.0, 2.0, -2.0, 0.0, 2.0, 2.0, 0.0, -2.0, 2.0, 0.0,
        ];
        let disp = intersection_depth::<3>(&fxv, &HEX).unwrap();
        let norm = disp.norm();
        assert!(norm > 0.1);
        assert!(norm <= 2.0 * 3.0_f64.sqrt() + 1e-9);
        // The deepest point sits on the z = 0 plane, so the boundary push
        // has no vertical component
        assert_delta!(disp[2], 0.0, 1e-9);
    }

    #[test]
    fn test_face_touching() {
        // An edge lying on the element boundary x = 1: the penalty floor is
        // exactly at the boundary, so the displacement stays essentially zero
        let fxv = [1.0, -1.0, 1.0, 1.0];
        let disp = intersection_depth::<2>(&fxv, &QUAD).unwrap();
        assert!(disp.norm() <= 1e-6);
    }
}
