//! Lagrange shape functions and derivatives for line, quad and hex elements
//! of arbitrary polynomial order.
//!
//! The 1-D basis uses evenly spaced nodes on `[-1, 1]`; quad and hex bases
//! are tensor products placed into the external node ordering of
//! [`crate::ordering`]. The 8-node quad and the 20-node hex use the
//! closed-form serendipity bases instead of the tensor construction.
//!
//! Evaluation is purely functional: node-count validation happens once at
//! construction, after which `shape_into` / `deriv_into` cannot fail and
//! write only into caller-provided buffers.
use crate::{
    ordering::{hex_node_map, side_count, NodeMap},
    Error, Result,
};
use std::sync::Arc;

/// 1-D Lagrange basis value at `y` for control point `mode` among nodes `xs`
#[must_use]
pub fn lagrange(xs: &[f64], y: f64, mode: usize) -> f64 {
    let mut lag = 1.0;
    for (i, &xi) in xs.iter().enumerate() {
        if i != mode {
            lag *= (y - xi) / (xs[mode] - xi);
        }
    }
    lag
}

/// Derivative of the 1-D Lagrange basis at `y` for control point `mode`
#[must_use]
pub fn dlagrange(xs: &[f64], y: f64, mode: usize) -> f64 {
    let mut dlag = 0.0;
    for i in 0..xs.len() {
        if i == mode {
            continue;
        }
        let mut num = 1.0;
        let mut den = 1.0;
        for (j, &xj) in xs.iter().enumerate() {
            if j != mode && j != i {
                num *= y - xj;
            }
            if j != mode {
                den *= xs[mode] - xj;
            }
        }
        dlag += num / den;
    }
    dlag
}

/// Evenly spaced 1-D node locations on [-1, 1]
fn equispaced(n_side: usize) -> Vec<f64> {
    let dx = 2.0 / (n_side - 1) as f64;
    (0..n_side).map(|i| (i as f64).mul_add(dx, -1.0)).collect()
}

/// Shape-function evaluation at a reference-space location.
///
/// `shape_into` fills `out` (length `n_nodes`) with the basis values;
/// `deriv_into` fills `out` (length `n_nodes * dim`, derivative components
/// contiguous per node) with the basis gradients. Both read `loc[..dim()]`.
pub trait ShapeBasis: Send + Sync {
    /// Number of element nodes
    fn n_nodes(&self) -> usize;
    /// Reference-space dimension (1, 2 or 3)
    fn dim(&self) -> usize;
    /// Shape-function values at `loc`
    fn shape_into(&self, loc: &[f64], out: &mut [f64]);
    /// Shape-function derivatives at `loc`
    fn deriv_into(&self, loc: &[f64], out: &mut [f64]);

    /// Allocating version of `shape_into`
    fn shape(&self, loc: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_nodes()];
        self.shape_into(loc, &mut out);
        out
    }

    /// Allocating version of `deriv_into`
    fn deriv(&self, loc: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_nodes() * self.dim()];
        self.deriv_into(loc, &mut out);
        out
    }
}

/// Line element with `n_nodes` evenly spaced nodes
pub struct LineShape {
    xs: Vec<f64>,
}

impl LineShape {
    pub fn new(n_nodes: usize) -> Result<Self> {
        if n_nodes < 2 {
            return Err(Error::from(&format!(
                "a Lagrange line of order p must have p+1 >= 2 nodes, got {n_nodes}"
            )));
        }
        Ok(Self {
            xs: equispaced(n_nodes),
        })
    }
}

impl ShapeBasis for LineShape {
    fn n_nodes(&self) -> usize {
        self.xs.len()
    }

    fn dim(&self) -> usize {
        1
    }

    fn shape_into(&self, loc: &[f64], out: &mut [f64]) {
        for (mode, s) in out.iter_mut().enumerate() {
            *s = lagrange(&self.xs, loc[0], mode);
        }
    }

    fn deriv_into(&self, loc: &[f64], out: &mut [f64]) {
        for (mode, d) in out.iter_mut().enumerate() {
            *d = dlagrange(&self.xs, loc[0], mode);
        }
    }
}

enum QuadKind {
    Tensor { xs: Vec<f64> },
    Serendipity8,
}

/// Quad element: tensor-product Lagrange basis for `(p+1)^2` nodes, or the
/// 8-node serendipity basis
pub struct QuadShape {
    n_nodes: usize,
    kind: QuadKind,
}

/// Corner signs of the serendipity elements, in external node order
const CORNER_XI: [f64; 8] = [-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
const CORNER_ETA: [f64; 8] = [-1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0];
const CORNER_MU: [f64; 8] = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];

impl QuadShape {
    pub fn new(n_nodes: usize) -> Result<Self> {
        let kind = if n_nodes == 8 {
            QuadKind::Serendipity8
        } else {
            let n_side = side_count(n_nodes, 2).ok_or_else(|| {
                Error::from(&format!(
                    "a Lagrange quad of order p must have (p+1)^2 nodes, got {n_nodes}"
                ))
            })?;
            QuadKind::Tensor {
                xs: equispaced(n_side),
            }
        };
        Ok(Self { n_nodes, kind })
    }
}

impl ShapeBasis for QuadShape {
    fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    fn dim(&self) -> usize {
        2
    }

    fn shape_into(&self, loc: &[f64], out: &mut [f64]) {
        let (xi, eta) = (loc[0], loc[1]);
        match &self.kind {
            QuadKind::Tensor { xs } => {
                let n_side = xs.len();
                let lag_i: Vec<f64> = (0..n_side).map(|i| lagrange(xs, xi, i)).collect();
                let lag_j: Vec<f64> = (0..n_side).map(|j| lagrange(xs, eta, j)).collect();

                // Ring traversal: corners, then bottom/right/top/left edges
                let mut node = 0;
                for i in 0..n_side / 2 {
                    let i2 = (n_side - 1) - i;
                    out[node] = lag_i[i] * lag_j[i];
                    out[node + 1] = lag_i[i2] * lag_j[i];
                    out[node + 2] = lag_i[i2] * lag_j[i2];
                    out[node + 3] = lag_i[i] * lag_j[i2];
                    node += 4;

                    let n_edge = n_side - 2 * (i + 1);
                    for j in 0..n_edge {
                        out[node + j] = lag_i[i + 1 + j] * lag_j[i];
                        out[node + n_edge + j] = lag_i[i2] * lag_j[i + 1 + j];
                        out[node + 2 * n_edge + j] = lag_i[i2 - 1 - j] * lag_j[i2];
                        out[node + 3 * n_edge + j] = lag_i[i] * lag_j[i2 - 1 - j];
                    }
                    node += 4 * n_edge;
                }
                if n_side % 2 == 1 {
                    out[self.n_nodes - 1] = lag_i[n_side / 2] * lag_j[n_side / 2];
                }
            }
            QuadKind::Serendipity8 => {
                for i in 0..4 {
                    let (sx, sy) = (CORNER_XI[i], CORNER_ETA[i]);
                    out[i] = 0.25 * (1.0 + xi * sx) * (1.0 + eta * sy) * (xi * sx + eta * sy - 1.0);
                }
                // Mid-edge nodes: bottom, left, right, top
                out[4] = 0.5 * (1.0 - xi * xi) * (1.0 - eta);
                out[5] = 0.5 * (1.0 - eta * eta) * (1.0 - xi);
                out[6] = 0.5 * (1.0 - eta * eta) * (1.0 + xi);
                out[7] = 0.5 * (1.0 - xi * xi) * (1.0 + eta);
            }
        }
    }

    fn deriv_into(&self, loc: &[f64], out: &mut [f64]) {
        let (xi, eta) = (loc[0], loc[1]);
        match &self.kind {
            QuadKind::Tensor { xs } => {
                let n_side = xs.len();
                let lag_i: Vec<f64> = (0..n_side).map(|i| lagrange(xs, xi, i)).collect();
                let lag_j: Vec<f64> = (0..n_side).map(|j| lagrange(xs, eta, j)).collect();
                let dlag_i: Vec<f64> = (0..n_side).map(|i| dlagrange(xs, xi, i)).collect();
                let dlag_j: Vec<f64> = (0..n_side).map(|j| dlagrange(xs, eta, j)).collect();

                let mut set = |node: usize, i: usize, j: usize| {
                    out[2 * node] = dlag_i[i] * lag_j[j];
                    out[2 * node + 1] = lag_i[i] * dlag_j[j];
                };

                let mut node = 0;
                for i in 0..n_side / 2 {
                    let i2 = (n_side - 1) - i;
                    set(node, i, i);
                    set(node + 1, i2, i);
                    set(node + 2, i2, i2);
                    set(node + 3, i, i2);
                    node += 4;

                    let n_edge = n_side - 2 * (i + 1);
                    for j in 0..n_edge {
                        set(node + j, i + 1 + j, i);
                        set(node + n_edge + j, i2, i + 1 + j);
                        set(node + 2 * n_edge + j, i2 - 1 - j, i2);
                        set(node + 3 * n_edge + j, i, i2 - 1 - j);
                    }
                    node += 4 * n_edge;
                }
                if n_side % 2 == 1 {
                    set(self.n_nodes - 1, n_side / 2, n_side / 2);
                }
            }
            QuadKind::Serendipity8 => {
                for i in 0..4 {
                    let (sx, sy) = (CORNER_XI[i], CORNER_ETA[i]);
                    out[2 * i] = 0.25 * sx * (1.0 + eta * sy) * (2.0 * xi * sx + eta * sy);
                    out[2 * i + 1] = 0.25 * sy * (1.0 + xi * sx) * (xi * sx + 2.0 * eta * sy);
                }
                out[8] = -xi * (1.0 - eta);
                out[9] = -0.5 * (1.0 - xi * xi);
                out[10] = -0.5 * (1.0 - eta * eta);
                out[11] = -eta * (1.0 - xi);
                out[12] = 0.5 * (1.0 - eta * eta);
                out[13] = -eta * (1.0 + xi);
                out[14] = -xi * (1.0 + eta);
                out[15] = 0.5 * (1.0 - xi * xi);
            }
        }
    }
}

enum HexKind {
    Tensor { xs: Vec<f64>, map: Arc<NodeMap> },
    Serendipity20,
}

/// Hex element: tensor-product Lagrange basis for `(p+1)^3` nodes, or the
/// 20-node serendipity basis
pub struct HexShape {
    n_nodes: usize,
    kind: HexKind,
}

impl HexShape {
    pub fn new(n_nodes: usize) -> Result<Self> {
        let kind = if n_nodes == 20 {
            HexKind::Serendipity20
        } else {
            let n_side = side_count(n_nodes, 3).ok_or_else(|| {
                Error::from(&format!(
                    "a Lagrange hex of order p must have (p+1)^3 nodes, got {n_nodes}"
                ))
            })?;
            HexKind::Tensor {
                xs: equispaced(n_side),
                map: hex_node_map(n_nodes)?,
            }
        };
        Ok(Self { n_nodes, kind })
    }
}

impl ShapeBasis for HexShape {
    fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    fn dim(&self) -> usize {
        3
    }

    fn shape_into(&self, loc: &[f64], out: &mut [f64]) {
        let (xi, eta, mu) = (loc[0], loc[1], loc[2]);
        match &self.kind {
            HexKind::Tensor { xs, map } => {
                let n_side = xs.len();
                let lag_i: Vec<f64> = (0..n_side).map(|i| lagrange(xs, xi, i)).collect();
                let lag_j: Vec<f64> = (0..n_side).map(|j| lagrange(xs, eta, j)).collect();
                let lag_k: Vec<f64> = (0..n_side).map(|k| lagrange(xs, mu, k)).collect();

                for k in 0..n_side {
                    for j in 0..n_side {
                        for i in 0..n_side {
                            let ijk = i + n_side * (j + n_side * k);
                            out[map.ijk_to_ext[ijk]] = lag_i[i] * lag_j[j] * lag_k[k];
                        }
                    }
                }
            }
            HexKind::Serendipity20 => {
                for i in 0..8 {
                    let (sx, sy, sz) = (CORNER_XI[i], CORNER_ETA[i], CORNER_MU[i]);
                    out[i] = 0.125
                        * (1.0 + xi * sx)
                        * (1.0 + eta * sy)
                        * (1.0 + mu * sz)
                        * (xi * sx + eta * sy + mu * sz - 2.0);
                }
                // Edge nodes, xi = 0
                out[8] = 0.25 * (1.0 - xi * xi) * (1.0 - eta) * (1.0 - mu);
                out[10] = 0.25 * (1.0 - xi * xi) * (1.0 + eta) * (1.0 - mu);
                out[16] = 0.25 * (1.0 - xi * xi) * (1.0 - eta) * (1.0 + mu);
                out[18] = 0.25 * (1.0 - xi * xi) * (1.0 + eta) * (1.0 + mu);
                // Edge nodes, eta = 0
                out[9] = 0.25 * (1.0 - eta * eta) * (1.0 + xi) * (1.0 - mu);
                out[11] = 0.25 * (1.0 - eta * eta) * (1.0 - xi) * (1.0 - mu);
                out[17] = 0.25 * (1.0 - eta * eta) * (1.0 + xi) * (1.0 + mu);
                out[19] = 0.25 * (1.0 - eta * eta) * (1.0 - xi) * (1.0 + mu);
                // Edge nodes, mu = 0
                out[12] = 0.25 * (1.0 - mu * mu) * (1.0 - xi) * (1.0 - eta);
                out[13] = 0.25 * (1.0 - mu * mu) * (1.0 + xi) * (1.0 - eta);
                out[14] = 0.25 * (1.0 - mu * mu) * (1.0 + xi) * (1.0 + eta);
                out[15] = 0.25 * (1.0 - mu * mu) * (1.0 - xi) * (1.0 + eta);
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn deriv_into(&self, loc: &[f64], out: &mut [f64]) {
        let (xi, eta, mu) = (loc[0], loc[1], loc[2]);
        match &self.kind {
            HexKind::Tensor { xs, map } => {
                let n_side = xs.len();
                let lag_i: Vec<f64> = (0..n_side).map(|i| lagrange(xs, xi, i)).collect();
                let lag_j: Vec<f64> = (0..n_side).map(|j| lagrange(xs, eta, j)).collect();
                let lag_k: Vec<f64> = (0..n_side).map(|k| lagrange(xs, mu, k)).collect();
                let dlag_i: Vec<f64> = (0..n_side).map(|i| dlagrange(xs, xi, i)).collect();
                let dlag_j: Vec<f64> = (0..n_side).map(|j| dlagrange(xs, eta, j)).collect();
                let dlag_k: Vec<f64> = (0..n_side).map(|k| dlagrange(xs, mu, k)).collect();

                for k in 0..n_side {
                    for j in 0..n_side {
                        for i in 0..n_side {
                            let ijk = i + n_side * (j + n_side * k);
                            let node = map.ijk_to_ext[ijk];
                            out[3 * node] = dlag_i[i] * lag_j[j] * lag_k[k];
                            out[3 * node + 1] = lag_i[i] * dlag_j[j] * lag_k[k];
                            out[3 * node + 2] = lag_i[i] * lag_j[j] * dlag_k[k];
                        }
                    }
                }
            }
            HexKind::Serendipity20 => {
                for i in 0..8 {
                    let (sx, sy, sz) = (CORNER_XI[i], CORNER_ETA[i], CORNER_MU[i]);
                    out[3 * i] = 0.125
                        * sx
                        * (1.0 + eta * sy)
                        * (1.0 + mu * sz)
                        * (2.0 * xi * sx + eta * sy + mu * sz - 1.0);
                    out[3 * i + 1] = 0.125
                        * sy
                        * (1.0 + xi * sx)
                        * (1.0 + mu * sz)
                        * (xi * sx + 2.0 * eta * sy + mu * sz - 1.0);
                    out[3 * i + 2] = 0.125
                        * sz
                        * (1.0 + xi * sx)
                        * (1.0 + eta * sy)
                        * (xi * sx + eta * sy + 2.0 * mu * sz - 1.0);
                }
                // Edge nodes, xi = 0
                out[3 * 8] = -0.5 * xi * (1.0 - eta) * (1.0 - mu);
                out[3 * 8 + 1] = -0.25 * (1.0 - xi * xi) * (1.0 - mu);
                out[3 * 8 + 2] = -0.25 * (1.0 - xi * xi) * (1.0 - eta);
                out[3 * 10] = -0.5 * xi * (1.0 + eta) * (1.0 - mu);
                out[3 * 10 + 1] = 0.25 * (1.0 - xi * xi) * (1.0 - mu);
                out[3 * 10 + 2] = -0.25 * (1.0 - xi * xi) * (1.0 + eta);
                out[3 * 16] = -0.5 * xi * (1.0 - eta) * (1.0 + mu);
                out[3 * 16 + 1] = -0.25 * (1.0 - xi * xi) * (1.0 + mu);
                out[3 * 16 + 2] = 0.25 * (1.0 - xi * xi) * (1.0 - eta);
                out[3 * 18] = -0.5 * xi * (1.0 + eta) * (1.0 + mu);
                out[3 * 18 + 1] = 0.25 * (1.0 - xi * xi) * (1.0 + mu);
                out[3 * 18 + 2] = 0.25 * (1.0 - xi * xi) * (1.0 + eta);
                // Edge nodes, eta = 0
                out[3 * 9] = 0.25 * (1.0 - eta * eta) * (1.0 - mu);
                out[3 * 9 + 1] = -0.5 * eta * (1.0 + xi) * (1.0 - mu);
                out[3 * 9 + 2] = -0.25 * (1.0 - eta * eta) * (1.0 + xi);
                out[3 * 11] = -0.25 * (1.0 - eta * eta) * (1.0 - mu);
                out[3 * 11 + 1] = -0.5 * eta * (1.0 - xi) * (1.0 - mu);
                out[3 * 11 + 2] = -0.25 * (1.0 - eta * eta) * (1.0 - xi);
                out[3 * 17] = 0.25 * (1.0 - eta * eta) * (1.0 + mu);
                out[3 * 17 + 1] = -0.5 * eta * (1.0 + xi) * (1.0 + mu);
                out[3 * 17 + 2] = 0.25 * (1.0 - eta * eta) * (1.0 + xi);
                out[3 * 19] = -0.25 * (1.0 - eta * eta) * (1.0 + mu);
                out[3 * 19 + 1] = -0.5 * eta * (1.0 - xi) * (1.0 + mu);
                out[3 * 19 + 2] = 0.25 * (1.0 - eta * eta) * (1.0 - xi);
                // Edge nodes, mu = 0
                out[3 * 12] = -0.25 * (1.0 - mu * mu) * (1.0 - eta);
                out[3 * 12 + 1] = -0.25 * (1.0 - mu * mu) * (1.0 - xi);
                out[3 * 12 + 2] = -0.5 * mu * (1.0 - xi) * (1.0 - eta);
                out[3 * 13] = 0.25 * (1.0 - mu * mu) * (1.0 - eta);
                out[3 * 13 + 1] = -0.25 * (1.0 - mu * mu) * (1.0 + xi);
                out[3 * 13 + 2] = -0.5 * mu * (1.0 + xi) * (1.0 - eta);
                out[3 * 14] = 0.25 * (1.0 - mu * mu) * (1.0 + eta);
                out[3 * 14 + 1] = 0.25 * (1.0 - mu * mu) * (1.0 + xi);
                out[3 * 14 + 2] = -0.5 * mu * (1.0 + xi) * (1.0 + eta);
                out[3 * 15] = -0.25 * (1.0 - mu * mu) * (1.0 + eta);
                out[3 * 15 + 1] = 0.25 * (1.0 - mu * mu) * (1.0 - xi);
                out[3 * 15 + 2] = -0.5 * mu * (1.0 - xi) * (1.0 + eta);
            }
        }
    }
}

/// Shape basis of the element topology for a D-dimensional problem:
/// quad in 2-D, hex in 3-D
pub fn element_shape<const D: usize>(n_nodes: usize) -> Result<Box<dyn ShapeBasis>> {
    match D {
        2 => Ok(Box::new(QuadShape::new(n_nodes)?)),
        3 => Ok(Box::new(HexShape::new(n_nodes)?)),
        _ => Err(Error::from("only 2D and 3D elements are supported")),
    }
}

/// Shape basis of the face topology for a D-dimensional problem:
/// line in 2-D, quad in 3-D
pub fn face_shape<const D: usize>(n_nodes: usize) -> Result<Box<dyn ShapeBasis>> {
    match D {
        2 => Ok(Box::new(LineShape::new(n_nodes)?)),
        3 => Ok(Box::new(QuadShape::new(n_nodes)?)),
        _ => Err(Error::from("only 2D and 3D faces are supported")),
    }
}
