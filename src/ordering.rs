//! Correspondence between the external mesh-format node ordering and the
//! lexicographic (i, j, k) tensor ordering, for quads and hexes of arbitrary
//! order.
//!
//! The external convention numbers the nodes of an element in concentric
//! rings from the outer boundary inward: corners first, then the remaining
//! edge nodes in a bottom/right/top/left traversal, then the interior
//! (recursively for hex faces and volumes), with a single center node last
//! when the number of nodes per edge is odd.
//!
//! Maps are built once per node count and cached for the lifetime of the
//! process; lookups return a shared handle to the immutable map.
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::sync::{Arc, LazyLock, Mutex};

/// Permutations between the external node ordering and the structured tensor
/// ordering of a single element topology
#[derive(Debug)]
pub struct NodeMap {
    /// Structured tensor index of each external node
    pub ext_to_ijk: Vec<usize>,
    /// External index of each structured tensor node (functional inverse)
    pub ijk_to_ext: Vec<usize>,
}

static QUAD_MAPS: LazyLock<Mutex<FxHashMap<usize, Arc<NodeMap>>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));
static HEX_MAPS: LazyLock<Mutex<FxHashMap<usize, Arc<NodeMap>>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

/// 8-node serendipity quad: corners, then mid-edge bottom / left / right / top
const QUAD_8_TO_IJK: [usize; 8] = [0, 2, 7, 5, 1, 3, 4, 6];
/// 20-node serendipity hex, with the 20 occupied slots of the 3x3x3 grid
/// enumerated lexicographically
const HEX_20_TO_IJK: [usize; 20] = [
    0, 2, 7, 5, 12, 14, 19, 17, 1, 4, 6, 3, 8, 9, 11, 10, 13, 16, 18, 15,
];

fn invert_permutation(fwd: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; fwd.len()];
    for (e, &s) in fwd.iter().enumerate() {
        inv[s] = e;
    }
    inv
}

/// Nodes per side of a tensor-product element with `n_nodes` nodes, if any
pub(crate) fn side_count(n_nodes: usize, dim: u32) -> Option<usize> {
    let n_side = (n_nodes as f64).powf(1.0 / f64::from(dim)).round() as usize;
    (n_side >= 2 && n_side.pow(dim) == n_nodes).then_some(n_side)
}

/// External-to-structured map for a quad with `n_nodes` nodes
fn ext_to_ijk_quad(n_nodes: usize) -> Result<Vec<usize>> {
    if n_nodes == 8 {
        return Ok(QUAD_8_TO_IJK.to_vec());
    }

    let n_side = side_count(n_nodes, 2).ok_or_else(|| {
        Error::from(&format!(
            "a Lagrange quad of order p must have (p+1)^2 nodes, got {n_nodes}"
        ))
    })?;
    let idx = |i: usize, j: usize| i + n_side * j;

    let mut map = vec![0; n_nodes];
    let n_levels = n_side / 2;

    let mut node = 0;
    for i in 0..n_levels {
        // Corners of ring i
        let i2 = (n_side - 1) - i;
        map[node] = idx(i, i);
        map[node + 1] = idx(i2, i);
        map[node + 2] = idx(i2, i2);
        map[node + 3] = idx(i, i2);
        node += 4;

        // Edges: bottom, right, top, left
        let n_edge = n_side - 2 * (i + 1);
        for j in 0..n_edge {
            map[node + j] = idx(i + 1 + j, i);
            map[node + n_edge + j] = idx(i2, i + 1 + j);
            map[node + 2 * n_edge + j] = idx(i2 - 1 - j, i2);
            map[node + 3 * n_edge + j] = idx(i, i2 - 1 - j);
        }
        node += 4 * n_edge;
    }

    // Center node when n_side is odd
    if n_side % 2 != 0 {
        map[n_nodes - 1] = idx(n_side / 2, n_side / 2);
    }

    Ok(map)
}

/// External-to-structured map for a hex with `n_nodes` nodes.
/// Same ring recursion as the quad: 8 corners, 12 edges, 6 faces (each
/// ordered by the 2-D ring traversal) and finally the interior sub-cube.
#[allow(clippy::too_many_lines)]
fn ext_to_ijk_hex(n_nodes: usize) -> Result<Vec<usize>> {
    if n_nodes == 20 {
        return Ok(HEX_20_TO_IJK.to_vec());
    }

    let n_side = side_count(n_nodes, 3).ok_or_else(|| {
        Error::from(&format!(
            "a Lagrange hex of order p must have (p+1)^3 nodes, got {n_nodes}"
        ))
    })?;
    let idx = |i: usize, j: usize, k: usize| i + n_side * (j + n_side * k);

    let mut map = vec![0; n_nodes];
    let n_levels = n_side / 2;

    let mut node = 0;
    for i in 0..n_levels {
        // Corners of ring i
        let i2 = (n_side - 1) - i;
        map[node] = idx(i, i, i);
        map[node + 1] = idx(i2, i, i);
        map[node + 2] = idx(i2, i2, i);
        map[node + 3] = idx(i, i2, i);
        map[node + 4] = idx(i, i, i2);
        map[node + 5] = idx(i2, i, i2);
        map[node + 6] = idx(i2, i2, i2);
        map[node + 7] = idx(i, i2, i2);
        node += 8;

        // Edges
        let n_edge = n_side - 2 * (i + 1);
        for j in 0..n_edge {
            // Around the bottom
            map[node + j] = idx(i + 1 + j, i, i);
            map[node + 3 * n_edge + j] = idx(i2, i + 1 + j, i);
            map[node + 5 * n_edge + j] = idx(i2 - 1 - j, i2, i);
            map[node + n_edge + j] = idx(i, i + 1 + j, i);

            // Vertical
            map[node + 2 * n_edge + j] = idx(i, i, i + 1 + j);
            map[node + 4 * n_edge + j] = idx(i2, i, i + 1 + j);
            map[node + 6 * n_edge + j] = idx(i2, i2, i + 1 + j);
            map[node + 7 * n_edge + j] = idx(i, i2, i + 1 + j);

            // Around the top
            map[node + 8 * n_edge + j] = idx(i + 1 + j, i, i2);
            map[node + 10 * n_edge + j] = idx(i2, i + 1 + j, i2);
            map[node + 11 * n_edge + j] = idx(i2 - 1 - j, i2, i2);
            map[node + 9 * n_edge + j] = idx(i, i + 1 + j, i2);
        }
        node += 12 * n_edge;

        // Faces, each using the 2-D ring traversal on its interior
        let n_levels_2 = n_edge / 2;
        let is_odd_2 = n_edge % 2 == 1;

        // Bottom face
        for j0 in 0..n_levels_2 {
            let j = j0 + i + 1;
            let j2 = i + 1 + (n_edge - 1) - j0;
            map[node] = idx(j, j, i);
            map[node + 1] = idx(j, j2, i);
            map[node + 2] = idx(j2, j2, i);
            map[node + 3] = idx(j2, j, i);
            node += 4;

            let n_edge_2 = n_edge - 2 * (j0 + 1);
            for k in 0..n_edge_2 {
                map[node + k] = idx(j, j + 1 + k, i);
                map[node + n_edge_2 + k] = idx(j + 1 + k, j2, i);
                map[node + 2 * n_edge_2 + k] = idx(j2, j2 - 1 - k, i);
                map[node + 3 * n_edge_2 + k] = idx(j2 - 1 - k, j, i);
            }
            node += 4 * n_edge_2;
        }
        if is_odd_2 {
            map[node] = idx(n_side / 2, n_side / 2, i);
            node += 1;
        }

        // Front face
        for j0 in 0..n_levels_2 {
            let j = j0 + i + 1;
            let j2 = i + 1 + (n_edge - 1) - j0;
            map[node] = idx(j, i, j);
            map[node + 1] = idx(j2, i, j);
            map[node + 2] = idx(j2, i, j2);
            map[node + 3] = idx(j, i, j2);
            node += 4;

            let n_edge_2 = n_edge - 2 * (j0 + 1);
            for k in 0..n_edge_2 {
                map[node + k] = idx(j + 1 + k, i, j);
                map[node + n_edge_2 + k] = idx(j2, i, j + 1 + k);
                map[node + 2 * n_edge_2 + k] = idx(j2 - 1 - k, i, j2);
                map[node + 3 * n_edge_2 + k] = idx(j, i, j2 - 1 - k);
            }
            node += 4 * n_edge_2;
        }
        if is_odd_2 {
            map[node] = idx(n_side / 2, i, n_side / 2);
            node += 1;
        }

        // Left face
        for j0 in 0..n_levels_2 {
            let j = j0 + i + 1;
            let j2 = i + 1 + (n_edge - 1) - j0;
            map[node] = idx(i, j, j);
            map[node + 1] = idx(i, j, j2);
            map[node + 2] = idx(i, j2, j2);
            map[node + 3] = idx(i, j2, j);
            node += 4;

            let n_edge_2 = n_edge - 2 * (j0 + 1);
            for k in 0..n_edge_2 {
                map[node + k] = idx(i, j, j + 1 + k);
                map[node + n_edge_2 + k] = idx(i, j + 1 + k, j2);
                map[node + 2 * n_edge_2 + k] = idx(i, j2, j2 - 1 - k);
                map[node + 3 * n_edge_2 + k] = idx(i, j2 - 1 - k, j);
            }
            node += 4 * n_edge_2;
        }
        if is_odd_2 {
            map[node] = idx(i, n_side / 2, n_side / 2);
            node += 1;
        }

        // Right face
        for j0 in 0..n_levels_2 {
            let j = j0 + i + 1;
            let j2 = i + 1 + (n_edge - 1) - j0;
            map[node] = idx(i2, j, j);
            map[node + 1] = idx(i2, j2, j);
            map[node + 2] = idx(i2, j2, j2);
            map[node + 3] = idx(i2, j, j2);
            node += 4;

            let n_edge_2 = n_edge - 2 * (j0 + 1);
            for k in 0..n_edge_2 {
                map[node + k] = idx(i2, j + 1 + k, j);
                map[node + n_edge_2 + k] = idx(i2, j2, j + 1 + k);
                map[node + 2 * n_edge_2 + k] = idx(i2, j2 - 1 - k, j2);
                map[node + 3 * n_edge_2 + k] = idx(i2, j, j2 - 1 - k);
            }
            node += 4 * n_edge_2;
        }
        if is_odd_2 {
            map[node] = idx(i2, n_side / 2, n_side / 2);
            node += 1;
        }

        // Back face
        for j0 in 0..n_levels_2 {
            let j = j0 + i + 1;
            let j2 = i + 1 + (n_edge - 1) - j0;
            map[node] = idx(j2, i2, j);
            map[node + 1] = idx(j, i2, j);
            map[node + 2] = idx(j, i2, j2);
            map[node + 3] = idx(j2, i2, j2);
            node += 4;

            let n_edge_2 = n_edge - 2 * (j0 + 1);
            for k in 0..n_edge_2 {
                map[node + k] = idx(j2 - 1 - k, i2, j);
                map[node + n_edge_2 + k] = idx(j, i2, j + 1 + k);
                map[node + 2 * n_edge_2 + k] = idx(j + 1 + k, i2, j2);
                map[node + 3 * n_edge_2 + k] = idx(j2, i2, j2 - 1 - k);
            }
            node += 4 * n_edge_2;
        }
        if is_odd_2 {
            map[node] = idx(n_side / 2, i2, n_side / 2);
            node += 1;
        }

        // Top face
        for j0 in 0..n_levels_2 {
            let j = j0 + i + 1;
            let j2 = i + 1 + (n_edge - 1) - j0;
            map[node] = idx(j, j, i2);
            map[node + 1] = idx(j2, j, i2);
            map[node + 2] = idx(j2, j2, i2);
            map[node + 3] = idx(j, j2, i2);
            node += 4;

            let n_edge_2 = n_edge - 2 * (j0 + 1);
            for k in 0..n_edge_2 {
                map[node + k] = idx(j + 1 + k, j, i2);
                map[node + n_edge_2 + k] = idx(j2, j + 1 + k, i2);
                map[node + 2 * n_edge_2 + k] = idx(j2 - 1 - k, j2, i2);
                map[node + 3 * n_edge_2 + k] = idx(j, j2 - 1 - k, i2);
            }
            node += 4 * n_edge_2;
        }
        if is_odd_2 {
            map[node] = idx(n_side / 2, n_side / 2, i2);
            node += 1;
        }
    }

    // Volume center when n_side is odd
    if n_side % 2 == 1 {
        map[n_nodes - 1] = idx(n_side / 2, n_side / 2, n_side / 2);
    }

    Ok(map)
}

fn node_map(
    cache: &Mutex<FxHashMap<usize, Arc<NodeMap>>>,
    n_nodes: usize,
    build: fn(usize) -> Result<Vec<usize>>,
) -> Result<Arc<NodeMap>> {
    let mut cache = cache.lock().unwrap();
    if let Some(map) = cache.get(&n_nodes) {
        return Ok(map.clone());
    }
    let ext_to_ijk = build(n_nodes)?;
    let ijk_to_ext = invert_permutation(&ext_to_ijk);
    let map = Arc::new(NodeMap {
        ext_to_ijk,
        ijk_to_ext,
    });
    cache.insert(n_nodes, map.clone());
    Ok(map)
}

/// Get the (cached) node ordering maps for a quad with `n_nodes` nodes
pub fn quad_node_map(n_nodes: usize) -> Result<Arc<NodeMap>> {
    node_map(&QUAD_MAPS, n_nodes, ext_to_ijk_quad)
}

/// Get the (cached) node ordering maps for a hex with `n_nodes` nodes
pub fn hex_node_map(n_nodes: usize) -> Result<Arc<NodeMap>> {
    node_map(&HEX_MAPS, n_nodes, ext_to_ijk_hex)
}
