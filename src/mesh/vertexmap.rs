//! Coincident-vertex merging (§3 "Vertex map", §4.3 step 1): sorts
//! vertices along their widest axis, then intersects small windows of
//! neighbours within `merge_tolerance` to build a `vtx_map` where
//! `vtx_map[i]` is the canonical representative of vertex `i`.

use crate::primitives::Aabb;
use cgmath::*;

pub const MERGE_TOLERANCE: f64 = 1e-5;

/// Builds `vtx_map` such that `vtx_map[vtx_map[i]] == vtx_map[i]` for
/// all `i` (idempotence invariant, §8) and `vtx_map[i] <= i`: every
/// vertex maps to the lowest-indexed vertex within `tolerance` of it.
pub fn build_vertex_map(vertices: &[Point3<f64>], tolerance: f64) -> Vec<u32> {
    let n = vertices.len();
    let mut vtx_map: Vec<u32> = (0..n as u32).collect();
    if n == 0 {
        return vtx_map;
    }

    let bb = Aabb::from_points(vertices.iter().copied());
    let ext = bb.extents;
    let axis = if ext.x >= ext.y && ext.x >= ext.z {
        0
    } else if ext.y >= ext.z {
        1
    } else {
        2
    };
    let coord = |p: &Point3<f64>| -> f64 {
        match axis {
            0 => p.x,
            1 => p.y,
            _ => p.z,
        }
    };

    let mut order: Vec<u32> = (0..n as u32).collect();
    order.sort_by(|&a, &b| coord(&vertices[a as usize]).partial_cmp(&coord(&vertices[b as usize])).unwrap());

    let tol2 = tolerance * tolerance;
    for (pos, &i) in order.iter().enumerate() {
        if vtx_map[i as usize] != i {
            continue;
        }
        let ci = coord(&vertices[i as usize]);
        for &j in &order[pos + 1..] {
            if coord(&vertices[j as usize]) - ci > tolerance {
                break;
            }
            if vtx_map[j as usize] != j {
                continue;
            }
            if (vertices[j as usize] - vertices[i as usize]).magnitude2() <= tol2 {
                vtx_map[j as usize] = i;
            }
        }
    }

    // Flatten any transitive chains so the idempotence invariant holds
    // even though the scan above only ever points forward onto an
    // already-canonical index.
    for i in 0..n {
        let mut root = vtx_map[i];
        while vtx_map[root as usize] != root {
            root = vtx_map[root as usize];
        }
        vtx_map[i] = root;
    }
    vtx_map
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn distinct_points_map_to_themselves() {
        let v = vec![point3(0., 0., 0.), point3(1., 0., 0.), point3(2., 0., 0.)];
        let map = build_vertex_map(&v, MERGE_TOLERANCE);
        assert_eq!(map, vec![0, 1, 2]);
    }

    #[test]
    fn coincident_points_merge_and_are_idempotent() {
        let v = vec![
            point3(0., 0., 0.),
            point3(0.0, 0.0, 0.0000001),
            point3(5.0, 0., 0.),
        ];
        let map = build_vertex_map(&v, MERGE_TOLERANCE);
        assert_eq!(map[1], map[0]);
        for i in 0..map.len() {
            assert_eq!(map[map[i] as usize], map[i]);
        }
    }
}
