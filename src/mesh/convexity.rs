//! Convexity analysis (§4.5): a small promote-on-hit cache of
//! `tolerance -> is_convex` answers, grounded on the original engine's
//! `IsConvex` routine (same formula: cross of adjacent face normals
//! squared-length vs `tolerance^2`, with a sign check against the edge
//! direction to catch reflex edges).

use super::topology::Buddies;
use cgmath::*;

const CACHE_SIZE: usize = 4;

#[derive(Clone, Copy)]
struct Entry {
    tolerance: f64,
    is_convex: bool,
}

#[derive(Default)]
pub struct ConvexityCache {
    entries: Vec<Entry>,
}

impl ConvexityCache {
    pub fn new() -> Self {
        Self { entries: Vec::with_capacity(CACHE_SIZE) }
    }

    /// Returns whether the mesh is convex at `tolerance`, computing and
    /// caching the answer on a miss. A multi-island mesh is never convex
    /// (§4.5).
    pub fn is_convex(
        &mut self,
        tolerance: f64,
        vertices: &[Point3<f64>],
        indices: &[u32],
        normals: &[Vector3<f64>],
        buddies: &[Buddies],
        n_islands: usize,
    ) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| e.tolerance == tolerance) {
            let entry = self.entries.remove(pos);
            self.entries.insert(0, entry);
            return entry.is_convex;
        }
        let is_convex = n_islands <= 1 && compute_convex(vertices, indices, normals, buddies, tolerance);
        if self.entries.len() >= CACHE_SIZE {
            self.entries.pop();
        }
        self.entries.insert(0, Entry { tolerance, is_convex });
        is_convex
    }
}

fn compute_convex(
    vertices: &[Point3<f64>],
    indices: &[u32],
    normals: &[Vector3<f64>],
    buddies: &[Buddies],
    tolerance: f64,
) -> bool {
    let tol2 = tolerance * tolerance;
    for t in 0..buddies.len() {
        for e in 0..3 {
            let u = buddies[t][e];
            if u < 0 || (u as usize) < t {
                // Only test each internal edge once.
                continue;
            }
            let i = indices[t * 3 + e] as usize;
            let j = indices[t * 3 + (e + 1) % 3] as usize;
            let edge_dir = vertices[j] - vertices[i];
            let n0 = normals[t];
            let n1 = normals[u as usize];
            let cross = n0.cross(n1);
            if cross.magnitude2() > tol2 && cross.dot(edge_dir) < 0.0 {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::topology::infer_topology;

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

    fn face_normals(vertices: &[Point3<f64>], indices: &[u32]) -> Vec<Vector3<f64>> {
        (0..indices.len() / 3)
            .map(|t| {
                let a = vertices[indices[t * 3] as usize];
                let b = vertices[indices[t * 3 + 1] as usize];
                let c = vertices[indices[t * 3 + 2] as usize];
                (b - a).cross(c - a).normalize()
            })
            .collect()
    }

    #[test]
    fn unit_cube_is_convex() {
        let (v, idx) = unit_cube();
        let norms = face_normals(&v, &idx);
        let (buddies, _) = infer_topology(&v, &idx, &norms);
        let mut cache = ConvexityCache::new();
        assert!(cache.is_convex(0.02, &v, &idx, &norms, &buddies, 1));
    }

    #[test]
    fn cache_promotes_hit_to_front() {
        let (v, idx) = unit_cube();
        let norms = face_normals(&v, &idx);
        let (buddies, _) = infer_topology(&v, &idx, &norms);
        let mut cache = ConvexityCache::new();
        cache.is_convex(0.01, &v, &idx, &norms, &buddies, 1);
        cache.is_convex(0.02, &v, &idx, &norms, &buddies, 1);
        cache.is_convex(0.03, &v, &idx, &norms, &buddies, 1);
        cache.is_convex(0.01, &v, &idx, &norms, &buddies, 1);
        assert_eq!(cache.entries[0].tolerance, 0.01);
    }
}
