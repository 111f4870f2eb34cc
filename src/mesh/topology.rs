//! Topology inference (§4.4): per-triangle edge buddies.

use cgmath::*;
use itertools::Itertools;

/// Neighbour triangle across each of a triangle's three edges, or `-1`
/// at a boundary. Edge `e` runs from vertex `e` to vertex `(e+1) % 3`.
pub type Buddies = [i32; 3];

/// Infers topology for a triangle soup. Returns the per-triangle buddy
/// array and a count of non-manifold + boundary edges (`m_nErrors`,
/// logged by the caller rather than returned as a hard failure — see
/// §7's non-manifold-input entry).
pub fn infer_topology(vertices: &[Point3<f64>], indices: &[u32], normals: &[Vector3<f64>]) -> (Vec<Buddies>, u32) {
    let tri_count = indices.len() / 3;
    let mut incidence: Vec<Vec<u32>> = vec![Vec::new(); vertices.len()];
    for t in 0..tri_count {
        for k in 0..3 {
            incidence[indices[t * 3 + k] as usize].push(t as u32);
        }
    }

    let mut buddies = vec![[-1i32; 3]; tri_count];
    let mut errors = 0u32;

    for t in 0..tri_count {
        for e in 0..3 {
            let i = indices[t * 3 + e] as usize;
            let j = indices[t * 3 + (e + 1) % 3] as usize;
            if buddies[t][e] != -1 {
                continue;
            }
            // Candidates incident to both endpoints, excluding self.
            let candidates: Vec<u32> = incidence[i]
                .iter()
                .copied()
                .filter(|&c| c != t as u32 && incidence[j].contains(&c))
                .sorted_unstable()
                .dedup()
                .collect();

            if candidates.is_empty() {
                buddies[t][e] = -1;
                errors += 1;
                continue;
            }
            let chosen = if candidates.len() == 1 {
                candidates[0]
            } else {
                errors += 1;
                pick_by_dihedral(vertices, indices, normals, t as u32, i, j, &candidates)
            };
            buddies[t][e] = chosen as i32;
            if let Some(e2) = edge_by_buddy(indices, chosen as usize, i, j) {
                buddies[chosen as usize][e2] = t as i32;
            }
        }
    }
    (buddies, errors)
}

/// Finds the edge index on triangle `u` whose endpoints are `(j, i)`
/// (reversed relative to the edge `(i, j)` on the original triangle),
/// satisfying the buddy invariant in §3/§8.
fn edge_by_buddy(indices: &[u32], u: usize, i: usize, j: usize) -> Option<usize> {
    for e in 0..3 {
        let a = indices[u * 3 + e] as usize;
        let b = indices[u * 3 + (e + 1) % 3] as usize;
        if a == j && b == i {
            return Some(e);
        }
    }
    None
}

/// Among non-manifold candidates, picks the neighbour whose dihedral
/// angle against the current triangle is smallest, via `(v0 x v1) .
/// edge_dir` with a squared-magnitude tie-break (§4.4).
fn pick_by_dihedral(
    vertices: &[Point3<f64>],
    indices: &[u32],
    normals: &[Vector3<f64>],
    t: u32,
    i: usize,
    j: usize,
    candidates: &[u32],
) -> u32 {
    let edge_dir = (vertices[j] - vertices[i]).normalize();
    let n0 = normals[t as usize];
    let mut best = candidates[0];
    let mut best_score = f64::MAX;
    for &c in candidates {
        if edge_by_buddy(indices, c as usize, i, j).is_none() {
            continue;
        }
        let n1 = normals[c as usize];
        let cross = n0.cross(n1);
        let dihedral = cross.dot(edge_dir);
        let score = dihedral.abs();
        if score < best_score || (score == best_score && cross.magnitude2() < n0.cross(normals[best as usize]).magnitude2()) {
            best_score = score;
            best = c;
        }
    }
    best
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
    fn closed_cube_has_no_boundary_edges() {
        let (v, idx) = unit_cube();
        let norms = face_normals(&v, &idx);
        let (buddies, errors) = infer_topology(&v, &idx, &norms);
        assert_eq!(errors, 0);
        for b in &buddies {
            assert!(b.iter().all(|&x| x >= 0));
        }
    }

    #[test]
    fn buddy_edges_match_reversed() {
        let (v, idx) = unit_cube();
        let norms = face_normals(&v, &idx);
        let (buddies, _) = infer_topology(&v, &idx, &norms);
        for t in 0..buddies.len() {
            for e in 0..3 {
                let u = buddies[t][e];
                if u < 0 {
                    continue;
                }
                let i = idx[t * 3 + e];
                let j = idx[t * 3 + (e + 1) % 3];
                let e2 = edge_by_buddy(&idx, u as usize, i as usize, j as usize);
                assert!(e2.is_some(), "no reciprocal edge for t={t} e={e}");
            }
        }
    }
}
