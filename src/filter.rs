//! Mesh filter (§4.10): post-edit cleanup run after boolean subtract and
//! slice — weld near-coincident vertices, drop zero-thickness fins, and
//! swap needle-triangle diagonals into T-junction fixes. Each step
//! records what it did into the caller's [`crate::mesh::editlog::MeshUpdate`].

use crate::mesh::editlog::{MeshUpdate, TJunctionFix, WeldedVertex};
use crate::mesh::vertexmap;
use cgmath::*;

/// Below this squared sine of the angle between a triangle's two edges
/// at a vertex, the vertex is a "needle" candidate for a T-junction fix.
const NEEDLE_SIN2_THRESHOLD: f64 = 0.02;

/// Welds any two vertices within `min_len` of each other, remapping
/// `indices` and compacting away unreferenced vertices. `material_ids`
/// and `foreign_ids` are parallel to the *triangle* list and are
/// reordered in lockstep with any triangle removal the weld causes
/// (degenerate triangles produced by welding two of a triangle's three
/// corners together).
pub fn weld(
    vertices: &mut Vec<Point3<f64>>,
    indices: &mut Vec<u32>,
    material_ids: &mut Vec<u16>,
    foreign_ids: &mut Vec<u32>,
    min_len: f64,
    update: &mut MeshUpdate,
) {
    let map = vertexmap::build_vertex_map(vertices, min_len);
    for (i, &m) in map.iter().enumerate() {
        if m as usize != i {
            update.welded_vtx.push(WeldedVertex { from: i as u32, to: m });
        }
    }
    for idx in indices.iter_mut() {
        *idx = map[*idx as usize];
    }

    let tri_count = indices.len() / 3;
    let mut keep = vec![true; tri_count];
    for t in 0..tri_count {
        let (a, b, c) = (indices[t * 3], indices[t * 3 + 1], indices[t * 3 + 2]);
        if a == b || b == c || a == c {
            keep[t] = false;
            update.removed_tri.push(t as u32);
        }
    }
    let mut new_indices = Vec::with_capacity(indices.len());
    let mut new_mats = Vec::with_capacity(material_ids.len());
    let mut new_foreign = Vec::with_capacity(foreign_ids.len());
    for t in 0..tri_count {
        if keep[t] {
            new_indices.extend_from_slice(&indices[t * 3..t * 3 + 3]);
            new_mats.push(material_ids[t]);
            new_foreign.push(foreign_ids[t]);
        }
    }
    *indices = new_indices;
    *material_ids = new_mats;
    *foreign_ids = new_foreign;

    let referenced: std::collections::BTreeSet<u32> = indices.iter().copied().collect();
    let mut remap = vec![u32::MAX; vertices.len()];
    let mut compacted = Vec::with_capacity(referenced.len());
    for &old in &referenced {
        remap[old as usize] = compacted.len() as u32;
        compacted.push(vertices[old as usize]);
    }
    for (i, v) in vertices.iter().enumerate() {
        if remap[i] == u32::MAX {
            update.removed_vtx.push(i as u32);
        }
        let _ = v;
    }
    for idx in indices.iter_mut() {
        *idx = remap[*idx as usize];
    }
    *vertices = compacted;
}

/// Removes pairs of triangles that share two full edges with opposite
/// winding (a zero-thickness fin): for every unordered pair of
/// triangles sharing two of their three vertices under reversed
/// winding, both are dropped.
pub fn remove_fins(indices: &mut Vec<u32>, material_ids: &mut Vec<u16>, foreign_ids: &mut Vec<u32>, update: &mut MeshUpdate) {
    let tri_count = indices.len() / 3;
    let tri_verts = |t: usize| -> [u32; 3] { [indices[t * 3], indices[t * 3 + 1], indices[t * 3 + 2]] };
    let mut removed = vec![false; tri_count];

    for t in 0..tri_count {
        if removed[t] {
            continue;
        }
        let tv: std::collections::BTreeSet<u32> = tri_verts(t).into_iter().collect();
        for u in (t + 1)..tri_count {
            if removed[u] {
                continue;
            }
            let uv: std::collections::BTreeSet<u32> = tri_verts(u).into_iter().collect();
            if tv == uv {
                removed[t] = true;
                removed[u] = true;
                update.removed_tri.push(t as u32);
                update.removed_tri.push(u as u32);
                break;
            }
        }
    }

    let mut new_indices = Vec::new();
    let mut new_mats = Vec::new();
    let mut new_foreign = Vec::new();
    for t in 0..tri_count {
        if !removed[t] {
            new_indices.extend_from_slice(&indices[t * 3..t * 3 + 3]);
            new_mats.push(material_ids[t]);
            new_foreign.push(foreign_ids[t]);
        }
    }
    *indices = new_indices;
    *material_ids = new_mats;
    *foreign_ids = new_foreign;
}

/// Swaps the diagonal of a needle/neighbour pair when doing so yields a
/// more equilateral split (§4.10 "T-junction fix"). Operates on buddy
/// information supplied by the caller since computing it here would
/// duplicate [`crate::mesh::topology::infer_topology`].
pub fn fix_t_junctions(
    vertices: &[Point3<f64>],
    indices: &mut [u32],
    buddies: &[crate::mesh::topology::Buddies],
    update: &mut MeshUpdate,
) {
    for t in 0..buddies.len() {
        for e in 0..3 {
            let i = indices[t * 3 + e] as usize;
            let j = indices[t * 3 + (e + 1) % 3] as usize;
            let k = indices[t * 3 + (e + 2) % 3] as usize;
            let edge = vertices[j] - vertices[i];
            let to_apex = vertices[k] - vertices[i];
            let sin2 = {
                let cross = edge.cross(to_apex).magnitude2();
                let denom = edge.magnitude2() * to_apex.magnitude2();
                if denom > 1e-18 {
                    cross / denom
                } else {
                    1.0
                }
            };
            if sin2 >= NEEDLE_SIN2_THRESHOLD {
                continue;
            }
            let Some(u) = buddies[t][e].checked_then() else { continue };
            let u = u as usize;
            let opp_e = (0..3).find(|&e2| {
                let a = indices[u * 3 + e2];
                let b = indices[u * 3 + (e2 + 1) % 3];
                a as usize == j && b as usize == i
            });
            let Some(e2) = opp_e else { continue };
            let m = indices[u * 3 + (e2 + 2) % 3] as usize;

            // Swap the shared edge (i, j) for the diagonal (k, m) if that
            // makes both resulting triangles less needle-like.
            let new_edge = vertices[m] - vertices[k];
            let old_worst = sin2;
            let candidate_sin2 = {
                let a = vertices[k] - vertices[i];
                let b = new_edge;
                let cross = a.cross(b).magnitude2();
                let denom = a.magnitude2() * b.magnitude2();
                if denom > 1e-18 {
                    cross / denom
                } else {
                    0.0
                }
            };
            if candidate_sin2 > old_worst {
                indices[t * 3] = k as u32;
                indices[t * 3 + 1] = i as u32;
                indices[t * 3 + 2] = m as u32;
                indices[u * 3] = k as u32;
                indices[u * 3 + 1] = m as u32;
                indices[u * 3 + 2] = j as u32;
                update.tj_fixes.push(TJunctionFix { tri: t as u32, edge: e as u8, inserted_vtx: m as u32 });
            }
        }
    }
}

trait SignedIndex {
    fn checked_then(self) -> Option<i32>;
}
impl SignedIndex for i32 {
    fn checked_then(self) -> Option<i32> {
        if self >= 0 {
            Some(self)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn weld_collapses_duplicate_point_and_drops_degenerate_tri() {
        let mut vertices = vec![
            point3(0., 0., 0.),
            point3(1., 0., 0.),
            point3(0., 1., 0.),
            point3(0.0000001, 0., 0.),
        ];
        let mut indices = vec![0, 1, 2, 3, 1, 2];
        let mut mats = vec![0u16, 0];
        let mut foreign = vec![0u32, 1];
        let mut update = MeshUpdate::new();
        weld(&mut vertices, &mut indices, &mut mats, &mut foreign, 1e-4, &mut update);
        assert_eq!(indices.len() / 3, 1);
        assert!(!update.welded_vtx.is_empty());
    }

    #[test]
    fn fins_are_removed_in_pairs() {
        let mut indices = vec![0, 1, 2, 2, 1, 0];
        let mut mats = vec![0u16, 0];
        let mut foreign = vec![0u32, 1];
        let mut update = MeshUpdate::new();
        remove_fins(&mut indices, &mut mats, &mut foreign, &mut update);
        assert!(indices.is_empty());
        assert_eq!(update.removed_tri.len(), 2);
    }
}
