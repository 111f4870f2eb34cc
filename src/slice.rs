//! Planar slicing (§4.11): cuts a mesh along the plane of a bounding
//! triangle `tri_cut`. Every mesh triangle whose projection onto that
//! plane falls within `tri_cut`'s 2D footprint and which straddles the
//! plane is split into sub-triangles along the cut segment; triangles
//! entirely on one side are carried over unchanged.

use crate::intersect::triangle_plane_intersection;
use crate::mesh::editlog::{MeshUpdate, NewTriangle, NewVertex};
use crate::primitives::{Plane, Triangle};
use cgmath::*;

pub struct SliceResult {
    pub vertices: Vec<Point3<f64>>,
    pub indices: Vec<u32>,
    pub material_ids: Vec<u16>,
    pub foreign_ids: Vec<u32>,
    pub update: MeshUpdate,
}

fn project_2d(basis_x: Vector3<f64>, basis_y: Vector3<f64>, origin: Point3<f64>, p: Point3<f64>) -> Point2<f64> {
    let d = p - origin;
    point2(basis_x.dot(d), basis_y.dot(d))
}

fn point_in_triangle_2d(p: Point2<f64>, a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> bool {
    let d1 = (p.x - b.x) * (a.y - b.y) - (a.x - b.x) * (p.y - b.y);
    let d2 = (p.x - c.x) * (b.y - c.y) - (b.x - c.x) * (p.y - c.y);
    let d3 = (p.x - a.x) * (c.y - a.y) - (c.x - a.x) * (p.y - a.y);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Cuts `vertices`/`indices` by the plane of `tri_cut`, bounded to
/// `tri_cut`'s footprint. Returns the rebuilt mesh arrays plus a
/// [`MeshUpdate`] describing what changed; the caller is expected to
/// re-run topology/islands/BV-tree rebuild afterward (§4.3) and apply
/// the `min_area` island filter itself once islands are known, since
/// that needs the rebuilt adjacency this function doesn't compute.
pub fn slice(
    vertices: &[Point3<f64>],
    indices: &[u32],
    material_ids: &[u16],
    foreign_ids: &[u32],
    tri_cut: &Triangle,
    min_len: f64,
) -> SliceResult {
    let plane = Plane::from_point_normal(tri_cut.centroid(), tri_cut.normal());
    let n = tri_cut.normal();
    let up = if n.x.abs() < 0.9 { vec3(1., 0., 0.) } else { vec3(0., 1., 0.) };
    let bx = up.cross(n).normalize();
    let by = n.cross(bx).normalize();
    let origin = tri_cut.verts[0];
    let cut2d = tri_cut.verts.map(|p| project_2d(bx, by, origin, p));

    let mut new_vertices = vertices.to_vec();
    let mut new_indices = Vec::with_capacity(indices.len());
    let mut new_mats = Vec::new();
    let mut new_foreign = Vec::new();
    let mut update = MeshUpdate::new();
    let min_len2 = min_len * min_len;

    let tri_count = indices.len() / 3;
    for t in 0..tri_count {
        let verts = [
            vertices[indices[t * 3] as usize],
            vertices[indices[t * 3 + 1] as usize],
            vertices[indices[t * 3 + 2] as usize],
        ];
        let tri = Triangle::new(verts[0], verts[1], verts[2]);
        let dists = verts.map(|v| plane.signed_dist(v));
        let straddles = dists.iter().any(|&d| d > 0.0) && dists.iter().any(|&d| d < 0.0);
        let footprint_hit = verts.iter().any(|&v| {
            let p2 = project_2d(bx, by, origin, v);
            point_in_triangle_2d(p2, cut2d[0], cut2d[1], cut2d[2])
        });

        if !straddles || !footprint_hit {
            new_indices.extend_from_slice(&indices[t * 3..t * 3 + 3]);
            new_mats.push(material_ids[t]);
            new_foreign.push(foreign_ids[t]);
            continue;
        }

        let cut_pts = triangle_plane_intersection(&tri, &plane);
        if cut_pts.len() != 2 {
            // Plane grazes an edge/vertex rather than cutting cleanly;
            // keep the triangle whole rather than guess a split.
            new_indices.extend_from_slice(&indices[t * 3..t * 3 + 3]);
            new_mats.push(material_ids[t]);
            new_foreign.push(foreign_ids[t]);
            continue;
        }

        let mut cut_idx = [0u32; 2];
        for (slot, &cp) in cut_pts.iter().enumerate() {
            if let Some(existing) = new_vertices.iter().position(|&v| (v - cp).magnitude2() <= min_len2) {
                cut_idx[slot] = existing as u32;
            } else {
                cut_idx[slot] = new_vertices.len() as u32;
                new_vertices.push(cp);
                update.new_vtx.push(NewVertex {
                    idx: cut_idx[slot],
                    source_b_vtx: None,
                    source_tri_a: Some(t as u32),
                    source_tri_b: None,
                });
            }
        }

        // Classify each original vertex by side and fan the quad/tri
        // pieces the cut leaves behind; a cut through a triangle always
        // isolates exactly one vertex on one side and two on the other.
        let lone = if dists[0].signum() != dists[1].signum() && dists[0].signum() != dists[2].signum() {
            0
        } else if dists[1].signum() != dists[0].signum() && dists[1].signum() != dists[2].signum() {
            1
        } else {
            2
        };
        let pair = [(lone + 1) % 3, (lone + 2) % 3];
        let vi = [indices[t * 3] , indices[t * 3 + 1], indices[t * 3 + 2]];

        let tris_out = [
            [vi[lone], cut_idx[0], cut_idx[1]],
            [cut_idx[0], vi[pair[0]], vi[pair[1]]],
            [cut_idx[0], vi[pair[1]], cut_idx[1]],
        ];
        for (k, tri_out) in tris_out.iter().enumerate() {
            new_indices.extend_from_slice(tri_out);
            new_mats.push(material_ids[t]);
            new_foreign.push(foreign_ids[t]);
            update.new_tri.push(NewTriangle {
                idx_new: (new_indices.len() / 3 - 1) as u32,
                idx_org: t as u32,
                iop: k as i32,
                barycentric_area: [[0.0; 3]; 3],
                area_org: tri.area(),
                vertex_refs: [tri_out[0], tri_out[1], tri_out[2]],
            });
        }
        update.removed_tri.push(t as u32);
    }

    SliceResult { vertices: new_vertices, indices: new_indices, material_ids: new_mats, foreign_ids: new_foreign, update }
}

/// Applies the `min_area` island filter of §4.11 step 4: islands whose
/// triangle area is below `min_area * total_area` are dropped entirely.
pub fn filter_small_islands(
    vertices: &[Point3<f64>],
    indices: &[u32],
    material_ids: &[u16],
    foreign_ids: &[u32],
    islands: &[crate::mesh::islands::Island],
    min_area_fraction: f64,
) -> (Vec<u32>, Vec<u16>, Vec<u32>) {
    if min_area_fraction <= 0.0 {
        return (indices.to_vec(), material_ids.to_vec(), foreign_ids.to_vec());
    }
    let tri_area = |t: usize| -> f64 {
        Triangle::new(
            vertices[indices[t * 3] as usize],
            vertices[indices[t * 3 + 1] as usize],
            vertices[indices[t * 3 + 2] as usize],
        )
        .area()
    };
    let total: f64 = (0..indices.len() / 3).map(tri_area).sum();
    let threshold = min_area_fraction * total;

    let mut new_indices = Vec::new();
    let mut new_mats = Vec::new();
    let mut new_foreign = Vec::new();
    for island in islands {
        let island_area: f64 = island.tris.iter().map(|&t| tri_area(t as usize)).sum();
        if island_area < threshold {
            continue;
        }
        for &t in &island.tris {
            new_indices.extend_from_slice(&indices[t as usize * 3..t as usize * 3 + 3]);
            new_mats.push(material_ids[t as usize]);
            new_foreign.push(foreign_ids[t as usize]);
        }
    }
    (new_indices, new_mats, new_foreign)
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
    fn slicing_cube_at_equator_preserves_total_volume() {
        let (v, idx) = unit_cube();
        let mats = vec![0u16; idx.len() / 3];
        let foreign: Vec<u32> = (0..idx.len() as u32 / 3).collect();
        let tri_cut = Triangle::new(point3(-10., 0., -10.), point3(10., 0., -10.), point3(0., 0., 10.));
        let result = slice(&v, &idx, &mats, &foreign, &tri_cut, 1e-6);
        let volume: f64 = (0..result.indices.len() / 3)
            .map(|t| {
                Triangle::new(
                    result.vertices[result.indices[t * 3] as usize],
                    result.vertices[result.indices[t * 3 + 1] as usize],
                    result.vertices[result.indices[t * 3 + 2] as usize],
                )
                .signed_tet_volume()
            })
            .sum();
        assert_approx_eq::assert_approx_eq!(volume, 1.0, 1e-4);
    }
}
