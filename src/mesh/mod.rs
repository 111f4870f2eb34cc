//! Triangle mesh storage and the build pipeline that turns a raw
//! vertex/index soup into a fully analyzed mesh: vertex welding,
//! topology, islands, convexity, a bounding-volume tree, and (lazily) a
//! planar hash grid (§4.3).

pub mod convexity;
pub mod editlog;
pub mod hashgrid;
pub mod islands;
pub mod topology;
pub mod vertexmap;

use crate::bvtree::{BuildParams, BvTreeKind};
use crate::primitives::{Aabb, Triangle};
use cgmath::*;
use std::sync::RwLock;

/// Below this threshold a newly created triangle's foreign id is
/// treated as "unassigned" rather than inherited from an operand mesh
/// (§3 "new_tri"). Picked well above any realistic triangle count so a
/// legitimate source index never collides with it.
pub const BOP_NEWIDX0: u32 = 1 << 24;

/// The analyzed, queryable parts of a mesh. Split out from
/// [`TriangleMesh`] so the two locks described in §5 guard independent
/// halves of the state: `contents` (vertex/index/topology data, mutated
/// by edits) and the hash grid (built lazily, read far more often than
/// written).
pub struct MeshContents {
    pub vertices: Vec<Point3<f64>>,
    pub indices: Vec<u32>,
    pub normals: Vec<Vector3<f64>>,
    pub material_ids: Vec<u16>,
    pub foreign_ids: Vec<u32>,
    pub vtx_map: Vec<u32>,
    pub buddies: Vec<topology::Buddies>,
    pub islands: Vec<islands::Island>,
    pub bvtree: BvTreeKind,
    pub last_new_tri_idx: u32,
}

/// A fully built triangle mesh (§2 component 2 / §3).
///
/// Locking mirrors §5: `contents` is an `RwLock` taken for writes during
/// an edit (boolean, filter, slice) and for reads during topology/BVH
/// queries; the hash grid is a second, independent `RwLock` so a ray
/// query against the grid never blocks on an unrelated geometry edit
/// and vice versa. Neither lock is keyed by OS thread id — callers pass
/// a plain scratch-slot index (see [`crate::scratch`]) instead.
pub struct TriangleMesh {
    contents: RwLock<MeshContents>,
    hash_grid: RwLock<Option<hashgrid::HashGrid>>,
    convexity: RwLock<convexity::ConvexityCache>,
    edit_log: RwLock<editlog::EditLogChain>,
    pub min_vtx_dist: f64,
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

fn triangles_from(vertices: &[Point3<f64>], indices: &[u32]) -> Vec<Triangle> {
    (0..indices.len() / 3)
        .map(|t| {
            Triangle::new(
                vertices[indices[t * 3] as usize],
                vertices[indices[t * 3 + 1] as usize],
                vertices[indices[t * 3 + 2] as usize],
            )
        })
        .collect()
}

impl TriangleMesh {
    /// Runs the full build pipeline (§4.3 steps 1-8) over a raw triangle
    /// soup: weld coincident vertices, reindex, infer topology, compute
    /// islands, pick the best bounding-volume tree, and seed an empty
    /// convexity cache. The hash grid is left unbuilt until first queried.
    pub fn build(
        raw_vertices: Vec<Point3<f64>>,
        raw_indices: Vec<u32>,
        material_ids: Vec<u16>,
        foreign_ids: Vec<u32>,
    ) -> Self {
        let bb = Aabb::from_points(raw_vertices.iter().copied());
        let max_extent = bb.extents.x.max(bb.extents.y).max(bb.extents.z) * 2.0;
        let min_vtx_dist = (0.0002 * max_extent).max(f64::EPSILON);

        let vtx_map = vertexmap::build_vertex_map(&raw_vertices, min_vtx_dist);
        let n_welded = vtx_map.iter().enumerate().filter(|(i, &m)| m as usize != *i).count();
        if n_welded > 0 {
            log::debug!("mesh build: welded {n_welded} coincident vertices");
        }

        let indices: Vec<u32> = raw_indices.iter().map(|&i| vtx_map[i as usize]).collect();
        let mut degenerate = 0usize;
        let tri_count = indices.len() / 3;
        let kept_mask: Vec<bool> = (0..tri_count)
            .map(|t| {
                let (a, b, c) = (indices[t * 3], indices[t * 3 + 1], indices[t * 3 + 2]);
                a != b && b != c && a != c
            })
            .collect();
        let indices: Vec<u32> = (0..tri_count)
            .filter(|&t| {
                if !kept_mask[t] {
                    degenerate += 1;
                }
                kept_mask[t]
            })
            .flat_map(|t| [indices[t * 3], indices[t * 3 + 1], indices[t * 3 + 2]])
            .collect();
        if degenerate > 0 {
            log::warn!("mesh build: dropped {degenerate} degenerate triangles after welding");
        }
        // material_ids/foreign_ids are per-triangle and must stay aligned
        // with the degenerate-filtered index buffer (§4.3 step 2 / §3).
        let material_ids: Vec<u16> = (0..tri_count).filter(|&t| kept_mask[t]).map(|t| material_ids[t]).collect();
        let foreign_ids: Vec<u32> = (0..tri_count).filter(|&t| kept_mask[t]).map(|t| foreign_ids[t]).collect();

        let normals = face_normals(&raw_vertices, &indices);
        let (buddies, errors) = topology::infer_topology(&raw_vertices, &indices, &normals);
        if errors > 0 {
            log::warn!("mesh build: {errors} non-manifold or boundary edges");
        }
        let islands = islands::compute_islands(&raw_vertices, &indices, &buddies);

        let triangles = triangles_from(&raw_vertices, &indices);
        let bvtree = BvTreeKind::build_best(&triangles, BuildParams::default());

        let contents = MeshContents {
            vertices: raw_vertices,
            indices,
            normals,
            material_ids,
            foreign_ids,
            vtx_map,
            buddies,
            islands,
            bvtree,
            last_new_tri_idx: BOP_NEWIDX0,
        };

        Self {
            contents: RwLock::new(contents),
            hash_grid: RwLock::new(None),
            convexity: RwLock::new(convexity::ConvexityCache::new()),
            edit_log: RwLock::new(editlog::EditLogChain::new()),
            min_vtx_dist,
        }
    }

    pub fn with_contents<R>(&self, f: impl FnOnce(&MeshContents) -> R) -> R {
        f(&self.contents.read().unwrap())
    }

    pub fn with_contents_mut<R>(&self, f: impl FnOnce(&mut MeshContents) -> R) -> R {
        f(&mut self.contents.write().unwrap())
    }

    pub fn tri_count(&self) -> usize {
        self.with_contents(|c| c.indices.len() / 3)
    }

    pub fn is_convex(&self, tolerance: f64) -> bool {
        let c = self.contents.read().unwrap();
        self.convexity.write().unwrap().is_convex(
            tolerance,
            &c.vertices,
            &c.indices,
            &c.normals,
            &c.buddies,
            c.islands.len(),
        )
    }

    /// Builds the planar hash grid on demand (§4.7) and returns a ray's
    /// candidate triangle list. Subsequent calls reuse the cached grid.
    pub fn ray_candidates(&self, ray: &crate::primitives::Ray) -> Vec<u32> {
        {
            let existing = self.hash_grid.read().unwrap();
            if let Some(grid) = existing.as_ref() {
                return grid.candidates_for_ray(ray);
            }
        }
        let mut slot = self.hash_grid.write().unwrap();
        if slot.is_none() {
            let c = self.contents.read().unwrap();
            let preferred_normal = c.normals.first().copied().unwrap_or_else(|| vec3(0., 1., 0.));
            *slot = Some(hashgrid::HashGrid::build(&c.vertices, &c.indices, preferred_normal));
        }
        slot.as_ref().unwrap().candidates_for_ray(ray)
    }

    /// Invalidates the cached hash grid; called after any edit that
    /// changes triangle positions or count.
    fn invalidate_hash_grid(&self) {
        *self.hash_grid.write().unwrap() = None;
    }

    pub fn push_edit(&self, update: editlog::MeshUpdate) {
        if !update.is_empty() {
            self.edit_log.write().unwrap().push(update);
        }
        self.invalidate_hash_grid();
    }

    pub fn last_edit_is_empty(&self) -> bool {
        self.edit_log.read().unwrap().last().map_or(true, |u| u.is_empty())
    }
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
    fn cube_builds_with_one_island_and_is_convex() {
        let (v, idx) = unit_cube();
        let n = v.len();
        let mesh = TriangleMesh::build(v, idx, vec![0; 12], (0..12).collect());
        assert_eq!(mesh.with_contents(|c| c.islands.len()), 1);
        assert!(mesh.is_convex(0.02));
        assert_eq!(mesh.with_contents(|c| c.vertices.len()), n);
    }

    #[test]
    fn ray_candidates_nonempty_through_cube() {
        let (v, idx) = unit_cube();
        let mesh = TriangleMesh::build(v, idx, vec![0; 12], (0..12).collect());
        let ray = crate::primitives::Ray::new(point3(0., 0., 5.), vec3(0., 0., -1.));
        assert!(!mesh.ray_candidates(&ray).is_empty());
    }
}
