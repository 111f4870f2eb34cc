//! OBB-tree BV store (§3 "OBB node", §4.2).
//!
//! Each node fits its own oriented frame from the PCA of the vertices
//! beneath it (`jacobi::symmetric_eigen`) rather than inheriting the
//! parent's axes, matching the spec's per-node-oriented-frame contract.

use super::jacobi;
use super::{BuildParams, BvTree, NodeContents};
use crate::primitives::{Aabb, BoundingVolume, Obb, Triangle};
use cgmath::*;

#[derive(Clone, Copy, Debug)]
pub struct ObbNode {
    pub axes: [Vector3<f64>; 3],
    pub center: Point3<f64>,
    pub size: Vector3<f64>,
    pub parent: i32,
    pub child_or_tri_start: i32,
    pub tri_count: i32,
}

pub struct ObbTree {
    nodes: Vec<ObbNode>,
    tri_order: Vec<u32>,
}

fn fit_obb(triangles: &[Triangle], order: &[u32]) -> (Obb, Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let pts: Vec<Point3<f64>> = order.iter().flat_map(|&i| triangles[i as usize].verts).collect();
    let (centroid, cov) = jacobi::covariance(&pts);
    let (axes_mat, _) = jacobi::symmetric_eigen(cov);
    let (x, y, z) = (axes_mat.x.normalize(), axes_mat.y.normalize(), axes_mat.z.normalize());
    let mut min = vec3(f64::MAX, f64::MAX, f64::MAX);
    let mut max = vec3(f64::MIN, f64::MIN, f64::MIN);
    for p in &pts {
        let d = p - centroid;
        let proj = vec3(d.dot(x), d.dot(y), d.dot(z));
        min.x = min.x.min(proj.x);
        min.y = min.y.min(proj.y);
        min.z = min.z.min(proj.z);
        max.x = max.x.max(proj.x);
        max.y = max.y.max(proj.y);
        max.z = max.z.max(proj.z);
    }
    let local_center = (min + max) / 2.0;
    let extents = (max - min) / 2.0;
    let center = centroid + local_center.x * x + local_center.y * y + local_center.z * z;
    (
        Obb { center, extents: vec3(extents.x.max(1e-9), extents.y.max(1e-9), extents.z.max(1e-9)), x, y, z },
        x,
        y,
        z,
    )
}

impl ObbTree {
    pub fn build(triangles: &[Triangle], params: BuildParams) -> Self {
        let mut tree = Self { nodes: Vec::new(), tri_order: Vec::new() };
        let order: Vec<u32> = (0..triangles.len() as u32).collect();
        tree.build_node(triangles, order, 0, -1, &params);
        tree
    }

    fn build_node(&mut self, triangles: &[Triangle], order: Vec<u32>, depth: u32, parent: i32, params: &BuildParams) -> usize {
        let node_idx = self.nodes.len();
        let (obb, x, y, z) = fit_obb(triangles, &order);
        self.nodes.push(ObbNode {
            axes: [x, y, z],
            center: obb.center,
            size: obb.extents,
            parent,
            child_or_tri_start: 0,
            tri_count: 0,
        });

        if order.len() <= params.max_tris_per_node || depth + 2 >= params.max_depth {
            let start = self.tri_order.len() as i32;
            self.tri_order.extend(order.iter().copied());
            self.nodes[node_idx].child_or_tri_start = start;
            self.nodes[node_idx].tri_count = order.len() as i32;
            return node_idx;
        }

        // Split along the axis of greatest extent (the first PCA axis),
        // trying the same three partition modes as the AABB builder
        // (§4.1 step 3) but projected into the node's own local frame.
        let mut best: Option<(f64, Vec<u32>, Vec<u32>)> = None;
        for axis_vec in [x, y, z] {
            for below_rule in [0, 1, 2] {
                let mut below = Vec::new();
                let mut above = Vec::new();
                for &idx in &order {
                    let t = &triangles[idx as usize];
                    let projs: Vec<f64> = t.verts.iter().map(|v| (v - obb.center).dot(axis_vec)).collect();
                    let goes_below = match below_rule {
                        0 => projs.iter().cloned().fold(f64::MIN, f64::max) <= 0.0,
                        1 => projs.iter().cloned().fold(f64::MAX, f64::min) >= 0.0,
                        _ => projs.iter().sum::<f64>() / 3.0 < 0.0,
                    };
                    if goes_below {
                        below.push(idx);
                    } else {
                        above.push(idx);
                    }
                }
                if below.is_empty() || above.is_empty() {
                    continue;
                }
                let mut score = (below.len().min(above.len())) as f64;
                if below.len() < params.min_tris_per_node || above.len() < params.min_tris_per_node {
                    score /= 8.0;
                }
                if best.as_ref().map_or(true, |(s, ..)| score > *s) {
                    best = Some((score, below, above));
                }
            }
        }

        match best {
            Some((_, below, above)) => {
                let left = self.build_node(triangles, below, depth + 1, node_idx as i32, params);
                let right = self.build_node(triangles, above, depth + 1, node_idx as i32, params);
                debug_assert_eq!(right, left + 1);
                self.nodes[node_idx].child_or_tri_start = left as i32;
                self.nodes[node_idx].tri_count = 0;
            }
            None => {
                let start = self.tri_order.len() as i32;
                self.tri_order.extend(order.iter().copied());
                self.nodes[node_idx].child_or_tri_start = start;
                self.nodes[node_idx].tri_count = order.len() as i32;
            }
        }
        node_idx
    }

    pub fn aabb_alternative(&self, triangles: &[Triangle]) -> Aabb {
        Aabb::from_points(triangles.iter().flat_map(|t| t.verts))
    }
}

impl BvTree for ObbTree {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn get_node_bv(&self, node: usize) -> BoundingVolume {
        let n = &self.nodes[node];
        BoundingVolume::Obb(Obb { center: n.center, extents: n.size, x: n.axes[0], y: n.axes[1], z: n.axes[2] })
    }

    fn get_children(&self, node: usize) -> NodeContents<'_> {
        let n = &self.nodes[node];
        if n.tri_count > 0 {
            let start = n.child_or_tri_start as usize;
            NodeContents::Leaf { triangles: &self.tri_order[start..start + n.tri_count as usize] }
        } else {
            let c = n.child_or_tri_start as usize;
            NodeContents::Internal { left: c, right: c + 1 }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sloped_plank() -> Vec<Triangle> {
        // A long thin box rotated 30 degrees about z, so an OBB should
        // fit it far tighter than an AABB.
        let rot = Matrix3::from_angle_z(Deg(30.0));
        let local = [
            point3(-5., -0.2, -0.2), point3(5., -0.2, -0.2), point3(5., 0.2, -0.2), point3(-5., 0.2, -0.2),
            point3(-5., -0.2, 0.2), point3(5., -0.2, 0.2), point3(5., 0.2, 0.2), point3(-5., 0.2, 0.2),
        ];
        let idx: [[usize; 3]; 12] = [
            [0, 1, 2], [0, 2, 3], [4, 6, 5], [4, 7, 6],
            [0, 4, 5], [0, 5, 1], [1, 5, 6], [1, 6, 2],
            [2, 6, 7], [2, 7, 3], [3, 7, 4], [3, 4, 0],
        ];
        let world: Vec<Point3<f64>> = local.iter().map(|p| point3(0., 0., 0.) + rot * p.to_vec()).collect();
        idx.iter().map(|t| Triangle::new(world[t[0]], world[t[1]], world[t[2]])).collect()
    }

    #[test]
    fn obb_tighter_than_aabb_for_rotated_plank() {
        let tris = sloped_plank();
        let obb_tree = ObbTree::build(&tris, BuildParams::default());
        let obb_vol = obb_tree.get_node_bv(0).vol();
        let aabb = Aabb::from_points(tris.iter().flat_map(|t| t.verts));
        assert!(obb_vol < aabb.vol(), "obb {obb_vol} should be tighter than aabb {}", aabb.vol());
    }
}
