//! Degenerate one-node BVH (§3 "Single-box tree") used for meshes too
//! small to benefit from a hierarchy.

use super::{BvTree, NodeContents};
use crate::primitives::{Aabb, BoundingVolume, Triangle};

pub struct SingleBoxTree {
    bv: Aabb,
    tris: Vec<u32>,
}

impl SingleBoxTree {
    pub fn build(triangles: &[Triangle]) -> Self {
        let bv = Aabb::from_points(triangles.iter().flat_map(|t| t.verts));
        Self { bv, tris: (0..triangles.len() as u32).collect() }
    }

    pub fn empty() -> Self {
        Self { bv: Aabb { center: cgmath::point3(0., 0., 0.), extents: cgmath::vec3(0., 0., 0.) }, tris: Vec::new() }
    }
}

impl BvTree for SingleBoxTree {
    fn node_count(&self) -> usize {
        1
    }

    fn get_node_bv(&self, _node: usize) -> BoundingVolume {
        BoundingVolume::Aabb(self.bv)
    }

    fn get_children(&self, _node: usize) -> NodeContents<'_> {
        NodeContents::Leaf { triangles: &self.tris }
    }
}
