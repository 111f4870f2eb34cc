//! Bounding-volume tree interface (§4.1, §4.2, §9 Design Notes).
//!
//! `AabbTree`, `ObbTree`, and `SingleBoxTree` share one trait instead of
//! three unrelated APIs; `BvTree` is the tagged sum the design notes ask
//! for, dispatched through `BvTreeKind` rather than a `dyn` object since
//! callers always know which of the three flavours a mesh picked.

pub mod aabb_tree;
pub mod jacobi;
pub mod obb_tree;
pub mod single_box;

use crate::primitives::{BoundingVolume, Ray};
use crate::scratch::{ScratchMark, ScratchRing};

/// Criteria for stopping the recursive subdivision of a BV-tree, mirrored
/// on both the AABB and OBB builders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildParams {
    pub min_tris_per_node: usize,
    pub max_tris_per_node: usize,
    /// Fraction of the root extent below which a leaf is marked
    /// `single_collision` (only one contact need be reported for it).
    pub skip_dim: f64,
    pub max_depth: u32,
    /// OBB is preferred over AABB only when `vol(obb) * favor_aabb < vol(aabb)`.
    pub favor_aabb: f64,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            min_tris_per_node: 2,
            max_tris_per_node: 4,
            skip_dim: 0.01,
            max_depth: 64,
            favor_aabb: 1.0,
        }
    }
}

/// One node's worth of information needed by a traversal: its bounding
/// volume and, if it is a leaf, the triangle range it owns.
pub enum NodeContents<'a> {
    Internal { left: usize, right: usize },
    Leaf { triangles: &'a [u32] },
}

/// Uniform BV-tree contract (§2 component 5, §9 "plugin-style BV-tree
/// dispatch"). All three implementations (AABB, OBB, single-box) share
/// this surface; a query never needs to know which one it is talking to.
pub trait BvTree {
    fn node_count(&self) -> usize;
    fn root(&self) -> usize {
        0
    }
    fn get_node_bv(&self, node: usize) -> BoundingVolume;
    fn get_children(&self, node: usize) -> NodeContents<'_>;
    fn is_leaf(&self, node: usize) -> bool {
        matches!(self.get_children(node), NodeContents::Leaf { .. })
    }
    /// Heuristic used when deciding which of two colliding nodes to
    /// descend first (larger volume first, §4.1 step 5 / bvh traversal).
    fn split_priority(&self, node: usize) -> f64 {
        self.get_node_bv(node).vol()
    }
}

/// Tagged sum over the three BV-tree flavours (Design Notes: "not
/// subtype polymorphism").
pub enum BvTreeKind {
    Aabb(aabb_tree::AabbTree),
    Obb(obb_tree::ObbTree),
    Single(single_box::SingleBoxTree),
}

impl BvTree for BvTreeKind {
    fn node_count(&self) -> usize {
        match self {
            Self::Aabb(t) => t.node_count(),
            Self::Obb(t) => t.node_count(),
            Self::Single(t) => t.node_count(),
        }
    }

    fn get_node_bv(&self, node: usize) -> BoundingVolume {
        match self {
            Self::Aabb(t) => t.get_node_bv(node),
            Self::Obb(t) => t.get_node_bv(node),
            Self::Single(t) => t.get_node_bv(node),
        }
    }

    fn get_children(&self, node: usize) -> NodeContents<'_> {
        match self {
            Self::Aabb(t) => t.get_children(node),
            Self::Obb(t) => t.get_children(node),
            Self::Single(t) => t.get_children(node),
        }
    }
}

impl BvTreeKind {
    /// Picks whichever of an AABB tree, an oriented-axis-aligned tree (in
    /// the hull's PCA frame), and an OBB tree has the smallest bounding
    /// volume, per §4.3 step 4's tree-selection rule, discarding the
    /// losers. `favor_aabb >= 1` biases the choice toward the (cheaper to
    /// traverse) AABB tree.
    pub fn build_best(
        triangles: &[crate::primitives::Triangle],
        params: BuildParams,
    ) -> Self {
        let aabb = aabb_tree::AabbTree::build(triangles, params);
        if triangles.len() < 4 {
            return Self::Single(single_box::SingleBoxTree::build(triangles));
        }
        let obb = obb_tree::ObbTree::build(triangles, params);
        let aabb_vol = aabb.get_node_bv(0).vol() * params.favor_aabb;
        let obb_vol = obb.get_node_bv(0).vol();
        if obb_vol < aabb_vol {
            Self::Obb(obb)
        } else {
            Self::Aabb(aabb)
        }
    }

    /// Descends both hierarchies together, largest-volume-first, and
    /// collects every pair of leaves whose bounding volumes overlap
    /// (§4.1 step 5, §9 "never take raw addresses into them across a
    /// query" — the stack holds node indices, not pointers).
    pub fn find_colliding_leaves(
        &self,
        self_transform: &cgmath::Matrix4<f64>,
        other: &Self,
        other_transform: &cgmath::Matrix4<f64>,
    ) -> Vec<(usize, usize)> {
        fn world_bv(
            kind: &BvTreeKind,
            node: usize,
            transform: &cgmath::Matrix4<f64>,
        ) -> BoundingVolume {
            use cgmath::Transform;
            // A rotated transform turns even an axis-aligned node into an
            // oriented box; re-express it as an `Obb` with rotated axes
            // rather than silently keeping stale axis-aligned extents
            // (§4.1 `get_children_bvs` must apply R_world).
            match kind.get_node_bv(node) {
                BoundingVolume::Aabb(a) => {
                    let c = transform.transform_point(a.center);
                    let x = transform.transform_vector(cgmath::vec3(1., 0., 0.));
                    let y = transform.transform_vector(cgmath::vec3(0., 1., 0.));
                    let z = transform.transform_vector(cgmath::vec3(0., 0., 1.));
                    BoundingVolume::Obb(crate::primitives::Obb { center: c, extents: a.extents, x, y, z })
                }
                BoundingVolume::Obb(mut o) => {
                    o.center = transform.transform_point(o.center);
                    o.x = transform.transform_vector(o.x);
                    o.y = transform.transform_vector(o.y);
                    o.z = transform.transform_vector(o.z);
                    BoundingVolume::Obb(o)
                }
            }
        }
        let mut out = Vec::new();
        let mut stack = vec![(self.root(), other.root())];
        while let Some((a, b)) = stack.pop() {
            let bv_a = world_bv(self, a, self_transform);
            let bv_b = world_bv(other, b, other_transform);
            if !bv_a.is_colliding(&bv_b) {
                continue;
            }
            let a_leaf = self.is_leaf(a);
            let b_leaf = other.is_leaf(b);
            if a_leaf && b_leaf {
                out.push((a, b));
            } else if !a_leaf && (self.split_priority(a) >= other.split_priority(b) || b_leaf) {
                if let NodeContents::Internal { left, right } = self.get_children(a) {
                    stack.push((left, b));
                    stack.push((right, b));
                }
            } else if let NodeContents::Internal { left, right } = other.get_children(b) {
                stack.push((a, left));
                stack.push((a, right));
            }
        }
        out
    }

    /// Stack-traverses nodes whose bounding volume the ray crosses and
    /// returns the leaf nodes reached, deduplicated through the caller's
    /// scratch ring (§4.1 "Tri-to-node map") so a leaf whose box overlaps
    /// more than one traversal path is still reported once. Used by the
    /// ray-parity point-in-mesh probe instead of a brute-force scan of
    /// every triangle.
    pub fn ray_leaves(&self, ray: &Ray, ring: &mut ScratchRing<u32>, slot: usize) -> Vec<usize> {
        let mark = prepare_for_intersection(ring, slot);
        let mut out = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(n) = stack.pop() {
            if !self.get_node_bv(n).ray_intersect(ray) {
                continue;
            }
            if self.is_leaf(n) {
                if mark_used_triangle(ring, slot, n as u32) {
                    out.push(n);
                }
                continue;
            }
            if let NodeContents::Internal { left, right } = self.get_children(n) {
                stack.push(left);
                stack.push(right);
            }
        }
        cleanup_after_intersection(ring, slot, mark);
        out
    }
}

/// Begins a fresh dedup mark on `slot` for one query (§4.1 "Tri-to-node
/// map" / §5 caller-slot scratch allocation).
pub fn prepare_for_intersection(ring: &mut ScratchRing<u32>, slot: usize) -> ScratchMark {
    ring.begin(slot)
}

/// Records `node` as visited by the current query; returns `false` if it
/// was already marked, so the caller can skip processing it twice.
pub fn mark_used_triangle(ring: &mut ScratchRing<u32>, slot: usize, node: u32) -> bool {
    if ring.as_slice(slot).contains(&node) {
        false
    } else {
        ring.push(slot, node);
        true
    }
}

/// Rewinds the scratch ring to the state `prepare_for_intersection`
/// captured, dropping this query's dedup marks.
pub fn cleanup_after_intersection(ring: &mut ScratchRing<u32>, slot: usize, mark: ScratchMark) {
    ring.restore(mark);
}
