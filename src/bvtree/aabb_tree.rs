//! AABB-tree BV store (§3 "AABB node", §4.1).
//!
//! Child extents are quantized to 7 bits of their *parent's* box, per
//! the spec's data model. `AabbNode` mirrors that layout exactly (static
//! size check below); `AabbTree::decode_quantized` recovers a concrete
//! box by walking the parent chain and re-applying the decode formula
//! from the root, independent of the cached absolute box kept on
//! `AabbTree::boxes` for fast queries — the two are required to agree
//! (§8 "AABB quantisation round-trip").

use super::{BuildParams, BvTree, NodeContents};
use crate::primitives::{Aabb, BoundingVolume, Triangle};
use cgmath::*;

/// One packed AABB node, laid out the way §3 specifies it.
#[derive(Clone, Copy, Debug)]
pub struct AabbNode {
    pub child_or_tri_start: u32,
    pub min: [u8; 3],
    pub max: [u8; 3],
    pub tri_count: u8,
    pub single_collision: bool,
    pub parent: i32,
}

static_assertions::assert_eq_size!(AabbNode, [u8; 16]);

pub struct AabbTree {
    nodes: Vec<AabbNode>,
    /// Triangle indices, reordered in place during the build so each
    /// leaf owns a contiguous run (§4.1 step 4).
    tri_order: Vec<u32>,
    /// Absolute-space box per node, cached at build time for O(1)
    /// queries; `decode_quantized` recomputes the same value from the
    /// packed bytes alone, as a cross-check.
    boxes: Vec<Aabb>,
    root_center: Point3<f64>,
    root_size: Vector3<f64>,
    max_skip_dim: f64,
    /// Packed node index per triangle (tri_order-relative), used by
    /// `mark_used_triangle` (§4.1 "Tri-to-node map") to deduplicate work
    /// during a query.
    pub tri_to_node: Vec<u32>,
}

enum SplitMode {
    Below,
    Above,
    Centroid,
}

fn tri_extent(triangles: &[Triangle], idx: u32, axis: usize) -> (f64, f64) {
    let t = &triangles[idx as usize];
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for v in &t.verts {
        min = min.min(v[axis]);
        max = max.max(v[axis]);
    }
    (min, max)
}

fn score_partition(
    triangles: &[Triangle],
    order: &[u32],
    axis: usize,
    center: f64,
    mode: &SplitMode,
    min_tris_per_node: usize,
) -> (f64, Vec<u32>, Vec<u32>) {
    let mut below = Vec::new();
    let mut above = Vec::new();
    for &idx in order {
        let (tmin, tmax) = tri_extent(triangles, idx, axis);
        let goes_below = match mode {
            SplitMode::Below => tmax <= center,
            SplitMode::Above => tmin >= center,
            SplitMode::Centroid => (tmin + tmax) * 0.5 < center,
        };
        if goes_below {
            below.push(idx);
        } else {
            above.push(idx);
        }
    }
    if below.is_empty() || above.is_empty() {
        return (f64::MIN, below, above);
    }
    // Empty-gap-fraction times perpendicular face area (Design Notes:
    // scoring implemented literally as specified).
    let mut gap = f64::MAX;
    for &idx in order {
        let (tmin, tmax) = tri_extent(triangles, idx, axis);
        gap = gap.min((tmin - center).abs()).min((tmax - center).abs());
    }
    let perp_axes = [(axis + 1) % 3, (axis + 2) % 3];
    let bb = Aabb::from_points(order.iter().flat_map(|&i| triangles[i as usize].verts));
    let perp_area = bb.extents[perp_axes[0]] * bb.extents[perp_axes[1]] * 4.0;
    let mut score = gap * perp_area;
    if below.len() < min_tris_per_node || above.len() < min_tris_per_node {
        score /= 8.0;
    }
    (score, below, above)
}

impl AabbTree {
    pub fn build(triangles: &[Triangle], params: BuildParams) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            tri_order: Vec::new(),
            boxes: Vec::new(),
            root_center: point3(0., 0., 0.),
            root_size: vec3(1., 1., 1.),
            max_skip_dim: 0.0,
            tri_to_node: Vec::new(),
        };
        let order: Vec<u32> = (0..triangles.len() as u32).collect();
        let root_bb = Aabb::from_points(order.iter().flat_map(|&i| triangles[i as usize].verts));
        tree.root_center = root_bb.center;
        tree.root_size = vec3(
            root_bb.extents.x.max(1e-9),
            root_bb.extents.y.max(1e-9),
            root_bb.extents.z.max(1e-9),
        );
        tree.max_skip_dim = params.skip_dim
            * tree.root_size.x.max(tree.root_size.y).max(tree.root_size.z)
            * 2.0;
        tree.build_node(triangles, order, root_bb, 0, -1, &params);
        tree.tri_to_node = vec![0; tree.tri_order.len()];
        for (node_idx, node) in tree.nodes.iter().enumerate() {
            if node.tri_count > 0 {
                for k in 0..node.tri_count as usize {
                    tree.tri_to_node[node.child_or_tri_start as usize + k] = node_idx as u32;
                }
            }
        }
        tree
    }

    fn quantize(bb: &Aabb, parent_center: Point3<f64>, parent_size: Vector3<f64>) -> ([u8; 3], [u8; 3]) {
        let mut min = [0u8; 3];
        let mut max = [0u8; 3];
        for axis in 0..3 {
            let pmin = parent_center[axis] - parent_size[axis];
            let scale = 128.0 / (2.0 * parent_size[axis].max(1e-12));
            let lo = ((bb.min()[axis] - pmin) * scale).floor().clamp(0.0, 127.0) as u8;
            let hi = ((bb.max()[axis] - pmin) * scale).ceil().clamp(1.0, 128.0) as u8 - 1;
            min[axis] = lo.min(hi);
            max[axis] = hi.max(lo);
        }
        (min, max)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_node(
        &mut self,
        triangles: &[Triangle],
        order: Vec<u32>,
        bb: Aabb,
        depth: u32,
        parent: i32,
        params: &BuildParams,
    ) -> usize {
        let node_idx = self.nodes.len();
        self.nodes.push(AabbNode {
            child_or_tri_start: 0,
            min: [0; 3],
            max: [0; 3],
            tri_count: 0,
            single_collision: false,
            parent,
        });
        self.boxes.push(bb);

        let parent_bb = if parent < 0 { bb } else { self.boxes[parent as usize] };
        let (qmin, qmax) = Self::quantize(&bb, parent_bb.center, parent_bb.extents);
        self.nodes[node_idx].min = qmin;
        self.nodes[node_idx].max = qmax;

        let is_leaf = order.len() <= params.max_tris_per_node || depth + 2 >= params.max_depth;
        if is_leaf {
            let start = self.tri_order.len() as u32;
            let single_collision =
                bb.extents.x <= self.max_skip_dim && bb.extents.y <= self.max_skip_dim && bb.extents.z <= self.max_skip_dim;
            self.tri_order.extend(order.iter().copied());
            self.nodes[node_idx].child_or_tri_start = start;
            self.nodes[node_idx].tri_count = order.len().min(255) as u8;
            self.nodes[node_idx].single_collision = single_collision;
            return node_idx;
        }

        let smallest_axis = {
            let mut idx = 0;
            let mut min_extent = f64::MAX;
            for a in 0..3 {
                if bb.extents[a] < min_extent {
                    min_extent = bb.extents[a];
                    idx = a;
                }
            }
            idx
        };
        let plane_optimise = {
            let sorted = {
                let mut e = [bb.extents.x, bb.extents.y, bb.extents.z];
                e.sort_by(|a, b| a.partial_cmp(b).unwrap());
                e
            };
            sorted[0] < 0.1 * sorted[1] && sorted[0] < 0.1 * sorted[2]
        };

        let mut best: Option<(f64, usize, Vec<u32>, Vec<u32>)> = None;
        for axis in 0..3 {
            if plane_optimise && axis == smallest_axis {
                continue;
            }
            for mode in [SplitMode::Below, SplitMode::Above, SplitMode::Centroid] {
                let (score, below, above) =
                    score_partition(triangles, &order, axis, bb.center[axis], &mode, params.min_tris_per_node);
                if best.as_ref().map_or(true, |(s, ..)| score > *s) {
                    best = Some((score, axis, below, above));
                }
            }
        }

        match best {
            Some((score, axis, below, above)) if score > f64::MIN => {
                let below_bb = Aabb::from_points(below.iter().flat_map(|&i| triangles[i as usize].verts));
                let above_bb = Aabb::from_points(above.iter().flat_map(|&i| triangles[i as usize].verts));
                let left = self.build_node(triangles, below, below_bb, depth + 1, node_idx as i32, params);
                let right = self.build_node(triangles, above, above_bb, depth + 1, node_idx as i32, params);
                debug_assert_eq!(right, left + 1, "children must be consecutive");
                self.nodes[node_idx].child_or_tri_start = left as u32;
                self.nodes[node_idx].tri_count = 0;
                let _ = axis;
            }
            _ => {
                // Every split left a side empty or too small: fall back to a leaf.
                let start = self.tri_order.len() as u32;
                self.tri_order.extend(order.iter().copied());
                self.nodes[node_idx].child_or_tri_start = start;
                self.nodes[node_idx].tri_count = order.len().min(255) as u8;
            }
        }
        node_idx
    }

    /// Decodes node `idx`'s box purely from the packed quantized bytes,
    /// walking the parent chain up to the root (§3: "child min = min *
    /// parent_size * (2/128)").
    pub fn decode_quantized(&self, idx: usize) -> Aabb {
        let mut chain = vec![idx];
        let mut cur = idx;
        while self.nodes[cur].parent >= 0 {
            cur = self.nodes[cur].parent as usize;
            chain.push(cur);
        }
        chain.reverse();
        let mut center = self.root_center;
        let mut size = self.root_size;
        for &n in &chain[1..] {
            let node = &self.nodes[n];
            let pmin = center - size;
            let mut new_min = vec3(0., 0., 0.);
            let mut new_max = vec3(0., 0., 0.);
            for axis in 0..3 {
                new_min[axis] = pmin[axis] + node.min[axis] as f64 * size[axis] * (2.0 / 128.0);
                new_max[axis] = pmin[axis] + (node.max[axis] as f64 + 1.0) * size[axis] * (2.0 / 128.0);
            }
            let c = (new_min + new_max) / 2.0;
            center = point3(c.x, c.y, c.z);
            size = (new_max - new_min) / 2.0;
        }
        Aabb { center, extents: size }
    }

    pub fn triangle_order(&self) -> &[u32] {
        &self.tri_order
    }

    /// Node owning the triangle at position `pos` of `tri_order`, read
    /// straight from the cached map built in `build` rather than walking
    /// the tree (§4.1 "Tri-to-node map").
    pub fn node_of_triangle_order_pos(&self, pos: usize) -> u32 {
        self.tri_to_node[pos]
    }
}

impl BvTree for AabbTree {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn get_node_bv(&self, node: usize) -> BoundingVolume {
        BoundingVolume::Aabb(self.boxes[node])
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
    use crate::primitives::Triangle;

    fn unit_cube_triangles() -> Vec<Triangle> {
        let p = [
            point3(-0.5, -0.5, -0.5), point3(0.5, -0.5, -0.5),
            point3(0.5, 0.5, -0.5), point3(-0.5, 0.5, -0.5),
            point3(-0.5, -0.5, 0.5), point3(0.5, -0.5, 0.5),
            point3(0.5, 0.5, 0.5), point3(-0.5, 0.5, 0.5),
        ];
        let idx: [[usize; 3]; 12] = [
            [0, 1, 2], [0, 2, 3], [4, 6, 5], [4, 7, 6],
            [0, 4, 5], [0, 5, 1], [1, 5, 6], [1, 6, 2],
            [2, 6, 7], [2, 7, 3], [3, 7, 4], [3, 4, 0],
        ];
        idx.iter().map(|t| Triangle::new(p[t[0]], p[t[1]], p[t[2]])).collect()
    }

    #[test]
    fn unit_cube_builds_single_root_volume_one() {
        let tris = unit_cube_triangles();
        let tree = AabbTree::build(&tris, BuildParams::default());
        let bv = tree.get_node_bv(0);
        assert_approx_eq::assert_approx_eq!(bv.vol(), 1.0, 1e-9);
    }

    #[test]
    fn tri_to_node_points_back_at_an_owning_leaf() {
        let tris = unit_cube_triangles();
        let tree = AabbTree::build(&tris, BuildParams { max_tris_per_node: 2, ..Default::default() });
        for pos in 0..tree.triangle_order().len() {
            let node = tree.node_of_triangle_order_pos(pos) as usize;
            match tree.get_children(node) {
                NodeContents::Leaf { triangles } => {
                    assert!(triangles.contains(&tree.triangle_order()[pos]));
                }
                NodeContents::Internal { .. } => panic!("tri_to_node pointed at an internal node"),
            }
        }
    }

    #[test]
    fn quantisation_round_trip_contains_exact_bounds() {
        let tris = unit_cube_triangles();
        let tree = AabbTree::build(&tris, BuildParams { max_tris_per_node: 2, ..Default::default() });
        for idx in 0..tree.node_count() {
            let exact = tree.boxes[idx];
            let decoded = tree.decode_quantized(idx);
            assert!(decoded.contains(&exact), "node {idx}: decoded {decoded:?} does not contain exact {exact:?}");
        }
    }
}
