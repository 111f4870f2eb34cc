//! Planar hash grid (§3 "Hash grid", §4.7) built lazily on first ray
//! query, two-pass: count per cell, prefix-sum, then fill so each cell's
//! list ends up ascending in triangle index (written in descending
//! triangle order during the fill pass, matching §4.7).

use crate::primitives::{Aabb, Ray, Triangle};
use cgmath::*;

pub struct HashGrid {
    pub basis: Matrix3<f64>,
    pub origin: Point3<f64>,
    pub step: Vector2<f64>,
    pub size: (i32, i32),
    pub cell_start: Vec<u32>,
    pub tri_list: Vec<u32>,
}

fn project(basis: &Matrix3<f64>, origin: Point3<f64>, p: Point3<f64>) -> Vector2<f64> {
    let d = p - origin;
    vec2(basis.x.dot(d), basis.y.dot(d))
}

impl HashGrid {
    /// Builds a grid over the plane whose normal is most aligned with
    /// `preferred_normal` (the mesh's first-triangle normal per §4.7).
    pub fn build(vertices: &[Point3<f64>], indices: &[u32], preferred_normal: Vector3<f64>) -> Self {
        let n = preferred_normal.normalize();
        let up = if n.x.abs() < 0.9 { vec3(1., 0., 0.) } else { vec3(0., 1., 0.) };
        let x = up.cross(n).normalize();
        let y = n.cross(x).normalize();
        let basis = Matrix3::from_cols(x, y, n);

        let tri_count = indices.len() / 3;
        let bb = Aabb::from_points(vertices.iter().copied());
        let origin = bb.min();

        let target_side = (tri_count as f64).sqrt().ceil().max(1.0) as i32;
        let size = (target_side.min(64), target_side.min(64));

        let extent = project(&basis, origin, bb.max());
        let step = vec2((extent.x / size.0 as f64).max(1e-9), (extent.y / size.1 as f64).max(1e-9));

        let mut grid = Self {
            basis,
            origin,
            step,
            size,
            cell_start: vec![0; (size.0 * size.1) as usize + 1],
            tri_list: Vec::new(),
        };
        grid.rasterize(vertices, indices, tri_count);
        grid
    }

    fn cell_of(&self, p: Vector2<f64>) -> (i32, i32) {
        (
            ((p.x / self.step.x) as i32).clamp(0, self.size.0 - 1),
            ((p.y / self.step.y) as i32).clamp(0, self.size.1 - 1),
        )
    }

    fn tri_cell_range(&self, vertices: &[Point3<f64>], indices: &[u32], t: usize) -> ((i32, i32), (i32, i32)) {
        let base = t * 3;
        let pts: Vec<Vector2<f64>> = (0..3)
            .map(|k| project(&self.basis, self.origin, vertices[indices[base + k] as usize]))
            .collect();
        let min = self.cell_of(vec2(pts[0].x.min(pts[1].x).min(pts[2].x), pts[0].y.min(pts[1].y).min(pts[2].y)));
        let max = self.cell_of(vec2(pts[0].x.max(pts[1].x).max(pts[2].x), pts[0].y.max(pts[1].y).max(pts[2].y)));
        (min, max)
    }

    fn rasterize(&mut self, vertices: &[Point3<f64>], indices: &[u32], tri_count: usize) {
        let mut counts = vec![0u32; (self.size.0 * self.size.1) as usize];
        for t in 0..tri_count {
            let (min, max) = self.tri_cell_range(vertices, indices, t);
            for cy in min.1..=max.1 {
                for cx in min.0..=max.0 {
                    counts[(cy * self.size.0 + cx) as usize] += 1;
                }
            }
        }
        let mut prefix = vec![0u32; counts.len() + 1];
        for i in 0..counts.len() {
            prefix[i + 1] = prefix[i] + counts[i];
        }
        self.cell_start = prefix.clone();
        self.tri_list = vec![0; prefix[counts.len()] as usize];

        let mut cursor = prefix;
        // Fill in descending triangle order so ascending-order reads
        // come out of the cursor walk (§4.7).
        for t in (0..tri_count).rev() {
            let (min, max) = self.tri_cell_range(vertices, indices, t);
            for cy in min.1..=max.1 {
                for cx in min.0..=max.0 {
                    let cell = (cy * self.size.0 + cx) as usize;
                    let slot = &mut cursor[cell];
                    self.tri_list[*slot as usize] = t as u32;
                    *slot += 1;
                }
            }
        }
    }

    /// Triangle indices in every cell the ray's 2D projection crosses,
    /// deduplicated. Over-approximates (returns the whole swept AABB of
    /// cells) rather than doing exact DDA walking, which keeps the
    /// completeness property in §8 easy to guarantee.
    pub fn candidates_for_ray(&self, ray: &Ray) -> Vec<u32> {
        let p0 = project(&self.basis, self.origin, ray.origin);
        let p1 = project(&self.basis, self.origin, ray.at(1e6));
        let c0 = self.cell_of(p0);
        let c1 = self.cell_of(p1);
        let (min_x, max_x) = (c0.0.min(c1.0), c0.0.max(c1.0));
        let (min_y, max_y) = (c0.1.min(c1.1), c0.1.max(c1.1));
        let mut out = std::collections::BTreeSet::new();
        for cy in min_y..=max_y {
            for cx in min_x..=max_x {
                let cell = (cy * self.size.0 + cx) as usize;
                for &t in &self.tri_list[self.cell_start[cell] as usize..self.cell_start[cell + 1] as usize] {
                    out.insert(t);
                }
            }
        }
        out.into_iter().collect()
    }
}

fn triangle_at(vertices: &[Point3<f64>], indices: &[u32], t: usize) -> Triangle {
    Triangle::new(
        vertices[indices[t * 3] as usize],
        vertices[indices[t * 3 + 1] as usize],
        vertices[indices[t * 3 + 2] as usize],
    )
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
    fn hash_grid_completeness_for_hit_triangle() {
        let (v, idx) = unit_cube();
        let grid = HashGrid::build(&v, &idx, vec3(0., 0., 1.));
        let ray = crate::primitives::Ray::new(point3(0., 0., 5.), vec3(0., 0., -1.));
        let candidates = grid.candidates_for_ray(&ray);
        // Whichever triangle the ray actually hits must be among the
        // candidates returned for every cell the ray crosses (§8).
        let mut hit_tri = None;
        for t in 0..idx.len() / 3 {
            if triangle_at(&v, &idx, t).ray_intersect(&ray).is_some() {
                hit_tri = Some(t as u32);
                break;
            }
        }
        if let Some(t) = hit_tri {
            assert!(candidates.contains(&t));
        }
    }
}
