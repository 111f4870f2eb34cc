//! Connected-component analysis (§3 "Islands", §4.6).

use super::topology::Buddies;
use crate::primitives::{Ray, Triangle};
use cgmath::*;

#[derive(Clone, Debug)]
pub struct Island {
    pub volume: f64,
    pub center: Point3<f64>,
    pub first_tri: u32,
    pub n_tris: u32,
    pub tris: Vec<u32>,
    pub parent: i32,
}

fn triangle_at(vertices: &[Point3<f64>], indices: &[u32], t: usize) -> Triangle {
    Triangle::new(
        vertices[indices[t * 3] as usize],
        vertices[indices[t * 3 + 1] as usize],
        vertices[indices[t * 3 + 2] as usize],
    )
}

/// Flood-fills the topology graph into connected components, accumulates
/// signed volume and centroid per island (§4.6), then assigns parents to
/// negative-volume (nested/inverted) islands via a vertical ray cast
/// from each island's topmost vertex.
pub fn compute_islands(vertices: &[Point3<f64>], indices: &[u32], buddies: &[Buddies]) -> Vec<Island> {
    let tri_count = buddies.len();
    let mut island_of = vec![-1i32; tri_count];
    let mut islands = Vec::new();

    for start in 0..tri_count {
        if island_of[start] != -1 {
            continue;
        }
        let island_idx = islands.len();
        let mut stack = vec![start];
        let mut members = Vec::new();
        island_of[start] = island_idx as i32;
        while let Some(t) = stack.pop() {
            members.push(t as u32);
            for &u in &buddies[t] {
                if u >= 0 && island_of[u as usize] == -1 {
                    island_of[u as usize] = island_idx as i32;
                    stack.push(u as usize);
                }
            }
        }

        let mut volume = 0.0;
        let mut weighted_center = vec3(0., 0., 0.);
        for &t in &members {
            let tri = triangle_at(vertices, indices, t as usize);
            let v = tri.signed_tet_volume();
            volume += v;
            weighted_center += tri.centroid().to_vec() * v.abs();
        }
        let abs_vol_sum: f64 = members
            .iter()
            .map(|&t| triangle_at(vertices, indices, t as usize).signed_tet_volume().abs())
            .sum();
        let center = if abs_vol_sum > 0.0 {
            let c = weighted_center / abs_vol_sum;
            point3(c.x, c.y, c.z)
        } else {
            aabb_center(vertices, indices, &members)
        };

        islands.push(Island {
            volume,
            center,
            first_tri: members[0],
            n_tris: members.len() as u32,
            tris: members,
            parent: -1,
        });
    }

    assign_nesting_parents(vertices, indices, &mut islands);
    islands
}

fn aabb_center(vertices: &[Point3<f64>], indices: &[u32], members: &[u32]) -> Point3<f64> {
    let pts: Vec<Point3<f64>> = members
        .iter()
        .flat_map(|&t| {
            let base = t as usize * 3;
            [vertices[indices[base] as usize], vertices[indices[base + 1] as usize], vertices[indices[base + 2] as usize]]
        })
        .collect();
    crate::primitives::Aabb::from_points(pts).center
}

/// For each island with negative signed volume (it is "inside-out" from
/// the ambient mesh's point of view, i.e. nested inside another island),
/// casts a ray upward from its topmost vertex and assigns the hit
/// triangle's island as parent.
fn assign_nesting_parents(vertices: &[Point3<f64>], indices: &[u32], islands: &mut [Island]) {
    let island_of_tri: Vec<usize> = {
        let mut map = vec![0usize; indices.len() / 3];
        for (i, isl) in islands.iter().enumerate() {
            for &t in &isl.tris {
                map[t as usize] = i;
            }
        }
        map
    };

    for i in 0..islands.len() {
        if islands[i].volume >= 0.0 {
            continue;
        }
        let topmost = islands[i]
            .tris
            .iter()
            .flat_map(|&t| {
                let base = t as usize * 3;
                [indices[base], indices[base + 1], indices[base + 2]]
            })
            .map(|vi| vertices[vi as usize])
            .fold(None::<Point3<f64>>, |acc, p| match acc {
                None => Some(p),
                Some(a) if p.y > a.y => Some(p),
                acc => acc,
            });
        let Some(top) = topmost else { continue };
        let ray = Ray::new(top + vec3(0.0, 1e-6, 0.0), vec3(0.0, 1.0, 0.0));
        let mut best_t = f64::MAX;
        let mut hit_island = None;
        for t in 0..indices.len() / 3 {
            if island_of_tri[t] == i {
                continue;
            }
            let tri = triangle_at(vertices, indices, t);
            if let Some((dist, _, _)) = tri.ray_intersect(&ray) {
                if dist < best_t {
                    best_t = dist;
                    hit_island = Some(island_of_tri[t]);
                }
            }
        }
        islands[i].parent = hit_island.map_or(-1, |x| x as i32);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::topology::infer_topology;

    fn cube_at(offset: Vector3<f64>) -> (Vec<Point3<f64>>, Vec<u32>) {
        let p: Vec<Point3<f64>> = vec![
            point3(-0.5, -0.5, -0.5), point3(0.5, -0.5, -0.5),
            point3(0.5, 0.5, -0.5), point3(-0.5, 0.5, -0.5),
            point3(-0.5, -0.5, 0.5), point3(0.5, -0.5, 0.5),
            point3(0.5, 0.5, 0.5), point3(-0.5, 0.5, 0.5),
        ]
        .into_iter()
        .map(|p| p + offset)
        .collect();
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
    fn single_cube_is_one_island_volume_one() {
        let (v, idx) = cube_at(vec3(0., 0., 0.));
        let norms = face_normals(&v, &idx);
        let (buddies, _) = infer_topology(&v, &idx, &norms);
        let islands = compute_islands(&v, &idx, &buddies);
        assert_eq!(islands.len(), 1);
        assert_approx_eq::assert_approx_eq!(islands[0].volume, 1.0, 1e-6);
    }

    #[test]
    fn two_disjoint_cubes_are_two_islands_volume_two() {
        let (v1, idx1) = cube_at(vec3(0., 0., 0.));
        let (v2, idx2) = cube_at(vec3(100., 0., 0.));
        let mut v = v1;
        let offset = v.len() as u32;
        v.extend(v2);
        let mut idx = idx1;
        idx.extend(idx2.into_iter().map(|i| i + offset));
        let norms = face_normals(&v, &idx);
        let (buddies, _) = infer_topology(&v, &idx, &norms);
        let islands = compute_islands(&v, &idx, &buddies);
        assert_eq!(islands.len(), 2);
        let total: f64 = islands.iter().map(|i| i.volume).sum();
        assert_approx_eq::assert_approx_eq!(total, 2.0, 1e-6);
    }
}
