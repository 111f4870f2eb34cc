//! The primitive/intersector catalog (§1 "External collaborators", §9
//! "Intersector catalog is a trait-object boundary"). The core calls into
//! this trait for pairwise overlap/intersection tests; it never
//! implements the pairwise math inline. `CpuIntersector` is the only
//! implementation this crate ships (the spec is explicit: no GPU path).

use crate::primitives::{Obb, Plane, Ray, Triangle};
use cgmath::*;

/// A resolved contact between two primitives (§6 "Contact output",
/// trimmed to the fields this crate's callers actually consume —
/// velocity/unprojection bookkeeping belongs to the dynamics layer this
/// crate does not implement).
#[derive(Clone, Copy, Debug)]
pub struct Contact {
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
}

pub trait IntersectorCatalog {
    /// Triangle-triangle overlap test in a shared coordinate frame.
    fn triangle_triangle(&self, a: &Triangle, b: &Triangle) -> Option<Contact>;
    /// Ray-triangle overlap; `t` is the hit distance along the ray.
    fn ray_triangle(&self, ray: &Ray, tri: &Triangle) -> Option<(f64, Contact)>;
    /// Oriented-box overlap (used by the BV-tree traversal's leaf-pair
    /// confirmation step when leaves hold more than one triangle).
    fn box_box(&self, a: &Obb, b: &Obb) -> bool {
        a.collision(b)
    }
}

/// CPU-only implementation of the catalog. Triangle-triangle uses a
/// Möller-style plane/interval test; this is the same algorithm the
/// donor engine runs on its CPU fallback path, minus the GPU compute
/// variant (out of scope: "No GPU path").
pub struct CpuIntersector;

impl CpuIntersector {
    fn get_t(verts_on_l: &Vector3<f64>, dist_to_plane: &Vector3<f64>, opposite_idx: usize, vert_idx: usize) -> f64 {
        verts_on_l[vert_idx]
            + (verts_on_l[opposite_idx] - verts_on_l[vert_idx]) * dist_to_plane[vert_idx]
                / (dist_to_plane[vert_idx] - dist_to_plane[opposite_idx])
    }

    fn get_interval(project_on_l: &Vector3<f64>, signed_dists: &Vector3<f64>, vert_indices: (usize, usize, usize)) -> (f64, f64) {
        (
            Self::get_t(project_on_l, signed_dists, vert_indices.0, vert_indices.1),
            Self::get_t(project_on_l, signed_dists, vert_indices.0, vert_indices.2),
        )
    }

    fn order_interval(interval: (f64, f64)) -> (f64, f64) {
        if interval.0 > interval.1 {
            (interval.1, interval.0)
        } else {
            interval
        }
    }

    fn interval_overlap(a_t: (f64, f64), b_t: (f64, f64)) -> bool {
        let a_t = Self::order_interval(a_t);
        let b_t = Self::order_interval(b_t);
        a_t.0 - f64::EPSILON <= b_t.0 && a_t.1 + f64::EPSILON >= b_t.0
            || a_t.0 - f64::EPSILON <= b_t.1 && a_t.1 + f64::EPSILON >= b_t.1
            || b_t.0 - f64::EPSILON <= a_t.0 && b_t.1 + f64::EPSILON >= a_t.0
    }

    fn abs_max_dim(v: &Vector3<f64>) -> usize {
        let mut max = 0f64;
        let mut idx = 0usize;
        for i in 0..3 {
            let abs = v[i].abs();
            if abs > max {
                max = abs;
                idx = i;
            }
        }
        idx
    }

    fn opp_vert(v: &Vector3<f64>) -> (usize, usize, usize) {
        if v[0] * v[1] > 0. {
            (2, 0, 1)
        } else if v[0] * v[2] > 0. {
            (1, 0, 2)
        } else {
            (0, 1, 2)
        }
    }

    fn plane_test(pt_on_a: &Point3<f64>, b_verts: &[Point3<f64>; 3], norm_a: &Vector3<f64>) -> (bool, Vector3<f64>) {
        let d = dot(-1. * norm_a, pt_on_a.to_vec());
        let signed_dists = vec3(d, d, d)
            + vec3(norm_a.dot(b_verts[0].to_vec()), norm_a.dot(b_verts[1].to_vec()), norm_a.dot(b_verts[2].to_vec()));
        let all_same_side = signed_dists.x < 0. && signed_dists.y < 0. && signed_dists.z < 0.
            || signed_dists.x > 0. && signed_dists.y > 0. && signed_dists.z > 0.;
        (all_same_side, signed_dists)
    }

    fn is_coplanar(signed_dists: &Vector3<f64>) -> bool {
        signed_dists.x.abs() < f64::EPSILON && signed_dists.y.abs() < f64::EPSILON && signed_dists.z.abs() < f64::EPSILON
    }

    fn line_intersection_2d(start_a: Point2<f64>, end_a: Point2<f64>, start_b: Point2<f64>, end_b: Point2<f64>) -> bool {
        let a = end_a - start_a;
        let b = end_b - start_b;
        let cross_2d = |a: &Vector2<f64>, b: &Vector2<f64>| a.x * b.y - a.y * b.x;

        let rs = cross_2d(&a, &b);
        let qpr = cross_2d(&(start_b - start_a), &a);

        if rs.abs() < f64::EPSILON && qpr.abs() < f64::EPSILON {
            let l = a.normalize();
            let t_a = (dot(start_a.to_vec(), l), dot(end_a.to_vec(), l));
            let t_b = (dot(start_b.to_vec(), l), dot(end_b.to_vec(), l));
            return Self::interval_overlap(t_a, t_b);
        } else if rs.abs() < f64::EPSILON {
            return false;
        }

        let t = cross_2d(&(start_b - start_a), &b) / rs;
        let u = qpr / rs;
        (-f64::EPSILON..=1. + f64::EPSILON).contains(&t) && (-f64::EPSILON..=1. + f64::EPSILON).contains(&u)
    }

    fn triangle_intersection_2d(a: &[Point2<f64>; 3], b: &[Point2<f64>; 3]) -> bool {
        let edges_a = [(a[0], a[1]), (a[0], a[2]), (a[1], a[2])];
        let edges_b = [(b[0], b[1]), (b[0], b[2]), (b[1], b[2])];
        edges_a
            .iter()
            .any(|&(s, e)| edges_b.iter().any(|&(s2, e2)| Self::line_intersection_2d(s, e, s2, e2)))
            || a.iter().all(|&p| Self::point_in_triangle_2d(p, b))
            || b.iter().all(|&p| Self::point_in_triangle_2d(p, a))
    }

    fn point_in_triangle_2d(p: Point2<f64>, tri: &[Point2<f64>; 3]) -> bool {
        let sign = |p1: Point2<f64>, p2: Point2<f64>, p3: Point2<f64>| (p1.x - p3.x) * (p2.y - p3.y) - (p2.x - p3.x) * (p1.y - p3.y);
        let d1 = sign(p, tri[0], tri[1]);
        let d2 = sign(p, tri[1], tri[2]);
        let d3 = sign(p, tri[2], tri[0]);
        let has_neg = d1 < 0. || d2 < 0. || d3 < 0.;
        let has_pos = d1 > 0. || d2 > 0. || d3 > 0.;
        !(has_neg && has_pos)
    }

    fn coplanar_test(plane_norm: Vector3<f64>, a_verts: &[Point3<f64>; 3], b_verts: &[Point3<f64>; 3]) -> bool {
        let axis = Self::abs_max_dim(&plane_norm);
        let x = (axis + 1) % 3;
        let y = (axis + 2) % 3;
        let proj = |v: &[Point3<f64>; 3]| [point2(v[0][x], v[0][y]), point2(v[1][x], v[1][y]), point2(v[2][x], v[2][y])];
        Self::triangle_intersection_2d(&proj(a_verts), &proj(b_verts))
    }

    /// Möller triangle-triangle test: plane-straddle check both ways,
    /// coplanar fallback to 2D projected triangle-triangle test,
    /// otherwise interval overlap along the two planes' intersection
    /// line.
    fn moller_test(a_verts: &[Point3<f64>; 3], b_verts: &[Point3<f64>; 3]) -> Option<Vector3<f64>> {
        let a_norm = (a_verts[2] - a_verts[0]).cross(a_verts[1] - a_verts[0]).normalize();
        let b_norm = (b_verts[2] - b_verts[0]).cross(b_verts[1] - b_verts[0]).normalize();

        let (b_same_side, b_dist_to_a) = Self::plane_test(&a_verts[0], b_verts, &a_norm);
        let (a_same_side, a_dist_to_b) = Self::plane_test(&b_verts[0], a_verts, &b_norm);
        if b_same_side || a_same_side {
            return None;
        }
        if Self::is_coplanar(&b_dist_to_a) {
            return Self::coplanar_test(a_norm, a_verts, b_verts).then_some(a_norm);
        }
        let line = a_norm.cross(b_norm).normalize();
        let idx = Self::abs_max_dim(&line);
        let a_onto_line = vec3(a_verts[0][idx], a_verts[1][idx], a_verts[2][idx]);
        let b_onto_line = vec3(b_verts[0][idx], b_verts[1][idx], b_verts[2][idx]);
        let a_int = Self::get_interval(&a_onto_line, &a_dist_to_b, Self::opp_vert(&a_dist_to_b));
        let b_int = Self::get_interval(&b_onto_line, &b_dist_to_a, Self::opp_vert(&b_dist_to_a));
        Self::interval_overlap(a_int, b_int).then_some(line)
    }
}

impl IntersectorCatalog for CpuIntersector {
    fn triangle_triangle(&self, a: &Triangle, b: &Triangle) -> Option<Contact> {
        Self::moller_test(&a.verts, &b.verts).map(|n| Contact { point: a.centroid(), normal: n })
    }

    fn ray_triangle(&self, ray: &Ray, tri: &Triangle) -> Option<(f64, Contact)> {
        tri.ray_intersect(ray).map(|(t, _, _)| (t, Contact { point: ray.at(t), normal: tri.normal() }))
    }
}

/// Intersects a triangle with an infinite plane, returning the (≤ 2)
/// points where its edges cross. Used by slicing (§4.11) and the
/// boolean-subtract contour walk (§4.9).
pub fn triangle_plane_intersection(tri: &Triangle, plane: &Plane) -> Vec<Point3<f64>> {
    let dists = [
        plane.signed_dist(tri.verts[0]),
        plane.signed_dist(tri.verts[1]),
        plane.signed_dist(tri.verts[2]),
    ];
    let mut out = Vec::new();
    for i in 0..3 {
        let j = (i + 1) % 3;
        let (da, db) = (dists[i], dists[j]);
        if da.signum() != db.signum() && da.abs() > f64::EPSILON && db.abs() > f64::EPSILON {
            let t = da / (da - db);
            out.push(tri.verts[i] + (tri.verts[j] - tri.verts[i]) * t);
        } else if da.abs() <= f64::EPSILON {
            out.push(tri.verts[i]);
        }
    }
    out.truncate(2);
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crossing_triangles_intersect() {
        let a = Triangle::new(point3(-1., -1., 0.), point3(1., -1., 0.), point3(0., 1., 0.));
        let b = Triangle::new(point3(0., 0., -1.), point3(0., 0., 1.), point3(0., 2., 0.));
        let catalog = CpuIntersector;
        assert!(catalog.triangle_triangle(&a, &b).is_some());
    }

    #[test]
    fn disjoint_triangles_do_not_intersect() {
        let a = Triangle::new(point3(-1., -1., 0.), point3(1., -1., 0.), point3(0., 1., 0.));
        let b = Triangle::new(point3(10., 10., 10.), point3(11., 10., 10.), point3(10., 11., 10.));
        let catalog = CpuIntersector;
        assert!(catalog.triangle_triangle(&a, &b).is_none());
    }

    #[test]
    fn plane_cuts_triangle_in_two_points() {
        let tri = Triangle::new(point3(-1., -1., 0.), point3(1., -1., 0.), point3(0., 1., 0.));
        let plane = Plane::from_point_normal(point3(0., 0., 0.), vec3(0., 1., 0.));
        let pts = triangle_plane_intersection(&tri, &plane);
        assert_eq!(pts.len(), 2);
    }
}
