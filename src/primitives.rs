//! Plain geometric value types shared by the bounding-volume trees, the
//! intersector catalog, and the mesh pipeline. Everything here is `Copy`
//! or cheaply `Clone`-able and holds no heap allocations of its own.

use cgmath::*;

/// A ray cast through world space, `p(t) = origin + t * dir`, `t >= 0`.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub dir: Vector3<f64>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, dir: Vector3<f64>) -> Self {
        Self { origin, dir: dir.normalize() }
    }

    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.dir * t
    }
}

/// An infinite plane, `dot(n, p) = d`.
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub d: f64,
}

impl Plane {
    pub fn from_point_normal(p: Point3<f64>, normal: Vector3<f64>) -> Self {
        let normal = normal.normalize();
        Self { normal, d: normal.dot(p.to_vec()) }
    }

    /// Signed distance of `p` from this plane; positive on the side `normal` points to.
    pub fn signed_dist(&self, p: Point3<f64>) -> f64 {
        self.normal.dot(p.to_vec()) - self.d
    }
}

/// A sphere, used as a cheap bounding volume for early-outs and for the
/// floodfill probe rays.
#[derive(Clone, Copy, Debug)]
pub struct Sphere {
    pub center: Point3<f64>,
    pub radius: f64,
}

/// A triangle given by three world-space points. Unlike the mesh's own
/// triangle storage (indices into a shared vertex buffer, see
/// [`crate::mesh::TriangleMesh`]) this is a self-contained value used at
/// the intersector-catalog boundary and by routines (slicing, the
/// triangulator's degenerate checks) that only need the three points.
#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub verts: [Point3<f64>; 3],
}

impl Triangle {
    pub fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        Self { verts: [a, b, c] }
    }

    /// Outward normal from the `a, b, c` winding; not normalized to unit
    /// length if the triangle is degenerate (zero area).
    pub fn raw_normal(&self) -> Vector3<f64> {
        (self.verts[1] - self.verts[0]).cross(self.verts[2] - self.verts[0])
    }

    pub fn normal(&self) -> Vector3<f64> {
        self.raw_normal().normalize()
    }

    pub fn area(&self) -> f64 {
        self.raw_normal().magnitude() * 0.5
    }

    pub fn centroid(&self) -> Point3<f64> {
        point3(
            (self.verts[0].x + self.verts[1].x + self.verts[2].x) / 3.,
            (self.verts[0].y + self.verts[1].y + self.verts[2].y) / 3.,
            (self.verts[0].z + self.verts[1].z + self.verts[2].z) / 3.,
        )
    }

    pub fn is_degenerate(&self, tol: f64) -> bool {
        self.raw_normal().magnitude2() <= tol * tol
    }

    /// Signed volume of the tetrahedron formed with the origin; summed
    /// over a closed mesh this yields the mesh volume (see §4.6 islands).
    pub fn signed_tet_volume(&self) -> f64 {
        (self.verts[1] - self.verts[0])
            .cross(self.verts[2] - self.verts[0])
            .dot(self.verts[0].to_vec() + self.verts[1].to_vec() + self.verts[2].to_vec())
            / 6.0
    }

    /// Ray-triangle intersection (Möller-Trumbore). Returns the hit
    /// distance `t` and barycentric `(u, v)` if the ray crosses the
    /// triangle's interior with `t >= 0`.
    pub fn ray_intersect(&self, ray: &Ray) -> Option<(f64, f64, f64)> {
        let edge1 = self.verts[1] - self.verts[0];
        let edge2 = self.verts[2] - self.verts[0];
        let pvec = ray.dir.cross(edge2);
        let det = edge1.dot(pvec);
        if det.abs() < f64::EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = ray.origin - self.verts[0];
        let u = tvec.dot(pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(edge1);
        let v = ray.dir.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = edge2.dot(qvec) * inv_det;
        if t < 0.0 {
            None
        } else {
            Some((t, u, v))
        }
    }
}

/// An axis-aligned box in whatever frame it is stated in (local or world,
/// depending on caller). Matches §3's AABB node contract once decoded.
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub center: Point3<f64>,
    pub extents: Vector3<f64>,
}

impl Aabb {
    pub fn from_points<I: IntoIterator<Item = Point3<f64>>>(points: I) -> Self {
        let mut mins = vec3(f64::MAX, f64::MAX, f64::MAX);
        let mut maxs = vec3(f64::MIN, f64::MIN, f64::MIN);
        let mut any = false;
        for pt in points {
            any = true;
            mins.x = mins.x.min(pt.x);
            mins.y = mins.y.min(pt.y);
            mins.z = mins.z.min(pt.z);
            maxs.x = maxs.x.max(pt.x);
            maxs.y = maxs.y.max(pt.y);
            maxs.z = maxs.z.max(pt.z);
        }
        if !any {
            return Self { center: point3(0., 0., 0.), extents: vec3(0., 0., 0.) };
        }
        let center = (mins + maxs) / 2.0;
        Self { center: point3(center.x, center.y, center.z), extents: maxs - center }
    }

    pub fn combine(a: &Self, b: &Self) -> Self {
        Self::from_points(
            [
                a.center + a.extents,
                a.center - a.extents,
                b.center + b.extents,
                b.center - b.extents,
            ]
            .into_iter(),
        )
    }

    pub fn min(&self) -> Point3<f64> {
        self.center - self.extents
    }

    pub fn max(&self) -> Point3<f64> {
        self.center + self.extents
    }

    pub fn contains(&self, other: &Self) -> bool {
        let (smin, smax) = (self.min(), self.max());
        let (omin, omax) = (other.min(), other.max());
        smin.x <= omin.x
            && smin.y <= omin.y
            && smin.z <= omin.z
            && smax.x >= omax.x
            && smax.y >= omax.y
            && smax.z >= omax.z
    }

    pub fn vol(&self) -> f64 {
        8.0 * self.extents.x * self.extents.y * self.extents.z
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        let (amin, amax) = (self.min(), self.max());
        let (bmin, bmax) = (other.min(), other.max());
        amin.x <= bmax.x
            && amax.x >= bmin.x
            && amin.y <= bmax.y
            && amax.y >= bmin.y
            && amin.z <= bmax.z
            && amax.z >= bmin.z
    }

    /// Slab test; `true` means the ray crosses the box ahead of its origin.
    pub fn ray_intersect(&self, ray: &Ray) -> bool {
        let (lo, hi) = (self.min(), self.max());
        let mut tmin = f64::MIN;
        let mut tmax = f64::MAX;
        for axis in 0..3 {
            let o = ray.origin[axis];
            let d = ray.dir[axis];
            if d.abs() < f64::EPSILON {
                if o < lo[axis] || o > hi[axis] {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (mut t0, mut t1) = ((lo[axis] - o) * inv, (hi[axis] - o) * inv);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            tmin = tmin.max(t0);
            tmax = tmax.min(t1);
            if tmin > tmax {
                return false;
            }
        }
        tmax >= 0.0
    }
}

/// A fully oriented box: `center + sum(extents[i] * axes[i] * s_i)`, `s_i
/// in {-1, 1}`, spans the box. Used by the OBB tree (§4.2) and by boxify
/// (§4.13).
#[derive(Clone, Copy, Debug)]
pub struct Obb {
    pub center: Point3<f64>,
    pub extents: Vector3<f64>,
    pub x: Vector3<f64>,
    pub y: Vector3<f64>,
    pub z: Vector3<f64>,
}

impl Obb {
    pub fn axis_aligned(aabb: &Aabb) -> Self {
        Self {
            center: aabb.center,
            extents: aabb.extents,
            x: vec3(1., 0., 0.),
            y: vec3(0., 1., 0.),
            z: vec3(0., 0., 1.),
        }
    }

    pub fn vol(&self) -> f64 {
        8.0 * self.extents.x * self.extents.y * self.extents.z
    }

    fn corners(&self) -> [Point3<f64>; 8] {
        let ex = self.extents.x * self.x;
        let ey = self.extents.y * self.y;
        let ez = self.extents.z * self.z;
        [
            self.center + ex + ey + ez,
            self.center + ex + ey - ez,
            self.center + ex - ey + ez,
            self.center + ex - ey - ez,
            self.center - ex + ey + ez,
            self.center - ex + ey - ez,
            self.center - ex - ey + ez,
            self.center - ex - ey - ez,
        ]
    }

    fn project_onto(&self, axis: &Vector3<f64>) -> (f64, f64) {
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for pt in self.corners() {
            let r = axis.dot(pt.to_vec());
            min = min.min(r);
            max = max.max(r);
        }
        (min, max)
    }

    /// Requires `axis` normalized. `true` means the tests pass (the
    /// candidate axis is *not* a separating axis).
    fn sat_test(&self, other: &Self, axis_a: Vector3<f64>, axis_b: Option<Vector3<f64>>) -> bool {
        let axis = match axis_b {
            None => axis_a,
            Some(axis_b) => {
                let a = axis_a.cross(axis_b);
                if a.magnitude() < f64::EPSILON {
                    return false;
                }
                a.normalize()
            }
        };
        let (min1, max1) = self.project_onto(&axis);
        let (min2, max2) = other.project_onto(&axis);
        min1 <= max2 && min2 <= max1
    }

    /// Separating-axis test (§4.2 / Design Notes): 15 candidate axes, 3
    /// face normals from each box plus the 9 pairwise edge-cross
    /// products. If every axis fails to separate, the boxes collide.
    pub fn collision(&self, other: &Self) -> bool {
        let axes: [(Vector3<f64>, Option<Vector3<f64>>); 15] = [
            (self.x, None),
            (self.y, None),
            (self.z, None),
            (other.x, None),
            (other.y, None),
            (other.z, None),
            (self.x, Some(other.x)),
            (self.x, Some(other.y)),
            (self.x, Some(other.z)),
            (self.y, Some(other.x)),
            (self.y, Some(other.y)),
            (self.y, Some(other.z)),
            (self.z, Some(other.x)),
            (self.z, Some(other.y)),
            (self.z, Some(other.z)),
        ];
        axes.into_iter().all(|(a, b)| self.sat_test(other, a, b))
    }

    /// Transforms the ray into the box's local frame and slab-tests it
    /// there, since `self.x/y/z` need not be world-axis-aligned.
    pub fn ray_intersect(&self, ray: &Ray) -> bool {
        let d = ray.origin - self.center;
        let local_origin = point3(d.dot(self.x), d.dot(self.y), d.dot(self.z));
        let local_dir = vec3(ray.dir.dot(self.x), ray.dir.dot(self.y), ray.dir.dot(self.z));
        let local_box = Aabb { center: point3(0., 0., 0.), extents: self.extents };
        local_box.ray_intersect(&Ray { origin: local_origin, dir: local_dir })
    }
}

/// The tagged union of the three bounding-volume shapes a BV-tree node can
/// carry (Design Notes: "tagged sum, not subtype polymorphism").
#[derive(Clone, Copy, Debug)]
pub enum BoundingVolume {
    Aabb(Aabb),
    Obb(Obb),
}

impl BoundingVolume {
    pub fn is_colliding(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Aabb(a), Self::Aabb(b)) => a.overlaps(b),
            (Self::Aabb(a), Self::Obb(b)) => Obb::axis_aligned(a).collision(b),
            (Self::Obb(a), Self::Aabb(b)) => a.collision(&Obb::axis_aligned(b)),
            (Self::Obb(a), Self::Obb(b)) => a.collision(b),
        }
    }

    pub fn center(&self) -> Point3<f64> {
        match self {
            Self::Aabb(a) => a.center,
            Self::Obb(o) => o.center,
        }
    }

    pub fn extents(&self) -> Vector3<f64> {
        match self {
            Self::Aabb(a) => a.extents,
            Self::Obb(o) => o.extents,
        }
    }

    pub fn vol(&self) -> f64 {
        match self {
            Self::Aabb(a) => a.vol(),
            Self::Obb(o) => o.vol(),
        }
    }

    pub fn ray_intersect(&self, ray: &Ray) -> bool {
        match self {
            Self::Aabb(a) => a.ray_intersect(ray),
            Self::Obb(o) => o.ray_intersect(ray),
        }
    }

    pub fn as_aabb(&self) -> Aabb {
        match self {
            Self::Aabb(a) => *a,
            Self::Obb(o) => Aabb::from_points(
                [
                    o.center + o.extents.x * o.x + o.extents.y * o.y + o.extents.z * o.z,
                    o.center - o.extents.x * o.x - o.extents.y * o.y - o.extents.z * o.z,
                ]
                .into_iter(),
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn aabb_basic_collision() {
        let a = Aabb::from_points([point3(1., 1., 1.), point3(-1., -1., -1.)]);
        let b = Aabb::from_points([point3(0.5, 0.5, 0.5), point3(0., 0., 0.)]);
        assert!(a.overlaps(&b));
        let c = Aabb::from_points([point3(100., 100., 100.), point3(102., 102., 102.)]);
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn aabb_ray_intersect_hits_and_misses() {
        let a = Aabb { center: point3(0., 0., 0.), extents: vec3(1., 1., 1.) };
        assert!(a.ray_intersect(&Ray::new(point3(0., 0., 5.), vec3(0., 0., -1.))));
        assert!(!a.ray_intersect(&Ray::new(point3(5., 5., 5.), vec3(0., 0., -1.))));
    }

    #[test]
    fn obb_sat_rotated_separation() {
        let a = Obb::axis_aligned(&Aabb { center: point3(0., 0., 0.), extents: vec3(1., 1., 1.) });
        let mut b = Obb::axis_aligned(&Aabb { center: point3(3., 0., 0.), extents: vec3(1., 1., 1.) });
        assert!(!a.collision(&b));
        // Rotate b 45 degrees about z so its corner reaches toward a.
        let rot = Matrix3::from_angle_z(Deg(45.0));
        b.x = rot * b.x;
        b.y = rot * b.y;
        b.center = point3(1.9, 0., 0.);
        assert!(a.collision(&b));
    }

    #[test]
    fn ray_hits_triangle_centroid() {
        let tri = Triangle::new(point3(-1., -1., 0.), point3(1., -1., 0.), point3(0., 1., 0.));
        let ray = Ray::new(point3(0., -0.3, 5.), vec3(0., 0., -1.));
        let hit = tri.ray_intersect(&ray);
        assert!(hit.is_some());
        assert_approx_eq::assert_approx_eq!(hit.unwrap().0, 5.0, 1e-9);
    }

    #[test]
    fn ray_misses_triangle() {
        let tri = Triangle::new(point3(-1., -1., 0.), point3(1., -1., 0.), point3(0., 1., 0.));
        let ray = Ray::new(point3(5., 5., 5.), vec3(0., 0., -1.));
        assert!(tri.ray_intersect(&ray).is_none());
    }
}
