//! Hand-rolled symmetric eigensolver used for principal-axis fitting of
//! OBB nodes (§4.2). Kept in-house rather than pulling in a general
//! linear-algebra crate so `cgmath` stays the only numeric dependency;
//! grounded in the original engine's own `jacobi_transformation` use for
//! principal-axis mass properties.

use cgmath::*;

/// Cyclic Jacobi eigenvalue iteration for a symmetric 3x3 matrix. Returns
/// the eigenvectors as columns of a rotation matrix and the eigenvalues,
/// both sorted descending by eigenvalue magnitude.
pub fn symmetric_eigen(m: Matrix3<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    let mut a = m;
    let mut v = Matrix3::identity();
    const MAX_SWEEPS: usize = 50;
    const EPS: f64 = 1e-12;

    for _ in 0..MAX_SWEEPS {
        let off = a[0][1].powi(2) + a[0][2].powi(2) + a[1][2].powi(2);
        if off < EPS {
            break;
        }
        for (p, q) in [(0usize, 1usize), (0, 2), (1, 2)] {
            if a[p][q].abs() < EPS {
                continue;
            }
            let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            let app = a[p][p];
            let aqq = a[q][q];
            let apq = a[p][q];
            a[p][p] = c * c * app - 2.0 * s * c * apq + s * s * aqq;
            a[q][q] = s * s * app + 2.0 * s * c * apq + c * c * aqq;
            a[p][q] = 0.0;
            a[q][p] = 0.0;

            for r in 0..3 {
                if r != p && r != q {
                    let arp = a[r][p];
                    let arq = a[r][q];
                    a[r][p] = c * arp - s * arq;
                    a[p][r] = a[r][p];
                    a[r][q] = s * arp + c * arq;
                    a[q][r] = a[r][q];
                }
            }
            for r in 0..3 {
                let vrp = v[r][p];
                let vrq = v[r][q];
                v[r][p] = c * vrp - s * vrq;
                v[r][q] = s * vrp + c * vrq;
            }
        }
    }

    let mut eigvals = vec3(a[0][0], a[1][1], a[2][2]);
    let mut cols = [v.x, v.y, v.z];
    // Insertion sort by descending eigenvalue; only three elements.
    for i in 1..3 {
        let mut j = i;
        while j > 0 && eigvals[j - 1] < eigvals[j] {
            eigvals.swap_elements(j - 1, j);
            cols.swap(j - 1, j);
            j -= 1;
        }
    }
    (Matrix3::from_cols(cols[0], cols[1], cols[2]), eigvals)
}

trait SwapElements {
    fn swap_elements(&mut self, i: usize, j: usize);
}

impl SwapElements for Vector3<f64> {
    fn swap_elements(&mut self, i: usize, j: usize) {
        let tmp = self[i];
        self[i] = self[j];
        self[j] = tmp;
    }
}

/// Covariance matrix of a point cloud about its centroid, the input to
/// `symmetric_eigen` when fitting an OBB's axes.
pub fn covariance(points: &[Point3<f64>]) -> (Point3<f64>, Matrix3<f64>) {
    if points.is_empty() {
        return (point3(0., 0., 0.), Matrix3::from_value(0.0));
    }
    let n = points.len() as f64;
    let mut centroid = vec3(0., 0., 0.);
    for p in points {
        centroid += p.to_vec();
    }
    centroid /= n;
    let mut cov = Matrix3::from_value(0.0);
    for p in points {
        let d = p.to_vec() - centroid;
        cov[0][0] += d.x * d.x;
        cov[0][1] += d.x * d.y;
        cov[0][2] += d.x * d.z;
        cov[1][1] += d.y * d.y;
        cov[1][2] += d.y * d.z;
        cov[2][2] += d.z * d.z;
    }
    cov[1][0] = cov[0][1];
    cov[2][0] = cov[0][2];
    cov[2][1] = cov[1][2];
    cov = cov * (1.0 / n);
    (point3(centroid.x, centroid.y, centroid.z), cov)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identity_covariance_is_isotropic() {
        let pts = vec![
            point3(1., 0., 0.),
            point3(-1., 0., 0.),
            point3(0., 1., 0.),
            point3(0., -1., 0.),
            point3(0., 0., 1.),
            point3(0., 0., -1.),
        ];
        let (centroid, cov) = covariance(&pts);
        assert_approx_eq::assert_approx_eq!(centroid.x, 0.0, 1e-9);
        let (_, eigvals) = symmetric_eigen(cov);
        assert_approx_eq::assert_approx_eq!(eigvals.x, eigvals.y, 1e-9);
        assert_approx_eq::assert_approx_eq!(eigvals.y, eigvals.z, 1e-9);
    }

    #[test]
    fn elongated_cloud_finds_principal_axis() {
        let pts = vec![
            point3(5., 0.1, 0.), point3(-5., -0.1, 0.),
            point3(3., -0.05, 0.), point3(-3., 0.05, 0.),
        ];
        let (_, cov) = covariance(&pts);
        let (axes, eigvals) = symmetric_eigen(cov);
        // Largest eigenvalue's eigenvector should point mostly along x.
        assert!(eigvals.x >= eigvals.y && eigvals.x >= eigvals.z);
        assert!(axes.x.x.abs() > 0.9);
    }
}
