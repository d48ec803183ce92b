//! Direction discretization on the unit sphere
//!
//! Direction getters evaluate the fiber orientation distribution on a fixed
//! set of unit vertices. The default is a subdivided icosahedron, which is
//! antipodally symmetric: every vertex `v` has a partner `-v`.

use std::collections::HashMap;

use crate::error::{Result, TrackingError};

/// Subdivision level of [`default_sphere`] (642 vertices)
pub const DEFAULT_SUBDIVISIONS: usize = 3;

/// A set of unit vectors
#[derive(Clone, Debug)]
pub struct Sphere {
    pub vertices: Vec<[f64; 3]>,
}

impl Sphere {
    /// Build a sphere from arbitrary vectors, normalising each one
    pub fn from_vertices(vertices: &[[f64; 3]]) -> Result<Self> {
        if vertices.is_empty() {
            return Err(TrackingError::invalid_parameter("sphere needs at least one vertex"));
        }
        let mut out = Vec::with_capacity(vertices.len());
        for v in vertices {
            let n = norm(v);
            if !(n > 1e-12) {
                return Err(TrackingError::invalid_parameter(
                    "sphere vertices must be non-zero vectors",
                ));
            }
            out.push([v[0] / n, v[1] / n, v[2] / n]);
        }
        Ok(Self { vertices: out })
    }

    /// Icosahedron refined `subdivisions` times by edge midpoints
    pub fn icosphere(subdivisions: usize) -> Self {
        let (vertices, _) = create_icosphere(subdivisions);
        Self { vertices }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Polar angle (from +z) and azimuth of every vertex
    pub fn theta_phi(&self) -> Vec<(f64, f64)> {
        self.vertices
            .iter()
            .map(|v| {
                let theta = v[2].clamp(-1.0, 1.0).acos();
                let phi = v[1].atan2(v[0]);
                (theta, phi)
            })
            .collect()
    }
}

/// The sphere used when none is supplied
pub fn default_sphere() -> Sphere {
    Sphere::icosphere(DEFAULT_SUBDIVISIONS)
}

#[inline]
pub(crate) fn norm(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[inline]
pub(crate) fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Create a unit icosphere: (vertices, triangular faces)
pub fn create_icosphere(subdivisions: usize) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let t = (1.0 + 5.0f64.sqrt()) / 2.0;

    let mut vertices: Vec<[f64; 3]> = [
        [-1.0, t, 0.0], [1.0, t, 0.0], [-1.0, -t, 0.0], [1.0, -t, 0.0],
        [0.0, -1.0, t], [0.0, 1.0, t], [0.0, -1.0, -t], [0.0, 1.0, -t],
        [t, 0.0, -1.0], [t, 0.0, 1.0], [-t, 0.0, -1.0], [-t, 0.0, 1.0],
    ]
    .iter()
    .map(|v| {
        let n = norm(v);
        [v[0] / n, v[1] / n, v[2] / n]
    })
    .collect();

    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
        [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
        [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
        [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut new_faces = Vec::with_capacity(faces.len() * 4);

        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<[f64; 3]>| -> usize {
            let key = if a < b { (a, b) } else { (b, a) };
            if let Some(&idx) = midpoints.get(&key) {
                return idx;
            }
            let va = vertices[a];
            let vb = vertices[b];
            let m = [(va[0] + vb[0]) / 2.0, (va[1] + vb[1]) / 2.0, (va[2] + vb[2]) / 2.0];
            let n = norm(&m);
            vertices.push([m[0] / n, m[1] / n, m[2] / n]);
            let idx = vertices.len() - 1;
            midpoints.insert(key, idx);
            idx
        };

        for f in &faces {
            let ab = midpoint(f[0], f[1], &mut vertices);
            let bc = midpoint(f[1], f[2], &mut vertices);
            let ca = midpoint(f[2], f[0], &mut vertices);
            new_faces.push([f[0], ab, ca]);
            new_faces.push([f[1], bc, ab]);
            new_faces.push([f[2], ca, bc]);
            new_faces.push([ab, bc, ca]);
        }
        faces = new_faces;
    }

    (vertices, faces)
}
