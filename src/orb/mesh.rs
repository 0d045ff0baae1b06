//! Icosphere base mesh for the orb.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vertex {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit direction; the zero vector stays zero.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            return Self::default();
        }
        self.scaled(1.0 / len)
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Rotate about the y axis.
    pub fn rotated_y(self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos + self.z * sin, self.y, self.z * cos - self.x * sin)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

const PHI: f64 = 1.618_033_988_749_895;

const ICOSAHEDRON_VERTICES: [[f64; 3]; 12] = [
    [-1.0, PHI, 0.0],
    [1.0, PHI, 0.0],
    [-1.0, -PHI, 0.0],
    [1.0, -PHI, 0.0],
    [0.0, -1.0, PHI],
    [0.0, 1.0, PHI],
    [0.0, -1.0, -PHI],
    [0.0, 1.0, -PHI],
    [PHI, 0.0, -1.0],
    [PHI, 0.0, 1.0],
    [-PHI, 0.0, -1.0],
    [-PHI, 0.0, 1.0],
];

const ICOSAHEDRON_FACES: [[usize; 3]; 20] = [
    [0, 11, 5],
    [0, 5, 1],
    [0, 1, 7],
    [0, 7, 10],
    [0, 10, 11],
    [1, 5, 9],
    [5, 11, 4],
    [11, 10, 2],
    [10, 7, 6],
    [7, 1, 8],
    [3, 9, 4],
    [3, 4, 2],
    [3, 2, 6],
    [3, 6, 8],
    [3, 8, 9],
    [4, 9, 5],
    [2, 4, 11],
    [6, 2, 10],
    [8, 6, 7],
    [9, 8, 1],
];

/// Sphere of `radius` built by splitting each icosahedron face into
/// `(detail + 1)^2` triangles and projecting onto the sphere. Vertices on
/// shared edges are emitted once.
pub fn icosphere(radius: f32, detail: u32) -> Mesh {
    let n = detail as usize + 1;
    let mut builder = SphereBuilder::new(radius);
    for face in ICOSAHEDRON_FACES {
        // grid[i][j]: i steps toward corner 1, j toward corner 2.
        let mut grid: Vec<Vec<u32>> = Vec::with_capacity(n + 1);
        for i in 0..=n {
            let row = (0..=n - i)
                .map(|j| {
                    builder.vertex([
                        (face[0], n - i - j),
                        (face[1], i),
                        (face[2], j),
                    ], n)
                })
                .collect();
            grid.push(row);
        }
        for i in 0..n {
            for j in 0..n - i {
                builder
                    .triangles
                    .push([grid[i][j], grid[i + 1][j], grid[i][j + 1]]);
                if j + 1 < n - i {
                    builder
                        .triangles
                        .push([grid[i + 1][j], grid[i + 1][j + 1], grid[i][j + 1]]);
                }
            }
        }
    }
    Mesh {
        vertices: builder.vertices,
        triangles: builder.triangles,
    }
}

struct SphereBuilder {
    radius: f32,
    vertices: Vec<Vertex>,
    triangles: Vec<[u32; 3]>,
    index: HashMap<Vec<(usize, usize)>, u32>,
}

impl SphereBuilder {
    fn new(radius: f32) -> Self {
        Self {
            radius,
            vertices: Vec::new(),
            triangles: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Point with integer barycentric `weights` over icosahedron corners.
    /// The key is canonical so neighbouring faces resolve to one vertex.
    fn vertex(&mut self, weights: [(usize, usize); 3], n: usize) -> u32 {
        let mut key: Vec<(usize, usize)> = weights.into_iter().filter(|(_, w)| *w > 0).collect();
        key.sort_unstable();
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let mut p = [0.0f64; 3];
        for &(corner, weight) in &key {
            let c = ICOSAHEDRON_VERTICES[corner];
            let w = weight as f64 / n as f64;
            p[0] += c[0] * w;
            p[1] += c[1] * w;
            p[2] += c[2] * w;
        }
        let len = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        let scale = f64::from(self.radius) / len;
        let vertex = Vertex::new(
            (p[0] * scale) as f32,
            (p[1] * scale) as f32,
            (p[2] * scale) as f32,
        );
        let idx = self.vertices.len() as u32;
        self.vertices.push(vertex);
        self.index.insert(key, idx);
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_and_face_counts_follow_detail() {
        for detail in [0u32, 1, 2, 10] {
            let n = detail as usize + 1;
            let mesh = icosphere(7.0, detail);
            assert_eq!(mesh.vertex_count(), 10 * n * n + 2, "detail {detail}");
            assert_eq!(mesh.triangle_count(), 20 * n * n, "detail {detail}");
        }
    }

    #[test]
    fn every_vertex_sits_on_the_sphere() {
        let mesh = icosphere(7.0, 4);
        for v in &mesh.vertices {
            assert!((v.length() - 7.0).abs() < 1e-4, "{v:?}");
        }
    }

    #[test]
    fn triangles_face_outward() {
        let mesh = icosphere(1.0, 3);
        for [a, b, c] in &mesh.triangles {
            let (a, b, c) = (
                mesh.vertices[*a as usize],
                mesh.vertices[*b as usize],
                mesh.vertices[*c as usize],
            );
            let e1 = Vertex::new(b.x - a.x, b.y - a.y, b.z - a.z);
            let e2 = Vertex::new(c.x - a.x, c.y - a.y, c.z - a.z);
            let normal = Vertex::new(
                e1.y * e2.z - e1.z * e2.y,
                e1.z * e2.x - e1.x * e2.z,
                e1.x * e2.y - e1.y * e2.x,
            );
            let centroid = Vertex::new(a.x + b.x + c.x, a.y + b.y + c.y, a.z + b.z + c.z);
            assert!(normal.dot(centroid) > 0.0);
        }
    }

    #[test]
    fn rotation_about_y_preserves_length_and_height() {
        let v = Vertex::new(3.0, 2.0, -1.0);
        let r = v.rotated_y(0.7);
        assert!((r.length() - v.length()).abs() < 1e-5);
        assert_eq!(r.y, v.y);
        assert_eq!(Vertex::default().normalized(), Vertex::default());
    }
}
