/// Geometry primitives for garment meshes
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// Triangles with less area than this are treated as degenerate.
const DEGENERATE_AREA: f32 = 1e-10;

/// A 3D vertex with position and normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
}

impl Vertex {
    pub fn new(x: f32, y: f32, z: f32, nx: f32, ny: f32, nz: f32) -> Self {
        Self {
            position: Point3::new(x, y, z),
            normal: Vector3::new(nx, ny, nz),
        }
    }

    pub fn from_parts(position: Point3<f32>, normal: Vector3<f32>) -> Self {
        Self { position, normal }
    }
}

/// A triangle face defined by three vertices
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

impl Triangle {
    pub fn new(v0: Vertex, v1: Vertex, v2: Vertex) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }

    /// Calculate the face normal from the triangle's winding.
    ///
    /// Degenerate triangles yield the zero vector.
    pub fn calculate_normal(&self) -> Vector3<f32> {
        self.cross()
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    pub fn area(&self) -> f32 {
        self.cross().norm() * 0.5
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.area() > DEGENERATE_AREA)
    }

    fn cross(&self) -> Vector3<f32> {
        let v0 = self.vertices[0].position;
        let v1 = self.vertices[1].position;
        let v2 = self.vertices[2].position;

        (v1 - v0).cross(&(v2 - v0))
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing every point, or `None` for an empty iterator.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f32>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        let mut bounds = Self::new(first, first);
        for point in points {
            bounds.min = bounds.min.inf(point);
            bounds.max = bounds.max.sup(point);
        }
        Some(bounds)
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Full edge lengths along each axis.
    pub fn extents(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn volume(&self) -> f32 {
        let e = self.extents();
        e.x * e.y * e.z
    }
}

/// A 3D mesh composed of triangles
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn new() -> Self {
        Self {
            triangles: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            triangles: Vec::with_capacity(capacity),
        }
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// True when no triangle in the mesh encloses any area.
    pub fn is_degenerate(&self) -> bool {
        self.triangles.iter().all(Triangle::is_degenerate)
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(
            self.triangles
                .iter()
                .flat_map(|t| t.vertices.iter().map(|v| &v.position)),
        )
    }

    /// Bake an affine transform into positions and normals.
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Self {
        let linear: Matrix3<f32> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = linear
            .try_inverse()
            .map(|inv| inv.transpose())
            .unwrap_or(linear);

        let triangles = self
            .triangles
            .iter()
            .map(|triangle| {
                let [v0, v1, v2] = triangle.vertices.map(|v| Vertex {
                    position: matrix.transform_point(&v.position),
                    normal: (normal_matrix * v.normal)
                        .try_normalize(f32::EPSILON)
                        .unwrap_or(v.normal),
                });
                Triangle::new(v0, v1, v2)
            })
            .collect();

        Self { triangles }
    }

    /// Create an axis-aligned box mesh centered at `center`.
    ///
    /// Garment fixtures are built from these: a thin box stands in for a
    /// fabric panel.
    pub fn cuboid(center: Point3<f32>, size: Vector3<f32>) -> Self {
        let h = size * 0.5;
        let c = center;
        let mut mesh = Self::with_capacity(12);

        let mut quad = |corners: [[f32; 3]; 4], n: [f32; 3]| {
            let v = corners.map(|p| {
                Vertex::new(
                    c.x + p[0] * h.x,
                    c.y + p[1] * h.y,
                    c.z + p[2] * h.z,
                    n[0],
                    n[1],
                    n[2],
                )
            });
            mesh.add_triangle(Triangle::new(v[0], v[1], v[2]));
            mesh.add_triangle(Triangle::new(v[0], v[2], v[3]));
        };

        // Front face (+Z)
        quad(
            [[-1., -1., 1.], [1., -1., 1.], [1., 1., 1.], [-1., 1., 1.]],
            [0.0, 0.0, 1.0],
        );
        // Back face (-Z)
        quad(
            [[1., -1., -1.], [-1., -1., -1.], [-1., 1., -1.], [1., 1., -1.]],
            [0.0, 0.0, -1.0],
        );
        // Top face (+Y)
        quad(
            [[-1., 1., 1.], [1., 1., 1.], [1., 1., -1.], [-1., 1., -1.]],
            [0.0, 1.0, 0.0],
        );
        // Bottom face (-Y)
        quad(
            [[-1., -1., -1.], [1., -1., -1.], [1., -1., 1.], [-1., -1., 1.]],
            [0.0, -1.0, 0.0],
        );
        // Right face (+X)
        quad(
            [[1., -1., 1.], [1., -1., -1.], [1., 1., -1.], [1., 1., 1.]],
            [1.0, 0.0, 0.0],
        );
        // Left face (-X)
        quad(
            [[-1., -1., -1.], [-1., -1., 1.], [-1., 1., 1.], [-1., 1., -1.]],
            [-1.0, 0.0, 0.0],
        );

        mesh
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_bounds() {
        let mesh = Mesh::cuboid(Point3::new(0.0, 1.0, 0.5), Vector3::new(2.0, 4.0, 0.2));
        assert_eq!(mesh.triangles.len(), 12);

        let bounds = mesh.bounds().unwrap();
        assert!((bounds.min - Point3::new(-1.0, -1.0, 0.4)).norm() < 1e-6);
        assert!((bounds.max - Point3::new(1.0, 3.0, 0.6)).norm() < 1e-6);
        assert!((bounds.volume() - 1.6).abs() < 1e-5);
        assert!((bounds.center() - Point3::new(0.0, 1.0, 0.5)).norm() < 1e-6);
    }

    #[test]
    fn test_cuboid_winding_matches_normals() {
        let mesh = Mesh::cuboid(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        for triangle in &mesh.triangles {
            let computed = triangle.calculate_normal();
            let stored = triangle.vertices[0].normal;
            assert!((computed - stored).norm() < 1e-5, "{computed:?} vs {stored:?}");
        }
    }

    #[test]
    fn test_degenerate_mesh() {
        let v = Vertex::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let mut mesh = Mesh::new();
        mesh.add_triangle(Triangle::new(v, v, v));
        assert!(mesh.is_degenerate());
        assert_eq!(mesh.triangles[0].calculate_normal(), Vector3::zeros());

        assert!(Mesh::new().is_degenerate());
        assert!(Mesh::new().bounds().is_none());
    }

    #[test]
    fn test_transformed_translates_and_scales() {
        let mesh = Mesh::cuboid(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let matrix = Matrix4::new_translation(&Vector3::new(0.0, 0.0, 2.0))
            * Matrix4::new_scaling(2.0);
        let bounds = mesh.transformed(&matrix).bounds().unwrap();
        assert!((bounds.min - Point3::new(-1.0, -1.0, 1.0)).norm() < 1e-6);
        assert!((bounds.max - Point3::new(1.0, 1.0, 3.0)).norm() < 1e-6);
    }
}
