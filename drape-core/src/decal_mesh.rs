/// Decal geometry
///
/// Turns a [`ProjectedDecal`] into drawable triangles: the target
/// primitive's triangles are clipped against the projection box and given
/// texture coordinates from their position inside it.
use nalgebra::{Matrix4, Point2, Point3, Vector3};

use crate::layer::LayerId;
use crate::projector::ProjectedDecal;
use crate::scene::MeshPrimitive;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecalVertex {
    /// Asset space
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub uv: Point2<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecalMesh {
    pub layer: LayerId,
    pub triangles: Vec<[DecalVertex; 3]>,
}

impl DecalMesh {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Vertex in box-local space while clipping.
#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    local: Point3<f32>,
    normal: Vector3<f32>,
}

impl ClipVertex {
    fn lerp(&self, other: &ClipVertex, t: f32) -> ClipVertex {
        ClipVertex {
            local: self.local + (other.local - self.local) * t,
            normal: self.normal.lerp(&other.normal, t),
        }
    }
}

/// Clip `primitive` against `decal`'s box.
///
/// With `cull_backfaces`, triangles facing away from the projector are
/// dropped so a print never lands on the inside of a panel.
pub fn build_decal_mesh(decal: &ProjectedDecal, primitive: &MeshPrimitive, cull_backfaces: bool) -> DecalMesh {
    let to_asset = decal.box_matrix();
    let mut mesh = DecalMesh {
        layer: decal.layer.clone(),
        triangles: Vec::new(),
    };
    let Some(to_local) = to_asset.try_inverse() else {
        return mesh;
    };
    let toward_projector = -decal.direction();

    for triangle in &primitive.mesh.triangles {
        if cull_backfaces && triangle.calculate_normal().dot(&toward_projector) <= 0.0 {
            continue;
        }

        let polygon: Vec<ClipVertex> = triangle
            .vertices
            .iter()
            .map(|v| ClipVertex {
                local: to_local.transform_point(&v.position),
                normal: v.normal,
            })
            .collect();

        let clipped = clip_to_unit_box(polygon);
        if clipped.len() < 3 {
            continue;
        }

        let vertices: Vec<DecalVertex> = clipped.iter().map(|v| finish(v, &to_asset)).collect();
        for i in 1..vertices.len() - 1 {
            mesh.triangles.push([vertices[0], vertices[i], vertices[i + 1]]);
        }
    }

    mesh
}

fn finish(vertex: &ClipVertex, to_asset: &Matrix4<f32>) -> DecalVertex {
    DecalVertex {
        position: to_asset.transform_point(&vertex.local),
        normal: vertex.normal.try_normalize(f32::EPSILON).unwrap_or(vertex.normal),
        uv: Point2::new(vertex.local.x + 0.5, vertex.local.y + 0.5),
    }
}

/// Sutherland-Hodgman against the six faces of `[-0.5, 0.5]^3`.
fn clip_to_unit_box(mut polygon: Vec<ClipVertex>) -> Vec<ClipVertex> {
    for axis in 0..3 {
        for sign in [1.0f32, -1.0] {
            // Inside when sign * coord <= 0.5
            let distance = |v: &ClipVertex| 0.5 - sign * v.local[axis];
            polygon = clip_plane(&polygon, distance);
            if polygon.is_empty() {
                return polygon;
            }
        }
    }
    polygon
}

fn clip_plane(polygon: &[ClipVertex], distance: impl Fn(&ClipVertex) -> f32) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for (i, current) in polygon.iter().enumerate() {
        let next = &polygon[(i + 1) % polygon.len()];
        let (dc, dn) = (distance(current), distance(next));

        if dc >= 0.0 {
            out.push(*current);
        }
        if (dc >= 0.0) != (dn >= 0.0) {
            out.push(current.lerp(next, dc / (dc - dn)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::garment::{GarmentProfile, GarmentType};
    use crate::geometry::Mesh;
    use crate::layer::{DecalLayer, Placement, Side};
    use crate::projector::project;
    use crate::source::ImageSource;
    use crate::surface::{Facing, PrintableSurface};
    use crate::texture::Texture;

    fn body() -> MeshPrimitive {
        MeshPrimitive::new("body", Mesh::cuboid(Point3::origin(), Vector3::new(0.5, 0.6, 0.2)), 0)
    }

    fn decal(side: Side, x: f32, y: f32, size: f32) -> ProjectedDecal {
        let primitive = body();
        let surface = PrintableSurface {
            primitive: 0,
            bounds: primitive.bounds().unwrap(),
            facing: Facing::Sole,
        };
        let layer = DecalLayer::new(
            "logo",
            ImageSource::parse("https://x/logo.png").unwrap(),
            side,
            Placement::new(x, y, size),
        );
        let texture = Arc::new(Texture::from_rgba8(1, 1, vec![255; 4]).unwrap());
        let profile = GarmentProfile {
            projection_depth: 0.2,
            ..GarmentProfile::for_garment(GarmentType::Tshirt)
        };
        project(&layer, &surface, GarmentType::Tshirt, &profile, Some(&texture)).unwrap()
    }

    fn area(mesh: &DecalMesh) -> f32 {
        mesh.triangles
            .iter()
            .map(|[a, b, c]| (b.position - a.position).cross(&(c.position - a.position)).norm() * 0.5)
            .sum()
    }

    #[test]
    fn test_front_decal_covers_front_face_only() {
        let decal = decal(Side::Front, 0.0, 0.0, 0.1);
        let mesh = build_decal_mesh(&decal, &body(), true);

        assert!(!mesh.is_empty());
        assert!((area(&mesh) - 0.01).abs() < 1e-5);
        for tri in &mesh.triangles {
            for v in tri {
                assert!((v.position.z - 0.1).abs() < 1e-5);
                assert!(v.uv.x >= -1e-5 && v.uv.x <= 1.0 + 1e-5);
                assert!(v.uv.y >= -1e-5 && v.uv.y <= 1.0 + 1e-5);
            }
        }
    }

    #[test]
    fn test_uvs_follow_box_axes() {
        let decal = decal(Side::Front, 0.0, 0.0, 0.1);
        let mesh = build_decal_mesh(&decal, &body(), true);
        let right = mesh
            .triangles
            .iter()
            .flatten()
            .max_by(|a, b| a.position.x.total_cmp(&b.position.x))
            .unwrap();
        assert!((right.uv.x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_back_decal_lands_on_back_face() {
        let decal = decal(Side::Back, 0.05, 0.0, 0.1);
        let mesh = build_decal_mesh(&decal, &body(), true);
        assert!(!mesh.is_empty());
        for v in mesh.triangles.iter().flatten() {
            assert!((v.position.z + 0.1).abs() < 1e-5);
            assert!(v.position.x <= 1e-5);
        }
    }

    #[test]
    fn test_culling_keeps_print_off_the_inside() {
        // Deep enough to reach both faces of the body
        let mut decal = decal(Side::Front, 0.0, 0.0, 0.1);
        decal.extents.z = 1.0;
        decal.origin.z = 0.0;

        let culled = build_decal_mesh(&decal, &body(), true);
        let both = build_decal_mesh(&decal, &body(), false);
        assert!((area(&culled) - 0.01).abs() < 1e-5);
        assert!((area(&both) - 0.02).abs() < 1e-5);
    }

    #[test]
    fn test_box_outside_surface_is_empty() {
        let decal = decal(Side::Front, 2.0, 0.0, 0.1);
        assert!(build_decal_mesh(&decal, &body(), true).is_empty());
    }
}
