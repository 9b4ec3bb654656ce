/// glTF / GLB decoding into garment assets
use gltf::mesh::Mode;
use log::{debug, warn};
use nalgebra::{Matrix4, Point3, Vector3};

use crate::color::Rgb;
use crate::error::AssetError;
use crate::garment::GarmentType;
use crate::geometry::{Mesh, Triangle, Vertex};
use crate::scene::{GarmentAsset, MaterialSlot, MeshPrimitive};

/// Decode a binary or embedded glTF document.
///
/// The default scene is walked from its roots and every triangle primitive
/// is flattened into asset space.
pub fn load_garment(garment: GarmentType, data: &[u8]) -> Result<GarmentAsset, AssetError> {
    let parse_error = |reason: String| AssetError::Parse { garment, reason };

    let (document, buffers, _images) =
        gltf::import_slice(data).map_err(|err| parse_error(err.to_string()))?;

    let materials: Vec<_> = document
        .materials()
        .map(|material| {
            let [r, g, b, _] = material.pbr_metallic_roughness().base_color_factor();
            MaterialSlot::new(material.name().map(str::to_string), Rgb::from_linear([r, g, b]))
        })
        .collect();

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(AssetError::NoMesh { garment })?;

    let mut primitives = Vec::new();
    for node in scene.nodes() {
        visit_node(&node, &Matrix4::identity(), &buffers, &mut primitives);
    }

    debug!(
        "decoded {garment} asset: {} primitives, {} materials",
        primitives.len(),
        materials.len()
    );

    GarmentAsset::new(garment, primitives, materials)
}

fn visit_node(
    node: &gltf::Node,
    parent: &Matrix4<f32>,
    buffers: &[gltf::buffer::Data],
    out: &mut Vec<MeshPrimitive>,
) {
    let world = parent * Matrix4::from(node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        let base_name = node
            .name()
            .or_else(|| mesh.name())
            .map(str::to_string)
            .unwrap_or_else(|| format!("mesh{}", mesh.index()));
        let count = mesh.primitives().len();

        for prim in mesh.primitives() {
            if prim.mode() != Mode::Triangles {
                debug!("skipping non-triangle primitive in {base_name}");
                continue;
            }

            let reader = prim.reader(|buffer| Some(&buffers[buffer.index()]));
            let Some(positions) = reader.read_positions() else {
                warn!("primitive in {base_name} has no positions");
                continue;
            };
            let positions: Vec<Point3<f32>> = positions.map(Point3::from).collect();
            let normals: Option<Vec<Vector3<f32>>> = reader
                .read_normals()
                .map(|normals| normals.map(Vector3::from).collect());
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            let mesh = build_mesh(&positions, normals.as_deref(), &indices).transformed(&world);
            let name = if count > 1 {
                format!("{base_name}.{}", prim.index())
            } else {
                base_name.clone()
            };
            let material = prim.material().index().unwrap_or(usize::MAX);

            out.push(MeshPrimitive::new(name, mesh, material));
        }
    }

    for child in node.children() {
        visit_node(&child, &world, buffers, out);
    }
}

fn build_mesh(positions: &[Point3<f32>], normals: Option<&[Vector3<f32>]>, indices: &[u32]) -> Mesh {
    let mut mesh = Mesh::with_capacity(indices.len() / 3);

    for chunk in indices.chunks_exact(3) {
        let idx = [chunk[0] as usize, chunk[1] as usize, chunk[2] as usize];
        if idx.iter().any(|&i| i >= positions.len()) {
            continue;
        }

        let mut triangle = Triangle::new(
            Vertex::from_parts(positions[idx[0]], Vector3::zeros()),
            Vertex::from_parts(positions[idx[1]], Vector3::zeros()),
            Vertex::from_parts(positions[idx[2]], Vector3::zeros()),
        );
        let face = triangle.calculate_normal();

        for (vertex, &i) in triangle.vertices.iter_mut().zip(idx.iter()) {
            vertex.normal = normals
                .and_then(|n| n.get(i).copied())
                .unwrap_or(face);
        }

        mesh.add_triangle(triangle);
    }

    mesh
}
