/// Built-in block garments
///
/// Used when no asset directory is given, so the viewer can be tried
/// without model files. Proportions follow the shipped models closely
/// enough that placements look the same.
use drape_core::scene::{MaterialSlot, MeshPrimitive};
use drape_core::{AssetError, GarmentAsset, GarmentType, Mesh, Rgb};
use nalgebra::{Point3, Vector3};

const WHITE: Rgb = Rgb::new(0xEE, 0xEE, 0xEE);

fn merged(parts: &[(Point3<f32>, Vector3<f32>)]) -> Mesh {
    let mut mesh = Mesh::with_capacity(parts.len() * 12);
    for (center, size) in parts {
        mesh.triangles
            .extend(Mesh::cuboid(*center, *size).triangles);
    }
    mesh
}

/// Body and sleeves in one primitive, plus a collar too thin to print on.
pub fn tshirt() -> Result<GarmentAsset, AssetError> {
    let body = merged(&[
        (Point3::new(0.0, 0.0, 0.0), Vector3::new(0.5, 0.6, 0.2)),
        (Point3::new(-0.33, 0.2, 0.0), Vector3::new(0.16, 0.14, 0.16)),
        (Point3::new(0.33, 0.2, 0.0), Vector3::new(0.16, 0.14, 0.16)),
    ]);
    let collar = Mesh::cuboid(Point3::new(0.0, 0.3, 0.0), Vector3::new(0.16, 0.015, 0.02));

    GarmentAsset::new(
        GarmentType::Tshirt,
        vec![
            MeshPrimitive::new("tshirt", body, 0),
            MeshPrimitive::new("collar", collar, 0),
        ],
        vec![MaterialSlot::new(Some("fabric".into()), WHITE)],
    )
}

/// Separate front and back panels, a hood behind the neckline, sleeves
/// and drawstrings.
pub fn hoodie() -> Result<GarmentAsset, AssetError> {
    let sleeves = merged(&[
        (Point3::new(-0.34, 0.05, -0.01), Vector3::new(0.16, 0.45, 0.18)),
        (Point3::new(0.34, 0.05, -0.01), Vector3::new(0.16, 0.45, 0.18)),
    ]);
    let cords = merged(&[
        (Point3::new(-0.05, 0.2, 0.13), Vector3::new(0.005, 0.15, 0.005)),
        (Point3::new(0.05, 0.2, 0.13), Vector3::new(0.005, 0.15, 0.005)),
    ]);

    GarmentAsset::new(
        GarmentType::Hoodie,
        vec![
            MeshPrimitive::new(
                "body_front",
                Mesh::cuboid(Point3::new(0.0, 0.0, 0.1), Vector3::new(0.5, 0.65, 0.05)),
                0,
            ),
            MeshPrimitive::new(
                "body_back",
                Mesh::cuboid(Point3::new(0.0, 0.0, -0.12), Vector3::new(0.5, 0.65, 0.05)),
                0,
            ),
            MeshPrimitive::new(
                "hood",
                Mesh::cuboid(Point3::new(0.0, 0.38, -0.16), Vector3::new(0.3, 0.3, 0.2)),
                1,
            ),
            MeshPrimitive::new("sleeves", sleeves, 1),
            MeshPrimitive::new("cords", cords, 2),
        ],
        vec![
            MaterialSlot::new(Some("body".into()), WHITE),
            MaterialSlot::new(Some("trim".into()), WHITE),
            MaterialSlot::new(Some("cord".into()), Rgb::new(0x22, 0x22, 0x22)),
        ],
    )
}

pub fn garment(garment: GarmentType) -> Result<GarmentAsset, AssetError> {
    match garment {
        GarmentType::Tshirt => tshirt(),
        GarmentType::Hoodie => hoodie(),
    }
}

#[cfg(test)]
mod tests {
    use drape_core::surface::{printable_surfaces, Facing};
    use drape_core::GarmentProfile;

    use super::*;

    fn surface_names(asset: &GarmentAsset) -> Vec<(String, Facing)> {
        let profile = GarmentProfile::for_garment(asset.garment());
        printable_surfaces(asset, &profile)
            .into_iter()
            .map(|s| (asset.primitives()[s.primitive].name.clone(), s.facing))
            .collect()
    }

    #[test]
    fn test_tshirt_prints_on_one_body() {
        assert_eq!(surface_names(&tshirt().unwrap()), vec![("tshirt".to_string(), Facing::Sole)]);
    }

    #[test]
    fn test_hoodie_panels_face_their_side() {
        let surfaces = surface_names(&hoodie().unwrap());
        assert!(surfaces.contains(&("body_front".to_string(), Facing::Front)));
        assert!(surfaces.contains(&("body_back".to_string(), Facing::Back)));
        assert!(surfaces.contains(&("hood".to_string(), Facing::Back)));
        assert!(!surfaces.iter().any(|(name, _)| name == "cords"));
    }
}
