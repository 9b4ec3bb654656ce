/// Decal projection
///
/// A decal is an oriented box cast through the garment surface. Everything
/// here is a pure function of the layer, the target surface, the garment
/// profile and the texture: the viewer recomputes projections from scratch
/// on every relevant input change instead of patching old ones.
use std::f32::consts::PI;
use std::fmt;

use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};
use thiserror::Error;

use crate::garment::{GarmentProfile, GarmentType};
use crate::layer::{DecalLayer, LayerId, Side};
use crate::surface::{Facing, PrintableSurface};
use crate::texture::TextureHandle;
use crate::transform::Transform;

/// Why a layer produced no projection for a surface. None of these are
/// failures: the garment simply renders without that decal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    #[error("surface faces the other side")]
    SideMismatch,
    #[error("layer is restricted to {0}")]
    GarmentFiltered(GarmentType),
    #[error("texture not ready")]
    TextureNotReady,
}

/// Fixed-function state the renderer must use for decal geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecalRenderState {
    pub depth_test: bool,
    pub depth_write: bool,
    /// Negative values pull decal fragments toward the camera.
    pub polygon_offset_factor: f32,
    pub polygon_offset_units: f32,
    /// Draw order within the frame; the garment draws at 0.
    pub render_order: i32,
}

impl DecalRenderState {
    pub const GARMENT_ORDER: i32 = 0;

    pub fn for_profile(profile: &GarmentProfile) -> Self {
        Self {
            depth_test: true,
            depth_write: false,
            polygon_offset_factor: profile.polygon_offset_factor,
            polygon_offset_units: profile.polygon_offset_units,
            render_order: Self::GARMENT_ORDER + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedDecal {
    pub layer: LayerId,
    pub side: Side,
    /// Index of the target primitive in the garment asset
    pub primitive: usize,
    /// Box center, in asset space
    pub origin: Point3<f32>,
    pub orientation: UnitQuaternion<f32>,
    /// Width, height and projection depth
    pub extents: Vector3<f32>,
    pub texture: TextureHandle,
    pub render: DecalRenderState,
}

impl ProjectedDecal {
    /// Maps the unit box `[-0.5, 0.5]^3` onto the projection volume.
    pub fn box_matrix(&self) -> Matrix4<f32> {
        Transform::box_matrix(&self.origin, &self.orientation, &self.extents)
    }

    /// Direction the image is cast in, pointing into the surface.
    pub fn direction(&self) -> Vector3<f32> {
        self.orientation * -Vector3::z()
    }
}

impl fmt::Display for ProjectedDecal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ ({:.3}, {:.3}, {:.3}) {:.3}x{:.3}",
            self.layer,
            self.side,
            self.origin.x,
            self.origin.y,
            self.origin.z,
            self.extents.x,
            self.extents.y
        )
    }
}

/// Width and height of a decal whose longer edge is `size`, following the
/// image's aspect ratio.
pub fn aspect_extents(size: f32, aspect: f32) -> (f32, f32) {
    if !aspect.is_finite() || aspect <= 0.0 {
        return (size, size);
    }
    if aspect >= 1.0 {
        (size, size / aspect)
    } else {
        (size * aspect, size)
    }
}

/// Project `layer` onto `surface` of the active `garment`.
pub fn project(
    layer: &DecalLayer,
    surface: &PrintableSurface,
    garment: GarmentType,
    profile: &GarmentProfile,
    texture: Option<&TextureHandle>,
) -> Result<ProjectedDecal, Ineligible> {
    if let Some(only) = layer.garment {
        if only != garment {
            return Err(Ineligible::GarmentFiltered(only));
        }
    }
    if !surface.accepts(layer.side) {
        return Err(Ineligible::SideMismatch);
    }
    let texture = texture.ok_or(Ineligible::TextureNotReady)?;

    // Back prints are authored looking at the front: mirror across the
    // vertical axis and turn the projector around.
    let (x, yaw) = match layer.side {
        Side::Front => (layer.placement.x, 0.0),
        Side::Back => (-layer.placement.x, PI),
    };

    let z = match (surface.facing, layer.side) {
        (Facing::Sole, Side::Front) => profile.surface_offset,
        (Facing::Sole, Side::Back) => -profile.surface_offset,
        (_, Side::Front) => surface.bounds.max.z + profile.surface_epsilon,
        (_, Side::Back) => surface.bounds.min.z - profile.surface_epsilon,
    };

    let (width, height) = aspect_extents(layer.placement.size, texture.aspect());

    Ok(ProjectedDecal {
        layer: layer.id.clone(),
        side: layer.side,
        primitive: surface.primitive,
        origin: Point3::new(x, layer.placement.y, z),
        orientation: UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw),
        extents: Vector3::new(width, height, profile.projection_depth),
        texture: TextureHandle::clone(texture),
        render: DecalRenderState::for_profile(profile),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::geometry::Aabb;
    use crate::layer::Placement;
    use crate::source::ImageSource;
    use crate::texture::Texture;

    fn texture(width: u32, height: u32) -> TextureHandle {
        Arc::new(Texture::from_rgba8(width, height, vec![255; (width * height * 4) as usize]).unwrap())
    }

    fn layer(side: Side, x: f32, y: f32, size: f32) -> DecalLayer {
        DecalLayer::new(
            "logo",
            ImageSource::parse("https://cdn.example.com/logo.png").unwrap(),
            side,
            Placement::new(x, y, size),
        )
    }

    fn sole() -> PrintableSurface {
        PrintableSurface {
            primitive: 0,
            bounds: Aabb::new(Point3::new(-0.25, -0.3, -0.1), Point3::new(0.25, 0.3, 0.1)),
            facing: Facing::Sole,
        }
    }

    fn panel(facing: Facing, z_min: f32, z_max: f32) -> PrintableSurface {
        PrintableSurface {
            primitive: 3,
            bounds: Aabb::new(Point3::new(-0.25, -0.3, z_min), Point3::new(0.25, 0.3, z_max)),
            facing,
        }
    }

    fn tshirt() -> GarmentProfile {
        GarmentProfile::for_garment(GarmentType::Tshirt)
    }

    #[test]
    fn test_back_mirrors_and_turns_around() {
        let tex = texture(4, 4);
        let front = project(&layer(Side::Front, 0.07, 0.05, 0.2), &sole(), GarmentType::Tshirt, &tshirt(), Some(&tex)).unwrap();
        let back = project(&layer(Side::Back, 0.07, 0.05, 0.2), &sole(), GarmentType::Tshirt, &tshirt(), Some(&tex)).unwrap();

        assert!((front.origin.x - 0.07).abs() < 1e-6);
        assert!((back.origin.x + 0.07).abs() < 1e-6);
        assert_eq!(front.origin.y, back.origin.y);
        assert_eq!(front.extents, back.extents);

        let turn = front.orientation.angle_to(&back.orientation);
        assert!((turn - PI).abs() < 1e-5);
        assert!((front.direction() - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-6);
        assert!((back.direction() - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-5);
    }

    #[test]
    fn test_sole_surface_uses_fixed_standoff() {
        let tex = texture(4, 4);
        let profile = tshirt();
        let front = project(&layer(Side::Front, 0.0, 0.08, 0.12), &sole(), GarmentType::Tshirt, &profile, Some(&tex)).unwrap();
        let back = project(&layer(Side::Back, 0.0, 0.08, 0.12), &sole(), GarmentType::Tshirt, &profile, Some(&tex)).unwrap();
        assert!((front.origin.z - profile.surface_offset).abs() < 1e-6);
        assert!((back.origin.z + profile.surface_offset).abs() < 1e-6);
        assert!((front.extents.z - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_panel_depth_follows_bounds() {
        let tex = texture(4, 4);
        let profile = GarmentProfile::for_garment(GarmentType::Hoodie);

        let front_panel = panel(Facing::Front, 0.08, 0.12);
        let decal = project(&layer(Side::Front, 0.0, 0.0, 0.1), &front_panel, GarmentType::Hoodie, &profile, Some(&tex)).unwrap();
        assert!((decal.origin.z - (0.12 + profile.surface_epsilon)).abs() < 1e-6);
        assert!((decal.extents.z - 0.25).abs() < 1e-6);

        let back_panel = panel(Facing::Back, -0.14, -0.10);
        let decal = project(&layer(Side::Back, 0.0, 0.0, 0.1), &back_panel, GarmentType::Hoodie, &profile, Some(&tex)).unwrap();
        assert!((decal.origin.z - (-0.14 - profile.surface_epsilon)).abs() < 1e-6);
    }

    #[test]
    fn test_aspect_ratio_is_preserved_at_any_size() {
        for (w, h) in [(400, 200), (200, 400), (300, 300), (1, 7)] {
            let tex = texture(w, h);
            for size in [0.03, 0.12, 0.33, 0.5, 3.0] {
                let decal = project(&layer(Side::Front, 0.0, 0.0, size), &sole(), GarmentType::Tshirt, &tshirt(), Some(&tex)).unwrap();
                let ratio = decal.extents.x / decal.extents.y;
                assert!((ratio - tex.aspect()).abs() < 1e-4, "{w}x{h} at {size}");
                assert!((decal.extents.x.max(decal.extents.y) - size).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_ineligible_outcomes() {
        let tex = texture(2, 2);
        let front = layer(Side::Front, 0.0, 0.0, 0.1);

        assert_eq!(
            project(&front, &panel(Facing::Back, -0.2, -0.1), GarmentType::Hoodie, &tshirt(), Some(&tex)),
            Err(Ineligible::SideMismatch)
        );
        assert_eq!(
            project(&front, &sole(), GarmentType::Tshirt, &tshirt(), None),
            Err(Ineligible::TextureNotReady)
        );

        let only_hoodie = front.clone().only_on(GarmentType::Hoodie);
        assert_eq!(
            project(&only_hoodie, &sole(), GarmentType::Tshirt, &tshirt(), Some(&tex)),
            Err(Ineligible::GarmentFiltered(GarmentType::Hoodie))
        );
        assert!(project(&only_hoodie, &sole(), GarmentType::Hoodie, &tshirt(), Some(&tex)).is_ok());
    }

    #[test]
    fn test_projection_is_pure() {
        let tex = texture(3, 2);
        let l = layer(Side::Back, 0.1, -0.05, 0.25);
        let a = project(&l, &sole(), GarmentType::Tshirt, &tshirt(), Some(&tex)).unwrap();
        let b = project(&l, &sole(), GarmentType::Tshirt, &tshirt(), Some(&tex)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_state_draws_after_garment_without_depth_write() {
        let tex = texture(2, 2);
        let decal = project(&layer(Side::Front, 0.0, 0.0, 0.1), &sole(), GarmentType::Tshirt, &tshirt(), Some(&tex)).unwrap();
        assert!(decal.render.depth_test);
        assert!(!decal.render.depth_write);
        assert!(decal.render.render_order > DecalRenderState::GARMENT_ORDER);
        assert!(decal.render.polygon_offset_factor < 0.0);
    }

    #[test]
    fn test_box_matrix_maps_unit_corners() {
        let tex = texture(2, 1);
        let decal = project(&layer(Side::Front, 0.05, 0.1, 0.2), &sole(), GarmentType::Tshirt, &tshirt(), Some(&tex)).unwrap();
        let corner = decal.box_matrix().transform_point(&Point3::new(0.5, 0.5, 0.5));
        assert!((corner.x - (0.05 + 0.1)).abs() < 1e-6);
        assert!((corner.y - (0.1 + 0.05)).abs() < 1e-6);
        assert!((corner.z - (0.13 + 0.3)).abs() < 1e-6);
    }
}
