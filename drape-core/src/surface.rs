/// Printable surface selection
///
/// Decals are only ever projected onto primitives that are large enough to
/// carry a print and, on multi-panel garments, that face the requested
/// side. Projecting onto the whole scene is what lets a print show through
/// to the inside of the garment or vanish behind a fold.
use log::debug;

use crate::garment::GarmentProfile;
use crate::geometry::Aabb;
use crate::layer::Side;
use crate::scene::GarmentAsset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facing {
    Front,
    Back,
    /// The garment's only printable primitive; it takes both sides and
    /// front/back is expressed purely through projection orientation.
    Sole,
}

/// A view of one primitive of a [`GarmentAsset`], by index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintableSurface {
    pub primitive: usize,
    pub bounds: Aabb,
    pub facing: Facing,
}

impl PrintableSurface {
    pub fn accepts(&self, side: Side) -> bool {
        match self.facing {
            Facing::Sole => true,
            Facing::Front => side == Side::Front,
            Facing::Back => side == Side::Back,
        }
    }
}

/// Every printable primitive of `asset`, classified, in scene order.
pub fn printable_surfaces(asset: &GarmentAsset, profile: &GarmentProfile) -> Vec<PrintableSurface> {
    let candidates: Vec<(usize, Aabb)> = asset
        .primitives()
        .iter()
        .enumerate()
        .filter_map(|(index, primitive)| {
            if primitive.mesh.is_degenerate() {
                debug!("{}: degenerate geometry", primitive.name);
                return None;
            }
            let bounds = primitive.bounds()?;
            if bounds.volume() < profile.min_surface_volume {
                debug!(
                    "{}: volume {:.2e} below print threshold",
                    primitive.name,
                    bounds.volume()
                );
                return None;
            }
            Some((index, bounds))
        })
        .collect();

    let sole = candidates.len() == 1;
    candidates
        .into_iter()
        .map(|(primitive, bounds)| {
            let facing = if sole {
                Facing::Sole
            } else if bounds.center().z > profile.front_depth_threshold {
                Facing::Front
            } else {
                Facing::Back
            };
            PrintableSurface {
                primitive,
                bounds,
                facing,
            }
        })
        .collect()
}

/// The surfaces that should receive decals for `side`.
///
/// An empty result means the side renders undecorated.
pub fn select_surfaces(
    asset: &GarmentAsset,
    side: Side,
    profile: &GarmentProfile,
) -> Vec<PrintableSurface> {
    printable_surfaces(asset, profile)
        .into_iter()
        .filter(|surface| surface.accepts(side))
        .collect()
}
