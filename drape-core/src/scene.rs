/// Loaded garment assets
///
/// A [`GarmentAsset`] is built once per garment type and shared read-only.
/// The only per-viewer state derived from it is the [`MaterialTable`] of
/// display colors, which the color applier writes.
use crate::color::Rgb;
use crate::error::AssetError;
use crate::garment::GarmentType;
use crate::geometry::{Aabb, Mesh};

/// A material slot as authored in the model file.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSlot {
    pub name: Option<String>,
    pub base_color: Rgb,
}

impl MaterialSlot {
    pub fn new(name: Option<String>, base_color: Rgb) -> Self {
        Self { name, base_color }
    }
}

/// One discrete piece of the garment (body, hood, pocket, cord...).
///
/// Geometry is in asset space: node transforms are already baked in.
#[derive(Debug, Clone)]
pub struct MeshPrimitive {
    pub name: String,
    pub mesh: Mesh,
    pub material: usize,
    bounds: Option<Aabb>,
}

impl MeshPrimitive {
    pub fn new(name: impl Into<String>, mesh: Mesh, material: usize) -> Self {
        let bounds = mesh.bounds();
        Self {
            name: name.into(),
            mesh,
            material,
            bounds,
        }
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }
}

#[derive(Debug)]
pub struct GarmentAsset {
    garment: GarmentType,
    primitives: Vec<MeshPrimitive>,
    materials: Vec<MaterialSlot>,
}

impl GarmentAsset {
    /// Assemble an asset, rejecting one with nothing to draw.
    ///
    /// Primitives pointing past the material list are given a fresh
    /// default slot so every primitive has a color to receive.
    pub fn new(
        garment: GarmentType,
        primitives: Vec<MeshPrimitive>,
        mut materials: Vec<MaterialSlot>,
    ) -> Result<Self, AssetError> {
        if primitives.iter().all(|p| p.mesh.is_empty()) {
            return Err(AssetError::NoMesh { garment });
        }

        let mut primitives = primitives;
        for primitive in &mut primitives {
            if primitive.material >= materials.len() {
                primitive.material = materials.len();
                materials.push(MaterialSlot::new(None, Rgb::new(0xFF, 0xFF, 0xFF)));
            }
        }

        Ok(Self {
            garment,
            primitives,
            materials,
        })
    }

    pub fn garment(&self) -> GarmentType {
        self.garment
    }

    pub fn primitives(&self) -> &[MeshPrimitive] {
        &self.primitives
    }

    pub fn primitive(&self, index: usize) -> Option<&MeshPrimitive> {
        self.primitives.get(index)
    }

    pub fn materials(&self) -> &[MaterialSlot] {
        &self.materials
    }

    /// Fresh display colors, one per material slot, as authored.
    pub fn material_table(&self) -> MaterialTable {
        MaterialTable {
            colors: self.materials.iter().map(|m| m.base_color).collect(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.primitives.iter().map(|p| p.mesh.triangles.len()).sum()
    }
}

/// Display colors for an asset's material slots.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialTable {
    colors: Vec<Rgb>,
}

impl MaterialTable {
    pub fn color(&self, slot: usize) -> Option<Rgb> {
        self.colors.get(slot).copied()
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub(crate) fn colors_mut(&mut self) -> &mut [Rgb] {
        &mut self.colors
    }
}
