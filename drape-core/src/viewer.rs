/// Render loop coordination
///
/// A [`Viewer`] owns everything derived from the current design: the active
/// garment, its printable surfaces, display colors, texture loads and the
/// projected decals. The host feeds it input whenever the editor changes
/// and calls [`Viewer::tick`] once per displayed frame. Within a tick the
/// order is fixed: finished texture loads are collected, the base color is
/// applied, projections are rebuilt if anything they depend on changed,
/// and finally the garment is spun by the elapsed time.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use nalgebra::Matrix4;

use crate::color::Rgb;
use crate::color_applier::apply_color;
use crate::config::ViewerSettings;
use crate::decal_mesh::{build_decal_mesh, DecalMesh};
use crate::error::{AssetError, TextureError};
use crate::garment::{GarmentProfile, GarmentType};
use crate::layer::{DecalLayer, LayerId, Side};
use crate::projector::{project, ProjectedDecal};
use crate::registry::AssetRegistry;
use crate::scene::{GarmentAsset, MaterialTable};
use crate::surface::{printable_surfaces, PrintableSurface};
use crate::texture::{LoadBackend, TextureLoader, TextureStatus};
use crate::transform::{RotationState, Transform};

/// Everything the editor controls.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerInput {
    pub color: Rgb,
    pub garment: GarmentType,
    pub decals: Vec<DecalLayer>,
    pub auto_rotate: bool,
}

impl Default for ViewerInput {
    fn default() -> Self {
        Self {
            color: Rgb::default(),
            garment: GarmentType::Tshirt,
            decals: Vec::new(),
            auto_rotate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerStatus {
    /// No input received yet
    Idle,
    Ready,
    /// The garment model is unavailable; show a flat swatch instead.
    Fallback { color: Rgb, error: AssetError },
}

/// A projection together with the geometry it clips out of its surface.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedDecal {
    pub projection: ProjectedDecal,
    pub mesh: DecalMesh,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerState {
    /// Projected onto this many surfaces
    Projected(usize),
    TexturePending,
    TextureUnavailable(TextureError),
    /// The garment has no printable surface on the layer's side
    NoSurface,
    /// Restricted to another garment
    Filtered(GarmentType),
    GarmentUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerReport {
    pub id: LayerId,
    pub side: Side,
    pub state: LayerState,
}

/// What to draw this frame.
pub struct Frame<'a> {
    pub garment: GarmentType,
    pub asset: &'a GarmentAsset,
    pub materials: &'a MaterialTable,
    /// Garment group transform: asset space to world
    pub model: Matrix4<f32>,
    /// Decals in composition order, all drawn after the garment
    pub decals: Vec<&'a PlacedDecal>,
}

struct ActiveGarment {
    asset: Arc<GarmentAsset>,
    profile: GarmentProfile,
    surfaces: Vec<PrintableSurface>,
    materials: MaterialTable,
}

pub struct Viewer {
    registry: Arc<AssetRegistry>,
    settings: ViewerSettings,
    textures: TextureLoader,
    input: ViewerInput,
    status: ViewerStatus,
    requested: Option<GarmentType>,
    active: Option<ActiveGarment>,
    placed: Vec<PlacedDecal>,
    /// Bumped whenever existing projections stop matching the input
    generation: u64,
    color_dirty: bool,
    projections_dirty: bool,
    rotation: RotationState,
}

impl Viewer {
    pub fn new(
        registry: Arc<AssetRegistry>,
        settings: ViewerSettings,
        backend: impl LoadBackend + 'static,
    ) -> Self {
        Self {
            registry,
            settings,
            textures: TextureLoader::new(backend),
            input: ViewerInput::default(),
            status: ViewerStatus::Idle,
            requested: None,
            active: None,
            placed: Vec::new(),
            generation: 0,
            color_dirty: false,
            projections_dirty: false,
            rotation: RotationState::zero(),
        }
    }

    /// Replace the editor input. Cheap when nothing changed.
    pub fn set_input(&mut self, input: ViewerInput) {
        let ViewerInput {
            color,
            garment,
            decals,
            auto_rotate,
        } = input;

        let decals = dedupe_layers(decals);
        if decals.len() > self.settings.max_layers {
            warn!(
                "design has {} decal layers, editor limit is {}",
                decals.len(),
                self.settings.max_layers
            );
        }

        if color != self.input.color {
            self.input.color = color;
            self.color_dirty = true;
            if let ViewerStatus::Fallback { color: shown, .. } = &mut self.status {
                *shown = color;
            }
        }
        self.input.auto_rotate = auto_rotate;

        let garment_changed = self.requested != Some(garment);
        self.input.garment = garment;
        if decals != self.input.decals {
            self.input.decals = decals;
            self.invalidate_projections();
        }
        if garment_changed {
            self.switch_garment(garment);
        }

        self.textures.retain(
            self.input
                .decals
                .iter()
                .filter(|layer| layer.applies_to(garment))
                .map(|layer| &layer.source),
        );
    }

    /// Reload the active garment after its asset failed.
    pub fn retry_asset(&mut self) {
        if let Some(garment) = self.requested {
            self.registry.evict(garment);
            self.switch_garment(garment);
        }
    }

    /// Advance one frame. Returns whether anything visible changed.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        let mut redraw = false;

        if self.textures.poll() {
            self.invalidate_projections();
        }

        if self.color_dirty {
            if let Some(active) = &mut self.active {
                redraw |= apply_color(&mut active.materials, self.input.color);
            }
            self.color_dirty = false;
        }

        if self.projections_dirty {
            self.recompute_projections();
            self.projections_dirty = false;
            redraw = true;
        }

        if self.input.auto_rotate && !elapsed.is_zero() {
            self.rotation.advance(elapsed, self.settings.auto_rotate_speed);
            redraw = true;
        }

        redraw
    }

    pub fn frame(&self) -> Option<Frame<'_>> {
        let active = self.active.as_ref()?;
        let decals = self
            .placed
            .iter()
            .filter(|decal| {
                let current = decal.generation == self.generation;
                if !current {
                    debug!("holding back stale projection {}", decal.projection);
                }
                current
            })
            .collect();

        Some(Frame {
            garment: active.asset.garment(),
            asset: &active.asset,
            materials: &active.materials,
            model: Transform::garment_matrix(
                &active.profile.offset(),
                active.profile.scale,
                &self.rotation,
            ),
            decals,
        })
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn input(&self) -> &ViewerInput {
        &self.input
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn rotation(&self) -> RotationState {
        self.rotation
    }

    /// No texture is loading and no update is waiting for a tick.
    pub fn is_settled(&self) -> bool {
        self.textures.is_settled() && !self.color_dirty && !self.projections_dirty
    }

    /// Per-layer outcome of the last recomputation, in input order.
    pub fn layer_reports(&self) -> Vec<LayerReport> {
        self.input
            .decals
            .iter()
            .map(|layer| LayerReport {
                id: layer.id.clone(),
                side: layer.side,
                state: self.layer_state(layer),
            })
            .collect()
    }

    fn layer_state(&self, layer: &DecalLayer) -> LayerState {
        if let Some(only) = layer.garment.filter(|only| *only != self.input.garment) {
            return LayerState::Filtered(only);
        }
        let Some(active) = &self.active else {
            return LayerState::GarmentUnavailable;
        };
        if !active.surfaces.iter().any(|s| s.accepts(layer.side)) {
            return LayerState::NoSurface;
        }
        match self.textures.status(layer.source.key()) {
            TextureStatus::Ready(_) => LayerState::Projected(
                self.placed
                    .iter()
                    .filter(|d| d.generation == self.generation && d.projection.layer == layer.id)
                    .count(),
            ),
            TextureStatus::Failed(err) => LayerState::TextureUnavailable(err),
            TextureStatus::Pending | TextureStatus::Unknown => LayerState::TexturePending,
        }
    }

    fn invalidate_projections(&mut self) {
        self.generation += 1;
        self.projections_dirty = true;
    }

    /// Drop everything derived from the previous garment before anything
    /// is derived from the new one.
    fn switch_garment(&mut self, garment: GarmentType) {
        self.placed.clear();
        self.active = None;
        self.requested = Some(garment);
        self.invalidate_projections();

        let resolved = self.registry.resolve(garment).and_then(|asset| {
            let profile = self
                .registry
                .profile(garment)
                .cloned()
                .ok_or(AssetError::NoProfile(garment))?;
            Ok((asset, profile))
        });

        match resolved {
            Ok((asset, profile)) => {
                let surfaces = printable_surfaces(&asset, &profile);
                info!(
                    "showing {garment}: {} printable surfaces of {} primitives",
                    surfaces.len(),
                    asset.primitives().len()
                );
                if surfaces.is_empty() {
                    warn!("{garment} has no printable surface, decals will not render");
                }
                // Tinted before the first frame can show the asset's own colors
                let mut materials = asset.material_table();
                apply_color(&mut materials, self.input.color);
                self.color_dirty = false;
                self.active = Some(ActiveGarment {
                    materials,
                    asset,
                    profile,
                    surfaces,
                });
                self.status = ViewerStatus::Ready;
            }
            Err(error) => {
                warn!("{garment} unavailable, showing fallback: {error}");
                self.status = ViewerStatus::Fallback {
                    color: self.input.color,
                    error,
                };
            }
        }
    }

    fn recompute_projections(&mut self) {
        self.placed.clear();
        let Some(active) = &self.active else {
            return;
        };
        let garment = active.asset.garment();

        for layer in &self.input.decals {
            if !layer.applies_to(garment) {
                continue;
            }
            let texture = self.textures.get(layer.source.key());

            for surface in active.surfaces.iter().filter(|s| s.accepts(layer.side)) {
                let projection = match project(layer, surface, garment, &active.profile, texture) {
                    Ok(projection) => projection,
                    Err(reason) => {
                        debug!("{}: {reason}", layer.id);
                        break;
                    }
                };
                let Some(primitive) = active.asset.primitive(surface.primitive) else {
                    continue;
                };
                let mesh = build_decal_mesh(&projection, primitive, active.profile.cull_backfaces);
                debug!("projected {projection} ({} triangles)", mesh.triangles.len());
                self.placed.push(PlacedDecal {
                    projection,
                    mesh,
                    generation: self.generation,
                });
            }
        }
    }
}

fn dedupe_layers(layers: Vec<DecalLayer>) -> Vec<DecalLayer> {
    let mut seen = HashSet::new();
    layers
        .into_iter()
        .filter(|layer| {
            let fresh = seen.insert(layer.id.clone());
            if !fresh {
                warn!("duplicate decal layer id {}, keeping the first", layer.id);
            }
            fresh
        })
        .collect()
}
