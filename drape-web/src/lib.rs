/// Drape Web - WASM bindings for the garment viewer
///
/// The browser owns the WebGL scene and all network access. This crate
/// keeps the viewer state: JS pushes model bytes and editor input in,
/// fulfils the image fetches the viewer asks for, and each animation frame
/// reads back a JSON description of what to draw. Matrices are
/// column-major, ready for `Matrix4.fromArray`.
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use drape_core::texture::Ticket;
use drape_core::viewer::{LayerReport, PlacedDecal};
use drape_core::{
    AssetRegistry, DeferredBackend, DesignInput, Frame, GarmentType, LayerState, MemorySource, Rgb, Side,
    Viewer, ViewerConfig, ViewerStatus,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

fn js_error(err: impl Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn to_json(value: &impl Serialize) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(js_error)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecalView {
    layer: String,
    side: Side,
    primitive: usize,
    /// Normalized image source, usable as an `<img>` src
    image: String,
    box_matrix: Vec<f32>,
    render_order: i32,
    depth_write: bool,
    polygon_offset: [f32; 2],
    positions: Vec<f32>,
    normals: Vec<f32>,
    uvs: Vec<f32>,
}

impl DecalView {
    fn new(decal: &PlacedDecal, image: String) -> Self {
        let projection = &decal.projection;
        let vertices = decal.mesh.triangles.iter().flatten();

        Self {
            layer: projection.layer.to_string(),
            side: projection.side,
            primitive: projection.primitive,
            image,
            box_matrix: projection.box_matrix().as_slice().to_vec(),
            render_order: projection.render.render_order,
            depth_write: projection.render.depth_write,
            polygon_offset: [
                projection.render.polygon_offset_factor,
                projection.render.polygon_offset_units,
            ],
            positions: vertices.clone().flat_map(|v| [v.position.x, v.position.y, v.position.z]).collect(),
            normals: vertices.clone().flat_map(|v| [v.normal.x, v.normal.y, v.normal.z]).collect(),
            uvs: vertices.flat_map(|v| [v.uv.x, v.uv.y]).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameView {
    garment: GarmentType,
    model: Vec<f32>,
    /// Display color per material slot
    materials: Vec<Rgb>,
    decals: Vec<DecalView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LayerView {
    id: String,
    side: Side,
    state: &'static str,
    detail: Option<String>,
}

impl From<&LayerReport> for LayerView {
    fn from(report: &LayerReport) -> Self {
        let (state, detail) = match &report.state {
            LayerState::Projected(n) => ("projected", Some(n.to_string())),
            LayerState::TexturePending => ("pending", None),
            LayerState::TextureUnavailable(err) => ("failed", Some(err.to_string())),
            LayerState::NoSurface => ("no-surface", None),
            LayerState::Filtered(garment) => ("filtered", Some(garment.to_string())),
            LayerState::GarmentUnavailable => ("no-garment", None),
        };
        Self {
            id: report.id.to_string(),
            side: report.side,
            state,
            detail,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    status: &'static str,
    /// Swatch color while the garment model is unavailable
    fallback_color: Option<Rgb>,
    error: Option<String>,
    settled: bool,
    layers: Vec<LayerView>,
}

#[derive(Serialize)]
struct RequestView {
    ticket: u64,
    url: String,
}

#[wasm_bindgen]
pub struct WebViewer {
    models: Arc<MemorySource>,
    registry: Arc<AssetRegistry>,
    backend: DeferredBackend,
    viewer: Viewer,
}

#[wasm_bindgen]
impl WebViewer {
    /// Create a viewer, optionally from a TOML configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(config_toml: Option<String>) -> Result<WebViewer, JsValue> {
        let config = match config_toml {
            Some(text) => ViewerConfig::from_toml_str(&text).map_err(js_error)?,
            None => ViewerConfig::default(),
        };
        let models = Arc::new(MemorySource::new());
        let registry = Arc::new(AssetRegistry::new(Arc::clone(&models), &config));
        let backend = DeferredBackend::new();
        let viewer = Viewer::new(Arc::clone(&registry), config.viewer, backend.clone());

        Ok(WebViewer {
            models,
            registry,
            backend,
            viewer,
        })
    }

    /// Supply model bytes for the asset path named in a garment profile.
    pub fn add_asset(&mut self, path: &str, bytes: Vec<u8>) {
        self.models.insert(path, bytes);
        let path = path.trim_start_matches('/');
        for garment in GarmentType::all() {
            let uses_path = self
                .registry
                .profile(*garment)
                .is_some_and(|profile| profile.asset.trim_start_matches('/') == path);
            if uses_path {
                self.registry.evict(*garment);
            }
        }
        if matches!(self.viewer.status(), ViewerStatus::Fallback { .. }) {
            self.viewer.retry_asset();
        }
    }

    /// Replace the editor input with a design document.
    ///
    /// `fallback_garment` applies when the design does not name one.
    pub fn set_design(&mut self, json: &str, fallback_garment: &str) -> Result<(), JsValue> {
        let garment: GarmentType = fallback_garment.parse().map_err(js_error)?;
        let input = DesignInput::from_json(json)
            .and_then(|design| design.into_viewer_input(garment))
            .map_err(js_error)?;
        self.viewer.set_input(input);
        Ok(())
    }

    pub fn set_color(&mut self, hex: &str) -> Result<(), JsValue> {
        let mut input = self.viewer.input().clone();
        input.color = Rgb::from_hex(hex).map_err(js_error)?;
        self.viewer.set_input(input);
        Ok(())
    }

    pub fn set_garment(&mut self, garment: &str) -> Result<(), JsValue> {
        let mut input = self.viewer.input().clone();
        input.garment = garment.parse().map_err(js_error)?;
        self.viewer.set_input(input);
        Ok(())
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        let mut input = self.viewer.input().clone();
        input.auto_rotate = enabled;
        self.viewer.set_input(input);
    }

    pub fn retry_asset(&mut self) {
        self.viewer.retry_asset();
    }

    /// Advance by `elapsed_ms`. Returns whether the scene needs redrawing.
    pub fn tick(&mut self, elapsed_ms: f64) -> bool {
        let elapsed_ms = if elapsed_ms.is_finite() { elapsed_ms.max(0.0) } else { 0.0 };
        let elapsed = Duration::from_secs_f64(elapsed_ms / 1000.0);
        self.viewer.tick(elapsed)
    }

    /// The current frame as JSON, or `null` while no garment is shown.
    pub fn frame_json(&self) -> Result<String, JsValue> {
        match self.viewer.frame() {
            Some(frame) => to_json(&self.frame_view(&frame)),
            None => Ok("null".to_string()),
        }
    }

    pub fn status_json(&self) -> Result<String, JsValue> {
        let (status, fallback_color, error) = match self.viewer.status() {
            ViewerStatus::Idle => ("idle", None, None),
            ViewerStatus::Ready => ("ready", None, None),
            ViewerStatus::Fallback { color, error } => ("fallback", Some(*color), Some(error.to_string())),
        };
        to_json(&StatusView {
            status,
            fallback_color,
            error,
            settled: self.viewer.is_settled(),
            layers: self.viewer.layer_reports().iter().map(LayerView::from).collect(),
        })
    }

    /// Image URLs waiting to be fetched, as `[{ticket, url}]`.
    pub fn take_texture_requests(&self) -> Result<String, JsValue> {
        let requests: Vec<RequestView> = self
            .backend
            .take_requests()
            .into_iter()
            .map(|request| RequestView {
                ticket: request.ticket.raw(),
                url: request.url,
            })
            .collect();
        to_json(&requests)
    }

    pub fn complete_texture(&self, ticket: u64, bytes: &[u8]) {
        self.backend.complete(Ticket::from_raw(ticket), bytes);
    }

    pub fn fail_texture(&self, ticket: u64, reason: &str) {
        self.backend.fail(Ticket::from_raw(ticket), reason);
    }
}

impl WebViewer {
    fn frame_view(&self, frame: &Frame<'_>) -> FrameView {
        let decals = frame
            .decals
            .iter()
            .map(|decal| {
                let image = self
                    .viewer
                    .input()
                    .decals
                    .iter()
                    .find(|layer| layer.id == decal.projection.layer)
                    .map(|layer| layer.source.key().as_str().to_string())
                    .unwrap_or_default();
                DecalView::new(decal, image)
            })
            .collect();

        FrameView {
            garment: frame.garment,
            model: frame.model.as_slice().to_vec(),
            materials: frame.materials.colors().to_vec(),
            decals,
        }
    }
}

/// Forwards `log` records to the browser console.
struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            log::Level::Debug | log::Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

#[wasm_bindgen(start)]
pub fn main() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}
