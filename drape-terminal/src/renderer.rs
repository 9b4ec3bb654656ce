/// True-color rasterizer for terminal rendering
///
/// Each terminal cell shows two vertically stacked pixels through the upper
/// half block glyph. The garment is drawn first with depth writes; decals
/// follow with depth testing only and a slope-scaled bias toward the
/// camera. The last finished frame is kept for still captures.
use std::io::Write;
use std::path::Path;

use crossterm::{
    cursor,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    QueueableCommand,
};
use drape_core::camera::project_with;
use drape_core::viewer::PlacedDecal;
use drape_core::{Camera, Frame, Rgb, Transform};
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::lighting::StudioLights;

/// Depth-buffer resolution the polygon offset units are counted in
const DEPTH_UNIT: f32 = 1e-5;

const BACKGROUND: [f32; 3] = [0.012, 0.012, 0.016];

type ScreenVertex = (f32, f32, f32);

/// RGBA8 copy of a finished frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Snapshot {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn save_png(&self, path: &Path) -> image::ImageResult<()> {
        image::save_buffer_with_format(
            path,
            &self.pixels,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        )
    }
}

/// Software renderer that converts a viewer frame into colored pixels
pub struct Rasterizer {
    width: usize,
    height: usize,
    color_buffer: Vec<[f32; 3]>,
    depth_buffer: Vec<f32>,
    lights: StudioLights,
    last_frame: Option<Snapshot>,
}

impl Rasterizer {
    /// `height` counts pixels, two per terminal row.
    pub fn new(width: usize, height: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            color_buffer: vec![BACKGROUND; size],
            depth_buffer: vec![f32::INFINITY; size],
            lights: StudioLights::studio(),
            last_frame: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.color_buffer = vec![BACKGROUND; width * height];
        self.depth_buffer = vec![f32::INFINITY; width * height];
    }

    pub fn clear(&mut self) {
        self.color_buffer.fill(BACKGROUND);
        self.depth_buffer.fill(f32::INFINITY);
    }

    /// Render the garment and its decals, then keep the result.
    pub fn render_frame(&mut self, frame: &Frame<'_>, camera: &Camera) {
        self.clear();
        let mvp = Transform::mvp_matrix(&frame.model, &camera.view_matrix(), &camera.projection_matrix());
        let normal_matrix = normal_matrix(&frame.model);

        self.draw_garment(frame, &mvp, &normal_matrix);

        let mut decals = frame.decals.clone();
        decals.sort_by_key(|decal| decal.projection.render.render_order);
        for decal in decals {
            self.draw_decal(decal, &mvp, &normal_matrix);
        }

        self.present();
    }

    /// Flat swatch shown when the garment model is unavailable.
    pub fn render_fallback(&mut self, color: Rgb) {
        self.clear();
        let swatch = color.to_linear();
        let (w, h) = (self.width / 3, self.height / 3);
        for y in h..(self.height - h) {
            for x in w..(self.width - w) {
                self.color_buffer[y * self.width + x] = swatch;
            }
        }
        self.present();
    }

    /// The last frame finished by `render_frame` or `render_fallback`.
    pub fn last_frame(&self) -> Option<&Snapshot> {
        self.last_frame.as_ref()
    }

    fn present(&mut self) {
        self.last_frame = Some(self.snapshot());
    }

    /// Copy of the pixels currently in the color buffer.
    pub fn snapshot(&self) -> Snapshot {
        let pixels = self
            .color_buffer
            .iter()
            .flat_map(|&rgb| {
                let [r, g, b] = to_srgb8(rgb);
                [r, g, b, 255]
            })
            .collect();
        Snapshot {
            width: self.width as u32,
            height: self.height as u32,
            pixels,
        }
    }

    fn draw_garment(&mut self, frame: &Frame<'_>, mvp: &Matrix4<f32>, normal_matrix: &Matrix3<f32>) {
        let (width, height) = (self.width, self.height);

        for primitive in frame.asset.primitives() {
            let base = frame
                .materials
                .color(primitive.material)
                .unwrap_or_default()
                .to_linear();

            for triangle in &primitive.mesh.triangles {
                let positions = triangle.vertices.map(|v| v.position);
                let Some(screen) = self.project(mvp, &positions) else {
                    continue;
                };

                let normal = world_normal(normal_matrix, &triangle.calculate_normal());
                let light = self.lights.irradiance(&normal);
                let shade = base.map(|c| c * light);

                let color_buffer = &mut self.color_buffer;
                let depth_buffer = &mut self.depth_buffer;
                rasterize(width, height, &screen, |idx, _, depth| {
                    if depth < depth_buffer[idx] {
                        depth_buffer[idx] = depth;
                        color_buffer[idx] = shade;
                    }
                });
            }
        }
    }

    fn draw_decal(&mut self, decal: &PlacedDecal, mvp: &Matrix4<f32>, normal_matrix: &Matrix3<f32>) {
        let (width, height) = (self.width, self.height);
        let render = decal.projection.render;
        let texture = &decal.projection.texture;

        for triangle in &decal.mesh.triangles {
            let positions = triangle.map(|v| v.position);
            let Some(screen) = self.project(mvp, &positions) else {
                continue;
            };

            let face = (positions[1] - positions[0]).cross(&(positions[2] - positions[0]));
            let light = self.lights.irradiance(&world_normal(normal_matrix, &face));
            let bias = render.polygon_offset_factor * depth_slope(&screen)
                + render.polygon_offset_units * DEPTH_UNIT;
            let uvs = triangle.map(|v| v.uv);

            let color_buffer = &mut self.color_buffer;
            let depth_buffer = &mut self.depth_buffer;
            rasterize(width, height, &screen, |idx, w, depth| {
                let depth = depth + bias;
                if render.depth_test && depth > depth_buffer[idx] {
                    return;
                }

                let u = w[0] * uvs[0].x + w[1] * uvs[1].x + w[2] * uvs[2].x;
                let v = w[0] * uvs[0].y + w[1] * uvs[1].y + w[2] * uvs[2].y;
                let [r, g, b, a] = texture.sample_linear(u, v);
                if a <= 0.0 {
                    return;
                }

                let dst = color_buffer[idx];
                color_buffer[idx] = [
                    r * light * a + dst[0] * (1.0 - a),
                    g * light * a + dst[1] * (1.0 - a),
                    b * light * a + dst[2] * (1.0 - a),
                ];
                if render.depth_write {
                    depth_buffer[idx] = depth;
                }
            });
        }
    }

    fn project(&self, mvp: &Matrix4<f32>, positions: &[Point3<f32>; 3]) -> Option<[ScreenVertex; 3]> {
        let (w, h) = (self.width as u32, self.height as u32);
        Some([
            project_with(mvp, &positions[0], w, h)?,
            project_with(mvp, &positions[1], w, h)?,
            project_with(mvp, &positions[2], w, h)?,
        ])
    }

    /// Write the frame at the cursor origin.
    pub fn draw<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for row in 0..self.height / 2 {
            writer.queue(cursor::MoveTo(0, row as u16))?;
            let mut current: Option<([u8; 3], [u8; 3])> = None;

            for x in 0..self.width {
                let top = to_srgb8(self.color_buffer[(row * 2) * self.width + x]);
                let bottom = to_srgb8(self.color_buffer[(row * 2 + 1) * self.width + x]);

                // Only emit escape codes when the pair changes
                if current != Some((top, bottom)) {
                    writer.queue(SetForegroundColor(rgb(top)))?;
                    writer.queue(SetBackgroundColor(rgb(bottom)))?;
                    current = Some((top, bottom));
                }
                writer.queue(Print('▀'))?;
            }
        }
        writer.queue(ResetColor)?;
        Ok(())
    }
}

fn rgb([r, g, b]: [u8; 3]) -> Color {
    Color::Rgb { r, g, b }
}

fn to_srgb8(linear: [f32; 3]) -> [u8; 3] {
    let Rgb { r, g, b } = Rgb::from_linear(linear.map(|c| c.clamp(0.0, 1.0)));
    [r, g, b]
}

/// Inverse-transpose of the model's linear part.
fn normal_matrix(model: &Matrix4<f32>) -> Matrix3<f32> {
    let linear: Matrix3<f32> = model.fixed_view::<3, 3>(0, 0).into_owned();
    linear
        .try_inverse()
        .map(|inv| inv.transpose())
        .unwrap_or(linear)
}

fn world_normal(normal_matrix: &Matrix3<f32>, normal: &Vector3<f32>) -> Vector3<f32> {
    (normal_matrix * normal)
        .try_normalize(f32::EPSILON)
        .unwrap_or_else(Vector3::zeros)
}

/// Largest screen-space depth gradient of a triangle.
fn depth_slope(v: &[ScreenVertex; 3]) -> f32 {
    let (x1, y1, z1) = (v[1].0 - v[0].0, v[1].1 - v[0].1, v[1].2 - v[0].2);
    let (x2, y2, z2) = (v[2].0 - v[0].0, v[2].1 - v[0].1, v[2].2 - v[0].2);
    let area = x1 * y2 - x2 * y1;
    if area.abs() < 1e-6 {
        return 0.0;
    }
    let dzdx = (z1 * y2 - z2 * y1) / area;
    let dzdy = (z2 * x1 - z1 * x2) / area;
    dzdx.abs().max(dzdy.abs())
}

/// Visit every pixel center covered by a screen triangle with its
/// barycentric weights and interpolated depth.
fn rasterize(
    width: usize,
    height: usize,
    coords: &[ScreenVertex; 3],
    mut fragment: impl FnMut(usize, [f32; 3], f32),
) {
    let (v0, v1, v2) = (coords[0], coords[1], coords[2]);

    // Bounding box
    let min_x = v0.0.min(v1.0).min(v2.0).floor() as i32;
    let max_x = v0.0.max(v1.0).max(v2.0).ceil() as i32;
    let min_y = v0.1.min(v1.1).min(v2.1).floor() as i32;
    let max_y = v0.1.max(v1.1).max(v2.1).ceil() as i32;

    // Clip to screen bounds
    let min_x = min_x.max(0);
    let max_x = max_x.min(width as i32 - 1);
    let min_y = min_y.max(0);
    let max_y = max_y.min(height as i32 - 1);

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;

            if let Some((w0, w1, w2)) = barycentric(
                (v0.0, v0.1),
                (v1.0, v1.1),
                (v2.0, v2.1),
                (px, py),
            ) {
                if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                    let depth = w0 * v0.2 + w1 * v1.2 + w2 * v2.2;
                    fragment(y as usize * width + x as usize, [w0, w1, w2], depth);
                }
            }
        }
    }
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(
    v0: (f32, f32),
    v1: (f32, f32),
    v2: (f32, f32),
    p: (f32, f32),
) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use drape_core::{
        AssetRegistry, DecalLayer, DeferredBackend, ImageSource, MemorySource, Placement, Side,
        Viewer, ViewerConfig, ViewerInput, ViewerSettings,
    };

    use super::*;
    use crate::demo;

    /// An inline PNG as a percent-encoded data URI.
    fn red_png_uri() -> String {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            4,
            4,
            image::Rgba([255, 0, 0, 255]),
        ))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
        let payload: String = bytes.iter().map(|b| format!("%{b:02X}")).collect();
        format!("data:image/png,{payload}")
    }

    fn viewer_with(color: Rgb, decals: Vec<DecalLayer>) -> Viewer {
        let registry = AssetRegistry::new(MemorySource::new(), &ViewerConfig::default());
        registry.insert(demo::tshirt().unwrap());
        let mut viewer = Viewer::new(Arc::new(registry), ViewerSettings::default(), DeferredBackend::new());
        viewer.set_input(ViewerInput {
            color,
            decals,
            auto_rotate: false,
            ..ViewerInput::default()
        });
        viewer.tick(Duration::ZERO);
        viewer
    }

    fn decal_center(viewer: &Viewer, camera: &Camera, w: usize, h: usize) -> (u32, u32) {
        let frame = viewer.frame().unwrap();
        let origin = frame.decals[0].projection.origin;
        let surface = Point3::new(origin.x, origin.y, 0.1);
        let (x, y, _) = camera
            .project_to_screen(&surface, &frame.model, w as u32, h as u32)
            .unwrap();
        (x as u32, y as u32)
    }

    #[test]
    fn test_empty_frame_is_background() {
        let mut rasterizer = Rasterizer::new(8, 6);
        rasterizer.render_fallback(Rgb::new(0, 0, 0));
        let snapshot = rasterizer.last_frame().unwrap();
        assert_eq!((snapshot.width(), snapshot.height()), (8, 6));
        let [r, g, b] = to_srgb8(BACKGROUND);
        assert_eq!(snapshot.pixel(0, 0), [r, g, b, 255]);
        assert_eq!(snapshot.pixel(4, 3), [0, 0, 0, 255]);
    }

    #[test]
    fn test_decal_is_composited_over_garment() {
        let layer = DecalLayer::new(
            "logo",
            ImageSource::parse(&red_png_uri()).unwrap(),
            Side::Front,
            Placement::new(0.0, 0.08, 0.2),
        );
        let viewer = viewer_with(Rgb::default(), vec![layer]);
        let camera = Camera::new(160, 160);
        let mut rasterizer = Rasterizer::new(160, 160);

        rasterizer.render_frame(&viewer.frame().unwrap(), &camera);
        let (x, y) = decal_center(&viewer, &camera, 160, 160);
        let [r, g, b, _] = rasterizer.last_frame().unwrap().pixel(x, y);
        assert!(r > 150 && g < 60 && b < 60, "got {r} {g} {b}");
    }

    #[test]
    fn test_garment_takes_base_color() {
        let viewer = viewer_with(Rgb::new(0x6B, 0x72, 0x80), vec![]);
        let camera = Camera::new(120, 120);
        let mut rasterizer = Rasterizer::new(120, 120);
        rasterizer.render_frame(&viewer.frame().unwrap(), &camera);

        let frame = viewer.frame().unwrap();
        let (x, y, _) = camera
            .project_to_screen(&Point3::new(0.0, 0.0, 0.1), &frame.model, 120, 120)
            .unwrap();
        let [r, g, b, _] = rasterizer.last_frame().unwrap().pixel(x as u32, y as u32);
        // Lit gray keeps its slightly blue cast
        assert!(r > 110, "got {r} {g} {b}");
        assert!(b > r && b > g);
    }

    #[test]
    fn test_decal_does_not_write_depth() {
        let layer = DecalLayer::new(
            "logo",
            ImageSource::parse(&red_png_uri()).unwrap(),
            Side::Front,
            Placement::new(0.0, 0.08, 0.2),
        );
        let viewer = viewer_with(Rgb::default(), vec![layer]);
        let camera = Camera::new(64, 64);
        let frame = viewer.frame().unwrap();

        let mut with = Rasterizer::new(64, 64);
        with.render_frame(&frame, &camera);
        let mut without = Rasterizer::new(64, 64);
        let bare = Frame {
            decals: Vec::new(),
            ..viewer.frame().unwrap()
        };
        without.render_frame(&bare, &camera);

        assert_eq!(with.depth_buffer, without.depth_buffer);
        assert_ne!(with.color_buffer, without.color_buffer);
    }

    #[test]
    fn test_snapshot_png_round_trip() {
        let mut rasterizer = Rasterizer::new(6, 4);
        rasterizer.render_fallback(Rgb::new(0xD4, 0xAF, 0x37));
        let path = std::env::temp_dir().join(format!("drape-snapshot-{}.png", std::process::id()));
        rasterizer.last_frame().unwrap().save_png(&path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgba8();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.dimensions(), (6, 4));
    }

    #[test]
    fn test_depth_slope_of_flat_triangle_is_zero() {
        let flat = [(0.0, 0.0, 0.5), (10.0, 0.0, 0.5), (0.0, 10.0, 0.5)];
        assert_eq!(depth_slope(&flat), 0.0);
        let tilted = [(0.0, 0.0, 0.0), (10.0, 0.0, 0.1), (0.0, 10.0, 0.0)];
        assert!((depth_slope(&tilted) - 0.01).abs() < 1e-6);
    }
}
