/// Terminal garment preview built on the drape viewer
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use drape_core::viewer::LayerReport;
use drape_core::{Camera, LayerState, Viewer, ViewerStatus, COLOR_PRESETS};
use log::{info, warn};
use std::io::{self, stdout, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub mod demo;
pub mod lighting;
pub mod renderer;

pub use renderer::{Rasterizer, Snapshot};

const ORBIT_STEP: f32 = 0.1;
const ZOOM_STEP: f32 = 1.0;

/// Tick `viewer` until textures settle or `timeout` runs out, then render
/// one still frame.
///
/// No time is fed to the viewer, so the garment keeps its current
/// rotation.
pub fn capture(viewer: &mut Viewer, camera: &Camera, width: usize, height: usize, timeout: Duration) -> Snapshot {
    let deadline = Instant::now() + timeout;
    viewer.tick(Duration::ZERO);
    while !viewer.is_settled() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
        viewer.tick(Duration::ZERO);
    }
    if !viewer.is_settled() {
        warn!("capturing before all decal textures finished loading");
    }

    let mut rasterizer = Rasterizer::new(width, height);
    render_into(&mut rasterizer, viewer, camera);
    rasterizer.snapshot()
}

fn render_into(rasterizer: &mut Rasterizer, viewer: &Viewer, camera: &Camera) {
    match viewer.frame() {
        Some(frame) => rasterizer.render_frame(&frame, camera),
        None => {
            let color = match viewer.status() {
                ViewerStatus::Fallback { color, .. } => *color,
                _ => viewer.input().color,
            };
            rasterizer.render_fallback(color);
        }
    }
}

fn describe(report: &LayerReport) -> String {
    let state = match &report.state {
        LayerState::Projected(n) => format!("on {n}"),
        LayerState::TexturePending => "loading".to_string(),
        LayerState::TextureUnavailable(_) => "image failed".to_string(),
        LayerState::NoSurface => "no surface".to_string(),
        LayerState::Filtered(garment) => format!("{garment} only"),
        LayerState::GarmentUnavailable => "no garment".to_string(),
    };
    format!("{} ({}): {}", report.id, report.side, state)
}

/// Main application struct for terminal garment preview
pub struct TerminalApp {
    viewer: Viewer,
    camera: Camera,
    rasterizer: Rasterizer,
    snapshot_path: PathBuf,
    preset: usize,
    notice: Option<String>,
    running: bool,
    last_tick: Instant,
    last_frame: Instant,
    frame_count: u32,
    fps: f32,
}

impl TerminalApp {
    pub fn new(viewer: Viewer, snapshot_path: PathBuf) -> io::Result<Self> {
        let (width, height) = Self::canvas_size()?;
        let camera = Camera::with_settings(width as u32, height as u32, viewer.settings().camera.clone());

        Ok(Self {
            viewer,
            camera,
            rasterizer: Rasterizer::new(width, height),
            snapshot_path,
            preset: 0,
            notice: None,
            running: true,
            last_tick: Instant::now(),
            last_frame: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        })
    }

    /// Pixel canvas for the terminal, minus the status row.
    fn canvas_size() -> io::Result<(usize, usize)> {
        let (columns, rows) = terminal::size()?;
        Ok((columns as usize, rows.saturating_sub(1).max(1) as usize * 2))
    }

    pub fn run(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;

        let result = self.main_loop();

        // Cleanup
        terminal::disable_raw_mode()?;
        execute!(stdout(), terminal::LeaveAlternateScreen, cursor::Show)?;

        result
    }

    fn main_loop(&mut self) -> io::Result<()> {
        let target_frame_time = Duration::from_millis(1000 / 30); // 30 FPS target

        while self.running {
            let frame_start = Instant::now();

            // Handle input
            while event::poll(Duration::from_millis(0))? {
                self.handle_input()?;
            }

            // Update
            let elapsed = frame_start - self.last_tick;
            self.last_tick = frame_start;
            self.viewer.tick(elapsed);

            // Render
            self.render()?;

            // Frame timing
            self.frame_count += 1;
            let elapsed = frame_start.elapsed();
            if elapsed < target_frame_time {
                std::thread::sleep(target_frame_time - elapsed);
            }

            // Update FPS counter
            let now = Instant::now();
            if (now - self.last_frame).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_frame).as_secs_f32();
                self.frame_count = 0;
                self.last_frame = now;
            }
        }

        Ok(())
    }

    fn handle_input(&mut self) -> io::Result<()> {
        match event::read()? {
            Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press,
                ..
            }) => self.handle_key(code),
            Event::Resize(..) => {
                let (width, height) = Self::canvas_size()?;
                self.camera.resize(width as u32, height as u32);
                self.rasterizer.resize(width, height);
                execute!(stdout(), terminal::Clear(ClearType::All))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.running = false;
            }
            KeyCode::Char('w') | KeyCode::Up => self.camera.orbit(0.0, -ORBIT_STEP),
            KeyCode::Char('s') | KeyCode::Down => self.camera.orbit(0.0, ORBIT_STEP),
            KeyCode::Char('a') | KeyCode::Left => self.camera.orbit(-ORBIT_STEP, 0.0),
            KeyCode::Char('d') | KeyCode::Right => self.camera.orbit(ORBIT_STEP, 0.0),
            KeyCode::Char('+') | KeyCode::Char('=') => self.camera.zoom(-ZOOM_STEP),
            KeyCode::Char('-') => self.camera.zoom(ZOOM_STEP),
            KeyCode::Char(' ') => {
                let mut input = self.viewer.input().clone();
                input.auto_rotate = !input.auto_rotate;
                self.viewer.set_input(input);
            }
            KeyCode::Char('g') => {
                let mut input = self.viewer.input().clone();
                input.garment = input.garment.next();
                self.viewer.set_input(input);
            }
            KeyCode::Char('c') => {
                self.preset = (self.preset + 1) % COLOR_PRESETS.len();
                let (name, color) = COLOR_PRESETS[self.preset];
                let mut input = self.viewer.input().clone();
                input.color = color;
                self.viewer.set_input(input);
                self.notice = Some(format!("color {name}"));
            }
            KeyCode::Char('r') => self.viewer.retry_asset(),
            KeyCode::Char('p') => self.save_snapshot(),
            _ => {}
        }
    }

    fn save_snapshot(&mut self) {
        let Some(snapshot) = self.rasterizer.last_frame() else {
            return;
        };
        let notice = match snapshot.save_png(&self.snapshot_path) {
            Ok(()) => {
                info!("saved snapshot to {}", self.snapshot_path.display());
                format!("saved {}", self.snapshot_path.display())
            }
            Err(err) => {
                warn!("snapshot failed: {err}");
                format!("snapshot failed: {err}")
            }
        };
        self.notice = Some(notice);
    }

    fn status_line(&self) -> String {
        let input = self.viewer.input();
        let mut parts = vec![format!("{} {} | FPS {:.1}", input.garment, input.color, self.fps)];
        if let ViewerStatus::Fallback { error, .. } = self.viewer.status() {
            parts.push(format!("{error} (r=retry)"));
        }
        parts.extend(self.viewer.layer_reports().iter().map(describe));
        if let Some(notice) = &self.notice {
            parts.push(notice.clone());
        }
        parts.push("arrows=orbit +/-=zoom space=spin g=garment c=color p=snapshot q=quit".to_string());
        parts.join(" | ")
    }

    fn render(&mut self) -> io::Result<()> {
        render_into(&mut self.rasterizer, &self.viewer, &self.camera);

        // Output to terminal
        let mut stdout = stdout();
        queue!(stdout, cursor::MoveTo(0, 0))?;

        self.rasterizer.draw(&mut stdout)?;

        // Status row below the canvas
        let (width, rows) = terminal::size()?;
        let status: String = self.status_line().chars().take(width as usize).collect();
        queue!(
            stdout,
            cursor::MoveTo(0, rows.saturating_sub(1)),
            terminal::Clear(ClearType::CurrentLine),
            SetForegroundColor(Color::Yellow),
            Print(status),
            ResetColor
        )?;

        stdout.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use drape_core::{
        AssetRegistry, DeferredBackend, GarmentType, MemorySource, TextureError, ViewerConfig, ViewerInput,
        ViewerSettings,
    };

    use super::*;

    fn viewer(garment: GarmentType, with_asset: bool) -> Viewer {
        let registry = AssetRegistry::new(MemorySource::new(), &ViewerConfig::default());
        if with_asset {
            registry.insert(demo::garment(garment).unwrap());
        }
        let mut viewer = Viewer::new(Arc::new(registry), ViewerSettings::default(), DeferredBackend::new());
        viewer.set_input(ViewerInput {
            garment,
            auto_rotate: false,
            ..ViewerInput::default()
        });
        viewer
    }

    #[test]
    fn test_capture_renders_requested_size() {
        let mut viewer = viewer(GarmentType::Hoodie, true);
        let camera = Camera::new(40, 30);
        let snapshot = capture(&mut viewer, &camera, 40, 30, Duration::from_secs(1));
        assert_eq!((snapshot.width(), snapshot.height()), (40, 30));
        assert!(viewer.is_settled());
    }

    #[test]
    fn test_capture_falls_back_to_swatch() {
        let mut viewer = viewer(GarmentType::Tshirt, false);
        let camera = Camera::new(30, 30);
        let snapshot = capture(&mut viewer, &camera, 30, 30, Duration::from_millis(50));
        assert!(matches!(viewer.status(), ViewerStatus::Fallback { .. }));

        // Noir swatch in the middle
        assert_eq!(snapshot.pixel(15, 15), [0x11, 0x11, 0x11, 255]);
    }

    #[test]
    fn test_layer_description() {
        let report = LayerReport {
            id: "logo".into(),
            side: drape_core::Side::Back,
            state: LayerState::TextureUnavailable(TextureError::Empty),
        };
        assert_eq!(describe(&report), "logo (back): image failed");
    }
}
