/// Decal textures and their asynchronous loading
///
/// Loads never block the frame tick. The viewer asks the [`TextureLoader`]
/// for the textures its current layers reference, keeps rendering while
/// they are pending and picks results up with [`TextureLoader::poll`].
/// Where the work actually happens is a [`LoadBackend`]: worker threads on
/// native hosts, the host's own event loop in the browser.
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::color::srgb_to_linear;
use crate::error::TextureError;
use crate::source::{ImageSource, TextureKey};

/// Decoded decal image.
///
/// Texels are kept as authored (sRGB encoded, straight alpha); sampling
/// converts to linear light so decals composite with the same saturation
/// as the source image.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

pub type TextureHandle = Arc<Texture>;

impl Texture {
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, TextureError> {
        if width == 0 || height == 0 {
            return Err(TextureError::Empty);
        }
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(TextureError::Decode(format!(
                "expected {} bytes for {width}x{height} RGBA, got {}",
                width as usize * height as usize * 4,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decode PNG, JPEG or WebP bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, TextureError> {
        let image = image::load_from_memory(bytes)
            .map_err(|err| TextureError::Decode(err.to_string()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Self::from_rgba8(width, height, image.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width over height.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let i = (y * self.width as usize + x) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Bilinear sample in linear light, clamped to the edge.
    ///
    /// `v` grows upward: `(0, 0)` is the bottom-left corner of the image.
    pub fn sample_linear(&self, u: f32, v: f32) -> [f32; 4] {
        let lut = srgb_lut();
        let fx = (u.clamp(0.0, 1.0) * self.width as f32 - 0.5).max(0.0);
        let fy = ((1.0 - v.clamp(0.0, 1.0)) * self.height as f32 - 0.5).max(0.0);
        let (x0, y0) = (fx.floor() as u32, fy.floor() as u32);
        let (tx, ty) = (fx.fract(), fy.fract());

        let texel = |x: u32, y: u32| {
            let [r, g, b, a] = self.texel(x, y);
            [
                lut[r as usize],
                lut[g as usize],
                lut[b as usize],
                a as f32 / 255.0,
            ]
        };
        let (c00, c10) = (texel(x0, y0), texel(x0 + 1, y0));
        let (c01, c11) = (texel(x0, y0 + 1), texel(x0 + 1, y0 + 1));

        let mut out = [0.0; 4];
        for i in 0..4 {
            let top = c00[i] + (c10[i] - c00[i]) * tx;
            let bottom = c01[i] + (c11[i] - c01[i]) * tx;
            out[i] = top + (bottom - top) * ty;
        }
        out
    }
}

fn srgb_lut() -> &'static [f32; 256] {
    static LUT: OnceLock<[f32; 256]> = OnceLock::new();
    LUT.get_or_init(|| std::array::from_fn(|i| srgb_to_linear(i as f32 / 255.0)))
}

/// Retrieves the bytes behind a remote image URL.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TextureError>;
}

/// Serves `file://` URLs and plain paths, relative ones below `root`.
///
/// Network schemes are left to a host-provided [`Fetch`].
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf, TextureError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        if let Some((scheme, _)) = url.split_once("://") {
            return Err(TextureError::UnsupportedScheme(scheme.to_string()));
        }
        Ok(self.root.join(url.trim_start_matches('/')))
    }
}

impl Fetch for FileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TextureError> {
        let path = self.resolve(url)?;
        fs::read(&path).map_err(|err| TextureError::Fetch {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }
}

/// Resolve a source into a texture on the calling thread.
pub fn load_source(source: &ImageSource, fetcher: &dyn Fetch) -> Result<Texture, TextureError> {
    let bytes = match source.inline_bytes() {
        Some(bytes) => bytes?,
        None => fetcher.fetch(source.key().as_str())?,
    };
    Texture::decode(&bytes)
}

/// Identifies one submitted load; results carrying a ticket the loader no
/// longer waits for are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
    /// Rebuild a ticket from the number a host round-tripped.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct LoadJob {
    pub ticket: Ticket,
    pub source: ImageSource,
}

#[derive(Debug)]
pub struct LoadResult {
    pub ticket: Ticket,
    pub key: TextureKey,
    pub result: Result<TextureHandle, TextureError>,
}

/// Runs load jobs off the frame tick.
pub trait LoadBackend: Send {
    fn submit(&mut self, job: LoadJob);
    /// Completed loads since the last call, without blocking.
    fn drain(&mut self) -> Vec<LoadResult>;
}

fn run_job(job: LoadJob, fetcher: &dyn Fetch) -> LoadResult {
    LoadResult {
        ticket: job.ticket,
        key: job.source.key().clone(),
        result: load_source(&job.source, fetcher).map(Arc::new),
    }
}

/// A small pool of worker threads fed through channels.
pub struct ThreadedBackend {
    jobs: Sender<LoadJob>,
    results: Receiver<LoadResult>,
}

impl ThreadedBackend {
    pub const DEFAULT_WORKERS: usize = 2;

    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self::with_workers(fetcher, Self::DEFAULT_WORKERS)
    }

    pub fn with_workers(fetcher: Arc<dyn Fetch>, workers: usize) -> Self {
        let (job_tx, job_rx) = unbounded::<LoadJob>();
        let (result_tx, result_rx) = unbounded();

        for n in 0..workers.max(1) {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let fetcher = Arc::clone(&fetcher);
            let spawned = thread::Builder::new()
                .name(format!("texture-loader-{n}"))
                .spawn(move || {
                    // Ends when the backend (and its job sender) is dropped
                    for job in jobs.iter() {
                        if results.send(run_job(job, fetcher.as_ref())).is_err() {
                            break;
                        }
                    }
                });
            if let Err(err) = spawned {
                warn!("failed to spawn texture worker: {err}");
            }
        }

        Self {
            jobs: job_tx,
            results: result_rx,
        }
    }
}

impl LoadBackend for ThreadedBackend {
    fn submit(&mut self, job: LoadJob) {
        if let Err(err) = self.jobs.send(job) {
            warn!("texture workers are gone, dropping {}", err.0.source);
        }
    }

    fn drain(&mut self) -> Vec<LoadResult> {
        self.results.try_iter().collect()
    }
}

#[derive(Default)]
struct DeferredState {
    requests: Vec<LoadJob>,
    outstanding: HashMap<Ticket, TextureKey>,
    completed: Vec<LoadResult>,
}

/// Jobs fulfilled by the host: it takes URL requests, fetches them on its
/// own schedule and hands the bytes back. Inline images are decoded on
/// submission.
///
/// Clones share one queue, so the host keeps a clone while the loader owns
/// another.
#[derive(Clone, Default)]
pub struct DeferredBackend {
    state: Arc<Mutex<DeferredState>>,
}

/// A URL the host should fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub ticket: Ticket,
    pub url: String,
}

impl DeferredBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_requests(&self) -> Vec<FetchRequest> {
        let mut state = self.state.lock();
        let requests = std::mem::take(&mut state.requests);
        requests
            .into_iter()
            .map(|job| {
                let url = job.source.key().as_str().to_string();
                state.outstanding.insert(job.ticket, job.source.key().clone());
                FetchRequest {
                    ticket: job.ticket,
                    url,
                }
            })
            .collect()
    }

    /// Hand back fetched bytes. Unknown tickets are ignored.
    pub fn complete(&self, ticket: Ticket, bytes: &[u8]) {
        self.finish(ticket, Texture::decode(bytes).map(Arc::new));
    }

    pub fn fail(&self, ticket: Ticket, reason: impl Into<String>) {
        let mut state = self.state.lock();
        let Some(key) = state.outstanding.remove(&ticket) else {
            return;
        };
        let result = Err(TextureError::Fetch {
            url: key.as_str().to_string(),
            reason: reason.into(),
        });
        state.completed.push(LoadResult {
            ticket,
            key,
            result,
        });
    }

    fn finish(&self, ticket: Ticket, result: Result<TextureHandle, TextureError>) {
        let mut state = self.state.lock();
        if let Some(key) = state.outstanding.remove(&ticket) {
            state.completed.push(LoadResult {
                ticket,
                key,
                result,
            });
        }
    }
}

impl LoadBackend for DeferredBackend {
    fn submit(&mut self, job: LoadJob) {
        let mut state = self.state.lock();
        match job.source.inline_bytes() {
            Some(bytes) => {
                let result = bytes
                    .map_err(TextureError::from)
                    .and_then(|bytes| Texture::decode(&bytes))
                    .map(Arc::new);
                state.completed.push(LoadResult {
                    ticket: job.ticket,
                    key: job.source.key().clone(),
                    result,
                });
            }
            None => state.requests.push(job),
        }
    }

    fn drain(&mut self) -> Vec<LoadResult> {
        std::mem::take(&mut self.state.lock().completed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextureStatus {
    /// Never requested, or no longer referenced
    Unknown,
    Pending,
    Ready(TextureHandle),
    Failed(TextureError),
}

/// Texture cache and in-flight bookkeeping for one viewer.
///
/// Entries are keyed by normalized source, so layers sharing an image share
/// one load and an unchanged source is never loaded twice. A failed source
/// stays failed until no layer references it any more.
pub struct TextureLoader {
    backend: Box<dyn LoadBackend>,
    ready: HashMap<TextureKey, TextureHandle>,
    failed: HashMap<TextureKey, TextureError>,
    pending: HashMap<TextureKey, Ticket>,
    next_ticket: u64,
}

impl TextureLoader {
    pub fn new(backend: impl LoadBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            ready: HashMap::new(),
            failed: HashMap::new(),
            pending: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Make the loader track exactly `sources`: start loads for new ones,
    /// forget everything else. In-flight loads for forgotten sources are
    /// discarded when they land.
    pub fn retain<'a>(&mut self, sources: impl IntoIterator<Item = &'a ImageSource>) {
        let mut wanted = HashSet::new();
        for source in sources {
            let key = source.key();
            if !wanted.insert(key.clone()) {
                continue;
            }
            if self.ready.contains_key(key)
                || self.failed.contains_key(key)
                || self.pending.contains_key(key)
            {
                continue;
            }

            let ticket = Ticket(self.next_ticket);
            self.next_ticket += 1;
            debug!("loading texture {key}");
            self.pending.insert(key.clone(), ticket);
            self.backend.submit(LoadJob {
                ticket,
                source: source.clone(),
            });
        }

        self.ready.retain(|key, _| wanted.contains(key));
        self.failed.retain(|key, _| wanted.contains(key));
        self.pending.retain(|key, _| {
            let keep = wanted.contains(key);
            if !keep {
                debug!("abandoning in-flight texture {key}");
            }
            keep
        });
    }

    /// Collect finished loads. Returns true when a tracked texture changed
    /// state.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        for LoadResult {
            ticket,
            key,
            result,
        } in self.backend.drain()
        {
            if self.pending.get(&key) != Some(&ticket) {
                debug!("discarding stale texture result for {key}");
                continue;
            }
            self.pending.remove(&key);
            changed = true;

            match result {
                Ok(texture) => {
                    info!(
                        "texture ready {key} ({}x{})",
                        texture.width(),
                        texture.height()
                    );
                    self.ready.insert(key, texture);
                }
                Err(err) => {
                    warn!("texture unavailable {key}: {err}");
                    self.failed.insert(key, err);
                }
            }
        }
        changed
    }

    pub fn get(&self, key: &TextureKey) -> Option<&TextureHandle> {
        self.ready.get(key)
    }

    pub fn status(&self, key: &TextureKey) -> TextureStatus {
        if let Some(texture) = self.ready.get(key) {
            TextureStatus::Ready(Arc::clone(texture))
        } else if let Some(err) = self.failed.get(key) {
            TextureStatus::Failed(err.clone())
        } else if self.pending.contains_key(key) {
            TextureStatus::Pending
        } else {
            TextureStatus::Unknown
        }
    }

    /// No load is in flight.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Cursor;

    use base64::Engine;
    use image::{ImageFormat, Rgba, RgbaImage};

    /// PNG bytes of a solid `width`x`height` image.
    pub fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    pub fn png_data_uri(width: u32, height: u32) -> String {
        let payload = base64::engine::general_purpose::STANDARD.encode(png(width, height, [255, 0, 0, 255]));
        format!("data:image/png;base64,{payload}")
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::fixtures::*;
    use super::*;

    struct MapFetcher(HashMap<String, Vec<u8>>);

    impl Fetch for MapFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, TextureError> {
            self.0.get(url).cloned().ok_or_else(|| TextureError::Fetch {
                url: url.to_string(),
                reason: "404".to_string(),
            })
        }
    }

    fn source(s: &str) -> ImageSource {
        ImageSource::parse(s).unwrap()
    }

    #[test]
    fn test_decode_png() {
        let texture = Texture::decode(&png(4, 2, [10, 20, 30, 255])).unwrap();
        assert_eq!((texture.width(), texture.height()), (4, 2));
        assert!((texture.aspect() - 2.0).abs() < 1e-6);
        assert_eq!(texture.texel(3, 1), [10, 20, 30, 255]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(Texture::decode(b"nope"), Err(TextureError::Decode(_))));
        assert_eq!(Texture::from_rgba8(0, 4, vec![]), Err(TextureError::Empty));
    }

    #[test]
    fn test_sampling_is_linearized() {
        let texture = Texture::from_rgba8(1, 1, vec![128, 128, 128, 255]).unwrap();
        let [r, g, b, a] = texture.sample_linear(0.5, 0.5);
        assert!((r - srgb_to_linear(128.0 / 255.0)).abs() < 1e-6);
        assert!(r < 0.25 && (g - r).abs() < 1e-6 && (b - r).abs() < 1e-6);
        assert!((a - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sampling_v_grows_upward() {
        // Top row white, bottom row black
        let pixels = vec![255, 255, 255, 255, 0, 0, 0, 255];
        let texture = Texture::from_rgba8(1, 2, pixels).unwrap();
        assert!(texture.sample_linear(0.5, 1.0)[0] > 0.99);
        assert!(texture.sample_linear(0.5, 0.0)[0] < 0.01);
    }

    #[test]
    fn test_file_fetcher_refuses_network_schemes() {
        let fetcher = FileFetcher::new("/srv");
        assert_eq!(
            fetcher.fetch("https://cdn.example.com/a.png"),
            Err(TextureError::UnsupportedScheme("https".to_string()))
        );
        assert_eq!(fetcher.resolve("/img/a.png").unwrap(), PathBuf::from("/srv/img/a.png"));
    }

    #[test]
    fn test_load_source_inline_and_remote() {
        let fetcher = MapFetcher(HashMap::from([("https://x/a.png".to_string(), png(3, 3, [0; 4]))]));
        let inline = load_source(&source(&png_data_uri(2, 1)), &fetcher).unwrap();
        assert_eq!(inline.width(), 2);
        let remote = load_source(&source("https://x/a.png"), &fetcher).unwrap();
        assert_eq!(remote.height(), 3);
        assert!(load_source(&source("https://x/missing.png"), &fetcher).is_err());
    }

    #[test]
    fn test_deferred_loads_complete_through_host() {
        let host = DeferredBackend::new();
        let mut loader = TextureLoader::new(host.clone());
        let remote = source("https://x/a.png");
        let inline = source(&png_data_uri(2, 2));

        loader.retain([&remote, &inline]);
        assert_eq!(loader.status(remote.key()), TextureStatus::Pending);

        // Inline images never wait for the host
        assert!(loader.poll());
        assert!(loader.get(inline.key()).is_some());
        assert!(!loader.is_settled());

        let requests = host.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://x/a.png");
        host.complete(requests[0].ticket, &png(8, 4, [0, 0, 255, 255]));

        assert!(loader.poll());
        assert!(loader.is_settled());
        assert!((loader.get(remote.key()).unwrap().aspect() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_unchanged_source_is_not_reloaded() {
        let host = DeferredBackend::new();
        let mut loader = TextureLoader::new(host.clone());
        let remote = source("https://x/a.png");

        loader.retain([&remote]);
        loader.retain([&remote]);
        let requests = host.take_requests();
        assert_eq!(requests.len(), 1);
        host.complete(requests[0].ticket, &png(1, 1, [0; 4]));
        loader.poll();

        loader.retain([&remote]);
        assert!(host.take_requests().is_empty());
        assert!(loader.get(remote.key()).is_some());
    }

    #[test]
    fn test_failure_sticks_until_source_changes() {
        let host = DeferredBackend::new();
        let mut loader = TextureLoader::new(host.clone());
        let broken = source("https://x/broken.png");

        loader.retain([&broken]);
        let ticket = host.take_requests()[0].ticket;
        host.fail(ticket, "404");
        assert!(loader.poll());
        assert!(matches!(loader.status(broken.key()), TextureStatus::Failed(_)));

        loader.retain([&broken]);
        assert!(host.take_requests().is_empty());

        let fixed = source("https://x/fixed.png");
        loader.retain([&fixed]);
        assert_eq!(loader.status(broken.key()), TextureStatus::Unknown);
        assert_eq!(host.take_requests().len(), 1);
    }

    #[test]
    fn test_abandoned_load_is_discarded() {
        let host = DeferredBackend::new();
        let mut loader = TextureLoader::new(host.clone());
        let remote = source("https://x/a.png");

        loader.retain([&remote]);
        let ticket = host.take_requests()[0].ticket;
        loader.retain(std::iter::empty());
        assert!(loader.is_settled());

        host.complete(ticket, &png(1, 1, [0; 4]));
        assert!(!loader.poll());
        assert_eq!(loader.status(remote.key()), TextureStatus::Unknown);

        // Re-adding starts a fresh load; the old ticket stays dead
        loader.retain([&remote]);
        host.complete(ticket, &png(1, 1, [0; 4]));
        assert!(!loader.poll());
        assert_eq!(loader.status(remote.key()), TextureStatus::Pending);
    }

    #[test]
    fn test_inline_payload_that_is_not_an_image() {
        let mut backend = DeferredBackend::new();
        let job = LoadJob {
            ticket: Ticket(0),
            source: source("data:image/png;base64,aGVsbG8="),
        };
        backend.submit(job);
        let results = backend.drain();
        assert!(matches!(results[0].result, Err(TextureError::Decode(_))));
    }

    #[test]
    fn test_threaded_backend_loads_off_thread() {
        let fetcher = Arc::new(MapFetcher(HashMap::from([(
            "https://x/a.png".to_string(),
            png(6, 3, [1, 2, 3, 255]),
        )])));
        let mut loader = TextureLoader::new(ThreadedBackend::new(fetcher));
        let ok = source("https://x/a.png");
        let missing = source("https://x/missing.png");
        loader.retain([&ok, &missing]);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !loader.is_settled() && Instant::now() < deadline {
            loader.poll();
            thread::sleep(Duration::from_millis(5));
        }

        assert!(loader.is_settled());
        assert!((loader.get(ok.key()).unwrap().aspect() - 2.0).abs() < 1e-6);
        assert!(matches!(
            loader.status(missing.key()),
            TextureStatus::Failed(TextureError::Fetch { .. })
        ));
    }
}
