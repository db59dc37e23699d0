//! Resolution of input source ids (`/media/a/<hash>.png`) to decoded pixels.
//!
//! The renderer only knows the [`AssetResolver`] trait. Two resolvers ship
//! with the crate:
//!
//! - [`DirectoryResolver`] looks source ids up in a local directory (the
//!   on-disk mirror of the remote media folder) and decodes them synchronously.
//! - [`BackgroundResolver`] wraps any resolver on a worker thread. `resolve`
//!   returns [`Resolved::Pending`] immediately and the decoded image arrives
//!   later as an [`AssetEvent`], picked up by the renderer's next `prepare()`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::AssetError;

/// Decoded RGBA8 image, row 0 first.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl std::fmt::Debug for PixelData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

impl PixelData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        debug_assert_eq!(rgba.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Decodes an encoded image (png, jpg, ...).
    pub fn decode(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::new(width, height, img.into_raw()))
    }

    /// Reads and decodes an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::new(width, height, img.into_raw()))
    }

    /// A copy with the row order reversed.
    pub fn flipped_vertically(&self) -> Self {
        let row = (self.width * 4) as usize;
        let mut rgba = Vec::with_capacity(self.rgba.len());
        for chunk in self.rgba.chunks_exact(row.max(1)).rev() {
            rgba.extend_from_slice(chunk);
        }
        Self::new(self.width, self.height, rgba)
    }

    /// Full mip chain, level 0 first, each level half the previous (at least 1x1).
    pub fn mip_chain(&self) -> Vec<PixelData> {
        let mut levels = vec![self.clone()];
        let Some(base) = image::RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
        else {
            return levels;
        };
        let (mut w, mut h) = (self.width, self.height);
        while w > 1 || h > 1 {
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            let level = image::imageops::resize(&base, w, h, image::imageops::FilterType::Triangle);
            levels.push(Self::new(w, h, level.into_raw()));
        }
        levels
    }
}

/// The six face source ids of a cubemap: `x.ext`, `x_1.ext` .. `x_5.ext`.
pub fn cubemap_faces(source: &str) -> [String; 6] {
    let (stem, ext) = match source.rfind('.') {
        Some(dot) if !source[dot..].contains('/') => source.split_at(dot),
        _ => (source, ""),
    };
    std::array::from_fn(|face| {
        if face == 0 {
            source.to_string()
        } else {
            format!("{stem}_{face}{ext}")
        }
    })
}

/// Outcome of a resolve call.
#[derive(Clone, Debug)]
pub enum Resolved {
    Ready(Arc<PixelData>),
    /// Will arrive later through [`AssetResolver::poll`].
    Pending,
}

/// Delivered to the render thread when an asynchronous resolve completes.
#[derive(Clone, Debug)]
pub enum AssetEvent {
    Ready {
        source: String,
        pixels: Arc<PixelData>,
    },
    Failed {
        source: String,
        error: String,
    },
}

/// Turns source ids into pixel data.
pub trait AssetResolver: Send {
    /// Looks up `source`. Synchronous resolvers answer `Ready` or an error;
    /// asynchronous ones may answer `Pending`.
    fn resolve(&mut self, source: &str) -> Result<Resolved, AssetError>;

    /// Completed asynchronous resolves since the last call.
    fn poll(&mut self) -> Vec<AssetEvent> {
        Vec::new()
    }
}

/// Resolves source ids against files under a root directory.
///
/// `/media/a/noise.png` is looked up as `<root>/media/a/noise.png`, then as
/// `<root>/noise.png`. Decoded images are cached by source id.
pub struct DirectoryResolver {
    root: PathBuf,
    cache: HashMap<String, Arc<PixelData>>,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file a source id maps to, if one exists.
    pub fn path_for(&self, source: &str) -> Option<PathBuf> {
        let relative = source.trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }
        let nested = self.root.join(relative);
        if nested.is_file() {
            return Some(nested);
        }
        let flat = self.root.join(Path::new(relative).file_name()?);
        flat.is_file().then_some(flat)
    }
}

impl AssetResolver for DirectoryResolver {
    fn resolve(&mut self, source: &str) -> Result<Resolved, AssetError> {
        if let Some(pixels) = self.cache.get(source) {
            return Ok(Resolved::Ready(pixels.clone()));
        }
        let path = self
            .path_for(source)
            .ok_or_else(|| AssetError::NotFound(source.to_string()))?;
        let pixels = Arc::new(PixelData::open(&path)?);
        log::debug!(
            "loaded {source} from {} ({}x{})",
            path.display(),
            pixels.width,
            pixels.height
        );
        self.cache.insert(source.to_string(), pixels.clone());
        Ok(Resolved::Ready(pixels))
    }
}

/// Runs a resolver on a worker thread.
///
/// Requests are de-duplicated: a source that is already in flight or already
/// delivered is not requested again.
pub struct BackgroundResolver {
    requests: Option<flume::Sender<String>>,
    events: flume::Receiver<AssetEvent>,
    ready: HashMap<String, Arc<PixelData>>,
    in_flight: std::collections::HashSet<String>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundResolver {
    pub fn new<R: AssetResolver + 'static>(mut inner: R) -> Self {
        let (request_tx, request_rx) = flume::unbounded::<String>();
        let (event_tx, event_rx) = flume::unbounded();

        let worker = thread::spawn(move || {
            for source in request_rx.iter() {
                let event = match inner.resolve(&source) {
                    Ok(Resolved::Ready(pixels)) => AssetEvent::Ready { source, pixels },
                    Ok(Resolved::Pending) => {
                        // Nested asynchronous resolvers report through their own poll.
                        for event in inner.poll() {
                            if event_tx.send(event).is_err() {
                                return;
                            }
                        }
                        continue;
                    }
                    Err(e) => AssetEvent::Failed {
                        source,
                        error: e.to_string(),
                    },
                };
                if event_tx.send(event).is_err() {
                    return;
                }
            }
            log::debug!("asset worker exiting");
        });

        Self {
            requests: Some(request_tx),
            events: event_rx,
            ready: HashMap::new(),
            in_flight: Default::default(),
            worker: Some(worker),
        }
    }
}

impl AssetResolver for BackgroundResolver {
    fn resolve(&mut self, source: &str) -> Result<Resolved, AssetError> {
        if let Some(pixels) = self.ready.get(source) {
            return Ok(Resolved::Ready(pixels.clone()));
        }
        if self.in_flight.contains(source) {
            return Ok(Resolved::Pending);
        }
        let requests = self.requests.as_ref().ok_or(AssetError::Disconnected)?;
        requests
            .send(source.to_string())
            .map_err(|_| AssetError::Disconnected)?;
        self.in_flight.insert(source.to_string());
        Ok(Resolved::Pending)
    }

    fn poll(&mut self) -> Vec<AssetEvent> {
        let events: Vec<AssetEvent> = self.events.try_iter().collect();
        for event in &events {
            match event {
                AssetEvent::Ready { source, pixels } => {
                    self.in_flight.remove(source);
                    self.ready.insert(source.clone(), pixels.clone());
                }
                AssetEvent::Failed { source, error } => {
                    self.in_flight.remove(source);
                    log::warn!("asset {source} failed: {error}");
                }
            }
        }
        events
    }
}

impl Drop for BackgroundResolver {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("asset worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    struct Solid;

    impl AssetResolver for Solid {
        fn resolve(&mut self, source: &str) -> Result<Resolved, AssetError> {
            if source.ends_with(".png") {
                Ok(Resolved::Ready(Arc::new(PixelData::new(
                    1,
                    1,
                    vec![255, 0, 0, 255],
                ))))
            } else {
                Err(AssetError::NotFound(source.to_string()))
            }
        }
    }

    fn wait_for_events(resolver: &mut BackgroundResolver, count: usize) -> Vec<AssetEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while events.len() < count && Instant::now() < deadline {
            events.extend(resolver.poll());
            thread::sleep(Duration::from_millis(1));
        }
        events
    }

    #[test]
    fn cubemap_face_names() {
        let faces = cubemap_faces("/media/a/sky.jpg");
        assert_eq!(faces[0], "/media/a/sky.jpg");
        assert_eq!(faces[1], "/media/a/sky_1.jpg");
        assert_eq!(faces[5], "/media/a/sky_5.jpg");
        assert_eq!(cubemap_faces("noext")[2], "noext_2");
    }

    #[test]
    fn flip_reverses_rows() {
        let pixels = PixelData::new(1, 2, vec![1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(pixels.flipped_vertically().rgba, vec![2, 2, 2, 2, 1, 1, 1, 1]);
    }

    #[test]
    fn mip_chain_halves_to_one() {
        let pixels = PixelData::new(4, 2, vec![128; 4 * 2 * 4]);
        let sizes: Vec<(u32, u32)> = pixels
            .mip_chain()
            .iter()
            .map(|l| (l.width, l.height))
            .collect();
        assert_eq!(sizes, vec![(4, 2), (2, 1), (1, 1)]);
    }

    #[test]
    fn directory_resolver_reports_missing_files() {
        let mut resolver = DirectoryResolver::new(std::env::temp_dir().join("toygraph-none"));
        assert!(matches!(
            resolver.resolve("/media/a/missing.png"),
            Err(AssetError::NotFound(_))
        ));
    }

    #[test]
    fn directory_resolver_loads_and_caches() {
        let root = std::env::temp_dir().join(format!("toygraph-assets-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255]));
        img.save(root.join("green.png")).unwrap();

        let mut resolver = DirectoryResolver::new(&root);
        let Resolved::Ready(pixels) = resolver.resolve("/media/a/green.png").unwrap() else {
            panic!("directory resolve is synchronous");
        };
        assert_eq!((pixels.width, pixels.height), (2, 2));
        assert_eq!(&pixels.rgba[..4], &[0, 255, 0, 255]);

        std::fs::remove_file(root.join("green.png")).unwrap();
        assert!(matches!(
            resolver.resolve("/media/a/green.png"),
            Ok(Resolved::Ready(_))
        ));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn background_resolver_delivers_events() {
        let mut resolver = BackgroundResolver::new(Solid);
        assert!(matches!(resolver.resolve("a.png"), Ok(Resolved::Pending)));
        assert!(matches!(resolver.resolve("a.png"), Ok(Resolved::Pending)));
        assert!(matches!(resolver.resolve("b.jpg"), Ok(Resolved::Pending)));

        let events = wait_for_events(&mut resolver, 2);
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, AssetEvent::Ready { source, .. } if source == "a.png")));
        assert!(events
            .iter()
            .any(|e| matches!(e, AssetEvent::Failed { source, .. } if source == "b.jpg")));

        assert!(matches!(resolver.resolve("a.png"), Ok(Resolved::Ready(_))));
    }
}
