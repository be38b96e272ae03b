//! Control-surface output backends.
//!
//! The core never talks to a device directly: the renderer produces `Frame`s
//! and the render task hands them to a `Surface`.  Backends that also produce
//! input push `DeckEvent::Input` into the core's event channel.

mod dump;
#[cfg(feature = "hid")]
mod hid;

use std::sync::Arc;

use deck_proto::config::{DeviceConfig, SurfaceBackend};
use futures_util::future::BoxFuture;
use image::RgbaImage;
use tokio::sync::mpsc;

use crate::core::DeckEvent;

pub use dump::DumpSurface;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("unsupported device model {0:?}")]
    Unsupported(String),
    #[cfg_attr(not(feature = "hid"), allow(dead_code))]
    #[error("no supported control surface found")]
    NotFound,
    #[cfg_attr(not(any(feature = "hid", test)), allow(dead_code))]
    #[error("device error: {0}")]
    Device(String),
    #[error("surface I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("surface task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("built without device support; enable the `hid` feature or use the dump backend")]
    HidDisabled,
}

/// Geometry of a supported device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub model: &'static str,
    pub tile_count: u8,
    pub tile_size: u32,
    pub dial_count: u8,
    pub strip_width: u32,
    pub strip_height: u32,
}

pub const STREAM_DECK_PLUS: DeviceProfile = DeviceProfile {
    model: "plus",
    tile_count: 8,
    tile_size: 120,
    dial_count: 4,
    strip_width: 800,
    strip_height: 100,
};

impl DeviceProfile {
    pub fn for_model(model: &str) -> Result<Self, DeviceError> {
        match model.to_ascii_lowercase().as_str() {
            "plus" | "streamdeck-plus" => Ok(STREAM_DECK_PLUS),
            _ => Err(DeviceError::Unsupported(model.to_string())),
        }
    }

    /// Edge length of cached album art: a square filling the strip height.
    pub fn art_size(&self) -> u32 {
        self.strip_height
    }

    /// Which dial's quarter of the strip a touch landed in.
    pub fn strip_region_at(&self, x: u16) -> u8 {
        let width = self.strip_width / self.dial_count.max(1) as u32;
        ((x as u32 / width.max(1)) as u8).min(self.dial_count.saturating_sub(1))
    }
}

/// A rendered piece of the surface.
#[derive(Debug, Clone)]
pub enum Frame {
    Tile { index: u8, image: RgbaImage },
    /// Sub-rectangle of the strip; its size is the image size.
    Strip { x: u32, y: u32, image: RgbaImage },
}

pub trait Surface: Send + Sync {
    fn write_tile(&self, index: u8, image: RgbaImage) -> BoxFuture<'_, Result<(), DeviceError>>;

    fn write_strip_region(
        &self,
        x: u32,
        y: u32,
        image: RgbaImage,
    ) -> BoxFuture<'_, Result<(), DeviceError>>;
}

/// Write frames in order, stopping at the first failure.
pub async fn write_frames(surface: &dyn Surface, frames: Vec<Frame>) -> Result<(), DeviceError> {
    for frame in frames {
        match frame {
            Frame::Tile { index, image } => surface.write_tile(index, image).await?,
            Frame::Strip { x, y, image } => surface.write_strip_region(x, y, image).await?,
        }
    }
    Ok(())
}

pub fn open(
    config: &DeviceConfig,
    profile: &DeviceProfile,
    event_tx: mpsc::Sender<DeckEvent>,
) -> Result<Arc<dyn Surface>, DeviceError> {
    match config.backend {
        SurfaceBackend::Dump => Ok(Arc::new(DumpSurface::create(&config.dump_dir)?)),
        SurfaceBackend::Hid => open_hid(config, profile, event_tx),
    }
}

#[cfg(feature = "hid")]
fn open_hid(
    config: &DeviceConfig,
    profile: &DeviceProfile,
    event_tx: mpsc::Sender<DeckEvent>,
) -> Result<Arc<dyn Surface>, DeviceError> {
    let surface = hid::HidSurface::open(config.brightness, *profile, event_tx)?;
    Ok(Arc::new(surface))
}

#[cfg(not(feature = "hid"))]
fn open_hid(
    _config: &DeviceConfig,
    _profile: &DeviceProfile,
    _event_tx: mpsc::Sender<DeckEvent>,
) -> Result<Arc<dyn Surface>, DeviceError> {
    Err(DeviceError::HidDisabled)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Keeps every accepted write in memory.
    #[derive(Default)]
    pub struct RecordingSurface {
        writes: Mutex<Vec<Frame>>,
        delay: Duration,
        failing: AtomicBool,
    }

    impl RecordingSurface {
        /// Every write takes `delay` to complete.
        pub fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        /// While set, writes are rejected and not recorded.
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn record(&self, frame: Frame) -> BoxFuture<'_, Result<(), DeviceError>> {
            if self.failing.load(Ordering::SeqCst) {
                return async { Err(DeviceError::Device("unplugged".into())) }.boxed();
            }
            self.writes.lock().unwrap().push(frame);
            let delay = self.delay;
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(())
            }
            .boxed()
        }

        pub fn take(&self) -> Vec<Frame> {
            std::mem::take(&mut *self.writes.lock().unwrap())
        }

        pub fn tiles(frames: &[Frame], index: u8) -> Vec<RgbaImage> {
            frames
                .iter()
                .filter_map(|f| match f {
                    Frame::Tile { index: i, image } if *i == index => Some(image.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn strips(frames: &[Frame], x: u32) -> Vec<RgbaImage> {
            frames
                .iter()
                .filter_map(|f| match f {
                    Frame::Strip { x: fx, image, .. } if *fx == x => Some(image.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl Surface for RecordingSurface {
        fn write_tile(&self, index: u8, image: RgbaImage) -> BoxFuture<'_, Result<(), DeviceError>> {
            self.record(Frame::Tile { index, image })
        }

        fn write_strip_region(
            &self,
            x: u32,
            y: u32,
            image: RgbaImage,
        ) -> BoxFuture<'_, Result<(), DeviceError>> {
            self.record(Frame::Strip { x, y, image })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_plus_is_supported() {
        assert_eq!(DeviceProfile::for_model("Plus").unwrap(), STREAM_DECK_PLUS);
        assert!(matches!(
            DeviceProfile::for_model("mini"),
            Err(DeviceError::Unsupported(m)) if m == "mini"
        ));
    }

    #[test]
    fn test_strip_regions_follow_dials() {
        let p = STREAM_DECK_PLUS;
        assert_eq!(p.art_size(), 100);
        assert_eq!(p.strip_region_at(0), 0);
        assert_eq!(p.strip_region_at(199), 0);
        assert_eq!(p.strip_region_at(200), 1);
        assert_eq!(p.strip_region_at(799), 3);
        assert_eq!(p.strip_region_at(2000), 3);
    }
}
