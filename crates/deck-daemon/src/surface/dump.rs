//! Headless backend: every frame is written as a PNG file.

use std::path::{Path, PathBuf};

use futures_util::future::{BoxFuture, FutureExt};
use image::RgbaImage;
use tracing::{debug, info};

use super::{DeviceError, Surface};

pub struct DumpSurface {
    dir: PathBuf,
}

impl DumpSurface {
    pub fn create(dir: &Path) -> Result<Self, DeviceError> {
        std::fs::create_dir_all(dir)?;
        info!("dump surface writing frames to {:?}", dir);
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn save(&self, name: String, image: RgbaImage) -> BoxFuture<'_, Result<(), DeviceError>> {
        let path = self.dir.join(name);
        async move {
            tokio::task::spawn_blocking(move || -> Result<(), DeviceError> {
                image.save(&path)?;
                debug!("dump: wrote {:?}", path);
                Ok(())
            })
            .await?
        }
        .boxed()
    }
}

impl Surface for DumpSurface {
    fn write_tile(&self, index: u8, image: RgbaImage) -> BoxFuture<'_, Result<(), DeviceError>> {
        self.save(format!("tile-{}.png", index), image)
    }

    fn write_strip_region(
        &self,
        x: u32,
        y: u32,
        image: RgbaImage,
    ) -> BoxFuture<'_, Result<(), DeviceError>> {
        self.save(format!("strip-{}-{}.png", x, y), image)
    }
}
