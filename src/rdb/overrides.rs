use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{AssetId, PixelBuffer};
use crate::error::KuraError;

/// Supplies replacement pixels for an asset id ahead of the archive decoder.
pub trait OverrideSource: Send + Sync {
    fn try_load(&self, id: AssetId) -> Option<PixelBuffer>;
}

impl<F> OverrideSource for F
where
    F: Fn(AssetId) -> Option<PixelBuffer> + Send + Sync,
{
    fn try_load(&self, id: AssetId) -> Option<PixelBuffer> {
        self(id)
    }
}

/// Replacement pack laid out as `<dir>/<id>.png`.
#[derive(Debug, Clone)]
pub struct DirectoryOverride {
    dir: PathBuf,
}

impl DirectoryOverride {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, id: AssetId) -> PathBuf {
        self.dir.join(format!("{id}.png"))
    }

    fn load(&self, id: AssetId, path: &Path) -> Result<PixelBuffer, KuraError> {
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        PixelBuffer::from_rgba(width, height, img.into_raw())
            .ok_or_else(|| KuraError::corrupt(id, "override image has a short pixel buffer"))
    }
}

impl OverrideSource for DirectoryOverride {
    fn try_load(&self, id: AssetId) -> Option<PixelBuffer> {
        let path = self.path_for(id);
        if !path.is_file() {
            return None;
        }

        match self.load(id, &path) {
            Ok(pixels) => {
                debug!(resource = "override", id, path = %path.display());
                Some(pixels)
            }
            Err(err) => {
                warn!(resource = "override", id, path = %path.display(), error = %err, "unreadable override image");
                None
            }
        }
    }
}
