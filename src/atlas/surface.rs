use super::AtlasRect;
use crate::{error::KuraError, rdb::PixelBuffer};

/// Creates and writes the square RGBA8 surfaces sprites are packed into.
///
/// Surfaces are owned by the atlas cache; the backend only performs the
/// operations on them. `flush` is called once a batch of writes is complete.
pub trait SurfaceBackend {
    type Surface;

    fn create_surface(&mut self, label: &str, dimension: u32) -> Result<Self::Surface, KuraError>;

    fn write_region(
        &mut self,
        surface: &mut Self::Surface,
        rect: AtlasRect,
        pixels: &PixelBuffer,
    ) -> Result<(), KuraError>;

    fn flush(&mut self, _surface: &mut Self::Surface) -> Result<(), KuraError> {
        Ok(())
    }

    fn destroy_surface(&mut self, surface: Self::Surface);
}

/// CPU-resident atlas surface.
#[derive(Debug, Clone)]
pub struct HostSurface {
    label: String,
    dimension: u32,
    rgba: Vec<u8>,
}

impl HostSurface {
    pub fn new(label: &str, dimension: u32) -> Self {
        Self {
            label: label.to_string(),
            dimension,
            rgba: vec![0; dimension as usize * dimension as usize * 4],
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    pub fn data(&self) -> &[u8] {
        &self.rgba
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.dimension || y >= self.dimension {
            return None;
        }
        let idx = (y as usize * self.dimension as usize + x as usize) * 4;
        self.rgba
            .get(idx..idx + 4)
            .and_then(|px| px.try_into().ok())
    }

    pub fn write(&mut self, rect: AtlasRect, pixels: &PixelBuffer) -> Result<(), KuraError> {
        if rect.right() > self.dimension
            || rect.bottom() > self.dimension
            || rect.width != pixels.width()
            || rect.height != pixels.height()
        {
            return Err(KuraError::UploadFailure());
        }

        let dim = self.dimension as usize;
        let row_bytes = rect.width as usize * 4;
        for (row, src) in pixels.rgba().chunks_exact(row_bytes).enumerate() {
            let dst = ((rect.y as usize + row) * dim + rect.x as usize) * 4;
            self.rgba[dst..dst + row_bytes].copy_from_slice(src);
        }

        Ok(())
    }
}

/// Backend keeping every surface in host memory. Used headless and in tests.
#[derive(Debug, Default)]
pub struct HostBackend {
    live: usize,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of surfaces created and not yet destroyed.
    pub fn live_surfaces(&self) -> usize {
        self.live
    }
}

impl SurfaceBackend for HostBackend {
    type Surface = HostSurface;

    fn create_surface(&mut self, label: &str, dimension: u32) -> Result<HostSurface, KuraError> {
        self.live += 1;
        Ok(HostSurface::new(label, dimension))
    }

    fn write_region(
        &mut self,
        surface: &mut HostSurface,
        rect: AtlasRect,
        pixels: &PixelBuffer,
    ) -> Result<(), KuraError> {
        surface.write(rect, pixels)
    }

    fn destroy_surface(&mut self, _surface: HostSurface) {
        self.live = self.live.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_rows_into_place() {
        let mut backend = HostBackend::new();
        let mut surface = backend.create_surface("test", 4).expect("create");
        let pixels = PixelBuffer::from_argb1555(2, 2, &[0x7C00, 0x03E0, 0x001F, 0x0000]);

        backend
            .write_region(&mut surface, AtlasRect { x: 1, y: 2, width: 2, height: 2 }, &pixels)
            .expect("write");

        assert_eq!(surface.pixel(1, 2), Some([0xFF, 0, 0, 0xFF]));
        assert_eq!(surface.pixel(2, 2), Some([0, 0xFF, 0, 0xFF]));
        assert_eq!(surface.pixel(1, 3), Some([0, 0, 0xFF, 0xFF]));
        assert_eq!(surface.pixel(2, 3), Some([0, 0, 0, 0]));
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(surface.pixel(4, 0), None);

        assert_eq!(backend.live_surfaces(), 1);
        backend.destroy_surface(surface);
        assert_eq!(backend.live_surfaces(), 0);
    }

    #[test]
    fn rejects_writes_outside_the_surface() {
        let mut surface = HostSurface::new("test", 4);
        let pixels = PixelBuffer::from_argb1555(2, 2, &[0x7FFF; 4]);
        assert!(surface
            .write(AtlasRect { x: 3, y: 0, width: 2, height: 2 }, &pixels)
            .is_err());
        assert!(surface
            .write(AtlasRect { x: 0, y: 0, width: 1, height: 2 }, &pixels)
            .is_err());
    }
}
