use std::ptr::NonNull;

use dashi::{Context, Handle, Image};
use tracing::debug;

use super::{AtlasRect, HostSurface, SurfaceBackend};
use crate::{error::KuraError, rdb::PixelBuffer};

/// Atlas surface living in a dashi image. Writes land in a host shadow and
/// reach the GPU when the surface is flushed.
#[derive(Debug)]
pub struct DeviceSurface {
    pub image: Handle<Image>,
    shadow: HostSurface,
    dirty: bool,
}

impl DeviceSurface {
    pub fn dimension(&self) -> u32 {
        self.shadow.dimension()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// GPU backend. Must stay on the thread that owns the dashi context.
pub struct DeviceBackend {
    ctx: Option<NonNull<Context>>,
}

impl DeviceBackend {
    pub fn new(ctx: Option<*mut Context>) -> Self {
        Self {
            ctx: ctx.and_then(NonNull::new),
        }
    }

    pub fn import_ctx(&mut self, ctx: NonNull<Context>) {
        self.ctx = Some(ctx);
    }

    fn ctx_mut(&mut self) -> Result<&mut Context, KuraError> {
        self.ctx
            .as_mut()
            .map(|ctx| unsafe { ctx.as_mut() })
            .ok_or(KuraError::DashiContext())
    }

    fn upload(&mut self, shadow: &HostSurface) -> Result<Handle<Image>, KuraError> {
        let ctx = self.ctx_mut()?;
        let dim = shadow.dimension();

        let info = dashi::ImageInfo {
            debug_name: shadow.label(),
            dim: [dim, dim, 1],
            layers: 1,
            format: dashi::Format::RGBA8,
            mip_levels: 1,
            initial_data: Some(shadow.data()),
            ..Default::default()
        };

        ctx.make_image(&info).map_err(|_| KuraError::UploadFailure())
    }
}

impl SurfaceBackend for DeviceBackend {
    type Surface = DeviceSurface;

    fn create_surface(&mut self, label: &str, dimension: u32) -> Result<DeviceSurface, KuraError> {
        let shadow = HostSurface::new(label, dimension);
        let image = self.upload(&shadow)?;

        Ok(DeviceSurface {
            image,
            shadow,
            dirty: false,
        })
    }

    fn write_region(
        &mut self,
        surface: &mut DeviceSurface,
        rect: AtlasRect,
        pixels: &PixelBuffer,
    ) -> Result<(), KuraError> {
        surface.shadow.write(rect, pixels)?;
        surface.dirty = true;
        Ok(())
    }

    fn flush(&mut self, surface: &mut DeviceSurface) -> Result<(), KuraError> {
        if !surface.dirty {
            return Ok(());
        }

        let image = self.upload(&surface.shadow)?;
        let old = std::mem::replace(&mut surface.image, image);
        if old.valid() {
            self.ctx_mut()?.destroy_image(old);
        }
        surface.dirty = false;

        debug!(resource = "atlas", surface = surface.shadow.label(), "re-uploaded atlas surface");
        Ok(())
    }

    fn destroy_surface(&mut self, surface: DeviceSurface) {
        if !surface.image.valid() {
            return;
        }
        if let Ok(ctx) = self.ctx_mut() {
            ctx.destroy_image(surface.image);
        }
    }
}
