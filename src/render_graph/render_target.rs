//! Render target descriptions, handles, and the wgpu-backed target resource.

use crate::gpu::GpuContext;

/// What a render target stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    /// A colour buffer in the presentation format, sampleable by later passes.
    Color,
    /// A depth buffer used while rendering the scene.
    Depth,
}

/// Size of the viewport the override is drawing into, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Everything needed to allocate a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetDesc {
    pub name: String,
    pub format: TargetFormat,
    pub width: u32,
    pub height: u32,
}

impl TargetDesc {
    pub fn new(name: impl Into<String>, format: TargetFormat, viewport: Viewport) -> Self {
        Self {
            name: name.into(),
            format,
            width: viewport.width,
            height: viewport.height,
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }
}

/// Opaque handle to a pooled target.
///
/// Every allocation gets a fresh id, so a handle to a target that has since
/// been reallocated (for example after a resize) no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetHandle(pub(crate) u64);

impl TargetHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Where an operation reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRef {
    /// A target owned by the override's pool.
    Pool(TargetHandle),
    /// The host viewport's own colour buffer.
    Backbuffer,
}

impl TargetRef {
    pub fn handle(self) -> Option<TargetHandle> {
        match self {
            TargetRef::Pool(handle) => Some(handle),
            TargetRef::Backbuffer => None,
        }
    }
}

/// An off-screen wgpu texture used for intermediate pass results.
///
/// Colour targets use the surface format with `RENDER_ATTACHMENT` and
/// `TEXTURE_BINDING` usage so a pass can write one and the next pass can
/// sample it. Depth targets are attachment-only.
pub struct RenderTarget {
    /// The underlying GPU texture that stores pixel data.
    pub texture: wgpu::Texture,
    /// A view into the texture, used for attachments and shader sampling.
    pub view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// The texture format used for depth targets.
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Creates a target matching `desc`.
    ///
    /// Callers are expected to reject zero-sized descriptors first; wgpu treats
    /// them as a validation error.
    pub fn new(gpu: &GpuContext, desc: &TargetDesc) -> Self {
        let (format, usage) = match desc.format {
            TargetFormat::Color => (
                gpu.config.format,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            ),
            TargetFormat::Depth => (Self::DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT),
        };

        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.name),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width: desc.width,
            height: desc.height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}
