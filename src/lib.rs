//! # postfx
//!
//! **A render override for 3D viewports: the host's scene, run through a chain
//! of full-screen post-process passes.**
//!
//! The chain is fixed: scene capture, fisheye, swirl, edge detect, blend,
//! present. Each of the four effect stages can be switched on or off at
//! runtime, and the blend factor mixes the processed image back over the
//! captured scene. Disabled stages are skipped entirely and the remaining
//! passes are rewired around them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use postfx::*;
//!
//! # fn demo(window: Arc<winit::window::Window>) -> postfx::Result<()> {
//! let gpu = GpuContext::new(window.clone())?;
//! let mut backend = WgpuBackend::new(gpu, ShaderLibrary::new())?;
//!
//! let mut registry = OverrideRegistry::new();
//! let mut postfx = OverrideController::new(OverrideConfig::new().blend(0.7))
//!     .with_redraw(window);
//! postfx.register(&mut registry)?;
//!
//! // From anywhere, including other threads:
//! registry.find("postfx")?.set_enabled("swirl", true)?;
//!
//! // Once per frame:
//! backend.begin_frame(0.0)?;
//! let viewport = backend.gpu().viewport();
//! postfx.render(&mut backend, viewport)?;
//! backend.end_frame();
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! - [`render_graph`]: stages, targets, passes and the assembler. Knows nothing
//!   about wgpu; everything GPU-facing goes through [`RenderBackend`].
//! - [`OverrideController`] / [`ControlHandle`]: lifecycle and the thread-safe
//!   control surface.
//! - [`WgpuBackend`]: the wgpu implementation of [`RenderBackend`].

mod config;
mod controller;
mod error;
mod gpu;
mod refresh;
mod registry;
pub mod render_graph;
mod scene_pass;
mod shader_library;
mod wgpu_backend;

pub use config::OverrideConfig;
pub use controller::{ControlHandle, OverrideController, OverrideState};
pub use error::{OverrideError, Result};
pub use gpu::GpuContext;
pub use refresh::{RedrawRequester, RefreshTrigger};
pub use registry::OverrideRegistry;
pub use render_graph::{
    ClearSpec, OperationList, PassKind, PipelineAssembler, RenderBackend, RenderOperation,
    RenderPass, RenderTarget, Stage, StageSettings, TargetPool, Technique, ViewRect, Viewport,
};
pub use scene_pass::{ScenePass, SceneUniforms};
pub use shader_library::ShaderLibrary;
pub use wgpu_backend::{QuadUniforms, WgpuBackend};
