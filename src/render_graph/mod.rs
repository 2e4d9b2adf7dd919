//! The render-override pipeline: a fixed chain of full-screen passes layered
//! over the host's scene render.
//!
//! # Architecture
//!
//! The pipeline is linear and its topology is fixed. Only the enabled flag of
//! each stage and the blend factor change at runtime:
//!
//! ```text
//! ┌─────────────┐   ┌─────────┐   ┌───────┐   ┌─────────────┐   ┌───────┐   ┌─────────┐
//! │SceneCapture │──▶│ Fisheye │──▶│ Swirl │──▶│ Edge Detect │──▶│ Blend │──▶│ Present │
//! └─────────────┘   └─────────┘   └───────┘   └─────────────┘   └───────┘   └─────────┘
//!       │                 ▲ ping ◀──────▶ pong ▲                    ▲
//!       └──────────────────────── scene.color ──────────────────────┘
//! ```
//!
//! - [`TargetPool`] owns the capture buffers and the two ping-pong targets.
//! - [`QuadRenderOperation`] draws one full-screen quad with one technique.
//! - [`PipelineAssembler`] turns [`StageSettings`] into an [`OperationList`],
//!   skipping disabled stages and rebinding targets around them.
//! - [`RenderBackend`] is the host: it allocates targets, compiles shaders,
//!   renders the scene, and draws quads.
//!
//! # Example
//!
//! ```ignore
//! let mut assembler = PipelineAssembler::default();
//! let mut pool = TargetPool::new();
//! let list = assembler.assemble(&settings, viewport, &mut pool, &mut backend);
//! list.execute(&mut backend, &pool)?;
//! ```

mod assembler;
mod backend;
mod quad_render;
mod render_pass;
mod render_target;
mod stage;
mod target_pool;

#[cfg(test)]
pub(crate) mod testing;

pub use assembler::{
    OperationList, PING_TARGET, PONG_TARGET, PipelineAssembler, SCENE_COLOR_TARGET,
    SCENE_DEPTH_TARGET,
};
pub use backend::{QuadDraw, QuadParams, RenderBackend, SceneDraw, ShaderHandle, Surface};
pub use quad_render::QuadRenderOperation;
pub use render_pass::{
    ClearSpec, PresentOperation, RenderOperation, RenderPass, SceneCaptureOperation, ViewRect,
};
pub use render_target::{RenderTarget, TargetDesc, TargetFormat, TargetHandle, TargetRef, Viewport};
pub use stage::{PassKind, Stage, StageSettings, Technique, clamp_unit};
pub use target_pool::TargetPool;
