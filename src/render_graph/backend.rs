//! The host side of the override: the GPU operations the pipeline asks for.

use crate::error::Result;
use crate::render_graph::render_pass::{ClearSpec, ViewRect};
use crate::render_graph::{TargetDesc, Technique};

/// Handle to a compiled shader technique owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

/// Where a draw writes its colour output.
#[derive(Debug)]
pub enum Surface<'a, T> {
    Target(&'a T),
    Backbuffer,
}

impl<T> Clone for Surface<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Surface<'_, T> {}

/// Per-draw shader parameters, uploaded as uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadParams {
    /// Weight of the effect chain against the captured scene, in `[0, 1]`.
    pub blend: f32,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self { blend: 1.0 }
    }
}

/// A single full-screen quad draw.
pub struct QuadDraw<'a, T> {
    /// Debug label for the pass.
    pub label: &'a str,
    pub shader: ShaderHandle,
    /// Sampled inputs in binding order.
    pub inputs: &'a [&'a T],
    pub output: Surface<'a, T>,
    pub clear: ClearSpec,
    pub view_rect: ViewRect,
    pub params: QuadParams,
}

/// The host's normal scene render, redirected into the capture targets.
pub struct SceneDraw<'a, T> {
    pub color: Surface<'a, T>,
    pub depth: Option<&'a T>,
    pub clear: ClearSpec,
}

/// The GPU operations the override needs from its host renderer.
///
/// All methods are called from the rendering thread only.
pub trait RenderBackend {
    /// The GPU resource backing one render target.
    type Target;

    /// Allocates a target. Fails with [`OverrideError::Allocation`](crate::OverrideError::Allocation).
    fn create_target(&mut self, desc: &TargetDesc) -> Result<Self::Target>;

    /// Frees a target previously returned by [`create_target`](Self::create_target).
    fn destroy_target(&mut self, target: Self::Target);

    /// Compiles a technique. Fails with [`OverrideError::ShaderLoad`](crate::OverrideError::ShaderLoad).
    fn load_shader(&mut self, technique: &Technique) -> Result<ShaderHandle>;

    /// Drops a shader returned by [`load_shader`](Self::load_shader).
    fn release_shader(&mut self, shader: ShaderHandle);

    /// Renders the regular scene.
    fn render_scene(&mut self, draw: SceneDraw<'_, Self::Target>) -> Result<()>;

    /// Draws one full-screen quad.
    fn draw_quad(&mut self, draw: QuadDraw<'_, Self::Target>) -> Result<()>;
}
