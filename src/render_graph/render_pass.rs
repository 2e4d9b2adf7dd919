//! The pass interface consumed by the host render traversal.

use glam::Vec2;

use crate::error::{OverrideError, Result};
use crate::render_graph::{
    PassKind, QuadDraw, QuadParams, QuadRenderOperation, RenderBackend, SceneDraw, ShaderHandle,
    Surface, TargetPool, TargetRef,
};

/// Which buffers an operation clears before drawing, and to what.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearSpec {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
}

impl ClearSpec {
    /// Draw over whatever is already in the target.
    pub const NONE: ClearSpec = ClearSpec {
        color: None,
        depth: None,
    };

    pub fn color(rgba: [f32; 4]) -> Self {
        Self {
            color: Some(rgba),
            depth: None,
        }
    }

    pub fn color_and_depth(rgba: [f32; 4], depth: f32) -> Self {
        Self {
            color: Some(rgba),
            depth: Some(depth),
        }
    }

    pub fn is_none(&self) -> bool {
        self.color.is_none() && self.depth.is_none()
    }
}

/// The part of the output a quad covers, in normalised `[0, 1]` coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl ViewRect {
    pub const FULL: ViewRect = ViewRect {
        min: Vec2::ZERO,
        max: Vec2::ONE,
    };

    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.clamp(Vec2::ZERO, Vec2::ONE),
            max: max.clamp(Vec2::ZERO, Vec2::ONE),
        }
    }

    /// Pixel rectangle `(x, y, width, height)` for an output of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32, f32, f32) {
        let size = Vec2::new(width as f32, height as f32);
        let min = self.min * size;
        let extent = ((self.max - self.min) * size).max(Vec2::ZERO);
        (min.x, min.y, extent.x, extent.y)
    }
}

impl Default for ViewRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// One operation of the override, as seen by the host frame loop.
///
/// The host asks each operation for its shader, clear policy, and target
/// lists once per frame.
pub trait RenderPass {
    fn kind(&self) -> PassKind;

    fn name(&self) -> &str {
        self.kind().name()
    }

    /// The shader to bind, or `None` for passes the host renders itself.
    fn shader(&self) -> Option<ShaderHandle>;

    fn clear_spec(&self) -> ClearSpec;

    /// Targets sampled by this pass, in binding order.
    fn inputs(&self) -> &[TargetRef];

    /// Targets written by this pass.
    fn outputs(&self) -> &[TargetRef];

    /// The host's name for [`outputs`](Self::outputs).
    fn target_override_list(&self) -> &[TargetRef] {
        self.outputs()
    }
}

pub(crate) fn resolve<'p, T>(pool: &'p TargetPool<T>, target: TargetRef) -> Result<Surface<'p, T>> {
    match target {
        TargetRef::Backbuffer => Ok(Surface::Backbuffer),
        TargetRef::Pool(handle) => pool.get(handle).map(Surface::Target).ok_or_else(|| {
            OverrideError::allocation(format!("#{}", handle.id()), "stale target handle")
        }),
    }
}

/// Renders the host scene into the capture targets.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneCaptureOperation {
    outputs: Vec<TargetRef>,
    clear: ClearSpec,
}

impl SceneCaptureOperation {
    pub fn new(color: TargetRef, depth: Option<TargetRef>, clear: ClearSpec) -> Self {
        let mut outputs = vec![color];
        outputs.extend(depth);
        Self { outputs, clear }
    }

    /// Captures straight into the backbuffer, with no depth target.
    pub fn to_backbuffer(clear: ClearSpec) -> Self {
        Self::new(TargetRef::Backbuffer, None, clear)
    }

    pub fn color(&self) -> TargetRef {
        self.outputs[0]
    }

    pub fn depth(&self) -> Option<TargetRef> {
        self.outputs.get(1).copied()
    }

    pub fn execute<B: RenderBackend>(&self, backend: &mut B, pool: &TargetPool<B::Target>) -> Result<()> {
        let color = resolve(pool, self.color())?;
        let depth = match self.depth() {
            Some(depth) => match resolve(pool, depth)? {
                Surface::Target(t) => Some(t),
                Surface::Backbuffer => None,
            },
            None => None,
        };
        backend.render_scene(SceneDraw {
            color,
            depth,
            clear: self.clear,
        })
    }
}

impl RenderPass for SceneCaptureOperation {
    fn kind(&self) -> PassKind {
        PassKind::SceneCapture
    }

    fn shader(&self) -> Option<ShaderHandle> {
        None
    }

    fn clear_spec(&self) -> ClearSpec {
        self.clear
    }

    fn inputs(&self) -> &[TargetRef] {
        &[]
    }

    fn outputs(&self) -> &[TargetRef] {
        &self.outputs
    }
}

/// Copies the final image of the chain to the viewport backbuffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentOperation {
    shader: Option<ShaderHandle>,
    inputs: [TargetRef; 1],
    outputs: [TargetRef; 1],
}

impl PresentOperation {
    pub fn new(shader: Option<ShaderHandle>, input: TargetRef) -> Self {
        Self {
            shader,
            inputs: [input],
            outputs: [TargetRef::Backbuffer],
        }
    }

    pub fn input(&self) -> TargetRef {
        self.inputs[0]
    }

    /// True when the image is already in the backbuffer and nothing is drawn.
    pub fn is_noop(&self) -> bool {
        self.input() == TargetRef::Backbuffer
    }

    pub fn execute<B: RenderBackend>(&self, backend: &mut B, pool: &TargetPool<B::Target>) -> Result<()> {
        if self.is_noop() {
            return Ok(());
        }
        let shader = self
            .shader
            .ok_or_else(|| OverrideError::shader_load("present", "no shader bound"))?;
        let input = match resolve(pool, self.input())? {
            Surface::Target(t) => t,
            Surface::Backbuffer => return Ok(()),
        };
        let inputs = [input];
        backend.draw_quad(QuadDraw {
            label: "present",
            shader,
            inputs: &inputs,
            output: Surface::Backbuffer,
            clear: ClearSpec::NONE,
            view_rect: ViewRect::FULL,
            params: QuadParams::default(),
        })
    }
}

impl RenderPass for PresentOperation {
    fn kind(&self) -> PassKind {
        PassKind::Present
    }

    fn shader(&self) -> Option<ShaderHandle> {
        self.shader
    }

    fn clear_spec(&self) -> ClearSpec {
        ClearSpec::NONE
    }

    fn inputs(&self) -> &[TargetRef] {
        &self.inputs
    }

    fn outputs(&self) -> &[TargetRef] {
        &self.outputs
    }
}

/// Every operation that can appear in an operation list.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOperation {
    SceneCapture(SceneCaptureOperation),
    Quad(QuadRenderOperation),
    Present(PresentOperation),
}

impl RenderOperation {
    fn as_pass(&self) -> &dyn RenderPass {
        match self {
            RenderOperation::SceneCapture(op) => op,
            RenderOperation::Quad(op) => op,
            RenderOperation::Present(op) => op,
        }
    }

    pub fn as_quad(&self) -> Option<&QuadRenderOperation> {
        match self {
            RenderOperation::Quad(op) => Some(op),
            _ => None,
        }
    }

    pub fn execute<B: RenderBackend>(&self, backend: &mut B, pool: &TargetPool<B::Target>) -> Result<()> {
        match self {
            RenderOperation::SceneCapture(op) => op.execute(backend, pool),
            RenderOperation::Quad(op) => op.execute(backend, pool),
            RenderOperation::Present(op) => op.execute(backend, pool),
        }
    }
}

impl RenderPass for RenderOperation {
    fn kind(&self) -> PassKind {
        self.as_pass().kind()
    }

    fn shader(&self) -> Option<ShaderHandle> {
        self.as_pass().shader()
    }

    fn clear_spec(&self) -> ClearSpec {
        self.as_pass().clear_spec()
    }

    fn inputs(&self) -> &[TargetRef] {
        self.as_pass().inputs()
    }

    fn outputs(&self) -> &[TargetRef] {
        self.as_pass().outputs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::testing::{MockBackend, MockCall};
    use crate::render_graph::{TargetFormat, Viewport};

    #[test]
    fn view_rect_maps_to_pixels() {
        let rect = ViewRect::new(Vec2::new(0.5, 0.0), Vec2::new(1.0, 0.5));
        assert_eq!(rect.to_pixels(200, 100), (100.0, 0.0, 100.0, 50.0));
        assert_eq!(ViewRect::FULL.to_pixels(8, 4), (0.0, 0.0, 8.0, 4.0));
    }

    #[test]
    fn scene_capture_lists_color_and_depth() {
        let mut backend = MockBackend::default();
        let mut pool = TargetPool::new();
        let vp = Viewport::new(32, 32);
        let color = pool.acquire(&mut backend, "c", TargetFormat::Color, vp).unwrap();
        let depth = pool.acquire(&mut backend, "d", TargetFormat::Depth, vp).unwrap();

        let op = SceneCaptureOperation::new(
            TargetRef::Pool(color),
            Some(TargetRef::Pool(depth)),
            ClearSpec::color_and_depth([0.0; 4], 1.0),
        );
        assert_eq!(op.target_override_list().len(), 2);
        assert!(op.shader().is_none());

        op.execute(&mut backend, &pool).unwrap();
        assert_eq!(
            backend.calls,
            vec![MockCall::Scene {
                color: Some("c".into()),
                depth: Some("d".into())
            }]
        );
    }

    #[test]
    fn present_from_backbuffer_draws_nothing() {
        let mut backend = MockBackend::default();
        let pool = TargetPool::new();
        let op = PresentOperation::new(None, TargetRef::Backbuffer);

        assert!(op.is_noop());
        op.execute(&mut backend, &pool).unwrap();
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn present_without_shader_fails_fast() {
        let mut backend = MockBackend::default();
        let mut pool = TargetPool::new();
        let h = pool
            .acquire(&mut backend, "c", TargetFormat::Color, Viewport::new(4, 4))
            .unwrap();
        let op = PresentOperation::new(None, TargetRef::Pool(h));

        let err = op.execute(&mut backend, &pool).unwrap_err();
        assert!(matches!(err, OverrideError::ShaderLoad { .. }));
        assert!(backend.calls.is_empty());
    }
}
