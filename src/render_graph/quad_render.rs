//! The full-screen quad operation, the atomic unit of the effect chain.

use crate::error::{OverrideError, Result};
use crate::render_graph::render_pass::resolve;
use crate::render_graph::{
    ClearSpec, PassKind, QuadDraw, QuadParams, RenderBackend, RenderPass, ShaderHandle, Surface,
    TargetPool, TargetRef, Technique, ViewRect,
};

/// A single full-screen quad draw bound to one shader technique.
///
/// The static part (kind, technique, clear policy, view rectangle) is fixed
/// when the operation is created. The shader handle and target bindings are
/// supplied by the assembler each time the pipeline is rebuilt; nothing is
/// carried over from one assembly to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadRenderOperation {
    kind: PassKind,
    technique: Technique,
    clear: ClearSpec,
    view_rect: ViewRect,
    shader: Option<ShaderHandle>,
    inputs: Vec<TargetRef>,
    outputs: [TargetRef; 1],
    params: QuadParams,
}

impl QuadRenderOperation {
    /// Creates an unbound operation that writes to the backbuffer until rebound.
    pub fn new(kind: PassKind, technique: Technique) -> Self {
        Self {
            kind,
            technique,
            clear: ClearSpec::color([0.0, 0.0, 0.0, 1.0]),
            view_rect: ViewRect::FULL,
            shader: None,
            inputs: Vec::new(),
            outputs: [TargetRef::Backbuffer],
            params: QuadParams::default(),
        }
    }

    pub fn with_clear(mut self, clear: ClearSpec) -> Self {
        self.clear = clear;
        self
    }

    pub fn with_view_rect(mut self, view_rect: ViewRect) -> Self {
        self.view_rect = view_rect;
        self
    }

    pub fn with_params(mut self, params: QuadParams) -> Self {
        self.params = params;
        self
    }

    /// Binds the compiled shader and the targets this operation reads and writes.
    pub fn bind(mut self, shader: ShaderHandle, inputs: Vec<TargetRef>, output: TargetRef) -> Self {
        self.shader = Some(shader);
        self.inputs = inputs;
        self.outputs = [output];
        self
    }

    pub fn technique(&self) -> &Technique {
        &self.technique
    }

    pub fn view_rect(&self) -> ViewRect {
        self.view_rect
    }

    pub fn params(&self) -> QuadParams {
        self.params
    }

    pub fn output(&self) -> TargetRef {
        self.outputs[0]
    }

    /// Binds the shader and inputs, clears, and draws one quad into the output.
    ///
    /// Fails with [`OverrideError::ShaderLoad`] if no shader is bound rather than
    /// drawing with whatever pipeline happens to be current.
    pub fn execute<B: RenderBackend>(&self, backend: &mut B, pool: &TargetPool<B::Target>) -> Result<()> {
        let shader = self.shader.ok_or_else(|| {
            OverrideError::shader_load(self.technique.to_string(), "no shader bound")
        })?;

        let mut inputs = Vec::with_capacity(self.inputs.len());
        for &input in &self.inputs {
            match resolve(pool, input)? {
                Surface::Target(t) => inputs.push(t),
                Surface::Backbuffer => {
                    return Err(OverrideError::allocation(
                        "backbuffer",
                        format!("{} cannot sample the backbuffer", self.kind.name()),
                    ));
                }
            }
        }
        let output = resolve(pool, self.output())?;

        backend.draw_quad(QuadDraw {
            label: self.kind.name(),
            shader,
            inputs: &inputs,
            output,
            clear: self.clear,
            view_rect: self.view_rect,
            params: self.params,
        })
    }
}

impl RenderPass for QuadRenderOperation {
    fn kind(&self) -> PassKind {
        self.kind
    }

    fn shader(&self) -> Option<ShaderHandle> {
        self.shader
    }

    fn clear_spec(&self) -> ClearSpec {
        self.clear
    }

    fn inputs(&self) -> &[TargetRef] {
        &self.inputs
    }

    fn outputs(&self) -> &[TargetRef] {
        &self.outputs
    }
}
