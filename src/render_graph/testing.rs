//! A recording backend for unit tests.

use std::collections::{HashMap, HashSet};

use crate::error::{OverrideError, Result};
use crate::render_graph::{
    QuadDraw, RenderBackend, SceneDraw, ShaderHandle, Surface, TargetDesc, Technique,
};

/// What the mock saw, with targets identified by name.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Scene {
        color: Option<String>,
        depth: Option<String>,
    },
    Quad {
        label: String,
        inputs: Vec<String>,
        output: Option<String>,
        blend: f32,
    },
}

/// Targets are their own names, so assertions can read them directly.
#[derive(Default)]
pub struct MockBackend {
    pub created: usize,
    pub destroyed: usize,
    pub fail_targets: HashSet<String>,
    pub fail_techniques: HashSet<String>,
    /// Quad labels whose draw fails as if a bound target had gone away.
    pub fail_draws: HashSet<String>,
    pub shaders: HashMap<u32, Technique>,
    pub shaders_loaded: usize,
    pub calls: Vec<MockCall>,
    next_shader: u32,
}

impl MockBackend {
    pub fn live_targets(&self) -> usize {
        self.created - self.destroyed
    }

    pub fn draws(&self) -> Vec<MockCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c, MockCall::Quad { .. }))
            .cloned()
            .collect()
    }
}

fn surface_name(surface: Surface<'_, String>) -> Option<String> {
    match surface {
        Surface::Target(name) => Some(name.clone()),
        Surface::Backbuffer => None,
    }
}

impl RenderBackend for MockBackend {
    type Target = String;

    fn create_target(&mut self, desc: &TargetDesc) -> Result<String> {
        if self.fail_targets.contains(&desc.name) {
            return Err(OverrideError::allocation(&desc.name, "mock allocation failure"));
        }
        self.created += 1;
        Ok(desc.name.clone())
    }

    fn destroy_target(&mut self, _target: String) {
        self.destroyed += 1;
    }

    fn load_shader(&mut self, technique: &Technique) -> Result<ShaderHandle> {
        if self.fail_techniques.contains(&technique.effect) {
            return Err(OverrideError::shader_load(technique.to_string(), "mock compile failure"));
        }
        self.next_shader += 1;
        self.shaders_loaded += 1;
        self.shaders.insert(self.next_shader, technique.clone());
        Ok(ShaderHandle(self.next_shader))
    }

    fn release_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader.0);
    }

    fn render_scene(&mut self, draw: SceneDraw<'_, String>) -> Result<()> {
        self.calls.push(MockCall::Scene {
            color: surface_name(draw.color),
            depth: draw.depth.cloned(),
        });
        Ok(())
    }

    fn draw_quad(&mut self, draw: QuadDraw<'_, String>) -> Result<()> {
        if self.fail_draws.contains(draw.label) {
            let output = surface_name(draw.output).unwrap_or_default();
            return Err(OverrideError::allocation(output, "mock draw failure"));
        }
        self.calls.push(MockCall::Quad {
            label: draw.label.to_string(),
            inputs: draw.inputs.iter().map(|s| (*s).clone()).collect(),
            output: surface_name(draw.output),
            blend: draw.params.blend,
        });
        Ok(())
    }
}
