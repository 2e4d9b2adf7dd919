//! Builds the operation list from the current stage settings.
//!
//! ```text
//! scene capture ──▶ fisheye ──▶ swirl ──▶ edge detect ──▶ blend ──▶ present
//!      │              │                       │              ▲
//!      ▼              ▼                       ▼              │
//!  scene.color      ping   ◀──────────▶     pong        scene.color
//! ```
//!
//! Disabled stages are skipped and the next enabled stage reads the last
//! enabled output, so the chain degrades to a passthrough of the scene.

use std::collections::HashMap;

use crate::error::{OverrideError, Result};
use crate::render_graph::{
    ClearSpec, PassKind, PresentOperation, QuadParams, QuadRenderOperation, RenderBackend,
    RenderOperation, RenderPass, SceneCaptureOperation, ShaderHandle, Stage, StageSettings,
    TargetFormat, TargetHandle, TargetPool, TargetRef, Technique, Viewport,
};

pub const SCENE_COLOR_TARGET: &str = "postfx.scene.color";
pub const SCENE_DEPTH_TARGET: &str = "postfx.scene.depth";
pub const PING_TARGET: &str = "postfx.ping";
pub const PONG_TARGET: &str = "postfx.pong";

/// The ordered operations for one pipeline configuration.
///
/// Always starts with the scene capture and ends with the present operation.
/// A new list is produced on every assembly; lists are never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationList {
    generation: u64,
    viewport: Viewport,
    ops: Vec<RenderOperation>,
}

impl OperationList {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderOperation> {
        self.ops.iter()
    }

    pub fn kinds(&self) -> Vec<PassKind> {
        self.ops.iter().map(|op| op.kind()).collect()
    }

    pub fn find(&self, kind: PassKind) -> Option<&RenderOperation> {
        self.ops.iter().find(|op| op.kind() == kind)
    }

    /// True when the scene is rendered straight to the backbuffer.
    pub fn is_passthrough(&self) -> bool {
        matches!(
            self.ops.first(),
            Some(RenderOperation::SceneCapture(op)) if op.color() == TargetRef::Backbuffer
        )
    }

    /// Runs every operation in order.
    ///
    /// The first failure aborts the rest of the frame and is returned.
    pub fn execute<B: RenderBackend>(&self, backend: &mut B, pool: &TargetPool<B::Target>) -> Result<()> {
        for op in &self.ops {
            op.execute(backend, pool)?;
        }
        Ok(())
    }
}

/// Rebuilds [`OperationList`]s and caches the shaders they bind.
pub struct PipelineAssembler {
    techniques: HashMap<Stage, Technique>,
    present: Technique,
    scene_clear: ClearSpec,
    shaders: HashMap<Technique, ShaderHandle>,
    faults: HashMap<Stage, OverrideError>,
    generation: u64,
}

impl Default for PipelineAssembler {
    fn default() -> Self {
        Self::new(HashMap::new(), ClearSpec::color_and_depth([0.0, 0.0, 0.0, 1.0], 1.0))
    }
}

impl PipelineAssembler {
    /// Creates an assembler. Stages missing from `techniques` use the built-in ones.
    pub fn new(techniques: HashMap<Stage, Technique>, scene_clear: ClearSpec) -> Self {
        let techniques = Stage::ALL
            .into_iter()
            .map(|s| {
                let technique = techniques
                    .get(&s)
                    .cloned()
                    .unwrap_or_else(|| Technique::for_stage(s));
                (s, technique)
            })
            .collect();
        Self {
            techniques,
            present: Technique::present(),
            scene_clear,
            shaders: HashMap::new(),
            faults: HashMap::new(),
            generation: 0,
        }
    }

    pub fn technique(&self, stage: Stage) -> &Technique {
        &self.techniques[&stage]
    }

    /// How the scene capture clears its targets.
    pub fn scene_clear(&self) -> ClearSpec {
        self.scene_clear
    }

    /// Stages that were dropped from the last assembly because of a GPU fault.
    pub fn faults(&self) -> &HashMap<Stage, OverrideError> {
        &self.faults
    }

    fn shader<B: RenderBackend>(&mut self, backend: &mut B, technique: &Technique) -> Result<ShaderHandle> {
        if let Some(&handle) = self.shaders.get(technique) {
            return Ok(handle);
        }
        let handle = backend.load_shader(technique)?;
        self.shaders.insert(technique.clone(), handle);
        Ok(handle)
    }

    /// Releases every cached shader so the next assembly recompiles them.
    pub fn reset_shaders<B: RenderBackend>(&mut self, backend: &mut B) {
        for (_, handle) in self.shaders.drain() {
            backend.release_shader(handle);
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn passthrough(&mut self, viewport: Viewport) -> OperationList {
        OperationList {
            generation: self.next_generation(),
            viewport,
            ops: vec![
                RenderOperation::SceneCapture(SceneCaptureOperation::to_backbuffer(self.scene_clear)),
                RenderOperation::Present(PresentOperation::new(None, TargetRef::Backbuffer)),
            ],
        }
    }

    /// Walks the fixed stage order and binds every enabled stage to the
    /// nearest enabled upstream output.
    ///
    /// Stages whose shader or target cannot be created are left out of the
    /// list and recorded in [`faults`](Self::faults). If the capture targets or
    /// the present shader fail, the list degrades to a plain passthrough.
    pub fn assemble<B: RenderBackend>(
        &mut self,
        settings: &StageSettings,
        viewport: Viewport,
        pool: &mut TargetPool<B::Target>,
        backend: &mut B,
    ) -> OperationList {
        self.faults.clear();

        let capture = match self.acquire_capture(pool, backend, viewport) {
            Ok(capture) => capture,
            Err(err) => {
                tracing::warn!(error = %err, "scene capture unavailable; rendering passthrough");
                return self.passthrough(viewport);
            }
        };
        let present_technique = self.present.clone();
        let present_shader = match self.shader(backend, &present_technique) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(error = %err, "present shader unavailable; rendering passthrough");
                return self.passthrough(viewport);
            }
        };

        let (scene_color, scene_depth) = capture;
        let mut ops = vec![RenderOperation::SceneCapture(SceneCaptureOperation::new(
            TargetRef::Pool(scene_color),
            Some(TargetRef::Pool(scene_depth)),
            self.scene_clear,
        ))];

        let mut last = scene_color;
        let mut ping = None;

        for stage in settings.enabled_stages() {
            let technique = self.techniques[&stage].clone();
            let shader = match self.shader(backend, &technique) {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::warn!(stage = %stage, error = %err, "disabling stage");
                    self.faults.insert(stage, err);
                    continue;
                }
            };

            // Alternate between ping and pong so a pass never reads its own output.
            let name = if ping == Some(last) { PONG_TARGET } else { PING_TARGET };
            let output = match pool.acquire(backend, name, TargetFormat::Color, viewport) {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::warn!(stage = %stage, error = %err, "disabling stage");
                    self.faults.insert(stage, err);
                    continue;
                }
            };
            if name == PING_TARGET {
                ping = Some(output);
            }

            let mut inputs = vec![TargetRef::Pool(last)];
            let mut params = QuadParams::default();
            if stage == Stage::Blend {
                inputs.push(TargetRef::Pool(scene_color));
                params.blend = settings.blend();
            }

            let op = QuadRenderOperation::new(stage.into(), technique)
                .with_params(params)
                .bind(shader, inputs, TargetRef::Pool(output));
            ops.push(RenderOperation::Quad(op));
            last = output;
        }

        ops.push(RenderOperation::Present(PresentOperation::new(
            Some(present_shader),
            TargetRef::Pool(last),
        )));

        let list = OperationList {
            generation: self.next_generation(),
            viewport,
            ops,
        };
        tracing::debug!(
            generation = list.generation,
            passes = ?list.kinds(),
            width = viewport.width,
            height = viewport.height,
            "assembled operation list"
        );
        list
    }

    fn acquire_capture<B: RenderBackend>(
        &mut self,
        pool: &mut TargetPool<B::Target>,
        backend: &mut B,
        viewport: Viewport,
    ) -> Result<(TargetHandle, TargetHandle)> {
        let color = pool.acquire(backend, SCENE_COLOR_TARGET, TargetFormat::Color, viewport)?;
        let depth = pool.acquire(backend, SCENE_DEPTH_TARGET, TargetFormat::Depth, viewport)?;
        Ok((color, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::testing::{MockBackend, MockCall};

    const VP: Viewport = Viewport {
        width: 320,
        height: 240,
    };

    fn assemble(settings: &StageSettings) -> (OperationList, TargetPool<String>, MockBackend) {
        let mut backend = MockBackend::default();
        let mut pool = TargetPool::new();
        let mut assembler = PipelineAssembler::default();
        let list = assembler.assemble(settings, VP, &mut pool, &mut backend);
        (list, pool, backend)
    }

    fn all_subsets() -> Vec<Vec<Stage>> {
        (0..16u8)
            .map(|mask| {
                Stage::ALL
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, s)| s)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn list_length_tracks_enabled_stages() {
        for enabled in all_subsets() {
            let (list, _, _) = assemble(&StageSettings::only(&enabled));
            let kinds = list.kinds();

            assert_eq!(list.len(), enabled.len() + 2, "enabled: {enabled:?}");
            assert_eq!(kinds.first(), Some(&PassKind::SceneCapture));
            assert_eq!(kinds.last(), Some(&PassKind::Present));
        }
    }

    #[test]
    fn no_operation_reads_its_own_output() {
        for enabled in all_subsets() {
            let (list, _, _) = assemble(&StageSettings::only(&enabled));
            for op in list.iter() {
                for output in op.outputs() {
                    assert!(!op.inputs().contains(output), "{:?} in {enabled:?}", op.kind());
                }
            }
        }
    }

    #[test]
    fn inputs_follow_the_nearest_enabled_output() {
        for enabled in all_subsets() {
            let (list, _, _) = assemble(&StageSettings::only(&enabled));
            let ops: Vec<_> = list.iter().collect();
            for pair in ops.windows(2) {
                assert_eq!(pair[1].inputs()[0], pair[0].outputs()[0]);
            }
        }
    }

    #[test]
    fn all_disabled_presents_the_capture() {
        let (list, pool, mut backend) = assemble(&StageSettings::none());
        let capture = list.find(PassKind::SceneCapture).unwrap();
        let present = list.find(PassKind::Present).unwrap();

        assert_eq!(present.inputs(), &capture.outputs()[..1]);

        list.execute(&mut backend, &pool).unwrap();
        assert_eq!(
            backend.draws(),
            vec![MockCall::Quad {
                label: "present".into(),
                inputs: vec![SCENE_COLOR_TARGET.into()],
                output: None,
                blend: 1.0,
            }]
        );
    }

    #[test]
    fn fisheye_and_blend_scenario() {
        let mut settings = StageSettings::only(&[Stage::Fisheye, Stage::Blend]);
        settings.set_parameter(Stage::Blend, 0.25).unwrap();
        let (list, pool, mut backend) = assemble(&settings);

        assert_eq!(
            list.kinds(),
            vec![
                PassKind::SceneCapture,
                PassKind::Fisheye,
                PassKind::Blend,
                PassKind::Present
            ]
        );
        let fisheye = list.find(PassKind::Fisheye).unwrap();
        let blend = list.find(PassKind::Blend).unwrap();
        assert_eq!(fisheye.outputs()[0], blend.inputs()[0]);
        assert_eq!(blend.as_quad().unwrap().params().blend, 0.25);
        assert_eq!(fisheye.as_quad().unwrap().params().blend, 1.0);
        assert!(list.find(PassKind::Swirl).is_none());
        assert!(list.find(PassKind::EdgeDetect).is_none());

        list.execute(&mut backend, &pool).unwrap();
        assert_eq!(
            backend.draws()[1],
            MockCall::Quad {
                label: "blend".into(),
                inputs: vec![PING_TARGET.into(), SCENE_COLOR_TARGET.into()],
                output: Some(PONG_TARGET.into()),
                blend: 0.25,
            }
        );
    }

    #[test]
    fn pool_is_bounded_to_capture_plus_ping_pong() {
        let (_, pool, _) = assemble(&StageSettings::only(&Stage::ALL));
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn shader_fault_drops_only_that_stage() {
        let mut backend = MockBackend::default();
        backend.fail_techniques.insert("swirl".into());
        let mut pool = TargetPool::new();
        let mut assembler = PipelineAssembler::default();

        let list = assembler.assemble(&StageSettings::only(&Stage::ALL), VP, &mut pool, &mut backend);

        assert_eq!(
            list.kinds(),
            vec![
                PassKind::SceneCapture,
                PassKind::Fisheye,
                PassKind::EdgeDetect,
                PassKind::Blend,
                PassKind::Present
            ]
        );
        assert!(matches!(
            assembler.faults().get(&Stage::Swirl),
            Some(OverrideError::ShaderLoad { .. })
        ));

        backend.fail_techniques.clear();
        let list = assembler.assemble(&StageSettings::only(&Stage::ALL), VP, &mut pool, &mut backend);
        assert_eq!(list.len(), 6);
        assert!(assembler.faults().is_empty());
    }

    #[test]
    fn capture_allocation_failure_falls_back_to_passthrough() {
        let mut backend = MockBackend::default();
        backend.fail_targets.insert(SCENE_COLOR_TARGET.into());
        let mut pool = TargetPool::new();
        let mut assembler = PipelineAssembler::default();

        let list = assembler.assemble(&StageSettings::default(), VP, &mut pool, &mut backend);

        assert!(list.is_passthrough());
        assert_eq!(list.kinds(), vec![PassKind::SceneCapture, PassKind::Present]);
        list.execute(&mut backend, &pool).unwrap();
        assert_eq!(
            backend.calls,
            vec![MockCall::Scene {
                color: None,
                depth: None
            }]
        );
    }

    #[test]
    fn stage_target_failure_disables_stage() {
        let mut backend = MockBackend::default();
        backend.fail_targets.insert(PONG_TARGET.into());
        let mut pool = TargetPool::new();
        let mut assembler = PipelineAssembler::default();

        let list = assembler.assemble(
            &StageSettings::only(&[Stage::Fisheye, Stage::Swirl]),
            VP,
            &mut pool,
            &mut backend,
        );

        assert_eq!(
            list.kinds(),
            vec![PassKind::SceneCapture, PassKind::Fisheye, PassKind::Present]
        );
        assert!(matches!(
            assembler.faults().get(&Stage::Swirl),
            Some(OverrideError::Allocation { .. })
        ));
    }

    #[test]
    fn shaders_are_cached_until_reset() {
        let mut backend = MockBackend::default();
        let mut pool = TargetPool::new();
        let mut assembler = PipelineAssembler::default();
        let settings = StageSettings::only(&[Stage::Fisheye]);

        assembler.assemble(&settings, VP, &mut pool, &mut backend);
        assembler.assemble(&settings, VP, &mut pool, &mut backend);
        assert_eq!(backend.shaders_loaded, 2);

        assembler.reset_shaders(&mut backend);
        assert!(backend.shaders.is_empty());
        assembler.assemble(&settings, VP, &mut pool, &mut backend);
        assert_eq!(backend.shaders_loaded, 4);
    }

    #[test]
    fn resize_rebinds_to_new_sized_targets() {
        let mut backend = MockBackend::default();
        let mut pool = TargetPool::new();
        let mut assembler = PipelineAssembler::default();
        let settings = StageSettings::only(&Stage::ALL);

        let before = assembler.assemble(&settings, VP, &mut pool, &mut backend);
        let resized = Viewport::new(1024, 768);
        let after = assembler.assemble(&settings, resized, &mut pool, &mut backend);

        assert_ne!(before.generation(), after.generation());
        for op in after.iter() {
            for target in op.inputs().iter().chain(op.outputs()) {
                if let Some(handle) = target.handle() {
                    assert_eq!(pool.desc(handle).unwrap().viewport(), resized);
                }
            }
        }
        for op in before.iter() {
            for target in op.outputs() {
                if let Some(handle) = target.handle() {
                    assert!(pool.get(handle).is_none());
                }
            }
        }
    }
}
