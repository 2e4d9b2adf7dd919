//! The long-lived override bound to one viewport, and its control surface.
//!
//! Control calls may come from any thread. They only ever touch a single
//! staging cell; the frame loop reads and clears that cell once per frame in
//! [`OverrideController::on_frame_begin`], so a configuration change is never
//! observed half-way through a frame.
//!
//! ```text
//!  ControlHandle ──set──▶ [staging cell] ──take once per frame──▶ PipelineAssembler
//!        │                                                            │
//!        └──▶ RefreshTrigger ──▶ host redraw               OperationList ──▶ RenderBackend
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::OverrideConfig;
use crate::error::{OverrideError, Result};
use crate::refresh::{RedrawRequester, RefreshTrigger};
use crate::registry::OverrideRegistry;
use crate::render_graph::{
    OperationList, PipelineAssembler, RenderBackend, SceneCaptureOperation, Stage, StageSettings,
    TargetPool, Viewport,
};

/// Lifecycle of an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideState {
    /// Created but not yet registered with a viewport.
    Unregistered,
    /// Registered, and the current operation list matches the settings.
    Idle,
    /// Registered, with a configuration change waiting for the next frame.
    Dirty,
    /// Unregistered for good. Every resource has been released.
    Terminated,
}

#[derive(Debug, Clone, Copy)]
struct StagingCell {
    state: OverrideState,
    settings: StageSettings,
    reload_shaders: bool,
}

struct Pending {
    settings: StageSettings,
    reload_shaders: bool,
}

struct Shared {
    name: String,
    cell: Mutex<StagingCell>,
    refresh: RefreshTrigger,
}

impl Shared {
    /// Applies `f` to the settings of a registered override, marking it dirty
    /// and requesting a redraw if `f` reports a change.
    fn update(&self, f: impl FnOnce(&mut StagingCell) -> Result<bool>) -> Result<()> {
        let changed = {
            let mut cell = self.cell.lock();
            self.check_registered(&cell)?;
            let changed = f(&mut *cell)?;
            if changed {
                cell.state = OverrideState::Dirty;
            }
            changed
        };
        if changed {
            self.refresh.request_refresh();
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&StagingCell) -> Result<T>) -> Result<T> {
        let cell = self.cell.lock();
        self.check_registered(&cell)?;
        f(&*cell)
    }

    fn ensure_registered(&self) -> Result<()> {
        self.check_registered(&self.cell.lock())
    }

    fn check_registered(&self, cell: &StagingCell) -> Result<()> {
        match cell.state {
            OverrideState::Idle | OverrideState::Dirty => Ok(()),
            OverrideState::Unregistered | OverrideState::Terminated => {
                Err(OverrideError::NotRegistered(self.name.clone()))
            }
        }
    }

    fn take_pending(&self) -> Option<Pending> {
        let mut cell = self.cell.lock();
        if cell.state != OverrideState::Dirty {
            return None;
        }
        cell.state = OverrideState::Idle;
        let pending = Pending {
            settings: cell.settings,
            reload_shaders: cell.reload_shaders,
        };
        cell.reload_shaders = false;
        Some(pending)
    }
}

/// Thread-safe control surface of one override.
///
/// Cloned out of the [`OverrideRegistry`] by command layers. Setters take
/// effect at the next frame; getters return the most recently set values.
#[derive(Clone)]
pub struct ControlHandle {
    shared: Arc<Shared>,
}

impl ControlHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> OverrideState {
        self.shared.cell.lock().state
    }

    pub fn is_dirty(&self) -> bool {
        self.state() == OverrideState::Dirty
    }

    /// True when both handles control the same override instance.
    pub(crate) fn is_same(&self, other: &ControlHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Enables or disables a stage by name.
    pub fn set_enabled(&self, stage: &str, enabled: bool) -> Result<()> {
        self.shared.ensure_registered()?;
        self.set_stage_enabled(Stage::from_name(stage)?, enabled)
    }

    pub fn set_stage_enabled(&self, stage: Stage, enabled: bool) -> Result<()> {
        self.shared
            .update(|cell| Ok(cell.settings.set_enabled(stage, enabled)))
    }

    pub fn enabled(&self, stage: &str) -> Result<bool> {
        self.shared.ensure_registered()?;
        self.stage_enabled(Stage::from_name(stage)?)
    }

    pub fn stage_enabled(&self, stage: Stage) -> Result<bool> {
        self.shared.read(|cell| Ok(cell.settings.is_enabled(stage)))
    }

    /// Sets a stage parameter by name. Out-of-range values are clamped.
    ///
    /// Fails with [`OverrideError::UnknownStage`] if the stage declares no parameter.
    pub fn set_parameter(&self, stage: &str, value: f32) -> Result<()> {
        self.shared.ensure_registered()?;
        self.set_stage_parameter(Stage::from_name(stage)?, value)
    }

    pub fn set_stage_parameter(&self, stage: Stage, value: f32) -> Result<()> {
        self.shared
            .update(|cell| cell.settings.set_parameter(stage, value))
    }

    pub fn parameter(&self, stage: &str) -> Result<f32> {
        self.shared.ensure_registered()?;
        self.stage_parameter(Stage::from_name(stage)?)
    }

    pub fn stage_parameter(&self, stage: Stage) -> Result<f32> {
        self.shared.read(|cell| cell.settings.parameter(stage))
    }

    /// Drops every compiled shader; they are reloaded at the next frame.
    pub fn reload_shaders(&self) -> Result<()> {
        self.shared.update(|cell| {
            cell.reload_shaders = true;
            Ok(true)
        })
    }

    /// Snapshot of the requested settings.
    pub fn settings(&self) -> Result<StageSettings> {
        self.shared.read(|cell| Ok(cell.settings))
    }

    pub fn refresh(&self) -> &RefreshTrigger {
        &self.shared.refresh
    }
}

/// A render override bound to one viewport.
///
/// Owns the target pool and the assembler for that viewport. GPU resources
/// are released explicitly by [`unregister`](Self::unregister), which needs
/// the backend that created them.
pub struct OverrideController<B: RenderBackend> {
    handle: ControlHandle,
    assembler: PipelineAssembler,
    pool: TargetPool<B::Target>,
    live: StageSettings,
    operations: Option<OperationList>,
}

impl<B: RenderBackend> OverrideController<B> {
    pub fn new(config: OverrideConfig) -> Self {
        let shared = Shared {
            name: config.name,
            cell: Mutex::new(StagingCell {
                state: OverrideState::Unregistered,
                settings: config.settings,
                reload_shaders: false,
            }),
            refresh: RefreshTrigger::detached(),
        };
        Self {
            handle: ControlHandle {
                shared: Arc::new(shared),
            },
            assembler: PipelineAssembler::new(config.techniques, config.scene_clear),
            pool: TargetPool::new(),
            live: config.settings,
            operations: None,
        }
    }

    /// Routes refresh requests to the host.
    pub fn with_redraw(self, requester: Arc<dyn RedrawRequester>) -> Self {
        self.handle.shared.refresh.attach(requester);
        self
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> OverrideState {
        self.handle.state()
    }

    /// Registers the override so control calls can find it by name.
    ///
    /// A terminated override cannot be registered again.
    pub fn register(&mut self, registry: &mut OverrideRegistry) -> Result<()> {
        match self.state() {
            OverrideState::Unregistered => {}
            OverrideState::Idle | OverrideState::Dirty => {
                return Err(OverrideError::AlreadyRegistered(self.name().to_string()));
            }
            OverrideState::Terminated => {
                return Err(OverrideError::NotRegistered(self.name().to_string()));
            }
        }
        registry.insert(self.handle())?;
        self.handle.shared.cell.lock().state = OverrideState::Idle;
        tracing::info!(name = self.name(), "registered render override");
        Ok(())
    }

    /// Removes the override from the registry and releases every GPU resource.
    pub fn unregister(&mut self, registry: &mut OverrideRegistry, backend: &mut B) {
        registry.remove(&self.handle);
        self.handle.shared.cell.lock().state = OverrideState::Terminated;
        self.operations = None;
        self.pool.release_all(backend);
        self.assembler.reset_shaders(backend);
        tracing::info!(name = self.name(), "unregistered render override");
    }

    pub fn set_enabled(&self, stage: &str, enabled: bool) -> Result<()> {
        self.handle.set_enabled(stage, enabled)
    }

    pub fn enabled(&self, stage: &str) -> Result<bool> {
        self.handle.enabled(stage)
    }

    pub fn set_parameter(&self, stage: &str, value: f32) -> Result<()> {
        self.handle.set_parameter(stage, value)
    }

    pub fn parameter(&self, stage: &str) -> Result<f32> {
        self.handle.parameter(stage)
    }

    pub fn reload_shaders(&self) -> Result<()> {
        self.handle.reload_shaders()
    }

    /// Frame-start hook: applies pending configuration and returns the
    /// operation list for this frame.
    ///
    /// The list is rebuilt when the configuration changed, when the viewport
    /// size changed, or when there is no list yet. Otherwise the previous list
    /// is reused as is.
    pub fn on_frame_begin(&mut self, backend: &mut B, viewport: Viewport) -> Result<&OperationList> {
        self.handle.shared.ensure_registered()?;
        self.handle.shared.refresh.frame_begun();

        let pending = self.handle.shared.take_pending();
        let reconfigured = pending.is_some();
        if let Some(pending) = pending {
            self.live = pending.settings;
            if pending.reload_shaders {
                self.assembler.reset_shaders(backend);
            }
        }

        let list = match self.operations.take() {
            Some(list) if !reconfigured && list.viewport() == viewport => list,
            _ => self
                .assembler
                .assemble(&self.live, viewport, &mut self.pool, backend),
        };
        Ok(self.operations.insert(list))
    }

    /// Runs one frame: [`on_frame_begin`](Self::on_frame_begin) then every operation in order.
    ///
    /// If an operation fails the rest of the list is skipped, the scene is
    /// rendered straight to the backbuffer for this frame, and the list is
    /// rebuilt on the next frame.
    pub fn render(&mut self, backend: &mut B, viewport: Viewport) -> Result<()> {
        self.on_frame_begin(backend, viewport)?;
        let Some(list) = &self.operations else {
            return Ok(());
        };
        tracing::trace!(generation = list.generation(), "executing operation list");
        if let Err(err) = list.execute(backend, &self.pool) {
            tracing::warn!(error = %err, "frame aborted; rebuilding pipeline next frame");
            self.operations = None;
            let passthrough = SceneCaptureOperation::to_backbuffer(self.assembler.scene_clear());
            if let Err(fallback) = passthrough.execute(backend, &self.pool) {
                tracing::warn!(error = %fallback, "passthrough fallback failed");
            }
            return Err(err);
        }
        Ok(())
    }

    /// The list built at the last frame start, if any.
    pub fn operations(&self) -> Option<&OperationList> {
        self.operations.as_ref()
    }

    /// The settings the current operation list was built from.
    pub fn live_settings(&self) -> &StageSettings {
        &self.live
    }

    pub fn pool(&self) -> &TargetPool<B::Target> {
        &self.pool
    }

    /// Stages dropped from the current list because of a GPU fault.
    pub fn faults(&self) -> &HashMap<Stage, OverrideError> {
        self.assembler.faults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::testing::{MockBackend, MockCall};
    use crate::render_graph::{PassKind, RenderPass, SCENE_COLOR_TARGET, SCENE_DEPTH_TARGET};

    const VP: Viewport = Viewport {
        width: 640,
        height: 360,
    };

    fn registered() -> (OverrideController<MockBackend>, OverrideRegistry, MockBackend) {
        let mut registry = OverrideRegistry::new();
        let mut controller = OverrideController::new(OverrideConfig::new());
        controller.register(&mut registry).unwrap();
        (controller, registry, MockBackend::default())
    }

    #[test]
    fn queries_before_register_fail() {
        let controller = OverrideController::<MockBackend>::new(OverrideConfig::new());

        assert_eq!(controller.state(), OverrideState::Unregistered);
        assert_eq!(
            controller.enabled("swirl").unwrap_err(),
            OverrideError::NotRegistered("postfx".into())
        );
        assert!(controller.set_parameter("blend", 0.3).is_err());
    }

    #[test]
    fn setters_move_idle_to_dirty_and_frames_clear_it() {
        let (mut controller, _registry, mut backend) = registered();
        assert_eq!(controller.state(), OverrideState::Idle);

        controller.set_enabled("swirl", true).unwrap();
        assert_eq!(controller.state(), OverrideState::Dirty);
        assert!(controller.handle().is_dirty());
        controller.set_parameter("blend", 0.2).unwrap();
        assert_eq!(controller.state(), OverrideState::Dirty);

        controller.on_frame_begin(&mut backend, VP).unwrap();
        assert_eq!(controller.state(), OverrideState::Idle);
        assert!(controller.live_settings().is_enabled(Stage::Swirl));
    }

    #[test]
    fn parameter_query_returns_clamped_value() {
        let (controller, _registry, _) = registered();
        for (input, expected) in [(0.3, 0.3), (1.5, 1.0), (-0.5, 0.0)] {
            controller.set_parameter("blend", input).unwrap();
            assert_eq!(controller.parameter("blend").unwrap(), expected);
        }
    }

    #[test]
    fn parameter_on_stage_without_one_is_unknown() {
        let (controller, _registry, _) = registered();
        let err = controller.set_parameter("edgeDetect", 0.5).unwrap_err();
        assert!(matches!(err, OverrideError::UnknownStage(_)));
        assert_eq!(controller.state(), OverrideState::Idle);
    }

    #[test]
    fn unknown_stage_name_is_reported() {
        let (controller, _registry, _) = registered();
        assert_eq!(
            controller.set_enabled("bloom", true).unwrap_err(),
            OverrideError::UnknownStage("bloom".into())
        );
        assert_eq!(controller.state(), OverrideState::Idle);
    }

    #[test]
    fn repeating_a_setting_does_not_dirty() {
        let (mut controller, _registry, mut backend) = registered();
        let first = controller.on_frame_begin(&mut backend, VP).unwrap().generation();

        // Fisheye is on by default.
        controller.set_enabled("fisheye", true).unwrap();
        controller.set_enabled("fisheye", true).unwrap();
        assert_eq!(controller.state(), OverrideState::Idle);

        let second = controller.on_frame_begin(&mut backend, VP).unwrap().generation();
        assert_eq!(first, second);
        assert_eq!(controller.handle().refresh().redraws_requested(), 0);
    }

    #[test]
    fn changes_apply_only_at_frame_begin() {
        let (mut controller, _registry, mut backend) = registered();
        controller.on_frame_begin(&mut backend, VP).unwrap();

        controller.set_enabled("edgeDetect", false).unwrap();
        assert!(controller.operations().unwrap().find(PassKind::EdgeDetect).is_some());

        let list = controller.on_frame_begin(&mut backend, VP).unwrap();
        assert!(list.find(PassKind::EdgeDetect).is_none());
    }

    #[test]
    fn enable_fisheye_and_blend_only() {
        let (mut controller, _registry, mut backend) = registered();
        for stage in ["fisheye", "swirl", "edgeDetect", "blend"] {
            controller.set_enabled(stage, false).unwrap();
        }
        controller.set_enabled("fisheye", true).unwrap();
        controller.set_enabled("blend", true).unwrap();

        let list = controller.on_frame_begin(&mut backend, VP).unwrap();
        assert_eq!(
            list.kinds(),
            vec![
                PassKind::SceneCapture,
                PassKind::Fisheye,
                PassKind::Blend,
                PassKind::Present
            ]
        );
        assert_eq!(
            list.find(PassKind::Fisheye).unwrap().outputs()[0],
            list.find(PassKind::Blend).unwrap().inputs()[0]
        );
    }

    #[test]
    fn dirty_transitions_request_one_redraw_each() {
        let (mut controller, _registry, mut backend) = registered();

        controller.set_enabled("swirl", true).unwrap();
        controller.set_parameter("blend", 0.9).unwrap();
        controller.set_enabled("fisheye", false).unwrap();
        assert_eq!(controller.handle().refresh().redraws_requested(), 1);

        controller.on_frame_begin(&mut backend, VP).unwrap();
        controller.set_enabled("swirl", false).unwrap();
        assert_eq!(controller.handle().refresh().redraws_requested(), 2);
    }

    #[test]
    fn resize_reassembles_with_new_targets() {
        let (mut controller, _registry, mut backend) = registered();
        let first = controller.on_frame_begin(&mut backend, VP).unwrap().generation();

        let resized = Viewport::new(1280, 720);
        let list = controller.on_frame_begin(&mut backend, resized).unwrap();
        assert_ne!(list.generation(), first);

        let list = controller.operations().unwrap();
        for op in list.iter() {
            for handle in op.inputs().iter().chain(op.outputs()).filter_map(|t| t.handle()) {
                assert_eq!(controller.pool().desc(handle).unwrap().viewport(), resized);
            }
        }
    }

    #[test]
    fn render_executes_every_operation() {
        let (mut controller, _registry, mut backend) = registered();
        controller.render(&mut backend, VP).unwrap();

        // capture + fisheye + edge detect + blend + present
        assert_eq!(backend.calls.len(), 5);
    }

    #[test]
    fn shader_fault_is_cleared_by_reload() {
        let (mut controller, _registry, mut backend) = registered();
        backend.fail_techniques.insert("fisheye".into());

        controller.render(&mut backend, VP).unwrap();
        assert!(controller.faults().contains_key(&Stage::Fisheye));
        assert!(controller.operations().unwrap().find(PassKind::Fisheye).is_none());

        backend.fail_techniques.clear();
        controller.reload_shaders().unwrap();
        controller.render(&mut backend, VP).unwrap();
        assert!(controller.faults().is_empty());
        assert!(controller.operations().unwrap().find(PassKind::Fisheye).is_some());
    }

    #[test]
    fn unregister_releases_everything() {
        let (mut controller, mut registry, mut backend) = registered();
        let handle = registry.find("postfx").unwrap();
        controller.render(&mut backend, VP).unwrap();
        assert!(backend.live_targets() > 0);

        controller.unregister(&mut registry, &mut backend);

        assert_eq!(controller.state(), OverrideState::Terminated);
        assert_eq!(backend.live_targets(), 0);
        assert!(backend.shaders.is_empty());
        assert!(registry.find("postfx").is_err());
        assert!(matches!(
            handle.enabled("blend"),
            Err(OverrideError::NotRegistered(_))
        ));
        assert!(controller.render(&mut backend, VP).is_err());
        assert!(controller.register(&mut registry).is_err());
    }

    #[test]
    fn failed_register_does_not_evict_the_live_override() {
        let (mut first, mut registry, mut backend) = registered();
        let mut second = OverrideController::<MockBackend>::new(OverrideConfig::new());
        assert!(second.register(&mut registry).is_err());

        second.unregister(&mut registry, &mut backend);

        assert_eq!(first.state(), OverrideState::Idle);
        assert!(registry.contains("postfx"));
        let handle = registry.find("postfx").unwrap();
        handle.set_enabled("swirl", true).unwrap();
        let list = first.on_frame_begin(&mut backend, VP).unwrap();
        assert!(list.find(PassKind::Swirl).is_some());
    }

    #[test]
    fn failed_draw_falls_back_to_passthrough_for_that_frame() {
        let (mut controller, _registry, mut backend) = registered();
        backend.fail_draws.insert("fisheye".into());

        let err = controller.render(&mut backend, VP).unwrap_err();
        assert!(matches!(err, OverrideError::Allocation { .. }));
        assert_eq!(
            backend.calls,
            vec![
                MockCall::Scene {
                    color: Some(SCENE_COLOR_TARGET.into()),
                    depth: Some(SCENE_DEPTH_TARGET.into()),
                },
                MockCall::Scene {
                    color: None,
                    depth: None,
                },
            ]
        );
        assert!(controller.operations().is_none());

        backend.fail_draws.clear();
        backend.calls.clear();
        controller.render(&mut backend, VP).unwrap();
        assert_eq!(backend.calls.len(), 5);
    }

    #[test]
    fn control_handle_works_across_threads() {
        let (mut controller, registry, mut backend) = registered();
        let handle = registry.find("postfx").unwrap();

        std::thread::spawn(move || {
            handle.set_enabled("swirl", true).unwrap();
            handle.set_parameter("blend", 0.1).unwrap();
        })
        .join()
        .unwrap();

        let list = controller.on_frame_begin(&mut backend, VP).unwrap();
        assert!(list.find(PassKind::Swirl).is_some());
        assert_eq!(controller.live_settings().blend(), 0.1);
    }
}
