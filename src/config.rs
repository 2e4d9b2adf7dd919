//! Construction-time configuration for an override.

use std::collections::HashMap;

use crate::render_graph::{ClearSpec, Stage, StageSettings, Technique};

/// Configuration for an [`OverrideController`](crate::OverrideController).
///
/// # Example
///
/// ```
/// use postfx::{OverrideConfig, Stage};
///
/// let config = OverrideConfig::new()
///     .name("viewport1")
///     .enabled(Stage::Swirl, true)
///     .blend(0.75);
/// assert!(config.settings.is_enabled(Stage::Swirl));
/// ```
#[derive(Debug, Clone)]
pub struct OverrideConfig {
    /// Name the override registers under.
    pub name: String,
    /// Initial stage flags and blend factor.
    pub settings: StageSettings,
    /// Techniques replacing the built-in ones, per stage.
    pub techniques: HashMap<Stage, Technique>,
    /// How the scene capture clears its targets.
    pub scene_clear: ClearSpec,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            name: "postfx".to_string(),
            settings: StageSettings::default(),
            techniques: HashMap::new(),
            scene_clear: ClearSpec::color_and_depth([0.0, 0.0, 0.0, 1.0], 1.0),
        }
    }
}

impl OverrideConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn enabled(mut self, stage: Stage, enabled: bool) -> Self {
        self.settings.set_enabled(stage, enabled);
        self
    }

    /// Initial blend factor, clamped to `[0, 1]`.
    pub fn blend(mut self, blend: f32) -> Self {
        // Blend always declares a parameter.
        let _ = self.settings.set_parameter(Stage::Blend, blend);
        self
    }

    pub fn technique(mut self, stage: Stage, technique: Technique) -> Self {
        self.techniques.insert(stage, technique);
        self
    }

    pub fn scene_clear_color(mut self, rgba: [f32; 4]) -> Self {
        self.scene_clear.color = Some(rgba);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_initial_pipeline() {
        let config = OverrideConfig::default();
        assert_eq!(config.name, "postfx");
        assert!(config.settings.is_enabled(Stage::Fisheye));
        assert!(!config.settings.is_enabled(Stage::Swirl));
        assert!(config.settings.is_enabled(Stage::EdgeDetect));
        assert!(config.settings.is_enabled(Stage::Blend));
        assert_eq!(config.settings.blend(), 0.5);
    }

    #[test]
    fn builder_clamps_blend() {
        let config = OverrideConfig::new().blend(4.0);
        assert_eq!(config.settings.blend(), 1.0);
    }
}
