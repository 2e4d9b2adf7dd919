//! Stage identities and the user-facing stage settings.

use std::fmt;
use std::str::FromStr;

use crate::error::{OverrideError, Result};

/// One toggleable stage of the post-process chain, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Fisheye,
    Swirl,
    EdgeDetect,
    Blend,
}

impl Stage {
    /// All stages in the order they execute.
    pub const ALL: [Stage; 4] = [Stage::Fisheye, Stage::Swirl, Stage::EdgeDetect, Stage::Blend];

    /// The control-surface name of this stage.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Fisheye => "fisheye",
            Stage::Swirl => "swirl",
            Stage::EdgeDetect => "edgeDetect",
            Stage::Blend => "blend",
        }
    }

    /// Looks up a stage by its control-surface name.
    ///
    /// Matching ignores case and accepts `edge_detect` as a spelling of `edgeDetect`.
    pub fn from_name(name: &str) -> Result<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "fisheye" => Ok(Stage::Fisheye),
            "swirl" => Ok(Stage::Swirl),
            "edgedetect" | "edge_detect" => Ok(Stage::EdgeDetect),
            "blend" => Ok(Stage::Blend),
            _ => Err(OverrideError::UnknownStage(name.to_string())),
        }
    }

    /// Whether this stage declares a numeric parameter.
    pub fn has_parameter(self) -> bool {
        matches!(self, Stage::Blend)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = OverrideError;

    fn from_str(s: &str) -> Result<Self> {
        Stage::from_name(s)
    }
}

/// Every kind of operation that can appear in an operation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    SceneCapture,
    Fisheye,
    Swirl,
    EdgeDetect,
    Blend,
    Present,
}

impl PassKind {
    pub fn name(self) -> &'static str {
        match self {
            PassKind::SceneCapture => "sceneCapture",
            PassKind::Fisheye => "fisheye",
            PassKind::Swirl => "swirl",
            PassKind::EdgeDetect => "edgeDetect",
            PassKind::Blend => "blend",
            PassKind::Present => "present",
        }
    }

    /// The stage behind this pass, if it is one of the toggleable ones.
    pub fn stage(self) -> Option<Stage> {
        match self {
            PassKind::Fisheye => Some(Stage::Fisheye),
            PassKind::Swirl => Some(Stage::Swirl),
            PassKind::EdgeDetect => Some(Stage::EdgeDetect),
            PassKind::Blend => Some(Stage::Blend),
            PassKind::SceneCapture | PassKind::Present => None,
        }
    }
}

impl From<Stage> for PassKind {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Fisheye => PassKind::Fisheye,
            Stage::Swirl => PassKind::Swirl,
            Stage::EdgeDetect => PassKind::EdgeDetect,
            Stage::Blend => PassKind::Blend,
        }
    }
}

/// A shader reference: the effect file id plus the fragment entry point to run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Technique {
    pub effect: String,
    pub entry: String,
}

impl Technique {
    pub fn new(effect: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            effect: effect.into(),
            entry: entry.into(),
        }
    }

    /// The built-in technique for a stage.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Fisheye => Self::new("fisheye", "fs_main"),
            Stage::Swirl => Self::new("swirl", "fs_main"),
            Stage::EdgeDetect => Self::new("edge_detect", "fs_main"),
            Stage::Blend => Self::new("blend", "fs_main"),
        }
    }

    /// The built-in technique that copies the final image to the backbuffer.
    pub fn present() -> Self {
        Self::new("present", "fs_main")
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.effect, self.entry)
    }
}

/// Clamps a parameter into `[0, 1]`. NaN maps to zero.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Enabled flags and parameters for the four stages.
///
/// This is the value exchanged between the control surface and the frame loop;
/// it carries no GPU state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSettings {
    enabled: [bool; 4],
    blend: f32,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            enabled: [true, false, true, true],
            blend: 0.5,
        }
    }
}

impl StageSettings {
    /// Settings with every stage disabled.
    pub fn none() -> Self {
        Self {
            enabled: [false; 4],
            ..Self::default()
        }
    }

    /// Settings with only the given stages enabled.
    pub fn only(stages: &[Stage]) -> Self {
        let mut settings = Self::none();
        for &stage in stages {
            settings.set_enabled(stage, true);
        }
        settings
    }

    pub fn is_enabled(&self, stage: Stage) -> bool {
        self.enabled[stage.index()]
    }

    /// Sets a stage's enabled flag, returning `true` if it changed.
    pub fn set_enabled(&mut self, stage: Stage, enabled: bool) -> bool {
        let slot = &mut self.enabled[stage.index()];
        let changed = *slot != enabled;
        *slot = enabled;
        changed
    }

    /// Enabled stages in pipeline order.
    pub fn enabled_stages(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL.into_iter().filter(|&s| self.is_enabled(s))
    }

    pub fn blend(&self) -> f32 {
        self.blend
    }

    /// Reads a stage parameter. Only stages that declare one have a value.
    pub fn parameter(&self, stage: Stage) -> Result<f32> {
        match stage {
            Stage::Blend => Ok(self.blend),
            other => Err(OverrideError::UnknownStage(format!("{}.parameter", other))),
        }
    }

    /// Writes a stage parameter, clamped to its declared range.
    ///
    /// Returns `true` if the stored value changed.
    pub fn set_parameter(&mut self, stage: Stage, value: f32) -> Result<bool> {
        match stage {
            Stage::Blend => {
                let value = clamp_unit(value);
                let changed = self.blend != value;
                self.blend = value;
                Ok(changed)
            }
            other => Err(OverrideError::UnknownStage(format!("{}.parameter", other))),
        }
    }
}
