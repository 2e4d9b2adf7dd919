//! WGSL sources for the override's techniques.
//!
//! Built-in sources are compiled into the binary. A search directory can
//! shadow any of them with `<effect>.wgsl`, which is how shaders are edited
//! without rebuilding: change the file, then reload shaders on the override.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{OverrideError, Result};

const BUILTIN: &[(&str, &str)] = &[
    ("fisheye", include_str!("shaders/fisheye.wgsl")),
    ("swirl", include_str!("shaders/swirl.wgsl")),
    ("edge_detect", include_str!("shaders/edge_detect.wgsl")),
    ("blend", include_str!("shaders/blend.wgsl")),
    ("present", include_str!("shaders/present.wgsl")),
    ("scene", include_str!("shaders/scene.wgsl")),
];

/// Resolves effect ids to WGSL source.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    search_dir: Option<PathBuf>,
    builtin: HashMap<&'static str, &'static str>,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self {
            search_dir: None,
            builtin: BUILTIN.iter().copied().collect(),
        }
    }
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks for `<effect>.wgsl` in `dir` before falling back to the built-ins.
    pub fn with_search_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.search_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Registers or replaces an in-memory source.
    pub fn with_source(mut self, effect: &'static str, source: &'static str) -> Self {
        self.builtin.insert(effect, source);
        self
    }

    pub fn search_dir(&self) -> Option<&Path> {
        self.search_dir.as_deref()
    }

    /// The WGSL source for `effect`.
    pub fn source(&self, effect: &str) -> Result<Cow<'static, str>> {
        if let Some(dir) = &self.search_dir {
            let path = dir.join(format!("{effect}.wgsl"));
            match fs::read_to_string(&path) {
                Ok(source) => {
                    tracing::debug!(path = %path.display(), "loaded shader from disk");
                    return Ok(Cow::Owned(source));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(OverrideError::shader_load(
                        effect,
                        format!("failed to read {}: {e}", path.display()),
                    ));
                }
            }
        }

        self.builtin
            .get(effect)
            .map(|s| Cow::Borrowed(*s))
            .ok_or_else(|| OverrideError::shader_load(effect, "no such effect"))
    }
}
