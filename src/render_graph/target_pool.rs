//! The per-override pool of render targets.

use std::collections::HashMap;

use crate::error::{OverrideError, Result};
use crate::render_graph::{
    RenderBackend, TargetDesc, TargetFormat, TargetHandle, Viewport,
};

struct PoolEntry<T> {
    handle: TargetHandle,
    desc: TargetDesc,
    target: T,
}

/// Owns the render targets of one override instance, keyed by name.
///
/// Targets are reused across frames and only reallocated when their
/// description changes, usually because the viewport was resized.
pub struct TargetPool<T> {
    entries: HashMap<String, PoolEntry<T>>,
    next_id: u64,
}

impl<T> Default for TargetPool<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<T> TargetPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named target, allocating or reallocating it as needed.
    ///
    /// A target whose format and size already match is returned unchanged.
    /// Otherwise the old resource is destroyed and its handle stops resolving.
    pub fn acquire<B>(
        &mut self,
        backend: &mut B,
        name: &str,
        format: TargetFormat,
        viewport: Viewport,
    ) -> Result<TargetHandle>
    where
        B: RenderBackend<Target = T>,
    {
        let desc = TargetDesc::new(name, format, viewport);

        if let Some(entry) = self.entries.get(name) {
            if entry.desc == desc {
                return Ok(entry.handle);
            }
        }

        if let Some(stale) = self.entries.remove(name) {
            tracing::debug!(
                render_target = name,
                old = ?stale.desc.viewport(),
                new = ?viewport,
                "reallocating render target"
            );
            backend.destroy_target(stale.target);
        }

        if viewport.is_empty() {
            return Err(OverrideError::allocation(
                name,
                format!("zero-sized viewport {}x{}", viewport.width, viewport.height),
            ));
        }

        let target = backend.create_target(&desc)?;
        let handle = TargetHandle(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            name.to_string(),
            PoolEntry {
                handle,
                desc,
                target,
            },
        );
        Ok(handle)
    }

    fn entry(&self, handle: TargetHandle) -> Option<&PoolEntry<T>> {
        self.entries.values().find(|e| e.handle == handle)
    }

    /// Resolves a handle to its GPU resource.
    pub fn get(&self, handle: TargetHandle) -> Option<&T> {
        self.entry(handle).map(|e| &e.target)
    }

    /// Resolves a handle to the description it was allocated with.
    pub fn desc(&self, handle: TargetHandle) -> Option<&TargetDesc> {
        self.entry(handle).map(|e| &e.desc)
    }

    /// Destroys one target. Unknown handles are ignored.
    pub fn release<B>(&mut self, backend: &mut B, handle: TargetHandle)
    where
        B: RenderBackend<Target = T>,
    {
        let name = self
            .entries
            .iter()
            .find(|(_, e)| e.handle == handle)
            .map(|(name, _)| name.clone());
        if let Some(entry) = name.and_then(|n| self.entries.remove(&n)) {
            backend.destroy_target(entry.target);
        }
    }

    /// Destroys every target in the pool.
    pub fn release_all<B>(&mut self, backend: &mut B)
    where
        B: RenderBackend<Target = T>,
    {
        for (_, entry) in self.entries.drain() {
            backend.destroy_target(entry.target);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
