//! Overlay catalogs and the clip lookup chain
//!
//! Overlays shadow clips of the base catalog by name. The newest overlay is
//! consulted first, the base catalog last.

use std::sync::Arc;

use crate::catalog::{Catalog, ClipLookup};
use crate::clip::Clip;

/// An overlay catalog with an optional expiry tick (`0` = never)
#[derive(Debug, Clone)]
pub struct Overlay {
    catalog: Arc<Catalog>,
    expires_at: u64,
}

impl Overlay {
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn name(&self) -> &str {
        self.catalog.name()
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Whether this overlay has run out at `now`
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at < now
    }
}

/// Base catalog plus overlays, resolving clip names newest-overlay-first
#[derive(Debug, Clone, Default)]
pub struct LookupChain {
    base: Option<Arc<Catalog>>,
    overlays: Vec<Overlay>,
}

impl LookupChain {
    pub fn new(base: Option<Arc<Catalog>>) -> Self {
        Self {
            base,
            overlays: Vec::new(),
        }
    }

    pub fn base(&self) -> Option<&Arc<Catalog>> {
        self.base.as_ref()
    }

    /// Replace the base catalog; overlays stay
    pub fn set_base(&mut self, base: Option<Arc<Catalog>>) {
        self.base = base;
    }

    /// Overlays, oldest first
    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    /// Add an overlay, or refresh the expiry of an overlay with the same name
    pub fn add_overlay(&mut self, catalog: Arc<Catalog>, expires_at: u64) {
        if let Some(existing) = self
            .overlays
            .iter_mut()
            .find(|o| o.name().eq_ignore_ascii_case(catalog.name()))
        {
            existing.expires_at = expires_at;
            return;
        }
        log::debug!("Adding overlay '{}' until {expires_at}", catalog.name());
        self.overlays.push(Overlay {
            catalog,
            expires_at,
        });
    }

    /// Remove an overlay by model name
    pub fn remove_overlay(&mut self, name: &str) -> bool {
        let before = self.overlays.len();
        self.overlays.retain(|o| !o.name().eq_ignore_ascii_case(name));
        before != self.overlays.len()
    }

    pub fn has_overlay(&self, name: &str) -> bool {
        self.overlays
            .iter()
            .any(|o| o.name().eq_ignore_ascii_case(name))
    }

    pub fn clear_overlays(&mut self) {
        self.overlays.clear();
    }

    /// Drop overlays that expired at `now`; returns how many were removed
    pub fn expire(&mut self, now: u64) -> usize {
        let before = self.overlays.len();
        self.overlays.retain(|o| {
            let expired = o.is_expired(now);
            if expired {
                log::debug!("Overlay '{}' expired at {now}", o.name());
            }
            !expired
        });
        before - self.overlays.len()
    }
}

impl ClipLookup for LookupChain {
    fn find_clip(&self, name: &str) -> Option<&Arc<Clip>> {
        self.overlays
            .iter()
            .rev()
            .find_map(|o| o.catalog.sequence(name))
            .or_else(|| self.base.as_ref().and_then(|b| b.sequence(name)))
    }
}
