//! Playback engine: per-instance clip layers, timing and bone matrices
//!
//! A [`Pose`] holds at most one primary clip per layer number. Every update
//! advances each layer, follows successors and loops, accumulates root motion
//! and recomputes model-space bone matrices from the skeleton rest pose with
//! the layers applied in ascending layer order.

mod layer;
mod overlay;

pub use layer::{Blend, Layer};
pub use overlay::{LookupChain, Overlay};

use std::collections::BTreeMap;
use std::sync::Arc;

use bitflags::bitflags;
use glam::{Mat4, Vec3};

use crate::catalog::{Catalog, ClipLookup};
use crate::clip::{Clip, Sample};
use crate::selector::{BodyState, PlaybackSnapshot, Selector};
use crate::skeleton::Skeleton;

bitflags! {
    /// How a start request treats the clip already playing on its layer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StartHint: u8 {
        /// Always restart, even the same clip
        const FORCE = 0x01;
        /// Do not replace an unfinished clip
        const NO_INTERRUPT = 0x02;
    }
}

/// Playback options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct PoseOptions {
    /// Apply the animated horizontal translation of root bones
    pub translation_enabled: bool,
    /// Cross-fade into clips that declare a blend-in time
    pub blend_enabled: bool,
}

impl Default for PoseOptions {
    fn default() -> Self {
        Self {
            translation_enabled: true,
            blend_enabled: true,
        }
    }
}

/// Playback state of one instance
#[derive(Debug, Clone, Default)]
pub struct Pose {
    options: PoseOptions,
    skeleton: Option<Arc<Skeleton>>,
    chain: LookupChain,
    layers: BTreeMap<u32, Layer>,
    rest: Vec<Sample>,
    local: Vec<Sample>,
    bones: Vec<Mat4>,
    motion: Vec3,
    yaw: f32,
    combo_len: u32,
    sequence: u64,
    last_update: u64,
    dirty: bool,
}

impl Pose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: PoseOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &PoseOptions {
        &self.options
    }

    /// Keep or drop the horizontal root translation of clips
    pub fn set_translation_enabled(&mut self, enabled: bool) {
        if self.options.translation_enabled != enabled {
            self.options.translation_enabled = enabled;
            self.dirty = true;
        }
    }

    pub fn skeleton(&self) -> Option<&Arc<Skeleton>> {
        self.skeleton.as_ref()
    }

    /// Swap the skeleton; running layers keep playing on the new bones
    pub fn set_skeleton(&mut self, skeleton: Option<Arc<Skeleton>>) {
        self.rest = skeleton
            .as_ref()
            .map(|sk| {
                sk.nodes()
                    .iter()
                    .map(|n| {
                        let (_, rotation, position) = n.rest.to_scale_rotation_translation();
                        Sample::new(rotation, position)
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.local = self.rest.clone();
        self.bones = skeleton.as_ref().map(|sk| sk.rest_pose()).unwrap_or_default();
        self.skeleton = skeleton;
        self.dirty = true;
    }

    /// Base catalog and overlays used to resolve clips
    pub fn lookup(&self) -> &LookupChain {
        &self.chain
    }

    pub fn set_catalog(&mut self, catalog: Option<Arc<Catalog>>) {
        self.chain.set_base(catalog);
    }

    /// Add an overlay catalog; `expires_at == 0` keeps it until removed
    pub fn add_overlay(&mut self, catalog: Arc<Catalog>, expires_at: u64) {
        self.chain.add_overlay(catalog, expires_at);
    }

    pub fn remove_overlay(&mut self, name: &str) -> bool {
        self.chain.remove_overlay(name)
    }

    pub fn has_overlay(&self, name: &str) -> bool {
        self.chain.has_overlay(name)
    }

    pub fn clear_overlays(&mut self) {
        self.chain.clear_overlays();
    }

    /// Selector over this pose's lookup chain
    pub fn selector(&self) -> Selector<'_, LookupChain> {
        Selector::new(&self.chain)
    }

    /// State consulted by the selector
    pub fn snapshot(&self) -> PlaybackSnapshot<'_> {
        PlaybackSnapshot {
            body_state: self.body_state(),
            base_clip: self.layers.values().next().map(|l| l.clip.name()),
        }
    }

    /// Start `clip` on its layer
    ///
    /// Returns `true` when the clip plays after the call. Starting the clip
    /// that already plays on the layer is a successful no-op unless
    /// [`StartHint::FORCE`] is set. [`StartHint::NO_INTERRUPT`] refuses to
    /// replace a clip that has not finished.
    pub fn start_anim(
        &mut self,
        clip: &Arc<Clip>,
        combo: u32,
        body_state: BodyState,
        hint: StartHint,
        now: u64,
    ) -> bool {
        let now_ms = now as f64;
        let force = hint.contains(StartHint::FORCE);
        let mut blend = None;

        if let Some(current) = self.layers.get(&clip.layer()) {
            if current.clip.name() == clip.name() && !force {
                return true;
            }
            if hint.contains(StartHint::NO_INTERRUPT) && !force && !current.is_finished(now_ms) {
                log::trace!("'{}' refuses interruption by '{}'", current.clip.name(), clip.name());
                return false;
            }
            if self.options.blend_enabled && clip.blend_in_ms() > 0.0 && !self.local.is_empty() {
                blend = Some(Blend::new(self.local.clone(), now_ms, clip.blend_in_ms()));
            }
        }

        self.sequence += 1;
        let mut layer = Layer::new(Arc::clone(clip), now_ms, body_state, combo, self.sequence);
        layer.blend = blend;
        log::trace!("Start '{}' on layer {} at {now}", clip.name(), clip.layer());
        self.layers.insert(clip.layer(), layer);
        self.combo_len = 0;
        self.dirty = true;
        true
    }

    /// Chain the next combo branch of `clip` if its timing window is open
    ///
    /// Returns `None` when `clip` is not the primary clip of its layer, the
    /// current frame is outside the window of the current branch, or no
    /// further branch exists.
    pub fn continue_combo(&mut self, clip: &Arc<Clip>, now: u64) -> Option<Arc<Clip>> {
        let now_ms = now as f64;
        let layer = self.layers.get_mut(&clip.layer())?;
        if layer.clip.name() != clip.name() {
            return None;
        }

        let windows = layer.clip.combo_windows();
        let k = layer.combo as usize;
        let current = windows.get(k)?;
        let next = windows.get(k + 1)?;
        let frame = layer.frame(now_ms);
        if frame < current.start_frame as f32 || frame > current.window_end_frame as f32 {
            return None;
        }

        layer.started_at = now_ms - layer.clip.ms_at_frame(next.start_frame);
        layer.motion_at = now_ms;
        layer.combo += 1;
        self.combo_len += 1;
        self.dirty = true;
        Some(Arc::clone(&layer.clip))
    }

    /// Number of chained combo branches since the last start
    pub fn combo_length(&self) -> u32 {
        self.combo_len
    }

    /// Advance playback to `now`
    ///
    /// Expired overlays are dropped first. Returns whether bone matrices
    /// changed.
    pub fn update(&mut self, now: u64) -> bool {
        let now_ms = now as f64;
        self.chain.expire(now);
        self.last_update = now;

        let before = self.layers.len();
        let chain = &self.chain;
        let (motion, yaw) = (&mut self.motion, &mut self.yaw);
        self.layers
            .retain(|_, layer| layer.advance(chain, now_ms, motion, yaw));

        let changed = self.dirty || !self.layers.is_empty() || before != self.layers.len();
        if changed {
            self.compute_bones(now_ms);
        }
        self.dirty = false;
        changed
    }

    fn compute_bones(&mut self, now_ms: f64) {
        let Some(skeleton) = self.skeleton.as_ref() else {
            return;
        };

        self.local.clone_from(&self.rest);
        for layer in self.layers.values() {
            layer.apply(now_ms, &mut self.local);
        }
        if !self.options.translation_enabled {
            for &root in skeleton.root_nodes() {
                if let (Some(local), Some(rest)) = (self.local.get_mut(root), self.rest.get(root)) {
                    local.position = Vec3::new(rest.position.x, local.position.y, rest.position.z);
                }
            }
        }

        let matrices: Vec<Mat4> = self.local.iter().map(Sample::to_matrix).collect();
        self.bones.resize(matrices.len(), Mat4::IDENTITY);
        skeleton.to_model_space(&matrices, &mut self.bones);
    }

    /// Stop the clip named `name`; returns whether it was playing
    pub fn stop_anim(&mut self, name: &str) -> bool {
        self.stop_where(|layer| layer.clip.name() == name)
    }

    /// Stop clips that were started with a locomotion body state
    pub fn stop_walk_anim(&mut self) -> bool {
        self.stop_where(|layer| layer.body_state.is_walk())
    }

    /// Stop every clip
    pub fn stop_all_anim(&mut self) -> bool {
        self.stop_where(|_| true)
    }

    fn stop_where(&mut self, mut pred: impl FnMut(&Layer) -> bool) -> bool {
        let before = self.layers.len();
        self.layers.retain(|_, layer| !pred(layer));
        let stopped = before != self.layers.len();
        if stopped {
            self.dirty = true;
        }
        stopped
    }

    pub fn has_anim(&self) -> bool {
        !self.layers.is_empty()
    }

    /// Whether a clip with this name is primary on any layer
    pub fn is_in_anim(&self, name: &str) -> bool {
        self.layers.values().any(|l| l.clip.name() == name)
    }

    /// Active layers in ascending layer order
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    /// Body state of the most recently started layer that declared one
    pub fn body_state(&self) -> BodyState {
        self.layers
            .values()
            .filter(|l| l.body_state != BodyState::None)
            .max_by_key(|l| l.sequence)
            .map_or(BodyState::None, |l| l.body_state)
    }

    /// Model-space matrix of bone `index`
    pub fn bone(&self, index: usize) -> Option<Mat4> {
        self.bones.get(index).copied()
    }

    pub fn bones(&self) -> &[Mat4] {
        &self.bones
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// Tick of the last update
    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    /// Root motion accumulated since the last call
    pub fn take_motion(&mut self) -> Vec3 {
        std::mem::take(&mut self.motion)
    }

    /// Yaw (degrees) accumulated since the last call
    pub fn take_rotation(&mut self) -> f32 {
        std::mem::take(&mut self.yaw)
    }

    /// Restore a layer from saved state
    pub(crate) fn restore_layer(
        &mut self,
        clip: Arc<Clip>,
        started_at: u64,
        body_state: BodyState,
        combo: u32,
    ) {
        self.sequence += 1;
        let mut layer = Layer::new(clip, started_at as f64, body_state, 0, self.sequence);
        layer.combo = combo;
        layer.motion_at = self.last_update.max(started_at) as f64;
        self.layers.insert(layer.clip.layer(), layer);
        self.dirty = true;
    }

    pub(crate) fn set_last_update(&mut self, now: u64) {
        self.last_update = now;
    }
}
