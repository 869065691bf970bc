//! A single playback layer: one primary clip and its timing

use std::sync::Arc;

use glam::Vec3;

use crate::catalog::ClipLookup;
use crate::clip::{Clip, Sample};
use crate::selector::BodyState;

/// Cross-fade from a captured pose into a newly started clip
#[derive(Debug, Clone)]
pub struct Blend {
    from: Vec<Sample>,
    started_at: f64,
    duration_ms: f64,
}

impl Blend {
    pub(crate) fn new(from: Vec<Sample>, started_at: f64, duration_ms: f64) -> Self {
        Self {
            from,
            started_at,
            duration_ms,
        }
    }

    /// Weight of the new clip at `now`, in `[0, 1]`
    pub fn weight(&self, now: f64) -> f32 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        ((now - self.started_at) / self.duration_ms).clamp(0.0, 1.0) as f32
    }
}

/// Playback state of one layer
#[derive(Debug, Clone)]
pub struct Layer {
    pub(crate) clip: Arc<Clip>,
    /// Time at which frame zero of the clip played (ms)
    pub(crate) started_at: f64,
    /// Time up to which root motion was accounted (ms)
    pub(crate) motion_at: f64,
    pub(crate) body_state: BodyState,
    pub(crate) combo: u32,
    /// Start order, used to find the most recent state
    pub(crate) sequence: u64,
    pub(crate) blend: Option<Blend>,
}

impl Layer {
    /// Start `clip` at `now`, skipping ahead to the start frame of combo
    /// branch `combo` when the clip has one
    pub(crate) fn new(
        clip: Arc<Clip>,
        now: f64,
        body_state: BodyState,
        combo: u32,
        sequence: u64,
    ) -> Self {
        let window = clip.combo_windows().get(combo as usize).copied();
        let offset = window.map_or(0.0, |w| clip.ms_at_frame(w.start_frame));
        let combo = if window.is_some() { combo } else { 0 };
        Self {
            clip,
            started_at: now - offset,
            motion_at: now,
            body_state,
            combo,
            sequence,
            blend: None,
        }
    }

    pub fn clip(&self) -> &Arc<Clip> {
        &self.clip
    }

    /// Playback start in ticks
    pub fn started_at(&self) -> u64 {
        self.started_at.max(0.0).round() as u64
    }

    pub fn body_state(&self) -> BodyState {
        self.body_state
    }

    /// Current combo branch
    pub fn combo(&self) -> u32 {
        self.combo
    }

    pub fn is_blending(&self) -> bool {
        self.blend.is_some()
    }

    pub fn elapsed_ms(&self, now: f64) -> f64 {
        (now - self.started_at).max(0.0)
    }

    /// Fractional frame at `now`
    pub fn frame(&self, now: f64) -> f32 {
        self.clip.frame_at(self.elapsed_ms(now))
    }

    /// Whether the clip played to its end and will not continue
    pub fn is_finished(&self, now: f64) -> bool {
        !self.clip.is_looping()
            && self.clip.next().is_empty()
            && self.elapsed_ms(now) >= self.clip.duration_ms()
    }

    /// Advance to `now`, following successors and loops
    ///
    /// Root motion and yaw covered by the interval are added to `motion` and
    /// `yaw`. Returns `false` once the layer has ended.
    pub(crate) fn advance<L: ClipLookup + ?Sized>(
        &mut self,
        lookup: &L,
        now: f64,
        motion: &mut Vec3,
        yaw: &mut f32,
    ) -> bool {
        if self.blend.as_ref().is_some_and(|b| b.weight(now) >= 1.0) {
            self.blend = None;
        }

        loop {
            let duration = self.clip.duration_ms();
            if duration <= 0.0 {
                return self.clip.is_looping();
            }

            let end = self.started_at + duration;
            let until = now.min(end);
            let dt = (until - self.motion_at).max(0.0);
            *motion += self.clip.speed(dt);
            *yaw += self.clip.yaw_speed(dt);
            self.motion_at = self.motion_at.max(until);
            if now < end {
                return true;
            }

            let next = self.clip.next();
            let successor = if next.is_empty() {
                None
            } else {
                lookup.find_clip(next)
            };
            if let Some(successor) = successor {
                log::trace!("'{}' chains to '{}'", self.clip.name(), successor.name());
                self.clip = Arc::clone(successor);
                self.started_at = end;
                self.combo = 0;
                self.blend = None;
            } else if self.clip.is_looping() {
                self.started_at = end;
            } else {
                log::trace!("'{}' finished", self.clip.name());
                return false;
            }
        }
    }

    /// Write this layer's bone samples into `local`
    pub(crate) fn apply(&self, now: f64, local: &mut [Sample]) {
        let data = self.clip.data();
        let frame = self.frame(now);
        let weight = self.blend.as_ref().map(|b| (b, b.weight(now)));

        for (slot, &node) in data.node_index().iter().enumerate() {
            let node = node as usize;
            let Some(sample) = data.sample_at(slot, frame) else {
                continue;
            };
            let sample = match weight {
                Some((blend, w)) if w < 1.0 => match blend.from.get(node) {
                    Some(from) => from.blend(&sample, w),
                    None => sample,
                },
                _ => sample,
            };
            if let Some(target) = local.get_mut(node) {
                *target = sample;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::clip::{ClipData, ClipFlags, ClipHeader, ComboWindow};

    fn clip(name: &str, frames: u32, fps: f32, flags: ClipFlags) -> Clip {
        let header = ClipHeader {
            num_frames: frames,
            num_nodes: 1,
            fps,
            ..ClipHeader::default()
        };
        let samples = (0..frames)
            .map(|f| Sample::new(glam::Quat::IDENTITY, Vec3::Z * f as f32))
            .collect();
        Clip::new(name, Arc::new(ClipData::new(header, vec![0], samples))).with_flags(flags)
    }

    #[test]
    fn test_looping_layer_keeps_time_continuity() {
        let catalog = Catalog::new("TEST");
        let run = Arc::new(clip("S_RUN", 10, 10.0, ClipFlags::IDLE));
        let mut layer = Layer::new(run, 0.0, BodyState::Stand, 0, 0);
        let (mut motion, mut yaw) = (Vec3::ZERO, 0.0);

        assert!(layer.advance(&catalog, 2500.0, &mut motion, &mut yaw));
        assert_eq!(layer.started_at(), 2000);
        assert!((layer.frame(2500.0) - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_layer_chains_to_successor() {
        let mut catalog = Catalog::new("TEST");
        catalog.push(clip("S_STAND", 10, 10.0, ClipFlags::IDLE));
        let intro = clip("T_STAND_2_JUMP", 5, 10.0, ClipFlags::empty()).with_next("S_STAND");

        let mut layer = Layer::new(Arc::new(intro), 100.0, BodyState::Jump, 0, 0);
        let (mut motion, mut yaw) = (Vec3::ZERO, 0.0);
        assert!(layer.advance(&catalog, 700.0, &mut motion, &mut yaw));
        assert_eq!(layer.clip().name(), "S_STAND");
        assert_eq!(layer.started_at(), 600);
    }

    #[test]
    fn test_one_shot_layer_ends() {
        let catalog = Catalog::new("TEST");
        let point = Arc::new(clip("T_POINT", 5, 10.0, ClipFlags::empty()));
        let mut layer = Layer::new(point, 0.0, BodyState::Stand, 0, 0);
        let (mut motion, mut yaw) = (Vec3::ZERO, 0.0);

        assert!(layer.advance(&catalog, 499.0, &mut motion, &mut yaw));
        assert!(!layer.is_finished(499.0));
        assert!(!layer.advance(&catalog, 500.0, &mut motion, &mut yaw));
    }

    #[test]
    fn test_missing_successor_ends_layer() {
        let catalog = Catalog::new("TEST");
        let intro = clip("T_JUMP", 5, 10.0, ClipFlags::empty()).with_next("S_NOWHERE");
        let mut layer = Layer::new(Arc::new(intro), 0.0, BodyState::Jump, 0, 0);
        let (mut motion, mut yaw) = (Vec3::ZERO, 0.0);
        assert!(!layer.advance(&catalog, 1000.0, &mut motion, &mut yaw));
    }

    #[test]
    fn test_combo_start_offset() {
        let attack = clip("S_1HATTACK", 40, 20.0, ClipFlags::MOVE).with_combo(vec![
            ComboWindow {
                start_frame: 0,
                window_end_frame: 10,
            },
            ComboWindow {
                start_frame: 20,
                window_end_frame: 30,
            },
        ]);
        let layer = Layer::new(Arc::new(attack), 5000.0, BodyState::Hit, 1, 0);
        assert_eq!(layer.combo(), 1);
        assert!((layer.frame(5000.0) - 20.0).abs() < 1e-4);

        let run = Arc::new(clip("S_RUN", 4, 10.0, ClipFlags::MOVE));
        let plain = Layer::new(run, 0.0, BodyState::Run, 3, 0);
        assert_eq!(plain.combo(), 0);
    }

    #[test]
    fn test_blend_weight() {
        let blend = Blend::new(Vec::new(), 100.0, 200.0);
        assert_eq!(blend.weight(100.0), 0.0);
        assert_eq!(blend.weight(200.0), 0.5);
        assert_eq!(blend.weight(400.0), 1.0);
    }
}
