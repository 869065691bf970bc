//! Save-state of animated instances
//!
//! Layout, all integers little-endian, strings `\n`-terminated:
//!
//! ```text
//! weapon_state    u8
//! head_rotation   f32 f32        (version > 30)
//! skeleton_name   line           (".MDH" read as ".MDS" for version <= 26)
//! layer_count     u32
//!   clip_name     line
//!   started_at    u64
//!   body_state    u8
//!   combo         u32
//! overlay_count   u32
//!   model_name    line
//!   expires_at    u64
//! ```

use std::io::{Read, Write};
use std::sync::Arc;

use glam::Vec2;

use crate::catalog::{Catalog, ClipLookup};
use crate::error::{AnimError, Result};
use crate::io_ext::{ReadExt, WriteExt};
use crate::pose::Pose;
use crate::selector::{BodyState, WeaponState};
use crate::skeleton::Skeleton;
use crate::visual::ModelVisual;

/// Version written by [`ModelVisual::save`]
pub const SAVE_VERSION: u32 = 44;

/// First version storing the head rotation
const HEAD_ROTATION_VERSION: u32 = 31;

/// Last version storing skeleton names with the `.MDH` extension
const LEGACY_EXTENSION_VERSION: u32 = 26;

/// Resolves names stored in a save back to shared assets
pub trait ModelResolver {
    /// Skeleton and base catalog of a visual name such as `HUMANS.MDS`
    fn resolve_visual(&self, name: &str) -> Option<(Arc<Skeleton>, Arc<Catalog>)>;

    /// Overlay catalog by model name
    fn resolve_overlay(&self, name: &str) -> Option<Arc<Catalog>>;
}

/// Replace the extension of `name` when it equals `from` (ASCII case-insensitive)
fn exchange_extension(name: &str, from: &str, to: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case(from) => format!("{stem}.{to}"),
        _ => name.to_string(),
    }
}

#[derive(Debug)]
struct SavedLayer {
    clip: String,
    started_at: u64,
    body_state: BodyState,
    combo: u32,
}

#[derive(Debug)]
struct SavedPose {
    layers: Vec<SavedLayer>,
    overlays: Vec<(String, u64)>,
}

impl SavedPose {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let layer_count = reader.read_u32_le()?;
        let mut layers = Vec::new();
        for _ in 0..layer_count {
            let clip = reader.read_line()?;
            let started_at = reader.read_u64_le()?;
            let raw = reader.read_u8()?;
            let body_state = BodyState::from_u8(raw)
                .ok_or_else(|| AnimError::ParseError(format!("Invalid body state {raw}")))?;
            let combo = reader.read_u32_le()?;
            layers.push(SavedLayer {
                clip,
                started_at,
                body_state,
                combo,
            });
        }

        let overlay_count = reader.read_u32_le()?;
        let mut overlays = Vec::new();
        for _ in 0..overlay_count {
            let name = reader.read_line()?;
            let expires_at = reader.read_u64_le()?;
            overlays.push((name, expires_at));
        }
        Ok(Self { layers, overlays })
    }
}

impl Pose {
    /// Write active layers and overlays
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        let layers: Vec<_> = self.layers().collect();
        writer.write_u32_le(layers.len() as u32)?;
        for layer in layers {
            writer.write_line(layer.clip().name())?;
            writer.write_u64_le(layer.started_at())?;
            writer.write_u8(layer.body_state() as u8)?;
            writer.write_u32_le(layer.combo())?;
        }

        let overlays = self.lookup().overlays();
        writer.write_u32_le(overlays.len() as u32)?;
        for overlay in overlays {
            writer.write_line(overlay.name())?;
            writer.write_u64_le(overlay.expires_at())?;
        }
        Ok(())
    }

    /// Restore saved state on top of the current catalog
    ///
    /// Overlays and clips that no longer resolve are skipped with a warning.
    fn restore<M: ModelResolver + ?Sized>(&mut self, saved: SavedPose, resolver: &M, now: u64) {
        self.stop_all_anim();
        self.clear_overlays();
        self.set_last_update(now);

        for (name, expires_at) in saved.overlays {
            match resolver.resolve_overlay(&name) {
                Some(catalog) => self.add_overlay(catalog, expires_at),
                None => log::warn!("Saved overlay '{name}' not found, skipping"),
            }
        }
        for layer in saved.layers {
            let Some(clip) = self.lookup().find_clip(&layer.clip).map(Arc::clone) else {
                log::warn!("Saved clip '{}' not found, skipping", layer.clip);
                continue;
            };
            self.restore_layer(clip, layer.started_at, layer.body_state, layer.combo);
        }
    }

    /// Read state written by [`Pose::save`]
    pub fn load<R: Read, M: ModelResolver + ?Sized>(
        &mut self,
        reader: &mut R,
        resolver: &M,
        now: u64,
    ) -> Result<()> {
        let saved = SavedPose::read(reader)?;
        self.restore(saved, resolver, now);
        Ok(())
    }
}

impl ModelVisual {
    /// Write the instance state in the [`SAVE_VERSION`] layout
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.weapon_state() as u8)?;
        let head = self.head_rotation();
        writer.write_f32_le(head.x)?;
        writer.write_f32_le(head.y)?;
        writer.write_line(self.skeleton().map_or("", |sk| sk.name()))?;
        self.pose().save(writer)
    }

    /// Read state saved with format `version`
    ///
    /// Older versions lack the head rotation, which then defaults to zero.
    /// An empty or unresolvable skeleton name leaves the instance without a
    /// visual.
    pub fn load<R: Read, M: ModelResolver + ?Sized>(
        &mut self,
        reader: &mut R,
        version: u32,
        resolver: &M,
        now: u64,
    ) -> Result<()> {
        if version == 0 || version > SAVE_VERSION {
            return Err(AnimError::UnsupportedVersion(version));
        }

        let raw = reader.read_u8()?;
        let weapon = WeaponState::from_u8(raw)
            .ok_or_else(|| AnimError::ParseError(format!("Invalid weapon state {raw}")))?;
        let head = if version >= HEAD_ROTATION_VERSION {
            let x = reader.read_f32_le()?;
            let y = reader.read_f32_le()?;
            Vec2::new(x, y)
        } else {
            Vec2::ZERO
        };
        let mut name = reader.read_line()?;
        if version <= LEGACY_EXTENSION_VERSION {
            name = exchange_extension(&name, "MDH", "MDS");
        }
        let saved = SavedPose::read(reader)?;

        match resolver.resolve_visual(&name) {
            Some((skeleton, catalog)) => self.set_visual(Some(skeleton), Some(catalog)),
            None => {
                if !name.is_empty() {
                    log::warn!("Saved visual '{name}' not found");
                }
                self.set_visual(None, None);
            }
        }
        self.restore_state(weapon, head);
        self.pose_mut().restore(saved, resolver, now);
        self.sync_attaches();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::SlotRole;
    use crate::clip::{Clip, ClipData, ClipFlags, ClipHeader};
    use crate::selector::{Action, WalkBits};
    use crate::skeleton::SkeletonNode;
    use glam::Mat4;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Cursor;
    use test_case::test_case;

    struct Models {
        visuals: HashMap<String, (Arc<Skeleton>, Arc<Catalog>)>,
        overlays: HashMap<String, Arc<Catalog>>,
    }

    impl ModelResolver for Models {
        fn resolve_visual(&self, name: &str) -> Option<(Arc<Skeleton>, Arc<Catalog>)> {
            self.visuals.get(name).cloned()
        }

        fn resolve_overlay(&self, name: &str) -> Option<Arc<Catalog>> {
            self.overlays.get(name).cloned()
        }
    }

    fn catalog(model: &str, clips: &[&str]) -> Arc<Catalog> {
        let header = ClipHeader {
            num_frames: 10,
            num_nodes: 1,
            fps: 10.0,
            ..ClipHeader::default()
        };
        let data = Arc::new(ClipData::new(header, vec![0], vec![Default::default(); 10]));
        let mut catalog = Catalog::new(model);
        for name in clips {
            catalog.push(Clip::new(*name, Arc::clone(&data)).with_flags(ClipFlags::IDLE));
        }
        Arc::new(catalog)
    }

    fn models() -> Models {
        let nodes = vec![
            SkeletonNode::new("BIP01", None, Mat4::IDENTITY),
            SkeletonNode::new("ZS_RIGHTHAND", Some(0), Mat4::IDENTITY),
        ];
        let skeleton = Arc::new(Skeleton::new("HUMANS.MDS", nodes).unwrap());
        let mut visuals = HashMap::new();
        visuals.insert(
            "HUMANS.MDS".to_string(),
            (skeleton, catalog("HUMANS", &["S_RUN", "S_1HRUN"])),
        );
        let mut overlays = HashMap::new();
        overlays.insert("HUMANS_MILITIA".to_string(), catalog("HUMANS_MILITIA", &["S_1HRUN"]));
        Models { visuals, overlays }
    }

    fn saved_visual(models: &Models) -> Vec<u8> {
        let mut visual = ModelVisual::new();
        let (skeleton, base) = models.resolve_visual("HUMANS.MDS").unwrap();
        visual.set_visual(Some(skeleton), Some(base));
        visual.add_overlay(models.resolve_overlay("HUMANS_MILITIA").unwrap(), 9000);
        visual.set_to_fight_mode(WeaponState::W1H);
        visual.set_head_rotation(10.0, -5.0);
        visual.start_anim_and_get(Action::Idle, 0, WeaponState::W1H, WalkBits::empty(), false, 1200);

        let mut out = Vec::new();
        visual.save(&mut out).unwrap();
        out
    }

    #[test]
    fn test_save_then_load_restores_state() {
        let models = models();
        let data = saved_visual(&models);

        let mut loaded = ModelVisual::new();
        loaded
            .load(&mut Cursor::new(data), SAVE_VERSION, &models, 1500)
            .unwrap();

        assert_eq!(loaded.weapon_state(), WeaponState::W1H);
        assert_eq!(loaded.head_rotation(), Vec2::new(10.0, -5.0));
        assert_eq!(loaded.skeleton().unwrap().name(), "HUMANS.MDS");
        assert!(loaded.has_overlay("HUMANS_MILITIA"));
        // the restored one-hander is seated in the right hand
        assert_eq!(loaded.attachments().bone_index(SlotRole::Sword), Some(1));

        let layer = loaded.pose().layers().next().unwrap();
        assert_eq!(layer.clip().name(), "S_1HRUN");
        assert_eq!(layer.started_at(), 1200);
        assert_eq!(layer.body_state(), BodyState::Stand);
    }

    #[test]
    fn test_legacy_version_without_head_rotation() {
        let models = models();
        let mut data = Vec::new();
        data.write_u8(WeaponState::Bow as u8).unwrap();
        data.write_line("HUMANS.MDH").unwrap();
        data.write_u32_le(1).unwrap();
        data.write_line("S_RUN").unwrap();
        data.write_u64_le(40).unwrap();
        data.write_u8(BodyState::Run as u8).unwrap();
        data.write_u32_le(0).unwrap();
        data.write_u32_le(1).unwrap();
        data.write_line("HUMANS_GONE").unwrap();
        data.write_u64_le(0).unwrap();

        let mut loaded = ModelVisual::new();
        loaded
            .load(&mut Cursor::new(data), 26, &models, 100)
            .unwrap();
        assert_eq!(loaded.weapon_state(), WeaponState::Bow);
        assert_eq!(loaded.head_rotation(), Vec2::ZERO);
        assert_eq!(loaded.skeleton().unwrap().name(), "HUMANS.MDS");
        assert!(!loaded.has_overlay("HUMANS_GONE"));
        assert!(loaded.pose().is_in_anim("S_RUN"));
    }

    #[test_case(0 ; "zero")]
    #[test_case(SAVE_VERSION + 1 ; "newer")]
    fn test_unsupported_version(version: u32) {
        let mut visual = ModelVisual::new();
        let result = visual.load(&mut Cursor::new(Vec::new()), version, &models(), 0);
        assert!(matches!(result, Err(AnimError::UnsupportedVersion(v)) if v == version));
    }

    #[test]
    fn test_invalid_weapon_state() {
        let mut visual = ModelVisual::new();
        let result = visual.load(&mut Cursor::new(vec![9u8]), SAVE_VERSION, &models(), 0);
        assert!(matches!(result, Err(AnimError::ParseError(_))));
    }

    #[test_case("HUMANS.MDH", "HUMANS.MDS")]
    #[test_case("humans.mdh", "humans.MDS")]
    #[test_case("HUMANS.MDS", "HUMANS.MDS")]
    #[test_case("HUMANS", "HUMANS")]
    fn test_exchange_extension(input: &str, expected: &str) {
        assert_eq!(exchange_extension(input, "MDH", "MDS"), expected);
    }
}
