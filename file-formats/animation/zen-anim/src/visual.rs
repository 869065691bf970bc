//! Per-instance animation façade
//!
//! [`ModelVisual`] ties the playback engine, the clip selector and the
//! attachment graph of one character together. It owns the root transform,
//! the readied weapon state and the movement mode, and keeps the instance
//! idling whenever its last clip stops.

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use rand::Rng;

use crate::attach::{Attachments, SlotRole, VisualHandle};
use crate::catalog::Catalog;
use crate::clip::Clip;
use crate::pose::{Pose, PoseOptions, StartHint};
use crate::selector::{Action, BodyState, FightMode, InteractionTable, WalkBits, WeaponState};
use crate::skeleton::{ROOT_BONE, Skeleton};

/// Number of dialogue gesture clips (`T_DIALOGGESTURE_01` ..)
pub const DIALOG_GESTURES: u32 = 11;

/// Face animation restored when dialogue gestures stop
pub const DEFAULT_FACE_ANIM: &str = "VISEME";

fn gesture_name(id: u32) -> String {
    format!("T_DIALOGGESTURE_{id:02}")
}

/// Animation state and attachments of one instance
#[derive(Debug, Default)]
pub struct ModelVisual {
    pose: Pose,
    attach: Attachments,
    skeleton: Option<Arc<Skeleton>>,
    root: Mat4,
    weapon: WeaponState,
    /// Carried melee weapon is two-handed
    two_handed: bool,
    /// Carried ranged weapon is a crossbow
    crossbow: bool,
    walk: WalkBits,
    head_rotation: Vec2,
    interaction: Option<InteractionTable>,
}

impl ModelVisual {
    pub fn new() -> Self {
        Self {
            root: Mat4::IDENTITY,
            ..Self::default()
        }
    }

    pub fn with_options(options: PoseOptions) -> Self {
        Self {
            pose: Pose::with_options(options),
            root: Mat4::IDENTITY,
            ..Self::default()
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn pose_mut(&mut self) -> &mut Pose {
        &mut self.pose
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attach
    }

    pub fn skeleton(&self) -> Option<&Arc<Skeleton>> {
        self.skeleton.as_ref()
    }

    /// Swap skeleton and base catalog
    ///
    /// Attachments are re-resolved by bone name when both the old and the
    /// new skeleton are present.
    pub fn set_visual(&mut self, skeleton: Option<Arc<Skeleton>>, catalog: Option<Arc<Catalog>>) {
        if let (Some(from), Some(to)) = (self.skeleton.as_deref(), skeleton.as_deref()) {
            log::debug!("Rebinding attachments from '{}' to '{}'", from.name(), to.name());
            self.attach.rebind(from, to);
        }
        self.pose.set_skeleton(skeleton.clone());
        self.pose.set_catalog(catalog);
        self.skeleton = skeleton;
        self.set_obj_matrix(self.root, true);
    }

    /// Keep or drop the horizontal root translation of clips
    pub fn set_translation_enabled(&mut self, enabled: bool) {
        self.pose.set_translation_enabled(enabled);
    }

    pub fn add_overlay(&mut self, catalog: Arc<Catalog>, expires_at: u64) {
        self.pose.add_overlay(catalog, expires_at);
    }

    pub fn remove_overlay(&mut self, name: &str) -> bool {
        self.pose.remove_overlay(name)
    }

    pub fn has_overlay(&self, name: &str) -> bool {
        self.pose.has_overlay(name)
    }

    pub fn clear_overlays(&mut self) {
        self.pose.clear_overlays();
    }

    pub fn walk_mode(&self) -> WalkBits {
        self.walk
    }

    pub fn set_walk_mode(&mut self, walk: WalkBits) {
        self.walk = walk;
    }

    /// Clip table of the interactive object in use, if any
    pub fn set_interaction(&mut self, table: Option<InteractionTable>) {
        self.interaction = table;
    }

    pub fn interaction(&self) -> Option<&InteractionTable> {
        self.interaction.as_ref()
    }

    pub fn interaction_mut(&mut self) -> Option<&mut InteractionTable> {
        self.interaction.as_mut()
    }

    /// Start the clip for a semantic action
    ///
    /// Death and knock-out stop everything first and always interrupt;
    /// stumbling and hanging interrupt unless `no_interrupt` is set.
    /// [`Action::NoAnim`] stops every clip. Returns the started clip.
    pub fn start_anim_and_get(
        &mut self,
        action: Action,
        combo: u32,
        weapon: WeaponState,
        walk: WalkBits,
        no_interrupt: bool,
        now: u64,
    ) -> Option<Arc<Clip>> {
        if action.is_interaction() {
            let table = self.interaction.as_ref()?;
            let clip = Arc::clone(self.pose.selector().solve_interaction(table, action)?);
            let started =
                self.pose
                    .start_anim(&clip, combo, BodyState::MobInteract, StartHint::empty(), now);
            return started.then_some(clip);
        }

        if action == Action::NoAnim {
            self.pose.stop_all_anim();
            return None;
        }

        let snapshot = self.pose.snapshot();
        let clip = Arc::clone(
            self.pose
                .selector()
                .solve_anim(action, weapon, walk, &snapshot)?,
        );

        let mut force = false;
        if action.is_terminal() {
            self.pose.stop_all_anim();
            force = true;
        }
        if !no_interrupt && action.interrupts() {
            force = true;
        }

        let mut hint = StartHint::empty();
        hint.set(StartHint::FORCE, force);
        hint.set(StartHint::NO_INTERRUPT, no_interrupt);
        let body_state = action.body_state(walk);
        self.pose
            .start_anim(&clip, combo, body_state, hint, now)
            .then_some(clip)
    }

    /// Start a clip by exact name
    pub fn start_anim_by_name(
        &mut self,
        name: &str,
        combo: u32,
        force: bool,
        body_state: BodyState,
        now: u64,
    ) -> Option<Arc<Clip>> {
        let clip = Arc::clone(self.pose.selector().solve_frm(name)?);
        let hint = if force {
            StartHint::FORCE
        } else {
            StartHint::empty()
        };
        self.pose
            .start_anim(&clip, combo, body_state, hint, now)
            .then_some(clip)
    }

    pub fn is_anim_exist(&self, name: &str) -> bool {
        self.pose.selector().solve_frm(name).is_some()
    }

    /// Start the draw or sheathe transition towards `target`
    ///
    /// Already being in `target` counts as success.
    pub fn start_weapon_anim(&mut self, target: WeaponState, now: u64) -> bool {
        if target == self.weapon {
            return true;
        }
        let run = self.pose.body_state() == BodyState::Run;
        let Some(clip) = self
            .pose
            .selector()
            .solve_weapon_switch(target, self.weapon, run)
            .map(Arc::clone)
        else {
            return false;
        };
        let body_state = if run { BodyState::Run } else { BodyState::None };
        self.pose
            .start_anim(&clip, 0, body_state, StartHint::empty(), now)
    }

    /// Chain the next combo attack, or start the action normally
    pub fn continue_combo(
        &mut self,
        action: Action,
        weapon: WeaponState,
        walk: WalkBits,
        now: u64,
    ) -> Option<Arc<Clip>> {
        if weapon.has_combo() {
            let snapshot = self.pose.snapshot();
            let clip = self
                .pose
                .selector()
                .solve_anim(action, weapon, walk, &snapshot)
                .map(Arc::clone);
            if let Some(clip) = clip {
                if let Some(chained) = self.pose.continue_combo(&clip, now) {
                    return Some(chained);
                }
            }
        }
        self.start_anim_and_get(action, 0, weapon, walk, false, now)
    }

    pub fn combo_length(&self) -> u32 {
        self.pose.combo_length()
    }

    fn idle_if_empty(&mut self, now: u64) {
        if !self.pose.has_anim() {
            let (weapon, walk) = (self.weapon, self.walk);
            if self
                .start_anim_and_get(Action::Idle, 0, weapon, walk, false, now)
                .is_none()
            {
                log::debug!("No idle clip for {weapon:?} ({walk:?})");
            }
        }
    }

    /// Stop a clip by name; an empty pose falls back to idle
    pub fn stop_anim(&mut self, name: &str, now: u64) {
        self.pose.stop_anim(name);
        self.idle_if_empty(now);
    }

    /// Stop locomotion clips; an empty pose falls back to idle
    pub fn stop_walk_anim(&mut self, now: u64) {
        self.pose.stop_walk_anim();
        self.idle_if_empty(now);
    }

    /// Stop everything and fall back to idle
    pub fn stop_all_anim(&mut self, now: u64) {
        self.pose.stop_all_anim();
        self.idle_if_empty(now);
    }

    /// Start the cast (`invest`) or release clip of a spell scheme
    pub fn start_anim_spell(&mut self, scheme: &str, invest: bool, now: u64) -> bool {
        let name = if invest {
            format!("S_{scheme}CAST")
        } else {
            format!("S_{scheme}SHOOT")
        };
        self.start_anim_by_name(&name, 0, false, BodyState::Casting, now)
            .is_some()
    }

    /// Play a random dialogue gesture
    ///
    /// Only an unarmed, standing instance gestures; otherwise nothing starts
    /// and the call still reports success.
    pub fn start_anim_dialog(&mut self, now: u64) -> bool {
        self.start_anim_dialog_with(&mut rand::rng(), now)
    }

    /// [`start_anim_dialog`](Self::start_anim_dialog) with a caller-provided
    /// random source
    pub fn start_anim_dialog_with<R: Rng + ?Sized>(&mut self, rng: &mut R, now: u64) -> bool {
        if self.weapon != WeaponState::NoWeapon || self.pose.body_state() != BodyState::Stand {
            return true;
        }
        let name = gesture_name(rng.random_range(1..=DIALOG_GESTURES));
        self.start_anim_by_name(&name, 0, false, BodyState::Stand, now)
            .is_some()
    }

    /// Stop every dialogue gesture and reset the face
    pub fn stop_dlg_anim(&mut self, now: u64) {
        for id in 1..=DIALOG_GESTURES {
            self.pose.stop_anim(&gesture_name(id));
        }
        self.start_face_anim(DEFAULT_FACE_ANIM, 1.0, 0, now);
        self.idle_if_empty(now);
    }

    /// Play a face animation on the head for `duration` ticks
    ///
    /// A duration of `0` or `u64::MAX` is passed through unchanged.
    pub fn start_face_anim(&mut self, anim: &str, intensity: f32, duration: u64, now: u64) -> bool {
        let until = if duration == 0 || duration == u64::MAX {
            duration
        } else {
            duration.saturating_add(now)
        };
        self.attach.start_face_anim(anim, intensity, until)
    }

    /// Play a morph animation on every attachment bound to `bone`
    pub fn start_mm_anim(&mut self, anim: &str, bone: &str) {
        self.attach.start_morph_anim(anim, bone);
    }

    pub fn weapon_state(&self) -> WeaponState {
        self.weapon
    }

    /// Switch the readied weapon state; the same state reports no change
    ///
    /// Weapon slots are re-seated for the new state.
    pub fn set_to_fight_mode(&mut self, weapon: WeaponState) -> bool {
        if weapon == self.weapon {
            return false;
        }
        log::debug!("Fight mode {:?} -> {weapon:?}", self.weapon);
        self.weapon = weapon;
        let (two_handed, crossbow) = (self.two_handed, self.crossbow);
        self.update_weapon_skeleton(two_handed, crossbow);
        true
    }

    /// Switch by script fight mode; `FightMode::Last` is rejected
    pub fn set_fight_mode(&mut self, mode: FightMode) -> bool {
        match mode.weapon_state() {
            Some(weapon) => self.set_to_fight_mode(weapon),
            None => false,
        }
    }

    /// Re-seat weapons for the current weapon state and sync
    ///
    /// `two_handed` and `crossbow` describe the carried weapons and are kept
    /// for later fight mode switches.
    pub fn update_weapon_skeleton(&mut self, two_handed: bool, crossbow: bool) {
        self.two_handed = two_handed;
        self.crossbow = crossbow;
        self.attach
            .update_weapon_skeleton(self.weapon, two_handed, crossbow, self.skeleton.as_deref());
        self.sync_attaches();
    }

    /// World matrix at which a readied melee or ranged weapon is dropped
    pub fn drop_weapon_matrix(&self) -> Option<Mat4> {
        if !(self.weapon.is_melee() || self.weapon.is_ranged()) {
            return None;
        }
        let matrix = self
            .attach
            .world_matrix(SlotRole::Sword, self.root, self.pose.bones())
            .unwrap_or(self.root);
        Some(matrix)
    }

    /// Offset of bone `index` from the root position, in world space
    pub fn map_bone(&self, index: Option<usize>) -> Vec3 {
        let Some(bone) = index.and_then(|i| self.pose.bone(i)) else {
            return Vec3::ZERO;
        };
        let world = self.root * bone;
        world.w_axis.truncate() - self.root.w_axis.truncate()
    }

    /// Offset of the bone a projectile leaves from
    pub fn map_weapon_bone(&self) -> Vec3 {
        match self.weapon {
            WeaponState::Bow | WeaponState::CBow => {
                self.map_bone(self.attach.bone_index(SlotRole::Ammunition))
            }
            WeaponState::Mage => {
                let hand = self
                    .skeleton
                    .as_ref()
                    .and_then(|sk| sk.find_node("ZS_RIGHTHAND"));
                self.map_bone(hand)
            }
            _ => Vec3::ZERO,
        }
    }

    /// Facing angle in degrees, taken from the root bone
    pub fn view_direction(&self) -> f32 {
        let mut m = self.root;
        if let Some(bone) = self
            .skeleton
            .as_ref()
            .and_then(|sk| sk.find_node(ROOT_BONE))
            .and_then(|i| self.pose.bone(i))
        {
            m *= bone;
        }
        m.z_axis.z.atan2(m.z_axis.x).to_degrees()
    }

    /// Anchor for name plates and speech bubbles, relative to the root
    pub fn display_position(&self) -> Vec3 {
        self.skeleton
            .as_ref()
            .map_or(Vec3::ZERO, |sk| Vec3::new(0.0, sk.collision_height() * 1.5, 0.0))
    }

    pub fn obj_matrix(&self) -> Mat4 {
        self.root
    }

    pub fn position(&self) -> Vec3 {
        self.root.w_axis.truncate()
    }

    pub fn set_position(&mut self, position: Vec3, sync: bool) {
        self.root.w_axis = position.extend(1.0);
        if sync {
            self.sync_attaches();
        }
    }

    pub fn set_obj_matrix(&mut self, matrix: Mat4, sync: bool) {
        self.root = matrix;
        if sync {
            self.sync_attaches();
        }
    }

    pub fn head_rotation(&self) -> Vec2 {
        self.head_rotation
    }

    /// Turn the head (degrees around X, then Y)
    pub fn set_head_rotation(&mut self, x: f32, y: f32) {
        self.head_rotation = Vec2::new(x, y);
        self.sync_attaches();
    }

    /// Bind a handle to a bone for a unique attachment role
    pub fn bind(
        &mut self,
        role: SlotRole,
        handle: Option<Box<dyn VisualHandle>>,
        bone: &str,
    ) -> bool {
        let bound = self
            .attach
            .bind(role, handle, bone, self.skeleton.as_deref());
        self.sync_attaches();
        bound
    }

    pub fn set_slot_item(&mut self, handle: Box<dyn VisualHandle>, bone: &str) -> bool {
        let placed = self
            .attach
            .set_slot_item(handle, bone, self.skeleton.as_deref());
        if placed {
            self.sync_attaches();
        }
        placed
    }

    pub fn clear_slot_item(&mut self, bone: &str) -> bool {
        self.attach.clear_slot_item(bone, self.skeleton.as_deref())
    }

    pub fn set_state_item(&mut self, handle: Option<Box<dyn VisualHandle>>, bone: &str) -> bool {
        self.bind(SlotRole::StateItem, handle, bone)
    }

    pub fn set_torch(&mut self, handle: Option<Box<dyn VisualHandle>>) {
        self.attach.set_torch(handle, self.skeleton.as_deref());
        self.sync_attaches();
    }

    /// Replace the body mesh and the attachments it declares
    pub fn set_body<I>(&mut self, body: Option<Box<dyn VisualHandle>>, attachments: I)
    where
        I: IntoIterator<Item = (String, Box<dyn VisualHandle>)>,
    {
        self.attach
            .set_body_attachments(attachments, self.skeleton.as_deref());
        self.attach.set_body(body);
        self.sync_attaches();
    }

    /// Start an effect lasting `duration` ticks (`0` = until stopped)
    pub fn start_effect(
        &mut self,
        handle: Box<dyn VisualHandle>,
        id: i32,
        no_slot: bool,
        duration: u64,
        now: u64,
    ) {
        let expires_at = if duration == 0 {
            0
        } else {
            now.saturating_add(duration)
        };
        self.attach.start_effect(handle, id, no_slot, expires_at);
        self.sync_attaches();
    }

    pub fn stop_effect(&mut self, id: i32) -> bool {
        self.attach.stop_effect(id)
    }

    /// Replace the magic weapon effect; the previous one plays out for
    /// `handoff_duration` ticks
    pub fn set_magic_weapon(
        &mut self,
        handle: Option<Box<dyn VisualHandle>>,
        handoff_duration: u64,
        now: u64,
    ) {
        let until = if handoff_duration == 0 {
            0
        } else {
            now.saturating_add(handoff_duration)
        };
        self.attach.set_magic_effect(handle, until);
        self.sync_attaches();
    }

    /// Set the ambient effect and the ghost flag of the instance
    pub fn set_npc_effect(
        &mut self,
        name: &str,
        handle: Option<Box<dyn VisualHandle>>,
        ghost: bool,
    ) {
        self.attach.set_ambient(name, handle);
        self.attach.set_ghost(ghost);
        self.sync_attaches();
    }

    /// Push world matrices to every attachment
    pub fn sync_attaches(&mut self) {
        self.attach
            .sync(self.root, self.pose.bones(), self.head_rotation);
    }

    /// Advance one tick
    ///
    /// Expired effects go first, then playback advances; an instance whose
    /// last clip ended falls back to idle. Attachments are synced when bones
    /// changed. Returns that flag.
    pub fn update_animation(&mut self, now: u64) -> bool {
        let expired = self.attach.expire_effects(now);
        if expired > 0 {
            log::trace!("{expired} effect(s) expired at {now}");
        }

        let mut changed = self.pose.update(now);
        if !self.pose.has_anim() {
            self.idle_if_empty(now);
            changed |= self.pose.update(now);
        }
        if changed {
            self.sync_attaches();
        }
        changed
    }

    /// Root motion accumulated since the last call
    pub fn take_motion(&mut self) -> Vec3 {
        self.pose.take_motion()
    }

    /// Yaw (degrees) accumulated since the last call
    pub fn take_rotation(&mut self) -> f32 {
        self.pose.take_rotation()
    }

    pub(crate) fn restore_state(&mut self, weapon: WeaponState, head_rotation: Vec2) {
        self.weapon = weapon;
        self.head_rotation = head_rotation;
        let (two_handed, crossbow) = (self.two_handed, self.crossbow);
        self.update_weapon_skeleton(two_handed, crossbow);
    }
}
