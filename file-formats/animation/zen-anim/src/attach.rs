//! Attachment graph: external visuals bound to skeleton bones
//!
//! Every bone-anchored attachment is a [`Slot`]: a logical role, a
//! [`BoneBinding`] and the owned handle. Bindings keep the bone name next to
//! the last resolved index, so a skeleton swap re-resolves them by name.
//! Effects, the magic weapon effect, the ambient effect and the body mesh
//! follow the root transform only.

use std::fmt;

use glam::{Mat4, Vec2};

use crate::selector::WeaponState;
use crate::skeleton::Skeleton;

/// Bone carrying a torch
pub const TORCH_BONE: &str = "ZS_LEFTHAND";

/// An external visual object (mesh, particle system, ...)
///
/// The animation core only pushes state into handles and never reads back.
pub trait VisualHandle: Send {
    /// Set the world matrix of the visual
    fn set_obj_matrix(&mut self, world: Mat4);

    fn set_as_ghost(&mut self, _ghost: bool) {}

    fn set_active(&mut self, _active: bool) {}

    fn set_looped(&mut self, _looped: bool) {}

    /// Start a morph (face) animation, running until tick `until`
    fn start_morph_anim(&mut self, _anim: &str, _intensity: f32, _until: u64) {}
}

/// Logical role of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotRole {
    Head,
    Sword,
    Bow,
    Ammunition,
    StateItem,
    Torch,
    /// Item placed on a named bone by scripts
    Item,
    /// Attachment declared by the body mesh
    BodyAttachment,
}

impl SlotRole {
    /// Roles with at most one slot per instance
    pub const fn is_unique(self) -> bool {
        !matches!(self, Self::Item | Self::BodyAttachment)
    }
}

/// A bone name with the index it last resolved to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoneBinding {
    name: String,
    index: Option<usize>,
}

impl BoneBinding {
    /// Resolve `name` in `skeleton`; an unknown name leaves the binding unbound
    pub fn resolve(skeleton: Option<&Skeleton>, name: &str) -> Self {
        Self {
            name: name.to_string(),
            index: skeleton.and_then(|sk| sk.find_node(name)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_bound(&self) -> bool {
        self.index.is_some()
    }

    /// Re-resolve after a skeleton swap
    ///
    /// An empty name falls back to the name the bone had in `from`. Unbound
    /// bindings stay unbound.
    pub fn rebind(&mut self, from: &Skeleton, to: &Skeleton) {
        let Some(index) = self.index else {
            return;
        };
        let Some(old_name) = from.node_name(index) else {
            return;
        };
        let name = if self.name.is_empty() {
            old_name
        } else {
            self.name.as_str()
        };
        self.index = to.find_node(name);
    }
}

/// A bone-anchored attachment
pub struct Slot {
    role: SlotRole,
    binding: BoneBinding,
    handle: Option<Box<dyn VisualHandle>>,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("role", &self.role)
            .field("binding", &self.binding)
            .field("has_handle", &self.handle.is_some())
            .finish()
    }
}

impl Slot {
    pub fn role(&self) -> SlotRole {
        self.role
    }

    pub fn binding(&self) -> &BoneBinding {
        &self.binding
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }
}

/// A root-anchored effect with an id and an expiry tick (`0` = never)
pub struct EffectSlot {
    id: i32,
    no_slot: bool,
    expires_at: u64,
    handle: Box<dyn VisualHandle>,
}

impl fmt::Debug for EffectSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectSlot")
            .field("id", &self.id)
            .field("no_slot", &self.no_slot)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl EffectSlot {
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Effects outside the id table are never replaced by id
    pub fn is_no_slot(&self) -> bool {
        self.no_slot
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }
}

/// All attachments of one instance
#[derive(Default)]
pub struct Attachments {
    slots: Vec<Slot>,
    effects: Vec<EffectSlot>,
    magic: Option<Box<dyn VisualHandle>>,
    magic_active: bool,
    ambient: Option<(String, Box<dyn VisualHandle>)>,
    body: Option<Box<dyn VisualHandle>>,
    ghost: bool,
}

impl fmt::Debug for Attachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachments")
            .field("slots", &self.slots)
            .field("effects", &self.effects)
            .field("magic", &self.magic.is_some())
            .field("ambient", &self.ambient.as_ref().map(|(n, _)| n))
            .field("body", &self.body.is_some())
            .field("ghost", &self.ghost)
            .finish()
    }
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// The slot of a unique role
    pub fn slot(&self, role: SlotRole) -> Option<&Slot> {
        self.slots.iter().find(|s| s.role == role)
    }

    /// Resolved bone index of a unique role
    pub fn bone_index(&self, role: SlotRole) -> Option<usize> {
        self.slot(role).and_then(|s| s.binding.index)
    }

    /// Bind `handle` to `bone` for a unique role, replacing its previous
    /// handle and binding
    ///
    /// Returns whether the bone resolved.
    pub fn bind(
        &mut self,
        role: SlotRole,
        handle: Option<Box<dyn VisualHandle>>,
        bone: &str,
        skeleton: Option<&Skeleton>,
    ) -> bool {
        let binding = BoneBinding::resolve(skeleton, bone);
        let bound = binding.is_bound();
        if !bound && !bone.is_empty() {
            log::debug!("Bone '{bone}' not found, {role:?} slot left unbound");
        }
        match self.slots.iter_mut().find(|s| s.role == role) {
            Some(slot) => {
                slot.binding = binding;
                slot.handle = handle;
            }
            None => self.slots.push(Slot {
                role,
                binding,
                handle,
            }),
        }
        bound
    }

    /// Move a unique role to another bone, keeping its handle
    pub fn bind_bone(&mut self, role: SlotRole, bone: &str, skeleton: Option<&Skeleton>) -> bool {
        let binding = BoneBinding::resolve(skeleton, bone);
        let bound = binding.is_bound();
        match self.slots.iter_mut().find(|s| s.role == role) {
            Some(slot) => slot.binding = binding,
            None => self.slots.push(Slot {
                role,
                binding,
                handle: None,
            }),
        }
        bound
    }

    /// Remove the slot of a unique role
    pub fn unbind(&mut self, role: SlotRole) -> bool {
        let before = self.slots.len();
        self.slots.retain(|s| s.role != role);
        before != self.slots.len()
    }

    /// Place an item on a named bone
    ///
    /// An item already on the same bone is replaced. Items never go on the
    /// bone occupied by a visible head.
    pub fn set_slot_item(
        &mut self,
        handle: Box<dyn VisualHandle>,
        bone: &str,
        skeleton: Option<&Skeleton>,
    ) -> bool {
        self.place(SlotRole::Item, handle, bone, skeleton, true)
    }

    /// Remove the item on `bone`, or the first item when `bone` is unknown
    pub fn clear_slot_item(&mut self, bone: &str, skeleton: Option<&Skeleton>) -> bool {
        let index = skeleton.and_then(|sk| sk.find_node(bone));
        let found = self
            .slots
            .iter()
            .position(|s| {
                s.role == SlotRole::Item && (index.is_none() || s.binding.index == index)
            });
        match found {
            Some(pos) => {
                self.slots.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn item_count(&self) -> usize {
        self.slots.iter().filter(|s| s.role == SlotRole::Item).count()
    }

    /// Replace the attachments declared by the body mesh
    ///
    /// Returns how many bound.
    pub fn set_body_attachments<I>(&mut self, attachments: I, skeleton: Option<&Skeleton>) -> usize
    where
        I: IntoIterator<Item = (String, Box<dyn VisualHandle>)>,
    {
        self.slots.retain(|s| s.role != SlotRole::BodyAttachment);
        let mut bound = 0;
        for (bone, mut handle) in attachments {
            handle.set_as_ghost(self.ghost);
            if self.place(SlotRole::BodyAttachment, handle, &bone, skeleton, false) {
                bound += 1;
            }
        }
        bound
    }

    fn place(
        &mut self,
        role: SlotRole,
        handle: Box<dyn VisualHandle>,
        bone: &str,
        skeleton: Option<&Skeleton>,
        avoid_head: bool,
    ) -> bool {
        let Some(skeleton) = skeleton else {
            return false;
        };
        if bone.is_empty() {
            return false;
        }
        let Some(index) = skeleton.find_node(bone) else {
            log::debug!("Bone '{bone}' not found for {role:?}");
            return false;
        };

        // Some armours put items on the head bone; the head mesh wins.
        if avoid_head
            && self
                .slot(SlotRole::Head)
                .is_some_and(|h| h.binding.index == Some(index) && h.handle.is_some())
        {
            return false;
        }

        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.role == role && s.binding.index == Some(index))
        {
            slot.handle = Some(handle);
            return true;
        }

        let name = skeleton.node_name(index).unwrap_or(bone);
        self.slots.push(Slot {
            role,
            binding: BoneBinding::resolve(Some(skeleton), name),
            handle: Some(handle),
        });
        true
    }

    /// Carry a torch in the left hand, or drop it with `None`
    pub fn set_torch(
        &mut self,
        handle: Option<Box<dyn VisualHandle>>,
        skeleton: Option<&Skeleton>,
    ) {
        match handle {
            Some(handle) => {
                self.bind(SlotRole::Torch, Some(handle), TORCH_BONE, skeleton);
            }
            None => {
                self.unbind(SlotRole::Torch);
            }
        }
    }

    pub fn has_torch(&self) -> bool {
        self.slot(SlotRole::Torch).is_some_and(Slot::has_handle)
    }

    /// Set the body mesh
    pub fn set_body(&mut self, handle: Option<Box<dyn VisualHandle>>) {
        self.body = handle.map(|mut h| {
            h.set_as_ghost(self.ghost);
            h
        });
    }

    /// Start an effect under `id`
    ///
    /// An effect with the same id that is not a no-slot effect is replaced.
    pub fn start_effect(
        &mut self,
        handle: Box<dyn VisualHandle>,
        id: i32,
        no_slot: bool,
        expires_at: u64,
    ) {
        if let Some(effect) = self.effects.iter_mut().find(|e| e.id == id && !e.no_slot) {
            effect.handle = handle;
            effect.expires_at = expires_at;
            return;
        }
        self.effects.push(EffectSlot {
            id,
            no_slot,
            expires_at,
            handle,
        });
    }

    /// Stop the first effect with this id
    pub fn stop_effect(&mut self, id: i32) -> bool {
        match self.effects.iter().position(|e| e.id == id) {
            Some(pos) => {
                self.effects.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn effects(&self) -> &[EffectSlot] {
        &self.effects
    }

    pub fn has_effect(&self, id: i32) -> bool {
        self.effects.iter().any(|e| e.id == id)
    }

    /// Drop effects that expired at `now`; returns how many were removed
    pub fn expire_effects(&mut self, now: u64) -> usize {
        let before = self.effects.len();
        self.effects
            .retain(|e| e.expires_at == 0 || e.expires_at >= now);
        before - self.effects.len()
    }

    /// Replace the magic weapon effect
    ///
    /// The previous effect keeps playing out as a one-shot no-slot effect
    /// until `handoff_expires_at`.
    pub fn set_magic_effect(
        &mut self,
        handle: Option<Box<dyn VisualHandle>>,
        handoff_expires_at: u64,
    ) {
        if let Some(mut previous) = self.magic.take() {
            previous.set_looped(false);
            self.start_effect(previous, 0, true, handoff_expires_at);
        }
        self.magic = handle.map(|mut h| {
            h.set_looped(true);
            h.set_active(self.magic_active);
            h
        });
    }

    pub fn has_magic_effect(&self) -> bool {
        self.magic.is_some()
    }

    pub fn is_magic_active(&self) -> bool {
        self.magic_active
    }

    /// Set the ambient effect; the same name keeps the running effect
    ///
    /// Returns whether the effect changed.
    pub fn set_ambient(&mut self, name: &str, handle: Option<Box<dyn VisualHandle>>) -> bool {
        if self.ambient.as_ref().is_some_and(|(n, _)| n == name) {
            return false;
        }
        self.ambient = handle.map(|mut h| {
            h.set_active(true);
            h.set_looped(true);
            (name.to_string(), h)
        });
        true
    }

    pub fn ambient_name(&self) -> Option<&str> {
        self.ambient.as_ref().map(|(n, _)| n.as_str())
    }

    /// Propagate the ghost flag to body, head and body attachments
    ///
    /// Returns whether the flag changed.
    pub fn set_ghost(&mut self, ghost: bool) -> bool {
        if self.ghost == ghost {
            return false;
        }
        self.ghost = ghost;
        if let Some(body) = self.body.as_mut() {
            body.set_as_ghost(ghost);
        }
        for slot in &mut self.slots {
            if matches!(slot.role, SlotRole::Head | SlotRole::BodyAttachment) {
                if let Some(handle) = slot.handle.as_mut() {
                    handle.set_as_ghost(ghost);
                }
            }
        }
        true
    }

    pub fn is_ghost(&self) -> bool {
        self.ghost
    }

    /// Move weapons between hands and holsters for `weapon`
    ///
    /// `two_handed` and `crossbow` describe the equipped weapons and pick the
    /// holster bones while nothing is drawn.
    pub fn update_weapon_skeleton(
        &mut self,
        weapon: WeaponState,
        two_handed: bool,
        crossbow: bool,
        skeleton: Option<&Skeleton>,
    ) {
        let sword = if weapon.is_melee() {
            "ZS_RIGHTHAND"
        } else if two_handed {
            "ZS_LONGSWORD"
        } else {
            "ZS_SWORD"
        };
        let bow = match weapon {
            WeaponState::Bow => "ZS_LEFTHAND",
            WeaponState::CBow => "ZS_RIGHTHAND",
            _ if crossbow => "ZS_CROSSBOW",
            _ => "ZS_BOW",
        };
        self.bind_bone(SlotRole::Sword, sword, skeleton);
        self.bind_bone(SlotRole::Bow, bow, skeleton);

        self.magic_active = weapon == WeaponState::Mage;
        if let Some(magic) = self.magic.as_mut() {
            magic.set_active(self.magic_active);
        }
    }

    /// Re-resolve every bound slot after a skeleton swap
    pub fn rebind(&mut self, from: &Skeleton, to: &Skeleton) {
        for slot in &mut self.slots {
            slot.binding.rebind(from, to);
        }
    }

    /// Forward a morph animation to handles bound to `bone`
    pub fn start_morph_anim(&mut self, anim: &str, bone: &str) {
        for slot in &mut self.slots {
            if !slot.role.is_unique() || slot.binding.name != bone {
                continue;
            }
            if let Some(handle) = slot.handle.as_mut() {
                handle.start_morph_anim(anim, 1.0, u64::MAX);
            }
        }
    }

    /// Forward a face animation to the head
    pub fn start_face_anim(&mut self, anim: &str, intensity: f32, until: u64) -> bool {
        let head = self
            .slots
            .iter_mut()
            .find(|s| s.role == SlotRole::Head)
            .and_then(|s| s.handle.as_mut());
        match head {
            Some(handle) => {
                handle.start_morph_anim(anim, intensity, until);
                true
            }
            None => false,
        }
    }

    /// World matrix of a bound slot
    pub fn world_matrix(&self, role: SlotRole, root: Mat4, bones: &[Mat4]) -> Option<Mat4> {
        let index = self.bone_index(role)?;
        bones.get(index).map(|bone| root * *bone)
    }

    /// Push world matrices to every handle
    ///
    /// Bone-anchored handles receive `root * bone`; unbound slots receive
    /// nothing. `head_rotation` (degrees around Y, then X) turns the head.
    pub fn sync(&mut self, root: Mat4, bones: &[Mat4], head_rotation: Vec2) {
        for slot in &mut self.slots {
            let Some(handle) = slot.handle.as_mut() else {
                continue;
            };
            let Some(bone) = slot.binding.index.and_then(|i| bones.get(i)) else {
                continue;
            };
            let mut world = root * *bone;
            if slot.role == SlotRole::Head && head_rotation != Vec2::ZERO {
                world = world
                    * Mat4::from_rotation_y(head_rotation.y.to_radians())
                    * Mat4::from_rotation_x(head_rotation.x.to_radians());
            }
            handle.set_obj_matrix(world);
        }

        for effect in &mut self.effects {
            effect.handle.set_obj_matrix(root);
        }
        let anchored = self
            .magic
            .iter_mut()
            .chain(self.ambient.iter_mut().map(|(_, h)| h))
            .chain(self.body.iter_mut());
        for handle in anchored {
            handle.set_obj_matrix(root);
        }
    }
}
