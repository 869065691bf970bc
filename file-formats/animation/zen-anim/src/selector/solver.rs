//! Naming-convention clip solver
//!
//! Clip names are composed from an action template, the weapon tag and the
//! movement tag, e.g. `S_1HRUNL`. When the composed name is missing from the
//! catalog the solver retries with the weapon tag dropped, then with the
//! movement tag replaced by `RUN`, and finally with both. The first name that
//! resolves wins. Templates use `{W}` for the weapon tag and `{M}` for the
//! movement tag.

use std::sync::Arc;

use crate::catalog::ClipLookup;
use crate::clip::Clip;

use super::action::{Action, BodyState, WalkBits, WeaponState};

/// The part of the current playback state that influences clip choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSnapshot<'a> {
    pub body_state: BodyState,
    /// Clip currently playing on the lowest layer
    pub base_clip: Option<&'a str>,
}

fn templates(
    action: Action,
    weapon: WeaponState,
    snapshot: &PlaybackSnapshot<'_>,
) -> &'static [&'static str] {
    let base_is = |names: &[&str]| {
        snapshot
            .base_clip
            .is_some_and(|c| names.iter().any(|n| *n == c))
    };

    match action {
        Action::NoAnim
        | Action::InteractIn
        | Action::InteractOut
        | Action::InteractToStand
        | Action::InteractFromStand => &[],
        Action::Idle => &["S_{W}{M}"],
        Action::Move => &["S_{W}{M}L", "S_{W}{M}"],
        Action::MoveBack => &["S_{W}{M}BL", "T_{W}JUMPB"],
        Action::MoveL => &["T_{W}{M}STRAFEL"],
        Action::MoveR => &["T_{W}{M}STRAFER"],
        Action::RotL => &["T_{W}{M}TURNL"],
        Action::RotR => &["T_{W}{M}TURNR"],
        Action::Fall => &["S_FALLDN"],
        Action::FallDeep => &["S_FALL"],
        Action::Fallen if snapshot.base_clip.is_some_and(|c| c.ends_with('B')) => {
            &["T_FALLENB_2_STAND"]
        }
        Action::Fallen => &["T_FALLEN_2_STAND"],
        Action::Jump if snapshot.body_state == BodyState::Run => &["T_RUNL_2_JUMP"],
        Action::Jump => &["T_STAND_2_JUMP"],
        Action::JumpUp => &["T_STAND_2_JUMPUP"],
        Action::JumpUpLow => &["T_STAND_2_JUMPUPLOW"],
        Action::JumpUpMid => &["T_STAND_2_JUMPUPMID"],
        Action::JumpHang => &["T_JUMPUP_2_HANG", "S_HANG"],
        Action::SlideA => &["S_SLIDE"],
        Action::SlideB => &["S_SLIDEB"],
        Action::DeadA if base_is(&["T_DEAD", "S_DEAD"]) => &["S_DEAD"],
        Action::DeadA => &["T_DEAD", "S_DEAD"],
        Action::DeadB if base_is(&["T_DEADB", "S_DEADB"]) => &["S_DEADB"],
        Action::DeadB => &["T_DEADB", "S_DEADB"],
        Action::UnconsciousA if base_is(&["T_STAND_2_WOUNDED", "S_WOUNDED"]) => &["S_WOUNDED"],
        Action::UnconsciousA => &["T_STAND_2_WOUNDED", "S_WOUNDED"],
        Action::UnconsciousB if base_is(&["T_STAND_2_WOUNDEDB", "S_WOUNDEDB"]) => {
            &["S_WOUNDEDB"]
        }
        Action::UnconsciousB => &["T_STAND_2_WOUNDEDB", "S_WOUNDEDB"],
        Action::Attack if weapon.is_ranged() => &["S_{W}SHOOT"],
        Action::Attack => &["S_{W}ATTACK"],
        Action::AttackL => &["T_{W}ATTACKL"],
        Action::AttackR => &["T_{W}ATTACKR"],
        Action::AttackBlock => &["T_{W}PARADE_0"],
        Action::AttackFinish => &["T_{W}SFINISH"],
        Action::StumbleA => &["T_{W}STUMBLE"],
        Action::StumbleB => &["T_{W}STUMBLEB"],
        Action::AimBow => &["S_{W}AIM"],
        Action::MagNoMana => &["T_CASTFAIL"],
        Action::ItmGet => &["T_STAND_2_IGET"],
        Action::ItmDrop => &["T_STAND_2_IDROP"],
        Action::PointAt => &["T_POINT"],
    }
}

/// Candidate clip names for an action, most specific first
pub fn clip_names(
    action: Action,
    weapon: WeaponState,
    walk: WalkBits,
    snapshot: &PlaybackSnapshot<'_>,
) -> Vec<String> {
    let w = weapon.tag();
    let m = walk.tag();
    // every template is tried with the requested movement before `RUN`
    let passes = [[(w, m), ("", m)], [(w, "RUN"), ("", "RUN")]];

    let mut names: Vec<String> = Vec::new();
    for variants in passes {
        for template in templates(action, weapon, snapshot) {
            for (w, m) in variants {
                let name = template.replace("{W}", w).replace("{M}", m);
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    names
}

/// Candidate names for readying `target` while `current` is readied
pub fn weapon_switch_names(target: WeaponState, current: WeaponState, run: bool) -> Vec<String> {
    if target == current {
        return Vec::new();
    }
    if current == WeaponState::NoWeapon {
        let t = target.tag();
        let stand = format!("T_RUN_2_{t}");
        if run {
            vec![format!("T_MOVE_2_{t}MOVE"), stand]
        } else {
            vec![stand]
        }
    } else {
        let c = current.tag();
        let stand = format!("T_{c}RUN_2_{c}");
        if run {
            vec![format!("T_{c}MOVE_2_MOVE"), stand]
        } else {
            vec![stand]
        }
    }
}

/// Clip table of an interactive object (bench, cauldron, ladder, ...)
///
/// States are numbered from zero; the object's scheme names the clips,
/// e.g. `T_BENCH_S0_2_S1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionTable {
    scheme: String,
    state: i32,
}

impl InteractionTable {
    pub fn new<S: Into<String>>(scheme: S, state: i32) -> Self {
        Self {
            scheme: scheme.into(),
            state,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn state(&self) -> i32 {
        self.state
    }

    pub fn set_state(&mut self, state: i32) {
        self.state = state;
    }

    /// Clip name for an interaction action, `None` for any other action
    pub fn clip_name(&self, action: Action) -> Option<String> {
        let s = &self.scheme;
        let n = self.state;
        match action {
            Action::InteractFromStand => Some(format!("T_{s}_STAND_2_S0")),
            Action::InteractToStand => Some(format!("T_{s}_S0_2_STAND")),
            Action::InteractIn => Some(format!("T_{s}_S{n}_2_S{}", n + 1)),
            Action::InteractOut if n > 0 => Some(format!("T_{s}_S{n}_2_S{}", n - 1)),
            _ => None,
        }
    }
}

/// Resolves requests to clips of a lookup chain
#[derive(Debug, Clone, Copy)]
pub struct Selector<'a, L: ClipLookup + ?Sized> {
    lookup: &'a L,
}

impl<'a, L: ClipLookup + ?Sized> Selector<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    fn first_hit<I, S>(&self, names: I) -> Option<&'a Arc<Clip>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .find_map(|name| self.lookup.find_clip(name.as_ref()))
    }

    /// Clip by exact name
    pub fn solve_frm(&self, name: &str) -> Option<&'a Arc<Clip>> {
        self.lookup.find_clip(name)
    }

    /// Clip for a semantic action
    pub fn solve_anim(
        &self,
        action: Action,
        weapon: WeaponState,
        walk: WalkBits,
        snapshot: &PlaybackSnapshot<'_>,
    ) -> Option<&'a Arc<Clip>> {
        let clip = self.first_hit(clip_names(action, weapon, walk, snapshot));
        if clip.is_none() {
            log::trace!("No clip for {action:?} ({weapon:?}, {walk:?})");
        }
        clip
    }

    /// Draw or sheathe transition
    pub fn solve_weapon_switch(
        &self,
        target: WeaponState,
        current: WeaponState,
        run: bool,
    ) -> Option<&'a Arc<Clip>> {
        self.first_hit(weapon_switch_names(target, current, run))
    }

    /// Clip of an interactive object
    pub fn solve_interaction(
        &self,
        table: &InteractionTable,
        action: Action,
    ) -> Option<&'a Arc<Clip>> {
        table
            .clip_name(action)
            .and_then(|name| self.lookup.find_clip(&name))
    }
}
