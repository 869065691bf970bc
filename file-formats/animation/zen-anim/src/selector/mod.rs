//! Clip selection: semantic actions to concrete clips
//!
//! The selector composes candidate names from naming conventions and
//! resolves them through a [`ClipLookup`](crate::catalog::ClipLookup). It
//! never starts anything itself.

mod action;
mod solver;

pub use action::{Action, BodyState, FightMode, WalkBits, WeaponState};
pub use solver::{
    InteractionTable, PlaybackSnapshot, Selector, clip_names, weapon_switch_names,
};
