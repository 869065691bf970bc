//! Semantic actions and the state enumerations that drive clip selection

use bitflags::bitflags;

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// A semantic request for a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum Action {
    NoAnim,
    Idle,
    Move,
    MoveBack,
    MoveL,
    MoveR,
    RotL,
    RotR,
    Fall,
    FallDeep,
    Fallen,
    Jump,
    JumpUp,
    JumpUpLow,
    JumpUpMid,
    JumpHang,
    SlideA,
    SlideB,
    DeadA,
    DeadB,
    UnconsciousA,
    UnconsciousB,
    InteractIn,
    InteractOut,
    InteractToStand,
    InteractFromStand,
    Attack,
    AttackL,
    AttackR,
    AttackBlock,
    AttackFinish,
    StumbleA,
    StumbleB,
    AimBow,
    ItmGet,
    ItmDrop,
    MagNoMana,
    PointAt,
}

impl Action {
    /// Every action, in declaration order
    pub const ALL: [Self; 38] = [
        Self::NoAnim,
        Self::Idle,
        Self::Move,
        Self::MoveBack,
        Self::MoveL,
        Self::MoveR,
        Self::RotL,
        Self::RotR,
        Self::Fall,
        Self::FallDeep,
        Self::Fallen,
        Self::Jump,
        Self::JumpUp,
        Self::JumpUpLow,
        Self::JumpUpMid,
        Self::JumpHang,
        Self::SlideA,
        Self::SlideB,
        Self::DeadA,
        Self::DeadB,
        Self::UnconsciousA,
        Self::UnconsciousB,
        Self::InteractIn,
        Self::InteractOut,
        Self::InteractToStand,
        Self::InteractFromStand,
        Self::Attack,
        Self::AttackL,
        Self::AttackR,
        Self::AttackBlock,
        Self::AttackFinish,
        Self::StumbleA,
        Self::StumbleB,
        Self::AimBow,
        Self::ItmGet,
        Self::ItmDrop,
        Self::MagNoMana,
        Self::PointAt,
    ];

    /// Body state entered when a clip for this action starts
    ///
    /// Movement actions depend on the walk bit. `DIVE`, `SWIM` and `SNEAK`
    /// override the result in that order.
    pub const fn body_state(self, walk: WalkBits) -> BodyState {
        let base = match self {
            Self::NoAnim
            | Self::Fallen
            | Self::SlideA
            | Self::SlideB
            | Self::RotL
            | Self::RotR => BodyState::None,
            Self::Idle | Self::MagNoMana | Self::PointAt => BodyState::Stand,
            Self::Move | Self::MoveBack | Self::MoveL | Self::MoveR => {
                if walk.contains(WalkBits::WALK) {
                    BodyState::Walk
                } else {
                    BodyState::Run
                }
            }
            Self::Fall | Self::FallDeep => BodyState::Fall,
            Self::Jump | Self::JumpUp => BodyState::Jump,
            Self::JumpUpLow | Self::JumpUpMid | Self::JumpHang => BodyState::Climb,
            Self::DeadA | Self::DeadB => BodyState::Dead,
            Self::UnconsciousA | Self::UnconsciousB => BodyState::Unconscious,
            Self::InteractIn
            | Self::InteractOut
            | Self::InteractToStand
            | Self::InteractFromStand => BodyState::MobInteract,
            Self::Attack | Self::AttackL | Self::AttackR | Self::AttackFinish => BodyState::Hit,
            Self::AttackBlock => BodyState::Parade,
            Self::StumbleA | Self::StumbleB => BodyState::Stumble,
            Self::AimBow => BodyState::AimNear,
            Self::ItmGet => BodyState::TakeItem,
            Self::ItmDrop => BodyState::DropItem,
        };

        if walk.contains(WalkBits::DIVE) {
            BodyState::Dive
        } else if walk.contains(WalkBits::SWIM) {
            BodyState::Swim
        } else if walk.contains(WalkBits::SNEAK) {
            BodyState::Sneak
        } else {
            base
        }
    }

    /// Actions resolved through an interactive object's clip table
    pub const fn is_interaction(self) -> bool {
        matches!(
            self,
            Self::InteractIn | Self::InteractOut | Self::InteractToStand | Self::InteractFromStand
        )
    }

    /// Death and knock-out: every running clip is stopped first
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::DeadA | Self::DeadB | Self::UnconsciousA | Self::UnconsciousB
        )
    }

    /// Actions that interrupt whatever is playing unless the caller asks not to
    pub const fn interrupts(self) -> bool {
        matches!(self, Self::StumbleA | Self::StumbleB | Self::JumpHang)
    }
}

/// Coarse locomotion and action classification of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum BodyState {
    #[default]
    None = 0,
    Stand = 1,
    Walk = 2,
    Sneak = 3,
    Run = 4,
    Swim = 5,
    Dive = 6,
    Jump = 7,
    Climb = 8,
    Fall = 9,
    MobInteract = 10,
    TakeItem = 11,
    DropItem = 12,
    Stumble = 13,
    Unconscious = 14,
    Dead = 15,
    AimNear = 16,
    Hit = 17,
    Parade = 18,
    Casting = 19,
}

impl BodyState {
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::None,
            1 => Self::Stand,
            2 => Self::Walk,
            3 => Self::Sneak,
            4 => Self::Run,
            5 => Self::Swim,
            6 => Self::Dive,
            7 => Self::Jump,
            8 => Self::Climb,
            9 => Self::Fall,
            10 => Self::MobInteract,
            11 => Self::TakeItem,
            12 => Self::DropItem,
            13 => Self::Stumble,
            14 => Self::Unconscious,
            15 => Self::Dead,
            16 => Self::AimNear,
            17 => Self::Hit,
            18 => Self::Parade,
            19 => Self::Casting,
            _ => return None,
        })
    }

    /// Locomotion states stopped by a "stop walk" request
    pub const fn is_walk(self) -> bool {
        matches!(
            self,
            Self::Walk | Self::Sneak | Self::Run | Self::Swim | Self::Dive
        )
    }
}

/// Which weapon category is readied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum WeaponState {
    #[default]
    NoWeapon = 0,
    Fist = 1,
    W1H = 2,
    W2H = 3,
    Bow = 4,
    CBow = 5,
    Mage = 6,
}

impl WeaponState {
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::NoWeapon,
            1 => Self::Fist,
            2 => Self::W1H,
            3 => Self::W2H,
            4 => Self::Bow,
            5 => Self::CBow,
            6 => Self::Mage,
            _ => return None,
        })
    }

    /// Weapon part of composed clip names
    pub const fn tag(self) -> &'static str {
        match self {
            Self::NoWeapon => "",
            Self::Fist => "FIST",
            Self::W1H => "1H",
            Self::W2H => "2H",
            Self::Bow => "BOW",
            Self::CBow => "CBOW",
            Self::Mage => "MAG",
        }
    }

    pub const fn is_melee(self) -> bool {
        matches!(self, Self::W1H | Self::W2H)
    }

    pub const fn is_ranged(self) -> bool {
        matches!(self, Self::Bow | Self::CBow)
    }

    /// Weapon states with combo attacks
    pub const fn has_combo(self) -> bool {
        matches!(self, Self::Fist | Self::W1H | Self::W2H)
    }
}

/// Fight mode as numbered by game scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum FightMode {
    None,
    Fist,
    OneHanded,
    TwoHanded,
    Bow,
    Crossbow,
    Magic,
    Last,
}

impl FightMode {
    pub const fn from_raw(value: i32) -> Option<Self> {
        Some(match value {
            0 => Self::None,
            1 => Self::Fist,
            2 => Self::OneHanded,
            3 => Self::TwoHanded,
            4 => Self::Bow,
            5 => Self::Crossbow,
            6 => Self::Magic,
            7 => Self::Last,
            _ => return None,
        })
    }

    /// Weapon state for this fight mode; `Last` has none
    pub const fn weapon_state(self) -> Option<WeaponState> {
        match self {
            Self::None => Some(WeaponState::NoWeapon),
            Self::Fist => Some(WeaponState::Fist),
            Self::OneHanded => Some(WeaponState::W1H),
            Self::TwoHanded => Some(WeaponState::W2H),
            Self::Bow => Some(WeaponState::Bow),
            Self::Crossbow => Some(WeaponState::CBow),
            Self::Magic => Some(WeaponState::Mage),
            Self::Last => None,
        }
    }
}

bitflags! {
    /// Movement mode bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WalkBits: u8 {
        const WALK = 0x01;
        const SNEAK = 0x02;
        const SWIM = 0x04;
        const DIVE = 0x08;
    }
}

impl WalkBits {
    /// Movement part of composed clip names
    pub const fn tag(self) -> &'static str {
        if self.contains(Self::DIVE) {
            "DIVE"
        } else if self.contains(Self::SWIM) {
            "SWIM"
        } else if self.contains(Self::SNEAK) {
            "SNEAK"
        } else if self.contains(Self::WALK) {
            "WALK"
        } else {
            "RUN"
        }
    }
}
