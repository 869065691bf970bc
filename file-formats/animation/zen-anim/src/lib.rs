//! Skeletal animation runtime for ZenGin character models.
//!
//! Clips (`.MAN`) and model scripts (`.MSB`) are parsed into shared,
//! immutable catalogs. Per instance, a [`Pose`] plays clips on layers, a
//! [`Selector`] picks clips for semantic actions and [`Attachments`] push the
//! resulting bone transforms to externally owned visuals. [`ModelVisual`]
//! combines the three.
//!
//! ```no_run
//! use std::sync::Arc;
//! use zen_anim::{Action, CatalogCache, DirectoryStore, ModelVisual, WalkBits, WeaponState};
//!
//! let store = DirectoryStore::open_dir("_work/anims")?;
//! let cache = CatalogCache::new(Arc::new(store));
//! let catalog = cache.get("HUMANS")?;
//!
//! let mut visual = ModelVisual::new();
//! visual.set_visual(None, Some(catalog));
//! visual.start_anim_and_get(Action::Move, 0, WeaponState::NoWeapon, WalkBits::empty(), false, 0);
//! visual.update_animation(16);
//! let step = visual.take_motion();
//! # let _ = step;
//! # Ok::<(), zen_anim::AnimError>(())
//! ```

pub mod asset;
pub mod attach;
pub mod catalog;
pub mod chunk;
pub mod clip;
pub mod error;
pub mod io_ext;
pub mod persist;
pub mod pose;
pub mod script;
pub mod selector;
pub mod skeleton;
pub mod visual;

#[cfg(test)]
mod test_util;

// Re-export common types
pub use asset::{AssetStore, DirectoryStore, MemoryStore};
pub use attach::{Attachments, BoneBinding, SlotRole, VisualHandle};
pub use catalog::{Catalog, CatalogCache, CatalogOptions, ClipLookup};
pub use clip::{Clip, ClipData, ClipFlags, Sample};
pub use error::{AnimError, Result};
pub use persist::{ModelResolver, SAVE_VERSION};
pub use pose::{Pose, PoseOptions, StartHint};
pub use script::ModelScript;
pub use selector::{Action, BodyState, FightMode, InteractionTable, Selector, WalkBits, WeaponState};
pub use skeleton::{Skeleton, SkeletonNode};
pub use visual::ModelVisual;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
