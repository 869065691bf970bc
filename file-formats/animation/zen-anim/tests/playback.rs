//! End-to-end playback of catalogs loaded from clip resources

mod common;

use std::sync::Arc;

use common::{Recorder, humans_store};
use glam::{Mat4, Vec3};
use pretty_assertions::assert_eq;
use zen_anim::{
    Action, BodyState, CatalogCache, ModelVisual, Skeleton, SkeletonNode, SlotRole, StartHint,
    WalkBits, WeaponState,
};

fn skeleton() -> Arc<Skeleton> {
    let nodes = vec![
        SkeletonNode::new("BIP01", None, Mat4::IDENTITY),
        SkeletonNode::new("BIP01 HEAD", Some(0), Mat4::from_translation(Vec3::Y)),
    ];
    Arc::new(Skeleton::new("HUMANS", nodes).unwrap())
}

fn visual() -> ModelVisual {
    let _ = env_logger::builder().is_test(true).try_init();
    let cache = CatalogCache::new(Arc::new(humans_store()));
    let mut visual = ModelVisual::new();
    visual.set_visual(Some(skeleton()), Some(cache.get("HUMANS").unwrap()));
    visual
}

#[test]
fn test_run_covers_root_motion_in_one_second() {
    let mut visual = visual();
    let clip = visual
        .start_anim_and_get(Action::Move, 0, WeaponState::NoWeapon, WalkBits::empty(), false, 0)
        .unwrap();
    assert_eq!(clip.name(), "S_RUN");
    assert_eq!(visual.pose().body_state(), BodyState::Run);

    let mut total = Vec3::ZERO;
    for tick in 1..=1000 {
        visual.update_animation(tick);
        total += visual.take_motion();
    }
    assert!(total.abs_diff_eq(Vec3::new(0.0, 0.0, 3.0), 2e-2), "{total:?}");
}

#[test]
fn test_walk_bit_selects_walk() {
    let mut visual = visual();
    let clip = visual
        .start_anim_and_get(Action::Move, 0, WeaponState::NoWeapon, WalkBits::WALK, false, 0)
        .unwrap();
    assert_eq!(clip.name(), "S_WALK");
    assert_eq!(visual.pose().body_state(), BodyState::Walk);
}

#[test]
fn test_no_interrupt_and_force() {
    let mut visual = visual();
    let point = visual
        .start_anim_by_name("T_POINT", 0, false, BodyState::Stand, 0)
        .unwrap();
    let run = visual.pose().lookup().base().unwrap().sequence("S_RUN").cloned().unwrap();

    let pose = visual.pose_mut();
    assert!(!pose.start_anim(&run, 0, BodyState::Run, StartHint::NO_INTERRUPT, 100));
    assert!(pose.is_in_anim(point.name()));

    assert!(pose.start_anim(&point, 0, BodyState::Stand, StartHint::FORCE, 200));
    assert_eq!(pose.layers().next().unwrap().started_at(), 200);
}

#[test]
fn test_stop_all_never_leaves_empty_pose() {
    let mut visual = visual();
    visual.start_anim_by_name("T_POINT", 0, false, BodyState::Stand, 0);
    visual.stop_all_anim(50);
    visual.update_animation(60);
    assert!(visual.pose().has_anim());

    visual.stop_walk_anim(70);
    visual.update_animation(80);
    assert!(visual.pose().has_anim());
}

#[test]
fn test_missing_bone_slot_is_skipped_by_sync() {
    let mut visual = visual();
    let (sword, received) = Recorder::new();
    assert!(!visual.bind(SlotRole::Sword, Some(sword), "ZS_RIGHTHAND"));

    visual.start_anim_and_get(Action::Idle, 0, WeaponState::NoWeapon, WalkBits::empty(), false, 0);
    visual.update_animation(10);
    visual.sync_attaches();
    assert!(received.lock().matrices.is_empty());
}

#[test]
fn test_head_follows_animation() {
    let mut visual = visual();
    let (head, received) = Recorder::new();
    assert!(visual.bind(SlotRole::Head, Some(head), "BIP01 HEAD"));
    visual.set_position(Vec3::new(10.0, 0.0, 0.0), true);

    let last = *received.lock().matrices.last().unwrap();
    assert!(
        last.transform_point3(Vec3::ZERO)
            .abs_diff_eq(Vec3::new(10.0, 1.0, 0.0), 1e-5)
    );
}
