//! Animation clip, model script and playback commands

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use colored::Colorize;
use glam::Vec3;
use zen_anim::script::ClipSource;
use zen_anim::{
    Action, Catalog, CatalogOptions, ClipData, DirectoryStore, ModelScript, ModelVisual, WalkBits,
    WeaponState,
};

#[derive(Subcommand)]
pub enum AnimCommands {
    /// Show information about a compiled clip resource
    Clip {
        /// Path to the clip file
        file: PathBuf,

        /// Frame rate used when the clip does not carry one
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Show node indices and per-frame root samples
        #[arg(short, long)]
        detailed: bool,
    },

    /// List the clip declarations of a compiled model script
    Script {
        /// Path to the model script
        file: PathBuf,
    },

    /// Load a model's catalog from a directory and list its clips
    Catalog {
        /// Directory holding the model script and clip files
        dir: PathBuf,

        /// Model name, e.g. HUMANS
        model: String,
    },

    /// Resolve the clip that an action would start
    Select {
        /// Directory holding the model script and clip files
        dir: PathBuf,

        /// Model name
        model: String,

        /// Action name, e.g. Move or Idle
        action: String,

        /// Readied weapon (NoWeapon, Fist, W1H, W2H, Bow, CBow, Mage)
        #[arg(short, long, default_value = "NoWeapon")]
        weapon: String,

        /// Walk instead of run
        #[arg(long)]
        walk: bool,
    },

    /// Play an action for a number of ticks and report root motion
    Play {
        /// Directory holding the model script and clip files
        dir: PathBuf,

        /// Model name
        model: String,

        /// Action name
        action: String,

        /// Total ticks (milliseconds) to play
        #[arg(short, long, default_value_t = 1000)]
        ticks: u64,

        /// Ticks per update
        #[arg(short, long, default_value_t = 16)]
        step: u64,

        /// Readied weapon
        #[arg(short, long, default_value = "NoWeapon")]
        weapon: String,
    },
}

pub fn execute(command: AnimCommands) -> Result<()> {
    match command {
        AnimCommands::Clip {
            file,
            fps,
            detailed,
        } => handle_clip(file, fps, detailed),
        AnimCommands::Script { file } => handle_script(file),
        AnimCommands::Catalog { dir, model } => handle_catalog(dir, &model),
        AnimCommands::Select {
            dir,
            model,
            action,
            weapon,
            walk,
        } => handle_select(dir, &model, &action, &weapon, walk),
        AnimCommands::Play {
            dir,
            model,
            action,
            ticks,
            step,
            weapon,
        } => handle_play(dir, &model, &action, ticks, step, &weapon),
    }
}

fn parse_action(name: &str) -> Result<Action> {
    Action::ALL
        .into_iter()
        .find(|a| format!("{a:?}").eq_ignore_ascii_case(name))
        .with_context(|| format!("Unknown action '{name}'"))
}

fn parse_weapon(name: &str) -> Result<WeaponState> {
    (0..=6)
        .filter_map(WeaponState::from_u8)
        .find(|w| format!("{w:?}").eq_ignore_ascii_case(name))
        .with_context(|| format!("Unknown weapon state '{name}'"))
}

fn load_catalog(dir: PathBuf, model: &str) -> Result<Catalog> {
    let store = DirectoryStore::open_dir(&dir)
        .with_context(|| format!("Failed to open directory {}", dir.display()))?;
    Catalog::load(&store, &model.to_ascii_uppercase(), &CatalogOptions::default())
        .with_context(|| format!("Failed to load model '{model}'"))
}

fn handle_clip(path: PathBuf, fps: f32, detailed: bool) -> Result<()> {
    let data = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let clip = ClipData::parse(&data, fps).context("Failed to parse clip")?;
    let header = clip.header();

    println!("{}", "Clip Information".bold());
    println!("================");
    println!("Name: {}", header.name);
    println!("Version: {}", header.version);
    println!("Layer: {}", header.layer);
    println!("Frames: {}", clip.num_frames());
    println!("FPS: {:.2} (source {:.2})", clip.fps(), header.fps_source);
    println!("Duration: {:.1} ms", clip.duration_ms());
    println!("Nodes: {}", header.num_nodes);
    if !header.next.is_empty() {
        println!("Next: {}", header.next);
    }
    println!("Checksum: 0x{:08X}", clip.checksum());

    let motion = clip.root_motion();
    println!("\n{}", "Root Motion".bold());
    println!("  Translation: ({:.3}, {:.3}, {:.3})", motion.x, motion.y, motion.z);
    println!("  Yaw: {:.2} deg", clip.root_yaw());
    println!(
        "  Bounds: ({:.1}, {:.1}, {:.1}) - ({:.1}, {:.1}, {:.1})",
        header.bbox_min.x,
        header.bbox_min.y,
        header.bbox_min.z,
        header.bbox_max.x,
        header.bbox_max.y,
        header.bbox_max.z
    );

    if detailed {
        println!("\n{}", "Node Index".bold());
        for (slot, node) in clip.node_index().iter().enumerate() {
            println!("  [{slot}] -> {node}");
        }

        println!("\n{}", "Root Samples".bold());
        for frame in 0..clip.num_frames() {
            if let Some(sample) = clip.sample(frame, 0) {
                let p = sample.position;
                println!("  {frame:4}: ({:.3}, {:.3}, {:.3})", p.x, p.y, p.z);
            }
        }
    }

    Ok(())
}

fn handle_script(path: PathBuf) -> Result<()> {
    let data = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let script = ModelScript::parse(&data).context("Failed to parse model script")?;

    println!("{}", "Model Script".bold());
    println!("============");
    println!("Declarations: {}", script.clips.len());

    for decl in &script.clips {
        let source = match &decl.source {
            ClipSource::Resource {
                asc,
                first_frame,
                last_frame,
            } => format!("{asc} [{first_frame}..{last_frame}]"),
            ClipSource::Alias(target) => format!("alias of {target}"),
        };
        println!(
            "  {} (layer {}) {}",
            decl.name.green(),
            decl.layer,
            source.dimmed()
        );
        if !decl.next.is_empty() {
            println!("    next: {}", decl.next);
        }
        if !decl.flags.is_empty() {
            println!("    flags: {:?}", decl.flags);
        }
        if !decl.combo.is_empty() {
            println!("    combo windows: {}", decl.combo.len());
        }
        if decl.events > 0 {
            println!("    events: {}", decl.events);
        }
    }

    Ok(())
}

fn handle_catalog(dir: PathBuf, model: &str) -> Result<()> {
    let catalog = load_catalog(dir, model)?;

    println!("{} {}", "Catalog".bold(), catalog.name());
    println!("Clips: {}", catalog.len());
    println!("Resources loaded: {}", catalog.resource_loads());

    for clip in catalog.clips() {
        let looping = if clip.is_looping() { " loop" } else { "" };
        println!(
            "  {:<32} layer {:<3} {:>8.1} ms{}",
            clip.name(),
            clip.layer(),
            clip.duration_ms(),
            looping
        );
    }

    Ok(())
}

fn handle_select(dir: PathBuf, model: &str, action: &str, weapon: &str, walk: bool) -> Result<()> {
    let action = parse_action(action)?;
    let weapon = parse_weapon(weapon)?;
    let walk = if walk { WalkBits::WALK } else { WalkBits::empty() };

    let catalog = Arc::new(load_catalog(dir, model)?);
    let mut visual = ModelVisual::new();
    visual.set_visual(None, Some(catalog));

    let snapshot = visual.pose().snapshot();
    match visual
        .pose()
        .selector()
        .solve_anim(action, weapon, walk, &snapshot)
    {
        Some(clip) => println!("{action:?} -> {}", clip.name().green()),
        None => bail!("No clip resolves {action:?} for {weapon:?}"),
    }

    Ok(())
}

fn handle_play(
    dir: PathBuf,
    model: &str,
    action: &str,
    ticks: u64,
    step: u64,
    weapon: &str,
) -> Result<()> {
    if step == 0 {
        bail!("Step must be at least one tick");
    }
    let action = parse_action(action)?;
    let weapon = parse_weapon(weapon)?;

    let catalog = Arc::new(load_catalog(dir, model)?);
    let mut visual = ModelVisual::new();
    visual.set_visual(None, Some(catalog));

    let walk = visual.walk_mode();
    let clip = visual
        .start_anim_and_get(action, 0, weapon, walk, false, 0)
        .with_context(|| format!("No clip resolves {action:?} for {weapon:?}"))?;
    println!("Started {}", clip.name().green());

    let mut motion = Vec3::ZERO;
    let mut now = 0;
    while now < ticks {
        now = (now + step).min(ticks);
        visual.update_animation(now);
        motion += visual.take_motion();
    }

    let playing: Vec<&str> = visual.pose().layers().map(|l| l.clip().name()).collect();
    println!("Elapsed: {ticks} ms");
    println!("Playing: {}", playing.join(", "));
    println!(
        "Root motion: ({:.3}, {:.3}, {:.3})",
        motion.x, motion.y, motion.z
    );

    Ok(())
}
