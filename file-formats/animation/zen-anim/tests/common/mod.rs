//! Common test utilities and fixtures

#![allow(dead_code)]

use std::sync::Arc;

use glam::{Mat4, Vec3};
use parking_lot::Mutex;
use zen_anim::chunk::write_chunk;
use zen_anim::clip::chunk_id as clip_id;
use zen_anim::io_ext::WriteExt;
use zen_anim::script::chunk_id as script_id;
use zen_anim::{MemoryStore, VisualHandle};

const POS_SCALER: f32 = 1.0 / 256.0;
const POS_MIN: f32 = -128.0;

fn encode_position(v: f32) -> u16 {
    ((v - POS_MIN) / POS_SCALER).round() as u16
}

/// Write a `.MAN` clip with identity rotations
///
/// `root(frame)` gives the position of the first animated bone; other bones
/// stay at the origin. `samples` overrides the number of samples written.
pub fn write_clip(
    name: &str,
    frames: u32,
    fps: f32,
    nodes: &[u32],
    root: impl Fn(u32) -> Vec3,
    samples: Option<usize>,
) -> Vec<u8> {
    let mut header = Vec::new();
    header.write_u16_le(3).unwrap();
    header.write_line(name).unwrap();
    header.write_u32_le(1).unwrap();
    header.write_u32_le(frames).unwrap();
    header.write_u32_le(nodes.len() as u32).unwrap();
    header.write_f32_le(fps).unwrap();
    header.write_f32_le(fps).unwrap();
    header.write_f32_le(POS_MIN).unwrap();
    header.write_f32_le(POS_SCALER).unwrap();
    header.write_vec3_le(Vec3::splat(-1.0)).unwrap();
    header.write_vec3_le(Vec3::splat(1.0)).unwrap();
    header.write_line("").unwrap();

    let mut raw = Vec::new();
    raw.write_u32_le(0).unwrap();
    for n in nodes {
        raw.write_u32_le(*n).unwrap();
    }
    let count = samples.unwrap_or(frames as usize * nodes.len());
    for i in 0..count {
        let pos = if i % nodes.len() == 0 {
            root((i / nodes.len()) as u32)
        } else {
            Vec3::ZERO
        };
        for _ in 0..3 {
            raw.write_u16_le(32767).unwrap();
        }
        raw.write_u16_le(encode_position(pos.x)).unwrap();
        raw.write_u16_le(encode_position(pos.y)).unwrap();
        raw.write_u16_le(encode_position(pos.z)).unwrap();
    }

    let mut out = Vec::new();
    write_chunk(&mut out, clip_id::HEADER, &header);
    write_chunk(&mut out, clip_id::RAWDATA, &raw);
    out
}

/// A clip declaration of a model script
pub struct Decl<'a> {
    pub name: &'a str,
    pub layer: u32,
    pub next: &'a str,
    pub flags: &'a str,
}

/// Write a `.MSB` model script declaring `decls`
pub fn write_script(decls: &[Decl<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    write_chunk(&mut out, script_id::MODEL_SCRIPT, &[]);
    for d in decls {
        let mut p = Vec::new();
        p.write_line(d.name).unwrap();
        p.write_u32_le(d.layer).unwrap();
        p.write_line(d.next).unwrap();
        p.write_f32_le(0.0).unwrap();
        p.write_f32_le(0.0).unwrap();
        p.write_line(d.flags).unwrap();
        p.write_line(&format!("{}.ASC", d.name)).unwrap();
        p.write_line("F").unwrap();
        p.write_u32_le(0).unwrap();
        p.write_u32_le(0).unwrap();
        write_chunk(&mut out, script_id::ANI, &p);
        write_chunk(&mut out, script_id::EVENT_SFX, b"WHOOSH\n");
    }
    write_chunk(&mut out, script_id::END, &[]);
    out
}

/// Store with model `HUMANS`: a 30-frame running clip moving 3 units along
/// Z, a walking clip and a one-shot
pub fn humans_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert(
        "HUMANS.MSB",
        write_script(&[
            Decl {
                name: "S_RUN",
                layer: 1,
                next: "S_RUN",
                flags: "M.",
            },
            Decl {
                name: "S_WALK",
                layer: 1,
                next: "S_WALK",
                flags: "M.",
            },
            Decl {
                name: "T_POINT",
                layer: 1,
                next: "",
                flags: ".",
            },
        ]),
    );
    store.insert(
        "HUMANS-S_RUN.MAN",
        write_clip("S_RUN", 30, 30.0, &[0], |f| Vec3::new(0.0, 0.0, f as f32 * 3.0 / 29.0), None),
    );
    store.insert(
        "HUMANS-S_WALK.MAN",
        write_clip("S_WALK", 30, 30.0, &[0], |f| Vec3::new(0.0, 0.0, f as f32 / 29.0), None),
    );
    store.insert(
        "HUMANS-T_POINT.MAN",
        write_clip("T_POINT", 10, 10.0, &[0], |_| Vec3::ZERO, None),
    );
    store
}

/// Everything a [`Recorder`] received
#[derive(Debug, Default)]
pub struct Received {
    pub matrices: Vec<Mat4>,
    pub ghost: Option<bool>,
}

pub struct Recorder(Arc<Mutex<Received>>);

impl Recorder {
    pub fn new() -> (Box<dyn VisualHandle>, Arc<Mutex<Received>>) {
        let received = Arc::new(Mutex::new(Received::default()));
        (Box::new(Self(Arc::clone(&received))), received)
    }
}

impl VisualHandle for Recorder {
    fn set_obj_matrix(&mut self, world: Mat4) {
        self.0.lock().matrices.push(world);
    }

    fn set_as_ghost(&mut self, ghost: bool) {
        self.0.lock().ghost = Some(ghost);
    }
}
