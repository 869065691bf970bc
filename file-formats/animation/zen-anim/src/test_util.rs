//! Writers for synthetic clip and model script resources used by unit tests,
//! plus a visual handle that records what it receives

use std::sync::Arc;

use glam::{Mat4, Vec3};
use parking_lot::Mutex;

use crate::attach::VisualHandle;

use crate::chunk::write_chunk;
use crate::clip::chunk_id;
use crate::io_ext::WriteExt;
use crate::script::chunk_id as script_id;

pub const POS_SCALER: f32 = 1.0 / 256.0;
pub const POS_MIN: f32 = -128.0;

pub fn encode_position(v: f32) -> u16 {
    ((v - POS_MIN) / POS_SCALER).round() as u16
}

/// Builder for `.MAN` clip resources with identity rotations
pub struct ManBuilder {
    name: String,
    frames: u32,
    fps: f32,
    nodes: Vec<u32>,
    track: Box<dyn Fn(u32) -> Vec3>,
    raw_first: bool,
    drop_samples: usize,
}

impl ManBuilder {
    pub fn new(name: &str, frames: u32, fps: f32) -> Self {
        Self {
            name: name.to_string(),
            frames,
            fps,
            nodes: Vec::new(),
            track: Box::new(|_| Vec3::ZERO),
            raw_first: false,
            drop_samples: 0,
        }
    }

    pub fn nodes(mut self, nodes: &[u32]) -> Self {
        self.nodes = nodes.to_vec();
        self
    }

    /// Position of the first animated slot per frame
    pub fn root_track(mut self, track: impl Fn(u32) -> Vec3 + 'static) -> Self {
        self.track = Box::new(track);
        self
    }

    pub fn raw_first(mut self) -> Self {
        self.raw_first = true;
        self
    }

    pub fn drop_samples(mut self, count: usize) -> Self {
        self.drop_samples = count;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut header = Vec::new();
        header.write_u16_le(3).unwrap();
        header.write_line(&self.name).unwrap();
        header.write_u32_le(1).unwrap();
        header.write_u32_le(self.frames).unwrap();
        header.write_u32_le(self.nodes.len() as u32).unwrap();
        header.write_f32_le(self.fps).unwrap();
        header.write_f32_le(self.fps).unwrap();
        header.write_f32_le(POS_MIN).unwrap();
        header.write_f32_le(POS_SCALER).unwrap();
        header.write_vec3_le(Vec3::splat(-1.0)).unwrap();
        header.write_vec3_le(Vec3::splat(1.0)).unwrap();
        header.write_line("").unwrap();

        let mut raw = Vec::new();
        raw.write_u32_le(0xDEAD_BEEF).unwrap();
        for n in &self.nodes {
            raw.write_u32_le(*n).unwrap();
        }
        let total = self.frames as usize * self.nodes.len();
        for i in 0..total.saturating_sub(self.drop_samples) {
            let frame = (i / self.nodes.len()) as u32;
            let pos = if i % self.nodes.len() == 0 {
                (self.track)(frame)
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
        write_chunk(&mut out, chunk_id::MARKER, &[]);
        if self.raw_first {
            write_chunk(&mut out, chunk_id::RAWDATA, &raw);
            write_chunk(&mut out, chunk_id::HEADER, &header);
        } else {
            write_chunk(&mut out, chunk_id::HEADER, &header);
            write_chunk(&mut out, chunk_id::RAWDATA, &raw);
        }
        out
    }
}

/// Builder for `.MSB` model scripts
#[derive(Default)]
pub struct MsbBuilder {
    out: Vec<u8>,
}

impl MsbBuilder {
    pub fn new() -> Self {
        let mut out = Vec::new();
        write_chunk(&mut out, script_id::MODEL_SCRIPT, &[]);
        Self { out }
    }

    pub fn ani(mut self, name: &str, layer: u32, next: &str, flags: &str) -> Self {
        let mut p = Vec::new();
        p.write_line(name).unwrap();
        p.write_u32_le(layer).unwrap();
        p.write_line(next).unwrap();
        p.write_f32_le(0.1).unwrap();
        p.write_f32_le(0.1).unwrap();
        p.write_line(flags).unwrap();
        p.write_line(&format!("{name}.ASC")).unwrap();
        p.write_line("F").unwrap();
        p.write_u32_le(0).unwrap();
        p.write_u32_le(0).unwrap();
        write_chunk(&mut self.out, script_id::ANI, &p);
        self
    }

    pub fn alias(mut self, name: &str, layer: u32, flags: &str, alias: &str) -> Self {
        let mut p = Vec::new();
        p.write_line(name).unwrap();
        p.write_u32_le(layer).unwrap();
        p.write_line("").unwrap();
        p.write_f32_le(0.0).unwrap();
        p.write_f32_le(0.0).unwrap();
        p.write_line(flags).unwrap();
        p.write_line(alias).unwrap();
        p.write_line("R").unwrap();
        write_chunk(&mut self.out, script_id::ANI_ALIAS, &p);
        self
    }

    pub fn combo(mut self, windows: &[(u32, u32)]) -> Self {
        let mut p = Vec::new();
        p.write_u32_le(windows.len() as u32).unwrap();
        for (start, end) in windows {
            p.write_u32_le(*start).unwrap();
            p.write_u32_le(*end).unwrap();
        }
        write_chunk(&mut self.out, script_id::ANI_COMBO, &p);
        self
    }

    pub fn event(mut self, id: u16) -> Self {
        write_chunk(&mut self.out, id, b"EVENT\n");
        self
    }

    pub fn error(mut self, message: &str) -> Self {
        write_chunk(&mut self.out, script_id::ERROR, format!("{message}\n").as_bytes());
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        write_chunk(&mut self.out, script_id::END, &[]);
        self.out
    }

    /// Script bytes without the closing END chunk
    pub fn build_unterminated(self) -> Vec<u8> {
        self.out
    }
}

/// Everything a [`RecordingHandle`] received
#[derive(Debug, Default)]
pub struct HandleLog {
    pub matrices: Vec<Mat4>,
    pub ghost: Option<bool>,
    pub active: Option<bool>,
    pub looped: Option<bool>,
    pub morphs: Vec<(String, f32, u64)>,
}

pub struct RecordingHandle {
    log: Arc<Mutex<HandleLog>>,
}

impl RecordingHandle {
    pub fn new() -> (Self, Arc<Mutex<HandleLog>>) {
        let log = Arc::new(Mutex::new(HandleLog::default()));
        (
            Self {
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl VisualHandle for RecordingHandle {
    fn set_obj_matrix(&mut self, world: Mat4) {
        self.log.lock().matrices.push(world);
    }

    fn set_as_ghost(&mut self, ghost: bool) {
        self.log.lock().ghost = Some(ghost);
    }

    fn set_active(&mut self, active: bool) {
        self.log.lock().active = Some(active);
    }

    fn set_looped(&mut self, looped: bool) {
        self.log.lock().looped = Some(looped);
    }

    fn start_morph_anim(&mut self, anim: &str, intensity: f32, until: u64) {
        self.log.lock().morphs.push((anim.to_string(), intensity, until));
    }
}
