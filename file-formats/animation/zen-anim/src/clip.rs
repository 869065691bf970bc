//! Motion clips: sampled bone transforms plus the playback metadata declared
//! by the model script
//!
//! A clip resource holds one sample per animated bone per frame. Samples are
//! stored frame-major, so the sample for frame `f` and animated bone slot `s`
//! lives at `f * node_index.len() + s`.

use std::io::Cursor;
use std::sync::Arc;

use bitflags::bitflags;
use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::chunk::ChunkReader;
use crate::error::{AnimError, Result};
use crate::io_ext::ReadExt;

/// Clip resource chunk ids
pub mod chunk_id {
    pub const MARKER: u16 = 0xA000;
    pub const SOURCE: u16 = 0xA010;
    pub const HEADER: u16 = 0xA020;
    pub const RAWDATA: u16 = 0xA090;
}

/// Size of one encoded sample: three rotation and three position words
pub const SAMPLE_SIZE: usize = 12;

const ROT_CENTER: f32 = 32767.0;
const ROT_SCALE: f32 = 2.1 / 65535.0;

bitflags! {
    /// Playback semantics of a clip
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClipFlags: u32 {
        /// Authored root motion drives locomotion
        const MOVE = 0x01;
        /// Authored root rotation drives turning
        const ROTATE = 0x02;
        /// Keeps playing (loops) when no successor is declared
        const QUEUE_NEXT = 0x04;
        /// Root motion is not bound to the ground
        const FLY = 0x08;
        /// Idle clip, loops
        const IDLE = 0x10;
    }
}

impl ClipFlags {
    /// Parse the flag letters of a script declaration (`M`, `R`, `E`, `F`, `I`)
    pub fn from_script(letters: &str) -> Self {
        letters.chars().fold(Self::empty(), |flags, c| match c {
            'M' => flags | Self::MOVE,
            'R' => flags | Self::ROTATE,
            'E' => flags | Self::QUEUE_NEXT,
            'F' => flags | Self::FLY,
            'I' => flags | Self::IDLE,
            _ => flags,
        })
    }
}

/// One bone sample
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    pub rotation: Quat,
    pub position: Vec3,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

impl Sample {
    pub fn new(rotation: Quat, position: Vec3) -> Self {
        Self { rotation, position }
    }

    /// Interpolate towards `other` (lerp position, slerp rotation)
    pub fn blend(&self, other: &Self, t: f32) -> Self {
        Self {
            rotation: self.rotation.slerp(other.rotation, t),
            position: self.position.lerp(other.position, t),
        }
    }

    /// Local bone matrix of this sample
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

/// Decode a packed rotation triple into a unit quaternion
pub fn decode_rotation(raw: [u16; 3]) -> Quat {
    let v = Vec3::new(
        (f32::from(raw[0]) - ROT_CENTER) * ROT_SCALE,
        (f32::from(raw[1]) - ROT_CENTER) * ROT_SCALE,
        (f32::from(raw[2]) - ROT_CENTER) * ROT_SCALE,
    );
    let len_sq = v.length_squared();
    if len_sq > 1.0 {
        let n = v / len_sq.sqrt();
        Quat::from_xyzw(n.x, n.y, n.z, 0.0)
    } else {
        Quat::from_xyzw(v.x, v.y, v.z, (1.0 - len_sq).sqrt())
    }
}

/// Header chunk of a clip resource
#[derive(Debug, Clone, PartialEq)]
pub struct ClipHeader {
    pub version: u16,
    pub name: String,
    pub layer: u32,
    pub num_frames: u32,
    pub num_nodes: u32,
    pub fps: f32,
    pub fps_source: f32,
    pub pos_range_min: f32,
    pub pos_scaler: f32,
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
    pub next: String,
}

impl Default for ClipHeader {
    fn default() -> Self {
        Self {
            version: 0,
            name: String::new(),
            layer: 1,
            num_frames: 0,
            num_nodes: 0,
            fps: 60.0,
            fps_source: 60.0,
            pos_range_min: 0.0,
            pos_scaler: 1.0,
            bbox_min: Vec3::ZERO,
            bbox_max: Vec3::ZERO,
            next: String::new(),
        }
    }
}

impl ClipHeader {
    fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(payload);
        Ok(Self {
            version: r.read_u16_le()?,
            name: r.read_line()?,
            layer: r.read_u32_le()?,
            num_frames: r.read_u32_le()?,
            num_nodes: r.read_u32_le()?,
            fps: r.read_f32_le()?,
            fps_source: r.read_f32_le()?,
            pos_range_min: r.read_f32_le()?,
            pos_scaler: r.read_f32_le()?,
            bbox_min: r.read_vec3_le()?,
            bbox_max: r.read_vec3_le()?,
            next: r.read_line()?,
        })
    }
}

/// Sample data of one clip resource, shared by every clip declaration that
/// refers to the same file
#[derive(Debug, Clone, PartialEq)]
pub struct ClipData {
    header: ClipHeader,
    checksum: u32,
    node_index: Vec<u32>,
    samples: Vec<Sample>,
    root_motion: Vec3,
    root_yaw: f32,
}

impl ClipData {
    /// Build clip data from already decoded samples
    pub fn new(header: ClipHeader, node_index: Vec<u32>, samples: Vec<Sample>) -> Self {
        let mut data = Self {
            header,
            checksum: 0,
            node_index,
            samples,
            root_motion: Vec3::ZERO,
            root_yaw: 0.0,
        };
        data.setup_root_motion();
        data
    }

    /// Parse a clip resource
    ///
    /// `default_fps` replaces a non-positive frame rate from the header.
    pub fn parse(data: &[u8], default_fps: f32) -> Result<Self> {
        let mut header: Option<ClipHeader> = None;
        let mut checksum = 0;
        let mut node_index = Vec::new();
        let mut samples = Vec::new();

        for chunk in ChunkReader::new(data) {
            let chunk = chunk?;
            match chunk.id {
                chunk_id::MARKER | chunk_id::SOURCE => {}
                chunk_id::HEADER => {
                    let mut h = ClipHeader::parse(chunk.payload)?;
                    if h.fps.is_nan() || h.fps <= 0.0 {
                        log::warn!(
                            "Clip '{}' declares fps {}, using {default_fps}",
                            h.name,
                            h.fps
                        );
                        h.fps = default_fps;
                    }
                    header = Some(h);
                }
                chunk_id::RAWDATA => {
                    let Some(h) = header.as_ref() else {
                        return Err(AnimError::InvalidChunk {
                            id: chunk.id,
                            offset: chunk.offset,
                        });
                    };
                    (checksum, node_index, samples) = parse_raw_data(chunk.payload, h)?;
                }
                id => {
                    log::debug!("Skipping unknown clip chunk 0x{id:04X} at {}", chunk.offset);
                }
            }
        }

        let header = header.unwrap_or_else(|| ClipHeader {
            fps: default_fps,
            ..ClipHeader::default()
        });
        let mut clip = Self::new(header, node_index, samples);
        clip.checksum = checksum;
        Ok(clip)
    }

    fn setup_root_motion(&mut self) {
        let stride = self.node_index.len();
        if stride == 0 || self.samples.len() < stride {
            return;
        }
        let first = self.samples[0];
        let last = self.samples[self.samples.len() - stride];

        self.root_motion = last.position - first.position;
        let (yaw, _, _) = (last.rotation * first.rotation.inverse()).to_euler(EulerRot::YXZ);
        self.root_yaw = yaw.to_degrees();
    }

    pub fn header(&self) -> &ClipHeader {
        &self.header
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn fps(&self) -> f32 {
        self.header.fps
    }

    pub fn num_frames(&self) -> u32 {
        self.header.num_frames
    }

    /// Skeleton bone indices animated by this clip, one per sample slot
    pub fn node_index(&self) -> &[u32] {
        &self.node_index
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Displacement between the first and the last sampled frame
    pub fn root_motion(&self) -> Vec3 {
        self.root_motion
    }

    /// Yaw (degrees) between the first and the last sampled frame
    pub fn root_yaw(&self) -> f32 {
        self.root_yaw
    }

    /// Length of one playthrough in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.header.num_frames == 0 || self.header.fps <= 0.0 {
            return 0.0;
        }
        f64::from(self.header.num_frames) * 1000.0 / f64::from(self.header.fps)
    }

    /// Stored sample of animated slot `slot` at `frame`
    pub fn sample(&self, frame: u32, slot: usize) -> Option<&Sample> {
        let stride = self.node_index.len();
        if slot >= stride {
            return None;
        }
        self.samples.get(frame as usize * stride + slot)
    }

    /// Interpolated sample of slot `slot` at a fractional frame position
    ///
    /// Positions past the last frame hold the last frame.
    pub fn sample_at(&self, slot: usize, frame: f32) -> Option<Sample> {
        let frames = self.header.num_frames;
        if frames == 0 {
            return None;
        }
        let last = (frames - 1) as f32;
        let frame = frame.clamp(0.0, last);
        let f0 = frame.floor();
        let i0 = f0 as u32;
        let i1 = (i0 + 1).min(frames - 1);

        let a = self.sample(i0, slot)?;
        match self.sample(i1, slot) {
            Some(b) if i1 != i0 => Some(a.blend(b, frame - f0)),
            _ => Some(*a),
        }
    }
}

fn parse_raw_data(payload: &[u8], header: &ClipHeader) -> Result<(u32, Vec<u32>, Vec<Sample>)> {
    let nodes = header.num_nodes as usize;
    let sizes = (header.num_frames as usize).checked_mul(nodes).and_then(|count| {
        let expected = count
            .checked_mul(SAMPLE_SIZE)?
            .checked_add(nodes.checked_mul(4)?)?
            .checked_add(4)?;
        Some((count, expected))
    });
    let Some((count, expected)) = sizes else {
        return Err(AnimError::ParseError(format!(
            "clip declares {} frames of {nodes} nodes",
            header.num_frames
        )));
    };
    if payload.len() < expected {
        return Err(AnimError::Truncated {
            context: "clip samples",
            expected,
            actual: payload.len(),
        });
    }

    let mut r = Cursor::new(payload);
    let checksum = r.read_u32_le()?;
    let node_index = (0..nodes)
        .map(|_| r.read_u32_le())
        .collect::<std::io::Result<Vec<_>>>()?;

    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let rot = [r.read_u16_le()?, r.read_u16_le()?, r.read_u16_le()?];
        let pos = [r.read_u16_le()?, r.read_u16_le()?, r.read_u16_le()?];
        let position = Vec3::new(
            f32::from(pos[0]) * header.pos_scaler + header.pos_range_min,
            f32::from(pos[1]) * header.pos_scaler + header.pos_range_min,
            f32::from(pos[2]) * header.pos_scaler + header.pos_range_min,
        );
        samples.push(Sample::new(decode_rotation(rot), position));
    }

    Ok((checksum, node_index, samples))
}

/// A timing window of a combo branch, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComboWindow {
    /// Frame the branch starts playing at
    pub start_frame: u32,
    /// Last frame at which the next branch may still be chained
    pub window_end_frame: u32,
}

/// A named clip of a model catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    name: String,
    layer: u32,
    flags: ClipFlags,
    next: String,
    blend_in: f32,
    blend_out: f32,
    reversed: bool,
    combo: Vec<ComboWindow>,
    data: Arc<ClipData>,
}

impl Clip {
    /// Create a clip on layer 1 with no flags
    pub fn new<S: Into<String>>(name: S, data: Arc<ClipData>) -> Self {
        Self {
            name: name.into(),
            layer: 1,
            flags: ClipFlags::empty(),
            next: String::new(),
            blend_in: 0.0,
            blend_out: 0.0,
            reversed: false,
            combo: Vec::new(),
            data,
        }
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_flags(mut self, flags: ClipFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_next<S: Into<String>>(mut self, next: S) -> Self {
        self.next = next.into();
        self
    }

    /// Blend-in and blend-out times in seconds
    pub fn with_blend(mut self, blend_in: f32, blend_out: f32) -> Self {
        self.blend_in = blend_in;
        self.blend_out = blend_out;
        self
    }

    pub fn with_reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    pub fn with_combo(mut self, combo: Vec<ComboWindow>) -> Self {
        self.combo = combo;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Playback layer this clip runs on
    pub fn layer(&self) -> u32 {
        self.layer
    }

    pub fn flags(&self) -> ClipFlags {
        self.flags
    }

    /// Successor clip name, empty when none is declared
    pub fn next(&self) -> &str {
        &self.next
    }

    pub fn blend_in_ms(&self) -> f64 {
        f64::from(self.blend_in) * 1000.0
    }

    pub fn blend_out_ms(&self) -> f64 {
        f64::from(self.blend_out) * 1000.0
    }

    /// Whether the script declares reverse playback
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn combo_windows(&self) -> &[ComboWindow] {
        &self.combo
    }

    /// Shared sample data
    pub fn data(&self) -> &Arc<ClipData> {
        &self.data
    }

    pub fn fps(&self) -> f32 {
        self.data.fps()
    }

    pub fn num_frames(&self) -> u32 {
        self.data.num_frames()
    }

    pub fn duration_ms(&self) -> f64 {
        self.data.duration_ms()
    }

    pub fn is_move(&self) -> bool {
        self.flags.contains(ClipFlags::MOVE)
    }

    pub fn is_rotate(&self) -> bool {
        self.flags.contains(ClipFlags::ROTATE)
    }

    /// Whether the clip keeps playing after its end without a successor
    pub fn is_looping(&self) -> bool {
        self.flags.intersects(ClipFlags::IDLE | ClipFlags::QUEUE_NEXT)
    }

    pub fn root_motion(&self) -> Vec3 {
        self.data.root_motion()
    }

    /// Displacement produced while playing for `dt_ms`
    ///
    /// Zero for clips without the `MOVE` flag.
    pub fn speed(&self, dt_ms: f64) -> Vec3 {
        let total = self.duration_ms();
        if !self.is_move() || total <= 0.0 {
            return Vec3::ZERO;
        }
        self.data.root_motion() * (dt_ms / total) as f32
    }

    /// Yaw (degrees) produced while playing for `dt_ms`
    ///
    /// Zero for clips without the `ROTATE` flag.
    pub fn yaw_speed(&self, dt_ms: f64) -> f32 {
        let total = self.duration_ms();
        if !self.is_rotate() || total <= 0.0 {
            return 0.0;
        }
        self.data.root_yaw() * (dt_ms / total) as f32
    }

    /// Fractional frame reached after `elapsed_ms` of playback
    pub fn frame_at(&self, elapsed_ms: f64) -> f32 {
        (elapsed_ms * f64::from(self.fps()) / 1000.0) as f32
    }

    /// Playback time at which `frame` is reached
    pub fn ms_at_frame(&self, frame: u32) -> f64 {
        let fps = f64::from(self.fps());
        if fps <= 0.0 {
            return 0.0;
        }
        f64::from(frame) * 1000.0 / fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{ManBuilder, encode_position};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_from_script() {
        assert_eq!(ClipFlags::from_script("M.E."), ClipFlags::MOVE | ClipFlags::QUEUE_NEXT);
        assert_eq!(ClipFlags::from_script("RI"), ClipFlags::ROTATE | ClipFlags::IDLE);
        assert_eq!(ClipFlags::from_script(""), ClipFlags::empty());
    }

    #[test]
    fn test_decode_identity_rotation() {
        let q = decode_rotation([32767, 32767, 32767]);
        assert!(q.abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_decode_overlong_rotation() {
        let q = decode_rotation([u16::MAX, u16::MAX, u16::MAX]);
        assert_eq!(q.w, 0.0);
        assert!((Vec3::new(q.x, q.y, q.z).length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_parse_root_motion() {
        let bytes = ManBuilder::new("S_RUN", 30, 30.0)
            .nodes(&[0, 1])
            .root_track(|frame| Vec3::new(0.0, 0.0, frame as f32 * 3.0 / 29.0))
            .build();
        let clip = ClipData::parse(&bytes, 60.0).unwrap();

        assert_eq!(clip.num_frames(), 30);
        assert_eq!(clip.node_index(), &[0, 1]);
        assert_eq!(clip.samples().len(), 60);
        assert!(clip.root_motion().abs_diff_eq(Vec3::new(0.0, 0.0, 3.0), 1e-3));
        assert!((clip.duration_ms() - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_position_decoding() {
        let bytes = ManBuilder::new("S_WALK", 1, 25.0)
            .nodes(&[0])
            .root_track(|_| Vec3::new(1.5, -2.0, 0.25))
            .build();
        let clip = ClipData::parse(&bytes, 60.0).unwrap();
        let s = clip.sample(0, 0).unwrap();
        assert!(s.position.abs_diff_eq(Vec3::new(1.5, -2.0, 0.25), 1e-4));
        assert_eq!(encode_position(0.0), 32768);
    }

    #[test]
    fn test_short_sample_buffer_has_zero_motion() {
        let header = ClipHeader {
            num_frames: 1,
            num_nodes: 4,
            ..ClipHeader::default()
        };
        let clip = ClipData::new(header, vec![0, 1, 2, 3], vec![Sample::default(); 2]);
        assert_eq!(clip.root_motion(), Vec3::ZERO);
        assert_eq!(clip.root_yaw(), 0.0);

        let empty = ClipData::new(ClipHeader::default(), Vec::new(), Vec::new());
        assert_eq!(empty.root_motion(), Vec3::ZERO);

        // samples without any animated node
        let samples = vec![Sample::default()];
        let unindexed = ClipData::new(ClipHeader::default(), Vec::new(), samples);
        assert_eq!(unindexed.root_motion(), Vec3::ZERO);
        assert_eq!(unindexed.root_yaw(), 0.0);
    }

    #[test]
    fn test_missing_header_uses_defaults() {
        let clip = ClipData::parse(&[], 60.0).unwrap();
        assert_eq!(clip.num_frames(), 0);
        assert_eq!(clip.fps(), 60.0);
        assert_eq!(clip.duration_ms(), 0.0);
    }

    #[test]
    fn test_non_positive_fps_falls_back() {
        let bytes = ManBuilder::new("S_RUN", 2, 0.0).nodes(&[0]).build();
        let clip = ClipData::parse(&bytes, 25.0).unwrap();
        assert_eq!(clip.fps(), 25.0);
    }

    #[test]
    fn test_raw_data_before_header_is_fatal() {
        let bytes = ManBuilder::new("S_RUN", 2, 30.0).nodes(&[0]).raw_first().build();
        assert!(matches!(
            ClipData::parse(&bytes, 60.0),
            Err(AnimError::InvalidChunk { id: chunk_id::RAWDATA, .. })
        ));
    }

    #[test]
    fn test_short_raw_data_is_fatal() {
        let bytes = ManBuilder::new("S_RUN", 4, 30.0).nodes(&[0]).drop_samples(1).build();
        assert!(matches!(
            ClipData::parse(&bytes, 60.0),
            Err(AnimError::Truncated { context: "clip samples", .. })
        ));
    }

    #[test]
    fn test_oversized_sample_count_is_fatal() {
        let header = ClipHeader {
            num_frames: u32::MAX,
            num_nodes: u32::MAX,
            ..ClipHeader::default()
        };
        let payload = [0u8; 16];
        assert!(matches!(
            parse_raw_data(&payload, &header),
            Err(AnimError::ParseError(_) | AnimError::Truncated { .. })
        ));
    }

    #[test]
    fn test_speed_only_for_move_clips() {
        let bytes = ManBuilder::new("S_RUN", 30, 30.0)
            .nodes(&[0])
            .root_track(|frame| Vec3::Z * frame as f32 * 0.1)
            .build();
        let data = Arc::new(ClipData::parse(&bytes, 60.0).unwrap());

        let idle = Clip::new("S_RUN", Arc::clone(&data));
        assert_eq!(idle.speed(500.0), Vec3::ZERO);

        let run = Clip::new("S_RUN", data).with_flags(ClipFlags::MOVE);
        assert!(run.speed(500.0).abs_diff_eq(run.root_motion() * 0.5, 1e-5));
    }

    #[test]
    fn test_sample_interpolation() {
        let bytes = ManBuilder::new("T_JUMP", 3, 10.0)
            .nodes(&[0])
            .root_track(|frame| Vec3::X * frame as f32)
            .build();
        let clip = ClipData::parse(&bytes, 60.0).unwrap();

        let mid = clip.sample_at(0, 0.5).unwrap();
        assert!((mid.position.x - 0.5).abs() < 1e-3);
        let end = clip.sample_at(0, 10.0).unwrap();
        assert!((end.position.x - 2.0).abs() < 1e-3);
        assert!(clip.sample_at(1, 0.0).is_none());
    }
}
