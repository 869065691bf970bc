//! Binary model script reader
//!
//! A model script lists the clips of one model. Each `ANI` chunk names a clip
//! resource and its playback metadata, `ANI_ALIAS` re-uses the samples of an
//! earlier clip under a new name. Event marker chunks that follow a clip are
//! drained: they are counted on the clip but have no runtime effect.

use std::io::Cursor;

use crate::chunk::{Chunk, ChunkReader};
use crate::clip::{ClipFlags, ComboWindow};
use crate::error::{AnimError, Result};
use crate::io_ext::ReadExt;

/// Model script chunk ids
pub mod chunk_id {
    pub const MODEL_SCRIPT: u16 = 0xF000;
    pub const SOURCE: u16 = 0xF100;
    pub const MODEL: u16 = 0xF200;
    pub const MESH_AND_TREE: u16 = 0xF300;
    pub const REGISTER_MESH: u16 = 0xF400;
    pub const ANI_ENUM: u16 = 0xF500;
    pub const ANI_MAX_FPS: u16 = 0xF510;
    pub const ANI: u16 = 0xF520;
    pub const ANI_ALIAS: u16 = 0xF530;
    pub const ANI_COMBO: u16 = 0xF5A0;
    pub const ANI_EVENTS: u16 = 0xF600;
    pub const EVENT_SFX: u16 = 0xF610;
    pub const EVENT_SFX_GRND: u16 = 0xF620;
    pub const EVENT_TAG: u16 = 0xF630;
    pub const EVENT_PFX: u16 = 0xF640;
    pub const EVENT_PFX_STOP: u16 = 0xF650;
    pub const EVENT_PFX_GRND: u16 = 0xF660;
    pub const EVENT_SET_MESH: u16 = 0xF670;
    pub const EVENT_SWAP_MESH: u16 = 0xF680;
    pub const EVENT_MM_START_ANI: u16 = 0xF690;
    pub const EVENT_CAM_TREMOR: u16 = 0xF6A0;
    pub const ERROR: u16 = 0xFFF0;
    pub const END: u16 = 0xFFFF;
}

/// Where a declared clip takes its samples from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipSource {
    /// A clip resource of its own, compiled from `asc`
    Resource {
        asc: String,
        first_frame: u32,
        last_frame: u32,
    },
    /// The samples of another clip of the same model
    Alias(String),
}

/// One clip declaration of a model script
#[derive(Debug, Clone, PartialEq)]
pub struct ClipDecl {
    pub name: String,
    pub layer: u32,
    pub next: String,
    /// Seconds
    pub blend_in: f32,
    /// Seconds
    pub blend_out: f32,
    pub flags: ClipFlags,
    pub reversed: bool,
    pub source: ClipSource,
    pub combo: Vec<ComboWindow>,
    /// Event markers drained while this clip was the most recent declaration
    pub events: u32,
}

/// Parsed model script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelScript {
    pub clips: Vec<ClipDecl>,
}

impl ModelScript {
    /// Parse a binary model script
    ///
    /// Parsing stops at the `END` chunk or the end of the data. An `ERROR`
    /// chunk aborts with [`AnimError::ScriptError`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut script = Self::default();

        for chunk in ChunkReader::new(data) {
            let chunk = chunk?;
            match chunk.id {
                chunk_id::END => break,
                chunk_id::ERROR => {
                    let message = Cursor::new(chunk.payload).read_line()?;
                    return Err(AnimError::ScriptError(message));
                }
                chunk_id::ANI => script.clips.push(parse_ani(&chunk)?),
                chunk_id::ANI_ALIAS => script.clips.push(parse_alias(&chunk)?),
                chunk_id::ANI_COMBO => {
                    let windows = parse_combo(&chunk)?;
                    match script.clips.last_mut() {
                        Some(clip) => clip.combo = windows,
                        None => log::warn!("Combo windows at {} precede every clip", chunk.offset),
                    }
                }
                chunk_id::EVENT_SFX..=chunk_id::EVENT_CAM_TREMOR => match script.clips.last_mut() {
                    Some(clip) => {
                        clip.events += 1;
                        log::debug!("Drained event 0x{:04X} of '{}'", chunk.id, clip.name);
                    }
                    None => log::debug!("Drained event 0x{:04X} before any clip", chunk.id),
                },
                chunk_id::MODEL_SCRIPT
                | chunk_id::SOURCE
                | chunk_id::MODEL
                | chunk_id::MESH_AND_TREE
                | chunk_id::REGISTER_MESH
                | chunk_id::ANI_ENUM
                | chunk_id::ANI_MAX_FPS
                | chunk_id::ANI_EVENTS => {}
                id => log::debug!("Skipping unknown script chunk 0x{id:04X} at {}", chunk.offset),
            }
        }

        Ok(script)
    }
}

struct CommonFields {
    name: String,
    layer: u32,
    next: String,
    blend_in: f32,
    blend_out: f32,
    flags: ClipFlags,
}

fn parse_common(r: &mut Cursor<&[u8]>) -> std::io::Result<CommonFields> {
    Ok(CommonFields {
        name: r.read_line()?,
        layer: r.read_u32_le()?,
        next: r.read_line()?,
        blend_in: r.read_f32_le()?,
        blend_out: r.read_f32_le()?,
        flags: ClipFlags::from_script(&r.read_line()?),
    })
}

fn decl(common: CommonFields, reversed: bool, source: ClipSource) -> ClipDecl {
    ClipDecl {
        name: common.name,
        layer: common.layer,
        next: common.next,
        blend_in: common.blend_in,
        blend_out: common.blend_out,
        flags: common.flags,
        reversed,
        source,
        combo: Vec::new(),
        events: 0,
    }
}

fn invalid(chunk: &Chunk<'_>) -> AnimError {
    AnimError::InvalidChunk {
        id: chunk.id,
        offset: chunk.offset,
    }
}

fn parse_ani(chunk: &Chunk<'_>) -> Result<ClipDecl> {
    let mut r = Cursor::new(chunk.payload);
    let parsed = (|| {
        let common = parse_common(&mut r)?;
        let asc = r.read_line()?;
        let dir = r.read_line()?;
        let first_frame = r.read_u32_le()?;
        let last_frame = r.read_u32_le()?;
        Ok::<_, std::io::Error>((common, asc, dir, first_frame, last_frame))
    })();
    let (common, asc, dir, first_frame, last_frame) = parsed.map_err(|_| invalid(chunk))?;

    Ok(decl(
        common,
        dir.starts_with('R'),
        ClipSource::Resource {
            asc,
            first_frame,
            last_frame,
        },
    ))
}

fn parse_alias(chunk: &Chunk<'_>) -> Result<ClipDecl> {
    let mut r = Cursor::new(chunk.payload);
    let parsed = (|| {
        let common = parse_common(&mut r)?;
        let alias = r.read_line()?;
        let dir = r.read_line()?;
        Ok::<_, std::io::Error>((common, alias, dir))
    })();
    let (common, alias, dir) = parsed.map_err(|_| invalid(chunk))?;

    Ok(decl(common, dir.starts_with('R'), ClipSource::Alias(alias)))
}

fn parse_combo(chunk: &Chunk<'_>) -> Result<Vec<ComboWindow>> {
    let mut r = Cursor::new(chunk.payload);
    let count = r.read_u32_le().map_err(|_| invalid(chunk))? as usize;
    let expected = 4 + count * 8;
    if chunk.payload.len() < expected {
        return Err(AnimError::Truncated {
            context: "combo windows",
            expected,
            actual: chunk.payload.len(),
        });
    }

    (0..count)
        .map(|_| {
            Ok::<_, AnimError>(ComboWindow {
                start_frame: r.read_u32_le()?,
                window_end_frame: r.read_u32_le()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MsbBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_declarations() {
        let data = MsbBuilder::new()
            .ani("S_RUN", 1, "S_RUN", "M.E")
            .event(chunk_id::EVENT_SFX)
            .event(chunk_id::EVENT_TAG)
            .ani("T_1HATTACKL", 1, "", "M")
            .combo(&[(0, 10), (12, 20)])
            .alias("S_RUN_ALIAS", 2, "I", "S_RUN")
            .build();
        let script = ModelScript::parse(&data).unwrap();

        assert_eq!(script.clips.len(), 3);
        let run = &script.clips[0];
        assert_eq!(run.name, "S_RUN");
        assert_eq!(run.next, "S_RUN");
        assert_eq!(run.flags, ClipFlags::MOVE | ClipFlags::QUEUE_NEXT);
        assert_eq!(run.events, 2);
        assert!(!run.reversed);
        assert!(matches!(run.source, ClipSource::Resource { ref asc, .. } if asc == "S_RUN.ASC"));

        let attack = &script.clips[1];
        assert_eq!(attack.combo.len(), 2);
        assert_eq!(attack.combo[1].start_frame, 12);

        let alias = &script.clips[2];
        assert_eq!(alias.layer, 2);
        assert!(alias.reversed);
        assert_eq!(alias.source, ClipSource::Alias("S_RUN".into()));
    }

    #[test]
    fn test_error_chunk_is_fatal() {
        let data = MsbBuilder::new().ani("S_RUN", 1, "", "").error("bad script").build();
        match ModelScript::parse(&data) {
            Err(AnimError::ScriptError(msg)) => assert_eq!(msg, "bad script"),
            other => panic!("expected script error, got {other:?}"),
        }
    }

    #[test]
    fn test_end_of_stream_terminates() {
        let data = MsbBuilder::new().ani("S_WALK", 1, "", "").build_unterminated();
        let script = ModelScript::parse(&data).unwrap();
        assert_eq!(script.clips.len(), 1);
    }

    #[test]
    fn test_events_before_clips_are_drained() {
        let data = MsbBuilder::new()
            .event(chunk_id::EVENT_PFX)
            .ani("S_WALK", 1, "", "")
            .build();
        let script = ModelScript::parse(&data).unwrap();
        assert_eq!(script.clips[0].events, 0);
    }

    #[test]
    fn test_truncated_declaration() {
        let mut data = Vec::new();
        crate::chunk::write_chunk(&mut data, chunk_id::ANI, b"S_RUN\n\x01");
        assert!(matches!(
            ModelScript::parse(&data),
            Err(AnimError::InvalidChunk { id: chunk_id::ANI, .. })
        ));
    }
}
