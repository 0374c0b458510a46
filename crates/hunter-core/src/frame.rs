//! Frame catalog: the flat, immutable table of every frame known to the
//! engine plus the loader that builds it from a filenames file and an
//! optional metadata sidecar.

use std::fs;
use std::path::Path;

use crate::config::{Config, FilenameOffsets};
use crate::error::{HunterError, Result};
use crate::ids::{FrameId, FrameNum, Hour, ShotId, VideoId, Weekday, Year};

/// Metadata decoded from an LSC-style sidecar line: day of week, hour of
/// day, and calendar year of capture, plus an opaque external identifier
/// used by some catalogs to cross-reference a separate provenance table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Day of week the frame was captured on.
    pub weekday: Weekday,
    /// Hour of day the frame was captured at, in `[0, 24)`.
    pub hour: Hour,
    /// Calendar year of capture.
    pub year: Year,
    /// External identifier from the metadata source, kept opaque.
    pub external_id: Box<str>,
}

/// A single entry in the frame catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// This frame's position in the catalog's flat frame table.
    pub id: FrameId,
    /// Video this frame belongs to.
    pub video_id: VideoId,
    /// Shot (within the video) this frame belongs to.
    pub shot_id: ShotId,
    /// Frame number within the video, as encoded in the filename.
    pub frame_num: FrameNum,
    /// Original filename, bounded by `max_frame_filename_len` at load
    /// time.
    pub filename: Box<str>,
    /// Optional day/hour/year/external-id metadata, present only when the
    /// catalog was loaded with a metadata sidecar.
    pub metadata: Option<FrameMetadata>,
}

/// The full, load-once set of frames the engine can search over.
#[derive(Debug, Clone, Default)]
pub struct FrameCatalog {
    frames: Vec<VideoFrame>,
}

impl FrameCatalog {
    /// Loads a catalog from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::Load`] if the frames-list file cannot be
    /// read, a filename is malformed or over-length, or the metadata
    /// sidecar (when configured) has a different number of lines.
    #[tracing::instrument(skip(config))]
    pub fn load(config: &Config) -> Result<Self> {
        let list_text = read_to_string(&config.frames_list_file)?;
        let metadata_lines: Option<Vec<String>> = match &config.lsc_metadata_file {
            Some(path) => Some(
                read_to_string(path)?
                    .lines()
                    .map(str::to_owned)
                    .collect(),
            ),
            None => None,
        };

        let filenames: Vec<&str> = list_text.lines().collect();
        if let Some(meta) = &metadata_lines {
            if meta.len() != filenames.len() {
                return Err(HunterError::Load {
                    path: config
                        .lsc_metadata_file
                        .clone()
                        .unwrap_or_default(),
                    reason: format!(
                        "metadata has {} lines but catalog has {}",
                        meta.len(),
                        filenames.len()
                    ),
                });
            }
        }

        let mut frames = Vec::with_capacity(filenames.len());
        for (i, filename) in filenames.iter().enumerate() {
            if filename.len() > config.max_frame_filename_len {
                return Err(HunterError::Load {
                    path: config.frames_list_file.clone(),
                    reason: format!("filename '{filename}' exceeds max_frame_filename_len"),
                });
            }

            let (video_id, shot_id, frame_num) =
                parse_video_filename(filename, &config.filename_offsets).ok_or_else(|| {
                    HunterError::Load {
                        path: config.frames_list_file.clone(),
                        reason: format!("could not decode filename '{filename}'"),
                    }
                })?;

            let metadata = metadata_lines
                .as_ref()
                .map(|lines| parse_metadata_line(&lines[i]))
                .transpose()
                .map_err(|reason| HunterError::Load {
                    path: config
                        .lsc_metadata_file
                        .clone()
                        .unwrap_or_default(),
                    reason,
                })?;

            frames.push(VideoFrame {
                id: FrameId::new(i),
                video_id,
                shot_id,
                frame_num,
                filename: (*filename).into(),
                metadata,
            });
        }

        tracing::info!(count = frames.len(), "frame catalog loaded");
        Ok(Self { frames })
    }

    /// Builds a catalog directly from already-decoded frames, primarily
    /// for tests and embedders that load the filename format themselves.
    #[must_use]
    pub fn from_frames(frames: Vec<VideoFrame>) -> Self {
        Self { frames }
    }

    /// Number of frames in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the catalog has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Looks up a frame by id.
    #[must_use]
    pub fn get(&self, id: FrameId) -> Option<&VideoFrame> {
        self.frames.get(id.get())
    }

    /// All frames, in catalog order.
    #[must_use]
    pub fn frames(&self) -> &[VideoFrame] {
        &self.frames
    }

    /// Video id of frame `id`, if it exists.
    #[must_use]
    pub fn video_id_of(&self, id: FrameId) -> Option<VideoId> {
        self.get(id).map(|f| f.video_id)
    }

    /// Shot id of frame `id`, if it exists.
    #[must_use]
    pub fn shot_id_of(&self, id: FrameId) -> Option<ShotId> {
        self.get(id).map(|f| f.shot_id)
    }

    /// Returns every frame belonging to `video_id` with a frame number in
    /// `[from, to)`, in catalog order.
    #[must_use]
    pub fn frames_in_range(&self, video_id: VideoId, from: FrameNum, to: FrameNum) -> Vec<&VideoFrame> {
        self.frames
            .iter()
            .filter(|f| f.video_id == video_id && f.frame_num.get() >= from.get() && f.frame_num.get() < to.get())
            .collect()
    }
}

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| HunterError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Decodes `(video_id, shot_id, frame_num)` out of a catalog filename using
/// the configured byte offsets.
fn parse_video_filename(filename: &str, offsets: &FilenameOffsets) -> Option<(VideoId, ShotId, FrameNum)> {
    let video_id = slice_parse::<u32>(filename, offsets.video_id)?;
    let shot_id = slice_parse::<u32>(filename, offsets.shot_id)?;
    let frame_num = slice_parse::<u32>(filename, offsets.frame_num)?;
    Some((VideoId::new(video_id), ShotId::new(shot_id), FrameNum::new(frame_num)))
}

fn slice_parse<T: std::str::FromStr>(s: &str, (start, end): (usize, usize)) -> Option<T> {
    s.get(start..end)?.parse().ok()
}

/// Parses one metadata sidecar line: `weekday,hour,year,external_id`.
fn parse_metadata_line(line: &str) -> std::result::Result<FrameMetadata, String> {
    let line = line.trim_end_matches('\r');
    let mut parts = line.split(',');
    let weekday: u8 = parts
        .next()
        .ok_or_else(|| "missing weekday field".to_string())?
        .parse()
        .map_err(|_| format!("bad weekday in '{line}'"))?;
    let hour: u8 = parts
        .next()
        .ok_or_else(|| "missing hour field".to_string())?
        .parse()
        .map_err(|_| format!("bad hour in '{line}'"))?;
    let year: u16 = parts
        .next()
        .ok_or_else(|| "missing year field".to_string())?
        .parse()
        .map_err(|_| format!("bad year in '{line}'"))?;
    let external_id = parts.next().unwrap_or("").to_string();

    Ok(FrameMetadata {
        weekday: Weekday::new(weekday),
        hour: Hour::new(hour),
        year: Year::new(year),
        external_id: external_id.into_boxed_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets() -> FilenameOffsets {
        // "v00012_s003_00045.jpg"
        //  0123456789...
        FilenameOffsets {
            video_id: (1, 6),
            shot_id: (8, 11),
            frame_num: (13, 18),
        }
    }

    #[test]
    fn parses_filename_with_configured_offsets() {
        let (video, shot, frame) = parse_video_filename("v00012_s003_00045.jpg", &offsets()).unwrap();
        assert_eq!(video, VideoId::new(12));
        assert_eq!(shot, ShotId::new(3));
        assert_eq!(frame, FrameNum::new(45));
    }

    #[test]
    fn rejects_short_filename() {
        assert!(parse_video_filename("short.jpg", &offsets()).is_none());
    }

    #[test]
    fn parses_metadata_line() {
        let meta = parse_metadata_line("3,14,2019,abc123\r").unwrap();
        assert_eq!(meta.weekday, Weekday::new(3));
        assert_eq!(meta.hour, Hour::new(14));
        assert_eq!(meta.year, Year::new(2019));
        assert_eq!(&*meta.external_id, "abc123");
    }

    #[test]
    fn catalog_from_frames_round_trips_lookup() {
        let frame = VideoFrame {
            id: FrameId::new(0),
            video_id: VideoId::new(1),
            shot_id: ShotId::new(0),
            frame_num: FrameNum::new(0),
            filename: "f.jpg".into(),
            metadata: None,
        };
        let catalog = FrameCatalog::from_frames(vec![frame.clone()]);
        assert_eq!(catalog.get(FrameId::new(0)), Some(&frame));
        assert_eq!(catalog.len(), 1);
    }
}
