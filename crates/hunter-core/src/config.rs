//! Engine configuration.
//!
//! `Config` is a plain data value: something else (a CLI, an HTTP service,
//! a test harness) is responsible for reading it from disk and handing it
//! to [`crate::engine::Engine::new`]. This crate never opens a config file
//! itself.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Byte offsets used to carve `video_id` / `shot_id` / `frame_num` out of a
/// catalog filename, e.g. `"v_00123_shot0045_45.jpg"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilenameOffsets {
    /// Start/end byte offsets of the video id within the filename.
    pub video_id: (usize, usize),
    /// Start/end byte offsets of the shot id within the filename.
    pub shot_id: (usize, usize),
    /// Start/end byte offsets of the frame number within the filename.
    pub frame_num: (usize, usize),
}

/// Paths to the binary artifacts backing the text ranker's keyword
/// embedding pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRankerConfig {
    /// Colon-delimited keyword-classes text file.
    pub kw_classes_file: PathBuf,
    /// Per-keyword feature matrix (one row per keyword id).
    pub kw_features_file: PathBuf,
    /// Bias vector added before the `tanh` nonlinearity.
    pub kw_bias_file: PathBuf,
    /// PCA projection matrix applied after the nonlinearity.
    pub pca_matrix_file: PathBuf,
    /// PCA mean vector subtracted before projection.
    pub pca_mean_file: PathBuf,
}

/// Number of fixed regions the canvas ranker matches queries against.
pub const CANVAS_REGION_COUNT: usize = 12;

/// Paths to the per-region feature banks backing the canvas ranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasRankerConfig {
    /// Common path prefix; region `i`'s features live at
    /// `format!("{region_file_prefix}{i}")`.
    pub region_file_prefix: PathBuf,
}

/// Self-organizing map geometry and training schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SomConfig {
    /// Grid width in units.
    pub width: usize,
    /// Grid height in units.
    pub height: usize,
    /// Iterations spent in the ordering ("phase A") stage.
    pub iterations_a: usize,
    /// Iterations spent in the anti-learning ("phase B") stage.
    pub iterations_b: usize,
}

impl Default for SomConfig {
    fn default() -> Self {
        Self {
            width: 16,
            height: 16,
            iterations_a: 1000,
            iterations_b: 500,
        }
    }
}

/// Top-level engine configuration, mirroring the session API's
/// configuration table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the newline-delimited catalog filenames file.
    pub frames_list_file: PathBuf,
    /// Byte offsets used to decode catalog filenames.
    pub filename_offsets: FilenameOffsets,
    /// Maximum accepted length, in bytes, of a catalog filename.
    pub max_frame_filename_len: usize,
    /// Maximum number of temporal slots a query may use. A fresh search
    /// context reserves this many temporal score rows up front.
    pub max_temporal_size: usize,
    /// Optional line-aligned CSV file of `(weekday, hour, year, external_id)`
    /// metadata, one line per catalog entry.
    pub lsc_metadata_file: Option<PathBuf>,
    /// Primary (embedding-backed) keyword ranker artifacts.
    pub keyword_ranker: KeywordRankerConfig,
    /// Canvas/region ranker artifacts. Absent disables the canvas ranker.
    pub canvas_ranker: Option<CanvasRankerConfig>,
    /// Self-organizing map geometry and schedule.
    pub som: SomConfig,
    /// Maximum number of frames shown per video in a single top-n result.
    pub default_frames_per_video_limit: usize,
    /// Maximum number of frames shown per shot in a single top-n result.
    pub default_frames_per_shot_limit: usize,
    /// Directory that session events are appended to as JSON lines.
    /// Logging is a no-op when unset.
    pub log_dir: Option<PathBuf>,
    /// Base URL of the evaluation server. Submission is a no-op when
    /// unset.
    pub eval_server_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn som_config_default_matches_documented_geometry() {
        let som = SomConfig::default();
        assert_eq!(som.width, 16);
        assert_eq!(som.height, 16);
    }
}
