//! Rankers: pure functions that turn a query variant into a per-frame
//! sub-score vector. None of them touch a [`crate::score::ScoreModel`]
//! directly -- the caller decides which temporal slot a sub-score vector
//! is folded into, keeping the scoring state machine in one place.

mod canvas;
mod knn;
mod text;

pub use canvas::{fixed_regions, rank_canvas, RegionFeatureBank};
pub use knn::{k_nearest, rank_relocation};
pub use text::{autocomplete, rank_text};

use crate::error::Result;

/// A per-frame feature matrix: one unit-normalized row per frame, indexed
/// by [`crate::ids::FrameId`].
pub type FeatureBank = Vec<Vec<f32>>;

/// A ranker that, given the primary feature bank, produces one
/// multiplicative sub-score per frame.
///
/// Expressed as a trait (rather than a tagged enum with a big `match`)
/// so each query variant's ranking logic lives in its own module and new
/// variants don't require touching existing ones.
pub trait Ranker {
    /// Computes the sub-score vector, one entry per frame in `features`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ranker's query is structurally invalid
    /// (e.g. an empty text query).
    fn score(&self, features: &FeatureBank) -> Result<Vec<f32>>;
}
