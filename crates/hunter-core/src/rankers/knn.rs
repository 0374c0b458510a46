//! k-NN and relocation rankers: both compare the primary feature bank
//! against a seed frame's own row, the only difference being whether the
//! result feeds a display (k-NN) or a rescore (relocation).

use crate::error::{HunterError, Result};
use crate::ids::FrameId;
use crate::linalg::inverse_score_batch;
use crate::rankers::FeatureBank;

/// Returns the `k` frames whose primary embedding is closest to `seed`'s,
/// excluding `seed` itself, sorted by decreasing similarity then
/// ascending frame id.
///
/// # Errors
///
/// Returns [`HunterError::OutOfRange`] if `seed` has no row in
/// `features`.
pub fn k_nearest(seed: FrameId, features: &FeatureBank, k: usize) -> Result<Vec<FrameId>> {
    let query = features
        .get(seed.get())
        .ok_or_else(|| HunterError::OutOfRange(format!("frame {seed} has no feature row")))?;

    let mut scored: Vec<(FrameId, f32)> = features
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != seed.get())
        .map(|(i, row)| (FrameId::new(i), crate::linalg::similarity_score(query, row)))
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.get().cmp(&b.0.get()))
    });
    scored.truncate(k);
    Ok(scored.into_iter().map(|(id, _)| id).collect())
}

/// Ranks every frame by inverse-score distance to `seed`'s own embedding
/// (lower is better), for use as a relocation/"more like this" query.
///
/// # Errors
///
/// Returns [`HunterError::OutOfRange`] if `seed` has no row in
/// `features`.
pub fn rank_relocation(seed: FrameId, features: &FeatureBank) -> Result<Vec<f32>> {
    let query = features
        .get(seed.get())
        .ok_or_else(|| HunterError::OutOfRange(format!("frame {seed} has no feature row")))?;
    Ok(inverse_score_batch(query, features))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> FeatureBank {
        vec![vec![1.0, 0.0], vec![0.9, 0.1], vec![0.0, 1.0]]
    }

    #[test]
    fn k_nearest_excludes_seed_and_orders_by_similarity() {
        let result = k_nearest(FrameId::new(0), &bank(), 2).unwrap();
        assert_eq!(result, vec![FrameId::new(1), FrameId::new(2)]);
    }

    #[test]
    fn k_nearest_errors_on_unknown_seed() {
        assert!(k_nearest(FrameId::new(99), &bank(), 1).is_err());
    }

    #[test]
    fn relocation_scores_seed_against_itself_as_minimal() {
        let scores = rank_relocation(FrameId::new(0), &bank()).unwrap();
        assert!(scores[0] <= scores[1] && scores[0] <= scores[2]);
    }
}
