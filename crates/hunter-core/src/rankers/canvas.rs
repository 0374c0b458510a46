//! Canvas ranker: matches each region of a canvas query against one of
//! [`crate::config::CANVAS_REGION_COUNT`] fixed regions of interest and
//! scores frames by how well that region's feature bank matches the
//! subquery.

use crate::config::CANVAS_REGION_COUNT;
use crate::error::Result;
use crate::filters::{CanvasQuery, CanvasSubquery, RelativeRect};
use crate::keyword::KeywordTable;
use crate::linalg::inverse_score_batch;
use crate::rankers::FeatureBank;

/// Per-region feature banks, one entry per fixed region of interest.
pub type RegionFeatureBank = Vec<FeatureBank>;

/// The fixed regions of interest canvas subqueries are matched against: a
/// 4x3 grid tiling the frame.
#[must_use]
pub fn fixed_regions() -> [RelativeRect; CANVAS_REGION_COUNT] {
    let cols = 4;
    let rows = 3;
    let mut out = [RelativeRect { left: 0.0, top: 0.0, right: 0.0, bottom: 0.0 }; CANVAS_REGION_COUNT];
    for r in 0..rows {
        for c in 0..cols {
            let i = r * cols + c;
            out[i] = RelativeRect {
                left: c as f32 / cols as f32,
                top: r as f32 / rows as f32,
                right: (c + 1) as f32 / cols as f32,
                bottom: (r + 1) as f32 / rows as f32,
            };
        }
    }
    out
}

fn best_matching_region(rect: RelativeRect) -> usize {
    let regions = fixed_regions();
    regions
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.iou(&rect).partial_cmp(&b.1.iou(&rect)).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Scores every frame against `query` by multiplying in one sub-score per
/// subquery: text subqueries contribute an inverse-score distance (lower
/// is better) computed against their matched region's feature bank,
/// bitmap subqueries are a no-op (logged) since this crate carries no
/// image-sketch embedder.
///
/// # Errors
///
/// Returns an error if `query` has no subqueries.
pub fn rank_canvas(query: &CanvasQuery, regions: &RegionFeatureBank, keywords: &KeywordTable, num_frames: usize) -> Result<Vec<f32>> {
    if query.is_empty() {
        return Err(crate::error::HunterError::EmptyQuery);
    }

    let mut combined = vec![1.0_f32; num_frames];
    for subquery in query.subqueries() {
        let region_idx = best_matching_region(subquery.rect());
        match subquery {
            CanvasSubquery::Text { text, .. } => {
                let Some(bank) = regions.get(region_idx) else { continue };
                let query_vec = keywords.embed_text_query(text);
                let sub_scores = inverse_score_batch(&query_vec, bank);
                for (c, s) in combined.iter_mut().zip(sub_scores) {
                    *c *= s;
                }
            }
            CanvasSubquery::Bitmap { .. } => {
                tracing::warn!(region_idx, "bitmap canvas subquery has no embedder, skipping");
            }
        }
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{KeywordId, SynsetId};
    use crate::keyword::Keyword;

    fn table() -> KeywordTable {
        let kws = vec![Keyword {
            id: KeywordId::new(0),
            synset_id: SynsetId::new(0),
            surface_forms: vec!["dog".into()],
            top_example_ids: vec![],
            description: None,
        }];
        KeywordTable::from_parts(kws, vec![vec![1.0, 0.0]], vec![0.0, 0.0], vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![0.0, 0.0])
    }

    #[test]
    fn fixed_regions_tile_the_frame() {
        let regions = fixed_regions();
        assert_eq!(regions.len(), CANVAS_REGION_COUNT);
        assert_eq!(regions[0].left, 0.0);
        assert_eq!(regions[CANVAS_REGION_COUNT - 1].right, 1.0);
        assert_eq!(regions[CANVAS_REGION_COUNT - 1].bottom, 1.0);
    }

    #[test]
    fn empty_canvas_query_is_rejected() {
        let query = CanvasQuery::new();
        let regions = vec![vec![vec![1.0, 0.0]]; CANVAS_REGION_COUNT];
        assert!(rank_canvas(&query, &regions, &table(), 1).is_err());
    }

    #[test]
    fn bitmap_subquery_is_a_noop() {
        let mut query = CanvasQuery::new();
        query.push_bitmap(RelativeRect { left: 0.0, top: 0.0, right: 1.0, bottom: 1.0 }, 3, 2, 2, vec![0; 12]);
        let regions = vec![Vec::new(); CANVAS_REGION_COUNT];
        let scores = rank_canvas(&query, &regions, &table(), 3).unwrap();
        assert_eq!(scores, vec![1.0, 1.0, 1.0]);
    }
}
