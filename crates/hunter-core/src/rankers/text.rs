//! Text ranker: turns a free-text query into a per-frame sub-score vector
//! via the keyword table's embedding pipeline, plus keyword autocomplete.

use crate::error::{HunterError, Result};
use crate::ids::KeywordId;
use crate::keyword::{Keyword, KeywordTable};
use crate::linalg::inverse_score_batch;
use crate::rankers::{FeatureBank, Ranker};

/// Ranks every frame by inverse-score distance between its primary
/// embedding and the query text's embedding (lower is better, feeding
/// [`crate::score::ScoreModel::adjust_temporal`] directly).
pub struct TextRanker<'a> {
    query: &'a str,
    keywords: &'a KeywordTable,
}

impl<'a> TextRanker<'a> {
    /// Builds a ranker for `query` against `keywords`' embedding
    /// pipeline.
    #[must_use]
    pub fn new(query: &'a str, keywords: &'a KeywordTable) -> Self {
        Self { query, keywords }
    }
}

impl Ranker for TextRanker<'_> {
    fn score(&self, features: &FeatureBank) -> Result<Vec<f32>> {
        if self.query.trim().is_empty() {
            return Err(HunterError::EmptyQuery);
        }
        let query_vec = self.keywords.embed_text_query(self.query);
        Ok(inverse_score_batch(&query_vec, features))
    }
}

/// Convenience wrapper around [`TextRanker`] for call sites that don't
/// need to hold the ranker value.
///
/// # Errors
///
/// Returns an error if `query` is empty.
pub fn rank_text(query: &str, keywords: &KeywordTable, features: &FeatureBank) -> Result<Vec<f32>> {
    TextRanker::new(query, keywords).score(features)
}

/// Returns up to `count` keyword suggestions for `prefix`, delegating to
/// [`KeywordTable::find`].
#[must_use]
pub fn autocomplete<'a>(prefix: &str, keywords: &'a KeywordTable, count: usize) -> Vec<&'a Keyword> {
    keywords.find(prefix, count)
}

/// Resolves a raw keyword id to its entry, if present. Kept next to the
/// ranker because it shares the same table lookup the text ranker itself
/// depends on.
#[must_use]
pub fn keyword_by_id(id: KeywordId, keywords: &KeywordTable) -> Option<&Keyword> {
    keywords.keywords().get(id.get() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SynsetId;

    fn table() -> KeywordTable {
        let kws = vec![Keyword {
            id: KeywordId::new(0),
            synset_id: SynsetId::new(0),
            surface_forms: vec!["dog".into()],
            top_example_ids: vec![],
            description: None,
        }];
        KeywordTable::from_parts(
            kws,
            vec![vec![1.0, 0.0]],
            vec![0.0, 0.0],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![0.0, 0.0],
        )
    }

    #[test]
    fn empty_query_is_rejected() {
        let table = table();
        let err = rank_text("   ", &table, &vec![vec![1.0, 0.0]]);
        assert!(matches!(err, Err(HunterError::EmptyQuery)));
    }

    #[test]
    fn matching_frame_scores_lower_than_orthogonal_frame() {
        let table = table();
        let features = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let scores = rank_text("dog", &table, &features).unwrap();
        assert!(scores[0] <= scores[1]);
    }
}
