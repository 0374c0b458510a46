//! Per-frame and per-temporal-slot score storage, plus the top-n,
//! weighted-sampling and relevance-feedback operations that act on it.

use rand::Rng;
use smallvec::SmallVec;

use crate::frame::FrameCatalog;
use crate::ids::{FrameId, ShotId, VideoId};

/// Smallest score a frame is ever normalized down to; also the floor used
/// when every score in a vector is degenerate (all zero or all equal).
/// Matches the original's `MINIMAL_SCORE`.
pub const MINIMAL_SCORE: f32 = 1e-18;

/// Number of display slots a single selected frame expands into in a
/// top-n-with-context result (the frame itself plus its neighbours).
pub const DISPLAY_GRID_WIDTH: usize = 5;

/// Offset of the originally selected frame within its expanded row.
pub const TOP_N_SELECTED_FRAME_POSITION: usize = DISPLAY_GRID_WIDTH / 2;

/// Number of neighbouring frames (within the same video) considered by
/// [`ScoreModel::apply_temporals`]'s lookahead-min fusion step.
pub const TEMPORAL_LOOKAHEAD_SPAN: usize = 5;

/// Steepness of the final exponential squashing applied after temporal
/// fusion: `score = exp(-TEMPORAL_SOFTMAX_BETA * score)`.
pub const TEMPORAL_SOFTMAX_BETA: f32 = 50.0;

/// Sigma of the Gaussian-like kernel used by [`ScoreModel::apply_bayes`].
pub const BAYES_SIGMA: f32 = 0.1;

/// Maximum number of negative examples sampled per relevance-feedback
/// pass; excess negatives are subsampled uniformly at random.
pub const BAYES_MAX_NEGATIVES: usize = 64;

/// Per-frame relevance scores, plus one row of per-temporal-slot scores
/// per configured temporal depth.
///
/// Scores are always non-negative; `1.0` is the reset/neutral value. A
/// frame's mask bit controls whether it participates in `top_n`,
/// `weighted_sample` and normalization -- it never affects `adjust`.
#[derive(Debug, Clone)]
pub struct ScoreModel {
    scores: Vec<f32>,
    temporal_scores: Vec<Vec<f32>>,
    mask: Vec<bool>,
}

impl PartialEq for ScoreModel {
    fn eq(&self, other: &Self) -> bool {
        self.scores == other.scores
    }
}

impl ScoreModel {
    /// Builds a model with `len` frames, `temporal_depth` temporal rows,
    /// every score at `1.0` and every frame unmasked.
    #[must_use]
    pub fn new(len: usize, temporal_depth: usize) -> Self {
        Self {
            scores: vec![1.0; len],
            temporal_scores: vec![vec![1.0; len]; temporal_depth],
            mask: vec![true; len],
        }
    }

    /// Number of frames tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the model tracks no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Current per-frame scores.
    #[must_use]
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// Current scores for temporal slot `temporal`.
    #[must_use]
    pub fn temporal_scores(&self, temporal: usize) -> &[f32] {
        &self.temporal_scores[temporal]
    }

    /// Whether frame `i` currently participates in ranking.
    #[must_use]
    pub fn is_masked(&self, i: FrameId) -> bool {
        self.mask[i.get()]
    }

    /// Resets every score (both the top-level row and every temporal
    /// row) to `val`.
    pub fn reset(&mut self, val: f32) {
        self.scores.fill(val);
        for row in &mut self.temporal_scores {
            row.fill(val);
        }
    }

    /// Resets the mask so every frame participates.
    pub fn reset_mask(&mut self) {
        self.mask.fill(true);
    }

    /// Sets frame `i`'s mask bit.
    pub fn set_masked(&mut self, i: FrameId, masked: bool) {
        self.mask[i.get()] = masked;
    }

    /// Multiplies frame `i`'s top-level score by `factor`.
    pub fn adjust(&mut self, i: FrameId, factor: f32) {
        self.scores[i.get()] *= factor;
    }

    /// Multiplies frame `i`'s score within temporal slot `temporal` by
    /// `factor`. Does not touch the top-level score row.
    pub fn adjust_temporal(&mut self, temporal: usize, i: FrameId, factor: f32) {
        self.temporal_scores[temporal][i.get()] *= factor;
    }

    /// Rank of frame `i`: the number of frames with a strictly higher
    /// score than it.
    #[must_use]
    pub fn frame_rank(&self, i: FrameId) -> usize {
        let s = self.scores[i.get()];
        self.scores.iter().filter(|&&x| x > s).count()
    }

    /// Normalizes every masked score in every row (top-level and every
    /// temporal slot) to `[MINIMAL_SCORE, 1.0]` by dividing by the row's
    /// maximum. The maximum is taken over the whole row regardless of
    /// masking; only masked entries are rewritten.
    pub fn normalize(&mut self) {
        normalize_row(&mut self.scores, &self.mask);
        for row in &mut self.temporal_scores {
            normalize_row(row, &self.mask);
        }
    }

    /// Fuses temporal slots `0..depth` into the top-level score via a
    /// recursive lookahead-min: the last slot seeds the top-level row
    /// directly, and each earlier slot `i` is combined with the minimum
    /// top-level score among same-video frames up to
    /// [`TEMPORAL_LOOKAHEAD_SPAN`] positions ahead. The whole fused row
    /// (and each temporal row's own copy) is finally squashed through
    /// `exp(-TEMPORAL_SOFTMAX_BETA * x)`.
    #[tracing::instrument(skip(self, catalog))]
    pub fn apply_temporals(&mut self, depth: usize, catalog: &FrameCatalog) {
        if depth == 0 {
            return;
        }
        let depth = depth.min(self.temporal_scores.len());
        self.scores.copy_from_slice(&self.temporal_scores[depth - 1]);

        for i in (0..depth.saturating_sub(1)).rev() {
            let n = self.scores.len();
            let mut fused = vec![0.0_f32; n];
            for j in 0..n {
                let vid = catalog.video_id_of(FrameId::new(j));
                let mut lookahead_min = f32::INFINITY;
                for k in 1..TEMPORAL_LOOKAHEAD_SPAN {
                    let idx = j + k;
                    if idx >= n {
                        break;
                    }
                    if catalog.video_id_of(FrameId::new(idx)) != vid {
                        break;
                    }
                    lookahead_min = lookahead_min.min(self.scores[idx]);
                }
                let lookahead = if lookahead_min.is_finite() { lookahead_min } else { 1.0 };
                fused[j] = self.temporal_scores[i][j] * lookahead;
            }
            self.scores = fused;
        }

        for s in &mut self.scores {
            *s = (-TEMPORAL_SOFTMAX_BETA * *s).exp();
        }
        for row in self.temporal_scores.iter_mut().take(depth) {
            for s in row.iter_mut() {
                *s = (-TEMPORAL_SOFTMAX_BETA * *s).exp();
            }
        }
    }

    /// Applies one pass of Bayesian relevance feedback over the top-level
    /// score row. `likes` are frames the user marked relevant; every
    /// other masked frame in `screen` is treated as an implicit negative,
    /// capped at [`BAYES_MAX_NEGATIVES`] via uniform subsampling when the
    /// screen is larger than that. A no-op when `likes` is empty.
    ///
    /// `distance` must return the same feature-space distance the
    /// rankers use, typically [`crate::linalg::inverse_score`] on
    /// unit-normalized embedding rows.
    #[tracing::instrument(skip(self, screen, distance), fields(num_likes = likes.len()))]
    pub fn apply_bayes(&mut self, likes: &[FrameId], screen: &[FrameId], distance: impl Fn(FrameId, FrameId) -> f32 + Sync) {
        if likes.is_empty() {
            return;
        }

        let mut others: Vec<FrameId> = screen.iter().copied().filter(|f| !likes.contains(f)).collect();
        tracing::debug!(num_negatives = others.len(), "relevance feedback pass starting");
        if others.len() > BAYES_MAX_NEGATIVES {
            let mut rng = rand::thread_rng();
            for i in 0..BAYES_MAX_NEGATIVES - 1 {
                let j = i + 1 + rng.gen_range(0..others.len() - i - 1);
                others.swap(i, j);
            }
            others.truncate(BAYES_MAX_NEGATIVES);
        }

        let updates: Vec<(usize, f32)> = {
            use rayon::prelude::*;
            (0..self.scores.len())
                .into_par_iter()
                .filter(|&i| self.mask[i])
                .map(|i| {
                    let fi = FrameId::new(i);
                    let div_sum: f32 = others.iter().map(|&o| (-distance(fi, o) / BAYES_SIGMA).exp()).sum();
                    let mut factor = 1.0_f32;
                    for &like in likes {
                        let like_val = (-distance(fi, like) / BAYES_SIGMA).exp();
                        factor *= like_val / (like_val + div_sum);
                    }
                    (i, factor)
                })
                .collect()
        };

        for (i, factor) in updates {
            self.scores[i] *= factor;
        }
        self.normalize();
    }

    /// Returns the `n` highest-scoring masked frames, diversified so that
    /// at most `from_vid_limit` frames come from any one video and at
    /// most `from_shot_limit` from any one shot within that video (`0`
    /// means unlimited). Ties break by ascending frame id.
    #[must_use]
    pub fn top_n(&self, catalog: &FrameCatalog, n: usize, from_vid_limit: usize, from_shot_limit: usize) -> Vec<FrameId> {
        let from_vid_limit = if from_vid_limit == 0 { self.scores.len() } else { from_vid_limit };
        let from_shot_limit = if from_shot_limit == 0 { self.scores.len() } else { from_shot_limit };
        let n = if n == 0 || n > self.scores.len() { self.scores.len() } else { n };

        let mut ranked: Vec<FrameId> = (0..self.scores.len())
            .filter(|&i| self.mask[i])
            .map(FrameId::new)
            .collect();
        ranked.sort_by(|&a, &b| {
            self.scores[b.get()]
                .partial_cmp(&self.scores[a.get()])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.get().cmp(&b.get()))
        });

        let mut per_video = std::collections::HashMap::<VideoId, usize>::new();
        let mut per_shot = std::collections::HashMap::<(VideoId, ShotId), usize>::new();
        let mut out = Vec::with_capacity(n);

        for id in ranked {
            if out.len() >= n {
                break;
            }
            let Some(frame) = catalog.get(id) else { continue };
            let vid_count = per_video.entry(frame.video_id).or_insert(0);
            if *vid_count >= from_vid_limit {
                continue;
            }
            let shot_count = per_shot.entry((frame.video_id, frame.shot_id)).or_insert(0);
            if *shot_count >= from_shot_limit {
                continue;
            }
            *vid_count += 1;
            *shot_count += 1;
            out.push(id);
        }
        out
    }

    /// Like [`Self::top_n`], but expands each selected frame into a row
    /// of [`DISPLAY_GRID_WIDTH`] context frames centered on it. Frames
    /// outside the selected frame's video are replaced with `None`.
    #[must_use]
    pub fn top_n_with_context(
        &self,
        catalog: &FrameCatalog,
        n: usize,
        from_vid_limit: usize,
        from_shot_limit: usize,
    ) -> Vec<Option<FrameId>> {
        let selected = self.top_n(catalog, n, from_vid_limit, from_shot_limit);
        let mut out = Vec::with_capacity(selected.len() * DISPLAY_GRID_WIDTH);
        for id in selected {
            out.extend(context_row(catalog, id));
        }
        out
    }

    /// Draws `k` distinct frame ids without replacement from every masked
    /// frame, with probability proportional to `score.powf(pow)`. Uses a
    /// segment tree so each draw (and the subsequent weight zeroing) is
    /// `O(log n)`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is not smaller than the number of masked frames.
    #[must_use]
    pub fn weighted_sample(&self, k: usize, pow: f32) -> Vec<FrameId> {
        let masked: Vec<usize> = (0..self.scores.len()).filter(|&i| self.mask[i]).collect();
        let n = masked.len();
        assert!(n >= 2, "weighted_sample requires at least two masked frames");
        assert!(k < n, "weighted_sample cannot draw as many or more than available");

        let branches = n - 1;
        let mut tree = vec![0.0_f64; branches + n];
        for (leaf, &idx) in masked.iter().enumerate() {
            tree[branches + leaf] = f64::from(self.scores[idx].max(0.0).powf(pow));
        }
        for i in (0..branches).rev() {
            tree[i] = tree[2 * i + 1] + tree[2 * i + 2];
        }

        let mut rng = rand::thread_rng();
        let mut out = Vec::with_capacity(k);
        for _ in 0..k {
            if tree[0] <= 0.0 {
                break;
            }
            let mut x = rng.gen_range(0.0..1.0) * tree[0];
            let mut i = 0_usize;
            while i < branches {
                let left = 2 * i + 1;
                let left_sum = tree[left];
                if x >= left_sum && left + 1 < tree.len() {
                    x -= left_sum;
                    i = left + 1;
                } else {
                    i = left;
                }
            }
            let leaf = i - branches;
            out.push(FrameId::new(masked[leaf]));
            tree[i] = 0.0;
            while i > 0 {
                i = (i - 1) / 2;
                tree[i] = tree[2 * i + 1] + tree[2 * i + 2];
            }
        }
        out
    }

    /// Draws one frame from `subset` with probability proportional to its
    /// current top-level score. Used by the SOM display to pick a
    /// representative frame for a populated grid cell.
    #[must_use]
    pub fn weighted_example(&self, subset: &[FrameId]) -> Option<FrameId> {
        if subset.is_empty() {
            return None;
        }
        let weights: Vec<f32> = subset.iter().map(|id| self.scores[id.get()].max(0.0)).collect();
        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            return subset.first().copied();
        }
        let mut x = rand::thread_rng().gen_range(0.0..total);
        for (id, w) in subset.iter().zip(&weights) {
            if x < *w {
                return Some(*id);
            }
            x -= w;
        }
        subset.last().copied()
    }
}

/// Builds `id`'s [`DISPLAY_GRID_WIDTH`]-wide context row, centered on `id`
/// at [`TOP_N_SELECTED_FRAME_POSITION`]. Frames outside `id`'s own video
/// (or off the catalog's ends) come back as `None`. Stack-allocated since
/// every row is the same small, fixed width.
fn context_row(catalog: &FrameCatalog, id: FrameId) -> SmallVec<[Option<FrameId>; DISPLAY_GRID_WIDTH]> {
    let Some(video_id) = catalog.video_id_of(id) else {
        return std::iter::repeat(None).take(DISPLAY_GRID_WIDTH).collect();
    };
    (0..DISPLAY_GRID_WIDTH)
        .map(|offset| {
            let delta = offset as isize - TOP_N_SELECTED_FRAME_POSITION as isize;
            let idx = id.get() as isize + delta;
            if idx < 0 || idx as usize >= catalog.len() {
                return None;
            }
            let candidate = FrameId::new(idx as usize);
            (catalog.video_id_of(candidate) == Some(video_id)).then_some(candidate)
        })
        .collect()
}

fn normalize_row(row: &mut [f32], mask: &[bool]) {
    let mut max = f32::MIN;
    for &s in row.iter() {
        if s > max {
            max = s;
        }
    }
    if max < MINIMAL_SCORE {
        tracing::error!(max, "score row degenerate, flooring to MINIMAL_SCORE");
        max = MINIMAL_SCORE;
    }
    for (s, &m) in row.iter_mut().zip(mask) {
        if m {
            *s = (*s / max).max(MINIMAL_SCORE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::VideoFrame;

    fn catalog(videos: &[u32]) -> FrameCatalog {
        let frames = videos
            .iter()
            .enumerate()
            .map(|(i, &v)| VideoFrame {
                id: FrameId::new(i),
                video_id: VideoId::new(v),
                shot_id: ShotId::new(0),
                frame_num: crate::ids::FrameNum::new(i as u32),
                filename: format!("f{i}.jpg").into(),
                metadata: None,
            })
            .collect();
        FrameCatalog::from_frames(frames)
    }

    #[test]
    fn reset_sets_every_row_uniformly() {
        let mut m = ScoreModel::new(3, 2);
        m.reset(0.5);
        assert_eq!(m.scores(), &[0.5, 0.5, 0.5]);
        assert_eq!(m.temporal_scores(0), &[0.5, 0.5, 0.5]);
    }

    #[test]
    fn adjust_only_touches_top_level_row() {
        let mut m = ScoreModel::new(2, 1);
        m.adjust(FrameId::new(0), 0.5);
        assert_eq!(m.scores()[0], 0.5);
        assert_eq!(m.temporal_scores(0)[0], 1.0);
    }

    #[test]
    fn adjust_temporal_leaves_top_level_row_untouched() {
        let mut m = ScoreModel::new(2, 1);
        m.adjust_temporal(0, FrameId::new(0), 0.5);
        assert_eq!(m.temporal_scores(0)[0], 0.5);
        assert_eq!(m.scores()[0], 1.0);
    }

    #[test]
    fn top_n_breaks_ties_by_ascending_id() {
        let cat = catalog(&[0, 1, 2]);
        let m = ScoreModel::new(3, 0);
        let top = m.top_n(&cat, 3, 0, 0);
        assert_eq!(top, vec![FrameId::new(0), FrameId::new(1), FrameId::new(2)]);
    }

    #[test]
    fn top_n_respects_per_video_limit() {
        let cat = catalog(&[0, 0, 0, 1]);
        let mut m = ScoreModel::new(4, 0);
        m.adjust(FrameId::new(3), 2.0);
        let top = m.top_n(&cat, 4, 1, 0);
        assert_eq!(top.len(), 2);
        assert!(top.contains(&FrameId::new(3)));
    }

    #[test]
    fn normalize_floors_degenerate_rows() {
        let mut m = ScoreModel::new(2, 0);
        m.reset(0.0);
        m.normalize();
        assert!(m.scores().iter().all(|&s| s >= MINIMAL_SCORE));
    }

    #[test]
    fn apply_bayes_boosts_frames_near_a_like() {
        let mut m = ScoreModel::new(3, 0);
        let distance = |a: FrameId, b: FrameId| (a.get() as f32 - b.get() as f32).abs() / 10.0;
        let screen = vec![FrameId::new(0), FrameId::new(1), FrameId::new(2)];
        m.apply_bayes(&[FrameId::new(0)], &screen, distance);
        assert!(m.scores()[0] >= m.scores()[2]);
    }

    #[test]
    fn apply_bayes_is_noop_without_likes() {
        let mut m = ScoreModel::new(2, 0);
        let before = m.scores().to_vec();
        m.apply_bayes(&[], &[FrameId::new(0), FrameId::new(1)], |_, _| 0.5);
        assert_eq!(m.scores(), before.as_slice());
    }

    #[test]
    fn weighted_sample_draws_distinct_ids() {
        let mut m = ScoreModel::new(5, 0);
        m.adjust(FrameId::new(0), 10.0);
        let drawn = m.weighted_sample(3, 1.0);
        assert_eq!(drawn.len(), 3);
        let mut ids: Vec<usize> = drawn.iter().copied().map(FrameId::get).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn frame_rank_counts_strictly_higher_scores() {
        let mut m = ScoreModel::new(3, 0);
        m.adjust(FrameId::new(0), 5.0);
        m.adjust(FrameId::new(1), 2.0);
        assert_eq!(m.frame_rank(FrameId::new(2)), 2);
        assert_eq!(m.frame_rank(FrameId::new(0)), 0);
    }

    #[test]
    fn context_row_centers_selected_frame_and_stops_at_video_boundary() {
        let cat = catalog(&[0, 0, 0, 1]);
        let row = context_row(&cat, FrameId::new(1));
        assert_eq!(row[TOP_N_SELECTED_FRAME_POSITION], Some(FrameId::new(1)));
        assert_eq!(row[DISPLAY_GRID_WIDTH - 1], None);
    }

    #[test]
    fn apply_temporals_is_noop_for_zero_depth() {
        let cat = catalog(&[0, 0]);
        let mut m = ScoreModel::new(2, 1);
        let before = m.scores().to_vec();
        m.apply_temporals(0, &cat);
        assert_eq!(m.scores(), before.as_slice());
    }
}
