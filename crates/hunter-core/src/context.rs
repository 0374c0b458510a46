//! Search context and per-user history: the state machine a rescore/
//! display cycle runs against, and the undo stack that lets a session
//! switch back to an earlier context.

use crate::filters::{Filters, Query};
use crate::ids::{ContextId, FrameId};
use crate::score::ScoreModel;

/// Which query variants contributed to the context's current scores,
/// cleared at the start of every rescore and reported alongside the
/// logged event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsedTools {
    /// A free-text query contributed.
    pub text: bool,
    /// A canvas sketch contributed.
    pub canvas_bitmap: bool,
    /// A canvas text region contributed.
    pub canvas_text: bool,
    /// A relocation/k-NN seed contributed.
    pub relocation: bool,
    /// Relevance feedback (likes) contributed.
    pub feedback: bool,
    /// Metadata filters were non-default.
    pub filters: bool,
}

/// Which display mode a context is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayType {
    /// Plain ranked top-n.
    #[default]
    TopN,
    /// Ranked top-n with neighbouring-frame context.
    TopNContext,
    /// Self-organizing map grid.
    Som,
    /// Single video's frames.
    VideoDetail,
    /// k-NN neighbours of a selected frame.
    TopKnn,
}

/// One active (or archived) search: its scores, the tools that produced
/// them, what's liked/shown/filtered, and the query that last ran.
pub struct SearchContext {
    /// Position of this context in the session's history.
    pub id: ContextId,
    /// Tools that contributed to the current scores.
    pub used_tools: UsedTools,
    /// Frames currently on display.
    pub current_display: Vec<FrameId>,
    /// Which display mode produced `current_display`.
    pub display_type: DisplayType,
    /// The score state this context owns.
    pub scores: ScoreModel,
    /// Number of temporal slots this context's queries may use.
    pub temporal_size: usize,
    /// The temporal queries that produced the current scores, used to
    /// skip re-ranking when a rescore repeats the same query content.
    pub last_temporal_queries: Vec<crate::filters::TemporalQuery>,
    /// Frames liked so far in this context.
    pub likes: Vec<FrameId>,
    /// Frames shown so far in this context (for "already seen" bookkeeping).
    pub shown_frames: Vec<FrameId>,
    /// Free-text label attached by the user, if any.
    pub label: String,
    /// Active metadata filters.
    pub filters: Filters,
    /// The query that produced the current scores.
    pub query: Query,
}

impl SearchContext {
    /// Builds a fresh context over `num_frames` frames with `temporal_size`
    /// temporal slots, scores reset to `1.0`.
    #[must_use]
    pub fn new(id: ContextId, num_frames: usize, temporal_size: usize) -> Self {
        Self {
            id,
            used_tools: UsedTools::default(),
            current_display: Vec::new(),
            display_type: DisplayType::default(),
            scores: ScoreModel::new(num_frames, temporal_size),
            temporal_size,
            last_temporal_queries: Vec::new(),
            likes: Vec::new(),
            shown_frames: Vec::new(),
            label: String::new(),
            filters: Filters::default(),
            query: Query::default(),
        }
    }

    /// Resets the mask and filters, keeping scores and history intact.
    pub fn reset(&mut self) {
        self.scores.reset_mask();
        self.reset_filters();
    }

    /// Resets filters to their default, match-everything value.
    pub fn reset_filters(&mut self) {
        self.filters = Filters::default();
    }

    /// Whether `query`'s temporal slots are byte-identical to the ones
    /// that produced the current scores -- when true, a rescore can skip
    /// straight to display without re-running any ranker.
    #[must_use]
    pub fn query_unchanged(&self, query: &Query) -> bool {
        self.last_temporal_queries == query.temporal
    }

    /// Marks `frame_id` as liked, if not already.
    ///
    /// Returns whether the frame was newly liked (matches the original's
    /// "already liked" no-op semantics, surfaced to the caller as a bool
    /// per-frame result).
    pub fn like_frame(&mut self, frame_id: FrameId) -> bool {
        if self.likes.contains(&frame_id) {
            false
        } else {
            self.likes.push(frame_id);
            true
        }
    }

    /// Unlikes `frame_id`, returning whether it had been liked.
    pub fn unlike_frame(&mut self, frame_id: FrameId) -> bool {
        let before = self.likes.len();
        self.likes.retain(|&f| f != frame_id);
        self.likes.len() != before
    }
}

/// A session's context stack: every context ever pushed, plus a pointer
/// to the one currently active, enabling undo via [`History::switch_to`].
///
/// `contexts[k].id == ContextId::new(k)` holds for every entry at every
/// point in time -- switching moves `active`, it never reorders or
/// mutates `contexts`.
#[derive(Default)]
pub struct History {
    contexts: Vec<SearchContext>,
    active: usize,
}

impl History {
    /// An empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `context` as the new active (last) context.
    pub fn push(&mut self, context: SearchContext) {
        self.contexts.push(context);
        self.active = self.contexts.len() - 1;
    }

    /// The currently active context, if any.
    #[must_use]
    pub fn current(&self) -> Option<&SearchContext> {
        self.contexts.get(self.active)
    }

    /// Mutable access to the currently active context.
    pub fn current_mut(&mut self) -> Option<&mut SearchContext> {
        self.contexts.get_mut(self.active)
    }

    /// Number of contexts in the history, including the active one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Switches the active context to the one at history index `index`,
    /// leaving every entry (including its `id`) untouched -- switching
    /// moves a pointer, it never reorders or clones. Returns `None` if
    /// `index` is out of range.
    pub fn switch_to(&mut self, index: ContextId) -> Option<&SearchContext> {
        if index.get() >= self.contexts.len() {
            return None;
        }
        self.active = index.get();
        self.contexts.get(self.active)
    }

    /// All contexts, oldest first.
    #[must_use]
    pub fn contexts(&self) -> &[SearchContext] {
        &self.contexts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_frame_is_idempotent() {
        let mut ctx = SearchContext::new(ContextId::new(0), 4, 0);
        assert!(ctx.like_frame(FrameId::new(1)));
        assert!(!ctx.like_frame(FrameId::new(1)));
        assert_eq!(ctx.likes.len(), 1);
    }

    #[test]
    fn unlike_frame_reports_whether_it_was_liked() {
        let mut ctx = SearchContext::new(ContextId::new(0), 4, 0);
        assert!(!ctx.unlike_frame(FrameId::new(2)));
        ctx.like_frame(FrameId::new(2));
        assert!(ctx.unlike_frame(FrameId::new(2)));
    }

    #[test]
    fn history_switch_to_moves_active_without_reordering() {
        let mut hist = History::new();
        hist.push(SearchContext::new(ContextId::new(0), 2, 0));
        hist.push(SearchContext::new(ContextId::new(1), 2, 0));
        hist.push(SearchContext::new(ContextId::new(2), 2, 0));
        let switched = hist.switch_to(ContextId::new(0)).unwrap();
        assert_eq!(switched.id, ContextId::new(0));
        assert_eq!(hist.len(), 3);
        assert_eq!(hist.contexts()[1].id, ContextId::new(1));
        assert_eq!(hist.contexts()[2].id, ContextId::new(2));
        assert_eq!(hist.current().unwrap().id, ContextId::new(0));
    }

    #[test]
    fn query_unchanged_detects_identical_temporal_content() {
        let ctx = SearchContext::new(ContextId::new(0), 2, 1);
        let query = Query::default();
        assert!(ctx.query_unchanged(&query));
    }
}
