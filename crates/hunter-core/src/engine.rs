//! Top-level session API: the `Engine` type every external transport
//! (HTTP, CLI, ...) is expected to sit in front of.

use parking_lot::Mutex;

use crate::config::Config;
use crate::context::{DisplayType, History, SearchContext, UsedTools};
use crate::error::{HunterError, Result};
use crate::eval::{EvalServerClient, NullEvalServerClient, SubmitResult};
use crate::frame::{FrameCatalog, VideoFrame};
use crate::ids::{ContextId, FrameId, KeywordId, VideoId};
use crate::keyword::{Keyword, KeywordTable};
use crate::logging::{Event, EventLog};
use crate::rankers::{self, FeatureBank, RegionFeatureBank};
use crate::som::{AsyncSomWorker, SomSnapshot};

/// Bookmarked frames for a session, tracked independently of any one
/// context's likes.
#[derive(Default)]
struct Bookmarks(Vec<FrameId>);

/// Per-user state: the catalog/ranker resources are shared read-only
/// across all sessions; this struct holds what's private to one user.
pub struct UserContext {
    history: History,
    bookmarks: Bookmarks,
    eval_client: Box<dyn EvalServerClient + Send>,
}

impl UserContext {
    fn new(num_frames: usize, temporal_size: usize) -> Self {
        let mut history = History::new();
        history.push(SearchContext::new(ContextId::new(0), num_frames, temporal_size));
        Self {
            history,
            bookmarks: Bookmarks::default(),
            eval_client: Box::new(NullEvalServerClient),
        }
    }
}

/// Result of a `get_display` call: the frames on screen plus which
/// display mode produced them.
#[derive(Debug, Clone)]
pub struct DisplayResult {
    /// Frames on display, in display order. `None` marks an empty grid
    /// slot (used by `top_n_with_context` and SOM displays).
    pub frames: Vec<Option<FrameId>>,
    /// Display mode that produced `frames`.
    pub display_type: DisplayType,
}

/// Result of a `rescore` call.
#[derive(Debug, Clone)]
pub struct RescoreResult {
    /// Tools that contributed to the new scores.
    pub used_tools: UsedTools,
}

/// The session-facing API. Implemented by [`Engine`]; kept as a trait so
/// an external transport layer can depend on it without depending on the
/// engine's internals.
pub trait SessionApi {
    /// Retrieves a display for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::OutOfRange`] for an unknown user, or
    /// [`HunterError::SomNotReady`] if `display_type` is
    /// [`DisplayType::Som`] and training hasn't completed yet.
    fn get_display(&self, user: ContextId, display_type: DisplayType, page: usize) -> Result<DisplayResult>;

    /// Marks `frame_ids` as liked for `user`'s active context. Returns
    /// one bool per input frame: whether it was newly liked.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::OutOfRange`] for an unknown user.
    fn like_frames(&self, user: ContextId, frame_ids: &[FrameId]) -> Result<Vec<bool>>;

    /// Reruns every configured ranker against `query` and re-derives
    /// scores for `user`'s active context.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::EmptyQuery`] if every temporal slot is
    /// empty, or [`HunterError::OutOfRange`] for an unknown user.
    fn rescore(&self, user: ContextId, query: crate::filters::Query) -> Result<RescoreResult>;
}

/// Index of the worker that trains the global, whole-catalog display map.
const GLOBAL_SOM_WORKER: usize = 0;

/// Index of the worker dedicated to temporal slot `temporal`. Slot workers
/// sit after the global worker, so the engine spawns `1 + max_temporal_size`
/// workers in total -- one per temporal slot plus one for the global map.
fn slot_som_worker(temporal: usize) -> usize {
    temporal + 1
}

/// Shared, read-only search resources plus one dedicated SOM worker per
/// temporal slot (plus one for the global display map).
pub struct Engine {
    catalog: FrameCatalog,
    keywords: KeywordTable,
    features: FeatureBank,
    regions: RegionFeatureBank,
    config: Config,
    som: Vec<AsyncSomWorker>,
    event_log: EventLog,
    users: Mutex<Vec<UserContext>>,
}

impl Engine {
    /// Assembles an engine from already-loaded resources. Loading itself
    /// (catalog, keyword table, feature banks) is left to dedicated
    /// loaders so tests can build an `Engine` directly from synthetic
    /// in-memory data.
    #[must_use]
    pub fn new(catalog: FrameCatalog, keywords: KeywordTable, features: FeatureBank, regions: RegionFeatureBank, config: Config) -> Self {
        let event_log = EventLog::new(config.log_dir.clone());
        let som = (0..=config.max_temporal_size).map(|_| AsyncSomWorker::spawn()).collect();
        Self {
            catalog,
            keywords,
            features,
            regions,
            config,
            som,
            event_log,
            users: Mutex::new(Vec::new()),
        }
    }

    /// Creates a new user session and returns its id.
    pub fn create_user(&self) -> ContextId {
        let mut users = self.users.lock();
        let id = ContextId::new(users.len());
        users.push(UserContext::new(self.catalog.len(), self.config.max_temporal_size));
        id
    }

    /// Looks up a frame by id.
    #[must_use]
    pub fn get_frame(&self, id: FrameId) -> Option<&VideoFrame> {
        self.catalog.get(id)
    }

    /// Every frame of `video_id` with a frame number in `[from, to)`.
    #[must_use]
    pub fn get_frames(&self, video_id: VideoId, from: crate::ids::FrameNum, to: crate::ids::FrameNum) -> Vec<&VideoFrame> {
        self.catalog.frames_in_range(video_id, from, to)
    }

    /// Up to `count` keyword suggestions for `prefix`.
    #[must_use]
    pub fn autocomplete_keywords(&self, prefix: &str, count: usize) -> Vec<&Keyword> {
        rankers::autocomplete(prefix, &self.keywords, count)
    }

    /// Whether a self-organizing map is ready for temporal slot `temporal`.
    #[must_use]
    pub fn som_ready(&self, temporal: usize) -> bool {
        self.som.get(slot_som_worker(temporal)).is_some_and(AsyncSomWorker::is_ready)
    }

    /// Bookmarks `frame_ids` for `user`. Returns one bool per input
    /// frame: whether it was newly bookmarked.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::OutOfRange`] for an unknown user.
    pub fn bookmark_frames(&self, user: ContextId, frame_ids: &[FrameId]) -> Result<Vec<bool>> {
        let mut users = self.users.lock();
        let user_ctx = users
            .get_mut(user.get())
            .ok_or_else(|| HunterError::OutOfRange(format!("no such user {user}")))?;
        let results = frame_ids
            .iter()
            .map(|&id| {
                if user_ctx.bookmarks.0.contains(&id) {
                    false
                } else {
                    user_ctx.bookmarks.0.push(id);
                    true
                }
            })
            .collect();
        for &id in frame_ids {
            self.event_log.record(user, &Event::Bookmark { frame_id: id.get() });
        }
        Ok(results)
    }

    /// Logs a replay/scroll/text/canvas interaction event for `user`'s
    /// analytics trail without changing any score.
    pub fn log_video_replay(&self, user: ContextId, frame_id: FrameId) {
        self.event_log.record(
            user,
            &Event::Display {
                context_id: user.get(),
                display_type: format!("replay:{}", frame_id.get()),
            },
        );
    }

    /// Attempts to log in to the evaluation server for `user`.
    ///
    /// # Errors
    ///
    /// Propagates the client's login error; returns
    /// [`HunterError::OutOfRange`] for an unknown user.
    pub fn login_to_eval_server(&self, user: ContextId, token: &str) -> Result<()> {
        let mut users = self.users.lock();
        let user_ctx = users
            .get_mut(user.get())
            .ok_or_else(|| HunterError::OutOfRange(format!("no such user {user}")))?;
        user_ctx.eval_client.login(token)
    }

    /// Logs out of the evaluation server for `user`, returning whether a
    /// session had actually been active.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::OutOfRange`] for an unknown user.
    pub fn logout_from_eval_server(&self, user: ContextId) -> Result<bool> {
        let mut users = self.users.lock();
        let user_ctx = users
            .get_mut(user.get())
            .ok_or_else(|| HunterError::OutOfRange(format!("no such user {user}")))?;
        let was_logged_in = user_ctx.eval_client.is_logged_in();
        user_ctx.eval_client.logout();
        Ok(was_logged_in)
    }

    /// Submits `frame_id` as the known-item answer for `user`.
    ///
    /// # Errors
    ///
    /// Propagates the client's submission error; returns
    /// [`HunterError::OutOfRange`] for an unknown user.
    pub fn submit_to_eval_server(&self, user: ContextId, frame_id: FrameId) -> Result<SubmitResult> {
        let mut users = self.users.lock();
        let user_ctx = users
            .get_mut(user.get())
            .ok_or_else(|| HunterError::OutOfRange(format!("no such user {user}")))?;
        let result = user_ctx.eval_client.submit(frame_id)?;
        drop(users);
        self.event_log.record(
            user,
            &Event::Submit {
                frame_id: frame_id.get(),
                result: format!("{result:?}"),
            },
        );
        Ok(result)
    }

    /// Starts a fresh context for `user`, pushed on top of the existing
    /// history.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::OutOfRange`] for an unknown user.
    pub fn reset_search_session(&self, user: ContextId) -> Result<()> {
        let mut users = self.users.lock();
        let user_ctx = users
            .get_mut(user.get())
            .ok_or_else(|| HunterError::OutOfRange(format!("no such user {user}")))?;
        let next_id = ContextId::new(user_ctx.history.len());
        user_ctx
            .history
            .push(SearchContext::new(next_id, self.catalog.len(), self.config.max_temporal_size));
        Ok(())
    }

    /// Switches `user`'s active context to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::OutOfRange`] for an unknown user or an
    /// out-of-range context.
    pub fn switch_search_context(&self, user: ContextId, target: ContextId) -> Result<()> {
        let mut users = self.users.lock();
        let user_ctx = users
            .get_mut(user.get())
            .ok_or_else(|| HunterError::OutOfRange(format!("no such user {user}")))?;
        user_ctx
            .history
            .switch_to(target)
            .map(|_| ())
            .ok_or_else(|| HunterError::OutOfRange(format!("no such context {target}")))
    }

    /// Every frame from `selected`'s shot, for the video-detail display.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::OutOfRange`] if `selected` isn't in the
    /// catalog.
    pub fn get_video_detail_display(&self, selected: FrameId) -> Result<DisplayResult> {
        let frame = self
            .catalog
            .get(selected)
            .ok_or_else(|| HunterError::OutOfRange(format!("frame {selected} has no catalog entry")))?;
        let frames = self
            .catalog
            .frames()
            .iter()
            .filter(|f| f.video_id == frame.video_id && f.shot_id == frame.shot_id)
            .map(|f| Some(f.id))
            .collect();
        Ok(DisplayResult { frames, display_type: DisplayType::VideoDetail })
    }

    /// The `count` frames whose primary embedding is closest to
    /// `selected`'s, for the top-k-NN display.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::OutOfRange`] if `selected` has no feature
    /// row.
    pub fn get_topknn_display(&self, selected: FrameId, count: usize) -> Result<DisplayResult> {
        let neighbors = rankers::k_nearest(selected, &self.features, count)?;
        Ok(DisplayResult { frames: neighbors.into_iter().map(Some).collect(), display_type: DisplayType::TopKnn })
    }

    fn submit_som_training(&self, ctx: &SearchContext, worker_index: usize) {
        let Some(worker) = self.som.get(worker_index) else { return };
        let snapshot = SomSnapshot {
            points: self.features.clone(),
            weights: ctx.scores.scores().to_vec(),
            mask: (0..self.catalog.len()).map(FrameId::new).map(|id| ctx.scores.is_masked(id)).collect(),
            config: self.config.som.clone(),
        };
        worker.start_work(snapshot);
    }
}

impl SessionApi for Engine {
    fn get_display(&self, user: ContextId, display_type: DisplayType, page: usize) -> Result<DisplayResult> {
        let mut users = self.users.lock();
        let user_ctx = users
            .get_mut(user.get())
            .ok_or_else(|| HunterError::OutOfRange(format!("no such user {user}")))?;
        let ctx = user_ctx
            .history
            .current_mut()
            .ok_or_else(|| HunterError::OutOfRange("user has no active context".into()))?;

        let per_page = 5 * self.config.default_frames_per_video_limit.max(1);
        let frames = match display_type {
            DisplayType::TopN => ctx
                .scores
                .top_n(&self.catalog, (page + 1) * per_page, self.config.default_frames_per_video_limit, self.config.default_frames_per_shot_limit)
                .into_iter()
                .skip(page * per_page)
                .map(Some)
                .collect(),
            DisplayType::TopNContext => ctx.scores.top_n_with_context(
                &self.catalog,
                (page + 1) * per_page,
                self.config.default_frames_per_video_limit,
                self.config.default_frames_per_shot_limit,
            ),
            DisplayType::Som => {
                let grid = self.som[GLOBAL_SOM_WORKER].ready().ok_or(HunterError::SomNotReady(0))?;
                grid.get_display(&ctx.scores, 3)
            }
            DisplayType::VideoDetail | DisplayType::TopKnn => {
                return Err(HunterError::InvalidArgument(
                    "video-detail and top-knn displays require a selected frame, use the dedicated accessor".into(),
                ))
            }
        };

        ctx.display_type = display_type;
        ctx.current_display = frames.iter().filter_map(|f| *f).collect();
        Ok(DisplayResult { frames, display_type })
    }

    fn like_frames(&self, user: ContextId, frame_ids: &[FrameId]) -> Result<Vec<bool>> {
        let mut users = self.users.lock();
        let user_ctx = users
            .get_mut(user.get())
            .ok_or_else(|| HunterError::OutOfRange(format!("no such user {user}")))?;
        let ctx = user_ctx
            .history
            .current_mut()
            .ok_or_else(|| HunterError::OutOfRange("user has no active context".into()))?;
        let results: Vec<bool> = frame_ids.iter().map(|&id| ctx.like_frame(id)).collect();
        for &id in frame_ids {
            self.event_log.record(user, &Event::Like { frame_id: id.get(), liked: true });
        }
        Ok(results)
    }

    fn rescore(&self, user: ContextId, query: crate::filters::Query) -> Result<RescoreResult> {
        if query.temporal.iter().all(crate::filters::TemporalQuery::is_empty) && query.likes.is_empty() {
            return Err(HunterError::EmptyQuery);
        }
        if query.temporal.len() > self.config.max_temporal_size {
            return Err(HunterError::InvalidArgument(format!(
                "query uses {} temporal slots, configured maximum is {}",
                query.temporal.len(),
                self.config.max_temporal_size
            )));
        }

        let mut users = self.users.lock();
        let user_ctx = users
            .get_mut(user.get())
            .ok_or_else(|| HunterError::OutOfRange(format!("no such user {user}")))?;
        let ctx = user_ctx
            .history
            .current_mut()
            .ok_or_else(|| HunterError::OutOfRange("user has no active context".into()))?;

        if ctx.query_unchanged(&query) {
            return Ok(RescoreResult { used_tools: ctx.used_tools });
        }

        ctx.scores.reset(1.0);
        let mut used_tools = UsedTools::default();

        for (temporal, slot) in query.temporal.iter().enumerate() {
            if let Some(text) = &slot.text {
                if !text.trim().is_empty() {
                    let sub_scores = rankers::rank_text(text, &self.keywords, &self.features)?;
                    for (i, s) in sub_scores.into_iter().enumerate() {
                        ctx.scores.adjust_temporal(temporal, FrameId::new(i), s);
                    }
                    used_tools.text = true;
                }
            }
            if let Some(canvas) = &slot.canvas {
                if !canvas.is_empty() {
                    let sub_scores = rankers::rank_canvas(canvas, &self.regions, &self.keywords, self.catalog.len())?;
                    for (i, s) in sub_scores.into_iter().enumerate() {
                        ctx.scores.adjust_temporal(temporal, FrameId::new(i), s);
                    }
                    for sub in canvas.subqueries() {
                        match sub {
                            crate::filters::CanvasSubquery::Text { .. } => used_tools.canvas_text = true,
                            crate::filters::CanvasSubquery::Bitmap { .. } => used_tools.canvas_bitmap = true,
                        }
                    }
                }
            }
            if let Some(seed) = slot.relocation {
                let sub_scores = rankers::rank_relocation(seed, &self.features)?;
                for (i, s) in sub_scores.into_iter().enumerate() {
                    ctx.scores.adjust_temporal(temporal, FrameId::new(i), s);
                }
                used_tools.relocation = true;
            }
        }

        ctx.scores.apply_temporals(query.temporal.len(), &self.catalog);

        if !query.likes.is_empty() {
            let screen: Vec<FrameId> = (0..self.catalog.len()).map(FrameId::new).collect();
            let features = &self.features;
            ctx.scores.apply_bayes(&query.likes, &screen, |a, b| crate::linalg::inverse_score(&features[a.get()], &features[b.get()]));
            used_tools.feedback = true;
        }

        if !query.filters.is_default() {
            for frame in self.catalog.frames() {
                if !query.filters.matches(frame) {
                    ctx.scores.set_masked(frame.id, false);
                }
            }
            used_tools.filters = true;
        }

        ctx.scores.normalize();
        ctx.used_tools = used_tools;
        ctx.last_temporal_queries = query.temporal.clone();
        ctx.filters = query.filters;

        self.submit_som_training(ctx, GLOBAL_SOM_WORKER);
        for (temporal, slot) in query.temporal.iter().enumerate() {
            if !slot.is_empty() {
                self.submit_som_training(ctx, slot_som_worker(temporal));
            }
        }
        ctx.query = query;
        self.event_log.record(user, &Event::Rescore { context_id: user.get() });

        Ok(RescoreResult { used_tools })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CanvasRankerConfig, FilenameOffsets, KeywordRankerConfig, SomConfig};
    use crate::filters::{Query, TemporalQuery};
    use crate::frame::VideoFrame;
    use crate::ids::{FrameNum, ShotId, SynsetId};

    fn engine() -> Engine {
        let frames = (0..6)
            .map(|i| VideoFrame {
                id: FrameId::new(i),
                video_id: VideoId::new((i / 3) as u32),
                shot_id: ShotId::new(0),
                frame_num: FrameNum::new(i as u32),
                filename: format!("f{i}.jpg").into(),
                metadata: None,
            })
            .collect();
        let catalog = FrameCatalog::from_frames(frames);

        let keywords = KeywordTable::from_parts(
            vec![Keyword {
                id: KeywordId::new(0),
                synset_id: SynsetId::new(0),
                surface_forms: vec!["dog".into()],
                top_example_ids: vec![],
                description: None,
            }],
            vec![vec![1.0, 0.0]],
            vec![0.0, 0.0],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![0.0, 0.0],
        );

        let features: FeatureBank = (0..6).map(|i| if i % 2 == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] }).collect();
        let regions: RegionFeatureBank = vec![features.clone(); crate::config::CANVAS_REGION_COUNT];

        let config = Config {
            frames_list_file: "unused".into(),
            filename_offsets: FilenameOffsets {
                video_id: (0, 1),
                shot_id: (0, 1),
                frame_num: (0, 1),
            },
            max_frame_filename_len: 256,
            max_temporal_size: 2,
            lsc_metadata_file: None,
            keyword_ranker: KeywordRankerConfig {
                kw_classes_file: "unused".into(),
                kw_features_file: "unused".into(),
                kw_bias_file: "unused".into(),
                pca_matrix_file: "unused".into(),
                pca_mean_file: "unused".into(),
            },
            canvas_ranker: Some(CanvasRankerConfig { region_file_prefix: "unused".into() }),
            som: SomConfig { width: 2, height: 2, iterations_a: 5, iterations_b: 5 },
            default_frames_per_video_limit: 3,
            default_frames_per_shot_limit: 3,
            log_dir: None,
            eval_server_url: None,
        };

        Engine::new(catalog, keywords, features, regions, config)
    }

    #[test]
    fn rescore_then_display_surfaces_best_matching_frames_first() {
        let engine = engine();
        let user = engine.create_user();
        let query = Query {
            temporal: vec![TemporalQuery { text: Some("dog".into()), canvas: None, relocation: None }],
            ..Query::default()
        };
        engine.rescore(user, query).unwrap();
        let display = engine.get_display(user, DisplayType::TopN, 0).unwrap();
        assert_eq!(display.frames[0], Some(FrameId::new(0)));
    }

    #[test]
    fn empty_query_is_rejected() {
        let engine = engine();
        let user = engine.create_user();
        assert!(matches!(engine.rescore(user, Query::default()), Err(HunterError::EmptyQuery)));
    }

    #[test]
    fn like_frames_reports_newly_liked() {
        let engine = engine();
        let user = engine.create_user();
        let result = engine.like_frames(user, &[FrameId::new(0), FrameId::new(0)]).unwrap();
        assert_eq!(result, vec![true, false]);
    }

    #[test]
    fn unknown_user_is_out_of_range() {
        let engine = engine();
        assert!(matches!(engine.like_frames(ContextId::new(99), &[]), Err(HunterError::OutOfRange(_))));
    }

    #[test]
    fn video_detail_display_returns_only_the_selected_shot() {
        let engine = engine();
        let display = engine.get_video_detail_display(FrameId::new(0)).unwrap();
        assert!(display.frames.iter().all(|f| matches!(f, Some(id) if id.get() < 3)));
    }

    #[test]
    fn topknn_display_excludes_the_selected_frame() {
        let engine = engine();
        let display = engine.get_topknn_display(FrameId::new(0), 3).unwrap();
        assert!(!display.frames.contains(&Some(FrameId::new(0))));
    }
}
