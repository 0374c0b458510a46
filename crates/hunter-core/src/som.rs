//! Self-organizing map: background-trained 2-D Kohonen map used to lay
//! out the catalog for browsing, plus the dedicated-thread worker that
//! trains it off the request path.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::config::SomConfig;
use crate::ids::FrameId;
use crate::score::ScoreModel;

/// Negative learning rate used for the anti-learning stage; this is a
/// factor applied to the phase-A rates, not an absolute rate.
const NEG_ALPHA: f32 = -0.01;
/// Neighbourhood radius multiplier for the anti-learning stage.
const NEG_RADIUS: f32 = 1.1;
/// How many training steps run between cancellation checkpoints.
const CHECKPOINT_STRIDE: usize = 64;

/// One (alpha, radius) pair a training stage interpolates between, from
/// its first step to its last.
#[derive(Debug, Clone, Copy)]
struct Schedule {
    alpha_start: f32,
    alpha_end: f32,
    radius_start: f32,
    radius_end: f32,
    steps: usize,
}

/// A trained codebook: one feature vector per grid cell, in row-major
/// `(x, y)` order.
#[derive(Debug, Clone)]
pub struct SomGrid {
    width: usize,
    height: usize,
    codebook: Vec<Vec<f32>>,
    /// Frame ids assigned to each cell, same row-major order as
    /// `codebook`.
    mapping: Vec<Vec<FrameId>>,
}

impl SomGrid {
    /// Grid width in cells.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Frame ids mapped to cell `(x, y)`.
    #[must_use]
    pub fn cell(&self, x: usize, y: usize) -> &[FrameId] {
        &self.mapping[y * self.width + x]
    }

    /// Builds a one-frame-per-cell display: populated cells draw a
    /// weighted example via `model`, empty cells borrow a frame from the
    /// nearest populated cell that hasn't already donated too many
    /// frames (`max_steals_per_cell`).
    #[must_use]
    pub fn get_display(&self, model: &ScoreModel, max_steals_per_cell: usize) -> Vec<Option<FrameId>> {
        let mut stolen = vec![0_usize; self.mapping.len()];
        let mut donor_pools: Vec<Vec<FrameId>> = self.mapping.clone();
        let mut out = Vec::with_capacity(self.mapping.len());

        for idx in 0..self.mapping.len() {
            if !self.mapping[idx].is_empty() {
                out.push(model.weighted_example(&self.mapping[idx]));
                continue;
            }
            let (x, y) = (idx % self.width, idx / self.width);
            match self.nearest_cluster_with_capacity(x, y, &stolen, max_steals_per_cell) {
                Some(donor) => {
                    stolen[donor] += 1;
                    let pool = &mut donor_pools[donor];
                    let picked = model.weighted_example(pool);
                    if let Some(id) = picked {
                        pool.retain(|&f| f != id);
                    }
                    out.push(picked);
                }
                None => out.push(None),
            }
        }
        out
    }

    fn nearest_cluster_with_capacity(&self, x: usize, y: usize, stolen: &[usize], max_steals: usize) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, cell) in self.mapping.iter().enumerate() {
            if cell.is_empty() || stolen[idx] >= max_steals {
                continue;
            }
            let (cx, cy) = (idx % self.width, idx / self.width);
            let dist = cx.abs_diff(x) + cy.abs_diff(y);
            let better = match best {
                Some((_, best_dist)) => dist < best_dist,
                None => true,
            };
            if better {
                best = Some((idx, dist));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

fn manhattan(i: usize, j: usize, width: usize) -> usize {
    let (xi, yi) = (i % width, i / width);
    let (xj, yj) = (j % width, j / width);
    xi.abs_diff(xj) + yi.abs_diff(yj)
}

/// Neighbourhood influence of the best-matching unit on a cell at
/// Manhattan distance `d`, given radius `r`: `max(0, 1 - d/r)`.
fn neighborhood(d: usize, r: f32) -> f32 {
    if r <= 0.0 {
        return if d == 0 { 1.0 } else { 0.0 };
    }
    (1.0 - d as f32 / r).max(0.0)
}

fn best_matching_unit(codebook: &[Vec<f32>], point: &[f32]) -> usize {
    codebook
        .iter()
        .enumerate()
        .min_by(|a, b| sq_dist(a.1, point).partial_cmp(&sq_dist(b.1, point)).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn sq_dist(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Draws one index from `pool` with probability proportional to
/// `weights[i]`, with replacement -- mirrors
/// [`crate::score::ScoreModel::weighted_example`]'s roulette wheel, but
/// over a fixed pool redrawn every training step rather than a
/// one-shot pick.
fn weighted_pick(rng: &mut impl Rng, pool: &[usize], weights: &[f32]) -> usize {
    let total: f32 = pool.iter().map(|&i| weights[i].max(0.0)).sum();
    if total <= 0.0 {
        return pool[rng.gen_range(0..pool.len())];
    }
    let mut x = rng.gen_range(0.0..total);
    for &i in pool {
        let w = weights[i].max(0.0);
        if x < w {
            return i;
        }
        x -= w;
    }
    *pool.last().expect("pool is non-empty")
}

/// Trains a codebook on `points` using two successive stages: an
/// ordering stage with the configured alpha/radius, and an anti-learning
/// stage that spreads the map back out. Each step samples its training
/// point from `points` restricted to `mask`, with probability
/// proportional to `weights`. Runs until completion or until
/// `should_abort` returns `true`, which is checked every
/// [`CHECKPOINT_STRIDE`] steps so a newer training request can preempt a
/// stale one.
#[tracing::instrument(skip(points, weights, mask, should_abort), fields(num_points = points.len(), width = config.width, height = config.height))]
fn train(points: &[Vec<f32>], weights: &[f32], mask: &[bool], config: &SomConfig, should_abort: &dyn Fn() -> bool) -> Option<Vec<Vec<f32>>> {
    let dim = points.first().map(Vec::len).unwrap_or(0);
    let num_cells = config.width * config.height;
    let mut rng = rand::thread_rng();

    let pool: Vec<usize> = (0..points.len()).filter(|&i| mask.get(i).copied().unwrap_or(false)).collect();

    let mut codebook: Vec<Vec<f32>> = (0..num_cells)
        .map(|_| {
            if pool.is_empty() {
                vec![0.0; dim]
            } else {
                points[pool[rng.gen_range(0..pool.len())]].clone()
            }
        })
        .collect();

    let base_radius = (config.width + config.height) as f32 / 3.0;
    let stages = [
        Schedule {
            alpha_start: 0.3,
            alpha_end: 0.1,
            radius_start: base_radius,
            radius_end: 0.1,
            steps: config.iterations_a,
        },
        Schedule {
            alpha_start: NEG_ALPHA * 0.3,
            alpha_end: NEG_ALPHA * 0.1,
            radius_start: NEG_RADIUS * base_radius,
            radius_end: NEG_RADIUS * 0.1,
            steps: config.iterations_b,
        },
    ];

    if pool.is_empty() {
        return Some(codebook);
    }

    let mut step_count = 0_usize;
    for stage in stages {
        for step in 0..stage.steps {
            if step_count % CHECKPOINT_STRIDE == 0 && should_abort() {
                return None;
            }
            step_count += 1;

            let t = if stage.steps <= 1 { 0.0 } else { step as f32 / (stage.steps - 1) as f32 };
            let alpha = stage.alpha_start + (stage.alpha_end - stage.alpha_start) * t;
            let radius = stage.radius_start + (stage.radius_end - stage.radius_start) * t;

            let sample = weighted_pick(&mut rng, &pool, weights);
            let point = &points[sample];
            let bmu = best_matching_unit(&codebook, point);

            for cell in 0..num_cells {
                let d = manhattan(cell, bmu, config.width);
                let h = neighborhood(d, radius);
                if h <= 0.0 {
                    continue;
                }
                let lr = alpha * h;
                for (c, p) in codebook[cell].iter_mut().zip(point) {
                    *c += lr * (p - *c);
                }
            }
        }
    }
    Some(codebook)
}

/// Assigns every masked point to its nearest codebook cell, in parallel
/// chunks of the point range.
fn map_points(codebook: &[Vec<f32>], points: &[Vec<f32>], mask: &[bool]) -> Vec<Vec<FrameId>> {
    use rayon::prelude::*;

    let assignments: Vec<Option<usize>> = (0..points.len())
        .into_par_iter()
        .map(|i| {
            if mask.get(i).copied().unwrap_or(false) {
                Some(best_matching_unit(codebook, &points[i]))
            } else {
                None
            }
        })
        .collect();

    let mut mapping = vec![Vec::new(); codebook.len()];
    for (i, cell) in assignments.into_iter().enumerate() {
        if let Some(cell) = cell {
            mapping[cell].push(FrameId::new(i));
        }
    }
    mapping
}

/// A training request: the feature rows, per-frame weights and mask the
/// worker trains against, plus the geometry to train into.
#[derive(Debug, Clone)]
pub struct SomSnapshot {
    /// Per-frame feature rows, indexed by [`FrameId`].
    pub points: Vec<Vec<f32>>,
    /// Per-frame score, used as a training weight.
    pub weights: Vec<f32>,
    /// Which frames currently participate in training/mapping.
    pub mask: Vec<bool>,
    /// Grid geometry and schedule for this request.
    pub config: SomConfig,
}

struct WorkerState {
    pending: Option<SomSnapshot>,
    ready: Option<Arc<SomGrid>>,
    terminate: bool,
}

/// Trains a self-organizing map on a dedicated background thread.
///
/// One worker trains exactly one map. [`crate::engine::Engine`] spawns
/// `1 + max_temporal_size` of these -- one per temporal slot plus one for
/// the global display map -- so two slots' maps can train concurrently
/// and independently rather than contending over a shared pending slot.
///
/// Mirrors the original's condition-variable-and-mutex handoff: calling
/// [`AsyncSomWorker::start_work`] replaces any in-flight training request
/// without blocking, and the worker notices the replacement at its next
/// checkpoint and restarts rather than publishing a stale grid.
pub struct AsyncSomWorker {
    state: Arc<(Mutex<WorkerState>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl AsyncSomWorker {
    /// Spawns the worker thread. The thread exits when the worker is
    /// dropped.
    #[must_use]
    pub fn spawn() -> Self {
        let state = Arc::new((
            Mutex::new(WorkerState {
                pending: None,
                ready: None,
                terminate: false,
            }),
            Condvar::new(),
        ));
        let worker_state = Arc::clone(&state);
        let handle = std::thread::spawn(move || worker_loop(&worker_state));
        Self {
            state,
            handle: Some(handle),
        }
    }

    /// Submits (or replaces) this worker's training request.
    pub fn start_work(&self, snapshot: SomSnapshot) {
        let (mutex, condvar) = &*self.state;
        let mut guard = mutex.lock();
        guard.pending = Some(snapshot);
        condvar.notify_one();
    }

    /// The most recently completed grid, if training has finished at
    /// least once since the worker was spawned.
    #[must_use]
    pub fn ready(&self) -> Option<Arc<SomGrid>> {
        self.state.0.lock().ready.clone()
    }

    /// Whether a grid is ready yet.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.0.lock().ready.is_some()
    }
}

impl Drop for AsyncSomWorker {
    fn drop(&mut self) {
        {
            let (mutex, condvar) = &*self.state;
            let mut guard = mutex.lock();
            guard.terminate = true;
            condvar.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(state: &Arc<(Mutex<WorkerState>, Condvar)>) {
    let (mutex, condvar) = &**state;
    loop {
        let snapshot = {
            let mut guard = mutex.lock();
            while guard.pending.is_none() && !guard.terminate {
                condvar.wait_for(&mut guard, Duration::from_millis(250));
            }
            if guard.terminate {
                return;
            }
            guard.pending.take().expect("checked above")
        };

        let state_for_abort = Arc::clone(state);
        let should_abort = move || {
            let guard = state_for_abort.0.lock();
            guard.terminate || guard.pending.is_some()
        };

        if let Some(codebook) = train(&snapshot.points, &snapshot.weights, &snapshot.mask, &snapshot.config, &should_abort) {
            let mapping = map_points(&codebook, &snapshot.points, &snapshot.mask);
            let grid = Arc::new(SomGrid {
                width: snapshot.config.width,
                height: snapshot.config.height,
                codebook,
                mapping,
            });
            let mut guard = mutex.lock();
            if !guard.terminate {
                guard.ready = Some(grid);
                tracing::info!("self-organizing map ready");
            }
        } else {
            tracing::debug!("self-organizing map training superseded before completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SomConfig {
        SomConfig {
            width: 2,
            height: 2,
            iterations_a: 20,
            iterations_b: 10,
        }
    }

    #[test]
    fn neighborhood_is_one_at_zero_distance() {
        assert_eq!(neighborhood(0, 2.0), 1.0);
    }

    #[test]
    fn neighborhood_decays_linearly_and_floors_at_zero() {
        assert!((neighborhood(1, 2.0) - 0.5).abs() < 1e-6);
        assert_eq!(neighborhood(10, 2.0), 0.0);
    }

    #[test]
    fn manhattan_distance_on_grid() {
        assert_eq!(manhattan(0, 3, 2), 2);
    }

    #[test]
    fn train_produces_one_row_per_cell() {
        let points = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]];
        let weights = vec![1.0; 3];
        let mask = vec![true; 3];
        let codebook = train(&points, &weights, &mask, &small_config(), &|| false).unwrap();
        assert_eq!(codebook.len(), 4);
        assert_eq!(codebook[0].len(), 2);
    }

    #[test]
    fn train_aborts_when_flagged() {
        let points = vec![vec![1.0, 0.0]];
        let weights = vec![1.0];
        let mask = vec![true];
        let aborted = train(&points, &weights, &mask, &small_config(), &|| true);
        assert!(aborted.is_none());
    }

    #[test]
    fn train_samples_only_unmasked_points() {
        let points = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let weights = vec![1.0, 1.0];
        let mask = vec![true, false];
        let codebook = train(&points, &weights, &mask, &small_config(), &|| false).unwrap();
        for cell in &codebook {
            assert!(cell[1] < 0.5, "cell drifted toward the masked-out point: {cell:?}");
        }
    }

    #[test]
    fn map_points_respects_mask() {
        let codebook = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0], vec![0.0, 0.0]];
        let points = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let mapping = map_points(&codebook, &points, &[true, false]);
        let total: usize = mapping.iter().map(Vec::len).sum();
        assert_eq!(total, 1);
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
    }

    #[test]
    fn worker_eventually_produces_a_ready_grid() {
        init_tracing();
        let worker = AsyncSomWorker::spawn();
        let snapshot = SomSnapshot {
            points: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            weights: vec![1.0, 1.0],
            mask: vec![true, true],
            config: small_config(),
        };
        worker.start_work(snapshot);
        for _ in 0..200 {
            if worker.is_ready() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("worker never produced a grid");
    }
}
