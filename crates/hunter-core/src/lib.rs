//! # hunter-core
//!
//! Interactive known-item frame retrieval: text embedding queries,
//! canvas sketches, relocation/k-NN browsing, Bayesian relevance
//! feedback, two-step temporal queries and a self-organizing map for
//! free browsing, all over a fixed, in-memory frame catalog.
//!
//! ## Pipeline
//!
//! A [`engine::Engine`] owns the catalog and every shared ranking
//! resource; each user gets a [`context::History`] of
//! [`context::SearchContext`] values, and a rescore runs like this:
//!
//! 1. Reset the active context's [`score::ScoreModel`] to `1.0`.
//! 2. Run each non-empty temporal slot's text/canvas/relocation rankers,
//!    folding each one's sub-score vector into that slot's temporal row.
//! 3. Fuse every temporal row down into the top-level row via
//!    [`score::ScoreModel::apply_temporals`].
//! 4. Apply relevance feedback over the liked frames via
//!    [`score::ScoreModel::apply_bayes`].
//! 5. Apply metadata filters by masking non-matching frames.
//! 6. Normalize, hand the new scores to the background self-organizing
//!    map workers, and return.
//!
//! Retrieving a display just reads back [`score::ScoreModel::top_n`] (or
//! one of its variants) -- scoring and display are deliberately
//! decoupled so a caller can rescore once and page through several
//! display modes without recomputation.
//!
//! ## Concurrency
//!
//! Each user's session state is reached through one coarse
//! [`parking_lot::Mutex`], serializing that user's API calls. Each
//! temporal slot's self-organizing map trains on its own dedicated
//! thread ([`som::AsyncSomWorker`]), alongside one more for the global
//! display map, each woken by its own condition variable and safe to
//! interrupt mid-training when a newer rescore supersedes it. Short-lived
//! rayon scopes parallelize the per-frame relevance-feedback and
//! point-to-cell assignment passes; both are joined before the call that
//! started them returns.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod eval;
pub mod filters;
pub mod frame;
pub mod ids;
pub mod keyword;
pub mod linalg;
pub mod logging;
pub mod rankers;
pub mod score;
pub mod som;

pub use engine::{Engine, SessionApi};
pub use error::{HunterError, Result};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
