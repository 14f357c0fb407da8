//! The refinement loop and its components.
//!
//! One session takes an initial generation and then, up to the iteration
//! budget, critiques the incumbent, generates a challenger, optionally checks
//! the challenger for lost detail, and lets a judge panel decide whether the
//! challenger replaces the incumbent.
//!
//! ## Components
//!
//! - [`criteria`]: evaluation rubric resolution
//! - [`critique`]: advice and recommendation ordinal
//! - [`candidate`]: challenger generation
//! - [`gap`]: checklist-based completeness comparison
//! - [`judge`]: concurrent majority-vote panel
//! - [`convergence`]: stop/continue decisions
//! - [`store`]: locked session directory with atomic slots
//! - [`report`]: per-iteration history
//! - [`runner`]: the loop itself
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use temper::config::SessionConfig;
//! use temper::oracle::{ClaudeCliOracle, ClaudeCliOracleConfig};
//! use temper::refine::run_refinement;
//!
//! # async fn demo() {
//! let oracle = Arc::new(ClaudeCliOracle::new(ClaudeCliOracleConfig::default()));
//! let config = SessionConfig::new("/tmp/haiku", "Write a haiku about autumn")
//!     .with_max_iterations(4)
//!     .with_judges(3);
//!
//! let (artifact, ok) = run_refinement(oracle, &config).await;
//! if ok {
//!     println!("{}", artifact);
//! }
//! # }
//! ```

pub mod candidate;
pub mod convergence;
pub mod criteria;
pub mod critique;
pub mod gap;
pub mod judge;
pub mod report;
pub mod runner;
pub mod store;

pub use candidate::{ADVICE_PLACEHOLDER, CANDIDATE_CONTEXT_HEADING, PREVIOUS_VERSION_PLACEHOLDER};
pub use convergence::{
    ConvergencePolicy, ConvergenceState, Decision, SessionPhase, StopReason,
};
pub use criteria::{CRITERIA_HEADING, CriteriaOrigin, CriteriaResolver, DEFAULT_CRITERIA};
pub use critique::{CRITIQUE_HEADING, CritiqueResult, Recommendation};
pub use gap::{GAP_HEADING, GapAnalyzer, GapReport};
pub use judge::{JUDGE_HEADING, JudgePanel, TIE_BREAK_WINNER, Verdict, VoteTally};
pub use report::{IterationAction, IterationRecord, RefinementReport};
pub use runner::{RefinementOutcome, RefinementRunner, run_refinement};
pub use store::{SessionStore, load_history};
