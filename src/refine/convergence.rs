//! Convergence control: when to stop iterating.

use super::critique::Recommendation;
use crate::config::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    GeneratingInitial,
    Iterating { iteration: u32 },
    Done,
    Failed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeneratingInitial => write!(f, "generating initial version"),
            Self::Iterating { iteration } => write!(f, "iteration {}", iteration),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The gap stayed flat for the stability window.
    Stable,
    /// Gap analysis found nothing missing.
    GapClosed,
    /// The critic saw little left to improve and no gap signal was available.
    Recommendation,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => write!(f, "gap stable"),
            Self::GapClosed => write!(f, "gap closed"),
            Self::Recommendation => write!(f, "recommendation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Judge the challenger and go on.
    Continue,
    /// Discard the challenger and finish.
    Stop(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergencePolicy {
    pub stability_window: u32,
    pub min_improvement: f64,
}

impl ConvergencePolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            stability_window: config.stability_window,
            min_improvement: config.min_improvement,
        }
    }
}

/// Lowest recommendation at which the loop may stop.
const STOP_RECOMMENDATION: u8 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergenceState {
    pub last_gap_len: Option<usize>,
    pub stable_count: u32,
    pub recommendation: Option<Recommendation>,
}

impl ConvergenceState {
    /// Fold in one iteration's signals. `gap_len` is `None` when gap analysis
    /// did not run.
    pub fn observe(
        &mut self,
        policy: &ConvergencePolicy,
        recommendation: Recommendation,
        gap_len: Option<usize>,
    ) -> Decision {
        self.recommendation = Some(recommendation);

        if let Some(current) = gap_len {
            self.stable_count = if current == 0 {
                self.stable_count + 1
            } else {
                match self.last_gap_len {
                    Some(previous) if previous > 0 => {
                        let reduction = (previous as f64 - current as f64) / previous as f64;
                        if reduction < policy.min_improvement {
                            self.stable_count + 1
                        } else {
                            0
                        }
                    }
                    _ => 0,
                }
            };
            self.last_gap_len = Some(current);
        }

        if recommendation.demands_iteration() {
            self.stable_count = 0;
            return Decision::Continue;
        }

        let satisfied = recommendation.value() >= STOP_RECOMMENDATION;
        match gap_len {
            Some(_) if satisfied && self.stable_count >= policy.stability_window => {
                Decision::Stop(StopReason::Stable)
            }
            Some(0) if satisfied => Decision::Stop(StopReason::GapClosed),
            Some(_) => Decision::Continue,
            None if satisfied => Decision::Stop(StopReason::Recommendation),
            None => Decision::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: ConvergencePolicy = ConvergencePolicy {
        stability_window: 2,
        min_improvement: 0.05,
    };

    fn rec(v: i64) -> Recommendation {
        Recommendation::clamped(v)
    }

    #[test]
    fn test_flat_gap_stops_after_window() {
        let mut state = ConvergenceState::default();
        assert_eq!(state.observe(&POLICY, rec(4), Some(100)), Decision::Continue);
        assert_eq!(state.stable_count, 0);
        assert_eq!(state.observe(&POLICY, rec(4), Some(100)), Decision::Continue);
        assert_eq!(state.stable_count, 1);
        assert_eq!(
            state.observe(&POLICY, rec(4), Some(99)),
            Decision::Stop(StopReason::Stable)
        );
        assert_eq!(state.stable_count, 2);
    }

    #[test]
    fn test_real_improvement_resets_counter() {
        let mut state = ConvergenceState {
            last_gap_len: Some(100),
            stable_count: 1,
            recommendation: None,
        };
        assert_eq!(state.observe(&POLICY, rec(3), Some(50)), Decision::Continue);
        assert_eq!(state.stable_count, 0);
        assert_eq!(state.last_gap_len, Some(50));
    }

    #[test]
    fn test_reduction_of_exactly_min_improvement_resets_counter() {
        let mut state = ConvergenceState {
            last_gap_len: Some(100),
            stable_count: 1,
            recommendation: None,
        };
        assert_eq!(state.observe(&POLICY, rec(4), Some(95)), Decision::Continue);
        assert_eq!(state.stable_count, 0);

        assert_eq!(state.observe(&POLICY, rec(4), Some(91)), Decision::Continue);
        assert_eq!(state.stable_count, 1);
    }

    #[test]
    fn test_zero_gap_with_high_recommendation_stops() {
        let mut state = ConvergenceState::default();
        assert_eq!(
            state.observe(&POLICY, rec(3), Some(0)),
            Decision::Stop(StopReason::GapClosed)
        );
    }

    #[test]
    fn test_zero_gap_with_low_recommendation_continues() {
        let mut state = ConvergenceState::default();
        assert_eq!(state.observe(&POLICY, rec(2), Some(0)), Decision::Continue);
        assert_eq!(state.stable_count, 1);
    }

    #[test]
    fn test_recommendation_one_resets_even_without_gap() {
        let mut state = ConvergenceState {
            last_gap_len: Some(10),
            stable_count: 5,
            recommendation: None,
        };
        assert_eq!(state.observe(&POLICY, rec(1), None), Decision::Continue);
        assert_eq!(state.stable_count, 0);
        assert_eq!(state.last_gap_len, Some(10));

        assert_eq!(state.observe(&POLICY, rec(1), Some(0)), Decision::Continue);
        assert_eq!(state.stable_count, 0);
    }

    #[test]
    fn test_no_gap_falls_back_to_recommendation() {
        let mut state = ConvergenceState::default();
        assert_eq!(state.observe(&POLICY, rec(2), None), Decision::Continue);
        assert_eq!(
            state.observe(&POLICY, rec(3), None),
            Decision::Stop(StopReason::Recommendation)
        );
        assert_eq!(state.recommendation, Some(rec(3)));
    }

    #[test]
    fn test_growing_gap_counts_as_stable() {
        let mut state = ConvergenceState {
            last_gap_len: Some(10),
            stable_count: 0,
            recommendation: None,
        };
        state.observe(&POLICY, rec(2), Some(20));
        assert_eq!(state.stable_count, 1);
    }

    #[test]
    fn test_previous_zero_resets_counter() {
        let mut state = ConvergenceState {
            last_gap_len: Some(0),
            stable_count: 3,
            recommendation: None,
        };
        state.observe(&POLICY, rec(2), Some(7));
        assert_eq!(state.stable_count, 0);
    }

    #[test]
    fn test_phase_serde_and_display() {
        let phase = SessionPhase::Iterating { iteration: 2 };
        assert_eq!(phase.to_string(), "iteration 2");
        let json = serde_json::to_string(&SessionPhase::Done).unwrap();
        assert_eq!(json, r#"{"phase":"done"}"#);
    }
}
