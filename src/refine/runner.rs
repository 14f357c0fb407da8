//! The refinement loop.

use super::candidate::{build_initial_prompt, generate_candidate};
use super::convergence::{ConvergencePolicy, ConvergenceState, Decision, SessionPhase};
use super::criteria::CriteriaResolver;
use super::critique::critique;
use super::gap::GapAnalyzer;
use super::judge::{Comparison, JudgePanel, Verdict};
use super::report::{IterationAction, IterationRecord, RefinementReport, digest};
use super::store::{BEST_SLOT, CANDIDATE_SLOT, SessionStore};
use crate::config::SessionConfig;
use crate::errors::{ConfigError, IterationFault, OracleError, Stage};
use crate::oracle::{ChecklistExtractor, Oracle, OracleChecklistExtractor, OracleRequest};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Result of a run that passed configuration checks.
#[derive(Debug, Clone, PartialEq)]
pub enum RefinementOutcome {
    Completed {
        artifact: String,
        report: RefinementReport,
    },
    /// The initial generation produced nothing.
    Failed { reason: String },
}

pub struct RefinementRunner {
    oracle: Arc<dyn Oracle>,
    checklists: Option<Arc<dyn ChecklistExtractor>>,
}

impl RefinementRunner {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            checklists: None,
        }
    }

    /// Use a dedicated checklist extractor instead of asking the oracle.
    pub fn with_checklist_extractor(mut self, extractor: Arc<dyn ChecklistExtractor>) -> Self {
        self.checklists = Some(extractor);
        self
    }

    /// Run one session. Configuration problems (including a locked session
    /// directory) are returned before any oracle call.
    pub async fn run(&self, config: &SessionConfig) -> Result<RefinementOutcome, ConfigError> {
        config.validate()?;
        let store = SessionStore::open(&config.session_dir)?;

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "refinement",
            session = %config.session_dir.display(),
            %run_id,
            label = config.log_context.label.as_deref().unwrap_or(""),
            parent_id = config.log_context.parent_id.as_deref().unwrap_or(""),
        );

        Ok(self
            .run_locked(config, &store, run_id)
            .instrument(span)
            .await)
    }

    async fn run_locked(
        &self,
        config: &SessionConfig,
        store: &SessionStore,
        run_id: Uuid,
    ) -> RefinementOutcome {
        let model = config.model.as_deref();
        let mut report = RefinementReport::new(run_id, &config.log_context);
        tracing::info!(
            max_iterations = config.max_iterations,
            judges = config.judges,
            gap_mode = %config.gap.mode,
            "starting refinement"
        );

        let mut incumbent = match self.generate_initial(config).await {
            Ok(text) => text,
            Err(e) => {
                let reason = format!("initial generation failed: {}", e);
                tracing::error!(%reason, "refinement failed");
                report.faults.push(IterationFault::oracle(Stage::Generation, &e));
                report.finish(SessionPhase::Failed, None);
                persist_history(store, &report);
                return RefinementOutcome::Failed { reason };
            }
        };
        if let Err(fault) = persist_slot(store, BEST_SLOT, &incumbent) {
            report.faults.push(fault);
        }

        if config.max_iterations > 1 {
            let resolver = CriteriaResolver::new(self.oracle.clone(), config.model.clone());
            let resolved = resolver.resolve(&config.criteria, &config.prompt).await;
            tracing::debug!(origin = ?resolved.origin, "criteria resolved");
            report.criteria = Some(resolved.text);
            report.criteria_origin = Some(resolved.origin);
            report.faults.extend(resolved.faults);
        }
        let criteria = report.criteria.clone().unwrap_or_default();

        let checklists = self.checklists.clone().unwrap_or_else(|| {
            Arc::new(
                OracleChecklistExtractor::new(self.oracle.clone()).with_model(config.model.clone()),
            )
        });
        let mut gap_analyzer =
            GapAnalyzer::new(self.oracle.clone(), checklists, config.model.clone());
        let panel = JudgePanel::new(
            self.oracle.clone(),
            config.judges as usize,
            config.model.clone(),
        );
        let policy = ConvergencePolicy::from_config(config);
        let mut state = ConvergenceState::default();

        for iteration in 1..config.max_iterations {
            report.phase = SessionPhase::Iterating { iteration };
            let mut record = IterationRecord::new(iteration, &incumbent);

            report.critique_calls += 1;
            let review =
                match critique(self.oracle.as_ref(), model, &config.prompt, &incumbent, &criteria)
                    .await
                {
                    Ok(c) => c,
                    Err(fault) => {
                        skip_iteration(store, &mut report, record, fault);
                        continue;
                    }
                };
            record.recommendation = Some(review.recommendation.value());
            record.faults.extend(review.parse_fault());

            let challenger = match generate_candidate(
                self.oracle.as_ref(),
                model,
                &config.prompt,
                &incumbent,
                &review.advice,
            )
            .await
            {
                Ok(c) => c,
                Err(fault) => {
                    skip_iteration(store, &mut report, record, fault);
                    continue;
                }
            };
            record.challenger_digest = Some(digest(&challenger));
            if let Err(fault) = persist_slot(store, CANDIDATE_SLOT, &challenger) {
                record.faults.push(fault);
            }

            let gap = if config.gap.should_run(&incumbent) {
                match gap_analyzer.analyze(&incumbent, &challenger).await {
                    Ok(gap) => Some(gap),
                    Err(fault) => {
                        tracing::warn!(%fault, "gap analysis skipped");
                        record.faults.push(fault);
                        None
                    }
                }
            } else {
                None
            };
            record.gap_len = gap.as_ref().map(|g| g.len());

            let decision = state.observe(&policy, review.recommendation, record.gap_len);
            record.stable_count = state.stable_count;
            tracing::info!(
                iteration,
                recommendation = review.recommendation.value(),
                gap_len = ?record.gap_len,
                stable = state.stable_count,
                ?decision,
                "iteration evaluated"
            );

            if let Decision::Stop(reason) = decision {
                record.action = IterationAction::Stopped;
                record.stop_reason = Some(reason);
                report.iterations.push(record);
                persist_history(store, &report);
                tracing::info!(iteration, %reason, "convergence reached");
                break;
            }

            report.judge_panels += 1;
            let outcome = panel
                .judge(&Comparison {
                    task_prompt: &config.prompt,
                    criteria: &criteria,
                    incumbent: &incumbent,
                    challenger: &challenger,
                    gap: gap.as_ref(),
                })
                .await;
            record.votes = Some(outcome.tally);
            record.faults.extend(outcome.faults);

            if outcome.winner == Verdict::Challenger {
                incumbent = challenger;
                record.action = IterationAction::Promoted;
                if let Err(fault) = persist_slot(store, BEST_SLOT, &incumbent) {
                    record.faults.push(fault);
                }
            } else {
                record.action = IterationAction::Retained;
            }

            report.iterations.push(record);
            persist_history(store, &report);
        }

        report.finish(SessionPhase::Done, Some(&incumbent));
        persist_history(store, &report);
        tracing::info!(summary = %report.summary(), "refinement complete");

        RefinementOutcome::Completed {
            artifact: incumbent,
            report,
        }
    }

    async fn generate_initial(&self, config: &SessionConfig) -> Result<String, OracleError> {
        let request = OracleRequest::new(build_initial_prompt(&config.prompt))
            .with_model(config.model.as_deref());
        let raw = self.oracle.generate(&request).await?;
        if raw.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(raw)
    }
}

fn skip_iteration(
    store: &SessionStore,
    report: &mut RefinementReport,
    mut record: IterationRecord,
    fault: IterationFault,
) {
    tracing::warn!(iteration = record.iteration, %fault, "iteration skipped");
    record.action = IterationAction::Skipped;
    record.faults.push(fault);
    report.iterations.push(record);
    persist_history(store, report);
}

fn persist_slot(store: &SessionStore, slot: &str, artifact: &str) -> Result<(), IterationFault> {
    let result = match slot {
        BEST_SLOT => store.write_best(artifact),
        _ => store.write_candidate(artifact),
    };
    result.map_err(|e| {
        tracing::warn!(slot, error = %e, "failed to persist slot");
        IterationFault::PersistFailure {
            slot: slot.to_string(),
            message: e.to_string(),
        }
    })
}

fn persist_history(store: &SessionStore, report: &RefinementReport) {
    if let Err(e) = store.write_history(report) {
        tracing::warn!(error = %e, "failed to write history");
    }
}

/// Run a session with the default checklist extractor and flatten the
/// result to `(artifact, ok)`. The artifact is empty whenever `ok` is false.
pub async fn run_refinement(oracle: Arc<dyn Oracle>, config: &SessionConfig) -> (String, bool) {
    match RefinementRunner::new(oracle).run(config).await {
        Ok(RefinementOutcome::Completed { artifact, .. }) => (artifact, true),
        Ok(RefinementOutcome::Failed { reason }) => {
            tracing::error!(%reason, "refinement failed");
            (String::new(), false)
        }
        Err(e) => {
            tracing::error!(error = %e, "refinement not started");
            (String::new(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GapMode;
    use crate::refine::store::{HISTORY_FILE, load_history};
    use crate::refine::{StopReason, criteria::DEFAULT_CRITERIA};
    use crate::testing::{PromptKind, ScriptedOracle, classify};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn critique_reply(rec: u8) -> String {
        format!("<advice>Add more detail.</advice>\n<recommendation>{}</recommendation>", rec)
    }

    #[tokio::test]
    async fn test_single_iteration_makes_one_call() {
        let dir = tempdir().unwrap();
        let oracle = Arc::new(ScriptedOracle::new(|_| Ok("  first draft \n".to_string())));
        let config = SessionConfig::new(dir.path(), "Write a haiku").with_max_iterations(1);

        let outcome = RefinementRunner::new(oracle.clone()).run(&config).await.unwrap();
        match outcome {
            RefinementOutcome::Completed { artifact, report } => {
                assert_eq!(artifact, "  first draft \n");
                assert!(report.iterations.is_empty());
                assert!(report.criteria.is_none());
            }
            other => panic!("expected Completed, got {:?}", other),
        }
        assert_eq!(oracle.calls().len(), 1);
        assert_eq!(oracle.count(PromptKind::Generation), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("best")).unwrap(),
            "  first draft \n"
        );
        assert!(dir.path().join(HISTORY_FILE).exists());
    }

    #[tokio::test]
    async fn test_empty_initial_generation_fails() {
        let dir = tempdir().unwrap();
        let oracle = Arc::new(ScriptedOracle::new(|_| Ok("   ".to_string())));
        let config = SessionConfig::new(dir.path(), "Write a haiku");

        let outcome = RefinementRunner::new(oracle.clone()).run(&config).await.unwrap();
        assert!(matches!(outcome, RefinementOutcome::Failed { .. }));
        assert_eq!(oracle.calls().len(), 1);
        assert!(!dir.path().join("best").exists());

        let history = load_history(dir.path()).unwrap();
        assert_eq!(history.phase, SessionPhase::Failed);
        assert_eq!(history.faults.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_makes_no_calls() {
        let dir = tempdir().unwrap();
        let oracle = Arc::new(ScriptedOracle::new(|_| Ok("x".to_string())));
        let config = SessionConfig::new(dir.path(), "");

        let err = RefinementRunner::new(oracle.clone()).run(&config).await.unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPrompt));
        assert!(oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn test_locked_session_is_config_error() {
        let dir = tempdir().unwrap();
        let _held = SessionStore::open(dir.path()).unwrap();
        let oracle = Arc::new(ScriptedOracle::new(|_| Ok("x".to_string())));
        let config = SessionConfig::new(dir.path(), "p");

        let err = RefinementRunner::new(oracle.clone()).run(&config).await.unwrap_err();
        assert!(matches!(err, ConfigError::SessionLocked { .. }));
        assert!(oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn test_always_better_candidate_with_three_judges() {
        let dir = tempdir().unwrap();
        let drafts = AtomicUsize::new(0);
        let oracle = Arc::new(ScriptedOracle::new(move |req: &OracleRequest| {
            match classify(&req.prompt) {
                PromptKind::Generation | PromptKind::Candidate => {
                    Ok(format!("draft v{}", drafts.fetch_add(1, Ordering::SeqCst)))
                }
                PromptKind::Criteria => Ok("<criteria>clarity</criteria>".to_string()),
                PromptKind::Critique => Ok(critique_reply(2)),
                PromptKind::Checklist => Ok("<list>\n- the draft\n</list>".to_string()),
                PromptKind::Gap => Ok("<gaps>NONE</gaps>".to_string()),
                PromptKind::Judge => Ok("<verdict>2</verdict>".to_string()),
            }
        }));
        let config = SessionConfig::new(dir.path(), "Write a haiku")
            .with_max_iterations(3)
            .with_judges(3);

        let outcome = RefinementRunner::new(oracle.clone()).run(&config).await.unwrap();
        let RefinementOutcome::Completed { artifact, report } = outcome else {
            panic!("expected Completed");
        };
        assert_eq!(artifact, "draft v2");
        assert_eq!(report.critique_calls, 2);
        assert_eq!(report.judge_panels, 2);
        assert_eq!(report.count(IterationAction::Promoted), 2);
        assert_eq!(report.criteria.as_deref(), Some("clarity"));
        assert_eq!(oracle.count(PromptKind::Critique), 2);
        assert_eq!(oracle.count(PromptKind::Judge), 6);
        assert_eq!(std::fs::read_to_string(dir.path().join("best")).unwrap(), "draft v2");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("candidate")).unwrap(),
            "draft v2"
        );
    }

    #[tokio::test]
    async fn test_recommendation_one_runs_full_budget() {
        let dir = tempdir().unwrap();
        let oracle = Arc::new(ScriptedOracle::new(|req: &OracleRequest| {
            match classify(&req.prompt) {
                PromptKind::Critique => Ok(critique_reply(1)),
                PromptKind::Judge => Ok("<verdict>1</verdict>".to_string()),
                PromptKind::Checklist => Ok("- item".to_string()),
                _ => Ok("text".to_string()),
            }
        }));
        let config = SessionConfig::new(dir.path(), "p")
            .with_max_iterations(5)
            .with_criteria_text("be good");

        let outcome = RefinementRunner::new(oracle.clone()).run(&config).await.unwrap();
        let RefinementOutcome::Completed { report, .. } = outcome else {
            panic!("expected Completed");
        };
        assert_eq!(report.iterations.len(), 4);
        assert_eq!(oracle.count(PromptKind::Critique), 4);
        assert_eq!(oracle.count(PromptKind::Candidate), 4);
        assert_eq!(oracle.count(PromptKind::Criteria), 0);
        assert!(report.iterations.iter().all(|r| r.stable_count == 0));
        assert!(report.stop_reason().is_none());
    }

    #[tokio::test]
    async fn test_flat_gap_with_top_recommendation_stops_early() {
        let dir = tempdir().unwrap();
        let drafts = AtomicUsize::new(0);
        let oracle = Arc::new(ScriptedOracle::new(move |req: &OracleRequest| {
            match classify(&req.prompt) {
                PromptKind::Generation | PromptKind::Candidate => {
                    Ok(format!("version {}", drafts.fetch_add(1, Ordering::SeqCst)))
                }
                PromptKind::Critique => Ok(critique_reply(4)),
                PromptKind::Checklist if req.prompt.contains("version 0") => {
                    Ok("- apple\n- banana\n- cherry".to_string())
                }
                PromptKind::Checklist => Ok("- apple\n- banana".to_string()),
                PromptKind::Gap => Ok("<gaps>\n- cherry\n</gaps>".to_string()),
                PromptKind::Judge => Ok("<verdict>1</verdict>".to_string()),
                PromptKind::Criteria => Ok("<criteria>c</criteria>".to_string()),
            }
        }));
        let config = SessionConfig::new(dir.path(), "p")
            .with_max_iterations(10)
            .with_gap_mode(GapMode::On);

        let outcome = RefinementRunner::new(oracle.clone()).run(&config).await.unwrap();
        let RefinementOutcome::Completed { artifact, report } = outcome else {
            panic!("expected Completed");
        };
        assert_eq!(artifact, "version 0");
        assert_eq!(report.iterations.len(), 3);
        assert_eq!(report.stop_reason(), Some(StopReason::Stable));
        assert_eq!(report.judge_panels, 2);
        assert_eq!(report.iterations[2].action, IterationAction::Stopped);
        assert_eq!(report.iterations[2].gap_len, Some("- cherry".len()));
    }

    #[tokio::test]
    async fn test_failed_gap_analysis_stops_on_recommendation() {
        let dir = tempdir().unwrap();
        let oracle = Arc::new(ScriptedOracle::new(|req: &OracleRequest| {
            match classify(&req.prompt) {
                PromptKind::Critique => Ok(critique_reply(3)),
                PromptKind::Checklist => Ok("nothing to list".to_string()),
                PromptKind::Judge => Ok("<verdict>2</verdict>".to_string()),
                _ => Ok("draft".to_string()),
            }
        }));
        let config = SessionConfig::new(dir.path(), "p")
            .with_max_iterations(5)
            .with_criteria_text("be good")
            .with_gap_mode(GapMode::On);

        let outcome = RefinementRunner::new(oracle.clone()).run(&config).await.unwrap();
        let RefinementOutcome::Completed { report, .. } = outcome else {
            panic!("expected Completed");
        };
        assert_eq!(report.iterations.len(), 1);
        assert_eq!(report.stop_reason(), Some(StopReason::Recommendation));
        assert_eq!(report.iterations[0].gap_len, None);
        assert!(
            report.iterations[0]
                .faults
                .iter()
                .any(|f| matches!(f, IterationFault::GapAnalysisFailure { .. }))
        );
        assert_eq!(report.judge_panels, 0);
        assert_eq!(oracle.count(PromptKind::Gap), 0);
        assert_eq!(oracle.count(PromptKind::Judge), 0);
    }

    #[tokio::test]
    async fn test_auto_gap_skipped_for_long_incumbent() {
        let dir = tempdir().unwrap();
        let oracle = Arc::new(ScriptedOracle::new(|req: &OracleRequest| {
            match classify(&req.prompt) {
                PromptKind::Critique => Ok(critique_reply(4)),
                PromptKind::Checklist => Ok("- item".to_string()),
                PromptKind::Gap => Ok("<gaps>NONE</gaps>".to_string()),
                PromptKind::Judge => Ok("<verdict>1</verdict>".to_string()),
                _ => Ok("a draft longer than the threshold".to_string()),
            }
        }));
        let config = SessionConfig::new(dir.path(), "p")
            .with_max_iterations(5)
            .with_criteria_text("be good")
            .with_gap_mode(GapMode::Auto)
            .with_gap_size_threshold(10);

        let outcome = RefinementRunner::new(oracle.clone()).run(&config).await.unwrap();
        let RefinementOutcome::Completed { report, .. } = outcome else {
            panic!("expected Completed");
        };
        assert_eq!(report.iterations.len(), 1);
        assert_eq!(report.stop_reason(), Some(StopReason::Recommendation));
        assert!(report.iterations[0].faults.is_empty());
        assert_eq!(oracle.count(PromptKind::Checklist), 0);
        assert_eq!(oracle.count(PromptKind::Gap), 0);
    }

    #[tokio::test]
    async fn test_constant_oracle_is_idempotent() {
        let dir = tempdir().unwrap();
        let oracle = Arc::new(ScriptedOracle::new(|_| Ok("same text".to_string())));
        let config = SessionConfig::new(dir.path(), "p").with_max_iterations(4);

        let (artifact, ok) = run_refinement(oracle.clone(), &config).await;
        assert!(ok);
        assert_eq!(artifact, "same text");

        let history = load_history(dir.path()).unwrap();
        assert_eq!(history.criteria.as_deref(), Some("same text"));
        assert_eq!(history.iterations.len(), 3);
        for record in &history.iterations {
            assert_eq!(record.action, IterationAction::Retained);
            assert_eq!(record.incumbent_digest, digest("same text"));
            assert_eq!(record.votes.map(|v| v.defaulted), Some(1));
        }
    }

    #[tokio::test]
    async fn test_failed_critique_skips_iteration() {
        let dir = tempdir().unwrap();
        let critiques = AtomicUsize::new(0);
        let oracle = Arc::new(ScriptedOracle::new(move |req: &OracleRequest| {
            match classify(&req.prompt) {
                PromptKind::Critique if critiques.fetch_add(1, Ordering::SeqCst) == 0 => {
                    Err(OracleError::Timeout(std::time::Duration::from_secs(1)))
                }
                PromptKind::Critique => Ok(critique_reply(2)),
                PromptKind::Candidate => Ok("improved".to_string()),
                PromptKind::Judge => Ok("<verdict>2</verdict>".to_string()),
                _ => Ok("base".to_string()),
            }
        }));
        let config = SessionConfig::new(dir.path(), "p")
            .with_max_iterations(3)
            .with_gap_mode(GapMode::Off);

        let (artifact, ok) = run_refinement(oracle.clone(), &config).await;
        assert!(ok);
        assert_eq!(artifact, "improved");

        let history = load_history(dir.path()).unwrap();
        assert_eq!(history.iterations[0].action, IterationAction::Skipped);
        assert!(history.iterations[0].faults[0].skips_iteration());
        assert_eq!(history.iterations[1].action, IterationAction::Promoted);
        assert_eq!(history.critique_calls, 2);
        assert_eq!(history.judge_panels, 1);
    }

    #[tokio::test]
    async fn test_blank_candidate_keeps_incumbent() {
        let dir = tempdir().unwrap();
        let oracle = Arc::new(ScriptedOracle::new(|req: &OracleRequest| {
            match classify(&req.prompt) {
                PromptKind::Generation => Ok("original".to_string()),
                PromptKind::Candidate => Ok("\n\n".to_string()),
                PromptKind::Critique => Ok(critique_reply(2)),
                _ => Ok("<criteria>x</criteria>".to_string()),
            }
        }));
        let config = SessionConfig::new(dir.path(), "p").with_max_iterations(3);

        let (artifact, ok) = run_refinement(oracle.clone(), &config).await;
        assert!(ok);
        assert_eq!(artifact, "original");
        assert_eq!(oracle.count(PromptKind::Judge), 0);
    }

    #[tokio::test]
    async fn test_criteria_fallback_after_oracle_failure() {
        let dir = tempdir().unwrap();
        let oracle = Arc::new(ScriptedOracle::new(|req: &OracleRequest| {
            match classify(&req.prompt) {
                PromptKind::Criteria => Err(OracleError::EmptyResponse),
                PromptKind::Critique => Ok(critique_reply(3)),
                _ => Ok("text".to_string()),
            }
        }));
        let config = SessionConfig::new(dir.path(), "p")
            .with_max_iterations(2)
            .with_gap_mode(GapMode::Off);

        let outcome = RefinementRunner::new(oracle).run(&config).await.unwrap();
        let RefinementOutcome::Completed { report, .. } = outcome else {
            panic!("expected Completed");
        };
        assert_eq!(report.criteria.as_deref(), Some(DEFAULT_CRITERIA));
        assert_eq!(report.stop_reason(), Some(StopReason::Recommendation));
        assert_eq!(report.judge_panels, 0);
    }

    #[tokio::test]
    async fn test_run_refinement_reports_config_error() {
        let oracle = Arc::new(ScriptedOracle::new(|_| Ok("x".to_string())));
        let config = SessionConfig::new("", "p");
        let (artifact, ok) = run_refinement(oracle, &config).await;
        assert!(!ok);
        assert!(artifact.is_empty());
    }
}
