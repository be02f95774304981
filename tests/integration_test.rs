//! Integration tests for chunkwise.

#![allow(clippy::expect_used)]

use chunkwise::chunking::SemanticChunker;
use chunkwise::config::Config;
use chunkwise::core::Chunk;
use chunkwise::error::{DispatchError, Error};
use chunkwise::orchestrator::{ChunkOrchestrator, handler_fn};
use chunkwise::reconcile::{Completeness, Entity, MergePolicy, Reconcile, Verdict};
use chunkwise::tokens::TokenEstimator;
use std::sync::Arc;

const MODEL: &str = "gpt-4o";

/// Synthetic document of roughly `chars` characters. Every paragraph
/// carries a unique `markerNNNNN` token.
fn synthetic_document(chars: usize) -> String {
    let mut text = String::with_capacity(chars + 256);
    let mut i = 0;
    while text.len() < chars {
        if i > 0 {
            text.push_str("\n\n");
        }
        text.push_str(&format!(
            "marker{i:05} The tribunal examined exhibit {i} submitted by the claimant. \
             Witness testimony about the shipment of invoice {i} was contradictory, \
             and the court requested further documentation before ruling."
        ));
        i += 1;
    }
    text
}

fn markers(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .filter(|w| w.starts_with("marker"))
        .collect()
}

fn test_config(max_tokens: usize, overlap_tokens: usize) -> Config {
    let mut config = Config::default();
    config.chunking.max_tokens = max_tokens;
    config.chunking.overlap_tokens = overlap_tokens;
    config.dispatch.response_reserve_tokens = 100;
    config
        .rate_limit
        .tpm_per_model
        .insert(MODEL.to_string(), 1_000_000_000);
    config
}

#[test]
fn test_chunker_coverage_and_size_bounds() {
    let estimator = TokenEstimator::new().expect("tokenizer");
    let chunker = SemanticChunker::new(estimator, 1_000, 200).expect("chunker");
    let text = synthetic_document(60_000);

    let plan = chunker.chunk_with_coverage(&text, MODEL);

    assert!(plan.chunks.len() > 1);
    assert!(plan.coverage.applied);
    assert!(plan.coverage.coverage_ratio_chars >= 0.95);
    assert!(plan.coverage.coverage_ratio_tokens >= 0.95);
    for chunk in &plan.chunks {
        assert!(chunk.estimated_tokens <= 1_200, "chunk {} too large", chunk.index);
        assert_eq!(chunk.text, &text[chunk.byte_range.clone()]);
    }
}

#[test]
fn test_consecutive_chunks_share_overlap() {
    let estimator = TokenEstimator::new().expect("tokenizer");
    let chunker = SemanticChunker::new(estimator, 1_000, 200).expect("chunker");
    let text = synthetic_document(40_000);

    let chunks = chunker.chunk(&text, MODEL);
    assert!(chunks.len() > 2);

    for pair in chunks.windows(2) {
        let previous = markers(&pair[0].text);
        let next = markers(&pair[1].text);
        assert!(pair[1].has_overlap);
        assert!(
            next.iter().any(|m| previous.contains(m)),
            "chunks {} and {} share no paragraph",
            pair[0].index,
            pair[1].index
        );
    }
}

#[tokio::test]
async fn test_end_to_end_one_failing_chunk() {
    let orchestrator = ChunkOrchestrator::new(&test_config(1_000, 200)).expect("orchestrator");
    let text = synthetic_document(300_000);
    let handler = Arc::new(handler_fn(|chunk: &Chunk| {
        anyhow::ensure!(chunk.index != 3, "model returned malformed output");
        Ok(Findings {
            exhibits: markers(&chunk.text).into_iter().map(str::to_string).collect(),
            ..Findings::default()
        })
    }));

    let (merged, audit) = orchestrator
        .run_and_reconcile(&text, MODEL, 0, handler)
        .await
        .expect("map-reduce");

    assert!(audit.applied);
    assert!(audit.chunk_count > 1);
    assert_eq!(audit.chunks_failed, 1);
    assert_eq!(audit.failed_chunks, vec![3]);
    assert_eq!(audit.chunks_succeeded, audit.chunk_count - 1);
    assert!(audit.coverage_gate_passed);
    assert_eq!(merged.chunks_merged, audit.chunk_count - 1);
    assert!(!merged.value.exhibits.is_empty());
    assert_eq!(orchestrator.budgets().status(MODEL).used, 0);

    let json = audit.to_json().expect("audit json");
    assert_eq!(json["chunks_failed"], 1);
    assert_eq!(json["reason"], "context_exceeded");
}

#[tokio::test]
async fn test_end_to_end_every_chunk_failing() {
    let orchestrator = ChunkOrchestrator::new(&test_config(1_000, 200)).expect("orchestrator");
    let text = synthetic_document(300_000);
    let handler = Arc::new(handler_fn(|_: &Chunk| -> anyhow::Result<Findings> {
        anyhow::bail!("backend unavailable")
    }));

    let err = orchestrator
        .run_and_reconcile(&text, MODEL, 0, handler)
        .await
        .expect_err("all chunks failed");

    assert!(matches!(
        err,
        Error::Dispatch(DispatchError::NoChunkSucceeded { attempted, .. }) if attempted > 1
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_shared_services_track_usage_across_runs() {
    let config = test_config(1_000, 200);
    let first = ChunkOrchestrator::new(&config).expect("orchestrator");
    let second = ChunkOrchestrator::with_services(
        &config,
        Arc::clone(first.budgets()),
        Arc::clone(first.limiter()),
    )
    .expect("orchestrator");
    let handler = Arc::new(handler_fn(|chunk: &Chunk| Ok(chunk.index)));

    let one = first
        .run("A brief memo.", MODEL, 0, Arc::clone(&handler))
        .await
        .expect("first run");
    let two = second
        .run("Another brief memo.", MODEL, 0, handler)
        .await
        .expect("second run");

    let recorded = first.limiter().current_usage(MODEL);
    let expected = (one.audit.total_tokens + two.audit.total_tokens) as u64;
    assert_eq!(recorded, expected);
}

/// Partial result of a synthetic legal analysis.
#[derive(Debug, Clone, Default, PartialEq)]
struct Findings {
    case_number: String,
    exhibits: Vec<String>,
    themes: Vec<Theme>,
    urgent: bool,
    outcome: Option<Verdict<Outcome>>,
}

#[derive(Debug, Clone, PartialEq)]
struct Theme {
    title: String,
    summary: String,
    citations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Admissible,
    Inadmissible,
}

impl Entity for Theme {
    fn primary_label(&self) -> &str {
        &self.title
    }

    fn full_text(&self) -> String {
        format!("{}. {}", self.title, self.summary)
    }

    fn completeness(&self) -> usize {
        Completeness::default()
            .field(&self.title)
            .field(&self.summary)
            .evidence(self.citations.len())
            .score()
    }
}

impl Reconcile for Findings {
    fn merge_policy() -> MergePolicy<Self> {
        MergePolicy::<Self>::new()
            .first_present("case_number", |f| &mut f.case_number)
            .union_dedup("exhibits", |f| &mut f.exhibits)
            .cluster("themes", |f| &mut f.themes)
            .any("urgent", |f| &mut f.urgent)
            .verdict("outcome", |f| &mut f.outcome)
    }
}

mod reconcile_tests {
    use super::*;
    use chunkwise::reconcile::{ConflictKind, reconcile};

    fn theme(title: &str, summary: &str, citations: usize) -> Theme {
        Theme {
            title: title.to_string(),
            summary: summary.to_string(),
            citations: (0..citations).map(|i| format!("page {i}")).collect(),
        }
    }

    #[test]
    fn test_single_result_is_identity() {
        let only = Findings {
            case_number: String::new(),
            exhibits: vec!["A".to_string(), "a".to_string()],
            themes: vec![theme("Costs", "", 0), theme("costs", "", 0)],
            urgent: false,
            outcome: Some(Verdict::new(Outcome::Admissible)),
        };
        let merged = reconcile(vec![only.clone()]).expect("reconcile");
        assert_eq!(merged.value, only);
        assert_eq!(merged.duplicates_removed, 0);
    }

    #[test]
    fn test_identical_lists_union_to_distinct_entries() {
        let exhibits: Vec<String> = ["Contract", "Invoice 12", "Email thread"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let partial = Findings {
            exhibits: exhibits.clone(),
            ..Findings::default()
        };
        let mut shouting = partial.clone();
        shouting.exhibits = exhibits.iter().map(|e| e.to_uppercase()).collect();

        let merged = reconcile(vec![partial, shouting]).expect("reconcile");
        assert_eq!(merged.value.exhibits, exhibits);
        assert_eq!(merged.duplicates_removed, 3);
    }

    #[test]
    fn test_paraphrased_themes_merge_and_unrelated_stay() {
        let first = Findings {
            themes: vec![
                theme(
                    "Statute of limitations",
                    "The defendant argues the claim is time-barred under the statute",
                    0,
                ),
                theme("Jurisdiction", "Venue objection raised by respondent", 1),
            ],
            ..Findings::default()
        };
        let second = Findings {
            themes: vec![
                theme(
                    "Statute of Limitations",
                    "The defendant argues that the claim is time barred under the statute",
                    2,
                ),
                theme("Moral damages", "Compensation sought for reputational harm", 0),
            ],
            ..Findings::default()
        };

        let merged = reconcile(vec![first, second]).expect("reconcile");
        let titles: Vec<&str> = merged.value.themes.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Statute of Limitations", "Jurisdiction", "Moral damages"]
        );
        assert_eq!(merged.value.themes[0].citations.len(), 2);
        assert_eq!(merged.duplicates_removed, 1);
    }

    #[test]
    fn test_verdict_tie_is_reported() {
        let admissible = Findings {
            case_number: "0001234-56.2024".to_string(),
            outcome: Some(Verdict::new(Outcome::Admissible)),
            ..Findings::default()
        };
        let inadmissible = Findings {
            outcome: Some(Verdict::new(Outcome::Inadmissible)),
            urgent: true,
            ..Findings::default()
        };

        let merged = reconcile(vec![admissible, inadmissible]).expect("reconcile");
        assert_eq!(merged.value.case_number, "0001234-56.2024");
        assert!(merged.value.urgent);
        assert_eq!(merged.value.outcome, None);
        assert_eq!(merged.conflicts.len(), 1);
        assert_eq!(merged.conflicts[0].kind, ConflictKind::Tie);

        let err = merged.into_resolved().expect_err("conflict");
        assert_eq!(err.to_string(), "reconcile error: unresolved verdict conflicts on: outcome");
    }

    #[test]
    fn test_empty_input() {
        assert!(reconcile(Vec::<Findings>::new()).is_err());
    }
}

mod property_tests {
    use super::*;
    use chunkwise::config::{BudgetConfig, RateLimitConfig};
    use chunkwise::rate_limit::RateLimiter;
    use chunkwise::tokens::BudgetManager;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn small_text_is_one_identical_chunk(text in "[a-zA-Z ,.]{1,400}") {
            let estimator = TokenEstimator::new().expect("tokenizer");
            let chunker = SemanticChunker::new(estimator, 1_000, 200).expect("chunker");
            let chunks = chunker.chunk(&text, MODEL);
            prop_assert_eq!(chunks.len(), 1);
            prop_assert_eq!(&chunks[0].text, &text);
        }

        #[test]
        fn reserve_release_restores_usage(
            window in 1_000usize..200_000,
            held in 0usize..500,
            request in 1usize..300_000,
        ) {
            let mut config = BudgetConfig::default();
            config.context_windows.insert("test-model".to_string(), window);
            let budgets = BudgetManager::new(&config);
            let limit = budgets.limit_for("test-model");
            prop_assume!(held <= limit);
            prop_assert!(budgets.reserve(held, "test-model"));

            let before = budgets.status("test-model").used;
            if before + request > limit {
                prop_assert!(!budgets.reserve(request, "test-model"));
                prop_assert_eq!(budgets.status("test-model").used, before);
            } else {
                prop_assert!(budgets.reserve(request, "test-model"));
                budgets.release(request, "test-model");
                prop_assert_eq!(budgets.status("test-model").used, before);
            }
        }

        #[test]
        fn limiter_blocks_at_threshold(tpm in 100u64..10_000_000, tokens in 1usize..50_000) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .expect("runtime");
            rt.block_on(async {
                let mut config = RateLimitConfig::default();
                config.tpm_per_model.insert("test-model".to_string(), tpm);
                let limiter = RateLimiter::new(&config);
                limiter.record("test-model", (tpm as f64 * 0.9) as usize);
                prop_assert!(!limiter.can_proceed("test-model", tokens));
                prop_assert!(limiter.wait_time("test-model", tokens) > std::time::Duration::ZERO);
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
