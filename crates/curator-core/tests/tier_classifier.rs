mod common;

use std::sync::Arc;
use std::time::Duration;

use curator_core::classifier::{AttemptFailure, SelectionError, TierClassifier};
use curator_core::completion::{ChatRole, CompletionError};
use curator_core::fakes::ScriptedCompletionService;
use curator_core::retry::RetryPolicy;
use curator_core::{SelectionViolation, Tier};

use common::{pool, profile, selection_response, test_config, tier_plan};

fn classifier(service: &Arc<ScriptedCompletionService>) -> TierClassifier {
    let dir = std::env::temp_dir();
    TierClassifier::new(service.clone(), &test_config(&dir))
}

#[tokio::test]
async fn five_full_items_trigger_corrective_retry() {
    let items = pool(14);
    let service = Arc::new(ScriptedCompletionService::new());
    service
        .push_ok(selection_response(&items[..11], &tier_plan(5, 4, 2)))
        .push_ok(selection_response(&items[..14], &tier_plan(8, 4, 2)));

    let selection = classifier(&service)
        .classify(&items, &profile())
        .await
        .expect("second attempt accepted");

    assert_eq!(selection.tier_count(Tier::Full), 8);
    assert_eq!(selection.pool_size, 14);

    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    let retry = &requests[1].messages;
    assert_eq!(retry.len(), 3);
    assert_eq!(retry[1].role, ChatRole::Assistant);
    assert_eq!(retry[2].role, ChatRole::User);
    assert!(retry[2]
        .content
        .contains("5 of 6 required `full`-tier items present"));
}

#[tokio::test]
async fn exhausted_attempts_surface_last_violation() {
    let items = pool(14);
    let service = Arc::new(ScriptedCompletionService::new());
    for _ in 0..3 {
        service.push_ok(selection_response(&items[..11], &tier_plan(9, 2, 0)));
    }

    let err = classifier(&service)
        .classify(&items, &profile())
        .await
        .expect_err("never satisfies trending minimum");

    match err {
        SelectionError::Exhausted {
            attempts,
            last_failure: AttemptFailure::Invariant(violations),
            ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(
                violations,
                vec![SelectionViolation::TierShortfall {
                    tier: Tier::Trending,
                    actual: 0,
                    required: 1
                }]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(service.call_count(), 3);
}

#[tokio::test]
async fn primary_failure_falls_back_to_second_model() {
    let items = pool(14);
    let service = Arc::new(ScriptedCompletionService::new());
    service
        .push_err(CompletionError::Status {
            status: 400,
            body: "model not available".into(),
        })
        .push_ok(selection_response(&items, &tier_plan(8, 4, 2)));

    let classifier = classifier(&service);
    classifier
        .classify(&items, &profile())
        .await
        .expect("fallback answers");

    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    assert_ne!(requests[0].model, requests[1].model);
    assert_eq!(requests[0].messages, requests[1].messages);
}

#[tokio::test]
async fn garbage_response_is_rejected_then_corrected() {
    let items = pool(14);
    let service = Arc::new(ScriptedCompletionService::new());
    service
        .push_ok("I'd be happy to help! Here are some thoughts.")
        .push_ok(format!(
            "```json\n{}\n```",
            selection_response(&items, &tier_plan(8, 4, 2))
        ));

    let selection = classifier(&service)
        .classify(&items, &profile())
        .await
        .expect("corrected");
    assert_eq!(selection.len(), 14);
    let retry = &service.requests()[1].messages;
    assert!(retry[2].content.contains("no JSON object"));
}

#[tokio::test]
async fn empty_pool_is_not_sent() {
    let service = Arc::new(ScriptedCompletionService::new());
    let err = classifier(&service)
        .classify(&[], &profile())
        .await
        .expect_err("no candidates");
    assert!(matches!(err, SelectionError::NoCandidates { .. }));
    assert_eq!(service.call_count(), 0);
}

#[tokio::test]
async fn throttled_primary_is_retried_then_falls_back() {
    let items = pool(14);
    let service = Arc::new(ScriptedCompletionService::new());
    service
        .push_err(CompletionError::Transport("connection reset".into()))
        .push_err(CompletionError::Status {
            status: 429,
            body: "rate limited".into(),
        })
        .push_ok(selection_response(&items, &tier_plan(8, 4, 2)));

    let selection = classifier(&service)
        .with_call_policy(RetryPolicy::exponential(2, Duration::ZERO))
        .classify(&items, &profile())
        .await
        .expect("fallback answers");
    assert_eq!(selection.len(), 14);

    let requests = service.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].model, requests[1].model);
    assert_ne!(requests[1].model, requests[2].model);
}

#[tokio::test]
async fn transient_error_recovers_on_primary() {
    let items = pool(14);
    let service = Arc::new(ScriptedCompletionService::new());
    service
        .push_err(CompletionError::Timeout(Duration::from_secs(60)))
        .push_ok(selection_response(&items, &tier_plan(8, 4, 2)));

    classifier(&service)
        .with_call_policy(RetryPolicy::exponential(3, Duration::ZERO))
        .classify(&items, &profile())
        .await
        .expect("second call succeeds");

    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model, requests[1].model);
}

#[tokio::test]
async fn oversized_pool_is_capped_before_sending() {
    let items = pool(60);
    let service = Arc::new(ScriptedCompletionService::new());
    service.push_ok(selection_response(&items[..14], &tier_plan(8, 4, 2)));
    let mut config = test_config(&std::env::temp_dir());
    config.pipeline.max_candidates = 20;

    let selection = TierClassifier::new(service.clone(), &config)
        .classify(&items, &profile())
        .await
        .expect("selection from capped batch");

    assert_eq!(selection.pool_size, 60);
    let prompt = &service.requests()[0].messages[0].content;
    assert!(prompt.contains("Review the 20 candidates"), "{prompt}");
    assert_eq!(prompt.matches("\nID: ").count(), 20);
    assert!(!prompt.contains(items[59].id.as_str()));
}
