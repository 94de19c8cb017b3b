//! Intent lifecycle integration tests: submission through completion,
//! risk rejection, and bus-level duplicate suppression.

mod support;

use std::time::Duration;

use rust_decimal_macros::dec;

use support::{start_stack, start_stack_with, test_config, topics, wait_for_events, wait_for_state};
use swapsmith::domain::id::CorrelationId;
use swapsmith::domain::payload::{FailureReason, Payload};
use swapsmith::domain::read_model::{IntentState, PlanStatus};
use swapsmith::error::Error;
use swapsmith::testkit::domain::{acquire_weth, default_acquire};

#[tokio::test]
async fn happy_path_acquire_completes_with_ordered_lifecycle() {
    let stack = start_stack().await;

    let intent_id = stack
        .app
        .intent_manager
        .submit(default_acquire())
        .await
        .expect("submission accepted");
    let correlation_id = CorrelationId::for_intent(intent_id);

    let model = wait_for_state(
        &stack.app.coordinator,
        intent_id,
        IntentState::Completed,
        Duration::from_secs(5),
    )
    .await;

    let events = wait_for_events(
        &stack.app.coordinator,
        &correlation_id,
        8,
        Duration::from_secs(2),
    )
    .await;

    assert_eq!(
        topics(&events),
        vec![
            "intent.submitted",
            "risk.approved",
            "intent.accepted",
            "plan.created",
            "exec.started",
            "exec.step_submitted",
            "exec.step_filled",
            "exec.completed",
        ]
    );
    let sequences: Vec<u64> = events.iter().filter_map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());

    // Only the root lacks a causation id.
    assert!(events[0].causation_id.is_none());
    assert!(events[1..].iter().all(|e| e.causation_id.is_some()));

    // min_out = floor(0.333 × 0.99) at 18 decimals.
    let Payload::PlanCreated(plan) = &events[3].payload else {
        panic!("fourth envelope must be plan.created");
    };
    assert_eq!(plan.step().min_out, dec!(0.32967));

    assert_eq!(model.last_sequence, 8);
    assert!(model.tx_hash.is_some());
    let amount_out = model.amount_out.expect("amount_out recorded");
    assert!(amount_out >= plan.step().min_out);
    assert_eq!(model.latest_plan_id, Some(plan.plan_id));
    assert!(model.reason.is_none());

    // The plan read model completed with full progress.
    let plan_model = stack
        .app
        .coordinator
        .get_plan(plan.plan_id)
        .await
        .unwrap()
        .expect("plan read model exists");
    assert_eq!(plan_model.status, PlanStatus::Completed);
    assert_eq!(plan_model.progress, dec!(1));

    stack.app.shutdown().await;
}

#[tokio::test]
async fn slippage_over_risk_cap_is_rejected() {
    let stack = start_stack().await;

    let intent_id = stack
        .app
        .intent_manager
        .submit(acquire_weth(dec!(1000.00), dec!(0.1), 300_000))
        .await
        .expect("submission returns the intent id");
    let correlation_id = CorrelationId::for_intent(intent_id);

    let model = wait_for_state(
        &stack.app.coordinator,
        intent_id,
        IntentState::Rejected,
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(model.reason, Some(FailureReason::SlippageLimit));

    let events = wait_for_events(
        &stack.app.coordinator,
        &correlation_id,
        2,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(topics(&events), vec!["intent.submitted", "risk.rejected"]);
    assert!(!topics(&events).contains(&"intent.accepted"));

    stack.app.shutdown().await;
}

#[tokio::test]
async fn notional_over_cap_is_rejected() {
    let stack = start_stack().await;

    let intent_id = stack
        .app
        .intent_manager
        .submit(acquire_weth(dec!(10001), dec!(0.01), 300_000))
        .await
        .unwrap();

    let model = wait_for_state(
        &stack.app.coordinator,
        intent_id,
        IntentState::Rejected,
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(model.reason, Some(FailureReason::NotionalLimit));

    stack.app.shutdown().await;
}

#[tokio::test]
async fn invalid_submission_fails_synchronously_without_events() {
    let stack = start_stack().await;

    let err = stack
        .app
        .intent_manager
        .submit(acquire_weth(dec!(0), dec!(0.01), 300_000))
        .await
        .expect_err("zero amount must fail validation");
    assert!(matches!(err, Error::Validation(_)));

    // Nothing was published anywhere.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stack.app.coordinator.metrics().appended(), 0);

    stack.app.shutdown().await;
}

#[tokio::test]
async fn duplicate_publish_at_the_bus_projects_once() {
    let stack = start_stack().await;

    // Drive one full lifecycle so a root envelope exists, then feed the
    // identical envelope to the bus a second time.
    let intent_id = stack
        .app
        .intent_manager
        .submit(default_acquire())
        .await
        .unwrap();
    let correlation_id = CorrelationId::for_intent(intent_id);

    wait_for_state(
        &stack.app.coordinator,
        intent_id,
        IntentState::Completed,
        Duration::from_secs(5),
    )
    .await;

    let events = stack
        .app
        .coordinator
        .get_events(&correlation_id, 0)
        .await
        .unwrap();
    let root = events[0].clone();
    let before = events.len();

    let outcome = stack.app.bus.publish(root).await.unwrap();
    assert_eq!(
        outcome,
        swapsmith::port::bus::PublishOutcome::DuplicateSuppressed
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = stack
        .app
        .coordinator
        .get_events(&correlation_id, 0)
        .await
        .unwrap()
        .len();
    assert_eq!(after, before, "duplicate publish must not add log rows");
    assert_eq!(stack.app.coordinator.metrics().sequence_conflicts(), 0);

    stack.app.shutdown().await;
}

#[tokio::test]
async fn exhausted_accept_publish_records_intent_failed() {
    use std::sync::Arc;

    use swapsmith::application::intent_manager::IntentManager;
    use swapsmith::application::risk::RiskGate;
    use swapsmith::domain::topic::Pattern;
    use swapsmith::infrastructure::bus::MemoryBus;
    use swapsmith::infrastructure::config::RiskConfig;
    use swapsmith::port::bus::EventBus;
    use swapsmith::testkit::bus::FlakyBus;

    let memory = Arc::new(MemoryBus::default());
    let flaky = Arc::new(FlakyBus::wrapping(Arc::clone(&memory) as Arc<dyn EventBus>));
    // Every retry of the accepted publish fails.
    flaky.fail_topic("intent.accepted", u32::MAX);

    let mut probe = memory
        .subscribe_queue(Pattern::parse("intent.*").unwrap(), "probe")
        .await
        .unwrap();

    let manager = IntentManager::new(
        Arc::clone(&flaky) as Arc<dyn EventBus>,
        RiskGate::new(RiskConfig::default()),
    );

    // The submitter still gets the id: the root publish acked.
    let intent_id = manager.submit(default_acquire()).await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let delivery = tokio::time::timeout(Duration::from_secs(5), probe.next())
            .await
            .expect("lifecycle events should arrive")
            .unwrap();
        seen.push(delivery.envelope.clone());
        delivery.ack();
    }

    assert_eq!(seen[0].topic(), "intent.submitted");
    assert_eq!(seen[1].topic(), "intent.failed");
    let Payload::IntentFailed(failed) = &seen[1].payload else {
        panic!("second envelope must be intent.failed");
    };
    assert_eq!(failed.intent_id, intent_id);
    assert_eq!(failed.reason, FailureReason::AcceptPublishFailed);
    // The coordinator will assign the sequence on ingest.
    assert_eq!(seen[1].sequence, None);
}

#[tokio::test]
async fn allowed_venue_restriction_flows_into_the_plan() {
    let stack = start_stack_with(test_config()).await;

    let mut submission = default_acquire();
    submission.constraints.allowed_venues = Some(vec!["uniswap_v3".to_string()]);
    let intent_id = stack.app.intent_manager.submit(submission).await.unwrap();

    let model = wait_for_state(
        &stack.app.coordinator,
        intent_id,
        IntentState::Completed,
        Duration::from_secs(5),
    )
    .await;

    let plan = stack
        .app
        .coordinator
        .get_plan(model.latest_plan_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plan.steps[0].venue, "uniswap_v3");

    stack.app.shutdown().await;
}
