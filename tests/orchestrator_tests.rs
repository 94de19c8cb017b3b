//! Orchestrator retry, revert, and deadline behavior against scripted
//! venue receipts.

mod support;

use std::time::Duration;

use support::{start_stack, start_stack_with, test_config, topics, wait_for_events, wait_for_state};
use swapsmith::domain::id::CorrelationId;
use swapsmith::domain::payload::{FailureReason, Payload};
use swapsmith::domain::read_model::{IntentState, PlanStatus};
use swapsmith::testkit::domain::{acquire_weth, default_acquire};
use swapsmith::testkit::venue::ScriptedReceipt;

use rust_decimal_macros::dec;

#[tokio::test]
async fn transient_revert_then_success_takes_two_attempts() {
    let stack = start_stack().await;
    stack.venue.push_receipt(ScriptedReceipt::Revert);

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

    // One started, two submissions, one fill, one completion.
    let events = wait_for_events(
        &stack.app.coordinator,
        &correlation_id,
        9,
        Duration::from_secs(2),
    )
    .await;
    let topics = topics(&events);
    assert_eq!(
        topics.iter().filter(|t| **t == "exec.started").count(),
        1
    );
    assert_eq!(
        topics
            .iter()
            .filter(|t| **t == "exec.step_submitted")
            .count(),
        2
    );
    assert_eq!(
        topics.iter().filter(|t| **t == "exec.step_filled").count(),
        1
    );
    assert_eq!(
        topics.iter().filter(|t| **t == "exec.completed").count(),
        1
    );

    let attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match &e.payload {
            Payload::ExecStepSubmitted(p) => Some(p.attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);

    // Each attempt rebuilt the transaction with a fresh nonce.
    let submitted = stack.venue.submitted();
    assert_eq!(submitted.len(), 2);
    assert_ne!(submitted[0].nonce, submitted[1].nonce);

    stack.app.shutdown().await;
}

#[tokio::test]
async fn reverts_exhaust_the_attempt_budget() {
    let stack = start_stack().await;
    for _ in 0..3 {
        stack.venue.push_receipt(ScriptedReceipt::Revert);
    }

    let intent_id = stack
        .app
        .intent_manager
        .submit(default_acquire())
        .await
        .unwrap();

    let model = wait_for_state(
        &stack.app.coordinator,
        intent_id,
        IntentState::Failed,
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(model.reason, Some(FailureReason::MaxAttemptsExceeded));
    assert_eq!(stack.venue.submitted().len(), 3);

    let plan = stack
        .app
        .coordinator
        .get_plan(model.latest_plan_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Failed);

    stack.app.shutdown().await;
}

#[tokio::test]
async fn stalled_receipt_past_the_window_fails_with_deadline_exceeded() {
    let mut config = test_config();
    config.risk.min_time_window_ms = 100;
    let stack = start_stack_with(config).await;

    // The chain stalls far longer than the intent's 200ms window.
    stack.venue.push_receipt(ScriptedReceipt::Stall {
        duration: Duration::from_secs(5),
    });
    stack.venue.push_receipt(ScriptedReceipt::Stall {
        duration: Duration::from_secs(5),
    });
    stack.venue.push_receipt(ScriptedReceipt::Stall {
        duration: Duration::from_secs(5),
    });

    let intent_id = stack
        .app
        .intent_manager
        .submit(acquire_weth(dec!(1000.00), dec!(0.01), 200))
        .await
        .unwrap();

    let model = wait_for_state(
        &stack.app.coordinator,
        intent_id,
        IntentState::Failed,
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(model.reason, Some(FailureReason::DeadlineExceeded));

    stack.app.shutdown().await;
}

#[tokio::test]
async fn transient_submit_failures_are_retried() {
    let stack = start_stack().await;
    stack
        .venue
        .push_submit_error(swapsmith::error::VenueError::Transient(
            "nonce conflict".to_string(),
        ));

    let intent_id = stack
        .app
        .intent_manager
        .submit(default_acquire())
        .await
        .unwrap();

    wait_for_state(
        &stack.app.coordinator,
        intent_id,
        IntentState::Completed,
        Duration::from_secs(5),
    )
    .await;

    // The failed submit consumed an attempt but never reached the bus.
    assert_eq!(stack.venue.submitted().len(), 1);

    stack.app.shutdown().await;
}

#[tokio::test]
async fn routing_failure_rejects_the_plan() {
    let stack = start_stack().await;
    stack
        .router
        .push_result(Err(swapsmith::error::RouteError::NoRoute));

    let intent_id = stack
        .app
        .intent_manager
        .submit(default_acquire())
        .await
        .unwrap();
    let correlation_id = CorrelationId::for_intent(intent_id);

    let model = wait_for_state(
        &stack.app.coordinator,
        intent_id,
        IntentState::Failed,
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(model.reason, Some(FailureReason::NoRoute));

    let events = wait_for_events(
        &stack.app.coordinator,
        &correlation_id,
        4,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(
        topics(&events),
        vec![
            "intent.submitted",
            "risk.approved",
            "intent.accepted",
            "plan.rejected",
        ]
    );

    stack.app.shutdown().await;
}

#[tokio::test]
async fn transient_route_error_is_retried_once_then_succeeds() {
    let stack = start_stack().await;
    stack
        .router
        .push_result(Err(swapsmith::error::RouteError::Timeout));

    let intent_id = stack
        .app
        .intent_manager
        .submit(default_acquire())
        .await
        .unwrap();

    wait_for_state(
        &stack.app.coordinator,
        intent_id,
        IntentState::Completed,
        Duration::from_secs(5),
    )
    .await;

    stack.app.shutdown().await;
}
