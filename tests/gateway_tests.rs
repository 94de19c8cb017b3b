//! Realtime gateway integration tests: pattern validation, resume
//! replay, and live tailing.

mod support;

use std::time::Duration;

use support::{start_stack, wait_for_state};
use swapsmith::application::gateway::{ControlMessage, GatewayMessage, SubscribeRequest};
use swapsmith::domain::id::CorrelationId;
use swapsmith::domain::read_model::IntentState;
use swapsmith::testkit::domain::default_acquire;

#[tokio::test]
async fn resume_replays_history_then_signals_completion() {
    let stack = start_stack().await;

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

    // Client saw everything up to sequence 2 before disconnecting.
    let mut connection = stack
        .app
        .gateway
        .subscribe(SubscribeRequest {
            topics: vec![
                "intent.*".to_string(),
                "plan.*".to_string(),
                "exec.*".to_string(),
            ],
            correlation_id: Some(correlation_id.clone()),
            resume_from: Some(2),
        })
        .await
        .unwrap();

    let mut sequences = Vec::new();
    loop {
        let message = tokio::time::timeout(Duration::from_secs(1), connection.next())
            .await
            .expect("replay should not stall")
            .expect("connection stays open");
        match message {
            GatewayMessage::Event(envelope) => {
                assert_eq!(envelope.correlation_id, correlation_id);
                sequences.push(envelope.sequence.unwrap());
            }
            GatewayMessage::Control(ControlMessage::ResumeComplete) => break,
        }
    }
    assert_eq!(sequences, vec![3, 4, 5, 6, 7, 8]);

    stack.app.shutdown().await;
}

#[tokio::test]
async fn live_tail_delivers_the_lifecycle_in_order() {
    let stack = start_stack().await;

    let mut connection = stack
        .app
        .gateway
        .subscribe(SubscribeRequest {
            topics: vec![
                "intent.*".to_string(),
                "risk.*".to_string(),
                "plan.*".to_string(),
                "exec.*".to_string(),
            ],
            correlation_id: None,
            resume_from: None,
        })
        .await
        .unwrap();

    let intent_id = stack
        .app
        .intent_manager
        .submit(default_acquire())
        .await
        .unwrap();
    let correlation_id = CorrelationId::for_intent(intent_id);

    let mut topics = Vec::new();
    while topics.len() < 8 {
        let message = tokio::time::timeout(Duration::from_secs(5), connection.next())
            .await
            .expect("live events should flow")
            .expect("connection stays open");
        if let GatewayMessage::Event(envelope) = message {
            if envelope.correlation_id == correlation_id {
                topics.push(envelope.topic().to_string());
            }
        }
    }

    assert_eq!(topics.first().map(String::as_str), Some("intent.submitted"));
    assert_eq!(topics.last().map(String::as_str), Some("exec.completed"));
    assert!(topics.contains(&"risk.approved".to_string()));

    stack.app.shutdown().await;
}

#[tokio::test]
async fn correlation_filter_drops_other_intents() {
    let stack = start_stack().await;

    let first = stack
        .app
        .intent_manager
        .submit(default_acquire())
        .await
        .unwrap();
    wait_for_state(
        &stack.app.coordinator,
        first,
        IntentState::Completed,
        Duration::from_secs(5),
    )
    .await;

    // Tail pinned to the first (already finished) intent.
    let mut connection = stack
        .app
        .gateway
        .subscribe(SubscribeRequest {
            topics: vec!["exec.*".to_string()],
            correlation_id: Some(CorrelationId::for_intent(first)),
            resume_from: None,
        })
        .await
        .unwrap();

    let second = stack
        .app
        .intent_manager
        .submit(default_acquire())
        .await
        .unwrap();
    wait_for_state(
        &stack.app.coordinator,
        second,
        IntentState::Completed,
        Duration::from_secs(5),
    )
    .await;

    // The second intent's exec events were all filtered out.
    let quiet = tokio::time::timeout(Duration::from_millis(200), connection.next()).await;
    assert!(quiet.is_err(), "filtered connection must stay quiet");

    stack.app.shutdown().await;
}

#[tokio::test]
async fn invalid_patterns_are_rejected() {
    let stack = start_stack().await;

    for topics in [
        vec![],
        vec!["market.*".to_string()],
        vec!["Intent.*".to_string()],
        vec!["intent.*.deep".to_string()],
    ] {
        let result = stack
            .app
            .gateway
            .subscribe(SubscribeRequest {
                topics,
                correlation_id: None,
                resume_from: None,
            })
            .await;
        assert!(result.is_err());
    }

    // resume_from without a correlation has nothing to replay against.
    let result = stack
        .app
        .gateway
        .subscribe(SubscribeRequest {
            topics: vec!["exec.*".to_string()],
            correlation_id: None,
            resume_from: Some(1),
        })
        .await;
    assert!(result.is_err());

    stack.app.shutdown().await;
}
