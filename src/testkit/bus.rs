//! Failure-injecting bus wrapper.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::envelope::EventEnvelope;
use crate::domain::topic::Pattern;
use crate::error::BusError;
use crate::port::bus::{
    EphemeralSubscription, EventBus, PublishOutcome, QueueSubscription, ResumeFrom,
};

/// Delegating bus that fails a scripted number of publishes per topic.
pub struct FlakyBus {
    inner: Arc<dyn EventBus>,
    failures: Mutex<HashMap<String, u32>>,
}

impl FlakyBus {
    #[must_use]
    pub fn wrapping(inner: Arc<dyn EventBus>) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Make the next `times` publishes of `topic` fail.
    pub fn fail_topic(&self, topic: &str, times: u32) {
        self.failures.lock().insert(topic.to_string(), times);
    }
}

#[async_trait]
impl EventBus for FlakyBus {
    async fn publish(&self, envelope: EventEnvelope) -> Result<PublishOutcome, BusError> {
        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(envelope.topic()) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(BusError::PublishFailed(format!(
                        "scripted failure for {}",
                        envelope.topic()
                    )));
                }
            }
        }
        self.inner.publish(envelope).await
    }

    async fn subscribe_queue(
        &self,
        pattern: Pattern,
        group: &str,
    ) -> Result<QueueSubscription, BusError> {
        self.inner.subscribe_queue(pattern, group).await
    }

    async fn subscribe_ephemeral(
        &self,
        pattern: Pattern,
        from: ResumeFrom,
    ) -> Result<EphemeralSubscription, BusError> {
        self.inner.subscribe_ephemeral(pattern, from).await
    }
}
