//! # Core Stub
//!
//! Stands in for the external Core authority. Subscribes to ack requests on
//! the channel, verifies each carried signal with its own Security Manager
//! (same shared secret, separate replay cache) and answers according to a
//! script.

use kg_02_security_manager::{SecurityManager, SignalSecurity};
use parking_lot::Mutex;
use shared_bus::{ChannelGateway, EventFilter, EventTopic, GatewayEvent, InMemoryChannel, ReplayCache};
use shared_types::{Clock, Decision, DecisionEnvelope, RequestId, SharedSecret};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How Core answers each ack request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreScript {
    /// Answer immediately.
    Immediate(Decision),
    /// Answer after a delay.
    After(Decision, Duration),
    /// Never answer.
    Silent,
}

pub struct CoreStub {
    channel: Arc<InMemoryChannel>,
    security: SecurityManager,
    clock: Arc<dyn Clock>,
    script: CoreScript,
}

/// Observations collected by a running stub.
#[derive(Clone, Default)]
pub struct CoreHandle {
    seen: Arc<Mutex<Vec<RequestId>>>,
    rejected: Arc<AtomicU64>,
}

impl CoreHandle {
    /// Request ids Core received with a valid signal, in arrival order.
    pub fn seen(&self) -> Vec<RequestId> {
        self.seen.lock().clone()
    }

    /// Ack requests whose signal failed verification.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Wait until `count` requests were seen. Works under paused time.
    pub async fn wait_for(&self, count: usize) {
        while self.seen.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

impl CoreStub {
    pub fn new(
        channel: Arc<InMemoryChannel>,
        secret: SharedSecret,
        clock: Arc<dyn Clock>,
        script: CoreScript,
    ) -> Self {
        let cache = Arc::new(ReplayCache::new(10_000, 3_600, Arc::clone(&clock)));
        Self {
            channel,
            security: SecurityManager::new(secret, cache, Arc::clone(&clock)),
            clock,
            script,
        }
    }

    /// Subscribe now and answer in the background.
    pub fn spawn(self) -> (CoreHandle, JoinHandle<()>) {
        let handle = CoreHandle::default();
        let observed = handle.clone();
        let mut requests = self
            .channel
            .subscribe(EventFilter::topics(vec![EventTopic::AckRequests]));
        let stub = Arc::new(self);

        let task = tokio::spawn(async move {
            while let Some(delivered) = requests.recv().await {
                let GatewayEvent::AckRequested {
                    request_id, signal, ..
                } = delivered.event
                else {
                    continue;
                };
                if stub.security.verify(&signal).is_err() {
                    observed.rejected.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
                observed.seen.lock().push(request_id);

                let (decision, delay) = match stub.script {
                    CoreScript::Immediate(decision) => (decision, Duration::ZERO),
                    CoreScript::After(decision, delay) => (decision, delay),
                    CoreScript::Silent => continue,
                };
                let stub = Arc::clone(&stub);
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    stub.decide(request_id, decision).await;
                });
            }
        });
        (handle, task)
    }

    /// Publish one decision onto the channel.
    pub async fn decide(&self, request_id: RequestId, decision: Decision) -> usize {
        self.channel
            .publish(GatewayEvent::DecisionIssued(DecisionEnvelope {
                request_id,
                decision,
                issued_at: self.clock.now_secs(),
            }))
            .await
    }
}
