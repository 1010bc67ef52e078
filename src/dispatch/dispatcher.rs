//! Correlated, paced dispatch.

use std::sync::Arc;

use crate::core::{CorrelatedResult, CorrelationRegistry, CorrelationToken};
use crate::dispatch::{Decode, Pacer, Transport};
use crate::orchestration::NotificationChannel;
use crate::{mlog_debug, mlog_trace, mlog_warn, Result};

/// Issues outbound calls and publishes one outcome per token.
///
/// Transport and decode errors never escape: they become
/// `CorrelatedResult::Failure` and are published like any value. The
/// completion task holds its pacer slot until the channel acknowledges the
/// publish.
pub struct Dispatcher<T> {
    registry: Arc<CorrelationRegistry>,
    pacer: Arc<Pacer>,
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn Decode<T>>,
    channel: Arc<dyn NotificationChannel<T>>,
}

impl<T: Send + 'static> Dispatcher<T> {
    pub fn new(
        registry: Arc<CorrelationRegistry>,
        pacer: Arc<Pacer>,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn Decode<T>>,
        channel: Arc<dyn NotificationChannel<T>>,
    ) -> Self {
        Self {
            registry,
            pacer,
            transport,
            decoder,
            channel,
        }
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn pacer(&self) -> &Arc<Pacer> {
        &self.pacer
    }

    /// Schedule a call to `target` and return its token right away.
    ///
    /// Fails only when the pacer is out of slots; nothing is published for a
    /// token whose admission failed.
    pub fn dispatch(&self, target: impl Into<String>) -> Result<CorrelationToken> {
        let token = self.registry.issue();
        let target = target.into();
        let transport = self.transport.clone();
        let decoder = self.decoder.clone();
        let channel = self.channel.clone();

        self.pacer.admit(async move {
            mlog_trace!("Getting {} for {}", target, token);
            let result = match transport.invoke(&target).await {
                Ok(reply) => decoder.decode(&reply),
                Err(e) => Err(e),
            };
            let outcome = CorrelatedResult::from_result(result);
            match &outcome {
                CorrelatedResult::Failure(e) if !e.is_call_failure() => {
                    mlog_warn!("Notifying unexpected failure for {}: {}", token, e);
                }
                CorrelatedResult::Failure(e) => {
                    mlog_debug!("Notifying failure for {}: {}", token, e);
                }
                _ => mlog_debug!("Notifying {} for {}", outcome.kind(), token),
            }
            channel.publish(token, outcome).wait().await;
        })?;

        Ok(token)
    }
}
