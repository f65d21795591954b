//! Context stream manager.
//!
//! Fans sensor/state samples out to subscribers as `arp.contextUpdate`
//! notifications. Each subscription carries its own rate gate; samples
//! arriving faster than a subscriber's rate are dropped, never buffered.
//! Sources backed by a provider get a sampling loop that starts with the
//! first subscriber and stops with the last.

use crate::config::EngineConfig;
use crate::ports::context_provider::ContextProviderPort;
use crate::ports::outbound::OutboundPort;
use robolink_domain::protocol::methods::ContextUpdateParams;
use robolink_domain::{
    ContextSource, ContextSubscription, Notification, OutboundMessage, ProtocolError,
    SubscriptionId, method_names,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub struct ContextStreamManager {
    sources: HashMap<String, ContextSource>,
    providers: HashMap<String, Arc<dyn ContextProviderPort>>,
    outbound: Arc<dyn OutboundPort>,
    subscriptions: Mutex<HashMap<SubscriptionId, ContextSubscription>>,
    /// One sampling loop token per source with active subscribers.
    loops: Mutex<HashMap<String, CancellationToken>>,
    next_id: AtomicU64,
    default_rate_hz: f64,
    default_sample_rate_hz: f64,
}

impl ContextStreamManager {
    pub fn new(outbound: Arc<dyn OutboundPort>, config: &EngineConfig) -> Self {
        Self {
            sources: HashMap::new(),
            providers: HashMap::new(),
            outbound,
            subscriptions: Mutex::new(HashMap::new()),
            loops: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            default_rate_hz: config.default_context_rate_hz,
            default_sample_rate_hz: config.default_sample_rate_hz,
        }
    }

    /// Declare a source without a provider. Samples must be pushed via
    /// [`publish`](Self::publish).
    pub fn add_source(&mut self, source: ContextSource) {
        self.sources.insert(source.name.clone(), source);
    }

    /// Declare a source backed by a provider that the manager polls.
    pub fn add_provided_source(
        &mut self,
        source: ContextSource,
        provider: Arc<dyn ContextProviderPort>,
    ) {
        self.providers.insert(source.name.clone(), provider);
        self.sources.insert(source.name.clone(), source);
    }

    pub fn list_sources(&self) -> Vec<ContextSource> {
        let mut sources: Vec<_> = self.sources.values().cloned().collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Attach a subscriber to a source.
    ///
    /// The effective rate is the requested one, else the source's nominal
    /// rate, else the configured default.
    pub fn subscribe(
        self: &Arc<Self>,
        subscriber: impl Into<String>,
        source: &str,
        max_rate: Option<f64>,
    ) -> Result<SubscriptionId, ProtocolError> {
        let declared = self
            .sources
            .get(source)
            .ok_or_else(|| ProtocolError::context_not_found(source))?;
        let rate = max_rate
            .filter(|hz| *hz > 0.0)
            .or(declared.update_rate)
            .unwrap_or(self.default_rate_hz);

        let id = SubscriptionId::new(format!(
            "sub-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed) + 1
        ));
        let subscription = ContextSubscription::new(id.clone(), subscriber, source, rate);
        self.subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .insert(id.clone(), subscription);

        info!(subscription_id = %id, source = %source, rate_hz = rate, "Context subscription added");
        self.ensure_sampling_loop(source);
        Ok(id)
    }

    /// Detach a subscription. Stops the source's sampling loop when it was
    /// the last one.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), ProtocolError> {
        let removed = self
            .subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .remove(id)
            .ok_or_else(|| ProtocolError::context_not_found(id.as_str()))?;

        info!(subscription_id = %id, source = %removed.source, "Context subscription removed");
        self.stop_loop_if_idle(&removed.source);
        Ok(())
    }

    /// Deliver one sample to every due subscriber of `source`.
    ///
    /// Subscribers whose rate gate is closed are skipped; the sample is
    /// dropped for them, not queued.
    pub async fn publish(&self, source: &str, data: Value) {
        let now = Instant::now();
        let timestamp = chrono::Utc::now().to_rfc3339();

        let due: Vec<SubscriptionId> = {
            let mut subscriptions = self
                .subscriptions
                .lock()
                .expect("subscription lock poisoned");
            subscriptions
                .values_mut()
                .filter(|sub| sub.source == source)
                .filter_map(|sub| {
                    if sub.should_deliver(now) {
                        sub.mark_delivered(now);
                        Some(sub.id.clone())
                    } else {
                        trace!(subscription_id = %sub.id, source = %source, "Sample dropped by rate gate");
                        None
                    }
                })
                .collect()
        };

        if due.is_empty() {
            return;
        }
        let params = ContextUpdateParams {
            source: source.to_string(),
            timestamp,
            data,
        };
        let params = match serde_json::to_value(&params) {
            Ok(value) => value,
            Err(err) => {
                warn!(source = %source, error = %err, "Failed to encode context update");
                return;
            }
        };

        let sends = due.iter().map(|_| {
            self.outbound.send(OutboundMessage::Notification(Notification::new(
                method_names::CONTEXT_UPDATE,
                params.clone(),
            )))
        });
        for outcome in futures::future::join_all(sends).await {
            if let Err(err) = outcome {
                warn!(source = %source, error = %err, "Context update not sent");
            }
        }
    }

    /// Drop all subscriptions and stop all sampling loops.
    pub fn clear(&self) {
        self.subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .clear();
        let mut loops = self.loops.lock().expect("loop lock poisoned");
        for (source, token) in loops.drain() {
            debug!(source = %source, "Stopping sampling loop");
            token.cancel();
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .len()
    }

    pub fn get_subscription(&self, id: &SubscriptionId) -> Option<ContextSubscription> {
        self.subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .get(id)
            .cloned()
    }

    fn ensure_sampling_loop(self: &Arc<Self>, source: &str) {
        let Some(provider) = self.providers.get(source).cloned() else {
            return;
        };
        let mut loops = self.loops.lock().expect("loop lock poisoned");
        if loops.contains_key(source) {
            return;
        }

        let rate = self
            .sources
            .get(source)
            .and_then(|s| s.update_rate)
            .filter(|hz| *hz > 0.0)
            .unwrap_or(self.default_sample_rate_hz);
        let period = Duration::from_secs_f64(1.0 / rate);

        let token = CancellationToken::new();
        loops.insert(source.to_string(), token.clone());
        debug!(source = %source, rate_hz = rate, "Starting sampling loop");

        let manager = Arc::clone(self);
        let source = source.to_string();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match provider.sample().await {
                            Ok(data) => manager.publish(&source, data).await,
                            Err(err) => {
                                warn!(source = %source, error = %err, "Context sample failed");
                            }
                        }
                    }
                }
            }
        });
    }

    fn stop_loop_if_idle(&self, source: &str) {
        let still_subscribed = self
            .subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .values()
            .any(|sub| sub.source == source);
        if still_subscribed {
            return;
        }
        if let Some(token) = self
            .loops
            .lock()
            .expect("loop lock poisoned")
            .remove(source)
        {
            debug!(source = %source, "Stopping sampling loop");
            token.cancel();
        }
    }
}
