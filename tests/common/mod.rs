//! Shared test doubles for the dispatch integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ara_push_dispatch::config::DispatchConfig;
use ara_push_dispatch::dispatch::{DelayedHandoff, PushProcessor};
use ara_push_dispatch::error::{PushError, StorageError};
use ara_push_dispatch::notification::{Notification, NotificationRecycler};
use ara_push_dispatch::push::PushBackend;
use ara_push_dispatch::request::{handoff_channel, HandoffReceiver, ResponseEvent};
use ara_push_dispatch::storage::{
    DeliveryTarget, MemorySubscriptionStore, ProviderTargetPair, PushProvider, SubscriptionStore,
};

/// Backend returning scripted results per target name; succeeds by default
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<HashMap<String, VecDeque<Result<String, PushError>>>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every push, to make workers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue results for pushes to `target`
    pub fn script(self, target: &str, results: Vec<Result<String, PushError>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .extend(results);
        self
    }

    /// Target names pushed to, in completion order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of pushes observed in progress at once
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushBackend for ScriptedBackend {
    async fn push(
        &self,
        _provider: &PushProvider,
        target: &DeliveryTarget,
        _notification: &Notification,
    ) -> Result<String, PushError> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        self.calls.lock().unwrap().push(target.name.clone());

        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(&target.name)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(format!("msg-{}", target.name)))
    }
}

/// Store whose lookups always fail
pub struct FailingStore;

#[async_trait]
impl SubscriptionStore for FailingStore {
    async fn lookup(&self, _: &str, _: &str) -> Result<Vec<ProviderTargetPair>, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn persist_provider(&self, _: &PushProvider) -> Result<(), StorageError> {
        Ok(())
    }

    async fn persist_target(&self, _: &DeliveryTarget) -> Result<(), StorageError> {
        Ok(())
    }

    async fn subscribe(
        &self,
        _: &str,
        _: &str,
        _: PushProvider,
        _: DeliveryTarget,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    async fn remove_target(&self, _: &str, _: &str, _: &str) -> Result<usize, StorageError> {
        Ok(0)
    }
}

/// Delayed handoff that records instead of sleeping
#[derive(Default)]
pub struct RecordingHandoff {
    scheduled: Mutex<Vec<(Duration, ara_push_dispatch::request::Request)>>,
}

impl RecordingHandoff {
    pub fn take(&self) -> Vec<(Duration, ara_push_dispatch::request::Request)> {
        std::mem::take(&mut *self.scheduled.lock().unwrap())
    }
}

impl DelayedHandoff for RecordingHandoff {
    fn schedule(&self, delay: Duration, request: ara_push_dispatch::request::Request) {
        self.scheduled.lock().unwrap().push((delay, request));
    }
}

/// Recycler counting releases
#[derive(Default)]
pub struct CountingRecycler(AtomicUsize);

impl CountingRecycler {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl NotificationRecycler for CountingRecycler {
    fn recycle(&self, _notification: &Notification) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything a dispatch test needs, wired around a recording handoff
pub struct Harness {
    pub store: Arc<MemorySubscriptionStore>,
    pub backend: Arc<ScriptedBackend>,
    pub delayed: Arc<RecordingHandoff>,
    pub recycler: Arc<CountingRecycler>,
    pub handoff_rx: HandoffReceiver,
    pub processor: PushProcessor,
}

impl Harness {
    pub fn new(backend: ScriptedBackend) -> Self {
        Self::with_config(backend, DispatchConfig::default())
    }

    pub fn with_config(backend: ScriptedBackend, config: DispatchConfig) -> Self {
        let store = Arc::new(MemorySubscriptionStore::new());
        let backend = Arc::new(backend);
        let delayed = Arc::new(RecordingHandoff::default());
        let recycler = Arc::new(CountingRecycler::default());
        let (handoff_tx, handoff_rx) = handoff_channel(64);

        let processor = PushProcessor::new(config, store.clone(), backend.clone(), handoff_tx)
            .with_delayed_handoff(delayed.clone())
            .with_recycler(recycler.clone());

        Self {
            store,
            backend,
            delayed,
            recycler,
            handoff_rx,
            processor,
        }
    }

    /// Subscribe `subscriber` to each target name through provider "apns-prod"
    pub async fn subscribe(&self, subscriber: &str, targets: &[&str]) {
        for target in targets {
            self.store
                .subscribe(
                    "news",
                    subscriber,
                    provider("apns-prod"),
                    DeliveryTarget::new(*target, "apns"),
                )
                .await
                .unwrap();
        }
    }
}

pub fn provider(name: &str) -> PushProvider {
    PushProvider::new(name, "apns")
}

pub fn subscribers(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("user-{i}")).collect()
}

/// Collect every event already sent to a responder channel
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<ResponseEvent>) -> Vec<ResponseEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn finished_count(events: &[ResponseEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ResponseEvent::Finished))
        .count()
}

pub fn errors(events: &[ResponseEvent]) -> Vec<&ara_push_dispatch::error::DispatchError> {
    events
        .iter()
        .filter_map(|e| match e {
            ResponseEvent::Error(err) => Some(err),
            ResponseEvent::Finished => None,
        })
        .collect()
}
