//! Shared fixtures: scripted providers, a channel-backed reply sink and
//! engine construction helpers.

// Each test binary uses its own slice of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use loc_fusion::{
    ClientHandle, EngineConfig, ErrorCode, FusionEngine, FusionEngineHandle, PositionProvider,
    PositionSample, ProviderRequest, ProviderSet, Reply, ReplySink, ResponseTimeouts,
    StartFailure, NullFixStore,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub fn sample(latitude: f64, longitude: f64, horizontal_accuracy: f64) -> PositionSample {
    PositionSample {
        timestamp_millis: 1_700_000_000_000,
        latitude,
        longitude,
        altitude: 10.0,
        speed: 0.0,
        direction: 0.0,
        horizontal_accuracy,
        vertical_accuracy: 30.0,
    }
}

#[derive(Clone)]
pub struct ScriptedReply {
    pub delay: Duration,
    pub outcome: Result<PositionSample, ErrorCode>,
}

pub fn after(delay_ms: u64, outcome: Result<PositionSample, ErrorCode>) -> ScriptedReply {
    ScriptedReply {
        delay: Duration::from_millis(delay_ms),
        outcome,
    }
}

/// Provider driven by pre-scripted replies. Position scripts are consumed
/// one per request; the tracking script is replayed once per tracking start.
/// An empty script stays silent, which is how timeout paths are exercised.
#[derive(Default)]
pub struct ScriptedProvider {
    position_script: StdMutex<VecDeque<ScriptedReply>>,
    tracking_script: StdMutex<Vec<ScriptedReply>>,
    refuse_start: AtomicBool,
    start_count: AtomicUsize,
    stop_count: AtomicUsize,
    position_request_count: AtomicUsize,
}

impl ScriptedProvider {
    pub fn with_position_script(replies: Vec<ScriptedReply>) -> Arc<Self> {
        let provider = Self::default();
        provider
            .position_script
            .lock()
            .expect("lock position script")
            .extend(replies);
        Arc::new(provider)
    }

    pub fn with_tracking_script(replies: Vec<ScriptedReply>) -> Arc<Self> {
        let provider = Self::default();
        *provider
            .tracking_script
            .lock()
            .expect("lock tracking script") = replies;
        Arc::new(provider)
    }

    pub fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing_start() -> Arc<Self> {
        let provider = Self::default();
        provider.refuse_start.store(true, Ordering::Relaxed);
        Arc::new(provider)
    }

    pub fn starts(&self) -> usize {
        self.start_count.load(Ordering::Relaxed)
    }

    pub fn stops(&self) -> usize {
        self.stop_count.load(Ordering::Relaxed)
    }

    pub fn position_requests(&self) -> usize {
        self.position_request_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PositionProvider for ScriptedProvider {
    async fn start(&self) -> Result<(), StartFailure> {
        if self.refuse_start.load(Ordering::Relaxed) {
            return Err(StartFailure::Unavailable);
        }
        self.start_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::Relaxed);
    }

    async fn request_position(&self, request: ProviderRequest) {
        self.position_request_count.fetch_add(1, Ordering::Relaxed);
        let scripted = self
            .position_script
            .lock()
            .expect("lock position script")
            .pop_front();
        if let Some(reply) = scripted {
            tokio::spawn(async move {
                tokio::time::sleep(reply.delay).await;
                request.deliver(reply.outcome);
            });
        }
    }

    async fn request_tracking(&self, request: ProviderRequest) {
        let script = self
            .tracking_script
            .lock()
            .expect("lock tracking script")
            .clone();
        tokio::spawn(async move {
            for reply in script {
                tokio::time::sleep(reply.delay).await;
                request.deliver(reply.outcome);
            }
        });
    }
}

pub struct ChannelSink {
    deliveries: UnboundedSender<(ClientHandle, Reply)>,
}

#[async_trait]
impl ReplySink for ChannelSink {
    async fn deliver(&self, client: ClientHandle, reply: Reply) {
        let _ = self.deliveries.send((client, reply));
    }
}

pub struct EngineFixture {
    pub handle: FusionEngineHandle,
    pub replies: UnboundedReceiver<(ClientHandle, Reply)>,
}

/// Short deadlines so timeout behavior is observable in test time.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        response_timeouts: ResponseTimeouts {
            low: Duration::from_millis(200),
            medium: Duration::from_millis(400),
            high_with_high_accuracy: Duration::from_millis(600),
        },
        tracking_publish_interval: Duration::from_millis(100),
        tracking_min_accuracy_meters: 100.0,
    }
}

pub fn spawn_engine(
    gps: Arc<ScriptedProvider>,
    network: Arc<ScriptedProvider>,
    config: EngineConfig,
) -> EngineFixture {
    let (tx, rx) = mpsc::unbounded_channel();
    let providers = ProviderSet {
        gps,
        network,
        geocode: ScriptedProvider::silent(),
    };
    let (engine, handle) = FusionEngine::new(
        providers,
        Arc::new(NullFixStore),
        Arc::new(ChannelSink { deliveries: tx }),
        config,
    );
    tokio::spawn(engine.run());
    EngineFixture {
        handle,
        replies: rx,
    }
}

/// Receives the next reply for the given client, skipping replies addressed
/// to other clients, failing the test after one second.
pub async fn recv_for(
    replies: &mut UnboundedReceiver<(ClientHandle, Reply)>,
    client: ClientHandle,
) -> Reply {
    loop {
        let received = tokio::time::timeout(Duration::from_secs(1), replies.recv())
            .await
            .expect("reply within one second")
            .expect("reply channel open");
        if received.0 == client {
            return received.1;
        }
    }
}

/// Asserts silence on the reply channel for the given client over `window`.
pub async fn assert_no_reply_for(
    replies: &mut UnboundedReceiver<(ClientHandle, Reply)>,
    client: ClientHandle,
    window: Duration,
) {
    let outcome = tokio::time::timeout(window, async {
        loop {
            match replies.recv().await {
                Some((received_client, reply)) if received_client == client => {
                    break (received_client, reply)
                }
                Some(_) => continue,
                None => std::future::pending().await,
            }
        }
    })
    .await;
    assert!(
        outcome.is_err(),
        "unexpected reply for {client}: {:?}",
        outcome.unwrap().1
    );
}
