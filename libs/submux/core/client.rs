//! Connection lifecycle manager
//!
//! [`SubscriptionClient`] is the consumer facade; the real work happens in a
//! single spawned lifecycle task that owns the physical connection and walks
//! the state machine:
//!
//! ```text
//! Connecting ──ok──> Handshaking ──ack──> Ready ──failure──> Draining
//!     ^                  │ timeout/reject                        │
//!     │                  v                                       v
//!     └───────────── BackoffWait <───────────────────────────────┘
//! ```
//!
//! With no registered subscriptions the task sits Idle and holds no
//! connection; the first registration creates the demand that starts it.
//!
//! `Closed` is terminal and only reached on explicit shutdown, an exhausted
//! reconnect policy, or futile credential rejections.
//!
//! On every successful handshake the registry's generation is bumped and a
//! Subscribe frame is replayed for every registered request, in insertion
//! order, before any inbound frame of the new generation is processed. The
//! consumer never re-issues anything.

use crate::core::config::ClientConfig;
use crate::core::dispatcher::Dispatcher;
use crate::core::handle::SubscriptionHandle;
use crate::core::link_state::{AtomicLinkState, AtomicMetrics, LinkState, MetricsSnapshot};
use crate::core::liveness::Liveness;
use crate::core::registry::{SubscriptionRegistry, SubscriptionRequest};
use crate::protocol::frame::{self, ClientFrame, ServerFrame, SubscribePayload};
use crate::traits::{FrameSink, FrameStream, Result, SubMuxError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Internal commands nudging the lifecycle task.
#[derive(Debug)]
pub(crate) enum Command {
    /// A request was added; subscribe it now if Ready.
    Subscribe { key: String },
    /// A request was canceled while active; unsubscribe it on the wire.
    Unsubscribe { wire_id: String },
    /// Graceful shutdown.
    Shutdown,
}

/// Multiplexing client for a GraphQL-over-WebSocket subscription transport.
///
/// One physical connection carries any number of logical subscriptions.
/// Registrations survive reconnects: after every successful handshake the
/// client re-subscribes everything on its own.
pub struct SubscriptionClient {
    registry: Arc<SubscriptionRegistry>,
    state: Arc<AtomicLinkState>,
    metrics: Arc<AtomicMetrics>,
    command_tx: mpsc::UnboundedSender<Command>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    key_seq: AtomicU64,
    queue_capacity: usize,
    shutdown_grace: Duration,
}

impl SubscriptionClient {
    /// Start building a client. The URL is the only required field.
    pub fn builder() -> crate::core::builder::SubMuxBuilder<crate::core::builder::states::NoUrl> {
        crate::core::builder::SubMuxBuilder::new()
    }

    /// Spawn the lifecycle task. Called by the builder's `build()`.
    pub(crate) fn spawn(config: ClientConfig) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let state = Arc::new(AtomicLinkState::new(LinkState::Idle));
        let metrics = Arc::new(AtomicMetrics::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let queue_capacity = config.queue_capacity;
        let shutdown_grace = config.shutdown_grace;

        let task = {
            let registry = Arc::clone(&registry);
            let state = Arc::clone(&state);
            let metrics = Arc::clone(&metrics);
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move {
                run_lifecycle(config, registry, state, metrics, command_rx, shutdown).await;
            })
        };

        Self {
            registry,
            state,
            metrics,
            command_tx,
            task: Some(task),
            shutdown,
            key_seq: AtomicU64::new(0),
            queue_capacity,
            shutdown_grace,
        }
    }

    /// Register a subscription under an auto-assigned key.
    pub fn subscribe(
        &self,
        query: impl Into<String>,
        variables: Option<Value>,
    ) -> Result<SubscriptionHandle> {
        let n = self.key_seq.fetch_add(1, Ordering::Relaxed);
        self.subscribe_with_key(format!("sub-{n}"), query, variables)
    }

    /// Register a subscription under a caller-chosen stable key.
    ///
    /// Works in any connection state: if the connection is not Ready yet the
    /// request is picked up by the replay on the next successful handshake.
    pub fn subscribe_with_key(
        &self,
        key: impl Into<String>,
        query: impl Into<String>,
        variables: Option<Value>,
    ) -> Result<SubscriptionHandle> {
        if self.shutdown.load(Ordering::Acquire) || self.state.is_closed() {
            return Err(SubMuxError::Shutdown);
        }
        let request = SubscriptionRequest {
            key: key.into(),
            query: query.into(),
            variables,
        };
        let key = request.key.clone();
        let queue = self.registry.add(request, self.queue_capacity)?;
        debug!(key = %key, "subscription registered");
        // Failure means the lifecycle task already exited; the registry entry
        // is then cleaned up by close_all and the handle just yields None.
        let _ = self.command_tx.send(Command::Subscribe { key: key.clone() });
        Ok(SubscriptionHandle::new(
            key,
            queue,
            Arc::clone(&self.registry),
            self.command_tx.clone(),
        ))
    }

    /// Current state of the physical connection.
    pub fn link_state(&self) -> LinkState {
        self.state.get()
    }

    /// Snapshot of the engine counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Number of currently registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// Terminate every subscription and close the connection.
    ///
    /// Best-effort unsubscribe/Bye frames are sent under the configured
    /// grace period; an unresponsive connection is then dropped forcibly.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down subscription client");
        self.shutdown.store(true, Ordering::Release);
        let _ = self.command_tx.send(Command::Shutdown);

        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            // Grace for the wire goodbye plus headroom for the task itself.
            if tokio::time::timeout(self.shutdown_grace + Duration::from_secs(2), task)
                .await
                .is_err()
            {
                warn!("lifecycle task unresponsive, aborting it");
                abort.abort();
            }
        }

        self.registry.close_all();
        self.state.set(LinkState::Closed);
        info!("subscription client shut down");
        Ok(())
    }
}

enum ReadyExit {
    Shutdown,
    ConnectionLost,
}

enum HandshakeFailure {
    /// The server actively refused us after ConnectionInit.
    Rejected(String),
    /// Transport or protocol trouble; plain reconnect material.
    Broken(SubMuxError),
}

async fn run_lifecycle(
    config: ClientConfig,
    registry: Arc<SubscriptionRegistry>,
    state: Arc<AtomicLinkState>,
    metrics: Arc<AtomicMetrics>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    shutdown: Arc<AtomicBool>,
) {
    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&metrics),
        config.delivery_policy,
    );
    // Consecutive failures feeding the backoff policy.
    let mut attempt: usize = 0;
    // Consecutive handshake rejections; reset by any accepted handshake.
    let mut rejections: u32 = 0;

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        // No desired subscriptions means no connection: sit Idle until a
        // registration creates demand.
        if registry.is_empty() {
            state.set(LinkState::Idle);
            debug!("no subscriptions registered, holding no connection");
            match command_rx.recv().await {
                Some(Command::Subscribe { .. }) => {}
                Some(Command::Unsubscribe { .. }) => continue,
                Some(Command::Shutdown) | None => break,
            }
        }

        state.set(LinkState::Connecting);
        debug!("connecting to {}", config.url);
        let (mut sink, mut stream) = match config.transport.connect(&config.url, &config.headers).await
        {
            Ok(pair) => pair,
            Err(e) => {
                warn!("connect failed: {e}");
                if !backoff_wait(&config, attempt, &state, &mut command_rx, &shutdown).await {
                    break;
                }
                attempt += 1;
                continue;
            }
        };

        state.set(LinkState::Handshaking);
        match handshake(&config, sink.as_mut(), stream.as_mut(), &metrics).await {
            Ok(()) => rejections = 0,
            Err(HandshakeFailure::Rejected(reason)) => {
                rejections += 1;
                warn!("handshake rejected ({rejections} consecutive): {reason}");
                sink.close().await;
                if rejections >= config.max_handshake_rejections {
                    error!("{}", SubMuxError::AuthRejected { rejections });
                    registry.fail_all(json!({
                        "message": "authentication rejected by the server",
                        "rejections": rejections,
                    }));
                    state.set(LinkState::Closed);
                    return;
                }
                if !backoff_wait(&config, attempt, &state, &mut command_rx, &shutdown).await {
                    break;
                }
                attempt += 1;
                continue;
            }
            Err(HandshakeFailure::Broken(e)) => {
                warn!("handshake failed: {e}");
                sink.close().await;
                if !backoff_wait(&config, attempt, &state, &mut command_rx, &shutdown).await {
                    break;
                }
                attempt += 1;
                continue;
            }
        }

        // Handshake accepted: new generation, replay every registered request
        // before touching any inbound frame.
        let generation = registry.begin_generation();
        if generation > 1 {
            metrics.increment_reconnects();
        }
        let requests = registry.snapshot();
        info!(
            generation,
            "connection ready, replaying {} subscription(s)",
            requests.len()
        );
        let mut broken = false;
        for request in requests {
            // activate() skips keys canceled since the snapshot.
            if let Some((wire_id, request)) = registry.activate(&request.key) {
                if let Err(e) = send_subscribe(sink.as_mut(), &wire_id, &request, &metrics).await {
                    warn!("subscribe replay failed for '{}': {e}", request.key);
                    broken = true;
                    break;
                }
            }
        }
        if broken {
            state.set(LinkState::Draining);
            registry.drop_generation();
            sink.close().await;
            if !backoff_wait(&config, attempt, &state, &mut command_rx, &shutdown).await {
                break;
            }
            attempt += 1;
            continue;
        }

        state.set(LinkState::Ready);
        let ready_at = Instant::now();
        let exit = ready_loop(
            &config,
            &registry,
            &metrics,
            &dispatcher,
            sink.as_mut(),
            stream.as_mut(),
            &mut command_rx,
            &shutdown,
        )
        .await;

        state.set(LinkState::Draining);
        registry.drop_generation();
        sink.close().await;

        match exit {
            ReadyExit::Shutdown => break,
            ReadyExit::ConnectionLost => {
                // A stable run earns a fresh backoff schedule, restarting at
                // the base delay rather than reconnecting immediately.
                attempt = if ready_at.elapsed() >= config.stability_threshold {
                    1
                } else {
                    attempt + 1
                };
                if !backoff_wait(&config, attempt - 1, &state, &mut command_rx, &shutdown).await {
                    break;
                }
            }
        }
    }

    state.set(LinkState::Closed);
    registry.close_all();
    info!("lifecycle task exiting");
}

/// Wait out the backoff delay. Returns `false` when the lifecycle should
/// stop instead of reconnecting (policy exhausted or shutdown requested).
async fn backoff_wait(
    config: &ClientConfig,
    attempt: usize,
    state: &AtomicLinkState,
    command_rx: &mut mpsc::UnboundedReceiver<Command>,
    shutdown: &AtomicBool,
) -> bool {
    if shutdown.load(Ordering::Acquire) {
        return false;
    }
    let Some(delay) = config.reconnect.next_delay(attempt) else {
        warn!("reconnect policy exhausted after {} attempt(s)", attempt);
        return false;
    };

    state.set(LinkState::BackoffWait);
    info!("reconnecting in {:?} (attempt {})", delay, attempt + 1);
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = command_rx.recv() => match cmd {
                Some(Command::Shutdown) | None => return false,
                // Nothing is on the wire while disconnected; the post-ack
                // replay covers adds, and cancels already left the registry.
                Some(Command::Subscribe { .. }) | Some(Command::Unsubscribe { .. }) => {}
            },
        }
    }
}

/// Send ConnectionInit and await ConnectionAck under the handshake timeout.
async fn handshake(
    config: &ClientConfig,
    sink: &mut dyn FrameSink,
    stream: &mut dyn FrameStream,
    metrics: &AtomicMetrics,
) -> std::result::Result<(), HandshakeFailure> {
    let payload = match config.token.current_token().await {
        Some(token) => json!({ "Authorization": format!("Bearer {token}") }),
        None => json!({}),
    };
    send_frame(sink, &ClientFrame::ConnectionInit { payload }, metrics)
        .await
        .map_err(HandshakeFailure::Broken)?;

    let wait_for_ack = async {
        loop {
            let raw = match stream.next_frame().await {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => return Err(HandshakeFailure::Broken(e)),
                None => {
                    return Err(HandshakeFailure::Rejected(
                        "connection closed before connection_ack".into(),
                    ))
                }
            };
            metrics.increment_frames_received();
            match frame::decode(&raw) {
                Ok(ServerFrame::ConnectionAck) => return Ok(()),
                Ok(ServerFrame::Ping) => {
                    send_frame(sink, &ClientFrame::Pong, metrics)
                        .await
                        .map_err(HandshakeFailure::Broken)?;
                }
                Ok(ServerFrame::Bye) => {
                    return Err(HandshakeFailure::Rejected(
                        "server sent bye during handshake".into(),
                    ))
                }
                Ok(other) => {
                    return Err(HandshakeFailure::Rejected(format!(
                        "unexpected frame before connection_ack: {other:?}"
                    )))
                }
                Err(e) => return Err(HandshakeFailure::Broken(e.into())),
            }
        }
    };

    match tokio::time::timeout(config.handshake_timeout, wait_for_ack).await {
        Ok(result) => result,
        Err(_) => Err(HandshakeFailure::Broken(SubMuxError::HandshakeTimeout(
            config.handshake_timeout,
        ))),
    }
}

/// Steady state: route inbound frames, honor registry changes, keep-alive.
#[allow(clippy::too_many_arguments)]
async fn ready_loop(
    config: &ClientConfig,
    registry: &SubscriptionRegistry,
    metrics: &AtomicMetrics,
    dispatcher: &Dispatcher,
    sink: &mut dyn FrameSink,
    stream: &mut dyn FrameStream,
    command_rx: &mut mpsc::UnboundedReceiver<Command>,
    shutdown: &AtomicBool,
) -> ReadyExit {
    let keepalive = config.keepalive;
    let liveness = keepalive.map(|k| Liveness::new(k.timeout));
    let mut ticker = tokio::time::interval(
        keepalive
            .map(|k| k.interval)
            .unwrap_or(Duration::from_secs(3600)),
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Skip the immediate first tick.
    ticker.tick().await;

    loop {
        if shutdown.load(Ordering::Acquire) {
            graceful_close(config, registry, sink, metrics).await;
            return ReadyExit::Shutdown;
        }

        tokio::select! {
            inbound = stream.next_frame() => match inbound {
                Some(Ok(raw)) => {
                    metrics.increment_frames_received();
                    match frame::decode(&raw) {
                        Ok(ServerFrame::Next { id, payload }) => {
                            dispatcher.dispatch_next(&id, payload).await;
                        }
                        Ok(ServerFrame::Error { id, payload }) => {
                            dispatcher.dispatch_error(&id, payload);
                        }
                        Ok(ServerFrame::Complete { id }) => {
                            dispatcher.dispatch_complete(&id);
                        }
                        Ok(ServerFrame::Ping) => {
                            if send_frame(sink, &ClientFrame::Pong, metrics).await.is_err() {
                                return ReadyExit::ConnectionLost;
                            }
                        }
                        Ok(ServerFrame::Pong) => {
                            if let Some(liveness) = &liveness {
                                liveness.mark_pong();
                            }
                        }
                        Ok(ServerFrame::ConnectionAck) => {
                            debug!("ignoring duplicate connection_ack");
                        }
                        Ok(ServerFrame::Bye) => {
                            warn!("server announced connection close");
                            return ReadyExit::ConnectionLost;
                        }
                        Err(e) => {
                            error!("protocol violation, recycling connection: {e}");
                            return ReadyExit::ConnectionLost;
                        }
                    }
                }
                Some(Err(e)) => {
                    error!("transport read error: {e}");
                    return ReadyExit::ConnectionLost;
                }
                None => {
                    warn!("server closed the connection");
                    return ReadyExit::ConnectionLost;
                }
            },

            cmd = command_rx.recv() => match cmd {
                Some(Command::Subscribe { key }) => {
                    // May already be active if the post-ack replay got there
                    // first; activate() guarantees one frame per generation.
                    if let Some((wire_id, request)) = registry.activate(&key) {
                        if send_subscribe(sink, &wire_id, &request, metrics).await.is_err() {
                            return ReadyExit::ConnectionLost;
                        }
                    }
                }
                Some(Command::Unsubscribe { wire_id }) => {
                    // Only unsubscribe ids minted on this generation; stale
                    // ones died with their connection.
                    if SubscriptionRegistry::wire_generation(&wire_id)
                        == Some(registry.generation())
                    {
                        debug!(wire_id, "unsubscribing");
                        if send_frame(sink, &ClientFrame::Complete { id: wire_id }, metrics)
                            .await
                            .is_err()
                        {
                            return ReadyExit::ConnectionLost;
                        }
                    }
                }
                Some(Command::Shutdown) | None => {
                    graceful_close(config, registry, sink, metrics).await;
                    return ReadyExit::Shutdown;
                }
            },

            _ = ticker.tick(), if keepalive.is_some() => {
                if let Some(liveness) = &liveness {
                    if !liveness.is_live() {
                        warn!("keep-alive pong overdue, declaring connection dead");
                        return ReadyExit::ConnectionLost;
                    }
                    if send_frame(sink, &ClientFrame::Ping, metrics).await.is_err() {
                        return ReadyExit::ConnectionLost;
                    }
                    liveness.mark_ping();
                }
            }
        }
    }
}

/// Best-effort goodbye: Complete per active subscription, then Bye, bounded
/// by the shutdown grace period.
async fn graceful_close(
    config: &ClientConfig,
    registry: &SubscriptionRegistry,
    sink: &mut dyn FrameSink,
    metrics: &AtomicMetrics,
) {
    let wire_ids = registry.active_wire_ids();
    let goodbye = async {
        for id in wire_ids {
            if send_frame(sink, &ClientFrame::Complete { id }, metrics)
                .await
                .is_err()
            {
                return;
            }
        }
        let _ = send_frame(sink, &ClientFrame::Bye, metrics).await;
        sink.close().await;
    };
    if tokio::time::timeout(config.shutdown_grace, goodbye)
        .await
        .is_err()
    {
        warn!("graceful close timed out, dropping the connection");
    }
}

async fn send_frame(
    sink: &mut dyn FrameSink,
    frame: &ClientFrame,
    metrics: &AtomicMetrics,
) -> Result<()> {
    let wire = frame::encode(frame)?;
    sink.send(wire).await?;
    metrics.increment_frames_sent();
    Ok(())
}

async fn send_subscribe(
    sink: &mut dyn FrameSink,
    wire_id: &str,
    request: &SubscriptionRequest,
    metrics: &AtomicMetrics,
) -> Result<()> {
    debug!(key = %request.key, wire_id, "subscribing");
    send_frame(
        sink,
        &ClientFrame::Subscribe {
            id: wire_id.to_string(),
            payload: SubscribePayload {
                query: request.query.clone(),
                variables: request.variables.clone(),
            },
        },
        metrics,
    )
    .await
}
