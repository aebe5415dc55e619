pub mod dispatcher;
pub mod events;
pub mod heartbeat;
pub mod reconnect;
pub mod session;
pub mod transport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Sleep};
use tracing::{debug, info, trace, warn};

use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::error::ClientError;
use crate::interpreter::FunctionRegistry;
use crate::rest::RestClient;
use dispatcher::{DispatchRouter, RouteOutcome};
use events::{close_code, ControlFrame, DispatchEvent, GatewayFrame};
use heartbeat::{HeartbeatScheduler, MAX_MISSED_ACKS};
use reconnect::ReconnectPolicy;
use session::SessionState;
use transport::{FrameSink, FrameStream, Transport, TransportEvent};

/// Pause before dialing again when the gateway asked us to reconnect.
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);
/// Pause before re-identifying after the session was invalidated.
const REIDENTIFY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected,
    Connecting,
    AwaitingHello,
    Identifying,
    Resuming,
    Connected,
}

/// How one connection's lifetime ended.
enum SessionEnd {
    /// Shutdown was requested; close cleanly and stop.
    Shutdown,
    /// The gateway closed with a terminal code; do not reconnect.
    Terminal { code: u16 },
    /// The gateway asked us to reconnect and resume.
    Reconnect,
    /// Connection lost: non-terminal close, transport failure, or heartbeat
    /// acks stopped. Reconnect per policy.
    Lost,
}

/// The gateway session client: owns the connection lifecycle, the handshake,
/// heartbeats, sequence tracking, and reconnects.
///
/// All session state is driven from one event loop: inbound frames, heartbeat
/// ticks, deferred re-identifies, and shutdown are arms of a single
/// `tokio::select!`, so frames are processed one at a time and the loop is the
/// only writer to the transport.
pub struct Client {
    config: Config,
    session: SessionState,
    heartbeat: HeartbeatScheduler,
    policy: ReconnectPolicy,
    router: DispatchRouter,
    phase: Phase,
    resume_retried: bool,
}

impl Client {
    pub fn new(
        config: Config,
        commands: Arc<CommandRegistry>,
        functions: FunctionRegistry,
    ) -> Self {
        let rest = RestClient::new(config.api_url.clone(), config.token.clone());
        let router = DispatchRouter::new(
            commands,
            Arc::new(functions),
            rest,
            config.prefix.clone(),
        );
        Self {
            config,
            session: SessionState::default(),
            heartbeat: HeartbeatScheduler::new(),
            policy: ReconnectPolicy::new(),
            router,
            phase: Phase::Disconnected,
            resume_retried: false,
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the session until the gateway ends it for good, the reconnect
    /// budget is exhausted, or `shutdown` resolves. Shutdown cancels any
    /// pending timer or deferred attempt and closes the transport with a
    /// terminal code, so no reconnect fires afterwards.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ClientError> {
        tokio::pin!(shutdown);

        loop {
            self.set_phase(Phase::Connecting);
            info!(url = %self.config.gateway_url, "connecting to gateway");

            let opened = tokio::select! {
                opened = Transport::open(&self.config.gateway_url) => opened,
                _ = shutdown.as_mut() => return Ok(()),
            };

            let (mut sink, mut stream) = match opened {
                Ok(transport) => transport.into_split(),
                Err(e) => {
                    warn!("{e}");
                    if self.backoff(shutdown.as_mut()).await? {
                        return Ok(());
                    }
                    continue;
                }
            };

            self.set_phase(Phase::AwaitingHello);
            self.resume_retried = false;

            let end = self.drive(&mut sink, &mut stream, shutdown.as_mut()).await;

            // The old connection is fully torn down, heartbeat included,
            // before a new one may open.
            self.heartbeat.stop();
            self.set_phase(Phase::Disconnected);

            match end {
                SessionEnd::Shutdown => {
                    sink.close(close_code::NORMAL, "client shutting down").await;
                    info!("gateway client stopped");
                    return Ok(());
                }
                SessionEnd::Terminal { code } => {
                    info!(code, "gateway ended the session");
                    return Ok(());
                }
                SessionEnd::Reconnect => {
                    sink.close(close_code::RESUMABLE, "reconnect requested").await;
                    tokio::select! {
                        _ = sleep(RECONNECT_PAUSE) => {}
                        _ = shutdown.as_mut() => return Ok(()),
                    }
                }
                SessionEnd::Lost => {
                    sink.close(close_code::RESUMABLE, "connection lost").await;
                    if self.backoff(shutdown.as_mut()).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleep out the policy delay before the next attempt. `Ok(true)` means
    /// shutdown fired during the wait.
    async fn backoff<F: Future<Output = ()>>(
        &mut self,
        mut shutdown: Pin<&mut F>,
    ) -> Result<bool, ClientError> {
        let attempt = self.policy.record_failure();
        if !self.policy.should_retry(attempt) {
            return Err(ClientError::ReconnectExhausted { attempts: attempt });
        }

        let delay = self.policy.delay_for(attempt);
        info!(
            attempt,
            max = reconnect::MAX_ATTEMPTS,
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );
        tokio::select! {
            _ = sleep(delay) => Ok(false),
            _ = &mut shutdown => Ok(true),
        }
    }

    /// Process one connection until it ends.
    async fn drive<F: Future<Output = ()>>(
        &mut self,
        sink: &mut FrameSink,
        stream: &mut FrameStream,
        mut shutdown: Pin<&mut F>,
    ) -> SessionEnd {
        // Deferred re-identify, armed by an invalid session. Dropped (and so
        // cancelled) whenever this connection ends.
        let mut reidentify: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => return SessionEnd::Shutdown,

                _ = self.heartbeat.tick() => {
                    let missed = self.heartbeat.note_sent();
                    if missed >= MAX_MISSED_ACKS {
                        warn!(missed, "heartbeat acks stopped arriving, treating connection as dead");
                        return SessionEnd::Lost;
                    }
                    let frame = GatewayFrame::heartbeat(self.session.last_sequence());
                    if sink.send_frame(&frame).await.is_err() {
                        return SessionEnd::Lost;
                    }
                    trace!(seq = ?self.session.last_sequence(), "heartbeat sent");
                }

                _ = async {
                    match reidentify.as_mut() {
                        Some(delay) => delay.as_mut().await,
                        None => std::future::pending().await,
                    }
                } => {
                    reidentify = None;
                    if self.send_identify(sink).await.is_err() {
                        return SessionEnd::Lost;
                    }
                }

                event = stream.next_event() => match event {
                    Some(TransportEvent::Frame(frame)) => {
                        if let Some(end) = self.handle_frame(sink, frame, &mut reidentify).await {
                            return end;
                        }
                    }
                    Some(TransportEvent::Closed { code, reason }) => {
                        info!(?code, %reason, "gateway connection closed");
                        return match code {
                            Some(code) if close_code::is_terminal(code) => {
                                SessionEnd::Terminal { code }
                            }
                            _ => SessionEnd::Lost,
                        };
                    }
                    None => return SessionEnd::Lost,
                }
            }
        }
    }

    async fn handle_frame(
        &mut self,
        sink: &mut FrameSink,
        frame: GatewayFrame,
        reidentify: &mut Option<Pin<Box<Sleep>>>,
    ) -> Option<SessionEnd> {
        // Sequence bookkeeping comes first and applies to every frame that
        // carries one, whatever the opcode.
        if let Some(seq) = frame.s {
            self.session.observe_sequence(seq);
        }

        let control = match ControlFrame::decode(frame) {
            Ok(control) => control,
            Err(e) => {
                warn!("{e}");
                return None;
            }
        };

        match control {
            ControlFrame::Hello(hello) => {
                debug!(interval_ms = hello.heartbeat_interval, "hello received");
                self.heartbeat
                    .start(Duration::from_millis(hello.heartbeat_interval));
                // Resume whenever session state survived the disconnect; it
                // skips the full initial event burst.
                let sent = if self.session.resume_target().is_some() {
                    self.send_resume(sink).await
                } else {
                    self.send_identify(sink).await
                };
                if sent.is_err() {
                    return Some(SessionEnd::Lost);
                }
            }
            ControlFrame::HeartbeatAck => {
                self.heartbeat.record_ack();
                trace!("heartbeat acknowledged");
            }
            ControlFrame::Reconnect => {
                info!("gateway requested reconnect");
                return Some(SessionEnd::Reconnect);
            }
            ControlFrame::InvalidSession { resumable } => {
                if resumable && !self.resume_retried && self.session.resume_target().is_some() {
                    // One resume retry per connection; a second rejection
                    // falls through to a fresh identify.
                    self.resume_retried = true;
                    info!("session invalidated but resumable, retrying resume");
                    if self.send_resume(sink).await.is_err() {
                        return Some(SessionEnd::Lost);
                    }
                } else {
                    info!("session invalidated, re-identifying");
                    self.session.clear();
                    *reidentify = Some(Box::pin(sleep(REIDENTIFY_DELAY)));
                }
            }
            ControlFrame::Dispatch(event) => self.handle_dispatch(event),
            ControlFrame::Unknown(op) => {
                trace!(op, "ignoring unknown opcode");
            }
        }

        None
    }

    fn handle_dispatch(&mut self, event: DispatchEvent) {
        let completes_handshake =
            matches!(event, DispatchEvent::Ready(_) | DispatchEvent::Resumed);
        if self.phase != Phase::Connected && !completes_handshake {
            // Application events are only forwarded once the handshake is
            // complete; their sequence numbers were already recorded.
            debug!("dropping dispatch event received before the session is ready");
            return;
        }

        match self.router.route(event) {
            RouteOutcome::SessionReady { session_id } => {
                info!(%session_id, "session ready");
                self.session.set_session_id(session_id);
                self.connected();
            }
            RouteOutcome::SessionResumed => {
                info!("session resumed");
                self.connected();
            }
            RouteOutcome::Handled => {}
        }
    }

    fn connected(&mut self) {
        self.set_phase(Phase::Connected);
        self.resume_retried = false;
        self.policy.reset();
    }

    async fn send_identify(&mut self, sink: &mut FrameSink) -> Result<(), ClientError> {
        self.set_phase(Phase::Identifying);
        debug!("identifying");
        sink.send_frame(&GatewayFrame::identify(&self.config.token))
            .await
    }

    async fn send_resume(&mut self, sink: &mut FrameSink) -> Result<(), ClientError> {
        let frame = match self.session.resume_target() {
            Some((session_id, seq)) => {
                debug!(session_id, seq, "resuming session");
                GatewayFrame::resume(&self.config.token, session_id, seq)
            }
            None => return self.send_identify(sink).await,
        };
        self.set_phase(Phase::Resuming);
        sink.send_frame(&frame).await
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            trace!(from = ?self.phase, to = ?phase, "phase transition");
            self.phase = phase;
        }
    }
}
