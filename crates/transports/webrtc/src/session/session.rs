//! Echo session: one per accepted signaling connection
//!
//! The session owns the sending half of the signaling channel, the peer, the
//! two local tracks and every relay spawned for a remote track. It consumes
//! the message queue in receipt order; each message is one [`Session::step`].

use crate::channels::{MessageQueue, QueueConsumer, QueueEvent};
use crate::config::RelayConfig;
use crate::media::{
    InboundTrack, LocalTrackPublisher, LocalTrackRequest, LocalTrackSlot, LocalTracks, MediaKind,
    RelayReport, TrackRelay,
};
use crate::peer::{FeedbackSink, MediaPeer};
use crate::session::state::NegotiationState;
use crate::signaling::{pump, MessageKind, MessageSink, MessageSource, SignalingMessage};
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Session identifier
pub type SessionId = String;

/// Result of handling one signaling message
#[derive(Debug)]
pub enum StepOutcome {
    /// Message handled
    Continue,
    /// Message failed without affecting the session
    Degraded(Error),
    /// Session must close
    Terminate(Error),
}

impl StepOutcome {
    /// Classify an error by [`Error::is_session_fatal`]
    pub fn from_error(error: Error) -> Self {
        if error.is_session_fatal() {
            StepOutcome::Terminate(error)
        } else {
            StepOutcome::Degraded(error)
        }
    }
}

/// Why a session closed
#[derive(Debug)]
pub enum CloseReason {
    /// Signaling connection closed by the peer
    EndOfStream,
    /// Fatal signaling or negotiation error
    Fatal(Error),
    /// `close()` called or the server is shutting down
    Requested,
}

/// Summary of a finished session
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub final_state: NegotiationState,

    /// Every state entered, starting with `New`
    pub transitions: Vec<NegotiationState>,

    pub close_reason: CloseReason,
    pub answers_sent: u64,
    pub candidates_applied: u64,
    pub candidates_rejected: u64,

    /// One report per relay that exited within the teardown grace period
    pub relays: Vec<RelayReport>,
}

/// Echo session over one signaling connection and one peer connection
pub struct Session<P: MediaPeer> {
    session_id: SessionId,
    config: RelayConfig,
    peer: Arc<P>,
    sink: Box<dyn MessageSink>,

    queue: QueueConsumer,
    receiver: Option<JoinHandle<Result<()>>>,
    remote_tracks: mpsc::Receiver<Arc<dyn InboundTrack>>,

    local_tracks: LocalTracks,
    publisher: Option<LocalTrackPublisher>,
    slot: LocalTrackSlot,

    relays: Vec<TrackRelay>,
    shutdown: broadcast::Sender<()>,

    state: NegotiationState,
    transitions: Vec<NegotiationState>,
    close_reason: Option<CloseReason>,
    answers_sent: u64,
    candidates_applied: u64,
    candidates_rejected: u64,
    relay_reports: Vec<RelayReport>,
}

impl<P: MediaPeer> Session<P> {
    /// Create the local tracks and start receiving signaling messages
    ///
    /// Both local tracks are added to `peer` before any message is read, so
    /// the first answer offers them. On failure the peer and the signaling
    /// connection are closed.
    #[instrument(skip_all)]
    pub async fn start<S, K>(
        peer: Arc<P>,
        remote_tracks: mpsc::Receiver<Arc<dyn InboundTrack>>,
        source: S,
        mut sink: K,
        config: RelayConfig,
    ) -> Result<Self>
    where
        S: MessageSource,
        K: MessageSink,
    {
        let session_id = uuid::Uuid::new_v4().to_string();
        info!("Starting session {}", session_id);

        let local_tracks = match create_local_tracks(peer.as_ref(), &config).await {
            Ok(tracks) => tracks,
            Err(e) => {
                error!("Session {} failed to start: {}", session_id, e);
                if let Err(close_err) = peer.close().await {
                    warn!("Error closing peer after failed start: {}", close_err);
                }
                if let Err(close_err) = sink.close().await {
                    debug!("Signaling close after failed start: {}", close_err);
                }
                return Err(e);
            }
        };
        debug!("Session {} local tracks: {:?}", session_id, local_tracks);

        let (publisher, slot) = LocalTrackSlot::new();
        let (producer, queue) = MessageQueue::bounded(config.message_queue_capacity);
        let receiver = tokio::spawn(pump(source, producer));
        let (shutdown, _) = broadcast::channel(1);

        Ok(Self {
            session_id,
            config,
            peer,
            sink: Box::new(sink),
            queue,
            receiver: Some(receiver),
            remote_tracks,
            local_tracks,
            publisher: Some(publisher),
            slot,
            relays: Vec::new(),
            shutdown,
            state: NegotiationState::New,
            transitions: vec![NegotiationState::New],
            close_reason: None,
            answers_sent: 0,
            candidates_applied: 0,
            candidates_rejected: 0,
            relay_reports: Vec::new(),
        })
    }

    /// Get the session ID
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get the current negotiation state
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Read side of the local-track slot shared with the relays
    pub fn local_track_slot(&self) -> &LocalTrackSlot {
        &self.slot
    }

    /// Run until the signaling connection ends or a fatal error occurs
    pub async fn run(self) -> SessionReport {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run until the session ends on its own or `shutdown` completes
    pub async fn run_until<F>(mut self, shutdown: F) -> SessionReport
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        let reason = loop {
            let outcome = tokio::select! {
                event = self.queue.recv() => match event {
                    QueueEvent::Message(message) => self.step(message).await,
                    QueueEvent::Drained => continue,
                    QueueEvent::Closed => break self.end_of_stream().await,
                },
                Some(track) = self.remote_tracks.recv() => {
                    self.spawn_relay(track);
                    StepOutcome::Continue
                }
                _ = &mut shutdown => {
                    info!("Session {} shutting down", self.session_id);
                    break CloseReason::Requested;
                }
            };

            match outcome {
                StepOutcome::Continue => {}
                StepOutcome::Degraded(e) => {
                    warn!("Session {}: {}", self.session_id, e);
                }
                StepOutcome::Terminate(e) => {
                    if e.is_signaling_error() {
                        error!("Session {} signaling link failed: {}", self.session_id, e);
                    } else {
                        error!("Session {} terminating: {}", self.session_id, e);
                    }
                    break CloseReason::Fatal(e);
                }
            }
        };

        self.teardown(reason).await;
        self.into_report()
    }

    /// Handle one signaling message
    pub async fn step(&mut self, message: SignalingMessage) -> StepOutcome {
        if self.state.is_closed() {
            return StepOutcome::Terminate(Error::ConnectionClosed);
        }

        debug!(
            "Session {} handling {} in state {}",
            self.session_id, message.kind, self.state
        );

        match message.kind {
            MessageKind::Offer => self.handle_offer(&message.payload).await,
            MessageKind::Candidate => self.handle_candidate(&message.payload).await,
            MessageKind::Answer => {
                warn!(
                    "Session {} ignoring answer from peer; this relay only answers",
                    self.session_id
                );
                StepOutcome::Continue
            }
        }
    }

    /// Close the session
    ///
    /// Returns `false` if it was already closed.
    pub async fn close(&mut self) -> bool {
        if self.state.is_closed() {
            return false;
        }
        self.teardown(CloseReason::Requested).await;
        true
    }

    /// Summarize the session; meaningful once closed
    pub fn into_report(mut self) -> SessionReport {
        SessionReport {
            session_id: std::mem::take(&mut self.session_id),
            final_state: self.state,
            transitions: std::mem::take(&mut self.transitions),
            close_reason: self.close_reason.take().unwrap_or(CloseReason::Requested),
            answers_sent: self.answers_sent,
            candidates_applied: self.candidates_applied,
            candidates_rejected: self.candidates_rejected,
            relays: std::mem::take(&mut self.relay_reports),
        }
    }

    /// Apply an offer and answer it
    ///
    /// Local tracks are published only on the first Connected. On a
    /// renegotiation they stay published, so forwarding continues while the
    /// new answer is produced.
    async fn handle_offer(&mut self, sdp: &str) -> StepOutcome {
        match self.state.on_offer() {
            Ok(next) => self.transition(next),
            Err(e) => return StepOutcome::Terminate(e),
        }

        if let Err(e) = self.peer.apply_remote_offer(sdp).await {
            return StepOutcome::Terminate(e);
        }
        match self.state.on_remote_applied() {
            Ok(next) => self.transition(next),
            Err(e) => return StepOutcome::Terminate(e),
        }

        let answer = match self.peer.create_local_answer().await {
            Ok(answer) => answer,
            Err(e) => return StepOutcome::Terminate(e),
        };

        if let Err(e) = self.sink.send(&SignalingMessage::answer(answer)).await {
            return StepOutcome::Terminate(e);
        }
        self.answers_sent += 1;

        match self.state.on_answer_sent() {
            Ok(next) => self.transition(next),
            Err(e) => return StepOutcome::Terminate(e),
        }

        if let Some(publisher) = self.publisher.take() {
            publisher.publish(self.local_tracks.clone());
            info!("Session {} local tracks published", self.session_id);
        }

        StepOutcome::Continue
    }

    async fn handle_candidate(&mut self, candidate: &str) -> StepOutcome {
        let result = if self.state.accepts_candidates() {
            self.peer.add_ice_candidate(candidate).await
        } else {
            Err(Error::Candidate(format!(
                "Candidate received in state {}",
                self.state
            )))
        };

        match result {
            Ok(()) => {
                self.candidates_applied += 1;
                StepOutcome::Continue
            }
            Err(e) => {
                self.candidates_rejected += 1;
                StepOutcome::from_error(e)
            }
        }
    }

    async fn end_of_stream(&mut self) -> CloseReason {
        let Some(receiver) = self.receiver.take() else {
            return CloseReason::EndOfStream;
        };

        match receiver.await {
            Ok(Err(Error::ConnectionClosed)) | Ok(Ok(())) => CloseReason::EndOfStream,
            Ok(Err(e)) => CloseReason::Fatal(e),
            Err(e) => CloseReason::Fatal(Error::Other(e.into())),
        }
    }

    fn spawn_relay(&mut self, track: Arc<dyn InboundTrack>) {
        let feedback: Arc<dyn FeedbackSink> = self.peer.clone();
        let relay = TrackRelay::spawn(
            track,
            self.slot.clone(),
            feedback,
            self.config.pli_interval(),
            &self.shutdown,
        );
        let active = self.relays.iter().filter(|r| !r.is_finished()).count() + 1;
        debug!(
            "Session {} relaying remote ssrc={} ({} active)",
            self.session_id,
            relay.remote_ssrc(),
            active
        );
        self.relays.push(relay);
    }

    fn transition(&mut self, next: NegotiationState) {
        if next != self.state {
            debug!(
                "Session {} state transition: {} -> {}",
                self.session_id, self.state, next
            );
            self.state = next;
            self.transitions.push(next);
        }
    }

    async fn teardown(&mut self, reason: CloseReason) {
        if self.state.is_closed() {
            return;
        }
        info!("Closing session {}: {:?}", self.session_id, reason);
        self.transition(NegotiationState::Closed);
        self.close_reason = Some(reason);

        // No receivers means no relay was ever spawned
        let _ = self.shutdown.send(());

        let grace = self.config.teardown_grace();
        for relay in self.relays.drain(..) {
            let remote_ssrc = relay.remote_ssrc();
            match relay.join(grace).await {
                Some(report) => self.relay_reports.push(report),
                None => warn!(
                    "Session {} lost the report of relay ssrc={}",
                    self.session_id, remote_ssrc
                ),
            }
        }

        if let Err(e) = self.peer.close().await {
            warn!("Error closing peer for session {}: {}", self.session_id, e);
        }
        if let Err(e) = self.sink.close().await {
            debug!("Signaling close for session {}: {}", self.session_id, e);
        }

        self.queue.close();
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
        self.remote_tracks.close();

        info!(
            "Session {} closed: answers_sent={} candidates_applied={} candidates_rejected={} relays={}",
            self.session_id,
            self.answers_sent,
            self.candidates_applied,
            self.candidates_rejected,
            self.relay_reports.len()
        );
    }
}

async fn create_local_tracks<P: MediaPeer>(peer: &P, config: &RelayConfig) -> Result<LocalTracks> {
    let video = peer
        .add_local_track(LocalTrackRequest {
            kind: MediaKind::Video,
            payload_type: config.video_payload_type,
            stream_id: config.stream_id.clone(),
        })
        .await?;
    let audio = peer
        .add_local_track(LocalTrackRequest {
            kind: MediaKind::Audio,
            payload_type: config.audio_payload_type,
            stream_id: config.stream_id.clone(),
        })
        .await?;

    LocalTracks::new(video, audio)
}

impl<P: MediaPeer> Drop for Session<P> {
    fn drop(&mut self) {
        if self.state.is_closed() {
            return;
        }
        warn!(
            "Session {} dropped in state {} without closing",
            self.session_id, self.state
        );

        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
        for relay in self.relays.drain(..) {
            relay.abort();
        }

        let session_id = std::mem::take(&mut self.session_id);
        let peer = Arc::clone(&self.peer);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = peer.close().await {
                        warn!("Error closing peer for dropped session {}: {}", session_id, e);
                    }
                });
            }
            Err(_) => warn!(
                "No runtime to close the peer of dropped session {}",
                session_id
            ),
        }
    }
}
