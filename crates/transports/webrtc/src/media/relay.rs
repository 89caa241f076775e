//! Per-track echo relay
//!
//! Every remote track gets two tasks:
//!
//! - a forwarding loop that reads packets, routes them by payload type to a
//!   local track and writes them with the local track's ssrc
//! - a feedback loop that asks the sender for a keyframe every PLI interval
//!
//! Packets read before the local tracks are published are dropped. The
//! feedback loop ends together with its forwarding loop.

use crate::media::tracks::{InboundTrack, LocalTrackSlot, LocalTracks, OutboundTrack, RtpPacket};
use crate::peer::FeedbackSink;
use crate::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Where a packet goes
pub enum Route {
    /// Write to this track; the packet ssrc has already been rewritten
    Forward(Arc<dyn OutboundTrack>),
    /// Local tracks not published yet
    NotReady,
    /// Payload type matches neither local track
    Unroutable,
}

/// Pick the destination track for `packet` and rewrite its ssrc
///
/// The packet is left untouched unless the result is [`Route::Forward`].
/// Payload, sequence number and timestamp are never modified.
pub fn route_packet(tracks: Option<&LocalTracks>, packet: &mut RtpPacket) -> Route {
    let Some(tracks) = tracks else {
        return Route::NotReady;
    };

    match tracks.route(packet.header.payload_type) {
        Some(track) => {
            packet.header.ssrc = track.descriptor().ssrc;
            Route::Forward(Arc::clone(track))
        }
        None => Route::Unroutable,
    }
}

/// Why a forwarding loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayExit {
    /// Reading from the remote track failed (track or connection gone)
    TrackEnded,
    /// Writing to a local track failed
    WriteFailed(String),
    /// Session teardown
    Shutdown,
}

/// Counters reported by a forwarding loop when it exits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub remote_ssrc: u32,
    pub forwarded: u64,
    pub dropped_not_ready: u64,
    pub dropped_unroutable: u64,
    pub exit: RelayExit,
}

impl RelayReport {
    fn new(remote_ssrc: u32) -> Self {
        Self {
            remote_ssrc,
            forwarded: 0,
            dropped_not_ready: 0,
            dropped_unroutable: 0,
            exit: RelayExit::TrackEnded,
        }
    }
}

/// Handles of the two tasks serving one remote track
pub struct TrackRelay {
    remote_ssrc: u32,
    forward: JoinHandle<RelayReport>,
    feedback: JoinHandle<()>,
}

impl TrackRelay {
    /// Start forwarding and feedback for `remote`
    ///
    /// Both tasks subscribe to `shutdown` before this returns, so a shutdown
    /// sent afterwards always reaches them.
    pub fn spawn(
        remote: Arc<dyn InboundTrack>,
        slot: LocalTrackSlot,
        feedback: Arc<dyn FeedbackSink>,
        pli_interval: Duration,
        shutdown: &broadcast::Sender<()>,
    ) -> Self {
        let remote_ssrc = remote.ssrc();
        let (done_tx, done_rx) = oneshot::channel();

        info!(
            "Starting relay for remote track ssrc={} kind={:?}",
            remote_ssrc,
            remote.kind()
        );

        let forward = tokio::spawn(forward_loop(remote, slot, shutdown.subscribe(), done_tx));
        let feedback = tokio::spawn(feedback_loop(
            remote_ssrc,
            feedback,
            pli_interval,
            shutdown.subscribe(),
            done_rx,
        ));

        Self {
            remote_ssrc,
            forward,
            feedback,
        }
    }

    pub fn remote_ssrc(&self) -> u32 {
        self.remote_ssrc
    }

    /// Check whether both tasks have exited
    pub fn is_finished(&self) -> bool {
        self.forward.is_finished() && self.feedback.is_finished()
    }

    /// Stop both tasks without waiting for a report
    pub fn abort(&self) {
        self.forward.abort();
        self.feedback.abort();
    }

    /// Wait up to `grace` for each task, aborting whichever is still running
    ///
    /// Returns the forwarding report, or `None` if the loop had to be aborted.
    pub async fn join(self, grace: Duration) -> Option<RelayReport> {
        let TrackRelay {
            remote_ssrc,
            mut forward,
            mut feedback,
        } = self;

        let report = match timeout(grace, &mut forward).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                warn!("Forwarding task for ssrc={} failed: {}", remote_ssrc, e);
                None
            }
            Err(_) => {
                warn!("Forwarding task for ssrc={} did not exit, aborting", remote_ssrc);
                forward.abort();
                None
            }
        };

        if timeout(grace, &mut feedback).await.is_err() {
            warn!("Feedback task for ssrc={} did not exit, aborting", remote_ssrc);
            feedback.abort();
        }

        report
    }
}

async fn forward_loop(
    remote: Arc<dyn InboundTrack>,
    slot: LocalTrackSlot,
    mut shutdown: broadcast::Receiver<()>,
    // Dropped on return, which stops the paired feedback loop
    _done: oneshot::Sender<()>,
) -> RelayReport {
    let mut report = RelayReport::new(remote.ssrc());

    loop {
        let mut packet = tokio::select! {
            _ = shutdown.recv() => {
                report.exit = RelayExit::Shutdown;
                break;
            }
            read = remote.read_rtp() => match read {
                Ok(packet) => packet,
                Err(e) => {
                    debug!("RTP read ended for ssrc={}: {}", report.remote_ssrc, e);
                    report.exit = RelayExit::TrackEnded;
                    break;
                }
            },
        };

        let tracks = slot.current();
        match route_packet(tracks.as_ref(), &mut packet) {
            Route::NotReady => {
                report.dropped_not_ready += 1;
                trace!("Local tracks not ready, dropping packet from ssrc={}", report.remote_ssrc);
            }
            Route::Unroutable => {
                report.dropped_unroutable += 1;
                trace!(
                    "No local track for payload type {}, dropping packet",
                    packet.header.payload_type
                );
            }
            Route::Forward(track) => {
                if let Err(e) = track.write_rtp(&packet).await {
                    let err = Error::Relay(format!(
                        "Write to local {} track failed: {}",
                        track.descriptor().kind,
                        e
                    ));
                    error!("{}", err);
                    report.exit = RelayExit::WriteFailed(err.to_string());
                    break;
                }
                report.forwarded += 1;
            }
        }
    }

    info!(
        "Relay for ssrc={} stopped ({:?}): forwarded={} dropped_not_ready={} dropped_unroutable={}",
        report.remote_ssrc,
        report.exit,
        report.forwarded,
        report.dropped_not_ready,
        report.dropped_unroutable
    );

    report
}

async fn feedback_loop(
    media_ssrc: u32,
    sink: Arc<dyn FeedbackSink>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut forward_done: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = &mut forward_done => {
                debug!("Forwarding for ssrc={} ended, stopping feedback", media_ssrc);
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = sink.send_picture_loss(media_ssrc).await {
                    warn!("Stopping picture loss feedback for ssrc={}: {}", media_ssrc, e);
                    break;
                }
                trace!("Sent picture loss indication for ssrc={}", media_ssrc);
            }
        }
    }
}
