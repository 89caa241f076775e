//! Negotiation state machine
//!
//! ```text
//! New ──offer applied──► AwaitingLocalDescription ──answer sent──► Connected
//!                               ▲                                     │
//!                               └── offer applied ── AwaitingRemote ◄─┘ (renegotiation)
//!
//! any ──► Closed (terminal)
//! ```

use crate::{Error, Result};
use std::fmt;

/// Negotiation state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    /// No offer seen yet
    #[default]
    New,
    /// Renegotiation offer received while connected, not applied yet
    AwaitingRemoteDescription,
    /// Offer applied, answer not sent yet
    AwaitingLocalDescription,
    /// Answer sent; media may flow
    Connected,
    /// Torn down
    Closed,
}

impl NegotiationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::New => "new",
            NegotiationState::AwaitingRemoteDescription => "awaiting-remote-description",
            NegotiationState::AwaitingLocalDescription => "awaiting-local-description",
            NegotiationState::Connected => "connected",
            NegotiationState::Closed => "closed",
        }
    }

    /// Offer received; returns the state to hold while it is applied
    pub fn on_offer(self) -> Result<Self> {
        match self {
            NegotiationState::New => Ok(NegotiationState::New),
            NegotiationState::Connected => Ok(NegotiationState::AwaitingRemoteDescription),
            other => Err(invalid("offer", other)),
        }
    }

    /// Remote offer applied successfully
    pub fn on_remote_applied(self) -> Result<Self> {
        match self {
            NegotiationState::New | NegotiationState::AwaitingRemoteDescription => {
                Ok(NegotiationState::AwaitingLocalDescription)
            }
            other => Err(invalid("remote description", other)),
        }
    }

    /// Answer applied locally and sent to the peer
    pub fn on_answer_sent(self) -> Result<Self> {
        match self {
            NegotiationState::AwaitingLocalDescription => Ok(NegotiationState::Connected),
            other => Err(invalid("answer", other)),
        }
    }

    /// Check whether remote ICE candidates can be applied
    ///
    /// A candidate needs a remote description to belong to.
    pub fn accepts_candidates(self) -> bool {
        matches!(
            self,
            NegotiationState::AwaitingRemoteDescription
                | NegotiationState::AwaitingLocalDescription
                | NegotiationState::Connected
        )
    }

    pub fn is_closed(self) -> bool {
        self == NegotiationState::Closed
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn invalid(event: &str, state: NegotiationState) -> Error {
    Error::Negotiation(format!("Unexpected {} in state {}", event, state))
}
