use std::{fmt, net::Ipv4Addr};
use thiserror::Error;

use super::lease::ApplyError;
use crate::{
    protocol::{frame::FrameError, option::OptionError, DecodeError, EncodeError},
    transport::TransportError,
};

/// The step of the handshake an error belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Discover,
    Offer,
    Request,
    Ack,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discover => "DISCOVER",
            Phase::Offer => "OFFER",
            Phase::Request => "REQUEST",
            Phase::Ack => "ACK",
        };
        f.write_str(name)
    }
}

/// Why an inbound packet was discarded. Never surfaced to the caller.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("datagram for port {0}, not the client port")]
    WrongPort(u16),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failed during {phase}: {source}")]
    Transport {
        phase: Phase,
        #[source]
        source: TransportError,
    },
    #[error("no {phase} received after {attempts} attempts")]
    Exhausted { phase: Phase, attempts: u32 },
    #[error("server {server} declined {address} (DHCPNAK)")]
    Nak { server: Ipv4Addr, address: Ipv4Addr },
    #[error("failed to encode {phase}: {source}")]
    Encode {
        phase: Phase,
        #[source]
        source: EncodeError,
    },
    #[error("failed to frame {phase}: {source}")]
    Frame {
        phase: Phase,
        #[source]
        source: FrameError,
    },
    #[error("invalid option in {phase}: {source}")]
    Option {
        phase: Phase,
        #[source]
        source: OptionError,
    },
    #[error("failed to configure interface after {phase}: {source}")]
    Apply {
        phase: Phase,
        #[source]
        source: ApplyError,
    },
    #[error("negotiation ended without a lease")]
    NotBound,
}

impl ClientError {
    pub fn phase(&self) -> Option<Phase> {
        match self {
            ClientError::Transport { phase, .. }
            | ClientError::Exhausted { phase, .. }
            | ClientError::Encode { phase, .. }
            | ClientError::Frame { phase, .. }
            | ClientError::Option { phase, .. }
            | ClientError::Apply { phase, .. } => Some(*phase),
            ClientError::Nak { .. } => Some(Phase::Ack),
            ClientError::NotBound => None,
        }
    }
}

#[test]
fn phase_test() {
    let error = ClientError::Exhausted {
        phase: Phase::Offer,
        attempts: 3,
    };
    assert_eq!(error.phase(), Some(Phase::Offer));
    assert_eq!(error.to_string(), "no OFFER received after 3 attempts");

    let error = ClientError::Nak {
        server: Ipv4Addr::new(10, 0, 0, 1),
        address: Ipv4Addr::new(10, 0, 0, 5),
    };
    assert_eq!(error.phase(), Some(Phase::Ack));
    assert_eq!(ClientError::NotBound.phase(), None);
}
