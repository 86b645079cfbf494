//! Ytstenut capability protocol reference implementation.
//! Host-driven: no I/O; host passes events and receives actions.

pub mod client;
pub mod config;
pub mod correlate;
pub mod metadata;
pub mod proxy;
pub mod registry;
pub mod roster;
pub mod service;
pub mod status;
pub mod transfer;
pub mod wire;

pub use client::{ClientEvent, MessageError, OutboundAction, YtsClient};
pub use config::Config;
pub use correlate::{Correlator, DEFAULT_INVOCATION_TIMEOUT_TICKS};
pub use metadata::{Direction, EnvelopeKind, Metadata, MetadataError, Node, ParseError};
pub use proxy::{PlayerProxy, Proxy, ProxyCommand, ProxyNotification, TranscriptProxy};
pub use registry::{Contract, VP_PLAYER, VP_TRANSCRIPT};
pub use roster::{Contact, ContactService, Roster, RosterEvent, ServiceDescriptor, Subscription};
pub use service::{
    AdapterEvent, Player, PlayerAdapter, ServiceAdapter, Transcript, TranscriptAdapter,
};
pub use status::ClientStatus;
pub use transfer::{
    AcceptError, ChannelRequest, IncomingTransfer, OutgoingTransfer, TransferErrorKind,
    TransferSetupError, TransferSignal, PROGRESS_COMPLETE, PROGRESS_FAILED,
};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
