//! File transfer state machines, incoming and outgoing.
//!
//! Progress is a sentinel-coded float: `[0, 1]` while transferring,
//! `(1, 1.1]` on completion, `[-0.1, 0)` on error or cancellation. The
//! ranges are disjoint so observers can tell the terminal states apart
//! from legitimate progress.

use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

/// Progress value signalling full completion.
pub const PROGRESS_COMPLETE: f32 = 1.1;

/// Progress value signalling error or cancellation.
pub const PROGRESS_FAILED: f32 = -0.1;

/// Validation failures when constructing an outgoing transfer. Checked in
/// order; the first missing precondition wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransferSetupError {
    #[error("no active connection")]
    NoConnection,
    #[error("no file to send")]
    NoFile,
    #[error("no recipient contact id")]
    NoRecipientContact,
    #[error("no recipient service id")]
    NoRecipientService,
    #[error("no sender service id")]
    NoSenderService,
}

/// Failure kinds surfaced on the signal queue once a transfer is underway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    Local,
    Remote,
    AcceptFailed,
    TransferFailed,
    ChannelFailed,
    ReadFailed,
}

/// Failures accepting an incoming transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcceptError {
    #[error("transfer already accepted")]
    AlreadyAccepted,
    #[error("no underlying channel")]
    ChannelMissing,
}

/// Signals a transfer emits as it advances; drained by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferSignal {
    Progress(f32),
    Completed,
    Cancelled,
    Error(TransferErrorKind),
    /// Instructs the host to close the underlying channel. Emitted exactly
    /// once per transfer, on the first terminal transition.
    CloseChannel(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Requested,
    Accepted,
    Transferring,
    Completed,
    Cancelled,
    Errored,
}

impl Phase {
    fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Cancelled | Phase::Errored)
    }
}

/// Out-of-band channel-request properties carried alongside the binary
/// stream (not inside the message envelopes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRequest {
    pub content_type: String,
    pub filename: String,
    pub size: u64,
    pub initial_offset: u64,
    pub description: String,
    pub sender_service: String,
    pub recipient_service: String,
}

/// An incoming transfer, created from a channel offer.
#[derive(Debug)]
pub struct IncomingTransfer {
    peer_id: String,
    service_id: String,
    name: String,
    size: u64,
    offset: u64,
    transferred: u64,
    progress: f32,
    file: Option<PathBuf>,
    channel: Option<u64>,
    channel_open: bool,
    phase: Phase,
    signals: Vec<TransferSignal>,
}

impl IncomingTransfer {
    pub fn new(
        peer_id: &str,
        service_id: &str,
        name: &str,
        size: u64,
        offset: u64,
        channel: Option<u64>,
    ) -> Self {
        Self {
            peer_id: peer_id.to_owned(),
            service_id: service_id.to_owned(),
            name: name.to_owned(),
            size,
            offset,
            transferred: 0,
            progress: 0.0,
            file: None,
            channel_open: channel.is_some(),
            channel,
            phase: Phase::Requested,
            signals: Vec::new(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn file(&self) -> Option<&PathBuf> {
        self.file.as_ref()
    }

    /// Accept the offer, naming the local file to write into.
    pub fn accept(&mut self, file: PathBuf) -> Result<(), AcceptError> {
        if self.phase != Phase::Requested {
            return Err(AcceptError::AlreadyAccepted);
        }
        if self.channel.is_none() {
            return Err(AcceptError::ChannelMissing);
        }
        self.file = Some(file);
        self.phase = Phase::Accepted;
        Ok(())
    }

    /// Decline the offer and close the channel. False when there was no
    /// channel to close or the transfer already left `Requested`.
    pub fn reject(&mut self) -> bool {
        if self.phase != Phase::Requested || self.channel.is_none() {
            return false;
        }
        self.phase = Phase::Cancelled;
        self.progress = PROGRESS_FAILED;
        self.close_channel();
        true
    }

    /// Bytes arrived on the channel.
    pub fn on_data(&mut self, bytes: u64) {
        if self.phase != Phase::Accepted && self.phase != Phase::Transferring {
            debug!(name = %self.name, "data outside of an active transfer, ignored");
            return;
        }
        self.phase = Phase::Transferring;
        self.transferred = self.transferred.saturating_add(bytes);
        self.progress = in_progress_ratio(self.transferred, self.size);
        self.signals.push(TransferSignal::Progress(self.progress));
    }

    /// The channel delivered everything.
    pub fn on_complete(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = Phase::Completed;
        self.progress = PROGRESS_COMPLETE;
        self.signals.push(TransferSignal::Completed);
        self.close_channel();
    }

    /// Local cancellation after acceptance.
    pub fn cancel(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = Phase::Cancelled;
        self.progress = PROGRESS_FAILED;
        self.signals.push(TransferSignal::Cancelled);
        self.close_channel();
    }

    /// A local I/O, remote-initiated or protocol-level failure.
    pub fn on_error(&mut self, kind: TransferErrorKind) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = Phase::Errored;
        self.progress = PROGRESS_FAILED;
        self.signals.push(TransferSignal::Error(kind));
        self.close_channel();
    }

    /// Drain queued signals.
    pub fn take_signals(&mut self) -> Vec<TransferSignal> {
        std::mem::take(&mut self.signals)
    }

    fn close_channel(&mut self) {
        if self.channel_open {
            self.channel_open = false;
            if let Some(channel) = self.channel {
                self.signals.push(TransferSignal::CloseChannel(channel));
            }
        }
    }
}

/// An outgoing transfer. Construction validates every precondition before
/// any channel is opened.
#[derive(Debug)]
pub struct OutgoingTransfer {
    recipient_contact: String,
    recipient_service: String,
    sender_service: String,
    file: PathBuf,
    size: u64,
    description: String,
    transferred: u64,
    progress: f32,
    channel: Option<u64>,
    channel_open: bool,
    phase: Phase,
    signals: Vec<TransferSignal>,
}

impl OutgoingTransfer {
    pub fn new(
        connected: bool,
        file: Option<(PathBuf, u64)>,
        recipient_contact: Option<&str>,
        recipient_service: Option<&str>,
        sender_service: Option<&str>,
        description: &str,
    ) -> Result<Self, TransferSetupError> {
        if !connected {
            return Err(TransferSetupError::NoConnection);
        }
        let (file, size) = file.ok_or(TransferSetupError::NoFile)?;
        let recipient_contact = non_empty(recipient_contact)
            .ok_or(TransferSetupError::NoRecipientContact)?;
        let recipient_service = non_empty(recipient_service)
            .ok_or(TransferSetupError::NoRecipientService)?;
        let sender_service =
            non_empty(sender_service).ok_or(TransferSetupError::NoSenderService)?;
        Ok(Self {
            recipient_contact: recipient_contact.to_owned(),
            recipient_service: recipient_service.to_owned(),
            sender_service: sender_service.to_owned(),
            file,
            size,
            description: description.to_owned(),
            transferred: 0,
            progress: 0.0,
            channel: None,
            channel_open: false,
            phase: Phase::Requested,
            signals: Vec::new(),
        })
    }

    pub fn recipient_contact(&self) -> &str {
        &self.recipient_contact
    }

    pub fn recipient_service(&self) -> &str {
        &self.recipient_service
    }

    pub fn sender_service(&self) -> &str {
        &self.sender_service
    }

    pub fn file(&self) -> &PathBuf {
        &self.file
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// The out-of-band property bag for channel negotiation.
    pub fn channel_request(&self) -> ChannelRequest {
        let filename = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ChannelRequest {
            content_type: "application/octet-stream".to_owned(),
            filename,
            size: self.size,
            initial_offset: 0,
            description: self.description.clone(),
            sender_service: self.sender_service.clone(),
            recipient_service: self.recipient_service.clone(),
        }
    }

    /// Channel negotiation succeeded.
    pub fn on_channel_ready(&mut self, channel: u64) {
        if self.phase != Phase::Requested {
            return;
        }
        self.channel = Some(channel);
        self.channel_open = true;
        self.phase = Phase::Accepted;
    }

    /// Channel negotiation failed before any bytes moved.
    pub fn on_channel_failed(&mut self) {
        self.fail(TransferErrorKind::ChannelFailed);
    }

    /// The remote accepted our requested channel; start pushing bytes.
    pub fn on_remote_accepted(&mut self) {
        if self.phase != Phase::Accepted {
            debug!(file = %self.file.display(), "remote accept outside negotiation, ignored");
            return;
        }
        self.phase = Phase::Transferring;
    }

    /// Bytes were written to the channel. Completes the transfer when the
    /// whole file has been pushed.
    pub fn on_bytes_sent(&mut self, bytes: u64) {
        if self.phase != Phase::Transferring {
            return;
        }
        self.transferred = self.transferred.saturating_add(bytes);
        if self.transferred >= self.size {
            self.phase = Phase::Completed;
            self.progress = PROGRESS_COMPLETE;
            self.signals.push(TransferSignal::Completed);
            self.close_channel();
        } else {
            self.progress = in_progress_ratio(self.transferred, self.size);
            self.signals.push(TransferSignal::Progress(self.progress));
        }
    }

    /// The remote stopped the transfer.
    pub fn on_remote_stopped(&mut self) {
        self.fail(TransferErrorKind::Remote);
    }

    pub fn on_error(&mut self, kind: TransferErrorKind) {
        self.fail(kind);
    }

    pub fn cancel(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = Phase::Cancelled;
        self.progress = PROGRESS_FAILED;
        self.signals.push(TransferSignal::Cancelled);
        self.close_channel();
    }

    /// Drain queued signals.
    pub fn take_signals(&mut self) -> Vec<TransferSignal> {
        std::mem::take(&mut self.signals)
    }

    fn fail(&mut self, kind: TransferErrorKind) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = Phase::Errored;
        self.progress = PROGRESS_FAILED;
        self.signals.push(TransferSignal::Error(kind));
        self.close_channel();
    }

    fn close_channel(&mut self) {
        if self.channel_open {
            self.channel_open = false;
            if let Some(channel) = self.channel {
                self.signals.push(TransferSignal::CloseChannel(channel));
            }
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

fn in_progress_ratio(transferred: u64, size: u64) -> f32 {
    if size == 0 {
        return 0.0;
    }
    (transferred as f64 / size as f64).min(1.0) as f32
}
