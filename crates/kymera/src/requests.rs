//! Parameters of the start requests callers hand to the manager.

use mic_arbiter::Sink;
use portable_atomic::{AtomicU16, Ordering};

use crate::config::{ScoChainInfo, ScoMode};
use crate::state::PromptFormat;

/// Bits in a caller-owned lock word, cleared once the request they guard
/// has been dealt with.
#[derive(Debug, Clone, Copy)]
pub struct ClientLock {
    word: &'static AtomicU16,
    mask: u16,
}

impl ClientLock {
    pub const fn new(word: &'static AtomicU16, mask: u16) -> Self {
        Self { word, mask }
    }

    pub fn set(&self) {
        self.word.fetch_or(self.mask, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.word.fetch_and(!self.mask, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.word.load(Ordering::SeqCst) & self.mask != 0
    }
}

/// Stream endpoint of an A2DP media channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Seid {
    /// Audio received from the phone.
    Sink(u8),
    /// Audio forwarded to the peer earbud.
    Source(u8),
}

impl Seid {
    pub const fn is_source(self) -> bool {
        matches!(self, Seid::Source(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum A2dpCodec {
    Sbc,
    Aac,
    AptX,
    AptXHd,
    AptXAdaptive,
    AptXAdaptiveTws,
    AptXMonoTws,
}

#[derive(Debug, Clone, Copy)]
pub struct A2dpStartRequest {
    pub client_lock: Option<ClientLock>,
    pub seid: Seid,
    pub codec: A2dpCodec,
    pub rate: u32,
    pub volume_db: i16,
    pub max_bitrate: u32,
    /// Number of times the start is deferred by one dispatch before the
    /// chain is built, giving a racing stop the chance to cancel it.
    pub pre_start_delay: u8,
}

/// SCO start as the caller asks for it.
#[derive(Debug, Clone, Copy)]
pub struct ScoStartParams {
    pub sink: Option<Sink>,
    pub mode: ScoMode,
    /// Retransmission window of the eSCO link, in slots.
    pub wesco: u8,
    pub volume_db: i16,
    pub pre_start_delay: u8,
    /// This earbud relays the call from its peer.
    pub secondary: bool,
    pub started: Option<fn()>,
}

/// SCO start once the chain has been looked up.
#[derive(Debug, Clone, Copy)]
pub struct ScoStartRequest {
    pub sink: Sink,
    pub chain: &'static ScoChainInfo,
    pub wesco: u8,
    pub volume_db: i16,
    pub pre_start_delay: u8,
    pub secondary: bool,
    pub started: Option<fn()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ToneKind {
    Tone,
    Prompt { format: PromptFormat, rate: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct TonePromptRequest {
    pub id: u16,
    pub kind: ToneKind,
    pub interruptible: bool,
    pub client_lock: Option<ClientLock>,
}

impl TonePromptRequest {
    pub const fn tone(id: u16) -> Self {
        Self { id, kind: ToneKind::Tone, interruptible: true, client_lock: None }
    }

    pub const fn prompt(id: u16, format: PromptFormat, rate: u32) -> Self {
        Self {
            id,
            kind: ToneKind::Prompt { format, rate },
            interruptible: true,
            client_lock: None,
        }
    }

    pub const fn non_interruptible(mut self) -> Self {
        self.interruptible = false;
        self
    }

    pub const fn with_client_lock(mut self, lock: ClientLock) -> Self {
        self.client_lock = Some(lock);
        self
    }

    pub fn prompt_format(&self) -> Option<PromptFormat> {
        match self.kind {
            ToneKind::Prompt { format, .. } => Some(format),
            ToneKind::Tone => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AancParams {
    pub in_ear: bool,
    pub control_path: u8,
    pub hw_channel: u8,
    pub mode: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct UsbAudioRequest {
    pub rate: u32,
    pub channels: u8,
    pub volume_db: i16,
    pub client_lock: Option<ClientLock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsbVoiceRequest {
    pub mode: ScoMode,
    /// Voice carried over a SCO-style USB interface.
    pub sco_interface: bool,
    pub volume_db: i16,
    pub mic_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WiredAudioRequest {
    pub rate: u32,
    pub volume_db: i16,
}
