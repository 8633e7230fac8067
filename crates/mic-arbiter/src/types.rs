use bitflags::bitflags;
use heapless::Vec;

/// Microphones a single user may request, and the width of the shared
/// splitter front-end.
pub const MAX_CONCURRENT_MICS: usize = 3;
/// Splitter output streams, one per concurrently connected user.
pub const MAX_CONCURRENT_MIC_USERS: usize = 3;
/// Highest physical microphone id. Ids start at 1.
pub const MAX_SUPPORTED_MICROPHONES: u8 = 6;
/// Floor applied to every requested microphone sample rate.
pub const MIN_SAMPLE_RATE_HZ: u32 = 16_000;
/// AEC task period used when no registered user asks for a shorter one.
pub const DEFAULT_TASK_PERIOD_US: u32 = 2_000;

/// Physical microphone id in `1..=MAX_SUPPORTED_MICROPHONES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MicId(u8);

impl MicId {
    /// Panics on an id outside the supported range; that is a board
    /// configuration defect, not a runtime condition.
    pub const fn new(id: u8) -> Self {
        assert!(id >= 1 && id <= MAX_SUPPORTED_MICROPHONES);
        Self(id)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque endpoint that consumes audio (an operator input terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sink(pub u16);

/// Opaque endpoint that produces audio (a microphone or operator output).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Source(pub u16);

/// Subsystems that may hold microphones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum MicUser {
    Sco = 1 << 0,
    Custom = 1 << 1,
    Aanc = 1 << 2,
    Anc = 1 << 3,
    Va = 1 << 4,
    Leakthrough = 1 << 5,
    UsbVoice = 1 << 6,
    LeVoice = 1 << 7,
    FitTest = 1 << 8,
    LeMic = 1 << 9,
}

/// Number of distinct [`MicUser`] values.
pub const MIC_USER_COUNT: usize = 10;

impl MicUser {
    pub const fn bits(self) -> u16 {
        self as u16
    }

    pub(crate) const fn index(self) -> usize {
        (self as u16).trailing_zeros() as usize
    }
}

bitflags! {
    /// A set of [`MicUser`]s.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct MicUsers: u16 {
        const SCO = MicUser::Sco as u16;
        const CUSTOM = MicUser::Custom as u16;
        const AANC = MicUser::Aanc as u16;
        const ANC = MicUser::Anc as u16;
        const VA = MicUser::Va as u16;
        const LEAKTHROUGH = MicUser::Leakthrough as u16;
        const USB_VOICE = MicUser::UsbVoice as u16;
        const LE_VOICE = MicUser::LeVoice as u16;
        const FIT_TEST = MicUser::FitTest as u16;
        const LE_MIC = MicUser::LeMic as u16;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MicUsers {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "MicUsers {=u16:#x}", self.bits())
    }
}

impl From<MicUser> for MicUsers {
    fn from(user: MicUser) -> Self {
        MicUsers::from_bits_retain(user.bits())
    }
}

impl MicUsers {
    pub fn has(self, user: MicUser) -> bool {
        self.contains(user.into())
    }
}

/// How a user reacts when another user needs the microphones reconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MicUserState {
    /// May be disconnected and reconnected around a conflicting request.
    Interruptible,
    /// Wants a disconnect/reconnect cycle on every new connection, even
    /// without a parameter conflict.
    AlwaysInterrupt,
    /// Blocks any request that would require reconfiguration.
    NonInterruptible,
}

bitflags! {
    /// Reasons attached to a change notification.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct MicEvent: u8 {
        const EXTRA_MIC = 1 << 0;
        const HIGHER_SAMPLE_RATE = 1 << 1;
        const UCID_CHANGE_REQUIRED = 1 << 2;
        const TASK_PERIOD_CHANGE_REQUIRED = 1 << 3;
        const CONNECTING = 1 << 6;
        const DISCONNECTING = 1 << 7;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MicEvent {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "MicEvent {=u8:#x}", self.bits())
    }
}

/// Who triggered a change and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MicChangeInfo {
    pub user: MicUser,
    pub event: MicEvent,
}

/// One requested microphone and the sink its samples must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MicConnection {
    pub mic: MicId,
    pub sink: Sink,
}

/// What a user needs when it connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicConnectParams {
    pub sample_rate: u32,
    pub connections: Vec<MicConnection, MAX_CONCURRENT_MICS>,
    pub aec_ref_sink: Option<Sink>,
}

impl MicConnectParams {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate, connections: Vec::new(), aec_ref_sink: None }
    }

    /// Panics past [`MAX_CONCURRENT_MICS`] microphones.
    pub fn with_mic(mut self, mic: MicId, sink: Sink) -> Self {
        if self.connections.push(MicConnection { mic, sink }).is_err() {
            panic!("more than {} mics requested", MAX_CONCURRENT_MICS);
        }
        self
    }

    pub fn with_aec_ref(mut self, sink: Sink) -> Self {
        self.aec_ref_sink = Some(sink);
        self
    }
}
