use mic_arbiter::MicError;

/// Failures reported by the audio manager API and its handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KymeraError {
    /// No SCO chain matches the requested mode and mic count.
    NoScoChain,
    /// The audio sink handed to a start request is not valid.
    InvalidSink,
    /// The message queue has no room left.
    QueueFull,
    /// The microphone arbiter turned the request down.
    MicUnavailable,
    /// A chain builder could not start its chain.
    ChainStartFailed,
    /// A table this operation depends on was never provided.
    NotConfigured,
    /// A tone or prompt is already playing.
    ToneBusy,
}

impl From<MicError> for KymeraError {
    fn from(_: MicError) -> Self {
        KymeraError::MicUnavailable
    }
}

impl core::fmt::Display for KymeraError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KymeraError::NoScoChain => write!(f, "No SCO chain for mode"),
            KymeraError::InvalidSink => write!(f, "Invalid audio sink"),
            KymeraError::QueueFull => write!(f, "Message queue full"),
            KymeraError::MicUnavailable => {
                write!(f, "Microphones unavailable, retry later")
            }
            KymeraError::ChainStartFailed => write!(f, "Chain failed to start"),
            KymeraError::NotConfigured => write!(f, "Configuration missing"),
            KymeraError::ToneBusy => write!(f, "Tone or prompt in progress"),
        }
    }
}

/// Malformed unsolicited operator messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpMsgError {
    BadLength(usize),
    UnknownMessage(u16),
}

impl core::fmt::Display for OpMsgError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OpMsgError::BadLength(len) => {
                write!(f, "Operator message of unexpected length: {}", len)
            }
            OpMsgError::UnknownMessage(id) => {
                write!(f, "Unknown operator message id: {}", id)
            }
        }
    }
}
