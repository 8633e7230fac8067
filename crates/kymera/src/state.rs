use bitflags::bitflags;

/// Top-level use case the DSP is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KymeraState {
    #[default]
    Idle,
    A2dpStartingA,
    A2dpStartingB,
    A2dpStartingC,
    A2dpStreaming,
    A2dpStreamingWithForwarding,
    ScoActive,
    ScoSlaveActive,
    TonePlaying,
    AncTuning,
    AdaptiveAncStarted,
    UsbAudioActive,
    UsbVoiceActive,
    UsbScoVoiceActive,
    WiredAudioPlaying,
    LeAudioActive,
    LeVoiceActive,
    StandaloneLeakthrough,
    MicLoopback,
}

impl KymeraState {
    /// Whether a start request for another use case has to wait for this
    /// one to finish.
    pub const fn is_busy(self) -> bool {
        !matches!(
            self,
            KymeraState::Idle
                | KymeraState::TonePlaying
                | KymeraState::StandaloneLeakthrough
                | KymeraState::AdaptiveAncStarted
        )
    }

    pub const fn is_a2dp_starting(self) -> bool {
        matches!(
            self,
            KymeraState::A2dpStartingA
                | KymeraState::A2dpStartingB
                | KymeraState::A2dpStartingC
        )
    }

    pub const fn is_a2dp(self) -> bool {
        self.is_a2dp_starting()
            || matches!(
                self,
                KymeraState::A2dpStreaming
                    | KymeraState::A2dpStreamingWithForwarding
            )
    }

    pub const fn is_sco(self) -> bool {
        matches!(self, KymeraState::ScoActive | KymeraState::ScoSlaveActive)
    }

    pub const fn is_usb(self) -> bool {
        matches!(
            self,
            KymeraState::UsbAudioActive
                | KymeraState::UsbVoiceActive
                | KymeraState::UsbScoVoiceActive
        )
    }

    /// Next A2DP start stage, staying at the last one.
    pub(crate) const fn next_a2dp_stage(self) -> Self {
        match self {
            KymeraState::A2dpStartingA => KymeraState::A2dpStartingB,
            _ => KymeraState::A2dpStartingC,
        }
    }
}

bitflags! {
    /// Start-in-progress bits. While any is set, messages sent on the
    /// `lock` gate are held back.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct StartingLock: u16 {
        const TONE = 1 << 0;
        const A2DP_STARTING = 1 << 1;
        const SCO_STARTING = 1 << 2;
        const LE_STARTING = 1 << 3;
        const ANC_TUNING_STARTING = 1 << 4;
        const AANC_TUNING_STARTING = 1 << 5;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for StartingLock {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "StartingLock {=u16:#x}", self.bits())
    }
}

/// Encoding of a voice prompt the tone chain can be prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PromptFormat {
    Sbc,
    Pcm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ToneState {
    #[default]
    Idle,
    /// Chain built ahead of a prompt that has not been played yet.
    Ready(PromptFormat),
    Playing,
}
