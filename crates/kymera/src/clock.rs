//! DSP clock and power-save selection.

use crate::config::{KymeraFeatures, ScoMode};
use crate::requests::A2dpCodec;
use crate::state::KymeraState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DspClock {
    VerySlow,
    Slow,
    Base,
    Turbo,
    TurboPlus,
}

impl DspClock {
    const fn step_up(self) -> Self {
        match self {
            DspClock::VerySlow => DspClock::Slow,
            DspClock::Slow => DspClock::Base,
            DspClock::Base | DspClock::Turbo | DspClock::TurboPlus => {
                DspClock::Turbo
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerSaveMode {
    Mode1,
    Mode2,
    Mode3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DspClockConfig {
    pub active: DspClock,
    pub low_power: DspClock,
    pub mode: PowerSaveMode,
}

impl Default for DspClockConfig {
    fn default() -> Self {
        Self {
            active: DspClock::Slow,
            low_power: DspClock::Slow,
            mode: PowerSaveMode::Mode3,
        }
    }
}

/// Facts owned by other subsystems that raise the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockHints {
    /// ANC asks for a clock boost, e.g. while switching filters.
    pub anc_boost: bool,
    pub va_active: bool,
    pub va_min_clock: DspClock,
    pub fit_test_running: bool,
    pub gaming_mode: bool,
}

impl Default for ClockHints {
    fn default() -> Self {
        Self {
            anc_boost: false,
            va_active: false,
            va_min_clock: DspClock::Base,
            fit_test_running: false,
            gaming_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockInputs {
    pub state: KymeraState,
    pub hints: ClockHints,
    pub features: KymeraFeatures,
    pub codec: Option<A2dpCodec>,
    pub sco_mode: Option<ScoMode>,
    pub tone_playing: bool,
    /// Microphones are shared with another user, e.g. adaptive ANC.
    pub concurrency: bool,
    pub output_rate: u32,
}

const HIGH_OUTPUT_RATE: u32 = 96_000;

/// Clock configuration for the current use case.
pub fn dsp_clock_config(inputs: &ClockInputs) -> DspClockConfig {
    let mut config = DspClockConfig::default();
    let hints = &inputs.hints;
    let features = &inputs.features;

    let active = match inputs.state {
        KymeraState::A2dpStartingA
        | KymeraState::A2dpStartingB
        | KymeraState::A2dpStartingC
        | KymeraState::A2dpStreaming
        | KymeraState::A2dpStreamingWithForwarding
        | KymeraState::StandaloneLeakthrough => {
            let active = if hints.anc_boost || hints.va_active {
                Some(DspClock::Turbo)
            } else if inputs.tone_playing {
                match inputs.codec {
                    Some(A2dpCodec::AptX | A2dpCodec::AptXHd) => {
                        Some(DspClock::Turbo)
                    }
                    _ => Some(DspClock::Base),
                }
            } else if inputs.concurrency {
                Some(DspClock::Turbo)
            } else {
                match inputs.codec {
                    Some(
                        A2dpCodec::AptX
                        | A2dpCodec::AptXHd
                        | A2dpCodec::AptXAdaptive
                        | A2dpCodec::AptXAdaptiveTws,
                    ) => Some(DspClock::Base),
                    Some(A2dpCodec::Sbc)
                        if features.aec_always_used
                            || !features.pcm_latency_buffer =>
                    {
                        Some(DspClock::Base)
                    }
                    Some(A2dpCodec::AptXMonoTws) if features.aec_always_used => {
                        Some(DspClock::Base)
                    }
                    _ => None,
                }
            };
            if features.boost_in_gaming_mode && hints.gaming_mode {
                Some(active.unwrap_or(config.active).step_up())
            } else {
                active
            }
        }
        KymeraState::ScoActive | KymeraState::ScoSlaveActive => {
            let active = if hints.anc_boost {
                DspClock::Turbo
            } else {
                match inputs.sco_mode {
                    Some(ScoMode::Nb | ScoMode::Wb) if features.aanc_build => {
                        DspClock::Turbo
                    }
                    Some(ScoMode::Nb | ScoMode::Wb) => DspClock::Base,
                    Some(ScoMode::Swb | ScoMode::Uwb) => DspClock::Turbo,
                    None => config.active,
                }
            };
            Some(active)
        }
        KymeraState::AncTuning
        | KymeraState::LeAudioActive
        | KymeraState::LeVoiceActive
        | KymeraState::UsbAudioActive
        | KymeraState::UsbVoiceActive
        | KymeraState::UsbScoVoiceActive => Some(DspClock::Turbo),
        KymeraState::MicLoopback | KymeraState::TonePlaying => {
            if hints.anc_boost || hints.va_active {
                Some(DspClock::Turbo)
            } else if inputs.concurrency || hints.fit_test_running {
                Some(DspClock::Base)
            } else if inputs.output_rate == HIGH_OUTPUT_RATE {
                Some(DspClock::Base)
            } else {
                None
            }
        }
        KymeraState::WiredAudioPlaying | KymeraState::Idle => {
            if hints.anc_boost {
                Some(DspClock::Turbo)
            } else if hints.va_active {
                Some(hints.va_min_clock)
            } else if hints.fit_test_running {
                Some(DspClock::Base)
            } else {
                None
            }
        }
        KymeraState::AdaptiveAncStarted => {
            if hints.anc_boost || inputs.concurrency {
                Some(DspClock::Turbo)
            } else if hints.fit_test_running {
                Some(DspClock::Base)
            } else {
                None
            }
        }
    };

    if let Some(active) = active {
        config.active = active;
        config.mode = PowerSaveMode::Mode1;
    }
    config
}
