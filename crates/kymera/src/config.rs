//! Timing constants, build switches and the read-only tables injected at
//! init.

use embassy_time::Duration;

/// DSP stays powered this long after a prospective power-on or a
/// leakthrough teardown, in case audio follows.
pub const PROSPECTIVE_AUDIO_OFF_TIMEOUT: Duration = Duration::from_secs(5);
pub const SCO_SYNC_UNMUTE_TIMEOUT: Duration = Duration::from_secs(1);
pub const PREPARE_FOR_PROMPT_TIMEOUT: Duration = Duration::from_secs(1);
/// Backoff before retrying a microphone connection that was turned down.
pub const MIC_CONNECT_RETRY: Duration = Duration::from_millis(100);
/// Time for the AEC reference to settle before the sidetone path opens.
pub const AEC_REF_SETTLING_TIME: Duration = Duration::from_millis(100);
pub const SIDETONE_GAIN_RAMP_STEP: Duration = Duration::from_millis(25);
/// ANC tuning requested while a tone plays waits this long.
pub const ANC_TUNING_START_DELAY: Duration = Duration::from_millis(200);

pub const QUEUE_CAPACITY: usize = 32;
pub const MAX_CLIENTS: usize = 4;
pub const MAX_LISTENERS: usize = 4;

/// Build-time product switches that steer the clock policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KymeraFeatures {
    /// Adaptive ANC runs alongside voice calls, which needs a faster clock.
    pub aanc_build: bool,
    pub aec_always_used: bool,
    /// SBC decoding goes through a PCM latency buffer.
    pub pcm_latency_buffer: bool,
    pub boost_in_gaming_mode: bool,
}

/// Opaque handle of an operator chain description owned by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChainId(pub u16);

/// Chain descriptions the manager checks for before building optional
/// features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChainConfigs {
    /// Present when the platform can resample microphones per user, which
    /// is what makes microphone concurrency possible.
    pub mic_resampler: Option<ChainId>,
    pub aanc: Option<ChainId>,
    pub leakthrough: Option<ChainId>,
}

/// A DSP capability bundle to download when the framework comes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapabilityBundle {
    pub file: &'static str,
    /// Load on the second DSP core as well.
    pub both_processors: bool,
}

/// Voice band of a SCO link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScoMode {
    Nb,
    Wb,
    Swb,
    Uwb,
}

impl ScoMode {
    pub const fn sample_rate(self) -> u32 {
        match self {
            ScoMode::Nb => 8_000,
            ScoMode::Wb => 16_000,
            ScoMode::Swb => 32_000,
            ScoMode::Uwb => 48_000,
        }
    }
}

/// One row of the SCO chain table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScoChainInfo {
    pub mode: ScoMode,
    pub mic_count: u8,
    pub chain: ChainId,
}

pub fn find_sco_chain(
    table: &'static [ScoChainInfo],
    mode: ScoMode,
    mic_count: u8,
) -> Option<&'static ScoChainInfo> {
    table.iter().find(|c| c.mode == mode && c.mic_count == mic_count)
}

/// What the A2DP layer expects the next stream to look like, so the output
/// chain can be prepared ahead of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct A2dpPrediction {
    pub rate: u32,
    pub seid: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackConfigs {
    pub a2dp_parameters_prediction: Option<fn() -> Option<A2dpPrediction>>,
}

/// Everything injected once before the manager starts.
#[derive(Debug, Clone, Copy)]
pub struct KymeraConfig {
    pub features: KymeraFeatures,
    pub chains: ChainConfigs,
    pub bundles: &'static [CapabilityBundle],
    pub sco_chains: &'static [ScoChainInfo],
    pub callbacks: CallbackConfigs,
    /// Microphones used for voice calls.
    pub voice_mic_count: u8,
}

impl Default for KymeraConfig {
    fn default() -> Self {
        Self {
            features: KymeraFeatures::default(),
            chains: ChainConfigs::default(),
            bundles: &[],
            sco_chains: &[],
            callbacks: CallbackConfigs::default(),
            voice_mic_count: 1,
        }
    }
}

/// Sidetone gain in the leakthrough operator's floating format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SidetoneGain {
    pub exponent: i32,
    pub mantissa: u32,
}

const fn gain(exponent: i32, mantissa: u32) -> SidetoneGain {
    SidetoneGain { exponent, mantissa }
}

/// Sidetone ramp, applied one step every [`SIDETONE_GAIN_RAMP_STEP`] after
/// the path is enabled at the first step.
pub static SIDETONE_RAMP: [SidetoneGain; 24] = [
    gain(-6, 0x290E_A879),
    gain(-6, 0x33B0_2273),
    gain(-5, 0x2089_229E),
    gain(-5, 0x28F5_C28F),
    gain(-5, 0x3390_CA2B),
    gain(-4, 0x2075_67A2),
    gain(-4, 0x28DC_EBBF),
    gain(-4, 0x3371_84E6),
    gain(-3, 0x2061_B89D),
    gain(-3, 0x28C4_23FF),
    gain(-3, 0x3352_5297),
    gain(-2, 0x204E_1588),
    gain(-2, 0x28AB_6B46),
    gain(-2, 0x3333_3333),
    gain(-1, 0x203A_7E5B),
    gain(-1, 0x2892_C18B),
    gain(-1, 0x3314_26AF),
    gain(0, 0x2026_F310),
    gain(0, 0x287A_26C5),
    gain(0, 0x32F5_2CFF),
    gain(1, 0x2013_739E),
    gain(1, 0x2861_9AEA),
    gain(1, 0x32D6_4618),
    gain(1, 0x4000_0000),
];
