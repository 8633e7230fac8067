use crate::platform::AecAudioConfig;
use crate::types::MicUsers;

/// Mic time-to-play latency for voice-assistant capture through the AEC.
pub const AEC_REF_DEFAULT_MIC_TTP_LATENCY_US: u32 = 40_000;
pub const DEFAULT_TERMINAL_BUFFER_SIZE: u16 = 15;
pub const VOICE_AANC_BUFFER_SIZE_MS: u16 = 45;

/// Operating mode of the AEC reference operator. Ordered: a leakthrough
/// attach needs at least [`AecUseCase::EnableLeakthrough`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AecUseCase {
    #[default]
    Default,
    CreateLeakthroughChain,
    EnableLeakthrough,
}

/// Use case plus the AEC settings that go with it. The mic sample rate is
/// filled in by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AecUserConfig {
    pub use_case: AecUseCase,
    pub ttp_delay_us: u32,
    pub is_source_clock_same: bool,
    pub buffer_size: u16,
}

impl AecUserConfig {
    const fn plain(use_case: AecUseCase) -> Self {
        Self { use_case, ttp_delay_us: 0, is_source_clock_same: false, buffer_size: 0 }
    }

    const fn with_ttp(use_case: AecUseCase) -> Self {
        Self { ttp_delay_us: AEC_REF_DEFAULT_MIC_TTP_LATENCY_US, ..Self::plain(use_case) }
    }

    const fn with_buffer(use_case: AecUseCase, buffer_size: u16) -> Self {
        Self { buffer_size, ..Self::plain(use_case) }
    }

    pub fn audio_config(&self, mic_sample_rate: u32) -> AecAudioConfig {
        AecAudioConfig {
            mic_sample_rate,
            ttp_delay_us: self.ttp_delay_us,
            is_source_clock_same: self.is_source_clock_same,
            buffer_size: self.buffer_size,
        }
    }
}

struct Row {
    users: MicUsers,
    leakthrough: bool,
    config: AecUserConfig,
}

const fn row(users: MicUsers, leakthrough: bool, config: AecUserConfig) -> Row {
    Row { users, leakthrough, config }
}

use AecUseCase::{Default as Plain, EnableLeakthrough as Leak};

const SCO_AANC: MicUsers = MicUsers::SCO.union(MicUsers::AANC);
const LE_VOICE_AANC: MicUsers = MicUsers::LE_VOICE.union(MicUsers::AANC);
const USB_VOICE_AANC: MicUsers = MicUsers::USB_VOICE.union(MicUsers::AANC);
const VA_AANC: MicUsers = MicUsers::VA.union(MicUsers::AANC);
const FIT_TEST_AANC: MicUsers = MicUsers::FIT_TEST.union(MicUsers::AANC);

static AEC_USE_CASE_MAP: [Row; 16] = [
    row(MicUsers::VA, true, AecUserConfig::with_ttp(Leak)),
    row(MicUsers::VA, false, AecUserConfig::with_ttp(Plain)),
    row(
        MicUsers::empty(),
        true,
        AecUserConfig {
            is_source_clock_same: true,
            ..AecUserConfig::with_buffer(Leak, DEFAULT_TERMINAL_BUFFER_SIZE)
        },
    ),
    row(MicUsers::SCO, false, AecUserConfig::plain(Plain)),
    row(MicUsers::SCO, true, AecUserConfig::plain(Leak)),
    row(SCO_AANC, false, AecUserConfig::with_buffer(Plain, VOICE_AANC_BUFFER_SIZE_MS)),
    row(MicUsers::LE_VOICE, false, AecUserConfig::plain(Plain)),
    row(LE_VOICE_AANC, false, AecUserConfig::with_buffer(Plain, VOICE_AANC_BUFFER_SIZE_MS)),
    row(MicUsers::USB_VOICE, false, AecUserConfig::plain(Plain)),
    row(USB_VOICE_AANC, false, AecUserConfig::with_buffer(Plain, VOICE_AANC_BUFFER_SIZE_MS)),
    row(MicUsers::AANC, false, AecUserConfig::plain(Plain)),
    row(VA_AANC, false, AecUserConfig::plain(Plain)),
    row(MicUsers::FIT_TEST, false, AecUserConfig::plain(Plain)),
    row(FIT_TEST_AANC, false, AecUserConfig::plain(Plain)),
    row(MicUsers::LE_MIC, false, AecUserConfig::plain(Plain)),
    row(MicUsers::LE_MIC, true, AecUserConfig::plain(Leak)),
];

/// AEC settings for a set of active users. The leakthrough bit is ignored;
/// `leakthrough_enabled` selects the rows instead.
pub fn aec_user_config(
    users: MicUsers,
    leakthrough_enabled: bool,
) -> Option<&'static AecUserConfig> {
    let users = users.difference(MicUsers::LEAKTHROUGH);
    AEC_USE_CASE_MAP
        .iter()
        .find(|r| r.users == users && r.leakthrough == leakthrough_enabled)
        .map(|r| &r.config)
}

/// Use case for a set of users, [`AecUseCase::Default`] when unlisted.
pub fn aec_use_case(users: MicUsers, leakthrough_enabled: bool) -> AecUseCase {
    aec_user_config(users, leakthrough_enabled)
        .map(|c| c.use_case)
        .unwrap_or_default()
}
