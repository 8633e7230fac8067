#![no_std]
//! Microphone arbitration for concurrent audio users.
//!
//! Several subsystems (voice calls, voice assistant, adaptive ANC,
//! leakthrough, ...) may want the same physical microphones, each at its own
//! sample rate and with the AEC reference attached. [`MicArbiter`] turns the
//! microphones on once, fans them out through a splitter to every user and
//! rebuilds the front-end when a new request cannot be served by the running
//! configuration.

mod fmt;

mod aec_map;
mod arbiter;
mod error;
mod ordered;
mod platform;
mod registry;
mod types;

pub use aec_map::{
    aec_use_case, aec_user_config, AecUseCase, AecUserConfig,
    AEC_REF_DEFAULT_MIC_TTP_LATENCY_US, DEFAULT_TERMINAL_BUFFER_SIZE,
    VOICE_AANC_BUFFER_SIZE_MS,
};
pub use arbiter::MicArbiter;
pub use error::MicError;
pub use ordered::{OrderedMic, OrderedMicList};
pub use platform::{
    AecAudioConfig, AecAudioInput, AecMicRoute, AecReference, MicHardware,
    MicPlatform, MicResampler, SplitterChain,
};
pub use registry::{MicRegistryEntry, MicUserClients};
pub use types::{
    MicChangeInfo, MicConnectParams, MicConnection, MicEvent, MicId, MicUser,
    MicUserState, MicUsers, Sink, Source, DEFAULT_TASK_PERIOD_US,
    MAX_CONCURRENT_MICS, MAX_CONCURRENT_MIC_USERS, MAX_SUPPORTED_MICROPHONES,
    MIC_USER_COUNT, MIN_SAMPLE_RATE_HZ,
};
