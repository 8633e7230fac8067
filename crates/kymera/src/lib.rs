#![no_std]
//! Audio use case manager for a DSP-equipped earbud.
//!
//! [`Kymera`] serialises audio requests (A2DP, SCO, tones and prompts,
//! ANC tuning, adaptive ANC, leakthrough, USB and wired audio) through its
//! own gated message queue, tracks which use case owns the DSP, picks the
//! DSP clock for it and shares the microphones through
//! [`mic_arbiter::MicArbiter`]. The chain builders are supplied by the
//! caller through [`Platform`].

mod fmt;

mod chains;
mod clock;
mod config;
mod error;
mod kymera;
mod message;
mod op_msg;
mod queue;
mod requests;
mod runner;
mod state;

pub use chains::{
    A2dpChain, AdaptiveAncChain, AncPassthrough, AncTuningChain, ClientId,
    ClientSink, DspFramework, KymeraIndication, KymeraNotification,
    LeakthroughChain, ListenerId, OutputMixer, Platform, ScoChain, ToneChain,
    UsbAudioChain, UsbVoiceChain, WiredAudioChain,
};
pub use clock::{
    dsp_clock_config, ClockHints, ClockInputs, DspClock, DspClockConfig,
    PowerSaveMode,
};
pub use config::{
    find_sco_chain, A2dpPrediction, CallbackConfigs, CapabilityBundle,
    ChainConfigs, ChainId, KymeraConfig, KymeraFeatures, ScoChainInfo, ScoMode,
    SidetoneGain, AEC_REF_SETTLING_TIME, ANC_TUNING_START_DELAY, MAX_CLIENTS,
    MAX_LISTENERS, MIC_CONNECT_RETRY, PREPARE_FOR_PROMPT_TIMEOUT,
    PROSPECTIVE_AUDIO_OFF_TIMEOUT, QUEUE_CAPACITY, SCO_SYNC_UNMUTE_TIMEOUT,
    SIDETONE_GAIN_RAMP_STEP, SIDETONE_RAMP,
};
pub use error::{KymeraError, OpMsgError};
pub use kymera::{Kymera, KymeraStatus};
pub use message::{KymeraMessage, MessageKind};
pub use op_msg::{
    decode as decode_operator_message, AancEvent, OperatorEvent,
    OP_MSG_MAX_WORDS, PAYLOAD_NA,
};
pub use queue::{Gate, Keyed, MessageQueue};
pub use requests::{
    A2dpCodec, A2dpStartRequest, AancParams, ClientLock, ScoStartParams,
    ScoStartRequest, Seid, ToneKind, TonePromptRequest, UsbAudioRequest,
    UsbVoiceRequest, WiredAudioRequest,
};
pub use runner::{run, step, KymeraRequest};
pub use state::{KymeraState, PromptFormat, StartingLock, ToneState};
