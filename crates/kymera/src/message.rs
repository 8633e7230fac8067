use heapless::Vec;

use crate::op_msg::OP_MSG_MAX_WORDS;
use crate::queue::Keyed;
use crate::requests::{
    A2dpStartRequest, AancParams, ScoStartRequest, Seid, TonePromptRequest,
    UsbAudioRequest, UsbVoiceRequest, WiredAudioRequest,
};

/// Work items on the manager's own queue.
#[derive(Debug, Clone)]
pub enum KymeraMessage {
    A2dpStart(A2dpStartRequest),
    /// Next stage of a multi-step A2DP chain start.
    A2dpStarting(A2dpStartRequest),
    A2dpStop(Seid),
    A2dpStopForwarding(Seid),
    A2dpSetVolume(i16),
    A2dpAudioSynchronised,
    ScoStart(ScoStartRequest),
    ScoStop,
    ScoSetVolume(i16),
    ScoMicMute(bool),
    ScoAudioSynchronised,
    TonePromptPlay(TonePromptRequest),
    TonePromptStop,
    PrepareForPromptTimeout,
    ProspectivePowerOff,
    AncTuningStart(u32),
    AncTuningStop,
    AancTuningStart(u32),
    AancTuningStop,
    AancEnable(AancParams),
    AancDisable,
    MicConnectionTimeoutAnc,
    CreateStandaloneLeakthrough,
    DestroyStandaloneLeakthrough,
    MicConnectionTimeoutLeakthrough,
    SidetoneEnable,
    SidetoneGainRampup,
    WiredAudioStart(WiredAudioRequest),
    WiredAudioStop,
    WiredAudioSetVolume(i16),
    UsbAudioStart(UsbAudioRequest),
    UsbAudioStop,
    UsbAudioSetVolume(i16),
    UsbVoiceStart(UsbVoiceRequest),
    UsbVoiceStop,
    UsbVoiceSetVolume(i16),
    UsbVoiceMicMute(bool),
    OperatorMessage(Vec<u16, OP_MSG_MAX_WORDS>),
    StreamDisconnect,
}

/// Payload-free identity of a [`KymeraMessage`], used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageKind {
    A2dpStart,
    A2dpStarting,
    A2dpStop,
    A2dpStopForwarding,
    A2dpSetVolume,
    A2dpAudioSynchronised,
    ScoStart,
    ScoStop,
    ScoSetVolume,
    ScoMicMute,
    ScoAudioSynchronised,
    TonePromptPlay,
    TonePromptStop,
    PrepareForPromptTimeout,
    ProspectivePowerOff,
    AncTuningStart,
    AncTuningStop,
    AancTuningStart,
    AancTuningStop,
    AancEnable,
    AancDisable,
    MicConnectionTimeoutAnc,
    CreateStandaloneLeakthrough,
    DestroyStandaloneLeakthrough,
    MicConnectionTimeoutLeakthrough,
    SidetoneEnable,
    SidetoneGainRampup,
    WiredAudioStart,
    WiredAudioStop,
    WiredAudioSetVolume,
    UsbAudioStart,
    UsbAudioStop,
    UsbAudioSetVolume,
    UsbVoiceStart,
    UsbVoiceStop,
    UsbVoiceSetVolume,
    UsbVoiceMicMute,
    OperatorMessage,
    StreamDisconnect,
}

impl Keyed for KymeraMessage {
    type Key = MessageKind;

    fn key(&self) -> MessageKind {
        use KymeraMessage as M;
        match self {
            M::A2dpStart(_) => MessageKind::A2dpStart,
            M::A2dpStarting(_) => MessageKind::A2dpStarting,
            M::A2dpStop(_) => MessageKind::A2dpStop,
            M::A2dpStopForwarding(_) => MessageKind::A2dpStopForwarding,
            M::A2dpSetVolume(_) => MessageKind::A2dpSetVolume,
            M::A2dpAudioSynchronised => MessageKind::A2dpAudioSynchronised,
            M::ScoStart(_) => MessageKind::ScoStart,
            M::ScoStop => MessageKind::ScoStop,
            M::ScoSetVolume(_) => MessageKind::ScoSetVolume,
            M::ScoMicMute(_) => MessageKind::ScoMicMute,
            M::ScoAudioSynchronised => MessageKind::ScoAudioSynchronised,
            M::TonePromptPlay(_) => MessageKind::TonePromptPlay,
            M::TonePromptStop => MessageKind::TonePromptStop,
            M::PrepareForPromptTimeout => MessageKind::PrepareForPromptTimeout,
            M::ProspectivePowerOff => MessageKind::ProspectivePowerOff,
            M::AncTuningStart(_) => MessageKind::AncTuningStart,
            M::AncTuningStop => MessageKind::AncTuningStop,
            M::AancTuningStart(_) => MessageKind::AancTuningStart,
            M::AancTuningStop => MessageKind::AancTuningStop,
            M::AancEnable(_) => MessageKind::AancEnable,
            M::AancDisable => MessageKind::AancDisable,
            M::MicConnectionTimeoutAnc => MessageKind::MicConnectionTimeoutAnc,
            M::CreateStandaloneLeakthrough => {
                MessageKind::CreateStandaloneLeakthrough
            }
            M::DestroyStandaloneLeakthrough => {
                MessageKind::DestroyStandaloneLeakthrough
            }
            M::MicConnectionTimeoutLeakthrough => {
                MessageKind::MicConnectionTimeoutLeakthrough
            }
            M::SidetoneEnable => MessageKind::SidetoneEnable,
            M::SidetoneGainRampup => MessageKind::SidetoneGainRampup,
            M::WiredAudioStart(_) => MessageKind::WiredAudioStart,
            M::WiredAudioStop => MessageKind::WiredAudioStop,
            M::WiredAudioSetVolume(_) => MessageKind::WiredAudioSetVolume,
            M::UsbAudioStart(_) => MessageKind::UsbAudioStart,
            M::UsbAudioStop => MessageKind::UsbAudioStop,
            M::UsbAudioSetVolume(_) => MessageKind::UsbAudioSetVolume,
            M::UsbVoiceStart(_) => MessageKind::UsbVoiceStart,
            M::UsbVoiceStop => MessageKind::UsbVoiceStop,
            M::UsbVoiceSetVolume(_) => MessageKind::UsbVoiceSetVolume,
            M::UsbVoiceMicMute(_) => MessageKind::UsbVoiceMicMute,
            M::OperatorMessage(_) => MessageKind::OperatorMessage,
            M::StreamDisconnect => MessageKind::StreamDisconnect,
        }
    }
}
