//! Services the manager drives but does not implement: per use case chain
//! builders, the DSP framework, the output mixer and client delivery.

use mic_arbiter::{MicPlatform, MicUserClients};

use crate::clock::{ClockHints, DspClockConfig};
use crate::config::{CapabilityBundle, SidetoneGain};
use crate::requests::{
    A2dpStartRequest, AancParams, ScoStartRequest, Seid, TonePromptRequest,
    UsbAudioRequest, UsbVoiceRequest, WiredAudioRequest,
};
use crate::state::PromptFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ListenerId(pub u8);

/// Sent to every registered client together with a payload word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KymeraIndication {
    AancEdActiveTrigger,
    AancEdActiveClear,
    AancEdInactiveTrigger,
    AancEdInactiveClear,
    AancQuietModeTrigger,
    AancQuietModeClear,
    AancBadEnvironmentTrigger,
    AancBadEnvironmentClear,
    GoodFit,
    BadFit,
    PromptEnd,
}

/// Sent to notification listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KymeraNotification {
    EqAvailable,
    EqUnavailable,
    ToneStarted(u16),
    PromptStarted(u16),
}

pub trait DspFramework {
    fn enable(&mut self);
    fn disable(&mut self);
    fn load_bundles(&mut self, _bundles: &[CapabilityBundle]) {}
    fn configure_clock(&mut self, config: &DspClockConfig);
    /// Clock requirements of subsystems outside the manager.
    fn hints(&self) -> ClockHints {
        ClockHints::default()
    }
}

/// ANC hardware passthrough, only allowed while no use case runs.
pub trait AncPassthrough {
    fn set_idle(&mut self, idle: bool);
}

pub trait OutputMixer {
    fn is_chain_in_use(&self) -> bool;
    fn mute_main_channel(&mut self, mute: bool);
    fn main_sample_rate(&self) -> u32;
}

pub trait ClientSink {
    fn indicate(&mut self, client: ClientId, indication: KymeraIndication, payload: u16);
    fn notify(&mut self, listener: ListenerId, notification: KymeraNotification);
}

pub trait A2dpChain {
    /// Run one stage of the chain start. Returns `true` once streaming.
    fn start(&mut self, request: &A2dpStartRequest) -> bool;
    fn stop(&mut self, seid: Seid);
    fn start_forwarding(&mut self, seid: Seid);
    fn stop_forwarding(&mut self);
    fn set_volume(&mut self, volume_db: i16);
}

pub trait ScoChain {
    fn create(&mut self, request: &ScoStartRequest);
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn destroy(&mut self);
    fn set_volume(&mut self, volume_db: i16);
    fn mic_mute(&mut self, mute: bool);
}

pub trait ToneChain {
    fn play(&mut self, request: &TonePromptRequest);
    /// Build the prompt chain ahead of a prompt.
    fn prepare(&mut self, format: PromptFormat, rate: u32);
    fn stop(&mut self);
}

pub trait AncTuningChain {
    fn start(&mut self, usb_rate: u32);
    fn stop(&mut self);
}

pub trait AdaptiveAncChain {
    fn create(&mut self, params: &AancParams);
    fn start(&mut self);
    fn destroy(&mut self);
    fn start_tuning(&mut self, usb_rate: u32);
    fn stop_tuning(&mut self);
}

pub trait LeakthroughChain {
    /// Build the output side when no other use case provides it.
    fn start_output(&mut self);
    fn stop_output(&mut self);
    fn enable_sidetone_path(&mut self, enable: bool);
    fn set_sidetone_gain(&mut self, gain: SidetoneGain);
}

pub trait UsbAudioChain {
    fn start(&mut self, request: &UsbAudioRequest) -> bool;
    fn stop(&mut self);
    fn set_volume(&mut self, volume_db: i16);
}

pub trait UsbVoiceChain {
    fn start(&mut self, request: &UsbVoiceRequest) -> bool;
    fn stop(&mut self);
    fn set_volume(&mut self, volume_db: i16);
    fn mic_mute(&mut self, mute: bool);
}

pub trait WiredAudioChain {
    fn start(&mut self, request: &WiredAudioRequest) -> bool;
    fn stop(&mut self);
    fn set_volume(&mut self, volume_db: i16);
}

/// Everything the manager touches, bundled.
pub trait Platform {
    type Framework: DspFramework;
    type Passthrough: AncPassthrough;
    type Mixer: OutputMixer;
    type Clients: ClientSink;
    type A2dp: A2dpChain;
    type Sco: ScoChain;
    type Tone: ToneChain;
    type AncTuning: AncTuningChain;
    type Aanc: AdaptiveAncChain;
    type Leakthrough: LeakthroughChain;
    type UsbAudio: UsbAudioChain;
    type UsbVoice: UsbVoiceChain;
    type Wired: WiredAudioChain;
    type MicHw: MicPlatform;
    type MicClients: MicUserClients;

    fn framework(&mut self) -> &mut Self::Framework;
    fn passthrough(&mut self) -> &mut Self::Passthrough;
    fn mixer(&mut self) -> &mut Self::Mixer;
    fn clients(&mut self) -> &mut Self::Clients;
    fn a2dp(&mut self) -> &mut Self::A2dp;
    fn sco(&mut self) -> &mut Self::Sco;
    fn tone(&mut self) -> &mut Self::Tone;
    fn anc_tuning(&mut self) -> &mut Self::AncTuning;
    fn aanc(&mut self) -> &mut Self::Aanc;
    fn leakthrough(&mut self) -> &mut Self::Leakthrough;
    fn usb_audio(&mut self) -> &mut Self::UsbAudio;
    fn usb_voice(&mut self) -> &mut Self::UsbVoice;
    fn wired(&mut self) -> &mut Self::Wired;
    /// Microphone hardware and the microphone users, borrowed together for
    /// the arbiter.
    fn mic_parts(&mut self) -> (&mut Self::MicHw, &mut Self::MicClients);
}
