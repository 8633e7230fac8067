//! Async front end: requests arrive over a channel, timed messages fire from
//! the embassy timer queue and a status snapshot is published after every
//! turn.

use derive_more::From;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Receiver;
use embassy_sync::watch::Sender;
use embassy_time::{Instant, Timer};
use heapless::Vec;

use crate::chains::Platform;
use crate::error::KymeraError;
use crate::kymera::{Kymera, KymeraStatus};
use crate::op_msg::OP_MSG_MAX_WORDS;
use crate::requests::{
    A2dpStartRequest, AancParams, ScoStartParams, Seid, TonePromptRequest,
    UsbAudioRequest, UsbVoiceRequest, WiredAudioRequest,
};

/// Requests other tasks post to the audio manager.
#[derive(Debug, From)]
pub enum KymeraRequest {
    #[from]
    A2dpStart(A2dpStartRequest),
    A2dpStop(Seid),
    A2dpSetVolume(i16),
    #[from]
    ScoStart(ScoStartParams),
    ScoStop,
    ScoSetVolume(i16),
    ScoMicMute(bool),
    #[from]
    TonePromptPlay(TonePromptRequest),
    TonePromptCancel,
    ProspectiveDspPowerOn,
    AncTuningStart(u32),
    AncTuningStop,
    AancTuningStart(u32),
    AancTuningStop,
    #[from]
    EnableAdaptiveAnc(AancParams),
    DisableAdaptiveAnc,
    CreateStandaloneLeakthrough,
    DestroyStandaloneLeakthrough,
    #[from]
    WiredAudioStart(WiredAudioRequest),
    WiredAudioStop,
    WiredAudioSetVolume(i16),
    #[from]
    UsbAudioStart(UsbAudioRequest),
    UsbAudioStop,
    UsbAudioSetVolume(i16),
    #[from]
    UsbVoiceStart(UsbVoiceRequest),
    UsbVoiceStop,
    UsbVoiceSetVolume(i16),
    UsbVoiceMicMute(bool),
    OperatorMessage(Vec<u16, OP_MSG_MAX_WORDS>),
    StreamDisconnect,
}

impl<P: Platform> Kymera<P> {
    pub fn handle_request(&mut self, request: KymeraRequest) -> Result<(), KymeraError> {
        use KymeraRequest as R;
        match request {
            R::A2dpStart(req) => self.a2dp_start(req),
            R::A2dpStop(seid) => self.a2dp_stop(seid),
            R::A2dpSetVolume(volume_db) => self.a2dp_set_volume(volume_db),
            R::ScoStart(params) => self.sco_start(params),
            R::ScoStop => self.sco_stop(),
            R::ScoSetVolume(volume_db) => self.sco_set_volume(volume_db),
            R::ScoMicMute(mute) => self.sco_mic_mute(mute),
            R::TonePromptPlay(req) => self.tone_prompt_play(req),
            R::TonePromptCancel => self.tone_prompt_cancel(),
            R::ProspectiveDspPowerOn => self.prospective_dsp_power_on(),
            R::AncTuningStart(usb_rate) => self.anc_tuning_start(usb_rate),
            R::AncTuningStop => self.anc_tuning_stop(),
            R::AancTuningStart(usb_rate) => self.aanc_tuning_start(usb_rate),
            R::AancTuningStop => self.aanc_tuning_stop(),
            R::EnableAdaptiveAnc(params) => self.enable_adaptive_anc(params),
            R::DisableAdaptiveAnc => self.disable_adaptive_anc(),
            R::CreateStandaloneLeakthrough => self.create_standalone_leakthrough(),
            R::DestroyStandaloneLeakthrough => self.destroy_standalone_leakthrough(),
            R::WiredAudioStart(req) => self.wired_audio_start(req),
            R::WiredAudioStop => self.wired_audio_stop(),
            R::WiredAudioSetVolume(volume_db) => self.wired_audio_set_volume(volume_db),
            R::UsbAudioStart(req) => self.usb_audio_start(req),
            R::UsbAudioStop => self.usb_audio_stop(),
            R::UsbAudioSetVolume(volume_db) => self.usb_audio_set_volume(volume_db),
            R::UsbVoiceStart(req) => self.usb_voice_start(req),
            R::UsbVoiceStop => self.usb_voice_stop(),
            R::UsbVoiceSetVolume(volume_db) => self.usb_voice_set_volume(volume_db),
            R::UsbVoiceMicMute(mute) => self.usb_voice_mic_mute(mute),
            R::OperatorMessage(words) => self.operator_message(&words),
            R::StreamDisconnect => self.stream_disconnect(),
        }
    }
}

/// One turn: deliver what is due, then wait for a request or the next
/// timed message, whichever comes first.
pub async fn step<P, M, const N: usize, const W: usize>(
    kymera: &mut Kymera<P>,
    requests: &Receiver<'_, M, KymeraRequest, N>,
    status: &Sender<'_, M, KymeraStatus, W>,
) where
    P: Platform,
    M: RawMutex,
{
    kymera.process(Instant::now());
    status.send(kymera.status());

    let woke = match kymera.next_deadline() {
        Some(deadline) => select(requests.receive(), Timer::at(deadline)).await,
        None => Either::First(requests.receive().await),
    };

    if let Either::First(request) = woke {
        kymera.process(Instant::now());
        if let Err(e) = kymera.handle_request(request) {
            warn!("kymera request rejected: {:?}", e);
        }
    }
    kymera.process(Instant::now());
    status.send(kymera.status());
}

pub async fn run<P, M, const N: usize, const W: usize>(
    kymera: &mut Kymera<P>,
    requests: Receiver<'_, M, KymeraRequest, N>,
    status: Sender<'_, M, KymeraStatus, W>,
) -> !
where
    P: Platform,
    M: RawMutex,
{
    info!("kymera runner started");
    loop {
        step(kymera, &requests, &status).await;
    }
}
