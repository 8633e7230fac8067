//! USB audio, USB voice and wired analogue audio.

use mic_arbiter::MicUser;

use crate::chains::{DspFramework, Platform, UsbAudioChain, UsbVoiceChain, WiredAudioChain};
use crate::error::KymeraError;
use crate::message::{KymeraMessage, MessageKind};
use crate::queue::Gate;
use crate::requests::{UsbAudioRequest, UsbVoiceRequest, WiredAudioRequest};
use crate::state::KymeraState;

use super::Kymera;

impl<P: Platform> Kymera<P> {
    pub fn usb_audio_start(&mut self, request: UsbAudioRequest) -> Result<(), KymeraError> {
        if let Some(lock) = request.client_lock {
            lock.set();
        }
        self.send_on(KymeraMessage::UsbAudioStart(request), Gate::Lock)
    }

    pub fn usb_audio_stop(&mut self) -> Result<(), KymeraError> {
        self.send_on(KymeraMessage::UsbAudioStop, Gate::Lock)
    }

    pub fn usb_audio_set_volume(&mut self, volume_db: i16) -> Result<(), KymeraError> {
        self.queue.cancel_first(MessageKind::UsbAudioSetVolume);
        self.send_on(KymeraMessage::UsbAudioSetVolume(volume_db), Gate::Lock)
    }

    pub fn usb_voice_start(&mut self, request: UsbVoiceRequest) -> Result<(), KymeraError> {
        self.send_on(KymeraMessage::UsbVoiceStart(request), Gate::Lock)
    }

    pub fn usb_voice_stop(&mut self) -> Result<(), KymeraError> {
        self.send_on(KymeraMessage::UsbVoiceStop, Gate::Lock)
    }

    pub fn usb_voice_set_volume(&mut self, volume_db: i16) -> Result<(), KymeraError> {
        self.queue.cancel_first(MessageKind::UsbVoiceSetVolume);
        self.send_on(KymeraMessage::UsbVoiceSetVolume(volume_db), Gate::Lock)
    }

    pub fn usb_voice_mic_mute(&mut self, mute: bool) -> Result<(), KymeraError> {
        self.send(KymeraMessage::UsbVoiceMicMute(mute))
    }

    pub fn wired_audio_start(&mut self, request: WiredAudioRequest) -> Result<(), KymeraError> {
        self.send_on(KymeraMessage::WiredAudioStart(request), Gate::Lock)
    }

    pub fn wired_audio_stop(&mut self) -> Result<(), KymeraError> {
        self.send_on(KymeraMessage::WiredAudioStop, Gate::Lock)
    }

    pub fn wired_audio_set_volume(&mut self, volume_db: i16) -> Result<(), KymeraError> {
        self.queue.cancel_first(MessageKind::WiredAudioSetVolume);
        self.send_on(KymeraMessage::WiredAudioSetVolume(volume_db), Gate::Lock)
    }

    // ------------------------------------------------------------------
    // USB audio
    // ------------------------------------------------------------------

    pub(super) fn handle_usb_audio_start(
        &mut self,
        request: UsbAudioRequest,
    ) -> Result<(), KymeraError> {
        if self.busy_lock {
            return self.send_on(KymeraMessage::UsbAudioStart(request), Gate::BusyLock);
        }
        self.platform.framework().enable();
        self.set_state(KymeraState::UsbAudioActive);
        let started = self.platform.usb_audio().start(&request);
        if let Some(lock) = request.client_lock {
            lock.clear();
        }
        if !started {
            warn!("usb audio chain failed to start");
            self.stop_usb_audio();
            return Err(KymeraError::ChainStartFailed);
        }
        Ok(())
    }

    fn stop_usb_audio(&mut self) {
        self.platform.usb_audio().stop();
        self.set_state(KymeraState::Idle);
        self.platform.framework().disable();
    }

    pub(super) fn handle_usb_audio_stop(&mut self) {
        if self.state == KymeraState::UsbAudioActive {
            self.stop_usb_audio();
        } else {
            debug!("usb audio stop in {:?} ignored", self.state);
        }
    }

    pub(super) fn handle_usb_audio_set_volume(&mut self, volume_db: i16) {
        if self.state == KymeraState::UsbAudioActive {
            self.platform.usb_audio().set_volume(volume_db);
        }
    }

    // ------------------------------------------------------------------
    // USB voice
    // ------------------------------------------------------------------

    fn is_usb_voice(&self) -> bool {
        matches!(
            self.state,
            KymeraState::UsbVoiceActive | KymeraState::UsbScoVoiceActive
        )
    }

    pub(super) fn handle_usb_voice_start(
        &mut self,
        request: UsbVoiceRequest,
    ) -> Result<(), KymeraError> {
        if self.busy_lock {
            return self.send_on(KymeraMessage::UsbVoiceStart(request), Gate::BusyLock);
        }
        self.platform.framework().enable();
        self.set_state(if request.sco_interface {
            KymeraState::UsbScoVoiceActive
        } else {
            KymeraState::UsbVoiceActive
        });

        let (hw, clients) = self.platform.mic_parts();
        if let Err(e) = self.mics.connect(hw, clients, MicUser::UsbVoice) {
            warn!("usb voice microphones unavailable");
            self.set_state(KymeraState::Idle);
            self.platform.framework().disable();
            return Err(e.into());
        }
        if !self.platform.usb_voice().start(&request) {
            warn!("usb voice chain failed to start");
            self.stop_usb_voice();
            return Err(KymeraError::ChainStartFailed);
        }
        self.apply_clock_policy();
        Ok(())
    }

    fn stop_usb_voice(&mut self) {
        self.platform.usb_voice().stop();
        let (hw, clients) = self.platform.mic_parts();
        self.mics.disconnect(hw, clients, MicUser::UsbVoice);
        self.set_state(KymeraState::Idle);
        self.platform.framework().disable();
    }

    pub(super) fn handle_usb_voice_stop(&mut self) {
        if self.is_usb_voice() {
            self.stop_usb_voice();
        } else {
            debug!("usb voice stop in {:?} ignored", self.state);
        }
    }

    pub(super) fn handle_usb_voice_set_volume(&mut self, volume_db: i16) {
        if self.is_usb_voice() {
            self.platform.usb_voice().set_volume(volume_db);
        }
    }

    pub(super) fn handle_usb_voice_mic_mute(&mut self, mute: bool) {
        if self.is_usb_voice() {
            self.platform.usb_voice().mic_mute(mute);
        }
    }

    // ------------------------------------------------------------------
    // Wired audio
    // ------------------------------------------------------------------

    pub(super) fn handle_wired_audio_start(
        &mut self,
        request: WiredAudioRequest,
    ) -> Result<(), KymeraError> {
        if self.busy_lock {
            return self.send_on(KymeraMessage::WiredAudioStart(request), Gate::BusyLock);
        }
        self.platform.framework().enable();
        self.set_state(KymeraState::WiredAudioPlaying);
        if !self.platform.wired().start(&request) {
            warn!("wired audio chain failed to start");
            self.stop_wired_audio();
            return Err(KymeraError::ChainStartFailed);
        }
        Ok(())
    }

    fn stop_wired_audio(&mut self) {
        self.platform.wired().stop();
        self.set_state(KymeraState::Idle);
        self.platform.framework().disable();
    }

    pub(super) fn handle_wired_audio_stop(&mut self) {
        if self.state == KymeraState::WiredAudioPlaying {
            self.stop_wired_audio();
        } else {
            debug!("wired audio stop in {:?} ignored", self.state);
        }
    }

    pub(super) fn handle_wired_audio_set_volume(&mut self, volume_db: i16) {
        if self.state == KymeraState::WiredAudioPlaying {
            self.platform.wired().set_volume(volume_db);
        }
    }
}
