use embassy_time::Duration;
use mic_arbiter::MicUser;

use crate::chains::{DspFramework, OutputMixer, Platform, ScoChain};
use crate::config::{find_sco_chain, SCO_SYNC_UNMUTE_TIMEOUT};
use crate::error::KymeraError;
use crate::message::{KymeraMessage, MessageKind};
use crate::queue::Gate;
use crate::requests::{ScoStartParams, ScoStartRequest};
use crate::state::{KymeraState, StartingLock};

use super::Kymera;

impl<P: Platform> Kymera<P> {
    /// Start a voice call on the chain matching the link mode and the
    /// configured microphone count.
    pub fn sco_start(&mut self, params: ScoStartParams) -> Result<(), KymeraError> {
        if self.config.sco_chains.is_empty() {
            warn!("sco start without a chain table");
            return Err(KymeraError::NotConfigured);
        }
        let chain = find_sco_chain(
            self.config.sco_chains,
            params.mode,
            self.config.voice_mic_count,
        )
        .ok_or(KymeraError::NoScoChain)?;
        let sink = params.sink.ok_or(KymeraError::InvalidSink)?;
        debug!("sco start {:?} on {:?}", params.mode, chain.chain);

        let request = ScoStartRequest {
            sink,
            chain,
            wesco: params.wesco,
            volume_db: params.volume_db,
            pre_start_delay: params.pre_start_delay,
            secondary: params.secondary,
            started: params.started,
        };
        self.send_on(KymeraMessage::ScoStart(request), Gate::Lock)
    }

    pub fn sco_stop(&mut self) -> Result<(), KymeraError> {
        self.send_on(KymeraMessage::ScoStop, Gate::Lock)
    }

    pub fn sco_set_volume(&mut self, volume_db: i16) -> Result<(), KymeraError> {
        self.queue.cancel_first(MessageKind::ScoSetVolume);
        self.send_on(KymeraMessage::ScoSetVolume(volume_db), Gate::Lock)
    }

    pub fn sco_mic_mute(&mut self, mute: bool) -> Result<(), KymeraError> {
        self.send(KymeraMessage::ScoMicMute(mute))
    }

    /// Unmute the call audio after `delay` unless synchronisation is
    /// signalled again first.
    pub fn schedule_sco_sync_unmute(&mut self, delay: Duration) -> Result<(), KymeraError> {
        self.queue.cancel_all(MessageKind::ScoAudioSynchronised);
        self.send_later(KymeraMessage::ScoAudioSynchronised, delay)
    }

    pub(super) fn handle_sco_start(
        &mut self,
        mut request: ScoStartRequest,
    ) -> Result<(), KymeraError> {
        if self.busy_lock {
            debug!("sco start deferred while {:?}", self.state);
            return self.send_on(KymeraMessage::ScoStart(request), Gate::BusyLock);
        }
        if request.pre_start_delay > 0 {
            request.pre_start_delay -= 1;
            self.lock.insert(StartingLock::SCO_STARTING);
            return self.send(KymeraMessage::ScoStart(request));
        }

        let result = self.start_sco(&request);
        self.lock.remove(StartingLock::SCO_STARTING);
        result
    }

    fn start_sco(&mut self, request: &ScoStartRequest) -> Result<(), KymeraError> {
        self.stop_tone();
        self.sco_chain = Some(request.chain);
        self.set_state(if request.secondary {
            KymeraState::ScoSlaveActive
        } else {
            KymeraState::ScoActive
        });

        self.platform.framework().enable();
        self.platform.sco().create(request);
        self.platform.mixer().mute_main_channel(true);

        let (hw, clients) = self.platform.mic_parts();
        if let Err(e) = self.mics.connect(hw, clients, MicUser::Sco) {
            warn!("sco microphones unavailable");
            self.rollback_sco();
            return Err(e.into());
        }
        if !self.platform.sco().start() {
            warn!("sco chain failed to start");
            self.stop_sco();
            return Err(KymeraError::ChainStartFailed);
        }
        self.apply_clock_policy();
        self.schedule_sco_sync_unmute(SCO_SYNC_UNMUTE_TIMEOUT)?;
        if let Some(started) = request.started {
            started();
        }
        Ok(())
    }

    /// Undo a start that never got its microphones.
    fn rollback_sco(&mut self) {
        self.platform.sco().destroy();
        self.sco_chain = None;
        self.set_state(KymeraState::Idle);
        self.platform.framework().disable();
    }

    fn stop_sco(&mut self) {
        if self.sco_chain.take().is_none() {
            debug!("sco stop without a chain");
            return;
        }
        self.platform.sco().stop();
        let (hw, clients) = self.platform.mic_parts();
        self.mics.disconnect(hw, clients, MicUser::Sco);
        self.platform.sco().destroy();
        self.set_state(KymeraState::Idle);
        self.platform.framework().disable();
    }

    pub(super) fn handle_sco_stop(&mut self) {
        self.queue.cancel_first(MessageKind::ScoAudioSynchronised);
        self.stop_sco();
    }

    pub(super) fn handle_sco_set_volume(&mut self, volume_db: i16) {
        if self.state.is_sco() {
            self.platform.sco().set_volume(volume_db);
        }
    }

    pub(super) fn handle_sco_mic_mute(&mut self, mute: bool) {
        if self.state.is_sco() {
            self.platform.sco().mic_mute(mute);
        }
    }

    pub(super) fn handle_sco_audio_synchronised(&mut self) {
        if self.state == KymeraState::ScoActive {
            debug!("sco audio synchronised, unmute");
            self.platform.mixer().mute_main_channel(false);
        }
    }
}
