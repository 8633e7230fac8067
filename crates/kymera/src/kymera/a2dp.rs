use crate::chains::{A2dpChain, DspFramework, KymeraNotification, OutputMixer, Platform};
use crate::error::KymeraError;
use crate::message::{KymeraMessage, MessageKind};
use crate::queue::Gate;
use crate::requests::{A2dpStartRequest, Seid};
use crate::state::{KymeraState, StartingLock};

use super::Kymera;

impl<P: Platform> Kymera<P> {
    /// Start A2DP once no other start is in progress.
    pub fn a2dp_start(&mut self, request: A2dpStartRequest) -> Result<(), KymeraError> {
        debug!("a2dp start {:?}", request.seid);
        if let Some(lock) = request.client_lock {
            lock.set();
        }
        self.send_on(KymeraMessage::A2dpStart(request), Gate::Lock)
    }

    /// Stop A2DP, or only the forwarding to the peer for a source SEID.
    /// Starts still parked on the queue are abandoned.
    pub fn a2dp_stop(&mut self, seid: Seid) -> Result<(), KymeraError> {
        debug!("a2dp stop {:?}", seid);
        self.queue.cancel_all(MessageKind::A2dpAudioSynchronised);
        self.abandon_a2dp_starts();
        let msg = if seid.is_source() {
            KymeraMessage::A2dpStopForwarding(seid)
        } else {
            KymeraMessage::A2dpStop(seid)
        };
        self.send_on(msg, Gate::Lock)
    }

    pub fn a2dp_set_volume(&mut self, volume_db: i16) -> Result<(), KymeraError> {
        self.queue.cancel_first(MessageKind::A2dpSetVolume);
        self.send_on(KymeraMessage::A2dpSetVolume(volume_db), Gate::Lock)
    }

    /// Unmute the output once the stream has been running for `delay`.
    pub fn schedule_a2dp_sync_unmute(
        &mut self,
        delay: embassy_time::Duration,
    ) -> Result<(), KymeraError> {
        self.queue.cancel_all(MessageKind::A2dpAudioSynchronised);
        self.send_later(KymeraMessage::A2dpAudioSynchronised, delay)
    }

    fn abandon_a2dp_starts(&mut self) {
        let mut abandoned = false;
        while let Some(msg) = self
            .queue
            .cancel_first(MessageKind::A2dpStart)
            .or_else(|| self.queue.cancel_first(MessageKind::A2dpStarting))
        {
            if let KymeraMessage::A2dpStart(req) | KymeraMessage::A2dpStarting(req) = msg {
                if let Some(lock) = req.client_lock {
                    lock.clear();
                }
            }
            abandoned = true;
        }
        if abandoned {
            debug!("a2dp start abandoned");
            self.lock.remove(StartingLock::A2DP_STARTING);
        }
    }

    pub(super) fn handle_a2dp_start(
        &mut self,
        mut request: A2dpStartRequest,
    ) -> Result<(), KymeraError> {
        if !request.seid.is_source() && self.busy_lock {
            debug!("a2dp start deferred while {:?}", self.state);
            return self.send_on(KymeraMessage::A2dpStart(request), Gate::BusyLock);
        }

        let stop = if request.seid.is_source() {
            MessageKind::A2dpStopForwarding
        } else {
            MessageKind::A2dpStop
        };
        if self.queue.cancel_first(stop).is_some() {
            info!("a2dp start cancelled by a pending stop");
            if let Some(lock) = request.client_lock {
                lock.clear();
            }
            self.lock.remove(StartingLock::A2DP_STARTING);
            return Ok(());
        }

        if request.pre_start_delay > 0 {
            request.pre_start_delay -= 1;
            self.lock.insert(StartingLock::A2DP_STARTING);
            return self.send(KymeraMessage::A2dpStart(request));
        }

        self.handle_a2dp_starting(request)
    }

    pub(super) fn handle_a2dp_starting(
        &mut self,
        request: A2dpStartRequest,
    ) -> Result<(), KymeraError> {
        if request.seid.is_source() {
            if self.state == KymeraState::A2dpStreaming {
                self.platform.a2dp().start_forwarding(request.seid);
                self.set_state(KymeraState::A2dpStreamingWithForwarding);
            } else {
                debug!("a2dp forwarding ignored in {:?}", self.state);
            }
            self.finish_a2dp_start(&request);
            return Ok(());
        }

        if !self.state.is_a2dp_starting() {
            self.platform.framework().enable();
            self.a2dp_seid = Some(request.seid);
            self.a2dp_codec = Some(request.codec);
            self.set_state(KymeraState::A2dpStartingA);
        }

        if self.platform.a2dp().start(&request) {
            self.set_state(KymeraState::A2dpStreaming);
            self.finish_a2dp_start(&request);
            self.notify_listeners(KymeraNotification::EqAvailable);
            Ok(())
        } else {
            let next = self.state.next_a2dp_stage();
            self.set_state(next);
            self.lock.insert(StartingLock::A2DP_STARTING);
            self.send(KymeraMessage::A2dpStarting(request))
        }
    }

    fn finish_a2dp_start(&mut self, request: &A2dpStartRequest) {
        if let Some(lock) = request.client_lock {
            lock.clear();
        }
        self.lock.remove(StartingLock::A2DP_STARTING);
    }

    pub(super) fn handle_a2dp_stop(&mut self, seid: Seid) {
        self.abandon_a2dp_starts();

        if seid.is_source() {
            if self.state == KymeraState::A2dpStreamingWithForwarding {
                self.platform.a2dp().stop_forwarding();
                self.set_state(KymeraState::A2dpStreaming);
            } else {
                debug!("a2dp forwarding stop in {:?}", self.state);
            }
        } else {
            match self.state {
                KymeraState::A2dpStreamingWithForwarding => {
                    self.platform.a2dp().stop_forwarding();
                    self.stop_a2dp_chain(seid);
                }
                KymeraState::A2dpStreaming
                | KymeraState::A2dpStartingA
                | KymeraState::A2dpStartingB
                | KymeraState::A2dpStartingC => self.stop_a2dp_chain(seid),
                KymeraState::Idle => {}
                state => info!("a2dp stop in {:?} ignored", state),
            }
        }
        self.notify_listeners(KymeraNotification::EqUnavailable);
    }

    fn stop_a2dp_chain(&mut self, seid: Seid) {
        self.platform.framework().enable();
        self.platform.a2dp().stop(seid);
        self.a2dp_seid = None;
        self.a2dp_codec = None;
        self.set_state(KymeraState::Idle);
        // Once for the stop, once for the start.
        self.platform.framework().disable();
        self.platform.framework().disable();
    }

    pub(super) fn handle_a2dp_set_volume(&mut self, volume_db: i16) {
        if self.state.is_a2dp() {
            self.platform.a2dp().set_volume(volume_db);
        }
    }

    pub(super) fn handle_a2dp_audio_synchronised(&mut self) {
        if matches!(
            self.state,
            KymeraState::A2dpStreaming | KymeraState::A2dpStreamingWithForwarding
        ) {
            debug!("a2dp audio synchronised, unmute");
            self.platform.mixer().mute_main_channel(false);
        }
    }
}
