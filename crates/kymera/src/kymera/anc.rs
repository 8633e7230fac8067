use mic_arbiter::MicUser;

use crate::chains::{AdaptiveAncChain, AncTuningChain, DspFramework, Platform};
use crate::config::{ANC_TUNING_START_DELAY, MIC_CONNECT_RETRY};
use crate::error::KymeraError;
use crate::message::{KymeraMessage, MessageKind};
use crate::queue::Gate;
use crate::requests::AancParams;
use crate::state::KymeraState;

use super::{AancStatus, Kymera, Tuning};

impl<P: Platform> Kymera<P> {
    /// Start ANC tuning over USB. Waits for a busy use case to end and
    /// lets a playing tone finish first.
    pub fn anc_tuning_start(&mut self, usb_rate: u32) -> Result<(), KymeraError> {
        self.queue_tuning_start(KymeraMessage::AncTuningStart(usb_rate))
    }

    /// Not gated: the running session holds the starting lock itself.
    pub fn anc_tuning_stop(&mut self) -> Result<(), KymeraError> {
        self.send(KymeraMessage::AncTuningStop)
    }

    pub fn aanc_tuning_start(&mut self, usb_rate: u32) -> Result<(), KymeraError> {
        self.queue_tuning_start(KymeraMessage::AancTuningStart(usb_rate))
    }

    pub fn aanc_tuning_stop(&mut self) -> Result<(), KymeraError> {
        self.send(KymeraMessage::AancTuningStop)
    }

    fn queue_tuning_start(&mut self, msg: KymeraMessage) -> Result<(), KymeraError> {
        if self.busy_lock {
            self.send_on(msg, Gate::BusyLock)
        } else if self.state == KymeraState::TonePlaying {
            self.send_later(msg, ANC_TUNING_START_DELAY)
        } else {
            self.send(msg)
        }
    }

    pub(super) fn handle_tuning_start(&mut self, tuning: Tuning, usb_rate: u32) {
        if self.tuning.is_some() {
            debug!("tuning {:?} already running", tuning);
            return;
        }
        self.platform.framework().enable();
        self.set_state(KymeraState::AncTuning);
        match tuning {
            Tuning::Anc => self.platform.anc_tuning().start(usb_rate),
            Tuning::Aanc => self.platform.aanc().start_tuning(usb_rate),
        }
        self.tuning = Some(tuning);
        // Held for the whole session so lock-gated starts wait for the stop.
        self.lock.insert(tuning.lock_bit());
    }

    pub(super) fn handle_tuning_stop(&mut self, tuning: Tuning) {
        if self.tuning != Some(tuning) || self.state != KymeraState::AncTuning {
            debug!("tuning {:?} not running", tuning);
            return;
        }
        match tuning {
            Tuning::Anc => self.platform.anc_tuning().stop(),
            Tuning::Aanc => self.platform.aanc().stop_tuning(),
        }
        self.tuning = None;
        self.lock.remove(tuning.lock_bit());
        self.set_state(KymeraState::Idle);
        self.platform.framework().disable();
    }

    pub fn enable_adaptive_anc(&mut self, params: AancParams) -> Result<(), KymeraError> {
        self.send(KymeraMessage::AancEnable(params))
    }

    pub fn disable_adaptive_anc(&mut self) -> Result<(), KymeraError> {
        self.send(KymeraMessage::AancDisable)
    }

    pub fn is_adaptive_anc_running(&self) -> bool {
        self.aanc == AancStatus::Running
    }

    pub(super) fn handle_aanc_enable(&mut self, params: AancParams) -> Result<(), KymeraError> {
        if self.config.chains.aanc.is_none() {
            warn!("adaptive anc has no chain configured");
            return Err(KymeraError::NotConfigured);
        }
        if self.aanc != AancStatus::Off {
            debug!("adaptive anc already enabled");
            return Ok(());
        }
        self.platform.framework().enable();
        self.platform.aanc().create(&params);
        self.aanc = AancStatus::WaitingForMics;
        self.connect_aanc_mics()
    }

    fn connect_aanc_mics(&mut self) -> Result<(), KymeraError> {
        let (hw, clients) = self.platform.mic_parts();
        if self.mics.connect(hw, clients, MicUser::Aanc).is_err() {
            debug!("adaptive anc microphones busy, retrying");
            return self.send_later(KymeraMessage::MicConnectionTimeoutAnc, MIC_CONNECT_RETRY);
        }
        self.platform.aanc().start();
        self.aanc = AancStatus::Running;
        if self.state == KymeraState::Idle {
            self.set_state(KymeraState::AdaptiveAncStarted);
        } else {
            self.apply_clock_policy();
        }
        Ok(())
    }

    pub(super) fn handle_aanc_mic_retry(&mut self) -> Result<(), KymeraError> {
        if self.aanc != AancStatus::WaitingForMics {
            return Ok(());
        }
        self.connect_aanc_mics()
    }

    pub(super) fn handle_aanc_disable(&mut self) {
        self.queue.cancel_all(MessageKind::MicConnectionTimeoutAnc);
        match self.aanc {
            AancStatus::Off => return,
            AancStatus::Running => {
                let (hw, clients) = self.platform.mic_parts();
                self.mics.disconnect(hw, clients, MicUser::Aanc);
            }
            AancStatus::WaitingForMics => {}
        }
        self.platform.aanc().destroy();
        self.aanc = AancStatus::Off;
        if self.state == KymeraState::AdaptiveAncStarted {
            self.set_state(KymeraState::Idle);
        } else {
            self.apply_clock_policy();
        }
        self.platform.framework().disable();
    }
}
