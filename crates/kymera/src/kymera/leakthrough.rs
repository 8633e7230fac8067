use crate::chains::{DspFramework, LeakthroughChain, OutputMixer, Platform};
use crate::config::{
    AEC_REF_SETTLING_TIME, MIC_CONNECT_RETRY, PROSPECTIVE_AUDIO_OFF_TIMEOUT,
    SIDETONE_GAIN_RAMP_STEP, SIDETONE_RAMP,
};
use crate::error::KymeraError;
use crate::message::{KymeraMessage, MessageKind};
use crate::queue::Gate;
use crate::state::KymeraState;

use super::Kymera;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct LeakthroughStatus {
    /// A create was handled and holds a framework reference.
    pub requested: bool,
    pub active: bool,
    /// The leakthrough built its own output chain.
    pub output_chain_created: bool,
    pub gain_index: usize,
}

impl<P: Platform> Kymera<P> {
    pub fn create_standalone_leakthrough(&mut self) -> Result<(), KymeraError> {
        self.send_on(KymeraMessage::CreateStandaloneLeakthrough, Gate::Lock)
    }

    pub fn destroy_standalone_leakthrough(&mut self) -> Result<(), KymeraError> {
        self.send_on(KymeraMessage::DestroyStandaloneLeakthrough, Gate::Lock)
    }

    pub fn is_leakthrough_active(&self) -> bool {
        self.leakthrough.active
    }

    pub(super) fn handle_leakthrough_create(&mut self) -> Result<(), KymeraError> {
        if self.config.chains.leakthrough.is_none() {
            warn!("leakthrough has no chain configured");
            return Err(KymeraError::NotConfigured);
        }
        if self.leakthrough.requested {
            debug!("leakthrough already created");
            return Ok(());
        }
        self.leakthrough.requested = true;
        self.platform.framework().enable();
        self.create_leakthrough_chain()
    }

    pub(super) fn handle_leakthrough_mic_retry(&mut self) -> Result<(), KymeraError> {
        if !self.leakthrough.requested || self.leakthrough.active {
            return Ok(());
        }
        self.create_leakthrough_chain()
    }

    fn create_leakthrough_chain(&mut self) -> Result<(), KymeraError> {
        let (hw, clients) = self.platform.mic_parts();
        if self.mics.attach_leakthrough(hw, clients).is_err() {
            debug!("leakthrough microphones busy, retrying");
            return self.send_later(
                KymeraMessage::MicConnectionTimeoutLeakthrough,
                MIC_CONNECT_RETRY,
            );
        }
        if !self.platform.mixer().is_chain_in_use() {
            self.platform.leakthrough().start_output();
            self.leakthrough.output_chain_created = true;
            self.set_state(KymeraState::StandaloneLeakthrough);
        }
        self.leakthrough.active = true;
        self.apply_clock_policy();
        self.queue.cancel_all(MessageKind::SidetoneEnable);
        self.send_later(KymeraMessage::SidetoneEnable, AEC_REF_SETTLING_TIME)
    }

    pub(super) fn handle_sidetone_enable(&mut self) -> Result<(), KymeraError> {
        if !self.leakthrough.active {
            return Ok(());
        }
        self.platform.leakthrough().set_sidetone_gain(SIDETONE_RAMP[0]);
        self.leakthrough.gain_index = 0;
        self.platform.leakthrough().enable_sidetone_path(true);
        self.send_later(KymeraMessage::SidetoneGainRampup, SIDETONE_GAIN_RAMP_STEP)
    }

    pub(super) fn handle_sidetone_gain_rampup(&mut self) -> Result<(), KymeraError> {
        match SIDETONE_RAMP.get(self.leakthrough.gain_index) {
            Some(gain) if self.leakthrough.active => {
                self.platform.leakthrough().set_sidetone_gain(*gain);
                self.leakthrough.gain_index += 1;
                self.send_later(KymeraMessage::SidetoneGainRampup, SIDETONE_GAIN_RAMP_STEP)
            }
            _ => {
                self.queue.cancel_all(MessageKind::SidetoneGainRampup);
                self.leakthrough.gain_index = 0;
                Ok(())
            }
        }
    }

    pub(super) fn handle_leakthrough_destroy(&mut self) -> Result<(), KymeraError> {
        self.queue.cancel_all(MessageKind::SidetoneGainRampup);
        self.queue.cancel_all(MessageKind::SidetoneEnable);
        self.queue.cancel_all(MessageKind::MicConnectionTimeoutLeakthrough);
        if !self.leakthrough.requested {
            return Ok(());
        }

        if self.leakthrough.active {
            self.platform.leakthrough().enable_sidetone_path(false);
            let (hw, clients) = self.platform.mic_parts();
            self.mics.detach_leakthrough(hw, clients);
            if self.leakthrough.output_chain_created {
                self.platform.leakthrough().stop_output();
                if self.state == KymeraState::StandaloneLeakthrough {
                    self.set_state(KymeraState::Idle);
                }
            }
        }
        self.leakthrough = LeakthroughStatus::default();
        self.apply_clock_policy();
        self.send_later(KymeraMessage::ProspectivePowerOff, PROSPECTIVE_AUDIO_OFF_TIMEOUT)
    }
}
