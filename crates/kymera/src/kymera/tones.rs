use crate::chains::{DspFramework, KymeraNotification, Platform, ToneChain};
use crate::config::PREPARE_FOR_PROMPT_TIMEOUT;
use crate::error::KymeraError;
use crate::message::{KymeraMessage, MessageKind};
use crate::queue::Gate;
use crate::requests::{ClientLock, ToneKind, TonePromptRequest};
use crate::state::{KymeraState, PromptFormat, StartingLock, ToneState};

use super::{AancStatus, Kymera};

impl<P: Platform> Kymera<P> {
    /// Queue a tone or prompt. It plays once no start is in progress, and
    /// counts as playing from now until it ends or is cancelled.
    pub fn tone_prompt_play(&mut self, request: TonePromptRequest) -> Result<(), KymeraError> {
        debug!("tone/prompt {} queued, interruptible {}", request.id, request.interruptible);
        self.queue.cancel_first(MessageKind::PrepareForPromptTimeout);
        if let Some(lock) = request.client_lock {
            lock.set();
        }
        self.send_on(KymeraMessage::TonePromptPlay(request), Gate::Lock)?;
        self.tone_count += 1;
        Ok(())
    }

    pub fn tone_play(
        &mut self,
        id: u16,
        interruptible: bool,
        client_lock: Option<ClientLock>,
    ) -> Result<(), KymeraError> {
        self.tone_prompt_play(TonePromptRequest {
            id,
            kind: ToneKind::Tone,
            interruptible,
            client_lock,
        })
    }

    pub fn prompt_play(
        &mut self,
        id: u16,
        format: PromptFormat,
        rate: u32,
        interruptible: bool,
        client_lock: Option<ClientLock>,
    ) -> Result<(), KymeraError> {
        self.tone_prompt_play(TonePromptRequest {
            id,
            kind: ToneKind::Prompt { format, rate },
            interruptible,
            client_lock,
        })
    }

    pub fn tone_prompt_cancel(&mut self) -> Result<(), KymeraError> {
        self.send_on(KymeraMessage::TonePromptStop, Gate::Lock)
    }

    /// Build the prompt chain ahead of a prompt that is about to be played.
    /// It is torn down again if no prompt arrives within
    /// [`PREPARE_FOR_PROMPT_TIMEOUT`].
    pub fn prepare_for_prompt(
        &mut self,
        format: PromptFormat,
        rate: u32,
    ) -> Result<(), KymeraError> {
        if self.tone_state != ToneState::Idle {
            return Err(KymeraError::ToneBusy);
        }
        self.platform.framework().enable();
        self.platform.tone().prepare(format, rate);
        self.tone_state = ToneState::Ready(format);
        self.send_later(KymeraMessage::PrepareForPromptTimeout, PREPARE_FOR_PROMPT_TIMEOUT)
    }

    pub fn is_ready_for_prompt(&self, format: PromptFormat) -> bool {
        self.tone_state == ToneState::Ready(format)
    }

    pub(super) fn handle_tone_prompt_play(&mut self, request: TonePromptRequest) {
        self.notify_listeners(match request.kind {
            ToneKind::Tone => KymeraNotification::ToneStarted(request.id),
            ToneKind::Prompt { .. } => KymeraNotification::PromptStarted(request.id),
        });

        let prepared_otherwise = match self.tone_state {
            ToneState::Ready(format) => request.prompt_format() != Some(format),
            _ => false,
        };
        if self.tone_state == ToneState::Playing || prepared_otherwise {
            self.stop_tone();
        }
        if self.tone_state == ToneState::Idle {
            self.platform.framework().enable();
        }
        if matches!(self.state, KymeraState::Idle | KymeraState::AdaptiveAncStarted) {
            self.set_state(KymeraState::TonePlaying);
        }

        self.platform.tone().play(&request);
        self.tone_state = ToneState::Playing;
        self.apply_clock_policy();

        if !request.interruptible {
            self.lock.insert(StartingLock::TONE);
        }
        self.tone_client_lock = request.client_lock;
    }

    /// Tear down whatever tone or prompt chain exists.
    pub(super) fn stop_tone(&mut self) {
        if self.tone_state == ToneState::Idle {
            return;
        }
        debug!("tone/prompt stop in {:?}", self.state);

        self.platform.tone().stop();
        if self.state == KymeraState::TonePlaying && !self.leakthrough.active {
            self.set_state(if self.aanc == AancStatus::Running {
                KymeraState::AdaptiveAncStarted
            } else {
                KymeraState::Idle
            });
        }
        self.lock.remove(StartingLock::TONE);

        if self.tone_state == ToneState::Playing {
            match self.tone_count.checked_sub(1) {
                Some(count) => self.tone_count = count,
                None => panic!("tone count underflow"),
            }
        }
        self.tone_state = ToneState::Idle;
        self.apply_clock_policy();

        if let Some(lock) = self.tone_client_lock.take() {
            lock.clear();
        }
        self.platform.framework().disable();
    }
}
