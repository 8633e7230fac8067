//! The audio manager: state, locks and the dispatcher.

mod a2dp;
mod anc;
mod leakthrough;
mod sco;
mod tones;
mod usb;

use embassy_time::{Duration, Instant};
use heapless::Vec;
use mic_arbiter::{MicArbiter, MicRegistryEntry, MicUser};

use crate::chains::{
    AncPassthrough, ClientId, ClientSink, DspFramework, KymeraIndication,
    KymeraNotification, ListenerId, OutputMixer, Platform,
};
use crate::clock::{dsp_clock_config, ClockInputs, DspClockConfig};
use crate::config::{
    A2dpPrediction, CallbackConfigs, CapabilityBundle, ChainConfigs,
    KymeraConfig, ScoChainInfo, MAX_CLIENTS, MAX_LISTENERS,
    PROSPECTIVE_AUDIO_OFF_TIMEOUT, QUEUE_CAPACITY,
};
use crate::error::KymeraError;
use crate::message::{KymeraMessage, MessageKind};
use crate::op_msg::{self, OperatorEvent, OP_MSG_MAX_WORDS, PAYLOAD_NA};
use crate::queue::{Gate, MessageQueue};
use crate::requests::{A2dpCodec, ClientLock, Seid};
use crate::state::{KymeraState, StartingLock, ToneState};

use leakthrough::LeakthroughStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum AancStatus {
    #[default]
    Off,
    /// Chain built, microphones not granted yet.
    WaitingForMics,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Tuning {
    Anc,
    Aanc,
}

impl Tuning {
    fn lock_bit(self) -> StartingLock {
        match self {
            Tuning::Anc => StartingLock::ANC_TUNING_STARTING,
            Tuning::Aanc => StartingLock::AANC_TUNING_STARTING,
        }
    }
}

/// Snapshot published after every dispatch turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KymeraStatus {
    pub state: KymeraState,
    pub lock: StartingLock,
    pub busy: bool,
    pub tone_playing: bool,
    pub in_concurrency: bool,
}

/// Owns the DSP use case, the microphone arbiter and the message queue.
///
/// Requests are translated into messages on an internal queue. Messages
/// sent on a gate stay queued until the gate opens: [`Gate::Lock`] while a
/// start is in progress, [`Gate::BusyLock`] while an exclusive use case
/// runs. [`Kymera::process`] delivers everything that is due.
pub struct Kymera<P: Platform> {
    platform: P,
    config: KymeraConfig,
    queue: MessageQueue<KymeraMessage, QUEUE_CAPACITY>,
    now: Instant,
    state: KymeraState,
    lock: StartingLock,
    busy_lock: bool,
    mics: MicArbiter,
    clock: Option<DspClockConfig>,
    a2dp_seid: Option<Seid>,
    a2dp_codec: Option<A2dpCodec>,
    sco_chain: Option<&'static ScoChainInfo>,
    tone_count: u16,
    tone_state: ToneState,
    tone_client_lock: Option<ClientLock>,
    aanc: AancStatus,
    tuning: Option<Tuning>,
    leakthrough: LeakthroughStatus,
    clients: Vec<ClientId, MAX_CLIENTS>,
    listeners: Vec<ListenerId, MAX_LISTENERS>,
}

impl<P: Platform> Kymera<P> {
    pub fn new(platform: P, config: KymeraConfig) -> Self {
        Self {
            platform,
            config,
            queue: MessageQueue::new(),
            now: Instant::from_ticks(0),
            state: KymeraState::Idle,
            lock: StartingLock::empty(),
            busy_lock: false,
            mics: MicArbiter::new(),
            clock: None,
            a2dp_seid: None,
            a2dp_codec: None,
            sco_chain: None,
            tone_count: 0,
            tone_state: ToneState::Idle,
            tone_client_lock: None,
            aanc: AancStatus::Off,
            tuning: None,
            leakthrough: LeakthroughStatus::default(),
            clients: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Reset to `Idle` with nothing queued. Microphone registrations and
    /// clients are kept.
    pub fn init(&mut self) {
        info!("kymera init");
        self.queue.clear();
        self.lock = StartingLock::empty();
        self.a2dp_seid = None;
        self.a2dp_codec = None;
        self.sco_chain = None;
        self.tone_count = 0;
        self.tone_state = ToneState::Idle;
        self.tone_client_lock = None;
        self.aanc = AancStatus::Off;
        self.tuning = None;
        self.leakthrough = LeakthroughStatus::default();
        self.clock = None;
        self.mics
            .set_concurrency_enabled(self.config.chains.mic_resampler.is_some());
        self.platform.framework().load_bundles(self.config.bundles);
        self.set_state(KymeraState::Idle);
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn set_bundle_config(&mut self, bundles: &'static [CapabilityBundle]) {
        self.config.bundles = bundles;
    }

    /// A mic resampler entry enables microphone concurrency.
    pub fn set_chain_configs(&mut self, chains: ChainConfigs) {
        self.config.chains = chains;
        self.mics.set_concurrency_enabled(chains.mic_resampler.is_some());
    }

    pub fn set_sco_chain_table(&mut self, table: &'static [ScoChainInfo]) {
        self.config.sco_chains = table;
    }

    pub fn set_callback_configs(&mut self, callbacks: CallbackConfigs) {
        self.config.callbacks = callbacks;
    }

    pub fn config(&self) -> &KymeraConfig {
        &self.config
    }

    /// Stream parameters the A2DP layer expects next, if it can tell.
    pub fn a2dp_parameters_prediction(&self) -> Option<A2dpPrediction> {
        self.config.callbacks.a2dp_parameters_prediction.and_then(|f| f())
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    pub fn client_register(&mut self, client: ClientId) {
        if self.clients.contains(&client) {
            return;
        }
        if self.clients.push(client).is_err() {
            panic!("too many kymera clients");
        }
    }

    pub fn client_unregister(&mut self, client: ClientId) {
        self.clients.retain(|c| *c != client);
    }

    pub fn register_notification_listener(&mut self, listener: ListenerId) {
        if self.listeners.contains(&listener) {
            return;
        }
        if self.listeners.push(listener).is_err() {
            panic!("too many kymera listeners");
        }
    }

    fn indicate_clients(&mut self, indication: KymeraIndication, payload: u16) {
        for client in self.clients.iter() {
            self.platform.clients().indicate(*client, indication, payload);
        }
    }

    fn notify_listeners(&mut self, notification: KymeraNotification) {
        for listener in self.listeners.iter() {
            self.platform.clients().notify(*listener, notification);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> KymeraState {
        self.state
    }

    pub fn lock(&self) -> StartingLock {
        self.lock
    }

    pub fn busy_lock(&self) -> bool {
        self.busy_lock
    }

    pub fn is_idle(&self) -> bool {
        self.state == KymeraState::Idle
    }

    pub fn is_busy(&self) -> bool {
        self.busy_lock
    }

    /// Adaptive ANC shares the microphones with a busy use case.
    pub fn in_concurrency(&self) -> bool {
        self.aanc == AancStatus::Running && self.busy_lock
    }

    pub fn is_sco_active(&self) -> bool {
        self.state.is_sco()
    }

    /// Tones or prompts queued or playing.
    pub fn is_tone_playing(&self) -> bool {
        self.tone_count > 0
    }

    pub fn tone_state(&self) -> ToneState {
        self.tone_state
    }

    pub fn dsp_clock(&self) -> Option<DspClockConfig> {
        self.clock
    }

    pub fn status(&self) -> KymeraStatus {
        KymeraStatus {
            state: self.state,
            lock: self.lock,
            busy: self.busy_lock,
            tone_playing: self.is_tone_playing(),
            in_concurrency: self.in_concurrency(),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn mic_arbiter(&self) -> &MicArbiter {
        &self.mics
    }

    pub fn pending_messages(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queued(&self, kind: MessageKind) -> bool {
        self.queue.contains(kind)
    }

    // ------------------------------------------------------------------
    // Microphones for users outside the manager
    // ------------------------------------------------------------------

    pub fn register_mic_user(&mut self, entry: MicRegistryEntry) {
        self.mics.register_user(entry);
    }

    pub fn mic_connect(&mut self, user: MicUser) -> Result<(), KymeraError> {
        let (hw, clients) = self.platform.mic_parts();
        self.mics.connect(hw, clients, user)?;
        self.apply_clock_policy();
        Ok(())
    }

    pub fn mic_disconnect(&mut self, user: MicUser) {
        let (hw, clients) = self.platform.mic_parts();
        self.mics.disconnect(hw, clients, user);
        self.apply_clock_policy();
    }

    pub fn mic_sleep(&mut self, user: MicUser) {
        let (hw, _) = self.platform.mic_parts();
        self.mics.sleep(hw, user);
    }

    pub fn mic_wake(&mut self, user: MicUser) {
        let (hw, _) = self.platform.mic_parts();
        self.mics.wake(hw, user);
    }

    pub fn mic_user_updated_state(&mut self, user: MicUser) {
        let (_, clients) = self.platform.mic_parts();
        self.mics.user_updated_state(clients, user);
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Switch use case. The busy lock follows the state and ANC passthrough
    /// is only allowed while idle.
    pub fn set_state(&mut self, state: KymeraState) {
        if state != self.state {
            info!("kymera state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.platform.passthrough().set_idle(state == KymeraState::Idle);
        self.busy_lock = state.is_busy();
        self.apply_clock_policy();
    }

    fn apply_clock_policy(&mut self) {
        let inputs = ClockInputs {
            state: self.state,
            hints: self.platform.framework().hints(),
            features: self.config.features,
            codec: self.a2dp_codec,
            sco_mode: self.sco_chain.map(|c| c.mode),
            tone_playing: self.tone_state == ToneState::Playing,
            concurrency: self.mics.active_users().bits().count_ones() > 1,
            output_rate: self.platform.mixer().main_sample_rate(),
        };
        let config = dsp_clock_config(&inputs);
        if self.clock != Some(config) {
            debug!("dsp clock {:?}", config);
            self.platform.framework().configure_clock(&config);
            self.clock = Some(config);
        }
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    fn send(&mut self, msg: KymeraMessage) -> Result<(), KymeraError> {
        self.queue.send(msg, self.now)
    }

    fn send_later(
        &mut self,
        msg: KymeraMessage,
        delay: Duration,
    ) -> Result<(), KymeraError> {
        self.queue.send_later(msg, self.now, delay)
    }

    fn send_on(&mut self, msg: KymeraMessage, gate: Gate) -> Result<(), KymeraError> {
        self.queue.send_conditionally(msg, self.now, gate)
    }

    fn gate_open(lock: StartingLock, busy: bool, gate: Gate) -> bool {
        match gate {
            Gate::Open => true,
            Gate::Lock => lock.is_empty(),
            Gate::BusyLock => !busy,
        }
    }

    /// Deliver every message that is due at `now` and whose gate is open.
    /// Messages sent while handling are left for the next call.
    /// Returns how many were handled.
    pub fn process(&mut self, now: Instant) -> usize {
        if now > self.now {
            self.now = now;
        }
        let watermark = self.queue.watermark();
        let mut handled = 0;
        loop {
            let (lock, busy) = (self.lock, self.busy_lock);
            let Some(msg) = self.queue.pop_ready_before(self.now, watermark, |gate| {
                Self::gate_open(lock, busy, gate)
            }) else {
                break;
            };
            self.dispatch(msg);
            handled += 1;
        }
        handled
    }

    /// When the next timed message falls due, if any can be delivered.
    pub fn next_deadline(&self) -> Option<Instant> {
        let (lock, busy) = (self.lock, self.busy_lock);
        self.queue.next_deadline(|gate| Self::gate_open(lock, busy, gate))
    }

    fn dispatch(&mut self, msg: KymeraMessage) {
        use crate::queue::Keyed;
        let kind = msg.key();
        debug!("kymera handling {:?} in {:?}", kind, self.state);
        if let Err(e) = self.handle(msg) {
            warn!("kymera {:?} failed: {:?}", kind, e);
        }
    }

    fn handle(&mut self, msg: KymeraMessage) -> Result<(), KymeraError> {
        use KymeraMessage as M;
        match msg {
            M::A2dpStart(req) => self.handle_a2dp_start(req),
            M::A2dpStarting(req) => self.handle_a2dp_starting(req),
            M::A2dpStop(seid) | M::A2dpStopForwarding(seid) => {
                self.handle_a2dp_stop(seid);
                Ok(())
            }
            M::A2dpSetVolume(volume_db) => {
                self.handle_a2dp_set_volume(volume_db);
                Ok(())
            }
            M::A2dpAudioSynchronised => {
                self.handle_a2dp_audio_synchronised();
                Ok(())
            }
            M::ScoStart(req) => self.handle_sco_start(req),
            M::ScoStop => {
                self.handle_sco_stop();
                Ok(())
            }
            M::ScoSetVolume(volume_db) => {
                self.handle_sco_set_volume(volume_db);
                Ok(())
            }
            M::ScoMicMute(mute) => {
                self.handle_sco_mic_mute(mute);
                Ok(())
            }
            M::ScoAudioSynchronised => {
                self.handle_sco_audio_synchronised();
                Ok(())
            }
            M::TonePromptPlay(req) => {
                self.handle_tone_prompt_play(req);
                Ok(())
            }
            M::TonePromptStop | M::PrepareForPromptTimeout => {
                self.stop_tone();
                Ok(())
            }
            M::ProspectivePowerOff => {
                debug!("prospective dsp power off");
                self.platform.framework().disable();
                Ok(())
            }
            M::AncTuningStart(usb_rate) => {
                self.handle_tuning_start(Tuning::Anc, usb_rate);
                Ok(())
            }
            M::AancTuningStart(usb_rate) => {
                self.handle_tuning_start(Tuning::Aanc, usb_rate);
                Ok(())
            }
            M::AncTuningStop => {
                self.handle_tuning_stop(Tuning::Anc);
                Ok(())
            }
            M::AancTuningStop => {
                self.handle_tuning_stop(Tuning::Aanc);
                Ok(())
            }
            M::AancEnable(params) => self.handle_aanc_enable(params),
            M::MicConnectionTimeoutAnc => self.handle_aanc_mic_retry(),
            M::AancDisable => {
                self.handle_aanc_disable();
                Ok(())
            }
            M::CreateStandaloneLeakthrough => self.handle_leakthrough_create(),
            M::MicConnectionTimeoutLeakthrough => {
                self.handle_leakthrough_mic_retry()
            }
            M::DestroyStandaloneLeakthrough => self.handle_leakthrough_destroy(),
            M::SidetoneEnable => self.handle_sidetone_enable(),
            M::SidetoneGainRampup => self.handle_sidetone_gain_rampup(),
            M::WiredAudioStart(req) => self.handle_wired_audio_start(req),
            M::WiredAudioStop => {
                self.handle_wired_audio_stop();
                Ok(())
            }
            M::WiredAudioSetVolume(volume_db) => {
                self.handle_wired_audio_set_volume(volume_db);
                Ok(())
            }
            M::UsbAudioStart(req) => self.handle_usb_audio_start(req),
            M::UsbAudioStop => {
                self.handle_usb_audio_stop();
                Ok(())
            }
            M::UsbAudioSetVolume(volume_db) => {
                self.handle_usb_audio_set_volume(volume_db);
                Ok(())
            }
            M::UsbVoiceStart(req) => self.handle_usb_voice_start(req),
            M::UsbVoiceStop => {
                self.handle_usb_voice_stop();
                Ok(())
            }
            M::UsbVoiceSetVolume(volume_db) => {
                self.handle_usb_voice_set_volume(volume_db);
                Ok(())
            }
            M::UsbVoiceMicMute(mute) => {
                self.handle_usb_voice_mic_mute(mute);
                Ok(())
            }
            M::OperatorMessage(words) => {
                self.handle_operator_message(&words);
                Ok(())
            }
            M::StreamDisconnect => {
                self.stop_tone();
                self.indicate_clients(KymeraIndication::PromptEnd, PAYLOAD_NA);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // DSP power and operator messages
    // ------------------------------------------------------------------

    /// Power the DSP up ahead of audio that is likely to follow. It powers
    /// down again unless audio starts within
    /// [`PROSPECTIVE_AUDIO_OFF_TIMEOUT`].
    pub fn prospective_dsp_power_on(&mut self) -> Result<(), KymeraError> {
        let allowed = matches!(
            self.state,
            KymeraState::Idle | KymeraState::TonePlaying
        ) || self.state.is_a2dp()
            || self.state.is_sco()
            || self.state.is_usb();
        if !allowed {
            debug!("prospective power on ignored in {:?}", self.state);
            return Ok(());
        }
        if self.queue.cancel_first(MessageKind::ProspectivePowerOff).is_some() {
            debug!("prospective power off timer restarted");
        } else {
            self.platform.framework().enable();
        }
        self.send_later(
            KymeraMessage::ProspectivePowerOff,
            PROSPECTIVE_AUDIO_OFF_TIMEOUT,
        )
    }

    /// Queue an unsolicited operator message for decoding.
    pub fn operator_message(&mut self, words: &[u16]) -> Result<(), KymeraError> {
        match Vec::<u16, OP_MSG_MAX_WORDS>::from_slice(words) {
            Ok(words) => self.send(KymeraMessage::OperatorMessage(words)),
            Err(_) => {
                warn!("operator message of {} words dropped", words.len());
                Ok(())
            }
        }
    }

    /// The prompt source ran dry.
    pub fn stream_disconnect(&mut self) -> Result<(), KymeraError> {
        self.send(KymeraMessage::StreamDisconnect)
    }

    fn handle_operator_message(&mut self, words: &[u16]) {
        match op_msg::decode(words) {
            Ok(OperatorEvent::ToneEnd) => self.stop_tone(),
            Ok(event) => {
                if let Some((indication, payload)) = event.indication() {
                    self.indicate_clients(indication, payload);
                } else {
                    debug!("operator event {:?} ignored", event);
                }
            }
            Err(e) => warn!("operator message rejected: {:?}", e),
        }
    }
}
