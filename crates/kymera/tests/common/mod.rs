#![allow(dead_code)]

use embassy_time::Instant;
use kymera::{
    A2dpChain, A2dpStartRequest, AancParams, AdaptiveAncChain, AncPassthrough,
    AncTuningChain, ChainConfigs, ChainId, ClientId, ClientSink, ClockHints,
    DspClockConfig, DspFramework, Kymera, KymeraConfig, KymeraIndication,
    KymeraNotification, LeakthroughChain, ListenerId, OutputMixer, Platform,
    PromptFormat, ScoChain, ScoChainInfo, ScoMode, ScoStartRequest, Seid,
    SidetoneGain, ToneChain, TonePromptRequest, UsbAudioChain, UsbAudioRequest,
    UsbVoiceChain, UsbVoiceRequest, WiredAudioChain, WiredAudioRequest,
};
use mic_arbiter::{
    AecAudioConfig, AecAudioInput, AecReference, AecUseCase, MicConnectParams,
    MicHardware, MicId, MicPlatform, MicRegistryEntry, MicResampler, MicUser,
    MicUserClients, MicUserState, Sink, Source, SplitterChain,
};

// ---------------------------------------------------------------------------
// Mock chains
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Enable,
    Disable,
    Clock(DspClockConfig),
    Mute(bool),
    Indicate(ClientId, KymeraIndication, u16),
    Notify(ListenerId, KymeraNotification),
    A2dpStart(Seid),
    A2dpStop(Seid),
    ForwardingStart(Seid),
    ForwardingStop,
    A2dpVolume(i16),
    ScoCreate(ScoMode),
    ScoStart,
    ScoStop,
    ScoDestroy,
    ScoVolume(i16),
    ScoMicMute(bool),
    TonePlay(u16),
    TonePrepare(PromptFormat),
    ToneStop,
    AncTuningStart(u32),
    AncTuningStop,
    AancCreate,
    AancStart,
    AancDestroy,
    AancTuningStart(u32),
    AancTuningStop,
    OutputStart,
    OutputStop,
    SidetonePath(bool),
    SidetoneGain(SidetoneGain),
    UsbAudioStart(u32),
    UsbAudioStop,
    UsbAudioVolume(i16),
    UsbVoiceStart,
    UsbVoiceStop,
    UsbVoiceVolume(i16),
    UsbVoiceMicMute(bool),
    WiredStart(u32),
    WiredStop,
    WiredVolume(i16),
}

/// Chain builders and DSP services, recording every call.
#[derive(Default)]
pub struct MockPlatform {
    pub log: Vec<Call>,
    /// Framework reference count.
    pub enabled: i32,
    pub passthrough_idle: Option<bool>,
    /// A2DP start calls that report "not yet" before streaming.
    pub a2dp_pending_stages: u8,
    pub sco_start_fails: bool,
    pub chain_start_fails: bool,
    pub output_in_use: bool,
    pub output_rate: u32,
    pub hints: ClockHints,
    pub mic_hw: MockMicHw,
    pub mic_users: MockMicUsers,
}

impl MockPlatform {
    pub fn has(&self, call: &Call) -> bool {
        self.log.contains(call)
    }

    pub fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.log.iter().filter(|c| f(c)).count()
    }

    pub fn last_clock(&self) -> Option<DspClockConfig> {
        self.log.iter().rev().find_map(|c| match c {
            Call::Clock(config) => Some(*config),
            _ => None,
        })
    }
}

impl DspFramework for MockPlatform {
    fn enable(&mut self) {
        self.enabled += 1;
        self.log.push(Call::Enable);
    }

    fn disable(&mut self) {
        assert!(self.enabled > 0, "framework disabled too often");
        self.enabled -= 1;
        self.log.push(Call::Disable);
    }

    fn configure_clock(&mut self, config: &DspClockConfig) {
        self.log.push(Call::Clock(*config));
    }

    fn hints(&self) -> ClockHints {
        self.hints
    }
}

impl AncPassthrough for MockPlatform {
    fn set_idle(&mut self, idle: bool) {
        self.passthrough_idle = Some(idle);
    }
}

impl OutputMixer for MockPlatform {
    fn is_chain_in_use(&self) -> bool {
        self.output_in_use
    }

    fn mute_main_channel(&mut self, mute: bool) {
        self.log.push(Call::Mute(mute));
    }

    fn main_sample_rate(&self) -> u32 {
        self.output_rate
    }
}

impl ClientSink for MockPlatform {
    fn indicate(&mut self, client: ClientId, indication: KymeraIndication, payload: u16) {
        self.log.push(Call::Indicate(client, indication, payload));
    }

    fn notify(&mut self, listener: ListenerId, notification: KymeraNotification) {
        self.log.push(Call::Notify(listener, notification));
    }
}

impl A2dpChain for MockPlatform {
    fn start(&mut self, request: &A2dpStartRequest) -> bool {
        self.log.push(Call::A2dpStart(request.seid));
        if self.a2dp_pending_stages > 0 {
            self.a2dp_pending_stages -= 1;
            false
        } else {
            true
        }
    }

    fn stop(&mut self, seid: Seid) {
        self.log.push(Call::A2dpStop(seid));
    }

    fn start_forwarding(&mut self, seid: Seid) {
        self.log.push(Call::ForwardingStart(seid));
    }

    fn stop_forwarding(&mut self) {
        self.log.push(Call::ForwardingStop);
    }

    fn set_volume(&mut self, volume_db: i16) {
        self.log.push(Call::A2dpVolume(volume_db));
    }
}

impl ScoChain for MockPlatform {
    fn create(&mut self, request: &ScoStartRequest) {
        self.log.push(Call::ScoCreate(request.chain.mode));
    }

    fn start(&mut self) -> bool {
        self.log.push(Call::ScoStart);
        !self.sco_start_fails
    }

    fn stop(&mut self) {
        self.log.push(Call::ScoStop);
    }

    fn destroy(&mut self) {
        self.log.push(Call::ScoDestroy);
    }

    fn set_volume(&mut self, volume_db: i16) {
        self.log.push(Call::ScoVolume(volume_db));
    }

    fn mic_mute(&mut self, mute: bool) {
        self.log.push(Call::ScoMicMute(mute));
    }
}

impl ToneChain for MockPlatform {
    fn play(&mut self, request: &TonePromptRequest) {
        self.log.push(Call::TonePlay(request.id));
    }

    fn prepare(&mut self, format: PromptFormat, _rate: u32) {
        self.log.push(Call::TonePrepare(format));
    }

    fn stop(&mut self) {
        self.log.push(Call::ToneStop);
    }
}

impl AncTuningChain for MockPlatform {
    fn start(&mut self, usb_rate: u32) {
        self.log.push(Call::AncTuningStart(usb_rate));
    }

    fn stop(&mut self) {
        self.log.push(Call::AncTuningStop);
    }
}

impl AdaptiveAncChain for MockPlatform {
    fn create(&mut self, _params: &AancParams) {
        self.log.push(Call::AancCreate);
    }

    fn start(&mut self) {
        self.log.push(Call::AancStart);
    }

    fn destroy(&mut self) {
        self.log.push(Call::AancDestroy);
    }

    fn start_tuning(&mut self, usb_rate: u32) {
        self.log.push(Call::AancTuningStart(usb_rate));
    }

    fn stop_tuning(&mut self) {
        self.log.push(Call::AancTuningStop);
    }
}

impl LeakthroughChain for MockPlatform {
    fn start_output(&mut self) {
        self.log.push(Call::OutputStart);
    }

    fn stop_output(&mut self) {
        self.log.push(Call::OutputStop);
    }

    fn enable_sidetone_path(&mut self, enable: bool) {
        self.log.push(Call::SidetonePath(enable));
    }

    fn set_sidetone_gain(&mut self, gain: SidetoneGain) {
        self.log.push(Call::SidetoneGain(gain));
    }
}

impl UsbAudioChain for MockPlatform {
    fn start(&mut self, request: &UsbAudioRequest) -> bool {
        self.log.push(Call::UsbAudioStart(request.rate));
        !self.chain_start_fails
    }

    fn stop(&mut self) {
        self.log.push(Call::UsbAudioStop);
    }

    fn set_volume(&mut self, volume_db: i16) {
        self.log.push(Call::UsbAudioVolume(volume_db));
    }
}

impl UsbVoiceChain for MockPlatform {
    fn start(&mut self, _request: &UsbVoiceRequest) -> bool {
        self.log.push(Call::UsbVoiceStart);
        !self.chain_start_fails
    }

    fn stop(&mut self) {
        self.log.push(Call::UsbVoiceStop);
    }

    fn set_volume(&mut self, volume_db: i16) {
        self.log.push(Call::UsbVoiceVolume(volume_db));
    }

    fn mic_mute(&mut self, mute: bool) {
        self.log.push(Call::UsbVoiceMicMute(mute));
    }
}

impl WiredAudioChain for MockPlatform {
    fn start(&mut self, request: &WiredAudioRequest) -> bool {
        self.log.push(Call::WiredStart(request.rate));
        !self.chain_start_fails
    }

    fn stop(&mut self) {
        self.log.push(Call::WiredStop);
    }

    fn set_volume(&mut self, volume_db: i16) {
        self.log.push(Call::WiredVolume(volume_db));
    }
}

impl Platform for MockPlatform {
    type Framework = Self;
    type Passthrough = Self;
    type Mixer = Self;
    type Clients = Self;
    type A2dp = Self;
    type Sco = Self;
    type Tone = Self;
    type AncTuning = Self;
    type Aanc = Self;
    type Leakthrough = Self;
    type UsbAudio = Self;
    type UsbVoice = Self;
    type Wired = Self;
    type MicHw = MockMicHw;
    type MicClients = MockMicUsers;

    fn framework(&mut self) -> &mut Self {
        self
    }

    fn passthrough(&mut self) -> &mut Self {
        self
    }

    fn mixer(&mut self) -> &mut Self {
        self
    }

    fn clients(&mut self) -> &mut Self {
        self
    }

    fn a2dp(&mut self) -> &mut Self {
        self
    }

    fn sco(&mut self) -> &mut Self {
        self
    }

    fn tone(&mut self) -> &mut Self {
        self
    }

    fn anc_tuning(&mut self) -> &mut Self {
        self
    }

    fn aanc(&mut self) -> &mut Self {
        self
    }

    fn leakthrough(&mut self) -> &mut Self {
        self
    }

    fn usb_audio(&mut self) -> &mut Self {
        self
    }

    fn usb_voice(&mut self) -> &mut Self {
        self
    }

    fn wired(&mut self) -> &mut Self {
        self
    }

    fn mic_parts(&mut self) -> (&mut MockMicHw, &mut MockMicUsers) {
        (&mut self.mic_hw, &mut self.mic_users)
    }
}

// ---------------------------------------------------------------------------
// Mock microphones
// ---------------------------------------------------------------------------

/// Microphone front-end that only keeps the state the arbiter reads back.
#[derive(Default)]
pub struct MockMicHw {
    pub mics_on: i32,
    use_case: AecUseCase,
    task_period_us: u32,
    mic_path_connected: bool,
}

impl MicHardware for MockMicHw {
    fn turn_on(&mut self, mic: MicId, _sample_rate: u32) -> Source {
        self.mics_on += 1;
        Source(100 + mic.get() as u16)
    }

    fn turn_off(&mut self, _mic: MicId) {
        self.mics_on -= 1;
    }

    fn synchronise(&mut self, _first: Source, _second: Option<Source>) {}

    fn preserve(&mut self, _sources: &[Source]) {}

    fn release(&mut self, _sources: &[Source]) {}
}

impl AecReference for MockMicHw {
    fn use_case(&self) -> AecUseCase {
        self.use_case
    }

    fn set_use_case(&mut self, use_case: AecUseCase) {
        self.use_case = use_case;
    }

    fn task_period_us(&self) -> u32 {
        self.task_period_us
    }

    fn set_task_period_us(&mut self, period_us: u32) {
        self.task_period_us = period_us;
    }

    fn is_mic_path_input_connected(&self) -> bool {
        self.mic_path_connected
    }

    fn connect_audio_input(&mut self, _input: &AecAudioInput, _config: &AecAudioConfig) {
        self.mic_path_connected = true;
    }

    fn connect_mic_path_input(&mut self, _mics: &[Source], _config: &AecAudioConfig) {
        self.mic_path_connected = true;
    }

    fn connect_mic_path_output(&mut self, _aec_reference: Sink, _mics: &[Sink]) {}

    fn disconnect_audio_input(&mut self) {
        self.mic_path_connected = false;
    }

    fn sleep(&mut self) {}

    fn wake(&mut self) {}
}

impl SplitterChain for MockMicHw {
    fn create(&mut self, _streams: usize, _channels: usize) {}

    fn input(&mut self, channel: usize) -> Sink {
        Sink(200 + channel as u16)
    }

    fn connect_output_stream(&mut self, _stream: usize, _sinks: &[Option<Sink>]) {}

    fn start_output_stream(&mut self, _stream: usize) {}

    fn disconnect_output_stream(&mut self, _stream: usize) {}

    fn destroy(&mut self) {}

    fn sleep(&mut self) {}

    fn wake(&mut self) {}
}

impl MicResampler for MockMicHw {
    fn create(&mut self, _stream: usize, _input_rate: u32, _output_rate: u32) {}

    fn aec_input(&mut self, stream: usize) -> Sink {
        Sink(300 + 10 * stream as u16)
    }

    fn aec_output(&mut self, stream: usize) -> Source {
        Source(310 + 10 * stream as u16)
    }

    fn mic_input(&mut self, stream: usize, channel: usize) -> Sink {
        Sink(400 + 10 * stream as u16 + channel as u16)
    }

    fn mic_output(&mut self, stream: usize, channel: usize) -> Source {
        Source(500 + 10 * stream as u16 + channel as u16)
    }

    fn start(&mut self, _stream: usize) {}

    fn stop(&mut self, _stream: usize) {}

    fn destroy(&mut self, _stream: usize) {}

    fn sleep(&mut self) {}

    fn wake(&mut self) {}
}

impl MicPlatform for MockMicHw {
    type Mics = Self;
    type Aec = Self;
    type Splitter = Self;
    type Resampler = Self;

    fn mics(&mut self) -> &mut Self {
        self
    }

    fn aec(&mut self) -> &mut Self {
        self
    }

    fn splitter(&mut self) -> &mut Self {
        self
    }

    fn resampler(&mut self) -> &mut Self {
        self
    }

    fn connect(&mut self, _source: Source, _sink: Sink) {}
}

/// Every user wants microphone 1 at 16 kHz. Voice users cannot be
/// interrupted.
#[derive(Default)]
pub struct MockMicUsers;

impl MicUserClients for MockMicUsers {
    fn connection_params(&mut self, user: MicUser) -> MicConnectParams {
        MicConnectParams::new(16_000).with_mic(MicId::new(1), Sink(user.bits()))
    }

    fn user_state(&self, user: MicUser) -> MicUserState {
        match user {
            MicUser::Sco | MicUser::UsbVoice => MicUserState::NonInterruptible,
            _ => MicUserState::Interruptible,
        }
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

pub static SCO_CHAINS: [ScoChainInfo; 3] = [
    ScoChainInfo { mode: ScoMode::Nb, mic_count: 1, chain: ChainId(10) },
    ScoChainInfo { mode: ScoMode::Wb, mic_count: 1, chain: ChainId(11) },
    ScoChainInfo { mode: ScoMode::Swb, mic_count: 2, chain: ChainId(12) },
];

pub fn config() -> KymeraConfig {
    KymeraConfig {
        chains: ChainConfigs {
            mic_resampler: Some(ChainId(1)),
            aanc: Some(ChainId(2)),
            leakthrough: Some(ChainId(3)),
        },
        sco_chains: &SCO_CHAINS,
        ..KymeraConfig::default()
    }
}

pub const CLIENT: ClientId = ClientId(1);
pub const LISTENER: ListenerId = ListenerId(7);

pub fn kymera_with(config: KymeraConfig, platform: MockPlatform) -> Kymera<MockPlatform> {
    let mut kymera = Kymera::new(platform, config);
    for user in [
        MicUser::Sco,
        MicUser::Aanc,
        MicUser::Va,
        MicUser::Leakthrough,
        MicUser::UsbVoice,
    ] {
        kymera.register_mic_user(MicRegistryEntry::new(user));
    }
    kymera.client_register(CLIENT);
    kymera.register_notification_listener(LISTENER);
    kymera.init();
    kymera.platform_mut().log.clear();
    kymera
}

pub fn kymera() -> Kymera<MockPlatform> {
    kymera_with(config(), MockPlatform::default())
}

pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// Process until nothing more is deliverable at `ms`.
pub fn settle(kymera: &mut Kymera<MockPlatform>, ms: u64) -> usize {
    let mut total = 0;
    loop {
        let handled = kymera.process(at(ms));
        if handled == 0 {
            return total;
        }
        total += handled;
    }
}
