mod common;

use common::{at, config, kymera, kymera_with, settle, Call, MockPlatform, CLIENT, LISTENER};
use embassy_time::{Duration, Instant};
use kymera::{
    decode_operator_message, dsp_clock_config, A2dpCodec, A2dpPrediction,
    A2dpStartRequest, AancEvent, AancParams, CallbackConfigs, ChainConfigs,
    ClientLock, ClockHints, ClockInputs, DspClock, DspClockConfig, Gate, Keyed,
    Kymera, KymeraConfig, KymeraError, KymeraFeatures, KymeraIndication,
    KymeraNotification, KymeraState, MessageKind, MessageQueue, OpMsgError,
    OperatorEvent, PowerSaveMode, PromptFormat, ScoMode, ScoStartParams, Seid,
    StartingLock, ToneState, UsbAudioRequest, UsbVoiceRequest,
    WiredAudioRequest, SIDETONE_RAMP,
};
use mic_arbiter::{MicUser, MicUsers, Sink};
use portable_atomic::AtomicU16;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn a2dp(seid: Seid, pre_start_delay: u8) -> A2dpStartRequest {
    A2dpStartRequest {
        client_lock: None,
        seid,
        codec: A2dpCodec::Sbc,
        rate: 48_000,
        volume_db: -20,
        max_bitrate: 0,
        pre_start_delay,
    }
}

fn notified(k: &Kymera<MockPlatform>, notification: KymeraNotification) -> usize {
    k.platform()
        .count(|c| *c == Call::Notify(LISTENER, notification))
}

fn sco(mode: ScoMode) -> ScoStartParams {
    ScoStartParams {
        sink: Some(Sink(5)),
        mode,
        wesco: 2,
        volume_db: -10,
        pre_start_delay: 0,
        secondary: false,
        started: None,
    }
}

fn no_concurrency() -> KymeraConfig {
    KymeraConfig {
        chains: ChainConfigs { mic_resampler: None, ..config().chains },
        ..config()
    }
}

fn aanc_params() -> AancParams {
    AancParams { in_ear: true, control_path: 0, hw_channel: 0, mode: 1 }
}

fn wired() -> WiredAudioRequest {
    WiredAudioRequest { rate: 48_000, volume_db: -12 }
}

// ---------------------------------------------------------------------------
// State and locks
// ---------------------------------------------------------------------------

#[test]
fn busy_lock_follows_state() {
    let mut k = kymera();

    k.set_state(KymeraState::ScoActive);
    assert!(k.busy_lock());
    assert_eq!(k.platform().passthrough_idle, Some(false));

    k.set_state(KymeraState::Idle);
    assert!(!k.busy_lock());
    assert!(k.is_idle());
    assert_eq!(k.platform().passthrough_idle, Some(true));
}

#[test]
fn light_states_are_not_busy() {
    for state in [
        KymeraState::Idle,
        KymeraState::TonePlaying,
        KymeraState::StandaloneLeakthrough,
        KymeraState::AdaptiveAncStarted,
    ] {
        assert!(!state.is_busy(), "{:?}", state);
    }
    assert!(KymeraState::A2dpStartingA.is_busy());
    assert!(KymeraState::AncTuning.is_busy());
    assert!(KymeraState::WiredAudioPlaying.is_busy());
}

#[test]
fn queue_full_is_reported() {
    let mut k = kymera();
    for _ in 0..kymera::QUEUE_CAPACITY {
        k.tone_prompt_cancel().unwrap();
    }
    assert_eq!(k.tone_prompt_cancel(), Err(KymeraError::QueueFull));
}

// ---------------------------------------------------------------------------
// A2DP
// ---------------------------------------------------------------------------

static A2DP_LOCK: AtomicU16 = AtomicU16::new(0);

#[test]
fn stop_during_pre_start_delay_cancels_start() {
    let mut k = kymera();
    let lock = ClientLock::new(&A2DP_LOCK, 0x1);
    let request = A2dpStartRequest { client_lock: Some(lock), ..a2dp(Seid::Sink(1), 2) };

    k.a2dp_start(request).unwrap();
    assert!(lock.is_set());
    assert_eq!(k.process(at(0)), 1);
    assert!(k.lock().contains(StartingLock::A2DP_STARTING));

    k.a2dp_stop(Seid::Sink(1)).unwrap();
    settle(&mut k, 0);

    assert!(!lock.is_set());
    assert_eq!(k.state(), KymeraState::Idle);
    assert!(k.lock().is_empty());
    assert_eq!(k.platform().count(|c| matches!(c, Call::A2dpStart(_))), 0);
    assert_eq!(k.platform().enabled, 0);
    assert_eq!(k.pending_messages(), 0);
    assert_eq!(notified(&k, KymeraNotification::EqAvailable), 0);
    assert_eq!(notified(&k, KymeraNotification::EqUnavailable), 1);
}

#[test]
fn a2dp_start_runs_through_stages() {
    let mut k = kymera_with(
        config(),
        MockPlatform { a2dp_pending_stages: 2, ..MockPlatform::default() },
    );

    k.a2dp_start(a2dp(Seid::Sink(1), 0)).unwrap();
    assert_eq!(k.process(at(0)), 1);
    assert_eq!(k.state(), KymeraState::A2dpStartingB);
    assert!(k.lock().contains(StartingLock::A2DP_STARTING));
    assert_eq!(notified(&k, KymeraNotification::EqAvailable), 0);

    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::A2dpStreaming);
    assert!(k.lock().is_empty());
    assert!(k.is_busy());
    assert_eq!(k.platform().count(|c| matches!(c, Call::A2dpStart(_))), 3);
    assert_eq!(notified(&k, KymeraNotification::EqAvailable), 1);
    assert_eq!(notified(&k, KymeraNotification::EqUnavailable), 0);

    k.a2dp_stop(Seid::Sink(1)).unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::Idle);
    assert!(k.platform().has(&Call::A2dpStop(Seid::Sink(1))));
    assert_eq!(notified(&k, KymeraNotification::EqUnavailable), 1);
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn forwarding_starts_and_stops_on_source_seid() {
    let mut k = kymera();
    k.a2dp_start(a2dp(Seid::Sink(1), 0)).unwrap();
    settle(&mut k, 0);

    assert_eq!(notified(&k, KymeraNotification::EqAvailable), 1);

    k.a2dp_start(a2dp(Seid::Source(2), 0)).unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::A2dpStreamingWithForwarding);
    assert!(k.platform().has(&Call::ForwardingStart(Seid::Source(2))));
    assert_eq!(notified(&k, KymeraNotification::EqAvailable), 1);
    assert_eq!(notified(&k, KymeraNotification::EqUnavailable), 0);

    k.a2dp_stop(Seid::Source(2)).unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::A2dpStreaming);
    assert!(k.platform().has(&Call::ForwardingStop));
    assert_eq!(notified(&k, KymeraNotification::EqUnavailable), 1);

    k.a2dp_stop(Seid::Sink(1)).unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::Idle);
    assert_eq!(notified(&k, KymeraNotification::EqUnavailable), 2);
}

#[test]
fn a2dp_stop_in_other_use_case_still_notifies() {
    let mut k = kymera();
    k.sco_start(sco(ScoMode::Wb)).unwrap();
    settle(&mut k, 0);

    k.a2dp_stop(Seid::Sink(1)).unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::ScoActive);
    assert!(!k.platform().has(&Call::A2dpStop(Seid::Sink(1))));
    assert_eq!(notified(&k, KymeraNotification::EqUnavailable), 1);
}

#[test]
fn volume_requests_coalesce() {
    let mut k = kymera();
    k.a2dp_start(a2dp(Seid::Sink(1), 0)).unwrap();
    settle(&mut k, 0);

    k.a2dp_set_volume(-30).unwrap();
    k.a2dp_set_volume(-25).unwrap();
    settle(&mut k, 0);

    assert_eq!(k.platform().count(|c| matches!(c, Call::A2dpVolume(_))), 1);
    assert!(k.platform().has(&Call::A2dpVolume(-25)));
}

#[test]
fn a2dp_unmutes_once_synchronised() {
    let mut k = kymera();
    k.a2dp_start(a2dp(Seid::Sink(1), 0)).unwrap();
    settle(&mut k, 0);

    k.schedule_a2dp_sync_unmute(Duration::from_millis(300)).unwrap();
    settle(&mut k, 299);
    assert!(!k.platform().has(&Call::Mute(false)));
    settle(&mut k, 300);
    assert!(k.platform().has(&Call::Mute(false)));
}

fn predict() -> Option<A2dpPrediction> {
    Some(A2dpPrediction { rate: 44_100, seid: 1 })
}

#[test]
fn parameters_prediction_uses_callback() {
    let mut k = kymera();
    assert_eq!(k.a2dp_parameters_prediction(), None);

    k.set_callback_configs(CallbackConfigs { a2dp_parameters_prediction: Some(predict) });
    assert_eq!(
        k.a2dp_parameters_prediction(),
        Some(A2dpPrediction { rate: 44_100, seid: 1 })
    );
}

// ---------------------------------------------------------------------------
// SCO
// ---------------------------------------------------------------------------

#[test]
fn sco_start_validates_request() {
    let mut k = kymera_with(KymeraConfig::default(), MockPlatform::default());
    assert_eq!(k.sco_start(sco(ScoMode::Wb)), Err(KymeraError::NotConfigured));

    let mut k = kymera();
    assert_eq!(k.sco_start(sco(ScoMode::Uwb)), Err(KymeraError::NoScoChain));
    assert_eq!(
        k.sco_start(ScoStartParams { sink: None, ..sco(ScoMode::Wb) }),
        Err(KymeraError::InvalidSink)
    );
    assert_eq!(k.pending_messages(), 0);
}

#[test]
fn sco_chain_matches_configured_mic_count() {
    let mut k = kymera_with(
        KymeraConfig { voice_mic_count: 2, ..config() },
        MockPlatform::default(),
    );
    assert_eq!(k.sco_start(sco(ScoMode::Wb)), Err(KymeraError::NoScoChain));
    k.sco_start(sco(ScoMode::Swb)).unwrap();
    settle(&mut k, 0);

    assert!(k.platform().has(&Call::ScoCreate(ScoMode::Swb)));
    assert_eq!(
        k.dsp_clock(),
        Some(DspClockConfig {
            active: DspClock::Turbo,
            low_power: DspClock::Slow,
            mode: PowerSaveMode::Mode1,
        })
    );
}

#[test]
fn sco_mutes_until_synchronised() {
    let mut k = kymera();
    k.sco_start(sco(ScoMode::Wb)).unwrap();
    settle(&mut k, 0);

    assert_eq!(k.state(), KymeraState::ScoActive);
    assert!(k.is_sco_active());
    assert!(k.platform().has(&Call::Mute(true)));
    assert_eq!(k.mic_arbiter().active_users(), MicUsers::SCO);

    settle(&mut k, 999);
    assert!(!k.platform().has(&Call::Mute(false)));
    settle(&mut k, 1000);
    assert!(k.platform().has(&Call::Mute(false)));
}

#[test]
fn secondary_earbud_uses_slave_state() {
    let mut k = kymera();
    k.sco_start(ScoStartParams { secondary: true, ..sco(ScoMode::Nb) }).unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::ScoSlaveActive);

    settle(&mut k, 1000);
    assert!(!k.platform().has(&Call::Mute(false)));
}

#[test]
fn sco_stop_releases_everything() {
    let mut k = kymera();
    k.sco_start(sco(ScoMode::Wb)).unwrap();
    settle(&mut k, 0);
    k.sco_set_volume(-3).unwrap();
    k.sco_mic_mute(true).unwrap();
    k.sco_stop().unwrap();
    settle(&mut k, 0);

    assert!(k.platform().has(&Call::ScoVolume(-3)));
    assert!(k.platform().has(&Call::ScoMicMute(true)));
    assert!(k.platform().has(&Call::ScoStop));
    assert!(k.platform().has(&Call::ScoDestroy));
    assert_eq!(k.state(), KymeraState::Idle);
    assert!(k.mic_arbiter().active_users().is_empty());
    assert!(!k.is_queued(MessageKind::ScoAudioSynchronised));
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn sco_rolls_back_when_mics_refused() {
    let mut k = kymera_with(no_concurrency(), MockPlatform::default());
    k.mic_connect(MicUser::Va).unwrap();

    k.sco_start(sco(ScoMode::Wb)).unwrap();
    settle(&mut k, 0);

    assert_eq!(k.state(), KymeraState::Idle);
    assert!(k.platform().has(&Call::ScoDestroy));
    assert!(!k.platform().has(&Call::ScoStart));
    assert!(k.lock().is_empty());
    assert_eq!(k.platform().enabled, 0);
    assert_eq!(k.mic_arbiter().active_users(), MicUsers::VA);
}

#[test]
fn sco_rolls_back_when_chain_fails() {
    let mut k = kymera_with(
        config(),
        MockPlatform { sco_start_fails: true, ..MockPlatform::default() },
    );
    k.sco_start(sco(ScoMode::Wb)).unwrap();
    settle(&mut k, 0);

    assert_eq!(k.state(), KymeraState::Idle);
    assert!(k.platform().has(&Call::ScoStop));
    assert!(k.platform().has(&Call::ScoDestroy));
    assert!(k.mic_arbiter().active_users().is_empty());
    assert!(!k.is_queued(MessageKind::ScoAudioSynchronised));
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn start_waits_for_busy_use_case() {
    let mut k = kymera();
    k.sco_start(sco(ScoMode::Wb)).unwrap();
    settle(&mut k, 0);

    k.wired_audio_start(wired()).unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::ScoActive);
    assert!(k.is_queued(MessageKind::WiredAudioStart));

    k.sco_stop().unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::WiredAudioPlaying);
    assert!(k.platform().has(&Call::WiredStart(48_000)));
    assert_eq!(k.platform().enabled, 1);
}

// ---------------------------------------------------------------------------
// Tones and prompts
// ---------------------------------------------------------------------------

static TONE_LOCK: AtomicU16 = AtomicU16::new(0);

#[test]
fn non_interruptible_tone_holds_back_starts() {
    let mut k = kymera();
    let lock = ClientLock::new(&TONE_LOCK, 0x4);

    k.tone_play(1, false, Some(lock)).unwrap();
    assert!(k.is_tone_playing());
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::TonePlaying);
    assert!(k.lock().contains(StartingLock::TONE));
    assert!(lock.is_set());
    assert!(k
        .platform()
        .has(&Call::Notify(LISTENER, KymeraNotification::ToneStarted(1))));

    k.a2dp_start(a2dp(Seid::Sink(1), 0)).unwrap();
    settle(&mut k, 0);
    assert!(k.is_queued(MessageKind::A2dpStart));

    k.operator_message(&[1, 0, 0]).unwrap();
    settle(&mut k, 0);

    assert!(!k.is_tone_playing());
    assert!(!lock.is_set());
    assert!(!k.lock().contains(StartingLock::TONE));
    assert_eq!(k.state(), KymeraState::A2dpStreaming);
    assert_eq!(k.platform().enabled, 1);
}

#[test]
fn interruptible_tone_takes_no_lock() {
    let mut k = kymera();
    k.tone_play(2, true, None).unwrap();
    settle(&mut k, 0);

    assert!(k.lock().is_empty());
    assert_eq!(k.tone_state(), ToneState::Playing);

    k.tone_prompt_cancel().unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::Idle);
    assert_eq!(k.tone_state(), ToneState::Idle);
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn new_tone_replaces_playing_one() {
    let mut k = kymera();
    k.tone_play(1, true, None).unwrap();
    k.tone_play(2, true, None).unwrap();
    settle(&mut k, 0);

    assert_eq!(
        k.platform()
            .log
            .iter()
            .filter(|c| matches!(c, Call::TonePlay(_) | Call::ToneStop))
            .collect::<Vec<_>>(),
        vec![&Call::TonePlay(1), &Call::ToneStop, &Call::TonePlay(2)]
    );
    assert!(k.is_tone_playing());
    assert_eq!(k.platform().enabled, 1);
}

#[test]
fn prepared_prompt_chain_times_out() {
    let mut k = kymera();
    k.prepare_for_prompt(PromptFormat::Sbc, 16_000).unwrap();

    assert!(k.is_ready_for_prompt(PromptFormat::Sbc));
    assert!(!k.is_ready_for_prompt(PromptFormat::Pcm));
    assert_eq!(
        k.prepare_for_prompt(PromptFormat::Pcm, 16_000),
        Err(KymeraError::ToneBusy)
    );

    settle(&mut k, 999);
    assert!(k.is_ready_for_prompt(PromptFormat::Sbc));
    settle(&mut k, 1000);
    assert_eq!(k.tone_state(), ToneState::Idle);
    assert!(k.platform().has(&Call::ToneStop));
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn prompt_reuses_prepared_chain() {
    let mut k = kymera();
    k.prepare_for_prompt(PromptFormat::Sbc, 16_000).unwrap();
    k.prompt_play(3, PromptFormat::Sbc, 16_000, true, None).unwrap();
    settle(&mut k, 0);

    assert!(!k.platform().has(&Call::ToneStop));
    assert!(k
        .platform()
        .has(&Call::Notify(LISTENER, KymeraNotification::PromptStarted(3))));
    settle(&mut k, 5000);
    assert_eq!(k.tone_state(), ToneState::Playing);

    k.stream_disconnect().unwrap();
    settle(&mut k, 5000);
    assert!(k.platform().has(&Call::ToneStop));
    assert!(k
        .platform()
        .has(&Call::Indicate(CLIENT, KymeraIndication::PromptEnd, 0)));
    assert_eq!(k.state(), KymeraState::Idle);
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn prompt_in_other_format_rebuilds_chain() {
    let mut k = kymera();
    k.prepare_for_prompt(PromptFormat::Pcm, 16_000).unwrap();
    k.prompt_play(4, PromptFormat::Sbc, 16_000, true, None).unwrap();
    settle(&mut k, 0);

    let pos = |call: &Call| k.platform().log.iter().position(|c| c == call);
    assert!(pos(&Call::ToneStop).unwrap() < pos(&Call::TonePlay(4)).unwrap());
    assert_eq!(k.platform().enabled, 1);
}

#[test]
fn sco_start_stops_tone() {
    let mut k = kymera();
    k.tone_play(1, true, None).unwrap();
    settle(&mut k, 0);
    k.sco_start(sco(ScoMode::Wb)).unwrap();
    settle(&mut k, 0);

    assert!(k.platform().has(&Call::ToneStop));
    assert!(!k.is_tone_playing());
    assert_eq!(k.state(), KymeraState::ScoActive);
}

// ---------------------------------------------------------------------------
// Operator messages
// ---------------------------------------------------------------------------

#[test]
fn operator_messages_decode() {
    assert_eq!(decode_operator_message(&[1, 0, 0]), Ok(OperatorEvent::ToneEnd));
    assert_eq!(decode_operator_message(&[1, 0, 0, 0]), Err(OpMsgError::BadLength(4)));
    assert_eq!(decode_operator_message(&[7, 1]), Err(OpMsgError::BadLength(2)));
    assert_eq!(
        decode_operator_message(&[7, 1, 42]),
        Ok(OperatorEvent::AancTrigger { event: AancEvent::EdActive, payload: 42 })
    );
    assert_eq!(decode_operator_message(&[8, 9, 0]), Ok(OperatorEvent::Ignored));
    assert_eq!(
        decode_operator_message(&[11, 0, 1]),
        Ok(OperatorEvent::FitTest { good: false })
    );
    assert_eq!(decode_operator_message(&[11, 3, 1]), Ok(OperatorEvent::Ignored));
    assert_eq!(decode_operator_message(&[42, 0, 0]), Err(OpMsgError::UnknownMessage(42)));
}

#[test]
fn operator_events_reach_clients() {
    let mut k = kymera();
    k.operator_message(&[7, 1, 42]).unwrap();
    k.operator_message(&[8, 3, 9]).unwrap();
    k.operator_message(&[11, 0, 0]).unwrap();
    k.operator_message(&[99, 0, 0]).unwrap();
    settle(&mut k, 0);

    let indications: Vec<_> = k
        .platform()
        .log
        .iter()
        .filter(|c| matches!(c, Call::Indicate(..)))
        .cloned()
        .collect();
    assert_eq!(
        indications,
        vec![
            Call::Indicate(CLIENT, KymeraIndication::AancEdActiveTrigger, 42),
            Call::Indicate(CLIENT, KymeraIndication::AancQuietModeClear, 0),
            Call::Indicate(CLIENT, KymeraIndication::GoodFit, 0),
        ]
    );
}

#[test]
fn unregistered_client_gets_nothing() {
    let mut k = kymera();
    k.client_register(CLIENT);
    k.client_unregister(CLIENT);
    k.operator_message(&[11, 0, 1]).unwrap();
    settle(&mut k, 0);

    assert_eq!(k.platform().count(|c| matches!(c, Call::Indicate(..))), 0);
}

// ---------------------------------------------------------------------------
// DSP power and clock
// ---------------------------------------------------------------------------

#[test]
fn prospective_power_on_restarts_timer() {
    let mut k = kymera();
    k.prospective_dsp_power_on().unwrap();
    assert_eq!(k.platform().enabled, 1);

    k.process(at(1000));
    k.prospective_dsp_power_on().unwrap();
    assert_eq!(k.platform().count(|c| *c == Call::Enable), 1);

    settle(&mut k, 5999);
    assert_eq!(k.platform().enabled, 1);
    settle(&mut k, 6000);
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn prospective_power_on_ignored_while_tuning() {
    let mut k = kymera();
    k.anc_tuning_start(48_000).unwrap();
    settle(&mut k, 0);
    k.prospective_dsp_power_on().unwrap();

    assert_eq!(k.platform().enabled, 1);
    assert!(!k.is_queued(MessageKind::ProspectivePowerOff));
}

fn inputs(state: KymeraState) -> ClockInputs {
    ClockInputs {
        state,
        hints: ClockHints::default(),
        features: KymeraFeatures::default(),
        codec: None,
        sco_mode: None,
        tone_playing: false,
        concurrency: false,
        output_rate: 48_000,
    }
}

#[test]
fn clock_defaults_when_idle() {
    assert_eq!(dsp_clock_config(&inputs(KymeraState::Idle)), DspClockConfig::default());

    let va = ClockInputs {
        hints: ClockHints { va_active: true, ..ClockHints::default() },
        ..inputs(KymeraState::Idle)
    };
    let config = dsp_clock_config(&va);
    assert_eq!(config.active, DspClock::Base);
    assert_eq!(config.mode, PowerSaveMode::Mode1);
}

#[test]
fn clock_follows_codec_and_mode() {
    let aptx = ClockInputs {
        codec: Some(A2dpCodec::AptX),
        ..inputs(KymeraState::A2dpStreaming)
    };
    assert_eq!(dsp_clock_config(&aptx).active, DspClock::Base);

    let aac = ClockInputs {
        codec: Some(A2dpCodec::Aac),
        ..inputs(KymeraState::A2dpStreaming)
    };
    assert_eq!(dsp_clock_config(&aac), DspClockConfig::default());

    let wb = ClockInputs { sco_mode: Some(ScoMode::Wb), ..inputs(KymeraState::ScoActive) };
    assert_eq!(dsp_clock_config(&wb).active, DspClock::Base);

    let wb_aanc = ClockInputs {
        features: KymeraFeatures { aanc_build: true, ..KymeraFeatures::default() },
        ..wb
    };
    assert_eq!(dsp_clock_config(&wb_aanc).active, DspClock::Turbo);

    assert_eq!(
        dsp_clock_config(&inputs(KymeraState::UsbVoiceActive)).active,
        DspClock::Turbo
    );
}

#[test]
fn clock_boosts_in_gaming_mode() {
    let gaming = ClockInputs {
        codec: Some(A2dpCodec::AptXAdaptive),
        hints: ClockHints { gaming_mode: true, ..ClockHints::default() },
        features: KymeraFeatures { boost_in_gaming_mode: true, ..KymeraFeatures::default() },
        ..inputs(KymeraState::A2dpStreaming)
    };
    assert_eq!(dsp_clock_config(&gaming).active, DspClock::Turbo);

    let tone = ClockInputs { output_rate: 96_000, ..inputs(KymeraState::TonePlaying) };
    assert_eq!(dsp_clock_config(&tone).active, DspClock::Base);
}

#[test]
fn clock_is_only_reconfigured_on_change() {
    let mut k = kymera();
    k.set_state(KymeraState::Idle);
    assert_eq!(k.platform().count(|c| matches!(c, Call::Clock(_))), 0);

    k.set_state(KymeraState::UsbAudioActive);
    assert_eq!(k.platform().last_clock().map(|c| c.active), Some(DspClock::Turbo));
    k.set_state(KymeraState::UsbAudioActive);
    assert_eq!(k.platform().count(|c| matches!(c, Call::Clock(_))), 1);
}

// ---------------------------------------------------------------------------
// ANC tuning
// ---------------------------------------------------------------------------

#[test]
fn anc_tuning_start_and_stop() {
    let mut k = kymera();
    k.anc_tuning_start(48_000).unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::AncTuning);
    assert!(k.platform().has(&Call::AncTuningStart(48_000)));
    assert_eq!(k.lock(), StartingLock::ANC_TUNING_STARTING);

    k.aanc_tuning_stop().unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::AncTuning);
    assert_eq!(k.lock(), StartingLock::ANC_TUNING_STARTING);

    k.anc_tuning_stop().unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::Idle);
    assert!(k.platform().has(&Call::AncTuningStop));
    assert!(k.lock().is_empty());
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn tone_waits_for_tuning_to_stop() {
    let mut k = kymera();
    k.anc_tuning_start(48_000).unwrap();
    settle(&mut k, 0);

    k.tone_play(7, true, None).unwrap();
    settle(&mut k, 0);
    assert!(!k.platform().has(&Call::TonePlay(7)));
    assert!(k.is_queued(MessageKind::TonePromptPlay));
    assert_eq!(k.state(), KymeraState::AncTuning);

    k.anc_tuning_stop().unwrap();
    settle(&mut k, 0);
    assert!(k.platform().has(&Call::AncTuningStop));
    assert!(k.platform().has(&Call::TonePlay(7)));
    assert_eq!(k.state(), KymeraState::TonePlaying);
}

#[test]
fn aanc_tuning_uses_adaptive_chain() {
    let mut k = kymera();
    k.aanc_tuning_start(96_000).unwrap();
    settle(&mut k, 0);
    assert!(k.platform().has(&Call::AancTuningStart(96_000)));
    assert_eq!(k.lock(), StartingLock::AANC_TUNING_STARTING);

    k.aanc_tuning_stop().unwrap();
    settle(&mut k, 0);
    assert!(k.platform().has(&Call::AancTuningStop));
    assert_eq!(k.state(), KymeraState::Idle);
}

#[test]
fn anc_tuning_waits_for_tone() {
    let mut k = kymera();
    k.tone_play(1, true, None).unwrap();
    settle(&mut k, 0);

    k.anc_tuning_start(48_000).unwrap();
    settle(&mut k, 199);
    assert!(!k.platform().has(&Call::AncTuningStart(48_000)));
    settle(&mut k, 200);
    assert!(k.platform().has(&Call::AncTuningStart(48_000)));
}

#[test]
fn anc_tuning_waits_for_busy_use_case() {
    let mut k = kymera();
    k.wired_audio_start(wired()).unwrap();
    settle(&mut k, 0);

    k.anc_tuning_start(48_000).unwrap();
    settle(&mut k, 0);
    assert!(k.is_queued(MessageKind::AncTuningStart));

    k.wired_audio_stop().unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::AncTuning);
}

// ---------------------------------------------------------------------------
// Adaptive ANC
// ---------------------------------------------------------------------------

#[test]
fn adaptive_anc_starts_standalone() {
    let mut k = kymera();
    k.enable_adaptive_anc(aanc_params()).unwrap();
    settle(&mut k, 0);

    assert!(k.platform().has(&Call::AancCreate));
    assert!(k.platform().has(&Call::AancStart));
    assert!(k.is_adaptive_anc_running());
    assert_eq!(k.state(), KymeraState::AdaptiveAncStarted);
    assert_eq!(k.mic_arbiter().active_users(), MicUsers::AANC);

    k.disable_adaptive_anc().unwrap();
    settle(&mut k, 0);
    assert!(k.platform().has(&Call::AancDestroy));
    assert_eq!(k.state(), KymeraState::Idle);
    assert!(k.mic_arbiter().active_users().is_empty());
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn adaptive_anc_needs_chain() {
    let mut k = kymera_with(
        KymeraConfig {
            chains: ChainConfigs { aanc: None, ..config().chains },
            ..config()
        },
        MockPlatform::default(),
    );
    k.enable_adaptive_anc(aanc_params()).unwrap();
    settle(&mut k, 0);

    assert!(!k.platform().has(&Call::AancCreate));
    assert_eq!(k.state(), KymeraState::Idle);
}

#[test]
fn adaptive_anc_retries_for_mics() {
    let mut k = kymera_with(no_concurrency(), MockPlatform::default());
    k.mic_connect(MicUser::Va).unwrap();

    k.enable_adaptive_anc(aanc_params()).unwrap();
    settle(&mut k, 0);
    assert!(!k.platform().has(&Call::AancStart));
    assert!(k.is_queued(MessageKind::MicConnectionTimeoutAnc));

    k.mic_disconnect(MicUser::Va);
    settle(&mut k, 99);
    assert!(!k.platform().has(&Call::AancStart));
    settle(&mut k, 100);
    assert!(k.platform().has(&Call::AancStart));
    assert_eq!(k.state(), KymeraState::AdaptiveAncStarted);
}

#[test]
fn adaptive_anc_runs_in_concurrency_with_sco() {
    let mut k = kymera();
    k.enable_adaptive_anc(aanc_params()).unwrap();
    settle(&mut k, 0);
    k.sco_start(sco(ScoMode::Wb)).unwrap();
    settle(&mut k, 0);

    assert_eq!(k.state(), KymeraState::ScoActive);
    assert!(k.in_concurrency());
    assert!(k.status().in_concurrency);
    assert_eq!(k.mic_arbiter().active_users(), MicUsers::AANC | MicUsers::SCO);

    k.disable_adaptive_anc().unwrap();
    settle(&mut k, 0);
    assert!(!k.in_concurrency());
    assert_eq!(k.state(), KymeraState::ScoActive);
}

#[test]
fn tone_returns_to_adaptive_anc() {
    let mut k = kymera();
    k.enable_adaptive_anc(aanc_params()).unwrap();
    settle(&mut k, 0);

    k.tone_play(5, true, None).unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::TonePlaying);

    k.operator_message(&[1, 0, 0]).unwrap();
    settle(&mut k, 0);
    assert_eq!(k.state(), KymeraState::AdaptiveAncStarted);
}

// ---------------------------------------------------------------------------
// Leakthrough
// ---------------------------------------------------------------------------

#[test]
fn standalone_leakthrough_ramps_sidetone() {
    let mut k = kymera();
    k.create_standalone_leakthrough().unwrap();
    settle(&mut k, 0);

    assert!(k.platform().has(&Call::OutputStart));
    assert!(k.is_leakthrough_active());
    assert_eq!(k.state(), KymeraState::StandaloneLeakthrough);
    assert!(k.mic_arbiter().is_leakthrough_enabled());

    settle(&mut k, 99);
    assert!(!k.platform().has(&Call::SidetonePath(true)));

    for ms in (100..=725).step_by(25) {
        settle(&mut k, ms);
    }
    let gains: Vec<_> = k
        .platform()
        .log
        .iter()
        .filter_map(|c| match c {
            Call::SidetoneGain(gain) => Some(*gain),
            _ => None,
        })
        .collect();
    assert!(k.platform().has(&Call::SidetonePath(true)));
    assert_eq!(gains.len(), 1 + SIDETONE_RAMP.len());
    assert_eq!(gains[0], SIDETONE_RAMP[0]);
    assert_eq!(gains.last(), SIDETONE_RAMP.last());
    assert!(!k.is_queued(MessageKind::SidetoneGainRampup));
}

#[test]
fn leakthrough_destroy_powers_down_later() {
    let mut k = kymera();
    k.create_standalone_leakthrough().unwrap();
    settle(&mut k, 0);
    settle(&mut k, 100);

    k.destroy_standalone_leakthrough().unwrap();
    settle(&mut k, 100);
    assert!(k.platform().has(&Call::SidetonePath(false)));
    assert!(k.platform().has(&Call::OutputStop));
    assert_eq!(k.state(), KymeraState::Idle);
    assert!(!k.is_leakthrough_active());
    assert!(!k.mic_arbiter().is_leakthrough_enabled());
    assert!(!k.is_queued(MessageKind::SidetoneGainRampup));
    assert_eq!(k.platform().enabled, 1);

    settle(&mut k, 5100);
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn leakthrough_joins_running_output() {
    let mut k = kymera_with(
        config(),
        MockPlatform { output_in_use: true, ..MockPlatform::default() },
    );
    k.create_standalone_leakthrough().unwrap();
    settle(&mut k, 0);

    assert!(k.is_leakthrough_active());
    assert!(!k.platform().has(&Call::OutputStart));
    assert_eq!(k.state(), KymeraState::Idle);
}

#[test]
fn leakthrough_retries_for_mics() {
    let mut k = kymera_with(no_concurrency(), MockPlatform::default());
    k.mic_connect(MicUser::Va).unwrap();

    k.create_standalone_leakthrough().unwrap();
    settle(&mut k, 0);
    assert!(!k.is_leakthrough_active());
    assert!(k.is_queued(MessageKind::MicConnectionTimeoutLeakthrough));

    k.mic_disconnect(MicUser::Va);
    settle(&mut k, 100);
    assert!(k.is_leakthrough_active());
    assert!(k.platform().has(&Call::OutputStart));
}

// ---------------------------------------------------------------------------
// USB and wired audio
// ---------------------------------------------------------------------------

static USB_LOCK: AtomicU16 = AtomicU16::new(0);

#[test]
fn usb_audio_start_and_stop() {
    let mut k = kymera();
    let lock = ClientLock::new(&USB_LOCK, 0x2);
    k.usb_audio_start(UsbAudioRequest {
        rate: 48_000,
        channels: 2,
        volume_db: -6,
        client_lock: Some(lock),
    })
    .unwrap();
    assert!(lock.is_set());
    settle(&mut k, 0);

    assert_eq!(k.state(), KymeraState::UsbAudioActive);
    assert!(!lock.is_set());

    k.usb_audio_set_volume(-10).unwrap();
    k.usb_audio_set_volume(-5).unwrap();
    k.usb_audio_stop().unwrap();
    settle(&mut k, 0);
    assert_eq!(k.platform().count(|c| matches!(c, Call::UsbAudioVolume(_))), 1);
    assert!(k.platform().has(&Call::UsbAudioVolume(-5)));
    assert_eq!(k.state(), KymeraState::Idle);
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn usb_audio_failure_returns_to_idle() {
    let mut k = kymera_with(
        config(),
        MockPlatform { chain_start_fails: true, ..MockPlatform::default() },
    );
    k.usb_audio_start(UsbAudioRequest {
        rate: 48_000,
        channels: 2,
        volume_db: -6,
        client_lock: None,
    })
    .unwrap();
    settle(&mut k, 0);

    assert!(k.platform().has(&Call::UsbAudioStop));
    assert_eq!(k.state(), KymeraState::Idle);
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn usb_voice_holds_microphones() {
    let mut k = kymera();
    k.usb_voice_start(UsbVoiceRequest {
        mode: ScoMode::Wb,
        sco_interface: true,
        volume_db: -6,
        mic_count: 1,
    })
    .unwrap();
    settle(&mut k, 0);

    assert_eq!(k.state(), KymeraState::UsbScoVoiceActive);
    assert_eq!(k.mic_arbiter().active_users(), MicUsers::USB_VOICE);

    k.usb_voice_mic_mute(true).unwrap();
    k.usb_voice_set_volume(-1).unwrap();
    k.usb_voice_stop().unwrap();
    settle(&mut k, 0);
    assert!(k.platform().has(&Call::UsbVoiceMicMute(true)));
    assert!(k.platform().has(&Call::UsbVoiceVolume(-1)));
    assert_eq!(k.state(), KymeraState::Idle);
    assert!(k.mic_arbiter().active_users().is_empty());
    assert_eq!(k.platform().enabled, 0);
}

#[test]
fn wired_audio_volume_and_stop() {
    let mut k = kymera();
    k.wired_audio_start(wired()).unwrap();
    k.wired_audio_set_volume(-4).unwrap();
    settle(&mut k, 0);
    assert!(k.platform().has(&Call::WiredVolume(-4)));

    k.wired_audio_stop().unwrap();
    settle(&mut k, 0);
    assert!(k.platform().has(&Call::WiredStop));
    assert_eq!(k.state(), KymeraState::Idle);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn chain_configs_toggle_mic_concurrency() {
    let mut k = kymera();
    assert!(k.mic_arbiter().is_concurrency_enabled());

    k.set_chain_configs(ChainConfigs::default());
    assert!(!k.mic_arbiter().is_concurrency_enabled());
}

// ---------------------------------------------------------------------------
// Message queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Msg(u8, char);

impl Keyed for Msg {
    type Key = u8;

    fn key(&self) -> u8 {
        self.0
    }
}

fn t(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

#[test]
fn queue_delivers_in_due_then_send_order() {
    let mut q: MessageQueue<Msg, 8> = MessageQueue::new();
    q.send_later(Msg(1, 'a'), t(0), Duration::from_millis(10)).unwrap();
    q.send(Msg(2, 'b'), t(0)).unwrap();
    q.send(Msg(3, 'c'), t(0)).unwrap();

    let open = |_: Gate| true;
    assert_eq!(q.next_deadline(open), Some(t(0)));
    assert_eq!(q.pop_ready(t(5), open), Some(Msg(2, 'b')));
    assert_eq!(q.pop_ready(t(5), open), Some(Msg(3, 'c')));
    assert_eq!(q.pop_ready(t(5), open), None);
    assert_eq!(q.next_deadline(open), Some(t(10)));
    assert_eq!(q.pop_ready(t(10), open), Some(Msg(1, 'a')));
    assert!(q.is_empty());
}

#[test]
fn queue_holds_gated_messages() {
    let mut q: MessageQueue<Msg, 8> = MessageQueue::new();
    q.send_conditionally(Msg(1, 'a'), t(0), Gate::Lock).unwrap();
    q.send_conditionally(Msg(2, 'b'), t(0), Gate::BusyLock).unwrap();
    q.send(Msg(3, 'c'), t(0)).unwrap();

    let busy = |gate: Gate| gate != Gate::BusyLock;
    assert_eq!(q.pop_ready(t(0), busy), Some(Msg(1, 'a')));
    assert_eq!(q.pop_ready(t(0), busy), Some(Msg(3, 'c')));
    assert_eq!(q.pop_ready(t(0), busy), None);
    assert_eq!(q.next_deadline(busy), None);
    assert_eq!(q.pop_ready(t(0), |_| true), Some(Msg(2, 'b')));
}

#[test]
fn queue_cancels_in_delivery_order() {
    let mut q: MessageQueue<Msg, 8> = MessageQueue::new();
    q.send_later(Msg(1, 'a'), t(0), Duration::from_millis(50)).unwrap();
    q.send(Msg(1, 'b'), t(0)).unwrap();
    q.send(Msg(1, 'c'), t(0)).unwrap();
    q.send(Msg(2, 'd'), t(0)).unwrap();

    assert_eq!(q.cancel_first(1), Some(Msg(1, 'b')));
    assert!(q.contains(1));
    assert_eq!(q.cancel_all(1), 2);
    assert!(!q.contains(1));
    assert_eq!(q.cancel_first(1), None);
    assert_eq!(q.len(), 1);
}

#[test]
fn queue_ignores_messages_past_watermark() {
    let mut q: MessageQueue<Msg, 8> = MessageQueue::new();
    q.send(Msg(1, 'a'), t(0)).unwrap();
    let mark = q.watermark();
    q.send(Msg(2, 'b'), t(0)).unwrap();

    assert_eq!(q.pop_ready_before(t(0), mark, |_| true), Some(Msg(1, 'a')));
    assert_eq!(q.pop_ready_before(t(0), mark, |_| true), None);
    assert_eq!(q.pop_ready(t(0), |_| true), Some(Msg(2, 'b')));
}

#[test]
fn queue_rejects_when_full() {
    let mut q: MessageQueue<Msg, 2> = MessageQueue::new();
    q.send(Msg(1, 'a'), t(0)).unwrap();
    q.send(Msg(2, 'b'), t(0)).unwrap();
    assert_eq!(q.send(Msg(3, 'c'), t(0)), Err(KymeraError::QueueFull));

    q.clear();
    assert!(q.is_empty());
}
