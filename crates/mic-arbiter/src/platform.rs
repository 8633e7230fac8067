//! Hardware and DSP services the arbiter drives.

use heapless::Vec;

use crate::aec_map::AecUseCase;
use crate::types::{MicId, Sink, Source, MAX_CONCURRENT_MICS};

/// Physical microphone control. The hardware layer reference-counts
/// non-exclusive users, so every `turn_on` is balanced by one `turn_off`.
pub trait MicHardware {
    fn turn_on(&mut self, mic: MicId, sample_rate: u32) -> Source;
    fn turn_off(&mut self, mic: MicId);
    /// Synchronise `first` with `second`, or clear its synchronisation when
    /// `second` is `None`.
    fn synchronise(&mut self, first: Source, second: Option<Source>);
    /// Keep sources alive across a DSP sleep.
    fn preserve(&mut self, sources: &[Source]);
    fn release(&mut self, sources: &[Source]);
}

/// One microphone input of the AEC reference operator and where its
/// processed output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AecMicRoute {
    pub input: Source,
    pub output: Option<Sink>,
}

/// Full audio-input connection of the AEC reference operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AecAudioInput {
    pub reference_output: Option<Sink>,
    pub mics: Vec<AecMicRoute, MAX_CONCURRENT_MICS>,
}

/// AEC reference configuration derived from the active users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AecAudioConfig {
    pub mic_sample_rate: u32,
    pub ttp_delay_us: u32,
    pub is_source_clock_same: bool,
    pub buffer_size: u16,
}

/// The shared echo-canceller front-end.
pub trait AecReference {
    fn use_case(&self) -> AecUseCase;
    fn set_use_case(&mut self, use_case: AecUseCase);
    fn task_period_us(&self) -> u32;
    fn set_task_period_us(&mut self, period_us: u32);
    fn is_mic_path_input_connected(&self) -> bool;
    fn connect_audio_input(&mut self, input: &AecAudioInput, config: &AecAudioConfig);
    /// Mic inputs only, used when leakthrough runs without a mic consumer.
    fn connect_mic_path_input(&mut self, mics: &[Source], config: &AecAudioConfig);
    /// Attach consumers to an already connected mic path.
    fn connect_mic_path_output(&mut self, aec_reference: Sink, mics: &[Sink]);
    fn disconnect_audio_input(&mut self);
    fn sleep(&mut self);
    fn wake(&mut self);
}

/// Fan-out operator feeding every concurrent user from one front-end.
/// Channel 0 carries the AEC reference, channels `1..=n` the microphones.
pub trait SplitterChain {
    fn create(&mut self, streams: usize, channels: usize);
    fn input(&mut self, channel: usize) -> Sink;
    fn connect_output_stream(&mut self, stream: usize, sinks: &[Option<Sink>]);
    fn start_output_stream(&mut self, stream: usize);
    fn disconnect_output_stream(&mut self, stream: usize);
    fn destroy(&mut self);
    fn sleep(&mut self);
    fn wake(&mut self);
}

/// Per-stream rate converters placed between the splitter and a user whose
/// rate differs from the shared microphone rate.
pub trait MicResampler {
    fn create(&mut self, stream: usize, input_rate: u32, output_rate: u32);
    fn aec_input(&mut self, stream: usize) -> Sink;
    fn aec_output(&mut self, stream: usize) -> Source;
    fn mic_input(&mut self, stream: usize, channel: usize) -> Sink;
    fn mic_output(&mut self, stream: usize, channel: usize) -> Source;
    fn start(&mut self, stream: usize);
    fn stop(&mut self, stream: usize);
    fn destroy(&mut self, stream: usize);
    fn sleep(&mut self);
    fn wake(&mut self);
}

/// Everything the arbiter touches, bundled.
pub trait MicPlatform {
    type Mics: MicHardware;
    type Aec: AecReference;
    type Splitter: SplitterChain;
    type Resampler: MicResampler;

    fn mics(&mut self) -> &mut Self::Mics;
    fn aec(&mut self) -> &mut Self::Aec;
    fn splitter(&mut self) -> &mut Self::Splitter;
    fn resampler(&mut self) -> &mut Self::Resampler;

    /// Stream connection between two endpoints.
    fn connect(&mut self, source: Source, sink: Sink);

    /// Leakthrough sidetone gain must be re-applied after mics are rewired.
    fn setup_leakthrough_gain(&mut self) {}
}
