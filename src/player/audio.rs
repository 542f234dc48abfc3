use js_sys::Uint8Array;
use log::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    AudioBuffer, AudioBufferSourceNode, AudioContext, AudioContextState, AudioScheduledSourceNode,
    GainNode,
};

use super::{
    error::{AudioError, DecodeError, describe_js_error},
    wav::{self, WavData},
};

/// Turns fetched bytes into a playable buffer.
#[allow(async_fn_in_trait)]
pub trait AudioDecoder {
    type Buffer: Clone + 'static;

    async fn decode(&self, bytes: Vec<u8>) -> Result<Self::Buffer, DecodeError>;
}

/// One audio-processing context with a single persistent gain stage wired to
/// the output. Sources only ever connect to that gain stage, so every fade
/// goes through the gain automation methods below.
pub trait AudioGraph: AudioDecoder {
    type Source: 'static;

    /// Context clock, in seconds.
    fn current_time(&self) -> f64;
    fn is_suspended(&self) -> bool;
    fn resume(&self) -> Result<(), AudioError>;

    /// Starts a looping render of `buffer` through the gain stage.
    fn play_looping(&self, buffer: &Self::Buffer) -> Result<Self::Source, AudioError>;
    /// Stops a source immediately and detaches it from the graph.
    fn halt(&self, source: Self::Source);

    /// Current (possibly mid-ramp) value of the gain stage.
    fn gain(&self) -> f32;
    fn cancel_gain_automation(&self, from: f64) -> Result<(), AudioError>;
    fn set_gain_at(&self, value: f32, at: f64) -> Result<(), AudioError>;
    fn ramp_gain_to(&self, value: f32, end: f64) -> Result<(), AudioError>;

    fn close(&self) -> Result<(), AudioError>;
}

pub struct WebAudioGraph {
    context: AudioContext,
    gain_node: GainNode,
}

impl WebAudioGraph {
    pub fn new() -> Result<WebAudioGraph, AudioError> {
        let context = AudioContext::new()?;
        let gain_node = context.create_gain()?;
        gain_node.gain().set_value(0.0);
        gain_node.connect_with_audio_node(&context.destination())?;

        debug!("AudioContext created ({} Hz)", context.sample_rate());
        Ok(WebAudioGraph { context, gain_node })
    }

    fn buffer_from_wav(&self, wav: &WavData) -> Result<AudioBuffer, DecodeError> {
        let buffer = self
            .context
            .create_buffer(
                wav.num_channels() as u32,
                wav.num_frames().max(1) as u32,
                wav.sample_rate as f32,
            )
            .map_err(|err| DecodeError::new(describe_js_error(&err)))?;
        for (index, samples) in wav.channels.iter().enumerate() {
            buffer
                .copy_to_channel(samples, index as i32)
                .map_err(|err| DecodeError::new(describe_js_error(&err)))?;
        }
        Ok(buffer)
    }
}

impl AudioDecoder for WebAudioGraph {
    type Buffer = AudioBuffer;

    async fn decode(&self, bytes: Vec<u8>) -> Result<AudioBuffer, DecodeError> {
        // decodeAudioData detaches the buffer it is given, so hand it a copy.
        let array = Uint8Array::from(&bytes[..]);
        let decoded = match self.context.decode_audio_data(&array.buffer()) {
            Ok(promise) => JsFuture::from(promise).await,
            Err(err) => Err(err),
        };

        match decoded {
            Ok(value) => {
                let buffer: AudioBuffer = value
                    .dyn_into()
                    .map_err(|_| DecodeError::new("decodeAudioData did not return an AudioBuffer"))?;
                debug!(
                    "decoded {} channels, {} frames, {} Hz",
                    buffer.number_of_channels(),
                    buffer.length(),
                    buffer.sample_rate()
                );
                Ok(buffer)
            }
            Err(err) if wav::is_wav(&bytes) => {
                warn!(
                    "browser rejected WAV data ({}), decoding it in place",
                    describe_js_error(&err)
                );
                let wav = wav::decode_wav(&bytes)?;
                self.buffer_from_wav(&wav)
            }
            Err(err) => Err(DecodeError::new(describe_js_error(&err))),
        }
    }
}

impl AudioGraph for WebAudioGraph {
    type Source = AudioBufferSourceNode;

    fn current_time(&self) -> f64 {
        self.context.current_time()
    }

    fn is_suspended(&self) -> bool {
        self.context.state() == AudioContextState::Suspended
    }

    fn resume(&self) -> Result<(), AudioError> {
        // The promise settles once the autoplay policy lets audio through.
        let _ = self.context.resume()?;
        Ok(())
    }

    fn play_looping(&self, buffer: &AudioBuffer) -> Result<AudioBufferSourceNode, AudioError> {
        let source = self.context.create_buffer_source()?;
        source.set_buffer(Some(buffer));
        source.set_loop(true);
        source.connect_with_audio_node(&self.gain_node)?;
        let scheduled: &AudioScheduledSourceNode = source.as_ref();
        scheduled.start()?;
        Ok(source)
    }

    fn halt(&self, source: AudioBufferSourceNode) {
        let scheduled: &AudioScheduledSourceNode = source.as_ref();
        if let Err(err) = scheduled.stop() {
            debug!("source already stopped: {}", describe_js_error(&err));
        }
        let _ = source.disconnect();
    }

    fn gain(&self) -> f32 {
        self.gain_node.gain().value()
    }

    fn cancel_gain_automation(&self, from: f64) -> Result<(), AudioError> {
        self.gain_node.gain().cancel_scheduled_values(from)?;
        Ok(())
    }

    fn set_gain_at(&self, value: f32, at: f64) -> Result<(), AudioError> {
        self.gain_node.gain().set_value_at_time(value, at)?;
        Ok(())
    }

    fn ramp_gain_to(&self, value: f32, end: f64) -> Result<(), AudioError> {
        self.gain_node.gain().linear_ramp_to_value_at_time(value, end)?;
        Ok(())
    }

    fn close(&self) -> Result<(), AudioError> {
        let _ = self.gain_node.disconnect();
        let _ = self.context.close()?;
        Ok(())
    }
}
