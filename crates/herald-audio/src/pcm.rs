//! Mono PCM buffers: decoding, resampling, gain, and WAV encoding.

use crate::error::CompositionError;
use herald_types::{AudioClip, AudioFormat};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Mono floating point samples in `[-1, 1]` at a fixed rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Pcm {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decodes an encoded clip and downmixes it to mono.
    pub fn decode(clip: &AudioClip) -> Result<Self, CompositionError> {
        let mut hint = Hint::new();
        hint.with_extension(clip.format.extension());

        let source = MediaSourceStream::new(Box::new(Cursor::new(clip.bytes.clone())), Default::default());
        let probed = symphonia::default::get_probe()
            .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(decode_error)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| CompositionError::Decode("no decodable audio track".to_string()))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(decode_error)?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(decode_error(e)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt frames are skipped, matching how players treat them.
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(decode_error(e)),
            };

            let spec = *decoded.spec();
            sample_rate = spec.rate;
            let channels = spec.channels.count().max(1);
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);

            samples.extend(
                buffer
                    .samples()
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }

        if samples.is_empty() || sample_rate == 0 {
            return Err(CompositionError::EmptyInput);
        }

        Ok(Self::new(samples, sample_rate))
    }

    /// Linearly resamples to `target_rate`.
    pub fn resampled(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return Self::new(self.samples, target_rate);
        }

        let ratio = f64::from(self.sample_rate) / f64::from(target_rate);
        let out_len = (self.samples.len() as u64 * u64::from(target_rate))
            .div_ceil(u64::from(self.sample_rate)) as usize;
        let last = self.samples.len() - 1;

        let samples = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = (pos.floor() as usize).min(last);
                let next = (idx + 1).min(last);
                let frac = (pos - idx as f64) as f32;
                self.samples[idx] * (1.0 - frac) + self.samples[next] * frac
            })
            .collect();

        Self::new(samples, target_rate)
    }

    /// Scales every sample by `gain_db` decibels, clipping at full scale.
    pub fn amplify(&mut self, gain_db: f32) {
        if gain_db == 0.0 {
            return;
        }
        let factor = 10f32.powf(gain_db / 20.0);
        for sample in &mut self.samples {
            *sample = (*sample * factor).clamp(-1.0, 1.0);
        }
    }

    /// Appends `other`, which must already be at the same rate.
    pub fn append(&mut self, other: &Pcm) {
        debug_assert_eq!(self.sample_rate, other.sample_rate);
        self.samples.extend_from_slice(&other.samples);
    }

    /// Encodes as 16-bit mono WAV.
    pub fn encode_wav(&self) -> Result<AudioClip, CompositionError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            for sample in &self.samples {
                let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
                writer.write_sample(value)?;
            }
            writer.finalize()?;
        }

        Ok(AudioClip::new(cursor.into_inner(), AudioFormat::Wav))
    }
}

fn decode_error(e: SymphoniaError) -> CompositionError {
    CompositionError::Decode(e.to_string())
}
