use crate::renderer::timeline::LoopPlan;
use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::warn;

/// Decodes audio files into raw samples (f32, interleaved)
pub struct AudioDecoder;

impl AudioDecoder {
    /// Decode an audio file to a vector of samples (f32)
    /// Returns (samples, sample_rate, channels)
    pub fn decode(path: &Path) -> Result<(Vec<f32>, u32, u32)> {
        let src = File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(src), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .context("Unsupported audio format")?;

        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("No supported audio track found")?;

        let dec_opts: DecoderOptions = Default::default();
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &dec_opts)
            .context("Unsupported codec")?;

        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u32)
            .unwrap_or(0);

        let mut all_samples = Vec::new();

        while let Ok(packet) = format.next_packet() {
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u32;
                    let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(decoded);
                    all_samples.extend_from_slice(sample_buf.samples());
                }
                Err(e) => {
                    warn!(path = %path.display(), "Error decoding packet: {}", e);
                    break;
                }
            }
        }

        if channels == 0 {
            anyhow::bail!("Audio file has no channels: {}", path.display());
        }

        Ok((all_samples, sample_rate, channels))
    }
}

/// Decoded PCM audio held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u32) -> Self {
        let channels = channels.max(1);
        let mut samples = samples;
        // Keep whole frames only.
        samples.truncate(samples.len() - samples.len() % channels as usize);
        Self {
            samples,
            sample_rate: sample_rate.max(1),
            channels,
        }
    }

    pub fn silence(duration: f64, sample_rate: u32, channels: u32) -> Self {
        let frames = (duration.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let (samples, rate, channels) = AudioDecoder::decode(path)?;
        Ok(Self::new(samples, rate, channels))
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Linear interpolation of one channel at a fractional frame position.
    fn sample_at(&self, position: f64, channel: usize) -> f32 {
        let frames = self.frames();
        if frames == 0 {
            return 0.0;
        }
        let ch = self.channels as usize;
        let base = (position.floor() as usize).min(frames - 1);
        let next = (base + 1).min(frames - 1);
        let frac = (position - base as f64).clamp(0.0, 1.0) as f32;
        let a = self.samples[base * ch + channel];
        let b = self.samples[next * ch + channel];
        a + (b - a) * frac
    }

    /// Play back `factor` times faster; pitch shifts with it.
    pub fn speed(&self, factor: f64) -> Self {
        if factor <= 0.0 || (factor - 1.0).abs() < f64::EPSILON {
            return self.clone();
        }
        let ch = self.channels as usize;
        let out_frames = (self.frames() as f64 / factor).round() as usize;
        let mut samples = Vec::with_capacity(out_frames * ch);
        for frame in 0..out_frames {
            let position = frame as f64 * factor;
            for channel in 0..ch {
                samples.push(self.sample_at(position, channel));
            }
        }
        Self::new(samples, self.sample_rate, self.channels)
    }

    /// Convert to another sample rate and channel layout.
    pub fn resample(&self, sample_rate: u32, channels: u32) -> Self {
        if sample_rate == self.sample_rate && channels == self.channels {
            return self.clone();
        }
        let ratio = self.sample_rate as f64 / sample_rate as f64;
        let out_frames = (self.frames() as f64 / ratio).round() as usize;
        let src_ch = self.channels as usize;
        let dst_ch = channels.max(1) as usize;
        let mut samples = Vec::with_capacity(out_frames * dst_ch);

        for frame in 0..out_frames {
            let position = frame as f64 * ratio;
            if dst_ch == 1 && src_ch > 1 {
                let sum: f32 = (0..src_ch).map(|c| self.sample_at(position, c)).sum();
                samples.push(sum / src_ch as f32);
            } else {
                for channel in 0..dst_ch {
                    samples.push(self.sample_at(position, channel % src_ch));
                }
            }
        }
        Self::new(samples, sample_rate, channels)
    }

    pub fn gain(&self, volume: f32) -> Self {
        Self::new(
            self.samples.iter().map(|s| s * volume).collect(),
            self.sample_rate,
            self.channels,
        )
    }

    /// Millisecond span `(start, end)` between the first and last non-silent audio.
    ///
    /// A window of `min_silence_ms` slides in 1 ms steps; windows whose RMS is at
    /// or below `threshold_db` dBFS are silent. Returns `None` when everything is
    /// silent.
    pub fn nonsilent_span(&self, threshold_db: f64, min_silence_ms: u32) -> Option<(usize, usize)> {
        let frames_per_ms = self.sample_rate as f64 / 1000.0;
        let total_ms = (self.frames() as f64 / frames_per_ms).floor() as usize;
        let window = min_silence_ms.max(1) as usize;
        if total_ms == 0 {
            return None;
        }
        if total_ms < window {
            return Some((0, total_ms));
        }

        let ch = self.channels as usize;
        // Prefix sums of per-millisecond energy and frame counts.
        let mut energy = vec![0.0f64; total_ms + 1];
        let mut counts = vec![0usize; total_ms + 1];
        for ms in 0..total_ms {
            let start = (ms as f64 * frames_per_ms).round() as usize;
            let end = (((ms + 1) as f64 * frames_per_ms).round() as usize).min(self.frames());
            let mut sum = 0.0f64;
            for frame in start..end {
                let base = frame * ch;
                let mean_sq: f64 = self.samples[base..base + ch]
                    .iter()
                    .map(|s| (*s as f64) * (*s as f64))
                    .sum::<f64>()
                    / ch as f64;
                sum += mean_sq;
            }
            energy[ms + 1] = energy[ms] + sum;
            counts[ms + 1] = counts[ms] + end.saturating_sub(start);
        }

        let threshold_rms = 10f64.powf(threshold_db / 20.0);
        let is_silent = |start: usize| {
            let n = counts[start + window] - counts[start];
            if n == 0 {
                return true;
            }
            let rms = ((energy[start + window] - energy[start]) / n as f64).sqrt();
            rms <= threshold_rms
        };

        let mut silent_ranges: Vec<(usize, usize)> = Vec::new();
        for start in 0..=(total_ms - window) {
            if !is_silent(start) {
                continue;
            }
            match silent_ranges.last_mut() {
                Some(range) if start <= range.1 - window + 1 => range.1 = start + window,
                _ => silent_ranges.push((start, start + window)),
            }
        }

        let mut nonsilent: Vec<(usize, usize)> = Vec::new();
        let mut cursor = 0;
        for (start, end) in &silent_ranges {
            if *start > cursor {
                nonsilent.push((cursor, *start));
            }
            cursor = cursor.max(*end);
        }
        if cursor < total_ms {
            nonsilent.push((cursor, total_ms));
        }

        match (nonsilent.first(), nonsilent.last()) {
            (Some(first), Some(last)) => Some((first.0, last.1)),
            _ => None,
        }
    }

    /// Cut leading and trailing silence; fully silent audio is returned unchanged.
    pub fn trim_silence(&self, threshold_db: f64, min_silence_ms: u32) -> Self {
        match self.nonsilent_span(threshold_db, min_silence_ms) {
            Some((start_ms, end_ms)) => {
                let frames_per_ms = self.sample_rate as f64 / 1000.0;
                let ch = self.channels as usize;
                let start = ((start_ms as f64 * frames_per_ms).round() as usize).min(self.frames());
                let end = ((end_ms as f64 * frames_per_ms).round() as usize).min(self.frames());
                Self::new(
                    self.samples[start * ch..end.max(start) * ch].to_vec(),
                    self.sample_rate,
                    self.channels,
                )
            }
            None => self.clone(),
        }
    }

    /// Join clips end to end, converting each to `sample_rate`/`channels` first.
    pub fn concat(clips: &[&AudioClip], sample_rate: u32, channels: u32) -> Self {
        let mut samples = Vec::new();
        for clip in clips {
            let conformed = clip.resample(sample_rate, channels);
            samples.extend_from_slice(&conformed.samples);
        }
        Self::new(samples, sample_rate, channels)
    }

    /// First `duration` seconds, padded with silence if the clip is shorter.
    pub fn truncated(&self, duration: f64) -> Self {
        let frames = (duration.max(0.0) * self.sample_rate as f64).round() as usize;
        let mut samples = self.samples.clone();
        samples.resize(frames * self.channels as usize, 0.0);
        Self::new(samples, self.sample_rate, self.channels)
    }

    /// Repeat whole copies to cover `duration`, then cut to exactly `duration`.
    pub fn looped_to(&self, duration: f64) -> Self {
        if self.is_empty() {
            return Self::silence(duration, self.sample_rate, self.channels);
        }
        let plan = LoopPlan::cover(self.duration(), duration);
        let mut samples = Vec::with_capacity(self.samples.len() * plan.copies() as usize);
        for _ in 0..plan.copies() {
            samples.extend_from_slice(&self.samples);
        }
        Self::new(samples, self.sample_rate, self.channels).truncated(plan.duration())
    }

    /// Export as 16-bit PCM WAV
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: self.channels as u16,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV writer: {}", path.display()))?;

        for &sample in &self.samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(value)
                .context("Failed to write sample")?;
        }

        writer.finalize().context("Failed to finalize WAV file")?;
        Ok(())
    }
}

/// Mixes multiple audio tracks
pub struct AudioMixer {
    output_sample_rate: u32,
    output_channels: u32,
    tracks: Vec<MixedTrack>,
}

struct MixedTrack {
    clip: AudioClip,
    start_time: f64,
    volume: f32,
}

impl AudioMixer {
    pub fn new(sample_rate: u32, channels: u32) -> Self {
        Self {
            output_sample_rate: sample_rate,
            output_channels: channels,
            tracks: Vec::new(),
        }
    }

    pub fn add_track(&mut self, clip: AudioClip, start_time: f64, volume: f32) {
        self.tracks.push(MixedTrack {
            clip,
            start_time,
            volume,
        });
    }

    #[cfg(test)]
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Additively mix all tracks into a clip of exactly `duration_seconds`
    pub fn mix(&self, duration_seconds: f64) -> AudioClip {
        let out_ch = self.output_channels as usize;
        let total_frames = (duration_seconds * self.output_sample_rate as f64).round() as usize;
        let mut mixed_buffer = vec![0.0f32; total_frames * out_ch];

        for track in &self.tracks {
            let clip = track
                .clip
                .resample(self.output_sample_rate, self.output_channels);
            let start_frame = (track.start_time * self.output_sample_rate as f64).round() as usize;

            for (frame_index, frame) in clip.samples.chunks_exact(out_ch).enumerate() {
                let target = start_frame + frame_index;
                if target >= total_frames {
                    break;
                }
                for (channel, sample) in frame.iter().enumerate() {
                    mixed_buffer[target * out_ch + channel] += sample * track.volume;
                }
            }
        }

        // Soft clip only what would otherwise clip; quieter sums pass through untouched.
        for sample in mixed_buffer.iter_mut().filter(|s| s.abs() > 1.0) {
            *sample = sample.tanh();
        }

        AudioClip::new(mixed_buffer, self.output_sample_rate, self.output_channels)
    }
}
