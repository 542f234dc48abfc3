use super::error::DecodeError;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// De-interleaved PCM decoded from a RIFF/WAVE file, one sample vector per
/// channel, normalised to -1.0..1.0.
#[derive(Clone, Debug, PartialEq)]
pub struct WavData {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl WavData {
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_frames(&self) -> usize {
        self.channels.first().map_or(0, |channel| channel.len())
    }
}

struct FmtChunk {
    audio_format: u16,
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn read_u16_le(bytes: &[u8], pos: usize) -> Result<u16, DecodeError> {
    bytes
        .get(pos..pos + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| DecodeError::new("unexpected end of WAV data"))
}

fn read_u32_le(bytes: &[u8], pos: usize) -> Result<u32, DecodeError> {
    bytes
        .get(pos..pos + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| DecodeError::new("unexpected end of WAV data"))
}

pub fn decode_wav(bytes: &[u8]) -> Result<WavData, DecodeError> {
    if !is_wav(bytes) {
        return Err(DecodeError::new("missing RIFF/WAVE header"));
    }

    let mut pos = 12usize;
    let mut fmt: Option<FmtChunk> = None;
    let mut data: Option<&[u8]> = None;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = read_u32_le(bytes, pos + 4)? as usize;
        let body_start = pos + 8;
        // Field recorders often leave the data size at 0 or overstate it.
        let body_end = body_start.saturating_add(size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => {
                if body.len() < 16 {
                    return Err(DecodeError::new("fmt chunk too small"));
                }
                let mut audio_format = read_u16_le(body, 0)?;
                if audio_format == FORMAT_EXTENSIBLE && body.len() >= 26 {
                    audio_format = read_u16_le(body, 24)?;
                }
                fmt = Some(FmtChunk {
                    audio_format,
                    num_channels: read_u16_le(body, 2)?,
                    sample_rate: read_u32_le(body, 4)?,
                    bits_per_sample: read_u16_le(body, 14)?,
                });
            }
            b"data" => {
                let body = if size == 0 { &bytes[body_start..] } else { body };
                data = Some(body);
                break;
            }
            _ => {}
        }

        pos = body_start.saturating_add(size);
        if size % 2 == 1 {
            pos += 1;
        }
    }

    let fmt = fmt.ok_or_else(|| DecodeError::new("fmt chunk not found"))?;
    let data = data.ok_or_else(|| DecodeError::new("data chunk not found"))?;
    if fmt.num_channels == 0 || fmt.sample_rate == 0 {
        return Err(DecodeError::new("WAV declares no channels or no sample rate"));
    }

    let sample_at: fn(&[u8]) -> f32 = match (fmt.audio_format, fmt.bits_per_sample) {
        (FORMAT_PCM, 8) => |b| (b[0] as f32 - 128.0) / 128.0,
        (FORMAT_PCM, 16) => |b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0,
        (FORMAT_PCM, 24) => |b| (i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8) as f32 / 8388608.0,
        (FORMAT_PCM, 32) => |b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2147483648.0,
        (FORMAT_IEEE_FLOAT, 32) => |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        (format, bits) => {
            return Err(DecodeError::new(format!(
                "unsupported WAV encoding: format={}, bits_per_sample={}",
                format, bits
            )));
        }
    };

    let num_channels = fmt.num_channels as usize;
    let bytes_per_sample = (fmt.bits_per_sample / 8) as usize;
    let frame_size = bytes_per_sample * num_channels;
    let mut channels = vec![Vec::with_capacity(data.len() / frame_size); num_channels];

    for frame in data.chunks_exact(frame_size) {
        for (channel, sample) in channels.iter_mut().zip(frame.chunks_exact(bytes_per_sample)) {
            channel.push(sample_at(sample));
        }
    }

    Ok(WavData {
        sample_rate: fmt.sample_rate,
        channels,
    })
}
