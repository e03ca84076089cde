//! WAV encoding/decoding and PCM math utilities.
//!
//! Pure functions — no I/O, no async runtime. Used by the ambience loop to
//! load the crowd-noise bed and by the audio history sink to persist mixed
//! clips; the mixer and TTS fetcher never touch WAV framing directly, only
//! raw interleaved `i16` samples.

/// Write a minimal WAV file (16-bit PCM, `channels` interleaved) from raw samples.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let channels = channels.max(1);
    let data_len = (samples.len() * 2) as u32;
    let file_len = 36 + data_len;
    let block_align = channels * 2;
    let mut buf = Vec::with_capacity(44 + data_len as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_len.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes()); // byte rate
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}

/// Parsed WAV header fields needed to load a fixed audio asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Byte offset in the buffer where raw PCM data begins.
    pub data_offset: usize,
    /// Byte length of the data chunk.
    pub data_len: usize,
}

/// Parse a WAV header from a byte buffer, locating the `data` chunk.
pub fn parse_wav_header(buf: &[u8]) -> Result<WavHeader, &'static str> {
    if buf.len() < 12 {
        return Err("too short for RIFF header");
    }
    if &buf[0..4] != b"RIFF" {
        return Err("missing RIFF tag");
    }
    if &buf[8..12] != b"WAVE" {
        return Err("missing WAVE tag");
    }

    let mut pos = 12;
    let mut channels: Option<u16> = None;
    let mut sample_rate: Option<u32> = None;
    let mut bits_per_sample: Option<u16> = None;

    while pos + 8 <= buf.len() {
        let chunk_id = &buf[pos..pos + 4];
        let chunk_size =
            u32::from_le_bytes([buf[pos + 4], buf[pos + 5], buf[pos + 6], buf[pos + 7]]);

        if chunk_id == b"fmt " {
            if pos + 24 > buf.len() {
                return Err("fmt chunk truncated");
            }
            let audio_format = u16::from_le_bytes([buf[pos + 8], buf[pos + 9]]);
            if audio_format != 1 {
                return Err("not PCM format");
            }
            channels = Some(u16::from_le_bytes([buf[pos + 10], buf[pos + 11]]));
            sample_rate = Some(u32::from_le_bytes([
                buf[pos + 12],
                buf[pos + 13],
                buf[pos + 14],
                buf[pos + 15],
            ]));
            bits_per_sample = Some(u16::from_le_bytes([buf[pos + 22], buf[pos + 23]]));
            pos += 8 + chunk_size as usize;
            continue;
        }

        if chunk_id == b"data" {
            let ch = channels.ok_or("data chunk before fmt chunk")?;
            let sr = sample_rate.ok_or("data chunk before fmt chunk")?;
            let bps = bits_per_sample.ok_or("data chunk before fmt chunk")?;
            return Ok(WavHeader {
                channels: ch,
                sample_rate: sr,
                bits_per_sample: bps,
                data_offset: pos + 8,
                data_len: chunk_size as usize,
            });
        }

        // Skip unknown chunks, padded to an even boundary per the RIFF spec.
        pos += 8 + chunk_size as usize + (chunk_size as usize % 2);
    }

    Err("data chunk not found")
}

/// Decode a 16-bit PCM WAV buffer into interleaved `i16` samples.
pub fn decode_wav(buf: &[u8]) -> Result<(WavHeader, Vec<i16>), &'static str> {
    let header = parse_wav_header(buf)?;
    if header.bits_per_sample != 16 {
        return Err("only 16-bit PCM is supported");
    }
    let start = header.data_offset;
    let end = (start + header.data_len).min(buf.len());
    if start > end {
        return Err("data chunk out of bounds");
    }
    let samples = buf[start..end]
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok((header, samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_wav_produces_valid_header() {
        let samples = vec![0i16; 100];
        let wav = encode_wav(&samples, 16000, 1);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(wav.len(), 44 + 200);
    }

    #[test]
    fn encode_wav_stereo_block_align() {
        let wav = encode_wav(&[1, 2, 3, 4], 22050, 2);
        let block_align = u16::from_le_bytes([wav[32], wav[33]]);
        assert_eq!(block_align, 4);
    }

    #[test]
    fn parse_wav_header_basic() {
        let wav = encode_wav(&vec![0i16; 50], 22050, 1);
        let hdr = parse_wav_header(&wav).unwrap();
        assert_eq!(hdr.channels, 1);
        assert_eq!(hdr.sample_rate, 22050);
        assert_eq!(hdr.bits_per_sample, 16);
        assert_eq!(hdr.data_offset, 44);
        assert_eq!(hdr.data_len, 100);
    }

    #[test]
    fn parse_wav_header_too_short() {
        assert!(parse_wav_header(b"RIFF").is_err());
    }

    #[test]
    fn parse_wav_header_not_riff() {
        let mut wav = encode_wav(&vec![0i16; 10], 16000, 1);
        wav[0..4].copy_from_slice(b"NOPE");
        assert!(parse_wav_header(&wav).is_err());
    }

    #[test]
    fn decode_wav_round_trips() {
        let samples: Vec<i16> = vec![1, -1, 1000, -1000, 0, 32767, -32768];
        let wav = encode_wav(&samples, 22050, 1);
        let (header, decoded) = decode_wav(&wav).unwrap();
        assert_eq!(header.sample_rate, 22050);
        assert_eq!(decoded, samples);
    }
}
