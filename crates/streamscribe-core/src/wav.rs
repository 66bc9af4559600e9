//! WAV file emission for saved windows (spec §4.4 "Emission", §6).
//!
//! Standard RIFF/WAVE, 44-byte header: mono, 16kHz, 16-bit PCM.

use crate::error::PipelineError;
use crate::ring::SAMPLE_RATE;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

fn spec() -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE as u32,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write `pcm` (little-endian 16-bit mono samples, even byte length) as a
/// WAV file at `path`. `pcm.len()` must be even; callers (the window
/// buffer) guarantee this before calling.
pub fn write_wav(path: &Path, pcm: &[u8]) -> Result<(), PipelineError> {
    debug_assert_eq!(pcm.len() % 2, 0, "PCM byte length must be even");
    let write = || -> std::io::Result<()> {
        let mut writer = WavWriter::create(path, spec())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        for chunk in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        }
        writer
            .finalize()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    };
    write().map_err(|source| PipelineError::WavWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Build an in-memory 44-byte RIFF/WAVE header + raw PCM body, per spec §6,
/// without touching the filesystem. Used by tests that assert on byte
/// layout directly.
pub fn encode_wav_bytes(pcm: &[u8]) -> Vec<u8> {
    let data_len = pcm.len() as u32;
    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // subchunk size
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&(SAMPLE_RATE as u32).to_le_bytes());
    out.extend_from_slice(&(SAMPLE_RATE as u32 * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits/sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_matches_spec() {
        let pcm = vec![1u8, 0, 2, 0, 3, 0, 4, 0];
        let bytes = encode_wav_bytes(&pcm);
        assert_eq!(bytes.len(), 44 + pcm.len());
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes(bytes[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(bytes[22..24].try_into().unwrap()), 1);
        assert_eq!(
            u32::from_le_bytes(bytes[24..28].try_into().unwrap()),
            SAMPLE_RATE as u32
        );
        assert_eq!(
            u32::from_le_bytes(bytes[28..32].try_into().unwrap()),
            SAMPLE_RATE as u32 * 2
        );
        assert_eq!(u16::from_le_bytes(bytes[32..34].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(bytes[34..36].try_into().unwrap()), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(
            u32::from_le_bytes(bytes[40..44].try_into().unwrap()) as usize,
            pcm.len()
        );
    }

    #[test]
    fn write_wav_to_disk_round_trips_via_hound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("window.wav");
        let pcm: Vec<u8> = (0..100i16)
            .flat_map(|s| s.to_le_bytes())
            .collect();
        write_wav(&path, &pcm).unwrap();
        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE as u32);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 100);
    }
}
