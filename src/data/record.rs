//! Fixed-length sample record and its big-endian wire layout.
//!
//! A record is `N` signed 16-bit samples. On flash it occupies exactly `2 * N` bytes,
//! sample index ascending, high byte first:
//!
//! ```text
//! offset  0     1     2     3     ...  2N-2   2N-1
//!        [s0 hi][s0 lo][s1 hi][s1 lo] ... [sN-1 hi][sN-1 lo]
//! ```
//!
//! Buffers are stack-allocated with compile-time lengths. The slice-level
//! `encode_into`/`decode_into` functions never resize: a caller supplying the wrong
//! length gets `LengthMismatch`.

use crate::error::{AppResult, FlashDaqError};

/// One quantized reading, scaled to millivolts.
pub type Sample = i16;

/// Number of samples captured per cycle.
pub const MAX_RECORDS: usize = 16;

/// Encoded size of one sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Encoded size of a record of `count` samples.
pub const fn encoded_len(count: usize) -> usize {
    count * BYTES_PER_SAMPLE
}

/// Serialize `count` samples into `out` as big-endian 16-bit values.
///
/// `samples.len()` must equal `count` and `out.len()` must equal `2 * count`.
pub fn encode_into(samples: &[Sample], count: usize, out: &mut [u8]) -> AppResult<()> {
    check_len(count, samples.len())?;
    check_len(encoded_len(count), out.len())?;

    for (sample, chunk) in samples.iter().zip(out.chunks_exact_mut(BYTES_PER_SAMPLE)) {
        chunk.copy_from_slice(&sample.to_be_bytes());
    }
    Ok(())
}

/// Inverse of [`encode_into`].
pub fn decode_into(bytes: &[u8], count: usize, out: &mut [Sample]) -> AppResult<()> {
    check_len(encoded_len(count), bytes.len())?;
    check_len(count, out.len())?;

    for (chunk, sample) in bytes.chunks_exact(BYTES_PER_SAMPLE).zip(out.iter_mut()) {
        *sample = Sample::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(())
}

fn check_len(expected: usize, actual: usize) -> AppResult<()> {
    if expected != actual {
        return Err(FlashDaqError::LengthMismatch { expected, actual });
    }
    Ok(())
}

/// A full record of `N` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<const N: usize = MAX_RECORDS> {
    samples: [Sample; N],
}

impl<const N: usize> Default for Record<N> {
    fn default() -> Self {
        Self { samples: [0; N] }
    }
}

impl<const N: usize> Record<N> {
    /// Number of samples in this record type.
    pub const LEN: usize = N;

    /// Encoded size on flash.
    pub const ENCODED_LEN: usize = encoded_len(N);

    /// Wrap an array of samples.
    pub fn new(samples: [Sample; N]) -> Self {
        Self { samples }
    }

    /// Samples in index order.
    pub fn samples(&self) -> &[Sample; N] {
        &self.samples
    }

    /// Set one slot. Out-of-range indices are ignored by returning `false`.
    pub fn set(&mut self, index: usize, value: Sample) -> bool {
        match self.samples.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Big-endian encoding in a stack buffer.
    pub fn encode(&self) -> EncodedRecord<N> {
        let mut pairs = [[0u8; BYTES_PER_SAMPLE]; N];
        for (pair, sample) in pairs.iter_mut().zip(self.samples.iter()) {
            *pair = sample.to_be_bytes();
        }
        EncodedRecord { pairs }
    }

    /// Decode exactly `2 * N` bytes.
    pub fn decode(bytes: &[u8]) -> AppResult<Self> {
        let mut samples = [0; N];
        decode_into(bytes, N, &mut samples)?;
        Ok(Self { samples })
    }
}

/// Encoded form of a [`Record`], `2 * N` bytes kept as `N` byte pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedRecord<const N: usize> {
    pairs: [[u8; BYTES_PER_SAMPLE]; N],
}

impl<const N: usize> EncodedRecord<N> {
    /// Flat byte view, length `2 * N`.
    pub fn as_bytes(&self) -> &[u8] {
        self.pairs.as_flattened()
    }
}

impl<const N: usize> AsRef<[u8]> for EncodedRecord<N> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO_SAMPLES: [Sample; 4] = [100, -50, 32767, -32768];
    const SCENARIO_BYTES: [u8; 8] = [0x00, 0x64, 0xFF, 0xCE, 0x7F, 0xFF, 0x80, 0x00];

    #[test]
    fn test_known_layout() {
        let record = Record::<4>::new(SCENARIO_SAMPLES);
        let encoded = record.encode();
        assert_eq!(encoded.as_bytes(), &SCENARIO_BYTES);

        let decoded = Record::<4>::decode(&SCENARIO_BYTES).unwrap();
        assert_eq!(decoded.samples(), &SCENARIO_SAMPLES);
    }

    #[test]
    fn test_slice_codec_matches_record_codec() {
        let mut out = [0u8; 8];
        encode_into(&SCENARIO_SAMPLES, 4, &mut out).unwrap();
        assert_eq!(out, SCENARIO_BYTES);

        let mut samples = [0; 4];
        decode_into(&out, 4, &mut samples).unwrap();
        assert_eq!(samples, SCENARIO_SAMPLES);
    }

    #[test]
    fn test_round_trip_boundaries() {
        let sequences: [[Sample; MAX_RECORDS]; 4] = [
            [0; MAX_RECORDS],
            [i16::MIN; MAX_RECORDS],
            [i16::MAX; MAX_RECORDS],
            std::array::from_fn(|i| if i % 2 == 0 { i16::MIN } else { i16::MAX }),
        ];
        for samples in sequences {
            let record = Record::<MAX_RECORDS>::new(samples);
            let decoded = Record::<MAX_RECORDS>::decode(record.encode().as_bytes()).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_round_trip_value_sweep() {
        // Stride through the whole i16 range, MAX_RECORDS values at a time
        let values: Vec<Sample> = (i16::MIN..=i16::MAX).step_by(97).collect();
        for chunk in values.chunks_exact(MAX_RECORDS) {
            let mut samples = [0; MAX_RECORDS];
            samples.copy_from_slice(chunk);
            let record = Record::<MAX_RECORDS>::new(samples);
            assert_eq!(
                Record::<MAX_RECORDS>::decode(record.encode().as_bytes()).unwrap(),
                record
            );
        }
    }

    #[test]
    fn test_encoded_len_is_exact() {
        assert_eq!(Record::<MAX_RECORDS>::ENCODED_LEN, 2 * MAX_RECORDS);
        assert_eq!(
            Record::<MAX_RECORDS>::default().encode().as_bytes().len(),
            2 * MAX_RECORDS
        );
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = Record::<4>::decode(&SCENARIO_BYTES[..6]).unwrap_err();
        assert!(matches!(
            err,
            FlashDaqError::LengthMismatch {
                expected: 8,
                actual: 6
            }
        ));

        let mut too_long = SCENARIO_BYTES.to_vec();
        too_long.push(0);
        assert!(Record::<4>::decode(&too_long).is_err());
    }

    #[test]
    fn test_encode_rejects_wrong_buffers() {
        let mut short = [0u8; 6];
        assert!(encode_into(&SCENARIO_SAMPLES, 4, &mut short).is_err());

        let mut out = [0u8; 8];
        assert!(encode_into(&SCENARIO_SAMPLES[..3], 4, &mut out).is_err());

        let mut samples = [0; 3];
        assert!(decode_into(&SCENARIO_BYTES, 4, &mut samples).is_err());
    }

    #[test]
    fn test_set_slot() {
        let mut record = Record::<4>::default();
        assert!(record.set(2, -7));
        assert!(!record.set(4, 1));
        assert_eq!(record.samples(), &[0, 0, -7, 0]);
    }
}
