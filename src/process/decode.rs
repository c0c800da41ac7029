//! Frame decoding to PCM samples.
//!
//! Converts one synchronized frame into a [`PcmFrame`]. The [`Decoder`]
//! carries every piece of state that crosses frame boundaries: the Layer
//! III bit reservoir, the IMDCT overlap buffers and the polyphase filter
//! history. Frames of one session must therefore be decoded strictly in
//! stream order.

use std::collections::VecDeque;

use log::trace;

use crate::process::layer3;
use crate::process::{MAX_CHANNELS, MAX_FRAME_SAMPLES, SUBBANDS};
use crate::structs::allocation::{Layer1Allocation, Layer2Allocation, stereo_bound};
use crate::structs::header::{FrameHeader, Layer};
use crate::structs::side_info::SideInfo;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::crc::{CRC_PROTECTION_ALG, Crc16};
use crate::utils::errors::DecodeError;
use crate::utils::synthesis::{SynthState, synthesis_filter};
use crate::utils::tables;

/// Maximum backward reach of `main_data_begin` (a 9-bit byte offset).
const RESERVOIR_MAX: usize = 511;

/// Decoded PCM audio for one frame.
///
/// Samples are planar `f32`, `samples[channel][index]`, nominally within
/// [-1.0, 1.0]; `sample_count` gives the valid prefix length per channel.
#[derive(Debug, Clone)]
pub struct PcmFrame {
    pub sample_rate: u32,
    pub channel_count: usize,
    pub sample_count: usize,
    pub samples: [[f32; MAX_FRAME_SAMPLES]; MAX_CHANNELS],
}

impl PcmFrame {
    fn silent(header: &FrameHeader) -> Self {
        Self {
            sample_rate: header.sample_rate,
            channel_count: header.channels(),
            sample_count: header.samples_per_frame(),
            samples: [[0.0; MAX_FRAME_SAMPLES]; MAX_CHANNELS],
        }
    }

    /// Valid samples of one channel.
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.samples[channel][..self.sample_count]
    }

    /// Interleaved 16-bit PCM with saturation.
    pub fn interleaved_i16(&self) -> Vec<i16> {
        let mut out = Vec::with_capacity(self.sample_count * self.channel_count);
        for i in 0..self.sample_count {
            for ch in 0..self.channel_count {
                out.push(to_i16(self.samples[ch][i]));
            }
        }

        out
    }
}

/// Converts one sample to 16-bit PCM, saturating outside [-1.0, 1.0].
pub fn to_i16(sample: f32) -> i16 {
    let scaled = sample * 32768.0;
    if scaled >= i16::MAX as f32 {
        i16::MAX
    } else if scaled <= i16::MIN as f32 {
        i16::MIN
    } else {
        scaled as i16
    }
}

/// The result of decoding one frame.
#[derive(Debug)]
pub struct Decoded {
    pub pcm: PcmFrame,
    /// CRC mismatch detected but tolerated (lenient mode). The caller
    /// decides whether a mismatched frame is acceptable.
    pub crc_error: Option<DecodeError>,
}

/// Decodes frames to PCM, carrying all cross-frame state.
pub struct Decoder {
    fail_level: log::Level,
    strict_crc: bool,
    crc: Crc16,
    reservoir: VecDeque<u8>,
    overlap: [[[f32; 18]; SUBBANDS]; MAX_CHANNELS],
    synth: [SynthState; MAX_CHANNELS],
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            strict_crc: false,
            crc: Crc16::new(&CRC_PROTECTION_ALG),
            reservoir: VecDeque::with_capacity(RESERVOIR_MAX + MAX_FRAME_SAMPLES),
            overlap: [[[0.0; 18]; SUBBANDS]; MAX_CHANNELS],
            synth: [SynthState::default(), SynthState::default()],
        }
    }
}

impl Decoder {
    /// Sets the failure level for validation errors.
    ///
    /// - `log::Level::Error`: Only fail on Error level messages (default)
    /// - `log::Level::Warn`: Fail on Warning level and above (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    /// Escalates CRC mismatches to decode failures.
    pub fn set_strict_crc(&mut self, strict: bool) {
        self.strict_crc = strict;
    }

    /// Drops all cross-frame state (reservoir, overlap, filter history).
    pub fn reset(&mut self) {
        self.reservoir.clear();
        self.overlap = [[[0.0; 18]; SUBBANDS]; MAX_CHANNELS];
        for synth in &mut self.synth {
            synth.reset();
        }
    }

    /// Decodes one frame span (header included) to PCM.
    ///
    /// `frame` must be exactly `header.frame_len` bytes as delimited by the
    /// synchronizer.
    pub fn decode(&mut self, header: &FrameHeader, frame: &[u8]) -> Result<Decoded, DecodeError> {
        let crc_error = self.check_crc(header, frame)?;

        let mut pcm = PcmFrame::silent(header);
        match header.layer {
            Layer::I => self.decode_layer1(header, frame, &mut pcm)?,
            Layer::II => self.decode_layer2(header, frame, &mut pcm)?,
            Layer::III => self.decode_layer3(header, frame, &mut pcm)?,
        }

        Ok(Decoded { pcm, crc_error })
    }

    /// Verifies the protection word when present. Returns the mismatch as
    /// data in lenient mode, as a failure in strict mode.
    fn check_crc(
        &self,
        header: &FrameHeader,
        frame: &[u8],
    ) -> Result<Option<DecodeError>, DecodeError> {
        if !header.has_crc {
            return Ok(None);
        }
        if frame.len() < 6 {
            return Err(DecodeError::PayloadTruncated {
                section: "protection word",
            });
        }

        let read = u16::from_be_bytes([frame[4], frame[5]]);
        let channels = header.channels();

        let protected_bits = match header.layer {
            Layer::III => header.side_info_len * 8,
            Layer::I => {
                let bound = stereo_bound(header, SUBBANDS);
                if channels == 2 {
                    4 * (bound * 2 + (SUBBANDS - bound))
                } else {
                    4 * SUBBANDS
                }
            }
            Layer::II => {
                let table = tables::layer2_table(
                    header.is_lsf(),
                    header.sample_rate,
                    header.bitrate / 1000 / channels as u32,
                );
                let bound = stereo_bound(header, table.sblimit);
                (0..table.sblimit)
                    .map(|sb| {
                        let nbal = table.nbal(sb) as usize;
                        if sb < bound { nbal * channels } else { nbal }
                    })
                    .sum()
            }
        };

        let payload = &frame[6..];
        let full_bytes = protected_bits / 8;
        let rem_bits = protected_bits % 8;
        if payload.len() < full_bytes + (rem_bits > 0) as usize {
            return Err(DecodeError::PayloadTruncated {
                section: "protected region",
            });
        }

        let mut calculated = self.crc.update(self.crc.init, &frame[2..4]);
        calculated = self.crc.update(calculated, &payload[..full_bytes]);
        if rem_bits > 0 {
            let tail = (payload[full_bytes] >> (8 - rem_bits)) as u16;
            calculated = self.crc.update_bits(calculated, tail, rem_bits);
        }

        if calculated == read {
            return Ok(None);
        }

        let mismatch = DecodeError::CrcMismatch { calculated, read };
        if self.strict_crc {
            return Err(mismatch);
        }

        trace!("Tolerating {mismatch}");
        Ok(Some(mismatch))
    }

    fn decode_layer1(
        &mut self,
        header: &FrameHeader,
        frame: &[u8],
        pcm: &mut PcmFrame,
    ) -> Result<(), DecodeError> {
        let mut reader = BsIoSliceReader::from_slice(&frame[header.payload_offset()..]);
        let alloc = Layer1Allocation::read(header, &mut reader)?;
        let channels = header.channels();
        let sf = tables::scalefactor_table();

        for group in 0..12 {
            let mut subband = [[0.0f32; SUBBANDS]; MAX_CHANNELS];

            for sb in 0..SUBBANDS {
                if sb >= alloc.bound && channels == 2 {
                    let bits = alloc.bits[0][sb];
                    if bits == 0 {
                        continue;
                    }
                    let raw: u32 = reader.get_n(bits)?;
                    let value = requantize_layer1(raw, bits);
                    subband[0][sb] = value * sf[alloc.scalefactor[0][sb] as usize];
                    subband[1][sb] = value * sf[alloc.scalefactor[1][sb] as usize];
                } else {
                    for ch in 0..channels {
                        let bits = alloc.bits[ch][sb];
                        if bits == 0 {
                            continue;
                        }
                        let raw: u32 = reader.get_n(bits)?;
                        subband[ch][sb] =
                            requantize_layer1(raw, bits) * sf[alloc.scalefactor[ch][sb] as usize];
                    }
                }
            }

            for ch in 0..channels {
                let mut out = [0.0f32; SUBBANDS];
                synthesis_filter(&mut self.synth[ch], &subband[ch], &mut out);
                pcm.samples[ch][group * SUBBANDS..(group + 1) * SUBBANDS].copy_from_slice(&out);
            }
        }

        Ok(())
    }

    fn decode_layer2(
        &mut self,
        header: &FrameHeader,
        frame: &[u8],
        pcm: &mut PcmFrame,
    ) -> Result<(), DecodeError> {
        let mut reader = BsIoSliceReader::from_slice(&frame[header.payload_offset()..]);
        let alloc = Layer2Allocation::read(header, &mut reader)?;
        let channels = header.channels();
        let sf = tables::scalefactor_table();

        for granule in 0..12 {
            // Scale factors switch at each third of the frame.
            let part = granule / 4;
            let mut triplet = [[[0.0f32; SUBBANDS]; 3]; MAX_CHANNELS];

            for sb in 0..alloc.table.sblimit {
                if sb >= alloc.bound && channels == 2 {
                    let Some(class) = alloc.class[0][sb] else {
                        continue;
                    };
                    let samples = read_triplet(&mut reader, class)?;
                    for (slot, &value) in samples.iter().enumerate() {
                        triplet[0][slot][sb] =
                            value * sf[alloc.scalefactor[0][sb][part] as usize];
                        triplet[1][slot][sb] =
                            value * sf[alloc.scalefactor[1][sb][part] as usize];
                    }
                } else {
                    for ch in 0..channels {
                        let Some(class) = alloc.class[ch][sb] else {
                            continue;
                        };
                        let samples = read_triplet(&mut reader, class)?;
                        for (slot, &value) in samples.iter().enumerate() {
                            triplet[ch][slot][sb] =
                                value * sf[alloc.scalefactor[ch][sb][part] as usize];
                        }
                    }
                }
            }

            for slot in 0..3 {
                for ch in 0..channels {
                    let mut out = [0.0f32; SUBBANDS];
                    synthesis_filter(&mut self.synth[ch], &triplet[ch][slot], &mut out);
                    let base = (granule * 3 + slot) * SUBBANDS;
                    pcm.samples[ch][base..base + SUBBANDS].copy_from_slice(&out);
                }
            }
        }

        Ok(())
    }

    fn decode_layer3(
        &mut self,
        header: &FrameHeader,
        frame: &[u8],
        pcm: &mut PcmFrame,
    ) -> Result<(), DecodeError> {
        let side_start = header.payload_offset();
        let side_end = side_start + header.side_info_len;
        if frame.len() < side_end {
            return Err(DecodeError::PayloadTruncated {
                section: "side information",
            });
        }

        let mut reader = BsIoSliceReader::from_slice(&frame[side_start..side_end]);
        let side_info = SideInfo::read(header, &mut reader)?;
        let main_data = &frame[side_end..];

        let begin = side_info.main_data_begin as usize;
        let available = self.reservoir.len();
        if begin > available {
            // Keep the new main data: later frames may still reach back
            // into it once the reservoir refills.
            self.extend_reservoir(main_data);
            return Err(DecodeError::ReservoirExhausted {
                needed: begin,
                available,
            });
        }

        let mut assembled = Vec::with_capacity(begin + main_data.len());
        assembled.extend(self.reservoir.iter().skip(available - begin).copied());
        assembled.extend_from_slice(main_data);
        self.extend_reservoir(main_data);

        layer3::decode_frame(
            header,
            &side_info,
            &assembled,
            self.fail_level,
            &mut self.overlap,
            &mut self.synth,
            pcm,
        )
    }

    fn extend_reservoir(&mut self, main_data: &[u8]) {
        self.reservoir.extend(main_data);
        if self.reservoir.len() > RESERVOIR_MAX {
            self.reservoir.drain(..self.reservoir.len() - RESERVOIR_MAX);
        }
    }
}

fn requantize_layer1(raw: u32, bits: u32) -> f32 {
    let half = (1u32 << (bits - 1)) as f32;
    let fraction = raw as f32 / half - 1.0;
    let scale = (1u64 << bits) as f32 / ((1u64 << bits) - 1) as f32;

    (fraction + 2.0f32.powi(1 - bits as i32)) * scale
}

fn read_triplet(
    reader: &mut BsIoSliceReader<'_>,
    class_index: usize,
) -> Result<[f32; 3], DecodeError> {
    let class = tables::QUANT_CLASSES[class_index];
    let mut out = [0.0f32; 3];

    if class.grouped {
        let mut code: u32 = reader.get_n(class.bits)?;
        for value in &mut out {
            *value = dequant_layer2(code % class.levels, class.levels);
            code /= class.levels;
        }
    } else {
        for value in &mut out {
            let raw: u32 = reader.get_n(class.bits)?;
            *value = dequant_layer2(raw, class.levels);
        }
    }

    Ok(out)
}

fn dequant_layer2(raw: u32, levels: u32) -> f32 {
    ((2 * raw + 1) as f32 - levels as f32) / (levels as f32 + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::header::build_header;

    fn frame_with_header(word: u32) -> (FrameHeader, Vec<u8>) {
        let header = FrameHeader::parse(word).unwrap();
        let mut frame = word.to_be_bytes().to_vec();
        frame.resize(header.frame_len, 0);
        (header, frame)
    }

    #[test]
    fn layer1_silence_decodes_to_silence() {
        let (header, frame) = frame_with_header(build_header(3, 3, 1, 1, 2, 0, 3));
        let mut decoder = Decoder::default();

        let decoded = decoder.decode(&header, &frame).unwrap();

        assert_eq!(decoded.pcm.sample_count, 384);
        assert_eq!(decoded.pcm.channel_count, 1);
        assert!(decoded.pcm.channel(0).iter().all(|&s| s == 0.0));
        assert!(decoded.crc_error.is_none());
    }

    #[test]
    fn layer1_allocated_subband_produces_signal() {
        let (header, mut frame) = frame_with_header(build_header(3, 3, 1, 1, 2, 0, 3));
        // Subband 0: allocation code 1 (2-bit samples), scale factor 0,
        // then twelve 2-bit samples of value 0 (maximally negative).
        frame[4] = 0x10;

        let mut decoder = Decoder::default();
        let decoded = decoder.decode(&header, &frame).unwrap();

        assert!(decoded.pcm.channel(0).iter().any(|&s| s != 0.0));
    }

    #[test]
    fn layer2_silence_decodes_to_silence() {
        let (header, frame) = frame_with_header(build_header(3, 2, 1, 2, 2, 0, 3));
        let mut decoder = Decoder::default();

        let decoded = decoder.decode(&header, &frame).unwrap();

        assert_eq!(decoded.pcm.sample_count, 1152);
        assert!(decoded.pcm.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn layer3_reservoir_carry_over_is_order_dependent() {
        let word = build_header(3, 1, 1, 9, 0, 0, 3);
        let (header, first) = frame_with_header(word);
        let (_, mut second) = frame_with_header(word);
        // Second frame borrows 64 bytes from the previous frame's tail.
        second[4] = 64 >> 1;

        let mut decoder = Decoder::default();
        decoder.decode(&header, &first).unwrap();
        decoder.decode(&header, &second).unwrap();

        // Without the first frame's carry-over the same frame is invalid.
        let mut fresh = Decoder::default();
        assert!(matches!(
            fresh.decode(&header, &second),
            Err(DecodeError::ReservoirExhausted {
                needed: 64,
                available: 0
            })
        ));
    }

    #[test]
    fn reservoir_is_bounded() {
        let word = build_header(3, 1, 1, 9, 0, 0, 3);
        let (header, frame) = frame_with_header(word);

        let mut decoder = Decoder::default();
        for _ in 0..4 {
            decoder.decode(&header, &frame).unwrap();
        }

        assert!(decoder.reservoir.len() <= RESERVOIR_MAX);
        // A frame reaching back the full 9-bit range still decodes.
        let (_, mut deep) = frame_with_header(word);
        deep[4] = 0xFF;
        deep[5] = 0x80;
        decoder.decode(&header, &deep).unwrap();
    }

    #[test]
    fn crc_mismatch_is_tolerated_then_escalated() {
        // Layer I mono with protection bit set; the stored CRC is wrong.
        let word = build_header(3, 3, 0, 1, 2, 0, 3);
        let (header, mut frame) = frame_with_header(word);
        assert!(header.has_crc);
        frame[4] = 0xDE;
        frame[5] = 0xAD;

        let mut decoder = Decoder::default();
        let decoded = decoder.decode(&header, &frame).unwrap();
        assert!(matches!(
            decoded.crc_error,
            Some(DecodeError::CrcMismatch { .. })
        ));

        decoder.set_strict_crc(true);
        assert!(matches!(
            decoder.decode(&header, &frame),
            Err(DecodeError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn crc_round_trip() {
        let word = build_header(3, 3, 0, 1, 2, 0, 3);
        let (header, mut frame) = frame_with_header(word);

        // Stamp the correct checksum over the protected region.
        let crc = Crc16::new(&CRC_PROTECTION_ALG);
        let mut value = crc.update(crc.init, &frame[2..4]);
        value = crc.update(value, &frame[6..6 + 16]);
        frame[4..6].copy_from_slice(&value.to_be_bytes());

        let mut decoder = Decoder::default();
        decoder.set_strict_crc(true);
        let decoded = decoder.decode(&header, &frame).unwrap();
        assert!(decoded.crc_error.is_none());
    }

    #[test]
    fn saturating_i16_conversion() {
        assert_eq!(to_i16(0.0), 0);
        assert_eq!(to_i16(1.5), i16::MAX);
        assert_eq!(to_i16(-1.5), i16::MIN);
        assert_eq!(to_i16(0.5), 16384);
    }
}
