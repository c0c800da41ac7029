//! Layer I and Layer II bit allocation and scale factors.
//!
//! Both layers allocate bits per subband, optionally sharing allocations
//! between channels above the joint stereo bound, then transmit scale
//! factors for every allocated subband. Layer II indirects through the
//! quantization class tables and compresses scale factors with scfsi.

use crate::process::SUBBANDS;
use crate::structs::header::{ChannelMode, FrameHeader};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecodeError;
use crate::utils::tables::{self, Layer2Table};

/// Joint stereo bound: below it allocations are per-channel, above it the
/// channels share sample data.
pub fn stereo_bound(header: &FrameHeader, sblimit: usize) -> usize {
    if header.mode == ChannelMode::JointStereo {
        (((header.mode_extension + 1) * 4) as usize).min(sblimit)
    } else {
        sblimit
    }
}

/// Layer I allocation: a sample word width per subband and channel.
#[derive(Debug)]
pub struct Layer1Allocation {
    pub bound: usize,
    /// Sample bits per subband, 0 meaning no allocation; 2..=15 otherwise.
    pub bits: [[u32; SUBBANDS]; 2],
    pub scalefactor: [[u8; SUBBANDS]; 2],
}

impl Layer1Allocation {
    pub fn read(header: &FrameHeader, reader: &mut BsIoSliceReader<'_>) -> Result<Self, DecodeError> {
        let channels = header.channels();
        let bound = stereo_bound(header, SUBBANDS);

        let mut alloc = Self {
            bound,
            bits: [[0; SUBBANDS]; 2],
            scalefactor: [[0; SUBBANDS]; 2],
        };

        for sb in 0..SUBBANDS {
            let shared = sb >= bound;
            for ch in 0..if shared { 1 } else { channels } {
                let code: u32 = reader.get_n(4)?;
                if code == 15 {
                    return Err(DecodeError::InvalidAllocation {
                        subband: sb,
                        allocation: 15,
                    });
                }

                let bits = if code == 0 { 0 } else { code + 1 };
                alloc.bits[ch][sb] = bits;
                if shared {
                    alloc.bits[1][sb] = bits;
                }
            }
        }

        for sb in 0..SUBBANDS {
            for ch in 0..channels {
                if alloc.bits[ch][sb] != 0 {
                    let sf: u8 = reader.get_n(6)?;
                    if sf == 63 {
                        return Err(DecodeError::InvalidScaleFactor(sf));
                    }
                    alloc.scalefactor[ch][sb] = sf;
                }
            }
        }

        Ok(alloc)
    }
}

/// Layer II allocation: quantization class per subband and channel plus
/// three scale factors per part.
#[derive(Debug)]
pub struct Layer2Allocation {
    pub table: &'static Layer2Table,
    pub bound: usize,
    /// Index into [`tables::QUANT_CLASSES`], or `None` for silence.
    pub class: [[Option<usize>; SUBBANDS]; 2],
    /// Scale factor per frame third.
    pub scalefactor: [[[u8; 3]; SUBBANDS]; 2],
}

impl Layer2Allocation {
    pub fn read(header: &FrameHeader, reader: &mut BsIoSliceReader<'_>) -> Result<Self, DecodeError> {
        let channels = header.channels();
        let table = tables::layer2_table(
            header.is_lsf(),
            header.sample_rate,
            header.bitrate / 1000 / channels as u32,
        );
        let bound = stereo_bound(header, table.sblimit);

        let mut alloc = Self {
            table,
            bound,
            class: [[None; SUBBANDS]; 2],
            scalefactor: [[[0; 3]; SUBBANDS]; 2],
        };

        for sb in 0..table.sblimit {
            let shared = sb >= bound;
            for ch in 0..if shared { 1 } else { channels } {
                let code: u32 = reader.get_n(table.nbal(sb))?;
                let class = if code == 0 {
                    None
                } else {
                    Some(table.rows[sb][code as usize - 1])
                };

                alloc.class[ch][sb] = class;
                if shared {
                    alloc.class[1][sb] = class;
                }
            }
        }

        let mut scfsi = [[0u8; SUBBANDS]; 2];
        for sb in 0..table.sblimit {
            for ch in 0..channels {
                if alloc.class[ch][sb].is_some() {
                    scfsi[ch][sb] = reader.get_n(2)?;
                }
            }
        }

        for sb in 0..table.sblimit {
            for ch in 0..channels {
                if alloc.class[ch][sb].is_none() {
                    continue;
                }

                let read_sf = |reader: &mut BsIoSliceReader<'_>| -> Result<u8, DecodeError> {
                    let sf: u8 = reader.get_n(6)?;
                    if sf == 63 {
                        return Err(DecodeError::InvalidScaleFactor(sf));
                    }
                    Ok(sf)
                };

                let sf = &mut alloc.scalefactor[ch][sb];
                match scfsi[ch][sb] {
                    0 => {
                        sf[0] = read_sf(reader)?;
                        sf[1] = read_sf(reader)?;
                        sf[2] = read_sf(reader)?;
                    }
                    1 => {
                        sf[0] = read_sf(reader)?;
                        sf[1] = sf[0];
                        sf[2] = read_sf(reader)?;
                    }
                    2 => {
                        sf[0] = read_sf(reader)?;
                        sf[1] = sf[0];
                        sf[2] = sf[0];
                    }
                    _ => {
                        sf[0] = read_sf(reader)?;
                        sf[1] = read_sf(reader)?;
                        sf[2] = sf[1];
                    }
                }
            }
        }

        Ok(alloc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::header::build_header;

    #[test]
    fn layer1_zero_allocation_reads_only_allocation_bits() {
        // MPEG-1 Layer I mono: 32 subbands * 4 bits = 16 bytes of allocation.
        let header = FrameHeader::parse(build_header(3, 3, 1, 1, 2, 0, 3)).unwrap();
        let data = [0u8; 20];
        let mut reader = BsIoSliceReader::from_slice(&data);

        let alloc = Layer1Allocation::read(&header, &mut reader).unwrap();

        assert_eq!(reader.position().unwrap(), 32 * 4);
        assert!(alloc.bits.iter().flatten().all(|&b| b == 0));
    }

    #[test]
    fn layer1_allocation_code_maps_to_bits() {
        let header = FrameHeader::parse(build_header(3, 3, 1, 1, 2, 0, 3)).unwrap();
        // First subband: code 1 (2-bit samples); scale factor 5 afterwards.
        let mut data = [0u8; 24];
        data[0] = 0x10;
        data[16] = 5 << 2;

        let mut reader = BsIoSliceReader::from_slice(&data);
        let alloc = Layer1Allocation::read(&header, &mut reader).unwrap();

        assert_eq!(alloc.bits[0][0], 2);
        assert_eq!(alloc.scalefactor[0][0], 5);
    }

    #[test]
    fn layer1_forbidden_allocation_code() {
        let header = FrameHeader::parse(build_header(3, 3, 1, 1, 2, 0, 3)).unwrap();
        let mut data = [0u8; 20];
        data[0] = 0xF0;

        let mut reader = BsIoSliceReader::from_slice(&data);
        assert!(Layer1Allocation::read(&header, &mut reader).is_err());
    }

    #[test]
    fn layer2_scfsi_sharing() {
        // MPEG-1 Layer II mono, 48 kbps, 32 kHz: table D (12 subbands).
        let header = FrameHeader::parse(build_header(3, 2, 1, 2, 2, 0, 3)).unwrap();
        let table = tables::layer2_table(false, 32000, 48);
        assert_eq!(table.sblimit, 12);

        // Subband 0 allocated (code 1), scfsi 2, one scale factor of 12.
        let mut bits = Vec::new();
        bits.extend_from_slice(&[1, 0, 0, 0]); // alloc sb0 = 1
        bits.extend(std::iter::repeat_n(0, 4 * 11)); // remaining subbands silent
        bits.extend_from_slice(&[1, 0]); // scfsi = 2
        bits.extend_from_slice(&[0, 0, 1, 1, 0, 0]); // scale factor 12

        let mut data = vec![0u8; 16];
        for (i, &bit) in bits.iter().enumerate() {
            data[i / 8] |= bit << (7 - i % 8);
        }

        let mut reader = BsIoSliceReader::from_slice(&data);
        let alloc = Layer2Allocation::read(&header, &mut reader).unwrap();

        assert_eq!(alloc.class[0][0], Some(0));
        assert_eq!(alloc.scalefactor[0][0], [12, 12, 12]);
        assert_eq!(tables::QUANT_CLASSES[alloc.class[0][0].unwrap()].levels, 3);
    }
}
