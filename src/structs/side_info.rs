//! Layer III side information.
//!
//! The side information block sits between the (optional) CRC word and the
//! main data. It locates the main data start inside the bit reservoir and
//! describes every granule: Huffman partitioning, gains and block shape.

use crate::structs::header::FrameHeader;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecodeError;

/// Per-granule, per-channel decoding parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Granule {
    pub part2_3_length: u32,
    pub big_values: u32,
    pub global_gain: u32,
    pub scalefac_compress: u32,
    pub window_switching: bool,

    pub block_type: u8,
    pub mixed_block: bool,
    pub table_select: [u8; 3],
    pub subblock_gain: [u32; 3],

    pub region0_count: u32,
    pub region1_count: u32,

    pub preflag: bool,
    pub scalefac_scale: bool,
    pub count1table_select: bool,
}

impl Granule {
    pub fn short_blocks(&self) -> bool {
        self.window_switching && self.block_type == 2
    }
}

/// Side information for one frame.
#[derive(Debug, Clone, Default)]
pub struct SideInfo {
    /// Backward offset of this frame's main data into the bit reservoir.
    pub main_data_begin: u32,
    pub scfsi: [[bool; 4]; 2],
    /// Indexed `[granule][channel]`; LSF frames use a single granule.
    pub granules: [[Granule; 2]; 2],
}

impl SideInfo {
    pub fn read(header: &FrameHeader, reader: &mut BsIoSliceReader<'_>) -> Result<Self, DecodeError> {
        let channels = header.channels();
        let lsf = header.is_lsf();

        let mut si = Self {
            main_data_begin: reader.get_n(if lsf { 8 } else { 9 })?,
            ..Default::default()
        };

        let private_bits = match (lsf, channels) {
            (false, 1) => 5,
            (false, _) => 3,
            (true, 1) => 1,
            (true, _) => 2,
        };
        reader.skip_n(private_bits)?;

        if !lsf {
            for scfsi in si.scfsi.iter_mut().take(channels) {
                for band in scfsi.iter_mut() {
                    *band = reader.get()?;
                }
            }
        }

        for gr in 0..header.granules() {
            for ch in 0..channels {
                let granule = &mut si.granules[gr][ch];

                granule.part2_3_length = reader.get_n(12)?;
                granule.big_values = reader.get_n(9)?;
                granule.global_gain = reader.get_n(8)?;
                granule.scalefac_compress = reader.get_n(if lsf { 9 } else { 4 })?;
                granule.window_switching = reader.get()?;

                if granule.window_switching {
                    granule.block_type = reader.get_n(2)?;
                    granule.mixed_block = reader.get()?;

                    if granule.block_type == 0 {
                        return Err(DecodeError::ReservedBlockType);
                    }

                    for select in granule.table_select.iter_mut().take(2) {
                        *select = reader.get_n(5)?;
                    }
                    for gain in granule.subblock_gain.iter_mut() {
                        *gain = reader.get_n(3)?;
                    }

                    // Region counts are implicit while window switching is
                    // active; region1 is sized so region2 stays empty.
                    if granule.block_type == 2 && !granule.mixed_block {
                        granule.region0_count = 8;
                    } else {
                        granule.region0_count = 7;
                    }
                    granule.region1_count = 36;
                } else {
                    for select in granule.table_select.iter_mut() {
                        *select = reader.get_n(5)?;
                    }
                    granule.region0_count = reader.get_n(4)?;
                    granule.region1_count = reader.get_n(3)?;
                    granule.block_type = 0;
                }

                if lsf {
                    granule.preflag = granule.scalefac_compress >= 500;
                } else {
                    granule.preflag = reader.get()?;
                }
                granule.scalefac_scale = reader.get()?;
                granule.count1table_select = reader.get()?;
            }
        }

        Ok(si)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::header::FrameHeader;

    fn mono_mpeg1_header() -> FrameHeader {
        FrameHeader::parse(crate::structs::header::build_header(3, 1, 1, 9, 0, 0, 3)).unwrap()
    }

    #[test]
    fn mono_side_info_is_17_bytes() {
        let header = mono_mpeg1_header();
        assert_eq!(header.side_info_len, 17);

        // All-zero side information parses: every field takes its minimum.
        let data = [0u8; 17];
        let mut reader = BsIoSliceReader::from_slice(&data);
        let si = SideInfo::read(&header, &mut reader).unwrap();

        assert_eq!(si.main_data_begin, 0);
        assert_eq!(si.granules[0][0].big_values, 0);
        assert!(!si.granules[0][0].window_switching);
        assert_eq!(reader.position().unwrap(), 17 * 8);
    }

    #[test]
    fn main_data_begin_is_leading_field() {
        let header = mono_mpeg1_header();
        let mut data = [0u8; 17];
        // 9-bit field: 0x1FF << 7 over the first two bytes.
        data[0] = 0xFF;
        data[1] = 0x80;

        let mut reader = BsIoSliceReader::from_slice(&data);
        let si = SideInfo::read(&header, &mut reader).unwrap();

        assert_eq!(si.main_data_begin, 511);
    }
}
