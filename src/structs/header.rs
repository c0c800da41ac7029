//! Frame headers and format information.
//!
//! ## Sync Pattern
//!
//! Every frame starts with eleven set bits followed by the 21 header field
//! bits. A candidate header is only valid once every field passes the
//! reserved-value checks; the derived frame length then delimits the frame.
//!
//! ## Frame Sizes
//!
//! Layer I carries 384 samples per frame, Layer II 1152, Layer III 1152
//! (MPEG-1) or 576 (MPEG-2/2.5).

use crate::utils::errors::HeaderError;

/// Leading byte of the sync pattern.
pub const SYNC_BYTE: u8 = 0xFF;

/// Mask of the sync bits in the second header byte.
pub const SYNC_SECOND_MASK: u8 = 0xE0;

/// MPEG version ID from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

/// Layer from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    I,
    II,
    III,
}

/// Channel mode from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    SingleChannel,
}

/// Parsed metadata for one frame.
///
/// Produced exclusively by a successful synchronization match; an instance
/// always satisfies the reserved-field checks and carries its derived sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    pub version: Version,
    pub layer: Layer,
    /// Frame payload is CRC-protected (protection bit is zero).
    pub has_crc: bool,
    /// Bitrate in bits per second.
    pub bitrate: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub private: bool,
    pub mode: ChannelMode,
    pub mode_extension: u8,
    pub copyright: bool,
    pub original: bool,
    pub emphasis: u8,

    /// Total frame length in bytes, header included.
    pub frame_len: usize,
    /// Layer III side information length in bytes.
    pub side_info_len: usize,
}

impl FrameHeader {
    /// Parses and validates a 32-bit candidate header.
    pub fn parse(header: u32) -> Result<Self, HeaderError> {
        let version = match (header >> 19) & 0x3 {
            3 => Version::Mpeg1,
            2 => Version::Mpeg2,
            0 => Version::Mpeg25,
            _ => return Err(HeaderError::ReservedVersion),
        };

        let layer = match (header >> 17) & 0x3 {
            3 => Layer::I,
            2 => Layer::II,
            1 => Layer::III,
            _ => return Err(HeaderError::ReservedLayer),
        };

        let has_crc = (header >> 16) & 0x1 == 0;

        let bitrate_index = ((header >> 12) & 0xF) as usize;
        match bitrate_index {
            0 => return Err(HeaderError::FreeFormatBitrate),
            15 => return Err(HeaderError::ReservedBitrate),
            _ => {}
        }

        let samplerate_index = ((header >> 10) & 0x3) as usize;
        if samplerate_index == 3 {
            return Err(HeaderError::ReservedSamplingFrequency);
        }

        let padding = (header >> 9) & 0x1 == 1;
        let private = (header >> 8) & 0x1 == 1;

        let mode = match (header >> 6) & 0x3 {
            0 => ChannelMode::Stereo,
            1 => ChannelMode::JointStereo,
            2 => ChannelMode::DualChannel,
            _ => ChannelMode::SingleChannel,
        };

        let bitrate_kbps = lookup_bitrate(version, layer, bitrate_index);
        let sample_rate = lookup_samplerate(version, samplerate_index);

        // Layer II restricts which bitrates may appear outside mono and
        // which only in mono.
        if version == Version::Mpeg1 && layer == Layer::II {
            let mono = mode == ChannelMode::SingleChannel;
            if matches!(bitrate_kbps, 32 | 48 | 56 | 80) && !mono {
                return Err(HeaderError::ForbiddenLayer2Mode {
                    bitrate_kbps,
                    mode: "non-mono",
                });
            }
            if matches!(bitrate_kbps, 224 | 256 | 320 | 384) && mono {
                return Err(HeaderError::ForbiddenLayer2Mode {
                    bitrate_kbps,
                    mode: "mono",
                });
            }
        }

        let bitrate = bitrate_kbps * 1000;
        let pad = padding as u32;

        let frame_len = match layer {
            Layer::I => ((12 * bitrate / sample_rate + pad) * 4) as usize,
            Layer::II => (144 * bitrate / sample_rate + pad) as usize,
            Layer::III => {
                if version == Version::Mpeg1 {
                    (144 * bitrate / sample_rate + pad) as usize
                } else {
                    (72 * bitrate / sample_rate + pad) as usize
                }
            }
        };

        let side_info_len = match (layer, version, mode) {
            (Layer::III, Version::Mpeg1, ChannelMode::SingleChannel) => 17,
            (Layer::III, Version::Mpeg1, _) => 32,
            (Layer::III, _, ChannelMode::SingleChannel) => 9,
            (Layer::III, _, _) => 17,
            _ => 0,
        };

        Ok(Self {
            version,
            layer,
            has_crc,
            bitrate,
            sample_rate,
            padding,
            private,
            mode,
            mode_extension: ((header >> 4) & 0x3) as u8,
            copyright: (header >> 3) & 0x1 == 1,
            original: (header >> 2) & 0x1 == 1,
            emphasis: (header & 0x3) as u8,
            frame_len,
            side_info_len,
        })
    }

    /// Low sampling frequency extension (MPEG-2 or MPEG-2.5).
    pub fn is_lsf(&self) -> bool {
        self.version != Version::Mpeg1
    }

    pub fn channels(&self) -> usize {
        if self.mode == ChannelMode::SingleChannel { 1 } else { 2 }
    }

    /// PCM samples carried by one frame, per channel.
    pub fn samples_per_frame(&self) -> usize {
        match self.layer {
            Layer::I => 384,
            Layer::II => 1152,
            Layer::III => {
                if self.is_lsf() { 576 } else { 1152 }
            }
        }
    }

    /// Layer III granules per frame.
    pub fn granules(&self) -> usize {
        if self.is_lsf() { 1 } else { 2 }
    }

    /// Byte offset of the payload: header, then the optional CRC word.
    pub fn payload_offset(&self) -> usize {
        if self.has_crc { 6 } else { 4 }
    }
}

fn lookup_bitrate(version: Version, layer: Layer, index: usize) -> u32 {
    const V1_L1: [u32; 16] = [
        0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0,
    ];
    const V1_L2: [u32; 16] = [
        0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0,
    ];
    const V1_L3: [u32; 16] = [
        0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
    ];
    const V2_L1: [u32; 16] = [
        0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0,
    ];
    const V2_L23: [u32; 16] = [
        0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
    ];

    match (version, layer) {
        (Version::Mpeg1, Layer::I) => V1_L1[index],
        (Version::Mpeg1, Layer::II) => V1_L2[index],
        (Version::Mpeg1, Layer::III) => V1_L3[index],
        (_, Layer::I) => V2_L1[index],
        (_, _) => V2_L23[index],
    }
}

fn lookup_samplerate(version: Version, index: usize) -> u32 {
    match version {
        Version::Mpeg1 => [44100, 48000, 32000][index],
        Version::Mpeg2 => [22050, 24000, 16000][index],
        Version::Mpeg25 => [11025, 12000, 8000][index],
    }
}

/// Builds the 32-bit header value for the given fields; the inverse of
/// [`FrameHeader::parse`] for the subset of fields tests need.
#[cfg(test)]
pub fn build_header(
    version: u32,
    layer: u32,
    no_crc: u32,
    bitrate_index: u32,
    samplerate_index: u32,
    padding: u32,
    mode: u32,
) -> u32 {
    0xFFE0_0000
        | (version << 19)
        | (layer << 17)
        | (no_crc << 16)
        | (bitrate_index << 12)
        | (samplerate_index << 10)
        | (padding << 9)
        | (mode << 6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_typical_layer3_header() {
        // MPEG-1 Layer III, 128 kbps, 44.1 kHz, stereo, no CRC, no padding.
        let header = FrameHeader::parse(0xFFFB_9000).unwrap();

        assert_eq!(header.version, Version::Mpeg1);
        assert_eq!(header.layer, Layer::III);
        assert!(!header.has_crc);
        assert_eq!(header.bitrate, 128_000);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.mode, ChannelMode::Stereo);
        assert_eq!(header.frame_len, 417);
        assert_eq!(header.side_info_len, 32);
        assert_eq!(header.samples_per_frame(), 1152);
    }

    #[test]
    fn padding_adds_one_byte() {
        let unpadded = FrameHeader::parse(build_header(3, 1, 1, 9, 0, 0, 0)).unwrap();
        let padded = FrameHeader::parse(build_header(3, 1, 1, 9, 0, 1, 0)).unwrap();

        assert_eq!(unpadded.frame_len + 1, padded.frame_len);
    }

    #[test]
    fn layer1_frame_len_is_word_aligned() {
        // MPEG-1 Layer I, 32 kHz: 12 * bitrate / rate slots of 4 bytes.
        let header = FrameHeader::parse(build_header(3, 3, 1, 1, 2, 0, 3)).unwrap();

        assert_eq!(header.layer, Layer::I);
        assert_eq!(header.bitrate, 32_000);
        assert_eq!(header.frame_len, 48);
        assert_eq!(header.samples_per_frame(), 384);
    }

    #[test]
    fn reserved_fields_are_rejected() {
        assert_eq!(
            FrameHeader::parse(build_header(1, 1, 1, 9, 0, 0, 0)),
            Err(HeaderError::ReservedVersion)
        );
        assert_eq!(
            FrameHeader::parse(build_header(3, 0, 1, 9, 0, 0, 0)),
            Err(HeaderError::ReservedLayer)
        );
        assert_eq!(
            FrameHeader::parse(build_header(3, 1, 1, 15, 0, 0, 0)),
            Err(HeaderError::ReservedBitrate)
        );
        assert_eq!(
            FrameHeader::parse(build_header(3, 1, 1, 0, 0, 0, 0)),
            Err(HeaderError::FreeFormatBitrate)
        );
        assert_eq!(
            FrameHeader::parse(build_header(3, 1, 1, 9, 3, 0, 0)),
            Err(HeaderError::ReservedSamplingFrequency)
        );
    }

    #[test]
    fn layer2_mode_restrictions() {
        // 32 kbps Layer II is mono-only; 320 kbps must not be mono.
        assert!(matches!(
            FrameHeader::parse(build_header(3, 2, 1, 1, 0, 0, 0)),
            Err(HeaderError::ForbiddenLayer2Mode { .. })
        ));
        assert!(FrameHeader::parse(build_header(3, 2, 1, 1, 0, 0, 3)).is_ok());
        assert!(matches!(
            FrameHeader::parse(build_header(3, 2, 1, 14, 0, 0, 3)),
            Err(HeaderError::ForbiddenLayer2Mode { .. })
        ));
    }

    #[test]
    fn lsf_layer3_sizes() {
        // MPEG-2 Layer III, 64 kbps, 22.05 kHz, mono.
        let header = FrameHeader::parse(build_header(2, 1, 1, 8, 0, 0, 3)).unwrap();

        assert!(header.is_lsf());
        assert_eq!(header.samples_per_frame(), 576);
        assert_eq!(header.granules(), 1);
        assert_eq!(header.side_info_len, 9);
        assert_eq!(header.frame_len, 72 * 64_000 / 22_050);
    }
}
