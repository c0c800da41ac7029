//! Huffman decoding of Layer III spectral data.
//!
//! Big-values pairs and count1 quadruples are coded with canonical prefix
//! codes. Codebooks are stored as code-length arrays (symbol = linear index)
//! and expanded to decoding tables on first use; the large pair codebooks
//! shared by tables 16-23 and 24-31 are stored in factored per-axis form.

use std::sync::OnceLock;

use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecodeError;

/// Code lengths for the small pair codebooks, row-major over (x, y).
#[rustfmt::skip]
const LENS_T1: [u8; 4] = [1, 3, 2, 3];
#[rustfmt::skip]
const LENS_T2: [u8; 9] = [1, 3, 6, 3, 3, 5, 5, 5, 6];
#[rustfmt::skip]
const LENS_T3: [u8; 9] = [2, 2, 6, 3, 2, 5, 5, 5, 6];
#[rustfmt::skip]
const LENS_T5: [u8; 16] = [1, 3, 6, 7, 3, 3, 6, 7, 6, 6, 7, 8, 7, 6, 7, 8];
#[rustfmt::skip]
const LENS_T6: [u8; 16] = [3, 3, 5, 7, 3, 2, 4, 5, 4, 4, 5, 6, 6, 5, 6, 7];
#[rustfmt::skip]
const LENS_T7: [u8; 36] = [
    1, 3, 6, 8, 8, 9,
    3, 4, 6, 7, 7, 8,
    6, 5, 7, 8, 8, 9,
    7, 7, 8, 9, 9, 9,
    7, 7, 8, 9, 9, 10,
    8, 8, 9, 10, 10, 10,
];
#[rustfmt::skip]
const LENS_T8: [u8; 36] = [
    2, 3, 6, 8, 8, 9,
    3, 2, 4, 8, 8, 8,
    6, 4, 6, 8, 8, 9,
    8, 8, 8, 9, 9, 10,
    8, 7, 8, 9, 10, 10,
    9, 8, 9, 10, 11, 11,
];
#[rustfmt::skip]
const LENS_T9: [u8; 36] = [
    3, 3, 5, 6, 8, 9,
    3, 3, 4, 5, 6, 8,
    4, 4, 5, 6, 7, 8,
    6, 5, 6, 7, 7, 8,
    7, 6, 7, 7, 8, 9,
    8, 7, 8, 8, 9, 9,
];
#[rustfmt::skip]
const LENS_T10: [u8; 64] = [
    1, 3, 6, 8, 9, 9, 9, 10,
    3, 4, 6, 7, 8, 9, 8, 8,
    6, 6, 7, 8, 9, 10, 9, 9,
    7, 7, 8, 9, 10, 10, 9, 10,
    8, 8, 9, 10, 10, 10, 10, 10,
    9, 9, 10, 10, 11, 11, 10, 11,
    8, 8, 9, 10, 10, 10, 11, 11,
    9, 8, 9, 10, 10, 11, 11, 11,
];
#[rustfmt::skip]
const LENS_T11: [u8; 64] = [
    2, 3, 5, 7, 8, 9, 8, 9,
    3, 3, 4, 6, 8, 8, 7, 8,
    5, 5, 6, 7, 8, 9, 8, 8,
    7, 6, 7, 9, 8, 10, 8, 9,
    8, 8, 8, 9, 9, 10, 9, 10,
    8, 8, 9, 10, 10, 11, 10, 11,
    8, 7, 7, 8, 9, 10, 10, 10,
    8, 7, 8, 9, 10, 10, 10, 10,
];
#[rustfmt::skip]
const LENS_T12: [u8; 64] = [
    4, 3, 5, 7, 8, 9, 9, 9,
    3, 3, 4, 5, 7, 7, 8, 8,
    5, 4, 5, 6, 7, 8, 7, 8,
    6, 5, 6, 6, 7, 8, 8, 8,
    7, 6, 7, 7, 8, 8, 8, 9,
    8, 7, 8, 8, 8, 9, 8, 9,
    8, 7, 7, 8, 8, 9, 9, 10,
    9, 8, 8, 9, 9, 9, 9, 10,
];

/// Per-axis code lengths for the factored 16x16 codebooks: the pair length
/// is the sum of the two axis lengths, which keeps the Kraft sum below one
/// by construction.
const AXIS_T13: [u8; 16] = [1, 3, 4, 5, 6, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12];
const AXIS_T15: [u8; 16] = [3, 3, 3, 4, 4, 4, 5, 5, 5, 6, 6, 6, 7, 7, 7, 8];
const AXIS_T16: [u8; 16] = [1, 3, 4, 5, 6, 7, 8, 9, 9, 10, 10, 11, 11, 12, 12, 6];
const AXIS_T24: [u8; 16] = [4, 4, 4, 4, 4, 4, 5, 5, 5, 6, 6, 7, 7, 8, 8, 4];

/// Count1 quadruple codebooks; symbol bits are (v, w, x, y) MSB-first.
const LENS_QUAD_A: [u8; 16] = [1, 4, 4, 5, 4, 6, 5, 6, 4, 5, 5, 6, 5, 6, 6, 6];
const LENS_QUAD_B: [u8; 16] = [4; 16];

/// Escape field widths for the linbits codebooks, tables 16-31.
const LINBITS: [u8; 16] = [1, 2, 3, 4, 6, 8, 10, 13, 4, 5, 6, 7, 8, 9, 11, 13];

const MAX_CODE_LEN: usize = 24;

#[derive(Debug, Default)]
struct VlcTable {
    max_len: usize,
    count: [u32; MAX_CODE_LEN + 1],
    first_code: [u32; MAX_CODE_LEN + 1],
    offset: [u32; MAX_CODE_LEN + 1],
    syms: Vec<u16>,
}

impl VlcTable {
    /// Builds a canonical decoding table from per-symbol code lengths.
    /// Symbols of equal length are ordered by index.
    fn build(lens: &[u8]) -> Self {
        let mut table = Self {
            max_len: lens.iter().copied().max().unwrap_or(0) as usize,
            ..Default::default()
        };

        for &len in lens {
            table.count[len as usize] += 1;
        }

        let mut code = 0u32;
        let mut offset = 0u32;
        for len in 1..=table.max_len {
            code = (code + table.count[len - 1]) << 1;
            table.first_code[len] = code;
            table.offset[len] = offset;
            offset += table.count[len];
        }

        for len in 1..=table.max_len as u8 {
            for (sym, _) in lens.iter().enumerate().filter(|&(_, &l)| l == len) {
                table.syms.push(sym as u16);
            }
        }

        table
    }

    fn decode(&self, reader: &mut BsIoSliceReader<'_>) -> Result<u16, DecodeError> {
        let mut code = 0u32;

        for len in 1..=self.max_len {
            let bit = reader.get().map_err(|_| DecodeError::PayloadTruncated {
                section: "huffman data",
            })?;
            code = (code << 1) | bit as u32;

            let count = self.count[len];
            if count > 0 {
                let first = self.first_code[len];
                if code >= first && code < first + count {
                    return Ok(self.syms[(self.offset[len] + code - first) as usize]);
                }
            }
        }

        Err(DecodeError::HuffmanPrefix {
            table: u8::MAX,
            position: 0,
        })
    }
}

fn product_lens(axis: &[u8; 16]) -> Vec<u8> {
    let mut lens = Vec::with_capacity(256);
    for &x in axis {
        for &y in axis {
            lens.push(x + y);
        }
    }

    lens
}

struct PairCodebook {
    xy: u16,
    linbits: u32,
    vlc: Option<VlcTable>,
}

fn pair_codebooks() -> &'static [PairCodebook; 32] {
    static CODEBOOKS: OnceLock<[PairCodebook; 32]> = OnceLock::new();
    CODEBOOKS.get_or_init(|| {
        std::array::from_fn(|id| {
            let lens: Option<Vec<u8>> = match id {
                1 => Some(LENS_T1.to_vec()),
                2 => Some(LENS_T2.to_vec()),
                3 => Some(LENS_T3.to_vec()),
                5 => Some(LENS_T5.to_vec()),
                6 => Some(LENS_T6.to_vec()),
                7 => Some(LENS_T7.to_vec()),
                8 => Some(LENS_T8.to_vec()),
                9 => Some(LENS_T9.to_vec()),
                10 => Some(LENS_T10.to_vec()),
                11 => Some(LENS_T11.to_vec()),
                12 => Some(LENS_T12.to_vec()),
                13 => Some(product_lens(&AXIS_T13)),
                15 => Some(product_lens(&AXIS_T15)),
                16..=23 => Some(product_lens(&AXIS_T16)),
                24..=31 => Some(product_lens(&AXIS_T24)),
                _ => None,
            };

            let xy = match lens.as_ref().map(Vec::len) {
                Some(4) => 2,
                Some(9) => 3,
                Some(16) => 4,
                Some(36) => 6,
                Some(64) => 8,
                Some(_) => 16,
                None => 0,
            };

            PairCodebook {
                xy,
                linbits: if id >= 16 { LINBITS[id - 16] as u32 } else { 0 },
                vlc: lens.map(|l| VlcTable::build(&l)),
            }
        })
    })
}

fn quad_codebooks() -> &'static [VlcTable; 2] {
    static CODEBOOKS: OnceLock<[VlcTable; 2]> = OnceLock::new();
    CODEBOOKS.get_or_init(|| [VlcTable::build(&LENS_QUAD_A), VlcTable::build(&LENS_QUAD_B)])
}

fn sign(reader: &mut BsIoSliceReader<'_>, value: i32) -> Result<i32, DecodeError> {
    if value == 0 {
        return Ok(0);
    }

    let negative = reader.get().map_err(|_| DecodeError::PayloadTruncated {
        section: "huffman sign bits",
    })?;

    Ok(if negative { -value } else { value })
}

/// Decodes one big-values (x, y) pair with linbits escapes and sign bits.
pub fn decode_pair(
    reader: &mut BsIoSliceReader<'_>,
    table_id: u8,
) -> Result<(i32, i32), DecodeError> {
    // Table 0 carries no data: the whole region is zero.
    if table_id == 0 {
        return Ok((0, 0));
    }

    let book = &pair_codebooks()[table_id as usize];
    let Some(vlc) = &book.vlc else {
        return Err(DecodeError::MissingCodebook(table_id));
    };

    let sym = vlc.decode(reader).map_err(|e| match e {
        DecodeError::HuffmanPrefix { .. } => DecodeError::HuffmanPrefix {
            table: table_id,
            position: reader.position().unwrap_or(0),
        },
        other => other,
    })?;

    let mut x = (sym / book.xy) as i32;
    let mut y = (sym % book.xy) as i32;

    if book.linbits > 0 {
        if x == 15 {
            x += reader
                .get_n::<u32>(book.linbits)
                .map_err(|_| DecodeError::PayloadTruncated { section: "linbits" })?
                as i32;
        }
        if y == 15 {
            y += reader
                .get_n::<u32>(book.linbits)
                .map_err(|_| DecodeError::PayloadTruncated { section: "linbits" })?
                as i32;
        }
    }

    let x = sign(reader, x)?;
    let y = sign(reader, y)?;

    Ok((x, y))
}

/// Decodes one count1 (v, w, x, y) quadruple with sign bits.
pub fn decode_quad(
    reader: &mut BsIoSliceReader<'_>,
    table_b: bool,
) -> Result<(i32, i32, i32, i32), DecodeError> {
    let vlc = &quad_codebooks()[table_b as usize];

    let sym = vlc.decode(reader).map_err(|e| match e {
        DecodeError::HuffmanPrefix { .. } => DecodeError::HuffmanPrefix {
            table: 32 + table_b as u8,
            position: reader.position().unwrap_or(0),
        },
        other => other,
    })?;

    let v = sign(reader, ((sym >> 3) & 1) as i32)?;
    let w = sign(reader, ((sym >> 2) & 1) as i32)?;
    let x = sign(reader, ((sym >> 1) & 1) as i32)?;
    let y = sign(reader, (sym & 1) as i32)?;

    Ok((v, w, x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_assignment() {
        // Lengths [1, 3, 2, 3] assign canonically: 0, 110, 10, 111.
        let table = VlcTable::build(&LENS_T1);
        assert_eq!(table.syms, vec![0, 2, 1, 3]);
        assert_eq!(table.first_code[1], 0);
        assert_eq!(table.first_code[2], 0b10);
        assert_eq!(table.first_code[3], 0b110);
    }

    #[test]
    fn pair_round_of_symbols() {
        // 0 -> (0,0), no sign bits. 10 -> (1,0) + one sign bit.
        // Bits: 0 | 10 1 | 110 0 | 111 1 1 => (0,0) (-1,0) (0,1) (-1,-1)
        let data = [0b0_101_1100u8, 0b1111_1000];
        let mut reader = BsIoSliceReader::from_slice(&data);

        assert_eq!(decode_pair(&mut reader, 1).unwrap(), (0, 0));
        assert_eq!(decode_pair(&mut reader, 1).unwrap(), (-1, 0));
        assert_eq!(decode_pair(&mut reader, 1).unwrap(), (0, 1));
        assert_eq!(decode_pair(&mut reader, 1).unwrap(), (-1, -1));
    }

    #[test]
    fn quad_all_zero_is_one_bit() {
        // Codebook A gives the all-zero quadruple a single-bit code.
        let data = [0b0000_0000u8];
        let mut reader = BsIoSliceReader::from_slice(&data);

        assert_eq!(decode_quad(&mut reader, false).unwrap(), (0, 0, 0, 0));
        assert_eq!(reader.position().unwrap(), 1);
    }

    #[test]
    fn quad_table_b_is_fixed_width() {
        // All 16 symbols are 4 bits; 0b1111 decodes to (1,1,1,1) before signs.
        let data = [0b1111_0000u8];
        let mut reader = BsIoSliceReader::from_slice(&data);

        assert_eq!(decode_quad(&mut reader, true).unwrap(), (1, 1, 1, 1));
        assert_eq!(reader.position().unwrap(), 8);
    }

    #[test]
    fn table_without_codebook_is_rejected() {
        let mut reader = BsIoSliceReader::from_slice(&[0xFF]);
        assert!(matches!(
            decode_pair(&mut reader, 4),
            Err(DecodeError::MissingCodebook(4))
        ));
    }

    #[test]
    fn kraft_inequality_holds_for_all_codebooks() {
        for book in pair_codebooks() {
            let Some(vlc) = &book.vlc else { continue };
            let mut sum = 0.0f64;
            for len in 1..=vlc.max_len {
                sum += vlc.count[len] as f64 / (1u64 << len) as f64;
            }
            assert!(sum <= 1.0 + 1e-12);
        }
    }
}
