//! Static format tables shared by the decoding paths.
//!
//! Scale factor band widths, Layer III scale factor code lengths, and the
//! Layer II bit allocation classes with their per-subband allowed sets.

use std::sync::OnceLock;

/// Maps a decoded sampling frequency to a row in the scale factor band tables.
///
/// Rows 0-2 are the MPEG-1 rates, 3-5 the MPEG-2 rates, 6-8 the MPEG-2.5
/// rates, in header index order (44.1/48/32 kHz families).
pub fn samplerate_index(sample_rate: u32) -> usize {
    match sample_rate {
        44100 => 0,
        48000 => 1,
        32000 => 2,
        22050 => 3,
        24000 => 4,
        16000 => 5,
        11025 => 6,
        12000 => 7,
        _ => 8,
    }
}

/// Long block scale factor band widths, 22 bands per sampling frequency.
#[rustfmt::skip]
pub const SFB_WIDTH_LONG: [[usize; 22]; 9] = [
    [4, 4, 4, 4, 4, 4, 6, 6, 8, 8, 10, 12, 16, 20, 24, 28, 34, 42, 50, 54, 76, 158],
    [4, 4, 4, 4, 4, 4, 6, 6, 6, 8, 10, 12, 16, 18, 22, 28, 34, 40, 46, 54, 54, 192],
    [4, 4, 4, 4, 4, 4, 6, 6, 8, 10, 12, 16, 20, 24, 30, 38, 46, 56, 68, 84, 102, 26],
    [6, 6, 6, 6, 6, 6, 8, 10, 12, 14, 16, 20, 24, 28, 32, 38, 46, 52, 60, 68, 58, 54],
    [6, 6, 6, 6, 6, 6, 8, 10, 12, 14, 16, 18, 22, 26, 32, 38, 46, 54, 62, 70, 76, 36],
    [6, 6, 6, 6, 6, 6, 8, 10, 12, 14, 16, 20, 24, 28, 32, 38, 46, 52, 60, 68, 58, 54],
    [6, 6, 6, 6, 6, 6, 8, 10, 12, 14, 16, 20, 24, 28, 32, 38, 46, 52, 60, 68, 58, 54],
    [6, 6, 6, 6, 6, 6, 8, 10, 12, 14, 16, 18, 22, 26, 32, 38, 46, 54, 62, 70, 76, 36],
    [12, 12, 12, 12, 12, 12, 16, 20, 24, 28, 32, 40, 48, 56, 64, 76, 90, 2, 2, 2, 2, 2],
];

/// Short block scale factor band widths, 13 bands per sampling frequency.
#[rustfmt::skip]
pub const SFB_WIDTH_SHORT: [[usize; 13]; 9] = [
    [4, 4, 4, 4, 6, 8, 10, 12, 14, 18, 22, 30, 56],
    [4, 4, 4, 4, 6, 6, 10, 12, 14, 16, 20, 26, 66],
    [4, 4, 4, 4, 6, 8, 12, 16, 20, 26, 34, 42, 12],
    [4, 4, 4, 6, 6, 8, 10, 14, 18, 26, 32, 42, 18],
    [4, 4, 4, 6, 8, 10, 12, 14, 18, 24, 32, 44, 12],
    [4, 4, 8, 8, 10, 12, 16, 20, 24, 30, 38, 12, 6],
    [4, 4, 4, 6, 6, 8, 10, 14, 18, 26, 32, 42, 18],
    [4, 4, 4, 6, 8, 10, 12, 14, 18, 24, 32, 44, 12],
    [8, 8, 8, 12, 16, 20, 24, 28, 36, 2, 2, 2, 26],
];

/// Cumulative long band start offsets, used for Huffman region boundaries.
pub fn sfb_long_bounds(sr_idx: usize) -> [usize; 23] {
    let mut bounds = [0usize; 23];
    let mut acc = 0;
    for (i, &width) in SFB_WIDTH_LONG[sr_idx].iter().enumerate() {
        bounds[i] = acc;
        acc += width;
    }
    bounds[22] = acc;

    bounds
}

/// Scale factor preemphasis per long band.
pub const PRETAB: [u32; 22] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 3, 2, 0,
];

/// scalefac_compress to (slen1, slen2), MPEG-1 Layer III.
pub const SLEN_TABLE: [[u32; 2]; 16] = [
    [0, 0],
    [0, 1],
    [0, 2],
    [0, 3],
    [3, 0],
    [1, 1],
    [1, 2],
    [1, 3],
    [2, 1],
    [2, 2],
    [2, 3],
    [3, 1],
    [3, 2],
    [3, 3],
    [4, 2],
    [4, 3],
];

/// Layer I/II scale factor multipliers: index 0 is 2.0, each step divides by
/// the cube root of two. Index 63 is not transmitted by valid streams.
pub fn scalefactor_table() -> &'static [f32; 64] {
    static TABLE: OnceLock<[f32; 64]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0; 64];
        for (i, value) in table.iter_mut().enumerate() {
            *value = (2.0f64 * 2.0f64.powf(-(i as f64) / 3.0)) as f32;
        }

        table
    })
}

/// One Layer II quantization class.
#[derive(Debug, Clone, Copy)]
pub struct QuantClass {
    /// Number of quantization levels.
    pub levels: u32,
    /// Bits per codeword: for grouped classes the codeword carries three
    /// consecutive samples, otherwise one.
    pub bits: u32,
    pub grouped: bool,
}

pub const QUANT_CLASSES: [QuantClass; 17] = [
    QuantClass { levels: 3, bits: 5, grouped: true },
    QuantClass { levels: 5, bits: 7, grouped: true },
    QuantClass { levels: 7, bits: 3, grouped: false },
    QuantClass { levels: 9, bits: 10, grouped: true },
    QuantClass { levels: 15, bits: 4, grouped: false },
    QuantClass { levels: 31, bits: 5, grouped: false },
    QuantClass { levels: 63, bits: 6, grouped: false },
    QuantClass { levels: 127, bits: 7, grouped: false },
    QuantClass { levels: 255, bits: 8, grouped: false },
    QuantClass { levels: 511, bits: 9, grouped: false },
    QuantClass { levels: 1023, bits: 10, grouped: false },
    QuantClass { levels: 2047, bits: 11, grouped: false },
    QuantClass { levels: 4095, bits: 12, grouped: false },
    QuantClass { levels: 8191, bits: 13, grouped: false },
    QuantClass { levels: 16383, bits: 14, grouped: false },
    QuantClass { levels: 32767, bits: 15, grouped: false },
    QuantClass { levels: 65535, bits: 16, grouped: false },
];

// Per-subband allowed class sets. The allocation codeword selects into one
// of these rows; value 0 always means "no allocation" and is not listed.
const ROW_WIDE: &[usize] = &[0, 2, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
const ROW_MID: &[usize] = &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 16];
const ROW_NARROW: &[usize] = &[0, 1, 2, 3, 4, 5, 16];
const ROW_TAIL: &[usize] = &[0, 1, 16];
const ROW_LOW_RATE: &[usize] = &[0, 1, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
const ROW_LSF_HEAD: &[usize] = &[0, 1, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 16];
const ROW_LSF_MID: &[usize] = &[0, 1, 3, 4, 5, 6, 7];
const ROW_LSF_TAIL: &[usize] = &[0, 1, 3];

/// A Layer II bit allocation table: the active subband count and, for each
/// subband, the class set its allocation codeword indexes into.
#[derive(Debug)]
pub struct Layer2Table {
    pub sblimit: usize,
    pub rows: [&'static [usize]; 30],
}

impl Layer2Table {
    /// Allocation codeword width for a subband.
    pub fn nbal(&self, subband: usize) -> u32 {
        ((self.rows[subband].len() + 1) as u32).next_power_of_two().trailing_zeros()
    }
}

const fn fill_rows(
    head: &'static [usize],
    head_count: usize,
    mid: &'static [usize],
    mid_count: usize,
    narrow: &'static [usize],
    narrow_count: usize,
    tail: &'static [usize],
    tail_count: usize,
) -> [&'static [usize]; 30] {
    let mut rows: [&'static [usize]; 30] = [&[]; 30];
    let mut i = 0;
    while i < 30 {
        if i < head_count {
            rows[i] = head;
        } else if i < head_count + mid_count {
            rows[i] = mid;
        } else if i < head_count + mid_count + narrow_count {
            rows[i] = narrow;
        } else if i < head_count + mid_count + narrow_count + tail_count {
            rows[i] = tail;
        }
        i += 1;
    }

    rows
}

static TABLE_A: Layer2Table = Layer2Table {
    sblimit: 27,
    rows: fill_rows(ROW_WIDE, 3, ROW_MID, 8, ROW_NARROW, 12, ROW_TAIL, 4),
};

static TABLE_B: Layer2Table = Layer2Table {
    sblimit: 30,
    rows: fill_rows(ROW_WIDE, 3, ROW_MID, 8, ROW_NARROW, 12, ROW_TAIL, 7),
};

static TABLE_C: Layer2Table = Layer2Table {
    sblimit: 8,
    rows: fill_rows(ROW_LOW_RATE, 8, &[], 0, &[], 0, &[], 0),
};

static TABLE_D: Layer2Table = Layer2Table {
    sblimit: 12,
    rows: fill_rows(ROW_LOW_RATE, 12, &[], 0, &[], 0, &[], 0),
};

static TABLE_LSF: Layer2Table = Layer2Table {
    sblimit: 30,
    rows: fill_rows(ROW_LSF_HEAD, 4, ROW_LSF_MID, 7, ROW_LSF_TAIL, 19, &[], 0),
};

/// Selects the Layer II allocation table from the stream parameters.
///
/// MPEG-2/2.5 streams always use the LSF table; MPEG-1 selects by sampling
/// frequency and per-channel bitrate.
pub fn layer2_table(lsf: bool, sample_rate: u32, bitrate_per_channel: u32) -> &'static Layer2Table {
    if lsf {
        return &TABLE_LSF;
    }

    if bitrate_per_channel <= 48 {
        if sample_rate == 32000 { &TABLE_D } else { &TABLE_C }
    } else if bitrate_per_channel <= 80 {
        &TABLE_A
    } else if sample_rate == 48000 {
        &TABLE_A
    } else {
        &TABLE_B
    }
}

#[test]
fn band_widths_cover_the_spectrum() {
    for row in &SFB_WIDTH_LONG {
        assert_eq!(row.iter().sum::<usize>(), 576);
    }
    for row in &SFB_WIDTH_SHORT {
        assert_eq!(row.iter().sum::<usize>() * 3, 576);
    }
}

#[test]
fn long_bounds_are_cumulative() {
    let bounds = sfb_long_bounds(0);
    assert_eq!(bounds[0], 0);
    assert_eq!(bounds[1], 4);
    assert_eq!(bounds[22], 576);
}

#[test]
fn allocation_widths() {
    assert_eq!(TABLE_A.nbal(0), 4);
    assert_eq!(TABLE_A.nbal(5), 4);
    assert_eq!(TABLE_A.nbal(12), 3);
    assert_eq!(TABLE_A.nbal(25), 2);
    assert_eq!(TABLE_LSF.nbal(15), 2);

    assert_eq!(layer2_table(false, 48000, 96).sblimit, 27);
    assert_eq!(layer2_table(false, 44100, 96).sblimit, 30);
    assert_eq!(layer2_table(false, 32000, 32).sblimit, 12);
    assert_eq!(layer2_table(true, 24000, 64).sblimit, 30);
}

#[test]
fn scalefactors_decrease_by_cube_root_steps() {
    let table = scalefactor_table();
    assert!((table[0] - 2.0).abs() < 1e-6);
    assert!((table[3] - 1.0).abs() < 1e-6);
    for w in table.windows(2) {
        assert!(w[1] < w[0]);
    }
}
