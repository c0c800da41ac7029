//! Layer III granule decoding.
//!
//! Runs the full granule pipeline over assembled main data: scale factors,
//! Huffman spectrum, requantization, joint stereo, short block reordering,
//! alias reduction, IMDCT with overlap-add and the polyphase filterbank.

use std::f32::consts::PI;
use std::sync::OnceLock;

use crate::log_or_err;
use crate::process::decode::PcmFrame;
use crate::process::{GRANULE_SAMPLES, MAX_CHANNELS, SUBBANDS};
use crate::structs::header::{ChannelMode, FrameHeader};
use crate::structs::side_info::{Granule, SideInfo};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecodeError;
use crate::utils::huffman;
use crate::utils::synthesis::{SynthState, frequency_inversion, synthesis_filter};
use crate::utils::tables::{
    self, PRETAB, SFB_WIDTH_LONG, SFB_WIDTH_SHORT, SLEN_TABLE, samplerate_index,
};

/// Intensity stereo ratios for is_pos 0..=6; is_pos 7 is invalid and falls
/// back to M/S processing.
#[allow(clippy::excessive_precision)]
const IS_RATIOS: [(f32, f32); 7] = [
    (0.000000000, 1.000000000),
    (0.211324865, 0.788675135),
    (0.366025404, 0.633974596),
    (0.500000000, 0.500000000),
    (0.633974596, 0.366025404),
    (0.788675135, 0.211324865),
    (1.000000000, 0.000000000),
];

/// Alias reduction butterfly coefficients: cs = 1/sqrt(1 + c²),
/// ca = c/sqrt(1 + c²).
#[allow(clippy::excessive_precision)]
const CS: [f32; 8] = [
    0.8574929257, 0.8817419973, 0.9496286491, 0.9833145925, 0.9955178161, 0.9991605582,
    0.9998991952, 0.9999931551,
];

#[allow(clippy::excessive_precision)]
const CA: [f32; 8] = [
    -0.5144957554, -0.4717319684, -0.3133774542, -0.1819131996, -0.0945741925, -0.0409655829,
    -0.0141985686, -0.0036999747,
];

const POW43_TABLE_SIZE: usize = 8192;

fn pow43_table() -> &'static Vec<f32> {
    static TABLE: OnceLock<Vec<f32>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..POW43_TABLE_SIZE)
            .map(|i| (i as f32).powf(4.0 / 3.0))
            .collect()
    })
}

#[inline]
fn pow43(value: i32, table: &[f32]) -> f32 {
    let magnitude = value.unsigned_abs() as usize;
    let p = if magnitude < POW43_TABLE_SIZE {
        table[magnitude]
    } else {
        (magnitude as f32).powf(4.0 / 3.0)
    };

    if value < 0 { -p } else { p }
}

/// IMDCT windows for block types 0 (normal), 1 (start), 3 (stop). Short
/// blocks use the dedicated 12-point window.
fn imdct_windows() -> &'static [[f32; 36]; 4] {
    static WINDOWS: OnceLock<[[f32; 36]; 4]> = OnceLock::new();
    WINDOWS.get_or_init(|| {
        let mut windows = [[0.0f32; 36]; 4];

        for i in 0..36 {
            windows[0][i] = (PI / 36.0 * (i as f32 + 0.5)).sin();
        }

        for i in 0..18 {
            windows[1][i] = (PI / 36.0 * (i as f32 + 0.5)).sin();
        }
        for i in 18..24 {
            windows[1][i] = 1.0;
        }
        for i in 24..30 {
            windows[1][i] = (PI / 12.0 * ((i - 24) as f32 + 0.5)).sin();
        }

        for i in 6..12 {
            windows[3][i] = (PI / 12.0 * ((i - 6) as f32 + 0.5)).sin();
        }
        for i in 12..18 {
            windows[3][i] = 1.0;
        }
        for i in 18..36 {
            windows[3][i] = (PI / 36.0 * (i as f32 + 0.5)).sin();
        }

        windows
    })
}

fn short_window() -> &'static [f32; 12] {
    static WINDOW: OnceLock<[f32; 12]> = OnceLock::new();
    WINDOW.get_or_init(|| {
        let mut window = [0.0f32; 12];
        for (i, value) in window.iter_mut().enumerate() {
            *value = (PI / 12.0 * (i as f32 + 0.5)).sin();
        }

        window
    })
}

struct GranuleContext {
    scalefac: [u8; 40],
    is: [i32; GRANULE_SAMPLES],
    xr: [f32; GRANULE_SAMPLES],
    rzero: usize,
}

impl GranuleContext {
    fn new() -> Self {
        Self {
            scalefac: [0; 40],
            is: [0; GRANULE_SAMPLES],
            xr: [0.0; GRANULE_SAMPLES],
            rzero: 0,
        }
    }
}

struct FailPolicy {
    fail_level: log::Level,
}

/// Decodes every granule of one frame from assembled main data into PCM.
#[allow(clippy::too_many_arguments)]
pub fn decode_frame(
    header: &FrameHeader,
    side_info: &SideInfo,
    main_data: &[u8],
    fail_level: log::Level,
    overlap: &mut [[[f32; 18]; SUBBANDS]; MAX_CHANNELS],
    synth: &mut [SynthState; MAX_CHANNELS],
    pcm: &mut PcmFrame,
) -> Result<(), DecodeError> {
    let policy = FailPolicy { fail_level };
    let channels = header.channels();
    let sr_idx = samplerate_index(header.sample_rate);
    let reader = &mut BsIoSliceReader::from_slice(main_data);

    let mut ctx = [
        [GranuleContext::new(), GranuleContext::new()],
        [GranuleContext::new(), GranuleContext::new()],
    ];

    for gr in 0..header.granules() {
        for ch in 0..channels {
            let granule = &side_info.granules[gr][ch];
            let start_bit = reader.position()?;
            let end_bit = start_bit + granule.part2_3_length as u64;

            let (gr0, gr1) = ctx.split_at_mut(1);
            let (prev, current) = if gr == 0 {
                (None, &mut gr0[0][ch])
            } else {
                (Some(&gr0[0][ch].scalefac), &mut gr1[0][ch])
            };

            if header.is_lsf() {
                read_scalefactors_lsf(reader, granule, &mut current.scalefac)?;
            } else {
                read_scalefactors(
                    reader,
                    granule,
                    &side_info.scfsi[ch],
                    prev,
                    &mut current.scalefac,
                )?;
            }

            let part2_bits = reader.position()? - start_bit;
            if part2_bits > granule.part2_3_length as u64 {
                log_or_err!(
                    policy,
                    log::Level::Warn,
                    DecodeError::ScaleFactorOverrun {
                        limit: granule.part2_3_length,
                        used: part2_bits as u32,
                    }
                );
            }

            read_spectrum(reader, granule, sr_idx, end_bit, current)?;
        }

        if channels == 2 && header.mode == ChannelMode::JointStereo {
            let (left, right) = ctx[gr].split_at_mut(1);
            process_stereo(header, &side_info.granules[gr][0], sr_idx, &mut left[0], &mut right[0]);

            let rzero = left[0].rzero.max(right[0].rzero);
            left[0].rzero = rzero;
            right[0].rzero = rzero;
        }

        for ch in 0..channels {
            let granule = &side_info.granules[gr][ch];
            let current = &mut ctx[gr][ch];

            reorder(granule, sr_idx, &mut current.xr);
            alias_reduction(granule, &mut current.xr);

            let mut time = [0.0f32; GRANULE_SAMPLES];
            imdct_granule(granule, &current.xr, &mut overlap[ch], &mut time);
            frequency_inversion(&mut time);

            for slot in 0..18 {
                let mut subband = [0.0f32; SUBBANDS];
                for (sb, value) in subband.iter_mut().enumerate() {
                    *value = time[sb * 18 + slot];
                }

                let mut out = [0.0f32; SUBBANDS];
                synthesis_filter(&mut synth[ch], &subband, &mut out);

                let base = gr * GRANULE_SAMPLES + slot * SUBBANDS;
                pcm.samples[ch][base..base + SUBBANDS].copy_from_slice(&out);
            }
        }
    }

    Ok(())
}

fn read_scalefactors(
    reader: &mut BsIoSliceReader<'_>,
    granule: &Granule,
    scfsi: &[bool; 4],
    prev: Option<&[u8; 40]>,
    scalefac: &mut [u8; 40],
) -> Result<(), DecodeError> {
    scalefac.fill(0);

    let [slen1, slen2] = SLEN_TABLE[granule.scalefac_compress as usize];

    if granule.short_blocks() && granule.mixed_block {
        for sf in scalefac.iter_mut().take(8) {
            if slen1 > 0 {
                *sf = reader.get_n(slen1)?;
            }
        }
        for band in 3..12 {
            let len = if band < 6 { slen1 } else { slen2 };
            for win in 0..3 {
                if len > 0 {
                    scalefac[8 + (band - 3) * 3 + win] = reader.get_n(len)?;
                }
            }
        }
    } else if granule.short_blocks() {
        for band in 0..12 {
            let len = if band < 6 { slen1 } else { slen2 };
            for win in 0..3 {
                if len > 0 {
                    scalefac[band * 3 + win] = reader.get_n(len)?;
                }
            }
        }
    } else {
        const GROUPS: [(usize, usize); 4] = [(0, 6), (6, 11), (11, 16), (16, 21)];

        for (group, &(start, end)) in GROUPS.iter().enumerate() {
            let use_prev = prev.is_some() && scfsi[group];

            for band in start..end {
                let len = if band < 11 { slen1 } else { slen2 };

                if use_prev {
                    scalefac[band] = prev.map(|p| p[band]).unwrap_or(0);
                } else if len > 0 {
                    scalefac[band] = reader.get_n(len)?;
                }
            }
        }
    }

    Ok(())
}

/// LSF scale factor partitioning: scalefac_compress selects field widths
/// and band partition counts.
fn read_scalefactors_lsf(
    reader: &mut BsIoSliceReader<'_>,
    granule: &Granule,
    scalefac: &mut [u8; 40],
) -> Result<(), DecodeError> {
    scalefac.fill(0);

    let sc = granule.scalefac_compress;
    let (slen, row) = if sc < 400 {
        ([(sc >> 4) / 5, (sc >> 4) % 5, (sc >> 2) & 3, sc & 3], 0)
    } else if sc < 500 {
        let t = sc - 400;
        ([(t >> 2) / 5, (t >> 2) % 5, t & 3, 0], 1)
    } else {
        let t = sc - 500;
        ([t / 3, t % 3, 0, 0], 2)
    };

    const PARTITIONS: [[[u32; 4]; 3]; 3] = [
        [[6, 5, 5, 5], [9, 9, 9, 9], [6, 9, 9, 9]],
        [[6, 5, 7, 3], [9, 9, 12, 6], [6, 9, 12, 6]],
        [[11, 10, 0, 0], [18, 18, 0, 0], [15, 18, 0, 0]],
    ];

    let shape = if granule.short_blocks() {
        if granule.mixed_block { 2 } else { 1 }
    } else {
        0
    };
    let partition = PARTITIONS[row][shape];

    let mut index = 0;
    for (count, len) in partition.into_iter().zip(slen) {
        for _ in 0..count {
            if index >= scalefac.len() {
                break;
            }
            if len > 0 {
                scalefac[index] = reader.get_n(len)?;
            }
            index += 1;
        }
    }

    Ok(())
}

fn read_spectrum(
    reader: &mut BsIoSliceReader<'_>,
    granule: &Granule,
    sr_idx: usize,
    end_bit: u64,
    ctx: &mut GranuleContext,
) -> Result<(), DecodeError> {
    ctx.is.fill(0);

    let bounds = tables::sfb_long_bounds(sr_idx);
    let big_values = (granule.big_values as usize * 2).min(GRANULE_SAMPLES);

    let (region1_start, region2_start) = if granule.short_blocks() {
        (36, GRANULE_SAMPLES)
    } else {
        let r0 = (granule.region0_count as usize + 1).min(22);
        let r1 = (r0 + granule.region1_count as usize + 1).min(22);
        (bounds[r0], bounds[r1])
    };

    let mut i = 0;
    while i < big_values {
        if reader.position()? >= end_bit {
            break;
        }

        let table_id = if i < region1_start {
            granule.table_select[0]
        } else if i < region2_start {
            granule.table_select[1]
        } else {
            granule.table_select[2]
        };

        let (x, y) = huffman::decode_pair(reader, table_id)?;
        ctx.is[i] = x;
        if i + 1 < GRANULE_SAMPLES {
            ctx.is[i + 1] = y;
        }
        i += 2;
    }

    while i < GRANULE_SAMPLES {
        if reader.position()? >= end_bit {
            break;
        }

        let (v, w, x, y) = huffman::decode_quad(reader, granule.count1table_select)?;
        for (offset, value) in [v, w, x, y].into_iter().enumerate() {
            if i + offset < GRANULE_SAMPLES {
                ctx.is[i + offset] = value;
            }
        }
        i += 4;
    }

    // The final count1 quadruple may straddle the granule boundary; its
    // values come from out-of-bounds bits and cannot be trusted.
    if reader.position()? > end_bit && i > big_values {
        i -= 4;
        for value in ctx.is.iter_mut().take((i + 4).min(GRANULE_SAMPLES)).skip(i) {
            *value = 0;
        }
    }

    ctx.rzero = i.min(GRANULE_SAMPLES);

    let position = reader.position()?;
    reader.seek(end_bit as i64 - position as i64)?;

    requantize(granule, sr_idx, ctx);

    Ok(())
}

fn requantize(granule: &Granule, sr_idx: usize, ctx: &mut GranuleContext) {
    ctx.xr.fill(0.0);

    let table = pow43_table();
    let scale_step = if granule.scalefac_scale { 1.0f64 } else { 0.5 };
    let gain = granule.global_gain as f64;

    if granule.short_blocks() && granule.mixed_block {
        let long_end = requantize_long_bands(granule, sr_idx, ctx, table, gain, scale_step, 0, 8);
        requantize_short_bands(granule, sr_idx, ctx, table, gain, scale_step, long_end, 3);
    } else if granule.short_blocks() {
        requantize_short_bands(granule, sr_idx, ctx, table, gain, scale_step, 0, 0);
    } else {
        requantize_long_bands(granule, sr_idx, ctx, table, gain, scale_step, 0, 22);
    }
}

#[allow(clippy::too_many_arguments)]
fn requantize_long_bands(
    granule: &Granule,
    sr_idx: usize,
    ctx: &mut GranuleContext,
    table: &[f32],
    gain: f64,
    scale_step: f64,
    start: usize,
    band_count: usize,
) -> usize {
    let widths = &SFB_WIDTH_LONG[sr_idx];
    let preflag = granule.preflag as u32;
    let mut index = start;

    for band in 0..band_count {
        let sf = ctx.scalefac[band] as f64 + (preflag * PRETAB[band]) as f64;
        let exponent = gain - 210.0 - 4.0 * sf * scale_step;
        let multiplier = 2.0f64.powf(0.25 * exponent) as f32;

        for _ in 0..widths[band] {
            if index >= GRANULE_SAMPLES {
                return index;
            }
            if ctx.is[index] != 0 {
                ctx.xr[index] = pow43(ctx.is[index], table) * multiplier;
            }
            index += 1;
        }
    }

    index
}

#[allow(clippy::too_many_arguments)]
fn requantize_short_bands(
    granule: &Granule,
    sr_idx: usize,
    ctx: &mut GranuleContext,
    table: &[f32],
    gain: f64,
    scale_step: f64,
    start: usize,
    first_band: usize,
) {
    let widths = &SFB_WIDTH_SHORT[sr_idx];
    let sf_base = if first_band > 0 { 8 } else { 0 };
    let mut index = start;

    for band in first_band..13 {
        for win in 0..3 {
            let sf = if band < 12 {
                ctx.scalefac[sf_base + (band - first_band) * 3 + win] as f64
            } else {
                0.0
            };
            let gain_sub = 8.0 * granule.subblock_gain[win] as f64;
            let exponent = gain - 210.0 - gain_sub - 4.0 * sf * scale_step;
            let multiplier = 2.0f64.powf(0.25 * exponent) as f32;

            for _ in 0..widths[band] {
                if index >= GRANULE_SAMPLES {
                    return;
                }
                if ctx.is[index] != 0 {
                    ctx.xr[index] = pow43(ctx.is[index], table) * multiplier;
                }
                index += 1;
            }
        }
    }
}

/// Joint stereo: M/S over the whole spectrum, intensity positioning from
/// the upper bands downward until the right channel carries data.
fn process_stereo(
    header: &FrameHeader,
    granule: &Granule,
    sr_idx: usize,
    left: &mut GranuleContext,
    right: &mut GranuleContext,
) {
    let intensity = header.mode_extension & 0x1 != 0;
    let ms = header.mode_extension & 0x2 != 0;

    if !intensity && !ms {
        return;
    }

    if !intensity {
        ms_spectrum(left, right);
        return;
    }

    if granule.short_blocks() {
        intensity_short(granule, sr_idx, ms, left, right);
    } else {
        intensity_long(sr_idx, ms, left, right);
    }
}

fn ms_spectrum(left: &mut GranuleContext, right: &mut GranuleContext) {
    const INV_SQRT2: f32 = std::f32::consts::FRAC_1_SQRT_2;

    for (l, r) in left.xr.iter_mut().zip(right.xr.iter_mut()) {
        let mid = *l;
        let side = *r;
        *l = (mid + side) * INV_SQRT2;
        *r = (mid - side) * INV_SQRT2;
    }
}

fn intensity_long(sr_idx: usize, ms: bool, left: &mut GranuleContext, right: &mut GranuleContext) {
    const INV_SQRT2: f32 = std::f32::consts::FRAC_1_SQRT_2;

    let widths = &SFB_WIDTH_LONG[sr_idx];
    let bounds = tables::sfb_long_bounds(sr_idx);
    let mut in_intensity = false;

    for band in (0..22).rev() {
        let start = bounds[band];
        let len = widths[band];

        if !in_intensity {
            let has_data = right.xr[start..start + len].iter().any(|&s| s != 0.0);
            if !has_data {
                // Band 21 shares band 20's intensity position.
                let pos_band = if band == 21 { 20 } else { band };
                let is_pos = right.scalefac[pos_band] as usize;

                if is_pos < IS_RATIOS.len() {
                    let (kl, kr) = IS_RATIOS[is_pos];
                    for i in start..start + len {
                        let m = left.xr[i];
                        left.xr[i] = m * kl;
                        right.xr[i] = m * kr;
                    }
                    continue;
                }
            }
            in_intensity = true;
        }

        if ms {
            for i in start..start + len {
                let mid = left.xr[i];
                let side = right.xr[i];
                left.xr[i] = (mid + side) * INV_SQRT2;
                right.xr[i] = (mid - side) * INV_SQRT2;
            }
        }
    }
}

fn intensity_short(
    granule: &Granule,
    sr_idx: usize,
    ms: bool,
    left: &mut GranuleContext,
    right: &mut GranuleContext,
) {
    const INV_SQRT2: f32 = std::f32::consts::FRAC_1_SQRT_2;

    let widths = &SFB_WIDTH_SHORT[sr_idx];
    let first_band = if granule.mixed_block { 3 } else { 0 };
    let region_start = if granule.mixed_block { 36 } else { 0 };

    let mut band_start = [0usize; 13];
    let mut acc = 0;
    for band in first_band..13 {
        band_start[band] = region_start + acc;
        acc += widths[band] * 3;
    }

    let sf_base = if granule.mixed_block { 8 } else { 0 };
    let mut in_intensity = [false; 3];

    for band in (first_band..13).rev() {
        let len = widths[band];

        for win in (0..3).rev() {
            let start = band_start[band] + win * len;

            if !in_intensity[win] {
                let has_data = right.xr[start..start + len].iter().any(|&s| s != 0.0);
                if !has_data {
                    let pos_band = if band == 12 { 11 } else { band };
                    let is_pos =
                        right.scalefac[sf_base + (pos_band - first_band) * 3 + win] as usize;

                    if is_pos < IS_RATIOS.len() {
                        let (kl, kr) = IS_RATIOS[is_pos];
                        for i in start..start + len {
                            let m = left.xr[i];
                            left.xr[i] = m * kl;
                            right.xr[i] = m * kr;
                        }
                        continue;
                    }
                }
                in_intensity[win] = true;
            }

            if ms {
                for i in start..start + len {
                    let mid = left.xr[i];
                    let side = right.xr[i];
                    left.xr[i] = (mid + side) * INV_SQRT2;
                    right.xr[i] = (mid - side) * INV_SQRT2;
                }
            }
        }
    }

    if ms && granule.mixed_block {
        for i in 0..region_start {
            let mid = left.xr[i];
            let side = right.xr[i];
            left.xr[i] = (mid + side) * INV_SQRT2;
            right.xr[i] = (mid - side) * INV_SQRT2;
        }
    }
}

/// Rearranges short block spectra from scale factor band order into the
/// per-subband window-grouped order the IMDCT consumes.
fn reorder(granule: &Granule, sr_idx: usize, xr: &mut [f32; GRANULE_SAMPLES]) {
    if !granule.short_blocks() {
        return;
    }

    let widths = &SFB_WIDTH_SHORT[sr_idx];
    let (first_band, region_start) = if granule.mixed_block { (3, 36) } else { (0, 0) };

    let mut scratch = *xr;
    let mut src = region_start;
    let mut line_base = region_start / 3;

    for band in first_band..13 {
        let width = widths[band];
        for win in 0..3 {
            for k in 0..width {
                let line = line_base + k;
                let target = (line / 6) * 18 + win * 6 + line % 6;
                if target < GRANULE_SAMPLES && src < GRANULE_SAMPLES {
                    scratch[target] = xr[src];
                }
                src += 1;
            }
        }
        line_base += width;
    }

    *xr = scratch;
}

/// Butterfly pass over long block subband boundaries; mixed blocks only
/// process the boundary inside their long region.
fn alias_reduction(granule: &Granule, xr: &mut [f32; GRANULE_SAMPLES]) {
    if granule.short_blocks() && !granule.mixed_block {
        return;
    }

    let max_sb = if granule.short_blocks() { 2 } else { SUBBANDS };

    for sb in 1..max_sb {
        let base = sb * 18;

        for (i, (&cs, &ca)) in CS.iter().zip(CA.iter()).enumerate() {
            let upper = base - 1 - i;
            let lower = base + i;

            let a = xr[upper];
            let b = xr[lower];
            xr[upper] = a * cs - b * ca;
            xr[lower] = b * cs + a * ca;
        }
    }
}

fn imdct_granule(
    granule: &Granule,
    xr: &[f32; GRANULE_SAMPLES],
    overlap: &mut [[f32; 18]; SUBBANDS],
    output: &mut [f32; GRANULE_SAMPLES],
) {
    let windows = imdct_windows();
    let short_win = short_window();

    for sb in 0..SUBBANDS {
        let chunk = &xr[sb * 18..(sb + 1) * 18];
        let mut raw = [0.0f32; 36];

        let is_short = granule.short_blocks() && (!granule.mixed_block || sb >= 2);

        if is_short {
            // Three 6-point transforms, windowed and overlapped inside the
            // 36-sample block: windows land at offsets 6, 12 and 18.
            for win in 0..3 {
                let mut w_out = [0.0f32; 12];
                imdct6(&chunk[win * 6..(win + 1) * 6], &mut w_out);

                for (i, value) in w_out.iter().enumerate() {
                    raw[6 + win * 6 + i] += value * short_win[i];
                }
            }
        } else {
            imdct18(chunk, &mut raw);

            let window = if granule.window_switching && !granule.short_blocks() {
                &windows[granule.block_type as usize]
            } else {
                &windows[0]
            };
            for (value, w) in raw.iter_mut().zip(window.iter()) {
                *value *= w;
            }
        }

        for i in 0..18 {
            output[sb * 18 + i] = raw[i] + overlap[sb][i];
            overlap[sb][i] = raw[18 + i];
        }
    }
}

fn imdct6(input: &[f32], output: &mut [f32; 12]) {
    for (i, value) in output.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (k, &x) in input.iter().enumerate() {
            let angle = PI / 12.0 * (2.0 * i as f32 + 7.0) * (2.0 * k as f32 + 1.0);
            sum += x * angle.cos();
        }
        *value = sum * (1.0 / 6.0);
    }
}

fn imdct18(input: &[f32], output: &mut [f32; 36]) {
    for (i, value) in output.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (k, &x) in input.iter().enumerate() {
            let angle = PI / 36.0 * (2.0 * i as f32 + 19.0) * (2.0 * k as f32 + 1.0);
            sum += x * angle.cos();
        }
        *value = sum * (1.0 / 18.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorder_groups_windows_per_subband() {
        let granule = Granule {
            window_switching: true,
            block_type: 2,
            ..Default::default()
        };

        // Mark each source sample with band * 100 + window.
        let mut xr = [0.0f32; GRANULE_SAMPLES];
        let widths = &SFB_WIDTH_SHORT[0];
        let mut src = 0;
        for (band, &width) in widths.iter().enumerate() {
            for win in 0..3 {
                for _ in 0..width {
                    xr[src] = (band * 100 + win) as f32;
                    src += 1;
                }
            }
        }

        reorder(&granule, 0, &mut xr);

        // Subband 0 holds lines 0..6 of each window: band 0 spans lines
        // 0..4 and band 1 lines 4..8 at 44.1 kHz.
        assert_eq!(xr[0], 0.0); // band 0, window 0
        assert_eq!(xr[6], 1.0); // band 0, window 1
        assert_eq!(xr[12], 2.0); // band 0, window 2
        assert_eq!(xr[4], 100.0); // band 1, window 0
    }

    #[test]
    fn alias_reduction_preserves_energy() {
        let granule = Granule::default();

        let mut xr = [0.0f32; GRANULE_SAMPLES];
        for (i, value) in xr.iter_mut().enumerate() {
            *value = ((i * 7 + 3) % 23) as f32 - 11.0;
        }

        let before: f32 = xr.iter().map(|v| v * v).sum();
        alias_reduction(&granule, &mut xr);
        let after: f32 = xr.iter().map(|v| v * v).sum();

        // Each butterfly is a rotation, so total energy is invariant.
        assert!((before - after).abs() / before < 1e-4);
    }

    #[test]
    fn ms_spectrum_reconstructs_channels() {
        let mut left = GranuleContext::new();
        let mut right = GranuleContext::new();

        // mid = (L+R)/sqrt2, side = (L-R)/sqrt2 for L=1, R=0.5.
        let sqrt2 = std::f32::consts::SQRT_2;
        left.xr[0] = 1.5 / sqrt2;
        right.xr[0] = 0.5 / sqrt2;

        ms_spectrum(&mut left, &mut right);

        assert!((left.xr[0] - 1.0).abs() < 1e-6);
        assert!((right.xr[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn requantize_global_gain_steps() {
        // A gain change of 4 shifts the spectrum by one power of two.
        let granule = Granule {
            global_gain: 210,
            ..Default::default()
        };
        let mut ctx = GranuleContext::new();
        ctx.is[0] = 1;

        requantize(&granule, 0, &mut ctx);
        let base = ctx.xr[0];
        assert!((base - 1.0).abs() < 1e-6);

        let louder = Granule {
            global_gain: 214,
            ..granule
        };
        requantize(&louder, 0, &mut ctx);
        assert!((ctx.xr[0] - 2.0 * base).abs() < 1e-6);
    }

    #[test]
    fn pow43_is_signed() {
        let table = pow43_table();
        assert_eq!(pow43(0, table), 0.0);
        assert!((pow43(2, table) - 2.5198421).abs() < 1e-4);
        assert!((pow43(-2, table) + 2.5198421).abs() < 1e-4);
    }
}
