// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! JPEG-style 8x8 float DCT. Each transformed channel is replaced by its
//! DC channel (in place, at 1/8 scale) plus 63 AC coefficient channels
//! appended to the channel list, ordered by a fixed scan script that
//! interleaves components one coefficient at a time.

use crate::error::{Error, Result};
use crate::image::{Channel, Image};
use crate::util::tracing_wrappers::*;

/// `DCT_MATRIX[8*u+x] = 0.5*alpha(u)*cos((2*x+1)*u*PI/16)`,
/// with `alpha(0) = 1/sqrt(2)` and `alpha(u) = 1` for u > 0.
#[rustfmt::skip]
const DCT_MATRIX: [f64; 64] = [
     0.3535533906,  0.3535533906,  0.3535533906,  0.3535533906,
     0.3535533906,  0.3535533906,  0.3535533906,  0.3535533906,
     0.4903926402,  0.4157348062,  0.2777851165,  0.0975451610,
    -0.0975451610, -0.2777851165, -0.4157348062, -0.4903926402,
     0.4619397663,  0.1913417162, -0.1913417162, -0.4619397663,
    -0.4619397663, -0.1913417162,  0.1913417162,  0.4619397663,
     0.4157348062, -0.0975451610, -0.4903926402, -0.2777851165,
     0.2777851165,  0.4903926402,  0.0975451610, -0.4157348062,
     0.3535533906, -0.3535533906, -0.3535533906,  0.3535533906,
     0.3535533906, -0.3535533906, -0.3535533906,  0.3535533906,
     0.2777851165, -0.4903926402,  0.0975451610,  0.4157348062,
    -0.4157348062, -0.0975451610,  0.4903926402, -0.2777851165,
     0.1913417162, -0.4619397663,  0.4619397663, -0.1913417162,
    -0.1913417162,  0.4619397663, -0.4619397663,  0.1913417162,
     0.0975451610, -0.2777851165,  0.4157348062, -0.4903926402,
     0.4903926402, -0.4157348062,  0.2777851165, -0.0975451610,
];

/// Maps raster position to scan position within a block. This is a
/// variant of the JPEG zigzag that keeps low frequencies together.
#[rustfmt::skip]
pub const JPEG_ZIGZAG: [usize; 64] = [
     0,  1,  4, 15, 16, 35, 36, 63,
     2,  3,  5, 14, 17, 34, 37, 62,
     8,  7,  6, 13, 18, 33, 38, 61,
     9, 10, 11, 12, 19, 32, 39, 60,
    24, 23, 22, 21, 20, 31, 40, 59,
    25, 26, 27, 28, 29, 30, 41, 58,
    48, 47, 46, 45, 44, 43, 42, 57,
    49, 50, 51, 52, 53, 54, 55, 56,
];

/// Cumulative-shift contribution per coefficient: the DC carries the 1:8
/// scale, the first few ACs are enough for 1:4 and 1:2 decodes.
#[rustfmt::skip]
pub const DCT_CSHIFTS: [i32; 64] = [
    3, 2, 2, 2, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1,
    0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0,
];

fn dct1d(input: &[f64], stride: usize, out: &mut [f64], inverse: bool) {
    for x in 0..8 {
        let mut acc = 0.0;
        for u in 0..8 {
            let m = if inverse {
                DCT_MATRIX[8 * u + x]
            } else {
                DCT_MATRIX[8 * x + u]
            };
            acc += m * input[u * stride];
        }
        out[x * stride] = acc;
    }
}

fn transform_block(block: &mut [f64; 64], inverse: bool) {
    let mut tmp = [0.0f64; 64];
    for x in 0..8 {
        dct1d(&block[x..], 8, &mut tmp[x..], inverse);
    }
    for y in 0..8 {
        dct1d(&tmp[8 * y..], 1, &mut block[8 * y..], inverse);
    }
}

/// The default scan script: one coefficient at a time, low to high
/// frequency, alternating between the components. `ordering[c][k]` is the
/// global scan position of coefficient `k` of component `c`; `comp[p]` and
/// `coeff[p]` invert that mapping.
pub fn default_scan_script(nb_components: usize) -> (Vec<Vec<usize>>, Vec<usize>, Vec<usize>) {
    let mut ordering = vec![vec![0usize; 64]; nb_components];
    let mut comp = Vec::with_capacity(nb_components * 64);
    let mut coeff = Vec::with_capacity(nb_components * 64);
    let mut pc = vec![0usize; nb_components];
    let mut cc = 0;
    for p in 0..nb_components * 64 {
        ordering[cc][pc[cc]] = p;
        comp.push(cc);
        coeff.push(pc[cc]);
        pc[cc] += 1;
        cc += 1;
        if cc == nb_components {
            cc = 0;
        }
    }
    (ordering, comp, coeff)
}

fn default_parameters(image: &Image) -> Vec<i32> {
    vec![0, image.nb_channels as i32 - 1]
}

pub fn meta_dct(image: &mut Image, parameters: &mut Vec<i32>) -> Result<()> {
    if parameters.is_empty() {
        *parameters = default_parameters(image);
    }
    if parameters.len() < 2 || parameters[0] < 0 || parameters[1] < parameters[0] {
        return Err(Error::InvalidTransformParameters("DCT"));
    }
    let beginc = image.nb_meta_channels + parameters[0] as usize;
    let endc = image.nb_meta_channels + parameters[1] as usize;
    if endc >= image.channel.len() {
        return Err(Error::InvalidChannelRange(endc, image.channel.len()));
    }
    let nb_channels = endc - beginc + 1;
    let (_, comp, coeff) = default_scan_script(nb_channels);
    for c in beginc..=endc {
        let ch = &mut image.channel[c];
        ch.w = (ch.w + 7) / 8;
        ch.h = (ch.h + 7) / 8;
        ch.hshift += 3;
        ch.vshift += 3;
        ch.hcshift += 3;
        ch.vcshift += 3;
    }
    for i in nb_channels..64 * nb_channels {
        let c = beginc + comp[i];
        let mut ac = Channel::empty();
        ac.w = image.channel[c].w;
        ac.h = image.channel[c].h;
        ac.hshift = image.channel[c].hshift;
        ac.vshift = image.channel[c].vshift;
        ac.hcshift = DCT_CSHIFTS[coeff[i]] + image.channel[c].hcshift - 3;
        ac.vcshift = DCT_CSHIFTS[coeff[i]] + image.channel[c].vcshift - 3;
        ac.component = image.channel[c].component;
        image.channel.push(ac);
    }
    Ok(())
}

pub fn dct(image: &mut Image, inverse: bool, parameters: &mut Vec<i32>) -> Result<bool> {
    if inverse {
        inv_dct(image, parameters)
    } else {
        fwd_dct(image, parameters)
    }
}

fn fwd_dct(image: &mut Image, parameters: &mut Vec<i32>) -> Result<bool> {
    let tmp = image.clone();
    let mut adj_params = parameters.clone();
    if adj_params.is_empty() {
        adj_params = default_parameters(image);
    }
    let beginc = image.nb_meta_channels + adj_params[0] as usize;
    let endc = image.nb_meta_channels + adj_params[1] as usize;
    let nb_channels = endc - beginc + 1;
    let offset = image.channel.len();
    meta_dct(image, &mut adj_params)?;
    debug!(
        "DCT on channels {}..{} with AC coefficients in channels {}..{}",
        beginc,
        endc,
        offset,
        offset + 63 * nb_channels - 1
    );

    let (ordering, _, _) = default_scan_script(nb_channels);
    let dc_offset = (image.maxval as f64 + 1.0) * 4.0;

    for c in beginc..offset + 63 * nb_channels {
        image.channel[c].resize();
    }
    for c in beginc..=endc {
        let bw = image.channel[c].w;
        let bh = image.channel[c].h;
        for by in 0..bh {
            for bx in 0..bw {
                let mut block = [0.0f64; 64];
                for (i, b) in block.iter_mut().enumerate() {
                    *b = tmp.channel[c]
                        .repeating_edge_value((by * 8 + (i >> 3)) as isize, (bx * 8 + (i & 7)) as isize)
                        as f64;
                }
                transform_block(&mut block, false);
                image.channel[c].row_mut(by)[bx] = (block[0].round() - dc_offset) as i32;
                for i in 1..64 {
                    let target = offset - nb_channels + ordering[c - beginc][JPEG_ZIGZAG[i]];
                    image.channel[target].row_mut(by)[bx] = block[i].round() as i32;
                }
            }
        }
    }
    Ok(true)
}

fn inv_dct(image: &mut Image, parameters: &mut Vec<i32>) -> Result<bool> {
    let mut adj_params = parameters.clone();
    if adj_params.is_empty() {
        adj_params = default_parameters(image);
    }
    let beginc = image.nb_meta_channels + adj_params[0] as usize;
    let endc = image.nb_meta_channels + adj_params[1] as usize;
    let nb_channels = endc - beginc + 1;
    let offset = image.channel.len() - 63 * nb_channels;
    if offset <= endc {
        return Err(Error::InvalidChannelDimensions("DCT"));
    }
    debug!(
        "undoing DCT on channels {}..{} (AC in channels {}..)",
        beginc, endc, offset
    );

    let (ordering, _, _) = default_scan_script(nb_channels);
    let dc_offset = (image.maxval as f64 + 1.0) * 4.0;

    for c in beginc..=endc {
        // take the block count from the first AC channel: a repeated DCT
        // may have shrunk the DC channel further
        let mut bw = image.channel[c - beginc + offset].w;
        let mut bh = image.channel[c - beginc + offset].h;
        bw = bw.min(image.channel[c].w);
        bh = bh.min(image.channel[c].h);

        let mut outch = Channel::new(bw * 8, bh * 8, 0, 0);
        outch.component = image.channel[c].component;
        outch.hshift = image.channel[c].hshift - 3;
        outch.vshift = image.channel[c].vshift - 3;
        outch.hcshift = image.channel[c].hcshift - 3;
        outch.vcshift = image.channel[c].vcshift - 3;
        for by in 0..bh {
            for bx in 0..bw {
                let mut block = [0.0f64; 64];
                block[0] = image.channel[c].value(by as isize, bx as isize) as f64 + dc_offset;
                for i in 1..64 {
                    let source = offset - nb_channels + ordering[c - beginc][JPEG_ZIGZAG[i]];
                    block[i] = image.channel[source].value(by as isize, bx as isize) as f64;
                }
                transform_block(&mut block, true);
                for y in 0..8 {
                    for x in 0..8 {
                        outch.row_mut(by * 8 + y)[bx * 8 + x] = block[y * 8 + x].round() as i32;
                    }
                }
            }
        }
        image.channel[c] = outch;
    }
    image
        .channel
        .drain(offset..offset + nb_channels * 63);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_is_a_permutation() {
        let mut seen = [false; 64];
        for &z in &JPEG_ZIGZAG {
            assert!(!seen[z]);
            seen[z] = true;
        }
    }

    #[test]
    fn scan_script_interleaves_components() {
        let (ordering, comp, coeff) = default_scan_script(3);
        assert_eq!(comp.len(), 192);
        // round robin: positions 0,1,2 are coefficient 0 of each component
        assert_eq!(&comp[0..6], &[0, 1, 2, 0, 1, 2]);
        assert_eq!(&coeff[0..6], &[0, 0, 0, 1, 1, 1]);
        for c in 0..3 {
            for k in 0..64 {
                let p = ordering[c][k];
                assert_eq!(comp[p], c);
                assert_eq!(coeff[p], k);
            }
        }
    }

    #[test]
    fn dct_of_a_constant_block_is_dc_only() {
        let mut block = [100.0f64; 64];
        transform_block(&mut block, false);
        assert!((block[0] - 800.0).abs() < 1e-4);
        for &ac in &block[1..] {
            assert!(ac.abs() < 1e-4);
        }
        transform_block(&mut block, true);
        for &v in &block {
            assert!((v - 100.0).abs() < 1e-4);
        }
    }

    #[test]
    fn forward_then_inverse_is_near_lossless() {
        let mut image = Image::new(16, 8, 255, 1, 0);
        for y in 0..8 {
            for x in 0..16 {
                image.channel[0].row_mut(y)[x] = ((x * 13 + y * 31) % 256) as i32;
            }
        }
        let original = image.channel[0].data.clone();
        let mut params = Vec::new();
        assert!(dct(&mut image, false, &mut params).unwrap());
        assert_eq!(image.channel.len(), 64);
        assert_eq!((image.channel[0].w, image.channel[0].h), (2, 1));
        assert!(dct(&mut image, true, &mut params).unwrap());
        assert_eq!(image.channel.len(), 1);
        for (a, b) in image.channel[0].data.iter().zip(original.iter()) {
            assert!((a - b).abs() <= 4, "rounding error too large: {a} vs {b}");
        }
    }
}
