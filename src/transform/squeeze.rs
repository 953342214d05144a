// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Haar-style lifting that halves the resolution in one direction:
//!
//! ```text
//! A B  ->  (A+B+(A>B))>>1    same range as the original channel
//!          A-B - tendency    residual, in a new channel
//! ```
//!
//! The tendency term estimates the in-pair difference from the smooth
//! gradient through the neighboring averages, so a zero residual
//! reconstructs a smooth ramp instead of a staircase. Repeated application
//! with alternating directions yields the responsive downscales.

use crate::MAX_FIRST_PREVIEW_SIZE;
use crate::error::{Error, Result};
use crate::image::{Channel, Image, Sample};
use crate::util::tracing_wrappers::*;

/// Estimates `C - D` of the hidden pair from the three averages
/// `B = avg(prev pair)`, `a = avg(this pair)`, `n = avg(next pair)`,
/// returning 0 unless the averages are monotone, and clamping so the
/// reconstructed pair stays between its neighbors.
pub fn smooth_tendency(b: Sample, a: Sample, n: Sample) -> Sample {
    let mut diff = 0;
    if b >= a && a >= n {
        diff = (4 * b - 3 * n - a + 6) / 12;
        // 2C = a<<1 + diff - diff&1 <= 2b  so  diff - diff&1 <= 2b - 2a
        // 2D = a<<1 - diff - diff&1 >= 2n  so  diff + diff&1 <= 2a - 2n
        if diff - (diff & 1) > 2 * (b - a) {
            diff = 2 * (b - a) + 1;
        }
        if diff + (diff & 1) > 2 * (a - n) {
            diff = 2 * (a - n);
        }
    } else if b <= a && a <= n {
        diff = (4 * b - 3 * n - a - 6) / 12;
        if diff + (diff & 1) < 2 * (b - a) {
            diff = 2 * (b - a) - 1;
        }
        if diff - (diff & 1) < 2 * (a - n) {
            diff = 2 * (a - n);
        }
    }
    diff
}

#[inline]
fn pair_avg(a: Sample, b: Sample) -> Sample {
    (a + b + (a > b) as Sample) >> 1
}

#[inline]
fn reconstruct_pair(avg: Sample, diff: Sample) -> (Sample, Sample) {
    let a = ((avg << 1) + diff + if diff > 0 { -(diff & 1) } else { diff & 1 }) >> 1;
    (a, a - diff)
}

fn fwd_hsqueeze(image: &mut Image, c: usize, rc: usize) {
    let chin = &image.channel[c];
    trace!("horizontal squeeze of channel {} to new channel {}", c, rc);

    let mut chout = Channel::new((chin.w + 1) / 2, chin.h, chin.minval, chin.maxval);
    chout.q = chin.q;
    chout.hshift = chin.hshift + 1;
    chout.vshift = chin.vshift;
    chout.hcshift = chin.hcshift + 1;
    chout.vcshift = chin.vcshift;
    chout.component = chin.component;
    let mut chout_residual = Channel::new(
        chin.w - chout.w,
        chout.h,
        chout.minval - chout.maxval,
        chout.maxval - chout.minval,
    );
    chout_residual.hshift = chin.hshift + 1;
    chout_residual.vshift = chin.vshift;
    chout_residual.hcshift = chin.hcshift;
    chout_residual.vcshift = chin.vcshift;
    chout_residual.component = chin.component;

    for y in 0..chout.h {
        let irow = chin.row(y);
        for x in 0..chout_residual.w {
            let a = irow[x * 2];
            let b = irow[x * 2 + 1];
            let avg = pair_avg(a, b);
            chout.row_mut(y)[x] = avg;
            let diff = a - b;
            let next_avg = if x + 1 < chout_residual.w {
                pair_avg(irow[x * 2 + 2], irow[x * 2 + 3])
            } else if chin.w & 1 == 1 {
                irow[x * 2 + 2]
            } else {
                avg
            };
            let left = if x > 0 { irow[x * 2 - 1] } else { avg };
            let tendency = smooth_tendency(left, avg, next_avg);
            chout_residual.row_mut(y)[x] = diff - tendency;
        }
        if chin.w & 1 == 1 {
            let x = chout.w - 1;
            chout.row_mut(y)[x] = irow[x * 2];
        }
    }
    image.channel[c] = chout;
    image.channel.insert(rc, chout_residual);
}

fn inv_hsqueeze(image: &mut Image, c: usize, rc: usize) {
    let chin = &image.channel[c];
    let chin_residual = &image.channel[rc];
    let mut chout = Channel::new(chin.w + chin_residual.w, chin.h, chin.minval, chin.maxval);
    chout.q = chin.q;
    chout.hshift = chin.hshift - 1;
    chout.vshift = chin.vshift;
    chout.hcshift = chin.hcshift - 1;
    chout.vcshift = chin.vcshift;
    chout.component = chin.component;
    trace!(
        "undoing horizontal squeeze of channel {} (width {} to {})",
        c, chin.w, chout.w
    );

    if chin_residual.w == 0 {
        // the row consisted of a single sample, passed through unchanged
        for y in 0..chin.h {
            chout.row_mut(y)[0] = chin.row(y)[0];
        }
        image.channel[c] = chout;
        return;
    }

    let out_w = chout.w;
    for y in 0..chin.h {
        let avg_row = chin.row(y);
        let res_row = chin_residual.row(y);
        let out = chout.row_mut(y);
        let mut prev_b = 0;
        for x in 0..chin_residual.w {
            let avg = avg_row[x];
            let next_avg = if x + 1 < chin.w { avg_row[x + 1] } else { avg };
            let left = if x > 0 { prev_b } else { avg };
            let tendency = smooth_tendency(left, avg, next_avg);
            let diff = res_row[x] + tendency;
            let (a, b) = reconstruct_pair(avg, diff);
            out[x * 2] = a;
            out[x * 2 + 1] = b;
            prev_b = b;
        }
        if out_w & 1 == 1 {
            out[out_w - 1] = avg_row[chin.w - 1];
        }
    }
    image.channel[c] = chout;
}

fn fwd_vsqueeze(image: &mut Image, c: usize, rc: usize) {
    let chin = &image.channel[c];
    trace!("vertical squeeze of channel {} to new channel {}", c, rc);

    let mut chout = Channel::new(chin.w, (chin.h + 1) / 2, chin.minval, chin.maxval);
    chout.q = chin.q;
    chout.hshift = chin.hshift;
    chout.vshift = chin.vshift + 1;
    chout.hcshift = chin.hcshift;
    chout.vcshift = chin.vcshift + 1;
    chout.component = chin.component;
    let mut chout_residual = Channel::new(
        chin.w,
        chin.h - chout.h,
        chout.minval - chout.maxval,
        chout.maxval - chout.minval,
    );
    chout_residual.hshift = chin.hshift;
    chout_residual.vshift = chin.vshift + 1;
    chout_residual.hcshift = chin.hcshift;
    chout_residual.vcshift = chin.vcshift;
    chout_residual.component = chin.component;

    for y in 0..chout_residual.h {
        for x in 0..chout.w {
            let a = chin.row(y * 2)[x];
            let b = chin.row(y * 2 + 1)[x];
            let avg = pair_avg(a, b);
            chout.row_mut(y)[x] = avg;
            let diff = a - b;
            let next_avg = if y + 1 < chout_residual.h {
                pair_avg(chin.row(y * 2 + 2)[x], chin.row(y * 2 + 3)[x])
            } else if chin.h & 1 == 1 {
                chin.row(y * 2 + 2)[x]
            } else {
                avg
            };
            let top = if y > 0 { chin.row(y * 2 - 1)[x] } else { avg };
            let tendency = smooth_tendency(top, avg, next_avg);
            chout_residual.row_mut(y)[x] = diff - tendency;
        }
    }
    if chin.h & 1 == 1 {
        let y = chout.h - 1;
        for x in 0..chout.w {
            chout.row_mut(y)[x] = chin.row(y * 2)[x];
        }
    }
    image.channel[c] = chout;
    image.channel.insert(rc, chout_residual);
}

fn inv_vsqueeze(image: &mut Image, c: usize, rc: usize) {
    let chin = &image.channel[c];
    let chin_residual = &image.channel[rc];
    let mut chout = Channel::new(chin.w, chin.h + chin_residual.h, chin.minval, chin.maxval);
    chout.q = chin.q;
    chout.hshift = chin.hshift;
    chout.vshift = chin.vshift - 1;
    chout.hcshift = chin.hcshift;
    chout.vcshift = chin.vcshift - 1;
    chout.component = chin.component;
    trace!(
        "undoing vertical squeeze of channel {} (height {} to {})",
        c, chin.h, chout.h
    );

    if chin_residual.h == 0 {
        // a single row, passed through unchanged
        if chout.h > 0 {
            chout.data.copy_from_slice(chin.row(0));
        }
        image.channel[c] = chout;
        return;
    }

    for y in 0..chin_residual.h {
        for x in 0..chin.w {
            let avg = chin.row(y)[x];
            let next_avg = if y + 1 < chin.h {
                chin.row(y + 1)[x]
            } else {
                avg
            };
            let top = if y > 0 { chout.row(y * 2 - 1)[x] } else { avg };
            let tendency = smooth_tendency(top, avg, next_avg);
            let diff = chin_residual.row(y)[x] + tendency;
            let (a, b) = reconstruct_pair(avg, diff);
            chout.row_mut(y * 2)[x] = a;
            chout.row_mut(y * 2 + 1)[x] = b;
        }
    }
    if chout.h & 1 == 1 {
        let y = chin.h - 1;
        for x in 0..chin.w {
            let avg = chin.row(y)[x];
            chout.row_mut(y * 2)[x] = avg;
        }
    }
    image.channel[c] = chout;
}

/// The default squeeze order: one horizontal+vertical chroma squeeze first
/// (for 4:2:0-style previews), then alternating squeezes of all channels
/// until both dimensions fit the first preview scan. This deterministic
/// schedule defines the LQIP truncation point.
pub fn default_squeeze_parameters(image: &Image) -> Vec<i32> {
    let nb_channels = image.nb_channels as i32;
    let m = image.nb_meta_channels;
    let mut w = image.channel[m].w;
    let mut h = image.channel[m].h;
    let mut parameters = Vec::new();
    trace!("default squeeze parameters for {}x{} image", w, h);

    let wide = w > h;
    if nb_channels > 2 && image.channel[m + 1].w == w && image.channel[m + 1].h == h {
        // assume channels 1 and 2 are chroma; squeeze them first
        parameters.extend_from_slice(&[1 + 2, m as i32 + 1, m as i32 + 2]);
        parameters.extend_from_slice(&[2, m as i32 + 1, m as i32 + 2]);
    }

    if !wide && h > MAX_FIRST_PREVIEW_SIZE {
        parameters.extend_from_slice(&[0, m as i32, m as i32 + nb_channels - 1]);
        h = (h + 1) / 2;
    }
    while w > MAX_FIRST_PREVIEW_SIZE || h > MAX_FIRST_PREVIEW_SIZE {
        if w > MAX_FIRST_PREVIEW_SIZE {
            parameters.extend_from_slice(&[1, m as i32, m as i32 + nb_channels - 1]);
            w = (w + 1) / 2;
        }
        if h > MAX_FIRST_PREVIEW_SIZE {
            parameters.extend_from_slice(&[0, m as i32, m as i32 + nb_channels - 1]);
            h = (h + 1) / 2;
        }
    }
    parameters
}

struct SqueezeStep {
    horizontal: bool,
    in_place: bool,
    beginc: usize,
    endc: usize,
}

fn parse_steps(image: &Image, parameters: &[i32]) -> Result<Vec<SqueezeStep>> {
    let mut steps = Vec::new();
    let mut i = 0;
    while i + 2 < parameters.len() {
        let beginc = parameters[i + 1];
        let endc = parameters[i + 2];
        if beginc < 0 || endc < beginc || endc as usize >= image.channel.len() {
            return Err(Error::InvalidChannelRange(
                endc.max(0) as usize,
                image.channel.len(),
            ));
        }
        steps.push(SqueezeStep {
            horizontal: parameters[i] & 1 != 0,
            in_place: parameters[i] & 2 == 0,
            beginc: beginc as usize,
            endc: endc as usize,
        });
        i += 3;
    }
    Ok(steps)
}

/// Adjusts channel shapes and inserts the (empty) residual channels the
/// way the forward squeeze will. Defaulted parameters are frozen here so
/// the inverse sees the pre-squeeze geometry.
pub fn meta_squeeze(image: &mut Image, parameters: &mut Vec<i32>) -> Result<()> {
    if parameters.is_empty() {
        *parameters = default_squeeze_parameters(image);
    }
    let steps = parse_steps(image, parameters)?;
    for step in &steps {
        let offset = if step.in_place {
            step.endc + 1
        } else {
            image.nb_meta_channels + image.nb_channels
        };
        for c in step.beginc..=step.endc {
            let mut residual = Channel::empty();
            residual.hcshift = image.channel[c].hcshift;
            residual.vcshift = image.channel[c].vcshift;
            residual.component = image.channel[c].component;
            if step.horizontal {
                let w = image.channel[c].w;
                image.channel[c].w = (w + 1) / 2;
                image.channel[c].hshift += 1;
                image.channel[c].hcshift += 1;
                residual.w = w - (w + 1) / 2;
                residual.h = image.channel[c].h;
            } else {
                let h = image.channel[c].h;
                image.channel[c].h = (h + 1) / 2;
                image.channel[c].vshift += 1;
                image.channel[c].vcshift += 1;
                residual.h = h - (h + 1) / 2;
                residual.w = image.channel[c].w;
            }
            residual.hshift = image.channel[c].hshift;
            residual.vshift = image.channel[c].vshift;
            image.channel.insert(offset + c - step.beginc, residual);
        }
    }
    Ok(())
}

pub fn squeeze(image: &mut Image, inverse: bool, parameters: &[i32]) -> Result<bool> {
    let params: Vec<i32> = if parameters.is_empty() {
        default_squeeze_parameters(image)
    } else {
        parameters.to_vec()
    };
    let steps = parse_steps(image, &params)?;

    if inverse {
        for step in steps.iter().rev() {
            let offset = if step.in_place {
                step.endc + 1
            } else {
                image.nb_meta_channels + image.nb_channels
            };
            for c in step.beginc..=step.endc {
                let rc = offset + c - step.beginc;
                if rc >= image.channel.len() {
                    return Err(Error::InvalidChannelRange(rc, image.channel.len()));
                }
                if image.channel[rc].data.is_empty() {
                    // truncated decode: a missing residual unsqueezes as all
                    // zeros, which interpolates smoothly
                    image.channel[rc].resize();
                }
                if image.channel[c].data.is_empty() {
                    image.channel[c].resize();
                }
                if step.horizontal {
                    inv_hsqueeze(image, c, rc);
                } else {
                    inv_vsqueeze(image, c, rc);
                }
            }
            image
                .channel
                .drain(offset..offset + (step.endc - step.beginc + 1));
        }
    } else {
        for step in &steps {
            let offset = if step.in_place {
                step.endc + 1
            } else {
                image.nb_meta_channels + image.nb_channels
            };
            for c in step.beginc..=step.endc {
                if step.horizontal {
                    fwd_hsqueeze(image, c, offset + c - step.beginc);
                } else {
                    fwd_vsqueeze(image, c, offset + c - step.beginc);
                }
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tendency_is_zero_off_monotone_triples() {
        assert_eq!(smooth_tendency(1, 5, 2), 0);
        assert_eq!(smooth_tendency(5, 1, 4), 0);
        assert_ne!(smooth_tendency(10, 6, 2), 0);
    }

    #[test]
    fn tendency_is_bounded_by_the_neighbor_gaps() {
        for b in -20..=20 {
            for a in -20..=20 {
                for n in -20..=20 {
                    let d = smooth_tendency(b, a, n);
                    let bound = (2 * (b - a).abs() + 1).max(2 * (a - n).abs());
                    assert!(
                        d.abs() <= bound,
                        "tendency {d} out of bound for ({b},{a},{n})"
                    );
                }
            }
        }
    }

    fn squeeze_roundtrip(w: usize, h: usize, horizontal: bool) {
        let mut image = Image::new(w, h, 255, 1, 0);
        for y in 0..h {
            for x in 0..w {
                image.channel[0].row_mut(y)[x] = ((x * 31 + y * 17) % 256) as i32;
            }
        }
        let original = image.channel[0].data.clone();
        let step = if horizontal { 1 } else { 0 };
        let params = vec![step, 0, 0];
        squeeze(&mut image, false, &params).unwrap();
        assert_eq!(image.channel.len(), 2);
        if horizontal {
            assert_eq!(image.channel[0].w, (w + 1) / 2);
            assert_eq!(image.channel[1].w, w / 2);
        } else {
            assert_eq!(image.channel[0].h, (h + 1) / 2);
            assert_eq!(image.channel[1].h, h / 2);
        }
        squeeze(&mut image, true, &params).unwrap();
        assert_eq!(image.channel.len(), 1);
        assert_eq!(image.channel[0].data, original);
    }

    #[test]
    fn horizontal_round_trip_even_and_odd() {
        squeeze_roundtrip(8, 4, true);
        squeeze_roundtrip(7, 4, true);
        squeeze_roundtrip(1, 4, true);
        squeeze_roundtrip(2, 1, true);
    }

    #[test]
    fn vertical_round_trip_even_and_odd() {
        squeeze_roundtrip(4, 8, false);
        squeeze_roundtrip(4, 7, false);
        squeeze_roundtrip(4, 1, false);
        squeeze_roundtrip(1, 2, false);
    }

    #[test]
    fn default_parameters_reach_the_preview_size() {
        let image = Image::new(100, 60, 255, 3, 0);
        let params = default_squeeze_parameters(&image);
        assert_eq!(params.len() % 3, 0);
        // chroma squeezes first
        assert_eq!(&params[0..3], &[3, 1, 2]);
        assert_eq!(&params[3..6], &[2, 1, 2]);
        let (mut w, mut h) = (100usize, 60usize);
        for chunk in params[6..].chunks(3) {
            if chunk[0] & 1 == 1 {
                w = (w + 1) / 2;
            } else {
                h = (h + 1) / 2;
            }
        }
        assert!(w <= MAX_FIRST_PREVIEW_SIZE && h <= MAX_FIRST_PREVIEW_SIZE);
    }

    #[test]
    fn meta_squeeze_matches_forward_geometry() {
        let mut meta_img = Image::new(9, 5, 255, 1, 0);
        let mut real_img = meta_img.clone();
        let mut params = vec![1, 0, 0];
        meta_squeeze(&mut meta_img, &mut params).unwrap();
        squeeze(&mut real_img, false, &params).unwrap();
        assert_eq!(meta_img.channel.len(), real_img.channel.len());
        for (a, b) in meta_img.channel.iter().zip(real_img.channel.iter()) {
            assert_eq!((a.w, a.h), (b.w, b.h));
            assert_eq!((a.hshift, a.vshift), (b.hshift, b.vshift));
            assert_eq!((a.hcshift, a.vcshift), (b.hcshift, b.vcshift));
        }
    }
}
