// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Context properties and pixel predictors for the channel coder. The
//! property vector for a pixel consists of pairs derived from spatially
//! corresponding samples of previously decoded channels, followed by
//! thirteen properties of the causal neighborhood.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::entropy_coding::tree::Ranges;
use crate::image::{Channel, Sample, SAMPLE_MAX, SAMPLE_MIN};
use crate::util::{median3, slog};

/// Number of properties computed from the pixel's own neighborhood.
pub const NB_NONREF_PROPERTIES: usize = 13;

#[repr(u32)]
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    Zero = 0,
    Average = 1,
    Median = 2,
    West = 3,
    North = 4,
    AverageFour = 5,
    ClampedGradient = 6,
}

impl Predictor {
    pub const NB_PREDICTORS: u32 = 7;

    /// The wire format reserves three bits; anything unassigned behaves
    /// like the median predictor.
    pub fn from_bits(bits: u32) -> Predictor {
        Predictor::from_u32(bits).unwrap_or(Predictor::Median)
    }
}

#[inline]
fn prop_abs(x: Sample) -> Sample {
    x.abs()
}

/// Channels usable as reference sources: a real range and a real grid.
/// Palette and permutation meta channels advertise `hshift < 0` to opt out.
#[inline]
fn is_reference_channel(ch: &Channel) -> bool {
    ch.minval < ch.maxval && ch.hshift >= 0 && ch.w > 0 && ch.h > 0
}

/// Property bounds for a channel group, reference properties first.
pub fn init_properties(
    channels: &[Channel],
    beginc: usize,
    endc: usize,
    max_properties: usize,
) -> Ranges {
    let mut pr: Ranges = Vec::new();
    let mut offset = 0;
    for j in (0..beginc).rev() {
        if offset >= max_properties {
            break;
        }
        let ch = &channels[j];
        if !is_reference_channel(ch) {
            continue;
        }
        let minval = ch.minval.min(0);
        let maxval = ch.maxval.max(0);
        let big = if maxval > -minval { maxval } else { minval };
        pr.push((0, prop_abs(big)));
        offset += 1;
        pr.push((slog(minval), slog(maxval)));
        offset += 1;
    }

    let mut minval = SAMPLE_MAX;
    let mut maxval = SAMPLE_MIN;
    let mut maxh = 0usize;
    let mut maxw = 0usize;
    for ch in &channels[beginc..=endc] {
        minval = minval.min(ch.minval);
        maxval = maxval.max(ch.maxval);
        maxh = maxh.max(ch.h);
        maxw = maxw.max(ch.w);
    }
    minval = minval.min(0);
    maxval = maxval.max(0);

    // neighbors
    let absbound = prop_abs(minval).max(prop_abs(maxval));
    pr.push((0, absbound));
    pr.push((0, absbound));
    pr.push((slog(minval), slog(maxval)));
    pr.push((slog(minval), slog(maxval)));

    // location
    pr.push((0, maxh as i32 - 1));
    pr.push((0, maxw as i32 - 1));

    // local gradients
    pr.push((minval + minval - maxval, maxval + maxval - minval));
    pr.push((minval + minval - maxval, maxval + maxval - minval));

    // neighbor differences
    for _ in 0..5 {
        pr.push((slog(minval - maxval), slog(maxval - minval)));
    }

    pr
}

/// Per-row cache of the reference properties: for each column of the
/// current channel, `count` values from the previously decoded channels.
pub struct ReferenceRow {
    pub count: usize,
    values: Vec<i32>,
}

impl ReferenceRow {
    pub fn new(count: usize, width: usize) -> ReferenceRow {
        ReferenceRow {
            count,
            values: vec![0; count * width],
        }
    }

    #[inline]
    pub fn column(&self, x: usize) -> &[i32] {
        &self.values[x * self.count..(x + 1) * self.count]
    }

    #[inline]
    fn set(&mut self, x: usize, k: usize, v: i32) {
        self.values[x * self.count + k] = v;
    }
}

/// Fills the reference properties for row `y` of `ch`. `prior` holds the
/// channels decoded before the group began. A reference smaller than the
/// current channel is replicated stepwise, a larger one is sampled
/// nearest-neighbor; edges clamp.
pub fn precompute_references(
    ch: &Channel,
    y: usize,
    prior: &[Channel],
    max_properties: usize,
    refs: &mut ReferenceRow,
) {
    let mut offset = 0;
    let oy = (y as i64) << ch.vshift;
    for j in (0..prior.len()).rev() {
        if offset >= max_properties {
            break;
        }
        let rch = &prior[j];
        if !is_reference_channel(rch) {
            continue;
        }
        let mut ry = (oy >> rch.vshift) as usize;
        if ry >= rch.h {
            ry = rch.h - 1;
        }
        let rrow = rch.row(ry);

        if ch.hshift == rch.hshift && ch.w <= rch.w {
            for x in 0..ch.w {
                let v = rrow[x];
                refs.set(x, offset, prop_abs(v));
                refs.set(x, offset + 1, slog(v));
            }
        } else if ch.hshift < rch.hshift {
            let stepsize = (1usize << rch.hshift) >> ch.hshift;
            let mut x = 0;
            let mut rx = 0;
            'replicate: while rx + 1 < rch.w {
                let v = rrow[rx];
                for _ in 0..stepsize {
                    if x >= ch.w {
                        break 'replicate;
                    }
                    refs.set(x, offset, prop_abs(v));
                    refs.set(x, offset + 1, slog(v));
                    x += 1;
                }
                rx += 1;
            }
            if x < ch.w {
                let v = rrow[rx.min(rch.w - 1)];
                while x < ch.w {
                    refs.set(x, offset, prop_abs(v));
                    refs.set(x, offset + 1, slog(v));
                    x += 1;
                }
            }
        } else {
            for x in 0..ch.w {
                let ox = (x as i64) << ch.hshift;
                let mut rx = (ox >> rch.hshift) as usize;
                if rx >= rch.w {
                    rx = rch.w - 1;
                }
                let v = rrow[rx];
                refs.set(x, offset, prop_abs(v));
                refs.set(x, offset + 1, slog(v));
            }
        }

        offset += 2;
    }
}

/// Computes the thirteen local properties into `p[offset..]` and returns
/// the prediction for `(x, y)`.
pub fn predict_and_compute_properties(
    p: &mut [i32],
    ch: &Channel,
    x: usize,
    y: usize,
    predictor: Predictor,
    offset: usize,
) -> Sample {
    let row = ch.row(y);
    let left = if x > 0 { row[x - 1] } else { ch.zero };
    let top = if y > 0 { ch.row(y - 1)[x] } else { ch.zero };
    let topleft = if x > 0 && y > 0 {
        ch.row(y - 1)[x - 1]
    } else {
        left
    };
    let topright = if x + 1 < ch.w && y > 0 {
        ch.row(y - 1)[x + 1]
    } else {
        top
    };
    let leftleft = if x > 1 { row[x - 2] } else { left };
    let toptop = if y > 1 { ch.row(y - 2)[x] } else { top };

    let mut o = offset;
    // neighbors
    p[o] = prop_abs(top);
    p[o + 1] = prop_abs(left);
    p[o + 2] = slog(top);
    p[o + 3] = slog(left);
    // location
    p[o + 4] = y as i32;
    p[o + 5] = x as i32;
    // local gradients
    p[o + 6] = left + top - topleft;
    p[o + 7] = topleft + topright - top;
    o += 8;
    // neighbor differences
    p[o] = slog(left - topleft);
    p[o + 1] = slog(topleft - top);
    p[o + 2] = slog(top - topright);
    p[o + 3] = slog(top - toptop);
    p[o + 4] = slog(left - leftleft);

    match predictor {
        Predictor::Zero => ch.zero,
        Predictor::Average => (left + top) / 2,
        Predictor::Median => median3(left + top - topleft, left, top),
        Predictor::West => left,
        Predictor::North => top,
        Predictor::AverageFour => (left + topleft + top + topright) / 4,
        Predictor::ClampedGradient => (left + top - topleft).clamp(ch.minval, ch.maxval),
    }
}

/// Copies the cached reference columns into the property vector and
/// finishes with the local properties.
#[inline]
pub fn predict_with_references(
    p: &mut [i32],
    ch: &Channel,
    x: usize,
    y: usize,
    predictor: Predictor,
    refs: &ReferenceRow,
) -> Sample {
    p[..refs.count].copy_from_slice(refs.column(x));
    predict_and_compute_properties(p, ch, x, y, predictor, refs.count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_channel() -> Channel {
        let mut ch = Channel::new(4, 4, 0, 63);
        for y in 0..4 {
            for x in 0..4 {
                ch.row_mut(y)[x] = (16 * y + x) as i32;
            }
        }
        ch
    }

    #[test]
    fn predictors_match_their_definitions() {
        let ch = ramp_channel();
        let mut p = vec![0i32; NB_NONREF_PROPERTIES];
        // interior pixel (2,2): left=33, top=18, topleft=17, topright=19
        let g = predict_and_compute_properties(&mut p, &ch, 2, 2, Predictor::Median, 0);
        assert_eq!(g, median3(33 + 18 - 17, 33, 18));
        let g = predict_and_compute_properties(&mut p, &ch, 2, 2, Predictor::Average, 0);
        assert_eq!(g, (33 + 18) / 2);
        let g = predict_and_compute_properties(&mut p, &ch, 2, 2, Predictor::West, 0);
        assert_eq!(g, 33);
        let g = predict_and_compute_properties(&mut p, &ch, 2, 2, Predictor::North, 0);
        assert_eq!(g, 18);
        let g = predict_and_compute_properties(&mut p, &ch, 2, 2, Predictor::AverageFour, 0);
        assert_eq!(g, (33 + 17 + 18 + 19) / 4);
        let g = predict_and_compute_properties(&mut p, &ch, 2, 2, Predictor::Zero, 0);
        assert_eq!(g, 0);
        let g = predict_and_compute_properties(&mut p, &ch, 2, 2, Predictor::ClampedGradient, 0);
        assert_eq!(g, (33 + 18 - 17).clamp(0, 63));
    }

    #[test]
    fn local_properties_use_the_causal_neighborhood() {
        let ch = ramp_channel();
        let mut p = vec![0i32; NB_NONREF_PROPERTIES];
        predict_and_compute_properties(&mut p, &ch, 2, 2, Predictor::Zero, 0);
        let (left, top, topleft, topright, leftleft, toptop) = (33, 18, 17, 19, 32, 2);
        assert_eq!(p[0], top);
        assert_eq!(p[1], left);
        assert_eq!(p[2], slog(top));
        assert_eq!(p[3], slog(left));
        assert_eq!(p[4], 2);
        assert_eq!(p[5], 2);
        assert_eq!(p[6], left + top - topleft);
        assert_eq!(p[7], topleft + topright - top);
        assert_eq!(p[8], slog(left - topleft));
        assert_eq!(p[9], slog(topleft - top));
        assert_eq!(p[10], slog(top - topright));
        assert_eq!(p[11], slog(top - toptop));
        assert_eq!(p[12], slog(left - leftleft));
    }

    #[test]
    fn corner_pixel_falls_back_to_zero_neighbors() {
        let ch = ramp_channel();
        let mut p = vec![0i32; NB_NONREF_PROPERTIES];
        let g = predict_and_compute_properties(&mut p, &ch, 0, 0, Predictor::Median, 0);
        // everything missing: left = top = topleft = zero
        assert_eq!(g, 0);
        assert_eq!(p[0], 0);
        assert_eq!(p[6], 0);
    }

    #[test]
    fn reference_rows_replicate_smaller_channels() {
        // reference at hshift 1, current channel at hshift 0
        let mut rch = Channel::new(2, 1, 0, 10);
        rch.hshift = 1;
        rch.row_mut(0).copy_from_slice(&[3, -7]);
        let ch = Channel::new(4, 1, 0, 10);
        let prior = vec![rch];
        let mut refs = ReferenceRow::new(2, 4);
        precompute_references(&ch, 0, &prior, 12, &mut refs);
        assert_eq!(refs.column(0), &[3, slog(3)]);
        assert_eq!(refs.column(1), &[3, slog(3)]);
        // the last reference column fills the remainder
        assert_eq!(refs.column(2), &[7, slog(-7)]);
        assert_eq!(refs.column(3), &[7, slog(-7)]);
    }

    #[test]
    fn reference_ranges_precede_local_ranges() {
        let mut prior = Channel::new(4, 4, -3, 12);
        prior.component = 0;
        let mut cur = Channel::new(4, 4, 0, 63);
        cur.component = 1;
        let channels = vec![prior, cur];
        let pr = init_properties(&channels, 1, 1, 12);
        assert_eq!(pr.len(), 2 + NB_NONREF_PROPERTIES);
        assert_eq!(pr[0], (0, 12));
        assert_eq!(pr[1], (slog(-3), slog(12)));
        // neighbor magnitude bound for the group channel
        assert_eq!(pr[2], (0, 63));
        // location bounds
        assert_eq!(pr[6], (0, 3));
        assert_eq!(pr[7], (0, 3));
    }
}
