// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::Result;
use crate::transform::Transform;
use crate::util::tracing_wrappers::*;

/// One image sample. Signed and wide enough for squeeze residuals and DCT
/// coefficients of high-bit-depth input.
pub type Sample = i32;

/// Sentinel for "no value seen yet" when scanning for a maximum.
pub const SAMPLE_MAX: Sample = 0x7fff_ffff;
/// Sentinel for "no value seen yet" when scanning for a minimum.
pub const SAMPLE_MIN: Sample = -0x7fff_ffff;

/// Side length of a 1:2^n downscale relative to scale 1:32.
#[inline]
pub fn responsive_size(n: usize) -> usize {
    32 >> n
}

/// An aligned 2-D grid of samples plus the metadata the codec needs:
/// the actual value range, the quantization factor, the cumulative
/// downsampling shifts and the semantic component the channel belongs to.
#[derive(Debug, Clone)]
pub struct Channel {
    pub data: Vec<Sample>,
    pub w: usize,
    pub h: usize,
    pub minval: Sample,
    pub maxval: Sample,
    /// The in-range value closest to zero; used for off-grid reads and to
    /// initialize not-yet-decoded samples.
    pub zero: Sample,
    /// Quantization factor (1 = lossless).
    pub q: i32,
    pub hshift: i32,
    pub vshift: i32,
    /// Cumulative shifts: when decoding up to this channel, data for its
    /// component is available at these scales.
    pub hcshift: i32,
    pub vcshift: i32,
    pub component: i32,
}

impl Channel {
    pub fn new(w: usize, h: usize, minval: Sample, maxval: Sample) -> Channel {
        let mut ch = Channel {
            data: vec![0; w * h],
            w,
            h,
            minval,
            maxval,
            zero: 0,
            q: 1,
            hshift: 0,
            vshift: 0,
            hcshift: 0,
            vcshift: 0,
            component: -1,
        };
        ch.set_zero();
        ch
    }

    /// A channel with metadata only; `data` stays empty until `resize`.
    pub fn empty() -> Channel {
        Channel {
            data: Vec::new(),
            w: 0,
            h: 0,
            minval: 0,
            maxval: 0,
            zero: 0,
            q: 1,
            hshift: 0,
            vshift: 0,
            hcshift: 0,
            vcshift: 0,
            component: -1,
        }
    }

    /// Recomputes the off-grid fill value from the current range.
    pub fn set_zero(&mut self) {
        self.zero = if self.minval > 0 {
            self.minval
        } else if self.maxval < 0 {
            self.maxval
        } else {
            0
        };
    }

    /// Grows or shrinks the backing store to `w*h`, filling new samples
    /// with the `zero` value.
    pub fn resize(&mut self) {
        let total = self.w * self.h;
        self.data.resize(total, self.zero);
    }

    pub fn resize_to(&mut self, w: usize, h: usize) {
        self.w = w;
        self.h = h;
        self.resize();
    }

    /// Edge-tolerant read: anything outside the grid is `zero`, as is
    /// anything in a channel whose data was never produced (a truncated
    /// decode). Writes, in contrast, always go through `row_mut` and are
    /// bounds-checked.
    #[inline]
    pub fn value(&self, r: isize, c: isize) -> Sample {
        if r < 0 || c < 0 || r as usize >= self.h || c as usize >= self.w {
            return self.zero;
        }
        let idx = r as usize * self.w + c as usize;
        if idx >= self.data.len() {
            return self.zero;
        }
        self.data[idx]
    }

    /// Clamps the coordinates onto the grid before reading.
    #[inline]
    pub fn repeating_edge_value(&self, r: isize, c: isize) -> Sample {
        let r = r.clamp(0, self.h as isize - 1);
        let c = c.clamp(0, self.w as isize - 1);
        let idx = r as usize * self.w + c as usize;
        if idx >= self.data.len() {
            return self.zero;
        }
        self.data[idx]
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[Sample] {
        &self.data[y * self.w..(y + 1) * self.w]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [Sample] {
        let w = self.w;
        &mut self.data[y * w..(y + 1) * w]
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// The tight range actually present in the data. Empty channels report
    /// the inverted sentinel range.
    pub fn actual_minmax(&self) -> (Sample, Sample) {
        let mut min = SAMPLE_MAX;
        let mut max = SAMPLE_MIN;
        for &v in &self.data {
            min = min.min(v);
            max = max.max(v);
        }
        (min, max)
    }
}

/// An ordered sequence of channels plus the transform chain that produced
/// them. Meta channels (palettes, permutations, match offsets) sit at the
/// front of the list and are not image samples.
#[derive(Debug, Clone)]
pub struct Image {
    pub channel: Vec<Channel>,
    pub transform: Vec<Transform>,
    pub w: usize,
    pub h: usize,
    /// Multi-frame images are stored as a vertical filmstrip of height
    /// `nb_frames * frame_height`.
    pub nb_frames: usize,
    /// Frames per second (denominator of the frame duration).
    pub den: u32,
    /// Optional per-frame duration numerators.
    pub num: Vec<u32>,
    /// Animation loop count; 0 repeats forever.
    pub loops: u32,
    pub minval: Sample,
    pub maxval: Sample,
    /// Distinct channels after undoing every transform except palette.
    pub nb_channels: usize,
    /// Channels after undoing everything, palette included.
    pub real_nb_channels: usize,
    pub nb_meta_channels: usize,
    pub colormodel: u32,
    /// Index of the last channel of each responsive scan:
    /// LQIP, 1:16, 1:8, 1:4, 1:2, 1:1.
    pub downscales: [usize; 6],
}

impl Image {
    pub fn new(w: usize, h: usize, maxval: Sample, nb_chans: usize, colormodel: u32) -> Image {
        let mut channel = Vec::with_capacity(nb_chans);
        for i in 0..nb_chans {
            let mut ch = Channel::new(w, h, 0, maxval);
            ch.component = i as i32;
            channel.push(ch);
        }
        Image {
            channel,
            transform: Vec::new(),
            w,
            h,
            nb_frames: 1,
            den: 10,
            num: Vec::new(),
            loops: 0,
            minval: 0,
            maxval,
            nb_channels: nb_chans,
            real_nb_channels: nb_chans,
            nb_meta_channels: 0,
            colormodel,
            downscales: [nb_chans.saturating_sub(1); 6],
        }
    }

    /// Applies a transform in the forward direction and records it when the
    /// transform accepts the image (a palette, for example, declines when
    /// there are too many colors).
    pub fn do_transform(&mut self, t: Transform) -> Result<bool> {
        let mut t = t;
        let applied = t.apply(self, false)?;
        if applied {
            self.transform.push(t);
        }
        Ok(applied)
    }

    /// Undoes all but the first `keep` transforms. With `keep == 0` the
    /// samples are also clamped to the nominal image range, since lossy
    /// coding can leave values slightly outside it.
    pub fn undo_transforms(&mut self, keep: usize) -> Result<()> {
        while self.transform.len() > keep {
            let mut t = self.transform.pop().expect("transform list is non-empty");
            trace!("undoing transform {:?}", t.id);
            t.apply(self, true)?;
        }
        if keep == 0 {
            let (minval, maxval) = (self.minval, self.maxval);
            for ch in &mut self.channel {
                for v in &mut ch.data {
                    *v = (*v).clamp(minval, maxval);
                }
            }
        }
        Ok(())
    }

    pub fn recompute_minmax(&mut self) {
        for ch in &mut self.channel {
            let (min, max) = ch.actual_minmax();
            ch.minval = min;
            ch.maxval = max;
        }
    }

    /// Derives the responsive cut-points from the cumulative channel shifts.
    /// A scan boundary is the last channel for which all data so far fits
    /// the downscaled buffer.
    pub fn recompute_downscales(&mut self) {
        self.downscales[0] = self.nb_meta_channels + self.nb_channels - 1;
        for s in 1..6 {
            self.downscales[s] = self.channel.len() - 1;
            for k in self.downscales[s - 1]..self.channel.len() {
                let ch = &self.channel[k];
                let hc = 1i64 << ch.hcshift.max(0);
                let vc = 1i64 << ch.vcshift.max(0);
                if hc < responsive_size(s) as i64 || vc < responsive_size(s) as i64 {
                    break;
                }
                if hc == responsive_size(s) as i64 && vc == responsive_size(s) as i64 {
                    self.downscales[s] = k;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_reads_fall_back_to_zero() {
        let mut ch = Channel::new(3, 2, 5, 9);
        assert_eq!(ch.zero, 5);
        ch.row_mut(0).copy_from_slice(&[5, 6, 7]);
        ch.row_mut(1).copy_from_slice(&[8, 9, 5]);
        assert_eq!(ch.value(0, 0), 5);
        assert_eq!(ch.value(1, 2), 5);
        assert_eq!(ch.value(-1, 0), 5);
        assert_eq!(ch.value(0, -1), 5);
        assert_eq!(ch.value(2, 0), 5);
        assert_eq!(ch.value(0, 3), 5);
        assert_eq!(ch.repeating_edge_value(-3, 5), 7);
    }

    #[test]
    fn zero_tracks_the_range() {
        let mut ch = Channel::new(1, 1, -4, -2);
        assert_eq!(ch.zero, -2);
        ch.minval = 0;
        ch.maxval = 7;
        ch.set_zero();
        assert_eq!(ch.zero, 0);
    }

    #[test]
    fn actual_minmax_of_empty_channel_is_inverted() {
        let ch = Channel::empty();
        let (min, max) = ch.actual_minmax();
        assert!(min > max);
    }

    #[test]
    fn resize_fills_with_zero_value() {
        let mut ch = Channel::empty();
        ch.minval = 3;
        ch.maxval = 10;
        ch.set_zero();
        ch.resize_to(2, 2);
        assert_eq!(ch.data, vec![3; 4]);
    }
}
