// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::{Error, Result};
use crate::image::{Image, Sample};

/// BT.601 RGB to YCbCr with `half = (maxval+1)/2`. Lossy: samples are
/// truncated on the forward direction and rounded on the inverse.
pub fn ycbcr(image: &mut Image, inverse: bool) -> Result<bool> {
    let nb_channels = image.channel.len();
    if nb_channels < 3 {
        return Err(Error::InvalidChannelDimensions("YCbCr"));
    }
    let w = image.channel[0].w;
    let h = image.channel[0].h;
    if image.channel[1].w < w
        || image.channel[1].h < h
        || image.channel[2].w < w
        || image.channel[2].h < h
    {
        return Err(Error::InvalidChannelDimensions("YCbCr"));
    }
    let half = ((image.maxval + 1) / 2) as f32;
    let minval = image.minval;
    let maxval = image.maxval;
    let clamp = |v: f32| -> Sample { (v as Sample).clamp(minval, maxval) };

    for y in 0..h {
        for x in 0..w {
            if inverse {
                let yy = image.channel[0].row(y)[x] as f32;
                let cb = image.channel[1].row(y)[x] as f32 - half;
                let cr = image.channel[2].row(y)[x] as f32 - half;
                image.channel[0].row_mut(y)[x] = clamp(yy + 1.402 * cr + 0.5);
                image.channel[1].row_mut(y)[x] = clamp(yy - 0.344136 * cb - 0.714136 * cr + 0.5);
                image.channel[2].row_mut(y)[x] = clamp(yy + 1.772 * cb + 0.5);
            } else {
                let r = image.channel[0].row(y)[x] as f32;
                let g = image.channel[1].row(y)[x] as f32;
                let b = image.channel[2].row(y)[x] as f32;
                image.channel[0].row_mut(y)[x] = clamp(0.299 * r + 0.587 * g + 0.114 * b);
                image.channel[1].row_mut(y)[x] = clamp(half - 0.168736 * r - 0.331264 * g + 0.5 * b);
                image.channel[2].row_mut(y)[x] = clamp(half + 0.5 * r - 0.418688 * g - 0.081312 * b);
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_pixels_keep_their_luma() {
        let mut image = Image::new(2, 1, 255, 3, 0);
        for c in 0..3 {
            image.channel[c].row_mut(0).copy_from_slice(&[128, 37]);
        }
        ycbcr(&mut image, false).unwrap();
        // Gray input: luma close to the input, chroma at the midpoint.
        assert!((image.channel[0].row(0)[0] - 128).abs() <= 1);
        assert!((image.channel[1].row(0)[0] - 128).abs() <= 1);
        assert!((image.channel[2].row(0)[0] - 128).abs() <= 1);
        ycbcr(&mut image, true).unwrap();
        // Round trip of a gray value stays within a small tolerance.
        for c in 0..3 {
            assert!((image.channel[c].row(0)[0] - 128).abs() <= 1);
            assert!((image.channel[c].row(0)[1] - 37).abs() <= 1);
        }
    }
}
