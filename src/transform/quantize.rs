// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::Result;
use crate::image::Image;
use crate::util::tracing_wrappers::*;

/// Divides every sample of a channel by its quantization factor. The
/// factors are not serialized with the transform: they travel as the
/// per-channel `q` in the group headers, so the inverse only needs the
/// channel metadata.
pub fn quantize(image: &mut Image, inverse: bool, parameters: &[i32]) -> Result<bool> {
    if inverse {
        inv_quantize(image)
    } else {
        fwd_quantize(image, parameters)
    }
}

fn inv_quantize(image: &mut Image) -> Result<bool> {
    for c in image.nb_meta_channels..image.channel.len() {
        let ch = &mut image.channel[c];
        if ch.data.is_empty() {
            continue;
        }
        let q = ch.q;
        if q == 1 {
            continue;
        }
        trace!("de-quantizing channel {} by {}", c, q);
        for v in &mut ch.data {
            *v *= q;
        }
        ch.minval *= q;
        ch.maxval *= q;
        ch.q = 1;
    }
    Ok(true)
}

fn fwd_quantize(image: &mut Image, parameters: &[i32]) -> Result<bool> {
    for c in image.nb_meta_channels..image.channel.len() {
        let ch = &mut image.channel[c];
        let q = parameters
            .get(c)
            .or(parameters.last())
            .copied()
            .unwrap_or(1)
            .max(1);
        for v in &mut ch.data {
            *v /= q;
        }
        ch.minval /= q;
        ch.maxval /= q;
        ch.q = q;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_then_dequantize_scales_back() {
        let mut image = Image::new(4, 1, 255, 1, 0);
        image.channel[0].row_mut(0).copy_from_slice(&[0, 9, 10, 255]);
        image.channel[0].maxval = 255;
        quantize(&mut image, false, &[10]).unwrap();
        assert_eq!(image.channel[0].row(0), &[0, 0, 1, 25]);
        assert_eq!(image.channel[0].q, 10);
        quantize(&mut image, true, &[]).unwrap();
        assert_eq!(image.channel[0].row(0), &[0, 0, 10, 250]);
        assert_eq!(image.channel[0].q, 1);
    }
}
