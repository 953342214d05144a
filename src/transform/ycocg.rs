// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::{Error, Result};
use crate::image::Image;

/// Lossless reversible color rotation:
/// Y = ((R+B)/2 + G)/2, Co = R - B, Cg = G - (R+B)/2.
pub fn ycocg(image: &mut Image, inverse: bool) -> Result<bool> {
    if inverse {
        inv_ycocg(image)
    } else {
        fwd_ycocg(image)
    }
}

fn fwd_ycocg(image: &mut Image) -> Result<bool> {
    if image.nb_channels < 3 {
        return Ok(false);
    }
    let m = image.nb_meta_channels;
    let w = image.channel[m].w;
    let h = image.channel[m].h;
    if image.channel[m + 1].w < w
        || image.channel[m + 1].h < h
        || image.channel[m + 2].w < w
        || image.channel[m + 2].h < h
    {
        return Err(Error::InvalidChannelDimensions("YCoCg"));
    }
    for y in 0..h {
        for x in 0..w {
            let r = image.channel[m].row(y)[x];
            let g = image.channel[m + 1].row(y)[x];
            let b = image.channel[m + 2].row(y)[x];
            image.channel[m].row_mut(y)[x] = (((r + b) >> 1) + g) >> 1;
            image.channel[m + 1].row_mut(y)[x] = r - b;
            image.channel[m + 2].row_mut(y)[x] = g - ((r + b) >> 1);
        }
    }
    Ok(true)
}

fn inv_ycocg(image: &mut Image) -> Result<bool> {
    if image.nb_channels < 3 {
        return Err(Error::InvalidChannelDimensions("YCoCg"));
    }
    let m = image.nb_meta_channels;
    let w = image.channel[m].w;
    let h = image.channel[m].h;
    if image.channel[m + 1].w < w
        || image.channel[m + 1].h < h
        || image.channel[m + 2].w < w
        || image.channel[m + 2].h < h
    {
        return Err(Error::InvalidChannelDimensions("YCoCg"));
    }
    let maxval = image.maxval;
    for y in 0..h {
        for x in 0..w {
            let yy = image.channel[m].row(y)[x].clamp(0, maxval);
            let co = image.channel[m + 1].row(y)[x];
            let cg = image.channel[m + 2].row(y)[x];
            let g = (yy - ((-cg) >> 1)).clamp(0, maxval);
            let b = (yy + ((1 - cg) >> 1) - (co >> 1)).clamp(0, maxval);
            let r = (co + b).clamp(0, maxval);
            image.channel[m].row_mut(y)[x] = r;
            image.channel[m + 1].row_mut(y)[x] = g;
            image.channel[m + 2].row_mut(y)[x] = b;
        }
    }
    Ok(true)
}
