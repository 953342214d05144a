// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::image::{Channel, Image};
use crate::util::tracing_wrappers::*;

/// Replaces channels `[beginc..=endc]` by one index channel plus a
/// meta-channel holding the palette rows. Parameters are
/// `[beginc, endc, max_colors]`; the forward transform declines when the
/// image has more colors than the budget, and shrinks the third parameter
/// to the actual color count when it succeeds.
pub fn palette(image: &mut Image, inverse: bool, parameters: &mut Vec<i32>) -> Result<bool> {
    if inverse {
        inv_palette(image, parameters)
    } else {
        fwd_palette(image, parameters)
    }
}

fn check_parameters(image: &Image, parameters: &[i32]) -> Result<(usize, usize)> {
    if parameters.len() != 3 || parameters[0] < 0 || parameters[1] < parameters[0] {
        return Err(Error::InvalidTransformParameters("Palette"));
    }
    let begin_c = image.nb_meta_channels + parameters[0] as usize;
    let end_c = image.nb_meta_channels + parameters[1] as usize;
    if end_c >= image.channel.len() {
        return Err(Error::InvalidChannelRange(end_c, image.channel.len()));
    }
    Ok((begin_c, end_c))
}

fn fwd_palette(image: &mut Image, parameters: &mut Vec<i32>) -> Result<bool> {
    let (begin_c, end_c) = check_parameters(image, parameters)?;
    let max_colors = parameters[2];
    let nb = end_c - begin_c + 1;
    let w = image.channel[begin_c].w;
    let h = image.channel[begin_c].h;

    let mut candidate_palette: BTreeSet<Vec<i32>> = BTreeSet::new();
    let mut color = vec![0i32; nb];
    for y in 0..h {
        for x in 0..w {
            for c in 0..nb {
                color[c] = image.channel[begin_c + c].row(y)[x];
            }
            candidate_palette.insert(color.clone());
            if candidate_palette.len() as i32 > max_colors {
                return Ok(false); // too many colors
            }
        }
    }
    let nb_colors = candidate_palette.len();
    parameters[2] = nb_colors as i32;
    debug!(
        "channels {}-{} can use a {}-color palette",
        begin_c, end_c, nb_colors
    );

    let sorted: Vec<Vec<i32>> = candidate_palette.into_iter().collect();
    let mut pch = Channel::new(nb_colors, nb, 0, 1);
    pch.hshift = -1;
    for (x, pcol) in sorted.iter().enumerate() {
        for (i, &v) in pcol.iter().enumerate() {
            pch.row_mut(i)[x] = v;
        }
    }
    for y in 0..h {
        for x in 0..w {
            for c in 0..nb {
                color[c] = image.channel[begin_c + c].row(y)[x];
            }
            let index = sorted
                .binary_search(&color)
                .expect("every pixel color is in the palette");
            image.channel[begin_c].row_mut(y)[x] = index as i32;
        }
    }
    image.nb_meta_channels += 1;
    image.nb_channels -= nb - 1;
    image.channel.drain(begin_c + 1..end_c + 1);
    image.channel.insert(0, pch);
    Ok(true)
}

pub fn meta_palette(image: &mut Image, parameters: &[i32]) -> Result<()> {
    let (begin_c, end_c) = check_parameters(image, parameters)?;
    let nb = end_c - begin_c + 1;
    if parameters[2] > (1 << 20) {
        return Err(Error::InvalidTransformParameters("Palette"));
    }
    let nb_colors = parameters[2].max(0) as usize;
    image.nb_meta_channels += 1;
    image.nb_channels -= nb - 1;
    image.channel.drain(begin_c + 1..end_c + 1);
    let mut pch = Channel::new(nb_colors, nb, 0, 1);
    pch.hshift = -1;
    image.channel.insert(0, pch);
    Ok(())
}

fn inv_palette(image: &mut Image, parameters: &[i32]) -> Result<bool> {
    if image.nb_meta_channels < 1 {
        return Err(Error::InvalidTransformParameters("Palette"));
    }
    if parameters.len() != 3 {
        return Err(Error::InvalidTransformParameters("Palette"));
    }
    let nb = image.channel[0].h;
    let c0 = image.nb_meta_channels + parameters[0] as usize;
    if c0 >= image.channel.len() {
        return Err(Error::InvalidChannelRange(c0, image.channel.len()));
    }
    let w = image.channel[c0].w;
    let h = image.channel[c0].h;
    if image.channel[c0].data.is_empty() {
        image.channel[c0].resize(); // truncated decode: an all-zero index
    }
    for i in 1..nb {
        let mut ch = Channel::new(w, h, 0, 1);
        ch.component = parameters[0] + i as i32;
        image.channel.insert(c0 + 1, ch);
    }
    let palette = image.channel[0].clone();
    let palette_max = palette.w as i32 - 1;
    for y in 0..h {
        for x in 0..w {
            let index = image.channel[c0].row(y)[x].clamp(0, palette_max.max(0));
            for c in 0..nb {
                image.channel[c0 + c].row_mut(y)[x] = palette.value(c as isize, index as isize);
            }
        }
    }
    image.nb_channels += nb - 1;
    image.nb_meta_channels -= 1;
    image.channel.remove(0);
    Ok(true)
}
