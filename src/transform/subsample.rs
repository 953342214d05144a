// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::{Error, Result};
use crate::image::{Channel, Image};
use crate::util::tracing_wrappers::*;

/// JPEG-style chroma subsampling. Parameters are tuples
/// `[beginc, endc, ratio_h, ratio_v]`, or a single shorthand value 0..3
/// for 4:2:0, 4:2:2, 4:4:0 and 4:1:1. Subsampled input arrives already
/// subsampled (from a JPEG or YUV source), so only the metadata step and
/// the upscaling inverse exist; the decoder uses a two-tap filter for 2x
/// ratios and box replication otherwise.
pub fn subsample(image: &mut Image, inverse: bool, parameters: &[i32]) -> Result<bool> {
    if inverse {
        inv_subsample(image, parameters)
    } else {
        Err(Error::ForwardNotSupported("ChromaSubsampling"))
    }
}

fn expand_parameters(parameters: &[i32]) -> Result<Vec<i32>> {
    let mut p = parameters.to_vec();
    if p.len() == 1 {
        p = match p[0] {
            0 => vec![1, 2, 2, 2], // 4:2:0
            1 => vec![1, 2, 2, 1], // 4:2:2
            2 => vec![1, 2, 1, 2], // 4:4:0
            3 => vec![1, 2, 4, 1], // 4:1:1
            _ => p,
        };
    }
    if p.len() % 4 != 0 {
        return Err(Error::InvalidTransformParameters("ChromaSubsampling"));
    }
    Ok(p)
}

pub fn meta_subsample(image: &mut Image, parameters: &[i32]) -> Result<()> {
    let p = expand_parameters(parameters)?;
    for tuple in p.chunks(4) {
        let (c1, c2, srh, srv) = (tuple[0], tuple[1], tuple[2], tuple[3]);
        if c1 < 0 || c2 < c1 || c2 as usize >= image.channel.len() {
            return Err(Error::InvalidChannelRange(
                c2.max(0) as usize,
                image.channel.len(),
            ));
        }
        if !(srh == 1 || srh == 2 || srh == 4) || !(srv == 1 || srv == 2 || srv == 4) {
            return Err(Error::InvalidTransformParameters("ChromaSubsampling"));
        }
        for c in c1 as usize..=c2 as usize {
            let ch = &mut image.channel[c];
            ch.w = (ch.w + srh as usize - 1) / srh as usize;
            ch.h = (ch.h + srv as usize - 1) / srv as usize;
            ch.hshift += srh.trailing_zeros() as i32;
            ch.vshift += srv.trailing_zeros() as i32;
        }
    }
    Ok(())
}

fn inv_subsample(image: &mut Image, parameters: &[i32]) -> Result<bool> {
    let p = expand_parameters(parameters)?;
    for tuple in p.chunks(4) {
        let (c1, c2, srh, srv) = (
            tuple[0] as usize,
            tuple[1] as usize,
            tuple[2] as usize,
            tuple[3] as usize,
        );
        if c2 >= image.channel.len() {
            return Err(Error::InvalidChannelRange(c2, image.channel.len()));
        }
        for c in c1..=c2 {
            let ow = image.channel[c].w;
            let oh = image.channel[c].h;
            let full = &image.channel[image.nb_meta_channels];
            if ow >= full.w && oh >= full.h {
                // already at full scale (LQIP and 1:16 decodes)
                trace!("channel {} needs no upscaling", c);
                continue;
            }
            let src = &image.channel[c];
            let mut channel = Channel::new(ow * srh, oh * srv, src.minval, src.maxval);
            channel.component = src.component;
            if srv <= 2 && srh <= 2 {
                if srh == 2 {
                    // two-tap horizontal upscale
                    for y in 0..oh {
                        for x in 0..ow {
                            let cur = src.value(y as isize, x as isize);
                            let west = src.value(y as isize, x.saturating_sub(1) as isize);
                            let east = src.value(y as isize, (x + 1).min(ow - 1) as isize);
                            channel.row_mut(y * srv)[x * 2] = (3 * cur + west + 1) >> 2;
                            channel.row_mut(y * srv)[x * 2 + 1] = (3 * cur + east + 2) >> 2;
                        }
                    }
                } else {
                    for y in 0..oh {
                        for x in 0..ow {
                            channel.row_mut(y * srv)[x] = src.value(y as isize, x as isize);
                        }
                    }
                }
                if srv == 2 {
                    let orig = channel.clone();
                    for y in 0..oh {
                        for x in 0..ow * srh {
                            let cur = orig.row(y * 2)[x];
                            let north = orig.row(if y > 0 { (y - 1) * 2 } else { 0 })[x];
                            let south = orig.row(if y + 1 < oh { (y + 1) * 2 } else { y * 2 })[x];
                            channel.row_mut(y * 2)[x] = (3 * cur + north + 1) >> 2;
                            channel.row_mut(y * 2 + 1)[x] = (3 * cur + south + 2) >> 2;
                        }
                    }
                }
            } else {
                // box replication
                for y in 0..oh * srv {
                    for x in 0..ow * srh {
                        channel.row_mut(y)[x] = src.value((y / srv) as isize, (x / srh) as isize);
                    }
                }
            }
            trace!(
                "upscaled channel {} from {}x{} to {}x{}",
                c, ow, oh, channel.w, channel.h
            );
            image.channel[c] = channel;
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_expands_to_420() {
        let p = expand_parameters(&[0]).unwrap();
        assert_eq!(p, vec![1, 2, 2, 2]);
    }

    #[test]
    fn meta_halves_dimensions() {
        let mut image = Image::new(9, 7, 255, 3, 0);
        meta_subsample(&mut image, &[0]).unwrap();
        assert_eq!((image.channel[0].w, image.channel[0].h), (9, 7));
        assert_eq!((image.channel[1].w, image.channel[1].h), (5, 4));
        assert_eq!((image.channel[2].w, image.channel[2].h), (5, 4));
        assert_eq!(image.channel[1].hshift, 1);
        assert_eq!(image.channel[1].vshift, 1);
    }

    #[test]
    fn constant_chroma_upscales_to_itself() {
        let mut image = Image::new(8, 8, 255, 3, 0);
        meta_subsample(&mut image, &[0]).unwrap();
        for c in 1..3 {
            image.channel[c].resize();
            image.channel[c].data.fill(77);
        }
        image.channel[0].resize();
        inv_subsample(&mut image, &[0]).unwrap();
        for c in 1..3 {
            assert_eq!((image.channel[c].w, image.channel[c].h), (8, 8));
            assert!(image.channel[c].data.iter().all(|&v| v == 77));
        }
    }
}
