// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::{Error, Result};
use crate::image::{Channel, Image};
use crate::util::tracing_wrappers::*;

/// Reorders the non-meta channels. With explicit parameters (first
/// parameter -1, then the mapping) the permutation lives in the transform
/// record; without, it is carried in a meta-channel and must be the last
/// transform in the chain so the decoder can apply it to the channel
/// geometry as soon as channel 0 is decoded.
pub fn permute(image: &mut Image, inverse: bool, parameters: &mut Vec<i32>) -> Result<bool> {
    if inverse {
        inv_permute(image, parameters)
    } else {
        fwd_permute(image, parameters)
    }
}

fn validate_permutation(perm: &[i32]) -> Result<()> {
    for (i, &c) in perm.iter().enumerate() {
        if c < 0 || c as usize >= perm.len() {
            return Err(Error::InvalidPermutation(c));
        }
        for &prev in &perm[..i] {
            if prev == c {
                return Err(Error::InvalidPermutation(c));
            }
        }
    }
    Ok(())
}

pub fn meta_permute(image: &mut Image, parameters: &mut [i32], use_channel: bool) -> Result<()> {
    let nb = image.channel.len() - image.nb_meta_channels;
    if parameters.is_empty() || use_channel {
        image.nb_meta_channels += 1;
        let mut pch = Channel::new(nb, 1, 0, nb as i32 - 1);
        pch.hshift = -1;
        image.channel.insert(0, pch);
    } else if parameters.len() <= nb {
        validate_permutation(parameters)?;
        let inchannel = image.channel.clone();
        for (i, &c) in parameters.iter().enumerate() {
            image.channel[image.nb_meta_channels + c as usize] =
                inchannel[image.nb_meta_channels + i].clone();
            trace!("[{} -> {}]", i, c);
        }
    } else {
        return Err(Error::InvalidTransformParameters("Permutation"));
    }
    Ok(())
}

fn fwd_permute(image: &mut Image, parameters: &mut Vec<i32>) -> Result<bool> {
    if parameters.len() < 3 {
        return Err(Error::InvalidTransformParameters("Permutation"));
    }
    let use_channel = parameters[0] != -1;
    if !use_channel {
        parameters.remove(0);
        meta_permute(image, parameters, false)?;
        return Ok(true);
    }
    meta_permute(image, &mut [], true)?;

    let nb = image.channel[0].w;
    if parameters.len() != nb {
        return Err(Error::InvalidTransformParameters("Permutation"));
    }
    validate_permutation(parameters)?;
    let tmp = image.channel.clone();
    for i in 0..nb {
        let c = parameters[i];
        image.channel[0].row_mut(0)[i] = c;
        image.channel[image.nb_meta_channels + c as usize] =
            tmp[image.nb_meta_channels + i].clone();
        trace!("[{} -> {}]", i, c);
    }
    Ok(true)
}

fn inv_permute(image: &mut Image, parameters: &[i32]) -> Result<bool> {
    let use_channel = parameters.is_empty();
    let tmp = image.channel.clone();
    let perm_length = if use_channel {
        image.channel[0].w
    } else {
        parameters.len()
    };
    if image.nb_meta_channels + perm_length > image.channel.len() {
        return Err(Error::InvalidTransformParameters("Permutation"));
    }
    for i in 0..perm_length {
        let c = if use_channel {
            image.channel[0].value(0, i as isize)
        } else {
            parameters[i]
        };
        if c < 0 || c as usize >= perm_length {
            return Err(Error::InvalidPermutation(c));
        }
        image.channel[image.nb_meta_channels + i] = tmp[image.nb_meta_channels + c as usize].clone();
        trace!("[{} <- {}]", i, c);
    }
    if use_channel {
        image.nb_meta_channels -= 1;
        image.channel.remove(0);
    }
    Ok(true)
}

/// Applies the decoded permutation meta-channel to the channel geometry.
/// Run right after the first group so that the remaining channels are
/// decoded with the shapes they had before permutation.
pub fn inv_permute_meta(image: &mut Image) -> Result<()> {
    let perm_length = image.channel[0].w;
    let inchannel = image.channel.clone();
    if image.nb_meta_channels + perm_length > image.channel.len() {
        return Err(Error::InvalidTransformParameters("Permutation"));
    }
    for i in 0..perm_length {
        let c = image.channel[0].value(0, i as isize);
        if c < 0 || c as usize >= perm_length {
            return Err(Error::InvalidPermutation(c));
        }
        for j in 0..i {
            if image.channel[0].value(0, j as isize) == c {
                return Err(Error::InvalidPermutation(c));
            }
        }
        image.channel[image.nb_meta_channels + c as usize] =
            inchannel[image.nb_meta_channels + i].clone();
    }
    Ok(())
}
