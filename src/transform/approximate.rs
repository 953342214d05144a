// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::{Error, Result};
use crate::image::Image;
use crate::util::tracing_wrappers::*;

/// Lossless quantization: each sample `v` of an approximated channel
/// becomes `v div (q+1)` while `v mod (q+1)` goes into a remainder channel
/// appended at the end of the list. Truncated decodes can drop the
/// remainder channels and still reconstruct an approximation. Parameters:
/// `[beginc, endc, q...]` where a per-channel `q` of 0 means "unchanged,
/// no remainder channel".
pub fn approximate(image: &mut Image, inverse: bool, parameters: &[i32]) -> Result<bool> {
    if inverse {
        inv_approximate(image, parameters)
    } else {
        fwd_approximate(image, parameters)
    }
}

fn channel_q(parameters: &[i32], beginc: usize, c: usize) -> i32 {
    parameters
        .get(c + 2 - beginc)
        .or(parameters.last())
        .copied()
        .unwrap_or(0)
}

pub fn meta_approximate(image: &mut Image, parameters: &[i32]) -> Result<()> {
    if parameters.len() < 3 {
        return Err(Error::InvalidTransformParameters("Approximation"));
    }
    let beginc = parameters[0];
    let endc = parameters[1];
    if beginc < 0 || endc < beginc || endc as usize >= image.channel.len() {
        return Err(Error::InvalidTransformParameters("Approximation"));
    }
    for c in beginc as usize..=endc as usize {
        if channel_q(parameters, beginc as usize, c) != 0 {
            let copy = image.channel[c].clone();
            image.channel.push(copy);
        }
    }
    Ok(())
}

fn fwd_approximate(image: &mut Image, parameters: &[i32]) -> Result<bool> {
    let offset = image.channel.len();
    meta_approximate(image, parameters)?;
    let beginc = parameters[0] as usize;
    let endc = parameters[1] as usize;
    debug!("approximating channels {}-{}", beginc, endc);
    let mut i = 0;
    for c in beginc..=endc {
        let q = channel_q(parameters, beginc, c) + 1;
        if q == 1 {
            continue;
        }
        let rc = offset + i;
        i += 1;
        for idx in 0..image.channel[c].data.len() {
            let v = image.channel[c].data[idx];
            let mut quotient = v / q;
            let mut r = v % q;
            if r < 0 {
                quotient -= 1;
                r += q;
            }
            image.channel[c].data[idx] = quotient;
            image.channel[rc].data[idx] = r;
        }
        image.channel[c].minval /= q;
        image.channel[c].maxval /= q;
        image.channel[rc].minval = 0;
        image.channel[rc].maxval = q - 1;
        // duplicate the quantization factor in case the approximated
        // channel becomes all zeroes
        image.channel[rc].q = image.channel[c].q;
    }
    Ok(true)
}

fn inv_approximate(image: &mut Image, parameters: &[i32]) -> Result<bool> {
    if parameters.len() < 3 {
        return Err(Error::InvalidTransformParameters("Approximation"));
    }
    let beginc = parameters[0] as usize;
    let endc = parameters[1] as usize;
    let mut offset = image.channel.len() - (endc - beginc + 1);
    for c in beginc..=endc {
        if channel_q(parameters, beginc, c) == 0 {
            offset += 1;
        }
    }
    debug!(
        "reconstructing approximated channels {}-{} from channels {}..",
        beginc, endc, offset
    );
    let mut i = 0;
    for c in beginc..=endc {
        let q = channel_q(parameters, beginc, c) + 1;
        if q == 1 {
            continue;
        }
        let rc = offset + i;
        i += 1;
        if rc >= image.channel.len() {
            return Err(Error::InvalidChannelRange(rc, image.channel.len()));
        }
        let remainder = image.channel[rc].clone();
        let ch = &mut image.channel[c];
        if !remainder.data.is_empty() {
            // usually the same, except when the approximated channel
            // became all zeroes
            ch.q = remainder.q;
        }
        for idx in 0..ch.data.len() {
            ch.data[idx] *= q;
            if !remainder.data.is_empty() {
                ch.data[idx] += remainder.data[idx];
            }
        }
    }
    image.channel.truncate(offset);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximation_round_trips_including_negatives() {
        let mut image = Image::new(4, 2, 255, 1, 0);
        image.channel[0]
            .data
            .copy_from_slice(&[-7, -1, 0, 1, 6, 7, 8, 255]);
        image.channel[0].minval = -7;
        let original = image.channel[0].data.clone();
        let params = vec![0, 0, 3]; // divisor 4
        approximate(&mut image, false, &params).unwrap();
        assert_eq!(image.channel.len(), 2);
        // floor division
        assert_eq!(image.channel[0].data[0], -2);
        assert_eq!(image.channel[1].data[0], 1);
        assert_eq!(image.channel[1].minval, 0);
        assert_eq!(image.channel[1].maxval, 3);
        approximate(&mut image, true, &params).unwrap();
        assert_eq!(image.channel.len(), 1);
        assert_eq!(image.channel[0].data, original);
    }

    #[test]
    fn missing_remainder_still_scales() {
        let mut image = Image::new(2, 1, 255, 1, 0);
        image.channel[0].data.copy_from_slice(&[9, 13]);
        let params = vec![0, 0, 3];
        approximate(&mut image, false, &params).unwrap();
        image.channel[1].data.clear(); // simulate a truncated decode
        approximate(&mut image, true, &params).unwrap();
        assert_eq!(image.channel[0].data, vec![8, 12]);
    }
}
