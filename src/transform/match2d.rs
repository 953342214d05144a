// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! 2D matching: a meta-channel of spiral-coded offsets marks pixels that
//! repeat an earlier pixel; matched pixels are stored as zero (or, with
//! soft matching, as the difference). For animations the match channel is
//! quantized by the code of "exactly one frame up", so entries are small
//! frame counts.

use crate::error::{Error, Result};
use crate::image::{Channel, Image, Sample};
use crate::util::tracing_wrappers::*;

/// Enumerates offsets into the scanline-order past as a spiral of growing
/// "onion layers" around the current pixel, generalizing the offset list
/// of lossless WebP:
///
/// ```text
///     D D D D D D D D D
///     D C C C C C C C D
///     D C B B B B B C D
///     D C B A A A B C D
///     D C B A X
/// ```
pub fn compute_offset(code: i32) -> (i32, i32) {
    let mut code = code;
    let mut onion_layer = 0i32;
    let mut onion_layer_size = 4i32;
    while code > onion_layer_size {
        code -= onion_layer_size;
        onion_layer += 1;
        onion_layer_size += 4;
    }
    if onion_layer & 1 == 1 {
        // odd layer: going right to left
        if code <= onion_layer {
            (1 + onion_layer, -code)
        } else if code <= 3 + 3 * onion_layer {
            (2 + 2 * onion_layer - code, -1 - onion_layer)
        } else {
            (-1 - onion_layer, -4 - 4 * onion_layer + code)
        }
    } else {
        // even layer: going left to right
        if code <= 1 + onion_layer {
            (-1 - onion_layer, 1 - code)
        } else if code <= 4 + 3 * onion_layer {
            (-3 - 2 * onion_layer + code, -1 - onion_layer)
        } else {
            (1 + onion_layer, -5 - 4 * onion_layer + code)
        }
    }
}

fn make_offsets_table(n: usize) -> Vec<(i32, i32)> {
    let mut t = vec![(0, 0); n];
    for (i, o) in t.iter_mut().enumerate().skip(1) {
        *o = compute_offset(i as i32);
    }
    t
}

fn default_match_parameters(image: &Image) -> Vec<i32> {
    vec![0, image.nb_channels as i32 - 1, 0, 1_000_000]
}

/// The spiral code that lands exactly one frame up in a filmstrip of
/// frame height `fh`.
fn frame_offset_code(fh: usize) -> i32 {
    (2 * fh * fh + (fh & 1)) as i32
}

pub fn meta_match(image: &mut Image, parameters: &mut Vec<i32>) -> Result<()> {
    if parameters.is_empty() {
        *parameters = default_match_parameters(image);
    }
    if parameters.len() < 3 {
        return Err(Error::InvalidTransformParameters("Matching"));
    }
    let begin_c = image.nb_meta_channels + parameters[0] as usize;
    let end_c = image.nb_meta_channels + parameters[1] as usize;
    if parameters[0] < 0 || begin_c > end_c || end_c >= image.channel.len() {
        return Err(Error::InvalidTransformParameters("Matching"));
    }
    image.nb_meta_channels += 1;
    let mch = Channel::new(image.channel[begin_c].w, image.channel[begin_c].h, 0, 1);
    image.channel.insert(0, mch);
    Ok(())
}

pub fn match2d(image: &mut Image, inverse: bool, parameters: &mut Vec<i32>) -> Result<bool> {
    if inverse {
        inv_match(image, parameters)
    } else {
        fwd_match(image, parameters)
    }
}

fn inv_match(image: &mut Image, parameters: &[i32]) -> Result<bool> {
    if image.nb_meta_channels < 1 {
        return Err(Error::InvalidTransformParameters("Matching"));
    }
    let params: Vec<i32> = if parameters.is_empty() {
        default_match_parameters(image)
    } else {
        parameters.to_vec()
    };
    if params.len() < 3 {
        return Err(Error::InvalidTransformParameters("Matching"));
    }
    let c0 = image.nb_meta_channels + params[0] as usize;
    let cn = image.nb_meta_channels + params[1] as usize;
    if c0 >= image.channel.len() || cn >= image.channel.len() {
        return Err(Error::InvalidTransformParameters("Matching"));
    }
    let softmatch = params[2] != 0;
    let w = image.channel[c0].w;
    let h = image.channel[c0].h;
    for c in c0..=cn {
        if image.channel[c].data.is_empty() {
            image.channel[c].resize(); // truncated decode
        }
    }
    let m = image.channel[0].clone();

    if m.q == 1 {
        if m.maxval > (1 << 24) {
            return Err(Error::InvalidTransformParameters("Matching"));
        }
        let offsets_table = make_offsets_table(m.maxval.max(0) as usize + 1);
        for y in 0..h {
            for x in 0..w {
                let z = m.value(y as isize, x as isize);
                if z <= 0 {
                    continue;
                }
                let (dx, dy) = offsets_table[z as usize];
                for c in c0..=cn {
                    let refv = image.channel[c].value(y as isize + dy as isize, x as isize + dx as isize);
                    let ch = &mut image.channel[c];
                    if softmatch {
                        ch.row_mut(y)[x] += refv;
                    } else {
                        ch.row_mut(y)[x] = refv;
                    }
                }
            }
        }
    } else {
        let fh = h / image.nb_frames;
        if m.q != frame_offset_code(fh) {
            return Err(Error::InvalidMatchQuantization);
        }
        // matching with corresponding pixels from previous frames
        for y in 0..h {
            for x in 0..w {
                let z = m.value(y as isize, x as isize);
                if z == 0 {
                    continue;
                }
                for c in c0..=cn {
                    let refv = image.channel[c]
                        .value(y as isize - (z as isize) * fh as isize, x as isize);
                    let ch = &mut image.channel[c];
                    if softmatch {
                        ch.row_mut(y)[x] += refv;
                    } else {
                        ch.row_mut(y)[x] = refv;
                    }
                }
            }
        }
    }
    image.nb_meta_channels -= 1;
    image.channel.remove(0);
    Ok(true)
}

fn matches(img: &Image, c0: usize, cn: usize, x: i32, y: i32, z: usize, ot: &[(i32, i32)], newmatch: bool) -> bool {
    let (dx, dy) = ot[z];
    let x2 = x + dx;
    let y2 = y + dy;
    if y2 < 0 || x2 < 0 {
        return false;
    }
    if x2 >= img.channel[c0].w as i32 {
        return false;
    }
    if newmatch && img.channel[0].value(y as isize, x as isize) != 0 {
        return false;
    }
    for c in c0..=cn {
        if img.channel[c].value(y as isize, x as isize)
            != img.channel[c].value(y2 as isize, x2 as isize)
        {
            return false;
        }
    }
    true
}

/// Rudimentary heuristic: a match offset is worth recording when it covers
/// a sufficiently large connected region of non-trivial pixels.
fn find_good_match(img: &Image, c0: usize, cn: usize, x: i32, y: i32, ot: &[(i32, i32)]) -> Sample {
    let mut max_count = 100;
    let mut best_z = 0;
    let w = img.channel[c0].w as i32;
    let h = img.channel[c0].h as i32;
    for z in 1..ot.len() {
        if !matches(img, c0, cn, x, y, z, ot, true) {
            continue;
        }
        let mut count = 0;
        let mut yy = 0;
        while y + yy < h {
            let mut xl = 0;
            while x + xl >= 0 {
                if matches(img, c0, cn, x + xl, y + yy, z, ot, true) {
                    if !matches(img, c0, cn, x + xl, y + yy, 1, ot, true) {
                        count += 1;
                    }
                } else {
                    break;
                }
                xl -= 1;
            }
            xl += 1;
            let mut xr = 1;
            while x + xr < w {
                if matches(img, c0, cn, x + xr, y + yy, z, ot, true) {
                    if !matches(img, c0, cn, x + xl, y + yy, 1, ot, true) {
                        count += 1;
                    }
                } else {
                    break;
                }
                xr += 1;
            }
            xr -= 1;
            if xl == 0 && xr == 0 {
                break;
            }
            if xr - xl < 8 {
                break;
            }
            yy += 1;
        }
        if yy < 7 {
            break;
        }
        if count > max_count {
            max_count = count;
            best_z = z as Sample;
        }
    }
    if best_z != 0 {
        trace!("good match at {},{} with offset {}", x, y, best_z);
    }
    best_z
}

fn fwd_match(image: &mut Image, parameters: &mut Vec<i32>) -> Result<bool> {
    let mut adj_params = parameters.clone();
    meta_match(image, &mut adj_params)?;
    let c0 = image.nb_meta_channels + adj_params[0] as usize;
    let cn = image.nb_meta_channels + adj_params[1] as usize;
    if c0 >= image.channel.len() || cn >= image.channel.len() {
        return Err(Error::InvalidTransformParameters("Matching"));
    }
    let maxdist = if adj_params.len() > 3 { adj_params[3] } else { 10000 };
    if adj_params[0] == 0 && adj_params[1] == image.nb_channels as i32 - 1 && adj_params[2] == 0 {
        parameters.clear(); // the defaults describe this configuration
    }
    if parameters.len() > 3 {
        parameters.pop();
    }
    let w = image.channel[c0].w;
    let h = image.channel[c0].h;

    if maxdist > 0 {
        debug!("searching for matches in channels {}-{}", c0, cn);
        let ot = make_offsets_table(maxdist as usize + 1);
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                if image.channel[0].value(y as isize, x as isize) != 0 {
                    continue;
                }
                let z = find_good_match(image, c0, cn, x, y, &ot);
                if z == 0 {
                    continue;
                }
                // grow the matched region around the seed
                let mut yy = 0;
                while y + yy < h as i32 {
                    let mut xl = 0;
                    while x + xl >= 0 {
                        if matches(image, c0, cn, x + xl, y + yy, z as usize, &ot, false) {
                            let m = &mut image.channel[0];
                            let cur = m.value((y + yy) as isize, (x + xl) as isize);
                            if cur == 0 || cur > z {
                                m.row_mut((y + yy) as usize)[(x + xl) as usize] = z;
                            }
                        } else {
                            break;
                        }
                        xl -= 1;
                    }
                    xl += 1;
                    let mut xr = 1;
                    while x + xr < w as i32 {
                        if matches(image, c0, cn, x + xr, y + yy, z as usize, &ot, false) {
                            let m = &mut image.channel[0];
                            let cur = m.value((y + yy) as isize, (x + xr) as isize);
                            if cur == 0 || cur > z {
                                m.row_mut((y + yy) as usize)[(x + xr) as usize] = z;
                            }
                        } else {
                            break;
                        }
                        xr += 1;
                    }
                    xr -= 1;
                    if xl == 0 && xr == 0 {
                        break;
                    }
                    yy += 1;
                }
            }
        }
        for y in (0..h).rev() {
            for x in (0..w).rev() {
                let z = image.channel[0].value(y as isize, x as isize);
                if z != 0 {
                    let (dx, dy) = ot[z as usize];
                    for c in c0..=cn {
                        let refv = image.channel[c]
                            .value(y as isize + dy as isize, x as isize + dx as isize);
                        image.channel[c].row_mut(y)[x] -= refv;
                    }
                }
            }
        }
    } else {
        if image.nb_frames < 2 {
            return Err(Error::InvalidTransformParameters("Matching"));
        }
        debug!("matching against previous frames (channels {}-{})", c0, cn);
        let fh = h / image.nb_frames;
        image.channel[0].q = frame_offset_code(fh);
        let minmatchcount = (w / 50).clamp(5, 40);

        for n in 1..=(-maxdist) as usize {
            for y in n * fh..h {
                // only record a match once enough pixels in a row matched,
                // to keep the match channel cheap
                let mut matchcount = 0;
                let mut firstmatch = true;
                for x in 0..w {
                    if image.channel[0].row(y)[x] != 0 {
                        continue;
                    }
                    let mut nomatch = false;
                    for c in c0..=cn {
                        if image.channel[c].row(y)[x] != image.channel[c].row(y - n * fh)[x] {
                            nomatch = true;
                        }
                    }
                    if nomatch {
                        matchcount = 0;
                        firstmatch = true;
                        continue;
                    }
                    matchcount += 1;
                    if matchcount >= minmatchcount {
                        if firstmatch {
                            for prev_x in (x + 1 - matchcount)..x {
                                image.channel[0].row_mut(y)[prev_x] = n as Sample;
                            }
                        }
                        firstmatch = false;
                        image.channel[0].row_mut(y)[x] = n as Sample;
                    }
                }
            }
        }

        // Erode the match mask: flagged entries whose neighborhood leaks
        // into unmatched territory are negated, then dropped, to reduce
        // entropy and keep lossy artifacts from accumulating at edges.
        // Three passes top to bottom, each examining the current state.
        for _ in 0..3 {
            for y in fh..=h {
                if y < h {
                    for x in 0..w {
                        let m = &image.channel[0];
                        if m.row(y)[x] > 0
                            && (m.value(y as isize - 1, x as isize) == 0
                                || (x > 0 && m.row(y)[x - 1] == 0)
                                || (y + 1 < h && m.value(y as isize + 1, x as isize) <= 0)
                                || (x + 1 < w && m.row(y)[x + 1] <= 0))
                        {
                            let v = image.channel[0].row(y)[x];
                            image.channel[0].row_mut(y)[x] = -v;
                        }
                    }
                }
            }
        }

        for y in fh..h {
            for x in 0..w {
                let z = image.channel[0].row(y)[x];
                if z > 0 {
                    for c in c0..=cn {
                        image.channel[c].row_mut(y)[x] = 0;
                    }
                } else if z < 0 {
                    image.channel[0].row_mut(y)[x] = -z;
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
    fn spiral_offsets_point_into_the_past() {
        for code in 1..500 {
            let (dx, dy) = compute_offset(code);
            assert!(dy < 0 || (dy == 0 && dx < 0), "code {code} -> ({dx},{dy})");
        }
        // first onion layer, left neighbor first
        assert_eq!(compute_offset(1), (-1, 0));
        assert_eq!(compute_offset(2), (-1, -1));
        assert_eq!(compute_offset(3), (0, -1));
        assert_eq!(compute_offset(4), (1, -1));
    }

    #[test]
    fn spiral_offsets_are_unique() {
        let mut seen = std::collections::BTreeSet::new();
        for code in 1..2000 {
            assert!(seen.insert(compute_offset(code)), "duplicate at {code}");
        }
    }

    #[test]
    fn frame_offset_code_goes_one_frame_up() {
        for fh in [1usize, 2, 3, 8, 17] {
            let code = frame_offset_code(fh);
            let (dx, dy) = compute_offset(code);
            assert_eq!((dx, dy), (0, -(fh as i32)), "fh={fh}");
        }
    }

    #[test]
    fn animation_match_round_trips() {
        // two identical 8x8 frames in a filmstrip
        let mut image = Image::new(8, 16, 255, 1, 0);
        image.nb_frames = 2;
        for y in 0..8 {
            for x in 0..8 {
                let v = ((x * 5 + y * 3) % 200) as i32;
                image.channel[0].row_mut(y)[x] = v;
                image.channel[0].row_mut(y + 8)[x] = v;
            }
        }
        let original = image.channel[0].data.clone();
        let mut params = vec![0, 0, 0, -1];
        assert!(match2d(&mut image, false, &mut params).unwrap());
        assert_eq!(image.nb_meta_channels, 1);
        // second frame mostly zeroed out
        let zeros = image.channel[1]
            .data
            .iter()
            .skip(8 * 8)
            .filter(|&&v| v == 0)
            .count();
        assert!(zeros > 32, "only {zeros} matched pixels");
        // every nonzero match entry points at an identical pixel one frame up
        for y in 8..16 {
            for x in 0..8 {
                if image.channel[0].row(y)[x] != 0 {
                    assert_eq!(original[(y - 8) * 8 + x], original[y * 8 + x]);
                }
            }
        }
        assert!(match2d(&mut image, true, &mut params).unwrap());
        assert_eq!(image.nb_meta_channels, 0);
        assert_eq!(image.channel[0].data, original);
    }
}
