// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Container and channel-group decoder. Reads are gated by the byte
//! budget of the requested responsive scale; running out of data at a
//! group boundary is a clean stop, running out inside a channel
//! zero-fills the remainder.

use crate::entropy_coding::compound::FinalPropertySymbolCoder;
use crate::entropy_coding::rac::RacInput;
use crate::entropy_coding::symbol::read_uniform_int;
use crate::entropy_coding::tree::MetaTreeCoder;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::io::{BlobReader, ByteSource, read_varint};
use crate::options::Options;
use crate::predict::{
    NB_NONREF_PROPERTIES, Predictor, ReferenceRow, init_properties, precompute_references,
    predict_with_references,
};
use crate::transform::{Transform, TransformId, permute::inv_permute_meta};
use crate::util::tracing_wrappers::*;
use crate::TRUNCATION_OFFSET_RESOLUTION;
use crate::encode::check_bit_depth;

/// Channel counts and dimensions are unbounded varints on the wire; cap
/// them before allocating.
const MAX_TOTAL_SAMPLES: u64 = 1 << 30;
const MAX_CHANNELS: u64 = 4096;

/// Everything the header declares, without touching image data.
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub w: usize,
    pub h: usize,
    pub bit_depth: u32,
    pub nb_channels: usize,
    pub colormodel: u32,
    pub animation: bool,
    pub nb_frames: usize,
    pub den: u32,
    pub num: Vec<u32>,
    pub loops: u32,
    pub max_properties: usize,
    /// Absolute byte positions of the five truncation points:
    /// LQIP, 1:16, 1:8, 1:4, 1:2.
    pub truncation_offsets: [usize; 5],
}

fn read_magic(src: &mut BlobReader) -> Result<bool> {
    let mut magic = [0u8; 4];
    for b in &mut magic {
        *b = src.read_byte().ok_or(Error::HeaderTruncated)?;
    }
    match &magic {
        b"FUIF" => Ok(false),
        b"FUAF" => Ok(true),
        _ => Err(Error::InvalidSignature(magic[0], magic[1], magic[2], magic[3])),
    }
}

fn read_header(src: &mut BlobReader) -> Result<ImageInfo> {
    let animation = read_magic(src)?;
    let nb_channels = read_varint(src)?
        .checked_sub(b'0' as u64)
        .ok_or(Error::InvalidChannelCount(0))?;
    if nb_channels > MAX_CHANNELS {
        return Err(Error::InvalidChannelCount(nb_channels));
    }
    let bit_depth = read_varint(src)?
        .checked_sub(b'&' as u64)
        .filter(|&b| (1..=30).contains(&b))
        .ok_or(Error::InvalidVarint)?;
    let w = read_varint(src)? + 1;
    let h = read_varint(src)? + 1;
    if w.checked_mul(h).is_none_or(|t| t > MAX_TOTAL_SAMPLES) {
        return Err(Error::InvalidImageSize(w, h));
    }
    let mut nb_frames = 1u64;
    let mut den = 10u32;
    let mut num = Vec::new();
    let mut loops = 0u32;
    if animation {
        nb_frames = read_varint(src)? + 2;
        if nb_frames > h {
            return Err(Error::InvalidImageSize(w, h));
        }
        den = read_varint(src)? as u32 + 1;
        let numerator = read_varint(src)? as u32;
        if numerator != 0 {
            num.push(numerator);
            for _ in 1..nb_frames {
                num.push(read_varint(src)? as u32);
            }
        }
        loops = read_varint(src)? as u32;
    }
    let colormodel = read_varint(src)? as u32;
    let max_properties = read_varint(src)? as usize;

    let mut truncation_offsets = [0usize; 5];
    let mut relative_offset = 0usize;
    for off in &mut truncation_offsets {
        *off = read_varint(src)? as usize * TRUNCATION_OFFSET_RESOLUTION + relative_offset;
        relative_offset = *off;
    }
    let base = src.tell();
    for off in &mut truncation_offsets {
        *off += base;
    }
    trace!("responsive truncation offsets: {:?}", truncation_offsets);

    Ok(ImageInfo {
        w: w as usize,
        h: h as usize,
        bit_depth: bit_depth as u32,
        nb_channels: nb_channels as usize,
        colormodel,
        animation,
        nb_frames: nb_frames as usize,
        den,
        num,
        loops,
        max_properties,
        truncation_offsets,
    })
}

/// Parses the container header only (the `identify` operation).
pub fn decode_info(data: &[u8]) -> Result<ImageInfo> {
    let mut src = BlobReader::new(data);
    read_header(&mut src)
}

#[inline]
fn gated(src: &BlobReader, bytes_to_load: usize) -> bool {
    src.is_eof() || (bytes_to_load != 0 && src.tell() >= bytes_to_load)
}

/// A varint that may legitimately hit the end of a truncated stream.
enum Gated<T> {
    Value(T),
    Truncated,
}

fn read_varint_gated(src: &mut BlobReader) -> Result<Gated<u64>> {
    match read_varint(src) {
        Ok(v) => Ok(Gated::Value(v)),
        Err(Error::HeaderTruncated) => Ok(Gated::Truncated),
        Err(e) => Err(e),
    }
}

macro_rules! gated_varint {
    ($src:expr, $ret:expr) => {
        match read_varint_gated($src)? {
            Gated::Value(v) => v,
            Gated::Truncated => return Ok($ret),
        }
    };
}

fn varint_to_i32(v: u64) -> Result<i32> {
    i32::try_from(v).map_err(|_| Error::InvalidVarint)
}

/// Decodes one channel group starting at channel `beginc`; returns the
/// index of the last channel of the group (or `beginc` when the stream
/// ended before the group payload).
fn decode_group(
    src: &mut BlobReader,
    options: &Options,
    beginc: usize,
    image: &mut Image,
    bytes_to_load: usize,
) -> Result<usize> {
    if gated(src, bytes_to_load) {
        return Ok(beginc);
    }
    let firstbyte = gated_varint!(src, beginc);
    if gated(src, bytes_to_load) {
        return Ok(beginc);
    }
    let endc = beginc + (firstbyte >> 4) as usize;
    let compress = firstbyte & 1 != 0;
    let predictor = ((firstbyte & 14) >> 1) as u32;
    let mut global_minv = 1 - varint_to_i32(gated_varint!(src, beginc))?;
    if gated(src, bytes_to_load) {
        return Ok(beginc);
    }
    if global_minv == 1 {
        global_minv = varint_to_i32(gated_varint!(src, beginc))?;
    }
    let global_maxv = global_minv
        .checked_add(varint_to_i32(gated_varint!(src, beginc))?)
        .ok_or(Error::InvalidVarint)?;
    if (global_maxv as i64) - (global_minv as i64) > (1 << 30) {
        return Err(Error::CorruptStream);
    }
    if gated(src, bytes_to_load) {
        return Ok(beginc);
    }
    debug!(
        "decoding channels {}-{} with range {}..{}",
        beginc, endc, global_minv, global_maxv
    );
    if endc >= image.channel.len() {
        return Err(Error::InvalidGroupRange(beginc, endc, image.channel.len()));
    }

    let mut first_real = beginc;
    for i in beginc..=endc {
        if image.channel[i].is_empty() {
            continue;
        }
        let (mut minval, mut maxval) = (global_minv, global_maxv);
        if endc > beginc && global_minv < global_maxv {
            minval = global_minv
                .checked_add(varint_to_i32(gated_varint!(src, beginc))?)
                .ok_or(Error::InvalidVarint)?;
            maxval = minval
                .checked_add(varint_to_i32(gated_varint!(src, beginc))?)
                .ok_or(Error::InvalidVarint)?;
            if (maxval as i64) - (minval as i64) > (1 << 30) {
                return Err(Error::CorruptStream);
            }
        }
        let ch = &mut image.channel[i];
        ch.minval = minval;
        ch.maxval = maxval;
        if minval == maxval {
            ch.data = vec![minval; ch.w * ch.h];
            first_real += 1;
        }
        if minval == 0 && maxval == 0 {
            continue;
        }
        image.channel[i].q = varint_to_i32(gated_varint!(src, beginc))?.max(1);
        if gated(src, bytes_to_load) {
            let ch = &mut image.channel[i];
            ch.data = vec![0; ch.w * ch.h];
            return Ok(beginc);
        }
        if compress {
            check_bit_depth(minval, maxval, predictor)?;
        }
    }

    if first_real > endc {
        return Ok(endc); // all channels constant
    }

    let prop_ranges = init_properties(&image.channel, beginc, endc, options.max_properties);
    let mut predictability: u32 = 2048;
    if predictor == 0 && compress {
        let rounded = gated_varint!(src, beginc);
        if !(1..=127).contains(&rounded) {
            if gated(src, bytes_to_load) {
                let ch = &mut image.channel[first_real];
                ch.data = vec![0; ch.w * ch.h];
                return Ok(beginc);
            }
            return Err(Error::CorruptStream);
        }
        predictability = rounded as u32 * 32;
    }

    let mut rac = RacInput::new(src);

    if !compress {
        for i in beginc..=endc {
            let ch = &mut image.channel[i];
            if ch.minval == ch.maxval {
                continue;
            }
            ch.set_zero();
            ch.resize();
            let (minval, maxval) = (ch.minval, ch.maxval);
            let (w, h) = (ch.w, ch.h);
            let mut out_of_data = false;
            for y in 0..h {
                if gated(rac.source(), bytes_to_load) {
                    debug!("premature end of data at row {} of channel {}", y, i);
                    out_of_data = true;
                    break;
                }
                for x in 0..w {
                    let v = read_uniform_int(&mut rac, minval, maxval - minval);
                    image.channel[i].row_mut(y)[x] = v;
                }
            }
            if out_of_data {
                break;
            }
        }
        return Ok(endc);
    }

    let mut meta = MetaTreeCoder::new(prop_ranges.clone());
    let mut tree = match meta.read_tree(&mut rac) {
        Ok(t) => t,
        Err(e) => {
            if gated(rac.source(), bytes_to_load) {
                let ch = &mut image.channel[beginc];
                ch.data = vec![0; ch.w * ch.h];
                return Ok(beginc);
            }
            trace!("tree decoding failed mid-stream: {e}");
            return Err(Error::CorruptStream);
        }
    };
    let nb_leaves = tree.relabel_leaves();
    let single_leaf = tree.len() == 1;
    let mut coder = FinalPropertySymbolCoder::new(
        tree,
        prop_ranges.len(),
        nb_leaves,
        predictability as u16,
        options.maniac_cutoff,
        options.maniac_alpha,
    );
    let mut properties = vec![0i32; prop_ranges.len()];

    for i in beginc..=endc {
        if image.channel[i].minval == image.channel[i].maxval {
            continue;
        }
        {
            let ch = &mut image.channel[i];
            ch.set_zero();
            ch.resize();
        }
        let (prior, rest) = image.channel.split_at_mut(beginc);
        let ch = &mut rest[i - beginc];
        let (minval, maxval) = (ch.minval, ch.maxval);

        let mut out_of_data = false;
        if single_leaf && predictor == 0 && ch.zero == 0 {
            // no meta-adaptation and no predictor: the properties are
            // never inspected
            for y in 0..ch.h {
                if gated(rac.source(), bytes_to_load) {
                    debug!("premature end of data at row {} of channel {}", y, i);
                    out_of_data = true;
                    break;
                }
                for x in 0..ch.w {
                    ch.row_mut(y)[x] = coder.read_int(&mut rac, &properties, minval, maxval);
                }
            }
        } else {
            let mut refs = ReferenceRow::new(prop_ranges.len() - NB_NONREF_PROPERTIES, ch.w);
            for y in 0..ch.h {
                if gated(rac.source(), bytes_to_load) {
                    debug!("premature end of data at row {} of channel {}", y, i);
                    out_of_data = true;
                    break;
                }
                precompute_references(ch, y, prior, options.max_properties, &mut refs);
                for x in 0..ch.w {
                    let guess = predict_with_references(
                        &mut properties,
                        ch,
                        x,
                        y,
                        Predictor::from_bits(predictor),
                        &refs,
                    );
                    let diff = coder.read_int(&mut rac, &properties, minval - guess, maxval - guess);
                    ch.row_mut(y)[x] = diff + guess;
                }
            }
        }
        if out_of_data {
            break;
        }
    }
    Ok(endc)
}

/// Decodes a bitstream, or its prefix up to the responsive scale selected
/// by `options.preview`, into an image with the transform chain still
/// recorded. Call `Image::undo_transforms` to reach displayable samples.
pub fn decode(data: &[u8], options: &Options) -> Result<Image> {
    let mut src = BlobReader::new(data);
    let info = read_header(&mut src)?;
    let mut options = options.clone();
    options.max_properties = info.max_properties;

    let maxval = (1i64 << info.bit_depth) as i32 - 1;
    let mut image = Image::new(info.w, info.h, maxval, info.nb_channels, info.colormodel);
    image.nb_frames = info.nb_frames;
    image.den = info.den;
    image.num = info.num.clone();
    image.loops = info.loops;

    if info.nb_channels < 1 {
        return Ok(image);
    }

    let nb_transforms = read_varint(&mut src)?;
    if nb_transforms > 256 {
        return Err(Error::InvalidVarint);
    }
    for _ in 0..nb_transforms {
        let id_and_nb_params = read_varint(&mut src)?;
        let mut t = Transform::from_id((id_and_nb_params & 0xf) as u32)?;
        if t.has_parameters() {
            let nb_params = id_and_nb_params >> 4;
            for _ in 0..nb_params {
                t.parameters.push(varint_to_i32(read_varint(&mut src)?)?);
            }
        }
        debug!("transform: {}{:?}", t.name(), t.parameters);
        t.meta_apply(&mut image)?;
        image.transform.push(t);
    }

    let bytes_to_load = if options.preview >= 0 {
        info.truncation_offsets[options.preview.clamp(0, 4) as usize]
    } else {
        0
    };

    let nb_channels = image.channel.len();
    let mut i = 0;
    while i < nb_channels {
        if !gated(&src, bytes_to_load) {
            if image.channel[i].is_empty() {
                i += 1;
                continue;
            }
            let endc = decode_group(&mut src, &options, i, &mut image, bytes_to_load)?;
            if endc == 0
                && image
                    .transform
                    .last()
                    .is_some_and(|t| t.id == TransformId::Permute && t.parameters.is_empty())
            {
                inv_permute_meta(&mut image)?;
            }
            i = endc + 1;
        } else {
            debug!("skipping channels {}-{}", i, nb_channels - 1);
            break;
        }
    }
    trace!("decoded {} bytes", src.tell());
    Ok(image)
}
