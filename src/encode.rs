// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Container and channel-group encoder. Channels are grouped up to the
//! next responsive cut-point, each group runs a tree-learning pass and a
//! final coding pass, and the positions after the five responsive scans
//! are recorded as truncation offsets in the header.

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use crate::entropy_coding::rac::RacOutput;
use crate::entropy_coding::symbol::write_uniform_int;
use crate::entropy_coding::tree::{MetaTreeCoder, Tree};
use crate::entropy_coding::compound::{FinalPropertySymbolCoder, PropertySymbolCoder};
use crate::error::{Error, Result};
use crate::image::{Image, SAMPLE_MAX, SAMPLE_MIN, Sample};
use crate::io::{BlobWriter, ByteSink, DiscardSink, write_varint};
use crate::options::Options;
use crate::predict::{
    NB_NONREF_PROPERTIES, Predictor, ReferenceRow, init_properties, precompute_references,
    predict_with_references,
};
use crate::util::ilog2;
use crate::util::tracing_wrappers::*;
use crate::{CONTEXT_TREE_COUNT_DIV, CONTEXT_TREE_MIN_SUBTREE_SIZE, CONTEXT_TREE_SPLIT_THRESHOLD};
use crate::{MAX_BIT_DEPTH, TRUNCATION_OFFSET_RESOLUTION};

/// The training pass visits rows in a random order so the vertical
/// position property can be learned too; the generator is fixed so that
/// encoding is reproducible byte for byte.
const TRAINING_SEED: [u8; 16] = *b"fuif-maniac-tree";

/// Checks that the residuals for this range/predictor combination fit the
/// chance tables.
pub(crate) fn check_bit_depth(minv: Sample, maxv: Sample, predictor: u32) -> Result<()> {
    let mut maxav = maxv.abs();
    if -minv > maxav {
        maxav = -minv;
    }
    if predictor > 0 && maxv - minv > maxav {
        maxav = maxv - minv;
    }
    if ilog2(maxav as u32) + 1 > MAX_BIT_DEPTH as i32 {
        return Err(Error::BitDepthOverflow(minv, maxv, predictor));
    }
    Ok(())
}

/// Tightens the channel ranges and recomputes the responsive cut-points;
/// must run after the forward transforms and before `encode`.
pub fn prepare_encode(image: &mut Image) {
    image.recompute_minmax();
    image.recompute_downscales();
}

struct GroupHeader {
    header_pos: usize,
    first_real: usize,
}

fn write_group_header<S: ByteSink>(
    io: &mut S,
    image: &Image,
    beginc: usize,
    endc: usize,
    predictor: u32,
    compress: bool,
) -> Result<GroupHeader> {
    write_varint(
        io,
        (((endc - beginc) << 4) | ((predictor as usize) << 1) | compress as usize) as u64,
    );

    let mut global_minv = SAMPLE_MAX;
    let mut global_maxv = SAMPLE_MIN;
    for ch in &image.channel[beginc..=endc] {
        if ch.is_empty() {
            continue;
        }
        global_minv = global_minv.min(ch.minval);
        global_maxv = global_maxv.max(ch.maxval);
    }
    if global_minv <= 0 {
        write_varint(io, (1 - global_minv) as u64);
    } else {
        write_varint(io, 0);
        write_varint(io, global_minv as u64);
    }
    write_varint(io, (global_maxv - global_minv) as u64);

    let mut first_real = beginc;
    for i in beginc..=endc {
        let ch = &image.channel[i];
        if ch.is_empty() {
            continue;
        }
        if endc > beginc && global_minv < global_maxv {
            write_varint(io, (ch.minval - global_minv) as u64);
            write_varint(io, (ch.maxval - ch.minval) as u64);
        }
        if ch.minval == ch.maxval {
            first_real += 1;
        }
        check_bit_depth(ch.minval, ch.maxval, predictor)?;
        if ch.minval == 0 && ch.maxval == 0 {
            continue; // no quantization factor for an all-zero channel
        }
        write_varint(io, ch.q as u64);
        trace!(
            "channel {}: {}x{} range {}..{} q={}",
            i, ch.w, ch.h, ch.minval, ch.maxval, ch.q
        );
    }
    Ok(GroupHeader {
        header_pos: io.tell(),
        first_real,
    })
}

/// Share of zero samples in the first non-constant channel, written as a
/// byte so both sides can seed the zero-flag chance when no predictor is
/// active.
fn compute_predictability(image: &Image, first_real: usize) -> u32 {
    let ch = &image.channel[first_real];
    let pixels = (ch.w * ch.h) as u64;
    let zeroes = ch.data.iter().filter(|&&v| v == 0).count() as u64;
    (zeroes * 128 / pixels.max(1)).clamp(1, 127) as u32
}

#[allow(clippy::too_many_arguments)]
fn encode_group_channels<S: ByteSink>(
    io: &mut S,
    tree: &mut Tree,
    options: &Options,
    rng: Option<&mut XorShiftRng>,
    predictor: u32,
    beginc: usize,
    endc: usize,
    image: &Image,
    learn: bool,
    compress: bool,
) -> Result<usize> {
    let header = write_group_header(io, image, beginc, endc, predictor, compress)?;
    if header.first_real > endc {
        return Ok(header.header_pos); // all channels constant
    }

    let prop_ranges = init_properties(&image.channel, beginc, endc, options.max_properties);
    let mut predictability: u32 = 2048;
    if predictor == 0 && compress {
        let rounded = compute_predictability(image, header.first_real);
        write_varint(io, rounded as u64);
        predictability = rounded * 32;
        trace!("zero chance {}/4096", predictability);
    }

    let mut rac = RacOutput::new(io);
    if !compress {
        for i in beginc..=endc {
            let ch = &image.channel[i];
            for y in 0..ch.h {
                for x in 0..ch.w {
                    write_uniform_int(&mut rac, ch.minval, ch.maxval, ch.row(y)[x]);
                }
            }
        }
    } else if learn {
        let rng = rng.expect("the training pass needs the row sampler");
        let mut coder = PropertySymbolCoder::new(
            prop_ranges.clone(),
            predictability as u16,
            CONTEXT_TREE_SPLIT_THRESHOLD,
            options.maniac_cutoff,
            options.maniac_alpha,
        );
        let mut properties = vec![0i32; prop_ranges.len()];
        for i in beginc..=endc {
            let ch = &image.channel[i];
            if ch.minval == ch.maxval {
                continue;
            }
            let prior = &image.channel[..beginc];
            let mut refs = ReferenceRow::new(prop_ranges.len() - NB_NONREF_PROPERTIES, ch.w);
            let mut rows_learned = 0u64;
            loop {
                rows_learned += 1;
                if rows_learned as f32 > options.nb_repeats * ch.h as f32 {
                    break;
                }
                let y = rng.random_range(0..ch.h);
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
                    let diff = ch.row(y)[x] - guess;
                    coder.write_int(&properties, ch.minval - guess, ch.maxval - guess, diff);
                }
            }
        }
        coder.simplify(CONTEXT_TREE_COUNT_DIV, CONTEXT_TREE_MIN_SUBTREE_SIZE);
        *tree = coder.into_tree();
    } else {
        let nb_leaves = tree.relabel_leaves();
        let mut meta = MetaTreeCoder::new(prop_ranges.clone());
        meta.write_tree(&mut rac, tree);
        let mut coder = FinalPropertySymbolCoder::new(
            tree.clone(),
            prop_ranges.len(),
            nb_leaves,
            predictability as u16,
            options.maniac_cutoff,
            options.maniac_alpha,
        );
        let mut properties = vec![0i32; prop_ranges.len()];
        for i in beginc..=endc {
            let ch = &image.channel[i];
            if ch.minval == ch.maxval {
                continue;
            }
            let prior = &image.channel[..beginc];
            let mut refs = ReferenceRow::new(prop_ranges.len() - NB_NONREF_PROPERTIES, ch.w);
            for y in 0..ch.h {
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
                    let diff = ch.row(y)[x] - guess;
                    coder.write_int(
                        &mut rac,
                        &properties,
                        ch.minval - guess,
                        ch.maxval - guess,
                        diff,
                    );
                }
            }
        }
    }
    rac.flush();
    Ok(header.header_pos)
}

fn predictor_for_channel(options: &Options, i: usize) -> u32 {
    // three bits in the group header
    options
        .predictor
        .get(i)
        .or(options.predictor.last())
        .copied()
        .unwrap_or(0)
        .min(7)
}

/// Encodes a prepared image to a complete bitstream.
pub fn encode(image: &Image, options: &Options) -> Result<Vec<u8>> {
    if image.w == 0 || image.h == 0 {
        return Err(Error::InvalidImageSize(image.w as u64, image.h as u64));
    }
    let mut header = BlobWriter::new();
    let magic: &[u8; 4] = if image.nb_frames < 2 { b"FUIF" } else { b"FUAF" };
    for &b in magic {
        header.write_byte(b);
    }
    write_varint(&mut header, image.real_nb_channels as u64 + b'0' as u64);
    let mut bit_depth: u64 = 1;
    let mut maxval: i64 = 1;
    while maxval < image.maxval as i64 {
        bit_depth += 1;
        maxval = maxval * 2 + 1;
    }
    write_varint(&mut header, bit_depth + b'&' as u64);
    write_varint(&mut header, image.w as u64 - 1);
    write_varint(&mut header, image.h as u64 - 1);
    if image.nb_frames > 1 {
        write_varint(&mut header, image.nb_frames as u64 - 2);
        write_varint(&mut header, image.den.max(1) as u64 - 1);
        if image.num.is_empty() {
            write_varint(&mut header, 0);
        } else {
            for &n in &image.num {
                write_varint(&mut header, n as u64);
            }
        }
        write_varint(&mut header, image.loops as u64);
    }
    write_varint(&mut header, image.colormodel as u64);
    write_varint(&mut header, options.max_properties as u64);

    if image.real_nb_channels < 1 {
        return Ok(header.into_bytes());
    }

    let mut io = BlobWriter::new();

    // transform list
    write_varint(&mut io, image.transform.len() as u64);
    for t in &image.transform {
        let nb_params = if t.has_parameters() {
            t.parameters.len()
        } else {
            0
        };
        write_varint(&mut io, ((nb_params << 4) | t.id as usize) as u64);
        for &p in t.parameters.iter().take(nb_params) {
            write_varint(&mut io, p as u64);
        }
    }

    let nb_channels = image.channel.len();
    let mut responsive_offsets: [i64; 5] = [-1; 5];
    let mut rng = XorShiftRng::from_seed(TRAINING_SEED);

    let mut i = 0;
    while i < nb_channels {
        if image.channel[i].is_empty() {
            i += 1;
            continue;
        }
        let predictor = predictor_for_channel(options, i);
        let mut tree = Tree::new();

        if !options.compress {
            encode_group_channels(
                &mut io, &mut tree, options, None, predictor, i, i, image, false, false,
            )?;
            i += 1;
            continue;
        }

        // group channels up to the next downscale cut-point
        let mut j = i;
        for s in 1..5 {
            if j > image.downscales[s] && j < image.downscales[s + 1] {
                j = image.downscales[s + 1];
            }
        }
        // only clump channels with identical dimensions
        for k in i + 1..=j {
            if image.channel[i].w != image.channel[k].w || image.channel[i].h != image.channel[k].h
            {
                j = k - 1;
                break;
            }
        }
        if options.max_group > 0 && j >= i + options.max_group as usize {
            j = i + options.max_group as usize - 1;
        }

        let mut dummy = DiscardSink::new();
        encode_group_channels(
            &mut dummy,
            &mut tree,
            options,
            Some(&mut rng),
            predictor,
            i,
            j,
            image,
            true,
            true,
        )?;
        let before = io.tell();
        let header_pos = encode_group_channels(
            &mut io, &mut tree, options, None, predictor, i, j, image, false, true,
        )?;
        let mut after = io.tell();

        // estimate the uncompressed size; roll back when compression lost
        let bits = (after - header_pos) as f64 * 8.0;
        let mut ubits = 0.0f64;
        for k in i..=j {
            let ch = &image.channel[k];
            if ch.maxval > ch.minval {
                let bpp = ilog2((ch.maxval - ch.minval) as u32) as f64 + 1.0;
                ubits += (ch.w * ch.h) as f64 * bpp;
            }
        }
        if ubits > 0.0 {
            ubits += 16.0; // coder flush
        }
        if bits >= ubits {
            io.seek(before);
            encode_group_channels(
                &mut io, &mut tree, options, None, predictor, i, j, image, false, false,
            )?;
            after = io.tell();
            debug!("rolled back channels {}-{} to uncompressed", i, j);
        }

        for s in 0..5 {
            if image.downscales[s] >= i && image.downscales[s] <= j {
                responsive_offsets[s] = after as i64;
            }
        }
        i = j + 1;
    }

    // delta-coded truncation offsets, relative to the end of this header
    let mut relative_offset: i64 = 0;
    for s in 0..5 {
        if responsive_offsets[s] < 0 {
            responsive_offsets[s] = io.tell() as i64;
        }
        let offset = (responsive_offsets[s] - relative_offset).max(0) as usize;
        write_varint(
            &mut header,
            offset.div_ceil(TRUNCATION_OFFSET_RESOLUTION) as u64,
        );
        relative_offset = responsive_offsets[s];
    }

    let mut out = header.into_bytes();
    out.extend_from_slice(io.as_slice());
    Ok(out)
}
