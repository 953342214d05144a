// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Encoder-side selection of the transform chain: color rotation, palette
//! attempts, 2D matching, squeeze or DCT, quality-driven quantization and
//! trailing-scan approximation, plus the default predictor assignment.

use crate::encode::{encode, prepare_encode};
use crate::error::Result;
use crate::image::Image;
use crate::options::Options;
use crate::transform::dct::JPEG_ZIGZAG;
use crate::transform::{Transform, TransformId};
use crate::util::tracing_wrappers::*;

/// Quantization tables for the DCT path (mozjpeg quant-table 2).
#[rustfmt::skip]
const DCT_LUMA_QTABLE: [i32; 64] = [
    12, 17, 20, 21, 30, 34, 56, 63,
    18, 20, 20, 26, 28, 51, 61, 55,
    19, 20, 21, 26, 33, 58, 69, 55,
    26, 26, 26, 30, 46, 87, 86, 66,
    31, 33, 36, 40, 46, 96, 100, 73,
    40, 35, 46, 62, 81, 100, 111, 91,
    46, 66, 76, 86, 102, 121, 120, 101,
    68, 90, 90, 96, 113, 102, 105, 103,
];

#[rustfmt::skip]
const DCT_CHROMA_QTABLE: [i32; 64] = [
     8, 12, 15, 15, 86, 96, 96, 98,
    13, 13, 15, 26, 90, 96, 99, 98,
    12, 15, 18, 96, 99, 99, 99, 99,
    17, 16, 90, 96, 99, 99, 99, 99,
    96, 96, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// Per-shift quantization factors for the squeeze path, tuned for -Q 50;
/// other qualities scale them.
const SQUEEZE_QUALITY_FACTOR: f32 = 0.3;
const SQUEEZE_LUMA_FACTOR: f32 = 1.2;
const SQUEEZE_LUMA_QTABLE: [f32; 16] = [
    163.84, 81.92, 40.96, 20.48, 10.24, 5.12, 2.56, 1.28, 0.64, 0.32, 0.16, 0.08, 0.04, 0.02,
    0.01, 0.005,
];
/// For 8-bit input the YCoCg chroma range is -255..255, so this amounts to
/// 4:2:0 subsampling: the two finest layers quantize away.
const SQUEEZE_CHROMA_QTABLE: [f32; 16] = [
    1024.0, 512.0, 256.0, 128.0, 64.0, 32.0, 16.0, 8.0, 4.0, 2.0, 1.0, 0.5, 0.5, 0.5, 0.5, 0.5,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Rgb,
    YCbCr,
    YCoCg,
}

/// Transform-selection knobs, the library surface of the encoder CLI
/// options.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Luma quality, 100 = lossless.
    pub quality: f32,
    /// Chroma quality; defaults to `quality`.
    pub chroma_quality: Option<f32>,
    pub colorspace: ColorSpace,
    /// Color budget for the whole-image palette attempts; 0 disables.
    pub palette_colors: i32,
    /// Compact a channel when fewer than this share of its range occurs.
    pub channel_colors: f32,
    /// Same, before the color transform (16-bit inputs only).
    pub channel_colors_pre_transform: f32,
    /// JPEG-style DCT instead of squeeze (lossy).
    pub use_dct: bool,
    /// Emit the responsive squeeze chain.
    pub responsive: bool,
    /// Approximate the last k scans with quantization q.
    pub approximate: Option<(usize, i32)>,
}

impl Default for PipelineOptions {
    fn default() -> PipelineOptions {
        PipelineOptions {
            quality: 100.0,
            chroma_quality: None,
            colorspace: ColorSpace::YCoCg,
            palette_colors: 256,
            channel_colors: 0.7,
            channel_colors_pre_transform: 0.7,
            use_dct: false,
            responsive: true,
            approximate: None,
        }
    }
}

fn try_channel_compaction(image: &mut Image, ratio: f32, only_wide: bool) -> Result<()> {
    image.recompute_minmax();
    let mut i = 0;
    while i < image.nb_channels {
        let ch = &image.channel[image.nb_meta_channels + i];
        let colors = ch.maxval as i64 - ch.minval as i64 + 1;
        if only_wide && colors < 256 {
            i += 1;
            continue;
        }
        let budget = (ratio * colors as f32) as i32;
        let t = Transform::with_parameters(TransformId::Palette, vec![i as i32, i as i32, budget]);
        image.do_transform(t)?;
        i += 1;
    }
    Ok(())
}

fn quality_to_scale(quality: f32) -> f32 {
    let q = if quality > 50.0 {
        200.0 - quality * 2.0
    } else {
        900.0 - quality * 16.0
    };
    q * 0.01
}

/// Applies the standard forward transform chain for the given options and
/// fills in default predictors. `options.max_dist == 0` on a multi-frame
/// image selects previous-frame matching.
pub fn apply_default_pipeline(
    image: &mut Image,
    options: &mut Options,
    popts: &PipelineOptions,
) -> Result<()> {
    let mut popts = popts.clone();
    image.recompute_minmax();

    // a fully opaque alpha channel carries nothing
    if image.nb_channels > 3 {
        let a = &image.channel[image.nb_meta_channels + 3];
        if a.minval == image.maxval && a.maxval == image.maxval {
            debug!("dropping trivial alpha channel");
            image.nb_channels -= 1;
            image.real_nb_channels -= 1;
            image.channel.remove(image.nb_meta_channels + 3);
        }
    }

    let mut quality = popts.quality;
    let mut cquality = popts.chroma_quality.unwrap_or(popts.quality);
    if quality < 100.0 && popts.palette_colors > 0 {
        debug!("lossy encode, skipping palette transforms");
        popts.palette_colors = 0;
        popts.channel_colors = 0.0;
        popts.channel_colors_pre_transform = 0.0;
    }

    if popts.channel_colors_pre_transform > 0.0 && popts.colorspace != ColorSpace::Rgb {
        try_channel_compaction(image, popts.channel_colors_pre_transform, true)?;
    }

    image.recompute_minmax();
    match popts.colorspace {
        ColorSpace::YCoCg => {
            image.do_transform(Transform::new(TransformId::YCoCg))?;
        }
        ColorSpace::YCbCr => {
            image.do_transform(Transform::new(TransformId::YCbCr))?;
        }
        ColorSpace::Rgb => {}
    }

    if popts.palette_colors > 0 {
        if image.nb_channels > 1 {
            let t = Transform::with_parameters(
                TransformId::Palette,
                vec![0, image.nb_channels as i32 - 1, popts.palette_colors],
            );
            image.do_transform(t)?;
        }
        if image.nb_channels > 3 {
            // RGB with separate alpha, or CMY with separate K
            let t = Transform::with_parameters(
                TransformId::Palette,
                vec![0, image.nb_channels as i32 - 2, popts.palette_colors],
            );
            image.do_transform(t)?;
        }
    }
    if popts.channel_colors > 0.0 {
        try_channel_compaction(image, popts.channel_colors, false)?;
    }

    if image.nb_frames > 1 && options.max_dist == 0 {
        options.max_dist = -1; // match corresponding pixels one frame up
    }
    if options.max_dist != 0 {
        let t = Transform::with_parameters(
            TransformId::Match,
            vec![0, image.nb_channels as i32 - 1, 0, options.max_dist],
        );
        image.do_transform(t)?;
    }

    let mut has_dct = false;
    if popts.use_dct {
        image.do_transform(Transform::new(TransformId::Dct))?;
        has_dct = true;
    } else if popts.responsive
        && image.channel[image.nb_meta_channels].w * image.channel[image.nb_meta_channels].h > 20
    {
        // no point squeezing tiny images
        image.do_transform(Transform::new(TransformId::Squeeze))?;
        if options.max_group < 0 {
            options.max_group = 1;
        }
    }

    if quality < 100.0 || cquality < 100.0 {
        debug!(
            "quantizing for luma quality {} and chroma quality {}",
            quality, cquality
        );
        if !has_dct && !popts.responsive {
            // without a frequency transform this is plain color quantization
            quality = (400.0 + quality) / 5.0;
            cquality = (400.0 + cquality) / 5.0;
        }
        let qscale = quality_to_scale(quality);
        let cqscale = quality_to_scale(cquality);
        let mut t = Transform::new(TransformId::Quantize);
        for _ in 0..image.nb_meta_channels {
            t.parameters.push(1);
        }
        if has_dct {
            for nbi in 0..64 {
                let bi = JPEG_ZIGZAG
                    .iter()
                    .position(|&z| z == nbi)
                    .expect("the zigzag table is a permutation");
                for ci in 0..image.nb_channels {
                    let chroma = popts.colorspace != ColorSpace::Rgb && ci > 0 && ci < 3;
                    let q = if chroma {
                        (cqscale * DCT_CHROMA_QTABLE[bi] as f32) as i32
                    } else {
                        (qscale * DCT_LUMA_QTABLE[bi] as f32) as i32
                    };
                    t.parameters.push(q.max(1));
                }
            }
        } else {
            for c in image.nb_meta_channels..image.channel.len() {
                let ch = &image.channel[c];
                let shift = (ch.hcshift + ch.vcshift).min(15).max(0) as usize;
                let chroma = popts.colorspace != ColorSpace::Rgb
                    && ch.component > 0
                    && ch.component < 3;
                let q = if chroma {
                    (cqscale * SQUEEZE_QUALITY_FACTOR * SQUEEZE_CHROMA_QTABLE[shift]) as i32
                } else {
                    (qscale * SQUEEZE_QUALITY_FACTOR * SQUEEZE_LUMA_FACTOR
                        * SQUEEZE_LUMA_QTABLE[shift]) as i32
                };
                t.parameters.push(q.max(1));
            }
        }
        image.do_transform(t)?;
    }

    if let Some((k, q)) = popts.approximate {
        if k > 0 && k <= image.channel.len() {
            let t = Transform::with_parameters(
                TransformId::Approximate,
                vec![
                    (image.channel.len() - k) as i32,
                    image.channel.len() as i32 - 1,
                    q,
                ],
            );
            image.do_transform(t)?;
        }
    }

    // the DCT path still wants progressive DC scans
    if popts.responsive && has_dct {
        image.do_transform(Transform::new(TransformId::Squeeze))?;
    }

    if options.predictor.is_empty() {
        for _ in 0..image.nb_meta_channels {
            options.predictor.push(3); // left predictor for meta channels
        }
        for _ in 0..image.nb_channels {
            options.predictor.push(2); // median for DC / squeezed channels
        }
        options.predictor.push(0); // zero for AC / squeeze residuals
    }
    Ok(())
}

/// One-stop encode: forward pipeline, range/cut-point preparation, then
/// the bitstream.
pub fn compress(image: &mut Image, options: &mut Options, popts: &PipelineOptions) -> Result<Vec<u8>> {
    apply_default_pipeline(image, options, popts)?;
    prepare_encode(image);
    encode(image, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lossless_defaults_pick_ycocg_and_squeeze() {
        let mut image = Image::new(64, 48, 255, 3, 0);
        for y in 0..48 {
            for x in 0..64 {
                image.channel[0].row_mut(y)[x] = ((x * y) % 256) as i32;
                image.channel[1].row_mut(y)[x] = (x % 256) as i32;
                image.channel[2].row_mut(y)[x] = (y % 256) as i32;
            }
        }
        let mut options = Options::default();
        apply_default_pipeline(&mut image, &mut options, &PipelineOptions::default()).unwrap();
        let ids: Vec<TransformId> = image.transform.iter().map(|t| t.id).collect();
        assert!(ids.contains(&TransformId::YCoCg));
        assert!(ids.contains(&TransformId::Squeeze));
        assert_eq!(options.max_group, 1);
        assert!(!options.predictor.is_empty());
        assert_eq!(*options.predictor.last().unwrap(), 0);
    }

    #[test]
    fn tiny_images_are_not_squeezed() {
        let mut image = Image::new(2, 2, 255, 1, 0);
        let mut options = Options::default();
        apply_default_pipeline(&mut image, &mut options, &PipelineOptions::default()).unwrap();
        assert!(!image.transform.iter().any(|t| t.id == TransformId::Squeeze));
    }

    #[test]
    fn lossy_adds_quantization() {
        let mut image = Image::new(32, 32, 255, 3, 0);
        for y in 0..32 {
            for x in 0..32 {
                for c in 0..3 {
                    image.channel[c].row_mut(y)[x] = ((x * 7 + y * 3 + c * 11) % 256) as i32;
                }
            }
        }
        let mut options = Options::default();
        let popts = PipelineOptions {
            quality: 50.0,
            ..PipelineOptions::default()
        };
        apply_default_pipeline(&mut image, &mut options, &popts).unwrap();
        assert!(image.transform.iter().any(|t| t.id == TransformId::Quantize));
        // palettes are disabled for lossy encodes
        assert!(!image.transform.iter().any(|t| t.id == TransformId::Palette));
    }
}
