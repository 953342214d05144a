// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

/// Codec options. Most fields steer the encoder; `preview` gates the
/// decoder, and the MANIAC table parameters are needed on both sides
/// because they are not carried in the bitstream.
#[derive(Debug, Clone)]
pub struct Options {
    /// Partial decode: -1 = full image, 0 = LQIP, 1..4 = scale 1:16..1:2.
    pub preview: i32,
    /// Fraction of rows (times channel height) visited by the tree-learning
    /// pass; does not have to be an integer.
    pub nb_repeats: f32,
    /// Maximum 2D-match distance; negative values look `|n|` frames back at
    /// corresponding positions only, 0 disables matching.
    pub max_dist: i32,
    /// Maximum number of previous-channel properties in the MANIAC trees.
    pub max_properties: usize,
    /// Probability clamp of the adaptive bit models for channel payloads.
    pub maniac_cutoff: i32,
    /// Adaptation rate of the bit models, in units of 2^-32.
    pub maniac_alpha: u32,
    /// When false, every group is stored through the uniform coder.
    pub compress: bool,
    /// Upper bound on the number of channels per group; -1 = no limit.
    pub max_group: i32,
    /// Per-channel predictor selection; the last entry repeats for the
    /// remaining channels.
    pub predictor: Vec<u32>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            preview: -1,
            nb_repeats: 0.5,
            max_dist: 0,
            max_properties: 12,
            maniac_cutoff: 6,
            maniac_alpha: 0x0d00_0000,
            compress: true,
            max_group: -1,
            predictor: Vec::new(),
        }
    }
}
