// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Reversible channel transforms. A transform record is its id plus a
//! vector of integer parameters; `meta_apply` adjusts channel geometry
//! without touching samples (the decoder runs it while parsing the
//! transform list so later channels have correct shapes), `apply` moves
//! the samples themselves.

pub mod approximate;
pub mod dct;
pub mod match2d;
pub mod palette;
pub mod permute;
pub mod quantize;
pub mod squeeze;
pub mod subsample;
pub mod ycbcr;
pub mod ycocg;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::error::{Error, Result};
use crate::image::Image;

#[repr(u32)]
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum TransformId {
    /// BT.601 RGB to YCbCr, lossy.
    YCbCr = 0,
    /// Lossless reversible color rotation.
    YCoCg = 1,
    /// Reserved.
    ICtCp = 2,
    ChromaSubsample = 3,
    /// 8x8 float DCT; each channel becomes 64 coefficient channels.
    Dct = 4,
    Quantize = 5,
    Palette = 6,
    /// Haar-style lifting with a tendency-corrected residual.
    Squeeze = 7,
    /// 2D matching against earlier pixels or previous frames.
    Match = 8,
    Permute = 9,
    /// Lossless quantization: remainders go to a new channel.
    Approximate = 10,
    /// Reserved.
    Xyb = 11,
}

#[derive(Debug, Clone)]
pub struct Transform {
    pub id: TransformId,
    pub parameters: Vec<i32>,
}

impl Transform {
    pub fn new(id: TransformId) -> Transform {
        Transform {
            id,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameters(id: TransformId, parameters: Vec<i32>) -> Transform {
        Transform { id, parameters }
    }

    pub fn from_id(id: u32) -> Result<Transform> {
        TransformId::from_u32(id)
            .map(Transform::new)
            .ok_or(Error::UnknownTransform(id))
    }

    /// Whether `parameters` is serialized in the transform list. Color
    /// transforms always work on the first three channels and quantization
    /// factors travel in the channel metadata, so neither carries any.
    pub fn has_parameters(&self) -> bool {
        matches!(
            self.id,
            TransformId::ChromaSubsample
                | TransformId::Palette
                | TransformId::Squeeze
                | TransformId::Dct
                | TransformId::Match
                | TransformId::Permute
                | TransformId::Approximate
        )
    }

    pub fn name(&self) -> &'static str {
        match self.id {
            TransformId::YCbCr => "YCbCr",
            TransformId::YCoCg => "YCoCg",
            TransformId::ICtCp => "ICtCp",
            TransformId::ChromaSubsample => "ChromaSubsampling",
            TransformId::Dct => "DCT",
            TransformId::Quantize => "Quantization",
            TransformId::Palette => "Palette",
            TransformId::Squeeze => "Squeeze",
            TransformId::Match => "Matching",
            TransformId::Permute => "Permutation",
            TransformId::Approximate => "Approximation",
            TransformId::Xyb => "XYB",
        }
    }

    /// Applies the sample transform. Returns `Ok(false)` when the
    /// transform declines the image (e.g. a palette with too many colors);
    /// a declined transform is not recorded.
    pub fn apply(&mut self, image: &mut Image, inverse: bool) -> Result<bool> {
        match self.id {
            TransformId::YCbCr => ycbcr::ycbcr(image, inverse),
            TransformId::YCoCg => ycocg::ycocg(image, inverse),
            TransformId::ChromaSubsample => subsample::subsample(image, inverse, &self.parameters),
            TransformId::Dct => dct::dct(image, inverse, &mut self.parameters),
            TransformId::Quantize => quantize::quantize(image, inverse, &self.parameters),
            TransformId::Palette => palette::palette(image, inverse, &mut self.parameters),
            TransformId::Squeeze => squeeze::squeeze(image, inverse, &self.parameters),
            TransformId::Match => match2d::match2d(image, inverse, &mut self.parameters),
            TransformId::Permute => permute::permute(image, inverse, &mut self.parameters),
            TransformId::Approximate => approximate::approximate(image, inverse, &self.parameters),
            TransformId::ICtCp | TransformId::Xyb => Err(Error::UnknownTransform(self.id as u32)),
        }
    }

    /// Adjusts channel counts, dimensions and shifts the way the forward
    /// transform would, without sample data. Transforms with defaulted
    /// parameters freeze them here so the inverse sees the geometry that
    /// existed when the transform was recorded.
    pub fn meta_apply(&mut self, image: &mut Image) -> Result<()> {
        match self.id {
            TransformId::YCbCr | TransformId::YCoCg | TransformId::Quantize => Ok(()),
            TransformId::ChromaSubsample => subsample::meta_subsample(image, &self.parameters),
            TransformId::Dct => dct::meta_dct(image, &mut self.parameters),
            TransformId::Palette => palette::meta_palette(image, &self.parameters),
            TransformId::Squeeze => squeeze::meta_squeeze(image, &mut self.parameters),
            TransformId::Match => match2d::meta_match(image, &mut self.parameters),
            TransformId::Permute => permute::meta_permute(image, &mut self.parameters, false),
            TransformId::Approximate => approximate::meta_approximate(image, &self.parameters),
            TransformId::ICtCp | TransformId::Xyb => Err(Error::UnknownTransform(self.id as u32)),
        }
    }
}
