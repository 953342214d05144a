// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid signature {0:02x}{1:02x}{2:02x}{3:02x}, expected FUIF or FUAF")]
    InvalidSignature(u8, u8, u8, u8),
    #[error("Varint longer than 10 bytes or out of range")]
    InvalidVarint,
    #[error("File ends inside the container header")]
    HeaderTruncated,
    #[error("Invalid image size: {0}x{1}")]
    InvalidImageSize(u64, u64),
    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(u64),
    #[error("Unknown transform id {0}")]
    UnknownTransform(u32),
    #[error("Transform {0} cannot be applied in the forward direction")]
    ForwardNotSupported(&'static str),
    #[error("Invalid parameters for transform {0}")]
    InvalidTransformParameters(&'static str),
    #[error("Transform refers to channel {0} but the image has {1} channels")]
    InvalidChannelRange(usize, usize),
    #[error("Invalid channel dimensions for transform {0}")]
    InvalidChannelDimensions(&'static str),
    #[error("Invalid permutation: channel {0} appears twice or is out of range")]
    InvalidPermutation(i32),
    #[error("Wrong channel range in group header: {0}-{1} of {2} channels")]
    InvalidGroupRange(usize, usize, usize),
    #[error("Invalid tree: split on empty range for property {0}")]
    TreeSplitOnEmptyRange(usize),
    #[error("Invalid tree: property index {0} out of range (have {1} properties)")]
    InvalidProperty(i32, usize),
    #[error("Tree too large: {0} nodes")]
    TreeTooLarge(usize),
    #[error("Range {0}..{1} with predictor {2} exceeds the compiled maximum bit depth")]
    BitDepthOverflow(i32, i32, u32),
    #[error("Stream corrupt: unexpected end of data inside a context tree")]
    CorruptStream,
    #[error("Match transform with unexpected quantization factor")]
    InvalidMatchQuantization,
}

pub type Result<T> = std::result::Result<T, Error>;
