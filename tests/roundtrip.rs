// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Whole-bitstream round trips: encode with the default pipeline, decode,
//! undo the transforms and compare samples.

use fuif::decode::{decode, decode_info};
use fuif::image::Image;
use fuif::options::Options;
use fuif::pipeline::{PipelineOptions, compress};
use fuif::transform::TransformId;

fn assert_roundtrip(original: &Image, options: Options, popts: PipelineOptions) -> Vec<u8> {
    let mut to_encode = original.clone();
    let mut enc_options = options.clone();
    let data = compress(&mut to_encode, &mut enc_options, &popts).expect("encode");

    let mut decoded = decode(&data, &options).expect("decode");
    decoded.undo_transforms(0).expect("undo transforms");
    assert_eq!(decoded.channel.len(), original.channel.len());
    for (c, (a, b)) in decoded.channel.iter().zip(original.channel.iter()).enumerate() {
        assert_eq!((a.w, a.h), (b.w, b.h), "channel {c} dimensions");
        assert_eq!(a.data, b.data, "channel {c} samples");
    }
    data
}

fn solid_options() -> PipelineOptions {
    PipelineOptions {
        palette_colors: 0,
        channel_colors: 0.0,
        channel_colors_pre_transform: 0.0,
        ..PipelineOptions::default()
    }
}

#[test]
fn one_pixel_rgb_round_trips() {
    let mut image = Image::new(1, 1, 255, 3, 0);
    image.channel[0].data[0] = 128;
    image.channel[1].data[0] = 64;
    image.channel[2].data[0] = 200;
    let data = assert_roundtrip(&image, Options::default(), PipelineOptions::default());
    assert_eq!(&data[0..4], b"FUIF");
    assert!(data.len() < 64, "blob unexpectedly large: {}", data.len());
}

#[test]
fn grayscale_ramp_with_median_predictor_round_trips() {
    let mut image = Image::new(4, 4, 63, 1, 0);
    for y in 0..4 {
        for x in 0..4 {
            image.channel[0].row_mut(y)[x] = (16 * y + x) as i32;
        }
    }
    let options = Options {
        predictor: vec![2],
        ..Options::default()
    };
    // no pipeline transforms: responsive off keeps the ramp as one group
    let popts = PipelineOptions {
        responsive: false,
        palette_colors: 0,
        channel_colors: 0.0,
        channel_colors_pre_transform: 0.0,
        colorspace: fuif::pipeline::ColorSpace::Rgb,
        ..PipelineOptions::default()
    };
    assert_roundtrip(&image, options, popts);
}

#[test]
fn constant_color_image_encodes_trivially() {
    let mut image = Image::new(16, 16, 255, 3, 0);
    image.channel[0].data.fill(90);
    image.channel[1].data.fill(170);
    image.channel[2].data.fill(33);
    let data = assert_roundtrip(&image, Options::default(), solid_options());
    // every channel is constant, so the payload is group headers only
    assert!(data.len() < 500, "constant image blob: {} bytes", data.len());
}

#[test]
fn two_color_image_uses_a_palette() {
    let mut image = Image::new(8, 8, 255, 3, 0);
    for y in 0..8 {
        for x in 0..8 {
            let on = x >= 4;
            image.channel[0].row_mut(y)[x] = if on { 200 } else { 10 };
            image.channel[1].row_mut(y)[x] = if on { 100 } else { 20 };
            image.channel[2].row_mut(y)[x] = if on { 50 } else { 30 };
        }
    }
    let popts = PipelineOptions {
        palette_colors: 8,
        ..PipelineOptions::default()
    };
    let data = assert_roundtrip(&image, Options::default(), popts);

    let decoded = decode(&data, &Options::default()).expect("decode");
    let pal = decoded
        .transform
        .iter()
        .find(|t| t.id == TransformId::Palette)
        .expect("palette transform recorded");
    assert_eq!(pal.parameters, vec![0, 2, 2]);
}

#[test]
fn ycocg_squeeze_round_trips() {
    let mut image = Image::new(8, 8, 255, 3, 0);
    for y in 0..8 {
        for x in 0..8 {
            image.channel[0].row_mut(y)[x] = (x * 30) as i32;
            image.channel[1].row_mut(y)[x] = (y * 30) as i32;
            image.channel[2].row_mut(y)[x] = ((x + y) * 15) as i32;
        }
    }
    let original = image.clone();

    // transform-level check: explicit one-step horizontal squeeze
    image
        .do_transform(fuif::transform::Transform::new(TransformId::YCoCg))
        .unwrap();
    image
        .do_transform(fuif::transform::Transform::with_parameters(
            TransformId::Squeeze,
            vec![1, 0, 2],
        ))
        .unwrap();
    assert_eq!(image.channel.len(), 6);
    for c in 0..3 {
        assert_eq!(image.channel[c].w, 4, "average channel width");
        assert_eq!(image.channel[3 + c].w, 4, "residual channel width");
    }
    image.undo_transforms(0).unwrap();
    for c in 0..3 {
        assert_eq!(image.channel[c].data, original.channel[c].data);
    }

    // and the full bitstream path
    assert_roundtrip(&original, Options::default(), solid_options());
}

#[test]
fn two_frame_animation_uses_matching() {
    let mut image = Image::new(8, 16, 255, 1, 0);
    image.nb_frames = 2;
    for y in 0..8 {
        for x in 0..8 {
            let v = ((x * 29 + y * 13) % 250) as i32;
            image.channel[0].row_mut(y)[x] = v;
            image.channel[0].row_mut(y + 8)[x] = v; // identical second frame
        }
    }
    let data = assert_roundtrip(&image, Options::default(), solid_options());
    assert_eq!(&data[0..4], b"FUAF");

    let decoded = decode(&data, &Options::default()).expect("decode");
    assert!(
        decoded
            .transform
            .iter()
            .any(|t| t.id == TransformId::Match),
        "expected a matching transform for the animation"
    );
    assert_eq!(decoded.nb_frames, 2);
}

#[test]
fn gradient_image_round_trips_and_is_deterministic() {
    let mut image = Image::new(32, 24, 255, 3, 0);
    for y in 0..24 {
        for x in 0..32 {
            image.channel[0].row_mut(y)[x] = ((x * 255) / 31) as i32;
            image.channel[1].row_mut(y)[x] = ((y * 255) / 23) as i32;
            image.channel[2].row_mut(y)[x] = (((x + y) * 255) / 54) as i32;
        }
    }
    let data1 = assert_roundtrip(&image, Options::default(), PipelineOptions::default());
    let data2 = assert_roundtrip(&image, Options::default(), PipelineOptions::default());
    assert_eq!(data1, data2, "encoding must be byte-deterministic");
}

#[test]
fn uncompressed_mode_round_trips() {
    let mut image = Image::new(11, 7, 255, 3, 0);
    for y in 0..7 {
        for x in 0..11 {
            for c in 0..3 {
                image.channel[c].row_mut(y)[x] = ((x * 23 + y * 31 + c * 57) % 256) as i32;
            }
        }
    }
    let options = Options {
        compress: false,
        ..Options::default()
    };
    assert_roundtrip(&image, options, solid_options());
}

#[test]
fn prefix_decodes_are_valid() {
    let mut image = Image::new(40, 28, 255, 3, 0);
    for y in 0..28 {
        for x in 0..40 {
            image.channel[0].row_mut(y)[x] = ((x * 6 + y) % 256) as i32;
            image.channel[1].row_mut(y)[x] = ((x + y * 9) % 256) as i32;
            image.channel[2].row_mut(y)[x] = ((x * x + y) % 256) as i32;
        }
    }
    let mut to_encode = image.clone();
    let mut options = Options::default();
    let data = compress(&mut to_encode, &mut options, &solid_options()).expect("encode");

    let info = decode_info(&data).expect("identify");
    assert_eq!((info.w, info.h), (40, 28));
    assert_eq!(info.nb_channels, 3);
    let mut prev = 0;
    for &off in &info.truncation_offsets {
        assert!(off >= prev, "offsets must not decrease");
        assert!(off <= data.len(), "offset past end of file");
        prev = off;
    }

    for (k, &off) in info.truncation_offsets.iter().enumerate() {
        // decoding the prefix must succeed with channels empty or complete
        let mut partial = decode(&data[..off], &Options::default())
            .unwrap_or_else(|e| panic!("prefix {k} failed: {e}"));
        for (c, ch) in partial.channel.iter().enumerate() {
            // either untouched (empty or still the zero-initialized
            // allocation) or a complete grid
            assert!(
                ch.data.is_empty() || ch.data.len() >= ch.w * ch.h,
                "channel {c} partially decoded at prefix {k}"
            );
        }
        // and the result must be renderable
        partial.undo_transforms(0).expect("render truncated decode");
        assert_eq!(partial.channel.len(), 3);
        for ch in &partial.channel {
            assert_eq!((ch.w, ch.h), (40, 28));
        }

        // requesting the matching preview level on the full file also works
        let opts = Options {
            preview: k as i32,
            ..Options::default()
        };
        let mut preview = decode(&data, &opts).expect("preview decode");
        preview.undo_transforms(0).expect("render preview");
    }
}

#[test]
fn arbitrary_truncation_never_panics() {
    let mut image = Image::new(16, 16, 255, 1, 0);
    for y in 0..16 {
        for x in 0..16 {
            image.channel[0].row_mut(y)[x] = ((x * y * 7) % 256) as i32;
        }
    }
    let mut to_encode = image.clone();
    let mut options = Options::default();
    let data = compress(&mut to_encode, &mut options, &solid_options()).expect("encode");

    let mut cut = 5;
    while cut < data.len() {
        if let Ok(mut partial) = decode(&data[..cut], &Options::default()) {
            let _ = partial.undo_transforms(0);
        }
        cut += 7;
    }
}

#[test]
fn dct_mode_is_near_lossless_at_full_quality() {
    let mut image = Image::new(80, 72, 255, 3, 0);
    for y in 0..72 {
        for x in 0..80 {
            image.channel[0].row_mut(y)[x] = ((x * 255) / 79) as i32;
            image.channel[1].row_mut(y)[x] = ((y * 255) / 71) as i32;
            image.channel[2].row_mut(y)[x] = (((x + y) * 255) / 150) as i32;
        }
    }
    let popts = PipelineOptions {
        use_dct: true,
        palette_colors: 0,
        channel_colors: 0.0,
        channel_colors_pre_transform: 0.0,
        ..PipelineOptions::default()
    };
    let mut to_encode = image.clone();
    let mut options = Options::default();
    let data = compress(&mut to_encode, &mut options, &popts).expect("encode");

    let decoded = decode(&data, &Options::default()).expect("decode");
    assert!(decoded.transform.iter().any(|t| t.id == TransformId::Dct));
    let mut rendered = decoded;
    rendered.undo_transforms(0).expect("undo transforms");
    for c in 0..3 {
        for (a, b) in rendered.channel[c]
            .data
            .iter()
            .zip(image.channel[c].data.iter())
        {
            assert!(
                (a - b).abs() <= 8,
                "channel {c}: {a} vs {b} beyond DCT rounding"
            );
        }
    }
}

#[test]
fn sixteen_bit_input_round_trips() {
    let mut image = Image::new(12, 9, 16383, 1, 0);
    for y in 0..9 {
        for x in 0..12 {
            image.channel[0].row_mut(y)[x] = ((x * 1361 + y * 797) % 16384) as i32;
        }
    }
    assert_roundtrip(&image, Options::default(), solid_options());
}

#[test]
fn identify_reports_animation_fields() {
    let mut image = Image::new(4, 8, 255, 1, 0);
    image.nb_frames = 2;
    image.den = 25;
    image.loops = 3;
    for (i, v) in image.channel[0].data.iter_mut().enumerate() {
        *v = (i % 200) as i32;
    }
    let mut to_encode = image.clone();
    let mut options = Options::default();
    let data = compress(&mut to_encode, &mut options, &solid_options()).expect("encode");
    let info = decode_info(&data).expect("identify");
    assert!(info.animation);
    assert_eq!(info.nb_frames, 2);
    assert_eq!(info.den, 25);
    assert_eq!(info.loops, 3);
    assert_eq!((info.w, info.h), (4, 8));
}
