// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Coding of one signed integer in a known range: a zero flag, an optional
//! sign, a unary exponent and mantissa bits, each with its own adaptive
//! probability. Bits whose value is forced by the range are skipped.

use array_init::array_init;

use crate::entropy_coding::chance::{BitChance, ChanceTable};
use crate::entropy_coding::rac::{RacInput, RacOutput};
use crate::io::{ByteSink, ByteSource};
use crate::util::ilog2;

/// Sizing of the per-symbol bit-model arrays. This only has to be large
/// enough for the value ranges that are actually coded (channel payloads
/// are separately capped by `MAX_BIT_DEPTH`, tree split values by the
/// property ranges); the array size itself never reaches the bitstream.
pub const MAX_SYMBOL_BITS: usize = 31;

pub const ZERO_CHANCE: u16 = 1024;
pub const SIGN_CHANCE: u16 = 0x800;
pub const MANT_CHANCE: u16 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBit {
    Zero,
    Sign,
    Exp(usize),
    Mant(usize),
}

/// Probability state for one symbol context.
#[derive(Debug, Clone)]
pub struct SymbolChance {
    bit_zero: BitChance,
    bit_sign: BitChance,
    bit_exp: [BitChance; MAX_SYMBOL_BITS - 1],
    bit_mant: [BitChance; MAX_SYMBOL_BITS],
}

impl SymbolChance {
    pub fn new(zero_chance: u16) -> SymbolChance {
        let mut sc = SymbolChance {
            bit_zero: BitChance::with_chance(zero_chance),
            bit_sign: BitChance::with_chance(SIGN_CHANCE),
            bit_exp: array_init(|_| BitChance::new()),
            bit_mant: array_init(|_| BitChance::with_chance(MANT_CHANCE)),
        };
        // Seed the exponent bits assuming a geometric distribution with
        // parameter zero_chance/4096:
        //   Pr(X >= 2^i and X < 2^(i+1) | X >= 2^i) = 1 - (1-p)^(2^i)
        let mut rp: u64 = 0x1000 - zero_chance as u64;
        for i in 0..MAX_SYMBOL_BITS - 1 {
            rp = rp.clamp(0x100, 0xf00);
            sc.bit_exp[i].set((0x1000 - rp) as u16);
            rp = (rp * rp + 0x800) >> 12;
        }
        sc
    }

    #[inline]
    pub fn bit(&mut self, b: SymbolBit) -> &mut BitChance {
        match b {
            SymbolBit::Zero => &mut self.bit_zero,
            SymbolBit::Sign => &mut self.bit_sign,
            SymbolBit::Exp(i) => &mut self.bit_exp[i],
            SymbolBit::Mant(i) => &mut self.bit_mant[i],
        }
    }
}

/// Writes `value` in `[min, max]` through the given bit writer. The range
/// must contain zero; the caller guarantees this by coding residuals
/// relative to an in-range guess.
pub fn write_symbol(min: i32, max: i32, value: i32, bit: &mut impl FnMut(bool, SymbolBit)) {
    debug_assert!(min <= value && value <= max);
    if min == max {
        return;
    }
    debug_assert!(min <= 0 && max >= 0);
    if value == 0 {
        bit(true, SymbolBit::Zero);
        return;
    }
    bit(false, SymbolBit::Zero);
    let sign = value > 0;
    if max > 0 && min < 0 {
        bit(sign, SymbolBit::Sign);
    }
    let a = value.unsigned_abs();
    let e = ilog2(a) as usize;
    let amax = if sign {
        max.unsigned_abs()
    } else {
        min.unsigned_abs()
    };
    let emax = ilog2(amax) as usize;

    let mut i = 0;
    while i < emax {
        if (1u32 << (i + 1)) > amax {
            break;
        }
        bit(i == e, SymbolBit::Exp(i));
        if i == e {
            break;
        }
        i += 1;
    }

    let mut have = 1u32 << e;
    for pos in (0..e).rev() {
        let minabs1 = have | (1 << pos);
        if minabs1 > amax {
            continue; // a 1 bit here would overflow the range
        }
        let b = (a >> pos) & 1;
        bit(b == 1, SymbolBit::Mant(pos));
        have |= b << pos;
    }
}

/// Mirror of `write_symbol`.
pub fn read_symbol(min: i32, max: i32, bit: &mut impl FnMut(SymbolBit) -> bool) -> i32 {
    debug_assert!(min <= max);
    if min == max {
        return min;
    }
    debug_assert!(min <= 0 && max >= 0);
    if bit(SymbolBit::Zero) {
        return 0;
    }
    let sign = if min < 0 {
        if max > 0 { bit(SymbolBit::Sign) } else { false }
    } else {
        true
    };
    let amax = if sign {
        max.unsigned_abs()
    } else {
        min.unsigned_abs()
    };
    let emax = ilog2(amax) as usize;

    let mut e = 0;
    while e < emax {
        if bit(SymbolBit::Exp(e)) {
            break;
        }
        e += 1;
    }

    let mut have = 1u32 << e;
    for pos in (0..e).rev() {
        let minabs1 = have | (1 << pos);
        if minabs1 > amax {
            continue;
        }
        if bit(SymbolBit::Mant(pos)) {
            have = minabs1;
        }
    }
    if sign { have as i32 } else { -(have as i32) }
}

/// A symbol coder with a single private context, used for headers and for
/// the context-tree description itself.
pub struct SimpleSymbolCoder {
    ctx: SymbolChance,
    table: ChanceTable,
}

impl SimpleSymbolCoder {
    pub fn new() -> SimpleSymbolCoder {
        SimpleSymbolCoder {
            ctx: SymbolChance::new(ZERO_CHANCE),
            table: ChanceTable::default(),
        }
    }

    pub fn write_int<S: ByteSink>(&mut self, rac: &mut RacOutput<S>, min: i32, max: i32, value: i32) {
        let ctx = &mut self.ctx;
        let table = &self.table;
        write_symbol(min, max, value, &mut |b, t| {
            let ch = ctx.bit(t);
            rac.write_12bit_chance(ch.get(), b);
            ch.put(b, table);
        });
    }

    pub fn read_int<S: ByteSource>(&mut self, rac: &mut RacInput<S>, min: i32, max: i32) -> i32 {
        let ctx = &mut self.ctx;
        let table = &self.table;
        read_symbol(min, max, &mut |t| {
            let ch = ctx.bit(t);
            let b = rac.read_12bit_chance(ch.get());
            ch.put(b, table);
            b
        })
    }

    /// Like `write_int` but shifts one-sided ranges so they contain zero.
    pub fn write_int2<S: ByteSink>(
        &mut self,
        rac: &mut RacOutput<S>,
        min: i32,
        max: i32,
        value: i32,
    ) {
        if min > 0 {
            self.write_int(rac, 0, max - min, value - min);
        } else if max < 0 {
            self.write_int(rac, min - max, 0, value - max);
        } else {
            self.write_int(rac, min, max, value);
        }
    }

    pub fn read_int2<S: ByteSource>(&mut self, rac: &mut RacInput<S>, min: i32, max: i32) -> i32 {
        if min > 0 {
            self.read_int(rac, 0, max - min) + min
        } else if max < 0 {
            self.read_int(rac, min - max, 0) + max
        } else {
            self.read_int(rac, min, max)
        }
    }
}

impl Default for SimpleSymbolCoder {
    fn default() -> SimpleSymbolCoder {
        SimpleSymbolCoder::new()
    }
}

/// Context-free coding of a value in `[min, min+len]` by binary search;
/// used for the uncompressed channel representation.
pub fn read_uniform_int<S: ByteSource>(rac: &mut RacInput<S>, min: i32, len: i32) -> i32 {
    let mut min = min;
    let mut len = len;
    while len > 0 {
        let med = len / 2;
        if rac.read_bit() {
            min += med + 1;
            len -= med + 1;
        } else {
            len = med;
        }
    }
    min
}

pub fn write_uniform_int<S: ByteSink>(rac: &mut RacOutput<S>, min: i32, max: i32, value: i32) {
    debug_assert!(min <= value && value <= max);
    let mut max = max - min;
    let mut val = value - min;
    while max > 0 {
        let med = max / 2;
        if val > med {
            rac.write_bit(true);
            val -= med + 1;
            max -= med + 1;
        } else {
            rac.write_bit(false);
            max = med;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BlobReader, BlobWriter};
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    #[test]
    fn adaptive_symbols_round_trip() {
        let mut rng = XorShiftRng::from_seed([3; 16]);
        let mut cases: Vec<(i32, i32, i32)> = vec![
            (0, 0, 0),
            (-1, 1, 0),
            (-1, 1, -1),
            (-1, 1, 1),
            (0, 255, 17),
            (-255, 0, -128),
            (-100, 100, 0),
            (-32768, 32767, -32768),
            (-32768, 32767, 32767),
        ];
        for _ in 0..2000 {
            let min = -rng.random_range(0i32..5000);
            let max = rng.random_range(0i32..5000);
            let v = rng.random_range(min..=max);
            cases.push((min, max, v));
        }

        let mut sink = BlobWriter::new();
        {
            let mut rac = RacOutput::new(&mut sink);
            let mut coder = SimpleSymbolCoder::new();
            for &(min, max, v) in &cases {
                coder.write_int(&mut rac, min, max, v);
            }
            rac.flush();
        }
        let bytes = sink.into_bytes();
        let mut source = BlobReader::new(&bytes);
        let mut rac = RacInput::new(&mut source);
        let mut coder = SimpleSymbolCoder::new();
        for &(min, max, v) in &cases {
            assert_eq!(coder.read_int(&mut rac, min, max), v, "range {min}..{max}");
        }
    }

    #[test]
    fn shifted_ranges_round_trip() {
        let cases: &[(i32, i32, i32)] = &[
            (5, 10, 7),
            (5, 10, 5),
            (5, 10, 10),
            (-10, -5, -7),
            (-10, -5, -10),
            (1, 1, 1),
            (0, 3, 2),
        ];
        let mut sink = BlobWriter::new();
        {
            let mut rac = RacOutput::new(&mut sink);
            let mut coder = SimpleSymbolCoder::new();
            for &(min, max, v) in cases {
                coder.write_int2(&mut rac, min, max, v);
            }
            rac.flush();
        }
        let bytes = sink.into_bytes();
        let mut source = BlobReader::new(&bytes);
        let mut rac = RacInput::new(&mut source);
        let mut coder = SimpleSymbolCoder::new();
        for &(min, max, v) in cases {
            assert_eq!(coder.read_int2(&mut rac, min, max), v);
        }
    }

    #[test]
    fn uniform_ints_round_trip() {
        let mut sink = BlobWriter::new();
        {
            let mut rac = RacOutput::new(&mut sink);
            for v in -40..=40 {
                write_uniform_int(&mut rac, -40, 40, v);
            }
            write_uniform_int(&mut rac, 7, 7, 7);
            rac.flush();
        }
        let bytes = sink.into_bytes();
        let mut source = BlobReader::new(&bytes);
        let mut rac = RacInput::new(&mut source);
        for v in -40..=40 {
            assert_eq!(read_uniform_int(&mut rac, -40, 80), v);
        }
        assert_eq!(read_uniform_int(&mut rac, 7, 0), 7);
    }

    #[test]
    fn exponent_seed_is_clamped() {
        for zc in [32u16, 1024, 2048, 4064] {
            let mut sc = SymbolChance::new(zc);
            for i in 0..MAX_SYMBOL_BITS - 1 {
                let c = sc.bit(SymbolBit::Exp(i)).get();
                assert!((0x100..=0xf00).contains(&c), "zc={zc} i={i} c={c}");
            }
        }
    }
}
