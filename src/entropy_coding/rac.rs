// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! 24-bit range coder. One encoder/decoder pair is created per
//! channel-group payload; the encoder's `flush` drains its state so that
//! the decoder, which pre-reads three bytes and refills one byte per
//! renormalization, consumes exactly the bytes written for the group.

use crate::io::{ByteSink, ByteSource};

const MAX_RANGE_BITS: u32 = 24;
const MIN_RANGE_BITS: u32 = 16;
const MIN_RANGE: u32 = 1 << MIN_RANGE_BITS;
const BASE_RANGE: u32 = 1 << MAX_RANGE_BITS;

/// Scales a 12-bit chance to the current range without a 64-bit multiply.
#[inline]
fn chance_12bit_chance(b12: u16, range: u32) -> u32 {
    let b12 = b12 as u32;
    (((range & 0xfff) * b12 + 0x800) >> 12) + ((range >> 12) * b12)
}

pub struct RacInput<'a, S: ByteSource> {
    source: &'a mut S,
    range: u32,
    low: u32,
}

impl<'a, S: ByteSource> RacInput<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        let mut rac = RacInput {
            source,
            range: BASE_RANGE,
            low: 0,
        };
        let mut r = BASE_RANGE;
        while r > 1 {
            rac.low = (rac.low << 8) | rac.read_byte_or_zero();
            r >>= 8;
        }
        rac
    }

    /// Premature end of data yields zero bytes; truncation is detected by
    /// the caller through the byte-budget gate.
    #[inline]
    fn read_byte_or_zero(&mut self) -> u32 {
        self.source.read_byte().unwrap_or(0) as u32
    }

    /// The underlying source, for position and end-of-data gates.
    pub fn source(&self) -> &S {
        &*self.source
    }

    #[inline]
    fn input(&mut self) {
        while self.range <= MIN_RANGE {
            self.low = (self.low << 8) | self.read_byte_or_zero();
            self.range <<= 8;
        }
    }

    #[inline]
    fn get(&mut self, chance: u32) -> bool {
        debug_assert!(chance > 0);
        debug_assert!(chance < self.range);
        if self.low >= self.range - chance {
            self.low -= self.range - chance;
            self.range = chance;
            self.input();
            true
        } else {
            self.range -= chance;
            self.input();
            false
        }
    }

    #[inline]
    pub fn read_12bit_chance(&mut self, b12: u16) -> bool {
        let chance = chance_12bit_chance(b12, self.range);
        self.get(chance)
    }

    #[inline]
    pub fn read_bit(&mut self) -> bool {
        let chance = self.range >> 1;
        self.get(chance)
    }
}

pub struct RacOutput<'a, S: ByteSink> {
    sink: &'a mut S,
    range: u32,
    low: u32,
    /// Carry resolution: the most recent output byte is held back until the
    /// next byte decides whether a carry propagates into it, together with
    /// a run of bytes that would become 0xff (no carry) or 0x00 (carry).
    delayed_byte: i32,
    delayed_count: u32,
}

impl<'a, S: ByteSink> RacOutput<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        RacOutput {
            sink,
            range: BASE_RANGE,
            low: 0,
            delayed_byte: -1,
            delayed_count: 0,
        }
    }

    fn output(&mut self) {
        while self.range <= MIN_RANGE {
            let byte = (self.low >> MIN_RANGE_BITS) as i32;
            if self.delayed_byte < 0 {
                // first byte of the stream
                self.delayed_byte = byte;
            } else if ((self.low + self.range) >> 8) < MIN_RANGE {
                // definitely no carry
                self.sink.write_byte(self.delayed_byte as u8);
                for _ in 0..self.delayed_count {
                    self.sink.write_byte(0xff);
                }
                self.delayed_count = 0;
                self.delayed_byte = byte;
            } else if (self.low >> 8) >= MIN_RANGE {
                // definitely carry
                self.sink.write_byte((self.delayed_byte + 1) as u8);
                for _ in 0..self.delayed_count {
                    self.sink.write_byte(0);
                }
                self.delayed_count = 0;
                self.delayed_byte = byte & 0xff;
            } else {
                self.delayed_count += 1;
            }
            self.low = (self.low & (MIN_RANGE - 1)) << 8;
            self.range <<= 8;
        }
    }

    #[inline]
    fn put(&mut self, chance: u32, bit: bool) {
        debug_assert!(chance > 0);
        debug_assert!(chance < self.range);
        if bit {
            self.low += self.range - chance;
            self.range = chance;
        } else {
            self.range -= chance;
        }
        self.output();
    }

    #[inline]
    pub fn write_12bit_chance(&mut self, b12: u16, bit: bool) {
        let chance = chance_12bit_chance(b12, self.range);
        self.put(chance, bit);
    }

    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        let chance = self.range >> 1;
        self.put(chance, bit);
    }

    /// Drains the coder state. The last generated byte stays unwritten by
    /// construction: the decoder pre-reads three bytes at startup, so the
    /// byte counts of both sides line up at the group boundary.
    pub fn flush(&mut self) {
        self.low += MIN_RANGE - 1;
        for _ in 0..4 {
            self.range = MIN_RANGE - 1;
            self.output();
        }
    }
}
