// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bit-packed codecs and the adapter that gives them a byte-oriented incremental decoder.
//!
//! A [`BitCodec`] reads and writes through a bit cursor. [`BitPacked`] wraps one as a
//! [`Codec`]: encoding pads the final byte with zero bits, and decoding re-runs the bit-level
//! reader over the bytes buffered so far until it either produces a value, fails for a reason
//! other than running out of bits, or reaches end of input. A value that ends mid-byte consumes
//! the whole byte, so from a framing perspective a bit-packed value looks exactly like a
//! byte-aligned one.
//!
//! Bits are read and written most significant first within each byte.

use bytes::{Buf as _, Bytes, BytesMut};

use crate::codec::Codec;
use crate::decode::{buffered, DecodeOutcome};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BitError {
    /// The reader ran out of bits. Before end of input, this means "needs more bytes".
    #[error("attempted to read {attempted} bits with only {available} available")]
    Underflow { attempted: usize, available: usize },

    /// The bits read don't represent a valid value.
    #[error("{0}")]
    Invalid(String),
}

/// Accumulates bits into bytes.
#[derive(Clone, Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,

    /// Bits written so far into the last byte of `buf`, in `[0, 8)`. Zero means `buf` has no
    /// partial byte.
    partial: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bits written.
    pub fn bit_len(&self) -> usize {
        if self.partial == 0 {
            self.buf.len() * 8
        } else {
            (self.buf.len() - 1) * 8 + usize::from(self.partial)
        }
    }

    pub fn put_bit(&mut self, bit: bool) {
        if self.partial == 0 {
            self.buf.push(0);
        }
        if bit {
            let last = self.buf.len() - 1;
            self.buf[last] |= 0x80 >> self.partial;
        }
        self.partial = (self.partial + 1) % 8;
    }

    /// Writes the low `width` bits of `value`, most significant first.
    ///
    /// Panics if `width` exceeds 64.
    pub fn put_bits(&mut self, value: u64, width: u32) {
        assert!(width <= 64, "bit width {} exceeds 64", width);
        for i in (0..width).rev() {
            self.put_bit((value >> i) & 1 != 0);
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.put_bits(u64::from(value), 8);
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        if self.partial == 0 {
            self.buf.extend_from_slice(bytes);
            return;
        }
        for &b in bytes {
            self.put_u8(b);
        }
    }

    /// Returns the written bytes, with any final partial byte padded by zero bits.
    pub fn finish(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

/// Reads bits from a byte slice.
#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    buf: &'a [u8],

    /// Bits read so far.
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BitReader { buf, pos: 0 }
    }

    /// Bits read so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() * 8 - self.pos
    }

    /// Bytes touched so far, counting a partially read byte as whole.
    pub fn bytes_consumed(&self) -> usize {
        (self.pos + 7) / 8
    }

    pub fn get_bit(&mut self) -> Result<bool, BitError> {
        let byte = self.buf.get(self.pos / 8).ok_or(BitError::Underflow {
            attempted: 1,
            available: 0,
        })?;
        let bit = byte & (0x80 >> (self.pos % 8)) != 0;
        self.pos += 1;
        Ok(bit)
    }

    /// Reads `width` bits as an unsigned integer, most significant first.
    ///
    /// Reads nothing on underflow. Panics if `width` exceeds 64.
    pub fn get_bits(&mut self, width: u32) -> Result<u64, BitError> {
        assert!(width <= 64, "bit width {} exceeds 64", width);
        let w = width as usize;
        if w > self.remaining() {
            return Err(BitError::Underflow {
                attempted: w,
                available: self.remaining(),
            });
        }
        let mut value = 0u64;
        for _ in 0..width {
            value = (value << 1) | u64::from(self.get_bit()?);
        }
        Ok(value)
    }

    pub fn get_u8(&mut self) -> Result<u8, BitError> {
        Ok(self.get_bits(8)? as u8)
    }

    pub fn get_vec(&mut self, len: usize) -> Result<Vec<u8>, BitError> {
        if len.saturating_mul(8) > self.remaining() {
            return Err(BitError::Underflow {
                attempted: len.saturating_mul(8),
                available: self.remaining(),
            });
        }
        (0..len).map(|_| self.get_u8()).collect()
    }
}

/// A codec expressed as bit-cursor get/put operations.
pub trait BitCodec {
    type Value;

    fn put(&self, value: &Self::Value, w: &mut BitWriter);
    fn get(&self, r: &mut BitReader<'_>) -> Result<Self::Value, BitError>;
}

impl<C: BitCodec + ?Sized> BitCodec for &C {
    type Value = C::Value;

    fn put(&self, value: &Self::Value, w: &mut BitWriter) {
        (**self).put(value, w)
    }

    fn get(&self, r: &mut BitReader<'_>) -> Result<Self::Value, BitError> {
        (**self).get(r)
    }
}

/// Adapts a [`BitCodec`] to the byte-oriented [`Codec`] contract.
#[derive(Clone, Debug, Default)]
pub struct BitPacked<C>(pub C);

impl<C> Codec for BitPacked<C>
where
    C: BitCodec + Clone + 'static,
    C::Value: 'static,
{
    type Value = C::Value;

    fn encode(&self, value: &C::Value) -> Bytes {
        let mut w = BitWriter::new();
        self.0.put(value, &mut w);
        w.finish()
    }

    fn decode(&self, input: Bytes) -> DecodeOutcome<C::Value> {
        let codec = self.0.clone();
        buffered(move |buf: &mut BytesMut| get_aligned(&codec, buf), input)
    }
}

/// Runs `codec.get` over `buf`, advancing `buf` past every byte the value touched.
fn get_aligned<C: BitCodec>(codec: &C, buf: &mut BytesMut) -> Result<Option<C::Value>, String> {
    let mut r = BitReader::new(&buf[..]);
    match codec.get(&mut r) {
        Ok(v) => {
            let n = r.bytes_consumed();
            buf.advance(n);
            Ok(Some(v))
        }
        Err(BitError::Underflow { .. }) => Ok(None),
        Err(e) => {
            let n = r.bytes_consumed();
            buf.advance(n);
            Err(e.to_string())
        }
    }
}
