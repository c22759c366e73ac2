// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small reference codecs, used to exercise the harness itself.
//!
//! Each is a minimal but complete wire format with the usual framing properties: no value
//! encodes as the empty sequence, and every decoder stops at the end of its value so trailing
//! bytes are left for the next one.

use bytes::{Buf as _, BufMut, Bytes, BytesMut};
use proptest::collection::vec;
use proptest::prelude::*;

use crate::bits::{BitCodec, BitError, BitReader, BitWriter};
use crate::codec::Codec;
use crate::decode::{buffered, DecodeOutcome};
use crate::gen;
use crate::suite::{self, Suite};

/// Maximum bytes in a LEB128-encoded `u64`: `ceil(64 / 7)`.
const MAX_VARINT_LEN: usize = 10;

/// A `u64` as exactly 8 big-endian bytes.
#[derive(Copy, Clone, Debug, Default)]
pub struct U64Be;

impl Codec for U64Be {
    type Value = u64;

    fn encode(&self, value: &u64) -> Bytes {
        Bytes::copy_from_slice(&value.to_be_bytes())
    }

    fn decode(&self, input: Bytes) -> DecodeOutcome<u64> {
        buffered(
            |src: &mut BytesMut| {
                if src.len() < 8 {
                    return Ok(None);
                }
                Ok(Some(src.get_u64()))
            },
            input,
        )
    }
}

/// A `u64` as an unsigned LEB128 varint.
#[derive(Copy, Clone, Debug, Default)]
pub struct Varint;

impl Varint {
    pub(crate) fn put(mut value: u64, to: &mut BytesMut) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                to.put_u8(byte);
                return;
            }
            to.put_u8(byte | 0x80);
        }
    }

    /// Parses a varint from the start of `src` without consuming it.
    ///
    /// Returns the value and its encoded length, or `None` if `src` ends mid-varint.
    pub(crate) fn peek(src: &[u8]) -> Result<Option<(u64, usize)>, String> {
        let mut value = 0u64;
        for (i, &b) in src.iter().enumerate() {
            if i == MAX_VARINT_LEN - 1 && b > 0x01 {
                return Err(format!(
                    "varint overflows u64: final byte {:02X} at offset {}",
                    b, i
                ));
            }
            value |= u64::from(b & 0x7f) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(Some((value, i + 1)));
            }
        }
        Ok(None)
    }
}

impl Codec for Varint {
    type Value = u64;

    fn encode(&self, value: &u64) -> Bytes {
        let mut out = BytesMut::with_capacity(MAX_VARINT_LEN);
        Self::put(*value, &mut out);
        out.freeze()
    }

    fn decode(&self, input: Bytes) -> DecodeOutcome<u64> {
        buffered(
            |src: &mut BytesMut| {
                Ok(Varint::peek(src)?.map(|(v, len)| {
                    src.advance(len);
                    v
                }))
            },
            input,
        )
    }
}

/// A byte string preceded by its length as a varint.
#[derive(Copy, Clone, Debug)]
pub struct LengthPrefixed {
    pub max_len: usize,
}

impl Default for LengthPrefixed {
    fn default() -> Self {
        LengthPrefixed { max_len: 1 << 20 }
    }
}

impl Codec for LengthPrefixed {
    type Value = Vec<u8>;

    fn encode(&self, value: &Vec<u8>) -> Bytes {
        let mut out = BytesMut::with_capacity(MAX_VARINT_LEN + value.len());
        Varint::put(value.len() as u64, &mut out);
        out.put_slice(value);
        out.freeze()
    }

    fn decode(&self, input: Bytes) -> DecodeOutcome<Vec<u8>> {
        let max_len = self.max_len;
        buffered(
            move |src: &mut BytesMut| {
                let (len, prefix_len) = match Varint::peek(src)? {
                    None => return Ok(None),
                    Some(p) => p,
                };
                let len = usize::try_from(len)
                    .ok()
                    .filter(|&l| l <= max_len)
                    .ok_or_else(|| format!("length {} exceeds maximum {}", len, max_len))?;
                if src.len() < prefix_len + len {
                    return Ok(None);
                }
                src.advance(prefix_len);
                Ok(Some(src.split_to(len).to_vec()))
            },
            input,
        )
    }
}

/// A byte string terminated by a NUL byte. The string itself must not contain NUL.
#[derive(Copy, Clone, Debug, Default)]
pub struct NulTerminated;

impl Codec for NulTerminated {
    type Value = Vec<u8>;

    fn encode(&self, value: &Vec<u8>) -> Bytes {
        let mut out = BytesMut::with_capacity(value.len() + 1);
        out.put_slice(value);
        out.put_u8(0);
        out.freeze()
    }

    fn decode(&self, input: Bytes) -> DecodeOutcome<Vec<u8>> {
        buffered(
            |src: &mut BytesMut| {
                Ok(memchr::memchr(0, src).map(|pos| {
                    let s = src.split_to(pos).to_vec();
                    src.advance(1);
                    s
                }))
            },
            input,
        )
    }
}

/// A peer's advertised capabilities, packed into 21 bits.
///
/// ```text
/// VVVRNPPPPPPPPPPPPPPPP
/// ```
///
/// *   `V`: protocol version, in `[1, 7]`.
/// *   `R`: accepts relayed connections.
/// *   `N`: is behind NAT.
/// *   `P`: listening port.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerCaps {
    pub version: u8,
    pub relay: bool,
    pub nat: bool,
    pub port: u16,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct PeerCapsBits;

impl BitCodec for PeerCapsBits {
    type Value = PeerCaps;

    fn put(&self, value: &PeerCaps, w: &mut BitWriter) {
        w.put_bits(u64::from(value.version), 3);
        w.put_bit(value.relay);
        w.put_bit(value.nat);
        w.put_bits(u64::from(value.port), 16);
    }

    fn get(&self, r: &mut BitReader<'_>) -> Result<PeerCaps, BitError> {
        let version = r.get_bits(3)? as u8;
        if version == 0 {
            return Err(BitError::Invalid("peer caps version 0 is reserved".to_owned()));
        }
        Ok(PeerCaps {
            version,
            relay: r.get_bit()?,
            nat: r.get_bit()?,
            port: r.get_bits(16)? as u16,
        })
    }
}

/// Generates valid [`PeerCaps`].
pub fn peer_caps() -> impl Strategy<Value = PeerCaps> {
    (1u8..=7, any::<bool>(), any::<bool>(), any::<u16>()).prop_map(|(version, relay, nat, port)| {
        PeerCaps {
            version,
            relay,
            nat,
            port,
        }
    })
}

/// Generates `u64`s of every encoded varint length, plus the boundary values.
pub fn varint_values() -> impl Strategy<Value = u64> {
    gen::with_edges(
        vec![0, 0x7f, 0x80, 0x3fff, 0x4000, u64::MAX],
        (0u32..=64, any::<u64>()).prop_map(|(bits, v)| if bits == 0 { 0 } else { v >> (64 - bits) }),
    )
}

/// Generates byte strings without NUL bytes, for [`NulTerminated`].
pub fn nul_free_bytes() -> impl Strategy<Value = Vec<u8>> {
    vec(1u8..=u8::MAX, 0..=100)
}

/// Every suite over the codecs above, as run by `wirecheck selftest`.
pub fn suite() -> Suite<'static> {
    let s = Suite::new("reference")
        .with(suite::byte_suite("u64be", U64Be, any::<u64>()))
        .with(suite::byte_suite("varint", Varint, varint_values()))
        .with(suite::byte_suite(
            "length_prefixed",
            LengthPrefixed::default(),
            any::<Vec<u8>>(),
        ))
        .with(suite::byte_suite("nul_terminated", NulTerminated, nul_free_bytes()))
        .with(suite::bit_suite("peer_caps", PeerCapsBits, peer_caps()))
        .with(suite::text_suite(
            "i64",
            crate::codec::DisplayFromStr::<i64>::new(),
            any::<i64>(),
        ));
    #[cfg(feature = "serde")]
    let s = s.with(suite::message_suite(
        "peer_caps_json",
        crate::codec::JsonMessage::<PeerCaps>::new(),
        peer_caps(),
    ));
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitPacked;
    use crate::decode::{drive, Terminal};
    use pretty_assertions::assert_eq;

    #[test]
    fn varint_bytes() {
        for (v, expected) in [
            (0u64, &[0x00][..]),
            (127, &[0x7f][..]),
            (128, &[0x80, 0x01][..]),
            (300, &[0xac, 0x02][..]),
            (16384, &[0x80, 0x80, 0x01][..]),
        ] {
            assert_eq!(&Varint.encode(&v)[..], expected, "{}", v);
        }
        assert_eq!(Varint.encode(&u64::MAX).len(), MAX_VARINT_LEN);
    }

    #[test]
    fn varint_overflow() {
        let mut too_big = vec![0xff; 9];
        too_big.push(0x02);
        assert!(Varint::peek(&too_big).is_err());
        let mut max = vec![0xff; 9];
        max.push(0x01);
        assert_eq!(Varint::peek(&max), Ok(Some((u64::MAX, 10))));
    }

    #[test]
    fn u64_be_truncated() {
        let t = drive(|b| U64Be.decode(b), [Bytes::from_static(&[0xff])]).unwrap();
        assert!(matches!(t, Terminal::Failed { .. }), "{:?}", t);
    }

    #[test]
    fn length_prefixed_limit() {
        let c = LengthPrefixed { max_len: 3 };
        let t = drive(|b| c.decode(b), [Bytes::from_static(&[0x04, 1, 2, 3, 4])]).unwrap();
        assert_eq!(
            t,
            Terminal::Failed {
                message: "length 4 exceeds maximum 3".to_owned(),
                consumed: 0,
            }
        );
    }

    #[test]
    fn nul_terminated_leaves_rest() {
        let t = drive(
            |b| NulTerminated.decode(b),
            [Bytes::from_static(b"ab"), Bytes::from_static(b"c\0d")],
        )
        .unwrap();
        assert_eq!(
            t,
            Terminal::Finished {
                value: b"abc".to_vec(),
                remaining: Bytes::from_static(b"d"),
                consumed: 4,
            }
        );
    }

    #[test]
    fn peer_caps_layout() {
        let caps = PeerCaps {
            version: 5,
            relay: true,
            nat: false,
            port: 0xabcd,
        };
        let encoded = BitPacked(PeerCapsBits).encode(&caps);
        // 101 1 0 1010101111001101 000 (padding)
        assert_eq!(&encoded[..], &[0b1011_0101, 0b0101_1110, 0b0110_1000]);
    }

    #[test]
    fn reference_suite_passes() {
        suite().run(&crate::Config::default()).assert_passed();
    }
}
