// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feeds arbitrary bytes to a reference decoder selected by the first byte. Decoding must
//! terminate cleanly, and anything it accepts must round-trip.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use wirecheck::check::fuzz_decode_one;
use wirecheck::reference::{LengthPrefixed, NulTerminated, U64Be, Varint};

fuzz_target!(|data: &[u8]| {
    let (input, result) = match data {
        [0, body @ ..] => {
            let input = Bytes::copy_from_slice(body);
            let r = fuzz_decode_one(&U64Be, &input);
            (input, r)
        }
        [1, body @ ..] => {
            let input = Bytes::copy_from_slice(body);
            let r = fuzz_decode_one(&Varint, &input);
            (input, r)
        }
        [2, body @ ..] => {
            let input = Bytes::copy_from_slice(body);
            let r = fuzz_decode_one(&LengthPrefixed { max_len: 4096 }, &input);
            (input, r)
        }
        [3, body @ ..] => {
            let input = Bytes::copy_from_slice(body);
            let r = fuzz_decode_one(&NulTerminated, &input);
            (input, r)
        }
        _ => return,
    };
    if let Err(f) = result {
        panic!("{} bytes of input:\n{}", input.len(), f);
    }
});
