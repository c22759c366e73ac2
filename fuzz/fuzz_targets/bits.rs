// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feeds arbitrary bytes to the bit-packed peer caps decoder, whole and split in two at the
//! position given by the first byte. Both must decode the same value or both fail.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use wirecheck::bits::BitPacked;
use wirecheck::check::fuzz_decode_one;
use wirecheck::chunk::split_at;
use wirecheck::decode::{drive, Terminal};
use wirecheck::reference::PeerCapsBits;
use wirecheck::Codec as _;

fuzz_target!(|data: &[u8]| {
    let (split, body) = match data {
        [split, body @ ..] => (usize::from(*split), Bytes::copy_from_slice(body)),
        [] => return,
    };
    let codec = BitPacked(PeerCapsBits);
    if let Err(f) = fuzz_decode_one(&codec, &body) {
        panic!("{}", f);
    }
    let whole = drive(|b| codec.decode(b), [body.clone()]).unwrap();
    let halves = drive(|b| codec.decode(b), split_at(&body, &[split])).unwrap();
    match (whole, halves) {
        (
            Terminal::Finished {
                value: a,
                consumed: a_consumed,
                ..
            },
            Terminal::Finished {
                value: b,
                consumed: b_consumed,
                ..
            },
        ) => {
            assert_eq!(a, b);
            assert_eq!(a_consumed, b_consumed);
        }
        (Terminal::Failed { .. }, Terminal::Failed { .. }) => {}
        (whole, halves) => panic!("whole: {:?}\nsplit at {}: {:?}", whole, split, halves),
    }
});
