// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checks the round-trip law on fuzzer-chosen values, split into chunks at fuzzer-chosen
//! boundaries.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wirecheck::check::{chunked_round_trip_one, round_trip_one};
use wirecheck::reference::{LengthPrefixed, NulTerminated, Varint};

fuzz_target!(|input: (u64, Vec<u8>, Vec<usize>)| {
    let (n, s, boundaries) = input;
    let mut results = vec![
        round_trip_one(&Varint, &n),
        chunked_round_trip_one(&Varint, &n, &boundaries),
        chunked_round_trip_one(&LengthPrefixed::default(), &s, &boundaries),
    ];
    let nul_free: Vec<u8> = s.into_iter().filter(|&b| b != 0).collect();
    results.push(chunked_round_trip_one(&NulTerminated, &nul_free, &boundaries));
    for r in results {
        if let Err(f) = r {
            panic!("{}", f);
        }
    }
});
