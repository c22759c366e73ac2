// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Value generation, as `proptest` strategies.
//!
//! Checks accept any [`Strategy`]; this module adds the few the harness itself needs, plus a
//! bridge from types that implement [`arbitrary::Arbitrary`]. Every check runs its cases through
//! a [`TestRunner`] seeded from [`crate::Config::seed`], so a failing run repeats exactly under
//! the same seed, and a failure's counterexample is the value after shrinking.

use arbitrary::{Arbitrary, Unstructured};
use bytes::Bytes;
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::sample::Index;
use proptest::test_runner::{Config as RunnerConfig, RngAlgorithm, TestRng, TestRunner};

/// Random bytes available to an [`Arbitrary`] impl in [`from_arbitrary`].
const ARBITRARY_MAX_BYTES: usize = 256;

/// Upper bound on [`raw_bytes`] lengths, whatever the configured size.
pub const MAX_RAW_LEN: usize = 1 << 16;

/// Most cut points drawn by [`cut_points`].
const MAX_CUTS: usize = 8;

/// Returns a runner for `cases` cases whose random source depends only on `seed`.
pub(crate) fn runner(cases: usize, seed: u64) -> TestRunner {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[..8].copy_from_slice(&seed.to_le_bytes());
    let config = RunnerConfig {
        cases: u32::try_from(cases).unwrap_or(u32::MAX),
        failure_persistence: None,
        ..RunnerConfig::default()
    };
    TestRunner::new_with_rng(config, TestRng::from_seed(RngAlgorithm::ChaCha, &seed_bytes))
}

/// Generates any `T` by feeding its [`Arbitrary`] impl random bytes.
///
/// Shrinking operates on the bytes, so a failure usually reduces to a value built from a short,
/// mostly-zero buffer.
pub fn from_arbitrary<T>() -> impl Strategy<Value = T>
where
    T: for<'a> Arbitrary<'a> + std::fmt::Debug,
{
    vec(any::<u8>(), 0..=ARBITRARY_MAX_BYTES).prop_filter_map(
        "Arbitrary impl rejected its input",
        |buf| T::arbitrary_take_rest(Unstructured::new(&buf)).ok(),
    )
}

/// Generates unconstrained byte sequences of length `[0, max_len]`, with `max_len` capped at
/// [`MAX_RAW_LEN`].
pub fn raw_bytes(max_len: usize) -> impl Strategy<Value = Bytes> {
    vec(any::<u8>(), 0..=max_len.min(MAX_RAW_LEN)).prop_map(Bytes::from)
}

/// Yields one of `edges` a quarter of the time, otherwise a value from `inner`.
pub fn with_edges<S>(edges: Vec<S::Value>, inner: S) -> impl Strategy<Value = S::Value>
where
    S: Strategy + 'static,
    S::Value: Clone + 'static,
{
    prop_oneof![
        1 => proptest::sample::select(edges),
        3 => inner,
    ]
}

/// Generates positions at which to split an encoding; see [`cuts_for`].
pub(crate) fn cut_points() -> impl Strategy<Value = Vec<Index>> {
    vec(any::<Index>(), 1..=MAX_CUTS)
}

/// Maps drawn positions to cut offsets in `(0, len)`. Encodings shorter than two bytes have no
/// interior offsets.
pub(crate) fn cuts_for(points: &[Index], len: usize) -> Vec<usize> {
    if len < 2 {
        return Vec::new();
    }
    points.iter().map(|p| 1 + p.index(len - 1)).collect()
}
