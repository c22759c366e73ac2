// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The individual conformance checks.
//!
//! Each check runs cases drawn from a `proptest` [`Strategy`] through a codec and returns
//! `Ok(())` or a [`Failure`] carrying the counterexample, shrunk. The `*_one` functions check a
//! single value or input, for use from external drivers such as fuzz targets.
//!
//! Nothing here panics on a misbehaving codec: panics in encoders, decoders, and generators are
//! caught and reported as failures.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bytes::Bytes;
use pretty_hex::PrettyHex as _;
use proptest::strategy::Strategy;
use proptest::test_runner::{TestCaseError, TestError};

use crate::chunk;
use crate::codec::{Codec, MessageCodec, TextCodec};
use crate::config::Config;
use crate::decode::{drive, panic_message, Terminal, Violation};
use crate::gen;

pub const ROUND_TRIP: &str = "round_trip";
pub const CHUNKED_ROUND_TRIP: &str = "chunked_round_trip";
pub const FUZZ_DECODE: &str = "fuzz_decode";
pub const NON_NULLABLE: &str = "non_nullable";
pub const MESSAGE_ROUND_TRIP: &str = "message_round_trip";
pub const TEXT_ROUND_TRIP: &str = "text_round_trip";

pub type CheckResult = Result<(), Failure>;

/// Why a check failed.
#[derive(Debug, thiserror::Error)]
pub enum FailureKind {
    /// The decoder rejected the encoder's own output.
    #[error("decoder rejected encoder output after {consumed} bytes: {message}")]
    Rejected { message: String, consumed: usize },

    #[error("decoded value differs from the original: {decoded}")]
    Mismatch { decoded: String },

    #[error("decoder left {remaining} of {total} bytes unread")]
    Leftover { remaining: usize, total: usize },

    /// The grammar accepts the empty byte sequence.
    #[error("decoder finished from empty input, yielding {decoded}")]
    Nullable { decoded: String },

    /// A value the decoder accepted from arbitrary input doesn't itself round-trip.
    #[error("value decoded from arbitrary input doesn't round-trip: {0}")]
    Reencode(Box<FailureKind>),

    #[error("message decoder returned None")]
    NoneDecoded,

    #[error("parse returned None for rendered text {text:?}")]
    Unparseable { text: String },

    #[error(transparent)]
    Protocol(#[from] Violation),

    /// An encoder, renderer, or generator panicked.
    #[error("{stage} panicked: {message}")]
    Panicked { stage: &'static str, message: String },

    /// The strategy rejected too many values to run the check.
    #[error("gave up: {reason}")]
    Aborted { reason: String },
}

/// Where in a run a failure turned up. Rerunning the check with the same seed repeats it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CaseInfo {
    pub seed: u64,

    /// Cases that passed before the first failing one.
    pub passed: usize,

    /// Simplifications tried while shrinking the first failing value.
    pub shrink_attempts: usize,
}

/// A failed check, with its counterexample.
#[derive(Debug)]
pub struct Failure {
    pub check: String,
    pub case: Option<CaseInfo>,

    /// The offending value after shrinking, rendered with `{:#?}`.
    pub value: Option<String>,

    /// The offending byte sequence: the encoding of `value`, or the raw decoder input.
    pub bytes: Option<Bytes>,

    pub kind: FailureKind,
}

impl Failure {
    fn new(check: &str, kind: FailureKind) -> Self {
        Failure {
            check: check.to_owned(),
            case: None,
            value: None,
            bytes: None,
            kind,
        }
    }

    fn value<T: Debug>(mut self, value: &T) -> Self {
        self.value = Some(format!("{:#?}", value));
        self
    }

    fn bytes(mut self, bytes: &Bytes) -> Self {
        self.bytes = Some(bytes.clone());
        self
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", &self.check, &self.kind)?;
        if let Some(c) = &self.case {
            write!(
                f,
                "\nseed {}: failed after {} passing cases, shrunk over {} attempts",
                c.seed, c.passed, c.shrink_attempts
            )?;
        }
        if let Some(v) = &self.value {
            write!(f, "\nvalue: {}", v)?;
        }
        if let Some(b) = &self.bytes {
            write!(f, "\nbytes:\n{:?}", b.hex_dump())?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Runs `f`, turning a panic into [`FailureKind::Panicked`].
fn catch<R, F: FnOnce() -> R>(stage: &'static str, f: F) -> Result<R, FailureKind> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| FailureKind::Panicked {
        stage,
        message: panic_message(payload.as_ref()),
    })
}

/// Runs up to `n` cases from `strategy` through `f`, shrinking the first failure.
fn run_cases<S, F>(check: &str, strategy: &S, n: usize, cfg: &Config, f: F) -> CheckResult
where
    S: Strategy,
    F: Fn(S::Value) -> CheckResult,
{
    let mut runner = gen::runner(n, cfg.seed);
    let calls = Cell::new(0usize);
    let first_failure = Cell::new(None);
    let last_failure = RefCell::new(None);
    let outcome = catch("generator", || {
        runner.run(strategy, |value| {
            calls.set(calls.get() + 1);
            let failure = match f(value) {
                Ok(()) => return Ok(()),
                Err(failure) => failure,
            };
            if first_failure.get().is_none() {
                first_failure.set(Some(calls.get() - 1));
            }
            tracing::debug!(check, kind = %failure.kind, "case failed; shrinking");
            let reason = failure.kind.to_string();
            *last_failure.borrow_mut() = Some(failure);
            Err(TestCaseError::fail(reason))
        })
    });
    let kind = match outcome {
        Ok(Ok(())) => {
            tracing::debug!(check, cases = calls.get(), "check passed");
            return Ok(());
        }
        Err(kind) => kind,
        Ok(Err(TestError::Abort(reason))) => FailureKind::Aborted {
            reason: reason.message().to_owned(),
        },
        Ok(Err(TestError::Fail(reason, _))) => match last_failure.into_inner() {
            Some(failure) => {
                let passed = first_failure.get().unwrap_or(0);
                return Err(found(
                    failure,
                    CaseInfo {
                        seed: cfg.seed,
                        passed,
                        shrink_attempts: calls.get() - passed - 1,
                    },
                ));
            }

            // `f` never fails without recording, so this is a panic the runner caught itself.
            None => FailureKind::Panicked {
                stage: "check",
                message: reason.message().to_owned(),
            },
        },
    };
    let passed = first_failure.get().unwrap_or_else(|| calls.get());
    Err(found(
        Failure::new(check, kind),
        CaseInfo {
            seed: cfg.seed,
            passed,
            shrink_attempts: 0,
        },
    ))
}

fn found(mut failure: Failure, case: CaseInfo) -> Failure {
    tracing::warn!(
        check = %failure.check,
        seed = case.seed,
        passed = case.passed,
        kind = %failure.kind,
        "check failed",
    );
    failure.case = Some(case);
    failure
}

/// Drives `codec` over `chunks`, which must concatenate to `bytes`, expecting exactly `value`
/// with nothing left over.
///
/// Leftover counts every byte of `bytes` past the value, including chunks the decoder finished
/// before being fed.
fn expect_decodes_to<C>(
    check: &str,
    codec: &C,
    value: &C::Value,
    bytes: &Bytes,
    chunks: Vec<Bytes>,
) -> CheckResult
where
    C: Codec,
    C::Value: PartialEq + Debug,
{
    let fail = |kind: FailureKind| Failure::new(check, kind).value(value).bytes(bytes);
    match drive(|b| codec.decode(b), chunks) {
        Err(v) => Err(fail(v.into())),
        Ok(Terminal::Failed { message, consumed }) => {
            Err(fail(FailureKind::Rejected { message, consumed }))
        }
        Ok(Terminal::Finished {
            value: decoded,
            consumed,
            ..
        }) => {
            let rest = chunk::split_consumed(bytes, consumed)
                .map(|(_, rest)| rest.len())
                .unwrap_or(0);
            if rest > 0 {
                return Err(fail(FailureKind::Leftover {
                    remaining: rest,
                    total: bytes.len(),
                }));
            }
            if decoded != *value {
                return Err(fail(FailureKind::Mismatch {
                    decoded: format!("{:#?}", decoded),
                }));
            }
            Ok(())
        }
    }
}

fn encode<C: Codec>(check: &str, codec: &C, value: &C::Value) -> Result<Bytes, Failure>
where
    C::Value: Debug,
{
    catch("encoder", || codec.encode(value)).map_err(|kind| Failure::new(check, kind).value(value))
}

/// Checks that `value` encodes, then decodes from a single chunk back to exactly `value`.
pub fn round_trip_one<C>(codec: &C, value: &C::Value) -> CheckResult
where
    C: Codec,
    C::Value: PartialEq + Debug,
{
    let bytes = encode(ROUND_TRIP, codec, value)?;
    expect_decodes_to(ROUND_TRIP, codec, value, &bytes, vec![bytes.clone()])
}

/// Checks the round-trip law for every generated value.
pub fn round_trip<C, S>(codec: &C, strategy: &S, cfg: &Config) -> CheckResult
where
    C: Codec,
    C::Value: PartialEq + Debug,
    S: Strategy<Value = C::Value>,
{
    run_cases(ROUND_TRIP, strategy, cfg.expensive_cases, cfg, |value| {
        round_trip_one(codec, &value)
    })
}

/// Checks that `value`'s encoding, split at `boundaries`, decodes back to exactly `value`.
pub fn chunked_round_trip_one<C>(codec: &C, value: &C::Value, boundaries: &[usize]) -> CheckResult
where
    C: Codec,
    C::Value: PartialEq + Debug,
{
    let bytes = encode(CHUNKED_ROUND_TRIP, codec, value)?;
    let chunks = chunk::split_at(&bytes, boundaries);
    expect_decodes_to(CHUNKED_ROUND_TRIP, codec, value, &bytes, chunks)
}

/// Checks the round-trip law with each encoding fed in randomly split chunks. The cut points
/// shrink along with the value.
///
/// Encodings shorter than two bytes can't be split and pass trivially; [`round_trip`] covers
/// them.
pub fn chunked_round_trip<C, S>(codec: &C, strategy: &S, cfg: &Config) -> CheckResult
where
    C: Codec,
    C::Value: PartialEq + Debug,
    S: Strategy<Value = C::Value>,
{
    let cases = (strategy, gen::cut_points());
    run_cases(CHUNKED_ROUND_TRIP, &cases, cfg.expensive_cases, cfg, |(value, points)| {
        let bytes = encode(CHUNKED_ROUND_TRIP, codec, &value)?;
        let cuts = gen::cuts_for(&points, bytes.len());
        tracing::trace!(len = bytes.len(), ?cuts, "splitting encoding");
        let chunks = chunk::split_at(&bytes, &cuts);
        expect_decodes_to(CHUNKED_ROUND_TRIP, codec, &value, &bytes, chunks)
    })
}

/// Checks one arbitrary input: decoding must reach `Failed` or `Finished` without breaking the
/// contract, and a finished value must itself round-trip.
pub fn fuzz_decode_one<C>(codec: &C, input: &Bytes) -> CheckResult
where
    C: Codec,
    C::Value: PartialEq + Debug,
{
    match drive(|b| codec.decode(b), [input.clone()]) {
        Err(v) => Err(Failure::new(FUZZ_DECODE, v.into()).bytes(input)),
        Ok(Terminal::Failed { message, consumed }) => {
            tracing::trace!(%message, consumed, "arbitrary input rejected");
            Ok(())
        }
        Ok(Terminal::Finished { value, consumed, .. }) => {
            tracing::trace!(consumed, "arbitrary input accepted");
            round_trip_one(codec, &value).map_err(|f| Failure {
                check: FUZZ_DECODE.to_owned(),
                case: None,
                value: f.value,
                bytes: Some(input.clone()),
                kind: FailureKind::Reencode(Box::new(f.kind)),
            })
        }
    }
}

/// Checks every input from `raw` with [`fuzz_decode_one`].
pub fn fuzz_decode<C, S>(codec: &C, raw: &S, cfg: &Config) -> CheckResult
where
    C: Codec,
    C::Value: PartialEq + Debug,
    S: Strategy<Value = Bytes>,
{
    run_cases(FUZZ_DECODE, raw, cfg.expensive_cases, cfg, |input| {
        fuzz_decode_one(codec, &input)
    })
}

/// Checks that decoding the empty byte sequence never finishes.
///
/// The decoder may fail immediately or ask for more; once told the input has ended, it must
/// fail.
pub fn non_nullable<C>(codec: &C) -> CheckResult
where
    C: Codec,
    C::Value: Debug,
{
    let empty = Bytes::new();
    let fail = |kind: FailureKind| Failure::new(NON_NULLABLE, kind).bytes(&empty);
    match drive(|b| codec.decode(b), Vec::new()) {
        Err(v) => Err(fail(v.into())),
        Ok(Terminal::Failed { .. }) => Ok(()),
        Ok(Terminal::Finished { value, .. }) => Err(fail(FailureKind::Nullable {
            decoded: format!("{:#?}", value),
        })),
    }
}

/// Checks that `value` survives the message serialization.
pub fn message_round_trip_one<M>(codec: &M, value: &M::Value) -> CheckResult
where
    M: MessageCodec,
    M::Value: PartialEq + Debug,
{
    let fail = |kind: FailureKind| Failure::new(MESSAGE_ROUND_TRIP, kind).value(value);
    let message = catch("message encoder", || codec.to_message(value)).map_err(fail)?;
    let bytes = Bytes::from(message);
    match catch("message decoder", || codec.from_message(&bytes[..])) {
        Err(kind) => Err(fail(kind).bytes(&bytes)),
        Ok(None) => Err(fail(FailureKind::NoneDecoded).bytes(&bytes)),
        Ok(Some(decoded)) if decoded != *value => Err(fail(FailureKind::Mismatch {
            decoded: format!("{:#?}", decoded),
        })
        .bytes(&bytes)),
        Ok(Some(_)) => Ok(()),
    }
}

/// Checks `from_message(to_message(x)) == Some(x)` for every generated value.
pub fn message_round_trip<M, S>(codec: &M, strategy: &S, cfg: &Config) -> CheckResult
where
    M: MessageCodec,
    M::Value: PartialEq + Debug,
    S: Strategy<Value = M::Value>,
{
    run_cases(MESSAGE_ROUND_TRIP, strategy, cfg.cases, cfg, |value| {
        message_round_trip_one(codec, &value)
    })
}

/// Checks that `value` survives rendering and parsing.
pub fn text_round_trip_one<X>(codec: &X, value: &X::Value) -> CheckResult
where
    X: TextCodec,
    X::Value: PartialEq + Debug,
{
    let fail = |kind: FailureKind| Failure::new(TEXT_ROUND_TRIP, kind).value(value);
    let text = catch("renderer", || codec.render(value)).map_err(fail)?;
    match catch("parser", || codec.parse(&text)) {
        Err(kind) => Err(fail(kind)),
        Ok(None) => Err(fail(FailureKind::Unparseable { text })),
        Ok(Some(parsed)) if parsed != *value => Err(fail(FailureKind::Mismatch {
            decoded: format!("{:#?}", parsed),
        })),
        Ok(Some(_)) => Ok(()),
    }
}

/// Checks `parse(render(x)) == Some(x)` for every generated value.
pub fn text_round_trip<X, S>(codec: &X, strategy: &S, cfg: &Config) -> CheckResult
where
    X: TextCodec,
    X::Value: PartialEq + Debug,
    S: Strategy<Value = X::Value>,
{
    run_cases(TEXT_ROUND_TRIP, strategy, cfg.cases, cfg, |value| {
        text_round_trip_one(codec, &value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::codec_fn;
    use crate::decode::{buffered, DecodeOutcome};
    use crate::gen::raw_bytes;
    use bytes::{Buf as _, BufMut as _, BytesMut};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// A one-byte length followed by that many bytes.
    fn short_bytes() -> impl Codec<Value = Vec<u8>> {
        codec_fn(
            |v: &Vec<u8>| {
                let mut out = vec![v.len() as u8];
                out.extend_from_slice(v);
                Bytes::from(out)
            },
            |input| {
                buffered(
                    |buf: &mut BytesMut| {
                        let len = match buf.first() {
                            None => return Ok(None),
                            Some(&l) => usize::from(l),
                        };
                        if buf.len() < 1 + len {
                            return Ok(None);
                        }
                        buf.advance(1);
                        Ok(Some(buf.split_to(len).to_vec()))
                    },
                    input,
                )
            },
        )
    }

    fn short_vec() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 0..=255)
    }

    /// `u64` as 8 big-endian bytes, followed by a padding byte the decoder never reads.
    fn padded_u64() -> impl Codec<Value = u64> {
        codec_fn(
            |v: &u64| {
                let mut out = BytesMut::with_capacity(9);
                out.put_u64(*v);
                out.put_u8(0);
                out.freeze()
            },
            |input| {
                buffered(
                    |buf: &mut BytesMut| {
                        if buf.len() < 8 {
                            return Ok(None);
                        }
                        Ok(Some(buf.get_u64()))
                    },
                    input,
                )
            },
        )
    }

    #[test]
    fn well_behaved_codec_passes_everything() {
        let c = short_bytes();
        let cfg = Config::default();
        round_trip(&c, &short_vec(), &cfg).unwrap();
        chunked_round_trip(&c, &short_vec(), &cfg).unwrap();
        fuzz_decode(&c, &raw_bytes(cfg.max_size), &cfg).unwrap();
        non_nullable(&c).unwrap();
    }

    #[test]
    fn lossy_codec_reports_mismatch() {
        // Truncates to 4 bytes on encode.
        let c = codec_fn(
            |v: &Vec<u8>| Bytes::copy_from_slice(&v[..v.len().min(4)]),
            |input: Bytes| DecodeOutcome::finished(input.to_vec(), Bytes::new()),
        );
        let f = round_trip_one(&c, &b"abcdef".to_vec()).unwrap_err();
        assert!(matches!(f.kind, FailureKind::Mismatch { .. }), "{}", f);
        assert_eq!(f.bytes.as_deref(), Some(&b"abcd"[..]));
        assert!(f.to_string().starts_with("round_trip: decoded value differs"), "{}", f);
    }

    #[test]
    fn failure_names_case() {
        let c = codec_fn(
            |v: &u8| Bytes::copy_from_slice(&[*v]),
            |_: Bytes| DecodeOutcome::<u8>::failed("nope", 0),
        );
        let f = round_trip(&c, &any::<u8>(), &Config::default().with_seed(9)).unwrap_err();
        assert_eq!(f.check, ROUND_TRIP);
        let case = f.case.unwrap();
        assert_eq!((case.seed, case.passed), (9, 0));
        assert_eq!(f.value.as_deref(), Some("0"));
        assert!(matches!(f.kind, FailureKind::Rejected { consumed: 0, .. }));
    }

    #[test]
    fn counterexample_is_shrunk() {
        // Drops the high half.
        let c = codec_fn(
            |v: &u64| Bytes::copy_from_slice(&(v & 0xffff_ffff).to_be_bytes()),
            |mut input: Bytes| {
                if input.len() < 8 {
                    return DecodeOutcome::failed("short", 0);
                }
                let v = input.get_u64();
                DecodeOutcome::finished(v, input)
            },
        );
        let cfg = Config::default().with_seed(3);
        let f = round_trip(&c, &any::<u64>(), &cfg).unwrap_err();
        assert_eq!(f.value.as_deref(), Some("4294967296"));
        assert!(matches!(&f.kind, FailureKind::Mismatch { decoded } if decoded == "0"), "{}", f);

        // Same seed, same outcome.
        let again = round_trip(&c, &any::<u64>(), &cfg).unwrap_err();
        assert_eq!(again.case, f.case);
    }

    #[test]
    fn chunked_counts_unfed_chunks_as_leftover() {
        let c = padded_u64();
        let f = round_trip_one(&c, &1234).unwrap_err();
        assert!(matches!(f.kind, FailureKind::Leftover { remaining: 1, total: 9 }), "{}", f);

        // The decoder finishes on the first chunk and never sees the second.
        let f = chunked_round_trip_one(&c, &1234, &[8]).unwrap_err();
        assert!(matches!(f.kind, FailureKind::Leftover { remaining: 1, total: 9 }), "{}", f);
        assert_eq!(f.check, CHUNKED_ROUND_TRIP);

        let f = chunked_round_trip(&c, &any::<u64>(), &Config::default()).unwrap_err();
        assert!(matches!(f.kind, FailureKind::Leftover { remaining: 1, total: 9 }), "{}", f);
    }

    #[test]
    fn rejecting_strategy_aborts() {
        let f = round_trip(
            &short_bytes(),
            &short_vec().prop_filter("never", |_| false),
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(f.kind, FailureKind::Aborted { .. }), "{}", f);
    }

    #[test]
    fn encoder_panic_is_failure() {
        let c = codec_fn(
            |_: &u8| -> Bytes { panic!("encoder bug") },
            |_: Bytes| DecodeOutcome::<u8>::failed("nope", 0),
        );
        let f = round_trip_one(&c, &1).unwrap_err();
        assert!(
            matches!(&f.kind, FailureKind::Panicked { stage: "encoder", message } if message == "encoder bug"),
            "{}",
            f
        );
    }

    #[test]
    fn fuzz_reencode_failure() {
        // Accepts any single byte but always encodes as zero.
        let c = codec_fn(
            |_: &u8| Bytes::from_static(&[0]),
            |input: Bytes| match input.first() {
                Some(&b) => DecodeOutcome::finished(b, input.slice(1..)),
                None => DecodeOutcome::failed("empty", 0),
            },
        );
        fuzz_decode_one(&c, &Bytes::from_static(&[0, 9])).unwrap();
        let f = fuzz_decode_one(&c, &Bytes::from_static(&[5])).unwrap_err();
        assert!(
            matches!(&f.kind, FailureKind::Reencode(inner) if matches!(**inner, FailureKind::Mismatch { .. })),
            "{}",
            f
        );
        assert_eq!(f.bytes.as_deref(), Some(&[5][..]));
    }

    #[test]
    fn nullable_grammar() {
        let c = codec_fn(
            |_: &()| Bytes::new(),
            |input: Bytes| DecodeOutcome::finished((), input),
        );
        let f = non_nullable(&c).unwrap_err();
        assert!(matches!(f.kind, FailureKind::Nullable { .. }), "{}", f);
    }

    struct Lossy;

    impl MessageCodec for Lossy {
        type Value = i32;

        fn to_message(&self, value: &i32) -> Vec<u8> {
            value.to_le_bytes().to_vec()
        }

        fn from_message(&self, message: &[u8]) -> Option<i32> {
            let v = i32::from_le_bytes(message.try_into().ok()?);
            (v >= 0).then_some(v)
        }
    }

    #[test]
    fn message_none() {
        message_round_trip_one(&Lossy, &5).unwrap();
        let f = message_round_trip_one(&Lossy, &-5).unwrap_err();
        assert!(matches!(f.kind, FailureKind::NoneDecoded), "{}", f);
        assert_eq!(f.value.as_deref(), Some("-5"));
    }
}
