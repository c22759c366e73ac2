// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named, composable collections of checks, and the four ways to build one for a type.
//!
//! ```
//! use proptest::prelude::any;
//! use wirecheck::{reference, suite, Config};
//!
//! suite::byte_suite("u64be", reference::U64Be, any::<u64>())
//!     .with(suite::bit_suite("peer_caps", reference::PeerCapsBits, reference::peer_caps()))
//!     .run(&Config::default())
//!     .assert_passed();
//! ```

use std::fmt::Debug;
use std::rc::Rc;

use proptest::strategy::Strategy;

use crate::bits::{BitCodec, BitPacked};
use crate::check::{self, CheckResult, Failure};
use crate::codec::{Codec, MessageCodec, TextCodec};
use crate::config::Config;
use crate::gen;

type CheckFn<'a> = Box<dyn Fn(&Config) -> CheckResult + 'a>;

/// A named check within a [`Suite`].
struct NamedCheck<'a> {
    name: String,
    run: CheckFn<'a>,
}

/// A named collection of checks.
///
/// Check names are qualified by the suite name, and by the names of any suites merged in with
/// [`Suite::with`], e.g. `node_id/round_trip`.
pub struct Suite<'a> {
    name: String,
    checks: Vec<NamedCheck<'a>>,
}

impl<'a> Suite<'a> {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Suite {
            name: name.into(),
            checks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Qualified names of the checks, in run order.
    pub fn check_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.checks.iter().map(|c| c.name.as_str())
    }

    /// Adds a check.
    pub fn check<N, F>(mut self, name: N, run: F) -> Self
    where
        N: AsRef<str>,
        F: Fn(&Config) -> CheckResult + 'a,
    {
        self.checks.push(NamedCheck {
            name: format!("{}/{}", &self.name, name.as_ref()),
            run: Box::new(run),
        });
        self
    }

    /// Appends all of `other`'s checks, nesting their names under this suite's.
    pub fn extend(&mut self, other: Suite<'a>) {
        let prefix = &self.name;
        self.checks
            .extend(other.checks.into_iter().map(|c| NamedCheck {
                name: format!("{}/{}", prefix, c.name),
                run: c.run,
            }));
    }

    /// Appends all of `other`'s checks, builder-style.
    pub fn with(mut self, other: Suite<'a>) -> Self {
        self.extend(other);
        self
    }

    /// Runs every check in order. A failing check doesn't stop the others.
    pub fn run(&self, cfg: &Config) -> Report {
        let _span = tracing::info_span!("suite", suite = %self.name).entered();
        let outcomes = self
            .checks
            .iter()
            .map(|c| {
                let result = (c.run)(cfg).map_err(|mut f| {
                    f.check = c.name.clone();
                    f
                });
                match &result {
                    Ok(()) => tracing::info!(check = %c.name, "passed"),
                    Err(f) => tracing::warn!(check = %c.name, "failed:\n{}", f),
                }
                Outcome {
                    check: c.name.clone(),
                    result,
                }
            })
            .collect();
        Report {
            suite: self.name.clone(),
            outcomes,
        }
    }
}

impl<'a> Debug for Suite<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("checks", &self.check_names().collect::<Vec<_>>())
            .finish()
    }
}

/// The result of one check in a [`Report`].
#[derive(Debug)]
pub struct Outcome {
    pub check: String,
    pub result: CheckResult,
}

/// The results of running a [`Suite`].
#[derive(Debug)]
pub struct Report {
    pub suite: String,
    pub outcomes: Vec<Outcome>,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> + '_ {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    /// Returns the result of the check with the given qualified name.
    pub fn get(&self, check: &str) -> Option<&CheckResult> {
        self.outcomes
            .iter()
            .find(|o| o.check == check)
            .map(|o| &o.result)
    }

    /// Panics with every failure's counterexample unless all checks passed.
    #[track_caller]
    pub fn assert_passed(&self) {
        if !self.passed() {
            panic!("{}", self);
        }
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let failed = self.failures().count();
        write!(
            f,
            "suite {}: {} of {} checks passed",
            &self.suite,
            self.outcomes.len() - failed,
            self.outcomes.len()
        )?;
        for failure in self.failures() {
            write!(f, "\n\n{}", failure)?;
        }
        Ok(())
    }
}

/// Builds the checks for a byte codec: round-trip, chunked round-trip, fuzz decode over
/// arbitrary bytes, and non-nullability.
pub fn byte_suite<'a, N, C, S>(name: N, codec: C, strategy: S) -> Suite<'a>
where
    N: Into<String>,
    C: Codec + 'a,
    C::Value: PartialEq + Debug,
    S: Strategy<Value = C::Value> + 'a,
{
    let codec = Rc::new(codec);
    let strategy = Rc::new(strategy);
    let (c1, c2, c3, c4) = (codec.clone(), codec.clone(), codec.clone(), codec);
    let s1 = strategy.clone();
    Suite::new(name)
        .check(check::ROUND_TRIP, move |cfg| check::round_trip(&*c1, &*s1, cfg))
        .check(check::CHUNKED_ROUND_TRIP, move |cfg| {
            check::chunked_round_trip(&*c2, &*strategy, cfg)
        })
        .check(check::FUZZ_DECODE, move |cfg| {
            check::fuzz_decode(&*c3, &gen::raw_bytes(cfg.max_size), cfg)
        })
        .check(check::NON_NULLABLE, move |_| check::non_nullable(&*c4))
}

/// Builds the [`byte_suite`] checks for a bit-packed codec, through [`BitPacked`].
pub fn bit_suite<'a, N, C, S>(name: N, codec: C, strategy: S) -> Suite<'a>
where
    N: Into<String>,
    C: BitCodec + Clone + 'static,
    C::Value: PartialEq + Debug + 'static,
    S: Strategy<Value = C::Value> + 'a,
{
    byte_suite(name, BitPacked(codec), strategy)
}

/// Builds the render/parse round-trip check.
pub fn text_suite<'a, N, X, S>(name: N, codec: X, strategy: S) -> Suite<'a>
where
    N: Into<String>,
    X: TextCodec + 'a,
    X::Value: PartialEq + Debug,
    S: Strategy<Value = X::Value> + 'a,
{
    Suite::new(name).check(check::TEXT_ROUND_TRIP, move |cfg| {
        check::text_round_trip(&codec, &strategy, cfg)
    })
}

/// Builds the alternate (remote-call) serialization round-trip check.
pub fn message_suite<'a, N, M, S>(name: N, codec: M, strategy: S) -> Suite<'a>
where
    N: Into<String>,
    M: MessageCodec + 'a,
    M::Value: PartialEq + Debug,
    S: Strategy<Value = M::Value> + 'a,
{
    Suite::new(name).check(check::MESSAGE_ROUND_TRIP, move |cfg| {
        check::message_round_trip(&codec, &strategy, cfg)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::FailureKind;
    use crate::codec::{codec_fn, DisplayFromStr};
    use crate::decode::DecodeOutcome;
    use crate::reference;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use proptest::prelude::any;

    #[test]
    fn names_nest() {
        let s = Suite::new("peer")
            .with(byte_suite("id", reference::U64Be, any::<u64>()))
            .with(text_suite("port", DisplayFromStr::<u16>::new(), any::<u16>()));
        assert_eq!(
            s.check_names().collect::<Vec<_>>(),
            vec![
                "peer/id/round_trip",
                "peer/id/chunked_round_trip",
                "peer/id/fuzz_decode",
                "peer/id/non_nullable",
                "peer/port/text_round_trip",
            ]
        );
    }

    #[test]
    fn failures_are_isolated() {
        // Nullable and lossy, but the round trip of zero still works.
        let broken = codec_fn(
            |_: &u8| Bytes::new(),
            |input: Bytes| DecodeOutcome::finished(0u8, input),
        );
        let s = byte_suite("broken", broken, any::<u8>())
            .with(byte_suite("fine", reference::Varint, any::<u64>()));
        let report = s.run(&Config::default().with_expensive_cases(10));
        assert!(!report.passed());
        let nn = report.get("broken/non_nullable").unwrap().as_ref().unwrap_err();
        assert!(matches!(nn.kind, FailureKind::Nullable { .. }));
        assert_eq!(nn.check, "broken/non_nullable");
        assert!(report.get("broken/round_trip").unwrap().is_err());
        assert!(report.get("broken/fuzz_decode").unwrap().is_ok());
        for check in ["round_trip", "chunked_round_trip", "fuzz_decode", "non_nullable"] {
            let name = format!("broken/fine/{}", check);
            assert!(report.get(&name).unwrap().is_ok(), "{}", name);
        }
        assert!(report.to_string().starts_with("suite broken: 5 of 8 checks passed"));
    }

    #[test]
    #[should_panic(expected = "non_nullable")]
    fn assert_passed_panics() {
        let nullable = codec_fn(
            |_: &()| Bytes::new(),
            |input: Bytes| DecodeOutcome::finished((), input),
        );
        byte_suite("unit", nullable, any::<()>())
            .run(&Config::default())
            .assert_passed();
    }
}
