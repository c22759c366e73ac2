// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conformance checks for binary wire-format codecs.
//!
//! A codec supplies an encoder and an incremental decoder (see [`decode`]); the checks in
//! [`check`] verify that they agree, that the decoder behaves on arbitrary input, and that no
//! value encodes as nothing. [`suite`] bundles the checks into named suites for byte,
//! bit-packed, textual, and message (remote-call) serializations.
//!
//! ```
//! use wirecheck::{reference, suite, Config};
//!
//! let cfg = Config::from_env().unwrap();
//! suite::byte_suite("varint", reference::Varint, reference::varint_values())
//!     .run(&cfg)
//!     .assert_passed();
//! ```
//!
//! Values come from [`proptest`] strategies, so failing cases are shrunk before they're
//! reported. [`gen`] bridges types that implement [`arbitrary::Arbitrary`].
//!
//! ## Features
//!
//! *   `serde`: enables [`JsonMessage`], a [`MessageCodec`] that serializes through
//!     `serde_json`; derives `Deserialize` for [`Config`] (with camelCase field names); and
//!     derives `Serialize` and `Deserialize` for [`reference::PeerCaps`], adding a JSON message
//!     suite to [`reference::suite`].

pub mod bits;
pub mod check;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod decode;
pub mod gen;
pub mod reference;
pub mod suite;

pub use check::{CheckResult, Failure, FailureKind};
pub use codec::{Codec, MessageCodec, TextCodec};
pub use config::Config;
pub use decode::{DecodeOutcome, Input};
pub use suite::{Report, Suite};

pub use proptest;

#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
#[cfg(feature = "serde")]
pub use codec::JsonMessage;
