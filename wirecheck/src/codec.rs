// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The capabilities a consumer hands to the harness: byte codecs, alternate message
//! serializations, and textual render/parse pairs.

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;

use bytes::Bytes;

use crate::decode::DecodeOutcome;

/// A binary wire-format codec with an incremental decoder.
///
/// `decode` receives the first chunk of input; see [`crate::decode`] for the contract its
/// outcome must follow.
pub trait Codec {
    type Value;

    fn encode(&self, value: &Self::Value) -> Bytes;
    fn decode(&self, input: Bytes) -> DecodeOutcome<Self::Value>;
}

impl<C: Codec + ?Sized> Codec for &C {
    type Value = C::Value;

    fn encode(&self, value: &Self::Value) -> Bytes {
        (**self).encode(value)
    }

    fn decode(&self, input: Bytes) -> DecodeOutcome<Self::Value> {
        (**self).decode(input)
    }
}

/// A [`Codec`] made from a pair of functions; see [`codec_fn`].
pub struct FnCodec<T, E, D> {
    encode: E,
    decode: D,
    _value: PhantomData<fn(&T) -> T>,
}

/// Lifts an encode function and a decode function into a [`Codec`].
pub fn codec_fn<T, E, D>(encode: E, decode: D) -> FnCodec<T, E, D>
where
    E: Fn(&T) -> Bytes,
    D: Fn(Bytes) -> DecodeOutcome<T>,
{
    FnCodec {
        encode,
        decode,
        _value: PhantomData,
    }
}

impl<T, E, D> Codec for FnCodec<T, E, D>
where
    E: Fn(&T) -> Bytes,
    D: Fn(Bytes) -> DecodeOutcome<T>,
{
    type Value = T;

    fn encode(&self, value: &T) -> Bytes {
        (self.encode)(value)
    }

    fn decode(&self, input: Bytes) -> DecodeOutcome<T> {
        (self.decode)(input)
    }
}

/// A second, whole-message serialization path, as used for remote calls.
///
/// Unlike [`Codec`], decoding has no partial-input semantics: a message either parses or it
/// doesn't.
pub trait MessageCodec {
    type Value;

    fn to_message(&self, value: &Self::Value) -> Vec<u8>;
    fn from_message(&self, message: &[u8]) -> Option<Self::Value>;
}

/// A render/parse pair.
///
/// `parse` need only accept strings that `render` produces.
pub trait TextCodec {
    type Value;

    fn render(&self, value: &Self::Value) -> String;
    fn parse(&self, text: &str) -> Option<Self::Value>;
}

/// A [`TextCodec`] using a type's [`Display`] and [`FromStr`] impls.
pub struct DisplayFromStr<T>(PhantomData<fn() -> T>);

impl<T> DisplayFromStr<T> {
    pub fn new() -> Self {
        DisplayFromStr(PhantomData)
    }
}

impl<T> Default for DisplayFromStr<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Display + FromStr> TextCodec for DisplayFromStr<T> {
    type Value = T;

    fn render(&self, value: &T) -> String {
        value.to_string()
    }

    fn parse(&self, text: &str) -> Option<T> {
        text.parse().ok()
    }
}

/// A [`MessageCodec`] using JSON via `serde_json`.
///
/// A value `serde_json` refuses to serialize (such as a map with non-string keys) encodes as an
/// empty message, which never parses, so the round-trip check reports it.
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
#[cfg(feature = "serde")]
pub struct JsonMessage<T>(PhantomData<fn() -> T>);

#[cfg(feature = "serde")]
impl<T> JsonMessage<T> {
    pub fn new() -> Self {
        JsonMessage(PhantomData)
    }
}

#[cfg(feature = "serde")]
impl<T> Default for JsonMessage<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "serde")]
impl<T> MessageCodec for JsonMessage<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    type Value = T;

    fn to_message(&self, value: &T) -> Vec<u8> {
        serde_json::to_vec(value).unwrap_or_else(|e| {
            tracing::warn!(err = %e, "value doesn't serialize as JSON");
            Vec::new()
        })
    }

    fn from_message(&self, message: &[u8]) -> Option<T> {
        serde_json::from_slice(message).ok()
    }
}
