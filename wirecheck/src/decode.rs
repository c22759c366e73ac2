// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incremental decoding: the three-outcome contract every codec's decoder follows, and the
//! driver that feeds it input.
//!
//! A decode operation receives the first chunk of input and returns a [`DecodeOutcome`]. If it
//! can't decide yet, it returns [`DecodeOutcome::NeedsMore`] holding a one-shot
//! [`Continuation`], which the caller resumes with the next chunk or with [`Input::End`]. After
//! [`Input::End`], a well-behaved decoder must reach [`DecodeOutcome::Failed`] or
//! [`DecodeOutcome::Finished`]; [`drive`] reports anything else as a [`Violation`].

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bytes::{BufMut, Bytes, BytesMut};

/// The next piece of input given to a suspended decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// More bytes, following everything fed so far.
    Chunk(Bytes),

    /// No more bytes will ever arrive.
    End,
}

/// The result of running a decode operation on the input fed so far.
#[derive(Debug)]
pub enum DecodeOutcome<T> {
    /// The input can't represent a valid `T`.
    Failed {
        message: String,

        /// Bytes consumed before the failure was detected.
        consumed: usize,
    },

    /// More input is required to decide.
    NeedsMore(Continuation<T>),

    /// A value was decoded; `remaining` is the unread trailing input.
    Finished { value: T, remaining: Bytes },
}

impl<T> DecodeOutcome<T> {
    pub fn failed<M: Into<String>>(message: M, consumed: usize) -> Self {
        DecodeOutcome::Failed {
            message: message.into(),
            consumed,
        }
    }

    pub fn needs_more<F>(f: F) -> Self
    where
        F: FnOnce(Input) -> DecodeOutcome<T> + 'static,
    {
        DecodeOutcome::NeedsMore(Continuation::new(f))
    }

    pub fn finished(value: T, remaining: Bytes) -> Self {
        DecodeOutcome::Finished { value, remaining }
    }
}

/// A suspended decoder, resumable exactly once.
pub struct Continuation<T>(Box<dyn FnOnce(Input) -> DecodeOutcome<T>>);

impl<T> Continuation<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Input) -> DecodeOutcome<T> + 'static,
    {
        Continuation(Box::new(f))
    }

    pub fn resume(self, input: Input) -> DecodeOutcome<T> {
        (self.0)(input)
    }
}

impl<T> std::fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Continuation(..)")
    }
}

/// A terminal outcome reached by [`drive`], annotated with byte accounting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminal<T> {
    Failed {
        message: String,
        consumed: usize,
    },
    Finished {
        value: T,
        remaining: Bytes,

        /// Bytes consumed by the value: everything fed minus `remaining`.
        consumed: usize,
    },
}

/// A decoder broke the three-outcome contract.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("decoder asked for more input after end of input ({fed} bytes fed)")]
    NeedsMoreAfterEnd { fed: usize },

    #[error(
        "decoder finished with {remaining} bytes remaining, which aren't a suffix of the {fed} \
         bytes fed"
    )]
    RemainingNotSuffix { remaining: usize, fed: usize },

    #[error("decoder failed after consuming {consumed} bytes, but only {fed} were fed")]
    ConsumedPastInput { consumed: usize, fed: usize },

    #[error("decoder panicked: {message}")]
    Panicked { message: String },
}

/// Drives `decode` to a terminal outcome.
///
/// `decode` receives the first chunk (or an empty sequence if there are none). Each
/// [`DecodeOutcome::NeedsMore`] is resumed with the next non-empty chunk, then once the chunks
/// run out with [`Input::End`]. Empty chunks past the first are skipped, so each resumption
/// consumes either bytes or the single end-of-input signal and the loop runs at most
/// `chunks + 1` times.
///
/// `chunks` may be a `&mut` iterator; on return it is positioned after the last chunk fed.
pub fn drive<T, D, I>(decode: D, chunks: I) -> Result<Terminal<T>, Violation>
where
    D: FnOnce(Bytes) -> DecodeOutcome<T>,
    I: IntoIterator<Item = Bytes>,
{
    let mut chunks = chunks.into_iter();
    let mut fed = BytesMut::new();
    let first = chunks.next().unwrap_or_default();
    fed.put_slice(&first);
    let mut outcome = guard(move || decode(first))?;
    let mut ended = false;
    loop {
        match outcome {
            DecodeOutcome::Failed { message, consumed } => {
                if consumed > fed.len() {
                    return Err(Violation::ConsumedPastInput {
                        consumed,
                        fed: fed.len(),
                    });
                }
                return Ok(Terminal::Failed { message, consumed });
            }
            DecodeOutcome::Finished { value, remaining } => {
                if !fed.ends_with(&remaining) {
                    return Err(Violation::RemainingNotSuffix {
                        remaining: remaining.len(),
                        fed: fed.len(),
                    });
                }
                let consumed = fed.len() - remaining.len();
                return Ok(Terminal::Finished {
                    value,
                    remaining,
                    consumed,
                });
            }
            DecodeOutcome::NeedsMore(k) => {
                if ended {
                    return Err(Violation::NeedsMoreAfterEnd { fed: fed.len() });
                }
                let input = match chunks.by_ref().find(|c| !c.is_empty()) {
                    Some(c) => {
                        fed.put_slice(&c);
                        Input::Chunk(c)
                    }
                    None => {
                        ended = true;
                        Input::End
                    }
                };
                outcome = guard(move || k.resume(input))?;
            }
        }
    }
}

/// Runs one step of a decoder, turning a panic into [`Violation::Panicked`].
fn guard<T, F>(f: F) -> Result<DecodeOutcome<T>, Violation>
where
    F: FnOnce() -> DecodeOutcome<T>,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Violation::Panicked {
        message: panic_message(payload.as_ref()),
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Builds an incremental decoder from a function that parses a complete value from a buffer.
///
/// `parse` follows the usual framing convention:
///
/// 1.  If `buf` starts with a full, valid value, advances `buf` past it and returns
///     `Ok(Some(_))`.
/// 2.  If `buf` holds only a prefix of a valid value, returns `Ok(None)`.
/// 3.  Otherwise returns `Err(reason)`. Any bytes it advanced past count as consumed.
///
/// `parse` is re-run over the whole accumulated buffer each time a chunk arrives. A buffer still
/// incomplete at end of input decodes as [`DecodeOutcome::Failed`].
pub fn buffered<T, P>(parse: P, input: Bytes) -> DecodeOutcome<T>
where
    T: 'static,
    P: FnMut(&mut BytesMut) -> Result<Option<T>, String> + 'static,
{
    let fed = input.len();
    buffered_step(parse, BytesMut::from(&input[..]), fed)
}

fn buffered_step<T, P>(mut parse: P, mut buf: BytesMut, fed: usize) -> DecodeOutcome<T>
where
    T: 'static,
    P: FnMut(&mut BytesMut) -> Result<Option<T>, String> + 'static,
{
    match parse(&mut buf) {
        Ok(Some(value)) => DecodeOutcome::finished(value, buf.freeze()),
        Err(message) => DecodeOutcome::failed(message, fed - buf.len()),
        Ok(None) => DecodeOutcome::needs_more(move |input| match input {
            Input::Chunk(c) => {
                buf.put_slice(&c);
                buffered_step(parse, buf, fed + c.len())
            }
            Input::End => DecodeOutcome::failed(
                format!("unexpected end of input with {} bytes buffered", buf.len()),
                fed - buf.len(),
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf as _;
    use pretty_assertions::assert_eq;

    /// Parses a big-endian `u16`.
    fn parse_u16(buf: &mut BytesMut) -> Result<Option<u16>, String> {
        if buf.len() < 2 {
            return Ok(None);
        }
        Ok(Some(buf.get_u16()))
    }

    fn chunks(parts: &[&'static [u8]]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::from_static(p)).collect()
    }

    #[test]
    fn single_chunk() {
        let t = drive(|b| buffered(parse_u16, b), chunks(&[b"\x01\x02\x03"])).unwrap();
        assert_eq!(
            t,
            Terminal::Finished {
                value: 0x0102,
                remaining: Bytes::from_static(b"\x03"),
                consumed: 2,
            }
        );
    }

    #[test]
    fn split_across_chunks() {
        let t = drive(
            |b| buffered(parse_u16, b),
            chunks(&[b"", b"\x01", b"", b"\x02"]),
        )
        .unwrap();
        assert_eq!(
            t,
            Terminal::Finished {
                value: 0x0102,
                remaining: Bytes::new(),
                consumed: 2,
            }
        );
    }

    #[test]
    fn truncated_fails_at_end() {
        let t = drive(|b| buffered(parse_u16, b), chunks(&[b"\xff"])).unwrap();
        assert!(matches!(t, Terminal::Failed { consumed: 0, .. }), "{:?}", t);
    }

    #[test]
    fn no_chunks_means_empty_input() {
        let t = drive(|b| buffered(parse_u16, b), Vec::new()).unwrap();
        assert!(matches!(t, Terminal::Failed { .. }));
    }

    #[test]
    fn rejection_counts_consumed() {
        let parse = |buf: &mut BytesMut| -> Result<Option<u8>, String> {
            buf.advance(1);
            Err("bad tag".to_owned())
        };
        let t = drive(|b| buffered(parse, b), chunks(&[b"\x07\x08"])).unwrap();
        assert_eq!(
            t,
            Terminal::Failed {
                message: "bad tag".to_owned(),
                consumed: 1,
            }
        );
    }

    #[test]
    fn needs_more_forever() {
        fn forever(_: Input) -> DecodeOutcome<()> {
            DecodeOutcome::needs_more(forever)
        }
        let e = drive(|_| DecodeOutcome::needs_more(forever), chunks(&[b"ab", b"c"])).unwrap_err();
        assert_eq!(e, Violation::NeedsMoreAfterEnd { fed: 3 });
    }

    #[test]
    fn panic_is_caught() {
        let e = drive::<(), _, _>(|_| panic!("boom"), chunks(&[b"x"])).unwrap_err();
        assert_eq!(
            e,
            Violation::Panicked {
                message: "boom".to_owned()
            }
        );
    }

    #[test]
    fn invented_remaining() {
        let e = drive(
            |_| DecodeOutcome::finished((), Bytes::from_static(b"zz")),
            chunks(&[b"az"]),
        )
        .unwrap_err();
        assert_eq!(e, Violation::RemainingNotSuffix { remaining: 2, fed: 2 });
    }

    #[test]
    fn consumed_past_input() {
        let e = drive(|_| DecodeOutcome::<()>::failed("no", 5), chunks(&[b"abc"])).unwrap_err();
        assert_eq!(e, Violation::ConsumedPastInput { consumed: 5, fed: 3 });
    }

    #[test]
    fn leaves_unfed_chunks() {
        let mut iter = chunks(&[b"\x00", b"\x01\x02", b"\x03"]).into_iter();
        let t = drive(|b| buffered(parse_u16, b), iter.by_ref()).unwrap();
        assert_eq!(
            t,
            Terminal::Finished {
                value: 1,
                remaining: Bytes::from_static(b"\x02"),
                consumed: 2,
            }
        );
        assert_eq!(iter.next(), Some(Bytes::from_static(b"\x03")));
    }
}
