// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Splitting byte sequences into the chunks fed to a decoder.

use bytes::Bytes;

/// Splits `data` at each offset in `boundaries`.
///
/// Offsets are clamped to `data.len()`; duplicates and offsets at either end are dropped, so
/// every returned chunk is non-empty (unless `data` itself is empty, in which case the result is
/// empty). Concatenating the result always yields `data` again.
pub fn split_at(data: &Bytes, boundaries: &[usize]) -> Vec<Bytes> {
    let mut cuts: Vec<usize> = boundaries
        .iter()
        .map(|&b| b.min(data.len()))
        .filter(|&b| b > 0 && b < data.len())
        .collect();
    cuts.sort_unstable();
    cuts.dedup();
    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        chunks.push(data.slice(start..cut));
        start = cut;
    }
    if start < data.len() {
        chunks.push(data.slice(start..));
    }
    chunks
}

/// Splits `data` into its first `consumed` bytes and the rest.
///
/// Returns `None` if `consumed` exceeds the length.
pub fn split_consumed(data: &Bytes, consumed: usize) -> Option<(Bytes, Bytes)> {
    if consumed > data.len() {
        return None;
    }
    Some((data.slice(..consumed), data.slice(consumed..)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn split_drops_empty_chunks() {
        let data = Bytes::from_static(b"abcdef");
        let chunks = split_at(&data, &[0, 2, 2, 9, 4, 6]);
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"ab"),
                Bytes::from_static(b"cd"),
                Bytes::from_static(b"ef"),
            ]
        );
        assert_eq!(chunks.concat(), &data[..]);
    }

    #[test]
    fn split_empty() {
        assert!(split_at(&Bytes::new(), &[0, 1]).is_empty());
        assert_eq!(
            split_at(&Bytes::from_static(b"x"), &[]),
            vec![Bytes::from_static(b"x")]
        );
    }

    #[test]
    fn consumed() {
        let data = Bytes::from_static(b"abc");
        let (head, tail) = split_consumed(&data, 1).unwrap();
        assert_eq!(&head[..], b"a");
        assert_eq!(&tail[..], b"bc");
        assert!(split_consumed(&data, 4).is_none());
    }
}
