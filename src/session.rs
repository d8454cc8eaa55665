use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Server-tracked state of a resumable upload, as returned when the session
/// is created, refreshed, or continued after a slice.
///
/// `next_expected_ranges` entries are `"start-end"` strings with inclusive
/// bounds; an entry with an empty end half (`"12345-"`) means "through the
/// end of the file".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_expected_ranges: Option<Vec<String>>,
}

impl UploadSession {
    /// Returns true when the body shape signals a continuation rather than a
    /// finished item: the server still expects at least one range.
    pub fn expects_more(&self) -> bool {
        self.next_expected_ranges
            .as_ref()
            .is_some_and(|ranges| !ranges.is_empty())
    }
}

/// An inclusive byte range, `end >= begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub begin: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(begin: u64, end: u64) -> Result<Self, UploadError> {
        if end < begin {
            return Err(UploadError::InvalidRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.begin + 1
    }

    /// Parses a `"start-end"` range string. An empty end half resolves to
    /// the last byte of the upload, which requires a non-zero total length.
    pub fn parse(raw: &str, total_length: u64) -> Result<Self, UploadError> {
        let malformed = || UploadError::RangeParse(raw.to_string());
        let (begin, end) = raw.split_once('-').ok_or_else(malformed)?;
        let begin: u64 = begin.trim().parse().map_err(|_| malformed())?;
        let end = match end.trim() {
            "" => {
                if total_length == 0 {
                    return Err(malformed());
                }
                total_length - 1
            }
            bounded => bounded.parse().map_err(|_| malformed())?,
        };
        Self::new(begin, end)
    }
}

/// Parses a session's `nextExpectedRanges` into ascending [`ByteRange`]s.
pub fn ranges_remaining(
    ranges: &[String],
    total_length: u64,
) -> Result<Vec<ByteRange>, UploadError> {
    let mut parsed = ranges
        .iter()
        .map(|raw| ByteRange::parse(raw, total_length))
        .collect::<Result<Vec<_>, _>>()?;
    parsed.sort_by_key(|range| range.begin);
    Ok(parsed)
}

/// Splits each remaining range into contiguous slices of at most
/// `max_slice_size` bytes, preserving order. The last slice of a range may
/// be smaller.
pub fn partition_slices(ranges: &[ByteRange], max_slice_size: u64) -> Vec<ByteRange> {
    debug_assert!(max_slice_size > 0);
    let mut slices = Vec::new();
    for range in ranges {
        let mut begin = range.begin;
        while begin <= range.end {
            let len = (range.end - begin + 1).min(max_slice_size);
            slices.push(ByteRange {
                begin,
                end: begin + len - 1,
            });
            begin = match begin.checked_add(len) {
                Some(next) => next,
                None => break,
            };
        }
    }
    slices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_bounded_range() {
        let range = ByteRange::parse("12345-55232", 0).unwrap();
        assert_eq!(range, ByteRange { begin: 12345, end: 55232 });
        assert_eq!(range.len(), 55232 - 12345 + 1);
    }

    #[test]
    fn parse_open_ended_range_resolves_to_total_length() {
        let range = ByteRange::parse("100-", 1024).unwrap();
        assert_eq!(range, ByteRange { begin: 100, end: 1023 });
    }

    #[test]
    fn parse_open_ended_range_without_total_length_fails() {
        let err = ByteRange::parse("0-", 0).unwrap_err();
        assert!(matches!(err, UploadError::RangeParse(_)));
    }

    #[test]
    fn parse_malformed_range_fails() {
        for raw in ["", "42", "a-b", "-5", "5-4x"] {
            let err = ByteRange::parse(raw, 100).unwrap_err();
            assert!(matches!(err, UploadError::RangeParse(_)), "{raw:?}");
        }
    }

    #[test]
    fn parse_inverted_range_fails() {
        let err = ByteRange::parse("10-5", 100).unwrap_err();
        assert!(matches!(err, UploadError::InvalidRange { begin: 10, end: 5 }));
    }

    #[test]
    fn ranges_remaining_sorts_ascending() {
        let ranges =
            ranges_remaining(&strings(&["77829-99375", "12345-55232"]), 100_000).unwrap();
        assert_eq!(ranges[0].begin, 12345);
        assert_eq!(ranges[1].begin, 77829);
    }

    #[test]
    fn partition_24_bytes_by_5_yields_expected_slices() {
        let ranges = [ByteRange { begin: 0, end: 23 }];
        let slices = partition_slices(&ranges, 5);
        let sizes: Vec<u64> = slices.iter().map(ByteRange::len).collect();
        assert_eq!(sizes, [5, 5, 5, 5, 4]);
        assert_eq!(slices[0], ByteRange { begin: 0, end: 4 });
        assert_eq!(slices[4], ByteRange { begin: 20, end: 23 });
    }

    #[test]
    fn partition_covers_range_without_gaps_or_overlap() {
        let ranges = [ByteRange { begin: 0, end: 999 }];
        for slice_size in [1, 7, 100, 320, 1000, 4096] {
            let slices = partition_slices(&ranges, slice_size);
            assert_eq!(slices.len() as u64, 1000u64.div_ceil(slice_size));
            let mut expected_begin = 0;
            for slice in &slices {
                assert_eq!(slice.begin, expected_begin);
                assert!(slice.len() <= slice_size);
                expected_begin = slice.end + 1;
            }
            assert_eq!(expected_begin, 1000);
        }
    }

    #[test]
    fn partition_respects_multiple_ranges() {
        let ranges = [
            ByteRange { begin: 0, end: 9 },
            ByteRange { begin: 20, end: 23 },
        ];
        let slices = partition_slices(&ranges, 4);
        assert_eq!(
            slices,
            [
                ByteRange { begin: 0, end: 3 },
                ByteRange { begin: 4, end: 7 },
                ByteRange { begin: 8, end: 9 },
                ByteRange { begin: 20, end: 23 },
            ]
        );
    }

    #[test]
    fn session_deserializes_from_camel_case() {
        let session: UploadSession = serde_json::from_str(
            r#"{
                "uploadUrl": "https://uploads.example.com/session/1",
                "expirationDateTime": "2026-09-01T09:21:55Z",
                "nextExpectedRanges": ["0-"]
            }"#,
        )
        .unwrap();
        assert_eq!(
            session.upload_url.as_deref(),
            Some("https://uploads.example.com/session/1")
        );
        assert!(session.expiration_date_time.is_some());
        assert!(session.expects_more());
    }

    #[test]
    fn session_without_ranges_expects_no_more() {
        let session: UploadSession = serde_json::from_str(r#"{"id": "item-1"}"#).unwrap();
        assert!(!session.expects_more());
    }
}
