//! Bounded result consumption.

use crate::storage::cursor::{CursorGuard, DEFAULT_BATCH_SIZE, DocumentCursor};
use crate::{Error, Result};

/// Upper bound on up-front allocation, independent of the caller's cap.
const MAX_PREALLOCATION: usize = 1024;

/// Drains `cursor` into at most `max` decoded records.
///
/// The cursor's limit is set to `max` before the first fetch, so backends
/// never read documents past the cap. Records keep the cursor's order.
/// The cursor is closed on every path: after the last record, when the cap
/// is reached, and when an error aborts consumption.
///
/// # Errors
///
/// - [`Error::Validation`] if `max` is zero.
/// - Any enumeration error from the cursor, typically [`Error::Persistence`].
/// - [`Error::Decoding`] if a document cannot be decoded; records decoded so
///   far are discarded.
pub fn consume_cursor<C, T>(cursor: C, max: usize) -> Result<Vec<T>>
where
    C: DocumentCursor,
    T: TryFrom<C::Document, Error = Error>,
{
    let mut cursor = CursorGuard::new(cursor);
    if max == 0 {
        return Err(Error::Validation(
            "result cap must be a positive integer".to_string(),
        ));
    }

    cursor.set_limit(max);
    cursor.set_batch_size(max.min(DEFAULT_BATCH_SIZE));

    let mut records = Vec::with_capacity(max.min(MAX_PREALLOCATION));
    while records.len() < max {
        let Some(document) = cursor.advance()? else {
            break;
        };
        records.push(T::try_from(document)?);
    }

    cursor.finish()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::cursor::{CursorLease, CursorTracker};
    use crate::PersistenceErrorKind;
    use std::collections::VecDeque;

    /// A cursor over canned values that records how far it was read.
    struct ScriptedCursor {
        items: VecDeque<Result<i64>>,
        limit: Option<usize>,
        yielded: usize,
        lease: Option<CursorLease>,
    }

    impl ScriptedCursor {
        fn new(tracker: &CursorTracker, items: Vec<Result<i64>>) -> Self {
            Self {
                items: items.into(),
                limit: None,
                yielded: 0,
                lease: Some(tracker.lease()),
            }
        }
    }

    impl DocumentCursor for ScriptedCursor {
        type Document = i64;

        fn set_limit(&mut self, limit: usize) {
            self.limit = Some(limit);
        }

        fn set_batch_size(&mut self, _batch_size: usize) {}

        fn advance(&mut self) -> Result<Option<i64>> {
            if self.limit.is_some_and(|l| self.yielded >= l) {
                return Ok(None);
            }
            match self.items.pop_front() {
                Some(item) => {
                    self.yielded += 1;
                    item.map(Some)
                },
                None => Ok(None),
            }
        }

        fn close(&mut self) -> Result<()> {
            self.lease = None;
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.lease.is_none()
        }
    }

    /// Decodes only non-negative numbers.
    #[derive(Debug, PartialEq)]
    struct Positive(u32);

    impl TryFrom<i64> for Positive {
        type Error = Error;

        fn try_from(value: i64) -> Result<Self> {
            u32::try_from(value).map(Self).map_err(|_| Error::Decoding {
                record: "positive",
                cause: format!("{value} is negative"),
            })
        }
    }

    fn ok_items(n: i64) -> Vec<Result<i64>> {
        (0..n).map(Ok).collect()
    }

    #[test]
    fn test_returns_all_when_under_cap() {
        let tracker = CursorTracker::new();
        let cursor = ScriptedCursor::new(&tracker, ok_items(3));
        let out: Vec<Positive> = consume_cursor(cursor, 10).unwrap();
        assert_eq!(out, vec![Positive(0), Positive(1), Positive(2)]);
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_truncates_at_cap() {
        let tracker = CursorTracker::new();
        let cursor = ScriptedCursor::new(&tracker, ok_items(50));
        let out: Vec<Positive> = consume_cursor(cursor, 5).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[4], Positive(4));
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_decode_failure_aborts_and_releases() {
        let tracker = CursorTracker::new();
        let cursor = ScriptedCursor::new(&tracker, vec![Ok(1), Ok(-1), Ok(2)]);
        let err = consume_cursor::<_, Positive>(cursor, 10).unwrap_err();
        assert!(matches!(err, Error::Decoding { .. }));
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_stream_error_is_not_decoding_error() {
        let tracker = CursorTracker::new();
        let cursor = ScriptedCursor::new(
            &tracker,
            vec![Ok(1), Err(Error::persistence("get_more", "connection reset"))],
        );
        let err = consume_cursor::<_, Positive>(cursor, 10).unwrap_err();
        assert_eq!(err.persistence_kind(), Some(PersistenceErrorKind::Backend));
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_zero_cap_is_validation_error() {
        let tracker = CursorTracker::new();
        let cursor = ScriptedCursor::new(&tracker, ok_items(3));
        let err = consume_cursor::<_, Positive>(cursor, 0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_empty_cursor() {
        let tracker = CursorTracker::new();
        let cursor = ScriptedCursor::new(&tracker, Vec::new());
        let out: Vec<Positive> = consume_cursor(cursor, 3).unwrap();
        assert!(out.is_empty());
        assert_eq!(tracker.open_count(), 0);
    }
}
