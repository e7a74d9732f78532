//! Toggle semantics shared by every relation kind.
//!
//! Requesting the value a relation already holds undoes it; any other request
//! replaces it. The resolver is pure and knows nothing about stores or caches.

use bulsho_shared::types::RemoteOperation;

/// The net effect of a toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Value the relation holds after the action. `0` means absent.
    pub next_value: i32,
    /// Remote write needed to reach `next_value`.
    pub operation: RemoteOperation,
}

/// Resolve a requested value against the current one.
///
/// `current_value` is `0` when no relation exists. `requested_value` is
/// expected to be non-zero, and `1` for binary relations.
pub fn resolve(current_value: i32, requested_value: i32) -> Resolution {
    let next_value = if current_value == requested_value {
        0
    } else {
        requested_value
    };

    let operation = if next_value == 0 {
        RemoteOperation::Delete
    } else if current_value == 0 {
        RemoteOperation::Create
    } else {
        RemoteOperation::Update
    };

    Resolution {
        next_value,
        operation,
    }
}

/// Adjust a denormalized aggregate for a value transition.
pub fn next_count(current_count: i64, current_value: i32, next_value: i32) -> i64 {
    current_count - i64::from(current_value) + i64::from(next_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_vote_creates() {
        let resolution = resolve(0, 1);
        assert_eq!(resolution.next_value, 1);
        assert_eq!(resolution.operation, RemoteOperation::Create);
        assert_eq!(next_count(7, 0, resolution.next_value), 8);
    }

    #[test]
    fn test_repeated_vote_undoes() {
        let resolution = resolve(1, 1);
        assert_eq!(resolution.next_value, 0);
        assert_eq!(resolution.operation, RemoteOperation::Delete);
        assert_eq!(next_count(8, 1, resolution.next_value), 7);
    }

    #[test]
    fn test_switching_vote_updates_in_one_step() {
        let resolution = resolve(1, -1);
        assert_eq!(resolution.next_value, -1);
        assert_eq!(resolution.operation, RemoteOperation::Update);
        assert_eq!(next_count(10, 1, resolution.next_value), 8);
    }

    #[test]
    fn test_toggle_twice_round_trips() {
        let count = 3;
        let first = resolve(0, 1);
        let after_first = next_count(count, 0, first.next_value);
        let second = resolve(first.next_value, 1);
        let after_second = next_count(after_first, first.next_value, second.next_value);

        assert_eq!(first.next_value, 1);
        assert_eq!(second.next_value, 0);
        assert_eq!(after_second, count);
    }

    #[test]
    fn test_count_conservation_over_sequence() {
        let start = 5_i64;
        let requests = [1, 1, -1, -1, 1, -1, 1, 1, 2];

        let mut value = 0;
        let mut count = start;
        let mut applied_sum = 0_i64;
        for requested in requests {
            let resolution = resolve(value, requested);
            count = next_count(count, value, resolution.next_value);
            applied_sum += i64::from(resolution.next_value) - i64::from(value);
            value = resolution.next_value;

            assert_eq!(count, start + applied_sum);
            assert_eq!(count, start + i64::from(value));
        }
    }
}
