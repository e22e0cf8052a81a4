//! Dispatch policy.
//!
//! The pending request with the smallest signed distance to its deadline
//! runs first, overdue requests included. Requests without a deadline run in
//! chain order once no deadline-bearing request is pending.

use super::table::RequestTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchReason {
    Deadline,
    Fifo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Selection {
    pub prev: Option<usize>,
    pub index: usize,
    pub reason: DispatchReason,
}

/// `deadline - now` as a signed tick count, well defined across wraparound.
#[must_use]
pub(crate) const fn deadline_distance(deadline: u64, now: u64) -> i64 {
    deadline.wrapping_sub(now) as i64
}

/// Pick the next pending request. Equal distances go to the earlier entry
/// in the chain.
pub(crate) fn select_next(table: &RequestTable, now: u64) -> Option<Selection> {
    let mut head = None;
    let mut best: Option<(i64, Selection)> = None;

    for (prev, index) in table.pending() {
        if head.is_none() {
            head = Some(Selection {
                prev,
                index,
                reason: DispatchReason::Fifo,
            });
        }
        let Some(deadline) = table.slot(index).and_then(|slot| slot.deadline) else {
            continue;
        };
        let distance = deadline_distance(deadline, now);
        if best.is_none_or(|(current, _)| distance < current) {
            best = Some((
                distance,
                Selection {
                    prev,
                    index,
                    reason: DispatchReason::Deadline,
                },
            ));
        }
    }

    best.map(|(_, selection)| selection).or(head)
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use super::super::table::RequestKind;
    use super::*;

    fn table_with_deadlines(deadlines: &[Option<u64>]) -> RequestTable {
        let mut table = RequestTable::new(4);
        for &deadline in deadlines {
            let kind = RequestKind::Open {
                path: CString::new("x").unwrap(),
                flags: 0,
            };
            let index = table.allocate(deadline, kind, false).unwrap();
            table.enqueue(index);
        }
        table
    }

    #[test]
    fn empty_chain_selects_nothing() {
        let table = RequestTable::new(4);
        assert_eq!(select_next(&table, 0), None);
    }

    #[test]
    fn no_deadlines_is_fifo() {
        let table = table_with_deadlines(&[None, None, None]);
        let selection = select_next(&table, 100).unwrap();
        assert_eq!(selection.index, 0);
        assert_eq!(selection.prev, None);
        assert_eq!(selection.reason, DispatchReason::Fifo);
    }

    #[test]
    fn soonest_deadline_wins() {
        let table = table_with_deadlines(&[None, Some(300), Some(200), Some(250)]);
        let selection = select_next(&table, 100).unwrap();
        assert_eq!(selection.index, 2);
        assert_eq!(selection.prev, Some(1));
        assert_eq!(selection.reason, DispatchReason::Deadline);
    }

    #[test]
    fn overdue_beats_future_and_fifo() {
        let table = table_with_deadlines(&[None, Some(1_100), Some(900)]);
        let selection = select_next(&table, 1_000).unwrap();
        assert_eq!(selection.index, 2);
    }

    #[test]
    fn most_overdue_first() {
        let table = table_with_deadlines(&[Some(990), Some(500), Some(999)]);
        assert_eq!(select_next(&table, 1_000).unwrap().index, 1);
    }

    #[test]
    fn ties_go_to_chain_order() {
        let table = table_with_deadlines(&[Some(500), Some(500)]);
        assert_eq!(select_next(&table, 0).unwrap().index, 0);
    }

    #[test]
    fn distance_survives_clock_wrap() {
        let now = u64::MAX - 10;
        assert_eq!(deadline_distance(now.wrapping_add(20), now), 20);
        assert_eq!(deadline_distance(now - 5, now), -5);

        let table = table_with_deadlines(&[Some(now.wrapping_add(50)), Some(now.wrapping_add(5))]);
        assert_eq!(select_next(&table, now).unwrap().index, 1);
    }
}
