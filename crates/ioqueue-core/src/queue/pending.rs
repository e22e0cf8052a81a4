//! Intrusive pending list threaded through `Slot::next_pending`.

use super::table::RequestTable;

impl RequestTable {
    /// Append to the tail.
    pub fn enqueue(&mut self, index: usize) {
        self.slots[index].next_pending = None;
        match self.last_pending {
            Some(last) => self.slots[last].next_pending = Some(index),
            None => self.first_pending = Some(index),
        }
        self.last_pending = Some(index);
    }

    /// Insert at the head, ahead of everything already waiting.
    pub fn enqueue_front(&mut self, index: usize) {
        self.slots[index].next_pending = self.first_pending;
        if self.first_pending.is_none() {
            self.last_pending = Some(index);
        }
        self.first_pending = Some(index);
    }

    /// Remove `index`, whose predecessor in the chain is `prev`.
    pub fn unlink(&mut self, prev: Option<usize>, index: usize) {
        let next = self.slots[index].next_pending.take();
        match prev {
            Some(prev) => self.slots[prev].next_pending = next,
            None => self.first_pending = next,
        }
        if self.last_pending == Some(index) {
            self.last_pending = prev;
        }
    }

    /// `(predecessor, index)` pairs in chain order.
    pub fn pending(&self) -> PendingIter<'_> {
        PendingIter {
            table: self,
            prev: None,
            cursor: self.first_pending,
        }
    }
}

pub(crate) struct PendingIter<'a> {
    table: &'a RequestTable,
    prev: Option<usize>,
    cursor: Option<usize>,
}

impl Iterator for PendingIter<'_> {
    type Item = (Option<usize>, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let item = (self.prev, index);
        self.prev = Some(index);
        self.cursor = self.table.slot(index).and_then(|slot| slot.next_pending);
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use super::super::table::RequestKind;
    use super::*;

    fn table_with(n: usize) -> RequestTable {
        let mut table = RequestTable::new(4);
        for _ in 0..n {
            let kind = RequestKind::Open {
                path: CString::new("x").unwrap(),
                flags: 0,
            };
            table.allocate(None, kind, false).unwrap();
        }
        table
    }

    fn order(table: &RequestTable) -> Vec<usize> {
        table.pending().map(|(_, index)| index).collect()
    }

    #[test]
    fn fifo_append() {
        let mut table = table_with(3);
        table.enqueue(0);
        table.enqueue(1);
        table.enqueue(2);
        assert_eq!(order(&table), vec![0, 1, 2]);
        assert_eq!(table.last_pending, Some(2));
    }

    #[test]
    fn front_insert_goes_first() {
        let mut table = table_with(3);
        table.enqueue(0);
        table.enqueue(1);
        table.enqueue_front(2);
        assert_eq!(order(&table), vec![2, 0, 1]);
    }

    #[test]
    fn front_insert_into_empty_sets_tail() {
        let mut table = table_with(1);
        table.enqueue_front(0);
        assert_eq!(table.first_pending, Some(0));
        assert_eq!(table.last_pending, Some(0));
    }

    #[test]
    fn unlink_middle_head_and_tail() {
        let mut table = table_with(4);
        for index in 0..4 {
            table.enqueue(index);
        }
        table.unlink(Some(1), 2);
        assert_eq!(order(&table), vec![0, 1, 3]);
        table.unlink(None, 0);
        assert_eq!(order(&table), vec![1, 3]);
        table.unlink(Some(1), 3);
        assert_eq!(order(&table), vec![1]);
        assert_eq!(table.last_pending, Some(1));
        table.unlink(None, 1);
        assert_eq!(table.first_pending, None);
        assert_eq!(table.last_pending, None);
    }

    #[test]
    fn iterator_reports_predecessors() {
        let mut table = table_with(3);
        table.enqueue(2);
        table.enqueue(0);
        let pairs: Vec<_> = table.pending().collect();
        assert_eq!(pairs, vec![(None, 2), (Some(2), 0)]);
    }
}
