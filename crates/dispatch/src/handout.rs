//! Split/merge of dispatch lines on handout.
//!
//! Lines live in an arena (slots, removed lines leave a tombstone) with two
//! indexes: by id, and handed-out lines by merge key. All handout logic runs
//! on the arena, so it can be exercised without storage.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use siteops_core::{
    DispatchItemId, DomainError, DomainResult, InventoryItemId, PurchaseId, RequisitionItemId,
    UserId,
};
use siteops_inventory::normalize_name;

use crate::line::{DispatchItem, LineState};

/// Lines with equal keys are the same material from the same source and
/// collapse into one handed-out line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    description: String,
    unit: String,
    requisition_item_id: Option<RequisitionItemId>,
    inventory_item_id: Option<InventoryItemId>,
    purchase_id: Option<PurchaseId>,
}

impl MergeKey {
    pub fn of(item: &DispatchItem) -> Self {
        Self {
            description: normalize_name(&item.description),
            unit: normalize_name(&item.unit),
            requisition_item_id: item.requisition_item_id,
            inventory_item_id: item.inventory_item_id,
            purchase_id: item.purchase_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoutKind {
    /// Added to an existing handed-out line.
    Merged {
        into: DispatchItemId,
        source_removed: bool,
    },
    /// Source shrunk to the handed amount; a new line holds the rest.
    Split { remainder: DispatchItemId },
    /// The whole line handed out in place.
    Marked,
}

/// Rows touched by one handout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoutChange {
    pub kind: HandoutKind,
    /// The line now carrying the handed quantity.
    pub handed_line: DispatchItemId,
    /// Lines to write (updated or newly inserted).
    pub upserted: Vec<DispatchItem>,
    pub removed: Vec<DispatchItemId>,
}

#[derive(Debug, Clone, Default)]
pub struct LineArena {
    slots: Vec<Option<DispatchItem>>,
    by_id: HashMap<DispatchItemId, usize>,
    handed: HashMap<MergeKey, usize>,
}

impl LineArena {
    pub fn new(lines: Vec<DispatchItem>) -> Self {
        let mut arena = Self::default();
        for line in lines {
            arena.push(line);
        }
        arena
    }

    fn push(&mut self, line: DispatchItem) -> usize {
        let idx = self.slots.len();
        self.by_id.insert(line.id, idx);
        if Self::is_merge_target(&line) {
            self.handed.entry(MergeKey::of(&line)).or_insert(idx);
        }
        self.slots.push(Some(line));
        idx
    }

    fn is_merge_target(line: &DispatchItem) -> bool {
        line.state() == LineState::FullyHanded && !line.used_out
    }

    pub fn get(&self, id: DispatchItemId) -> Option<&DispatchItem> {
        self.by_id
            .get(&id)
            .and_then(|&idx| self.slots.get(idx))
            .and_then(Option::as_ref)
    }

    pub fn lines(&self) -> impl Iterator<Item = &DispatchItem> {
        self.slots.iter().flatten()
    }

    pub fn into_lines(self) -> Vec<DispatchItem> {
        self.slots.into_iter().flatten().collect()
    }

    fn remove(&mut self, idx: usize) -> Option<DispatchItem> {
        let line = self.slots.get_mut(idx)?.take()?;
        self.by_id.remove(&line.id);
        let key = MergeKey::of(&line);
        if self.handed.get(&key) == Some(&idx) {
            self.handed.remove(&key);
        }
        Some(line)
    }

    /// Hand out `qty` of line `item_id`, drawn from `inventory_item_id`.
    ///
    /// The source line is linked to the inventory record before the merge
    /// lookup, so only lines drawn from the same record merge.
    pub fn hand_out(
        &mut self,
        item_id: DispatchItemId,
        qty: i64,
        inventory_item_id: InventoryItemId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<HandoutChange> {
        let src_idx = *self
            .by_id
            .get(&item_id)
            .ok_or_else(|| DomainError::not_found(format!("dispatch line {item_id}")))?;
        let source = self.slots[src_idx]
            .as_mut()
            .ok_or_else(|| DomainError::not_found(format!("dispatch line {item_id}")))?;

        let (available, origin) = match source.state() {
            LineState::FullyHanded => {
                return Err(DomainError::invalid_state(format!(
                    "dispatch line {item_id} is already handed out"
                )));
            }
            LineState::PartiallyHandedSplit { parent, remainder } => {
                (remainder, format!("remainder of line {parent}"))
            }
            LineState::Untouched => (source.qty, format!("line {item_id}")),
        };
        if qty <= 0 {
            return Err(DomainError::validation("handout quantity must be positive"));
        }
        if qty > available {
            return Err(DomainError::validation(format!(
                "cannot hand out {qty} from {origin} holding {available}"
            )));
        }

        source.inventory_item_id = Some(inventory_item_id);
        let partial = qty < source.qty;
        let key = MergeKey::of(source);

        if let Some(&target_idx) = self.handed.get(&key) {
            if target_idx != src_idx {
                return self.merge(src_idx, target_idx, qty, partial);
            }
        }

        if partial {
            self.split(src_idx, qty, actor, now)
        } else {
            self.mark(src_idx, qty, actor, now)
        }
    }

    fn merge(
        &mut self,
        src_idx: usize,
        target_idx: usize,
        qty: i64,
        partial: bool,
    ) -> DomainResult<HandoutChange> {
        let target = self.slots[target_idx]
            .as_mut()
            .ok_or_else(|| DomainError::invariant("merge target vanished"))?;
        target.qty += qty;
        target.handed_out_qty += qty;
        target.check_invariants()?;
        let into = target.id;
        let mut upserted = vec![target.clone()];
        let mut removed = Vec::new();

        if partial {
            let source = self.slots[src_idx]
                .as_mut()
                .ok_or_else(|| DomainError::invariant("handout source vanished"))?;
            source.qty -= qty;
            source.check_invariants()?;
            upserted.push(source.clone());
        } else if let Some(source) = self.remove(src_idx) {
            removed.push(source.id);
        }

        Ok(HandoutChange {
            kind: HandoutKind::Merged {
                into,
                source_removed: !partial,
            },
            handed_line: into,
            upserted,
            removed,
        })
    }

    fn split(
        &mut self,
        src_idx: usize,
        qty: i64,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<HandoutChange> {
        let source = self.slots[src_idx]
            .as_mut()
            .ok_or_else(|| DomainError::invariant("handout source vanished"))?;
        let remainder = source.remainder_sibling(source.qty - qty);
        source.mark_handed(qty, actor, now);
        source.check_invariants()?;
        let handed = source.clone();
        let remainder_id = remainder.id;

        self.handed.entry(MergeKey::of(&handed)).or_insert(src_idx);
        self.push(remainder.clone());

        Ok(HandoutChange {
            kind: HandoutKind::Split {
                remainder: remainder_id,
            },
            handed_line: handed.id,
            upserted: vec![handed, remainder],
            removed: Vec::new(),
        })
    }

    fn mark(
        &mut self,
        src_idx: usize,
        qty: i64,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<HandoutChange> {
        let source = self.slots[src_idx]
            .as_mut()
            .ok_or_else(|| DomainError::invariant("handout source vanished"))?;
        source.mark_handed(qty, actor, now);
        source.check_invariants()?;
        let handed = source.clone();
        self.handed.entry(MergeKey::of(&handed)).or_insert(src_idx);

        Ok(HandoutChange {
            kind: HandoutKind::Marked,
            handed_line: handed.id,
            upserted: vec![handed],
            removed: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::DispatchLine;
    use proptest::prelude::*;
    use siteops_core::DispatchId;

    fn arena(quantities: &[i64]) -> (LineArena, Vec<DispatchItemId>) {
        let dispatch = DispatchId::new();
        let lines: Vec<_> = quantities
            .iter()
            .map(|&q| {
                DispatchItem::from_line(dispatch, DispatchLine::new("Cement", "bags", q)).unwrap()
            })
            .collect();
        let ids = lines.iter().map(|l| l.id).collect();
        (LineArena::new(lines), ids)
    }

    #[test]
    fn partial_handout_splits() {
        let (mut arena, ids) = arena(&[10]);
        let stock = InventoryItemId::new();
        let change = arena.hand_out(ids[0], 3, stock, UserId::new(), Utc::now()).unwrap();

        let HandoutKind::Split { remainder } = change.kind else {
            panic!("expected split, got {:?}", change.kind);
        };
        let handed = arena.get(ids[0]).unwrap();
        assert!(handed.handed_out);
        assert_eq!((handed.qty, handed.handed_out_qty), (3, 3));
        let rest = arena.get(remainder).unwrap();
        assert!(!rest.handed_out);
        assert_eq!((rest.qty, rest.handed_out_qty), (7, 0));
        assert_eq!(rest.state(), LineState::PartiallyHandedSplit { parent: ids[0], remainder: 7 });
        assert_eq!(arena.lines().map(|l| l.qty).sum::<i64>(), 10);
    }

    #[test]
    fn split_remainder_hands_out_at_most_what_it_holds() {
        let (mut arena, ids) = arena(&[10]);
        let stock = InventoryItemId::new();
        let HandoutKind::Split { remainder } =
            arena.hand_out(ids[0], 4, stock, UserId::new(), Utc::now()).unwrap().kind
        else {
            panic!("expected split");
        };

        let err = arena.hand_out(remainder, 7, stock, UserId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref m) if m.contains("remainder of line")));
        let err = arena.hand_out(ids[0], 1, stock, UserId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
        assert_eq!(arena.get(remainder).unwrap().state(), LineState::PartiallyHandedSplit {
            parent: ids[0],
            remainder: 6
        });
    }

    #[test]
    fn remaining_handout_merges_back_into_one_line() {
        let (mut arena, ids) = arena(&[10]);
        let stock = InventoryItemId::new();
        let change = arena.hand_out(ids[0], 3, stock, UserId::new(), Utc::now()).unwrap();
        let HandoutKind::Split { remainder } = change.kind else {
            panic!("expected split");
        };

        let change = arena.hand_out(remainder, 7, stock, UserId::new(), Utc::now()).unwrap();
        assert_eq!(
            change.kind,
            HandoutKind::Merged {
                into: ids[0],
                source_removed: true
            }
        );
        assert_eq!(change.removed, vec![remainder]);

        let lines = arena.into_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!((lines[0].qty, lines[0].handed_out_qty), (10, 10));
        assert_eq!(lines[0].state(), LineState::FullyHanded);
    }

    #[test]
    fn partial_merge_shrinks_the_source() {
        let (mut arena, ids) = arena(&[10]);
        let stock = InventoryItemId::new();
        let HandoutKind::Split { remainder } =
            arena.hand_out(ids[0], 3, stock, UserId::new(), Utc::now()).unwrap().kind
        else {
            panic!("expected split");
        };
        let change = arena.hand_out(remainder, 2, stock, UserId::new(), Utc::now()).unwrap();
        assert!(matches!(change.kind, HandoutKind::Merged { source_removed: false, .. }));
        assert_eq!(arena.get(ids[0]).unwrap().qty, 5);
        assert_eq!(arena.get(remainder).unwrap().qty, 5);
        assert_eq!(arena.lines().count(), 2);
    }

    #[test]
    fn full_handout_marks_in_place() {
        let (mut arena, ids) = arena(&[4]);
        let change = arena
            .hand_out(ids[0], 4, InventoryItemId::new(), UserId::new(), Utc::now())
            .unwrap();
        assert_eq!(change.kind, HandoutKind::Marked);
        assert_eq!(arena.lines().count(), 1);
        assert!(arena.get(ids[0]).unwrap().is_fully_handed());
    }

    #[test]
    fn different_stock_records_do_not_merge() {
        let (mut arena, ids) = arena(&[5, 5]);
        arena
            .hand_out(ids[0], 5, InventoryItemId::new(), UserId::new(), Utc::now())
            .unwrap();
        let change = arena
            .hand_out(ids[1], 5, InventoryItemId::new(), UserId::new(), Utc::now())
            .unwrap();
        assert_eq!(change.kind, HandoutKind::Marked);
        assert_eq!(arena.lines().count(), 2);
    }

    #[test]
    fn rejects_bad_quantities_and_repeat_handout() {
        let (mut arena, ids) = arena(&[5]);
        let stock = InventoryItemId::new();
        assert!(matches!(
            arena.hand_out(ids[0], 0, stock, UserId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            arena.hand_out(ids[0], 6, stock, UserId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
        arena.hand_out(ids[0], 5, stock, UserId::new(), Utc::now()).unwrap();
        assert!(matches!(
            arena.hand_out(ids[0], 1, stock, UserId::new(), Utc::now()),
            Err(DomainError::InvalidState(_))
        ));
        assert!(matches!(
            arena.hand_out(DispatchItemId::new(), 1, stock, UserId::new(), Utc::now()),
            Err(DomainError::NotFound(_))
        ));
    }

    proptest! {
        #[test]
        fn handouts_conserve_quantity(
            start in proptest::collection::vec(1i64..40, 1..4),
            picks in proptest::collection::vec((0usize..8, 1i64..40), 0..24),
        ) {
            let (mut arena, _) = arena(&start);
            let total: i64 = start.iter().sum();
            let stock = InventoryItemId::new();

            for (pick, qty) in picks {
                let open: Vec<_> = arena.lines().filter(|l| !l.handed_out).map(|l| (l.id, l.qty)).collect();
                if open.is_empty() {
                    break;
                }
                let (id, available) = open[pick % open.len()];
                let _ = arena.hand_out(id, qty.min(available), stock, UserId::new(), Utc::now());

                prop_assert_eq!(arena.lines().map(|l| l.qty).sum::<i64>(), total);
                for line in arena.lines() {
                    prop_assert!(line.handed_out_qty <= line.qty);
                    prop_assert!(line.qty > 0);
                }
                // one handed-out line per key at most
                prop_assert!(arena.lines().filter(|l| l.handed_out).count() <= 1);
            }
        }
    }
}
