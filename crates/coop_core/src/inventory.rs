//! Slot inventories and full-state snapshots.
//!
//! Inventories never travel as deltas. Whenever one changes on the host the
//! complete slot vector is sent as an [`InventorySnapshot`] and receivers
//! overwrite their copy verbatim.

use serde::{Deserialize, Serialize};

use crate::error::RejectReason;

/// Opaque item-kind identifier (data-driven on the gameplay side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKind(pub u16);

/// Ordered slot contents of one inventory, `None` marking an empty slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// Slot contents in slot order.
    pub slots: Vec<Option<ItemKind>>,
}

impl InventorySnapshot {
    /// Number of occupied slots.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Fixed-capacity slot inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Inventory {
    slots: Vec<Option<ItemKind>>,
}

impl Inventory {
    /// Create an empty inventory with `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Create an inventory from explicit slot contents.
    #[must_use]
    pub fn from_slots(slots: Vec<Option<ItemKind>>) -> Self {
        Self { slots }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Contents of a slot (`None` if empty or out of range).
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<ItemKind> {
        self.slots.get(slot).copied().flatten()
    }

    /// Slot contents in order.
    #[must_use]
    pub fn slots(&self) -> &[Option<ItemKind>] {
        &self.slots
    }

    /// Index of the first empty slot.
    #[must_use]
    pub fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Whether at least one slot is empty.
    #[must_use]
    pub fn has_free_slot(&self) -> bool {
        self.first_free_slot().is_some()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Place an item in the first free slot, returning the slot index.
    pub fn insert(&mut self, kind: ItemKind) -> Option<usize> {
        let slot = self.first_free_slot()?;
        self.slots[slot] = Some(kind);
        Some(slot)
    }

    /// Remove and return the contents of a slot.
    ///
    /// # Errors
    /// [`RejectReason::InvalidSlot`] or [`RejectReason::SlotEmpty`].
    pub fn take(&mut self, slot: usize) -> Result<ItemKind, RejectReason> {
        let entry = self.slots.get_mut(slot).ok_or(RejectReason::InvalidSlot)?;
        entry.take().ok_or(RejectReason::SlotEmpty)
    }

    /// Overwrite a slot. Idempotent; grows the inventory if `slot` is past the end.
    pub fn set(&mut self, slot: usize, kind: Option<ItemKind>) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = kind;
    }

    /// Full-state snapshot of this inventory.
    #[must_use]
    pub fn snapshot(&self) -> InventorySnapshot {
        InventorySnapshot {
            slots: self.slots.clone(),
        }
    }

    /// Overwrite this inventory from a snapshot, capacity included.
    pub fn apply_snapshot(&mut self, snapshot: &InventorySnapshot) {
        self.slots.clone_from(&snapshot.slots);
    }
}

/// Move the item in `from[slot]` into the first free slot of `to`.
///
/// Remove-then-insert: if the destination is full the item is put back into
/// its source slot and neither inventory changes.
///
/// # Errors
/// The source-side reason, or `full_reason` when the destination has no room.
pub fn transfer(
    from: &mut Inventory,
    slot: usize,
    to: &mut Inventory,
    full_reason: RejectReason,
) -> Result<usize, RejectReason> {
    let kind = from.take(slot)?;
    match to.insert(kind) {
        Some(dest) => Ok(dest),
        None => {
            from.set(slot, Some(kind));
            Err(full_reason)
        }
    }
}
