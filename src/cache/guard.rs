//! Checks run over the inventory cache before deletes and saves.
//!
//! Plain linear scans; the inventory list is small enough that no index is
//! kept.

use crate::entity::{Entity, EntityId, InventoryLine, Warehouse};

/// Number of inventory lines stocked in warehouse `id`
pub fn references_warehouse(lines: &[InventoryLine], id: EntityId) -> usize {
    lines.iter().filter(|l| l.warehouse_id() == id).count()
}

/// Number of inventory lines holding part `id`
pub fn references_part(lines: &[InventoryLine], id: EntityId) -> usize {
    lines.iter().filter(|l| l.part_id() == id).count()
}

/// Another line for the same part in the same warehouse, if one exists
pub fn duplicate_line<'a>(
    lines: &'a [InventoryLine],
    candidate: &InventoryLine,
) -> Option<&'a InventoryLine> {
    lines.iter().find(|l| {
        l.id() != candidate.id()
            && l.warehouse_id() == candidate.warehouse_id()
            && l.part_id() == candidate.part_id()
    })
}

/// Capacity left in `warehouse` once `candidate` is stored
///
/// The candidate's own previously stored quantity is not counted twice. A
/// negative result means the candidate does not fit.
pub fn remaining_capacity(
    lines: &[InventoryLine],
    warehouse: &Warehouse,
    candidate: &InventoryLine,
) -> i64 {
    let used: i64 = lines
        .iter()
        .filter(|l| l.warehouse_id() == warehouse.id() && l.id() != candidate.id())
        .map(InventoryLine::quantity)
        .sum();
    warehouse.storage_capacity() - used - candidate.quantity()
}
