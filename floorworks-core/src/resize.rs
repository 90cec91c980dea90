use crate::directory::{is_dojo_dungeon, is_invalid_dungeon, DungeonEntry};
use crate::floors::{renumber_floors, FloorRecord};
use crate::groups::group_for;
use crate::{FloorWorksError, Result};

/// What a floor-count change did, for the caller's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeOutcome {
    /// `new_count - old_count`. 0 means the call was a no-op.
    pub delta: i32,
    /// Dungeons whose cached floor index is now stale: the resized dungeon
    /// and every group sibling whose `start_after` shifted.
    pub rebuild_floor_index: Vec<u16>,
}

/// Change a dungeon's floor count, keeping the shared floor table, the
/// dungeon's directory entry and all group siblings consistent.
///
/// `floor_list` must be the table selected by the dungeon's `mappa_index`.
///
/// Shrinking deletes from the tail of this dungeon's own span; growing
/// clones the dungeon's last existing floor, so new floors start with that
/// floor's layout rather than a blank one. Afterwards every record in the
/// table is renumbered to its 1-based position.
///
/// All preconditions are checked before the first mutation: on error the
/// directory and the floor table are untouched.
pub fn change_floor_count(
    entries: &mut [DungeonEntry],
    floor_list: &mut Vec<FloorRecord>,
    dungeon_id: u16,
    number_floors_new: u8,
) -> Result<ResizeOutcome> {
    if is_dojo_dungeon(dungeon_id) || is_invalid_dungeon(dungeon_id) {
        return Err(FloorWorksError::UnsupportedDungeonKind { dungeon_id });
    }
    if dungeon_id as usize >= entries.len() {
        return Err(FloorWorksError::IndexOutOfRange {
            kind: "dungeon",
            index: dungeon_id as usize,
            len: entries.len(),
        });
    }

    let group = group_for(entries, dungeon_id)?;

    let floor_offset = entries[dungeon_id as usize].start_after as usize;
    let number_floors_old = entries[dungeon_id as usize].number_floors;
    let floors_added = number_floors_new as i32 - number_floors_old as i32;

    if floors_added == 0 {
        return Ok(ResizeOutcome {
            delta: 0,
            rebuild_floor_index: Vec::new(),
        });
    }

    let old_span_end = floor_offset + number_floors_old as usize;
    if old_span_end > floor_list.len() {
        return Err(FloorWorksError::IndexOutOfRange {
            kind: "floor",
            index: old_span_end,
            len: floor_list.len(),
        });
    }
    if floors_added > 0 && number_floors_old == 0 {
        // No floor left to use as the template for the new ones.
        return Err(FloorWorksError::IndexOutOfRange {
            kind: "floor",
            index: floor_offset,
            len: floor_list.len(),
        });
    }
    if let Some(group) = &group {
        let old_total = entries[dungeon_id as usize].number_floors_in_group as i32;
        if old_total + floors_added > u8::MAX as i32 {
            return Err(FloorWorksError::Format {
                resource: "dungeon table",
                reason: format!(
                    "group of dungeon {} would total {} floors, over the limit of 255",
                    group.base_dungeon_id,
                    old_total + floors_added
                ),
            });
        }
    }

    // Update the floor table.
    if floors_added < 0 {
        let delete_from = floor_offset + number_floors_new as usize;
        floor_list.drain(delete_from..old_span_end);
    } else {
        let template = floor_list[old_span_end - 1].clone();
        for i in 0..floors_added as usize {
            floor_list.insert(old_span_end + i, template.clone());
        }
    }

    // Update the dungeon's entry and propagate through its group.
    let mut rebuild = vec![dungeon_id];
    entries[dungeon_id as usize].number_floors = number_floors_new;
    if let Some(group) = &group {
        let new_total_floor_count: i32 = group
            .dungeon_ids
            .iter()
            .map(|&id| entries[id as usize].number_floors as i32)
            .sum();
        entries[dungeon_id as usize].number_floors_in_group = new_total_floor_count as u8;

        for &sibling in group.dungeon_ids.iter().filter(|&&id| id != dungeon_id) {
            if entries[sibling as usize].start_after as usize > floor_offset {
                let shifted = entries[sibling as usize].start_after as i32 + floors_added;
                entries[sibling as usize].start_after = shifted as u8;
                rebuild.push(sibling);
            }
            entries[sibling as usize].number_floors_in_group = new_total_floor_count as u8;
        }
    } else {
        entries[dungeon_id as usize].number_floors_in_group = number_floors_new;
    }

    renumber_floors(floor_list);

    Ok(ResizeOutcome {
        delta: floors_added,
        rebuild_floor_index: rebuild,
    })
}
