use std::collections::HashMap;

use crate::directory::{
    is_dojo_dungeon, is_invalid_dungeon, DungeonEntry, SINGLETON_EXEMPT_DUNGEON,
};
use crate::{FloorWorksError, Result};

/// A set of dungeons sharing one floor table. Derived from the directory on
/// every query, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DungeonGroup {
    /// First member by ascending dungeon ID.
    pub base_dungeon_id: u16,
    /// All members, ascending.
    pub dungeon_ids: Vec<u16>,
    /// Each member's offset into the shared table, parallel to
    /// `dungeon_ids`. Offsets partition `[0, number_floors_in_group)`
    /// contiguously.
    pub start_afters: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DungeonOrGroup {
    Single(u16),
    Group(DungeonGroup),
}

/// Partition the directory into ungrouped dungeons and groups sharing a
/// floor table.
///
/// This is an explicit O(N) re-scan of the directory. Ordering contract:
/// buckets are emitted in ascending order of their first-encountered
/// dungeon ID, and members within a group are ascending. Invalid-alias IDs
/// and the dojo range are excluded.
///
/// A size-1 bucket must satisfy `number_floors == number_floors_in_group`
/// (except dungeon 136, a known violator that is tolerated as-is) and
/// `start_after == 0`; anything else is a data-integrity fault.
pub fn partition_dungeons(entries: &[DungeonEntry]) -> Result<Vec<DungeonOrGroup>> {
    let mut buckets: HashMap<u8, Vec<u16>> = HashMap::new();
    let mut first_seen: Vec<u8> = Vec::new();

    for (idx, entry) in entries.iter().enumerate() {
        let id = idx as u16;
        if is_invalid_dungeon(id) || is_dojo_dungeon(id) {
            continue;
        }
        let bucket = buckets.entry(entry.mappa_index).or_default();
        if bucket.is_empty() {
            first_seen.push(entry.mappa_index);
        }
        bucket.push(id);
    }

    let mut out = Vec::with_capacity(first_seen.len());
    for mappa_index in first_seen {
        let ids = &buckets[&mappa_index];
        if ids.len() < 2 {
            let id = ids[0];
            let entry = &entries[id as usize];
            if id != SINGLETON_EXEMPT_DUNGEON
                && entry.number_floors != entry.number_floors_in_group
            {
                return Err(FloorWorksError::InconsistentSingletonGroup { dungeon_id: id });
            }
            if entry.start_after != 0 {
                return Err(FloorWorksError::InconsistentSingletonGroup { dungeon_id: id });
            }
            out.push(DungeonOrGroup::Single(id));
        } else {
            out.push(DungeonOrGroup::Group(DungeonGroup {
                base_dungeon_id: ids[0],
                dungeon_ids: ids.clone(),
                start_afters: ids
                    .iter()
                    .map(|&id| entries[id as usize].start_after)
                    .collect(),
            }));
        }
    }

    Ok(out)
}

/// Group membership of one dungeon: `None` if it owns its floor table
/// alone, `Some` with the full group otherwise.
pub fn group_for(entries: &[DungeonEntry], dungeon_id: u16) -> Result<Option<DungeonGroup>> {
    for dungeon_or_group in partition_dungeons(entries)? {
        match dungeon_or_group {
            DungeonOrGroup::Single(id) if id == dungeon_id => return Ok(None),
            DungeonOrGroup::Group(group) if group.dungeon_ids.contains(&dungeon_id) => {
                return Ok(Some(group));
            }
            _ => {}
        }
    }
    Ok(None)
}
