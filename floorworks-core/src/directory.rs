use serde::{Deserialize, Serialize};

use crate::{FloorWorksError, Result};

/// First dungeon ID of the training-dojo range. Dungeons at or beyond this
/// ID have fixed floor counts and are not table-driven.
pub const DOJO_DUNGEONS_FIRST: u16 = 0xB4;
/// Last dungeon ID of the training-dojo range.
pub const DOJO_DUNGEONS_LAST: u16 = 0xBF;
/// The shared floor list all dojo dungeons draw their floors from.
pub const DOJO_MAPPA_INDEX: u8 = 0x35;
/// Highest dungeon ID that still resolves into the dojo floor list.
pub const DOJO_OUTER_LAST: u16 = 0xD3;

/// These IDs are not actual dungeons; they alias another dungeon's floor
/// data and are excluded from grouping, the tree and editing.
pub const INVALID_DUNGEON_IDS: [u16; 4] = [175, 176, 177, 178];

/// Dungeon 136 ships with `number_floors != number_floors_in_group` even
/// though it is alone in its floor table. Tolerated as-is, never rewritten.
pub const SINGLETON_EXEMPT_DUNGEON: u16 = 136;

pub(crate) const DUNGEON_ENTRY_SIZE: usize = 4;
pub(crate) const RESTRICTION_ENTRY_SIZE: usize = 8;

/// One record of the hardcoded dungeon table in the main overlay image.
///
/// Wire format (4 bytes): number_floors, mappa_index, start_after,
/// number_floors_in_group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DungeonEntry {
    /// This dungeon's own floor count.
    pub number_floors: u8,
    /// Which shared floor table this dungeon draws its floors from.
    pub mappa_index: u8,
    /// Offset into that table where this dungeon's floors begin.
    pub start_after: u8,
    /// Aggregate floor count across all dungeons sharing `mappa_index`.
    /// Equals `number_floors` for an ungrouped dungeon.
    pub number_floors_in_group: u8,
}

impl DungeonEntry {
    pub(crate) fn decode(raw: &[u8]) -> DungeonEntry {
        DungeonEntry {
            number_floors: raw[0],
            mappa_index: raw[1],
            start_after: raw[2],
            number_floors_in_group: raw[3],
        }
    }

    pub(crate) fn encode(&self) -> [u8; DUNGEON_ENTRY_SIZE] {
        [
            self.number_floors,
            self.mappa_index,
            self.start_after,
            self.number_floors_in_group,
        ]
    }
}

/// Climb direction of a dungeon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DungeonDirection {
    Down,
    Up,
}

impl DungeonDirection {
    fn from_byte(b: u8) -> DungeonDirection {
        if b == 0 {
            DungeonDirection::Down
        } else {
            DungeonDirection::Up
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            DungeonDirection::Down => 0,
            DungeonDirection::Up => 1,
        }
    }
}

/// One record of the hardcoded restriction table in the main overlay image.
///
/// Wire format (8 bytes): direction, enemies_evolve, recruiting_allowed,
/// max_party_size, max_items_allowed, max_rescue_attempts, turn_limit (u16 LE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DungeonRestriction {
    pub direction: DungeonDirection,
    pub enemies_evolve: bool,
    pub recruiting_allowed: bool,
    pub max_party_size: u8,
    pub max_items_allowed: u8,
    pub max_rescue_attempts: u8,
    /// 0 means no turn limit.
    pub turn_limit: u16,
}

impl DungeonRestriction {
    pub(crate) fn decode(raw: &[u8]) -> DungeonRestriction {
        DungeonRestriction {
            direction: DungeonDirection::from_byte(raw[0]),
            enemies_evolve: raw[1] != 0,
            recruiting_allowed: raw[2] != 0,
            max_party_size: raw[3],
            max_items_allowed: raw[4],
            max_rescue_attempts: raw[5],
            turn_limit: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    pub(crate) fn encode(&self) -> [u8; RESTRICTION_ENTRY_SIZE] {
        let [tl_lo, tl_hi] = self.turn_limit.to_le_bytes();
        [
            self.direction.to_byte(),
            self.enemies_evolve as u8,
            self.recruiting_allowed as u8,
            self.max_party_size,
            self.max_items_allowed,
            self.max_rescue_attempts,
            tl_lo,
            tl_hi,
        ]
    }
}

/// Location of one hardcoded table inside the overlay image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TableLocation {
    pub offset: usize,
    pub count: usize,
}

/// Layout descriptor for the overlay image, loaded from `layout.json`.
/// Table offsets differ between game revisions, so they are data, not code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayLayout {
    pub dungeon_table: TableLocation,
    pub restriction_table: TableLocation,
}

fn check_table_bounds(
    overlay_len: usize,
    loc: &TableLocation,
    entry_size: usize,
    resource: &'static str,
) -> Result<()> {
    let end = loc
        .offset
        .checked_add(loc.count.checked_mul(entry_size).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    if end > overlay_len {
        return Err(FloorWorksError::Format {
            resource,
            reason: format!(
                "table at {:#X} with {} entries runs past the image ({} bytes)",
                loc.offset, loc.count, overlay_len
            ),
        });
    }
    Ok(())
}

/// Read the dungeon table out of the overlay image.
pub fn read_dungeon_table(overlay: &[u8], loc: &TableLocation) -> Result<Vec<DungeonEntry>> {
    check_table_bounds(overlay.len(), loc, DUNGEON_ENTRY_SIZE, "dungeon table")?;

    let mut entries = Vec::with_capacity(loc.count);
    for i in 0..loc.count {
        let base = loc.offset + i * DUNGEON_ENTRY_SIZE;
        entries.push(DungeonEntry::decode(&overlay[base..base + DUNGEON_ENTRY_SIZE]));
    }
    Ok(entries)
}

/// Write the dungeon table back into the overlay image, in place. All bytes
/// outside the table are left untouched.
pub fn write_dungeon_table(
    overlay: &mut [u8],
    loc: &TableLocation,
    entries: &[DungeonEntry],
) -> Result<()> {
    check_table_bounds(overlay.len(), loc, DUNGEON_ENTRY_SIZE, "dungeon table")?;
    if entries.len() != loc.count {
        return Err(FloorWorksError::Format {
            resource: "dungeon table",
            reason: format!("expected {} entries, got {}", loc.count, entries.len()),
        });
    }

    for (i, entry) in entries.iter().enumerate() {
        let base = loc.offset + i * DUNGEON_ENTRY_SIZE;
        overlay[base..base + DUNGEON_ENTRY_SIZE].copy_from_slice(&entry.encode());
    }
    Ok(())
}

/// Read the restriction table out of the overlay image.
pub fn read_restriction_table(
    overlay: &[u8],
    loc: &TableLocation,
) -> Result<Vec<DungeonRestriction>> {
    check_table_bounds(overlay.len(), loc, RESTRICTION_ENTRY_SIZE, "restriction table")?;

    let mut entries = Vec::with_capacity(loc.count);
    for i in 0..loc.count {
        let base = loc.offset + i * RESTRICTION_ENTRY_SIZE;
        entries.push(DungeonRestriction::decode(
            &overlay[base..base + RESTRICTION_ENTRY_SIZE],
        ));
    }
    Ok(entries)
}

/// Write the restriction table back into the overlay image, in place.
pub fn write_restriction_table(
    overlay: &mut [u8],
    loc: &TableLocation,
    entries: &[DungeonRestriction],
) -> Result<()> {
    check_table_bounds(overlay.len(), loc, RESTRICTION_ENTRY_SIZE, "restriction table")?;
    if entries.len() != loc.count {
        return Err(FloorWorksError::Format {
            resource: "restriction table",
            reason: format!("expected {} entries, got {}", loc.count, entries.len()),
        });
    }

    for (i, entry) in entries.iter().enumerate() {
        let base = loc.offset + i * RESTRICTION_ENTRY_SIZE;
        overlay[base..base + RESTRICTION_ENTRY_SIZE].copy_from_slice(&entry.encode());
    }
    Ok(())
}

pub fn is_dojo_dungeon(dungeon_id: u16) -> bool {
    dungeon_id >= DOJO_DUNGEONS_FIRST
}

pub fn is_invalid_dungeon(dungeon_id: u16) -> bool {
    INVALID_DUNGEON_IDS.contains(&dungeon_id)
}

/// Number of floors of a dungeon. Dojo-range dungeons have fixed counts
/// that never come from the dungeon table:
///
/// - `0xB4..=0xBD`: 5 floors each
/// - `0xBE`: 1 floor
/// - `0xBF` and up (through `0xD3`): 0x30 floors
pub fn number_floors(entries: &[DungeonEntry], dungeon_id: u16) -> Result<u8> {
    if (DOJO_DUNGEONS_FIRST..=DOJO_DUNGEONS_LAST - 2).contains(&dungeon_id) {
        return Ok(5);
    }
    if dungeon_id == DOJO_DUNGEONS_LAST - 1 {
        return Ok(1);
    }
    if (DOJO_DUNGEONS_LAST..=DOJO_OUTER_LAST).contains(&dungeon_id) {
        return Ok(0x30);
    }
    let entry = entries
        .get(dungeon_id as usize)
        .ok_or(FloorWorksError::IndexOutOfRange {
            kind: "dungeon",
            index: dungeon_id as usize,
            len: entries.len(),
        })?;
    Ok(entry.number_floors)
}
