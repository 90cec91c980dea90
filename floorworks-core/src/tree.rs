use crate::directory::{
    number_floors, DungeonEntry, DOJO_DUNGEONS_FIRST, DOJO_DUNGEONS_LAST, DOJO_MAPPA_INDEX,
    DOJO_OUTER_LAST,
};
use crate::groups::{partition_dungeons, DungeonOrGroup};
use crate::{FloorWorksError, Result};

/// Resolve a dungeon-local floor number to its floor table and global
/// position in that table.
///
/// Dojo-range dungeons all share the dojo floor list with computed
/// offsets; everything else resolves through the dungeon table.
pub fn floor_table_position(
    entries: &[DungeonEntry],
    dungeon_id: u16,
    floor_id: u8,
) -> Result<(u8, usize)> {
    let count = number_floors(entries, dungeon_id)?;
    if floor_id >= count {
        return Err(FloorWorksError::IndexOutOfRange {
            kind: "floor",
            index: floor_id as usize,
            len: count as usize,
        });
    }

    if (DOJO_DUNGEONS_FIRST..=DOJO_DUNGEONS_LAST - 2).contains(&dungeon_id) {
        let base = (dungeon_id - DOJO_DUNGEONS_FIRST) as usize * 5;
        return Ok((DOJO_MAPPA_INDEX, base + floor_id as usize));
    }
    if dungeon_id == DOJO_DUNGEONS_LAST - 1 {
        return Ok((DOJO_MAPPA_INDEX, 0x32 + floor_id as usize));
    }
    if (DOJO_DUNGEONS_LAST..=DOJO_OUTER_LAST).contains(&dungeon_id) {
        return Ok((DOJO_MAPPA_INDEX, 0x33 + floor_id as usize));
    }

    let entry = &entries[dungeon_id as usize];
    Ok((
        entry.mappa_index,
        entry.start_after as usize + floor_id as usize,
    ))
}

/// The cached mapping from a dungeon's local floor numbers to global floor
/// table positions. Regenerated on demand; stale after any resize that
/// touched the dungeon or shifted its offset.
pub fn build_floor_index(entries: &[DungeonEntry], dungeon_id: u16) -> Result<Vec<usize>> {
    let count = number_floors(entries, dungeon_id)?;
    let mut index = Vec::with_capacity(count as usize);
    for floor_id in 0..count {
        let (_, position) = floor_table_position(entries, dungeon_id, floor_id)?;
        index.push(position);
    }
    Ok(index)
}

/// One dungeon in the projection, with its floors resolved to table
/// positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DungeonNode {
    pub dungeon_id: u16,
    pub floors: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    Dungeon(DungeonNode),
    Group {
        base_dungeon_id: u16,
        members: Vec<DungeonNode>,
    },
}

/// A pure projection of the whole editable surface: regular dungeons and
/// groups, the dojo section, and the fixed-room bank. Rows carry IDs and
/// positions only; it is rebuilt from the model on demand and holds no
/// presentation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeProjection {
    pub dungeons: Vec<TreeEntry>,
    pub dojos: Vec<DungeonNode>,
    pub fixed_room_count: usize,
}

fn dungeon_node(entries: &[DungeonEntry], dungeon_id: u16) -> Result<DungeonNode> {
    Ok(DungeonNode {
        dungeon_id,
        floors: build_floor_index(entries, dungeon_id)?,
    })
}

/// Build the projection. Invalid-alias dungeons are left out entirely.
pub fn project_tree(entries: &[DungeonEntry], fixed_room_count: usize) -> Result<TreeProjection> {
    let mut dungeons = Vec::new();
    for part in partition_dungeons(entries)? {
        match part {
            DungeonOrGroup::Single(id) => {
                dungeons.push(TreeEntry::Dungeon(dungeon_node(entries, id)?));
            }
            DungeonOrGroup::Group(group) => {
                let mut members = Vec::with_capacity(group.dungeon_ids.len());
                for &id in &group.dungeon_ids {
                    members.push(dungeon_node(entries, id)?);
                }
                dungeons.push(TreeEntry::Group {
                    base_dungeon_id: group.base_dungeon_id,
                    members,
                });
            }
        }
    }

    let mut dojos = Vec::with_capacity((DOJO_DUNGEONS_LAST - DOJO_DUNGEONS_FIRST + 1) as usize);
    for id in DOJO_DUNGEONS_FIRST..=DOJO_DUNGEONS_LAST {
        dojos.push(dungeon_node(entries, id)?);
    }

    Ok(TreeProjection {
        dungeons,
        dojos,
        fixed_room_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(number_floors: u8, mappa_index: u8, start_after: u8, in_group: u8) -> DungeonEntry {
        DungeonEntry {
            number_floors,
            mappa_index,
            start_after,
            number_floors_in_group: in_group,
        }
    }

    #[test]
    fn regular_dungeon_resolves_through_the_table() {
        let entries = vec![
            entry(3, 1, 0, 5),
            entry(2, 1, 3, 5),
        ];
        assert_eq!(floor_table_position(&entries, 0, 2).unwrap(), (1, 2));
        assert_eq!(floor_table_position(&entries, 1, 0).unwrap(), (1, 3));
        assert_eq!(floor_table_position(&entries, 1, 1).unwrap(), (1, 4));
        assert!(matches!(
            floor_table_position(&entries, 1, 2),
            Err(FloorWorksError::IndexOutOfRange { kind: "floor", .. })
        ));
    }

    #[test]
    fn dojo_dungeons_resolve_into_the_dojo_list() {
        let entries = vec![];
        // Third dojo, floor 4: 2 * 5 + 4 = 14.
        assert_eq!(
            floor_table_position(&entries, 0xB6, 4).unwrap(),
            (DOJO_MAPPA_INDEX, 14)
        );
        // 0xBE has exactly one floor, parked at 0x32.
        assert_eq!(
            floor_table_position(&entries, 0xBE, 0).unwrap(),
            (DOJO_MAPPA_INDEX, 0x32)
        );
        assert!(floor_table_position(&entries, 0xBE, 1).is_err());
        // 0xBF and everything after it up to 0xD3 starts at 0x33.
        assert_eq!(
            floor_table_position(&entries, 0xBF, 2).unwrap(),
            (DOJO_MAPPA_INDEX, 0x35)
        );
    }

    #[test]
    fn floor_index_lists_every_local_floor() {
        let entries = vec![
            entry(3, 1, 0, 5),
            entry(2, 1, 3, 5),
        ];
        assert_eq!(build_floor_index(&entries, 0).unwrap(), vec![0, 1, 2]);
        assert_eq!(build_floor_index(&entries, 1).unwrap(), vec![3, 4]);
    }

    #[test]
    fn projection_lists_groups_dojos_and_fixed_rooms() {
        let mut entries: Vec<DungeonEntry> = (0..4)
            .map(|i| entry(1, 100 + i as u8, 0, 1))
            .collect();
        entries[1] = entry(3, 1, 0, 5);
        entries[3] = entry(2, 1, 3, 5);

        let tree = project_tree(&entries, 7).unwrap();
        assert_eq!(tree.fixed_room_count, 7);
        assert_eq!(tree.dojos.len(), 12);
        assert_eq!(tree.dojos[0].floors.len(), 5);
        assert_eq!(tree.dojos[11].floors.len(), 0x30);

        assert_eq!(tree.dungeons.len(), 3);
        match &tree.dungeons[1] {
            TreeEntry::Group {
                base_dungeon_id,
                members,
            } => {
                assert_eq!(*base_dungeon_id, 1);
                assert_eq!(members.len(), 2);
                assert_eq!(members[0].floors, vec![0, 1, 2]);
                assert_eq!(members[1].floors, vec![3, 4]);
            }
            other => panic!("expected a group, got {:?}", other),
        }
    }
}
