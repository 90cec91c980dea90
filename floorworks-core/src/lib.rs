use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::{debug, info};
use thiserror::Error;

pub mod directory;
pub mod fixed;
pub mod floors;
pub mod groups;
pub mod resize;
pub mod tree;

pub use directory::{
    DungeonDirection, DungeonEntry, DungeonRestriction, OverlayLayout, TableLocation,
};
pub use fixed::FixedRoom;
pub use floors::FloorRecord;
pub use groups::{partition_dungeons, DungeonGroup, DungeonOrGroup};
pub use resize::ResizeOutcome;
pub use tree::{DungeonNode, TreeEntry, TreeProjection};

#[derive(Debug, Error)]
pub enum FloorWorksError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{resource}: {reason}")]
    Format {
        resource: &'static str,
        reason: String,
    },

    #[error("{kind} index {index} is out of range (0..{len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("dungeon {dungeon_id} does not use table-driven floors and cannot be edited")]
    UnsupportedDungeonKind { dungeon_id: u16 },

    #[error("dungeon {dungeon_id} is alone in its floor table but carries group data")]
    InconsistentSingletonGroup { dungeon_id: u16 },
}

pub type Result<T> = std::result::Result<T, FloorWorksError>;

const LAYOUT_CANDIDATES: &[&str] = &["layout.json", "LAYOUT.JSON"];
const OVERLAY_CANDIDATES: &[&str] = &["bin/main_overlay.bin", "BIN/MAIN_OVERLAY.BIN"];
const FLOOR_BANK_CANDIDATES: &[&str] = &["data/floor_tables.bin", "DATA/FLOOR_TABLES.BIN"];
const FIXED_BANK_CANDIDATES: &[&str] = &["data/fixed_rooms.bin", "DATA/FIXED_ROOMS.BIN"];

fn join_candidate(base: &Path, candidate: &str) -> PathBuf {
    let mut path = base.to_path_buf();
    for part in candidate.split(['/', '\\']) {
        if !part.is_empty() {
            path.push(part);
        }
    }
    path
}

fn find_first_existing(base: &Path, candidates: &[&str]) -> Option<PathBuf> {
    for candidate in candidates {
        let path = join_candidate(base, candidate);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

fn locate(base: &Path, candidates: &[&str], resource: &'static str) -> Result<PathBuf> {
    find_first_existing(base, candidates).ok_or_else(|| FloorWorksError::Format {
        resource,
        reason: format!(
            "no candidate found under {:?} (tried {})",
            base,
            candidates.join(", ")
        ),
    })
}

/// An opened extracted-ROM directory: the overlay image with its hardcoded
/// tables, the floor bank and the fixed-room bank, all loaded fully into
/// memory. Edits mutate the in-memory model and mark the owning resource
/// as modified; `save` rewrites exactly the modified resources.
pub struct Project {
    overlay_path: PathBuf,
    floor_bank_path: PathBuf,
    fixed_bank_path: PathBuf,
    layout: OverlayLayout,
    overlay: Vec<u8>,
    dungeons: Vec<DungeonEntry>,
    restrictions: Vec<DungeonRestriction>,
    // One lock per floor table: resize and regroup operations assume a
    // single in-flight edit, and the lock makes that a contract instead of
    // a convention.
    floor_lists: Vec<Mutex<Vec<FloorRecord>>>,
    fixed_rooms: Vec<FixedRoom>,
    floor_index: HashMap<u16, Vec<usize>>,
    overlay_dirty: bool,
    floor_bank_dirty: bool,
    fixed_bank_dirty: bool,
}

impl Project {
    /// Open an extracted-ROM directory. The layout descriptor tells the
    /// codec where the hardcoded tables sit inside the overlay image.
    pub fn open(root: impl AsRef<Path>) -> Result<Project> {
        let root = root.as_ref();

        let layout_path = locate(root, LAYOUT_CANDIDATES, "layout descriptor")?;
        let layout: OverlayLayout = serde_json::from_str(&fs::read_to_string(&layout_path)?)?;

        let overlay_path = locate(root, OVERLAY_CANDIDATES, "overlay image")?;
        let overlay = fs::read(&overlay_path)?;
        let dungeons = directory::read_dungeon_table(&overlay, &layout.dungeon_table)?;
        let restrictions = directory::read_restriction_table(&overlay, &layout.restriction_table)?;

        let floor_bank_path = locate(root, FLOOR_BANK_CANDIDATES, "floor bank")?;
        let floor_lists = floors::parse_floor_bank(&fs::read(&floor_bank_path)?)?;

        let fixed_bank_path = locate(root, FIXED_BANK_CANDIDATES, "fixed-room bank")?;
        let fixed_rooms = fixed::parse_fixed_bank(&fs::read(&fixed_bank_path)?)?;

        info!(
            "opened project at {:?}: {} dungeons, {} floor tables, {} fixed rooms",
            root,
            dungeons.len(),
            floor_lists.len(),
            fixed_rooms.len()
        );

        Ok(Project {
            overlay_path,
            floor_bank_path,
            fixed_bank_path,
            layout,
            overlay,
            dungeons,
            restrictions,
            floor_lists: floor_lists.into_iter().map(Mutex::new).collect(),
            fixed_rooms,
            floor_index: HashMap::new(),
            overlay_dirty: false,
            floor_bank_dirty: false,
            fixed_bank_dirty: false,
        })
    }

    /// Rewrite every resource that was modified since open (or the last
    /// save), then clear the modified flags.
    pub fn save(&mut self) -> Result<()> {
        if self.overlay_dirty {
            directory::write_dungeon_table(
                &mut self.overlay,
                &self.layout.dungeon_table,
                &self.dungeons,
            )?;
            directory::write_restriction_table(
                &mut self.overlay,
                &self.layout.restriction_table,
                &self.restrictions,
            )?;
            fs::write(&self.overlay_path, &self.overlay)?;
            info!("saved overlay image to {:?}", self.overlay_path);
            self.overlay_dirty = false;
        }

        if self.floor_bank_dirty {
            let lists: Vec<Vec<FloorRecord>> = self
                .floor_lists
                .iter()
                .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner).clone())
                .collect();
            fs::write(&self.floor_bank_path, floors::build_floor_bank(&lists)?)?;
            info!("saved floor bank to {:?}", self.floor_bank_path);
            self.floor_bank_dirty = false;
        }

        if self.fixed_bank_dirty {
            fs::write(&self.fixed_bank_path, fixed::build_fixed_bank(&self.fixed_rooms)?)?;
            info!("saved fixed-room bank to {:?}", self.fixed_bank_path);
            self.fixed_bank_dirty = false;
        }

        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.overlay_dirty || self.floor_bank_dirty || self.fixed_bank_dirty
    }

    pub fn dungeons(&self) -> &[DungeonEntry] {
        &self.dungeons
    }

    pub fn number_floors(&self, dungeon_id: u16) -> Result<u8> {
        directory::number_floors(&self.dungeons, dungeon_id)
    }

    /// Build the regenerate-on-demand projection of the whole editable
    /// surface.
    pub fn tree(&self) -> Result<TreeProjection> {
        tree::project_tree(&self.dungeons, self.fixed_rooms.len())
    }

    fn floor_list(&self, mappa_index: u8) -> Result<&Mutex<Vec<FloorRecord>>> {
        self.floor_lists
            .get(mappa_index as usize)
            .ok_or(FloorWorksError::IndexOutOfRange {
                kind: "floor table",
                index: mappa_index as usize,
                len: self.floor_lists.len(),
            })
    }

    /// Change a dungeon's floor count. Marks the floor bank and the
    /// overlay as modified and rebuilds the floor index of every affected
    /// dungeon. A call that changes nothing marks nothing.
    pub fn change_floor_count(&mut self, dungeon_id: u16, new_count: u8) -> Result<ResizeOutcome> {
        if directory::is_dojo_dungeon(dungeon_id) || directory::is_invalid_dungeon(dungeon_id) {
            return Err(FloorWorksError::UnsupportedDungeonKind { dungeon_id });
        }
        let entry = *self
            .dungeons
            .get(dungeon_id as usize)
            .ok_or(FloorWorksError::IndexOutOfRange {
                kind: "dungeon",
                index: dungeon_id as usize,
                len: self.dungeons.len(),
            })?;

        let outcome = {
            let list_mutex = self
                .floor_lists
                .get(entry.mappa_index as usize)
                .ok_or(FloorWorksError::IndexOutOfRange {
                    kind: "floor table",
                    index: entry.mappa_index as usize,
                    len: self.floor_lists.len(),
                })?;
            let mut list = list_mutex.lock().unwrap_or_else(PoisonError::into_inner);
            resize::change_floor_count(&mut self.dungeons, &mut list, dungeon_id, new_count)?
        };

        if outcome.delta != 0 {
            self.overlay_dirty = true;
            self.floor_bank_dirty = true;
            for &affected in &outcome.rebuild_floor_index {
                let index = tree::build_floor_index(&self.dungeons, affected)?;
                self.floor_index.insert(affected, index);
            }
            info!(
                "dungeon {}: floor count {} -> {} (delta {:+}), {} floor index(es) rebuilt",
                dungeon_id,
                entry.number_floors,
                new_count,
                outcome.delta,
                outcome.rebuild_floor_index.len()
            );
        } else {
            debug!("dungeon {}: floor count already {}", dungeon_id, new_count);
        }

        Ok(outcome)
    }

    /// The cached mapping from this dungeon's local floor numbers to global
    /// floor table positions.
    pub fn floor_index(&mut self, dungeon_id: u16) -> Result<&[usize]> {
        if !self.floor_index.contains_key(&dungeon_id) {
            let index = tree::build_floor_index(&self.dungeons, dungeon_id)?;
            self.floor_index.insert(dungeon_id, index);
        }
        Ok(&self.floor_index[&dungeon_id])
    }

    /// A copy of one floor record, addressed by dungeon and local floor
    /// number.
    pub fn floor(&self, dungeon_id: u16, floor_id: u8) -> Result<FloorRecord> {
        let (mappa_index, position) =
            tree::floor_table_position(&self.dungeons, dungeon_id, floor_id)?;
        let list = self
            .floor_list(mappa_index)?
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        list.get(position)
            .cloned()
            .ok_or(FloorWorksError::IndexOutOfRange {
                kind: "floor",
                index: position,
                len: list.len(),
            })
    }

    pub fn export_floor_json(&self, dungeon_id: u16, floor_id: u8) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.floor(dungeon_id, floor_id)?)?)
    }

    /// Import one floor record, in JSON form, into every (dungeon, floor)
    /// target. The target's `floor_number` is positional identity and is
    /// kept, not imported.
    pub fn import_floor_json(&mut self, targets: &[(u16, u8)], json: &str) -> Result<()> {
        let imported: FloorRecord = serde_json::from_str(json)?;

        for &(dungeon_id, floor_id) in targets {
            let (mappa_index, position) =
                tree::floor_table_position(&self.dungeons, dungeon_id, floor_id)?;
            {
                let mut list = self
                    .floor_list(mappa_index)?
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let len = list.len();
                let slot = list
                    .get_mut(position)
                    .ok_or(FloorWorksError::IndexOutOfRange {
                        kind: "floor",
                        index: position,
                        len,
                    })?;

                let floor_number = slot.floor_number;
                *slot = imported.clone();
                slot.floor_number = floor_number;
            }
            self.floor_bank_dirty = true;
        }

        if !targets.is_empty() {
            info!("imported floor layout into {} target(s)", targets.len());
        }
        Ok(())
    }

    pub fn restriction(&self, dungeon_id: u16) -> Result<DungeonRestriction> {
        self.restrictions
            .get(dungeon_id as usize)
            .copied()
            .ok_or(FloorWorksError::IndexOutOfRange {
                kind: "dungeon",
                index: dungeon_id as usize,
                len: self.restrictions.len(),
            })
    }

    pub fn update_restriction(
        &mut self,
        dungeon_id: u16,
        restriction: DungeonRestriction,
    ) -> Result<()> {
        let len = self.restrictions.len();
        let slot = self
            .restrictions
            .get_mut(dungeon_id as usize)
            .ok_or(FloorWorksError::IndexOutOfRange {
                kind: "dungeon",
                index: dungeon_id as usize,
                len,
            })?;
        *slot = restriction;
        self.overlay_dirty = true;
        debug!("updated restrictions for dungeon {}", dungeon_id);
        Ok(())
    }

    pub fn fixed_room(&self, room_id: u16) -> Result<&FixedRoom> {
        self.fixed_rooms
            .get(room_id as usize)
            .ok_or(FloorWorksError::IndexOutOfRange {
                kind: "fixed room",
                index: room_id as usize,
                len: self.fixed_rooms.len(),
            })
    }

    pub fn fixed_room_count(&self) -> usize {
        self.fixed_rooms.len()
    }

    /// Default tileset for rendering a fixed room outside any dungeon.
    pub fn default_tileset_for_fixed_room(&self, room_id: u16) -> u8 {
        for list_mutex in &self.floor_lists {
            let list = list_mutex.lock().unwrap_or_else(PoisonError::into_inner);
            for floor in list.iter() {
                if floor.fixed_room_id == room_id {
                    return floor.tileset_id;
                }
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Write a small but complete extracted-ROM directory: ten dungeons,
    /// dungeons 5 and 7 grouped in floor table 5 (3 + 2 floors), every
    /// other dungeon alone with a single floor.
    fn write_fixture(root: &Path) {
        let layout = OverlayLayout {
            dungeon_table: TableLocation {
                offset: 0x20,
                count: 10,
            },
            restriction_table: TableLocation {
                offset: 0x60,
                count: 10,
            },
        };
        fs::write(
            root.join("layout.json"),
            serde_json::to_string(&layout).unwrap(),
        )
        .unwrap();

        let mut dungeons: Vec<DungeonEntry> = (0..10)
            .map(|i| DungeonEntry {
                number_floors: 1,
                mappa_index: i as u8,
                start_after: 0,
                number_floors_in_group: 1,
            })
            .collect();
        dungeons[5] = DungeonEntry {
            number_floors: 3,
            mappa_index: 5,
            start_after: 0,
            number_floors_in_group: 5,
        };
        dungeons[7] = DungeonEntry {
            number_floors: 2,
            mappa_index: 5,
            start_after: 3,
            number_floors_in_group: 5,
        };

        let restrictions: Vec<DungeonRestriction> = (0..10)
            .map(|i| DungeonRestriction {
                direction: DungeonDirection::Down,
                enemies_evolve: false,
                recruiting_allowed: true,
                max_party_size: 4,
                max_items_allowed: 48,
                max_rescue_attempts: i as u8,
                turn_limit: 0,
            })
            .collect();

        let mut overlay = vec![0u8; 0x100];
        directory::write_dungeon_table(&mut overlay, &layout.dungeon_table, &dungeons).unwrap();
        directory::write_restriction_table(&mut overlay, &layout.restriction_table, &restrictions)
            .unwrap();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/main_overlay.bin"), &overlay).unwrap();

        let lists: Vec<Vec<FloorRecord>> = (0..10)
            .map(|i| {
                let count = match i {
                    5 => 5,
                    7 => 0,
                    _ => 1,
                };
                (0..count)
                    .map(|f| FloorRecord {
                        floor_number: (f + 1) as u8,
                        tileset_id: if i == 2 { 4 } else { f as u8 },
                        music_id: i as u8,
                        weather: 0,
                        room_density: 6,
                        item_density: 4,
                        enemy_density: 8,
                        trap_density: 2,
                        fixed_room_id: if i == 2 { 1 } else { 0 },
                        floor_connectivity: 15,
                        kecleon_shop_chance: 10,
                        monster_house_chance: 5,
                    })
                    .collect()
            })
            .collect();
        fs::create_dir_all(root.join("data")).unwrap();
        fs::write(
            root.join("data/floor_tables.bin"),
            floors::build_floor_bank(&lists).unwrap(),
        )
        .unwrap();

        let rooms = vec![
            FixedRoom {
                width: 2,
                height: 2,
                tiles: vec![0; 4],
            },
            FixedRoom {
                width: 3,
                height: 2,
                tiles: vec![1; 6],
            },
        ];
        fs::write(
            root.join("data/fixed_rooms.bin"),
            fixed::build_fixed_bank(&rooms).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn open_resize_save_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let mut project = Project::open(dir.path()).unwrap();
        assert!(!project.is_dirty());

        let outcome = project.change_floor_count(5, 5).unwrap();
        assert_eq!(outcome.delta, 2);
        assert!(project.is_dirty());
        project.save().unwrap();
        assert!(!project.is_dirty());

        let reopened = Project::open(dir.path()).unwrap();
        assert_eq!(reopened.dungeons()[5].number_floors, 5);
        assert_eq!(reopened.dungeons()[5].number_floors_in_group, 7);
        assert_eq!(reopened.dungeons()[7].start_after, 5);
        assert_eq!(reopened.dungeons()[7].number_floors_in_group, 7);
        assert_eq!(reopened.floor(7, 0).unwrap().floor_number, 6);
    }

    #[test]
    fn noop_resize_marks_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let mut project = Project::open(dir.path()).unwrap();
        let outcome = project.change_floor_count(5, 3).unwrap();
        assert_eq!(outcome.delta, 0);
        assert!(!project.is_dirty());
    }

    #[test]
    fn dojo_resize_fails_and_leaves_the_project_clean() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let mut project = Project::open(dir.path()).unwrap();
        assert!(matches!(
            project.change_floor_count(0xB4, 9),
            Err(FloorWorksError::UnsupportedDungeonKind { dungeon_id: 0xB4 })
        ));
        assert!(!project.is_dirty());
    }

    #[test]
    fn floor_index_follows_a_resize() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let mut project = Project::open(dir.path()).unwrap();
        assert_eq!(project.floor_index(7).unwrap(), &[3, 4]);

        project.change_floor_count(5, 5).unwrap();
        assert_eq!(project.floor_index(7).unwrap(), &[5, 6]);
    }

    #[test]
    fn floor_json_round_trips_and_keeps_positional_number() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let mut project = Project::open(dir.path()).unwrap();
        let json = project.export_floor_json(5, 2).unwrap();

        project.import_floor_json(&[(7, 1)], &json).unwrap();
        assert!(project.is_dirty());

        let imported = project.floor(7, 1).unwrap();
        let source = project.floor(5, 2).unwrap();
        assert_eq!(imported.tileset_id, source.tileset_id);
        // Position 4 of table 5 keeps its own number.
        assert_eq!(imported.floor_number, 5);
    }

    #[test]
    fn restriction_updates_persist() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let mut project = Project::open(dir.path()).unwrap();
        let mut r = project.restriction(3).unwrap();
        r.turn_limit = 1000;
        r.direction = DungeonDirection::Up;
        project.update_restriction(3, r).unwrap();
        project.save().unwrap();

        let reopened = Project::open(dir.path()).unwrap();
        assert_eq!(reopened.restriction(3).unwrap(), r);
        // Untouched entries survive the overlay rewrite.
        assert_eq!(reopened.restriction(4).unwrap().max_rescue_attempts, 4);
    }

    #[test]
    fn fixed_rooms_load_with_default_tilesets() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let project = Project::open(dir.path()).unwrap();
        assert_eq!(project.fixed_room_count(), 2);
        assert_eq!(project.fixed_room(1).unwrap().width, 3);
        // Table 2's only floor references room 1 with tileset 4.
        assert_eq!(project.default_tileset_for_fixed_room(1), 4);
        assert_eq!(project.default_tileset_for_fixed_room(99), 0);
    }
}
