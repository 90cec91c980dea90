use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};

use crate::{FloorWorksError, Result};

pub(crate) const FLOOR_RECORD_SIZE: usize = 16;

/// One floor of a shared floor table.
///
/// Identity is positional: `floor_number` is the record's 1-based position
/// in its table and is recomputed after every structural change.
///
/// Wire format (16 bytes, little-endian):
///
/// ```text
/// 0x00  floor_number          u8
/// 0x01  tileset_id            u8
/// 0x02  music_id              u8
/// 0x03  weather               u8
/// 0x04  room_density          u8
/// 0x05  item_density          u8
/// 0x06  enemy_density         u8
/// 0x07  trap_density          u8
/// 0x08  fixed_room_id         u16   0 = generated floor
/// 0x0A  floor_connectivity    u16
/// 0x0C  kecleon_shop_chance   u8
/// 0x0D  monster_house_chance  u8
/// 0x0E  (reserved)            u16
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorRecord {
    pub floor_number: u8,
    pub tileset_id: u8,
    pub music_id: u8,
    pub weather: u8,
    pub room_density: u8,
    pub item_density: u8,
    pub enemy_density: u8,
    pub trap_density: u8,
    pub fixed_room_id: u16,
    pub floor_connectivity: u16,
    pub kecleon_shop_chance: u8,
    pub monster_house_chance: u8,
}

impl FloorRecord {
    pub(crate) fn decode(raw: &[u8]) -> FloorRecord {
        FloorRecord {
            floor_number: raw[0],
            tileset_id: raw[1],
            music_id: raw[2],
            weather: raw[3],
            room_density: raw[4],
            item_density: raw[5],
            enemy_density: raw[6],
            trap_density: raw[7],
            fixed_room_id: u16::from_le_bytes([raw[8], raw[9]]),
            floor_connectivity: u16::from_le_bytes([raw[10], raw[11]]),
            kecleon_shop_chance: raw[12],
            monster_house_chance: raw[13],
        }
    }

    pub(crate) fn encode(&self) -> [u8; FLOOR_RECORD_SIZE] {
        let [fr_lo, fr_hi] = self.fixed_room_id.to_le_bytes();
        let [fc_lo, fc_hi] = self.floor_connectivity.to_le_bytes();
        [
            self.floor_number,
            self.tileset_id,
            self.music_id,
            self.weather,
            self.room_density,
            self.item_density,
            self.enemy_density,
            self.trap_density,
            fr_lo,
            fr_hi,
            fc_lo,
            fc_hi,
            self.kecleon_shop_chance,
            self.monster_house_chance,
            0,
            0,
        ]
    }
}

/// Renumber every record to its 1-based position. Table-wide invariant:
/// numbering is global to the table, not per dungeon span, because the
/// table is shared across a whole group.
pub fn renumber_floors(list: &mut [FloorRecord]) {
    for (i, floor) in list.iter_mut().enumerate() {
        floor.floor_number = (i + 1) as u8;
    }
}

/// Parse the floor bank file: a gzip-compressed container of all shared
/// floor tables.
///
/// Decompressed payload layout:
///
/// - u32 LE: list count
/// - u32 LE per list: payload-relative offset of the list
/// - each list: u16 LE record count, then packed 16-byte floor records
pub fn parse_floor_bank(raw: &[u8]) -> Result<Vec<Vec<FloorRecord>>> {
    let mut decoder = GzDecoder::new(raw);
    let mut payload = Vec::new();
    decoder.read_to_end(&mut payload)?;

    if payload.len() < 4 {
        return Err(FloorWorksError::Format {
            resource: "floor bank",
            reason: "payload too small to contain a list count".to_string(),
        });
    }

    let list_count =
        u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let header_end = 4 + list_count * 4;
    if header_end > payload.len() {
        return Err(FloorWorksError::Format {
            resource: "floor bank",
            reason: format!("offset table for {} lists is truncated", list_count),
        });
    }

    let mut lists = Vec::with_capacity(list_count);
    for i in 0..list_count {
        let base = 4 + i * 4;
        let off = u32::from_le_bytes([
            payload[base],
            payload[base + 1],
            payload[base + 2],
            payload[base + 3],
        ]) as usize;

        if off + 2 > payload.len() {
            return Err(FloorWorksError::Format {
                resource: "floor bank",
                reason: format!("list {} offset {:#X} is outside the payload", i, off),
            });
        }

        let record_count = u16::from_le_bytes([payload[off], payload[off + 1]]) as usize;
        let records_end = off + 2 + record_count * FLOOR_RECORD_SIZE;
        if records_end > payload.len() {
            return Err(FloorWorksError::Format {
                resource: "floor bank",
                reason: format!("list {} with {} records is truncated", i, record_count),
            });
        }

        let mut records = Vec::with_capacity(record_count);
        for r in 0..record_count {
            let rec_base = off + 2 + r * FLOOR_RECORD_SIZE;
            records.push(FloorRecord::decode(
                &payload[rec_base..rec_base + FLOOR_RECORD_SIZE],
            ));
        }
        lists.push(records);
    }

    Ok(lists)
}

/// Serialize the floor bank back to its compressed wire form. Offsets are
/// recomputed from scratch.
pub fn build_floor_bank(lists: &[Vec<FloorRecord>]) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(lists.len() as u32).to_le_bytes());

    // Reserve the offset table; filled in once list positions are known.
    let offset_table_base = payload.len();
    payload.extend(std::iter::repeat(0u8).take(lists.len() * 4));

    for (i, list) in lists.iter().enumerate() {
        let off = payload.len() as u32;
        payload[offset_table_base + i * 4..offset_table_base + i * 4 + 4]
            .copy_from_slice(&off.to_le_bytes());

        let count = u16::try_from(list.len()).map_err(|_| FloorWorksError::Format {
            resource: "floor bank",
            reason: format!("list {} has {} records, which exceeds 65535", i, list.len()),
        })?;
        payload.extend_from_slice(&count.to_le_bytes());
        for record in list {
            payload.extend_from_slice(&record.encode());
        }
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload)?;
    Ok(encoder.finish()?)
}
