use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::floors::FloorRecord;
use crate::{FloorWorksError, Result};

/// A fixed (hand-authored, non-generated) floor plan. Floor records point
/// at these via `fixed_room_id`; room 0 is reserved to mean "generated".
///
/// Wire format: width u8, height u8, then `width * height` tile bytes,
/// row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedRoom {
    pub width: u8,
    pub height: u8,
    pub tiles: Vec<u8>,
}

impl FixedRoom {
    pub fn tile(&self, x: u8, y: u8) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.tiles[y as usize * self.width as usize + x as usize])
    }
}

/// Parse the fixed-room bank: gzip-compressed, u32 LE room count, u32 LE
/// payload-relative offsets, then each room in wire form.
pub fn parse_fixed_bank(raw: &[u8]) -> Result<Vec<FixedRoom>> {
    let mut decoder = GzDecoder::new(raw);
    let mut payload = Vec::new();
    decoder.read_to_end(&mut payload)?;

    if payload.len() < 4 {
        return Err(FloorWorksError::Format {
            resource: "fixed-room bank",
            reason: "payload too small to contain a room count".to_string(),
        });
    }

    let room_count =
        u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let header_end = 4 + room_count * 4;
    if header_end > payload.len() {
        return Err(FloorWorksError::Format {
            resource: "fixed-room bank",
            reason: format!("offset table for {} rooms is truncated", room_count),
        });
    }

    let mut rooms = Vec::with_capacity(room_count);
    for i in 0..room_count {
        let base = 4 + i * 4;
        let off = u32::from_le_bytes([
            payload[base],
            payload[base + 1],
            payload[base + 2],
            payload[base + 3],
        ]) as usize;

        if off + 2 > payload.len() {
            return Err(FloorWorksError::Format {
                resource: "fixed-room bank",
                reason: format!("room {} offset {:#X} is outside the payload", i, off),
            });
        }

        let width = payload[off];
        let height = payload[off + 1];
        let tiles_end = off + 2 + width as usize * height as usize;
        if tiles_end > payload.len() {
            return Err(FloorWorksError::Format {
                resource: "fixed-room bank",
                reason: format!("room {} ({}x{}) is truncated", i, width, height),
            });
        }

        rooms.push(FixedRoom {
            width,
            height,
            tiles: payload[off + 2..tiles_end].to_vec(),
        });
    }

    Ok(rooms)
}

/// Serialize the fixed-room bank back to its compressed wire form.
pub fn build_fixed_bank(rooms: &[FixedRoom]) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(rooms.len() as u32).to_le_bytes());

    let offset_table_base = payload.len();
    payload.extend(std::iter::repeat(0u8).take(rooms.len() * 4));

    for (i, room) in rooms.iter().enumerate() {
        if room.tiles.len() != room.width as usize * room.height as usize {
            return Err(FloorWorksError::Format {
                resource: "fixed-room bank",
                reason: format!(
                    "room {} claims {}x{} but has {} tiles",
                    i,
                    room.width,
                    room.height,
                    room.tiles.len()
                ),
            });
        }
        let off = payload.len() as u32;
        payload[offset_table_base + i * 4..offset_table_base + i * 4 + 4]
            .copy_from_slice(&off.to_le_bytes());
        payload.push(room.width);
        payload.push(room.height);
        payload.extend_from_slice(&room.tiles);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload)?;
    Ok(encoder.finish()?)
}

/// Default tileset for rendering a fixed room outside any dungeon: the
/// tileset of the first floor anywhere that uses the room, or 0 when
/// nothing references it.
pub fn default_tileset_for_fixed_room(lists: &[Vec<FloorRecord>], room_id: u16) -> u8 {
    for list in lists {
        for floor in list {
            if floor.fixed_room_id == room_id {
                return floor.tileset_id;
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_round_trips() {
        let rooms = vec![
            FixedRoom {
                width: 2,
                height: 2,
                tiles: vec![1, 2, 3, 4],
            },
            FixedRoom {
                width: 3,
                height: 1,
                tiles: vec![9, 9, 9],
            },
        ];
        let raw = build_fixed_bank(&rooms).unwrap();
        assert_eq!(parse_fixed_bank(&raw).unwrap(), rooms);
    }

    #[test]
    fn tile_lookup_is_row_major() {
        let room = FixedRoom {
            width: 3,
            height: 2,
            tiles: vec![0, 1, 2, 10, 11, 12],
        };
        assert_eq!(room.tile(1, 0), Some(1));
        assert_eq!(room.tile(2, 1), Some(12));
        assert_eq!(room.tile(3, 0), None);
    }

    #[test]
    fn mismatched_tile_count_is_rejected() {
        let rooms = vec![FixedRoom {
            width: 2,
            height: 2,
            tiles: vec![1, 2, 3],
        }];
        assert!(matches!(
            build_fixed_bank(&rooms),
            Err(FloorWorksError::Format { .. })
        ));
    }

    #[test]
    fn default_tileset_comes_from_first_referencing_floor() {
        let mut a = crate::floors::FloorRecord::decode(&[0u8; 16]);
        a.tileset_id = 4;
        a.fixed_room_id = 2;
        let mut b = a.clone();
        b.tileset_id = 9;

        let lists = vec![vec![], vec![a, b]];
        assert_eq!(default_tileset_for_fixed_room(&lists, 2), 4);
        assert_eq!(default_tileset_for_fixed_room(&lists, 5), 0);
    }
}
