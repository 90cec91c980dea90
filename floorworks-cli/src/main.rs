use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use floorworks_core::{
    DungeonNode, FloorWorksError, Project, Result, TreeEntry,
};

#[derive(Debug, Parser)]
#[command(name = "floorworks", version, about = "Dungeon floor table editor for extracted ROM images")]
struct Args {
    /// Extracted ROM directory (contains layout.json, bin/ and data/).
    #[arg(long, value_name = "DIR")]
    rom: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the dungeon, group, dojo and fixed-room outline.
    Tree,

    /// Change a dungeon's floor count, keeping its group consistent.
    SetFloors {
        #[arg(long)]
        dungeon: u16,

        #[arg(long)]
        floors: u8,
    },

    /// Export one floor's layout as JSON.
    ExportFloor {
        #[arg(long)]
        dungeon: u16,

        #[arg(long)]
        floor: u8,

        /// Write to this file instead of stdout.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Import a JSON floor layout into one or more floors.
    ImportFloor {
        /// JSON file as produced by export-floor.
        #[arg(long, value_name = "FILE")]
        json: PathBuf,

        /// Targets as DUNGEON:FLOOR, e.g. --target 5:0 --target 7:1
        #[arg(long, value_name = "DUNGEON:FLOOR", required = true)]
        target: Vec<String>,
    },

    /// Show a dungeon's restrictions, optionally updating fields.
    Restriction {
        #[arg(long)]
        dungeon: u16,

        #[arg(long)]
        turn_limit: Option<u16>,

        #[arg(long)]
        max_party_size: Option<u8>,

        #[arg(long)]
        max_items_allowed: Option<u8>,

        #[arg(long)]
        max_rescue_attempts: Option<u8>,
    },

    /// Show a fixed room's floor plan.
    Room {
        #[arg(long)]
        id: u16,
    },
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn parse_target(raw: &str) -> Result<(u16, u8)> {
    let bad = || FloorWorksError::Format {
        resource: "target",
        reason: format!("expected DUNGEON:FLOOR, got '{raw}'"),
    };
    let (dungeon, floor) = raw.split_once(':').ok_or_else(bad)?;
    Ok((
        dungeon.trim().parse().map_err(|_| bad())?,
        floor.trim().parse().map_err(|_| bad())?,
    ))
}

fn print_dungeon(node: &DungeonNode, indent: &str) {
    println!("{}dungeon {} ({} floors)", indent, node.dungeon_id, node.floors.len());
    for (floor_id, position) in node.floors.iter().enumerate() {
        println!("{}  floor {} -> table position {}", indent, floor_id + 1, position);
    }
}

fn run(args: Args) -> Result<()> {
    let mut project = Project::open(&args.rom)?;

    match args.command {
        Command::Tree => {
            let tree = project.tree()?;

            println!("Dungeons");
            for entry in &tree.dungeons {
                match entry {
                    TreeEntry::Dungeon(node) => print_dungeon(node, "  "),
                    TreeEntry::Group {
                        base_dungeon_id,
                        members,
                    } => {
                        println!("  group (base dungeon {})", base_dungeon_id);
                        for member in members {
                            print_dungeon(member, "    ");
                        }
                    }
                }
            }

            println!("Dojos");
            for node in &tree.dojos {
                println!("  dungeon {} ({} floors)", node.dungeon_id, node.floors.len());
            }

            println!("Fixed rooms: {}", tree.fixed_room_count);
        }

        Command::SetFloors { dungeon, floors } => {
            let outcome = project.change_floor_count(dungeon, floors)?;
            if outcome.delta == 0 {
                println!("Dungeon {dungeon} already has {floors} floors, nothing to do");
            } else {
                project.save()?;
                println!(
                    "Dungeon {dungeon} now has {floors} floors (delta {:+})",
                    outcome.delta
                );
            }
        }

        Command::ExportFloor { dungeon, floor, out } => {
            let json = project.export_floor_json(dungeon, floor)?;
            match out {
                Some(path) => fs::write(path, json)?,
                None => println!("{json}"),
            }
        }

        Command::ImportFloor { json, target } => {
            let targets = target
                .iter()
                .map(|raw| parse_target(raw))
                .collect::<Result<Vec<_>>>()?;
            let json = fs::read_to_string(json)?;
            project.import_floor_json(&targets, &json)?;
            project.save()?;
            println!("Imported floor layout into {} target(s)", targets.len());
        }

        Command::Restriction {
            dungeon,
            turn_limit,
            max_party_size,
            max_items_allowed,
            max_rescue_attempts,
        } => {
            let mut restriction = project.restriction(dungeon)?;

            let editing = turn_limit.is_some()
                || max_party_size.is_some()
                || max_items_allowed.is_some()
                || max_rescue_attempts.is_some();

            if let Some(v) = turn_limit {
                restriction.turn_limit = v;
            }
            if let Some(v) = max_party_size {
                restriction.max_party_size = v;
            }
            if let Some(v) = max_items_allowed {
                restriction.max_items_allowed = v;
            }
            if let Some(v) = max_rescue_attempts {
                restriction.max_rescue_attempts = v;
            }

            if editing {
                project.update_restriction(dungeon, restriction)?;
                project.save()?;
            }
            println!("Dungeon {dungeon}: {restriction:?}");
        }

        Command::Room { id } => {
            let room = project.fixed_room(id)?;
            println!(
                "Fixed room {} ({}x{}), default tileset {}",
                id,
                room.width,
                room.height,
                project.default_tileset_for_fixed_room(id)
            );
            for y in 0..room.height {
                let row: Vec<String> = (0..room.width)
                    .map(|x| format!("{:02X}", room.tile(x, y).unwrap_or(0)))
                    .collect();
                println!("  {}", row.join(" "));
            }
        }
    }

    Ok(())
}
