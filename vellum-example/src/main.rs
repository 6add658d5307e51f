use std::path::Path;

use bson::doc;
use vellum::{Database, DocumentBuffer, IndexInfo, SchemaFormat};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let data_dir = std::env::var("VELLUM_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    std::fs::create_dir_all(&data_dir)?;
    cleanup_old_files(&data_dir);

    log::info!("Opening database at: {data_dir}");
    let db = Database::open(&data_dir, "game_of_thrones")?;

    // The collection schema: a character with a nested actor record.
    let schema = bson::to_vec(&doc! {
        "name": "character",
        "fields": {
            "name": { "type": "string", "required": true },
            "house": "string",
            "played_by": {
                "type": "object",
                "fields": {
                    "name": "string",
                    "place_of_birth": "string",
                    "date_of_birth": "string",
                }
            },
            "age": "int",
            "first_seen": "string",
        }
    })?;

    db.create_collection(
        "character",
        SchemaFormat::Bson,
        &schema,
        &[
            IndexInfo::ordered("house"),
            IndexInfo::ordered("age"),
            IndexInfo::ordered("played_by.name"),
        ],
    )?;

    // Insert one character on its own.
    let tyrion = bson::to_vec(&doc! {
        "name": "Tyrion Lannister",
        "house": "Lannister",
        "played_by": {
            "name": "Peter Dinklage",
            "place_of_birth": "Morristown",
            "date_of_birth": "1969-06-11",
        },
        "age": 39,
        "first_seen": "Winter is Coming",
    })?;
    db.insert("character", DocumentBuffer::from(tyrion))?;

    // Insert the rest as one atomic batch.
    let jon = bson::to_vec(&doc! {
        "name": "Jon Snow",
        "house": "Stark",
        "played_by": {
            "name": "Kit Harington",
            "place_of_birth": "London",
            "date_of_birth": "1986-12-26",
        },
        "age": 21,
        "first_seen": "Winter is Coming",
    })?;
    let petyr = bson::to_vec(&doc! {
        "name": "Petyr Baelish",
        "house": "Baelish",
        "played_by": {
            "name": "Aidan Gillen",
            "place_of_birth": "Dublin",
            "date_of_birth": "1968-04-24",
        },
        "age": 51,
        "first_seen": "Lord Snow",
    })?;
    db.multi_insert(
        "character",
        vec![DocumentBuffer::from(jon), DocumentBuffer::from(petyr)],
    )?;

    // Read everything back.
    println!("All characters:");
    let mut rs = db.execute_select("SELECT name, house, age FROM character;")?;
    let name = rs.column_index("name")?;
    let house = rs.column_index("house")?;
    let age = rs.column_index("age")?;
    while rs.next()? {
        println!(
            "  {} of house {}, age {}",
            rs.get_string(name)?.unwrap_or("-"),
            rs.get_string(house)?.unwrap_or("-"),
            rs.get_integer(age)?.unwrap_or(0),
        );
    }

    // Constrained read: both conjuncts run against the declared indexes.
    println!("Adults of house Stark:");
    let mut rs =
        db.execute_select("SELECT name, house, age FROM character WHERE age > 10 AND house = 'Stark';")?;
    let name = rs.column_index("name")?;
    let age = rs.column_index("age")?;
    while rs.next()? {
        println!(
            "  {} (age {})",
            rs.get_string(name)?.unwrap_or("-"),
            rs.get_integer(age)?.unwrap_or(0),
        );
    }

    // The _document pseudo-column returns the stored document bytes.
    println!("Raw documents:");
    let mut rs = db.execute_select("SELECT _document FROM character;")?;
    let blob = rs.column_index("_document")?;
    while rs.next()? {
        let bytes = rs.get_blob(blob)?.map(<[u8]>::len).unwrap_or(0);
        println!("  {bytes} byte document");
    }

    // Nested fields are addressed with dotted paths, quoted or bare.
    println!("Who plays Petyr Baelish:");
    let mut rs = db.execute_select(
        "SELECT \"played_by.name\", \"played_by.date_of_birth\" \
         FROM character \
         WHERE \"played_by.name\" = 'Aidan Gillen';",
    )?;
    let actor = rs.column_index("played_by.name")?;
    let born = rs.column_index("played_by.date_of_birth")?;
    while rs.next()? {
        println!(
            "  {}, born {}",
            rs.get_string(actor)?.unwrap_or("-"),
            rs.get_string(born)?.unwrap_or("-"),
        );
    }

    Ok(())
}

/// Removes files from a previous run so the walkthrough starts clean.
fn cleanup_old_files(dir: &str) {
    let _ = std::fs::remove_file(Path::new(dir).join("game_of_thrones.dat"));
    for no in 0u32.. {
        let path = Path::new(dir).join(format!("game_of_thrones_character.{no}"));
        if std::fs::remove_file(path).is_err() {
            break;
        }
    }
}
