use clap::{Parser, Subcommand, ValueEnum};
use std::process;
use vellum::{Database, DocumentBuffer, FieldValue, IndexInfo, OpenOptions, SchemaFormat};

/// vellum CLI: work with a vellum database from the command line
#[derive(Parser)]
#[command(name = "vellum", version, about)]
struct Cli {
    /// Path to the directory holding the database files (default: current directory)
    #[arg(long, default_value = ".")]
    path: String,

    /// Database name
    #[arg(long, default_value = "db")]
    database: String,

    /// Fail when the database does not exist instead of creating it
    #[arg(long)]
    no_create: bool,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Create a collection from a JSON schema descriptor
    CreateCollection {
        /// Collection name
        collection: String,
        /// Path to the schema descriptor (JSON), or '-' for stdin
        schema_file: String,
        /// Ordered index declarations (e.g. --index played_by.name)
        #[arg(long = "index")]
        indexes: Vec<String>,
    },

    /// Insert one document from a JSON file
    Insert {
        /// Collection name
        collection: String,
        /// Path to a JSON document, or '-' for stdin
        file: String,
    },

    /// Insert a batch of documents from a JSON Lines file, atomically
    Load {
        /// Collection name
        collection: String,
        /// Path to a JSON Lines file, one document per line, or '-' for stdin
        file: String,
    },

    /// Run a SELECT statement and print the matching rows
    Query {
        /// The statement, e.g. "SELECT name FROM character WHERE age > 30"
        sql: String,
    },

    /// List collections
    Collections,

    /// Show per-collection document, segment and index stats
    Status,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let options = OpenOptions::new().create_if_missing(!cli.no_create);
    let db = Database::open_with_options(&cli.path, &cli.database, options)?;

    match cli.command {
        Command::CreateCollection {
            collection,
            schema_file,
            indexes,
        } => {
            let descriptor = to_bson_bytes(read_json(&schema_file)?)?;
            let indexes: Vec<IndexInfo> = indexes.into_iter().map(IndexInfo::ordered).collect();
            db.create_collection(&collection, SchemaFormat::Bson, &descriptor, &indexes)?;
            print_output(
                &serde_json::json!({ "ok": true, "collection": collection }),
                &cli.format,
            );
        }

        Command::Insert { collection, file } => {
            let document = DocumentBuffer::from(to_bson_bytes(read_json(&file)?)?);
            db.insert(&collection, document)?;
            print_output(&serde_json::json!({ "ok": true, "inserted": 1 }), &cli.format);
        }

        Command::Load { collection, file } => {
            let text = read_input(&file)?;
            let mut documents = Vec::new();
            for (i, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let value: serde_json::Value = serde_json::from_str(line)
                    .map_err(|e| format!("line {}: {e}", i + 1))?;
                documents.push(DocumentBuffer::from(to_bson_bytes(value)?));
            }
            let count = documents.len();
            db.multi_insert(&collection, documents)?;
            print_output(
                &serde_json::json!({ "ok": true, "inserted": count }),
                &cli.format,
            );
        }

        Command::Query { sql } => {
            let mut rs = db.execute_select(&sql)?;
            let columns: Vec<String> = rs.column_names().to_vec();
            let mut rows = Vec::new();
            while rs.next()? {
                let mut row = serde_json::Map::new();
                for (i, name) in columns.iter().enumerate() {
                    row.insert(name.clone(), cell_to_json(rs.get_value(i)?));
                }
                rows.push(serde_json::Value::Object(row));
            }
            print_output(&serde_json::Value::Array(rows), &cli.format);
        }

        Command::Collections => {
            print_output(&serde_json::json!(db.collection_names()), &cli.format);
        }

        Command::Status => {
            print_output(&db.stats(), &cli.format);
        }
    }

    Ok(())
}

fn print_output(value: &serde_json::Value, format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).unwrap());
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value).unwrap());
        }
    }
}

fn cell_to_json(value: Option<&FieldValue>) -> serde_json::Value {
    match value {
        None => serde_json::Value::Null,
        Some(FieldValue::Bool(b)) => serde_json::Value::Bool(*b),
        Some(FieldValue::Int(i)) => serde_json::Value::from(*i),
        Some(FieldValue::Float(f)) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(FieldValue::Str(s)) => serde_json::Value::String(s.clone()),
        // Raw document bytes are summarized rather than dumped.
        Some(FieldValue::Bytes(b)) => serde_json::json!({ "$bytes": b.len() }),
    }
}

fn to_bson_bytes(value: serde_json::Value) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    match bson::Bson::try_from(value)? {
        bson::Bson::Document(doc) => Ok(bson::to_vec(&doc)?),
        _ => Err("expected a top-level JSON object".into()),
    }
}

fn read_json(path: &str) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    Ok(serde_json::from_str(&read_input(path)?)?)
}

fn read_input(path: &str) -> Result<String, Box<dyn std::error::Error>> {
    if path == "-" {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{path}': {e}"))?)
    }
}
