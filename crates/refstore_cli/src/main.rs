//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire config, registry, store and repository end to end.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `refstore_cli [config.json]`.

use log::info;
use refstore_core::{
    CallingContext, CoreConfig, DefaultQueryStrategy, Entity, Identifier, QueryOptions,
    ReferenceInput, Repository, Scope, SqliteTableStore, TableSchema,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::error::Error;
use std::process::ExitCode;

const NOTE_SCOPE: &str = "demo.note";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    id: i64,
    title: String,
}

impl Entity for Note {
    fn identifier(&self) -> Identifier {
        Identifier::Numeric(self.id)
    }
}

struct Notes;

impl Scope for Notes {
    type Entity = Note;
    const NAME: &'static str = NOTE_SCOPE;

    fn schema() -> TableSchema {
        TableSchema::new("demo_notes", &["title"])
    }

    fn projections(note: &Note) -> Vec<Value> {
        vec![json!(note.title)]
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("refstore_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => CoreConfig::from_file(path)?,
        None => CoreConfig::default(),
    };
    config
        .sref_prefixes
        .entry(NOTE_SCOPE.to_string())
        .or_insert_with(|| "note".to_string());

    config.init_logging()?;
    let registry = config.build_registry()?;
    let conn = config.open_database()?;
    let store = SqliteTableStore::try_new(&conn)?;
    let repo = Repository::<Notes, _>::try_new(&registry, DefaultQueryStrategy::new(&store))?;

    let ctx = CallingContext::system().with_reason("cli smoke");
    let options = QueryOptions::default();
    for (id, title) in [(1, "first"), (2, "second")] {
        repo.create(
            &Note {
                id,
                title: title.to_string(),
            },
            &ctx,
            &options,
        )?;
    }

    println!("refstore_core version={}", refstore_core::core_version());
    for note in repo
        .list(&ctx, &options)?
        .map(|page| page.entities())
        .transpose()?
        .unwrap_or_default()
    {
        let reference = repo.encode(ReferenceInput::Entity(note.clone()))?;
        println!("{reference} title={}", note.title);
    }
    info!("event=cli_smoke module=cli status=ok");
    Ok(())
}
