use anyhow::Result;
use comfy_table::{Cell, Table as ComfyTable};

use schemascribe_core::config::ProfileSettings;
use schemascribe_core::registry;

use crate::args::ProfilesArgs;
use crate::commands::load_config;

pub fn run(args: &ProfilesArgs) -> Result<()> {
    let config = load_config(&args.config.config)?;
    let registry = registry::global();

    let mut t = ComfyTable::new();
    t.set_header(vec!["Profile", "Kind", "Type", "Settings", "Default"]);

    for name in config.db_connections.keys() {
        let profile = config.connection_profile(Some(name))?;
        let is_default = config.default.db.as_deref() == Some(name.as_str());
        t.add_row(vec![
            Cell::new(&profile.name),
            Cell::new("db"),
            Cell::new(&profile.kind),
            Cell::new(settings_keys(&profile.settings)),
            Cell::new(if is_default { "*" } else { "" }),
        ]);
    }
    for name in config.llm_providers.keys() {
        let profile = config.llm_profile(Some(name))?;
        let is_default = config.default.llm.as_deref() == Some(name.as_str());
        t.add_row(vec![
            Cell::new(&profile.name),
            Cell::new("llm"),
            Cell::new(&profile.provider),
            Cell::new(settings_keys(&profile.settings)),
            Cell::new(if is_default { "*" } else { "" }),
        ]);
    }

    println!("Config: {}", args.config.config.display());
    println!("{}", t);
    println!();
    println!("Connector types: {}", registry.connector_tags().join(", "));
    println!("LLM providers:   {}", registry.llm_tags().join(", "));
    Ok(())
}

/// Setting names only; values may hold secrets.
fn settings_keys(settings: &ProfileSettings) -> String {
    settings.keys().collect::<Vec<_>>().join(", ")
}
