//! Config command implementation

use crate::config::load_layered;
use crate::output::OutputWriter;
use crate::output_types::{ConfigEntry, ConfigOutput};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::Tabled;

pub fn execute(output: &OutputWriter, config_path: Option<&Path>) -> Result<()> {
    let layered = load_layered(config_path)?;

    let values: BTreeMap<String, ConfigEntry> = layered
        .to_inspection_map()
        .into_iter()
        .map(|(key, (value, source))| {
            (
                key,
                ConfigEntry {
                    value,
                    source: source.to_string(),
                },
            )
        })
        .collect();

    if output.is_json() {
        return output.result(ConfigOutput { values });
    }

    output.section("Configuration Values");

    #[derive(Tabled)]
    struct ConfigRow {
        #[tabled(rename = "Key")]
        key: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<ConfigRow> = values
        .into_iter()
        .map(|(key, entry)| ConfigRow {
            key,
            value: entry.value,
            source: entry.source,
        })
        .collect();
    output.table(rows);

    if let Err(e) = layered.resolve() {
        output.warning(format!("Configuration is not runnable yet: {}", e));
    }
    Ok(())
}
