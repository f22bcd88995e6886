//! Replace command: previews marker substitution on a local file.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::event::{FieldMap, TriggerEvent};
use crate::replacer::{ContentReplacer, DEFAULT_NAMESPACE};

/// Replace command options.
#[derive(Parser)]
pub struct ReplaceCommand {
    /// File to rewrite.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Trigger event JSON file supplying field values.
    #[arg(long, value_name = "FILE")]
    pub event: Option<PathBuf>,

    /// Additional field value as `key=value`, e.g. `data.image=app:1.2`.
    #[arg(long = "field", value_name = "KEY=VALUE", value_parser = super::parse_field)]
    pub fields: Vec<(String, String)>,

    /// Marker namespace recognised in the file.
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Rewrite the file instead of printing the result.
    #[arg(long)]
    pub in_place: bool,
}

impl ReplaceCommand {
    /// Executes the replace command.
    pub fn execute(self) -> Result<()> {
        let content = fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read file: {}", self.file.display()))?;

        let mut fields = match &self.event {
            Some(path) => FieldMap::from_event(&TriggerEvent::from_file(path)?)?,
            None => FieldMap::new(),
        };
        for (key, value) in &self.fields {
            fields.insert(key, value);
        }

        let replaced = ContentReplacer::new(self.namespace.as_str()).replace(&content, &fields);
        if self.in_place {
            if replaced != content {
                fs::write(&self.file, replaced)
                    .with_context(|| format!("Failed to write file: {}", self.file.display()))?;
            }
        } else {
            print!("{replaced}");
        }
        Ok(())
    }
}
