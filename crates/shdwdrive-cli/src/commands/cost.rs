//! Cost command - estimate the price of reserving storage
//!
//! Uses the `network.shades_per_gib` rate from the configuration.

use anyhow::Result;
use clap::Args;

use shdwdrive_core::domain::{format_bytes, storage_cost, SizeSpec};

use crate::CliContext;

/// Base token units per whole token
const SHADES_PER_TOKEN: u64 = 1_000_000_000;

#[derive(Debug, Args)]
pub struct CostCommand {
    /// Size to reserve, e.g. 250MB or 1.5GB
    size: SizeSpec,
}

/// Formats a shade amount as whole tokens
fn format_tokens(shades: u64) -> String {
    format!(
        "{}.{:09}",
        shades / SHADES_PER_TOKEN,
        shades % SHADES_PER_TOKEN
    )
}

impl CostCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let rate = ctx.config.network.shades_per_gib;
        let shades = storage_cost(rate, &self.size);

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "size": self.size.to_string(),
                "magnitude": self.size.magnitude(),
                "unit": self.size.unit().as_str(),
                "bytes": self.size.bytes(),
                "shades_per_gib": rate,
                "shades": shades,
                "shdw": format_tokens(shades),
            }));
        } else {
            formatter.success(&format!(
                "{} ({}) costs {} SHDW",
                self.size,
                format_bytes(self.size.bytes()),
                format_tokens(shades)
            ));
            formatter.info(&format!("{shades} shades at {rate} shades per GiB"));
        }
        Ok(())
    }
}
