//! Configuration check command

use std::path::Path;

use rsmt_core::{Customization, Result};

/// Parse `path` and print it in canonical form without touching any device
pub fn cmd_check(path: &Path, echo: bool) -> Result<()> {
    let customization = Customization::load(path, echo)?;
    log::info!(
        "{} configuration for devices under {}",
        customization.part,
        customization.filter
    );
    print!("{}", customization.to_text());
    Ok(())
}
