//! Unified configuration system.
//!
//! Consolidates configuration from tiers with field-by-field YAML merging:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `$CWD/sheet-migrator/config.yaml`
//! 3. **User** - `~/.sheet-migrator/config.yaml`
//! 4. **Environment** - variables listed below
//!
//! ## Environment Variables
//! - `SHEET_MIGRATOR_CONFIG_PATH` - Explicit config file (overrides all tiers)
//! - `SHEET_MIGRATOR_DB_PATH` - Target database path
//! - `SHEET_MIGRATOR_SOURCE_URL` - Source API base URL
//! - `SHEET_MIGRATOR_SOURCE_TOKEN` - Source API bearer token
//! - `SHEET_MIGRATOR_DRY_RUN` - `1`/`true` disables every write
//! - `SHEET_MIGRATOR_LIMIT` - Cap on records processed per stage
//! - `SHEET_MIGRATOR_USER_DIR` - User config dir (default: `~/.sheet-migrator`)
//! - `SHEET_MIGRATOR_PROJECT_DIR` - Project config dir (default: `./sheet-migrator`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::deep_merge;
pub use types::*;
