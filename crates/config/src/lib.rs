//! Layered configuration for folio.
//!
//! Built-in defaults are overridden by a TOML or YAML file, which is in turn
//! overridden by `FOLIO_`-prefixed environment variables.

pub mod error;
mod loader;
mod types;
mod validate;

pub use crate::loader::{default_locations, figment, load};
pub use crate::types::{ArchivesConfig, AssetsConfig, CatalogConfig, Config, Limits, Lister};
pub use crate::validate::validate;
