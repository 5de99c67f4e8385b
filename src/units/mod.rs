//! Units: manifest files that declare handlers.
//!
//! A unit is one file in the unit directory. Its manifest names the handlers
//! it exposes, their methods and parameters, and what backs each one: a
//! callable from the [`HandlerCatalog`] or a static JSON response.

mod catalog;
mod loader;
mod manifest;

pub use catalog::HandlerCatalog;
pub use loader::{FileUnitLoader, LoadReport, ReloadSummary, UnitLoader};
pub use manifest::{HandlerBinding, HandlerSpec, UnitManifest, parse_manifest};
