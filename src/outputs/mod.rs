//! Output writers for finished pipeline passes.
//!
//! # Submodules
//!
//! - [`json`]: Writes a `PublishedArticle` to a dated JSON file
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── 2025-05-06/
//! │   ├── global-chip-shortage-worsens.json
//! │   └── port-strike-enters-second-week.json
//! ```

pub mod json;
