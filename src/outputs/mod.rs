//! Output generation for collected articles.
//!
//! # Submodules
//!
//! - [`markdown`]: Writes one Markdown file per new article
//!
//! # Output Structure
//!
//! ```text
//! articles_dir/
//! ├── 2025-05-06/
//! │   ├── <title>.md
//! │   └── <title>.md
//! └── 2025-05-07/
//!     └── <title>.md
//! ```

pub mod markdown;
