//! Mail-merge for Word (.docx) templates: text and image placeholders in the body, headers and
//! footers, plus table-row cloning for repeated data.

pub mod config;
pub mod data;
pub mod docx;
pub mod error;

pub use config::MergeConfig;
pub use docx::document::Docx;
pub use docx::image::{ImageKind, ImageValue};
pub use error::{DocxError, Result};
