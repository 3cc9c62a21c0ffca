use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocxError>;

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("open docx {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read docx archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("part {part} is not valid utf-8")]
    PartEncoding { part: String },

    #[error("missing main document part: {0}")]
    MissingMainPart(String),

    /// The text contains a character that XML 1.0 does not allow in character data.
    #[error("cannot encode {text:?} as xml text: invalid character U+{code:04X}")]
    Encoding { text: String, code: u32 },

    #[error("placeholder {0} not found in main document part")]
    MarkNotFound(String),

    #[error("no enclosing table row around placeholder {0}")]
    RowNotFound(String),

    #[error("unsupported image type: {}", path.display())]
    UnsupportedImageType { path: PathBuf },

    #[error("read image {}: {source}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("probe image {}: {source}", path.display())]
    ImageProbe {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("save part {part}: {source}")]
    Save {
        part: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("malformed xml in {part}: {message}")]
    Malformed { part: String, message: String },
}

impl DocxError {
    pub(crate) fn save(part: impl Into<String>, source: impl Into<zip::result::ZipError>) -> Self {
        DocxError::Save {
            part: part.into(),
            source: source.into(),
        }
    }
}
