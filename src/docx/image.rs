use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use image::{ImageFormat, ImageReader};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DocxError, Result};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const GIF_MAGIC: &[u8] = b"GIF";
const BMP_MAGIC: &[u8] = b"BM";
const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF";

static SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]*[a-z%]{0,2}|auto)x([0-9]*[a-z%]{0,2}|auto)$").expect("size regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Png,
    Gif,
    Bmp,
    Jpeg,
}

impl ImageKind {
    pub fn from_magic(head: &[u8]) -> Option<Self> {
        if head.starts_with(PNG_MAGIC) {
            Some(Self::Png)
        } else if head.starts_with(GIF_MAGIC) {
            Some(Self::Gif)
        } else if head.starts_with(BMP_MAGIC) {
            Some(Self::Bmp)
        } else if head.starts_with(JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Jpeg => "jpeg",
        }
    }

    /// Decoder for the detected kind; the file name plays no part.
    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Gif => ImageFormat::Gif,
            Self::Bmp => ImageFormat::Bmp,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// An image to put in place of a placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageValue {
    pub path: PathBuf,
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
}

impl ImageValue {
    /// Detects the image type from its magic bytes and probes its pixel size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let kind = detect_image_kind(path)?;
        let mut reader = ImageReader::open(path).map_err(|source| DocxError::ImageRead {
            path: path.to_path_buf(),
            source,
        })?;
        reader.set_format(kind.image_format());
        let (width, height) = reader
            .into_dimensions()
            .map_err(|source| DocxError::ImageProbe {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            kind,
            width,
            height,
        })
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    /// Display size for a placeholder carrying inline arguments.
    pub fn size_for(&self, args: &ImageArgs) -> (u32, u32) {
        match (args.width, args.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) if args.ratio && self.width > 0 => {
                (w, scale(self.height, w, self.width))
            }
            (None, Some(h)) if args.ratio && self.height > 0 => {
                (scale(self.width, h, self.height), h)
            }
            (Some(w), None) => (w, self.height),
            (None, Some(h)) => (self.width, h),
            (None, None) => (self.width, self.height),
        }
    }
}

/// One image embedded into a part, waiting to be written under `word/media/` on save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageInjection {
    pub path: PathBuf,
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub mark: String,
    pub part: String,
    /// Media file name, shared by every injection of the same source path.
    pub target: String,
    pub rid: String,
}

fn scale(value: u32, num: u32, den: u32) -> u32 {
    ((u64::from(value) * u64::from(num) + u64::from(den) / 2) / u64::from(den)) as u32
}

pub fn detect_image_kind(path: &Path) -> Result<ImageKind> {
    let mut head = [0u8; 8];
    let mut f = File::open(path).map_err(|source| DocxError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut filled = 0;
    while filled < head.len() {
        let n = f
            .read(&mut head[filled..])
            .map_err(|source| DocxError::ImageRead {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    ImageKind::from_magic(&head[..filled]).ok_or_else(|| DocxError::UnsupportedImageType {
        path: path.to_path_buf(),
    })
}

/// Inline arguments of an image placeholder such as `logo:120x40` or `logo:size=120x40`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageArgs {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub ratio: bool,
    /// Any other `key=value` pair, lower-cased keys.
    pub extra: HashMap<String, String>,
}

impl Default for ImageArgs {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            ratio: true,
            extra: HashMap::new(),
        }
    }
}

impl ImageArgs {
    /// Parses everything after the first `:` of a placeholder name.
    pub fn parse(name: &str) -> Self {
        let mut args = Self::default();
        let Some((_, rest)) = name.split_once(':') else {
            return args;
        };
        for (pos, item) in rest.split(':').enumerate() {
            if let Some((key, value)) = item.split_once('=') {
                match key.to_ascii_lowercase().as_str() {
                    "size" => args.set_size(value),
                    "width" => args.width = parse_dim(value),
                    "height" => args.height = parse_dim(value),
                    "ratio" => args.ratio = parse_flag(value),
                    other => {
                        args.extra.insert(other.to_string(), value.to_string());
                    }
                }
            } else if SIZE_RE.is_match(item) {
                args.set_size(item);
            } else {
                match pos {
                    0 => args.width = parse_dim(item),
                    1 => args.height = parse_dim(item),
                    2 => args.ratio = parse_flag(item),
                    _ => {}
                }
            }
        }
        args
    }

    fn set_size(&mut self, value: &str) {
        if let Some((w, h)) = value.split_once('x') {
            self.width = parse_dim(w);
            self.height = parse_dim(h);
        }
    }
}

fn parse_dim(value: &str) -> Option<u32> {
    let digits = value.trim().trim_end_matches("px");
    digits.parse().ok().filter(|v| *v > 0)
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

/// Placeholder names whose image belongs to `search`: `search` itself or `search:<args>`.
pub fn matching_image_marks<'a>(names: &'a [String], search: &str) -> Vec<&'a str> {
    names
        .iter()
        .map(String::as_str)
        .filter(|n| {
            *n == search
                || n.strip_prefix(search)
                    .is_some_and(|rest| rest.starts_with(':'))
        })
        .collect()
}

pub fn drawing_xml(rid: &str, width: u32, height: u32) -> String {
    format!(
        "<w:pict><v:shape type=\"#_x0000_t75\" style=\"width:{width}px;height:{height}px\"><v:imagedata r:id=\"{rid}\" o:title=\"\"/></v:shape></w:pict>"
    )
}

/// Replaces the first tag-enclosed occurrence of `token` in `content` with `drawing`, keeping
/// the text around the token in copies of the enclosing tag pair.
pub fn splice_drawing(content: &str, token: &str, drawing: &str) -> Option<String> {
    let pattern = format!(
        r"(<[^<]+>)([^<]*)({})([^<]*)(<[^>]+>)",
        regex::escape(token)
    );
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(content)?;
    let whole = caps.get(0)?;
    let open = &caps[1];
    let before = &caps[2];
    let after = &caps[4];
    let close = &caps[5];

    let mut out = String::with_capacity(content.len() + drawing.len() + open.len() + close.len());
    out.push_str(&content[..whole.start()]);
    out.push_str(open);
    out.push_str(before);
    out.push_str(close);
    out.push_str(drawing);
    out.push_str(open);
    out.push_str(after);
    out.push_str(close);
    out.push_str(&content[whole.end()..]);
    Some(out)
}
