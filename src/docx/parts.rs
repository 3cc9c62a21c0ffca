//! Well-known part names inside a WordprocessingML package.

use once_cell::sync::Lazy;
use regex::Regex;

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const SETTINGS_PART: &str = "word/settings.xml";
pub const DEFAULT_MAIN_PART: &str = "word/document.xml";
pub const MEDIA_DIR: &str = "word/media/";

static MAIN_PART_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"PartName="/(word/document.*?\.xml)" ContentType="application/vnd\.openxmlformats-officedocument\.wordprocessingml\.document\.main\+xml""#,
    )
    .expect("main part regex")
});

pub fn header_name(index: u32) -> String {
    format!("word/header{index}.xml")
}

pub fn footer_name(index: u32) -> String {
    format!("word/footer{index}.xml")
}

/// Main document part as declared in `[Content_Types].xml`, falling back to `word/document.xml`.
pub fn main_part_name(content_types: &str) -> String {
    MAIN_PART_RE
        .captures(content_types)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string())
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`.
pub fn rels_name(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, base)) => format!("{dir}/_rels/{base}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Inverse of [`rels_name`]: the part a relationship file belongs to.
pub fn part_for_rels(name: &str) -> Option<String> {
    let stem = name.strip_suffix(".rels")?;
    let (dir, base) = match stem.rsplit_once("_rels/") {
        Some((dir, base)) => (dir, base),
        None => return None,
    };
    if base.is_empty() || base.contains('/') || !(dir.is_empty() || dir.ends_with('/')) {
        return None;
    }
    Some(format!("{dir}{base}"))
}

/// File stem of a part name: `word/header1.xml` -> `header1`.
pub fn part_stem(part: &str) -> &str {
    let base = part.rsplit('/').next().unwrap_or(part);
    match base.rfind('.') {
        Some(i) if i > 0 => &base[..i],
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rels_names_round_trip() {
        assert_eq!(rels_name("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_name("word/footer2.xml"), "word/_rels/footer2.xml.rels");
        assert_eq!(
            part_for_rels("word/_rels/document.xml.rels").as_deref(),
            Some("word/document.xml")
        );
        assert_eq!(part_for_rels("_rels/.rels"), None);
        assert_eq!(part_for_rels("word/document.xml"), None);
    }

    #[test]
    fn main_part_from_content_types() {
        let ct = r#"<Types><Override PartName="/word/document2.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;
        assert_eq!(main_part_name(ct), "word/document2.xml");
        assert_eq!(main_part_name("<Types/>"), DEFAULT_MAIN_PART);
    }

    #[test]
    fn stems() {
        assert_eq!(part_stem("word/header1.xml"), "header1");
        assert_eq!(part_stem("document.xml"), "document");
    }
}
