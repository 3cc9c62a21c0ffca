use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{DocxError, Result};

/// Parses `xml` with end-name checking and fails on the first structural error.
///
/// This is a well-formedness check only; nothing is validated against the OOXML schema.
pub fn check_well_formed(part: &str, xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = true;

    let mut depth: usize = 0;
    loop {
        let ev = reader.read_event().map_err(|err| DocxError::Malformed {
            part: part.to_string(),
            message: format!("{err} at byte {}", reader.error_position()),
        })?;
        match ev {
            Event::Eof => break,
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(t) => {
                t.unescape().map_err(|err| DocxError::Malformed {
                    part: part.to_string(),
                    message: format!("bad text: {err}"),
                })?;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(DocxError::Malformed {
            part: part.to_string(),
            message: format!("{depth} unclosed element(s)"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::check_well_formed;
    use crate::error::DocxError;

    #[test]
    fn accepts_run_with_break() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t>a</w:t><w:br/><w:t>b &amp; c</w:t></w:r></w:p></w:body></w:document>"#;
        check_well_formed("word/document.xml", xml).expect("well formed");
    }

    #[test]
    fn rejects_mismatched_end() {
        let xml = "<w:p><w:r><w:t>a</w:r></w:t></w:p>";
        let err = check_well_formed("word/document.xml", xml).unwrap_err();
        assert!(matches!(err, DocxError::Malformed { ref part, .. } if part == "word/document.xml"));
    }

    #[test]
    fn rejects_unclosed() {
        let err = check_well_formed("word/header1.xml", "<w:hdr><w:p>").unwrap_err();
        assert!(matches!(err, DocxError::Malformed { .. }));
    }
}
