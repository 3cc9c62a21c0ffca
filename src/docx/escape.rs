use quick_xml::escape::partial_escape;

use crate::error::{DocxError, Result};

pub const LINE_BREAK: &str = "<w:br/>";

/// Escapes `text` for use as WordprocessingML character data.
///
/// CR+LF becomes a `<w:br/>` element; a lone CR or LF is kept as a character reference.
pub fn encode_text(text: &str) -> Result<String> {
    if let Some(ch) = text.chars().find(|c| !is_xml_char(*c)) {
        return Err(DocxError::Encoding {
            text: text.to_string(),
            code: ch as u32,
        });
    }
    let escaped = partial_escape(text);
    if !escaped.contains(['\r', '\n']) {
        return Ok(escaped.into_owned());
    }
    Ok(escaped
        .replace("\r\n", LINE_BREAK)
        .replace('\r', "&#xD;")
        .replace('\n', "&#xA;"))
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(encode_text("a < b & c > d").unwrap(), "a &lt; b &amp; c &gt; d");
        assert_eq!(encode_text("plain").unwrap(), "plain");
        assert_eq!(encode_text("say \"hi\"").unwrap(), "say \"hi\"");
    }

    #[test]
    fn crlf_becomes_line_break() {
        assert_eq!(encode_text("one\r\ntwo").unwrap(), "one<w:br/>two");
        assert_eq!(encode_text("one\ntwo").unwrap(), "one&#xA;two");
    }

    #[test]
    fn rejects_control_characters() {
        let err = encode_text("bad\u{1}value").unwrap_err();
        assert!(matches!(err, DocxError::Encoding { code: 1, .. }));
    }
}
