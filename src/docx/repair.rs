//! Rejoins placeholders that a word processor split across run boundaries,
//! e.g. `{</w:t></w:r><w:r><w:t>{name}}` back into `{{name}}`.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[\s\S]+?>").expect("tag regex"));

/// A placeholder never spans these; a candidate that does is left as is.
const PARAGRAPH_END: [&str; 3] = ["</w:p>", "</w:tc>", "</w:tr>"];

/// Strips the XML tags found inside every placeholder span of `xml`.
///
/// Returns `xml` unchanged when the prefix is a single character.
pub fn repair_split_placeholders(xml: &str, prefix: &str, suffix: &str) -> String {
    let mut chars = prefix.chars();
    let Some(first) = chars.next() else {
        return xml.to_string();
    };
    let rest = chars.as_str();
    if rest.is_empty() || suffix.is_empty() {
        return xml.to_string();
    }

    // Prefix gaps hold markup only; the body stops at the next prefix start.
    let first = regex::escape(first.encode_utf8(&mut [0u8; 4]));
    let rest = regex::escape(rest);
    let suffix = regex::escape(suffix);
    let pattern = format!(r"{first}(?:<[^>]*>)*{rest}(?:[^<{first}]|<[^>]*>)*?{suffix}");
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(err) => {
            tracing::warn!(%err, "placeholder repair pattern rejected");
            return xml.to_string();
        }
    };

    re.replace_all(xml, |caps: &regex::Captures<'_>| {
        let span = &caps[0];
        if PARAGRAPH_END.iter().any(|end| span.contains(end)) {
            return span.to_string();
        }
        TAG_RE.replace_all(span, "").into_owned()
    })
    .into_owned()
}
