//! Relationship files and `[Content_Types].xml` bookkeeping for injected media.

use std::collections::{BTreeMap, HashMap};

use crate::docx::parts::rels_name;

pub const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const RELS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";

const EMPTY_RELATIONSHIPS: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"></Relationships>";

/// Relationship XML per part, plus a per-part id counter.
///
/// Parts without relationship content never have an entry.
#[derive(Clone, Debug, Default)]
pub struct RelationLedger {
    rels: BTreeMap<String, String>,
    next_id: HashMap<String, usize>,
}

impl RelationLedger {
    /// Records the relationship file of `part` as loaded; empty content is ignored.
    pub fn insert_loaded(&mut self, part: &str, rels_xml: String) {
        if rels_xml.is_empty() {
            self.rels.remove(part);
        } else {
            self.rels.insert(part.to_string(), rels_xml);
        }
    }

    pub fn get(&self, part: &str) -> Option<&str> {
        self.rels.get(part).map(String::as_str)
    }

    pub fn contains(&self, part: &str) -> bool {
        self.rels.contains_key(part)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The id [`next_rid`](Self::next_rid) would hand out for `part`, without taking it.
    pub fn peek_rid(&self, part: &str) -> String {
        let existing = self.rels.get(part).map(String::as_str).unwrap_or("");
        let start = match self.next_id.get(part) {
            Some(n) => *n,
            None => seed_counter(existing),
        };
        free_rid(existing, start).0
    }

    /// Hands out the next free `rIdN` of `part`.
    ///
    /// The counter starts at the number of `<Relationship` elements already present and
    /// skips ids that are taken.
    pub fn next_rid(&mut self, part: &str) -> String {
        let existing = self.rels.get(part).map(String::as_str).unwrap_or("");
        let counter = self
            .next_id
            .entry(part.to_string())
            .or_insert_with(|| seed_counter(existing));
        let (rid, next) = free_rid(existing, *counter);
        *counter = next;
        rid
    }

    /// Appends an image relationship to `part`, seeding an empty relationship document (and
    /// declaring it in `content_types`) when `part` had none.
    pub fn add_image(
        &mut self,
        part: &str,
        rid: &str,
        media_file: &str,
        content_types: &mut ContentTypes,
    ) {
        if !self.rels.contains_key(part) {
            self.rels
                .insert(part.to_string(), EMPTY_RELATIONSHIPS.to_string());
            content_types.add_override(&format!("/{}", rels_name(part)), RELS_CONTENT_TYPE);
        }
        let relation = format!(
            "<Relationship Id=\"{rid}\" Type=\"{IMAGE_REL_TYPE}\" Target=\"media/{media_file}\"/>"
        );
        if let Some(xml) = self.rels.get_mut(part) {
            insert_before_close(xml, "</Relationships>", &relation);
        }
    }
}

/// The `[Content_Types].xml` part.
#[derive(Clone, Debug)]
pub struct ContentTypes {
    pub name: String,
    pub xml: String,
}

impl ContentTypes {
    pub fn declares(&self, part_name: &str) -> bool {
        self.xml.contains(&format!("PartName=\"{part_name}\""))
    }

    /// Adds an `<Override>` for `part_name` unless one exists. Returns whether it was added.
    pub fn add_override(&mut self, part_name: &str, content_type: &str) -> bool {
        if self.declares(part_name) {
            return false;
        }
        let decl = format!("<Override PartName=\"{part_name}\" ContentType=\"{content_type}\"/>");
        insert_before_close(&mut self.xml, "</Types>", &decl);
        true
    }
}

fn seed_counter(existing: &str) -> usize {
    existing.matches("<Relationship ").count()
}

/// First `rIdN` with `N >= start` not present in `existing`, and the counter after it.
fn free_rid(existing: &str, start: usize) -> (String, usize) {
    let mut n = start;
    loop {
        let rid = format!("rId{n}");
        n += 1;
        if !existing.contains(&format!("Id=\"{rid}\"")) {
            return (rid, n);
        }
    }
}

fn insert_before_close(xml: &mut String, close: &str, fragment: &str) {
    match xml.rfind(close) {
        Some(pos) => xml.insert_str(pos, fragment),
        None => {
            xml.push_str(fragment);
            xml.push_str(close);
        }
    }
}
