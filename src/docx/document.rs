use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use once_cell::sync::Lazy;
use quick_xml::escape::partial_escape;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::MergeConfig;
use crate::docx::escape::encode_text;
use crate::docx::image::{
    drawing_xml, matching_image_marks, splice_drawing, ImageArgs, ImageInjection, ImageValue,
};
use crate::docx::package::{DocxPackage, ExtraEntry, WritePlan};
use crate::docx::parts::{self, CONTENT_TYPES_PART, MEDIA_DIR, SETTINGS_PART};
use crate::docx::relations::{ContentTypes, RelationLedger};
use crate::docx::repair::repair_split_placeholders;
use crate::docx::table;
use crate::docx::xml::check_well_formed;
use crate::error::{DocxError, Result};

static UPDATE_FIELDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<w:updateFields\s+w:val="[^"]*"\s*/>"#).expect("updateFields"));

/// An in-memory .docx template.
///
/// All parts are read at load time; the source file is not held open.
pub struct Docx {
    package: DocxPackage,
    config: MergeConfig,
    /// Delimiters as they appear in serialized XML.
    scan: MergeConfig,

    main_part_name: String,
    main_part: String,
    headers: BTreeMap<u32, String>,
    footers: BTreeMap<u32, String>,
    settings_part_name: String,
    settings_part: Option<String>,
    content_types: ContentTypes,
    relations: RelationLedger,
    images: Vec<ImageInjection>,
}

impl Docx {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_config(path, MergeConfig::default())
    }

    pub fn load_with_config(path: impl AsRef<Path>, config: MergeConfig) -> Result<Self> {
        let path = path.as_ref();
        let package = DocxPackage::open(path)?;
        let doc = Self::from_package(package, config)?;
        info!(path = %path.display(), "loaded template");
        Ok(doc)
    }

    pub fn from_reader<R: Read + Seek>(reader: R, config: MergeConfig) -> Result<Self> {
        Self::from_package(DocxPackage::read(reader)?, config)
    }

    pub fn from_package(package: DocxPackage, config: MergeConfig) -> Result<Self> {
        let mut relations = RelationLedger::default();
        let mut headers = load_indexed(&package, parts::header_name, &mut relations)?;
        let mut footers = load_indexed(&package, parts::footer_name, &mut relations)?;

        let content_types = ContentTypes {
            name: CONTENT_TYPES_PART.to_string(),
            xml: package.read_text(CONTENT_TYPES_PART)?.unwrap_or_default(),
        };
        let main_part_name = parts::main_part_name(&content_types.xml);
        let mut main_part = package
            .read_text(&main_part_name)?
            .ok_or_else(|| DocxError::MissingMainPart(main_part_name.clone()))?;
        relations.insert_loaded(&main_part_name, read_rels(&package, &main_part_name)?);

        let settings_part = package.read_text(SETTINGS_PART)?;
        if settings_part.is_some() {
            relations.insert_loaded(SETTINGS_PART, read_rels(&package, SETTINGS_PART)?);
        }

        let scan = MergeConfig {
            placeholder_prefix: partial_escape(&config.placeholder_prefix).into_owned(),
            placeholder_suffix: partial_escape(&config.placeholder_suffix).into_owned(),
            ..config.clone()
        };
        main_part = repair_split_placeholders(
            &main_part,
            &scan.placeholder_prefix,
            &scan.placeholder_suffix,
        );
        if config.repair_headers_footers {
            for text in headers.values_mut().chain(footers.values_mut()) {
                *text = repair_split_placeholders(
                    text,
                    &scan.placeholder_prefix,
                    &scan.placeholder_suffix,
                );
            }
        }

        debug!(
            main = %main_part_name,
            headers = headers.len(),
            footers = footers.len(),
            "parsed package"
        );
        Ok(Self {
            package,
            config,
            scan,
            main_part_name,
            main_part,
            headers,
            footers,
            settings_part_name: SETTINGS_PART.to_string(),
            settings_part,
            content_types,
            relations,
            images: Vec::new(),
        })
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn main_part_name(&self) -> &str {
        &self.main_part_name
    }

    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    pub fn header(&self, index: u32) -> Option<&str> {
        self.headers.get(&index).map(String::as_str)
    }

    pub fn footer(&self, index: u32) -> Option<&str> {
        self.footers.get(&index).map(String::as_str)
    }

    pub fn settings_part(&self) -> Option<&str> {
        self.settings_part.as_deref()
    }

    pub fn content_types(&self) -> &str {
        &self.content_types.xml
    }

    /// Relationship XML of `part`, if it has any.
    pub fn relations(&self, part: &str) -> Option<&str> {
        self.relations.get(part)
    }

    pub fn image_injections(&self) -> impl Iterator<Item = &ImageInjection> {
        self.images.iter()
    }

    /// Names of every placeholder in the main part, headers and footers, first occurrence first.
    pub fn placeholders(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for text in self.text_parts() {
            for name in self.placeholder_names(text) {
                if seen.insert(name.clone()) {
                    out.push(name);
                }
            }
        }
        out
    }

    pub fn set_value(&mut self, name: &str, value: &str) -> Result<usize> {
        self.set_values([(name, value)])
    }

    /// Replaces every `<prefix>name<suffix>` with its value in the main part, headers and
    /// footers. Returns the number of replacements.
    ///
    /// All pairs are escaped before anything is replaced, so an encoding error leaves the
    /// document untouched. Inserted values are never rescanned for other placeholders.
    pub fn set_values<I, K, V>(&mut self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table: Vec<(String, String)> = Vec::new();
        for (name, value) in values {
            let token = encode_text(&self.config.delimit(name.as_ref()))?;
            let value = encode_text(value.as_ref())?;
            match table.iter_mut().find(|(t, _)| *t == token) {
                Some(entry) => entry.1 = value,
                None => table.push((token, value)),
            }
        }
        table.retain(|(token, _)| !token.is_empty());
        if table.is_empty() {
            return Ok(0);
        }
        table.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let mut total = replace_tokens(&mut self.main_part, &table);
        for text in self.headers.values_mut().chain(self.footers.values_mut()) {
            total += replace_tokens(text, &table);
        }
        debug!(pairs = table.len(), replaced = total, "set values");
        Ok(total)
    }

    /// Duplicates the table row holding `mark` `n` times; each copy's placeholders get a
    /// `#i` suffix (0-based), so `name#0`, `name#1`, ... can then be set individually.
    pub fn clone_row(&mut self, mark: &str, n: usize) -> Result<()> {
        let mark = partial_escape(&self.config.ensure_delimited(mark)).into_owned();
        self.main_part = table::clone_row(&self.main_part, &mark, n, &self.scan)?;
        debug!(%mark, copies = n, "cloned row");
        Ok(())
    }

    /// Clones the row holding `mark` once per entry of `rows` and fills copy `i` with the
    /// `field -> value` pairs of the i-th row.
    pub fn clone_row_with_values<I, R, K, V>(&mut self, mark: &str, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut count = 0;
        let mut indexed: Vec<(String, String)> = Vec::new();
        for (i, row) in rows.into_iter().enumerate() {
            for (field, value) in row {
                let name = format!("{}#{i}", field.as_ref());
                encode_text(&name)?;
                encode_text(value.as_ref())?;
                indexed.push((name, value.as_ref().to_string()));
            }
            count = i + 1;
        }
        self.clone_row(mark, count)?;
        self.set_values(indexed)
    }

    /// Puts `image` in place of every `search` / `search:<args>` placeholder of the main part,
    /// headers and footers. Returns the number of placeholders replaced.
    pub fn set_image(&mut self, search: &str, image: &ImageValue) -> Result<usize> {
        let main_name = self.main_part_name.clone();
        let mut main = std::mem::take(&mut self.main_part);
        let mut total = self.inject_image(&main_name, &mut main, search, image);
        self.main_part = main;

        let mut headers = std::mem::take(&mut self.headers);
        for (index, text) in headers.iter_mut() {
            total += self.inject_image(&parts::header_name(*index), text, search, image);
        }
        self.headers = headers;

        let mut footers = std::mem::take(&mut self.footers);
        for (index, text) in footers.iter_mut() {
            total += self.inject_image(&parts::footer_name(*index), text, search, image);
        }
        self.footers = footers;

        if total == 0 {
            warn!(%search, "no image placeholder matched");
        }
        Ok(total)
    }

    fn inject_image(
        &mut self,
        part: &str,
        content: &mut String,
        search: &str,
        image: &ImageValue,
    ) -> usize {
        let names = self.placeholder_names(content);
        let marks: Vec<String> = matching_image_marks(&names, search)
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut injected = 0;
        for mark in marks {
            let token = self.scan.delimit(&mark);
            let (width, height) = image.size_for(&ImageArgs::parse(&mark));
            let rid = self.relations.peek_rid(part);
            let Some(spliced) = splice_drawing(content, &token, &drawing_xml(&rid, width, height))
            else {
                debug!(%part, %mark, "placeholder not enclosed by a tag pair");
                continue;
            };
            *content = spliced;
            self.relations.next_rid(part);

            let target = match self.images.iter().find(|i| i.path == image.path) {
                Some(existing) => existing.target.clone(),
                None => {
                    let target = format!(
                        "image_{}_{}.{}",
                        rid.trim_start_matches("rId"),
                        parts::part_stem(part),
                        image.kind.extension()
                    );
                    self.content_types.add_override(
                        &format!("/{MEDIA_DIR}{target}"),
                        image.kind.content_type(),
                    );
                    target
                }
            };
            self.relations
                .add_image(part, &rid, &target, &mut self.content_types);
            debug!(%part, %mark, %rid, %target, "injected image");

            self.images.push(ImageInjection {
                path: image.path.clone(),
                kind: image.kind,
                width,
                height,
                mark,
                part: part.to_string(),
                target,
                rid,
            });
            injected += 1;
        }
        injected
    }

    /// Writes or replaces `<w:updateFields>` in the settings part. Returns `false` when the
    /// package has no settings part.
    pub fn set_update_fields(&mut self, update: bool) -> bool {
        let Some(settings) = self.settings_part.as_mut() else {
            warn!("package has no settings part; updateFields not set");
            return false;
        };
        let element = format!("<w:updateFields w:val=\"{update}\"/>");
        if UPDATE_FIELDS_RE.is_match(settings) {
            *settings = UPDATE_FIELDS_RE
                .replace(settings, element.as_str())
                .into_owned();
        } else if let Some(pos) = settings.rfind("</w:settings>") {
            settings.insert_str(pos, &element);
        } else {
            warn!("settings part has no closing tag; updateFields not set");
            return false;
        }
        true
    }

    /// Parses every in-memory XML part and reports the first one that is not well-formed.
    pub fn check_well_formed(&self) -> Result<()> {
        check_well_formed(&self.main_part_name, &self.main_part)?;
        for (index, text) in &self.headers {
            check_well_formed(&parts::header_name(*index), text)?;
        }
        for (index, text) in &self.footers {
            check_well_formed(&parts::footer_name(*index), text)?;
        }
        if let Some(settings) = &self.settings_part {
            check_well_formed(&self.settings_part_name, settings)?;
        }
        check_well_formed(&self.content_types.name, &self.content_types.xml)?;
        for (part, rels) in self.relations.iter() {
            check_well_formed(&parts::rels_name(part), rels)?;
        }
        Ok(())
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| DocxError::save(path.display().to_string(), e))?;
        self.write_to(file)?;
        info!(path = %path.display(), "saved document");
        Ok(())
    }

    pub fn save_to_buffer(&self) -> Result<Vec<u8>> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }

    /// Writes the archive: original entries verbatim except the rewritten parts, each part's
    /// relationship file right after it, then injected media.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let header_names: Vec<(String, &String)> = self
            .headers
            .iter()
            .map(|(i, t)| (parts::header_name(*i), t))
            .chain(self.footers.iter().map(|(i, t)| (parts::footer_name(*i), t)))
            .collect();
        let rels: Vec<(&str, String, &str)> = self
            .relations
            .iter()
            .map(|(part, xml)| (part, parts::rels_name(part), xml))
            .collect();
        let media = self.read_media()?;

        let mut plan = WritePlan::default();
        for (name, text) in &header_names {
            plan.replacements.insert(name.clone(), text.as_bytes());
        }
        if let Some(settings) = &self.settings_part {
            plan.replacements
                .insert(self.settings_part_name.clone(), settings.as_bytes());
        }
        plan.replacements
            .insert(self.main_part_name.clone(), self.main_part.as_bytes());
        if !self.content_types.xml.is_empty() {
            plan.replacements
                .insert(self.content_types.name.clone(), self.content_types.xml.as_bytes());
        }

        for ent in &self.package.entries {
            if let Some(owner) = parts::part_for_rels(&ent.name) {
                if owner != ent.name && self.relations.contains(&owner) {
                    plan.skip.insert(ent.name.clone());
                }
            }
        }
        for (part, rels_name, xml) in &rels {
            plan.followers
                .entry(part.to_string())
                .or_default()
                .push(ExtraEntry {
                    name: rels_name.clone(),
                    data: xml.as_bytes(),
                });
        }
        for (name, data) in &media {
            plan.appended.push(ExtraEntry {
                name: name.clone(),
                data: data.as_slice(),
            });
        }

        self.package.write_to(writer, &plan)
    }

    /// Bytes of every distinct injected media file, keyed by archive path.
    fn read_media(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let mut targets: BTreeMap<&str, &Path> = BTreeMap::new();
        for inj in &self.images {
            targets.entry(inj.target.as_str()).or_insert(inj.path.as_path());
        }
        let mut out = Vec::with_capacity(targets.len());
        for (target, path) in targets {
            let name = format!("{MEDIA_DIR}{target}");
            let data = std::fs::read(path).map_err(|e| DocxError::save(name.clone(), e))?;
            out.push((name, data));
        }
        Ok(out)
    }

    fn text_parts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.main_part.as_str())
            .chain(self.headers.values().map(String::as_str))
            .chain(self.footers.values().map(String::as_str))
    }

    fn placeholder_names(&self, text: &str) -> Vec<String> {
        self.scan
            .placeholder_regex()
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .collect()
    }
}

fn load_indexed(
    package: &DocxPackage,
    name_of: fn(u32) -> String,
    relations: &mut RelationLedger,
) -> Result<BTreeMap<u32, String>> {
    let mut out = BTreeMap::new();
    let mut index = 1;
    loop {
        let name = name_of(index);
        let Some(text) = package.read_text(&name)? else {
            break;
        };
        if !text.is_empty() {
            relations.insert_loaded(&name, read_rels(package, &name)?);
        }
        out.insert(index, text);
        index += 1;
    }
    Ok(out)
}

fn read_rels(package: &DocxPackage, part: &str) -> Result<String> {
    Ok(package
        .read_text(&parts::rels_name(part))?
        .unwrap_or_default())
}

/// Single left-to-right pass replacing every token of `table` (longest first) in `text`.
fn replace_tokens(text: &mut String, table: &[(String, String)]) -> usize {
    let mut firsts: Vec<u8> = table.iter().map(|(t, _)| t.as_bytes()[0]).collect();
    firsts.sort_unstable();
    firsts.dedup();

    let mut out = String::with_capacity(text.len());
    let mut count = 0;
    let mut rest = text.as_str();
    'scan: while let Some(pos) = rest.bytes().position(|b| firsts.binary_search(&b).is_ok()) {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);
        for (token, value) in table {
            if let Some(after) = tail.strip_prefix(token.as_str()) {
                out.push_str(value);
                count += 1;
                rest = after;
                continue 'scan;
            }
        }
        let step = tail.chars().next().map_or(1, char::len_utf8);
        out.push_str(&tail[..step]);
        rest = &tail[step..];
    }
    if count > 0 {
        out.push_str(rest);
        *text = out;
    }
    count
}
