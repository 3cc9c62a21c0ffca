use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{DocxError, Result};

/// Every entry of a .docx archive, fully buffered.
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

/// Entries to add after the original ones.
pub struct ExtraEntry<'a> {
    pub name: String,
    pub data: &'a [u8],
}

/// How [`DocxPackage::write_to`] rewrites the archive.
#[derive(Default)]
pub struct WritePlan<'a> {
    /// New content for an existing entry.
    pub replacements: HashMap<String, &'a [u8]>,
    /// Entries written right after the named entry (e.g. its relationship file).
    pub followers: HashMap<String, Vec<ExtraEntry<'a>>>,
    /// Original entries to leave out.
    pub skip: HashSet<String>,
    /// Entries appended at the end of the archive.
    pub appended: Vec<ExtraEntry<'a>>,
}

impl DocxPackage {
    pub fn open(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|source| DocxError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read(f)
    }

    pub fn read<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut zip = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(zip::result::ZipError::from)?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Content of `name` as text; `Ok(None)` when the entry does not exist.
    pub fn read_text(&self, name: &str) -> Result<Option<String>> {
        match self.entry(name) {
            None => Ok(None),
            Some(ent) => String::from_utf8(ent.data.clone())
                .map(Some)
                .map_err(|_| DocxError::PartEncoding {
                    part: name.to_string(),
                }),
        }
    }

    pub fn write_to<W: Write + Seek>(&self, writer: W, plan: &WritePlan<'_>) -> Result<W> {
        let mut zout = ZipWriter::new(writer);
        for ent in &self.entries {
            if plan.skip.contains(&ent.name) {
                continue;
            }
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .map_err(|e| DocxError::save(&ent.name, e))?;
                continue;
            }
            let data = plan
                .replacements
                .get(&ent.name)
                .copied()
                .unwrap_or(ent.data.as_slice());
            write_entry(&mut zout, &ent.name, data, opts)?;

            if let Some(followers) = plan.followers.get(&ent.name) {
                let opts = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .last_modified_time(ent.last_modified);
                for extra in followers {
                    write_entry(&mut zout, &extra.name, extra.data, opts)?;
                }
            }
        }

        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for extra in &plan.appended {
            write_entry(&mut zout, &extra.name, extra.data, opts)?;
        }
        zout.finish().map_err(|e| DocxError::save("<archive>", e))
    }
}

fn write_entry<W: Write + Seek>(
    zout: &mut ZipWriter<W>,
    name: &str,
    data: &[u8],
    opts: SimpleFileOptions,
) -> Result<()> {
    zout.start_file(name, opts)
        .map_err(|e| DocxError::save(name, e))?;
    zout.write_all(data).map_err(|e| DocxError::save(name, e))?;
    Ok(())
}
