use std::path::{Path, PathBuf};

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;

pub const DEFAULT_PREFIX: &str = "{{";
pub const DEFAULT_SUFFIX: &str = "}}";

/// Placeholder delimiters and load-time options of a [`crate::Docx`].
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct MergeConfig {
    #[serde(default = "default_prefix", alias = "prefix")]
    pub placeholder_prefix: String,
    #[serde(default = "default_suffix", alias = "suffix")]
    pub placeholder_suffix: String,

    /// Also rejoin split placeholders in header and footer parts at load time.
    ///
    /// Off by default: only the main document part is repaired.
    #[serde(default)]
    pub repair_headers_footers: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            placeholder_prefix: default_prefix(),
            placeholder_suffix: default_suffix(),
            repair_headers_footers: false,
        }
    }
}

impl MergeConfig {
    pub fn with_delimiters(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            placeholder_prefix: prefix.into(),
            placeholder_suffix: suffix.into(),
            ..Self::default()
        }
    }

    /// Wraps `name` in the configured delimiters.
    pub fn delimit(&self, name: &str) -> String {
        let mut out = String::with_capacity(
            self.placeholder_prefix.len() + name.len() + self.placeholder_suffix.len(),
        );
        out.push_str(&self.placeholder_prefix);
        out.push_str(name);
        out.push_str(&self.placeholder_suffix);
        out
    }

    /// Returns `mark` unchanged if it is already delimited, else delimits it.
    pub fn ensure_delimited(&self, mark: &str) -> String {
        if mark.starts_with(&self.placeholder_prefix) && mark.ends_with(&self.placeholder_suffix) {
            mark.to_string()
        } else {
            self.delimit(mark)
        }
    }

    /// Lazy `<prefix>(.*?)<suffix>` matcher; group 1 is the placeholder name.
    pub fn placeholder_regex(&self) -> Regex {
        Regex::new(&format!(
            "{}(.*?){}",
            regex::escape(&self.placeholder_prefix),
            regex::escape(&self.placeholder_suffix)
        ))
        .expect("escaped placeholder regex")
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_suffix() -> String {
    DEFAULT_SUFFIX.to_string()
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub placeholders: MergeConfig,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct OutputSection {
    /// Ask Word to refresh fields (TOC, page refs) when the result is opened.
    #[serde(default)]
    pub update_fields: Option<bool>,

    /// Parse every rewritten part before saving and refuse to write malformed XML.
    #[serde(default)]
    pub check_xml: Option<bool>,
}

pub const CONFIG_FILENAME: &str = "docx-merge.toml";
pub const CONFIG_ENV: &str = "DOCX_MERGE_CONFIG";

pub fn find_file_upwards(start: &Path, filename: &str, max_depth: usize) -> Option<PathBuf> {
    let mut dir = Some(start);
    for _ in 0..=max_depth {
        let d = dir?;
        let cand = d.join(filename);
        if cand.is_file() {
            return Some(cand);
        }
        dir = d.parent();
    }
    None
}

pub fn find_default_config() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        let p = PathBuf::from(p);
        if p.is_file() {
            return Some(p);
        }
    }
    let cwd = std::env::current_dir().ok()?;
    find_file_upwards(&cwd, CONFIG_FILENAME, 8)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
[placeholders]
prefix = "${"
suffix = "}"

[output]
update_fields = true
"#,
        )
        .expect("parse toml");
        assert_eq!(cfg.placeholders.placeholder_prefix, "${");
        assert_eq!(cfg.placeholders.placeholder_suffix, "}");
        assert!(!cfg.placeholders.repair_headers_footers);
        assert_eq!(cfg.output.update_fields, Some(true));
        assert_eq!(cfg.output.check_xml, None);
    }

    #[test]
    fn empty_toml_is_default() {
        let cfg: AppConfig = toml::from_str("").expect("parse toml");
        assert_eq!(cfg.placeholders, MergeConfig::default());
    }

    #[test]
    fn ensure_delimited_keeps_wrapped_marks() {
        let cfg = MergeConfig::default();
        assert_eq!(cfg.ensure_delimited("row"), "{{row}}");
        assert_eq!(cfg.ensure_delimited("{{row}}"), "{{row}}");
    }

    #[test]
    fn finds_config_in_parent_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(root.path().join(CONFIG_FILENAME), "").expect("write");
        let found = find_file_upwards(&nested, CONFIG_FILENAME, 8).expect("found");
        assert_eq!(found, root.path().join(CONFIG_FILENAME));
    }
}
