use crate::config::MergeConfig;
use crate::error::{DocxError, Result};

const ROW_END: &str = "</w:tr>";

/// Byte range `[start, end)` of the `<w:tr>` element enclosing the first occurrence of `mark`.
pub fn find_row(xml: &str, mark: &str) -> Result<(usize, usize)> {
    let offset = xml
        .find(mark)
        .ok_or_else(|| DocxError::MarkNotFound(mark.to_string()))?;
    let head = &xml[..offset];
    let start = [head.rfind("<w:tr>"), head.rfind("<w:tr ")]
        .into_iter()
        .flatten()
        .max()
        .ok_or_else(|| DocxError::RowNotFound(mark.to_string()))?;
    if head[start..].contains(ROW_END) {
        return Err(DocxError::RowNotFound(mark.to_string()));
    }
    let end = xml[offset..]
        .find(ROW_END)
        .map(|i| offset + i + ROW_END.len())
        .ok_or_else(|| DocxError::RowNotFound(mark.to_string()))?;
    Ok((start, end))
}

/// `n` copies of `row`, every placeholder `P` of copy `i` rewritten to `P#i`.
pub fn index_cloned_row(row: &str, n: usize, config: &MergeConfig) -> String {
    let prefix = &config.placeholder_prefix;
    let suffix = &config.placeholder_suffix;
    let re = config.placeholder_regex();

    let mut out = String::with_capacity(row.len() * n + n * 4);
    for i in 0..n {
        let copy = re.replace_all(row, |caps: &regex::Captures<'_>| {
            format!("{prefix}{}#{i}{suffix}", &caps[1])
        });
        out.push_str(&copy);
    }
    out
}

/// Replaces the row holding `mark` with `n` indexed copies of itself.
pub fn clone_row(xml: &str, mark: &str, n: usize, config: &MergeConfig) -> Result<String> {
    let (start, end) = find_row(xml, mark)?;
    let cloned = index_cloned_row(&xml[start..end], n, config);
    let mut out = String::with_capacity(xml.len() - (end - start) + cloned.len());
    out.push_str(&xml[..start]);
    out.push_str(&cloned);
    out.push_str(&xml[end..]);
    Ok(out)
}
