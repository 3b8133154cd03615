//! Prefix/delimiter listing by walking the vault tree.
//!
//! Cost is proportional to the size of the subtree implied by the prefix;
//! there is no index to consult.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::Result;
use crate::key::{ObjectKey, RESERVED_SEGMENT};
use crate::store::ObjectMeta;

/// Page size used when the caller does not ask for one (and the upper bound).
pub const DEFAULT_MAX_KEYS: usize = 1000;

#[derive(Debug, Clone)]
pub struct ListQuery {
    pub prefix: String,
    pub delimiter: Option<String>,
    /// Only entries sorting strictly after this are returned.
    pub start_after: Option<String>,
    pub max_keys: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            delimiter: None,
            start_after: None,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// Last key or common prefix returned, set when the page is truncated.
    pub next_marker: Option<String>,
}

pub(crate) fn list(root: &Path, query: &ListQuery) -> Result<ListPage> {
    let mut entries = Vec::new();

    // start from the deepest directory the prefix pins down
    let base = match query.prefix.rfind('/') {
        Some(idx) => &query.prefix[..=idx],
        None => "",
    };
    let start = match base.strip_suffix('/') {
        None => root.to_path_buf(),
        // a directory no key can live under matches nothing
        Some(dir) => match ObjectKey::parse(dir) {
            Ok(dir) => root.join(dir.to_relative_path()),
            Err(_) => return Ok(ListPage::default()),
        },
    };
    if start.is_dir() {
        walk(&start, base, &query.prefix, &mut entries)?;
    }

    entries.retain(|(key, _)| {
        key.starts_with(&query.prefix)
            && query
                .start_after
                .as_deref()
                .map_or(true, |after| key.as_str() > after)
    });
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut page = ListPage::default();
    if query.max_keys == 0 {
        return Ok(page);
    }

    let mut emitted = 0usize;
    let mut last_emitted: Option<String> = None;

    for (key, metadata) in entries {
        let rolled_up = query.delimiter.as_deref().and_then(|delimiter| {
            let rest = &key[query.prefix.len()..];
            rest.find(delimiter)
                .map(|idx| format!("{}{}", query.prefix, &rest[..idx + delimiter.len()]))
        });

        if let Some(common_prefix) = &rolled_up {
            if last_emitted.as_deref() == Some(common_prefix.as_str()) {
                continue;
            }
            // a marker equal to (or past) the group means the group was already returned
            if let Some(after) = query.start_after.as_deref() {
                if common_prefix.as_str() <= after {
                    continue;
                }
            }
        }

        if emitted == query.max_keys {
            page.is_truncated = true;
            page.next_marker = last_emitted;
            break;
        }

        match rolled_up {
            Some(common_prefix) => {
                page.common_prefixes.push(common_prefix.clone());
                last_emitted = Some(common_prefix);
            }
            None => {
                let Some(object_key) = ObjectKey::parse(&key).ok() else {
                    continue;
                };
                page.objects.push(ObjectMeta::from_fs(object_key, &metadata));
                last_emitted = Some(key);
            }
        }
        emitted += 1;
    }

    Ok(page)
}

/// Collect every regular file below `dir`, keyed by its object key.
///
/// `dir_key` is the key prefix of `dir` itself (empty or ending in `/`).
/// Subdirectories that cannot contain keys matching `prefix` are skipped.
fn walk(
    dir: &Path,
    dir_key: &str,
    prefix: &str,
    out: &mut Vec<(String, fs::Metadata)>,
) -> io::Result<()> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        // raced with a delete pruning the directory
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    for entry in read_dir {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if dir_key.is_empty() && name == RESERVED_SEGMENT {
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let child_key = format!("{dir_key}{name}/");
            if child_key.starts_with(prefix) || prefix.starts_with(&child_key) {
                walk(&entry.path(), &child_key, prefix, out)?;
            }
        } else if file_type.is_file() {
            let key = format!("{dir_key}{name}");
            match entry.metadata() {
                Ok(metadata) => out.push((key, metadata)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}
