use crate::error::{Result, StackError};
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Composite id → tiles, both in sorted order
pub type MosaicGroups = BTreeMap<String, Vec<PathBuf>>;

fn indexing_error(path: &Path, reason: impl Into<String>) -> StackError {
    StackError::Indexing {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Recover the logical id of a tile by dropping its trailing row/column tokens
pub fn composite_id(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| indexing_error(path, "file name is not valid UTF-8"))?;

    let tokens: Vec<&str> = stem.split('-').collect();
    if tokens.len() < 3 {
        return Err(indexing_error(
            path,
            format!("expected <id>-<row>-<col>, found {} dash-delimited token(s)", tokens.len()),
        ));
    }

    let (id_tokens, grid) = tokens.split_at(tokens.len() - 2);
    for token in grid {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(indexing_error(
                path,
                format!("tile offset '{}' is not a number", token),
            ));
        }
    }

    let id = id_tokens.join("-");
    if id.is_empty() {
        return Err(indexing_error(path, "logical id is empty"));
    }
    Ok(id)
}

/// Group an explicit list of tile paths by composite id
pub fn group_tiles<I>(paths: I) -> Result<MosaicGroups>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut groups = MosaicGroups::new();
    for path in paths {
        let id = composite_id(&path)?;
        groups.entry(id).or_default().push(path);
    }
    for tiles in groups.values_mut() {
        tiles.sort();
    }
    Ok(groups)
}

/// Files directly in `dir` matching `pattern`. Glob metacharacters in `dir`
/// itself are matched literally.
pub fn glob_in(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let full_pattern = Path::new(&escaped).join(pattern);
    let full_pattern = full_pattern.to_string_lossy();
    debug!("Listing files matching {}", full_pattern);

    let mut paths = Vec::new();
    for entry in glob::glob(&full_pattern)? {
        let path = entry?;
        if path.is_file() {
            paths.push(path);
        }
    }
    Ok(paths)
}

/// List `dir` with `pattern` and group the matches by composite id
pub fn index_tiles(dir: &Path, pattern: &str) -> Result<MosaicGroups> {
    let paths = glob_in(dir, pattern)?;

    let groups = group_tiles(paths)?;
    info!(
        "Indexed {} tile(s) into {} mosaic group(s) under {}",
        groups.values().map(Vec::len).sum::<usize>(),
        groups.len(),
        dir.display()
    );
    Ok(groups)
}
