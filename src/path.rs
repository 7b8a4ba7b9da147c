//! Path helpers
//!
//! Paths handled by the engine are plain `/`-separated strings, absolute and
//! normalized: no `.`/`..` segments, no duplicate or trailing separators,
//! `/` for the filesystem root.

/// Filesystem root
pub const ROOT: &str = "/";

/// Normalizes a path: resolves `.`/`..`, collapses separators and ensures a
/// leading slash. Empty or fully collapsed input yields `/`.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            if let Some(idx) = out.rfind('/') {
                out.truncate(idx);
            }
            continue;
        }
        out.push('/');
        out.push_str(segment);
    }

    if out.is_empty() {
        ROOT.to_string()
    } else {
        out
    }
}

/// Whether `path` is the filesystem root
pub fn is_root(path: &str) -> bool {
    path == ROOT
}

/// Parent of a normalized path, `None` for the root
pub fn parent(path: &str) -> Option<String> {
    if is_root(path) {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT.to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Last segment of a normalized path (`/` for the root)
pub fn file_name(path: &str) -> &str {
    if is_root(path) {
        return ROOT;
    }
    path.rsplit('/').next().unwrap_or(path)
}

/// Joins a child name onto a normalized directory
pub fn join(dir: &str, name: &str) -> String {
    if is_root(dir) {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Whether `path` is `ancestor` or lives below it
pub fn is_descendant_or_self(path: &str, ancestor: &str) -> bool {
    if is_root(ancestor) {
        return path.starts_with('/');
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Whether `path` lives strictly below `ancestor`
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path != ancestor && is_descendant_or_self(path, ancestor)
}

/// Re-roots `path` from the `from` prefix onto `to`
///
/// Returns `None` when `path` is not below `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_descendant_or_self(path, from) {
        return None;
    }
    let rest = if is_root(from) {
        &path[1..]
    } else {
        path[from.len()..].trim_start_matches('/')
    };
    if rest.is_empty() {
        Some(to.to_string())
    } else {
        Some(join(to, rest))
    }
}

/// Splits a file name into stem and extension
///
/// Hidden files without a further dot have no extension (`.bashrc`).
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(idx) if idx + 1 == name.len() => (name, None),
        Some(idx) => (&name[..idx], Some(&name[idx + 1..])),
    }
}

/// Whether `name` can be used as a single path segment
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\0')
}
