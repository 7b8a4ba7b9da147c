/*!
 * Display preferences: listing filters and ordering
 *
 * The ordering is total: two distinct entries never compare equal, so
 * sorting an already sorted listing returns it unchanged.
 */

use std::cmp::Ordering;

use crate::config::{Settings, SortMode};
use crate::types::FileSystemObject;

/// Filter and sort a listing according to `settings`
///
/// In chroot mode hidden, system and symlink entries are always filtered out.
/// The parent marker is never filtered.
pub fn apply_display_prefs(
    files: Vec<FileSystemObject>,
    settings: &Settings,
    chroot: bool,
) -> Vec<FileSystemObject> {
    let show_hidden = settings.show_hidden && !chroot;
    let show_system = settings.show_system && !chroot;
    let show_symlinks = settings.show_symlinks && !chroot;

    let mut files: Vec<FileSystemObject> = files
        .into_iter()
        .filter(|f| {
            f.is_parent_marker()
                || ((show_hidden || !f.is_hidden())
                    && (show_system || !f.is_system())
                    && (show_symlinks || !f.is_symlink()))
        })
        .collect();
    files.sort_by(|a, b| compare(a, b, settings));
    files
}

/// Total order used for listings
pub fn compare(a: &FileSystemObject, b: &FileSystemObject, settings: &Settings) -> Ordering {
    // ".." always leads
    b.is_parent_marker()
        .cmp(&a.is_parent_marker())
        .then_with(|| {
            if settings.directories_first {
                b.is_directory().cmp(&a.is_directory())
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| {
            let key = compare_key(a, b, settings);
            if settings.sort_mode.is_descending() {
                key.reverse()
            } else {
                key
            }
        })
        .then_with(|| compare_names(&a.name, &b.name, settings.case_sensitive_sort))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.path.cmp(&b.path))
}

fn compare_key(a: &FileSystemObject, b: &FileSystemObject, settings: &Settings) -> Ordering {
    match settings.sort_mode {
        SortMode::NameAsc | SortMode::NameDesc => {
            compare_names(&a.name, &b.name, settings.case_sensitive_sort)
        }
        SortMode::DateAsc | SortMode::DateDesc => a.last_modified.cmp(&b.last_modified),
        SortMode::SizeAsc | SortMode::SizeDesc => a.size.cmp(&b.size),
        SortMode::TypeAsc | SortMode::TypeDesc => a.extension().cmp(&b.extension()),
    }
}

fn compare_names(a: &str, b: &str, case_sensitive: bool) -> Ordering {
    if case_sensitive {
        a.cmp(b)
    } else {
        a.to_lowercase().cmp(&b.to_lowercase())
    }
}
