/*!
 * Names for duplicated files
 */

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::path;
use crate::types::FileSystemObject;

/// A stem already carrying a copy counter, e.g. `report (2)`
static COPY_COUNTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*) \((\d+)\)$").unwrap());

/// First `name (n).ext` not taken by any sibling
///
/// An existing counter is replaced rather than stacked, so duplicating
/// `report (1).pdf` yields `report (2).pdf`. Directories keep dots in their
/// name untouched.
pub fn create_non_existing_name(fso: &FileSystemObject, siblings: &[FileSystemObject]) -> String {
    let taken: HashSet<&str> = siblings.iter().map(|f| f.name.as_str()).collect();

    let (stem, extension) = if fso.is_directory() {
        (fso.name.as_str(), None)
    } else {
        path::split_extension(&fso.name)
    };
    let (base, mut counter) = match COPY_COUNTER.captures(stem) {
        Some(caps) => (
            caps.get(1).map_or(stem, |m| m.as_str()),
            caps.get(2)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0),
        ),
        None => (stem, 0),
    };

    loop {
        counter += 1;
        let candidate = match extension {
            Some(ext) => format!("{} ({}).{}", base, counter, ext),
            None => format!("{} ({})", base, counter),
        };
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<FileSystemObject> {
        names
            .iter()
            .map(|n| FileSystemObject::file(&path::join("/d", n), 0))
            .collect()
    }

    #[test]
    fn test_first_free_counter() {
        let fso = FileSystemObject::file("/d/a.txt", 1);
        assert_eq!(create_non_existing_name(&fso, &files(&["a.txt"])), "a (1).txt");
        assert_eq!(
            create_non_existing_name(&fso, &files(&["a.txt", "a (1).txt", "a (2).txt"])),
            "a (3).txt"
        );
    }

    #[test]
    fn test_existing_counter_is_bumped() {
        let fso = FileSystemObject::file("/d/report (4).pdf", 1);
        assert_eq!(create_non_existing_name(&fso, &[]), "report (5).pdf");
    }

    #[test]
    fn test_names_without_extension() {
        let hidden = FileSystemObject::file("/d/.bashrc", 1);
        assert_eq!(create_non_existing_name(&hidden, &[]), ".bashrc (1)");

        let dir = FileSystemObject::directory("/d/v1.2");
        assert_eq!(create_non_existing_name(&dir, &[]), "v1.2 (1)");
    }
}
