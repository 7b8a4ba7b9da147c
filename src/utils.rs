/*!
 * Formatting helpers for filenav
 */

use chrono::{DateTime, Local, Utc};

use crate::types::{FileSystemObject, FsoKind, SpecialKind};

/// Format a human-readable file size
pub fn format_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

/// `ls -l` style type and permission string, e.g. `drwxr-xr-x`
pub fn format_mode(fso: &FileSystemObject) -> String {
    let kind = match &fso.kind {
        FsoKind::Directory | FsoKind::ParentDirectory | FsoKind::RootDirectory { .. } => 'd',
        FsoKind::Symlink { .. } => 'l',
        FsoKind::RegularFile => '-',
        FsoKind::Special(SpecialKind::BlockDevice) => 'b',
        FsoKind::Special(SpecialKind::CharDevice) => 'c',
        FsoKind::Special(SpecialKind::NamedPipe) => 'p',
        FsoKind::Special(SpecialKind::Socket) => 's',
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    for shift in [6, 3, 0] {
        let bits = (fso.mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Modification time in local time, or `-` when unknown
pub fn format_modified(when: Option<DateTime<Utc>>) -> String {
    match when {
        Some(when) => when.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 bytes");
        assert_eq!(format_file_size(2048), "2.00 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_format_mode() {
        assert_eq!(format_mode(&FileSystemObject::directory("/d")), "drwxr-xr-x");
        assert_eq!(format_mode(&FileSystemObject::file("/f", 1)), "-rw-r--r--");
        assert_eq!(format_mode(&FileSystemObject::symlink("/l", None)), "lrwxrwxrwx");
    }

    #[test]
    fn test_unknown_time() {
        assert_eq!(format_modified(None), "-");
    }
}
