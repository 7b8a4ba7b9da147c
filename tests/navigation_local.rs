/*!
 * Integration tests for browsing a real directory tree
 */

use std::fs;
use std::io;
use std::sync::Arc;

use filetime::{set_file_mtime, FileTime};
use tempfile::{tempdir, TempDir};

use filenav::navigation::NoopNavigationListener;
use filenav::path;
use filenav::{
    AccessMode, DirectoryChange, NavigationView, Session, Settings, SortMode, StorageVolume,
    TaskState,
};

fn root_of(dir: &TempDir) -> String {
    path::normalize(&dir.path().to_string_lossy())
}

fn view(session: &Arc<Session>) -> NavigationView {
    NavigationView::new("pane", Arc::clone(session), Arc::new(NoopNavigationListener))
}

fn names(view: &NavigationView) -> Vec<String> {
    view.files().iter().map(|f| f.name.clone()).collect()
}

#[test]
fn test_listing_sorted_with_parent_first() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    fs::create_dir(temp.path().join("zeta"))?;
    fs::create_dir(temp.path().join("Alpha"))?;
    fs::write(temp.path().join("b.txt"), "b")?;
    fs::write(temp.path().join("A.txt"), "a")?;
    fs::write(temp.path().join(".hidden"), "h")?;

    let session = Session::builder().build();
    let mut pane = view(&session);
    pane.change_current_dir(DirectoryChange::to(&root)).unwrap();
    assert_eq!(pane.wait_idle().unwrap(), TaskState::Loaded);

    assert_eq!(names(&pane), vec!["..", "Alpha", "zeta", "A.txt", "b.txt"]);
    assert_eq!(pane.current_dir(), Some(root.as_str()));
    Ok(())
}

#[test]
fn test_date_sort_and_settings_refresh() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    for (name, secs) in [("old.txt", 1_000_000), ("new.txt", 3_000_000), ("mid.txt", 2_000_000)] {
        let file = temp.path().join(name);
        fs::write(&file, name)?;
        set_file_mtime(&file, FileTime::from_unix_time(secs, 0))?;
    }

    let session = Session::builder()
        .settings(Settings {
            sort_mode: SortMode::DateDesc,
            ..Settings::default()
        })
        .build();
    let mut pane = view(&session);
    pane.change_current_dir(DirectoryChange::to(&root)).unwrap();
    pane.wait_idle().unwrap();
    assert_eq!(names(&pane), vec!["..", "new.txt", "mid.txt", "old.txt"]);

    session.update_settings(Settings {
        sort_mode: SortMode::DateAsc,
        show_hidden: true,
        ..Settings::default()
    });
    pane.on_settings_changed().unwrap();
    pane.wait_idle().unwrap();
    assert_eq!(names(&pane), vec!["..", "old.txt", "mid.txt", "new.txt"]);
    Ok(())
}

#[test]
fn test_browse_down_and_back() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    fs::create_dir_all(temp.path().join("a/b"))?;

    let session = Session::builder().build();
    let mut pane = view(&session);
    for dir in [root.clone(), path::join(&root, "a"), path::join(&root, "a/b")] {
        pane.change_current_dir(DirectoryChange::to(&dir).add_to_history())
            .unwrap();
        pane.wait_idle().unwrap();
    }
    assert_eq!(pane.history().len(), 2);

    fs::remove_dir(temp.path().join("a/b"))?;
    pane.refresh().unwrap();
    assert_eq!(pane.wait_idle().unwrap(), TaskState::Failed);
    assert!(pane.can_retry());

    assert!(pane.back().unwrap());
    pane.wait_idle().unwrap();
    assert_eq!(pane.current_dir(), Some(path::join(&root, "a").as_str()));
    assert_eq!(names(&pane), vec![".."]);
    Ok(())
}

#[test]
fn test_sandbox_stays_inside_volume() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    fs::create_dir(temp.path().join("inner"))?;

    let session = Session::builder()
        .settings(Settings {
            access_mode: AccessMode::Safe,
            ..Settings::default()
        })
        .volume(StorageVolume::new(&root))
        .build();
    let mut pane = view(&session);

    pane.change_current_dir(DirectoryChange::to("/")).unwrap();
    pane.wait_idle().unwrap();
    assert_eq!(pane.current_dir(), Some(root.as_str()));
    assert_eq!(names(&pane), vec!["inner"]);

    pane.change_current_dir(DirectoryChange::to(&path::join(&root, "inner/../..")))
        .unwrap();
    pane.wait_idle().unwrap();
    assert_eq!(pane.current_dir(), Some(root.as_str()));
    Ok(())
}
