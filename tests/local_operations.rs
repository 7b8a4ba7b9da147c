/*!
 * Integration tests for file operations on the local filesystem
 */

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use filenav::commands;
use filenav::operations::{FileOperations, NoopListener, OperationStatus};
use filenav::path;
use filenav::prompt::AutoPrompt;
use filenav::session::Session;
use filenav::task::CancellationToken;
use filenav::{FileSystemObject, NavError};

fn root_of(dir: &TempDir) -> String {
    path::normalize(&dir.path().to_string_lossy())
}

fn session(yes: bool) -> Arc<Session> {
    let prompt = if yes { AutoPrompt::yes() } else { AutoPrompt::no() };
    Session::builder().prompt(Arc::new(prompt)).build()
}

fn operations(session: &Arc<Session>) -> FileOperations {
    FileOperations::new(Arc::clone(session), Arc::new(NoopListener))
}

fn write(base: &Path, rel: &str, content: &str) -> io::Result<()> {
    let target = base.join(rel);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, content)
}

#[test]
fn test_copy_directory_tree() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    write(temp.path(), "photos/2024/a.jpg", "a")?;
    write(temp.path(), "photos/2024/b.jpg", "bb")?;
    fs::create_dir(temp.path().join("backup"))?;

    let session = session(true);
    let photos = commands::stat(&session, &path::join(&root, "photos")).unwrap();
    let report = operations(&session)
        .copy(&[photos], &path::join(&root, "backup"))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(report.status, OperationStatus::Completed);
    assert_eq!(
        fs::read_to_string(temp.path().join("backup/photos/2024/b.jpg"))?,
        "bb"
    );
    assert!(temp.path().join("photos/2024/a.jpg").exists());
    Ok(())
}

#[test]
fn test_move_replaces_existing_directory() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    write(temp.path(), "docs/new.txt", "new")?;
    write(temp.path(), "archive/docs/stale.txt", "stale")?;

    let session = session(true);
    let docs = commands::stat(&session, &path::join(&root, "docs")).unwrap();
    let report = operations(&session)
        .move_files(&[docs], &path::join(&root, "archive"))
        .unwrap()
        .wait()
        .unwrap();

    assert!(report.is_success());
    assert!(!temp.path().join("docs").exists());
    assert!(temp.path().join("archive/docs/new.txt").exists());
    assert!(!temp.path().join("archive/docs/stale.txt").exists());
    Ok(())
}

#[test]
fn test_declined_overwrite_keeps_destination() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    write(temp.path(), "a.txt", "mine")?;
    write(temp.path(), "out/a.txt", "theirs")?;

    let session = session(false);
    let a = commands::stat(&session, &path::join(&root, "a.txt")).unwrap();
    let report = operations(&session)
        .copy(&[a], &path::join(&root, "out"))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(report.status, OperationStatus::Declined);
    assert_eq!(fs::read_to_string(temp.path().join("out/a.txt"))?, "theirs");
    Ok(())
}

#[test]
fn test_rename_and_duplicate() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    write(temp.path(), "draft.md", "# notes")?;

    let session = session(true);
    let draft = commands::stat(&session, &path::join(&root, "draft.md")).unwrap();
    operations(&session)
        .rename(&draft, "notes.md")
        .unwrap()
        .wait()
        .unwrap();
    assert!(!temp.path().join("draft.md").exists());

    let notes = commands::stat(&session, &path::join(&root, "notes.md")).unwrap();
    for _ in 0..2 {
        let report = operations(&session)
            .create_duplicate(&notes)
            .unwrap()
            .wait()
            .unwrap();
        assert!(report.is_success());
    }
    assert!(temp.path().join("notes (1).md").exists());
    assert!(temp.path().join("notes (2).md").exists());
    Ok(())
}

#[test]
fn test_rename_rejects_bad_names() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    write(temp.path(), "a.txt", "a")?;

    let session = session(true);
    let a = commands::stat(&session, &path::join(&root, "a.txt")).unwrap();
    for bad in ["", "..", "x/y"] {
        assert!(matches!(
            operations(&session).rename(&a, bad),
            Err(NavError::InvalidArgument(_))
        ));
    }
    assert!(matches!(
        operations(&session).rename(&a, "a.txt"),
        Err(NavError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn test_copy_into_itself_is_refused() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    fs::create_dir_all(temp.path().join("music/rock"))?;

    let session = session(true);
    let music = FileSystemObject::directory(&path::join(&root, "music"));
    assert!(matches!(
        operations(&session).copy(&[music], &path::join(&root, "music/rock")),
        Err(NavError::Consistency(_))
    ));
    Ok(())
}

#[test]
fn test_delete_and_find() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    write(temp.path(), "logs/app.log", "x")?;
    write(temp.path(), "logs/old/APP.LOG", "y")?;
    write(temp.path(), "readme.txt", "z")?;

    let session = session(true);
    let search = commands::find(&session, &root, "*.log", &CancellationToken::new()).unwrap();
    let mut names: Vec<&str> = search.results.iter().map(|f| f.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["APP.LOG", "app.log"]);

    let logs = commands::stat(&session, &path::join(&root, "logs")).unwrap();
    let report = operations(&session)
        .delete(&[logs])
        .unwrap()
        .wait()
        .unwrap();
    assert!(report.is_success());
    assert!(!temp.path().join("logs").exists());
    assert!(!commands::exists(&session, &path::join(&root, "logs")).unwrap());
    Ok(())
}

#[test]
fn test_trailing_space_names_survive_listing_and_copy() -> io::Result<()> {
    let temp = tempdir()?;
    let root = root_of(&temp);
    write(temp.path(), "note ", "spaced")?;
    fs::create_dir(temp.path().join("dst"))?;

    let session = session(true);
    let listed = commands::list_files(&session, &root).unwrap();
    let note = listed.iter().find(|f| f.name == "note ").unwrap().clone();
    assert_eq!(note.path, path::join(&root, "note "));

    let report = operations(&session)
        .copy(&[note], &path::join(&root, "dst"))
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(report.status, OperationStatus::Completed);
    assert_eq!(fs::read_to_string(temp.path().join("dst/note "))?, "spaced");
    Ok(())
}
