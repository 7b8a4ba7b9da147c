/*!
 * Console executing shell command definitions
 *
 * Each console call becomes one shell script run through `sh -c`, or through
 * the configured elevation wrapper (`su -c` by default) for a privileged
 * console. Listings use `find -printf` with NUL-terminated records so any
 * file name survives the round trip.
 */

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info, warn};

use super::{ensure_in_scope, Console, ConsoleFlags, ConsoleKind};
use crate::config::ShellConfig;
use crate::error::{NavError, Result};
use crate::path;
use crate::types::{FileSystemObject, FsoKind, SpecialKind};

/// type, target type, size, mtime, mode, link target, name
const LIST_FORMAT: &str = "%y\\t%Y\\t%s\\t%T@\\t%m\\t%l\\t%f\\0";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

// Shells report a missing program with this status
const COMMAND_NOT_FOUND_STATUS: i32 = 127;

/// Console running commands through a shell, optionally privileged
#[derive(Debug)]
pub struct ShellConsole {
    config: ShellConfig,
    privileged: bool,
    scope: String,
    flags: ConsoleFlags,
}

impl ShellConsole {
    /// Create a console running with the process' own privileges
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config,
            privileged: false,
            scope: path::ROOT.to_string(),
            flags: ConsoleFlags::default(),
        }
    }

    /// Create a privileged console
    ///
    /// The elevation wrapper is probed once; a wrapper that is missing,
    /// denied or not granting root fails with [`NavError::ConsoleAlloc`].
    pub fn privileged(config: ShellConfig) -> Result<Self> {
        if config.elevation.is_empty() {
            return Err(NavError::ConsoleAlloc(
                "no elevation wrapper configured".to_string(),
            ));
        }
        let console = Self {
            config,
            privileged: true,
            scope: path::ROOT.to_string(),
            flags: ConsoleFlags::default(),
        };

        let uid = console
            .run("id -u", None)
            .map_err(|e| NavError::ConsoleAlloc(format!("elevation probe failed: {}", e)))?;
        let uid = String::from_utf8_lossy(&uid).trim().to_string();
        if uid != "0" {
            return Err(NavError::ConsoleAlloc(format!(
                "elevation wrapper runs as uid {}",
                uid
            )));
        }
        info!("Allocated privileged shell console via {}", console.config.elevation[0]);
        Ok(console)
    }

    /// Program and arguments running `script`
    fn command_line(&self, script: &str) -> (String, Vec<String>) {
        if self.privileged {
            let mut args: Vec<String> = self.config.elevation[1..].to_vec();
            args.push(script.to_string());
            (self.config.elevation[0].clone(), args)
        } else {
            (
                self.config.shell.clone(),
                vec!["-c".to_string(), script.to_string()],
            )
        }
    }

    /// Run one script, returning its stdout
    fn run(&self, script: &str, stdin: Option<&[u8]>) -> Result<Vec<u8>> {
        let (program, args) = self.command_line(script);
        debug!("Running `{}` through {}", script, program);

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => NavError::CommandNotFound(program.clone()),
                std::io::ErrorKind::PermissionDenied => {
                    NavError::InsufficientPermissions(format!("cannot execute {}", program))
                }
                _ => NavError::ExecutionError(format!("Failed to spawn {}: {}", program, e)),
            })?;

        let writer = stdin.map(|data| feed(child.stdin.take(), data.to_vec()));
        let stdout = collect(child.stdout.take());
        let stderr = collect(child.stderr.take());
        let status = self.wait(&mut child, script)?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr.join().unwrap_or_default()).to_string();

        if !status.success() {
            return Err(classify_failure(status, &stderr, script));
        }
        if let Some(writer) = writer {
            writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")))
                .map_err(|e| {
                    NavError::ExecutionError(format!("Failed to write to {}: {}", program, e))
                })?;
        }
        Ok(stdout)
    }

    /// Wait for the child, killing it on cancellation or deadline expiry
    fn wait(&self, child: &mut Child, script: &str) -> Result<ExitStatus> {
        let deadline = Instant::now() + self.config.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if self.flags.check_cancelled().is_err() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(NavError::Cancelled);
            }
            if Instant::now() >= deadline {
                warn!("Command timed out after {:?}: {}", self.config.timeout, script);
                let _ = child.kill();
                let _ = child.wait();
                return Err(NavError::OperationTimeout(script.to_string()));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn list_records(&self, script: &str) -> Result<Vec<String>> {
        let output = self.run(script, None)?;
        Ok(String::from_utf8_lossy(&output)
            .split('\0')
            .filter(|record| !record.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl Console for ShellConsole {
    fn kind(&self) -> ConsoleKind {
        ConsoleKind::Shell
    }

    fn scope(&self) -> &str {
        &self.scope
    }

    fn is_privileged(&self) -> bool {
        self.privileged
    }

    fn is_alive(&self) -> bool {
        self.flags.is_alive()
    }

    fn list_files(&self, dir: &str) -> Result<Vec<FileSystemObject>> {
        ensure_in_scope(&self.scope, dir)?;
        let _busy = self.flags.begin("list")?;
        let script = format!(
            "find {} -mindepth 1 -maxdepth 1 -printf {}",
            quote(dir),
            quote(LIST_FORMAT)
        );
        self.list_records(&script)?
            .iter()
            .map(|record| parse_record(dir, record, false))
            .collect()
    }

    fn stat(&self, target: &str) -> Result<FileSystemObject> {
        ensure_in_scope(&self.scope, target)?;
        let _busy = self.flags.begin("stat")?;
        let script = format!(
            "find {} -maxdepth 0 -printf {}",
            quote(target),
            quote(LIST_FORMAT)
        );
        let records = self.list_records(&script)?;
        let record = records
            .first()
            .ok_or_else(|| NavError::NoSuchFileOrDirectory(target.to_string()))?;
        parse_record(target, record, true)
    }

    fn copy(&self, src: &str, dst: &str) -> Result<()> {
        ensure_in_scope(&self.scope, src)?;
        ensure_in_scope(&self.scope, dst)?;
        let _busy = self.flags.begin("copy")?;
        self.run(&format!("cp -RPpT -- {} {}", quote(src), quote(dst)), None)
            .map(|_| ())
    }

    fn move_file(&self, src: &str, dst: &str) -> Result<()> {
        ensure_in_scope(&self.scope, src)?;
        ensure_in_scope(&self.scope, dst)?;
        let _busy = self.flags.begin("move")?;
        self.run(&format!("mv -fT -- {} {}", quote(src), quote(dst)), None)
            .map(|_| ())
    }

    fn delete(&self, target: &str) -> Result<()> {
        ensure_in_scope(&self.scope, target)?;
        let _busy = self.flags.begin("delete")?;
        // rm -f succeeds on missing paths
        self.stat_exists(target)?;
        self.run(&format!("rm -rf -- {}", quote(target)), None)
            .map(|_| ())
    }

    fn create_directory(&self, target: &str) -> Result<()> {
        ensure_in_scope(&self.scope, target)?;
        let _busy = self.flags.begin("mkdir")?;
        self.run(&format!("mkdir -p -- {}", quote(target)), None)
            .map(|_| ())
    }

    fn read_file(&self, target: &str) -> Result<Vec<u8>> {
        ensure_in_scope(&self.scope, target)?;
        let _busy = self.flags.begin("read")?;
        self.run(&format!("cat -- {}", quote(target)), None)
    }

    fn write_file(&self, target: &str, data: &[u8]) -> Result<()> {
        ensure_in_scope(&self.scope, target)?;
        let _busy = self.flags.begin("write")?;
        self.run(&format!("cat > {}", quote(target)), Some(data))
            .map(|_| ())
    }

    fn cancel(&self) -> bool {
        self.flags.cancel()
    }

    fn dispose(&self) {
        self.flags.dispose();
    }
}

impl ShellConsole {
    fn stat_exists(&self, target: &str) -> Result<()> {
        self.run(&format!("test -e {} -o -L {}", quote(target), quote(target)), None)
            .map(|_| ())
            .map_err(|e| match e {
                NavError::ExecutionError(_) => NavError::NoSuchFileOrDirectory(target.to_string()),
                other => other,
            })
    }
}

/// Drain a pipe on its own thread so the child never blocks on a full pipe
fn collect<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

/// Write `data` to the child's stdin off the waiting thread, closing it after
fn feed<W: Write + Send + 'static>(
    pipe: Option<W>,
    data: Vec<u8>,
) -> thread::JoinHandle<std::io::Result<()>> {
    thread::spawn(move || match pipe {
        Some(mut pipe) => pipe.write_all(&data),
        None => Ok(()),
    })
}

/// Single-quote a word for `sh`
pub(crate) fn quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', "'\\''"))
}

fn classify_failure(status: ExitStatus, stderr: &str, script: &str) -> NavError {
    let message = stderr.trim();
    if status.code() == Some(COMMAND_NOT_FOUND_STATUS) {
        return NavError::CommandNotFound(message.to_string());
    }
    if message.contains("Permission denied") || message.contains("Operation not permitted") {
        return NavError::InsufficientPermissions(message.to_string());
    }
    if message.contains("No such file or directory") {
        return NavError::NoSuchFileOrDirectory(message.to_string());
    }
    NavError::ExecutionError(format!("`{}` exited with {}: {}", script, status, message))
}

/// Parse one `find -printf` record
///
/// `location` is the listed directory, or the stat target itself when
/// `is_stat` is set.
pub(crate) fn parse_record(location: &str, record: &str, is_stat: bool) -> Result<FileSystemObject> {
    let invalid = || NavError::InvalidCommandDefinition(format!("unparsable record: {:?}", record));
    let fields: Vec<&str> = record.splitn(7, '\t').collect();
    if fields.len() != 7 {
        return Err(invalid());
    }
    let (kind, target_kind, size, mtime, mode, link, name) = (
        fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6],
    );

    let full_path = if is_stat {
        path::normalize(location)
    } else {
        path::join(location, name)
    };
    let size: u64 = size.parse().map_err(|_| invalid())?;
    let mode = u32::from_str_radix(mode, 8).map_err(|_| invalid())?;
    let modified = parse_mtime(mtime).ok_or_else(invalid)?;

    let mut fso = match kind {
        "d" => FileSystemObject::directory(&full_path),
        "f" => FileSystemObject::file(&full_path, size),
        "l" => {
            let parent = path::parent(&full_path).unwrap_or_else(|| path::ROOT.to_string());
            let target_path = if link.starts_with('/') {
                path::normalize(link)
            } else {
                path::normalize(&path::join(&parent, link))
            };
            let target = match target_kind {
                "d" => Some(FileSystemObject::directory(&target_path)),
                "N" | "L" | "?" => None,
                _ => Some(FileSystemObject::file(&target_path, 0)),
            };
            FileSystemObject::symlink(&full_path, target)
        }
        "b" => special(&full_path, SpecialKind::BlockDevice),
        "c" => special(&full_path, SpecialKind::CharDevice),
        "p" => special(&full_path, SpecialKind::NamedPipe),
        "s" => special(&full_path, SpecialKind::Socket),
        _ => return Err(invalid()),
    };
    fso.size = if fso.is_directory() && !fso.is_symlink() { 0 } else { size };
    fso.mode = mode;
    fso.last_modified = Some(modified);
    Ok(fso)
}

fn special(full_path: &str, kind: SpecialKind) -> FileSystemObject {
    FileSystemObject {
        kind: FsoKind::Special(kind),
        ..FileSystemObject::file(full_path, 0)
    }
}

fn parse_mtime(raw: &str) -> Option<DateTime<Utc>> {
    let (secs, fraction) = raw.split_once('.').unwrap_or((raw, "0"));
    let secs: i64 = secs.parse().ok()?;
    let digits: String = fraction.chars().take(9).collect();
    let nanos: u32 = format!("{:0<9}", digits).parse().ok()?;
    Utc.timestamp_opt(secs, nanos).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn config() -> ShellConfig {
        ShellConfig {
            timeout: Duration::from_secs(10),
            ..ShellConfig::default()
        }
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_parse_records() {
        let file = parse_record("/sdcard", "f\tf\t12\t1700000000.5000000000\t644\t\ta.txt", false)
            .unwrap();
        assert_eq!(file.path, "/sdcard/a.txt");
        assert_eq!(file.size, 12);
        assert_eq!(file.mode, 0o644);
        assert_eq!(
            file.last_modified.unwrap().timestamp_subsec_millis(),
            500
        );

        let link = parse_record("/", "l\td\t21\t1700000000\t777\tstorage/emulated/0\tsdcard", false)
            .unwrap();
        assert!(link.is_symlink());
        assert!(link.is_directory());

        let dangling = parse_record("/sdcard", "l\tN\t4\t1700000000\t777\tnope\tbroken", false)
            .unwrap();
        assert!(!dangling.is_directory());

        let stat = parse_record("/sdcard/Download", "d\td\t4096\t1700000000\t755\t\tDownload", true)
            .unwrap();
        assert_eq!(stat.path, "/sdcard/Download");
        assert_eq!(stat.size, 0);
    }

    #[test]
    fn test_unparsable_record() {
        assert!(matches!(
            parse_record("/", "garbage", false),
            Err(NavError::InvalidCommandDefinition(_))
        ));
        assert!(matches!(
            parse_record("/", "x\tf\t1\t1\t644\t\tname", false),
            Err(NavError::InvalidCommandDefinition(_))
        ));
    }

    #[test]
    fn test_missing_shell_is_command_not_found() {
        let console = ShellConsole::new(ShellConfig {
            shell: "filenav-no-such-shell".to_string(),
            ..config()
        });
        assert!(matches!(
            console.read_file("/etc/hostname"),
            Err(NavError::CommandNotFound(_))
        ));
    }

    #[test]
    fn test_timeout_kills_command() {
        let console = ShellConsole::new(ShellConfig {
            timeout: Duration::from_millis(100),
            ..config()
        });
        let err = console.run("sleep 5", None).unwrap_err();
        assert!(matches!(err, NavError::OperationTimeout(_)));
    }

    #[test]
    fn test_elevation_wrapper_receives_script_as_one_argument() {
        let console = ShellConsole {
            config: ShellConfig {
                elevation: vec!["env".to_string(), "sh".to_string(), "-c".to_string()],
                ..config()
            },
            privileged: true,
            scope: path::ROOT.to_string(),
            flags: ConsoleFlags::default(),
        };
        let (program, args) = console.command_line("echo one; echo two");
        assert_eq!(program, "env");
        assert_eq!(args, vec!["sh", "-c", "echo one; echo two"]);
        assert_eq!(console.run("echo one; echo two", None).unwrap(), b"one\ntwo\n");
    }

    #[test]
    fn test_timeout_applies_while_child_ignores_stdin() {
        let console = ShellConsole::new(ShellConfig {
            timeout: Duration::from_millis(200),
            ..config()
        });
        let data = vec![b'x'; 4 * 1024 * 1024];
        let started = Instant::now();
        let err = console.run("sleep 5", Some(&data)).unwrap_err();
        assert!(matches!(err, NavError::OperationTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_read_write_roundtrip_and_listing() {
        let temp = tempdir().unwrap();
        let root = path::normalize(&temp.path().to_string_lossy());
        let console = ShellConsole::new(config());

        let file = path::join(&root, "it's.txt");
        console.write_file(&file, b"shell data").unwrap();
        assert_eq!(fs::read(temp.path().join("it's.txt")).unwrap(), b"shell data");
        assert_eq!(console.read_file(&file).unwrap(), b"shell data");

        fs::create_dir(temp.path().join("sub")).unwrap();
        let mut names: Vec<String> = console
            .list_files(&root)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["it's.txt", "sub"]);

        assert!(matches!(
            console.delete(&path::join(&root, "missing")),
            Err(NavError::NoSuchFileOrDirectory(_))
        ));
    }
}
