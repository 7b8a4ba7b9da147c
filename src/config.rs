/*!
 * Configuration handling for filenav
 */

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::path;
use crate::types::StorageVolume;

/// Sort order applied to directory listings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    /// Name, A to Z
    #[default]
    NameAsc,
    /// Name, Z to A
    NameDesc,
    /// Oldest first
    DateAsc,
    /// Newest first
    DateDesc,
    /// Smallest first
    SizeAsc,
    /// Largest first
    SizeDesc,
    /// Extension, A to Z
    TypeAsc,
    /// Extension, Z to A
    TypeDesc,
}

impl SortMode {
    /// Whether the sort key is reversed
    pub fn is_descending(self) -> bool {
        matches!(
            self,
            Self::NameDesc | Self::DateDesc | Self::SizeDesc | Self::TypeDesc
        )
    }
}

/// Access mode of the session
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    /// Sandboxed to storage volumes, never privileged
    Safe,
    /// Unrestricted, asks for privileges when a step needs them
    #[default]
    Prompt,
    /// Unrestricted and always privileged
    Root,
}

impl AccessMode {
    /// Whether navigation is restricted to storage volumes
    pub fn is_chrooted(self) -> bool {
        self == Self::Safe
    }

    /// Whether a permission failure may be recovered by relaunching
    pub fn allows_relaunch(self) -> bool {
        self == Self::Prompt
    }
}

/// User display and access preferences, read-only from the engine's side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Sort order
    pub sort_mode: SortMode,
    /// Show entries whose name starts with a dot
    pub show_hidden: bool,
    /// Show device nodes, pipes and sockets
    pub show_system: bool,
    /// Show symbolic links
    pub show_symlinks: bool,
    /// Compare names case-sensitively
    pub case_sensitive_sort: bool,
    /// List directories before files
    pub directories_first: bool,
    /// Access mode
    pub access_mode: AccessMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sort_mode: SortMode::NameAsc,
            show_hidden: false,
            show_system: false,
            show_symlinks: true,
            case_sensitive_sort: false,
            directories_first: true,
            access_mode: AccessMode::Prompt,
        }
    }
}

/// External command definitions used by the shell console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Shell used to run command definitions
    pub shell: String,
    /// Wrapper used to elevate privileges (program followed by its arguments)
    pub elevation: Vec<String>,
    /// Deadline for a single command
    pub timeout: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            elevation: vec!["su".to_string(), "-c".to_string()],
            timeout: Duration::from_secs(30),
        }
    }
}

/// File operation subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List a directory
    Ls {
        /// Directory to list
        #[clap(default_value = ".")]
        path: String,
    },
    /// Copy files into a directory
    Cp {
        /// Source files followed by the destination directory
        #[clap(required = true, num_args = 2..)]
        paths: Vec<String>,
    },
    /// Move files into a directory
    Mv {
        /// Source files followed by the destination directory
        #[clap(required = true, num_args = 2..)]
        paths: Vec<String>,
    },
    /// Rename a file in place
    Rename {
        /// File to rename
        path: String,
        /// New name
        name: String,
    },
    /// Create a copy of a file next to it
    Dup {
        /// File to duplicate
        path: String,
    },
    /// Delete files
    Rm {
        /// Files to delete
        #[clap(required = true)]
        paths: Vec<String>,
    },
    /// Search a directory tree by glob pattern
    Find {
        /// Directory to search
        dir: String,
        /// Glob pattern matched against names
        pattern: String,
    },
}

/// Command-line arguments for filenav
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "filenav",
    version = env!("CARGO_PKG_VERSION"),
    about = "Navigate and manage files through pluggable consoles",
    long_about = "Lists, copies, moves, renames and searches files through the filenav navigation engine, honoring sort preferences, sandboxed access mode and privilege relaunch."
)]
pub struct Args {
    /// Operation to run
    #[clap(subcommand)]
    pub command: Option<Command>,

    /// Sort mode for listings
    #[clap(long, value_enum, default_value_t = SortMode::default())]
    pub sort: SortMode,

    /// Show hidden files
    #[clap(long, short = 'a')]
    pub show_hidden: bool,

    /// Show device nodes, pipes and sockets
    #[clap(long)]
    pub show_system: bool,

    /// Hide symbolic links
    #[clap(long)]
    pub hide_symlinks: bool,

    /// Compare names case-sensitively
    #[clap(long)]
    pub case_sensitive: bool,

    /// Mix directories and files when sorting
    #[clap(long)]
    pub no_dirs_first: bool,

    /// Access mode
    #[clap(long, value_enum, default_value_t = AccessMode::default())]
    pub access_mode: AccessMode,

    /// Storage volumes (repeatable); defaults to the home directory
    #[clap(long = "volume", value_name = "PATH")]
    pub volumes: Vec<String>,

    /// Home directory used as navigation fallback
    #[clap(long)]
    pub home: Option<String>,

    /// Privilege elevation wrapper taking the script as one argument, e.g. "sudo -n sh -c"
    #[clap(long, default_value = "su -c")]
    pub elevation: String,

    /// Deadline for shell commands in seconds
    #[clap(long, default_value = "30")]
    pub command_timeout: u64,

    /// Answer yes to overwrite and relaunch prompts
    #[clap(long, short = 'y')]
    pub yes: bool,

    /// Increase log verbosity (repeatable)
    #[clap(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Generate shell completions
    #[clap(long = "generate", value_enum)]
    pub generate: Option<Shell>,
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Display and access preferences
    pub settings: Settings,

    /// Storage volumes forming the chroot boundary
    pub volumes: Vec<StorageVolume>,

    /// Navigation fallback directory
    pub home: String,

    /// Shell console command definitions
    pub shell: ShellConfig,

    /// Retries granted to a timed out item
    pub max_retries: usize,

    /// Answer yes to prompts
    pub assume_yes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            volumes: Vec::new(),
            home: path::ROOT.to_string(),
            shell: ShellConfig::default(),
            max_retries: 1,
            assume_yes: false,
        }
    }
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args(args: &Args) -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from(path::ROOT));
        let home_dir = path::normalize(&home_dir.to_string_lossy());

        let mut volumes: Vec<StorageVolume> =
            args.volumes.iter().map(|v| StorageVolume::new(v)).collect();
        if volumes.is_empty() {
            volumes.push(StorageVolume::new(&home_dir));
        }

        let home = match &args.home {
            Some(home) => path::normalize(home),
            None if args.access_mode.is_chrooted() => volumes[0].path.clone(),
            None => path::ROOT.to_string(),
        };

        Self {
            settings: Settings {
                sort_mode: args.sort,
                show_hidden: args.show_hidden,
                show_system: args.show_system,
                show_symlinks: !args.hide_symlinks,
                case_sensitive_sort: args.case_sensitive,
                directories_first: !args.no_dirs_first,
                access_mode: args.access_mode,
            },
            volumes,
            home,
            shell: ShellConfig {
                elevation: args
                    .elevation
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
                timeout: Duration::from_secs(args.command_timeout),
                ..ShellConfig::default()
            },
            max_retries: 1,
            assume_yes: args.yes,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> io::Result<()> {
        for volume in &self.volumes {
            let native = PathBuf::from(&volume.path);
            if !native.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Storage volume not found: {}", volume.path),
                ));
            }
        }

        if self.settings.access_mode.is_chrooted()
            && !self.volumes.iter().any(|v| v.contains(&self.home))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Home directory is outside every volume: {}", self.home),
            ));
        }

        if self.settings.access_mode == AccessMode::Root && self.shell.elevation.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Root access mode needs an elevation wrapper",
            ));
        }

        if self.shell.timeout.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Command timeout must be greater than zero",
            ));
        }

        Ok(())
    }
}
