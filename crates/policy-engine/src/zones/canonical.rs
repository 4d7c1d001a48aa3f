//! Target canonicalization.
//!
//! Turns a raw target as the monitored program spelled it (`C:\Users\..`,
//! `~/.ssh/id_rsa`, `/prefix/drive_c/../../..`) into the host path it really
//! refers to. Resolution walks one segment at a time so symlinks are followed
//! under a hop budget, and stops following them once the walk has entered a
//! sacred boundary.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use winewarden_core::error::WineWardenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Missing,
}

/// Read-only view of the filesystem used during canonicalization.
pub trait FsView: Send + Sync {
    fn entry_kind(&self, path: &Path) -> EntryKind;
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;
    fn list_dir(&self, path: &Path) -> io::Result<Vec<OsString>>;
}

/// The real host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFs;

impl FsView for HostFs {
    fn entry_kind(&self, path: &Path) -> EntryKind {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => EntryKind::Symlink,
            Ok(meta) if meta.is_dir() => EntryKind::Dir,
            Ok(_) => EntryKind::File,
            Err(_) => EntryKind::Missing,
        }
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|entry| entry.file_name()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTarget {
    pub path: PathBuf,
    /// Non-path resource identifiers (`tcp:host:port`) are kept verbatim.
    pub identifier: bool,
    pub windows_origin: bool,
}

impl CanonicalTarget {
    pub fn display(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Where symlink following must stop; implemented by the zone map.
pub trait ResolutionFence {
    fn stops_at(&self, path: &Path) -> bool;
}

impl ResolutionFence for () {
    fn stops_at(&self, _path: &Path) -> bool {
        false
    }
}

pub struct Canonicalizer<'a> {
    pub fs: &'a dyn FsView,
    pub home: &'a Path,
    pub prefix_root: &'a Path,
    pub max_symlink_depth: u32,
    pub fence: &'a dyn ResolutionFence,
}

impl Canonicalizer<'_> {
    pub fn canonicalize(&self, raw_target: &str) -> Result<CanonicalTarget, WineWardenError> {
        let trimmed = raw_target.trim();
        if trimmed.is_empty() {
            return Err(ambiguous(raw_target, "empty target"));
        }
        let trimmed = strip_path_scheme(trimmed);

        if let Some((drive, rest)) = split_windows_drive(trimmed) {
            let base = self.drive_root(drive);
            let mut parts: VecDeque<OsString> = components_of(&base);
            parts.extend(
                rest.split(['\\', '/'])
                    .filter(|segment| !segment.is_empty())
                    .map(OsString::from),
            );
            let path = self.resolve(raw_target, parts, true)?;
            return Ok(CanonicalTarget {
                path,
                identifier: false,
                windows_origin: true,
            });
        }

        if let Some(scheme) = scheme_of(trimmed) {
            if !IDENTIFIER_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
                return Err(ambiguous(raw_target, &format!("unknown scheme `{scheme}:`")));
            }
            return Ok(CanonicalTarget {
                path: PathBuf::from(trimmed),
                identifier: true,
                windows_origin: false,
            });
        }

        let expanded = if trimmed == "~" {
            self.home.to_path_buf()
        } else if let Some(rest) = trimmed.strip_prefix("~/") {
            self.home.join(rest)
        } else {
            PathBuf::from(trimmed)
        };

        if !expanded.is_absolute() {
            return Err(ambiguous(raw_target, "relative target without a working directory"));
        }

        let path = self.resolve(raw_target, components_of(&expanded), false)?;
        Ok(CanonicalTarget {
            path,
            identifier: false,
            windows_origin: false,
        })
    }

    /// Wine maps `C:` to `drive_c` and `Z:` to the host root; other letters
    /// go through `dosdevices`.
    fn drive_root(&self, drive: char) -> PathBuf {
        match drive.to_ascii_lowercase() {
            'c' => self.prefix_root.join("drive_c"),
            'z' => PathBuf::from("/"),
            other => self.prefix_root.join("dosdevices").join(format!("{other}:")),
        }
    }

    fn resolve(
        &self,
        raw_target: &str,
        mut pending: VecDeque<OsString>,
        case_insensitive: bool,
    ) -> Result<PathBuf, WineWardenError> {
        let mut resolved = PathBuf::from("/");
        let mut hops = 0u32;
        let mut lexical_only = false;

        while let Some(part) = pending.pop_front() {
            if part.is_empty() || part == "." {
                continue;
            }
            if part == ".." {
                resolved.pop();
                continue;
            }

            let mut candidate = resolved.join(&part);
            if lexical_only || self.fenced(&resolved) {
                resolved = candidate;
                continue;
            }

            let mut kind = self.fs.entry_kind(&candidate);
            if kind == EntryKind::Missing && case_insensitive {
                if let Some(actual) = self.find_case_insensitive(&resolved, &part) {
                    candidate = resolved.join(actual);
                    kind = self.fs.entry_kind(&candidate);
                }
            }

            match kind {
                // A link that is itself a sacred boundary (a stowed `~/.ssh`)
                // keeps its sacred spelling.
                EntryKind::Symlink if self.fenced(&candidate) => {
                    resolved = candidate;
                    lexical_only = true;
                }
                EntryKind::Symlink => {
                    hops += 1;
                    if hops > self.max_symlink_depth {
                        return Err(ambiguous(
                            raw_target,
                            &format!("symlink resolution exceeded {} hops", self.max_symlink_depth),
                        ));
                    }
                    let link = self.fs.read_link(&candidate).map_err(|err| {
                        ambiguous(raw_target, &format!("unreadable symlink {}: {err}", candidate.display()))
                    })?;
                    if link.is_absolute() {
                        resolved = PathBuf::from("/");
                    }
                    for segment in components_of(&link).into_iter().rev() {
                        pending.push_front(segment);
                    }
                }
                EntryKind::Missing => {
                    resolved = candidate;
                    lexical_only = true;
                }
                EntryKind::File | EntryKind::Dir => {
                    resolved = candidate;
                }
            }
        }

        Ok(resolved)
    }

    /// Inside a fenced (sacred) boundary that is not part of the prefix,
    /// links are not followed.
    fn fenced(&self, path: &Path) -> bool {
        !path.starts_with(self.prefix_root) && self.fence.stops_at(path)
    }

    fn find_case_insensitive(&self, dir: &Path, part: &OsStr) -> Option<OsString> {
        let wanted = part.to_string_lossy().to_lowercase();
        let mut matches: Vec<OsString> = self
            .fs
            .list_dir(dir)
            .ok()?
            .into_iter()
            .filter(|name| name.to_string_lossy().to_lowercase() == wanted)
            .collect();
        matches.sort();
        matches.into_iter().next()
    }
}

/// Canonicalizes the prefix root itself; an unresolvable root keeps its
/// lexical form.
pub fn canonical_root(fs: &dyn FsView, root: &Path, max_symlink_depth: u32) -> PathBuf {
    let canonicalizer = Canonicalizer {
        fs,
        home: Path::new("/"),
        prefix_root: Path::new("/"),
        max_symlink_depth,
        fence: &(),
    };
    let raw = root.to_string_lossy();
    match canonicalizer.canonicalize(&raw) {
        Ok(target) if !target.identifier => target.path,
        _ => winewarden_core::paths::normalize_lexically(root),
    }
}

fn ambiguous(target: &str, reason: &str) -> WineWardenError {
    WineWardenError::ClassificationAmbiguous {
        target: target.to_string(),
        reason: reason.to_string(),
    }
}

fn components_of(path: &Path) -> VecDeque<OsString> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            _ => None,
        })
        .collect()
}

/// `C:\x`, `c:/x`, `C:` and the `\\?\C:\x` long-path form.
fn split_windows_drive(target: &str) -> Option<(char, &str)> {
    let target = target
        .strip_prefix(r"\\?\")
        .or_else(|| target.strip_prefix("//?/"))
        .unwrap_or(target);
    let mut chars = target.chars();
    let drive = chars.next()?;
    if !drive.is_ascii_alphabetic() || chars.next()? != ':' {
        return None;
    }
    let rest = &target[2..];
    if rest.is_empty() || rest.starts_with('\\') || rest.starts_with('/') {
        return Some((drive, rest));
    }
    None
}

/// Schemes naming non-path resources; these are kept verbatim.
const IDENTIFIER_SCHEMES: &[&str] = &["tcp", "tcp6", "udp", "udp6", "dev", "dbus", "pipe", "netlink"];

/// Prefixes that only restate a host path.
const PATH_SCHEMES: &[&str] = &["unix:", "file://localhost", "file://", "file:"];

/// Drops `unix:` and `file:` spellings down to the path they carry.
/// `file:///C:/x` keeps its drive letter.
fn strip_path_scheme(target: &str) -> &str {
    for scheme in PATH_SCHEMES {
        let matches = target
            .get(..scheme.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(scheme));
        if matches {
            let path = &target[scheme.len()..];
            return match path.strip_prefix('/') {
                Some(rest) if split_windows_drive(rest).is_some() => rest,
                _ => path,
            };
        }
    }
    target
}

fn scheme_of(target: &str) -> Option<&str> {
    if target.starts_with('/') || target.starts_with('~') {
        return None;
    }
    match target.split_once(':') {
        Some((scheme, _)) if scheme.len() > 1 => {
            let mut chars = scheme.chars();
            let valid = chars.next().is_some_and(|first| first.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            valid.then_some(scheme)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        home: PathBuf,
        prefix: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let home = root.join("home/user");
        let prefix = home.join("game/prefix");
        fs::create_dir_all(prefix.join("drive_c/users/steamuser/Documents")).unwrap();
        fs::create_dir_all(home.join(".ssh")).unwrap();
        fs::write(home.join(".ssh/id_rsa"), b"key").unwrap();
        Fixture {
            _dir: dir,
            root,
            home,
            prefix,
        }
    }

    fn canon(fx: &Fixture, raw: &str) -> Result<CanonicalTarget, WineWardenError> {
        Canonicalizer {
            fs: &HostFs,
            home: &fx.home,
            prefix_root: &fx.prefix,
            max_symlink_depth: 8,
            fence: &(),
        }
        .canonicalize(raw)
    }

    #[test]
    fn test_dotdot_and_trailing_separator() {
        let fx = fixture();
        let raw = format!("{}/drive_c/users/../users/steamuser/", fx.prefix.display());
        let target = canon(&fx, &raw).unwrap();
        assert_eq!(target.path, fx.prefix.join("drive_c/users/steamuser"));
    }

    #[test]
    fn test_windows_drive_case_folding() {
        let fx = fixture();
        let target = canon(&fx, r"c:\USERS\SteamUser\documents\save.dat").unwrap();
        assert!(target.windows_origin);
        assert_eq!(
            target.path,
            fx.prefix.join("drive_c/users/steamuser/Documents/save.dat")
        );
    }

    #[test]
    fn test_z_drive_maps_to_host_root() {
        let fx = fixture();
        let raw = format!(r"Z:{}\.ssh\id_rsa", fx.home.display()).replace('/', "\\");
        let target = canon(&fx, &raw).unwrap();
        assert_eq!(target.path, fx.home.join(".ssh/id_rsa"));
    }

    #[test]
    fn test_symlink_escape_is_followed() {
        let fx = fixture();
        symlink(fx.home.join(".ssh"), fx.prefix.join("drive_c/keys")).unwrap();
        let raw = format!("{}/drive_c/keys/id_rsa", fx.prefix.display());
        let target = canon(&fx, &raw).unwrap();
        assert_eq!(target.path, fx.home.join(".ssh/id_rsa"));
    }

    #[test]
    fn test_symlink_into_prefix_is_followed() {
        let fx = fixture();
        symlink(fx.prefix.join("drive_c"), fx.root.join("shortcut")).unwrap();
        let raw = format!("{}/shortcut/save.dat", fx.root.display());
        let target = canon(&fx, &raw).unwrap();
        assert_eq!(target.path, fx.prefix.join("drive_c/save.dat"));
    }

    #[test]
    fn test_symlink_loop_is_ambiguous() {
        let fx = fixture();
        symlink(fx.root.join("b"), fx.root.join("a")).unwrap();
        symlink(fx.root.join("a"), fx.root.join("b")).unwrap();
        let raw = format!("{}/a/file", fx.root.display());
        let err = canon(&fx, &raw).unwrap_err();
        assert!(matches!(err, WineWardenError::ClassificationAmbiguous { .. }));
    }

    #[test]
    fn test_missing_path_keeps_syntactic_position() {
        let fx = fixture();
        let target = canon(&fx, "~/Documents/new/../save.dat").unwrap();
        assert_eq!(target.path, fx.home.join("Documents/save.dat"));
    }

    #[test]
    fn test_relative_and_empty_are_ambiguous() {
        let fx = fixture();
        assert!(canon(&fx, "save.dat").is_err());
        assert!(canon(&fx, "   ").is_err());
    }

    #[test]
    fn test_identifiers_and_unix_scheme() {
        let fx = fixture();
        let tcp = canon(&fx, "tcp:203.0.113.7:443").unwrap();
        assert!(tcp.identifier);
        assert_eq!(tcp.display(), "tcp:203.0.113.7:443");

        let unix = canon(&fx, "unix:/run/user/1000/pulse/native").unwrap();
        assert!(!unix.identifier);
        assert_eq!(unix.path, PathBuf::from("/run/user/1000/pulse/native"));
    }

    #[test]
    fn test_file_scheme_is_a_host_path() {
        let fx = fixture();
        let expected = fx.home.join(".ssh/id_rsa");
        for raw in [
            format!("file:{}", expected.display()),
            format!("file://{}", expected.display()),
            format!("FILE://localhost{}", expected.display()),
        ] {
            let target = canon(&fx, &raw).unwrap();
            assert!(!target.identifier, "{raw}");
            assert_eq!(target.path, expected, "{raw}");
        }

        let drive = canon(&fx, "file:///C:/users/steamuser/Documents").unwrap();
        assert!(drive.windows_origin);
        assert_eq!(drive.path, fx.prefix.join("drive_c/users/steamuser/Documents"));
    }

    #[test]
    fn test_unknown_scheme_is_ambiguous() {
        let fx = fixture();
        let err = canon(&fx, "smb:server/share/secret").unwrap_err();
        assert!(matches!(err, WineWardenError::ClassificationAmbiguous { .. }));
        assert!(canon(&fx, "udp:198.51.100.4:53").unwrap().identifier);
    }

    #[test]
    fn test_canonical_root_resolves_links() {
        let fx = fixture();
        symlink(&fx.prefix, fx.root.join("prefix-link")).unwrap();
        let root = canonical_root(&HostFs, &fx.root.join("prefix-link"), 8);
        assert_eq!(root, fx.prefix);
    }

    #[test]
    fn test_split_windows_drive() {
        assert_eq!(split_windows_drive(r"C:\x"), Some(('C', r"\x")));
        assert_eq!(split_windows_drive(r"\\?\d:\x"), Some(('d', r"\x")));
        assert_eq!(split_windows_drive("C:"), Some(('C', "")));
        assert_eq!(split_windows_drive("tcp:1.2.3.4"), None);
        assert_eq!(split_windows_drive("/etc"), None);
    }
}
