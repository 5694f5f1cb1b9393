//! Configuration output sink
//!
//! Generation hooks do not write to the real filesystem directly. They declare
//! files, directories and links against a [`CfgFs`], an in-memory staging area
//! keyed by absolute destination path. A later [`CfgFs::commit`] materializes
//! the staged artifacts under a destination directory, writing only those
//! whose content differs from what is already on disk. Change detection is
//! content-addressed: a SHA-256 digest of the staged buffer is compared
//! against a digest of the destination file.
//!
//! Two buffer flavors exist. A plain [`FileBuf`] is an append-only sequence
//! of lines. An ini-style buffer groups lines under `[section]` headers;
//! writes name a section explicitly or continue the most recently named one,
//! and sections render in first-write order.

use std::fmt;
use std::fs;
use std::io::Write as _;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Errors raised while staging or committing artifacts.
#[derive(Debug)]
pub enum FsError {
    /// A staged path was not absolute.
    NotAbsolute(PathBuf),
    /// A path is already staged as a different kind of artifact.
    Conflict { path: PathBuf, message: String },
    /// An ini write without a section, before any section was named.
    NoSection(PathBuf),
    /// An I/O failure while committing.
    Io { path: PathBuf, message: String },
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotAbsolute(path) => {
                write!(f, "path {} is not absolute", path.display())
            }
            FsError::Conflict { path, message } => {
                write!(f, "conflicting artifact at {}: {}", path.display(), message)
            }
            FsError::NoSection(path) => {
                write!(f, "{}: no section key, cannot write", path.display())
            }
            FsError::Io { path, message } => {
                write!(f, "{}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for FsError {}

fn io_err(path: &Path, err: std::io::Error) -> FsError {
    FsError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Join an absolute artifact path onto a destination directory.
fn dest_path(destdir: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(rel) => destdir.join(rel),
        Err(_) => destdir.join(path),
    }
}

fn sha256_hex(buf: &[u8]) -> String {
    let digest = Sha256::digest(buf);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[derive(Debug)]
enum FileBody {
    Plain(String),
    Ini {
        sections: IndexMap<String, String>,
        cursor: Option<String>,
    },
}

/// An append-only staged file, plain or ini-grouped.
#[derive(Debug)]
pub struct FileBuf {
    path: PathBuf,
    mode: u32,
    body: FileBody,
}

impl FileBuf {
    fn new(path: PathBuf, mode: u32, ini: bool) -> Self {
        let body = if ini {
            FileBody::Ini {
                sections: IndexMap::new(),
                cursor: None,
            }
        } else {
            FileBody::Plain(String::new())
        };
        FileBuf { path, mode, body }
    }

    /// Append one line (a newline is added).
    pub fn write(&mut self, line: &str) -> Result<(), FsError> {
        match &mut self.body {
            FileBody::Plain(buf) => {
                buf.push_str(line);
                buf.push('\n');
                Ok(())
            }
            FileBody::Ini { sections, cursor } => {
                let section = cursor.clone().ok_or_else(|| FsError::NoSection(self.path.clone()))?;
                append_section(sections, &section, line);
                Ok(())
            }
        }
    }

    /// Append one line under `section`, making it the current section.
    pub fn write_section(&mut self, section: &str, line: &str) -> Result<(), FsError> {
        match &mut self.body {
            FileBody::Plain(_) => Err(FsError::Conflict {
                path: self.path.clone(),
                message: "not an ini file".into(),
            }),
            FileBody::Ini { sections, cursor } => {
                *cursor = Some(section.to_string());
                append_section(sections, section, line);
                Ok(())
            }
        }
    }

    /// Forget the current section; the next write must name one.
    pub fn close(&mut self) {
        if let FileBody::Ini { cursor, .. } = &mut self.body {
            *cursor = None;
        }
    }

    /// Render the staged content.
    pub fn content(&self) -> String {
        match &self.body {
            FileBody::Plain(buf) => buf.clone(),
            FileBody::Ini { sections, .. } => {
                let mut buf = String::new();
                for (i, (key, val)) in sections.iter().enumerate() {
                    if i > 0 {
                        buf.push('\n');
                    }
                    buf.push('[');
                    buf.push_str(key);
                    buf.push_str("]\n");
                    buf.push_str(val);
                }
                buf
            }
        }
    }

    pub fn sha256(&self) -> String {
        sha256_hex(self.content().as_bytes())
    }

    fn checkfs(&self, destdir: &Path) -> bool {
        let path = dest_path(destdir, &self.path);
        match fs::read(&path) {
            Ok(buf) => sha256_hex(&buf) == self.sha256(),
            Err(_) => false,
        }
    }

    fn commit(&self, destdir: &Path) -> Result<bool, FsError> {
        if self.checkfs(destdir) {
            info!("{} already up to date", self.path.display());
            return Ok(false);
        }
        let path = dest_path(destdir, &self.path);
        info!("writing file {}", path.display());
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(&path, e))?;
        }
        let mut file = fs::File::create(&path).map_err(|e| io_err(&path, e))?;
        file.write_all(self.content().as_bytes())
            .map_err(|e| io_err(&path, e))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(self.mode))
            .map_err(|e| io_err(&path, e))?;
        Ok(true)
    }
}

fn append_section(sections: &mut IndexMap<String, String>, section: &str, line: &str) {
    let buf = sections.entry(section.to_string()).or_default();
    buf.push_str(line);
    buf.push('\n');
}

#[derive(Debug)]
struct DirSpec {
    path: PathBuf,
    mode: u32,
}

impl DirSpec {
    fn checkfs(&self, destdir: &Path) -> bool {
        let path = dest_path(destdir, &self.path);
        match fs::metadata(&path) {
            Ok(meta) => meta.is_dir(),
            Err(_) => false,
        }
    }

    fn commit(&self, destdir: &Path) -> Result<bool, FsError> {
        if self.checkfs(destdir) {
            info!("directory {} up to date", self.path.display());
            return Ok(false);
        }
        let path = dest_path(destdir, &self.path);
        info!("creating directory {}", path.display());
        fs::create_dir_all(&path).map_err(|e| io_err(&path, e))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(self.mode))
            .map_err(|e| io_err(&path, e))?;
        Ok(true)
    }
}

#[derive(Debug)]
struct LinkSpec {
    src: PathBuf,
    dst: PathBuf,
    symbolic: bool,
}

impl LinkSpec {
    fn checkfs(&self, destdir: &Path) -> bool {
        let path = dest_path(destdir, &self.dst);
        if self.symbolic {
            match fs::read_link(&path) {
                Ok(target) => target == self.src,
                Err(_) => false,
            }
        } else {
            match (fs::metadata(&path), fs::metadata(&self.src)) {
                (Ok(dst), Ok(src)) => src.dev() == dst.dev() && src.ino() == dst.ino(),
                _ => false,
            }
        }
    }

    fn commit(&self, destdir: &Path) -> Result<bool, FsError> {
        let kind = if self.symbolic { "symbolic link" } else { "hard link" };
        if self.checkfs(destdir) {
            info!("{} {} up to date", kind, self.dst.display());
            return Ok(false);
        }
        let path = dest_path(destdir, &self.dst);
        info!("creating {} {} -> {}", kind, self.src.display(), path.display());
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(&path, e))?;
        }
        if self.symbolic {
            std::os::unix::fs::symlink(&self.src, &path).map_err(|e| io_err(&path, e))?;
        } else {
            fs::hard_link(&self.src, &path).map_err(|e| io_err(&path, e))?;
        }
        Ok(true)
    }
}

#[derive(Debug)]
enum Artifact {
    File(FileBuf),
    Dir(DirSpec),
    Link(LinkSpec),
}

/// The staging area itself. Artifacts are keyed by absolute destination path
/// and committed in kind order: directories, links, files.
#[derive(Debug, Default)]
pub struct CfgFs {
    entries: IndexMap<PathBuf, Artifact>,
}

impl CfgFs {
    pub fn new() -> Self {
        CfgFs::default()
    }

    /// Open (or reopen) a plain file buffer with default mode 0644.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<&mut FileBuf, FsError> {
        self.open_mode(path, false, 0o644)
    }

    /// Open (or reopen) an ini-grouped file buffer with default mode 0644.
    pub fn open_ini(&mut self, path: impl AsRef<Path>) -> Result<&mut FileBuf, FsError> {
        self.open_mode(path, true, 0o644)
    }

    pub fn open_mode(
        &mut self,
        path: impl AsRef<Path>,
        ini: bool,
        mode: u32,
    ) -> Result<&mut FileBuf, FsError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_absolute() {
            return Err(FsError::NotAbsolute(path));
        }
        if !self.entries.contains_key(&path) {
            debug!("staging file {}", path.display());
            self.entries.insert(
                path.clone(),
                Artifact::File(FileBuf::new(path.clone(), mode, ini)),
            );
        }
        match self.entries.get_mut(&path) {
            Some(Artifact::File(buf)) => {
                let matches = matches!(
                    (&buf.body, ini),
                    (FileBody::Plain(_), false) | (FileBody::Ini { .. }, true)
                );
                if matches {
                    Ok(buf)
                } else {
                    Err(FsError::Conflict {
                        path,
                        message: "file already staged with a different layout".into(),
                    })
                }
            }
            _ => Err(FsError::Conflict {
                path,
                message: "existing artifact is not a file".into(),
            }),
        }
    }

    pub fn mkdir(&mut self, path: impl AsRef<Path>, mode: u32) -> Result<(), FsError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_absolute() {
            return Err(FsError::NotAbsolute(path));
        }
        match self.entries.get(&path) {
            Some(Artifact::Dir(_)) => Ok(()),
            Some(_) => Err(FsError::Conflict {
                path,
                message: "existing artifact is not a directory".into(),
            }),
            None => {
                debug!("staging directory {}", path.display());
                self.entries
                    .insert(path.clone(), Artifact::Dir(DirSpec { path, mode }));
                Ok(())
            }
        }
    }

    pub fn symlink(
        &mut self,
        src: impl AsRef<Path>,
        dst: impl AsRef<Path>,
    ) -> Result<(), FsError> {
        self.link(src, dst, true)
    }

    pub fn hardlink(
        &mut self,
        src: impl AsRef<Path>,
        dst: impl AsRef<Path>,
    ) -> Result<(), FsError> {
        self.link(src, dst, false)
    }

    fn link(
        &mut self,
        src: impl AsRef<Path>,
        dst: impl AsRef<Path>,
        symbolic: bool,
    ) -> Result<(), FsError> {
        let src = src.as_ref().to_path_buf();
        let dst = dst.as_ref().to_path_buf();
        if !dst.is_absolute() {
            return Err(FsError::NotAbsolute(dst));
        }
        match self.entries.get(&dst) {
            Some(Artifact::Link(l)) if l.symbolic == symbolic && l.src == src => Ok(()),
            Some(_) => Err(FsError::Conflict {
                path: dst,
                message: "existing artifact is not the same link".into(),
            }),
            None => {
                debug!("staging link {} -> {}", dst.display(), src.display());
                self.entries.insert(
                    dst.clone(),
                    Artifact::Link(LinkSpec { src, dst, symbolic }),
                );
                Ok(())
            }
        }
    }

    /// Write every artifact whose destination is out of date. Returns whether
    /// anything was written.
    pub fn commit(&self, destdir: impl AsRef<Path>) -> Result<bool, FsError> {
        let destdir = destdir.as_ref();
        if !destdir.is_absolute() {
            return Err(FsError::NotAbsolute(destdir.to_path_buf()));
        }
        let mut updated = false;

        let mut dirs: Vec<&DirSpec> = self
            .entries
            .values()
            .filter_map(|a| match a {
                Artifact::Dir(d) => Some(d),
                _ => None,
            })
            .collect();
        dirs.sort_by(|a, b| a.path.cmp(&b.path));
        for dir in dirs {
            updated |= dir.commit(destdir)?;
        }

        for artifact in self.entries.values() {
            if let Artifact::Link(link) = artifact {
                updated |= link.commit(destdir)?;
            }
        }

        for artifact in self.entries.values() {
            if let Artifact::File(file) = artifact {
                updated |= file.commit(destdir)?;
            }
        }

        Ok(updated)
    }

    /// Check whether every artifact is already up to date, writing nothing.
    pub fn checkfs(&self, destdir: impl AsRef<Path>) -> Result<bool, FsError> {
        let destdir = destdir.as_ref();
        if !destdir.is_absolute() {
            return Err(FsError::NotAbsolute(destdir.to_path_buf()));
        }
        for (path, artifact) in &self.entries {
            let ok = match artifact {
                Artifact::File(f) => f.checkfs(destdir),
                Artifact::Dir(d) => d.checkfs(destdir),
                Artifact::Link(l) => l.checkfs(destdir),
            };
            if !ok {
                return Ok(false);
            }
            debug!("{} already up to date", path.display());
        }
        Ok(true)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Staged paths, in staging order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(|p| p.as_path())
    }
}
