//! Build context archive
//!
//! The daemon receives the project as a gzip tar. Entries are sorted and carry
//! fixed timestamps, owners and modes, so an unchanged project always produces
//! the same bytes. The rendered Dockerfile and `.dockerignore` are written at
//! the archive root in place of whatever the project holds.

use anyhow::{Context, Result};
use flate2::{write::GzEncoder, Compression};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{EntryType, Header};
use tracing::{debug, trace};

use crate::render::dockerignore;

pub const DOCKERFILE: &str = "Dockerfile";
pub const DOCKERIGNORE: &str = ".dockerignore";

#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Gzip-compressed tar
    pub archive: Vec<u8>,
    /// Archive paths in the order they were written
    pub entries: Vec<String>,
    /// SHA-256 of `archive`, hex encoded
    pub digest: String,
}

impl BuildContext {
    pub fn size(&self) -> usize {
        self.archive.len()
    }
}

fn matcher(root: &Path) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in dockerignore::patterns(root) {
        builder
            .add_line(None, &pattern)
            .with_context(|| format!("Invalid ignore pattern '{}'", pattern))?;
    }
    for generated in [DOCKERFILE, DOCKERIGNORE] {
        builder.add_line(None, &format!("/{}", generated))?;
    }
    builder.build().context("Failed to build ignore matcher")
}

/// Archive path with forward slashes regardless of host
fn archive_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        0o755
    } else {
        0o644
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    0o644
}

fn header(entry_type: EntryType, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

/// Collect context files relative to `root`, sorted, with ignore rules applied
fn collect(root: &Path) -> Result<Vec<PathBuf>> {
    let ignore = matcher(root)?;
    let mut paths = Vec::new();

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();
        if path == root {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if ignore.matched_path_or_any_parents(path, is_dir).is_ignore() {
            trace!("Excluded from context: {}", path.display());
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .context("Failed to strip prefix")?
            .to_path_buf();
        paths.push(rel);
    }

    paths.sort();
    Ok(paths)
}

/// Pack `root` together with the rendered Dockerfile
pub fn pack(root: &Path, dockerfile: &str) -> Result<BuildContext> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    let mut entries = Vec::new();

    let generated = [
        (DOCKERFILE, dockerfile.to_string()),
        (DOCKERIGNORE, dockerignore::render(root)),
    ];
    for (name, content) in generated {
        let mut header = header(EntryType::Regular, 0o644, content.len() as u64);
        builder.append_data(&mut header, name, content.as_bytes())?;
        entries.push(name.to_string());
    }

    for rel in collect(root)? {
        let path = root.join(&rel);
        let name = archive_path(&rel);
        let metadata = fs::symlink_metadata(&path)
            .with_context(|| format!("Failed to read metadata of {}", path.display()))?;
        let file_type = metadata.file_type();

        if file_type.is_dir() {
            let mut header = header(EntryType::Directory, 0o755, 0);
            builder.append_data(&mut header, &name, std::io::empty())?;
        } else if file_type.is_file() {
            let mut header = header(EntryType::Regular, file_mode(&metadata), metadata.len());
            let file = File::open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            builder.append_data(&mut header, &name, file)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&path)
                .with_context(|| format!("Failed to read symlink {}", path.display()))?;
            let mut header = header(EntryType::Symlink, 0o777, 0);
            header
                .set_link_name(&target)
                .with_context(|| format!("Invalid symlink target for {}", name))?;
            builder.append_data(&mut header, &name, std::io::empty())?;
        } else {
            debug!("Skipping special file {}", path.display());
            continue;
        }
        entries.push(name);
    }

    builder.finish()?;
    let tar_bytes = builder.into_inner()?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes)?;
    let archive = encoder.finish()?;
    let digest = hex::encode(Sha256::digest(&archive));

    debug!(
        entries = entries.len(),
        bytes = archive.len(),
        digest = %digest,
        "Packed build context"
    );

    Ok(BuildContext {
        archive,
        entries,
        digest,
    })
}
