// src/packages/archive.rs

//! Package archive handling
//!
//! Archives are tarballs compressed with xz (the default produced by
//! [`pack`]), zstd, or gzip; uncompressed tarballs are accepted too. The
//! codec is detected from magic bytes, never from the file name.

use crate::config::MANIFEST_FILE;
use crate::error::{Error, Result};
use crate::packages::manifest::Manifest;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// XZ preset used when packing
const XZ_LEVEL: u32 = 6;

/// Archive compression format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Xz,
    Zstd,
    Gzip,
    None,
}

/// Detect compression format from magic bytes
pub fn detect_compression(path: &Path) -> Result<Compression> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 6];
    let read = read_up_to(&mut file, &mut magic)?;
    let magic = &magic[..read];

    if magic.starts_with(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]) {
        return Ok(Compression::Xz);
    }
    if magic.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
        return Ok(Compression::Zstd);
    }
    if magic.starts_with(&[0x1F, 0x8B]) {
        return Ok(Compression::Gzip);
    }

    // POSIX tar carries "ustar" at offset 257
    let mut ustar = [0u8; 5];
    file.seek(SeekFrom::Start(257))?;
    if read_up_to(&mut file, &mut ustar)? == ustar.len() && &ustar == b"ustar" {
        return Ok(Compression::None);
    }

    Err(Error::CorruptArchive {
        path: path.to_path_buf(),
        message: "unrecognized archive format".to_string(),
    })
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Open and decompress the package archive
fn open_archive(path: &Path) -> Result<Archive<Box<dyn Read>>> {
    let compression = detect_compression(path)?;
    let file = File::open(path)?;

    let reader: Box<dyn Read> = match compression {
        Compression::Xz => Box::new(XzDecoder::new(file)),
        Compression::Zstd => {
            let decoder = zstd::Decoder::new(file).map_err(|e| corrupt(path, e))?;
            Box::new(decoder)
        }
        Compression::Gzip => Box::new(GzDecoder::new(file)),
        Compression::None => Box::new(file),
    };

    debug!("Opened {:?} archive {}", compression, path.display());
    Ok(Archive::new(reader))
}

fn corrupt(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::CorruptArchive {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn is_manifest_entry(entry_path: &Path) -> bool {
    entry_path == Path::new(MANIFEST_FILE)
        || entry_path.strip_prefix(".").ok() == Some(Path::new(MANIFEST_FILE))
}

/// Read the descriptor out of an archive without extracting anything else
pub fn inspect(path: &Path) -> Result<Manifest> {
    debug!("Inspecting archive: {}", path.display());
    let mut archive = open_archive(path)?;

    for entry in archive.entries().map_err(|e| corrupt(path, e))? {
        let mut entry = entry.map_err(|e| corrupt(path, e))?;
        let entry_path = entry.path().map_err(|e| corrupt(path, e))?.into_owned();

        if is_manifest_entry(&entry_path) {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| corrupt(path, e))?;
            return Manifest::from_toml(&content, &path.display().to_string());
        }
    }

    Err(Error::ManifestNotFound {
        path: path.to_path_buf(),
    })
}

/// Stream every entry of an archive into `target`
///
/// Files, directories, symlinks and hard links are recreated with their
/// permission bits. Entries that would land outside `target` are skipped.
/// A failure midway leaves whatever was already written.
pub fn extract(path: &Path, target: &Path) -> Result<usize> {
    debug!("Extracting {} into {}", path.display(), target.display());
    std::fs::create_dir_all(target)?;

    let mut archive = open_archive(path)?;
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let mut count = 0;
    for entry in archive.entries().map_err(|e| corrupt(path, e))? {
        let mut entry = entry.map_err(|e| corrupt(path, e))?;
        if entry.unpack_in(target)? {
            count += 1;
        } else {
            let entry_path = entry.path().map(|p| p.display().to_string());
            warn!(
                "Skipped archive entry outside the package directory: {}",
                entry_path.unwrap_or_default()
            );
        }
    }

    info!("Extracted {} entries from {}", count, path.display());
    Ok(count)
}

/// SHA-256 of the raw archive bytes, hex encoded
pub fn content_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare an archive's content hash against an expected checksum
pub fn verify_checksum(path: &Path, expected: &str) -> Result<bool> {
    let actual = content_hash(path)?;
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}

/// Pack a package directory into a reproducible `.tar.xz` archive
///
/// The directory must contain a valid `package.toml`. Entries are written in
/// sorted order with zeroed timestamps and ownership so identical trees
/// produce byte-identical archives.
pub fn pack(source_dir: &Path, output: &Path) -> Result<Manifest> {
    let manifest = Manifest::from_file(&source_dir.join(MANIFEST_FILE))?;
    info!(
        "Packing {}@{} from {}",
        manifest.name(),
        manifest.version(),
        source_dir.display()
    );

    let file = File::create(output)?;
    let mut builder = Builder::new(XzEncoder::new(file, XZ_LEVEL));
    builder.follow_symlinks(false);

    for entry in WalkDir::new(source_dir)
        .min_depth(1)
        .sort_by_file_name()
        .follow_links(false)
    {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| io::Error::other(e.to_string()))?;

        if entry.path() == output {
            continue;
        }

        append_entry(&mut builder, entry.path(), relative)?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;

    debug!("Wrote archive {}", output.display());
    Ok(manifest)
}

fn append_entry<W: io::Write>(builder: &mut Builder<W>, path: &Path, relative: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)?;
    let mut header = Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(metadata.permissions().mode() & 0o7777);

    if metadata.file_type().is_symlink() {
        let link_target: PathBuf = std::fs::read_link(path)?;
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        builder.append_link(&mut header, relative, &link_target)?;
    } else if metadata.is_dir() {
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        builder.append_data(&mut header, relative, io::empty())?;
    } else {
        header.set_entry_type(EntryType::Regular);
        header.set_size(metadata.len());
        builder.append_data(&mut header, relative, File::open(path)?)?;
    }

    Ok(())
}
