use bytes::Bytes;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use super::Compression;
use crate::error::{EntryError, ExtractError};

const DECOMPRESSED_NAME: &str = "decompressed.tar";

/// Longest symlink chain followed before giving up
const MAX_LINK_HOPS: usize = 16;

/// Where an entry's bytes live inside the uncompressed tar stream
#[derive(Debug, Clone, Copy)]
struct EntryLocation {
    offset: u64,
    size: u64,
}

/// An indexed entry: either data we can seek to, or the reason we can't
#[derive(Debug, Clone)]
enum EntrySource {
    Data(EntryLocation),
    Unreadable(String),
}

/// A member as recorded by the header pass, before links are resolved
#[derive(Debug, Clone)]
enum RawEntry {
    Data(EntryLocation),
    /// Hard or symbolic link, target already turned into an archive path
    Link(Option<String>),
    Unsupported(::tar::EntryType),
}

/// Random-access view over a downloaded tar archive.
///
/// The index is read once when the handle is opened. Reads go through a
/// single file handle, so they are serialized; callers are free to run
/// whatever they do with the bytes concurrently.
pub struct ArchiveHandle {
    file: Mutex<File>,
    index: HashMap<String, EntrySource>,
    names: Vec<String>,
    compression: Compression,
}

impl ArchiveHandle {
    /// Open the archive at `path`. Compressed archives are inflated into
    /// `scratch_dir` first so every entry can be reached with a seek.
    pub fn open(path: &Path, scratch_dir: &Path) -> Result<Self, ExtractError> {
        let compression = Compression::sniff_file(path).map_err(ExtractError::Scratch)?;

        let tar_path = match compression {
            Compression::None => path.to_path_buf(),
            Compression::Gzip | Compression::Bzip2 => {
                let dest = scratch_dir.join(DECOMPRESSED_NAME);
                decompress(path, &dest, compression)?;
                dest
            }
        };

        let (index, names) = build_index(&tar_path)?;
        let file = File::open(&tar_path).map_err(ExtractError::Scratch)?;

        debug!(
            path = %tar_path.display(),
            ?compression,
            entries = names.len(),
            "opened archive"
        );

        Ok(ArchiveHandle {
            file: Mutex::new(file),
            index,
            names,
            compression,
        })
    }

    /// Names of every non-directory member, in archive order, without
    /// duplicates. Links and unsupported members are included; reading them
    /// either follows the link or fails.
    pub fn entry_names(&self) -> &[String] {
        &self.names
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Read one entry's full contents
    pub fn read_entry(&self, name: &str) -> Result<Bytes, EntryError> {
        let location = match self.index.get(name) {
            Some(EntrySource::Data(location)) => *location,
            Some(EntrySource::Unreadable(reason)) => {
                return Err(EntryError::Unreadable {
                    name: name.to_string(),
                    reason: reason.clone(),
                });
            }
            None => return Err(EntryError::Unknown(name.to_string())),
        };

        let read_err = |source| EntryError::Read {
            name: name.to_string(),
            source,
        };

        let mut buffer = vec![0u8; location.size as usize];
        {
            let mut file = self
                .file
                .lock()
                .map_err(|_| read_err(std::io::Error::other("archive file lock poisoned")))?;
            file.seek(SeekFrom::Start(location.offset)).map_err(read_err)?;
            file.read_exact(&mut buffer).map_err(read_err)?;
        }

        Ok(Bytes::from(buffer))
    }
}

fn invalid(context: &str, err: impl std::fmt::Display) -> ExtractError {
    ExtractError::InvalidArchive(format!("{context}: {err}"))
}

/// Inflate a compressed tar into `dest`
fn decompress(src: &Path, dest: &Path, compression: Compression) -> Result<(), ExtractError> {
    let input = BufReader::new(File::open(src).map_err(ExtractError::Scratch)?);
    let mut reader: Box<dyn Read> = match compression {
        Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(input)),
        Compression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(input)),
        Compression::None => Box::new(input),
    };

    let mut output = BufWriter::new(File::create(dest).map_err(ExtractError::Scratch)?);
    let written = std::io::copy(&mut reader, &mut output)
        .map_err(|e| invalid(&format!("failed to decompress {compression:?} stream"), e))?;
    output.flush().map_err(ExtractError::Scratch)?;

    debug!(bytes = written, "decompressed archive");
    Ok(())
}

/// Collapse `.`, `..` and empty segments. `None` if the path climbs above
/// the archive root.
fn normalize(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

/// Archive path a link entry points at. Hard link targets are archive paths;
/// symlink targets are relative to the link's own directory.
fn link_target(name: &str, target: &str, symbolic: bool) -> Option<String> {
    if !symbolic {
        return normalize(target);
    }
    if target.starts_with('/') {
        return None;
    }
    let dir = name.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{dir}/{target}"))
}

/// Follow links until a data entry is reached
fn resolve(
    name: &str,
    raw: &HashMap<String, RawEntry>,
    by_path: &HashMap<String, String>,
) -> EntrySource {
    let mut current = name.to_string();
    for _ in 0..=MAX_LINK_HOPS {
        match raw.get(&current) {
            Some(RawEntry::Data(location)) => return EntrySource::Data(*location),
            Some(RawEntry::Unsupported(kind)) => {
                return EntrySource::Unreadable(format!("{kind:?} entries have no readable content"));
            }
            Some(RawEntry::Link(Some(target))) => match by_path.get(target) {
                Some(next) => current = next.clone(),
                None => {
                    return EntrySource::Unreadable(format!(
                        "link target {target:?} is not a file in the archive"
                    ));
                }
            },
            Some(RawEntry::Link(None)) => {
                return EntrySource::Unreadable("link points outside the archive".to_string());
            }
            None => return EntrySource::Unreadable(format!("{current:?} is not indexed")),
        }
    }
    EntrySource::Unreadable(format!("more than {MAX_LINK_HOPS} links in a chain"))
}

type Index = (HashMap<String, EntrySource>, Vec<String>);

/// Read every tar header once, recording where each member's data sits and
/// resolving links to the data they name
fn build_index(tar_path: &Path) -> Result<Index, ExtractError> {
    let file = File::open(tar_path).map_err(ExtractError::Scratch)?;
    let file_len = file.metadata().map_err(ExtractError::Scratch)?.len();
    if file_len == 0 {
        return Err(ExtractError::InvalidArchive("empty file".to_string()));
    }

    let mut archive = ::tar::Archive::new(BufReader::new(file));
    let entries = archive
        .entries_with_seek()
        .map_err(|e| invalid("failed to read tar headers", e))?;

    let mut raw: HashMap<String, RawEntry> = HashMap::new();
    // Normalized archive path -> entry name as written in the archive
    let mut by_path: HashMap<String, String> = HashMap::new();
    let mut names = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| invalid("failed to read tar entry", e))?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let entry_type = entry.header().entry_type();

        let record = match entry_type {
            kind if kind.is_dir() || name.ends_with('/') => {
                debug!(name = %name, "skipping directory");
                continue;
            }
            // Metadata members, never extracted on their own
            ::tar::EntryType::XGlobalHeader
            | ::tar::EntryType::XHeader
            | ::tar::EntryType::GNULongName
            | ::tar::EntryType::GNULongLink => continue,
            ::tar::EntryType::Regular | ::tar::EntryType::Continuous => {
                let offset = entry.raw_file_position();
                let size = entry.size();
                let end = offset.checked_add(size).ok_or_else(|| {
                    ExtractError::InvalidArchive(format!("entry {name:?} has an impossible size"))
                })?;
                if end > file_len {
                    return Err(ExtractError::InvalidArchive(format!(
                        "entry {name:?} runs past the end of the archive"
                    )));
                }
                RawEntry::Data(EntryLocation { offset, size })
            }
            ::tar::EntryType::Link | ::tar::EntryType::Symlink => {
                let target = entry
                    .link_name_bytes()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_default();
                let symbolic = entry_type == ::tar::EntryType::Symlink;
                RawEntry::Link(link_target(&name, &target, symbolic))
            }
            other => RawEntry::Unsupported(other),
        };

        if let Some(path) = normalize(&name) {
            by_path.insert(path, name.clone());
        }

        // A later entry with the same name replaces the earlier one, as `tar -x` would
        if raw.insert(name.clone(), record).is_none() {
            names.push(name);
        }
    }

    let index = names
        .iter()
        .map(|name| (name.clone(), resolve(name, &raw, &by_path)))
        .collect();

    Ok((index, names))
}
