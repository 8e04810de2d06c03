//! Deterministic archive writers and readers.
//!
//! Entries are directories and regular files, written in the order given,
//! with fixed timestamps, ownership and permissions. The same entries in the
//! same order always produce the same archive bytes.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::{ArchiveFormat, FileRecord, PackageError};
use crate::util::hash::{ContentHash, HashingReader};

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

/// One archive member, named by its `/`-separated path without a trailing slash.
pub enum Entry<'a> {
  Directory(&'a str),
  File { name: &'a str, source: &'a Path },
}

impl Entry<'_> {
  pub fn name(&self) -> &str {
    match self {
      Entry::Directory(name) | Entry::File { name, .. } => name,
    }
  }

  /// Ordering key: directories sort as `name/`, ahead of their contents.
  pub fn sort_key(&self) -> String {
    match self {
      Entry::Directory(name) => format!("{}/", name),
      Entry::File { name, .. } => name.to_string(),
    }
  }
}

/// Everything an archive holds, in archive order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
  pub directories: Vec<String>,
  pub files: Vec<FileRecord>,
}

/// Write `entries` to `dest`, returning what was written.
pub fn write_archive(format: ArchiveFormat, dest: &Path, entries: &[Entry<'_>]) -> Result<Listing, PackageError> {
  let file = File::create(dest).map_err(PackageError::write(dest))?;
  match format {
    ArchiveFormat::Zip => write_zip(file, dest, entries),
    ArchiveFormat::TarGz => write_tar_gz(file, dest, entries),
  }
}

fn open_source(source: &Path) -> Result<(HashingReader<BufReader<File>>, u64), PackageError> {
  let file = File::open(source).map_err(PackageError::read(source))?;
  let len = file.metadata().map_err(PackageError::read(source))?.len();
  Ok((HashingReader::new(BufReader::new(file)), len))
}

fn record(name: &str, reader: HashingReader<BufReader<File>>) -> FileRecord {
  let (size_bytes, checksum) = reader.finish();
  FileRecord {
    path: name.to_string(),
    size_bytes,
    checksum,
  }
}

fn write_zip(file: File, dest: &Path, entries: &[Entry<'_>]) -> Result<Listing, PackageError> {
  let mut writer = ZipWriter::new(BufWriter::new(file));
  let mut listing = Listing::default();

  for entry in entries {
    match entry {
      Entry::Directory(name) => {
        let options = SimpleFileOptions::default()
          .last_modified_time(DateTime::default())
          .unix_permissions(DIR_MODE);
        writer.add_directory(*name, options)?;
        listing.directories.push(name.to_string());
      }
      Entry::File { name, source } => {
        let (mut reader, len) = open_source(source)?;
        let options = SimpleFileOptions::default()
          .compression_method(CompressionMethod::Deflated)
          .last_modified_time(DateTime::default())
          .unix_permissions(FILE_MODE)
          .large_file(len >= u32::MAX as u64);
        writer.start_file(*name, options)?;
        io::copy(&mut reader, &mut writer).map_err(PackageError::read(source))?;
        listing.files.push(record(name, reader));
      }
    }
  }

  let mut inner = writer.finish()?;
  inner.flush().map_err(PackageError::write(dest))?;
  Ok(listing)
}

fn tar_header(entry_type: tar::EntryType, size: u64, mode: u32) -> tar::Header {
  let mut header = tar::Header::new_gnu();
  header.set_entry_type(entry_type);
  header.set_size(size);
  header.set_mode(mode);
  header.set_mtime(0);
  header.set_uid(0);
  header.set_gid(0);
  header
}

fn write_tar_gz(file: File, dest: &Path, entries: &[Entry<'_>]) -> Result<Listing, PackageError> {
  let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
  let mut builder = tar::Builder::new(encoder);
  let mut listing = Listing::default();

  for entry in entries {
    match entry {
      Entry::Directory(name) => {
        let mut header = tar_header(tar::EntryType::Directory, 0, DIR_MODE);
        builder
          .append_data(&mut header, name, io::empty())
          .map_err(PackageError::write(dest))?;
        listing.directories.push(name.to_string());
      }
      Entry::File { name, source } => {
        let (mut reader, len) = open_source(source)?;
        let mut header = tar_header(tar::EntryType::Regular, len, FILE_MODE);
        builder
          .append_data(&mut header, name, &mut reader)
          .map_err(PackageError::write(dest))?;
        listing.files.push(record(name, reader));
      }
    }
  }

  let encoder = builder.into_inner().map_err(PackageError::write(dest))?;
  let mut inner = encoder.finish().map_err(PackageError::write(dest))?;
  inner.flush().map_err(PackageError::write(dest))?;
  Ok(listing)
}

/// Read back every directory and regular file in an archive, in archive order.
pub fn read_archive(format: ArchiveFormat, path: &Path) -> Result<Listing, PackageError> {
  let file = File::open(path).map_err(PackageError::read(path))?;
  let mut listing = Listing::default();
  match format {
    ArchiveFormat::Zip => {
      let mut archive = ZipArchive::new(BufReader::new(file))?;
      for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = entry.name().trim_end_matches('/').to_string();
        if entry.is_dir() {
          listing.directories.push(name);
        } else {
          listing.files.push(hash_entry(name, entry, path)?);
        }
      }
    }
    ArchiveFormat::TarGz => {
      let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
      for entry in archive.entries().map_err(PackageError::read(path))? {
        let entry = entry.map_err(PackageError::read(path))?;
        let name = entry.path().map_err(PackageError::read(path))?.to_string_lossy().into_owned();
        let name = name.trim_end_matches('/').to_string();
        match entry.header().entry_type() {
          tar::EntryType::Directory => listing.directories.push(name),
          tar::EntryType::Regular => listing.files.push(hash_entry(name, entry, path)?),
          _ => {}
        }
      }
    }
  }
  Ok(listing)
}

fn hash_entry(name: String, reader: impl Read, archive: &Path) -> Result<FileRecord, PackageError> {
  let mut hashing = HashingReader::new(reader);
  io::copy(&mut hashing, &mut io::sink()).map_err(PackageError::read(archive))?;
  let (size_bytes, checksum): (u64, ContentHash) = hashing.finish();
  Ok(FileRecord {
    path: name,
    size_bytes,
    checksum,
  })
}
