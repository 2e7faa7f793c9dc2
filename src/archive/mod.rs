//! Archive detection and normalization.
//!
//! Raw artifacts arrive as whatever the sharing service handed over: a plain
//! file or a zip with any number of members. Callers asked for exactly one
//! file at the target path, so multi-member archives are extracted and
//! repacked into a single canonical archive, single-member archives are
//! unwrapped, and anything that fails archive handling degrades to keeping
//! the raw bytes. Extraction is an enhancement, never a reason to throw away
//! a completed download.

mod validate;

pub use validate::{ValidationError, validate_target};

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("archive has no file entries")]
    EmptyArchive,
}

pub type Result<T> = std::result::Result<T, NormalizeError>;

/// How the raw artifact ended up at the target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Archive held a single member, now sitting unwrapped at the target.
    SingleMember { member: String },
    /// Archive tree was repacked into one canonical file at the target.
    /// `members` is the number of files carried over; a count of one means
    /// the lone file was copied directly instead of being wrapped again.
    Repacked { members: usize },
    /// Archive handling failed; the unmodified raw artifact was kept.
    KeptRaw { reason: String },
}

/// True iff the file opens as a valid zip archive.
pub fn is_zip_archive(path: &Path) -> bool {
    match File::open(path) {
        Ok(file) => ZipArchive::new(file).is_ok(),
        Err(_) => false,
    }
}

/// Normalize `raw` into a single file at `target`.
///
/// Archive failures degrade: the raw artifact is moved to the target as-is
/// and the returned [`Disposition::KeptRaw`] carries the reason. Only the
/// final placement itself can fail here.
pub fn normalize(raw: &Path, target: &Path) -> io::Result<Disposition> {
    match extract_and_normalize(raw, target) {
        Ok(disposition) => Ok(disposition),
        Err(err) => {
            warn!(
                raw = %raw.display(),
                error = %err,
                "extraction failed, keeping archive as-is"
            );
            replace_file(raw, target)?;
            Ok(Disposition::KeptRaw {
                reason: err.to_string(),
            })
        }
    }
}

fn extract_and_normalize(raw: &Path, target: &Path) -> Result<Disposition> {
    let file = File::open(raw)?;
    let mut archive = ZipArchive::new(file)?;

    debug!(
        raw = %raw.display(),
        entries = archive.len(),
        "inspecting archive"
    );

    match archive.len() {
        0 => Err(NormalizeError::EmptyArchive),
        1 => {
            let member = extract_single(&mut archive, target)?;
            fs::remove_file(raw)?;
            info!(member, target = %target.display(), "extracted single member");
            Ok(Disposition::SingleMember { member })
        }
        _ => {
            let members = extract_and_repack(&mut archive, target)?;
            fs::remove_file(raw)?;
            info!(members, target = %target.display(), "repacked archive");
            Ok(Disposition::Repacked { members })
        }
    }
}

/// Extract the lone member through a sibling staging path, then atomically
/// replace the target with it.
fn extract_single(archive: &mut ZipArchive<File>, target: &Path) -> Result<String> {
    let staging = staging_sibling(target, "extract.part");

    let copied = (|| -> Result<String> {
        let mut entry = archive.by_index(0)?;
        let member = entry.name().to_string();
        let mut out = File::create(&staging)?;
        io::copy(&mut entry, &mut out)?;
        Ok(member)
    })();

    match copied {
        Ok(member) => {
            replace_file(&staging, target)?;
            Ok(member)
        }
        Err(err) => {
            let _ = fs::remove_file(&staging);
            Err(err)
        }
    }
}

/// Extract every member into a staging directory named after the target's
/// stem, then repack the full file tree into one file at the target. The
/// staging directory is removed whether repacking succeeded or not.
fn extract_and_repack(archive: &mut ZipArchive<File>, target: &Path) -> Result<usize> {
    let staging_dir = staging_dir_for(target);
    fs::create_dir_all(&staging_dir)?;

    let repacked = (|| -> Result<usize> {
        archive.extract(&staging_dir)?;
        repack_tree(&staging_dir, target)
    })();

    let _ = fs::remove_dir_all(&staging_dir);
    repacked
}

/// Pack every file under `root` (recursively, directories themselves
/// excluded) into a single file at `target`: one file is copied directly,
/// more than one becomes a deflate-compressed zip with paths kept relative
/// to `root`.
fn repack_tree(root: &Path, target: &Path) -> Result<usize> {
    let files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    match files.len() {
        0 => Err(NormalizeError::EmptyArchive),
        1 => {
            replace_file(&files[0], target)?;
            Ok(1)
        }
        count => {
            let staging = staging_sibling(target, "repack.part");

            let written = (|| -> Result<()> {
                let mut writer = ZipWriter::new(File::create(&staging)?);
                let options =
                    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

                for path in &files {
                    let relative = path
                        .strip_prefix(root)
                        .expect("walked path is under staging root");
                    let name = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");

                    writer.start_file(name, options)?;
                    let mut input = File::open(path)?;
                    io::copy(&mut input, &mut writer)?;
                }

                writer.finish()?;
                Ok(())
            })();

            match written {
                Ok(()) => {
                    replace_file(&staging, target)?;
                    Ok(count)
                }
                Err(err) => {
                    let _ = fs::remove_file(&staging);
                    Err(err)
                }
            }
        }
    }
}

/// Move `src` over `dst`, removing any file already there first. Falls back
/// to copy-and-remove when rename crosses a filesystem boundary (temp dirs
/// frequently live on a different mount than the models tree).
pub fn replace_file(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        fs::remove_file(dst)?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst)?;
            fs::remove_file(src)?;
            Ok(())
        }
    }
}

fn staging_sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    name.push('.');
    name.push_str(suffix);
    target.with_file_name(name)
}

fn staging_dir_for(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "extracted".to_string());
    target.with_file_name(stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn detects_zip_and_non_zip() {
        let dir = TempDir::new().unwrap();

        let plain = dir.path().join("plain.bin");
        fs::write(&plain, b"just bytes").unwrap();
        assert!(!is_zip_archive(&plain));

        let zipped = dir.path().join("archive.zip");
        write_zip(&zipped, &[("a.txt", b"hello")]);
        assert!(is_zip_archive(&zipped));

        assert!(!is_zip_archive(&dir.path().join("missing.zip")));
    }

    #[test]
    fn single_member_unwraps_to_target() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("raw.tmp");
        let target = dir.path().join("model.safetensors");
        write_zip(&raw, &[("inner/model.bin", b"weights")]);

        let disposition = normalize(&raw, &target).unwrap();

        assert_eq!(
            disposition,
            Disposition::SingleMember {
                member: "inner/model.bin".to_string()
            }
        );
        assert_eq!(fs::read(&target).unwrap(), b"weights");
        assert!(!raw.exists());
        // no stray staging artifacts
        assert!(!dir.path().join("model.safetensors.extract.part").exists());
    }

    #[test]
    fn multi_member_repacks_round_trip() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("raw.tmp");
        let target = dir.path().join("bundle.zip");
        let entries: &[(&str, &[u8])] = &[
            ("a.txt", b"alpha"),
            ("sub/b.txt", b"beta"),
            ("sub/deep/c.txt", b"gamma"),
        ];
        write_zip(&raw, entries);

        let disposition = normalize(&raw, &target).unwrap();
        assert_eq!(disposition, Disposition::Repacked { members: 3 });
        assert!(!raw.exists());
        assert!(!dir.path().join("bundle").exists(), "staging dir leaked");

        // the repacked file must unpack to identical content under the same
        // relative paths
        let mut repacked = ZipArchive::new(File::open(&target).unwrap()).unwrap();
        assert_eq!(repacked.len(), 3);
        for (name, data) in entries {
            let mut entry = repacked.by_name(name).unwrap();
            let mut content = Vec::new();
            io::copy(&mut entry, &mut content).unwrap();
            assert_eq!(&content, data, "member {name} differs");
        }
    }

    #[test]
    fn repack_of_single_file_tree_copies_directly() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("raw.tmp");
        let target = dir.path().join("model.bin");
        // two entries where one is a directory-only prefix: the tree holds
        // exactly one file after extraction
        let mut writer = ZipWriter::new(File::create(&raw).unwrap());
        let options = SimpleFileOptions::default();
        writer.add_directory("nested/", options).unwrap();
        writer.start_file("nested/only.bin", options).unwrap();
        writer.write_all(b"payload").unwrap();
        writer.finish().unwrap();

        let disposition = normalize(&raw, &target).unwrap();

        assert_eq!(disposition, Disposition::Repacked { members: 1 });
        assert_eq!(fs::read(&target).unwrap(), b"payload");
        assert!(!is_zip_archive(&target));
    }

    #[test]
    fn corrupt_archive_degrades_to_kept_raw() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("raw.tmp");
        let target = dir.path().join("model.bin");

        // stored payload appears verbatim; flipping a byte inside it leaves
        // the central directory intact but breaks the CRC on extraction
        write_zip(&raw, &[("a.bin", b"payload-payload-payload")]);
        let mut bytes = fs::read(&raw).unwrap();
        let pos = bytes
            .windows(b"payload-payload-payload".len())
            .position(|w| w == b"payload-payload-payload")
            .unwrap();
        bytes[pos] ^= 0xFF;
        fs::write(&raw, &bytes).unwrap();
        assert!(is_zip_archive(&raw));

        let disposition = normalize(&raw, &target).unwrap();

        assert!(matches!(disposition, Disposition::KeptRaw { .. }));
        assert_eq!(fs::read(&target).unwrap(), bytes);
        assert!(!raw.exists());
    }

    #[test]
    fn empty_archive_degrades_to_kept_raw() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("raw.tmp");
        let target = dir.path().join("model.bin");
        write_zip(&raw, &[]);

        let disposition = normalize(&raw, &target).unwrap();
        assert!(matches!(disposition, Disposition::KeptRaw { .. }));
        assert!(target.exists());
    }

    #[test]
    fn replace_file_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        fs::write(&src, b"new").unwrap();
        fs::write(&dst, b"old").unwrap();

        replace_file(&src, &dst).unwrap();

        assert_eq!(fs::read(&dst).unwrap(), b"new");
        assert!(!src.exists());
    }
}
