//! Archive extraction step
//!
//! Native extraction for zip, tar, tar.gz and tar.bz2; no external tools.
//!
//! Every member is checked before it is written: its output path must stay
//! lexically inside the destination after cleaning, and link entries must
//! point inside the destination too. A violation aborts with
//! [`Error::PathTraversal`]. Members written before the failing one stay on
//! disk; callers needing atomicity extract into a temporary directory and
//! rename.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::output;
use crate::paths;
use crate::recipe::ArchiveType;

fn traversal(dest: &Path, member: &Path) -> Error {
    Error::PathTraversal {
        dest: dest.to_path_buf(),
        member: member.display().to_string(),
    }
}

/// Resolve a member path under `dest`, rejecting anything that escapes it.
fn member_path(dest: &Path, member: &Path) -> Result<PathBuf> {
    if member.is_absolute()
        || member
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(traversal(dest, member));
    }
    let full = paths::clean(&dest.join(member));
    if !paths::within(dest, &full) {
        return Err(traversal(dest, member));
    }
    Ok(full)
}

fn ensure_no_symlink_components(dest: &Path, full_path: &Path) -> Result<()> {
    let rel = full_path
        .strip_prefix(dest)
        .map_err(|_| traversal(dest, full_path))?;

    // Writing through an existing symlink could land outside `dest` even
    // when the member path itself is clean.
    let mut cur = dest.to_path_buf();
    for comp in rel.components() {
        cur.push(comp);
        if let Ok(md) = std::fs::symlink_metadata(&cur)
            && md.file_type().is_symlink()
        {
            return Err(traversal(dest, full_path));
        }
    }

    Ok(())
}

fn ensure_link_target_within_dest(dest: &Path, link_parent: &Path, link_name: &Path) -> Result<()> {
    if link_name.is_absolute()
        || link_name
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(traversal(dest, link_name));
    }

    let candidate = link_parent.join(link_name);
    if !paths::within(dest, &candidate) {
        return Err(traversal(dest, link_name));
    }

    Ok(())
}

/// Extract a tar stream (already decompressed) into `dest`.
fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        // Some archives contain a "." entry; treat it as a no-op.
        if path.as_os_str().is_empty() || path == Path::new(".") {
            continue;
        }

        let full_path = member_path(dest, &path)?;
        ensure_no_symlink_components(dest, &full_path)?;

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            std::fs::create_dir_all(&full_path)?;
            continue;
        }

        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if entry_type.is_hard_link() {
            let link_name = entry
                .link_name()?
                .ok_or_else(|| traversal(dest, &path))?
                .into_owned();
            // Hard link targets are archive-relative, not link-relative.
            ensure_link_target_within_dest(dest, dest, &link_name)?;
            let target = paths::clean(&dest.join(&link_name));
            ensure_no_symlink_components(dest, &target)?;
            hard_link(&target, &full_path)?;
            continue;
        }

        if entry_type.is_symlink() {
            let link_name = entry
                .link_name()?
                .ok_or_else(|| traversal(dest, &path))?
                .into_owned();
            let link_parent = full_path.parent().unwrap_or(dest);
            ensure_link_target_within_dest(dest, link_parent, &link_name)?;
        }

        entry.unpack(&full_path)?;
    }

    Ok(())
}

/// Link `link` to an already extracted `target`, replacing any file at `link`.
fn hard_link(target: &Path, link: &Path) -> Result<()> {
    if std::fs::symlink_metadata(link).is_ok_and(|md| !md.is_dir()) {
        std::fs::remove_file(link)?;
    }
    std::fs::hard_link(target, link).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "cannot link {} to {}: {}",
                link.display(),
                target.display(),
                e
            ),
        ))
    })
}

fn open(archive_path: &Path) -> Result<BufReader<File>> {
    let file = File::open(archive_path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("cannot open {}: {}", archive_path.display(), e),
        ))
    })?;
    Ok(BufReader::new(file))
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(zip_error)?;
        let name = PathBuf::from(file.name());
        let outpath = member_path(dest, &name)?;
        ensure_no_symlink_components(dest, &outpath)?;

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        std::io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
    }

    Ok(())
}

fn zip_error(e: zip::result::ZipError) -> Error {
    match e {
        zip::result::ZipError::Io(io) => Error::Io(io),
        other => Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("zip error: {}", other),
        )),
    }
}

/// Extract `archive` into `destination` according to `archive_type`.
///
/// `tar.lzma`, `tar.xz` and an unspecified type are rejected before the
/// destination is created.
pub fn extract(archive: &Path, destination: &Path, archive_type: ArchiveType) -> Result<()> {
    match archive_type {
        ArchiveType::Zip | ArchiveType::Tar | ArchiveType::TarGz | ArchiveType::TarBz2 => {}
        ArchiveType::TarLzma | ArchiveType::TarXz | ArchiveType::Unspecified => {
            return Err(Error::UnsupportedArchiveType(archive_type.to_string()));
        }
    }

    let dest = paths::normalize(destination)?;
    std::fs::create_dir_all(&dest)?;

    let filename = archive
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "archive".to_string());
    let pb = output::spinner(&format!("extracting {} ({})", filename, archive_type));

    let result = match archive_type {
        ArchiveType::Zip => extract_zip(archive, &dest),
        ArchiveType::Tar => open(archive).and_then(|r| extract_tar(r, &dest)),
        ArchiveType::TarGz => {
            open(archive).and_then(|r| extract_tar(flate2::read::GzDecoder::new(r), &dest))
        }
        ArchiveType::TarBz2 => {
            open(archive).and_then(|r| extract_tar(bzip2::read::BzDecoder::new(r), &dest))
        }
        ArchiveType::TarLzma | ArchiveType::TarXz | ArchiveType::Unspecified => {
            Err(Error::UnsupportedArchiveType(archive_type.to_string()))
        }
    };

    pb.finish_and_clear();
    result?;
    output::detail(&format!("extracted {} to {}", filename, dest.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_header(len: usize, mode: u32) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_size(len as u64);
        header.set_mode(mode);
        header.set_cksum();
        header
    }

    /// Write a tar header with an arbitrary name, bypassing the builder's
    /// own path validation.
    fn raw_tar_with_member(name: &str, content: &[u8]) -> Vec<u8> {
        let mut header = tar::Header::new_old();
        {
            let bytes = header.as_mut_bytes();
            bytes[..name.len()].copy_from_slice(name.as_bytes());
        }
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();

        let mut out = header.as_bytes().to_vec();
        out.extend_from_slice(content);
        out.resize(out.len().div_ceil(512) * 512, 0);
        out.extend_from_slice(&[0u8; 1024]);
        out
    }

    #[test]
    fn test_extract_tar_gz() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("test.tar.gz");
        let extract_dir = temp_dir.path().join("extracted");

        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let content = b"Hello, World!";
        builder
            .append_data(&mut file_header(content.len(), 0o644), "test.txt", &content[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        extract(&archive_path, &extract_dir, ArchiveType::TarGz).unwrap();

        assert_eq!(
            std::fs::read_to_string(extract_dir.join("test.txt")).unwrap(),
            "Hello, World!"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_tar_bz2_preserves_mode_and_nesting() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("nested.tar.bz2");
        let extract_dir = temp_dir.path().join("extracted");

        let file = File::create(&archive_path).unwrap();
        let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let content = b"#!/bin/sh\necho hi\n";
        builder
            .append_data(&mut file_header(content.len(), 0o755), "foo/bar/run.sh", &content[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        extract(&archive_path, &extract_dir, ArchiveType::TarBz2).unwrap();

        let extracted = extract_dir.join("foo/bar/run.sh");
        assert_eq!(std::fs::read(&extracted).unwrap(), content);
        let mode = std::fs::metadata(&extracted).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_extract_plain_tar_with_dot_dot_inside_dest() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("inside.tar");
        let extract_dir = temp_dir.path().join("extracted");

        std::fs::write(&archive_path, raw_tar_with_member("a/../b.txt", b"ok")).unwrap();
        extract(&archive_path, &extract_dir, ArchiveType::Tar).unwrap();
        assert_eq!(std::fs::read(extract_dir.join("b.txt")).unwrap(), b"ok");
    }

    #[test]
    fn test_extract_tar_rejects_parent_traversal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("evil.tar");
        let extract_dir = temp_dir.path().join("dst");

        std::fs::write(&archive_path, raw_tar_with_member("../../evil", b"pwned")).unwrap();
        let err = extract(&archive_path, &extract_dir, ArchiveType::Tar).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }), "{err:?}");
        assert!(!temp_dir.path().join("evil").exists());
    }

    #[test]
    fn test_extract_tar_rejects_absolute_member() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("abs.tar");
        let extract_dir = temp_dir.path().join("dst");
        let target = temp_dir.path().join("abs-evil");
        let name = target.to_string_lossy().into_owned();

        std::fs::write(&archive_path, raw_tar_with_member(&name, b"pwned")).unwrap();
        let err = extract(&archive_path, &extract_dir, ArchiveType::Tar).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }), "{err:?}");
        assert!(!target.exists());
    }

    #[test]
    fn test_extract_tar_blocks_symlink_escape() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("escape.tar.gz");
        let extract_dir = temp_dir.path().join("extracted");

        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        // Symlink "a" -> "/" then attempt to write "a/evil.txt".
        let mut link_header = tar::Header::new_gnu();
        link_header.set_entry_type(tar::EntryType::Symlink);
        link_header.set_size(0);
        link_header.set_mode(0o777);
        link_header.set_link_name("/").unwrap();
        link_header.set_cksum();
        builder
            .append_data(&mut link_header, "a", std::io::empty())
            .unwrap();
        let content = b"pwned";
        builder
            .append_data(&mut file_header(content.len(), 0o644), "a/evil.txt", &content[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = extract(&archive_path, &extract_dir, ArchiveType::TarGz).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }), "{err:?}");
        assert!(!extract_dir.join("a/evil.txt").exists());
    }

    #[test]
    fn test_extract_tar_blocks_hardlink_outside_dest() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("hardlink.tar.gz");
        let extract_dir = temp_dir.path().join("extracted");

        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Link);
        header.set_size(0);
        header.set_mode(0o777);
        header.set_link_name("/etc/passwd").unwrap();
        header.set_cksum();
        builder
            .append_data(&mut header, "hl", std::io::empty())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = extract(&archive_path, &extract_dir, ArchiveType::TarGz).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }), "{err:?}");
    }

    fn tar_with_hard_link(path: &Path, files: &[(&str, &[u8])], link: &str, target: &str) {
        let mut builder = tar::Builder::new(File::create(path).unwrap());
        for (name, content) in files {
            builder
                .append_data(&mut file_header(content.len(), 0o644), name, *content)
                .unwrap();
        }
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Link);
        header.set_size(0);
        header.set_mode(0o644);
        header.set_link_name(target).unwrap();
        header.set_cksum();
        builder
            .append_data(&mut header, link, std::io::empty())
            .unwrap();
        builder.into_inner().unwrap();
    }

    #[test]
    fn test_extract_tar_hard_link_inside_archive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("links.tar");
        let extract_dir = temp_dir.path().join("extracted");
        tar_with_hard_link(&archive_path, &[("a.txt", b"shared")], "b.txt", "a.txt");

        extract(&archive_path, &extract_dir, ArchiveType::Tar).unwrap();

        assert_eq!(std::fs::read(extract_dir.join("b.txt")).unwrap(), b"shared");
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let a = std::fs::metadata(extract_dir.join("a.txt")).unwrap();
            let b = std::fs::metadata(extract_dir.join("b.txt")).unwrap();
            assert_eq!(a.ino(), b.ino());
        }
    }

    #[test]
    fn test_extract_tar_hard_link_ignores_working_directory() {
        // Cargo.toml exists in the test's working directory but not in the
        // archive, so the link has nothing inside dest to point at.
        assert!(Path::new("Cargo.toml").exists());
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("cwd.tar");
        let extract_dir = temp_dir.path().join("extracted");
        tar_with_hard_link(&archive_path, &[], "Cargo.toml", "Cargo.toml");

        let err = extract(&archive_path, &extract_dir, ArchiveType::Tar).unwrap_err();
        assert!(
            matches!(&err, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound),
            "{err:?}"
        );
        assert!(!extract_dir.join("Cargo.toml").exists());
    }

    #[test]
    fn test_extract_zip_with_nested_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("nested.zip");
        let extract_dir = temp_dir.path().join("extracted");

        let file = File::create(&archive_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.add_directory("foo/bar/", options).unwrap();
        zip.start_file("foo/bar/baz.txt", options).unwrap();
        zip.write_all(b"nested zip content").unwrap();
        zip.finish().unwrap();

        extract(&archive_path, &extract_dir, ArchiveType::Zip).unwrap();

        assert_eq!(
            std::fs::read_to_string(extract_dir.join("foo/bar/baz.txt")).unwrap(),
            "nested zip content"
        );
    }

    #[test]
    fn test_extract_zip_rejects_traversal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("evil.zip");
        let extract_dir = temp_dir.path().join("dst");

        let file = File::create(&archive_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("../../evil", options).unwrap();
        zip.write_all(b"pwned").unwrap();
        zip.finish().unwrap();

        let err = extract(&archive_path, &extract_dir, ArchiveType::Zip).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }), "{err:?}");
        assert!(!temp_dir.path().join("evil").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_zip_preserves_mode() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("tools.zip");
        let extract_dir = temp_dir.path().join("extracted");

        let file = File::create(&archive_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(
            "bin/tool",
            zip::write::SimpleFileOptions::default().unix_permissions(0o755),
        )
        .unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.start_file(
            "etc/tool.conf",
            zip::write::SimpleFileOptions::default().unix_permissions(0o600),
        )
        .unwrap();
        zip.write_all(b"key = value\n").unwrap();
        zip.finish().unwrap();

        extract(&archive_path, &extract_dir, ArchiveType::Zip).unwrap();

        let mode = |p: &str| {
            std::fs::metadata(extract_dir.join(p))
                .unwrap()
                .permissions()
                .mode()
                & 0o777
        };
        assert_eq!(mode("bin/tool"), 0o755);
        assert_eq!(mode("etc/tool.conf"), 0o600);
    }

    #[test]
    fn test_extract_zip_rejects_absolute_member() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("abs.zip");
        let extract_dir = temp_dir.path().join("dst");
        let target = temp_dir.path().join("abs-evil");

        let file = File::create(&archive_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file(target.to_string_lossy(), options).unwrap();
        zip.write_all(b"pwned").unwrap();
        zip.finish().unwrap();

        let err = extract(&archive_path, &extract_dir, ArchiveType::Zip).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }), "{err:?}");
        assert!(!target.exists());
    }

    #[test]
    fn test_unsupported_types_fail_before_creating_destination() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive_path = temp_dir.path().join("x.tar.xz");
        std::fs::write(&archive_path, b"not really").unwrap();

        for archive_type in [ArchiveType::TarXz, ArchiveType::TarLzma, ArchiveType::Unspecified] {
            let dest = temp_dir.path().join(format!("out-{archive_type}"));
            let err = extract(&archive_path, &dest, archive_type).unwrap_err();
            assert!(matches!(err, Error::UnsupportedArchiveType(_)), "{err:?}");
            assert!(!dest.exists());
        }
    }
}
