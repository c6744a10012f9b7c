//! File copy step.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::output;
use crate::paths;

/// Parse an octal permission string such as `"755"` or `"0644"`.
///
/// Empty means "leave the default mode". Each digit must be 0-7 and at most
/// four digits are accepted.
pub fn parse_permissions(permissions: &str) -> Result<Option<u32>> {
    if permissions.is_empty() {
        return Ok(None);
    }
    if permissions.len() > 4 || !permissions.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        return Err(Error::InvalidPermissions(permissions.to_string()));
    }
    u32::from_str_radix(permissions, 8)
        .map(Some)
        .map_err(|_| Error::InvalidPermissions(permissions.to_string()))
}

/// Copy `src` to `destination`.
///
/// An existing destination is left untouched unless `overwrite` is set.
pub fn copy_file(src: &Path, destination: &Path, overwrite: bool, permissions: &str) -> Result<()> {
    let mode = parse_permissions(permissions)?;
    let dest = paths::normalize(destination)?;

    if !overwrite && dest.exists() {
        output::skip(&format!(
            "{} exists and overwrite is false, skipping copy",
            dest.display()
        ));
        return Ok(());
    }

    let reader = File::open(src).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("cannot open {}: {}", src.display(), e),
        ))
    })?;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = File::create(&dest).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("cannot create {}: {}", dest.display(), e),
        ))
    })?;

    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);
    std::io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    drop(writer);

    if let Some(mode) = mode {
        set_mode(&dest, mode)?;
    }

    output::detail(&format!("copied {} -> {}", src.display(), dest.display()));
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    // Only the owner write bit maps onto Windows file attributes.
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}
