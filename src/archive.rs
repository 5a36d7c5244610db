//! Archive extraction with path-traversal guards.
//!
//! Go module zips, rustdoc zips (which use bzip2, zip method 12), and the
//! tar.gz payloads from gitiles and hex.pm all land in scratch directories
//! through these two functions. Entries that would escape the destination
//! are a [`Error::Corruption`].

use std::fs;
use std::path::{Component, Path};

use flate2::read::GzDecoder;

use crate::error::{Error, Result};

/// Extract a zip archive into `dest`.
pub fn unzip(zip_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|err| Error::corruption(format!("{}: {err}", zip_path.display())))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| Error::corruption(format!("{}: {err}", zip_path.display())))?;

        // `enclosed_name` rejects absolute paths and `..` components.
        let relative = entry.enclosed_name().ok_or_else(|| {
            Error::corruption(format!("invalid zip path: {}", entry.name()))
        })?;
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|err| Error::corruption(format!("{}: {err}", entry.name())))?;
    }
    Ok(())
}

/// Extract a gzip-compressed tarball into `dest`.
pub fn untar_gz(tar_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(tar_path)?;
    let gz = GzDecoder::new(file);
    let mut archive = tar::Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|err| Error::corruption(format!("{}: {err}", tar_path.display())))?
    {
        let mut entry =
            entry.map_err(|err| Error::corruption(format!("{}: {err}", tar_path.display())))?;
        let path = entry
            .path()
            .map_err(|err| Error::corruption(format!("{}: {err}", tar_path.display())))?
            .into_owned();

        if !is_safe_relative(&path) {
            return Err(Error::corruption(format!(
                "invalid archive path: {}",
                path.display()
            )));
        }

        let target = dest.join(&path);
        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if !entry.header().entry_type().is_file() {
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|err| Error::corruption(format!("{}: {err}", path.display())))?;
    }
    Ok(())
}

fn is_safe_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_zip(entries: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        let options: zip::write::SimpleFileOptions = Default::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    #[test]
    fn unzip_extracts_nested_files() {
        let zip = make_zip(&[
            ("mod@v1/go.mod", b"module example"),
            ("mod@v1/pkg/doc.go", b"package pkg"),
        ]);
        let dest = tempfile::tempdir().unwrap();
        unzip(zip.path(), dest.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dest.path().join("mod@v1/go.mod")).unwrap(),
            "module example"
        );
        assert_eq!(
            fs::read_to_string(dest.path().join("mod@v1/pkg/doc.go")).unwrap(),
            "package pkg"
        );
    }

    #[test]
    fn unzip_rejects_traversal() {
        let zip = make_zip(&[("../escape.txt", b"nope")]);
        let dest = tempfile::tempdir().unwrap();
        let err = unzip(zip.path(), dest.path()).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
        assert!(!dest.path().parent().unwrap().join("escape.txt").exists());
    }

    #[test]
    fn untar_gz_round_trip() {
        let tarball = tempfile::NamedTempFile::new().unwrap();
        {
            let gz = flate2::write::GzEncoder::new(
                tarball.reopen().unwrap(),
                flate2::Compression::default(),
            );
            let mut builder = tar::Builder::new(gz);
            let data = b"package fmt";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "fmt/doc.go", &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = tempfile::tempdir().unwrap();
        untar_gz(tarball.path(), dest.path()).unwrap();
        assert_eq!(
            fs::read_to_string(dest.path().join("fmt/doc.go")).unwrap(),
            "package fmt"
        );
    }

    #[test]
    fn corrupt_archives_are_corruption_errors() {
        let bogus = tempfile::NamedTempFile::new().unwrap();
        fs::write(bogus.path(), b"not an archive").unwrap();
        let dest = tempfile::tempdir().unwrap();

        assert!(matches!(
            unzip(bogus.path(), dest.path()).unwrap_err(),
            Error::Corruption(_)
        ));
        assert!(matches!(
            untar_gz(bogus.path(), dest.path()).unwrap_err(),
            Error::Corruption(_)
        ));
    }
}
