use crate::errors::{ConsistencyWarning, MaskError, Result, WarningLog};
use crate::mask::Mask;
use crate::options::{LoadOptions, WriteOptions};
use crate::{fits, ply};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk mask representation, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskFormat {
    /// `.ply` / `.pol` text with optional sibling column files.
    Text,
    /// `.fits` binary table.
    Binary,
}

impl MaskFormat {
    /// # Errors
    /// Returns a format error for any extension other than `ply`, `pol` or `fits`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("ply") | Some("pol") => Ok(Self::Text),
            Some("fits") => Ok(Self::Binary),
            Some(other) => Err(MaskError::format(
                path.display(),
                &format!("unknown mask extension '.{}'", other),
            )),
            None => Err(MaskError::format(path.display(), "mask file has no extension")),
        }
    }
}

impl Mask {
    /// Loads a mask with default options. The format follows the extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Mask> {
        Self::open_with(path, &LoadOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Mask> {
        Self::open_with_report(path, options).map(|(mask, _)| mask)
    }

    /// Loads a mask and returns every consistency warning raised on the way.
    ///
    /// Ids are reconciled before returning, see [`crate::mask`].
    ///
    /// # Errors
    /// Returns a format error for a missing file, an unknown extension, or
    /// content that is not a mask.
    pub fn open_with_report(
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<(Mask, Vec<ConsistencyWarning>)> {
        let path = path.as_ref();
        let format = MaskFormat::from_path(path)?;
        if !path.is_file() {
            return Err(MaskError::format(path.display(), "file not found"));
        }

        let mut log = WarningLog::new();
        let mut mask = match format {
            MaskFormat::Text => ply::read(path, options, &mut log)?,
            MaskFormat::Binary => fits::read(path)?,
        };
        mask.reconcile_ids(options.keep_ids, &mut log)?;

        tracing::debug!(
            path = %path.display(),
            ?format,
            polygons = mask.len(),
            columns = mask.columns().len(),
            "loaded mask"
        );
        Ok((mask, log.into_inner()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.save_with(path, &WriteOptions::default())
    }

    pub fn save_with(&self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
        self.save_with_report(path, options).map(|_| ())
    }

    /// Writes the mask in the format named by the extension.
    ///
    /// A failed write may leave a partial file behind.
    pub fn save_with_report(
        &self,
        path: impl AsRef<Path>,
        options: &WriteOptions,
    ) -> Result<Vec<ConsistencyWarning>> {
        let path = path.as_ref();
        let mut log = WarningLog::new();
        match MaskFormat::from_path(path)? {
            MaskFormat::Text => ply::write(self, path, options)?,
            MaskFormat::Binary => fits::write(self, path, options, &mut log)?,
        }
        Ok(log.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(MaskFormat::from_path(Path::new("a/b.ply")).unwrap(), MaskFormat::Text);
        assert_eq!(MaskFormat::from_path(Path::new("b.POL")).unwrap(), MaskFormat::Text);
        assert_eq!(MaskFormat::from_path(Path::new("b.fits")).unwrap(), MaskFormat::Binary);
        assert!(matches!(
            MaskFormat::from_path(Path::new("b.txt")),
            Err(MaskError::Format { .. })
        ));
        assert!(MaskFormat::from_path(Path::new("mask")).is_err());
    }

    #[test]
    fn test_missing_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Mask::open(dir.path().join("absent.ply")).unwrap_err();
        assert!(matches!(err, MaskError::Format { .. }));
    }
}
