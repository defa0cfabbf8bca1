//! Local filesystem document reader.

use std::path::Path;

use fathom_domain::error::{Error, Result};

use crate::traits::DocReader;

pub struct FsDocReader;

#[async_trait::async_trait]
impl DocReader for FsDocReader {
    async fn read(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(Error::capability(
                "read_document",
                format!("no such file: {}", path.display()),
            ));
        }
        let text = tokio::fs::read_to_string(path).await.map_err(Error::Io)?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "contents").unwrap();

        let text = FsDocReader.read(&path).await.unwrap();
        assert_eq!(text, "contents");
    }

    #[tokio::test]
    async fn missing_file_is_a_capability_error() {
        let err = FsDocReader.read(Path::new("/nope/missing.txt")).await;
        assert!(matches!(err, Err(Error::Capability { .. })));
    }
}
