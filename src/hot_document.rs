use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::document::ShaderDocument;
use crate::error::DocumentError;

/// A document file that is re-parsed when it changes on disk.
pub struct HotDocument {
    path: PathBuf,
    last_modified: SystemTime,
    document: ShaderDocument,
}

impl HotDocument {
    /// Load a document from the given file path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref().to_path_buf();
        let last_modified = fs::metadata(&path)?.modified()?;
        let document = ShaderDocument::from_path(&path)?;

        Ok(Self {
            path,
            last_modified,
            document,
        })
    }

    /// Check if the file has been modified and re-parse it if so.
    /// Returns the new document; unreadable files are skipped until the next change.
    pub fn check_reload(&mut self) -> Option<&ShaderDocument> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        if modified <= self.last_modified {
            return None;
        }
        self.last_modified = modified;

        match ShaderDocument::from_path(&self.path) {
            Ok(document) => {
                log::info!("reloaded {}", self.path.display());
                if let Some(error) = document.error() {
                    log::warn!("{}: {error}", self.path.display());
                }
                self.document = document;
                Some(&self.document)
            }
            Err(e) => {
                log::warn!("reload of {} failed: {e}", self.path.display());
                None
            }
        }
    }

    pub fn document(&self) -> &ShaderDocument {
        &self.document
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DOC: &str = r#"{ "info": { "id": "hot" }, "renderpass": [{ "type": "image", "code": "A" }] }"#;

    #[test]
    fn reloads_on_newer_mtime() {
        let path = std::env::temp_dir().join(format!("toygraph-hot-{}.json", std::process::id()));
        fs::write(&path, DOC).unwrap();

        let mut hot = HotDocument::new(&path).unwrap();
        assert_eq!(hot.document().render_pass(0).unwrap().fragment_source(), "A");
        assert!(hot.check_reload().is_none());

        fs::write(&path, DOC.replace("\"A\"", "\"B\"")).unwrap();
        // Force a strictly newer timestamp regardless of filesystem resolution.
        let later = hot.last_modified + Duration::from_secs(2);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let reloaded = hot.check_reload().unwrap();
        assert_eq!(reloaded.render_pass(0).unwrap().fragment_source(), "B");
        assert!(hot.check_reload().is_none());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(HotDocument::new("/nonexistent/toygraph.json").is_err());
    }
}
