//! Resolution of artifact references to files and public URLs.

use std::io;
use std::path::{Path, PathBuf};

/// Where stage inputs are found and outputs are written.
pub trait ArtifactStore: Send + Sync {
    /// Path of an existing artifact, or `None` if there is no such file.
    fn locate(&self, reference: &str) -> Option<PathBuf>;

    /// Path an output artifact should be written to. Parent directories
    /// are created.
    fn output_path(&self, name: &str) -> io::Result<PathBuf>;

    /// URL prefix under which artifacts are served, ending in `/`.
    fn base_url(&self) -> &str;

    /// Public URL of the artifact `name`.
    fn url_for(&self, name: &str) -> String {
        format!("{}{}", self.base_url(), name)
    }
}

/// All artifacts live flat under a single directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    base_url: String,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            root: root.into(),
            base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_plain_name(reference: &str) -> bool {
    !reference.is_empty()
        && !reference.contains(['/', '\\', '\0'])
        && reference != "."
        && reference != ".."
}

impl ArtifactStore for LocalArtifactStore {
    fn locate(&self, reference: &str) -> Option<PathBuf> {
        if !is_plain_name(reference) {
            return None;
        }
        let path = self.root.join(reference);
        path.is_file().then_some(path)
    }

    fn output_path(&self, name: &str) -> io::Result<PathBuf> {
        if !is_plain_name(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not an artifact name: {name:?}"),
            ));
        }
        std::fs::create_dir_all(&self.root)?;
        Ok(self.root.join(name))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
