use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{NotepadError, Result};
use crate::Page;

const NOTE_EXTENSION: &str = "txt";

// Owner read/write only
#[cfg(unix)]
const NOTE_MODE: u32 = 0o600;

/// File-per-note storage rooted at a single directory.
///
/// A page titled `T` lives at `<root>/T.txt`. Nothing is locked: two saves to
/// the same title race and whichever write lands last wins.
#[derive(Debug, Clone)]
pub struct PageStore {
    root: PathBuf,
}

impl PageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn page_path(&self, title: &str) -> PathBuf {
        self.root.join(format!("{}.{}", title, NOTE_EXTENSION))
    }

    /// Create the notes directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| NotepadError::io(&self.root, e))
    }

    /// Write the page body, creating or truncating its file.
    pub async fn save(&self, page: &Page) -> Result<()> {
        let path = self.page_path(&page.title);

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(NOTE_MODE);

        let mut file = options
            .open(&path)
            .await
            .map_err(|e| NotepadError::io(&path, e))?;
        file.write_all(&page.body)
            .await
            .map_err(|e| NotepadError::io(&path, e))?;
        file.flush().await.map_err(|e| NotepadError::io(&path, e))?;

        // mode() only applies when the file is created
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(NOTE_MODE))
                .await
                .map_err(|e| NotepadError::io(&path, e))?;
        }

        tracing::debug!(title = %page.title, bytes = page.body.len(), "saved page");
        Ok(())
    }

    pub async fn load(&self, title: &str) -> Result<Page> {
        let path = self.page_path(title);
        match fs::read(&path).await {
            Ok(body) => Ok(Page {
                title: title.to_string(),
                body,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(NotepadError::NotFound(title.to_string()))
            }
            Err(e) => Err(NotepadError::io(&path, e)),
        }
    }

    /// Titles of every note file in the directory, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| NotepadError::io(&self.root, e))?;

        let mut titles = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| NotepadError::io(&self.root, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            if let Some(name) = entry.file_name().to_str() {
                titles.push(title_from_file_name(name).to_string());
            }
        }

        titles.sort();
        Ok(titles)
    }
}

/// Drop everything from the last `.` on, so `.txt` (an empty title) maps to "".
fn title_from_file_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}
