//! Local staging directory management.
//!
//! Only [`pick_files`] differs between front ends: the terminal asks for
//! paths, the browser UI hands over uploaded bytes through
//! [`Staging::save_files`]. Copying and cleanup are shared.

use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use dialoguer::Input;
use tracing::{debug, warn};

use crate::config::is_supported;
use crate::error::{RagError, Result};

/// Reads one line of user input.
///
/// Uses an interactive prompt on a terminal and plain stdin when input is
/// piped, where end of input reads as a blank line.
pub fn read_line(prompt: &str) -> io::Result<String> {
    if console::user_attended() {
        return Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    }

    println!("{}: ", prompt);
    read_plain_line(&mut io::stdin().lock())
}

fn read_plain_line(reader: &mut impl BufRead) -> io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Asks for document paths, one per line, until a blank line.
///
/// Returns an empty list when the user enters nothing or aborts the prompt.
pub fn pick_files() -> Vec<PathBuf> {
    let mut picked = Vec::new();
    loop {
        let answer = match read_line("Document path (blank to finish)") {
            Ok(answer) => answer,
            Err(e) => {
                debug!("file picker closed: {}", e);
                break;
            }
        };

        let answer = answer.trim();
        if answer.is_empty() {
            break;
        }

        let path = PathBuf::from(answer);
        if !path.is_file() {
            warn!("not a file, skipping: {}", path.display());
            continue;
        }
        if !is_supported(&path) {
            warn!(
                "unsupported file type, File Search may reject it: {}",
                path.display()
            );
        }
        picked.push(path);
    }
    picked
}

/// The directory holding documents between selection and upload.
#[derive(Debug, Clone)]
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| RagError::io(&self.dir, e))
    }

    /// Copies files into the staging directory, overwriting same-named files.
    ///
    /// Returns the basenames in input order.
    pub fn copy_to_staging(&self, paths: &[PathBuf]) -> Result<Vec<String>> {
        self.ensure_dir()?;
        let mut copied = Vec::with_capacity(paths.len());

        for path in paths {
            let filename = basename(path)?;
            let dest = self.path_of(&filename);
            fs::copy(path, &dest).map_err(|e| RagError::io(path, e))?;
            println!("Copied: {}", filename);
            copied.push(filename);
        }

        Ok(copied)
    }

    /// Opens the terminal picker and stages whatever was chosen.
    pub fn select_and_copy_files(&self) -> Result<Vec<String>> {
        let paths = pick_files();
        if paths.is_empty() {
            println!("No files selected.");
            return Ok(Vec::new());
        }
        self.copy_to_staging(&paths)
    }

    /// Writes in-memory files (name, bytes) into the staging directory.
    pub fn save_files<'a, I>(&self, files: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        self.ensure_dir()?;
        let mut saved = Vec::new();

        for (name, bytes) in files {
            let filename = basename(Path::new(name))?;
            let dest = self.path_of(&filename);
            fs::write(&dest, bytes).map_err(|e| RagError::io(&dest, e))?;
            saved.push(filename);
        }

        Ok(saved)
    }

    /// Non-hidden regular files currently staged, sorted by name.
    pub fn staged_files(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| RagError::io(&self.dir, e))? {
            let entry = entry.map_err(|e| RagError::io(&self.dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().is_file() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Deletes every non-hidden regular file directly inside the directory.
    ///
    /// Dotfiles and subdirectories stay. A missing directory is a no-op.
    pub fn cleanup(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.staged_files()? {
            let path = self.path_of(&name);
            fs::remove_file(&path).map_err(|e| RagError::io(&path, e))?;
            removed += 1;
        }
        debug!(removed, dir = %self.dir.display(), "staging cleaned");
        Ok(removed)
    }
}

fn basename(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RagError::Configuration(format!("not a file path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_copy_returns_basenames_and_bytes() {
        let src = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        let staging = Staging::new(docs.path().join("docs"));

        let a = write(src.path(), "report.pdf", b"%PDF-1.4 fake");
        let b = write(src.path(), "notes.md", b"# Notes\n");

        let copied = staging.copy_to_staging(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(copied, vec!["report.pdf", "notes.md"]);
        assert_eq!(fs::read(staging.path_of("report.pdf")).unwrap(), b"%PDF-1.4 fake");
        assert_eq!(fs::read(staging.path_of("notes.md")).unwrap(), b"# Notes\n");
    }

    #[test]
    fn test_copy_overwrites_same_name() {
        let src1 = tempfile::tempdir().unwrap();
        let src2 = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        let staging = Staging::new(docs.path());

        let first = write(src1.path(), "data.csv", b"a,b\n");
        let second = write(src2.path(), "data.csv", b"c,d\n");
        staging.copy_to_staging(&[first]).unwrap();
        staging.copy_to_staging(&[second]).unwrap();

        assert_eq!(staging.staged_files().unwrap(), vec!["data.csv"]);
        assert_eq!(fs::read(staging.path_of("data.csv")).unwrap(), b"c,d\n");
    }

    #[test]
    fn test_cleanup_keeps_dotfiles_and_dirs() {
        let docs = tempfile::tempdir().unwrap();
        let staging = Staging::new(docs.path());
        write(docs.path(), ".gitkeep", b"");
        write(docs.path(), "a.txt", b"a");
        write(docs.path(), "b.pdf", b"b");
        fs::create_dir(docs.path().join("nested")).unwrap();

        assert_eq!(staging.cleanup().unwrap(), 2);
        assert!(docs.path().join(".gitkeep").exists());
        assert!(docs.path().join("nested").is_dir());
        assert!(!docs.path().join("a.txt").exists());
        assert!(staging.staged_files().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_missing_dir_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let staging = Staging::new(root.path().join("does-not-exist"));
        assert_eq!(staging.cleanup().unwrap(), 0);
    }

    #[test]
    fn test_save_files_strips_directories() {
        let docs = tempfile::tempdir().unwrap();
        let staging = Staging::new(docs.path());
        let saved = staging
            .save_files([("../escape.txt", &b"x"[..]), ("page.html", &b"<p/>"[..])])
            .unwrap();
        assert_eq!(saved, vec!["escape.txt", "page.html"]);
        assert!(docs.path().join("escape.txt").exists());
    }

    #[test]
    fn test_staged_files_sorted_and_filtered() {
        let docs = tempfile::tempdir().unwrap();
        let staging = Staging::new(docs.path());
        write(docs.path(), "z.md", b"");
        write(docs.path(), "a.md", b"");
        write(docs.path(), ".hidden", b"");
        assert_eq!(staging.staged_files().unwrap(), vec!["a.md", "z.md"]);
    }

    #[test]
    fn test_piped_input_reads_one_line() {
        let mut input = Cursor::new("What is the roadmap?\r\nnext line\n");
        assert_eq!(read_plain_line(&mut input).unwrap(), "What is the roadmap?");
        assert_eq!(read_plain_line(&mut input).unwrap(), "next line");
        // End of input reads as a blank line.
        assert_eq!(read_plain_line(&mut input).unwrap(), "");
    }
}
