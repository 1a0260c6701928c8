use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{PipelineError, PipelineResult};

/// Raw text units (lines or whole documents) produced by a [`Reader`].
pub type RawStream<'a> = Box<dyn Iterator<Item = PipelineResult<String>> + 'a>;

/// Source of raw records for feeders.
pub trait Reader: Send + Sync {
    fn read(&self) -> PipelineResult<RawStream<'_>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Path(PathBuf),
    Glob(String),
    /// Every file below a directory, optionally filtered by extension.
    Dir { root: PathBuf, extension: Option<String> },
}

/// Reads local files line by line (trimmed, blank lines skipped) or whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReader {
    source: Source,
    lines: bool,
}

impl FileReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            source: Source::Path(path.as_ref().to_path_buf()),
            lines: true,
        }
    }

    /// Read every file matching a glob pattern such as `data/*.ndjson`, in sorted order.
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            source: Source::Glob(pattern.into()),
            lines: true,
        }
    }

    /// Read every file below `root` recursively, in sorted order.
    pub fn dir(root: impl AsRef<Path>) -> Self {
        Self {
            source: Source::Dir {
                root: root.as_ref().to_path_buf(),
                extension: None,
            },
            lines: true,
        }
    }

    /// Only read files with this extension (directory sources only).
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        if let Source::Dir { extension, .. } = &mut self.source {
            *extension = Some(ext.into());
        }
        self
    }

    /// Line mode (default) or whole-file mode.
    pub fn lines(mut self, lines: bool) -> Self {
        self.lines = lines;
        self
    }

    /// Resolve the files this reader covers.
    pub fn paths(&self) -> PipelineResult<Vec<PathBuf>> {
        let mut paths = match &self.source {
            Source::Path(path) => return Ok(vec![path.clone()]),
            Source::Glob(pattern) => {
                let mut out = Vec::new();
                for entry in glob::glob(pattern)? {
                    let path = entry.map_err(|e| PipelineError::Io(e.into_error()))?;
                    if path.is_file() {
                        out.push(path);
                    }
                }
                out
            }
            Source::Dir { root, extension } => {
                let mut out = Vec::new();
                for entry in WalkDir::new(root).follow_links(false) {
                    let entry = entry.map_err(|e| PipelineError::Io(std::io::Error::from(e)))?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let wanted = match extension {
                        Some(ext) => entry
                            .path()
                            .extension()
                            .and_then(|s| s.to_str())
                            .is_some_and(|s| s.eq_ignore_ascii_case(ext)),
                        None => true,
                    };
                    if wanted {
                        out.push(entry.into_path());
                    }
                }
                out
            }
        };
        paths.sort();
        debug!(files = paths.len(), "file reader resolved sources");
        Ok(paths)
    }
}

impl Reader for FileReader {
    fn read(&self) -> PipelineResult<RawStream<'_>> {
        let paths = self.paths()?;
        let lines = self.lines;
        Ok(Box::new(
            paths.into_iter().flat_map(move |path| read_file(path, lines)),
        ))
    }
}

fn read_file(path: PathBuf, lines: bool) -> RawStream<'static> {
    if !lines {
        return Box::new(std::iter::once(fs::read_to_string(&path).map_err(PipelineError::from)));
    }
    match File::open(&path) {
        Ok(file) => Box::new(BufReader::new(file).lines().filter_map(|line| match line {
            Ok(line) => {
                let trimmed = line.trim();
                (!trimmed.is_empty()).then(|| Ok(trimmed.to_owned()))
            }
            Err(e) => Some(Err(PipelineError::from(e))),
        })),
        Err(e) => Box::new(std::iter::once(Err(PipelineError::from(e)))),
    }
}

#[cfg(test)]
mod tests {
    use super::{FileReader, Reader};
    use std::fs;

    fn read_all(reader: &FileReader) -> Vec<String> {
        reader.read().unwrap().map(Result::unwrap).collect()
    }

    #[test]
    fn lines_are_trimmed_and_blank_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, "  first  \n\n   \nsecond\n").unwrap();

        assert_eq!(read_all(&FileReader::new(&path)), vec!["first", "second"]);
        assert_eq!(
            read_all(&FileReader::new(&path).lines(false)),
            vec!["  first  \n\n   \nsecond\n"]
        );
    }

    #[test]
    fn glob_and_directory_sources_read_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.ndjson"), "b\n").unwrap();
        fs::write(dir.path().join("a.ndjson"), "a\n").unwrap();
        fs::write(dir.path().join("nested").join("c.ndjson"), "c\n").unwrap();
        fs::write(dir.path().join("skip.txt"), "skip\n").unwrap();

        let pattern = format!("{}/*.ndjson", dir.path().display());
        assert_eq!(read_all(&FileReader::glob(pattern)), vec!["a", "b"]);

        let walked = FileReader::dir(dir.path()).extension("ndjson");
        assert_eq!(read_all(&walked), vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_files_and_bad_patterns_are_errors() {
        let missing = FileReader::new("does/not/exist.txt");
        let mut stream = missing.read().unwrap();
        assert!(stream.next().unwrap().is_err());
        assert!(FileReader::glob("[").read().is_err());
    }
}
