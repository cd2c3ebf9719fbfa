use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The text of one loaded file. Every location points back into one of these, so a diagnostic can
/// show the offending line without going back to disk.
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            path: path.into(),
            text: text.into(),
        })
    }

    pub fn line(&self, line: usize) -> &str {
        line.checked_sub(1)
            .and_then(|index| self.text.lines().nth(index))
            .unwrap_or("")
    }
}

impl fmt::Debug for SourceFile {
    // Skip the text: it's the whole file.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceFile({})", self.path.display())
    }
}

#[derive(Clone)]
pub struct Location {
    pub file: Rc<SourceFile>,
    pub line: usize,
    pub column: usize,
    pub span: usize,
}

impl Location {
    pub fn new(file: &Rc<SourceFile>, line: usize, column: usize, span: usize) -> Self {
        Self {
            file: file.clone(),
            line,
            column,
            span,
        }
    }

    /// For values the interpreter makes up before any source has been read.
    pub fn implicit() -> Self {
        Self {
            file: SourceFile::new("<implicit>", ""),
            line: 0,
            column: 0,
            span: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn snippet(&self) -> &str {
        self.file.line(self.line)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path().display(), self.line, self.column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{}) in `{}'", self.line, self.column, self.path().display())
    }
}
