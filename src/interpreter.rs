use crate::atoms::AtomTable;
use crate::config::Config;
use crate::environment::Scopes;
use crate::evaluator::{self, ErrorKind};
use crate::location::{Location, SourceFile};
use crate::macros::{self, MacroTable};
use crate::types::Node;
use crate::{diagnostic, reader, tokens};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::{panic, thread};

const PRELUDE: &str = include_str!("../prelude/prelude.lispy");
const PRELUDE_PATH: &str = "<prelude>";
const PRELUDE_LOADING: &str = "$PRELUDE_LOADING";
const PRELUDE_LOADED: &str = "$PRELUDE_LOADED";

#[derive(Debug)]
pub enum Error {
    Lex(tokens::Error),
    Parse(reader::Error),
    Macro(macros::Error),
    Eval(evaluator::Error),
    Io(io::Error, Location),
}

impl From<reader::Error> for Error {
    fn from(e: reader::Error) -> Self {
        match e {
            reader::Error::Tokenizer(e) => Error::Lex(e),
            e => Error::Parse(e),
        }
    }
}

impl From<macros::Error> for Error {
    fn from(e: macros::Error) -> Self {
        Error::Macro(e)
    }
}

impl From<evaluator::Error> for Error {
    fn from(e: evaluator::Error) -> Self {
        Error::Eval(e)
    }
}

impl Error {
    pub fn label(&self) -> &'static str {
        match self {
            Error::Lex(_) => "Syntax",
            Error::Parse(_) => "Parse",
            Error::Macro(_) => "Macro",
            Error::Eval(_) | Error::Io(..) => "Execution",
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Error::Lex(e) => &e.location,
            Error::Parse(e) => e.location(),
            Error::Macro(e) => &e.location,
            Error::Eval(e) => &e.location,
            Error::Io(_, location) => location,
        }
    }

    /// The error from a `require`d file that caused this one, if any.
    pub fn cause(&self) -> Option<&Error> {
        match self {
            Error::Eval(evaluator::Error {
                kind: ErrorKind::Nested(inner),
                ..
            }) => Some(inner.as_ref()),
            _ => None,
        }
    }

    /// Just this error's own message, leaving out any cause.
    pub fn headline(&self) -> String {
        match self.cause() {
            Some(_) => String::from("the error above happened while evaluating this"),
            None => self.to_string(),
        }
    }

    pub fn eval_kind(&self) -> Option<&ErrorKind> {
        match self {
            Error::Eval(e) => Some(&e.kind),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lex(e) => write!(f, "{}", e),
            Error::Parse(e) => write!(f, "{}", e),
            Error::Macro(e) => write!(f, "{}", e),
            Error::Eval(e) => write!(f, "{}", e),
            Error::Io(e, location) => {
                write!(f, "could not read `{}': {}", location.path().display(), e)
            }
        }
    }
}

pub type Result<T = Node> = std::result::Result<T, Error>;

/// Runs `work` on a thread with enough stack for `config.max_depth` nested calls, so deep
/// recursion ends in a `StackOverflow` error instead of killing the process. Sessions can't move
/// between threads, so `work` should build its own.
pub fn with_sized_stack<T, F>(config: &Config, work: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    log::debug!("evaluating on a {} byte stack", config.stack_size());
    let handle = thread::Builder::new()
        .name("lispy".into())
        .stack_size(config.stack_size())
        .spawn(work)?;
    Ok(handle.join().unwrap_or_else(|cause| panic::resume_unwind(cause)))
}

/// One independent run of the language: every binding, atom, macro and loaded file lives here.
pub struct Interpreter {
    pub(crate) config: Config,
    pub(crate) scopes: Scopes,
    pub(crate) atoms: AtomTable,
    pub(crate) macros: MacroTable,
    pub(crate) loaded: HashSet<PathBuf>,
    pub(crate) depth: usize,
    pub(crate) last_value: Node,
    pub(crate) output: Box<dyn Write>,
}

impl Interpreter {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            scopes: Scopes::new(),
            atoms: AtomTable::new(),
            macros: MacroTable::new(),
            loaded: HashSet::new(),
            depth: 0,
            last_value: Node::nil(Location::implicit()),
            output: Box::new(io::stdout()),
        }
    }

    /// Sends `out` and `puts` somewhere other than stdout.
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    /// Tokenizes, parses and macro-expands `text`, without evaluating anything.
    pub fn read(&mut self, text: &str, path: impl Into<PathBuf>) -> Result<Vec<Node>> {
        let source = SourceFile::new(path, text);
        let mut forest = reader::read_source(&source, &mut self.atoms)?;
        self.macros.preprocess(&mut forest)?;
        Ok(forest)
    }

    /// Runs a program from disk as the outermost file of this session.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Io(e, Location::new(&SourceFile::new(path, ""), 1, 1, 0)))?;
        if let Ok(canonical) = path.canonicalize() {
            self.loaded.insert(canonical);
        }
        self.run_source(&text, path)
    }

    pub fn run_source(&mut self, text: &str, path: impl Into<PathBuf>) -> Result {
        self.ensure_prelude()?;
        let forest = self.read(text, path)?;
        self.visit(&forest)
    }

    /// One line of the REPL. Failures are always returned, whatever the recover setting.
    pub fn rep(&mut self, line: &str) -> Result {
        self.ensure_prelude()?;
        let forest = self.read(line, "<repl>")?;
        let mut last = Node::nil(Location::implicit());
        for node in forest.iter() {
            last = self.evaluate_top_level(node)?;
        }
        Ok(last)
    }

    /// Loads the embedded prelude, once.
    pub fn ensure_prelude(&mut self) -> Result<()> {
        if !self.config.load_prelude || self.scopes.is_bound(PRELUDE_LOADING) {
            return Ok(());
        }
        log::info!("loading prelude");
        let yes = Node::atom(self.atoms.truth(true), Location::implicit());
        self.scopes
            .bind(PRELUDE_LOADING, yes.clone(), false)
            .map_err(|e| ErrorKind::from(e).at(&Location::implicit()))?;
        let forest = self.read(PRELUDE, PRELUDE_PATH)?;
        self.visit(&forest)?;
        self.scopes
            .bind(PRELUDE_LOADED, yes, false)
            .map_err(|e| ErrorKind::from(e).at(&Location::implicit()))?;
        Ok(())
    }

    /// Runs a `require`d file in this session. Files already loaded are skipped with a warning.
    pub(crate) fn load_file(&mut self, path: &Path, requested_at: &Location) -> evaluator::Result {
        let canonical = path
            .canonicalize()
            .map_err(|e| ErrorKind::Io(e).at(requested_at))?;
        if self.loaded.contains(&canonical) {
            diagnostic::warn(
                &format!("`{}' has already been loaded, so it won't be loaded again", path.display()),
                requested_at,
            );
            return Ok(Node::nil(requested_at.clone()));
        }
        log::debug!("loading {}", canonical.display());
        self.loaded.insert(canonical);

        let text = fs::read_to_string(path).map_err(|e| ErrorKind::Io(e).at(requested_at))?;
        let forest = self
            .read(&text, path)
            .map_err(|e| ErrorKind::from(e).at(requested_at))?;
        self.visit(&forest)
            .map_err(|e| ErrorKind::from(e).at(requested_at))
    }

    fn evaluate_top_level(&mut self, node: &Node) -> evaluator::Result {
        let depth = self.scopes.depth();
        let result = evaluator::eval(self, node);
        if self.scopes.depth() != depth {
            let found = self.scopes.depth();
            self.scopes.unwind_to(depth);
            return Err(ErrorKind::InternalInvariantViolation(format!(
                "{} call frame(s) left behind after a top-level form",
                found.saturating_sub(depth)
            ))
            .at(&node.location));
        }
        result
    }

    /// Evaluates each top-level form in turn. In recover mode a failing form is reported and
    /// counts as `nil`.
    pub(crate) fn visit(&mut self, forest: &[Node]) -> Result {
        let mut last = Node::nil(Location::implicit());
        for node in forest {
            last = match self.evaluate_top_level(node) {
                Ok(value) => value,
                Err(e) if self.config.recover => {
                    if let ErrorKind::InternalInvariantViolation(_) = e.kind {
                        return Err(e.into());
                    }
                    diagnostic::report(&Error::from(e));
                    Node::nil(node.location.clone())
                }
                Err(e) => return Err(e.into()),
            };
        }
        Ok(last)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
