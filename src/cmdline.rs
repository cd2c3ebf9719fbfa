use crate::config::Config;
use crate::diagnostic;
use crate::interpreter::{self, Interpreter};
use linefeed::{DefaultTerminal, Interface, ReadResult, Terminal};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    Usage(String),
    Terminal(std::io::Error),
    /// The program failed and its diagnostic has already been printed.
    Failed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Usage(problem) => write!(f, "{}\nusage: lispy [--recover] [--no-prelude] [FILE]", problem),
            Error::Terminal(e) => write!(f, "terminal error: {}", e),
            Error::Failed => write!(f, "the program failed"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Terminal(e)
    }
}

pub fn setup() -> std::io::Result<Interface<DefaultTerminal>> {
    let interface = linefeed::Interface::new("lispy")?;
    interface.set_prompt("lispy> ")?;
    if let Some(path) = history_path() {
        interface.load_history(path).ok();
    };
    Ok(interface)
}

fn history_path() -> Option<PathBuf> {
    match dirs::data_dir() {
        Some(mut path) => {
            path.push(".lispy_history");
            Some(path)
        }
        None => None,
    }
}

pub fn save_history<T: Terminal>(interface: &Interface<T>) -> std::io::Result<()> {
    match history_path() {
        Some(path) => interface.save_history(path),
        None => Ok(()),
    }
}

/// Counts unclosed parentheses, ignoring any inside strings or comments, so the REPL knows when a
/// form continues onto the next line.
fn open_parens(text: &str) -> isize {
    let mut depth = 0;
    let mut chars = text.chars();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        match (in_string, c) {
            (true, '\\') => {
                chars.next();
            }
            (true, '"') | (false, '"') => in_string = !in_string,
            (false, ';') => {
                chars.by_ref().take_while(|&c| c != '\n').for_each(drop);
            }
            (false, '(') => depth += 1,
            (false, ')') => depth -= 1,
            _ => (),
        }
    }
    depth
}

pub fn repl<T: Terminal>(interface: &Interface<T>, session: &mut Interpreter) {
    let mut pending = String::new();
    loop {
        match interface.read_line() {
            Ok(ReadResult::Eof) => break,
            Ok(ReadResult::Signal(sig)) => {
                writeln!(interface, "Received signal {:?}", sig).ok();
                pending.clear();
            }
            Ok(ReadResult::Input(line)) => {
                interface.add_history_unique(line.clone());
                pending.push_str(&line);
                pending.push('\n');
                if open_parens(&pending) > 0 {
                    continue;
                }
                match session.rep(&pending) {
                    Ok(value) => writeln!(interface, "{}", value).ok(),
                    Err(e) => writeln!(interface, "{}", diagnostic::render(&e, diagnostic::use_colour())).ok(),
                };
                pending.clear();
            }
            Err(e) => {
                writeln!(interface, "Error: {}", e).ok();
                break;
            }
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<(Config, Option<PathBuf>), Error> {
    let mut config = Config::from_env();
    let mut file = None;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--recover" => config.recover = true,
            "--no-prelude" => config.load_prelude = false,
            flag if flag.starts_with("--") => {
                return Err(Error::Usage(format!("unknown option `{}'", flag)))
            }
            _ if file.is_some() => return Err(Error::Usage(String::from("too many files"))),
            _ => file = Some(PathBuf::from(&arg)),
        }
    }
    Ok((config, file))
}

fn run(config: Config, file: Option<PathBuf>) -> Result<(), Error> {
    let mut session = Interpreter::new(config);
    match file {
        Some(path) => session.run_file(path).map(drop).map_err(|e| {
            diagnostic::report(&e);
            Error::Failed
        }),
        None => {
            let interface = setup()?;
            repl(&interface, &mut session);
            save_history(&interface)?;
            Ok(())
        }
    }
}

/// `lispy [--recover] [--no-prelude] [FILE]`: runs FILE, or starts a REPL if there isn't one.
pub fn launch(args: Vec<String>) -> Result<(), Error> {
    let (config, file) = parse_args(args)?;
    log::debug!("configuration: {:?}", config);
    let stack = config.clone();
    interpreter::with_sized_stack(&stack, move || run(config, file))?
}
