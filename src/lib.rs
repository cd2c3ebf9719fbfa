pub mod atoms;
pub mod cmdline;
pub mod config;
pub mod diagnostic;
pub mod environment;
pub mod evaluator;
pub mod interpreter;
pub mod location;
pub mod macros;
pub mod printer;
pub mod reader;
pub mod types;

#[macro_use]
extern crate lazy_static;

mod builtins;
mod special_forms;
mod strings;
mod tokens;

pub use config::Config;
pub use interpreter::Interpreter;
pub use types::{Kind, Node};
