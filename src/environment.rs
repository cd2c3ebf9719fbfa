use crate::types::{Definition, Node, Symbol};
use derive_more::Deref;
use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::mem;
use std::rc::Rc;

pub type ScopeId = usize;

const MAIN_SCOPE: ScopeId = 0;

/// Names starting with this may always be rebound.
const SYSTEM_PREFIX: char = '$';

#[derive(Debug, Clone)]
pub struct SymbolTable {
    scope: ScopeId,
    name: String,
    local: HashMap<String, Node>,
    mutables: HashSet<String>,
}

impl SymbolTable {
    fn new(scope: ScopeId, name: &str) -> Self {
        Self {
            scope,
            name: name.into(),
            local: HashMap::new(),
            mutables: HashSet::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.local.get(name)
    }

    fn bind(&mut self, name: &str, value: Node, mutable: bool) -> Result<()> {
        let rebindable = mutable || self.mutables.contains(name) || name.starts_with(SYSTEM_PREFIX);
        if self.local.contains_key(name) && !rebindable {
            return Err(Error::ImmutableRebind(name.into()));
        }
        if mutable {
            self.mutables.insert(name.into());
        }
        self.local.insert(name.into(), value);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Option<Node> {
        self.mutables.remove(name);
        self.local.remove(name)
    }
}

/// A read-only snapshot of a table, as captured by a closure. It has no `DerefMut`.
#[derive(Debug, Deref)]
pub struct FrozenTable(SymbolTable);

impl FrozenTable {
    fn freeze(table: &SymbolTable) -> Rc<Self> {
        Rc::new(FrozenTable(table.clone()))
    }
}

/// Identifies one run of a definition's body, so recursive calls of the same definition can be
/// told apart.
type Activation = usize;

/// What a closure remembers about where it was made: snapshots of the tables it could see, and
/// the calls lexically around it. Names bound in those calls after the snapshot was taken are
/// still found while the call is live.
#[derive(Debug, Default)]
pub struct Capture {
    tables: Vec<Rc<FrozenTable>>,
    enclosing: Vec<Activation>,
}

struct Frame {
    activation: Activation,
    table: SymbolTable,
}

#[derive(Debug)]
pub enum Error {
    UnboundSymbol(String),
    ImmutableRebind(String),
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    NotCaptured(String),
    AlreadyCaptured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnboundSymbol(name) => write!(f, "symbol `{}' is not bound to anything", name),
            Error::ImmutableRebind(name) => write!(
                f,
                "`{}' is immutable and already bound; declare it with `mutate' to rebind it",
                name
            ),
            Error::ArityMismatch {
                name,
                expected,
                got,
            } => write!(
                f,
                "`{}' takes {} argument{}, but was called with {}",
                name,
                expected,
                if *expected == 1 { "" } else { "s" },
                got
            ),
            Error::NotCaptured(name) => {
                write!(f, "`{}' was called before its environment was captured", name)
            }
            Error::AlreadyCaptured(name) => {
                write!(f, "`{}' had its environment captured twice", name)
            }
        }
    }
}

/// Every table visible to the program: the global `_main` table, the argument-bound table of each
/// live call, and the capture installed by the innermost call.
pub struct Scopes {
    main: SymbolTable,
    call_stack: Vec<Frame>,
    context: Rc<Capture>,
    saved_contexts: Vec<Rc<Capture>>,
    next_scope: ScopeId,
    next_activation: Activation,
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            main: SymbolTable::new(MAIN_SCOPE, "_main"),
            call_stack: Vec::new(),
            context: Rc::default(),
            saved_contexts: Vec::new(),
            next_scope: MAIN_SCOPE + 1,
            next_activation: 0,
        }
    }

    fn innermost(&mut self) -> &mut SymbolTable {
        match self.call_stack.last_mut() {
            Some(frame) => &mut frame.table,
            None => &mut self.main,
        }
    }

    pub fn bind(&mut self, name: &str, value: Node, mutable: bool) -> Result<()> {
        log::trace!("bind {} = {} (mutable: {})", name, value, mutable);
        self.innermost().bind(name, value, mutable)
    }

    /// The table of `activation`, if that call hasn't returned yet.
    fn live_frame(&self, activation: Activation) -> Option<&SymbolTable> {
        self.call_stack
            .iter()
            .rev()
            .find(|frame| frame.activation == activation)
            .map(|frame| &frame.table)
    }

    /// Looks in the current call frame, then the frozen snapshots, then the live frames of the
    /// enclosing calls, then `_main`. Each tier is searched innermost first.
    pub fn resolve(&self, name: &str) -> Result<Node> {
        let context = &self.context;
        self.call_stack
            .last()
            .and_then(|frame| frame.table.get(name))
            .or_else(|| context.tables.iter().rev().find_map(|table| table.get(name)))
            .or_else(|| {
                context
                    .enclosing
                    .iter()
                    .rev()
                    .filter_map(|&activation| self.live_frame(activation))
                    .find_map(|table| table.get(name))
            })
            .or_else(|| self.main.get(name))
            .cloned()
            .ok_or_else(|| Error::UnboundSymbol(name.into()))
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Removes `name` from the live table that owns it. Frozen snapshots keep their copy.
    pub fn delete(&mut self, name: &str) -> Result<Node> {
        if let Some(value) = self.call_stack.last_mut().and_then(|frame| frame.table.remove(name)) {
            return Ok(value);
        }
        self.main
            .remove(name)
            .ok_or_else(|| Error::UnboundSymbol(name.into()))
    }

    /// A fresh closure whose environment has not been captured yet. Callers bind it (for
    /// `define`) and then `capture` it, so the snapshot can see the definition itself.
    pub fn new_definition(&mut self, name: &str, parameters: Vec<Symbol>, body: Node) -> Rc<Definition> {
        let scope = self.next_scope;
        self.next_scope += 1;
        log::debug!("new scope #{} for {}", scope, name);
        Rc::new(Definition {
            name: name.into(),
            table: SymbolTable::new(scope, name),
            parameters,
            body,
            captured: OnceCell::new(),
        })
    }

    pub fn capture(&self, definition: &Definition) -> Result<()> {
        let mut tables = Vec::with_capacity(self.context.tables.len() + 3);
        tables.push(FrozenTable::freeze(&self.main));
        tables.extend(self.context.tables.iter().cloned());
        let mut enclosing = self.context.enclosing.clone();
        if let Some(frame) = self.call_stack.last() {
            tables.push(FrozenTable::freeze(&frame.table));
            enclosing.push(frame.activation);
        }
        tables.push(FrozenTable::freeze(&definition.table));
        definition
            .captured
            .set(Rc::new(Capture { tables, enclosing }))
            .map_err(|_| Error::AlreadyCaptured(definition.name.clone()))
    }

    /// Pushes a call frame for `definition`. Nothing is touched if the arguments don't fit.
    /// Every successful `enter` must be paired with a `leave`.
    pub fn enter(&mut self, definition: &Definition, args: Vec<Node>) -> Result<()> {
        if args.len() != definition.parameters.len() {
            return Err(Error::ArityMismatch {
                name: definition.name.clone(),
                expected: definition.parameters.len(),
                got: args.len(),
            });
        }
        let capture = definition
            .captured
            .get()
            .ok_or_else(|| Error::NotCaptured(definition.name.clone()))?;

        let mut table = definition.table.clone();
        for (parameter, value) in definition.parameters.iter().zip(args) {
            // A repeated parameter name just takes the later argument.
            table.local.insert(parameter.to_string(), value);
        }
        let activation = self.next_activation;
        self.next_activation += 1;
        log::trace!("enter scope #{} ({}), activation {}", table.scope, table.name, activation);
        self.call_stack.push(Frame { activation, table });
        self.saved_contexts
            .push(mem::replace(&mut self.context, Rc::clone(capture)));
        Ok(())
    }

    pub fn leave(&mut self) {
        if let Some(frame) = self.call_stack.pop() {
            log::trace!("leave scope #{} ({})", frame.table.scope, frame.table.name);
        }
        self.context = self.saved_contexts.pop().unwrap_or_default();
    }

    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Drops frames above `depth`. Only needed if a call was abandoned without `leave`.
    pub fn unwind_to(&mut self, depth: usize) {
        while self.call_stack.len() > depth {
            self.leave();
        }
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;

    fn int(n: i64) -> Node {
        Node::integer(n, Location::implicit())
    }

    fn sym(name: &str) -> Symbol {
        Symbol::from(name)
    }

    #[test]
    fn immutable_by_default() {
        let mut scopes = Scopes::new();
        scopes.bind("x", int(1), false).unwrap();
        assert!(matches!(
            scopes.bind("x", int(2), false),
            Err(Error::ImmutableRebind(_))
        ));
        assert_eq!(scopes.resolve("x").unwrap(), int(1));
    }

    #[test]
    fn mutable_and_system_names_rebind() {
        let mut scopes = Scopes::new();
        scopes.bind("counter", int(1), true).unwrap();
        scopes.bind("counter", int(2), false).unwrap();
        assert_eq!(scopes.resolve("counter").unwrap(), int(2));

        scopes.bind("$flag", int(1), false).unwrap();
        scopes.bind("$flag", int(2), false).unwrap();
        assert_eq!(scopes.resolve("$flag").unwrap(), int(2));
    }

    #[test]
    fn calls_bind_parameters_and_clean_up() {
        let mut scopes = Scopes::new();
        let f = scopes.new_definition("f", vec![sym("a"), sym("b")], Node::nil(Location::implicit()));
        scopes.capture(&f).unwrap();

        let err = scopes.enter(&f, vec![int(1)]).unwrap_err();
        assert!(matches!(err, Error::ArityMismatch { expected: 2, got: 1, .. }));
        assert_eq!(scopes.depth(), 0);

        scopes.enter(&f, vec![int(1), int(2)]).unwrap();
        assert_eq!(scopes.resolve("b").unwrap(), int(2));
        scopes.bind("local", int(3), false).unwrap();
        scopes.leave();

        assert_eq!(scopes.depth(), 0);
        assert!(!scopes.is_bound("b"));
        assert!(!scopes.is_bound("local"));
    }

    #[test]
    fn uncaptured_definitions_refuse_calls() {
        let mut scopes = Scopes::new();
        let f = scopes.new_definition("f", vec![], Node::nil(Location::implicit()));
        assert!(matches!(scopes.enter(&f, vec![]), Err(Error::NotCaptured(_))));
        scopes.capture(&f).unwrap();
        assert!(matches!(scopes.capture(&f), Err(Error::AlreadyCaptured(_))));
    }

    #[test]
    fn snapshots_outlive_the_frame_they_froze() {
        let mut scopes = Scopes::new();
        let outer = scopes.new_definition("outer", vec![sym("n")], Node::nil(Location::implicit()));
        scopes.capture(&outer).unwrap();

        scopes.enter(&outer, vec![int(7)]).unwrap();
        let inner = scopes.new_definition("inner", vec![], Node::nil(Location::implicit()));
        scopes.capture(&inner).unwrap();
        scopes.leave();
        assert!(!scopes.is_bound("n"));

        scopes.enter(&inner, vec![]).unwrap();
        assert_eq!(scopes.resolve("n").unwrap(), int(7));
        scopes.leave();
    }

    #[test]
    fn definitions_see_themselves_when_bound_before_capture() {
        let mut scopes = Scopes::new();
        let f = scopes.new_definition("f", vec![], Node::nil(Location::implicit()));
        scopes
            .bind("f", Node::definition(f.clone(), Location::implicit()), false)
            .unwrap();
        scopes.capture(&f).unwrap();
        scopes.delete("f").unwrap();

        scopes.enter(&f, vec![]).unwrap();
        assert!(scopes.resolve("f").is_ok());
        scopes.leave();
    }

    #[test]
    fn delete_prefers_the_call_frame() {
        let mut scopes = Scopes::new();
        scopes.bind("x", int(1), false).unwrap();
        let f = scopes.new_definition("f", vec![sym("x")], Node::nil(Location::implicit()));
        scopes.capture(&f).unwrap();
        scopes.enter(&f, vec![int(2)]).unwrap();
        assert_eq!(scopes.delete("x").unwrap(), int(2));
        scopes.leave();
        assert_eq!(scopes.resolve("x").unwrap(), int(1));
        assert!(matches!(scopes.delete("nope"), Err(Error::UnboundSymbol(_))));
    }

    #[test]
    fn later_bindings_of_a_live_enclosing_call_are_visible() {
        let mut scopes = Scopes::new();
        let outer = scopes.new_definition("outer", vec![], Node::nil(Location::implicit()));
        scopes.capture(&outer).unwrap();

        scopes.enter(&outer, vec![]).unwrap();
        let helper = scopes.new_definition("helper", vec![], Node::nil(Location::implicit()));
        scopes.capture(&helper).unwrap();
        scopes.bind("y", int(5), false).unwrap();

        scopes.enter(&helper, vec![]).unwrap();
        assert_eq!(scopes.resolve("y").unwrap(), int(5));
        scopes.leave();
        scopes.leave();

        // Once the enclosing call is over, only its snapshot remains, and that predates `y`.
        scopes.enter(&helper, vec![]).unwrap();
        assert!(matches!(scopes.resolve("y"), Err(Error::UnboundSymbol(_))));
        scopes.leave();
    }

    #[test]
    fn enclosing_scopes_are_lexical_not_dynamic() {
        let mut scopes = Scopes::new();
        let f = scopes.new_definition("f", vec![], Node::nil(Location::implicit()));
        scopes.capture(&f).unwrap();
        let caller = scopes.new_definition("caller", vec![], Node::nil(Location::implicit()));
        scopes.capture(&caller).unwrap();

        scopes.enter(&caller, vec![]).unwrap();
        scopes.bind("secret", int(1), false).unwrap();
        scopes.enter(&f, vec![]).unwrap();
        assert!(!scopes.is_bound("secret"));
        scopes.leave();
        scopes.leave();
    }

    #[test]
    fn each_activation_keeps_its_own_locals() {
        let mut scopes = Scopes::new();
        let f = scopes.new_definition("f", vec![], Node::nil(Location::implicit()));
        scopes.capture(&f).unwrap();

        scopes.enter(&f, vec![]).unwrap();
        let first = scopes.new_definition("first", vec![], Node::nil(Location::implicit()));
        scopes.capture(&first).unwrap();
        scopes.enter(&f, vec![]).unwrap();
        scopes.bind("late", int(2), false).unwrap();

        // `first` was made by the outer run of `f`, which never bound `late`.
        scopes.enter(&first, vec![]).unwrap();
        assert!(!scopes.is_bound("late"));
        scopes.leave();
        scopes.leave();
        scopes.leave();
        assert_eq!(scopes.depth(), 0);
    }
}
