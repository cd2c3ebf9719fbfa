use bimap::BiMap;
use std::fmt;
use std::rc::Rc;

pub type AtomId = usize;

const TRUE_ID: AtomId = 0;
const FALSE_ID: AtomId = 1;

/// An interned constant like `:true`. Two tags are the same atom iff they share an id.
#[derive(Clone)]
pub struct AtomTag {
    id: AtomId,
    name: Rc<str>,
}

impl AtomTag {
    pub fn id(&self) -> AtomId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_true(&self) -> bool {
        self.id == TRUE_ID
    }

    pub fn is_false(&self) -> bool {
        self.id == FALSE_ID
    }
}

impl PartialEq for AtomTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AtomTag {}

impl fmt::Debug for AtomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

impl fmt::Display for AtomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

pub struct AtomTable {
    atoms: BiMap<Rc<str>, AtomId>,
}

impl AtomTable {
    pub fn new() -> Self {
        let mut table = Self {
            atoms: BiMap::new(),
        };
        table.atoms.insert(Rc::from(":true"), TRUE_ID);
        table.atoms.insert(Rc::from(":false"), FALSE_ID);
        table
    }

    pub fn intern(&mut self, name: &str) -> AtomTag {
        let key: Rc<str> = Rc::from(name);
        if let Some(&id) = self.atoms.get_by_left(&key) {
            return self.tag(id);
        }
        let id = self.atoms.len();
        log::trace!("interning atom {} as #{}", name, id);
        self.atoms.insert(key.clone(), id);
        AtomTag { id, name: key }
    }

    pub fn truth(&self, value: bool) -> AtomTag {
        self.tag(if value { TRUE_ID } else { FALSE_ID })
    }

    fn tag(&self, id: AtomId) -> AtomTag {
        let name = self
            .atoms
            .get_by_right(&id)
            .cloned()
            .unwrap_or_else(|| Rc::from("<unknown atom>"));
        AtomTag { id, name }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}
