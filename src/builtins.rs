use crate::evaluator::{ErrorKind, Locate, Result};
use crate::interpreter::Interpreter;
use crate::printer::{self, PrintMode};
use crate::special_forms::SpecialForm;
use crate::types::{falsy, replace_list_elements, truthy, Arity, Kind, Node, Number, TypeMismatch};
use itertools::Itertools;
use std::cmp::Ordering;
use std::io::Write;

fn grab_numbers(args: &[Node]) -> Result<Vec<Number>> {
    args.iter().map(|arg| arg.as_number().at(arg)).collect()
}

fn truth(session: &Interpreter, node: &Node, value: bool) -> Node {
    Node::atom(session.atoms.truth(value), node.location.clone())
}

const SUM: SpecialForm = SpecialForm {
    names: &["+"],
    arity: Arity::at_least(0),
    evaluate_operands: true,
    form_ptr: sum_,
};

fn sum_(_: &mut Interpreter, node: &Node, args: &[Node]) -> Result {
    let value = grab_numbers(args)?
        .into_iter()
        .fold(Number::Integer(0), Number::add);
    Ok(Node::new(Kind::Numeric(value), node.location.clone()))
}

const SUB: SpecialForm = SpecialForm {
    names: &["-"],
    arity: Arity::at_least(1),
    evaluate_operands: true,
    form_ptr: sub_,
};

fn sub_(_: &mut Interpreter, node: &Node, args: &[Node]) -> Result {
    let value = match grab_numbers(args)?.as_slice() {
        [x] => x.neg(),
        [x, rest @ ..] => rest.iter().fold(*x, |acc, &y| acc.sub(y)),
        [] => unreachable!(), // checked by arity
    };
    Ok(Node::new(Kind::Numeric(value), node.location.clone()))
}

const MUL: SpecialForm = SpecialForm {
    names: &["*"],
    arity: Arity::at_least(1),
    evaluate_operands: true,
    form_ptr: mul_,
};

fn mul_(_: &mut Interpreter, node: &Node, args: &[Node]) -> Result {
    let value = grab_numbers(args)?
        .into_iter()
        .fold1(Number::mul)
        .unwrap_or(Number::Integer(1));
    Ok(Node::new(Kind::Numeric(value), node.location.clone()))
}

/// Left fold for `/` and `%`, refusing any zero divisor.
fn divide(args: &[Node], op: fn(Number, Number) -> Number) -> Result<Number> {
    let numbers = grab_numbers(args)?;
    let (first, rest) = match numbers.split_first() {
        Some(split) => split,
        None => unreachable!(), // checked by arity
    };
    let mut value = *first;
    for (divisor, arg) in rest.iter().zip(&args[1..]) {
        if divisor.is_zero() {
            return Err(ErrorKind::DivideByZero.at(&arg.location));
        }
        value = op(value, *divisor);
    }
    Ok(value)
}

const DIV: SpecialForm = SpecialForm {
    names: &["/"],
    arity: Arity::at_least(1),
    evaluate_operands: true,
    form_ptr: |_, node, args| {
        // `(/ 4)` is a float too.
        let quotient = Number::Float(divide(args, Number::div)?.as_f64());
        Ok(Node::new(Kind::Numeric(quotient), node.location.clone()))
    },
};

const REM: SpecialForm = SpecialForm {
    names: &["%"],
    arity: Arity::at_least(1),
    evaluate_operands: true,
    form_ptr: |_, node, args| {
        let remainder = divide(args, Number::rem)?;
        Ok(Node::new(Kind::Numeric(remainder), node.location.clone()))
    },
};

fn compare(x: &Node, y: &Node) -> Result<Option<Ordering>> {
    match (&x.kind, &y.kind) {
        (Kind::Numeric(a), Kind::Numeric(b)) => Ok(a.compare(*b)),
        (Kind::StringLit(a), Kind::StringLit(b)) => Ok(Some(a.cmp(b))),
        _ => Err(ErrorKind::TypeMismatch(TypeMismatch::NotComparable(
            x.type_name(),
            y.type_name(),
        ))
        .at(&y.location)),
    }
}

/// Chains hold pairwise: `(< a b c)` means `a < b` and `b < c`.
fn comparison_(
    session: &mut Interpreter,
    node: &Node,
    args: &[Node],
    accept: fn(Ordering) -> bool,
) -> Result {
    let mut holds = true;
    for (x, y) in args.iter().tuple_windows() {
        holds &= compare(x, y)?.map_or(false, accept);
    }
    Ok(truth(session, node, holds))
}

macro_rules! comparison_primitive {
    ($SYMBOL:tt, $NAME:ident) => {
        paste::item! {
            const $NAME: SpecialForm = SpecialForm {
                names: &[stringify!($SYMBOL)],
                arity: Arity::at_least(1),
                evaluate_operands: true,
                form_ptr: |session, node, args| comparison_(session, node, args, Ordering:: [<is_ $NAME:lower>]),
            };
        }
    };
}

comparison_primitive!(<, LT);
comparison_primitive!(<=, LE);
comparison_primitive!(>, GT);
comparison_primitive!(>=, GE);

const EQUAL: SpecialForm = SpecialForm {
    names: &["="],
    arity: Arity::at_least(1),
    evaluate_operands: true,
    form_ptr: |session, node, args| {
        let holds = args.iter().tuple_windows().all(|(x, y)| x == y);
        Ok(truth(session, node, holds))
    },
};

const NOT_EQUAL: SpecialForm = SpecialForm {
    names: &["/="],
    arity: Arity::at_least(1),
    evaluate_operands: true,
    form_ptr: |session, node, args| {
        let holds = args.iter().tuple_windows().all(|(x, y)| x != y);
        Ok(truth(session, node, holds))
    },
};

const NOT: SpecialForm = SpecialForm {
    names: &["!"],
    arity: Arity::exactly(1),
    evaluate_operands: true,
    form_ptr: |session, node, args| Ok(truth(session, node, falsy(&args[0]))),
};

const AND: SpecialForm = SpecialForm {
    names: &["&&"],
    arity: Arity::at_least(0),
    evaluate_operands: true,
    form_ptr: |session, node, args| {
        let holds = args.iter().all(truthy);
        Ok(truth(session, node, holds))
    },
};

const OR: SpecialForm = SpecialForm {
    names: &["||"],
    arity: Arity::at_least(0),
    evaluate_operands: true,
    form_ptr: |session, node, args| {
        let holds = args.iter().any(truthy);
        Ok(truth(session, node, holds))
    },
};

const XOR: SpecialForm = SpecialForm {
    names: &["^^"],
    arity: Arity::at_least(0),
    evaluate_operands: true,
    form_ptr: |session, node, args| {
        let count = args.iter().filter(|arg| truthy(arg)).count();
        Ok(truth(session, node, count % 2 == 1))
    },
};

const LIST: SpecialForm = SpecialForm {
    names: &["list"],
    arity: Arity::at_least(0),
    evaluate_operands: true,
    form_ptr: |_, node, args| Ok(Node::list(args.to_vec(), node.location.clone())),
};

const SIZE: SpecialForm = SpecialForm {
    names: &["size"],
    arity: Arity::exactly(1),
    evaluate_operands: true,
    form_ptr: size_,
};

fn size_(_: &mut Interpreter, node: &Node, args: &[Node]) -> Result {
    let size = args[0].list_elements().at(&args[0])?.len();
    Ok(Node::integer(size as i64, node.location.clone()))
}

const INDEX: SpecialForm = SpecialForm {
    names: &["index"],
    arity: Arity::exactly(2),
    evaluate_operands: true,
    form_ptr: index_,
};

/// `(index i list)`. Negative indices count from the end, wrapping around as often as needed.
fn index_(_: &mut Interpreter, _node: &Node, args: &[Node]) -> Result {
    let index = args[0].as_integer().at(&args[0])?;
    let elements = args[1].list_elements().at(&args[1])?;
    let len = elements.len();
    let out_of_range = || ErrorKind::IndexOutOfRange { index, len }.at(&args[0].location);
    if len == 0 {
        return Err(out_of_range());
    }
    let position = if index < 0 {
        index.rem_euclid(len as i64) as usize
    } else {
        index as usize
    };
    elements.get(position).cloned().ok_or_else(out_of_range)
}

/// Replaces the contents of `list`, refusing anything that would make it contain itself.
fn store(list: &Node, elements: Vec<Node>) -> Result<()> {
    let cell = list.as_list().at(list)?;
    if let Some(culprit) = elements.iter().find(|element| element.reaches(cell)) {
        return Err(ErrorKind::CyclicList.at(&culprit.location));
    }
    replace_list_elements(cell, elements);
    Ok(())
}

const PUSH: SpecialForm = SpecialForm {
    names: &["push", "append"],
    arity: Arity::at_least(2),
    evaluate_operands: true,
    form_ptr: push_,
};

/// `(push e... list)` appends in place and returns the list.
fn push_(_: &mut Interpreter, _node: &Node, args: &[Node]) -> Result {
    let (list, items) = args.split_last().unwrap_or_else(|| unreachable!());
    let mut elements = list.list_elements().at(list)?;
    elements.extend(items.iter().cloned());
    store(list, elements)?;
    Ok(list.clone())
}

const UNSHIFT: SpecialForm = SpecialForm {
    names: &["unshift", "prepend"],
    arity: Arity::at_least(2),
    evaluate_operands: true,
    form_ptr: unshift_,
};

/// `(unshift e... list)` prepends each element in turn, so `(unshift 1 2 '(3))` is `'(2 1 3)`.
fn unshift_(_: &mut Interpreter, _node: &Node, args: &[Node]) -> Result {
    let (list, items) = args.split_last().unwrap_or_else(|| unreachable!());
    let old = list.list_elements().at(list)?;
    let elements = items.iter().rev().cloned().chain(old).collect();
    store(list, elements)?;
    Ok(list.clone())
}

/// `(pop list)` or `(pop n list)`. Removing more than the list holds just empties it.
fn remove_elements(args: &[Node], from_front: bool) -> Result {
    let (amount, list) = match args {
        [list] => (1, list),
        [amount, list] => (amount.as_integer().at(amount)?, list),
        _ => unreachable!(), // checked by arity
    };
    let mut elements = list.list_elements().at(list)?;
    if amount < 0 {
        return Err(ErrorKind::IndexOutOfRange {
            index: amount,
            len: elements.len(),
        }
        .at(&args[0].location));
    }
    let amount = (amount as usize).min(elements.len());
    if from_front {
        elements.drain(..amount);
    } else {
        elements.truncate(elements.len() - amount);
    }
    replace_list_elements(list.as_list().at(list)?, elements);
    Ok(list.clone())
}

const POP: SpecialForm = SpecialForm {
    names: &["pop"],
    arity: Arity::Between(1..=2),
    evaluate_operands: true,
    form_ptr: |_, _, args| remove_elements(args, false),
};

const SHIFT: SpecialForm = SpecialForm {
    names: &["shift"],
    arity: Arity::Between(1..=2),
    evaluate_operands: true,
    form_ptr: |_, _, args| remove_elements(args, true),
};

fn concatenation(args: &[Node]) -> Result<Vec<Node>> {
    let mut elements = Vec::new();
    for arg in args {
        elements.extend(arg.list_elements().at(arg)?);
    }
    Ok(elements)
}

const CONCAT: SpecialForm = SpecialForm {
    names: &["concat", "merge"],
    arity: Arity::at_least(2),
    evaluate_operands: true,
    form_ptr: |_, node, args| Ok(Node::list(concatenation(args)?, node.location.clone())),
};

const CONCAT_IN_PLACE: SpecialForm = SpecialForm {
    names: &["concat!", "merge!"],
    arity: Arity::at_least(2),
    evaluate_operands: true,
    form_ptr: |_, _, args| {
        store(&args[0], concatenation(args)?)?;
        Ok(args[0].clone())
    },
};

fn print_string_internal(args: &[Node], mode: PrintMode, sep: &'static str) -> String {
    args.iter().map(|arg| printer::pr_str(arg, mode)).join(sep)
}

const STRING: SpecialForm = SpecialForm {
    names: &["string"],
    arity: Arity::at_least(0),
    evaluate_operands: true,
    form_ptr: |_, node, args| {
        let text = print_string_internal(args, PrintMode::Directly, " ");
        Ok(Node::string(text, node.location.clone()))
    },
};

const REPR: SpecialForm = SpecialForm {
    names: &["repr"],
    arity: Arity::at_least(0),
    evaluate_operands: true,
    form_ptr: |_, node, args| {
        let text = print_string_internal(args, PrintMode::ReadableRepresentation, " ");
        Ok(Node::string(text, node.location.clone()))
    },
};

fn write_out(session: &mut Interpreter, node: &Node, text: String, newline: bool) -> Result {
    let written = write!(session.output, "{}{}", text, if newline { "\n" } else { "" })
        .and_then(|_| session.output.flush());
    written.at(node)?;
    Ok(Node::string(text, node.location.clone()))
}

const OUT: SpecialForm = SpecialForm {
    names: &["out"],
    arity: Arity::at_least(0),
    evaluate_operands: true,
    form_ptr: |session, node, args| {
        let text = print_string_internal(args, PrintMode::Directly, " ");
        write_out(session, node, text, false)
    },
};

const PUTS: SpecialForm = SpecialForm {
    names: &["puts"],
    arity: Arity::at_least(0),
    evaluate_operands: true,
    form_ptr: |session, node, args| {
        let text = print_string_internal(args, PrintMode::Directly, "\n");
        write_out(session, node, text, true)
    },
};

const READ: SpecialForm = SpecialForm {
    names: &["read"],
    arity: Arity::exactly(1),
    evaluate_operands: true,
    form_ptr: read_,
};

/// Parses a string (macros included) and hands back its first form, quoted.
fn read_(session: &mut Interpreter, node: &Node, args: &[Node]) -> Result {
    let text = args[0].as_string().at(&args[0])?.to_string();
    let mut forest = session.read(&text, "<read>").at(node)?;
    if forest.is_empty() {
        return Ok(Node::nil(node.location.clone()));
    }
    let first = forest.swap_remove(0);
    Ok(Node::quote(first, node.location.clone()))
}

pub(crate) static BUILTINS: &[SpecialForm] = &[
    // Arithmetic
    SUM,
    SUB,
    MUL,
    DIV,
    REM,
    // Comparisons
    LT,
    LE,
    GT,
    GE,
    EQUAL,
    NOT_EQUAL,
    // Logic
    NOT,
    AND,
    OR,
    XOR,
    // Working with lists
    LIST,
    SIZE,
    INDEX,
    PUSH,
    UNSHIFT,
    POP,
    SHIFT,
    CONCAT,
    CONCAT_IN_PLACE,
    // Working with strings
    STRING,
    REPR,
    OUT,
    PUTS,
    READ,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::evaluator::{eval, Error};
    use crate::location::Location;

    fn session() -> Interpreter {
        Interpreter::new(Config {
            load_prelude: false,
            ..Config::default()
        })
    }

    fn run_in(session: &mut Interpreter, text: &str) -> std::result::Result<Node, Error> {
        let forest = session.read(text, "test.lispy").expect("test programs should parse");
        let mut last = Node::nil(Location::implicit());
        for node in forest.iter() {
            last = eval(session, node)?;
        }
        Ok(last)
    }

    fn shows(text: &str) -> String {
        run_in(&mut session(), text).unwrap().to_string()
    }

    fn fails(text: &str) -> ErrorKind {
        run_in(&mut session(), text).unwrap_err().kind
    }

    #[test]
    fn arithmetic() {
        assert_eq!(shows("(+)"), "0");
        assert_eq!(shows("(+ 1 2 3.5)"), "6.5");
        assert_eq!(shows("(- 5)"), "-5");
        assert_eq!(shows("(- 10 1 2)"), "7");
        assert_eq!(shows("(* 2 3 4)"), "24");
        assert_eq!(shows("(/ 7 2)"), "3.5");
        assert_eq!(shows("(/ 6 3)"), "2.0");
        assert_eq!(shows("(/ 4)"), "4.0");
        assert_eq!(shows("(% 4)"), "4");
        assert_eq!(shows("(% -7 3)"), "2");
        assert!(matches!(fails("(/ 1 0)"), ErrorKind::DivideByZero));
        assert!(matches!(fails("(% 1 0.0)"), ErrorKind::DivideByZero));
        assert!(matches!(
            fails("(+ 1 \"2\")"),
            ErrorKind::TypeMismatch(TypeMismatch::NotANumber(_))
        ));
    }

    #[test]
    fn chained_comparisons() {
        assert_eq!(shows("(< 1 2 3)"), ":true");
        assert_eq!(shows("(< 1 3 2)"), ":false");
        assert_eq!(shows("(>= 3 3 1)"), ":true");
        assert_eq!(shows("(<= 1 1.0 2)"), ":true");
        assert_eq!(shows("(> \"b\" \"a\")"), ":true");
        assert_eq!(shows("(= 1 1.0 1)"), ":true");
        assert_eq!(shows("(= '(1 2) (list 1 2))"), ":true");
        assert_eq!(shows("(/= 1 2 1)"), ":true");
        assert_eq!(shows("(= :a :a)"), ":true");
        assert!(matches!(fails("(< 1 \"a\")"), ErrorKind::TypeMismatch(_)));
    }

    #[test]
    fn logic_follows_falsiness() {
        assert_eq!(shows("(! 0)"), ":true");
        assert_eq!(shows("(! :true)"), ":false");
        assert_eq!(shows("(&& 1 \"x\" :true)"), ":true");
        assert_eq!(shows("(&& 1 nil)"), ":false");
        assert_eq!(shows("(|| :false 0 \"\" 2)"), ":true");
        assert_eq!(shows("(^^ :true :false)"), ":true");
        assert_eq!(shows("(^^ :true 1)"), ":false");
    }

    #[test]
    fn indexing() {
        assert_eq!(shows("(index 0 '(1 2 3))"), "1");
        assert_eq!(shows("(index -1 '(1 2 3))"), "3");
        assert_eq!(shows("(index -4 '(1 2 3))"), "3");
        assert!(matches!(
            fails("(index 3 '(1 2 3))"),
            ErrorKind::IndexOutOfRange { index: 3, len: 3 }
        ));
        assert!(matches!(
            fails("(index 0 '())"),
            ErrorKind::IndexOutOfRange { len: 0, .. }
        ));
        assert!(matches!(fails("(index 0.5 '(1))"), ErrorKind::TypeMismatch(_)));
    }

    #[test]
    fn destructive_list_algebra() {
        let mut s = session();
        run_in(&mut s, "(let (xs '(1 2)))").unwrap();
        assert_eq!(run_in(&mut s, "(push 3 4 xs)").unwrap().to_string(), "'(1 2 3 4)");
        assert_eq!(run_in(&mut s, "(unshift 0 -1 xs)").unwrap().to_string(), "'(-1 0 1 2 3 4)");
        assert_eq!(run_in(&mut s, "(pop xs)").unwrap().to_string(), "'(-1 0 1 2 3)");
        assert_eq!(run_in(&mut s, "(shift 2 xs)").unwrap().to_string(), "'(1 2 3)");
        assert_eq!(run_in(&mut s, "(pop 10 xs)").unwrap().to_string(), "'()");
        assert_eq!(run_in(&mut s, "(size xs)").unwrap().to_string(), "0");
        assert_eq!(run_in(&mut s, "(push 1 xs)").unwrap().to_string(), "'(1)");
    }

    #[test]
    fn aliases_share_mutations() {
        let mut s = session();
        run_in(&mut s, "(let (a (list 1)) (b a))").unwrap();
        run_in(&mut s, "(append 2 b)").unwrap();
        assert_eq!(run_in(&mut s, "a").unwrap().to_string(), "'(1 2)");
    }

    #[test]
    fn failed_mutation_changes_nothing() {
        let mut s = session();
        run_in(&mut s, "(let (xs '(1)))").unwrap();
        assert!(run_in(&mut s, "(pop :two xs)").is_err());
        assert!(run_in(&mut s, "(concat! xs \"no\")").is_err());
        assert_eq!(run_in(&mut s, "xs").unwrap().to_string(), "'(1)");
    }

    #[test]
    fn lists_cannot_contain_themselves() {
        let mut s = session();
        run_in(&mut s, "(let (xs '(1)) (ys '(2)))").unwrap();
        assert!(matches!(run_in(&mut s, "(push xs xs)").unwrap_err().kind, ErrorKind::CyclicList));
        assert!(matches!(run_in(&mut s, "(unshift xs xs)").unwrap_err().kind, ErrorKind::CyclicList));
        run_in(&mut s, "(push xs ys)").unwrap();
        assert!(matches!(run_in(&mut s, "(push ys xs)").unwrap_err().kind, ErrorKind::CyclicList));
        assert!(matches!(
            run_in(&mut s, "(concat! xs (list ys))").unwrap_err().kind,
            ErrorKind::CyclicList
        ));
        assert_eq!(run_in(&mut s, "xs").unwrap().to_string(), "'(1)");
        assert_eq!(run_in(&mut s, "(concat! xs xs)").unwrap().to_string(), "'(1 1)");
        assert_eq!(run_in(&mut s, "(push (concat xs '()) xs)").unwrap().to_string(), "'(1 1 '(1 1))");
    }

    #[test]
    fn concatenation_flattens() {
        assert_eq!(shows("(concat '(1 2) '() (list 3))"), "'(1 2 3)");
        assert!(matches!(
            fails("(concat '(1) \"two\")"),
            ErrorKind::TypeMismatch(TypeMismatch::NotAList(_))
        ));
        let mut s = session();
        run_in(&mut s, "(let (xs '(1)))").unwrap();
        run_in(&mut s, "(merge! xs '(2) '(3))").unwrap();
        assert_eq!(run_in(&mut s, "xs").unwrap().to_string(), "'(1 2 3)");
    }

    #[test]
    fn strings_and_output() {
        assert_eq!(shows("(string \"a\" 1 :b '(\"c\"))"), "\"a 1 :b '(c)\"");
        assert_eq!(shows("(repr \"a\" 1)"), "\"\\\"a\\\" 1\"");
        assert_eq!(shows("(read \"(+ 1 2) ignored\")"), "'(+ 1 2)");
        assert_eq!(shows("(eval (read \"(+ 1 2)\"))"), "3");
        assert_eq!(shows("(read \"\")"), "nil");
        assert!(matches!(fails("(read \"(oops\")"), ErrorKind::Nested(_)));
    }
}
