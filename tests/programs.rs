use lispy::evaluator::ErrorKind;
use lispy::interpreter::{with_sized_stack, Error};
use lispy::types::TypeMismatch;
use lispy::{Config, Interpreter};
use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn bare() -> Config {
    Config {
        load_prelude: false,
        ..Config::default()
    }
}

fn shows(text: &str) -> String {
    Interpreter::new(bare())
        .run_source(text, "test.lispy")
        .unwrap()
        .to_string()
}

fn fails(session: &mut Interpreter, text: &str) -> Error {
    session.run_source(text, "test.lispy").unwrap_err()
}

/// A fresh directory per test, so parallel tests never see each other's files.
fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lispy-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn recursion() {
    let program = "
        (define (fact n) (if (<= n 1) 1 (* n (fact (- n 1)))))
        (fact 5)";
    assert_eq!(shows(program), "120");
}

#[test]
fn big_integers_fall_back_to_floats() {
    let program = "
        (define (fact n) (if (<= n 1) 1 (* n (fact (- n 1)))))
        (list
          (= (fact 20) 2432902008176640000)
          (= (fact 21) 51090942171709440000.0)
          (> (fact 21) (fact 20))
          (= (+ 9223372036854775807 1) 9223372036854775808.0))";
    assert_eq!(shows(program), "'(:true :true :true :true)");
}

#[test]
fn local_definitions_see_each_other() {
    let program = "
        (define (parity n)
          (do
            (define (even n) (if (= n 0) :true (odd (- n 1))))
            (define (odd n) (if (= n 0) :false (even (- n 1))))
            (even n)))
        (list (parity 4) (parity 7))";
    assert_eq!(shows(program), "'(:true :false)");
}

#[test]
fn local_helpers_read_later_bindings() {
    assert_eq!(shows("(define (f) (do (define (g) y) (let (y 5)) (g))) (f)"), "5");
}

#[test]
fn macros_expand_before_evaluation() {
    assert_eq!(shows("(define macro (twice x) (list x x)) (twice (+ 2 3))"), "'(5 5)");
}

#[test]
fn lambda_spellings() {
    assert_eq!(shows("((λ (x) (* x x)) 4)"), "16");
    assert_eq!(shows("((lambda () 9))"), "9");
}

#[test]
fn closures_survive_their_call() {
    let program = "
        (define (counter start) (lambda (step) (+ start step)))
        (let (from-ten (counter 10)))
        (let (from-two (counter 2)))
        (list (from-ten 1) (from-two 1))";
    assert_eq!(shows(program), "'(11 3)");
}

#[test]
fn failed_calls_leave_no_trace() {
    let mut session = Interpreter::new(bare());
    let err = fails(
        &mut session,
        "(let (a 10)) (define (f a b) (+ a b)) (f 1)",
    );
    assert!(matches!(
        err.eval_kind(),
        Some(ErrorKind::ArityMismatch { expected: 2, got: 1, .. })
    ));
    assert_eq!(session.scopes().depth(), 0);
    assert_eq!(session.rep("a").unwrap().to_string(), "10");
}

#[test]
fn bindings_are_immutable_unless_mutated() {
    let mut session = Interpreter::new(bare());
    let err = fails(&mut session, "(let (x 1)) (let (x 2))");
    assert!(matches!(err.eval_kind(), Some(ErrorKind::ImmutableRebind(name)) if name == "x"));
    assert_eq!(session.rep("x").unwrap().to_string(), "1");

    assert_eq!(
        session.rep("(mutate (n 1)) (mutate (n (+ n 1))) n").unwrap().to_string(),
        "2"
    );
}

#[test]
fn list_literals_are_fresh_each_time() {
    let program = "
        (define (fresh) (push 1 '()))
        (fresh)
        (size (fresh))";
    assert_eq!(shows(program), "1");
}

#[test]
fn aliases_share_in_place_edits() {
    assert_eq!(shows("(let (xs '(1 2))) (let (ys xs)) (push 3 ys) xs"), "'(1 2 3)");
    assert_eq!(shows("(let (xs '(1 2))) (concat! xs '(3) '(4)) xs"), "'(1 2 3 4)");
    assert_eq!(shows("(let (xs '(1 2))) (concat xs '(3)) xs"), "'(1 2)");
}

#[test]
fn list_edges() {
    assert_eq!(shows("(index -1 '(1 2 3))"), "3");
    assert_eq!(shows("(pop 5 '(1 2 3))"), "'()");
    assert_eq!(shows("(shift '(1 2 3))"), "'(2 3)");
    assert_eq!(shows("(unshift 1 2 '(3))"), "'(2 1 3)");

    let mut session = Interpreter::new(bare());
    let err = fails(&mut session, "(index 3 '(1 2 3))");
    assert!(matches!(
        err.eval_kind(),
        Some(ErrorKind::IndexOutOfRange { index: 3, len: 3 })
    ));
    let err = fails(&mut session, "(concat '(1) 2)");
    assert!(matches!(
        err.eval_kind(),
        Some(ErrorKind::TypeMismatch(TypeMismatch::NotAList(_)))
    ));
}

#[test]
fn output_goes_to_the_session_writer() {
    let captured = Captured::default();
    let mut session = Interpreter::new(bare()).with_output(captured.clone());
    let value = session
        .run_source("(out \"a\" 1) (puts \"x\" 2.0)", "test.lispy")
        .unwrap();
    assert_eq!(captured.text(), "a 1x\n2.0\n");
    assert_eq!(value.to_string(), "\"x\\n2.0\"");
}

#[test]
fn reading_strings_as_code() {
    assert_eq!(shows("(eval (read \"(+ 1 2) ignored\"))"), "3");
    assert_eq!(shows("(read \"\")"), "nil");
}

#[test]
fn runaway_recursion_is_caught() {
    let mut session = Interpreter::new(Config {
        max_depth: 40,
        ..bare()
    });
    let err = fails(&mut session, "(define (spin n) (spin (+ n 1))) (spin 0)");
    assert!(matches!(err.eval_kind(), Some(ErrorKind::StackOverflow(40))));
    assert_eq!(session.scopes().depth(), 0);
    assert_eq!(session.rep("(+ 1 1)").unwrap().to_string(), "2");
}

#[test]
fn default_depth_limit_fits_on_a_sized_stack() {
    let config = bare();
    let depth = config.max_depth;
    let (near_the_limit, past_the_limit) = with_sized_stack(&config.clone(), move || {
        let mut session = Interpreter::new(config);
        // Each level nests three calls: `count`, `if` and `+`.
        let near = session
            .run_source(
                "(define (count n) (if (= n 0) 0 (+ 1 (count (- n 1))))) (count 320)",
                "deep.lispy",
            )
            .map(|value| value.to_string())
            .map_err(|e| e.to_string());
        let past = match session.rep("(count 5000)") {
            Err(e) => matches!(e.eval_kind(), Some(ErrorKind::StackOverflow(limit)) if *limit == depth),
            Ok(_) => false,
        };
        (near, past)
    })
    .unwrap();
    assert_eq!(near_the_limit, Ok(String::from("320")));
    assert!(past_the_limit);
}

#[test]
fn recover_mode_carries_on() {
    let captured = Captured::default();
    let mut session = Interpreter::new(Config {
        recover: true,
        ..bare()
    })
    .with_output(captured.clone());
    let program = "
        (puts \"before\")
        (define (broken) (nope))
        (broken)
        (puts \"after\")
        5";
    let value = session.run_source(program, "test.lispy").unwrap();
    assert_eq!(value.to_string(), "5");
    assert_eq!(captured.text(), "before\nafter\n");
    assert_eq!(session.scopes().depth(), 0);
}

#[test]
fn sessions_are_independent() {
    let mut one = Interpreter::new(bare());
    let mut two = Interpreter::new(bare());
    one.rep("(let (shared 1))").unwrap();
    assert!(matches!(
        fails(&mut two, "shared").eval_kind(),
        Some(ErrorKind::UnboundSymbol(_))
    ));
    two.rep("(let (shared 2))").unwrap();
    assert_eq!(one.rep("shared").unwrap().to_string(), "1");
}

#[test]
fn prelude() {
    let mut session = Interpreter::default();
    let shows = |session: &mut Interpreter, text: &str| session.rep(text).unwrap().to_string();
    assert_eq!(shows(&mut session, "(map inc (range 0 3))"), "'(1 2 3)");
    assert_eq!(
        shows(&mut session, "(fold (lambda (acc x) (+ acc x)) 0 (range 1 5))"),
        "10"
    );
    assert_eq!(shows(&mut session, "(first '(4 5 6))"), "4");
    assert_eq!(shows(&mut session, "(last '(4 5 6))"), "6");
    assert_eq!(shows(&mut session, "(rest '(4 5 6))"), "'(5 6)");
    assert_eq!(shows(&mut session, "(empty? '())"), ":true");
    assert_eq!(shows(&mut session, "(nil? nil)"), ":true");

    let err = session.rep("(define (inc n) n)").unwrap_err();
    assert!(matches!(err.eval_kind(), Some(ErrorKind::ImmutableRebind(_))));
}

#[test]
fn requiring_files_twice_only_warns() {
    let dir = scratch("cycle");
    fs::write(dir.join("a.lispy"), "(require b)\n(define (from-a) 1)\n").unwrap();
    fs::write(dir.join("b.lispy"), "(require \"a\")\n(define (from-b) 2)\n").unwrap();

    let mut session = Interpreter::new(bare());
    session.run_file(dir.join("a.lispy")).unwrap();
    assert_eq!(session.rep("(+ (from-a) (from-b))").unwrap().to_string(), "3");
    fs::remove_dir_all(dir).ok();
}

#[test]
fn missing_files_name_both_attempts() {
    let dir = scratch("missing");
    let mut session = Interpreter::new(bare());
    let err = session
        .run_source("(require missing)", dir.join("main.lispy"))
        .unwrap_err();
    match err.eval_kind() {
        Some(ErrorKind::FileNotFound { tried, also }) => {
            assert_eq!(tried, &dir.join("missing"));
            assert_eq!(also, &dir.join("missing.lispy"));
        }
        other => panic!("expected FileNotFound, got {:?}", other),
    }
    fs::remove_dir_all(dir).ok();
}

#[test]
fn errors_in_required_files_keep_their_cause() {
    let dir = scratch("nested");
    fs::write(dir.join("bad.lispy"), "(let (ok 1))\n(undefined-thing)\n").unwrap();

    let mut session = Interpreter::new(bare());
    let err = session
        .run_source("(require :bad)", dir.join("main.lispy"))
        .unwrap_err();
    let cause = err.cause().expect("a nested error");
    assert!(matches!(cause.eval_kind(), Some(ErrorKind::UnknownOperation(name)) if name == "undefined-thing"));
    assert_eq!(cause.location().line, 2);
    assert_eq!(session.rep("ok").unwrap().to_string(), "1");
    fs::remove_dir_all(dir).ok();
}
