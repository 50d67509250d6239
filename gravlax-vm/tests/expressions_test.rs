// gravlax-vm - Expression evaluation tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

mod common;
use common::*;

#[test]
fn arithmetic() {
    assert_eq!(run("print 1 + 2;"), "3\n");
    assert_eq!(run("print 10 - 4;"), "6\n");
    assert_eq!(run("print 3 * 4;"), "12\n");
    assert_eq!(run("print 10 / 4;"), "2.5\n");
    assert_eq!(run("print -(3 + 4);"), "-7\n");
    assert_eq!(run("print 1 + 2 * 3;"), "7\n");
    assert_eq!(run("print (1 + 2) * 3;"), "9\n");
}

#[test]
fn number_formatting() {
    assert_eq!(run("print 1;"), "1\n");
    assert_eq!(run("print 1.5;"), "1.5\n");
    assert_eq!(run("print 0.25;"), "0.25\n");
    assert_eq!(run("print 100000;"), "100000\n");
    assert_eq!(run("print 1 / 3;"), format!("{}\n", 1.0 / 3.0));
}

#[test]
fn literals() {
    assert_eq!(run("print nil;"), "nil\n");
    assert_eq!(run("print true;"), "true\n");
    assert_eq!(run("print false;"), "false\n");
    assert_eq!(run("print \"hello\";"), "hello\n");
    assert_eq!(run("print \"\";"), "\n");
}

#[test]
fn string_concatenation() {
    assert_eq!(
        run("var a = \"foo\"; var b = \"bar\"; print a + b;"),
        "foobar\n"
    );
    assert_eq!(run("print \"a\" + \"b\" + \"c\";"), "abc\n");
}

#[test]
fn comparison() {
    assert_eq!(run("print 1 < 2;"), "true\n");
    assert_eq!(run("print 2 <= 2;"), "true\n");
    assert_eq!(run("print 3 > 4;"), "false\n");
    assert_eq!(run("print 4 >= 5;"), "false\n");
}

#[test]
fn equality() {
    assert_eq!(run("print 1 == 1;"), "true\n");
    assert_eq!(run("print 1 == 2;"), "false\n");
    assert_eq!(run("print 1 != 2;"), "true\n");
    assert_eq!(run("print \"a\" == \"a\";"), "true\n");
    assert_eq!(run("print \"a\" == \"b\";"), "false\n");
    assert_eq!(run("print nil == nil;"), "true\n");
    assert_eq!(run("print true == false;"), "false\n");
    // Different types never compare equal.
    assert_eq!(run("print 1 == \"1\";"), "false\n");
    assert_eq!(run("print nil == false;"), "false\n");
}

#[test]
fn concatenated_strings_are_interned() {
    // Two separately built strings with the same content are the same
    // object, so object equality is content equality.
    assert_eq!(
        run("var a = \"gra\" + \"vlax\"; var b = \"grav\" + \"lax\"; print a == b;"),
        "true\n"
    );
}

#[test]
fn not_and_falsiness() {
    assert_eq!(run("print !true;"), "false\n");
    assert_eq!(run("print !false;"), "true\n");
    assert_eq!(run("print !nil;"), "true\n");
    assert_eq!(run("print !0;"), "false\n");
    assert_eq!(run("print !\"\";"), "false\n");
    assert_eq!(run("print !!nil;"), "false\n");
}

#[test]
fn logical_operators_short_circuit() {
    assert_eq!(run("print true and 1;"), "1\n");
    assert_eq!(run("print false and 1;"), "false\n");
    assert_eq!(run("print nil and 1;"), "nil\n");
    assert_eq!(run("print false or 2;"), "2\n");
    assert_eq!(run("print 1 or 2;"), "1\n");
    // The right side must not be evaluated at all.
    assert_eq!(run("var a = 1; false and (a = 2); print a;"), "1\n");
    assert_eq!(run("var a = 1; true or (a = 2); print a;"), "1\n");
}

#[test]
fn comments_are_ignored() {
    assert_eq!(run("print 1; // trailing comment"), "1\n");
    assert_eq!(run("/* leading */ print 2;"), "2\n");
    assert_eq!(run("print /* inline */ 3;"), "3\n");
}
