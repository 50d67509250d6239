// gravlax-vm - Garbage collection behaviour tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Collector behaviour observed through the VM: reachable objects survive
//! a collection, unreachable ones are reclaimed, and captured values stay
//! alive exactly as long as something can still see them.
//!
//! Run with `--features gc-stress` to also exercise collection at every
//! allocation point.

mod common;
use common::*;

fn run_and_collect(vm: &mut VM, source: &str) -> String {
    let output = run_with_vm(vm, source);
    vm.collect_now();
    output
}

#[test]
fn temporaries_are_reclaimed() {
    let mut vm = VM::new();
    vm.collect_now();
    let baseline = vm.heap_objects();

    let source = "\
var s = \"\";
for (var i = 0; i < 100; i = i + 1) {
  s = s + \"x\";
}
s = nil;
";
    run_and_collect(&mut vm, source);

    // All hundred intermediate strings and the script function itself are
    // unreachable now; only the global name `s` was added for keeps.
    assert!(
        vm.heap_objects() <= baseline + 2,
        "leak: {} objects before, {} after",
        baseline,
        vm.heap_objects()
    );
}

#[test]
fn byte_accounting_shrinks_after_collection() {
    let mut vm = VM::new();
    let mut out = Vec::new();
    vm.interpret(
        "var s = \"seed\"; for (var i = 0; i < 200; i = i + 1) { s = s + \"padding\"; }",
        &mut out,
    )
    .expect("program runs");

    let before = vm.heap_bytes();
    let mut out2 = Vec::new();
    vm.interpret("s = nil;", &mut out2).expect("clear runs");
    vm.collect_now();
    assert!(
        vm.heap_bytes() < before,
        "bytes should drop: {} -> {}",
        before,
        vm.heap_bytes()
    );
}

#[test]
fn globals_survive_collection() {
    let mut vm = VM::new();
    run_and_collect(&mut vm, "var name = \"gra\" + \"vlax\";");
    assert_eq!(run_with_vm(&mut vm, "print name;"), "gravlax\n");
}

#[test]
fn closed_upvalues_keep_their_values_alive() {
    let mut vm = VM::new();
    let source = "\
var f;
{
  var s = \"a\" + \"b\";
  fun get() { return s; }
  f = get;
}
";
    run_and_collect(&mut vm, source);
    // The block is gone and so is the script that ran it; the closed
    // upvalue is the only path to the string.
    assert_eq!(run_with_vm(&mut vm, "print f();"), "ab\n");
}

#[test]
fn bound_methods_keep_their_receiver_alive() {
    let mut vm = VM::new();
    let source = "\
class Named {
  init(n) { this.n = n; }
  name() { return this.n; }
}
var m = Named(\"keep\" + \"er\").name;
";
    run_and_collect(&mut vm, source);
    assert_eq!(run_with_vm(&mut vm, "print m();"), "keeper\n");
}

#[test]
fn class_methods_survive_while_instances_live() {
    let mut vm = VM::new();
    let source = "\
class Counter {
  init() { this.count = 0; }
  bump() {
    this.count = this.count + 1;
    return this.count;
  }
}
var c = Counter();
";
    run_and_collect(&mut vm, source);
    run_and_collect(&mut vm, "c.bump(); c.bump();");
    assert_eq!(run_with_vm(&mut vm, "print c.bump();"), "3\n");
}

#[test]
fn collection_during_heavy_churn_is_safe() {
    // Enough allocation to cross the first collection threshold, with live
    // data interleaved so marking has real work to do.
    let mut vm = VM::new();
    let source = "\
class Node {
  init(value, next) {
    this.value = value;
    this.next = next;
  }
}
var head = nil;
for (var i = 0; i < 50; i = i + 1) {
  head = Node(\"v\" + \"alue\", head);
}
var count = 0;
var cursor = head;
while (cursor != nil) {
  count = count + 1;
  cursor = cursor.next;
}
print count;
";
    assert_eq!(run_with_vm(&mut vm, source), "50\n");
    vm.collect_now();
    // The whole list is still reachable through `head`.
    assert_eq!(run_with_vm(&mut vm, "print head.value;"), "value\n");
}
