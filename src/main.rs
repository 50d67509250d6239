// gravlax - A small class-based scripting language with a bytecode VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process;

use gravlax_vm::{InterpretError, VM};

// BSD sysexits.
const EX_USAGE: i32 = 64;
const EX_DATAERR: i32 = 65;
const EX_SOFTWARE: i32 = 70;
const EX_IOERR: i32 = 74;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() == 2 && (args[1] == "--version" || args[1] == "-v") {
        println!("Gravlax v{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    match args.len() {
        1 => run_repl(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: gravlax [script]");
            process::exit(EX_USAGE);
        }
    }
}

/// Read-eval-print loop. One VM serves the whole session, so globals and
/// interned strings persist from line to line; errors are printed and the
/// loop carries on.
fn run_repl() {
    let mut vm = VM::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        if stdout.flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(error) = vm.interpret(&line, &mut stdout) {
                    eprintln!("{}", error);
                }
            }
            Err(error) => {
                eprintln!("Read error: {}", error);
                break;
            }
        }
    }
}

/// Execute a source file and exit with the matching status code.
fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read file \"{}\": {}", path, error);
            process::exit(EX_IOERR);
        }
    };

    let mut vm = VM::new();
    let mut stdout = io::stdout();
    match vm.interpret(&source, &mut stdout) {
        Ok(()) => {}
        Err(error @ InterpretError::Compile(_)) => {
            eprintln!("{}", error);
            process::exit(EX_DATAERR);
        }
        Err(error @ InterpretError::Runtime(_)) => {
            eprintln!("{}", error);
            process::exit(EX_SOFTWARE);
        }
    }
}
