//! Interpreter command-line.
//!
//! When called without arguments it drops into an interactive
//! read-evaluate-print loop.  When called with a script path it runs the
//! script and exits with 0 on success, 65 on a scan/parse/resolve error, or
//! 70 on a runtime error.  Anything else is a usage error (64).

use std::env;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::process;

use anyhow::Context;

use loxen::interpreter::{Interpreter, Outcome};

fn main() -> Result<(), anyhow::Error> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    match args.as_slice() {
        [] => run_prompt()?,
        [path] => run_file(path)?,
        _ => {
            eprintln!("Usage: loxen [script]");
            process::exit(64);
        }
    }
    Ok(())
}

fn run_file(path: &str) -> Result<(), anyhow::Error> {
    let source = fs::read_to_string(path).with_context(|| format!("failed to open {}", path))?;

    let mut stdout = io::stdout();
    let mut interp = Interpreter::new(&mut stdout);
    let outcome = interp.run(&source);
    for report in interp.reports() {
        eprintln!("{}", report);
    }

    stdout.flush()?;
    match outcome {
        Outcome::Success => Ok(()),
        Outcome::StaticError => process::exit(65),
        Outcome::RuntimeError => process::exit(70),
    }
}

fn run_prompt() -> Result<(), anyhow::Error> {
    let stdin = io::stdin();
    let mut repl_stdout = io::stdout();
    let mut interp_stdout = io::stdout();

    let mut interp = Interpreter::new(&mut interp_stdout);

    let mut input = String::new();
    loop {
        repl_stdout.write_all(b"\n> ")?;
        repl_stdout.flush()?;

        input.clear();
        let nbytes = stdin.read_line(&mut input)?;
        if nbytes == 0 {
            break;
        }

        // Errors are shown and the session keeps going.
        interp.run(&input);
        for report in interp.reports() {
            eprintln!("{}", report);
        }
    }

    Ok(())
}
