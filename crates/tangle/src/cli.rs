//! Command-line front end: compile a grammar file and parse input with one
//! of its rules.
//!
//! ```text
//! tangle <grammar-file> --rule <name> [--input <file>] [--json] [--whitespace-sensitive]
//!        [--max-depth <n>]
//! ```
//!
//! Input is read from standard input when `--input` is not given. The exit
//! code is 0 when the input parses, 1 when it does not, and 2 when the
//! grammar or a file cannot be used.

use std::fs;
use std::io::Read;
use std::process::ExitCode;

use facet::Facet;
use tangle::{compile_with, CompileOptions, Graph};

#[derive(Facet)]
struct Args {
    /// Grammar description file.
    #[facet(positional)]
    grammar: String,

    /// Rule to parse the input with.
    #[facet(named, short = 'r')]
    rule: String,

    /// Input file; standard input when absent.
    #[facet(named, short = 'i', default)]
    input: Option<String>,

    /// Print the tree or the error as JSON.
    #[facet(named)]
    json: bool,

    /// Do not skip whitespace after terminals.
    #[facet(named)]
    whitespace_sensitive: bool,

    /// Limit on nested parser calls while matching the input.
    #[facet(named, default)]
    max_depth: Option<usize>,
}

fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let raw: Vec<&str> = raw.iter().map(String::as_str).collect();
    let args = match facet_args::from_slice::<Args>(&raw) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<ExitCode, String> {
    let grammar = fs::read_to_string(&args.grammar)
        .map_err(|err| format!("cannot read {}: {err}", args.grammar))?;
    let input = match &args.input {
        Some(path) => {
            fs::read_to_string(path).map_err(|err| format!("cannot read {path}: {err}"))?
        }
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .map_err(|err| format!("cannot read standard input: {err}"))?;
            input
        }
    };

    let mut graph = Graph::new();
    let options = CompileOptions {
        whitespace_sensitive: args.whitespace_sensitive,
    };
    let table = compile_with(&mut graph, &grammar, &[], &options)
        .map_err(|err| format!("{}: {err}", args.grammar))?;
    let rule = table
        .get(&args.rule)
        .ok_or_else(|| format!("{} has no rule <{}>", args.grammar, args.rule))?;

    if let Some(depth) = args.max_depth {
        graph.set_max_depth(depth);
    }
    let code = match graph.run(rule, &input) {
        Ok(ast) => {
            if args.json {
                println!("{}", ast.to_json());
            } else {
                print!("{ast}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            if args.json {
                println!("{}", err.to_json());
            } else {
                eprintln!("{err}");
            }
            ExitCode::from(1)
        }
    };

    graph.cleanup(&table.roots());
    Ok(code)
}
