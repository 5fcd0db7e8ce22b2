//! Visualizer script driver: reads a line-oriented script of
//! `insert <key> <value>` / `delete <key>` commands and drives a tree
//! through its public operations, printing the leaf chain after each
//! step. The visualizer itself is out of scope for this crate — this is
//! the thin collaborator surface it would sit behind, kept as a small
//! `clap`-driven binary alongside the library.

use std::fs;
use std::io::{self, Read};

use clap::{App, Arg};
use log::warn;

use bptree::tree::memory::MemoryBackend;
use bptree::tree::Tree;

fn main() {
    bptree::init_env_logger();

    let matches = App::new("bptree-script")
        .about("Replays an insert/delete script against an in-memory B+-tree")
        .arg(
            Arg::with_name("degree")
                .long("degree")
                .takes_value(true)
                .default_value("4")
                .help("Tree degree (d >= 3)"),
        )
        .arg(
            Arg::with_name("script")
                .help("Path to a script file; reads stdin if omitted")
                .index(1),
        )
        .get_matches();

    let degree: usize = matches
        .value_of("degree")
        .unwrap()
        .parse()
        .unwrap_or_else(|_| {
            eprintln!("invalid --degree, falling back to 4");
            4
        });

    let input = match matches.value_of("script") {
        Some(path) => fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("failed to read {path}: {e}");
            std::process::exit(1);
        }),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .expect("failed to read stdin");
            buf
        }
    };

    let mut tree: Tree<String, String, MemoryBackend<String, String>> =
        Tree::new(degree, MemoryBackend::new()).expect("degree must be >= 3");

    for (lineno, line) in input.lines().enumerate() {
        run_line(&mut tree, lineno + 1, line);
    }
}

fn run_line(
    tree: &mut Tree<String, String, MemoryBackend<String, String>>,
    lineno: usize,
    line: &str,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["insert", key, value] => match tree.insert(key.to_string(), value.to_string()) {
            Ok(()) => println!("insert {key} {value} -> ok"),
            Err(e) => println!("insert {key} {value} -> {e}"),
        },
        ["delete", key] => match tree.delete(&key.to_string()) {
            Ok(()) => println!("delete {key} -> ok"),
            Err(e) => println!("delete {key} -> {e}"),
        },
        _ => warn!("line {lineno}: malformed command {line:?}, ignored"),
    }
}
