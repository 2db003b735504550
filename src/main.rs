//! Command-line driver (spec.md §6): opens a database at a given data/WAL
//! path pair and runs a single operation against it. Exit code is 0 on
//! success, the negative of the internal error code on failure.

use std::process::ExitCode;

use log::error;
use numstore_core::db::{Database, OpenOptions};
use numstore_core::utils::init_log;

fn usage() -> ! {
    eprintln!(
        "usage: numstore-cli <data-file> <wal-file> <command> [args...]\n\
         commands:\n\
         \u{20}\u{20}new-variable <name> <type>\n\
         \u{20}\u{20}delete-variable <name>\n\
         \u{20}\u{20}lookup <name>\n\
         \u{20}\u{20}fsize <name>\n\
         \u{20}\u{20}checkpoint"
    );
    std::process::exit(-4); // INVALID_ARGUMENT
}

fn run(args: &[String]) -> numstore_core::SmallResult<()> {
    if args.len() < 3 {
        usage();
    }
    let db = Database::open(OpenOptions::new(&args[0], &args[1]))?;
    let command = args[2].as_str();

    match command {
        "new-variable" => {
            if args.len() < 5 {
                usage();
            }
            let (name, ty) = (&args[3], &args[4]);
            db.begin_txn()?;
            let id = db.new_variable(name.as_bytes(), ty.as_bytes())?;
            db.commit()?;
            println!("{id}");
        }
        "delete-variable" => {
            let name = args.get(3).unwrap_or_else(|| usage());
            db.begin_txn()?;
            db.delete_variable(name.as_bytes())?;
            db.commit()?;
        }
        "lookup" => {
            let name = args.get(3).unwrap_or_else(|| usage());
            let (id, ty) = db.lookup(name.as_bytes())?;
            println!("{id} {}", String::from_utf8_lossy(&ty));
        }
        "fsize" => {
            let name = args.get(3).unwrap_or_else(|| usage());
            let (id, _) = db.lookup(name.as_bytes())?;
            println!("{}", db.fsize(id)?);
        }
        "checkpoint" => {
            db.checkpoint()?;
        }
        _ => usage(),
    }
    db.close()
}

fn main() -> ExitCode {
    init_log();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            e.show_backtrace();
            ExitCode::from((-e.exit_code()) as u8)
        }
    }
}
