//! schemagit - Git-backed schema version control
//!
//! Read-only inspection CLI. Mutations (ingest, merge execution,
//! rollback) go through the library; this binary answers questions.

use std::path::PathBuf;
use std::process::ExitCode;

use schemagit::api::SchemaVcs;
use schemagit::config::VcsConfig;
use schemagit::storage::{BranchName, CommitId};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // Parse simple command line args.
    let mut path = PathBuf::from(".schemagit");
    let mut command: Option<String> = None;
    let mut operands: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--database" => {
                i += 1;
                if i < args.len() {
                    path = PathBuf::from(&args[i]);
                }
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("schemagit v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown option: {}", arg);
                return ExitCode::FAILURE;
            }
            arg => {
                if command.is_none() {
                    command = Some(arg.to_string());
                } else {
                    operands.push(arg.to_string());
                }
            }
        }
        i += 1;
    }

    let command = match command {
        Some(c) => c,
        None => {
            print_help();
            return ExitCode::FAILURE;
        }
    };

    let vcs = match SchemaVcs::open(&path, VcsConfig::default()) {
        Ok(vcs) => vcs,
        Err(e) => {
            eprintln!("Error opening repository: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match command.as_str() {
        "branches" => cmd_branches(&vcs),
        "log" => cmd_log(&vcs, &operands),
        "merge-base" => cmd_merge_base(&vcs, &operands),
        "conflicts" => cmd_conflicts(&vcs, &operands),
        "stats" => cmd_stats(&vcs),
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("schemagit - Git-backed schema version control");
    println!();
    println!("Usage: schemagit [OPTIONS] COMMAND [ARGS]");
    println!();
    println!("Commands:");
    println!("  branches                     List branches and their heads");
    println!("  log [BRANCH] [N]             Show the last N commits (default 20)");
    println!("  merge-base COMMIT COMMIT     Find the common ancestor of two commits");
    println!("  conflicts SOURCE TARGET      Classify conflicts between two branches");
    println!("  stats                        Repository statistics");
    println!();
    println!("Options:");
    println!("  -d, --database PATH    Path to repository directory (default: .schemagit)");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
}

fn cmd_branches(vcs: &SchemaVcs) -> Result<(), Box<dyn std::error::Error>> {
    for info in vcs.list_branches()? {
        println!("{}\t{}", info.target.short(), info.name);
    }
    Ok(())
}

fn cmd_log(vcs: &SchemaVcs, operands: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let branch = match operands.first() {
        Some(name) => BranchName::new(name.clone())?,
        None => BranchName::main(),
    };
    let limit: usize = operands
        .get(1)
        .and_then(|n| n.parse().ok())
        .unwrap_or(20);

    for info in vcs.history(&branch, Some(limit))? {
        let marker = if info.is_merge() { "M" } else { " " };
        println!(
            "{} {} {} {}",
            info.id.short(),
            marker,
            info.timestamp.format("%Y-%m-%d %H:%M:%S"),
            info.summary()
        );
    }
    Ok(())
}

fn cmd_merge_base(vcs: &SchemaVcs, operands: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let (a, b) = match operands {
        [a, b] => (CommitId::from_hex(a)?, CommitId::from_hex(b)?),
        _ => return Err("merge-base needs exactly two commit hashes".into()),
    };

    let base = vcs.find_merge_base(a, b)?;
    println!("base: {}", base.base);
    println!("depths: {} / {}", base.source_depth, base.target_depth);
    if base.no_common_ancestor {
        println!("note: histories share no ancestor; this is the configured fallback root");
    }
    Ok(())
}

fn cmd_conflicts(vcs: &SchemaVcs, operands: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let (source, target) = match operands {
        [s, t] => (BranchName::new(s.clone())?, BranchName::new(t.clone())?),
        _ => return Err("conflicts needs SOURCE and TARGET branch names".into()),
    };

    let diffs = vcs.detect_conflicts(&source, &target, None)?;
    if diffs.is_empty() {
        println!("no conflicts");
        return Ok(());
    }

    for diff in diffs {
        let auto = if diff.auto_resolvable() { "auto" } else { "manual" };
        println!(
            "{}\t{}\t{}\t{}",
            diff.path,
            diff.classification,
            diff.severity.as_str(),
            auto
        );
    }
    Ok(())
}

fn cmd_stats(vcs: &SchemaVcs) -> Result<(), Box<dyn std::error::Error>> {
    let head = vcs.resolve_head(&BranchName::main())?;
    print!("{}", vcs.repository().stats(head)?);
    Ok(())
}
