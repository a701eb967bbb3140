#![deny(clippy::all)]
#![deny(unsafe_code)]

use std::{ffi::OsString, path::PathBuf, process::Command};

type Fallible<T> = Result<T, Box<dyn std::error::Error>>;

const PACKAGE: &str = "lspower-handlers";

/// A cargo invocation exposed as an xtask subcommand.
struct Task {
    name: &'static str,
    args: &'static [&'static str],
    trailing: &'static [&'static str],
    deny_warnings: bool,
}

const TASKS: &[Task] = &[
    Task {
        name: "build",
        args: &["build", "--package", PACKAGE],
        trailing: &[],
        deny_warnings: false,
    },
    Task {
        name: "check",
        args: &["check", "--all-targets", "--package", "xtask", "--package", PACKAGE],
        trailing: &[],
        deny_warnings: true,
    },
    Task {
        name: "clippy",
        args: &["clippy", "--all-targets", "--package", "xtask", "--package", PACKAGE],
        trailing: &["--", "-D", "warnings"],
        deny_warnings: false,
    },
    Task {
        name: "doc",
        args: &["+nightly", "doc", "--package", PACKAGE],
        trailing: &[],
        deny_warnings: false,
    },
    Task {
        name: "format",
        args: &["+nightly", "fmt", "--all"],
        trailing: &[],
        deny_warnings: false,
    },
    Task {
        name: "test",
        args: &["test", "--examples", "--lib", "--tests", "--doc", "--package", PACKAGE],
        trailing: &[],
        deny_warnings: true,
    },
];

fn usage() -> String {
    let mut help = String::from("xtask\n\nUSAGE:\n    xtask [SUBCOMMAND] [-- <cargo args>...]\n\nFLAGS:\n");
    help.push_str("    -h, --help          Prints help information\n\nSUBCOMMANDS:\n");
    for task in TASKS {
        help.push_str(&format!("    {}\n", task.name));
    }
    help.push_str("    help                Prints this message");
    help
}

fn project_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().map(PathBuf::from).unwrap_or(manifest_dir)
}

fn run(task: &Task, cargo_args: &[OsString]) -> Fallible<()> {
    // The cargo wrapper is used instead of $CARGO so that toolchain overrides like +nightly work.
    let mut cmd = Command::new("cargo");
    cmd.current_dir(project_root());
    if task.deny_warnings {
        cmd.env("RUSTFLAGS", "-Dwarnings");
    }
    cmd.args(task.args);
    cmd.args(cargo_args);
    cmd.args(task.trailing);

    let status = cmd.status()?;
    if !status.success() {
        return Err(format!("cargo {} failed: {}", task.name, status).into());
    }
    Ok(())
}

fn main() -> Fallible<()> {
    let mut args: Vec<_> = std::env::args_os().skip(1).collect();

    let cargo_args = match args.iter().position(|arg| arg == "--") {
        Some(dash_dash) => {
            let extra = args.drain(dash_dash + 1 ..).collect();
            args.pop();
            extra
        },
        None => Vec::new(),
    };

    let mut args = pico_args::Arguments::from_vec(args);
    let subcommand = args.subcommand()?;
    let help = args.contains(["-h", "--help"]);

    match subcommand.as_deref() {
        None | Some("help") => {
            println!("{}\n", usage());
        },
        Some(name) => {
            let task = TASKS
                .iter()
                .find(|task| task.name == name)
                .ok_or_else(|| format!("unknown subcommand: {}", name))?;
            if help {
                println!("xtask-{}\n\nUSAGE:\n    xtask {} [-- <cargo args>...]\n", task.name, task.name);
            } else {
                run(task, &cargo_args)?;
            }
        },
    }

    if let Err(pico_args::Error::UnusedArgsLeft(args)) = args.finish() {
        return Err(format!("unrecognized arguments: {}", args.join(" ")).into());
    }

    Ok(())
}
