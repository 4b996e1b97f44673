// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("cairn")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Cairn Contributors")
        .about("Package manager for self-describing archives")
        .subcommand_required(false)
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("PATH")
                .global(true)
                .help("Root directory (default: $CAIRN_ROOT, then ~/.cairn)"),
        )
        .subcommand(
            Command::new("install")
                .visible_alias("i")
                .about("Install one or more package archives together")
                .arg(
                    Arg::new("files")
                        .required(true)
                        .num_args(1..)
                        .help("Paths to the package archives"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .visible_alias("r")
                .about("Remove an installed package")
                .arg(Arg::new("name").required(true).help("Package name to remove"))
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Remove even if other installed packages require it"),
                ),
        )
        .subcommand(
            Command::new("list")
                .visible_alias("l")
                .about("List installed packages")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print entries as JSON"),
                ),
        )
        .subcommand(
            Command::new("info")
                .visible_alias("in")
                .about("Show the descriptor of an archive file or installed package")
                .arg(
                    Arg::new("target")
                        .required(true)
                        .help("Archive path, or name of an installed package"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the descriptor as JSON"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Compare an archive's SHA-256 against an expected checksum")
                .arg(Arg::new("file").required(true).help("Path to the archive"))
                .arg(
                    Arg::new("checksum")
                        .required(true)
                        .help("Expected hex-encoded SHA-256"),
                ),
        )
        .subcommand(
            Command::new("pack")
                .about("Build a package archive from a directory containing package.toml")
                .arg(Arg::new("dir").required(true).help("Source directory"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Output file (default: <name>-<version>.tar.xz)"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("cairn.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
