// src/main.rs

use anyhow::Result;
use cairn::config;
use cairn::db::DbPackage;
use cairn::packages::{Manifest, archive};
use cairn::PackageRoot;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "cairn")]
#[command(author, version, about = "Package manager for self-describing archives", long_about = None)]
struct Cli {
    /// Root directory holding the registry, store and installed files
    #[arg(long, global = true, env = config::ROOT_ENV, default_value_os_t = config::default_root())]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install one or more package archives together
    #[command(visible_alias = "i")]
    Install {
        /// Paths to the package archives
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Remove an installed package
    #[command(visible_alias = "r")]
    Remove {
        /// Package name to remove
        name: String,
        /// Remove even if other installed packages require it
        #[arg(short, long)]
        force: bool,
    },
    /// List installed packages
    #[command(visible_alias = "l")]
    List {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the descriptor of an archive file or installed package
    #[command(visible_alias = "in")]
    Info {
        /// Archive path, or name of an installed package
        target: String,
        /// Print the descriptor as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare an archive's SHA-256 against an expected checksum
    Verify {
        /// Path to the archive
        file: PathBuf,
        /// Expected hex-encoded SHA-256
        checksum: String,
    },
    /// Build a package archive from a directory containing package.toml
    Pack {
        /// Source directory
        dir: PathBuf,
        /// Output file (default: <name>-<version>.tar.xz)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

/// One `list` line: `name@version  hash`, names padded to `width`
fn list_line(entry: &DbPackage, width: usize) -> String {
    let id = format!("{}@{}", entry.name(), entry.version());
    format!("{id:<width$}  {}", entry.hash)
}

fn print_list(entries: &[DbPackage], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    let width = entries
        .iter()
        .map(|e| e.name().len() + 1 + e.version().len())
        .max()
        .unwrap_or(0);
    for entry in entries {
        println!("{}", list_line(entry, width));
    }
    Ok(())
}

fn render_info(manifest: &Manifest) -> String {
    let package = &manifest.package;
    let mut out = format!("{}@{}\n", package.name, package.version);
    if !package.description.is_empty() {
        out.push_str(&package.description);
        out.push('\n');
    }

    let sections: [(&str, &[String]); 4] = [
        ("Authors", &package.authors),
        ("Maintainers", &package.maintainers),
        ("Dependencies", &manifest.dependencies.required),
        ("Optional Dependencies", &manifest.dependencies.optional),
    ];
    for (title, items) in sections {
        out.push_str(&format!("\n{title}:\n"));
        for item in items {
            out.push_str(&format!("  {item}\n"));
        }
    }
    out
}

fn default_pack_output(manifest: &Manifest) -> PathBuf {
    PathBuf::from(format!("{}-{}.tar.xz", manifest.name(), manifest.version()))
}

fn main() -> Result<()> {
    // Diagnostics go to stderr so list/info output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Install { files }) => {
            info!("Installing {} archive(s) into {}", files.len(), cli.root.display());
            let root = PackageRoot::open(&cli.root)?;
            let installed = root.install(&files)?;
            for entry in &installed {
                println!("Installed {}@{}", entry.name(), entry.version());
            }
            Ok(())
        }
        Some(Commands::Remove { name, force }) => {
            let root = PackageRoot::open(&cli.root)?;
            let removed = root.remove(&name, force)?;
            println!("Removed {}@{}", removed.name(), removed.version());
            Ok(())
        }
        Some(Commands::List { json }) => {
            let root = PackageRoot::open(&cli.root)?;
            print_list(&root.list(), json)
        }
        Some(Commands::Info { target, json }) => {
            let path = Path::new(&target);
            let manifest = if path.is_file() {
                archive::inspect(path)?
            } else {
                PackageRoot::open(&cli.root)?.installed_manifest(&target)?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
            } else {
                print!("{}", render_info(&manifest));
            }
            Ok(())
        }
        Some(Commands::Verify { file, checksum }) => {
            if archive::verify_checksum(&file, &checksum)? {
                println!("Checksums matched");
                Ok(())
            } else {
                Err(anyhow::anyhow!(
                    "Checksum mismatch for {}",
                    file.display()
                ))
            }
        }
        Some(Commands::Pack { dir, output }) => {
            let manifest = Manifest::from_file(&dir.join(config::MANIFEST_FILE))?;
            let output = output.unwrap_or_else(|| default_pack_output(&manifest));
            archive::pack(&dir, &output)?;
            println!(
                "Packed {}@{} into {}",
                manifest.name(),
                manifest.version(),
                output.display()
            );
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "cairn", &mut io::stdout());
            Ok(())
        }
        None => {
            println!("Cairn Package Manager v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'cairn --help' for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(descriptor: &str) -> Manifest {
        Manifest::from_toml(descriptor, "test").unwrap()
    }

    #[test]
    fn test_cli_parses_global_root() {
        let cli = Cli::try_parse_from(["cairn", "list", "--root", "/tmp/r", "--json"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("/tmp/r"));
        assert!(matches!(cli.command, Some(Commands::List { json: true })));
    }

    #[test]
    fn test_cli_aliases() {
        let cli = Cli::try_parse_from(["cairn", "i", "a.tar.xz", "b.tar.xz"]).unwrap();
        match cli.command {
            Some(Commands::Install { files }) => assert_eq!(files.len(), 2),
            _ => panic!("expected install"),
        }

        let cli = Cli::try_parse_from(["cairn", "r", "foo", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Remove { force: true, .. })
        ));
    }

    #[test]
    fn test_install_requires_files() {
        assert!(Cli::try_parse_from(["cairn", "install"]).is_err());
    }

    #[test]
    fn test_list_line_alignment() {
        let entry = DbPackage::new(
            "abc123".to_string(),
            &manifest("[package]\nname = \"foo\"\nversion = \"1.0.0\"\n"),
        );
        assert_eq!(list_line(&entry, 12), "foo@1.0.0     abc123");
    }

    #[test]
    fn test_render_info_sections() {
        let text = render_info(&manifest(
            "[package]\nname = \"bar\"\nversion = \"2.0.0\"\ndescription = \"Bar tool\"\nauthors = [\"Ada\"]\n\
             [dependencies]\nrequired = [\"foo@^1.0.0\"]\n",
        ));
        assert!(text.starts_with("bar@2.0.0\nBar tool\n"));
        assert!(text.contains("Authors:\n  Ada\n"));
        assert!(text.contains("Dependencies:\n  foo@^1.0.0\n"));
        assert!(text.contains("Optional Dependencies:\n"));
    }

    #[test]
    fn test_default_pack_output() {
        let m = manifest("[package]\nname = \"foo\"\nversion = \"1.2.3\"\n");
        assert_eq!(default_pack_output(&m), PathBuf::from("foo-1.2.3.tar.xz"));
    }
}
