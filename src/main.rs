use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;
use spok::file::{find_spokfile, File, SPOKFILE_NAME};
use spok::shell::{IoStream, ShellRunner};

/// A starter spokfile written by --init.
const STARTER_SPOKFILE: &str = r#"# Welcome to your spokfile!

PROJECT := "my-project"

# Say hello
task hello() {
    echo "Hello from {{.PROJECT}}"
}
"#;

#[derive(Parser)]
#[command(name = "spok")]
#[command(about = "A declarative build system and task runner")]
#[command(version)]
struct Cli {
    /// Tasks to run
    tasks: Vec<String>,

    /// Run tasks even if their fingerprints are unchanged
    #[arg(short, long)]
    force: bool,

    /// Path to the spokfile (defaults to searching upwards from cwd)
    #[arg(long)]
    spokfile: Option<PathBuf>,

    /// List tasks and their descriptions instead of running
    #[arg(long)]
    show: bool,

    /// Rewrite the spokfile in canonical formatting
    #[arg(long)]
    fmt: bool,

    /// Write a starter spokfile to the current directory
    #[arg(long)]
    init: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = simple_logger::SimpleLogger::new().with_level(level).init();

    if let Err(msg) = run(cli).await {
        eprintln!("Error: {}", msg);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    if cli.init {
        return init_spokfile();
    }

    let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
    let spokfile_path = match &cli.spokfile {
        Some(path) => path.clone(),
        None => {
            let home = std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/"));
            find_spokfile(&cwd, &home).map_err(|e| e.to_string())?
        }
    };
    let root = spokfile_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let source = std::fs::read_to_string(&spokfile_path)
        .map_err(|e| format!("Cannot read {}: {}", spokfile_path.display(), e))?;
    let tree = spok::parse(&source).map_err(|e| e.to_string())?;

    if cli.fmt {
        std::fs::write(&spokfile_path, tree.to_string())
            .map_err(|e| format!("Cannot write {}: {}", spokfile_path.display(), e))?;
        println!("Formatted {}", spokfile_path.display());
        return Ok(());
    }

    let mut file = File::new(&tree, root).map_err(|e| e.to_string())?;

    if cli.show {
        for task in file.tasks.values() {
            println!("{:<20} {}", task.name, task.doc);
        }
        return Ok(());
    }

    if cli.tasks.is_empty() {
        return Err(format!(
            "No tasks given. Run `spok --show` to list the tasks in {}",
            spokfile_path.display()
        ));
    }

    let mut stream = if cli.json {
        IoStream::null()
    } else {
        IoStream::os()
    };
    let results = file
        .run(&mut stream, &ShellRunner, cli.force, &cli.tasks)
        .await
        .map_err(|e| e.to_string())?;

    let mut failed = false;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).map_err(|e| e.to_string())?
        );
        failed = results.iter().any(|r| !r.ok());
    } else {
        for result in &results {
            if result.skipped {
                println!("- Task {:?} skipped as up to date", result.task);
            } else if result.ok() {
                println!("- Task {:?} completed", result.task);
            } else {
                println!("- Task {:?} failed", result.task);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn init_spokfile() -> Result<(), String> {
    let path = PathBuf::from(SPOKFILE_NAME);
    if path.exists() {
        return Err(format!("{} already exists", SPOKFILE_NAME));
    }
    std::fs::write(&path, STARTER_SPOKFILE).map_err(|e| e.to_string())?;
    println!("Created {}", SPOKFILE_NAME);
    Ok(())
}
