use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "cadenza", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a script and report errors without writing anything.
    Check(CheckArgs),
    /// Compile a script to a binary storyboard.
    Compile(CompileArgs),
    /// Dump a script or compiled storyboard as JSON.
    Dump(DumpArgs),
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Input storyboard script.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct CompileArgs {
    /// Input storyboard script.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output binary storyboard path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct DumpArgs {
    /// Input: a script, or a compiled storyboard if the extension is `.czb`.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Check(args) => cmd_check(args),
        Command::Compile(args) => cmd_compile(args),
        Command::Dump(args) => cmd_dump(args),
    }
}

fn load_storyboard(path: &Path) -> anyhow::Result<cadenza::Storyboard> {
    if path.extension().is_some_and(|e| e == "czb") {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read storyboard '{}'", path.display()))?;
        Ok(cadenza::read_storyboard(&bytes)?)
    } else {
        Ok(cadenza::compile_file(path)?)
    }
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let sb = cadenza::compile_file(&args.in_path)?;
    let keys: usize = sb.timelines.iter().map(|t| t.keys.len()).sum();
    eprintln!(
        "ok: {} reference(s), {} timeline(s), {} key(s)",
        sb.objects.len(),
        sb.timelines.len(),
        keys
    );
    Ok(())
}

fn cmd_compile(args: CompileArgs) -> anyhow::Result<()> {
    let sb = cadenza::compile_file(&args.in_path)?;
    let bytes = cadenza::write_storyboard(&sb);

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &bytes)
        .with_context(|| format!("write storyboard '{}'", args.out.display()))?;

    eprintln!("wrote {} ({} bytes)", args.out.display(), bytes.len());
    Ok(())
}

fn cmd_dump(args: DumpArgs) -> anyhow::Result<()> {
    let sb = load_storyboard(&args.in_path)?;
    let json = serde_json::to_string_pretty(&sb).context("serialize storyboard JSON")?;
    println!("{json}");
    Ok(())
}
