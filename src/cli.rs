//! Minimal CLI: compile schemas, inspect live graphs.
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::{Map, Value};

use json_dynamik::path_de::from_file_with_path;
use json_dynamik::{DynPointer, Dynamik, EngineConfig, SchemaCompiler};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile JSON schemas with dynamic attributes and inspect data laid over them
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    /// more logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// compile schemas and print their compiled summaries
    Schema(SchemaOut),
    /// build a live graph and print every position with its attributes
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct SchemaOut {
    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// engine configuration (.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// schema document (.json)
    #[arg(long)]
    schema: PathBuf,

    /// data document (.json); the root must be an object or array
    #[arg(long)]
    data: PathBuf,

    /// value exposed to expressions as `$.context`
    #[arg(long)]
    context: Option<PathBuf>,

    /// engine configuration (.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// only print positions under this pointer (e.g. /items/0)
    #[arg(long, default_value = "")]
    pointer: String,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };
        tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Schema(target) => target.run(),
            Command::Inspect(target) => target.run(),
        }
    }
}

impl SchemaOut {
    fn run(&self) -> anyhow::Result<()> {
        let config = load_config(self.config.as_deref())?;
        let source_paths = resolve_file_path_patterns(&self.input).context("failed to resolve input file paths")?;

        let summaries = source_paths
            .par_iter()
            .map(|path| compile_summary(path, &config).map(|summary| (path.to_string_lossy().to_string(), summary)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let output = match summaries.len() {
            1 => summaries.into_iter().map(|(_, summary)| summary).next().unwrap_or_default(),
            _ => Value::Object(summaries.into_iter().collect::<Map<_, _>>()),
        };
        let output = serde_json::to_string_pretty(&output)?;
        match self.out.as_ref() {
            Some(out) => {
                if let Some(parent) = out.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(out, &output).with_context(|| format!("failed to write {}", out.display()))?;
            }
            None => println!("{output}"),
        }
        Ok(())
    }
}

fn compile_summary(path: &Path, config: &EngineConfig) -> anyhow::Result<Value> {
    let schema = read_json(path)?;
    let tree = SchemaCompiler::from_config(&schema, config)?
        .compile().with_context(|| format!("failed to compile {}", path.display()))?;
    tracing::info!(path = %path.display(), nodes = tree.len(), "compiled");
    Ok(tree.summary())
}

impl InspectArgs {
    fn run(&self) -> anyhow::Result<()> {
        let config = load_config(self.config.as_deref())?;
        let schema = read_json(&self.schema)?;
        let data = read_json(&self.data)?;
        let context = match self.context.as_deref() {
            Some(path) => read_json(path)?,
            None => Value::Null,
        };

        let dynamik = Dynamik::builder().schema(schema).context(context).config(config).build(data)?;
        let start = dynamik.at(&self.pointer)?;
        if start.value().is_none() {
            bail!("nothing stored at pointer {:?}", self.pointer);
        }
        print_position(&start, 0);
        Ok(())
    }
}

fn print_position(pointer: &DynPointer, depth: usize) {
    let label = match pointer.pointer() {
        root if root.is_empty() => "/".to_string(),
        other => other,
    };
    let mut flags = Vec::new();
    if pointer.hidden() {
        flags.push("hidden".yellow().to_string());
    }
    if pointer.readonly() {
        flags.push("readonly".red().to_string());
    }
    if pointer.mandatory() {
        flags.push("mandatory".bold().to_string());
    }
    if pointer.minimized() {
        flags.push("minimized".dimmed().to_string());
    }
    if !pointer.validate() {
        flags.push("invalid".red().bold().to_string());
    }
    println!(
        "{}{} {} {} {}",
        "  ".repeat(depth),
        label.cyan(),
        pointer.type_name().dimmed(),
        pointer.abstract_text().green(),
        flags.join(" "),
    );
    for child in pointer.ranked_children() {
        print_position(&child, depth + 1);
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    from_file_with_path(path).map_err(|error| anyhow::anyhow!("failed to parse JSON source file: {error}"))
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                matched_any = true;
                out.push(entry?);
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_paths_pass_through() {
        let paths = resolve_file_path_patterns(["a.json", "dir/b.json"]).unwrap();
        assert_eq!(paths, vec![PathBuf::from("a.json"), PathBuf::from("dir/b.json")]);
    }

    #[test]
    fn empty_glob_is_an_error() {
        let err = resolve_file_path_patterns(["/definitely/not/here/*.json"]).unwrap_err();
        assert!(err.to_string().contains("matched no files"), "{err}");
    }
}
