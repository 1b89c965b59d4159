//! Minimal CLI: load types → (schema | project)
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};

use scope_shape::{Projector, TypeCollection, TypeId, emit_schema, specialize};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// show or apply the scope-specialized view of a declared type
#[derive(Parser, Debug)]
#[command(name = "scope-shape", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print the JSON Schema of a type as seen with the given scopes
    Schema(SchemaOut),
    /// strip every field the given scopes cannot see from JSON documents
    Project(ProjectOut),
}

#[derive(Args, Debug, Clone)]
struct TypeSettings {
    /// type collection document (JSON, `{"types": {...}}`)
    #[arg(long)]
    types: PathBuf,

    /// declared type to specialize
    #[arg(long = "type")]
    type_name: String,

    /// scope held by the caller; repeat for several (order is kept)
    #[arg(long = "scope", short = 's')]
    scopes: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns or '-' for stdin
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    type_settings: TypeSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct ProjectOut {
    #[command(flatten)]
    type_settings: TypeSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl TypeSettings {
    fn load(&self) -> Result<(TypeCollection, TypeId)> {
        let source = std::fs::read_to_string(&self.types)
            .with_context(|| format!("failed to read type collection {}", self.types.display()))?;
        let tc = TypeCollection::from_json_str(&source)
            .with_context(|| format!("failed to load type collection {}", self.types.display()))?;
        let ty = tc.get(&self.type_name).ok_or_else(|| {
            anyhow!("type `{}` is not declared in {}", self.type_name, self.types.display())
        })?;
        Ok((tc, ty))
    }
}

impl InputSettings {
    fn load_process(&self, mut apply: impl FnMut(&str, Value) -> Result<()>) -> Result<()> {
        for source_path in resolve_file_path_patterns(&self.input)? {
            let (label, source) = if source_path == Path::new("-") {
                let source = std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?;
                ("<stdin>".to_string(), source)
            } else {
                let label = source_path.to_string_lossy().to_string();
                let source = std::fs::read_to_string(&source_path)
                    .with_context(|| format!("failed to read source file {label}"))?;
                (label, source)
            };
            for value in documents_from_source(&source, &label, self.ndjson, self.json_pointer.as_deref())? {
                apply(&label, value)?;
            }
        }
        Ok(())
    }
}

impl Command {
    fn no_op(&self) -> bool {
        match self {
            Command::Schema(target) => target.no_op,
            Command::Project(target) => target.no_op,
        }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<()> {
        // debug path
        if self.cmd.no_op() {
            eprintln!("{self:#?}");
            return Ok(());
        }
        match &self.cmd {
            Command::Schema(target) => {
                let settings = &target.type_settings;
                let (mut tc, ty) = settings.load()?;
                let specialized = specialize(&mut tc, ty, &settings.scopes);
                let schema = emit_schema(&tc, specialized);
                let schema_src = serde_json::to_string_pretty(&schema)?;
                write_output(target.out.as_deref(), &schema_src)
            }
            Command::Project(target) => {
                let settings = &target.type_settings;
                let (mut tc, ty) = settings.load()?;
                // one projector for the whole run so specializations are shared
                let mut projector = Projector::new(&mut tc, &settings.scopes);
                let mut shaped = Vec::new();
                target.input_settings.load_process(|label, value| {
                    let value = projector
                        .project(&value, ty)
                        .with_context(|| format!("failed to project a document from {label}"))?;
                    debug!(source = label, "projected document");
                    shaped.push(value);
                    Ok(())
                })?;
                info!(documents = shaped.len(), scopes = ?settings.scopes, "projection done");

                let out_src = if shaped.len() == 1 && !target.input_settings.ndjson {
                    serde_json::to_string_pretty(&shaped[0])?
                } else {
                    let lines = shaped.iter().map(serde_json::to_string).collect::<Result<Vec<_>, _>>()?;
                    lines.join("\n")
                };
                write_output(target.out.as_deref(), &out_src)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_output(out: Option<&Path>, src: &str) -> Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(out, src).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            println!("{src}");
            Ok(())
        }
    }
}

/// Splits one source into documents (one per line for NDJSON) and applies the
/// optional JSON pointer to each.
fn documents_from_source(
    source: &str,
    label: &str,
    ndjson: bool,
    json_pointer: Option<&str>,
) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    if ndjson {
        for (i, line) in source.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value = serde_json::from_str::<Value>(line)
                .with_context(|| format!("failed to parse JSON at {label}:{}", i + 1))?;
            docs.push(value);
        }
    } else {
        let value = serde_json::from_str::<Value>(source)
            .with_context(|| format!("failed to parse JSON source file ({label})"))?;
        docs.push(value);
    }
    match json_pointer {
        None => Ok(docs),
        Some(pointer) => docs
            .into_iter()
            .map(|doc| {
                doc.pointer(pointer)
                    .cloned()
                    .ok_or_else(|| anyhow!("JSON pointer {pointer} does not resolve in {label}"))
            })
            .collect(),
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
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
            for entry in glob::glob(pattern).with_context(|| format!("bad glob pattern {pattern}"))? {
                out.push(entry?);
                matched_any = true;
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

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
