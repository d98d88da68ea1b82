//! Minimal CLI: flat form data → nested JSON
use std::path::PathBuf;

use anyhow::{Context, Result, bail, ensure};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use formnest::builder::DEFAULT_MAX_INDEX;
use formnest::{ConflictPolicy, KeyPath, MultiDict, Node, ParseOptions, Segment, parse_source};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// rebuild nested JSON from bracket-annotated form keys (`a[b][]=1&a[c]=2`)
#[derive(Parser, Debug)]
#[command(name = "formnest", version)]
pub struct CommandLineInterface {
    /// log parser decisions to stderr (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// parse flat form data and print the nested tree as JSON
    Parse(ParseOut),
    /// show how keys tokenize into path segments
    Keys(KeysOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// literal query strings, e.g. 'user[name]=joe&user[tags][]=a'
    #[arg(long, short)]
    query: Vec<String>,

    /// files holding one input each. May be literal paths or quoted glob patterns
    ///
    /// stdin is read when neither --query nor --input is given
    #[arg(long, short, num_args = 1..)]
    input: Vec<String>,

    /// inputs are flat JSON objects (`{"key": "v" | ["v", ...]}`) instead of query strings
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
struct ParseSettings {
    /// what to do when a key reshapes part of the tree
    #[arg(long, value_enum, default_value_t = OnConflict::Reject)]
    on_conflict: OnConflict,

    /// largest accepted `[n]` index
    #[arg(long, default_value_t = DEFAULT_MAX_INDEX)]
    max_index: usize,

    /// accept any index (sparse lists are padded up to it)
    #[arg(long, conflicts_with = "max_index")]
    no_index_limit: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OnConflict {
    /// fail with an error naming the key
    Reject,
    /// discard the earlier value and keep going
    Replace,
}

#[derive(clap::Parser, Debug)]
struct ParseOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    parse_settings: ParseSettings,

    /// pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct KeysOut {
    /// keys to tokenize
    #[arg(required = true)]
    keys: Vec<String>,
}

/// One unit of input: where it came from and its text.
#[derive(Debug, Clone)]
struct Input {
    label: String,
    text: String,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl ParseSettings {
    fn options(&self) -> ParseOptions {
        ParseOptions {
            conflicts: match self.on_conflict {
                OnConflict::Reject => ConflictPolicy::Reject,
                OnConflict::Replace => ConflictPolicy::Replace,
            },
            max_index: (!self.no_index_limit).then_some(self.max_index),
        }
    }
}

impl InputSettings {
    fn load(&self) -> Result<Vec<Input>> {
        let mut inputs: Vec<Input> = self
            .query
            .iter()
            .enumerate()
            .map(|(i, text)| Input { label: format!("--query #{}", i + 1), text: text.clone() })
            .collect();

        for source_path in resolve_file_path_patterns(&self.input)? {
            let label = source_path.to_string_lossy().to_string();
            let text = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read input file {label}"))?;
            inputs.push(Input { label, text });
        }

        if inputs.is_empty() {
            let text = std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?;
            inputs.push(Input { label: "<stdin>".to_string(), text });
        }
        Ok(inputs)
    }
}

impl Input {
    fn parse(&self, json: bool, options: &ParseOptions) -> Result<Node<String>> {
        let tree = if json {
            let value = serde_json::from_str::<Value>(&self.text)
                .with_context(|| format!("failed to parse JSON input ({})", self.label))?;
            ensure!(value.is_object(), "JSON input ({}) is not an object", self.label);
            parse_source(&value, options)
        } else {
            parse_source(&MultiDict::from_query(self.text.trim()), options)
        };
        tree.with_context(|| format!("failed to build tree ({})", self.label))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    /// Install the stderr log subscriber for this run.
    pub fn init_tracing(&self) {
        let default = match self.verbose {
            0 => "warn",
            1 => "formnest=debug",
            _ => "formnest=trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Parse(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(());
                }

                let options = target.parse_settings.options();
                let inputs = target.input_settings.load()?;
                let json = target.input_settings.json;
                tracing::debug!(inputs = inputs.len(), ?options, "parsing");

                let mut trees = inputs
                    .par_iter()
                    .map(|input| input.parse(json, &options))
                    .collect::<Result<Vec<_>>>()?;

                let output = match trees.len() {
                    1 => serialize(&trees.remove(0), target.pretty)?,
                    _ => serialize(&trees, target.pretty)?,
                };
                write_output(target.out.as_ref(), &output)
            }
            Command::Keys(target) => {
                for key in &target.keys {
                    println!("{}", describe_key(key));
                }
                Ok(())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn serialize<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

fn write_output(out: Option<&PathBuf>, text: &str) -> Result<()> {
    let Some(out) = out else {
        println!("{text}");
        return Ok(());
    };
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(out, text).with_context(|| format!("failed to write {}", out.display()))
}

fn describe_key(key: &str) -> String {
    let path = KeyPath::parse(key);
    if path.is_empty() {
        return format!("{key:?} => (no root field, skipped)");
    }
    let segments = path
        .segments()
        .iter()
        .map(|segment| match segment {
            Segment::Field(name) => format!("field {name:?}"),
            Segment::Index(n) => format!("index {n}"),
            Segment::Append => "append".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{key:?} => {path} [{segments}]")
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
            for entry in glob::glob(pattern).with_context(|| format!("bad glob pattern: {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
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
    use serde_json::json;

    fn input(text: &str) -> Input {
        Input { label: "test".to_string(), text: text.to_string() }
    }

    #[test]
    fn query_input_builds_tree() {
        let tree = input("a[b][]=1&a[b][]=2&c=x\n").parse(false, &ParseOptions::default()).unwrap();
        assert_eq!(tree.into_json(), json!({"a": {"b": ["1", "2"]}, "c": "x"}));
    }

    #[test]
    fn json_input_builds_tree() {
        let tree = input(r#"{"a[0]": "x", "a[2]": ["y"], "n": 3}"#)
            .parse(true, &ParseOptions::default())
            .unwrap();
        assert_eq!(tree.into_json(), json!({"a": ["x", null, "y"], "n": "3"}));
        assert!(input("[1, 2]").parse(true, &ParseOptions::default()).is_err());
    }

    #[test]
    fn conflict_flag_maps_to_policy() {
        let cli = CommandLineInterface::parse_from(["formnest", "parse", "-q", "a=1", "--on-conflict", "replace", "--no-index-limit"]);
        let Command::Parse(target) = &cli.cmd else { panic!("expected parse") };
        let options = target.parse_settings.options();
        assert_eq!(options.conflicts, ConflictPolicy::Replace);
        assert_eq!(options.max_index, None);
        assert_eq!(ParseSettings { on_conflict: OnConflict::Reject, max_index: 5, no_index_limit: false }.options().max_index, Some(5));
    }

    #[test]
    fn conflicting_input_reports_label() {
        let err = input("a=1&a[b]=2").parse(false, &ParseOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("test"));
    }

    #[test]
    fn keys_are_described() {
        assert_eq!(describe_key("a[b][0][]"), r#""a[b][0][]" => a[b][0][] [field "a", field "b", index 0, append]"#);
        assert_eq!(describe_key("[x]"), r#""[x]" => (no root field, skipped)"#);
    }
}
