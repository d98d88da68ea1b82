//! Replays `fixtures/*.json` against the parser.
//!
//! Each fixture file holds a list of cases: a flat `input` object and either
//! the `expect`ed tree or an `error` substring.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use formnest::builder::DEFAULT_MAX_INDEX;
use formnest::{ConflictPolicy, ParseOptions, parse_source};

/// replay fixture cases against the form-key parser
#[derive(Parser, Debug)]
#[command(name = "dev-test-runner")]
struct RunnerArgs {
    /// directory holding `*.json` fixture files
    #[arg(default_value = "fixtures")]
    dir: PathBuf,

    /// only run cases whose name matches this regex
    #[arg(long)]
    filter: Option<Regex>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Case {
    name: String,
    input: serde_json::Map<String, Value>,
    #[serde(default)]
    expect: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    max_index: Option<usize>,
}

enum Outcome {
    Pass,
    Fail(String),
}

impl Case {
    fn options(&self) -> ParseOptions {
        ParseOptions {
            conflicts: if self.replace { ConflictPolicy::Replace } else { ConflictPolicy::Reject },
            max_index: Some(self.max_index.unwrap_or(DEFAULT_MAX_INDEX)),
        }
    }

    fn run(&self) -> Outcome {
        let input = Value::Object(self.input.clone());
        let result = parse_source(&input, &self.options());
        match (result, &self.expect, &self.error) {
            (Ok(tree), Some(expect), None) => {
                let got = tree.into_json();
                if &got == expect {
                    Outcome::Pass
                } else {
                    Outcome::Fail(format!("expected {expect}\n      got      {got}"))
                }
            }
            (Err(error), None, Some(needle)) => {
                let message = error.to_string();
                if message.contains(needle.as_str()) {
                    Outcome::Pass
                } else {
                    Outcome::Fail(format!("error {message:?} does not mention {needle:?}"))
                }
            }
            (Ok(tree), None, Some(needle)) => {
                Outcome::Fail(format!("expected an error mentioning {needle:?}, got {}", tree.into_json()))
            }
            (Err(error), Some(_), None) => Outcome::Fail(format!("unexpected error: {error}")),
            _ => Outcome::Fail("case must set exactly one of `expect` or `error`".to_string()),
        }
    }
}

fn load_cases(path: &Path) -> Result<Vec<Case>> {
    let source = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let de = &mut serde_json::Deserializer::from_str(&source);
    match serde_path_to_error::deserialize::<_, Vec<Case>>(de) {
        Ok(cases) => Ok(cases),
        Err(err) => {
            let at = err.path().to_string();
            bail!("{}: at JSON path {at} → {}", path.display(), err.into_inner())
        }
    }
}

fn fixture_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join("*.json");
    let pattern = pattern.to_string_lossy();
    let mut files = glob::glob(&pattern)
        .with_context(|| format!("bad fixture pattern: {pattern}"))?
        .collect::<Result<Vec<_>, _>>()?;
    if files.is_empty() {
        bail!("no fixture files match {pattern}");
    }
    files.sort();
    Ok(files)
}

fn main() -> Result<()> {
    let args = RunnerArgs::parse();

    let (mut passed, mut failed) = (0usize, 0usize);
    for file in fixture_files(&args.dir)? {
        eprintln!("—— {} ——", file.display());
        for case in load_cases(&file)? {
            if args.filter.as_ref().is_some_and(|rx| !rx.is_match(&case.name)) {
                continue;
            }
            match case.run() {
                Outcome::Pass => {
                    passed += 1;
                    eprintln!("  {} {}", "✅".green(), case.name);
                }
                Outcome::Fail(why) => {
                    failed += 1;
                    eprintln!("  {} {}\n      {}", "❌".red(), case.name.bold(), why);
                }
            }
        }
    }

    eprintln!("{passed} passed, {failed} failed");
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
