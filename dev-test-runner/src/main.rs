//! Runs the JSON scenarios under `cases/` against the engine.
//!
//! ```text
//! cargo run -p dev-test-runner [-- <regex over case names>]
//! ```
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use json_dynamik::path_de::from_file_with_path;
use json_dynamik::{Dynamik, DynPointer};

static CASE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.-]+\.json$").expect("case file pattern"));

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Case {
    name: String,
    #[serde(default = "permissive")]
    schema: Value,
    data: Value,
    #[serde(default)]
    context: Value,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
enum Step {
    /// Write `value` at `pointer`; `applied` is what the write must report.
    Set {
        pointer: String,
        value: Value,
        #[serde(default = "yes")]
        applied: bool,
    },
    Delete {
        pointer: String,
        #[serde(default = "yes")]
        applied: bool,
    },
    Push {
        pointer: String,
        value: Value,
    },
    Pop {
        pointer: String,
        expect: Option<Value>,
    },
    /// Compare the stored value, or with `absent: true` require that
    /// nothing is stored.
    Expect {
        pointer: String,
        #[serde(default)]
        expect: Value,
        #[serde(default)]
        absent: bool,
    },
    Abstract {
        pointer: String,
        expect: String,
    },
    Flags {
        pointer: String,
        hidden: Option<bool>,
        readonly: Option<bool>,
        mandatory: Option<bool>,
        minimized: Option<bool>,
        valid: Option<bool>,
    },
}

fn permissive() -> Value {
    Value::Bool(true)
}

fn yes() -> bool {
    true
}

// ————————————————————————————————————————————————————————————————————————————
// RUNNER
// ————————————————————————————————————————————————————————————————————————————

fn main() -> anyhow::Result<()> {
    let filter = std::env::args().nth(1).map(|raw| Regex::new(&raw)).transpose().context("invalid filter")?;
    let cases_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("cases");

    let mut failures = 0usize;
    let mut total = 0usize;
    for path in case_files(&cases_dir)? {
        let case: Case = from_file_with_path(&path).map_err(|error| anyhow::anyhow!(error))?;
        if filter.as_ref().is_some_and(|re| !re.is_match(&case.name)) {
            continue;
        }
        total += 1;
        match run_case(&case) {
            Ok(()) => eprintln!("✅ {}", case.name),
            Err(error) => {
                failures += 1;
                eprintln!("❌ {} ({}): {error:#}", case.name, path.display());
            }
        }
    }

    eprintln!("—— {} passed, {failures} failed ——", total - failures);
    if failures > 0 {
        bail!("{failures} scenario(s) failed");
    }
    Ok(())
}

fn case_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        let matches = path.file_name().and_then(|n| n.to_str()).is_some_and(|n| CASE_FILE.is_match(n));
        if matches {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn run_case(case: &Case) -> anyhow::Result<()> {
    let dynamik = Dynamik::builder()
        .schema(case.schema.clone())
        .context(case.context.clone())
        .build(case.data.clone())?;

    for (index, step) in case.steps.iter().enumerate() {
        run_step(&dynamik, step).with_context(|| format!("step {index} {step:?}"))?;
    }
    Ok(())
}

fn run_step(dynamik: &Dynamik, step: &Step) -> anyhow::Result<()> {
    match step {
        Step::Set { pointer, value, applied } => {
            let written = dynamik.at(pointer)?.set_value(value.clone());
            check("applied", &written, applied)
        }
        Step::Delete { pointer, applied } => {
            let deleted = dynamik.at(pointer)?.delete();
            check("applied", &deleted, applied)
        }
        Step::Push { pointer, value } => {
            let proxy = proxy_at(&dynamik.at(pointer)?)?;
            if !proxy.push(value.clone()) {
                bail!("push refused");
            }
            Ok(())
        }
        Step::Pop { pointer, expect } => {
            let proxy = proxy_at(&dynamik.at(pointer)?)?;
            check("popped", &proxy.pop(), expect)
        }
        Step::Expect { pointer, expect, absent } => {
            let actual = dynamik.at(pointer)?.value();
            let expected = if *absent { None } else { Some(expect.clone()) };
            check("value", &actual, &expected)
        }
        Step::Abstract { pointer, expect } => check("abstract", &dynamik.at(pointer)?.abstract_text(), expect),
        Step::Flags { pointer, hidden, readonly, mandatory, minimized, valid } => {
            let at = dynamik.at(pointer)?;
            let flags = [
                ("hidden", hidden, at.hidden()),
                ("readonly", readonly, at.readonly()),
                ("mandatory", mandatory, at.mandatory()),
                ("minimized", minimized, at.minimized()),
                ("valid", valid, at.validate()),
            ];
            for (name, expected, actual) in flags {
                if let Some(expected) = expected {
                    check(name, &actual, expected)?;
                }
            }
            Ok(())
        }
    }
}

fn proxy_at(pointer: &DynPointer) -> anyhow::Result<json_dynamik::DynProxy> {
    match pointer.live() {
        Some(json_dynamik::LiveValue::Proxy(proxy)) => Ok(proxy),
        _ => bail!("no container at {pointer}"),
    }
}

fn check<T: PartialEq + std::fmt::Debug>(what: &str, actual: &T, expected: &T) -> anyhow::Result<()> {
    if actual != expected {
        bail!("{what}: expected {expected:?}, got {actual:?}");
    }
    Ok(())
}
