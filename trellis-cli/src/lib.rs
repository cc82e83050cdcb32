use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};
use trellis_core::{State, Value};
use trellis_runtime::{EngineConfig, Runtime};

/// Bindings a template maps to, grouped by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub bindings: BTreeMap<&'static str, usize>,
}

impl CheckReport {
    pub fn total(&self) -> usize {
        self.bindings.values().sum()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (kind, count) in &self.bindings {
            writeln!(f, "{kind:<10} {count}")?;
        }
        write!(f, "{:<10} {}", "total", self.total())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// JSON object whose entries seed the component state.
    pub state: Option<PathBuf>,
    pub eager: bool,
    pub rows_per_turn: Option<usize>,
    /// Tags allowed to carry `data-state:*`, each with an empty state.
    pub components: Vec<String>,
}

impl RenderOptions {
    fn config(&self) -> EngineConfig {
        if self.eager {
            EngineConfig::eager()
        } else if let Some(n) = self.rows_per_turn {
            EngineConfig::deferred(n)
        } else {
            EngineConfig::default()
        }
    }
}

fn read_template(input: &Path) -> Result<String> {
    fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))
}

fn register_components(runtime: &Runtime, tags: &[String]) {
    for tag in tags {
        runtime.register_component(tag, State::new);
    }
}

/// Parse and map `input` against an empty component.
pub fn check(input: &Path, components: &[String]) -> Result<CheckReport> {
    let src = read_template(input)?;
    let runtime = Runtime::new(EngineConfig::eager());
    register_components(&runtime, components);
    runtime
        .compile(&src)
        .with_context(|| format!("{} is not a valid template", input.display()))?;
    let report = CheckReport {
        bindings: runtime.bindings_by_kind(),
    };
    info!(file = %input.display(), bindings = report.total(), "template checked");
    Ok(report)
}

/// Top-level entries of a JSON object file.
pub fn read_state(path: &Path) -> Result<BTreeMap<String, Value>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let serde_json::Value::Object(entries) = json else {
        bail!("{} must contain a JSON object", path.display());
    };
    Ok(entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
}

/// Compile `input`, seed its state, mount it and return the settled HTML.
pub fn render(input: &Path, options: &RenderOptions) -> Result<String> {
    let src = read_template(input)?;
    let seed = match &options.state {
        Some(path) => read_state(path)?,
        None => BTreeMap::new(),
    };
    let runtime = Runtime::new(options.config());
    register_components(&runtime, &options.components);
    runtime.state().batch_silent(|state| {
        for (key, value) in seed {
            state.set(key, value);
        }
    });

    let fragment = runtime
        .compile(&src)
        .with_context(|| format!("{} is not a valid template", input.display()))?;
    let tree = runtime.mount(fragment).context("mount failed")?;
    let turns = runtime.settle().context("update failed")?;
    debug!(
        backend = runtime.backend_name(),
        nodes = tree.node_count,
        turns,
        passes = runtime.passes(),
        "rendered"
    );
    Ok(runtime.html())
}
