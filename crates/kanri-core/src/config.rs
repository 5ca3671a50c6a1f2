use std::collections::{
  BTreeMap,
  HashSet
};
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::gateway::BackendKind;

const RC_ENV: &str = "KANRIRC";
const RC_NAME: &str = ".kanrirc";
const DEFAULT_SUGGESTIONS: usize = 8;

const DEFAULTS: &[(&str, &str)] = &[
  ("data.location", "~/.kanri"),
  ("backend", "native"),
  ("color", "on"),
  ("default.view", "today"),
  ("suggestions.limit", "8")
];

/// One meaningful line of a kanrirc.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RcLine {
  Setting {
    key:   String,
    value: String
  },
  Include(String)
}

/// Blank lines and comments yield `None`.
/// A `#` starts a comment anywhere.
fn parse_rc_line(
  raw: &str
) -> Result<Option<RcLine>, &'static str> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(code, _)| code)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }
  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    if target.is_empty() {
      return Err("include needs a path");
    }
    return Ok(Some(RcLine::Include(
      target.to_string()
    )));
  }
  let Some((key, value)) =
    line.split_once('=')
  else {
    return Err("expected key = value");
  };
  let key = key.trim();
  if key.is_empty() {
    return Err("setting has no key");
  }
  Ok(Some(RcLine::Setting {
    key:   key.to_string(),
    value: value.trim().to_string()
  }))
}

/// Settings layered as defaults, then the
/// kanrirc and its includes, then
/// command-line `rc.key=value` overrides.
#[derive(Debug, Clone)]
pub struct Config {
  settings:    BTreeMap<String, String>,
  pub sources: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      settings: DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      sources:  vec![]
    }
  }
}

impl Config {
  #[tracing::instrument]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();
    match rc_location(rc_override) {
      | Some(path) => {
        info!(kanrirc = %path.display(), "reading kanrirc");
        cfg.read_rc(
          &path,
          &mut HashSet::new()
        )?;
      }
      | None => {
        debug!("no kanrirc; defaults only");
      }
    }
    Ok(cfg)
  }

  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .map(str::to_string)
        .unwrap_or(key);
      debug!(%key, %value, "setting overridden");
      self.settings.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.settings.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    let raw = self.settings.get(key)?;
    match raw.to_ascii_lowercase().as_str()
    {
      | "on" | "yes" | "true" | "1" => {
        Some(true)
      }
      | "off" | "no" | "false" | "0" => {
        Some(false)
      }
      | _ => {
        warn!(key, value = %raw, "not a boolean setting");
        None
      }
    }
  }

  pub fn get_usize(
    &self,
    key: &str
  ) -> Option<usize> {
    let raw = self.settings.get(key)?;
    raw
      .parse()
      .inspect_err(|_| {
        warn!(key, value = %raw, "not a number setting");
      })
      .ok()
  }

  pub fn backend_kind(
    &self
  ) -> anyhow::Result<BackendKind> {
    self
      .settings
      .get("backend")
      .map_or("native", String::as_str)
      .parse()
  }

  pub fn suggestion_limit(&self) -> usize {
    self
      .get_usize("suggestions.limit")
      .unwrap_or(DEFAULT_SUGGESTIONS)
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.settings.iter()
  }

  fn read_rc(
    &mut self,
    path: &Path,
    seen: &mut HashSet<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_home(path);
    let key = fs::canonicalize(&path)
      .unwrap_or_else(|_| path.clone());
    if !seen.insert(key) {
      bail!(
        "include cycle through {}",
        path.display()
      );
    }
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!("failed to read {}", path.display())
      })?;
    self.sources.push(path.clone());
    let dir = path
      .parent()
      .map_or_else(
        || PathBuf::from("."),
        Path::to_path_buf
      );

    for (n, raw) in text.lines().enumerate() {
      let line = parse_rc_line(raw)
        .map_err(|why| {
          anyhow::anyhow!(
            "{}:{}: {why}: {}",
            path.display(),
            n + 1,
            raw.trim()
          )
        })?;
      match line {
        | None => {}
        | Some(RcLine::Setting {
          key,
          value
        }) => {
          trace!(%key, %value, "rc setting");
          self.settings.insert(key, value);
        }
        | Some(RcLine::Include(target)) => {
          let target =
            dir.join(expand_home(Path::new(&target)));
          if target.exists() {
            self.read_rc(&target, seen)?;
          } else {
            warn!(include = %target.display(), "missing include skipped");
          }
        }
      }
    }
    Ok(())
  }
}

/// An explicit path wins, then
/// `$KANRIRC` (`/dev/null` disables the rc
/// file), then `~/.kanrirc` if present.
fn rc_location(
  rc_override: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = rc_override {
    return Some(path.to_path_buf());
  }
  match std::env::var(RC_ENV) {
    | Ok(value) if value == "/dev/null" => {
      None
    }
    | Ok(value) => Some(PathBuf::from(value)),
    | Err(_) => dirs::home_dir()
      .map(|home| home.join(RC_NAME))
      .filter(|path| path.exists())
  }
}

/// `--data`, else `data.location`. The
/// directory is created when missing.
#[tracing::instrument(skip(cfg))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(dir) => dir.to_path_buf(),
    | None => {
      let Some(location) =
        cfg.get("data.location")
      else {
        bail!("data.location is not set");
      };
      expand_home(Path::new(&location))
    }
  };
  if !dir.is_dir() {
    info!(dir = %dir.display(), "creating data directory");
  }
  fs::create_dir_all(&dir).with_context(
    || format!("failed to create {}", dir.display())
  )?;
  Ok(dir)
}

fn expand_home(path: &Path) -> PathBuf {
  match (
    path.strip_prefix("~"),
    dirs::home_dir()
  ) {
    | (Ok(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => path.to_path_buf()
  }
}
