use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::ClientZone;
use crate::engine::CreateFailurePolicy;
use crate::remote::RemoteConfig;

const RC_ENV_VAR: &str = "HABITRC";
const RC_FILE_NAME: &str = ".habitualrc";

const DEFAULTS: [(&str, &str); 5] = [
  ("api.url", "http://localhost:3000"),
  ("api.timeout", "10"),
  ("data.location", "~/.habitual"),
  ("sync.create_failure", "retain"),
  ("color", "on")
];

/// Flat `key = value` settings from the
/// rc file and command-line overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// Typed view over [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
  pub remote:         RemoteConfig,
  pub zone:           ClientZone,
  pub create_failure: CreateFailurePolicy,
  pub color:          bool
}

impl Config {
  pub fn defaults() -> Self {
    Config {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn settings(
    &self
  ) -> anyhow::Result<Settings> {
    let base_url = self
      .get("api.url")
      .filter(|url| !url.trim().is_empty())
      .ok_or_else(|| {
        anyhow!("api.url must be set")
      })?;

    let timeout_raw = self
      .get("api.timeout")
      .unwrap_or_else(|| {
        "10".to_string()
      });
    let timeout_secs = timeout_raw
      .trim()
      .parse::<u64>()
      .with_context(|| {
        format!(
          "invalid api.timeout: \
           {timeout_raw}"
        )
      })?;
    if timeout_secs == 0 {
      return Err(anyhow!(
        "api.timeout must be at least \
         one second"
      ));
    }

    let create_failure = match self
      .get("sync.create_failure")
    {
      | Some(raw) => raw.parse()?,
      | None => {
        CreateFailurePolicy::default()
      }
    };

    let zone = ClientZone::resolve(
      self.get("timezone").as_deref()
    );

    Ok(Settings {
      remote: RemoteConfig {
        base_url,
        timeout: Duration::from_secs(
          timeout_secs
        )
      },
      zone,
      create_failure,
      color: self
        .get_bool("color")
        .unwrap_or(true)
    })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle; skipping");
          continue;
        }
        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    dirs::home_dir()
      .ok_or_else(|| {
        anyhow!(
          "cannot determine home \
           directory"
        )
      })?
      .join(".habitual")
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::time::Duration;

  use tempfile::tempdir;

  use super::Config;
  use crate::engine::CreateFailurePolicy;

  #[test]
  fn reads_rc_file_with_includes_and_comments()
   {
    let temp =
      tempdir().expect("tempdir");
    let main = temp.path().join("rc");
    let extra =
      temp.path().join("extra.rc");
    fs::write(
      &main,
      "# service\napi.url = https://habits.example.com # prod\ninclude extra.rc\n\n"
    )
    .expect("write rc");
    fs::write(
      &extra,
      "api.timeout=3\nsync.create_failure = rollback\n"
    )
    .expect("write include");

    let cfg = Config::load(Some(main.as_path()))
      .expect("load config");
    let settings = cfg
      .settings()
      .expect("typed settings");

    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      settings.remote.base_url,
      "https://habits.example.com"
    );
    assert_eq!(
      settings.remote.timeout,
      Duration::from_secs(3)
    );
    assert_eq!(
      settings.create_failure,
      CreateFailurePolicy::Rollback
    );
    assert!(settings.color);
  }

  #[test]
  fn overrides_win_over_file_values() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![
      (
        "rc.color".to_string(),
        "off".to_string()
      ),
      (
        "api.url".to_string(),
        "http://10.0.0.2:8080".to_string()
      ),
    ]);

    let settings = cfg
      .settings()
      .expect("typed settings");
    assert!(!settings.color);
    assert_eq!(
      settings.remote.base_url,
      "http://10.0.0.2:8080"
    );
    assert_eq!(
      settings.create_failure,
      CreateFailurePolicy::Retain
    );
  }

  #[test]
  fn rejects_malformed_lines_and_values() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("rc");
    fs::write(&rc, "api.url\n")
      .expect("write rc");
    assert!(
      Config::load(Some(rc.as_path())).is_err()
    );

    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![(
      "api.timeout".to_string(),
      "soon".to_string()
    )]);
    assert!(cfg.settings().is_err());

    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![(
      "sync.create_failure".to_string(),
      "retry".to_string()
    )]);
    assert!(cfg.settings().is_err());
  }
}
