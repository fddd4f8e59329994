use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration, merged Default -> YAML -> CLI.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>, // e.g., "info" | "debug"
    pub data_dir: Option<PathBuf>, // key-value store location
    pub display: Option<DisplaySection>,
    pub wifi: Option<WifiSection>,
    pub ota: Option<OtaSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisplaySection {
    /// Partial refreshes before the next one upgrades to full
    pub max_partial_refresh: Option<u8>,
    /// Seconds without a full refresh before the next one upgrades
    pub full_refresh_interval_s: Option<u64>,
    /// Seconds of inactivity before deep sleep is suggested
    pub sleep_after_inactive_s: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WifiSection {
    /// Seconds the provisioning portal waits for credentials
    pub config_timeout_s: Option<u64>,
    /// Seconds one connect attempt may take
    pub connect_timeout_s: Option<u64>,
    pub max_retry: Option<u8>,
    /// Skip saved credentials and open the portal straight away
    pub force_ap_mode: Option<bool>,
    /// Captive-portal DNS port (53 needs privileges on hosts)
    pub dns_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OtaSection {
    /// Release manifest URL (GitHub-release compatible)
    pub manifest_url: Option<String>,
    /// Hours between automatic update checks; 0 disables
    pub auto_check_hours: Option<u32>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "pinframe", about = "PinFrame e-paper display firmware", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,
    /// Ignore saved credentials and open the provisioning portal
    #[arg(long, action = ArgAction::SetTrue)]
    pub force_ap: bool,
    #[arg(long)]
    pub manifest_url: Option<String>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    load_with_cli(cli)
}

pub fn load_with_cli(cli: Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, &cli);

    // 4) Validate
    validate(&cfg)?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/pinframe/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/pinframe/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/pinframe.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["pinframe.yaml", "config.yaml", "config/pinframe.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some() { dst.log_level = src.log_level; }
    if src.data_dir.is_some()  { dst.data_dir = src.data_dir; }
    match (&mut dst.display, src.display) {
        (None, Some(s)) => dst.display = Some(s),
        (Some(d), Some(s)) => merge_display(d, s),
        _ => {}
    }
    match (&mut dst.wifi, src.wifi) {
        (None, Some(s)) => dst.wifi = Some(s),
        (Some(d), Some(s)) => merge_wifi(d, s),
        _ => {}
    }
    match (&mut dst.ota, src.ota) {
        (None, Some(s)) => dst.ota = Some(s),
        (Some(d), Some(s)) => merge_ota(d, s),
        _ => {}
    }
}

fn merge_display(dst: &mut DisplaySection, src: DisplaySection) {
    if src.max_partial_refresh.is_some()     { dst.max_partial_refresh = src.max_partial_refresh; }
    if src.full_refresh_interval_s.is_some() { dst.full_refresh_interval_s = src.full_refresh_interval_s; }
    if src.sleep_after_inactive_s.is_some()  { dst.sleep_after_inactive_s = src.sleep_after_inactive_s; }
}

fn merge_wifi(dst: &mut WifiSection, src: WifiSection) {
    if src.config_timeout_s.is_some()  { dst.config_timeout_s = src.config_timeout_s; }
    if src.connect_timeout_s.is_some() { dst.connect_timeout_s = src.connect_timeout_s; }
    if src.max_retry.is_some()         { dst.max_retry = src.max_retry; }
    if src.force_ap_mode.is_some()     { dst.force_ap_mode = src.force_ap_mode; }
    if src.dns_port.is_some()          { dst.dns_port = src.dns_port; }
}

fn merge_ota(dst: &mut OtaSection, src: OtaSection) {
    if src.manifest_url.is_some()     { dst.manifest_url = src.manifest_url; }
    if src.auto_check_hours.is_some() { dst.auto_check_hours = src.auto_check_hours; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some() { cfg.log_level = cli.log_level.clone(); }
    if cli.data_dir.is_some()  { cfg.data_dir = cli.data_dir.clone(); }

    if cli.force_ap {
        cfg.wifi.get_or_insert_with(WifiSection::default).force_ap_mode = Some(true);
    }
    if let Some(url) = &cli.manifest_url {
        cfg.ota.get_or_insert_with(OtaSection::default).manifest_url = Some(url.clone());
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(wifi) = cfg.wifi.as_ref() {
        if wifi.config_timeout_s == Some(0) {
            return Err(ConfigError::Validation("wifi config_timeout_s must be > 0".into()));
        }
        if wifi.connect_timeout_s == Some(0) {
            return Err(ConfigError::Validation("wifi connect_timeout_s must be > 0".into()));
        }
    }
    if let Some(ota) = cfg.ota.as_ref() {
        if let Some(url) = &ota.manifest_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation("ota manifest_url must be http(s)".into()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> Cli {
        Cli {
            config: None,
            log_level: None,
            data_dir: None,
            force_ap: false,
            manifest_url: None,
            dump_config: false,
        }
    }

    #[test]
    fn test_cli_overrides() {
        let mut c = cli();
        c.force_ap = true;
        c.manifest_url = Some("https://example.com/releases/latest".to_string());
        c.log_level = Some("debug".to_string());
        let mut cfg = Config::default();
        apply_cli_overrides(&mut cfg, &c);
        assert_eq!(cfg.wifi.unwrap().force_ap_mode, Some(true));
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(
            cfg.ota.unwrap().manifest_url.unwrap(),
            "https://example.com/releases/latest"
        );
    }

    #[test]
    fn test_invalid_manifest_url_rejected() {
        let cfg = Config {
            ota: Some(OtaSection {
                manifest_url: Some("ftp://example.com/fw".to_string()),
                auto_check_hours: None,
            }),
            ..Config::default()
        };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let cfg = Config {
            wifi: Some(WifiSection {
                config_timeout_s: Some(0),
                ..WifiSection::default()
            }),
            ..Config::default()
        };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_yaml_merge() {
        let yaml = r#"
log_level: debug
wifi:
  max_retry: 5
ota:
  auto_check_hours: 12
"#;
        let parsed: Config = serde_yaml::from_str(yaml).unwrap();
        let mut cfg = Config::default();
        merge(&mut cfg, parsed);
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.wifi.unwrap().max_retry, Some(5));
        assert_eq!(cfg.ota.unwrap().auto_check_hours, Some(12));
    }
}
