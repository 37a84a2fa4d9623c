//! Ambient configuration surface (spec.md §6, "Configuration surface
//! (recognized keys)"), loaded and overlaid the way `drmemd::config`
//! does: a `serde`/`toml` struct with a `clap` command-line overlay for
//! verbosity and an explicit config-file path, a small search path when
//! no path is given, and a `--print-config` dump.

use adapter_api::{Addressable, Error, Result};
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use tracing::Level;

fn def_host() -> String {
    String::from("0.0.0.0")
}

fn def_port() -> u16 {
    49999
}

fn def_timeout_ms() -> u64 {
    5000
}

fn def_connect_retries() -> u32 {
    3
}

fn def_check_interval_ms() -> u64 {
    10000
}

fn def_true() -> bool {
    true
}

fn def_profiles_dir() -> String {
    String::from("./res/profiles")
}

fn def_log_level() -> String {
    String::from("warn")
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceConfig {
    #[serde(default = "def_host")]
    pub host: String,
    #[serde(default = "def_port")]
    pub port: u16,
    #[serde(default = "def_timeout_ms")]
    pub timeout: u64,
    #[serde(default = "def_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "def_check_interval_ms")]
    pub check_interval: u64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub startup_msg: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            host: def_host(),
            port: def_port(),
            timeout: def_timeout_ms(),
            connect_retries: def_connect_retries(),
            check_interval: def_check_interval_ms(),
            labels: Vec::new(),
            startup_msg: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientAddr {
    pub host: String,
    pub port: u16,
}

impl ClientAddr {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for ClientAddr {
    fn default() -> Self {
        ClientAddr {
            host: String::from("localhost"),
            port: 48080,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientsConfig {
    #[serde(default)]
    pub data: ClientAddr,
    #[serde(default)]
    pub metadata: ClientAddr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceConfig {
    #[serde(default = "def_profiles_dir")]
    pub profiles_dir: String,
    #[serde(default = "def_true")]
    pub data_transform: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            profiles_dir: def_profiles_dir(),
            data_transform: true,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggingConfig {
    pub file: Option<String>,
    pub remote_url: Option<String>,
}

/// Present only when a remote configuration registry is in play. Its
/// absence is meaningful: per spec.md §9 ("Config registry absent"),
/// the service then skips both remote-config resolution and
/// health-check registration, and reads configuration purely from the
/// local file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegistryConfig {
    pub host: String,
    pub port: u16,
}

impl RegistryConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScheduleEventConfig {
    pub schedule: String,
    pub path: String,
}

/// A `[Driver.Addressable]` table entry inside a `[[DeviceList]]`
/// section. Field-for-field the same shape as `adapter_api::
/// Addressable`, kept separate only so the config file's `PascalCase`
/// keys don't leak into the wire type shared with the metadata client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressableConfig {
    pub protocol: String,
    #[serde(default)]
    pub method: String,
    pub address: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub path: String,
}

impl AddressableConfig {
    pub fn into_addressable(self, name: &str) -> Addressable {
        Addressable {
            id: String::new(),
            name: name.to_owned(),
            origin_ms: 0,
            protocol: self.protocol,
            method: self.method,
            address: self.address,
            port: self.port,
            path: self.path,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceListEntry {
    pub name: String,
    pub profile: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub addressable: AddressableConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    #[serde(default = "def_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub clients: ClientsConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub registry: Option<RegistryConfig>,
    /// Opaque `[Driver]` table, handed verbatim to `Driver::init` --
    /// never interpreted here, same as `adapter_api::DriverConfig`.
    #[serde(default)]
    pub driver: toml::value::Table,
    #[serde(default)]
    pub schedules: HashMap<String, String>,
    #[serde(default)]
    pub schedule_events: HashMap<String, ScheduleEventConfig>,
    #[serde(default)]
    pub device_list: Vec<DeviceListEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: def_log_level(),
            service: ServiceConfig::default(),
            clients: ClientsConfig::default(),
            device: DeviceConfig::default(),
            logging: LoggingConfig::default(),
            registry: None,
            driver: toml::value::Table::new(),
            schedules: HashMap::new(),
            schedule_events: HashMap::new(),
            device_list: Vec::new(),
        }
    }
}

impl Config {
    pub fn get_log_level(&self) -> Level {
        match self.log_level.as_str() {
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::WARN,
        }
    }
}

fn parse_config(contents: &str) -> Result<Config> {
    toml::from_str(contents).map_err(|e| Error::BadConfig(format!("{}", e)))
}

async fn from_file(path: &str) -> Option<Result<Config>> {
    use tokio::fs;

    if let Ok(contents) = fs::read(path).await {
        let contents = String::from_utf8_lossy(&contents);
        Some(parse_config(&contents))
    } else {
        None
    }
}

/// Searches a small list of candidate directories for `adapter.toml`,
/// the same shape as `drmemd::config::find_cfg`'s search path. Returns
/// `Config::default()` if nothing is found, so an adapter can still
/// start against an all-default configuration.
async fn find_cfg(explicit: Option<&str>) -> Result<Config> {
    const CFG_FILE: &str = "adapter.toml";

    if let Some(path) = explicit {
        return from_file(path)
            .await
            .unwrap_or_else(|| Err(Error::BadConfig(format!("no such file: {}", path))));
    }

    let mut dirs = vec![String::from("./")];

    if let Ok(home) = env::var("HOME") {
        dirs.push(format!("{}/.", home));
    }

    dirs.push(String::from("/usr/local/etc/"));
    dirs.push(String::from("/etc/"));

    for dir in dirs {
        let file = format!("{}{}", &dir, CFG_FILE);
        if let Some(cfg) = from_file(&file).await {
            return cfg;
        }
    }

    Ok(Config::default())
}

fn from_cmdline(mut cfg: Config) -> (bool, Option<String>, Config) {
    use clap::{crate_version, Arg, ArgAction, Command};

    let matches = Command::new("Device Adapter Service")
        .version(crate_version!())
        .about("Runs a device-adapter service on top of adapter-runtime")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .action(ArgAction::Set)
                .value_name("FILE")
                .help("Specifies the configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Sets verbosity of log; can be used more than once"),
        )
        .arg(
            Arg::new("print_cfg")
                .long("print-config")
                .action(ArgAction::SetTrue)
                .help("Displays the configuration and exits"),
        )
        .get_matches();

    match matches.get_count("verbose") {
        0 => (),
        1 => cfg.log_level = String::from("info"),
        2 => cfg.log_level = String::from("debug"),
        _ => cfg.log_level = String::from("trace"),
    }

    (
        matches.get_flag("print_cfg"),
        matches.get_one::<String>("config").cloned(),
        cfg,
    )
}

fn dump_config(cfg: &Config) {
    println!("Configuration:");
    println!("    log level: {}", cfg.get_log_level());
    println!("    service: {}:{}", cfg.service.host, cfg.service.port);
    println!("    data client: {}", cfg.clients.data.base_url());
    println!("    metadata client: {}", cfg.clients.metadata.base_url());
    println!("    profiles dir: {}", cfg.device.profiles_dir);
    println!("    data transform: {}", cfg.device.data_transform);
    println!("    devices configured: {}", cfg.device_list.len());
    println!(
        "    registry: {}",
        cfg.registry
            .as_ref()
            .map(|r| r.base_url())
            .unwrap_or_else(|| String::from("(none)"))
    );
}

/// Resolves the configuration and reports whether the process should
/// continue running. `None` means a command-line flag (`--print-config`)
/// asked for an early, successful exit.
///
/// The command line is read once to pull out `-c/--config` (which file
/// to load) and `-v`/`--print-config`; the `-v` verbosity count is then
/// re-applied on top of the loaded file so it always wins over whatever
/// `log_level` the file itself sets.
#[tracing::instrument(name = "loading config")]
pub async fn get() -> Option<Config> {
    let (print_cfg, explicit_path, verbosity_cfg) = from_cmdline(Config::default());

    match find_cfg(explicit_path.as_deref()).await {
        Ok(mut cfg) => {
            if verbosity_cfg.log_level != def_log_level() {
                cfg.log_level = verbosity_cfg.log_level;
            }

            if print_cfg {
                dump_config(&cfg);
                None
            } else {
                Some(cfg)
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_document() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.get_log_level(), Level::WARN);
        assert_eq!(cfg.service.port, 49999);
        assert!(cfg.device.data_transform);
        assert!(cfg.registry.is_none());
    }

    #[test]
    fn device_list_parses_addressable() {
        let cfg: Config = toml::from_str(
            r#"
[[DeviceList]]
Name = "therm1"
Profile = "thermostat"

[DeviceList.Addressable]
Protocol = "test"
Address = "localhost"
Port = 9999
"#,
        )
        .unwrap();

        assert_eq!(cfg.device_list.len(), 1);
        assert_eq!(cfg.device_list[0].name, "therm1");
        assert_eq!(cfg.device_list[0].addressable.address, "localhost");
        assert_eq!(cfg.device_list[0].addressable.port, 9999);
    }

    #[test]
    fn schedules_and_schedule_events_parse() {
        let cfg: Config = toml::from_str(
            r#"
[Schedules]
every2s = "PT2S"

[ScheduleEvents.pump-flow]
Schedule = "every2s"
Path = "/api/v1/device/name/pump/flow"
"#,
        )
        .unwrap();

        assert_eq!(cfg.schedules.get("every2s").unwrap(), "PT2S");
        assert_eq!(cfg.schedule_events["pump-flow"].path, "/api/v1/device/name/pump/flow");
    }

    #[test]
    fn registry_absent_by_default() {
        let cfg: Config = toml::from_str(
            r#"
[Service]
Host = "127.0.0.1"
"#,
        )
        .unwrap();
        assert!(cfg.registry.is_none());
        assert_eq!(cfg.service.host, "127.0.0.1");
    }
}
