use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories_next::ProjectDirs;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use tracing::debug;

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "scanshade";
const APPLICATION: &str = "scanshade";
const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_PROGRAM: &str = "example";
pub const FALLBACK_PROGRAM_ROOT: &str = "/usr/local/share/scanshade/shaders";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub programs: ProgramSettings,
    pub display: DisplaySettings,
    pub input: InputSettings,
    pub host_signal: HostSignalSettings,
    pub runtime: RuntimeSettings,
    pub gpu: GpuSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgramSettings {
    pub search_roots: Vec<PathBuf>,
    pub default: String,
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            search_roots: vec![
                PathBuf::from("."),
                PathBuf::from("shaders"),
                PathBuf::from(FALLBACK_PROGRAM_ROOT),
            ],
            default: DEFAULT_PROGRAM.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub card: PathBuf,
    #[serde(deserialize_with = "deserialize_mode_opt")]
    pub mode: Option<DisplayMode>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            card: PathBuf::from("/dev/dri/card0"),
            mode: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let (width, height) = normalized
            .split_once('x')
            .ok_or_else(|| format!("display mode '{raw}' must look like WIDTHxHEIGHT"))?;
        let width: u32 = width
            .trim()
            .parse()
            .map_err(|_| format!("display mode '{raw}' has an invalid width"))?;
        let height: u32 = height
            .trim()
            .parse()
            .map_err(|_| format!("display mode '{raw}' has an invalid height"))?;
        if width == 0 || height == 0 {
            return Err(format!("display mode '{raw}' must have non-zero sides"));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    pub device: Option<PathBuf>,
    pub name_hints: Vec<String>,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            device: None,
            name_hints: vec!["keyboard".to_string(), "input".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostSignalSettings {
    pub ports_dir: PathBuf,
    pub device_dir: PathBuf,
    pub port_name: String,
    pub command: String,
}

impl Default for HostSignalSettings {
    fn default() -> Self {
        Self {
            ports_dir: PathBuf::from("/sys/class/virtio-ports"),
            device_dir: PathBuf::from("/dev"),
            port_name: "org.qemu.display".to_string(),
            command: "FULLSCREEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    #[serde(deserialize_with = "deserialize_duration")]
    pub retry_backoff: Duration,
    /// Frames between throughput reports.
    pub stats_interval: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            retry_backoff: default_retry_backoff(),
            stats_interval: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerPreference {
    #[default]
    High,
    Low,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct GpuSettings {
    pub power: PowerPreference,
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(1)
}

fn deserialize_mode_opt<'de, D>(deserializer: D) -> Result<Option<DisplayMode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(de::Error::custom),
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || v.is_infinite() {
                return Err(E::custom("duration must be a finite non-negative number"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: Settings = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads `explicit` when given. Otherwise reads the per-user config file if
    /// one exists, falling back to built-in defaults. Returns the file that
    /// was used, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            let settings = Self::from_file(path)?;
            return Ok((settings, Some(path.to_path_buf())));
        }

        match default_config_path() {
            Some(path) if path.is_file() => {
                let settings = Self::from_file(&path)?;
                Ok((settings, Some(path)))
            }
            other => {
                if let Some(path) = other {
                    debug!(path = %path.display(), "no user configuration; using defaults");
                }
                Ok((Self::default(), None))
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.programs.search_roots.is_empty() {
            return Err(ConfigError::Invalid(
                "programs.search_roots must list at least one directory".into(),
            ));
        }

        if self.programs.default.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "programs.default may not be empty".into(),
            ));
        }

        if self.runtime.stats_interval == 0 {
            return Err(ConfigError::Invalid(
                "runtime.stats_interval must be greater than zero".into(),
            ));
        }

        if self.input.name_hints.iter().any(|hint| hint.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "input.name_hints may not contain empty entries".into(),
            ));
        }

        if self.host_signal.port_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "host_signal.port_name may not be empty".into(),
            ));
        }

        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[programs]
search_roots = ["/srv/effects", "shaders"]
default = "plasma"

[display]
card = "/dev/dri/card1"
mode = "1280x720"

[input]
device = "/dev/input/event4"

[host_signal]
command = "WINDOWED"

[runtime]
retry_backoff = "250ms"
stats_interval = 120

[gpu]
power = "low"
"#;

    #[test]
    fn parses_sample_settings() {
        let settings = Settings::from_toml_str(SAMPLE).expect("parse settings");
        assert_eq!(
            settings.programs.search_roots,
            vec![PathBuf::from("/srv/effects"), PathBuf::from("shaders")]
        );
        assert_eq!(settings.programs.default, "plasma");
        assert_eq!(settings.display.card, PathBuf::from("/dev/dri/card1"));
        assert_eq!(
            settings.display.mode,
            Some(DisplayMode {
                width: 1280,
                height: 720
            })
        );
        assert_eq!(
            settings.input.device.as_deref(),
            Some(Path::new("/dev/input/event4"))
        );
        assert_eq!(settings.input.name_hints, vec!["keyboard", "input"]);
        assert_eq!(settings.host_signal.command, "WINDOWED");
        assert_eq!(settings.host_signal.port_name, "org.qemu.display");
        assert_eq!(settings.runtime.retry_backoff, Duration::from_millis(250));
        assert_eq!(settings.runtime.stats_interval, 120);
        assert_eq!(settings.gpu.power, PowerPreference::Low);
    }

    #[test]
    fn empty_document_yields_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.programs.default, DEFAULT_PROGRAM);
        assert_eq!(
            settings.programs.search_roots.last(),
            Some(&PathBuf::from(FALLBACK_PROGRAM_ROOT))
        );
        assert_eq!(settings.display.card, PathBuf::from("/dev/dri/card0"));
        assert!(settings.display.mode.is_none());
        assert_eq!(settings.runtime.retry_backoff, Duration::from_secs(1));
        assert_eq!(settings.runtime.stats_interval, 60);
        assert_eq!(settings.gpu.power, PowerPreference::High);
    }

    #[test]
    fn accepts_bare_seconds_for_durations() {
        let settings = Settings::from_toml_str("[runtime]\nretry_backoff = 3\n").unwrap();
        assert_eq!(settings.runtime.retry_backoff, Duration::from_secs(3));
        let settings = Settings::from_toml_str("[runtime]\nretry_backoff = 0.5\n").unwrap();
        assert_eq!(settings.runtime.retry_backoff, Duration::from_millis(500));
    }

    #[test]
    fn rejects_zero_stats_interval() {
        let err = Settings::from_toml_str("[runtime]\nstats_interval = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_search_roots() {
        let err = Settings::from_toml_str("[programs]\nsearch_roots = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_modes() {
        for mode in ["1920", "0x1080", "widex720", "1920x"] {
            let doc = format!("[display]\nmode = \"{mode}\"\n");
            let err = Settings::from_toml_str(&doc).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "mode {mode}");
        }
    }

    #[test]
    fn parses_modes_case_insensitively() {
        let mode: DisplayMode = " 800X600 ".parse().unwrap();
        assert_eq!(mode.to_string(), "800x600");
    }

    #[test]
    fn loads_an_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[programs]\ndefault = \"tunnel\"").unwrap();

        let (settings, source) = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.programs.default, "tunnel");
        assert_eq!(source.as_deref(), Some(file.path()));
    }

    #[test]
    fn reports_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
