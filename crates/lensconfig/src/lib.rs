//! TOML configuration for the lens distortion preview.
//!
//! ```toml
//! [distortion]
//! k1 = 0.25
//! k2 = 0.05
//!
//! [surface]
//! red_bits = 8
//! green_bits = 8
//! blue_bits = 8
//! alpha_bits = 0
//! min_api = "3.0"
//! size = "1280x720"
//! acquire_timeout = "5s"
//!
//! [render]
//! max_fps = 90
//!
//! [shader]
//! fragment = "shaders/lens.frag"
//! ```
//!
//! Every key is optional. Relative shader paths are resolved against the
//! directory of the file passed to [`LensConfig::load`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use lensbridge::{ApiVersion, ConfigAttributes, ParameterPair, ShaderStage, DEFAULT_K1, DEFAULT_K2};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Bit depths above this are not offered by any surface format.
pub const MAX_CHANNEL_BITS: u8 = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LensConfig {
    #[serde(default)]
    pub distortion: Distortion,
    #[serde(default)]
    pub surface: Surface,
    #[serde(default)]
    pub render: Render,
    #[serde(default)]
    pub shader: ShaderPaths,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Distortion {
    #[serde(default = "default_k1", serialize_with = "serialize_coefficient")]
    pub k1: f32,
    #[serde(default = "default_k2", serialize_with = "serialize_coefficient")]
    pub k2: f32,
}

impl Default for Distortion {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            k2: DEFAULT_K2,
        }
    }
}

impl Distortion {
    pub fn pair(&self) -> ParameterPair {
        ParameterPair::new(self.k1, self.k2)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Surface {
    #[serde(default = "default_color_bits")]
    pub red_bits: u8,
    #[serde(default = "default_color_bits")]
    pub green_bits: u8,
    #[serde(default = "default_color_bits")]
    pub blue_bits: u8,
    #[serde(default)]
    pub alpha_bits: u8,
    #[serde(
        default,
        deserialize_with = "deserialize_api",
        serialize_with = "serialize_display"
    )]
    pub min_api: ApiVersion,
    #[serde(
        default,
        deserialize_with = "deserialize_size",
        serialize_with = "serialize_display"
    )]
    pub size: SurfaceSize,
    #[serde(
        default = "default_acquire_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub acquire_timeout: Duration,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            red_bits: default_color_bits(),
            green_bits: default_color_bits(),
            blue_bits: default_color_bits(),
            alpha_bits: 0,
            min_api: ApiVersion::default(),
            size: SurfaceSize::default(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}

impl Surface {
    /// Attribute set handed to config negotiation. Always window-capable.
    pub fn attributes(&self) -> ConfigAttributes {
        ConfigAttributes {
            red_bits: self.red_bits,
            green_bits: self.green_bits,
            blue_bits: self.blue_bits,
            alpha_bits: self.alpha_bits,
            window_surface: true,
            min_api: self.min_api,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Render {
    /// Frame cap; 0 renders as fast as the surface allows.
    #[serde(default = "default_max_fps")]
    pub max_fps: u32,
}

impl Default for Render {
    fn default() -> Self {
        Self {
            max_fps: default_max_fps(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ShaderPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<PathBuf>,
}

impl ShaderPaths {
    pub fn path(&self, stage: ShaderStage) -> Option<&Path> {
        match stage {
            ShaderStage::Vertex => self.vertex.as_deref(),
            ShaderStage::Fragment => self.fragment.as_deref(),
        }
    }

    /// Reads the override for `stage`, if one is configured.
    pub fn read(&self, stage: ShaderStage) -> Result<Option<String>, ConfigError> {
        let Some(path) = self.path(stage) else {
            return Ok(None);
        };
        fs::read_to_string(path)
            .map(Some)
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for path in [&mut self.vertex, &mut self.fragment].into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Surface size in physical pixels, written `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for SurfaceSize {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for SurfaceSize {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (w, h) = value
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("invalid size '{value}'; expected WIDTHxHEIGHT"))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid width in size '{value}'"))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid height in size '{value}'"))?;
        if width == 0 || height == 0 {
            return Err(format!("size '{value}' must be greater than zero"));
        }
        Ok(Self::new(width, height))
    }
}

fn default_k1() -> f32 {
    DEFAULT_K1
}

fn default_k2() -> f32 {
    DEFAULT_K2
}

fn default_color_bits() -> u8 {
    8
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_fps() -> u32 {
    90
}

fn deserialize_api<'de, D>(deserializer: D) -> Result<ApiVersion, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Num(f64),
    }

    let raw = match Helper::deserialize(deserializer)? {
        Helper::Str(raw) => raw,
        // `min_api = 3.1` reads naturally in TOML; `3` arrives as a float too.
        Helper::Num(value) => format!("{value}"),
    };
    raw.parse::<ApiVersion>().map_err(de::Error::custom)
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<SurfaceSize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<SurfaceSize>().map_err(de::Error::custom)
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
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&humantime::format_duration(*value))
}

// Widening f32 directly would print 0.05 as 0.05000000074505806.
fn serialize_coefficient<S>(value: &f32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let widened = value
        .to_string()
        .parse::<f64>()
        .unwrap_or(f64::from(*value));
    serializer.serialize_f64(widened)
}

impl LensConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: LensConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates `path`, anchoring relative shader paths at its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            config.shader.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn attributes(&self) -> ConfigAttributes {
        self.surface.attributes()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let Distortion { k1, k2 } = self.distortion;
        if !k1.is_finite() || !k2.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "distortion coefficients must be finite (k1 = {k1}, k2 = {k2})"
            )));
        }

        let surface = &self.surface;
        for (name, bits) in [
            ("red_bits", surface.red_bits),
            ("green_bits", surface.green_bits),
            ("blue_bits", surface.blue_bits),
            ("alpha_bits", surface.alpha_bits),
        ] {
            if bits > MAX_CHANNEL_BITS {
                return Err(ConfigError::Invalid(format!(
                    "surface.{name} must be <= {MAX_CHANNEL_BITS} (got {bits})"
                )));
            }
        }

        if surface.size.width == 0 || surface.size.height == 0 {
            return Err(ConfigError::Invalid(
                "surface.size must be greater than zero".into(),
            ));
        }

        if surface.min_api.major == 0 {
            return Err(ConfigError::Invalid(format!(
                "surface.min_api '{}' is not a renderable API version",
                surface.min_api
            )));
        }

        if surface.acquire_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "surface.acquire_timeout must be greater than zero".into(),
            ));
        }

        for (name, path) in [
            ("vertex", &self.shader.vertex),
            ("fragment", &self.shader.fragment),
        ] {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "shader.{name} may not be empty"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[distortion]
k1 = 0.4
k2 = -0.02

[surface]
red_bits = 10
green_bits = 10
blue_bits = 10
alpha_bits = 2
min_api = "3.1"
size = "1920x1080"
acquire_timeout = "750ms"

[render]
max_fps = 0

[shader]
fragment = "lens.frag"
"#;

    #[test]
    fn parses_sample_config() {
        let config = LensConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.distortion.pair(), ParameterPair::new(0.4, -0.02));
        assert_eq!(config.surface.size, SurfaceSize::new(1920, 1080));
        assert_eq!(config.surface.min_api, ApiVersion::new(3, 1));
        assert_eq!(config.surface.acquire_timeout, Duration::from_millis(750));
        assert_eq!(config.render.max_fps, 0);
        assert_eq!(config.shader.fragment.as_deref(), Some(Path::new("lens.frag")));
        assert!(config.shader.vertex.is_none());

        let attributes = config.attributes();
        assert_eq!(
            (attributes.red_bits, attributes.alpha_bits),
            (10, 2)
        );
        assert!(attributes.window_surface);
    }

    #[test]
    fn empty_input_yields_defaults() {
        let config = LensConfig::from_toml_str("").unwrap();
        assert_eq!(config, LensConfig::default());
        assert_eq!(config.distortion.pair(), ParameterPair::new(0.25, 0.05));
        assert_eq!(config.attributes(), ConfigAttributes::default());
        assert_eq!(config.render.max_fps, 90);
        assert_eq!(config.surface.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = LensConfig::from_toml_str("[surface]\nalpha_bits = 8\n").unwrap();
        assert_eq!(config.surface.alpha_bits, 8);
        assert_eq!(config.surface.red_bits, 8);
        assert_eq!(config.surface.size, SurfaceSize::default());
    }

    #[test]
    fn numeric_forms_are_accepted() {
        let config =
            LensConfig::from_toml_str("[surface]\nmin_api = 3.2\nacquire_timeout = 2\n").unwrap();
        assert_eq!(config.surface.min_api, ApiVersion::new(3, 2));
        assert_eq!(config.surface.acquire_timeout, Duration::from_secs(2));
    }

    #[test]
    fn rejects_non_finite_coefficients() {
        let err = LensConfig::from_toml_str("[distortion]\nk1 = nan\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
        let err = LensConfig::from_toml_str("[distortion]\nk2 = -inf\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn rejects_deep_channels() {
        let err = LensConfig::from_toml_str("[surface]\ngreen_bits = 32\n").unwrap_err();
        assert!(err.to_string().contains("green_bits"), "{err}");
    }

    #[test]
    fn rejects_malformed_values() {
        for input in [
            "[surface]\nsize = \"0x720\"\n",
            "[surface]\nsize = \"wide\"\n",
            "[surface]\nmin_api = \"three\"\n",
            "[surface]\nacquire_timeout = \"soon\"\n",
            "[render]\nmax_fps = -1\n",
        ] {
            let err = LensConfig::from_toml_str(input).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{input}: {err}");
        }

        let err = LensConfig::from_toml_str("[surface]\nmin_api = \"0.9\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = LensConfig::from_toml_str("[surface]\nacquire_timeout = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rendered_config_parses_back() {
        let config = LensConfig::from_toml_str(SAMPLE).unwrap();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("k2 = -0.02"), "{rendered}");
        assert!(rendered.contains("size = \"1920x1080\""), "{rendered}");
        assert!(rendered.contains("acquire_timeout = \"750ms\""), "{rendered}");
        assert_eq!(LensConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn defaults_render_without_shader_paths() {
        let rendered = LensConfig::default().to_toml_string().unwrap();
        assert!(rendered.contains("k1 = 0.25"), "{rendered}");
        assert!(rendered.contains("min_api = \"3.0\""), "{rendered}");
        assert!(!rendered.contains("fragment"), "{rendered}");
    }

    #[test]
    fn size_parsing() {
        assert_eq!("640x480".parse(), Ok(SurfaceSize::new(640, 480)));
        assert_eq!(" 800X600 ".parse(), Ok(SurfaceSize::new(800, 600)));
        assert!("640".parse::<SurfaceSize>().is_err());
        assert!("640x0".parse::<SurfaceSize>().is_err());
    }

    #[test]
    fn load_resolves_shader_paths_next_to_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let shader = dir.path().join("lens.frag");
        fs::write(&shader, "void main() {}\n").unwrap();
        let config_path = dir.path().join("lensview.toml");
        fs::write(&config_path, "[shader]\nfragment = \"lens.frag\"\n").unwrap();

        let config = LensConfig::load(&config_path).unwrap();
        assert_eq!(config.shader.fragment.as_deref(), Some(shader.as_path()));
        assert_eq!(
            config.shader.read(ShaderStage::Fragment).unwrap().as_deref(),
            Some("void main() {}\n")
        );
        assert_eq!(config.shader.read(ShaderStage::Vertex).unwrap(), None);
    }

    #[test]
    fn load_reports_missing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        match LensConfig::load(&missing).unwrap_err() {
            ConfigError::Io { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }
}
