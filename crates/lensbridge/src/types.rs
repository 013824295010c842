use std::fmt;
use std::str::FromStr;

/// Uniform name the first radial coefficient is published under.
pub const K1_UNIFORM: &str = "k1";
/// Uniform name the second radial coefficient is published under.
pub const K2_UNIFORM: &str = "k2";

/// Radial distortion coefficients used until the host supplies its own.
pub const DEFAULT_K1: f32 = 0.25;
pub const DEFAULT_K2: f32 = 0.05;

/// The two scalar shader parameters, copied by value between threads.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParameterPair {
    pub k1: f32,
    pub k2: f32,
}

impl ParameterPair {
    pub fn new(k1: f32, k2: f32) -> Self {
        Self { k1, k2 }
    }

    /// Radial scale applied at squared radius `r2` (`1 + k1·r² + k2·r⁴`).
    ///
    /// Mirrors the expression evaluated by the built-in fragment shader so
    /// hosts can reason about the correction without touching the GPU.
    pub fn radial_scale(&self, r2: f32) -> f32 {
        1.0 + self.k1 * r2 + self.k2 * r2 * r2
    }
}

/// A published pair together with the version it was published under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub pair: ParameterPair,
    pub version: u64,
}

/// Pipeline stage a shader object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

impl FromStr for ShaderStage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vertex" | "vert" | "vs" => Ok(ShaderStage::Vertex),
            "fragment" | "frag" | "fs" => Ok(ShaderStage::Fragment),
            other => Err(format!("unknown shader stage '{other}'")),
        }
    }
}

/// Renderable client API version (`3.0` corresponds to an OpenGL ES 3 class device).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u8,
    pub minor: u8,
}

impl ApiVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::new(3, 0)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (major, minor) = match trimmed.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (trimmed, "0"),
        };
        let major = major
            .parse::<u8>()
            .map_err(|_| format!("invalid API major version in '{value}'"))?;
        let minor = minor
            .parse::<u8>()
            .map_err(|_| format!("invalid API minor version in '{value}'"))?;
        Ok(Self::new(major, minor))
    }
}

/// Attribute set a display configuration has to satisfy.
///
/// Bit depths are minimums; a deeper configuration is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigAttributes {
    pub red_bits: u8,
    pub green_bits: u8,
    pub blue_bits: u8,
    pub alpha_bits: u8,
    /// The configuration must be able to back an on-screen window surface.
    pub window_surface: bool,
    /// Minimum renderable API version.
    pub min_api: ApiVersion,
}

impl Default for ConfigAttributes {
    fn default() -> Self {
        Self {
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 0,
            window_surface: true,
            min_api: ApiVersion::default(),
        }
    }
}

impl ConfigAttributes {
    /// Returns true when `candidate` meets every requirement in `self`.
    pub fn accepts(&self, candidate: &ConfigDescriptor) -> bool {
        candidate.red_bits >= self.red_bits
            && candidate.green_bits >= self.green_bits
            && candidate.blue_bits >= self.blue_bits
            && candidate.alpha_bits >= self.alpha_bits
            && (candidate.window_surface || !self.window_surface)
            && candidate.api >= self.min_api
    }
}

/// What a platform configuration actually provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDescriptor {
    pub red_bits: u8,
    pub green_bits: u8,
    pub blue_bits: u8,
    pub alpha_bits: u8,
    pub window_surface: bool,
    pub api: ApiVersion,
}

impl ConfigDescriptor {
    pub(crate) fn total_bits(&self) -> u32 {
        u32::from(self.red_bits)
            + u32::from(self.green_bits)
            + u32::from(self.blue_bits)
            + u32::from(self.alpha_bits)
    }
}

impl fmt::Display for ConfigDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R{}G{}B{}A{} api {}{}",
            self.red_bits,
            self.green_bits,
            self.blue_bits,
            self.alpha_bits,
            self.api,
            if self.window_surface { " window" } else { "" }
        )
    }
}

/// Lifecycle of a [`RenderBridge`](crate::RenderBridge).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    /// Terminal for the attempt that produced it; a new `initialize` starts clean.
    Failed = 3,
    Destroyed = 4,
}

impl BridgeState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => BridgeState::Uninitialized,
            1 => BridgeState::Initializing,
            2 => BridgeState::Ready,
            3 => BridgeState::Failed,
            _ => BridgeState::Destroyed,
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BridgeState::Uninitialized => "uninitialized",
            BridgeState::Initializing => "initializing",
            BridgeState::Ready => "ready",
            BridgeState::Failed => "failed",
            BridgeState::Destroyed => "destroyed",
        };
        f.write_str(label)
    }
}
