use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use lensbridge::ShaderStage;
use lensconfig::SurfaceSize;

#[derive(Parser, Debug)]
#[command(
    name = "lensview",
    author,
    version,
    about = "Preview VR lens pre-distortion in a desktop window"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Configuration file (defaults to `lensview.toml` in the config directory).
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// First radial distortion coefficient.
    #[arg(long, value_name = "X", allow_negative_numbers = true, global = true)]
    pub k1: Option<f32>,

    /// Second radial distortion coefficient.
    #[arg(long, value_name = "Y", allow_negative_numbers = true, global = true)]
    pub k2: Option<f32>,

    /// Frame cap for the preview (0=uncapped).
    #[arg(long, value_name = "FPS", global = true)]
    pub fps: Option<u32>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, global = true)]
    pub size: Option<SurfaceSize>,

    /// Fragment shader to compile instead of the built-in distortion grid.
    #[arg(long, value_name = "PATH", global = true)]
    pub fragment: Option<PathBuf>,

    /// Vertex shader to compile instead of the built-in full-screen triangle.
    #[arg(long, value_name = "PATH", global = true)]
    pub vertex: Option<PathBuf>,

    /// Animate k1/k2 around the configured values from a caller thread.
    #[arg(long, conflicts_with = "stdin")]
    pub sweep: bool,

    /// Read `k1 k2` pairs (or `reload`) from standard input, one per line.
    #[arg(long)]
    pub stdin: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved configuration as TOML.
    Config,
    /// Print the shader source that would be compiled.
    Shader(ShaderArgs),
}

#[derive(Args, Debug)]
pub struct ShaderArgs {
    /// Pipeline stage to print: `vertex` or `fragment`.
    #[arg(long, value_name = "STAGE", value_parser = parse_stage, default_value = "fragment")]
    pub stage: ShaderStage,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<SurfaceSize, String> {
    value.parse()
}

pub fn parse_stage(value: &str) -> Result<ShaderStage, String> {
    value.parse()
}
