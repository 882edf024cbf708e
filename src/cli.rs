// upscaler/src/cli.rs
use crate::core::{Engine, Goal, PreprocessingOptions, ProcessingConfig, QualityTier, UpscaleFactor};
use crate::i18n::Locale;
use crate::remote::gemini::{API_KEY_VAR, ENDPOINT_VAR, MODEL_VAR};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "upscaler", author, version, about = "Batch image upscaler", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Queue images (or directories of images) and upscale them in order
    Upscale(UpscaleArgs),

    /// Report the file size of an image re-encoded as JPEG at a given quality
    Preview {
        /// Image to preview
        input: PathBuf,

        /// JPEG quality (clamped to 75-100)
        #[arg(short, long, default_value_t = 90)]
        quality: u8,

        /// Save the JPEG at that quality here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show or change the interface language
    Locale {
        /// New locale; prints the current one when omitted
        #[arg(value_enum)]
        set: Option<LocaleArg>,
    },
}

#[derive(Args, Debug)]
pub struct UpscaleArgs {
    /// Image files or directories
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Walk directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Where exports are written (defaults to the current directory)
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Factor::X2)]
    pub factor: Factor,

    #[arg(short, long, value_enum, default_value_t = EngineArg::Generative)]
    pub engine: EngineArg,

    #[arg(short, long, value_enum, default_value_t = GoalArg::Balanced)]
    pub goal: GoalArg,

    #[arg(short, long, value_enum, default_value_t = TierArg::Standard)]
    pub tier: TierArg,

    /// Light blur before upscaling (both engines)
    #[arg(long)]
    pub noise_reduction: bool,

    /// Contrast boost before upscaling (both engines)
    #[arg(long)]
    pub auto_contrast: bool,

    /// Vibrance/contrast post-filter on generative output
    #[arg(long)]
    pub color_enhancement: bool,

    /// Which downloads to write for each completed job
    #[arg(long, value_enum, default_value_t = ExportMode::Lossless)]
    pub export: ExportMode,

    /// Fixed JPEG quality for lossy exports; searched against the size budget when omitted
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(70..=100))]
    pub quality: Option<u8>,

    /// Losslessly optimize PNG exports
    #[arg(long)]
    pub optimize_png: bool,

    #[arg(long, env = API_KEY_VAR, hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = MODEL_VAR)]
    pub model: Option<String>,

    #[arg(long, env = ENDPOINT_VAR)]
    pub endpoint: Option<String>,
}

impl UpscaleArgs {
    pub fn processing_config(&self) -> ProcessingConfig {
        ProcessingConfig {
            factor: self.factor.into(),
            engine: self.engine.into(),
            goal: self.goal.into(),
            tier: self.tier.into(),
            preprocessing: PreprocessingOptions {
                noise_reduction: self.noise_reduction,
                auto_contrast: self.auto_contrast,
            },
            color_enhancement: self.color_enhancement,
        }
    }

    /// Looks up the remote settings by their environment variable names.
    pub fn remote_setting(&self, name: &str) -> Option<String> {
        match name {
            API_KEY_VAR => self.api_key.clone(),
            MODEL_VAR => self.model.clone(),
            ENDPOINT_VAR => self.endpoint.clone(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Factor {
    #[value(name = "2")]
    X2,
    #[value(name = "4")]
    X4,
    #[value(name = "8")]
    X8,
}

impl From<Factor> for UpscaleFactor {
    fn from(factor: Factor) -> Self {
        match factor {
            Factor::X2 => UpscaleFactor::X2,
            Factor::X4 => UpscaleFactor::X4,
            Factor::X8 => UpscaleFactor::X8,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EngineArg {
    Generative,
    Fidelity,
}

impl From<EngineArg> for Engine {
    fn from(engine: EngineArg) -> Self {
        match engine {
            EngineArg::Generative => Engine::Generative,
            EngineArg::Fidelity => Engine::Fidelity,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GoalArg {
    Balanced,
    Details,
    Smoothness,
}

impl From<GoalArg> for Goal {
    fn from(goal: GoalArg) -> Self {
        match goal {
            GoalArg::Balanced => Goal::Balanced,
            GoalArg::Details => Goal::Details,
            GoalArg::Smoothness => Goal::Smoothness,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TierArg {
    Standard,
    Pro,
}

impl From<TierArg> for QualityTier {
    fn from(tier: TierArg) -> Self {
        match tier {
            TierArg::Standard => QualityTier::Standard,
            TierArg::Pro => QualityTier::Pro,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportMode {
    Lossless,
    Lossy,
    Both,
}

impl ExportMode {
    pub fn lossless(self) -> bool {
        matches!(self, ExportMode::Lossless | ExportMode::Both)
    }

    pub fn lossy(self) -> bool {
        matches!(self, ExportMode::Lossy | ExportMode::Both)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LocaleArg {
    En,
    Vi,
}

impl From<LocaleArg> for Locale {
    fn from(locale: LocaleArg) -> Self {
        match locale {
            LocaleArg::En => Locale::En,
            LocaleArg::Vi => Locale::Vi,
        }
    }
}
