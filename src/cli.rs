//! CLI argument parsing with clap.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

/// Image generation service - queues prompts into a text-to-image engine
/// and writes each result to its own file.
#[derive(Parser, Debug)]
#[command(name = "imagen-server", version, about)]
pub struct Cli {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<String>,

    /// Address to bind the HTTP server to.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind the HTTP server to.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Model name or short alias (e.g. sd-1.5, sdxl, gpt-1).
    #[arg(short, long)]
    pub model: Option<String>,

    /// Directory generated images are written to.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Apply flags on top of file and environment settings.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(model) = &self.model {
            config.engine.model.clone_from(model);
        }
        if let Some(dir) = &self.output_dir {
            config.generation.output_dir.clone_from(dir);
        }
    }
}
