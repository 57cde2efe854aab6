// fetch-core - Media Fetch Core
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{anyhow, Context};
use clap::Parser;
use fetch_core::{Dispatcher, FetchConfig, SourceDescriptor, SourceKind};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fetch-cli")]
#[command(about = "Fetch CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// Source kind: direct, playlist, drive or video
    kind: String,

    /// URL or host item id
    value: String,

    /// Parallel range requests for direct sources
    #[arg(short, long)]
    parallelism: Option<i64>,

    /// Extra request header, `Name:Value`
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Cookie to seed, `name=value`
    #[arg(short, long = "cookie")]
    cookies: Vec<String>,

    /// Upstream proxy URL
    #[arg(long)]
    proxy: Option<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Correlation id, also the default output name
    #[arg(long, default_value = "cli")]
    id: String,
}

impl Cli {
    fn descriptor(&self) -> anyhow::Result<SourceDescriptor> {
        let mut descriptor = SourceDescriptor::new(SourceKind::parse(&self.kind), &self.value);

        for header in &self.headers {
            let (name, value) = header
                .split_once(':')
                .ok_or_else(|| anyhow!("header '{}' is not Name:Value", header))?;
            descriptor = descriptor.with_header(name.trim(), value.trim());
        }
        for cookie in &self.cookies {
            let (name, value) = cookie
                .split_once('=')
                .ok_or_else(|| anyhow!("cookie '{}' is not name=value", cookie))?;
            descriptor = descriptor.with_cookie(name.trim(), value.trim());
        }
        if let Some(parallelism) = self.parallelism {
            descriptor = descriptor.with_parallelism(parallelism);
        }
        if let Some(proxy) = &self.proxy {
            descriptor = descriptor.with_proxy(proxy);
        }

        Ok(descriptor)
    }

    fn config(&self) -> anyhow::Result<FetchConfig> {
        match &self.config {
            Some(path) => FetchConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display())),
            None => Ok(FetchConfig::default()),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let (config, descriptor) = match cli.config().and_then(|c| Ok((c, cli.descriptor()?))) {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let dispatcher = match Dispatcher::new(config) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    println!("Fetching {} source: {}", descriptor.kind, descriptor.value);
    match dispatcher.fetch(cli.id.clone(), descriptor).await {
        Ok(result) => {
            println!("✅ Saved to {}", result.path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}
