use crate::photometa_core::cli::Cli;
use crate::photometa_core::error::Result;
use crate::photometa_core::geocode::{
    DEFAULT_ENDPOINT, DEFAULT_USER_AGENT, GeoLocationResolver, NominatimResolver,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_GEOCODE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_GEOCODE_LOOKUPS: usize = 4;

#[derive(Debug, Clone)]
pub struct GeocodeConfig {
    pub enabled: bool,
    pub endpoint: String,
    /// Upper bound on how long an entry waits for its location.
    pub timeout: Duration,
    pub user_agent: String,
    /// Lookups allowed to run at once. A lookup still running past its
    /// deadline keeps its slot until the resolver returns.
    pub max_lookups: usize,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_GEOCODE_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_lookups: DEFAULT_GEOCODE_LOOKUPS,
        }
    }
}

/// Settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub geocode: GeocodeConfig,
    /// Files processed concurrently in a batch.
    pub workers: usize,
    /// Attach a data URI preview to each entry.
    pub previews: bool,
    pub progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            geocode: GeocodeConfig::default(),
            workers: num_cpus::get(),
            previews: true,
            progress: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            geocode: GeocodeConfig {
                enabled: !cli.no_geocode,
                endpoint: cli.geocode_endpoint.clone(),
                timeout: Duration::from_secs(cli.geocode_timeout),
                user_agent: DEFAULT_USER_AGENT.to_string(),
                max_lookups: DEFAULT_GEOCODE_LOOKUPS,
            },
            workers: cli.workers.unwrap_or_else(num_cpus::get).max(1),
            previews: !cli.no_preview,
            progress: !cli.quiet,
        }
    }

    /// The HTTP resolver described by this config, if geocoding is enabled.
    pub fn resolver(&self) -> Result<Option<Arc<dyn GeoLocationResolver>>> {
        if !self.geocode.enabled {
            return Ok(None);
        }
        let resolver = NominatimResolver::new(
            &self.geocode.endpoint,
            self.geocode.timeout,
            &self.geocode.user_agent,
        )?;
        Ok(Some(Arc::new(resolver)))
    }

    /// A progress bar, or a hidden one when progress output is off.
    pub fn progress_bar(&self, len: u64, message: &'static str) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|e| {
                log::warn!("Invalid progress template: {}", e);
                ProgressStyle::default_bar()
            });

        let bar = ProgressBar::new(len).with_style(style);
        bar.set_message(message);
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.geocode.enabled);
        assert_eq!(config.geocode.timeout, Duration::from_secs(5));
        assert_eq!(config.geocode.max_lookups, 4);
        assert!(config.workers >= 1);
        assert!(config.previews);
    }

    #[test]
    fn test_from_cli_flags() {
        let cli = Cli::parse_from([
            "photometa",
            "--no-geocode",
            "--geocode-timeout",
            "2",
            "--workers",
            "0",
            "--no-preview",
            "--quiet",
            "stats",
            "photo.jpg",
        ]);
        let config = PipelineConfig::from_cli(&cli);

        assert!(!config.geocode.enabled);
        assert_eq!(config.geocode.timeout, Duration::from_secs(2));
        assert_eq!(config.workers, 1);
        assert!(!config.previews);
        assert!(!config.progress);
        assert!(config.resolver().unwrap().is_none());
    }

    #[test]
    fn test_resolver_when_enabled() {
        let config = PipelineConfig::default();
        assert!(config.resolver().unwrap().is_some());
    }
}
