use anyhow::{Result, bail};
use clap::Parser;
use photometa::photometa_core::export;
use photometa::photometa_core::media::{ImageMetadataEntry, format_file_size};
use photometa::photometa_core::search::{self, CollectionStats};
use photometa::photometa_core::{Cli, Commands, Pipeline, PipelineConfig, discover_files};
use simplelog::{CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, WriteLogger};
use std::fs::File;
use std::path::PathBuf;

/// Discover, accept and process everything under `paths`; returns the
/// entries in submission order.
fn extract(cli: &Cli, paths: &[PathBuf]) -> Result<Vec<ImageMetadataEntry>> {
    let config = PipelineConfig::from_cli(cli);
    let pipeline = Pipeline::new(config)?;

    let files = discover_files(paths)?;
    let ids = pipeline.process_batch(files);

    let entries: Vec<ImageMetadataEntry> =
        ids.iter().filter_map(|id| pipeline.store().get(id)).collect();
    for entry in &entries {
        if let Some(message) = entry.error_message() {
            log::warn!("{}: {}", entry.basic_info.file_name, message);
        }
    }
    Ok(entries)
}

fn print_histogram(title: &str, counts: &std::collections::BTreeMap<String, usize>) {
    if counts.is_empty() {
        return;
    }
    println!("{}:", title);
    for (name, count) in counts {
        println!("  {:<28} {:>6}", name, count);
    }
}

fn print_stats(stats: &CollectionStats) {
    println!("Images:           {:>8} ({})", stats.total_images, format_file_size(stats.total_size));
    println!("─────────────────────────────────");
    println!("With EXIF:        {:>8}", stats.has_exif);
    println!("With GPS:         {:>8}", stats.has_gps);
    println!("With location:    {:>8}", stats.has_location_data);
    println!("Professional:     {:>8}", stats.professional_cameras);
    println!("Flash used:       {:>8}", stats.flash_usage);
    println!("Low light:        {:>8}", stats.low_light_images);
    println!("High DR:          {:>8}", stats.high_dynamic_range_images);
    println!("Corrupted:        {:>8}", stats.corrupted_files);
    println!("Security warnings:{:>8}", stats.security_warnings);
    println!("─────────────────────────────────");
    println!("Average rating:   {:>8.1}", stats.average_rating);
    println!("Average quality:  {:>8.1}", stats.average_quality_score);
    println!("Average technical:{:>8.1}", stats.average_technical_score);
    if let (Some(earliest), Some(latest)) = (&stats.date_range.earliest, &stats.date_range.latest) {
        println!("Captured:         {} .. {}", earliest, latest);
    }
    println!();
    print_histogram("Formats", &stats.formats);
    print_histogram("Cameras", &stats.cameras);
    print_histogram("Lenses", &stats.lens_types);
    print_histogram("Exposure modes", &stats.exposure_modes);
    print_histogram("Metering modes", &stats.metering_modes);
    print_histogram("White balance", &stats.white_balances);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize loggers
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Warn,
        Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];

    if cli.log {
        loggers.push(WriteLogger::new(
            cli.log_level,
            Config::default(),
            File::create("photometa.log")?,
        ));
    }

    CombinedLogger::init(loggers)?;

    match &cli.command {
        Commands::Analyze {
            paths,
            filters,
            format,
            save,
            output,
        } => {
            // Validate filters before doing any work
            let spec = filters.to_spec()?;
            let entries = extract(&cli, paths)?;
            let results = search::apply(&entries, &spec);

            match (format.export_format(), output, save) {
                (None, None, false) => println!("{}", search::format_table(&results)),
                (None, _, _) => bail!("Table output can't be saved; pick json, csv or text"),
                (Some(export_format), Some(path), _) => {
                    export::save(&results, export_format, path)?;
                    println!("Exported {} images to {}", results.len(), path.display());
                }
                (Some(export_format), None, true) => {
                    let path = PathBuf::from(export_format.default_filename());
                    export::save(&results, export_format, &path)?;
                    println!("Exported {} images to {}", results.len(), path.display());
                }
                (Some(export_format), None, false) => {
                    println!("{}", export::export(&results, export_format)?);
                }
            }
        }

        Commands::Stats { paths } => {
            let entries = extract(&cli, paths)?;
            print_stats(&search::collection_stats(&entries));

            let cameras = search::camera_models(&entries);
            if !cameras.is_empty() {
                println!("\nCamera models: {}", cameras.join(", "));
            }
            let categories = search::categories(&entries);
            if !categories.is_empty() {
                println!("Categories: {}", categories.join(", "));
            }
        }
    }

    Ok(())
}
