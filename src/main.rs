// upscaler/src/main.rs
use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use upscaler::cli::{Cli, Commands, UpscaleArgs};
use upscaler::core::job::{EnhancedImage, ImageMime, JobSnapshot, SourceFile};
use upscaler::core::processor::Enhancer;
use upscaler::core::Engine;
use upscaler::i18n::{resolve_locale, Catalog, Locale, LocaleStore, Text};
use upscaler::processors::{BudgetSearch, Compressor, JobEvent, JobQueue, Loader, QualityPreview};
use upscaler::remote::{EnhancementService, GeminiClient, GeminiConfig, Unconfigured};
use upscaler::utils::{collect_image_paths, format_file_size, lossless_export_name, lossy_export_name};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    let store = LocaleStore::platform_default();
    let catalog = Catalog::new(resolve_locale(store.as_ref(), |var| std::env::var(var).ok()));
    log::debug!("Using locale {}", catalog.locale());

    match cli.command {
        Commands::Upscale(args) => process_upscale(args, catalog).await,
        Commands::Preview {
            input,
            quality,
            output,
        } => process_preview(input, quality, output).await,
        Commands::Locale { set } => process_locale(store, catalog, set.map(Locale::from)),
    }
}

async fn process_upscale(args: UpscaleArgs, catalog: Catalog) -> Result<()> {
    let config = args.processing_config();

    let service: Arc<dyn EnhancementService> = match config.engine {
        Engine::Generative => {
            let remote = GeminiConfig::from_lookup(|name| args.remote_setting(name))
                .context("The generative engine needs an API key (--api-key or API_KEY)")?;
            log::debug!("Remote service: {:?}", remote);
            Arc::new(GeminiClient::new(remote)?)
        }
        Engine::Fidelity => Arc::new(Unconfigured),
    };
    let enhancer = Enhancer::new(service);

    let paths = collect_image_paths(&args.inputs, args.recursive)?;
    let mut sources = Vec::with_capacity(paths.len());
    for path in &paths {
        match SourceFile::from_path(path) {
            Ok(source) => sources.push(source),
            Err(e) => {
                log::debug!("Skipping {}: {}", path.display(), e);
                eprintln!("{}: {}", path.display(), catalog.error(&e));
            }
        }
    }

    let queue = JobQueue::new();
    let report = queue.enqueue(sources).await;
    for notice in &report.notices {
        eprintln!("{}", catalog.intake_notice(notice));
    }
    if report.added.is_empty() {
        println!("{}", catalog.text(Text::NothingToProcess));
        return Ok(());
    }

    let progress = create_progress_bar(report.added.len())?;
    let events = queue.subscribe();
    let watcher = tokio::spawn(track_progress(queue.clone(), events, progress.clone(), catalog));

    let summary = queue.run_batch(config, &enhancer).await?;
    watcher.await.context("Progress reporter stopped unexpectedly")?;
    progress.finish_and_clear();

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Cannot create {}", args.output_dir.display()))?;

    for job in queue.jobs().await {
        let name = job.source.name.clone();
        let status = catalog.status(job.status());
        match (job.upscaled_image(), job.failure()) {
            (Some(image), _) => {
                println!("{} [{}] {}x{}", name, status, image.width, image.height);
                export_job(&job, image, &args).await?;
            }
            (None, Some(failure)) => {
                log::debug!("{}: {}", name, failure.message);
                println!("{} [{}] {}", name, status, catalog.job_error(failure));
            }
            (None, None) => println!("{} [{}]", name, status),
        }
    }

    println!(
        "Batch complete: {} upscaled, {} failed",
        summary.completed, summary.failed
    );

    if summary.completed == 0 && summary.failed > 0 {
        bail!("{}", catalog.text(Text::ErrorProcessImage));
    }

    Ok(())
}

async fn track_progress(
    queue: JobQueue,
    mut events: broadcast::Receiver<JobEvent>,
    progress: ProgressBar,
    catalog: Catalog,
) {
    loop {
        match events.recv().await {
            Ok(JobEvent::Status { id, status }) => {
                let name = queue
                    .get(id)
                    .await
                    .map(|job| job.source.name)
                    .unwrap_or_default();
                progress.set_message(format!("{} {}", catalog.status(status), name));
                if status.is_terminal() {
                    progress.inc(1);
                }
            }
            Ok(JobEvent::BatchStarted { jobs }) => {
                progress.set_length(jobs as u64);
                progress.set_message(catalog.text(Text::Processing));
            }
            Ok(JobEvent::BatchFinished(_)) | Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(skipped)) => {
                log::debug!("Progress display skipped {} events", skipped);
            }
        }
    }
}

fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

async fn export_job(job: &JobSnapshot, image: &EnhancedImage, args: &UpscaleArgs) -> Result<()> {
    let basename = job.source.basename().to_string();
    let data = Arc::clone(&image.data);
    let optimize_png = args.optimize_png;
    let mode = args.export;
    let quality = args.quality;

    let exports = tokio::task::spawn_blocking(move || -> Result<Vec<(String, Vec<u8>)>> {
        let decoded = Loader::new().load_from_bytes(&data)?;
        let mut files = Vec::new();

        if mode.lossless() {
            let png = if optimize_png {
                Compressor::lossless_export(&decoded)?
            } else {
                Compressor::new(100).encode(&decoded, ImageMime::Png)?
            };
            files.push((lossless_export_name(&basename), png));
        }

        if mode.lossy() {
            let (jpeg, quality) = match quality {
                Some(quality) => (Compressor::new(quality).encode(&decoded, ImageMime::Jpeg)?, quality),
                None => {
                    let outcome = BudgetSearch::default().search(&decoded)?;
                    (outcome.data, outcome.quality)
                }
            };
            files.push((lossy_export_name(&basename, quality), jpeg));
        }

        Ok(files)
    })
    .await??;

    for (file_name, bytes) in exports {
        let path = args.output_dir.join(&file_name);
        std::fs::write(&path, &bytes).with_context(|| format!("Cannot write {}", path.display()))?;
        println!("  -> {} ({})", path.display(), format_file_size(bytes.len() as u64));
    }

    Ok(())
}

async fn process_preview(input: PathBuf, quality: u8, output: Option<PathBuf>) -> Result<()> {
    let source = SourceFile::from_path(&input)?;
    let data = Loader::new().read(&source).await?;
    let mut preview = QualityPreview::from_bytes(data).await?;
    let mut frames = preview.subscribe();

    let quality = preview.set_quality(quality);
    frames
        .changed()
        .await
        .context("Preview was cancelled before it finished")?;

    let frame = frames
        .borrow_and_update()
        .clone()
        .context("Preview produced no frame")?;
    println!(
        "{}: JPEG quality {} -> {} (original {})",
        source.name,
        frame.quality,
        format_file_size(frame.byte_size as u64),
        format_file_size(source.size)
    );

    if let Some(output) = output {
        write_preview(&output, &preview.export(quality).await?)?;
    }

    Ok(())
}

fn write_preview(path: &Path, jpeg: &[u8]) -> Result<()> {
    if ImageMime::from_path(path) != Some(ImageMime::Jpeg) {
        log::warn!("{} does not have a JPEG extension", path.display());
    }
    std::fs::write(path, jpeg).with_context(|| format!("Cannot write {}", path.display()))?;
    println!("Saved preview to: {}", path.display());
    Ok(())
}

fn process_locale(store: Option<LocaleStore>, catalog: Catalog, set: Option<Locale>) -> Result<()> {
    let Some(locale) = set else {
        println!("{}", catalog.locale());
        return Ok(());
    };

    let store = store.context("No configuration directory available to store the locale")?;
    store.save(locale)?;
    println!(
        "{}: {}",
        Catalog::new(locale).text(Text::Saved),
        store.path().display()
    );
    Ok(())
}
