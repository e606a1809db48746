//! `portraify` -- photo-to-portrait studio over a bounded local store.

mod config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portraify_core::encoded::EncodedImage;
use portraify_core::optimizer;
use portraify_core::params::{GenerationParameters, Resolution};
use portraify_core::quality::QualityTier;
use portraify_core::scene::Scene;
use portraify_kolors::KolorsApi;
use portraify_pipeline::PortraitGenerator;
use portraify_store::{
    CompressedAdapter, EntityStatus, FileBackend, PortraitStore, SettingsPatch,
};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "portraify", about = "Photo-to-portrait studio over a bounded local store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a photo into the store
    Upload {
        /// Path to a JPEG/PNG/WebP file
        path: PathBuf,
    },
    /// Generate a portrait from the current (or a given) photo
    Generate {
        /// Scene tag (professional, passport, business, academic, social,
        /// wedding, student, virtual)
        scene: String,
        /// Source photo id; defaults to the current photo
        #[arg(long)]
        photo: Option<String>,
        #[arg(long, default_value_t = 50)]
        background: u8,
        #[arg(long, default_value_t = 50)]
        lighting: u8,
        #[arg(long, default_value_t = 50)]
        detail: u8,
        /// Optional style tag woven into the prompt
        #[arg(long)]
        style: Option<String>,
        /// Output resolution as WxH (default 1024x1024)
        #[arg(long)]
        resolution: Option<String>,
    },
    /// List stored photos and portraits
    List,
    /// Select the current photo
    Select { id: String },
    /// Delete a photo or portrait by id
    Delete { id: String },
    /// Remove all photos and portraits
    Clear,
    /// Show or change settings
    Settings {
        /// Quality tier: low, medium, or high
        #[arg(long)]
        quality: Option<String>,
        #[arg(long)]
        max_photos: Option<u32>,
        #[arg(long)]
        max_portraits: Option<u32>,
        #[arg(long)]
        save_originals: Option<bool>,
    },
    /// Show estimated storage usage
    Usage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::debug!(data_dir = %config.data_dir.display(), quota_bytes = config.quota_bytes, "starting");

    let backend = FileBackend::new(&config.data_dir, config.quota_bytes);
    let store = PortraitStore::open(CompressedAdapter::new(backend)).await;

    match cli.command {
        Command::Upload { path } => upload(&store, &path).await?,
        Command::Generate {
            scene,
            photo,
            background,
            lighting,
            detail,
            style,
            resolution,
        } => {
            let scene = Scene::parse(&scene);
            let resolution = resolution
                .as_deref()
                .map(Resolution::parse)
                .transpose()
                .map_err(|e| anyhow!("{e}"))?;
            let parameters =
                GenerationParameters::new(background, lighting, detail).with_style(style);
            generate(&store, &config, photo, scene, parameters, resolution).await?;
        }
        Command::List => list(&store).await,
        Command::Select { id } => {
            if store.photo(&id).await.is_none() {
                bail!("no photo stored under {id}");
            }
            store.set_current_photo(Some(id.clone())).await;
            println!("current photo is now {id}");
        }
        Command::Delete { id } => {
            if store.delete_photo(&id).await {
                println!("deleted photo {id}");
            } else if store.delete_portrait(&id).await {
                println!("deleted portrait {id}");
            } else {
                println!("nothing stored under {id}");
            }
        }
        Command::Clear => {
            store.clear_all().await;
            println!("cleared all photos and portraits");
        }
        Command::Settings {
            quality,
            max_photos,
            max_portraits,
            save_originals,
        } => {
            let patch = SettingsPatch {
                quality: quality
                    .as_deref()
                    .map(QualityTier::parse)
                    .transpose()
                    .map_err(|e| anyhow!("{e}"))?,
                max_stored_photos: max_photos,
                max_stored_portraits: max_portraits,
                save_originals,
                ..Default::default()
            };
            store
                .update_settings(patch)
                .await
                .map_err(|e| anyhow!("{e}"))?;
            let settings = store.settings().await;
            println!(
                "quality: {}  max photos: {}  max portraits: {}  save originals: {}",
                settings.quality.label(),
                settings.max_stored_photos,
                settings.max_stored_portraits,
                settings.save_originals,
            );
        }
        Command::Usage => {
            let usage = store.total_storage_usage_kb().await;
            let photos = store.photos().await.len();
            let portraits = store.portraits().await.len();
            println!("~{usage} KB across {photos} photos and {portraits} portraits");
        }
    }

    // Commits schedule their own flushes; this one makes the final state
    // durable before the process exits.
    store.flush().await;
    Ok(())
}

async fn upload(store: &PortraitStore<FileBackend>, path: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let image = EncodedImage::from_bytes(mime_for(path), &bytes);
    let (width, height) =
        optimizer::dimensions(&image).map_err(|e| anyhow!("{} is not a readable image: {e}", path.display()))?;
    // Size-adaptive pre-pass so multi-megabyte uploads never reach the
    // store at full size; the store applies the tiered optimizer on top.
    let image = optimizer::auto_optimize(&image).unwrap_or(image);

    let id = store.insert_photo(image, width, height).await;
    wait_for_commit(store, &id).await?;
    println!("uploaded {} ({width}x{height}) as {id}", path.display());
    Ok(())
}

async fn generate(
    store: &PortraitStore<FileBackend>,
    config: &Config,
    photo: Option<String>,
    scene: Scene,
    parameters: GenerationParameters,
    resolution: Option<Resolution>,
) -> anyhow::Result<()> {
    let photo_id = match photo {
        Some(id) => id,
        None => store
            .current_photo_id()
            .await
            .ok_or_else(|| anyhow!("no photo selected; upload one first"))?,
    };

    let api = (!config.kolors_api_key.is_empty()).then(|| {
        KolorsApi::new(config.kolors_endpoint.clone(), config.kolors_api_key.clone())
    });
    let generator = PortraitGenerator::new(store.clone(), api);

    let outcome = generator
        .generate(&photo_id, scene, parameters, resolution)
        .await?;
    wait_for_commit(store, &outcome.portrait_id).await?;
    store.set_current_scene(Some(scene)).await;

    println!(
        "generated {} ({}, {:.1}s, ~{} KB, {})",
        outcome.portrait_id,
        scene.label(),
        outcome.processing_time_secs,
        outcome.estimated_size_kb,
        if outcome.via_remote { "remote" } else { "local" },
    );
    Ok(())
}

async fn list(store: &PortraitStore<FileBackend>) {
    let current = store.current_photo_id().await;
    let photos = store.photos().await;
    println!("photos ({}):", photos.len());
    for photo in &photos {
        let marker = if current.as_deref() == Some(&photo.id) { "*" } else { " " };
        println!(
            " {marker} {}  {}x{}  ~{} KB  {}",
            photo.id,
            photo.width,
            photo.height,
            photo.estimated_size_kb,
            photo.created_at.format("%Y-%m-%d %H:%M"),
        );
    }

    let portraits = store.portraits().await;
    println!("portraits ({}):", portraits.len());
    for portrait in &portraits {
        println!(
            "   {}  {}  from {}  ~{} KB",
            portrait.id,
            portrait.scene_tag.label(),
            portrait.source_photo_id,
            portrait.estimated_size_kb,
        );
    }
}

/// Wait for a background commit to land.
async fn wait_for_commit(store: &PortraitStore<FileBackend>, id: &str) -> anyhow::Result<()> {
    for _ in 0..600 {
        match store.entity_status(id).await {
            EntityStatus::Committed => return Ok(()),
            EntityStatus::Pending => tokio::time::sleep(Duration::from_millis(50)).await,
            EntityStatus::Unknown => bail!("entity {id} disappeared before committing"),
        }
    }
    bail!("timed out waiting for {id} to commit")
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}
