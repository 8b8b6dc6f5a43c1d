use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use easel_contracts::events::{EventSink, EventWriter, NullSink};
use easel_contracts::models::{profile_model, ModelCatalog, ModelRuntimeProfile};
use easel_contracts::providers::{ProviderId, ProviderRegistry};
use easel_contracts::request::{GenerationRequest, GenerationResult};
use easel_engine::{select_route, EngineConfig, ImageRouter, ModelLister};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "easel", version, about = "Provider-adaptive image generation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate one image and write it to disk.
    Generate(GenerateArgs),
    /// Print the runtime profile and route for a model.
    Profile(ProfileArgs),
    /// Fetch a provider's image model listing.
    Models(ModelsArgs),
    /// List built-in providers.
    Providers,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    provider: ProviderId,
    #[arg(long)]
    model: String,
    #[arg(long, default_value = "")]
    prompt: String,
    #[arg(long, default_value = "1:1")]
    aspect: String,
    #[arg(long)]
    size: Option<String>,
    /// Reference image file; repeat for several.
    #[arg(long = "reference")]
    references: Vec<PathBuf>,
    /// Output path; the extension is replaced to match the returned MIME type.
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Saved model listing used to profile the model.
    #[arg(long)]
    models_json: Option<PathBuf>,
    /// Fetch the provider's listing before profiling.
    #[arg(long)]
    fetch_models: bool,
    #[arg(long)]
    no_fallback: bool,
}

#[derive(Debug, Parser)]
struct ProfileArgs {
    #[arg(long)]
    provider: ProviderId,
    #[arg(long)]
    model: String,
    #[arg(long)]
    models_json: Option<PathBuf>,
    /// Reference count to assume when resolving the route.
    #[arg(long, default_value_t = 0)]
    references: usize,
}

#[derive(Debug, Parser)]
struct ModelsArgs {
    #[arg(long)]
    provider: ProviderId,
    /// Write the kept entries as a JSON listing for `--models-json`.
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("easel error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(async {
        match cli.command {
            Command::Generate(args) => run_generate(args).await,
            Command::Profile(args) => run_profile(args),
            Command::Models(args) => run_models(args).await,
            Command::Providers => run_providers(),
        }
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("easel=info"));
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("easel: logging disabled: {err}");
    }
}

async fn run_generate(args: GenerateArgs) -> Result<i32> {
    let config = EngineConfig::from_env().with_responses_fallback(!args.no_fallback);
    let catalog = if args.fetch_models {
        Some(
            ModelLister::new(config.clone())
                .fetch(args.provider)
                .await
                .with_context(|| format!("failed to list {} models", args.provider))?,
        )
    } else {
        load_catalog(args.provider, args.models_json.as_deref())?
    };

    let references = args
        .references
        .iter()
        .map(|path| reference_data_uri(path))
        .collect::<Result<Vec<String>>>()?;
    let mut request = GenerationRequest::new(args.model.trim(), args.prompt.as_str())
        .with_aspect_ratio(&args.aspect)
        .with_reference_images(references);
    if let Some(size) = args.size.as_deref() {
        request = request.with_size_option(size);
    }

    let events: Arc<dyn EventSink> = match args.events.as_ref() {
        Some(path) => Arc::new(EventWriter::with_generated_run_id(path)),
        None => Arc::new(NullSink),
    };
    let router = ImageRouter::new(config).with_events(events);
    let result = match catalog.as_ref() {
        Some(catalog) => router.generate_with_catalog(catalog, &request).await,
        None => {
            let profile = profile_model(request.model_id(), None, args.provider);
            router.generate(args.provider, &profile, &request).await
        }
    }
    .with_context(|| format!("{} generation with {} failed", args.provider, args.model))?;

    let written = write_image(&args.out, &result)?;
    tracing::info!(path = %written.display(), mime = %result.mime_type, "image written");
    println!("{}", written.display());
    Ok(0)
}

fn run_profile(args: ProfileArgs) -> Result<i32> {
    let catalog = load_catalog(args.provider, args.models_json.as_deref())?;
    let profile: ModelRuntimeProfile = match catalog.as_ref() {
        Some(catalog) => catalog.profile(&args.model),
        None => profile_model(&args.model, None, args.provider),
    };
    let sample = GenerationRequest::new(args.model.as_str(), "sample").with_reference_images(
        std::iter::repeat("data:image/png;base64,AA==").take(args.references),
    );
    let route = select_route(args.provider, &profile, &sample);
    let output = json!({
        "profile": profile,
        "route": {
            "primary": route.primary,
            "fallback": route.fallback,
        },
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(0)
}

async fn run_models(args: ModelsArgs) -> Result<i32> {
    let catalog = ModelLister::new(EngineConfig::from_env())
        .fetch(args.provider)
        .await
        .with_context(|| format!("failed to list {} models", args.provider))?;
    for id in catalog.ids() {
        println!("{id}");
    }
    if let Some(path) = args.save.as_ref() {
        let entries: Vec<Value> = catalog
            .ids()
            .filter_map(|id| catalog.get(id).cloned())
            .collect();
        let body = serde_json::to_string_pretty(&json!({ "data": entries }))?;
        fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    }
    if catalog.is_empty() {
        eprintln!("no image models found for {}", args.provider);
        return Ok(2);
    }
    Ok(0)
}

fn run_providers() -> Result<i32> {
    let registry = ProviderRegistry::builtin();
    for descriptor in registry.providers() {
        println!(
            "{:<14} {:<16} {}",
            descriptor.id.as_str(),
            descriptor.display_name,
            descriptor.image_url.unwrap_or("(endpoint required)")
        );
    }
    Ok(0)
}

fn load_catalog(provider: ProviderId, path: Option<&Path>) -> Result<Option<ModelCatalog>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read model listing {}", path.display()))?;
    let body: Value = serde_json::from_str(&raw)
        .with_context(|| format!("model listing {} is not JSON", path.display()))?;
    let catalog = ModelCatalog::from_listing(provider, &body)?;
    Ok(Some(catalog))
}

fn reference_data_uri(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read reference {}", path.display()))?;
    if bytes.is_empty() {
        bail!("reference image {} is empty", path.display());
    }
    Ok(format!(
        "data:{};base64,{}",
        guess_image_mime(path),
        BASE64.encode(bytes)
    ))
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

fn write_image(out: &Path, result: &GenerationResult) -> Result<PathBuf> {
    let bytes = BASE64
        .decode(result.image_data.as_bytes())
        .context("provider returned image data that is not base64")?;
    let path = out.with_extension(extension_for_mime(&result.mime_type));
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
