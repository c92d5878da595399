use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use farmhand::banner::{BannerInfo, print_banner};
use farmhand::config::{ClassifyArgs, ServeArgs};
use farmhand::detect::classify_image;
use farmhand::detect::yolo::YoloDetector;
use farmhand::generator::Generator;
use farmhand::generator::gemini::GeminiGenerator;
use farmhand::relay::ChatRelay;
use farmhand::server::{self, AppState};

#[derive(Parser)]
#[command(
    name = "farmhand",
    version,
    about = "Farming chat relay and crop detection classifier."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the chat relay HTTP server
    Serve(ServeArgs),
    /// Detect objects in one image and print 0 if the target class is present, else 1
    Classify(ClassifyArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => handle_serve(args).await,
        Command::Classify(args) => handle_classify(args),
    }
}

/// Logs go to stderr; stdout carries only program output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn handle_serve(args: ServeArgs) -> anyhow::Result<()> {
    let addr = args.socket_addr()?;
    let api_key = args.resolve_api_key(|name| std::env::var(name).ok())?;

    let generator = GeminiGenerator::new(api_key.clone(), Some(args.model.clone()))?
        .with_base_url(args.api_base.clone());

    print_banner(&BannerInfo {
        generator: generator.name(),
        model: generator.model(),
        api_key: &api_key,
        listen: addr,
    });

    let relay = ChatRelay::new(Arc::new(generator));
    server::serve(addr, AppState::new(relay)).await
}

fn handle_classify(args: ClassifyArgs) -> anyhow::Result<()> {
    let config = args.detector_config()?;
    let detector = YoloDetector::load(&args.model, config)?;

    let classification = classify_image(&detector, &args.image, args.target_class)?;
    info!(
        image = %args.image.display(),
        target = args.target_class,
        decision = classification.decision.code(),
        "classification finished"
    );

    println!("{classification}");
    Ok(())
}
