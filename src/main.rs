use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dicom_series::{
    config::Cli, series_loader::SeriesLoader, sources::enumerate_sources, volume::VolumeBuffer,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let sources = match enumerate_sources(&cli.directory, &cli.source_options()) {
        Ok(sources) => sources,
        Err(e) => {
            error!(code = %e.code(), "{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("Loading {} slices from {}", sources.len(), cli.directory.display());

    let handle = SeriesLoader::default().spawn_load(sources, |progress| {
        info!(
            "  {:>3.0}% ({} slices)",
            progress.fraction * 100.0,
            progress.slices_loaded
        );
    });

    let volume = match handle.await {
        Ok(Ok(volume)) => volume,
        Ok(Err(e)) => {
            error!(code = %e.code(), "{e}");
            return ExitCode::FAILURE;
        }
        Err(join_err) => {
            error!("Loader task panicked or was cancelled: {join_err}");
            return ExitCode::FAILURE;
        }
    };

    print_summary(&volume);

    if let Some(path) = &cli.preview {
        let middle = volume.depth() as usize / 2;
        let Some(image) = volume.axial_image(middle) else {
            error!("Cannot render slice {middle} as an image");
            return ExitCode::FAILURE;
        };
        if let Err(e) = image.save(path) {
            error!("Failed to write {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
        info!("Wrote slice {middle} to {}", path.display());
    }

    ExitCode::SUCCESS
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_summary(volume: &VolumeBuffer) {
    let geometry = volume.geometry();
    let (sx, sy, sz) = geometry.spacing;
    info!("Series: {}", geometry.series_description);
    info!(
        "  Dimensions: {} x {} x {}",
        geometry.width, geometry.height, geometry.depth
    );
    info!("  Spacing: {sx:.3} x {sy:.3} x {sz:.3} mm");
    info!(
        "  Pixels: {}-bit {}",
        geometry.bits_allocated(),
        if geometry.is_signed() { "signed" } else { "unsigned" }
    );
    info!(
        "  Rescale: slope {} intercept {}",
        geometry.rescale_slope, geometry.rescale_intercept
    );
    info!("  Origin: {:?}", geometry.origin);
    info!("  Orientation: {:?}", geometry.orientation);
}
