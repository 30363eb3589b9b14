//! Render a lensed source from a JSON configuration and inject it into blank
//! exposures centred on the configured sky position.
//!
//! Prints the injected flux per band and optionally writes asinh-stretched PNG
//! previews of the lensed stamp and of every injected band.

use std::path::PathBuf;

use clap::Parser;
use lamp::image_proc::asinh_gray_image;
use lamp::{ImageSize, InjectionConfig, TanWcs};
use log::info;

#[derive(Parser, Debug)]
#[command(
    name = "lensed_stamp",
    about = "Render a lensed source and inject it into blank multi-band exposures",
    long_about = None
)]
struct Args {
    /// Path to the injection configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Exposure side length in pixels
    #[arg(long, default_value_t = 100)]
    exposure_size: usize,

    /// Exposure pixel scale in arcsec/pixel
    #[arg(long, default_value_t = 0.2)]
    exposure_scale: f64,

    /// Directory for PNG previews (skipped if not given)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Asinh softening, as a fraction of the peak pixel value
    #[arg(long, default_value_t = 0.05)]
    softening: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = InjectionConfig::from_file(&args.config)?;
    let mut frame = config.build_frame()?;
    let lens = config.build_lens()?;

    let sky = config.sky.to_equatorial();
    let size = ImageSize::from_width_height(args.exposure_size, args.exposure_size);
    let wcs = TanWcs::centered(size, sky, args.exposure_scale)?;
    let exposures = vec![size.zeros(); config.spectrum.len()];

    let injected = frame.inject(
        &lens,
        &config.spectrum,
        &wcs,
        &sky,
        &exposures,
        &config.injector(),
    )?;

    let lensed = frame
        .cached()
        .ok_or("lensed image missing after injection")?
        .clone();
    info!(
        "Lensed stamp {} at {:.4}\"/px, flux {:.6}",
        lensed.size(),
        lensed.pixel_scale(),
        lensed.total_flux()
    );
    for (band, image) in injected.iter().enumerate() {
        println!("band {band}: injected flux {:.6}", image.sum());
    }

    if let Some(dir) = args.output_dir {
        std::fs::create_dir_all(&dir)?;
        let softening = |data: &ndarray::Array2<f64>| {
            let peak = data.iter().cloned().fold(0.0_f64, f64::max);
            (peak * args.softening).max(f64::MIN_POSITIVE)
        };

        let path = dir.join("lensed.png");
        asinh_gray_image(lensed.data(), softening(lensed.data())).save(&path)?;
        info!("Wrote {}", path.display());

        for (band, image) in injected.iter().enumerate() {
            let path = dir.join(format!("band_{band}.png"));
            asinh_gray_image(image, softening(image)).save(&path)?;
            info!("Wrote {}", path.display());
        }
    }

    Ok(())
}
