mod options;

use anyhow::Result;
use chainage::{Sampler, SamplerConfig};
use clap::Parser;
use options::Cli;

fn main() -> Result<()> {
    env_logger::init();

    let Cli {
        input,
        spacing,
        include_vertices,
        retain_attributes,
        geojson,
        group_field,
        raster,
        search_radius,
        epsg,
        out_dir,
    } = Cli::parse();

    let config = SamplerConfig {
        spacing_m: spacing,
        include_vertices,
        retain_attributes,
        export_geojson: geojson,
        group_field,
        raster,
        search_radius_m: search_radius,
        projected_epsg: epsg,
        out_dir,
    };

    let sampler = Sampler::new(config)?;
    let features = sampler.read(&input)?;
    log::info!("{}: {} line features", input.display(), features.len());

    let report = sampler.run(&features)?;
    for group in &report.groups {
        match group.total_3d {
            Some(total_3d) => println!(
                "{}: 2D {:.3} m, 3D {:.3} m -> {}",
                group.key,
                group.total_2d,
                total_3d,
                group.csv.display()
            ),
            None => println!(
                "{}: 2D {:.3} m -> {}",
                group.key,
                group.total_2d,
                group.csv.display()
            ),
        }
    }
    println!(
        "Complete. {} segment groups processed. Report saved to {}.",
        report.groups.len(),
        report.report_path.display()
    );
    Ok(())
}
