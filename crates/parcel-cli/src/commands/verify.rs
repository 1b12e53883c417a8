use super::{colorize_status, json_pretty, Context, EXIT_FAILURE, EXIT_SUCCESS};
use parcel_core::Launcher;
use parcel_store::ExtractionStatus;

pub fn run(ctx: &Context, package_id: Option<&str>) -> Result<u8, String> {
    let mut reader = ctx.open_bundle()?;
    let manifest = reader.manifest().map_err(|e| e.to_string())?;
    let launcher = Launcher::new(ctx.config.clone()).map_err(|e| e.to_string())?;
    let report = launcher
        .verify(manifest, package_id)
        .map_err(|e| e.to_string())?;

    if ctx.json {
        println!("{}", json_pretty(&report)?);
    } else {
        let label = match &report.status {
            ExtractionStatus::Valid => "valid",
            ExtractionStatus::Stale { .. } => "stale",
            ExtractionStatus::MarkerMissing => "marker_missing",
            ExtractionStatus::RootMissing => "root_missing",
        };
        println!("package:  {} ({})", report.package_id, report.architecture);
        println!("root:     {}", report.root.display());
        println!("md5sum:   {}", report.checksum);
        println!("status:   {}", colorize_status(label));
        if let ExtractionStatus::Stale { recorded } = &report.status {
            println!("recorded: {recorded}");
        }
    }

    Ok(if report.status.is_valid() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}
