use super::{json_pretty, Context, EXIT_SUCCESS};
use parcel_core::Launcher;

pub fn run(ctx: &Context, package_id: &str) -> Result<u8, String> {
    let mut reader = ctx.open_bundle()?;
    let manifest = reader.manifest().map_err(|e| e.to_string())?;
    let package =
        Launcher::resolve_package(manifest, Some(package_id)).map_err(|e| e.to_string())?;

    if ctx.json {
        println!("{}", json_pretty(package)?);
        return Ok(EXIT_SUCCESS);
    }

    let is_default = manifest.default_package_id.as_ref() == Some(&package.id);
    println!("id:          {}", package.id);
    println!("description: {}", package.description);
    println!("command:     {}", package.command);
    println!("default:     {}", if is_default { "yes" } else { "no" });
    if package.files.is_empty() {
        println!("payloads:    (none)");
    }
    for file in package.files.values() {
        println!("payload [{}]:", file.architecture);
        println!("  entry:     {}", file.container_entry_path);
        println!("  md5sum:    {}", file.checksum);
        for mode in &file.file_modes {
            println!("  mode:      {} {}", mode.mode, mode.relative_path);
        }
    }
    Ok(EXIT_SUCCESS)
}
