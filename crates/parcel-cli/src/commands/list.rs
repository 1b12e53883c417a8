use super::{json_pretty, Context, EXIT_SUCCESS};
use parcel_core::Launcher;

pub fn run(ctx: &Context) -> Result<u8, String> {
    let mut reader = ctx.open_bundle()?;
    let manifest = reader.manifest().map_err(|e| e.to_string())?;
    let packages = Launcher::list(manifest);

    if ctx.json {
        println!("{}", json_pretty(&packages)?);
    } else if packages.is_empty() {
        println!("no applications found");
    } else {
        for pkg in &packages {
            let marker = if pkg.is_default { " (default)" } else { "" };
            println!("{}: {}{marker}", pkg.id, pkg.description);
        }
    }
    Ok(EXIT_SUCCESS)
}
