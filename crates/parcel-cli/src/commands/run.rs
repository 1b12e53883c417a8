use super::{exit_code_byte, Context};
use parcel_core::{install_signal_handler, Launcher};
use parcel_runtime::ExitOutcome;

pub fn run(ctx: &Context, package_id: Option<&str>) -> Result<u8, String> {
    let launcher = Launcher::new(ctx.config.clone()).map_err(|e| e.to_string())?;
    install_signal_handler(launcher.cancel_token());

    let mut reader = ctx.open_bundle()?;
    let port = launcher.config().port;
    let outcome = launcher
        .run_package(&mut reader, package_id, |prepared| {
            println!("running application {}", prepared.package_id);
            println!("don't forget to forward port {port} using adb:");
            println!("adb forward tcp:{port} tcp:{port}");
        })
        .map_err(|e| e.to_string())?;

    match outcome {
        ExitOutcome::Cancelled => eprintln!("application stopped"),
        ExitOutcome::TimedOut => eprintln!("application timed out"),
        ExitOutcome::Signaled(sig) => eprintln!("application killed by signal {sig}"),
        ExitOutcome::Exited(_) => {}
    }
    Ok(exit_code_byte(outcome.exit_code()))
}
