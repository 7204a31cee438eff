use std::env;
use std::process::ExitCode;

use field_replay::{load_script, load_world, run_replay, ReplayError, ReplayPaths};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(ReplayError::Usage(message)) => {
            eprintln!("{message}");
            eprintln!("{}", usage_text());
            ExitCode::from(2)
        }
        Err(err) => {
            error!(error = %err, "replay_failed");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<(), ReplayError> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.first().is_some_and(|arg| arg == "-h" || arg == "--help") {
        println!("{}", usage_text());
        return Ok(());
    }
    let paths = ReplayPaths::resolve(&args, |var| env::var(var).ok())?;
    info!(
        world = %paths.world.display(),
        script = %paths.script.display(),
        "replay_starting"
    );

    let world = load_world(&paths.world)?;
    let script = load_script(&paths.script)?;
    let outcome = run_replay(&world, &script);
    println!("{}", outcome.snapshot.to_json()?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn usage_text() -> String {
    [
        "usage: field_replay [WORLD_JSON] [SCRIPT_JSON]",
        "",
        "Paths fall back to FIELD_REPLAY_WORLD and FIELD_REPLAY_SCRIPT.",
        "Logs go to stderr (filter with RUST_LOG); the final runtime snapshot",
        "is printed to stdout as JSON.",
    ]
    .join("\n")
}
