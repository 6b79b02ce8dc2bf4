use std::process::ExitCode;
use toolgate_app::{parse_args, run, USAGE};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let invocation = match parse_args(std::env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            return Ok(ExitCode::from(64));
        }
    };

    let mut stdout = std::io::stdout().lock();
    let status = run(&invocation, &mut stdout)?;
    Ok(ExitCode::from(status))
}
