#[cfg(unix)]
use tracing::error;
use tracing_subscriber::EnvFilter;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the `verbose` flag.
pub fn init_logging(verbose: bool) -> Result<(), BoxError> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()?;
    Ok(())
}

/// Creating a TUN device needs root
pub fn check_privileges() -> Result<(), BoxError> {
    #[cfg(unix)]
    {
        if unsafe { libc::geteuid() } != 0 {
            error!("❌ Creating a TUN device requires root privileges (sudo)");
            return Err("Root privileges required".into());
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix)
pub async fn shutdown_signal() -> Result<(), BoxError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
