use tracing_subscriber::EnvFilter;

/// Initialize tracing and bridge `log` to `tracing`.
/// Calling this multiple times is safe (subsequent attempts are ignored).
pub fn init_tracing(enable_debug: bool) {
    // Bridge `log` records into `tracing` so `log` macros are captured too
    let _ = tracing_log::LogTracer::init();

    // Prefer explicit debug flag, otherwise fall back to RUST_LOG or default to warn
    let env_filter = if enable_debug {
        EnvFilter::new("lume_fx=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Render workers are named, so thread names make the interleaving readable
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(true)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_is_idempotent() {
        super::init_tracing(false);
        super::init_tracing(true);
        tracing::debug!(stage = "noop", "still logging after double init");
    }
}
