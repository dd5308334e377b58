// Shared plumbing for the harness binaries.
use std::path::Path;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

// Session identifier in the original tool's `program_pid` form.
pub fn client_id() -> String {
    let name = std::env::current_exe()
        .ok()
        .as_deref()
        .map(Path::file_stem)
        .and_then(|stem| stem.map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "mqprobe".to_string());
    format!("{}_{}", name, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_carries_the_process_id() {
        let id = client_id();
        assert!(id.ends_with(&format!("_{}", std::process::id())));
    }
}
