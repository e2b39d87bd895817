use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global tracing subscriber.
///
/// JSON lines by default so CloudWatch can index the fields, plain text when
/// `pretty_print` is set for local runs. Verbosity comes from `RUST_LOG`,
/// defaulting to `info`.
pub fn init(pretty_print: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber: Box<dyn Subscriber + Send + Sync> = if pretty_print {
        Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .finish(),
        )
    } else {
        Box::new(
            fmt::Subscriber::builder()
                .json()
                .with_ansi(false)
                .with_current_span(true)
                .with_env_filter(env_filter)
                .finish(),
        )
    };

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("global tracing subscriber already installed");
    }
}
