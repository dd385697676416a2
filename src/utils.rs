use indicatif::ProgressStyle;

/// Style for the per-task progress spinner.
pub(crate) fn get_style_task() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.blue} {span_child_prefix}{msg}")
        .expect("Error setting progress bar template")
}

/// Installs the tracing subscriber with progress-bar aware output.
///
/// Idempotent; later calls keep the first subscriber.
#[cfg(feature = "logging")]
pub(crate) fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let indicatif_layer = tracing_indicatif::IndicatifLayer::new();

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub(crate) fn init_logging() {}
