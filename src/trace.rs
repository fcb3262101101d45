use tracing_subscriber::{fmt::format::FmtSpan, prelude::*, EnvFilter};

pub fn init(pretty: bool) {
    let level_filter = mk_level_filter();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let registry = tracing_subscriber::registry();
    if pretty {
        registry
            .with(stderr_layer.pretty().with_filter(level_filter))
            .init();
    } else {
        registry
            .with(
                stderr_layer
                    .with_line_number(false)
                    .with_span_events(FmtSpan::NONE)
                    .with_filter(level_filter),
            )
            .init();
    }
}

fn mk_level_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let default_str = if cfg!(debug_assertions) {
            "info,motorlink=debug"
        } else {
            "warn,motorlink=info"
        };

        EnvFilter::new(default_str)
    })
}
