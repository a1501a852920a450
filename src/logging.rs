use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `LOG_FORMAT` wins when set; otherwise prod logs JSON and everything else is pretty.
    pub fn resolve(env: &Environment, override_value: Option<&str>) -> Self {
        match override_value.map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "json" => Self::Json,
            Some(v) if v == "pretty" => Self::Pretty,
            _ if matches!(env, Environment::Prod) => Self::Json,
            _ => Self::Pretty,
        }
    }
}

fn default_filter(env: &Environment) -> &'static str {
    match env {
        Environment::Dev => "dealmatch_backend=debug,tower_http=debug,info",
        Environment::Staging => "dealmatch_backend=debug,tower_http=info,info",
        Environment::Prod => "dealmatch_backend=info,tower_http=info,warn",
    }
}

pub fn init_logging(env: &Environment) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(env)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    let format = LogFormat::resolve(env, std::env::var("LOG_FORMAT").ok().as_deref());
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .init(),
    }

    tracing::info!(?format, "Logging initialized for {:?} environment", env);
}
