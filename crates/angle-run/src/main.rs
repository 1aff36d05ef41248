use clap::Parser;

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ANGLE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("angle=info")),
        )
        .init();

    angle_run::Cli::parse().run()
}
