use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod crawl;
mod db;
mod error;
mod models;
mod services;
#[cfg(test)]
mod test_support;
mod worker;

use app::App;
use config::Config;
use error::Result;

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config_path = flag_value(&args, "--config").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let app = App::new(&config).await?;

    if let Some(raw) = flag_value(&args, "--report") {
        let job_id: i64 = raw
            .parse()
            .map_err(|_| anyhow::anyhow!("--report expects a job id, got '{}'", raw))?;
        match app.job_report(job_id).await? {
            Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            None => println!("No job {}", job_id),
        }
        return Ok(());
    }

    let seed_path = flag_value(&args, "--seed").map(PathBuf::from);
    let enqueue = has_flag(&args, "--enqueue");
    let once = has_flag(&args, "--once");

    if let Some(path) = &seed_path {
        let added = app.seed(path).await?;
        println!("Added {} websites from {:?}", added, path);
    }

    if enqueue {
        match app.enqueue_all().await? {
            Some(job_id) => println!("Created job {}", job_id),
            None => println!("No websites to crawl"),
        }
    }

    if once {
        let jobs = app.run_once().await?;
        println!("Processed {} jobs", jobs);
        return Ok(());
    }

    // Seeding and enqueueing are one-shot unless combined with the worker loop
    if seed_path.is_some() || enqueue {
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            signal.cancel();
        }
    });

    app.run(shutdown).await;
    Ok(())
}
