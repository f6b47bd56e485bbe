use clap::Parser;
use launchpad_core::{DeckRequest, Services};
use launchpad_server::cli::{Cli, Commands};
use launchpad_server::server::{load_config, AppState};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // JSON logs by default; LAUNCHPAD_LOG_FORMAT=pretty for local runs.
    launchpad_core::o11y::init_global_from_env()?;
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or_else(Commands::default_serve);

    match cmd {
        Commands::Serve { host, port } => {
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            let config = load_config(cli.output_dir)?;
            let state = AppState::from_config(&config)?;
            launchpad_server::server::serve(addr, state).await?;
        }
        Commands::Evaluate { profile } => {
            let services = services(cli.output_dir)?;
            let profile = read_json(&profile).await?;
            let report = launchpad_core::evaluate_startup(&services, profile).await?;
            print_json(&report)?;
        }
        Commands::Research { idea, problem } => {
            let services = services(cli.output_dir)?;
            let outcome = launchpad_core::run_market_research(&services, &idea, &problem).await?;
            eprintln!("{}", outcome.message);
            print_json(&outcome)?;
        }
        Commands::Recommend {
            raw_input,
            evaluation,
            request_id,
        } => {
            let services = services(cli.output_dir)?;
            let raw_input = read_json(&raw_input).await?;
            let evaluation = read_json(&evaluation).await?;
            let outcome =
                launchpad_core::run_recommendation(&services, raw_input, &evaluation, request_id).await?;
            println!("{}", outcome.paths.markdown.display());
        }
        Commands::Deck { request } => {
            let services = services(cli.output_dir)?;
            let request = DeckRequest::from_body(&read_json(&request).await?)?;
            let outcome = launchpad_core::generate_deck(&services, request).await?;
            for failure in &outcome.review_failures {
                eprintln!("review step failed: {failure}");
            }
            println!("{}", outcome.path.display());
        }
        Commands::Config => {
            fn redact(s: &str) -> String {
                if s.len() <= 8 {
                    return "***".to_string();
                }
                format!("{}***{}", &s[..4], &s[s.len() - 4..])
            }
            let secret = |var: &str| std::env::var(var).ok().map(|v| redact(&v));
            let plain = |var: &str| std::env::var(var).ok();

            let cfg = serde_json::json!({
                "GEMINI_API_KEY": secret("GEMINI_API_KEY"),
                "GROQ_API_KEY": secret("GROQ_API_KEY"),
                "OPENAI_API_KEY": secret("OPENAI_API_KEY"),
                "SERPER_API_KEY": secret("SERPER_API_KEY"),
                "SERPAPI_API_KEY": secret("SERPAPI_API_KEY"),
                "LAUNCHPAD_IMAGE_API_KEY": secret("LAUNCHPAD_IMAGE_API_KEY"),
                "LAUNCHPAD_LLM_PROVIDER": plain("LAUNCHPAD_LLM_PROVIDER"),
                "LAUNCHPAD_FALLBACK_PROVIDERS": plain("LAUNCHPAD_FALLBACK_PROVIDERS"),
                "LAUNCHPAD_IMAGE_PROVIDER": plain("LAUNCHPAD_IMAGE_PROVIDER"),
                "LAUNCHPAD_MAX_RETRIES": plain("LAUNCHPAD_MAX_RETRIES"),
                "PPT_MAX_ITERATIONS": plain("PPT_MAX_ITERATIONS"),
                "LAUNCHPAD_OUTPUT_DIR": cli.output_dir.as_ref().map(|p| p.display().to_string()),
                "LAUNCHPAD_LOG_FORMAT": plain("LAUNCHPAD_LOG_FORMAT"),
                "config_valid": load_config(cli.output_dir.clone()).map(|_| true).unwrap_or_else(|e| {
                    eprintln!("{e}");
                    false
                }),
            });
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
    }

    Ok(())
}

fn services(output_dir: Option<std::path::PathBuf>) -> anyhow::Result<Services> {
    let config = load_config(output_dir)?;
    Ok(Services::from_config(&config)?)
}

async fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
