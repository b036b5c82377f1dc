//! `voltwise ask` — Answer one question from the terminal.

use std::path::Path;
use voltwise_agent::AskResponse;
use voltwise_gateway::build_services;

pub async fn run(
    config_path: Option<&Path>,
    message: &str,
    session: Option<String>,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    let services = build_services(&config).await?;

    match services.pipeline.ask(message, session).await {
        Ok(response) => {
            print_response(&response);
            Ok(())
        }
        Err(err) => {
            eprintln!("  {} ({})", err.message, err.kind);
            if let Some(query_type) = err.query_type {
                eprintln!(
                    "  query_type={query_type} cache_hit={} context_tokens={} tool_calls={}",
                    err.cache_hit,
                    err.context_tokens,
                    err.tool_calls.len()
                );
            }
            Err(err.into())
        }
    }
}

fn print_response(response: &AskResponse) {
    println!("{}", response.response);
    println!();
    println!(
        "  [{} · {} · {} context tokens{} · {} ms · session {}]",
        response.agent_role,
        response.query_type,
        response.context_tokens,
        if response.cache_hit { " (cached)" } else { "" },
        response.duration_ms,
        response.session_id
    );
    for call in &response.tool_calls {
        let status = if call.success { "ok" } else { "failed" };
        println!("  tool {} {status} in {} ms", call.tool, call.duration_ms);
    }
}
