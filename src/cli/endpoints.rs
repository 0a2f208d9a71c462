use anyhow::Result;
use permitgate::endpoint::{standard_configs, EndpointConfig};
use serde_json::{json, Value};

use crate::cli::context::CliContext;
use crate::cli::output::OutputFormat;

pub fn cmd_endpoints(ctx: &CliContext) -> Result<()> {
    let configs = standard_configs();
    match ctx.output() {
        OutputFormat::Json => {
            let rows: Vec<Value> = configs.iter().map(describe).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Yaml => {
            let rows: Vec<Value> = configs.iter().map(describe).collect();
            print!("{}", serde_yaml::to_string(&rows)?);
        }
        OutputFormat::Human => {
            println!(
                "{:<8} {:<10} {:>8} {:>9} {:>11}  extra",
                "method", "path", "capacity", "delay_ms", "timeout_ms"
            );
            for config in &configs {
                println!(
                    "{:<8} {:<10} {:>8} {:>9} {:>11}  {}",
                    config.method.as_str(),
                    config.path,
                    config.capacity,
                    config.work_duration.as_millis(),
                    config.acquire_timeout.as_millis(),
                    config.flag.map(|flag| flag.key()).unwrap_or("-"),
                );
            }
        }
    }
    Ok(())
}

fn describe(config: &EndpointConfig) -> Value {
    json!({
        "api": config.name,
        "method": config.method,
        "path": config.path,
        "capacity": config.capacity,
        "delay_ms": config.work_duration.as_millis() as u64,
        "acquire_timeout_ms": config.acquire_timeout.as_millis() as u64,
        "flag": config.flag,
    })
}
