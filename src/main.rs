use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use hwcloud_provider::cloud::format_error;
use hwcloud_provider::resource::{
    get_all_data_source_keys, get_all_resource_keys, Attributes, ReadOutcome,
};
use hwcloud_provider::{Config, DataSourceRequest, Provider};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Huawei Cloud data sources and resources
#[derive(Parser, Debug)]
#[command(name = "hwcloud-provider", version, about, long_about = None)]
struct Args {
    /// Region to use (overrides HW_REGION_NAME)
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Project ID of the region (overrides HW_PROJECT_ID)
    #[arg(long, global = true)]
    project_id: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available data sources
    DataSources,
    /// List available resources
    Resources,
    /// Read one or more data sources
    Read {
        #[arg(required = true)]
        keys: Vec<String>,
        #[command(flatten)]
        attrs: AttrArgs,
    },
    /// Read a managed resource
    Get {
        key: String,
        id: String,
        #[command(flatten)]
        attrs: AttrArgs,
    },
    /// Create a managed resource
    Create {
        key: String,
        #[command(flatten)]
        attrs: AttrArgs,
    },
    /// Update a managed resource
    Update {
        key: String,
        id: String,
        #[command(flatten)]
        attrs: AttrArgs,
    },
    /// Delete a managed resource
    Delete {
        key: String,
        id: String,
        #[command(flatten)]
        attrs: AttrArgs,
    },
}

#[derive(ClapArgs, Debug, Default)]
struct AttrArgs {
    /// Attribute as key=value; the value is parsed as JSON when possible
    #[arg(short = 'a', long = "attr", value_parser = parse_attr)]
    attrs: Vec<(String, Value)>,
}

impl AttrArgs {
    fn to_attributes(&self) -> Attributes {
        self.attrs.iter().cloned().collect()
    }
}

fn parse_attr(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))?;
    if key.is_empty() {
        return Err(format!("empty attribute name in `{}`", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("hwcloud-provider started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("hwcloud-provider").join("hwcloud-provider.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".hwcloud-provider").join("hwcloud-provider.log");
    }
    PathBuf::from("hwcloud-provider.log")
}

fn print<T: Serialize>(format: OutputFormat, value: &T) -> Result<()> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn build_provider(args: &Args) -> Result<Provider> {
    let mut config = Config::load();
    if let Some(region) = &args.region {
        if config.region.as_ref() != Some(region) {
            // The configured project belongs to the configured region
            config.project_id = None;
        }
        config.region = Some(region.clone());
    }
    if let Some(project_id) = &args.project_id {
        config.project_id = Some(project_id.clone());
    }
    Provider::new(config)
}

async fn run(args: Args) -> Result<bool> {
    match &args.command {
        Command::DataSources => print(args.output, &get_all_data_source_keys())?,
        Command::Resources => print(args.output, &get_all_resource_keys())?,
        Command::Read { keys, attrs } => {
            let provider = build_provider(&args)?;
            let attributes = attrs.to_attributes();
            let requests: Vec<DataSourceRequest> = keys
                .iter()
                .map(|key| DataSourceRequest {
                    key: key.clone(),
                    attributes: attributes.clone(),
                })
                .collect();

            let mut failed = false;
            for result in provider.read_data_sources(&requests).await {
                match result {
                    Ok(state) => print(args.output, &state)?,
                    Err(diagnostic) => {
                        failed = true;
                        eprintln!(
                            "Error: {}: {}",
                            diagnostic.target,
                            diagnostic.detail.as_deref().unwrap_or(&diagnostic.summary)
                        );
                    }
                }
            }
            return Ok(!failed);
        }
        Command::Get { key, id, attrs } => {
            let provider = build_provider(&args)?;
            match provider.read_resource(key, id, &attrs.to_attributes()).await? {
                ReadOutcome::Present(state) => print(args.output, &state)?,
                ReadOutcome::Gone => bail!("{} {} no longer exists", key, id),
            }
        }
        Command::Create { key, attrs } => {
            let provider = build_provider(&args)?;
            let state = provider.create_resource(key, &attrs.to_attributes()).await?;
            print(args.output, &state)?;
        }
        Command::Update { key, id, attrs } => {
            let provider = build_provider(&args)?;
            let state = provider.update_resource(key, id, &attrs.to_attributes()).await?;
            print(args.output, &state)?;
        }
        Command::Delete { key, id, attrs } => {
            let provider = build_provider(&args)?;
            provider.delete_resource(key, id, &attrs.to_attributes()).await?;
            eprintln!("Deleted {} {}", key, id);
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {}: {}", err, format_error(&err));
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attr_json_and_string_values() {
        assert_eq!(parse_attr("protocol_port=443").unwrap(), ("protocol_port".to_string(), Value::from(443)));
        assert_eq!(parse_attr("http2_enable=true").unwrap().1, Value::Bool(true));
        assert_eq!(parse_attr("name=web=1").unwrap().1, Value::String("web=1".to_string()));
        assert!(parse_attr("novalue").is_err());
        assert!(parse_attr("=x").is_err());
    }

    #[test]
    fn test_cli_parses_read_with_attrs() {
        let args = Args::try_parse_from([
            "hwcloud-provider",
            "read",
            "elb_listeners",
            "-a",
            "protocol=HTTP",
            "--region",
            "cn-north-4",
        ])
        .unwrap();
        assert_eq!(args.region.as_deref(), Some("cn-north-4"));
        match args.command {
            Command::Read { keys, attrs } => {
                assert_eq!(keys, vec!["elb_listeners"]);
                assert_eq!(attrs.to_attributes()["protocol"], Value::String("HTTP".to_string()));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
