use clap::{Arg, Command};
use contact_gateway::config::{Config, Environment, ALLOWED_ORIGINS};
use contact_gateway::server;
use log::LevelFilter;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("contact-gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Contact form gateway: validates submissions and relays them as email")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/contact-gateway.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Check the configuration and environment, then exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .value_name("ADDR")
                .help("Override the configured listen address")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/contact-gateway.yaml");

    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if let Some(listen) = matches.get_one::<String>("listen") {
        config.server.listen_address = listen.clone();
    }

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e:#}");
        process::exit(1);
    }

    let environment = Environment::from_env();

    if matches.get_flag("test-config") {
        print_config_report(&config, &environment);
        return;
    }

    log::info!("Starting contact gateway...");
    if let Err(e) = server::run(config, environment).await {
        log::error!("Gateway error: {e:#}");
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e:#}");
            process::exit(1);
        }
    }
}

fn print_config_report(config: &Config, environment: &Environment) {
    println!("🔍 Testing configuration...");
    println!();
    println!("Listen address: {}", config.server.listen_address);
    println!("Endpoint path: {}", config.server.endpoint_path);
    println!("SMTP relay: {}:{}", config.relay.host, config.relay.port);
    println!(
        "Rate limit: {} attempts per {}s",
        config.rate_limit.max_attempts, config.rate_limit.window_seconds
    );
    println!("Deployment mode: {}", environment.mode);
    if environment.mode.enforces_origin() {
        println!("Allowed origins:");
        for origin in ALLOWED_ORIGINS {
            println!("  {origin}");
        }
    } else {
        println!("Allowed origins: not enforced");
    }

    match &environment.credentials {
        Some(credentials) => println!("Mail account: {}", credentials.user),
        None => {
            println!(
                "❌ {} / {} are not set",
                Environment::USER_VAR,
                Environment::PASSWORD_VAR
            );
            process::exit(1);
        }
    }
    println!("✅ Configuration validated");
}
