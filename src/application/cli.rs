use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendName;
use crate::domain::models::ProtocolName;
use crate::domain::models::UnknownPartPolicy;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_serve() -> Command {
    return Command::new("serve").about("Start the flow and A2A HTTP server. This is the default command.");
}

fn arg(key: ConfigKey, env: &'static str, help: String) -> Arg {
    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(env)
        .num_args(1)
        .help(help)
        .global(true);
}

fn with_default(help: &str, key: ConfigKey) -> String {
    return format!("{help} [default: {}]", Config::default(key));
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("genui-server")
        .about(about)
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(false)
        .subcommand(subcommand_serve())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .arg(
            arg(
                ConfigKey::ConfigFile,
                "GENUI_CONFIG_FILE",
                with_default("Path to configuration file", ConfigKey::ConfigFile),
            )
            .short('c'),
        )
        .arg(arg(
            ConfigKey::AgentURL,
            "GENUI_AGENT_URL",
            "Public URL advertised in the A2A agent card. Derived from the port when unset.".to_string(),
        ))
        .arg(
            arg(
                ConfigKey::Backend,
                "GENUI_BACKEND",
                with_default("The backend hosting a model to generate with.", ConfigKey::Backend),
            )
            .short('b')
            .value_parser(PossibleValuesParser::new(BackendName::VARIANTS)),
        )
        .arg(arg(
            ConfigKey::BackendHealthCheckTimeout,
            "GENUI_BACKEND_HEALTH_CHECK_TIMEOUT",
            with_default(
                "Time to wait in milliseconds before timing out when doing a healthcheck for a backend.",
                ConfigKey::BackendHealthCheckTimeout,
            ),
        ))
        .arg(
            arg(
                ConfigKey::FallbackSurface,
                "GENUI_FALLBACK_SURFACE",
                with_default(
                    "Render text-only answers as a fallback surface instead of a plain text message.",
                    ConfigKey::FallbackSurface,
                ),
            )
            .value_parser(PossibleValuesParser::new(["true", "false"])),
        )
        .arg(arg(
            ConfigKey::GeminiToken,
            "GEMINI_API_KEY",
            "Gemini API key when using the Gemini backend.".to_string(),
        ))
        .arg(arg(
            ConfigKey::GeminiURL,
            "GENUI_GEMINI_URL",
            with_default("Gemini API URL when using the Gemini backend.", ConfigKey::GeminiURL),
        ))
        .arg(arg(
            ConfigKey::Host,
            "GENUI_HOST",
            with_default("Address to listen on.", ConfigKey::Host),
        ))
        .arg(
            arg(
                ConfigKey::Model,
                "GENUI_MODEL",
                with_default("The model on the backend to generate with.", ConfigKey::Model),
            )
            .short('m'),
        )
        .arg(
            arg(
                ConfigKey::Port,
                "PORT",
                with_default("Port to listen on.", ConfigKey::Port),
            )
            .short('p'),
        )
        .arg(
            arg(
                ConfigKey::Protocol,
                "GENUI_PROTOCOL",
                with_default("UI protocol streamed to clients.", ConfigKey::Protocol),
            )
            .value_parser(PossibleValuesParser::new(ProtocolName::VARIANTS)),
        )
        .arg(arg(
            ConfigKey::Temperature,
            "GENUI_TEMPERATURE",
            with_default("Sampling temperature passed to the model.", ConfigKey::Temperature),
        ))
        .arg(
            arg(
                ConfigKey::UnknownParts,
                "GENUI_UNKNOWN_PARTS",
                with_default(
                    "How to handle conversation parts of an unrecognized type.",
                    ConfigKey::UnknownParts,
                ),
            )
            .value_parser(PossibleValuesParser::new(UnknownPartPolicy::VARIANTS)),
        );
}

/// Parses the command line. Returns true when the server should start.
pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("serve", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
            return Ok(false);
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        _ => {
            Config::load(build(), vec![&matches]).await?;
        }
    }

    return Ok(true);
}
