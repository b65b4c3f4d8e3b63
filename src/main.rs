use std::{error::Error, path::Path, process};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, LevelFilter};

use storefront_session::{
    config::Config,
    protocol::{Credentials, Registration},
    session::Session,
    user::User,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("config.toml"))]
    config_file: String,

    /// Storefront API base URL
    ///
    /// Overrides `api_url` of the configuration file. When the file does
    /// not exist, this is required.
    #[arg(long, env = "STOREFRONT_API_URL", value_hint = ValueHint::Url)]
    api_url: Option<String>,

    /// File where the session is persisted
    ///
    /// Ensure that this file is kept secure and not shared publicly, as it
    /// contains credentials that grant access to your account.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    storage_file: Option<String>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Sign in and persist the session
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create a customer account
    Register {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
        password: String,

        /// CPF, with or without punctuation
        #[arg(long)]
        cpf: String,

        /// Phone number, with or without punctuation
        #[arg(long)]
        phone: String,
    },

    /// End the persisted session
    Logout,

    /// Show the signed-in user, refreshed from the server
    Whoami,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("storefront_session", level);
    }

    logger.init();
}

/// Loads the configuration file and applies command line overrides.
///
/// # Errors
///
/// This function returns an error if the configuration file exists but
/// cannot be parsed, or if it does not exist and no API URL was given.
fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let mut config = if Path::new(&args.config_file).exists() {
        Config::from_file(&args.config_file)?
    } else if let Some(ref api_url) = args.api_url {
        debug!("{} not found; using defaults", args.config_file);
        Config::with_api_url(api_url)?
    } else {
        info!("create {} or pass --api-url", args.config_file);
        return Err(format!("{} not found", args.config_file).into());
    };

    if let Some(ref api_url) = args.api_url {
        config.set_api_url(api_url)?;
    }

    if let Some(ref storage_file) = args.storage_file {
        config.storage_file = storage_file.into();
    }

    Ok(config)
}

fn print_user(user: &User) {
    println!("{} <{}>", user.name, user.email);
    println!("  id:     {}", user.id);
    if !user.roles.is_empty() {
        let roles: Vec<&str> = user.roles.iter().map(String::as_str).collect();
        println!("  roles:  {}", roles.join(", "));
    }
    if let Some(ref phone) = user.phone {
        println!("  phone:  {phone}");
    }
    if let Some(ref avatar) = user.avatar {
        println!("  avatar: {avatar}");
    }
}

/// Runs the requested command against the persisted session.
///
/// # Errors
///
/// This function returns an error when the configuration is invalid, the
/// session file cannot be read or the command fails.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;
    let session = Session::open(&config)?;

    match args.command {
        Command::Login { email, password } => {
            session.login(&Credentials::new(&email, &password)).await?;
            session.wait_for_profile().await;
            if let Some(user) = session.current_user() {
                print_user(&user);
            }
        }

        Command::Register {
            name,
            email,
            password,
            cpf,
            phone,
        } => {
            let registration = Registration::new(&name, &email, &password, &cpf, &phone);
            session.register(&registration).await?;
            println!("account created; run `login` to sign in");
        }

        Command::Logout => session.logout(),

        Command::Whoami => {
            // Opening the session already started fetching the profile.
            session.wait_for_profile().await;
            match session.current_user() {
                Some(user) => print_user(&user),
                None => return Err("not logged in".into()),
            }
        }
    }

    Ok(())
}

/// Main entry point of the application.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    debug!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
