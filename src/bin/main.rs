use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use taxbot::{Bot, BrowserConnector, Credentials, RunRequest, ScreenshotDir, Site, WorkflowConfig};

#[derive(Parser)]
#[command(name = "taxbot")]
#[command(about = "Tax portal declarations through a real browser")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Workflow file to use instead of the built-in one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run in headless mode (overrides config)
    #[arg(long, global = true)]
    headless: bool,

    /// Debugging endpoint of an already running browser
    #[arg(long, global = true, env = "TAXBOT_DEBUG_ADDRESS")]
    debug_address: Option<String>,

    /// Directory for downloaded spreadsheets
    #[arg(long, global = true)]
    downloads: Option<PathBuf>,

    /// Save a screenshot at every checkpoint into this directory
    #[arg(long, global = true, value_name = "DIR")]
    screenshots: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Monthly sworn declaration on the municipal portal
    Municipal {
        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "TAXBOT_PASSWORD", hide_env_values = true)]
        password: String,

        /// Taxable amount, e.g. 1500.00
        #[arg(short, long)]
        amount: String,

        /// Press the final submit control
        #[arg(long)]
        submit: bool,
    },
    /// Gross-income declaration on the provincial revenue portal
    Revenue {
        /// Taxable base for the declared activity
        #[arg(short, long, default_value = "")]
        amount: String,

        /// Use this spreadsheet instead of downloading one
        #[arg(long)]
        spreadsheet: Option<PathBuf>,

        /// Press the final submit control
        #[arg(long)]
        submit: bool,
    },
    /// Validate a workflow file without running it
    Check { file: PathBuf },
}

#[tokio::main]
async fn main() -> taxbot::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let (site, request) = match cli.command {
        Command::Check { ref file } => {
            let config = WorkflowConfig::load(file)?;
            println!("Config valid: {}", config.name);
            println!("  Site: {}", config.site.as_str());
            println!("  Session: {:?}", config.session.mode);
            println!("  Locators: {}", config.locators.len());
            for phase in config.phase_names() {
                println!("    - {}: {} steps", phase, config.phase_len(phase));
            }
            if !config.params.is_empty() {
                println!("  Parameters: {}", config.params.len());
                for (name, def) in &config.params {
                    let req = if def.required { " (required)" } else { "" };
                    let desc = def.description.as_deref().unwrap_or("");
                    println!("    - {}{}: {}", name, req, desc);
                }
            }
            return Ok(());
        }
        Command::Municipal {
            ref username,
            ref password,
            ref amount,
            submit,
        } => (
            Site::Municipal,
            RunRequest::municipal(Credentials::new(username, password), amount)
                .with_submission(submit),
        ),
        Command::Revenue {
            ref amount,
            ref spreadsheet,
            submit,
        } => {
            let mut request = RunRequest::revenue(amount).with_submission(submit);
            if let Some(path) = spreadsheet {
                request = request.with_spreadsheet(path);
            }
            (Site::Revenue, request)
        }
    };

    let mut config = match cli.config {
        Some(ref path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::builtin(site)?,
    };
    if cli.headless {
        config.session.headless = true;
    }
    if let Some(address) = cli.debug_address {
        config.session.debug_address = address;
    }
    if let Some(dir) = cli.downloads {
        config.downloads.dir = dir;
    }

    println!("Running: {}", config.name);

    let mut bot = Bot::new(config, BrowserConnector);
    if let Some(dir) = cli.screenshots {
        bot = bot.with_checkpoints(ScreenshotDir::new(dir));
    }
    let outcome = bot.run(request).await;

    // Print result
    println!();
    if !outcome.output.is_empty() {
        println!("{}", outcome.output);
        println!();
    }
    if outcome.is_success() {
        println!("✓ {}", outcome.status);
    } else {
        println!("✗ {}", outcome.status);
        println!("  Error: {}", outcome.error);
        std::process::exit(1);
    }

    Ok(())
}
