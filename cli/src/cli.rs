//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// Deploy and manage applications on a cloud application platform
#[derive(Parser)]
#[command(
    name = "stratus",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Assume the default answer to every prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Select a server and log in
    Login(commands::login::LoginArgs),

    /// Forget the stored account and drop the session
    Logout,

    /// Create an account on the server
    Register(commands::register::RegisterArgs),

    /// Change the account password
    Passwd,

    /// List applications
    Apps(commands::apps::AppsArgs),

    /// Upload a project directory and start it
    Push(commands::push::PushArgs),

    /// Start a pushed application
    Start(commands::start::StartArgs),

    /// Stop and start an application
    Restart(commands::start::RestartArgs),

    /// Start an application in debug mode
    Debug {
        /// Module id or application name
        app: String,
    },

    /// Stop an application
    Stop(commands::stop::StopArgs),

    /// Change instance count or memory
    Scale(commands::scale::ScaleArgs),

    /// Replace the URLs mapped to an application
    Map(commands::map_urls::MapArgs),

    /// Bind a service to an application
    Bind(commands::bind::BindArgs),

    /// Unbind a service from an application
    Unbind(commands::bind::BindArgs),

    /// Delete applications
    Delete(commands::delete::DeleteArgs),

    /// Show the staging log of an application
    Logs(commands::logs::LogsArgs),

    /// Show per-instance resource usage
    Stats(commands::stats::StatsArgs),

    /// Manage provisioned services
    #[command(subcommand)]
    Services(commands::services::ServicesCommand),

    /// List service offerings
    Marketplace,

    /// List domains
    Domains(commands::domains::DomainsArgs),

    /// Push every module with pending changes
    Publish(commands::publish::PublishArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            yes,
            command,
        } = self;
        let flags = AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes },
        };
        let app = AppContext::new(&flags, cancel)?;

        match command {
            Command::Login(args) => commands::login::run(&app, &args).await,
            Command::Logout => commands::login::logout(&app).await,
            Command::Register(args) => commands::register::run(&app, &args).await,
            Command::Passwd => commands::passwd::run(&app).await,
            Command::Apps(args) => commands::apps::run(&app, &args).await,
            Command::Push(args) => commands::push::run(&app, &args).await,
            Command::Start(args) => commands::start::run_start(&app, &args).await,
            Command::Restart(args) => commands::start::run_restart(&app, &args).await,
            Command::Debug { app: name } => {
                let args = commands::start::StartArgs {
                    app: name,
                    debug: true,
                };
                commands::start::run_start(&app, &args).await
            }
            Command::Stop(args) => commands::stop::run(&app, &args).await,
            Command::Scale(args) => commands::scale::run(&app, &args).await,
            Command::Map(args) => commands::map_urls::run(&app, &args).await,
            Command::Bind(args) => commands::bind::run(&app, &args, false).await,
            Command::Unbind(args) => commands::bind::run(&app, &args, true).await,
            Command::Delete(args) => commands::delete::run(&app, &args).await,
            Command::Logs(args) => commands::logs::run(&app, &args).await,
            Command::Stats(args) => commands::stats::run(&app, &args).await,
            Command::Services(cmd) => commands::services::run(&app, cmd).await,
            Command::Marketplace => commands::marketplace::run(&app).await,
            Command::Domains(args) => commands::domains::run(&app, &args).await,
            Command::Publish(args) => commands::publish::run(&app, &args).await,
            Command::Config(cmd) => commands::config::run(&app, cmd),
            Command::Version => commands::version::run(&app),
        }
    }
}
