mod check;
mod cli;
mod config;
mod init;
mod logging;
mod request;
mod snapshot;

use config::ProjectConfig;

pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Check(args) => {
            let project = if args.config.exists() {
                Some(ProjectConfig::load(args.config.clone())?)
            } else {
                None
            };
            logging::init(project.as_ref().and_then(|p| p.file.log.level.as_deref()))?;
            check::run(args, project).await
        }
        cli::Command::Request(args) => {
            logging::init(None)?;
            request::run(args)
        }
        cli::Command::Init(args) => init::run(args),
        cli::Command::Snapshot(args) => {
            logging::init(None)?;
            snapshot::run(args)
        }
    }
}
