use clap::Parser;
use log::error;

use kotoba_cutter::cli::{Cli, Commands, ModelCommands};
use kotoba_cutter::client::{ClientCommand, run_client};
use kotoba_cutter::config::ClientConfig;
use kotoba_cutter::{download, server};

#[actix_web::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let server_url = cli.server_url;

    let result = match cli.command {
        Commands::Serve { host, port } => server::run_server(host, port).await,
        Commands::Model(ModelCommands::List) => {
            println!("{}", download::list_available_models());
            Ok(())
        }
        Commands::Model(ModelCommands::Download { model, dir }) => {
            download::download_model(&model, &dir).await.map(|_| ())
        }
        Commands::Upload { video_file } => {
            run_client(ClientConfig::new(server_url), ClientCommand::Upload(video_file)).await
        }
        Commands::Transcribe { video_id, wait } => {
            run_client(
                ClientConfig::new(server_url),
                ClientCommand::Transcribe { video_id, wait },
            )
            .await
        }
        Commands::Status { video_id } => {
            run_client(ClientConfig::new(server_url), ClientCommand::Status(video_id)).await
        }
        Commands::Search {
            video_id,
            query,
            mode,
            padding,
        } => {
            run_client(
                ClientConfig::new(server_url),
                ClientCommand::Search {
                    video_id,
                    query,
                    mode,
                    padding,
                },
            )
            .await
        }
        Commands::Trim {
            video_id,
            start,
            end,
            output,
        } => {
            run_client(
                ClientConfig::new(server_url),
                ClientCommand::Trim {
                    video_id,
                    start,
                    end,
                    output,
                },
            )
            .await
        }
    };

    if let Err(e) = result {
        error!("{e:#}");
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
}
