//! Command-line utility for a running catchment server
//!
//! Talks to the control socket to list or close SMTP connections and to
//! check that the server is alive.

use std::time::Duration;

use catchment_control::{
    ConnectionCommand, ControlClient, DEFAULT_CONTROL_SOCKET, Request, ResponseData,
    ResponsePayload, SystemCommand,
};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "catchmentctl")]
#[command(about = "Manage a running catchment server", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the control socket
    #[arg(short = 'c', long, default_value = DEFAULT_CONTROL_SOCKET)]
    control_socket: String,

    /// Seconds to wait for the server to answer
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// Print responses as debug structures instead of text
    #[arg(long)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Live SMTP connections
    Connections {
        #[command(subcommand)]
        action: ConnectionAction,
    },
    /// Server health and status
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConnectionAction {
    /// List every open connection
    List,
    /// Force a connection closed
    Close {
        /// Connection id, as shown by `list`
        uuid: String,
    },
}

#[derive(Subcommand, Debug)]
enum SystemAction {
    /// Check that the server is responding
    Ping,
    /// Show version, uptime and connection count
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let client =
        ControlClient::new(&cli.control_socket).with_timeout(Duration::from_secs(cli.timeout));
    if let Err(e) = client.check_socket_exists() {
        anyhow::bail!("{e}\nIs catchment running with a control socket configured?");
    }

    let request = match cli.command {
        Commands::Connections { action } => Request::connections(match action {
            ConnectionAction::List => ConnectionCommand::List,
            ConnectionAction::Close { uuid } => ConnectionCommand::Close { uuid },
        }),
        Commands::System { action } => Request::system(match action {
            SystemAction::Ping => SystemCommand::Ping,
            SystemAction::Status => SystemCommand::Status,
        }),
    };

    let response = client.send_request(request).await?;
    if cli.raw {
        println!("{response:#?}");
        return Ok(());
    }

    match response.payload {
        ResponsePayload::Ok => println!("OK"),
        ResponsePayload::Data(data) => match *data {
            ResponseData::Connections(connections) if connections.is_empty() => {
                println!("No open connections");
            }
            ResponseData::Connections(connections) => {
                for info in &connections {
                    println!("{info}");
                }
                println!("Total: {} connection(s)", connections.len());
            }
            ResponseData::SystemStatus(status) => {
                println!("=== catchment status ===\n");
                print!("{status}");
            }
            ResponseData::Message(message) => println!("{message}"),
        },
        ResponsePayload::Error(err) => anyhow::bail!("Server error: {err}"),
    }

    Ok(())
}
