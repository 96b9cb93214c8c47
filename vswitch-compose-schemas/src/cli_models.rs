use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(version = "1.0", author = "Bristol Cyber Security Group (BCSG)")]
pub struct Opts {
    #[arg(long, default_value = "vswitch-compose.yaml", help = "Switch configuration file")]
    pub input: String,
    #[arg(long, default_value = "vswitch-compose-state.json", help = "Where switch identities are kept between runs")]
    pub state: String,
    #[arg(
    long,
    default_value = "platform-state.json",
    help = "Snapshot of the platform inventory the switches are reconciled against"
    )]
    pub platform_state: String,
    #[arg(long, help = "Engine settings file, defaults to /var/lib/vswitch-compose/config/settings.json")]
    pub settings: Option<String>,
    #[arg(short, long)]
    pub verbosity: Option<String>,
    #[command(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Subcommand, Debug, Deserialize, Serialize)]
pub enum SubCommand {
    #[command(about = "Check the switch configuration without contacting the platform")]
    Validate,
    #[command(about = "Show the operations needed to reach the declared state")]
    Plan,
    #[command(about = "Create or update all declared switches")]
    Up,
    #[command(about = "Delete all switches recorded in the state file")]
    Down,
    #[command(about = "Print the current state of the recorded switches")]
    Show,
}

impl SubCommand {
    pub fn name(&self) -> String {
        match &self {
            SubCommand::Validate => "validate".into(),
            SubCommand::Plan => "plan".into(),
            SubCommand::Up => "up".into(),
            SubCommand::Down => "down".into(),
            SubCommand::Show => "show".into(),
        }
    }
}
