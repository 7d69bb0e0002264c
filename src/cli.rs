use clap::{Parser, Subcommand, ValueEnum};

/// Approval Relay — Teams approvals bot and decision endpoint
#[derive(Parser)]
#[command(name = "approval-relay", version, about)]
pub struct Cli {
    /// Backend for the conversation registry
    #[arg(long, value_enum, default_value_t = StoreKind::Postgres, global = true)]
    pub store: StoreKind,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Durable table in Postgres
    Postgres,
    /// In-process table, lost on restart
    Memory,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the bot server (messages + notification webhook)
    Bot {
        /// Port to bind (defaults to PORT or 3978)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start the decision-processing endpoint
    Decisions {
        /// Port to bind (defaults to PORT or 3978)
        #[arg(short, long)]
        port: Option<u16>,
    },
}
