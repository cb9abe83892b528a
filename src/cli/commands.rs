use clap::{Parser, Subcommand};

const DEFAULT_NODE: &str = "127.0.0.1:2001";

#[derive(Debug, Parser)]
#[command(name = "emberchain")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a node (and its miner when enabled)")]
    StartNode,
    #[command(name = "getinfo", about = "Show a node's chain and wallet status")]
    GetInfo {
        #[arg(long = "node", default_value = DEFAULT_NODE, help = "Node RPC address")]
        node: String,
    },
    #[command(name = "getblock", about = "Fetch a block by height from a node")]
    GetBlock {
        #[arg(help = "Block height")]
        height: u64,
        #[arg(long = "node", default_value = DEFAULT_NODE, help = "Node RPC address")]
        node: String,
    },
    #[command(name = "send", about = "Send value from the node's active wallet")]
    Send {
        #[arg(help = "Destination address")]
        to: String,
        #[arg(help = "Amount to send")]
        value: f64,
        #[arg(long = "data", default_value = "", help = "Optional transaction data")]
        data: String,
        #[arg(long = "node", default_value = DEFAULT_NODE, help = "Node RPC address")]
        node: String,
    },
    #[command(name = "newaddress", about = "Rotate the node's active address")]
    NewAddress {
        #[arg(long = "node", default_value = DEFAULT_NODE, help = "Node RPC address")]
        node: String,
    },
    #[command(name = "printchain", about = "Print the local chain from head to genesis")]
    PrintChain,
}
