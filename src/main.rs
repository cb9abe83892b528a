use clap::Parser;
use emberchain::miner::Miner;
use emberchain::network::{request, Package, Response, Server};
use emberchain::storage::{BlockStore, SledBlockStore};
use emberchain::wallet::Keyring;
use emberchain::{Blockchain, Command, Opt, GLOBAL_CONFIG};
use log::{error, LevelFilter};
use std::path::Path;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::StartNode => {
            let db = sled::open(&GLOBAL_CONFIG.storage.db_path)?;
            let store: BlockStore = Arc::new(SledBlockStore::new(&db)?);
            let blockchain = Blockchain::open(&db, store, &GLOBAL_CONFIG)?;
            let keyring = Arc::new(RwLock::new(Keyring::open(Path::new(
                &GLOBAL_CONFIG.storage.wallet_file,
            ))?));
            let mining_cancel = Arc::new(AtomicBool::new(false));

            if GLOBAL_CONFIG.mining.enabled {
                let miner = Miner::new(
                    blockchain.clone(),
                    Arc::clone(&keyring),
                    Arc::clone(&mining_cancel),
                );
                miner.start();
            }

            let server = Server::new(blockchain, keyring, mining_cancel);
            server.run(&GLOBAL_CONFIG.node.listen_addr)?;
        }
        Command::GetInfo { node } => match request(&node, Package::GetInfo)? {
            Response::Info {
                node_id,
                height,
                head_hash,
                address,
                balance,
                peers,
            } => {
                println!("Node:    {node_id}");
                println!("Height:  {height}");
                println!("Head:    {head_hash}");
                println!("Address: {address}");
                println!("Balance: {balance}");
                println!("Peers:   {}", peers.join(", "));
            }
            other => print_unexpected(other)?,
        },
        Command::GetBlock { height, node } => {
            match request(&node, Package::GetBlock { height })? {
                Response::Block { block: Some(bytes) } => {
                    let block = emberchain::Block::deserialize(&bytes)?;
                    print_block(&block)?;
                }
                Response::Block { block: None } => {
                    println!("No block at height {height}");
                }
                other => print_unexpected(other)?,
            }
        }
        Command::Send {
            to,
            value,
            data,
            node,
        } => match request(&node, Package::SendTx { to, value, data })? {
            Response::TxAccepted { id } => println!("Transaction accepted: {id}"),
            other => print_unexpected(other)?,
        },
        Command::NewAddress { node } => match request(&node, Package::NewAddress)? {
            Response::Address { address } => println!("New active address: {address}"),
            other => print_unexpected(other)?,
        },
        Command::PrintChain => {
            let db = sled::open(&GLOBAL_CONFIG.storage.db_path)?;
            let store: BlockStore = Arc::new(SledBlockStore::new(&db)?);
            let blockchain = Blockchain::open(&db, store, &GLOBAL_CONFIG)?;
            for block in blockchain.iterator() {
                print_block(&block)?;
                println!();
            }
        }
    }
    Ok(())
}

fn print_block(block: &emberchain::Block) -> Result<(), Box<dyn std::error::Error>> {
    println!("Height:     {}", block.get_height());
    println!("Hash:       {}", block.get_hash()?);
    println!("Prev hash:  {}", block.get_prev_hash());
    println!("Timestamp:  {}", block.get_timestamp());
    println!("Miner:      {}", block.get_miner());
    println!("Reward:     {}", block.get_reward());
    println!("Difficulty: {}", block.get_difficulty());
    for tx in block.get_transactions() {
        println!(
            "- Tx {}: {} -> {} ({})",
            tx.get_id(),
            tx.get_from(),
            tx.get_to(),
            tx.get_value()
        );
    }
    Ok(())
}

fn print_unexpected(response: Response) -> Result<(), Box<dyn std::error::Error>> {
    match response {
        Response::Error { kind, message } => Err(format!("{kind} error: {message}").into()),
        other => Err(format!("Unexpected response: {other:?}").into()),
    }
}
