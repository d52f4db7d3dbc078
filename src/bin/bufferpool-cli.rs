use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;

use bufferpool::{BlockId, BufferPool, CountingLogSink, FileBlockStore};

#[derive(Parser)]
#[command(name = "bufferpool-cli", about = "Interactive buffer pool demo")]
struct Args {
    /// Directory backing the on-disk block store.
    #[arg(long, default_value = "./bufferpool-data")]
    directory: String,

    /// Number of frames in the pool.
    #[arg(long, default_value_t = 8)]
    num_buffers: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    println!("bufferpool-cli v0.1.0");
    println!("Type 'help' for commands, 'quit' to exit");
    println!();

    let store = Arc::new(FileBlockStore::new(&args.directory)?);
    let log = Arc::new(CountingLogSink::new());
    let pool = BufferPool::new(args.num_buffers, store, log);
    let mut pinned: Vec<(BlockId, Arc<bufferpool::Frame>)> = Vec::new();

    loop {
        print!("bufferpool> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break; // EOF
        }
        let input = input.trim();
        let mut parts = input.split_whitespace();

        match parts.next() {
            None => continue,
            Some("quit") | Some("exit") => {
                println!("Goodbye!");
                break;
            }
            Some("help") => show_help(),
            Some("pin") => {
                let (Some(file), Some(block_num)) = (parts.next(), parts.next()) else {
                    println!("usage: pin <file> <block_num>");
                    continue;
                };
                let Ok(block_num) = block_num.parse::<usize>() else {
                    println!("block_num must be a non-negative integer");
                    continue;
                };
                let block_id = BlockId::new(file, block_num);
                match pool.pin(&block_id) {
                    Ok(Some(frame)) => {
                        println!("pinned {block_id} (pin_count={})", frame.pin_count());
                        pinned.push((block_id, frame));
                    }
                    Ok(None) => println!("no buffer available"),
                    Err(e) => println!("error: {e}"),
                }
            }
            Some("unpin") => {
                let (Some(file), Some(block_num)) = (parts.next(), parts.next()) else {
                    println!("usage: unpin <file> <block_num>");
                    continue;
                };
                let Ok(block_num) = block_num.parse::<usize>() else {
                    println!("block_num must be a non-negative integer");
                    continue;
                };
                let block_id = BlockId::new(file, block_num);
                if let Some(pos) = pinned.iter().position(|(id, _)| *id == block_id) {
                    let (_, frame) = pinned.remove(pos);
                    pool.unpin(&frame);
                    println!("unpinned {block_id}");
                } else {
                    println!("{block_id} is not pinned by this session");
                }
            }
            Some("flush") => match pool.flush_all() {
                Ok(()) => println!("flushed all dirty frames"),
                Err(e) => println!("error: {e}"),
            },
            Some("stats") => {
                println!("available: {}", pool.available());
                println!("hit_rate:  {:.4}", pool.hit_rate());
            }
            Some(other) => println!("unknown command '{other}'; type 'help' for a list"),
        }
    }

    Ok(())
}

fn show_help() {
    println!("Commands:");
    println!("  pin <file> <block_num>    pin a block, printing its new pin count");
    println!("  unpin <file> <block_num>  unpin a block pinned earlier this session");
    println!("  flush                     flush every dirty frame");
    println!("  stats                     print available() and hit_rate()");
    println!("  help                      show this message");
    println!("  quit, exit                leave the CLI");
}
