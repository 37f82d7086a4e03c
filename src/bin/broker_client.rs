//! Minimal line-oriented REPL client: forwards stdin lines verbatim, prints replies as they
//! arrive.

use std::io::{self, BufRead, Read, Write};
use std::net::TcpStream;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "broker-client", about = "Minimal REPL client for the broker")]
struct Args {
    /// Address to connect to.
    #[arg(long, default_value = "127.0.0.1:12345")]
    connect: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.connect)
        .with_context(|| format!("connecting to {}", args.connect))?;
    println!("connected to {}", args.connect);

    let reader_stream = stream.try_clone().context("cloning connection for reader thread")?;
    thread::spawn(move || {
        if let Err(err) = print_replies(reader_stream) {
            eprintln!("connection closed: {err}");
        }
    });

    let mut writer = stream;
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        writer
            .write_all(format!("{line}\n").as_bytes())
            .context("writing to server")?;
    }
    Ok(())
}

fn print_replies(mut stream: TcpStream) -> Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).context("reading from server")?;
        if n == 0 {
            println!("server closed the connection");
            return Ok(());
        }
        print!("{}", String::from_utf8_lossy(&buf[..n]));
        io::stdout().flush().ok();
    }
}
