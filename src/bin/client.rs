//! Thin, non-interactive client binary: one subcommand per `ClientSession`
//! operation, run once per invocation. An interactive operator shell
//! (`connect`/`share`/`query`/`get`/`status`/`quit`) is a separate concern,
//! not implemented here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use filedir::client::ClientSession;
use filedir::fileshare::{self, DEFAULT_PEER_PORT};
use filedir::host::HostId;
use filedir::rdt::Rdt;

#[derive(Parser, Debug)]
#[command(name = "client", about = "P2P file directory client")]
struct Args {
    /// Directory server address, e.g. 127.0.0.1:50001.
    #[arg(long, default_value = "127.0.0.1:50001")]
    server: SocketAddr,
    /// Local UDP port this client listens on for server replies.
    #[arg(long, default_value_t = 60001)]
    listen_port: u16,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register with the directory server.
    Ident,
    /// Walk `dir` for files with extension `ext` and INFORM the server.
    Share {
        dir: PathBuf,
        #[arg(long, default_value = "mp3")]
        ext: String,
    },
    /// QUERY the server for filenames containing `substring`.
    Query {
        substring: String,
        #[arg(long)]
        host: Option<String>,
    },
    /// REMOVE one previously-shared `(filename, filesize)` entry.
    Remove { filename: String, filesize: u64 },
    /// Tell the server to drop this host's entries and disconnect.
    Exit,
    /// Download `filename` (of `size` bytes) from `peer`, while also
    /// starting this host's own peer-file listener on `serve_dir` so other
    /// clients can pull files this host has shared.
    Get {
        peer: SocketAddr,
        filename: String,
        #[arg(long)]
        size: u64,
        #[arg(long, default_value = ".")]
        serve_dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PEER_PORT)]
        serve_port: u16,
    },
}

fn main() {
    if let Err(e) = run(Args::parse()) {
        eprintln!("Fatal: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let hostname = hostname::get()?.to_string_lossy().into_owned();
    let host_id = HostId::generate(&hostname);
    let host_ip = local_ip_for(args.server)?;

    let rdt = Rdt::new(host_id.clone())?;
    rdt.start_listener(args.listen_port)?;
    let session = ClientSession::new(host_id, host_ip, Arc::clone(&rdt));

    session.ident(args.server)?;

    match args.command {
        Command::Ident => {}
        Command::Share { dir, ext } => {
            let files = collect_shared_files(&dir, &ext)?;
            let n = session.share(args.server, files)?;
            println!("Shared {n} files with the server.");
        }
        Command::Query { substring, host } => {
            let n = session.query(args.server, &substring, host.as_deref())?;
            println!("{n} matches found.");
            for i in 0..session.query_result_count() {
                let (host_id, host_ip, filename, filesize) = session.query_result(i)?;
                println!("[{i}]: {filename}\nFilesize: {filesize}\tHost ID: {host_id}\tIP Address: {host_ip}");
            }
        }
        Command::Remove { filename, filesize } => {
            let n = session.remove(args.server, vec![(filename, filesize)])?;
            println!("Removed {n} entries from the server.");
        }
        Command::Exit => {
            session.exit(args.server)?;
        }
        Command::Get {
            peer,
            filename,
            size,
            serve_dir,
            serve_port,
        } => {
            fileshare::start_file_server(serve_port, serve_dir)?;
            let data = fileshare::download_file(peer, &filename, size)?;
            println!("Downloaded {} bytes for {filename:?}.", data.len());
        }
    }

    Ok(())
}

/// Determines the local IP this host should advertise to the directory
/// server by connecting a UDP socket toward it and reading back the
/// kernel-chosen source address; no packets are actually sent.
fn local_ip_for(server: SocketAddr) -> Result<String, Box<dyn std::error::Error>> {
    let probe = std::net::UdpSocket::bind("0.0.0.0:0")?;
    probe.connect(server)?;
    Ok(probe.local_addr()?.ip().to_string())
}

fn collect_shared_files(
    dir: &std::path::Path,
    ext: &str,
) -> Result<Vec<(String, u64)>, Box<dyn std::error::Error>> {
    let mut matches = Vec::new();
    collect_shared_files_into(dir, ext, &mut matches)?;
    Ok(matches)
}

fn collect_shared_files_into(
    dir: &std::path::Path,
    ext: &str,
    out: &mut Vec<(String, u64)>,
) -> Result<(), Box<dyn std::error::Error>> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_shared_files_into(&path, ext, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(ext) {
            let size = entry.metadata()?.len();
            out.push((path.to_string_lossy().into_owned(), size));
        }
    }
    Ok(())
}
