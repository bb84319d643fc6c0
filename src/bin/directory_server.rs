//! Thin, non-interactive directory-server binary. Truncates the index and
//! serves forever, logging dispatch activity to the console. An
//! interactive operator shell (`query`/`status`/`reset`/`quit`) is a
//! separate concern, not implemented here.

use clap::Parser;
use filedir::host::HostId;
use filedir::rdt::Rdt;
use filedir::server::DirectoryServer;
use std::process;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "directory-server", about = "P2P file directory server")]
struct Args {
    /// UDP port to listen on for client messages.
    #[arg(long, default_value_t = 50001)]
    port: u16,
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
    let rdt = Rdt::new(host_id)?;
    rdt.start_listener(args.port)?;

    let server = Arc::new(DirectoryServer::new(Arc::clone(&rdt)));
    println!("Directory server listening on UDP port {}.", args.port);
    loop {
        if let Err(e) = server.tick() {
            eprintln!("Unexpected error: {e}");
        }
    }
}
