//! Peer file exchange: a small HTTP-like GET protocol over a reliable TCP
//! byte stream, used between clients once a `QUERY` has located a file.
//! One thread accepts connections, spawning one handler thread per
//! connection.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::thread;

use crate::error::FileShareError;

/// Default client peer-to-peer TCP port.
pub const DEFAULT_PEER_PORT: u16 = 50001;

const CHUNK_SIZE: usize = 1024;

/// Binds `port` and serves `GET <filename> HTTP/1.1\r\n\r\n` requests out of
/// `shared_dir`, one thread per connection, until the process exits.
pub fn start_file_server(port: u16, shared_dir: PathBuf) -> Result<(), FileShareError> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let dir = shared_dir.clone();
                    thread::spawn(move || {
                        if let Err(e) = serve_connection(stream, &dir) {
                            eprintln!("***file transfer failed: {e}");
                        }
                    });
                }
                Err(e) => eprintln!("***accept error: {e}"),
            }
        }
    });
    Ok(())
}

fn serve_connection(mut stream: TcpStream, shared_dir: &Path) -> Result<(), FileShareError> {
    let filename = read_get_request_line(&stream)?;
    let path = shared_dir.join(&filename);
    let mut file = File::open(&path)?;
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n])?;
    }
    Ok(())
}

/// Parses `"GET <filename> HTTP/1.1"`: everything strictly between the
/// first and last space on the line is the filename, which may itself
/// contain spaces.
fn read_get_request_line(stream: &TcpStream) -> Result<String, FileShareError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let line = line.trim_end_matches(['\r', '\n']);

    let first_space = line
        .find(' ')
        .ok_or_else(|| FileShareError::MalformedRequest(line.to_string()))?;
    let last_space = line
        .rfind(' ')
        .filter(|&i| i > first_space)
        .ok_or_else(|| FileShareError::MalformedRequest(line.to_string()))?;

    Ok(line[first_space + 1..last_space].to_string())
}

/// Dials `addr`, requests `filename`, and reads exactly `expected_size`
/// bytes in chunks of up to 1024. Any other byte count before EOF is a
/// short transfer.
pub fn download_file(
    addr: SocketAddr,
    filename: &str,
    expected_size: u64,
) -> Result<Vec<u8>, FileShareError> {
    let mut stream = TcpStream::connect(addr)?;
    let request = format!("GET {filename} HTTP/1.1\r\n\r\n");
    stream.write_all(request.as_bytes())?;

    let mut data = Vec::with_capacity(expected_size as usize);
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }

    if data.len() as u64 != expected_size {
        return Err(FileShareError::ShortTransfer {
            expected: expected_size,
            got: data.len() as u64,
        });
    }
    Ok(data)
}
