// Unix-domain-socket framing for the bus, so the player/ripper/commander
// binaries can run as separate OS processes and still speak the
// same Topic/Queue semantics across the process boundary. Each frame is
// length-prefixed (4-byte big-endian count of frames, then each frame as a
// 4-byte big-endian length + bytes): a multipart-message framing over a
// plain stream socket.

use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::thread;

use crossbeam_channel::Sender;

use super::Message;

pub fn write_message<W: Write>(w: &mut W, msg: &Message) -> io::Result<()> {
    w.write_all(&(msg.len() as u32).to_be_bytes())?;
    for part in msg {
        w.write_all(&(part.len() as u32).to_be_bytes())?;
        w.write_all(part)?;
    }
    w.flush()
}

pub fn read_message<R: Read>(r: &mut R) -> io::Result<Message> {
    let mut count_buf = [0u8; 4];
    r.read_exact(&mut count_buf)?;
    let count = u32::from_be_bytes(count_buf) as usize;

    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        let mut len_buf = [0u8; 4];
        r.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        r.read_exact(&mut buf)?;
        parts.push(buf);
    }
    Ok(parts)
}

/// Connects to a Unix socket and relays every message written to it to
/// `outgoing`'s peer. Used by senders of a `Queue` running in a different
/// process than the receiver.
pub fn connect_sender(path: impl AsRef<Path>) -> io::Result<UnixStream> {
    UnixStream::connect(path)
}

/// Binds a Unix socket and, for every accepted connection, spawns a thread
/// that forwards every framed message it reads into `into`. Used on the
/// receiving side of a `Queue`, or by a `Topic` subscriber process.
pub fn serve_into(path: impl AsRef<Path>, into: Sender<Message>) -> io::Result<()> {
    let path = path.as_ref();
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)?;

    thread::Builder::new()
        .name("bus-accept".into())
        .spawn(move || {
            for conn in listener.incoming().flatten() {
                let tx = into.clone();
                thread::spawn(move || forward_stream(conn, tx));
            }
        })
        .map_err(|e| io::Error::other(e.to_string()))?;
    Ok(())
}

fn forward_stream(mut stream: UnixStream, into: Sender<Message>) {
    loop {
        match read_message(&mut stream) {
            Ok(msg) => {
                if into.send(msg).is_err() {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_through_a_buffer() {
        let msg: Message = vec![b"player".to_vec(), b"state".to_vec(), b"{}".to_vec()];
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).unwrap();
        let decoded = read_message(&mut &buf[..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn socket_forwards_messages_to_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let (tx, rx) = crossbeam_channel::unbounded();
        serve_into(&path, tx).unwrap();

        // Give the accept thread a moment to bind before connecting.
        std::thread::sleep(std::time::Duration::from_millis(50));

        let mut client = connect_sender(&path).unwrap();
        let msg: Message = vec![b"commander".to_vec(), b"eject".to_vec()];
        write_message(&mut client, &msg).unwrap();

        let received = rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap();
        assert_eq!(received, msg);
    }
}
