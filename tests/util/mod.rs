//! Local servers for the integration tests.

use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::thread;

use crossbeam_channel::{unbounded, Receiver};
use tiny_http::{Response, Server};

/// What the server saw of one request
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub peer: Option<SocketAddr>,
}

impl Captured {
    #[allow(unused)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP server that answers every request with `status`. Every request it handles is sent to the
/// returned receiver.
pub fn test_server(status: u16) -> (SocketAddr, Receiver<Captured>) {
    let server = Server::http("127.0.0.1:0").expect("failed to bind test server");
    let addr = server
        .server_addr()
        .to_ip()
        .expect("test server is not listening on an ip address");
    let (sender, receiver) = unbounded();

    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).ok();

            let captured = Captured {
                method: request.method().to_string(),
                url: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|h| (h.field.to_string(), h.value.as_str().to_string()))
                    .collect(),
                body,
                peer: request.remote_addr().copied(),
            };

            // report before answering, so the client never finishes ahead of the capture
            sender.send(captured).ok();
            request.respond(Response::empty(status)).ok();
        }
    });

    (addr, receiver)
}

/// TCP server that accepts connections and never says anything back. The peer address of every
/// accepted connection is sent to the returned receiver.
#[allow(unused)]
pub fn silent_server() -> (SocketAddr, Receiver<SocketAddr>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind silent server");
    let addr = listener.local_addr().expect("silent server has no address");
    let (sender, receiver) = unbounded();

    thread::spawn(move || {
        // hold on to every connection so none of them get closed
        let mut held = vec![];
        for stream in listener.incoming().flatten() {
            if let Ok(peer) = stream.peer_addr() {
                sender.send(peer).ok();
            }
            held.push(stream);
        }
    });

    (addr, receiver)
}

#[allow(unused)]
pub fn url(addr: SocketAddr) -> String {
    format!("http://{}/load", addr)
}
