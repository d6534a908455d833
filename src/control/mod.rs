mod client;
mod socket;

pub use client::ControlClient;
pub use socket::{
    bind_socket, list_sockets, read_frame, socket_path, write_frame, ControlServer, SocketGuard,
};
