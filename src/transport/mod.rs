//! UDP transport.

mod socket;

pub use socket::SudpSocket;
