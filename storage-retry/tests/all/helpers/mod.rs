
pub use simple_server::SimpleServer;
