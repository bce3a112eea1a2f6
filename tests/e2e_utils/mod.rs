#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod echo_server;
pub mod proxy_chain_fixture;

pub use echo_server::EchoServer;
pub use proxy_chain_fixture::{client_connector, ProxyChainFixture};
pub use tls_proxy::{ProxyBehavior, TestCert, TlsProxy};
