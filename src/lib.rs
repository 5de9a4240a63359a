pub mod backend;
pub mod capture;
pub mod config;
pub mod error;
pub mod filter;
pub mod group;
pub mod headless;
pub mod logging;
pub mod packet;
pub mod session;
pub mod suggest;
pub mod tui;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use error::SessionError;
pub use session::Session;
