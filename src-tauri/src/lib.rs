pub mod agent_client;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod greeting;
pub mod interaction;
pub mod logging;
pub mod notifications;
pub mod pet;
pub mod timers;
pub mod window;

#[cfg(feature = "desktop")]
mod desktop;

#[cfg(feature = "desktop")]
pub use desktop::run;
