//! gatewatch-dashboard — Operator dashboard for the access-control feed.
//!
//! Hosts the live overlay render loop, the recognition event channel, the
//! dashboard shell and the face-registration client. The `gatewatch` CLI
//! reuses the channel and registration modules.

pub mod app;
pub mod channel;
pub mod config;
pub mod console;
pub mod registration;
pub mod render_loop;
pub mod shell;

pub use channel::{Backoff, ChannelSignal, ConnectionState};
pub use config::{Config, ConfigError};
pub use registration::{AddPersonRequest, HttpRegistrar, Registrar, RegistrationError};
pub use shell::{DashboardShell, DialogSource, StatusView};
