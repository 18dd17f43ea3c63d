//! TCP front end for the slab-arena cache engine: the ASCII wire
//! protocol, per-connection dispatch, process settings, and
//! observability — everything spec §1 carves out of the core and
//! leaves to "external collaborators".

pub mod metrics;
pub mod protocol;
pub mod server;
pub mod settings;

pub use metrics::Metrics;
pub use server::handle_connection;
pub use settings::Settings;
