pub use index_configuration::*;
pub use network::*;
pub use resolver_version::*;
pub use trusted_host::*;
pub use verbosity::*;

mod index_configuration;
mod network;
mod resolver_version;
mod trusted_host;
mod verbosity;
