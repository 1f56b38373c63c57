//! Request handlers.

pub mod domains;
pub mod host_conf;
pub mod signing_keys;

pub use domains::{
    create_domain_token, delete_domain, list_domains, read_domain, register_domain,
    update_domain_agent, update_domain_user,
};
pub use host_conf::host_conf;
pub use signing_keys::signing_keys;
