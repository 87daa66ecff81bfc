pub mod callback_server;
mod config_dir;
pub mod defaults;
pub mod device_flow;
pub mod discovery;
pub mod error;
pub mod flow;
pub mod kimi;
pub mod pkce;
pub mod registration_store;
pub mod storage;
pub mod types;

pub use {
    callback_server::CallbackServer,
    defaults::{callback_port, load_oauth_config},
    device_flow::DeviceCodeResponse,
    discovery::{
        AuthorizationServerMetadata, ClientRegistrationResponse, ProtectedResourceMetadata,
        fetch_as_metadata, fetch_resource_metadata, parse_www_authenticate, register_client,
    },
    flow::OAuthFlow,
    kimi::kimi_headers,
    registration_store::{RegistrationStore, StoredRegistration},
    storage::TokenStore,
    types::{OAuthConfig, OAuthTokens, PkceChallenge, serialize_option_secret, serialize_secret},
};

pub use error::{Error, Result};
