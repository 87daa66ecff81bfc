use moltis_protocol::ConnectAuth;

/// Resolve authentication credentials from CLI arguments.
///
/// Priority: explicit API key > environment variable > no auth (local instances).
pub fn resolve_auth(api_key: Option<&str>) -> ConnectAuth {
    ConnectAuth {
        api_key: api_key.map(String::from),
        password: None,
        token: None,
    }
}
