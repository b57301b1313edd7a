// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection URL construction.

use url::Url;

use tether_core::TetherError;

/// Turn the configured endpoint into the socket URL.
///
/// `http`/`https` become `ws`/`wss`; `ws`/`wss` pass through. A non-empty
/// `token` is appended as the `token` query parameter.
pub fn build_connection_url(endpoint: &str, token: Option<&str>) -> Result<String, TetherError> {
    let mut url = Url::parse(endpoint).map_err(|e| {
        TetherError::Config(format!("invalid transport endpoint `{endpoint}`: {e}"))
    })?;

    let socket_scheme = match url.scheme() {
        "http" => Some("ws"),
        "https" => Some("wss"),
        "ws" | "wss" => None,
        other => {
            return Err(TetherError::Config(format!(
                "unsupported transport endpoint scheme `{other}`"
            )));
        }
    };
    if let Some(scheme) = socket_scheme {
        url.set_scheme(scheme).map_err(|()| {
            TetherError::Config(format!("cannot use `{scheme}` for endpoint `{endpoint}`"))
        })?;
    }

    if let Some(token) = token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair("token", token);
    }

    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_http_schemes() {
        assert_eq!(
            build_connection_url("http://localhost:8080/ws", None).unwrap(),
            "ws://localhost:8080/ws"
        );
        assert_eq!(
            build_connection_url("https://api.example.com/rt", None).unwrap(),
            "wss://api.example.com/rt"
        );
        assert_eq!(
            build_connection_url("wss://api.example.com/rt", None).unwrap(),
            "wss://api.example.com/rt"
        );
    }

    #[test]
    fn appends_encoded_token() {
        assert_eq!(
            build_connection_url("https://api.example.com/rt?v=2", Some("a b&c")).unwrap(),
            "wss://api.example.com/rt?v=2&token=a+b%26c"
        );
    }

    #[test]
    fn empty_token_is_ignored() {
        assert_eq!(
            build_connection_url("http://h/ws", Some("")).unwrap(),
            "ws://h/ws"
        );
    }

    #[test]
    fn rejects_bad_endpoints() {
        assert!(matches!(
            build_connection_url("ftp://h/ws", None),
            Err(TetherError::Config(_))
        ));
        assert!(matches!(
            build_connection_url("::nope", None),
            Err(TetherError::Config(_))
        ));
    }
}
