//! Caller identity for rate limiting.
//!
//! Authenticated callers are counted per user. Everyone else is counted per
//! socket peer address. `X-Forwarded-For` replaces the peer only when the
//! peer is a configured trusted proxy.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;

use crate::middleware::auth::{authenticate, bearer_token};
use crate::state::AppState;

/// Who is asking, plus the user agent they presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub key: String,
    pub user_agent: Option<String>,
}

impl ClientIdentity {
    fn resolve(parts: &Parts, jwt_secret: &str, trusted_proxies: &[IpAddr]) -> Self {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(token) = bearer_token(parts)
            && let Ok(user) = authenticate(token, jwt_secret)
        {
            return Self {
                key: format!("user:{}", user.user_id),
                user_agent,
            };
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let key = match peer {
            Some(peer) if trusted_proxies.contains(&peer) => match forwarded_client(parts) {
                Some(ip) => format!("ip:{}", ip),
                None => format!("ip:{}", peer),
            },
            Some(peer) => format!("ip:{}", peer),
            None => "ip:unknown".to_string(),
        };

        Self { key, user_agent }
    }
}

/// Original client named by the first `X-Forwarded-For` hop.
fn forwarded_client(parts: &Parts) -> Option<IpAddr> {
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
}

impl FromRequestParts<AppState> for ClientIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Infallible> {
        Ok(Self::resolve(
            parts,
            &state.config.jwt_secret,
            &state.config.trusted_proxies,
        ))
    }
}
