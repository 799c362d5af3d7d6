//! Principal headers forwarded by the front-end, and their optional HMAC
//! signature.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use docspace::Principal;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const HEADER_USER: &str = "x-docspace-user";
pub const HEADER_LEVEL: &str = "x-docspace-level";
pub const HEADER_SESSION: &str = "x-docspace-session";
pub const HEADER_TIMESTAMP: &str = "x-docspace-timestamp";
pub const HEADER_SIGNATURE: &str = "x-docspace-signature";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    secret: Arc<Vec<u8>>,
    max_skew: Duration,
}

impl AuthConfig {
    pub fn new(secret: impl AsRef<[u8]>, max_skew: Duration) -> Self {
        Self {
            secret: Arc::new(secret.as_ref().to_vec()),
            max_skew,
        }
    }

    pub fn max_skew(&self) -> Duration {
        self.max_skew
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

/// Who is calling, and from which session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub principal: Principal,
    pub session: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing auth header: {0}")]
    MissingHeader(&'static str),
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("timestamp skew too large")]
    Skew,
}

/// Read the principal headers. `Ok(None)` when no user is named at all.
pub fn read_caller(headers: &HeaderMap) -> Result<Option<Caller>, AuthError> {
    let Some(user) = headers.get(HEADER_USER) else {
        return Ok(None);
    };
    let user_id = user
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or(AuthError::InvalidHeader(HEADER_USER))?;
    let level = required_header(headers, HEADER_LEVEL)?
        .trim()
        .parse::<u32>()
        .map_err(|_| AuthError::InvalidHeader(HEADER_LEVEL))?;
    let session = required_header(headers, HEADER_SESSION)?.trim();
    if session.is_empty() {
        return Err(AuthError::InvalidHeader(HEADER_SESSION));
    }

    Ok(Some(Caller {
        principal: Principal { user_id, level },
        session: session.to_string(),
    }))
}

/// Check the signature over `timestamp.user.level.session`.
pub fn verify_caller(headers: &HeaderMap, caller: &Caller, auth: &AuthConfig) -> Result<(), AuthError> {
    let ts = required_header(headers, HEADER_TIMESTAMP)?;
    let sig = required_header(headers, HEADER_SIGNATURE)?;
    check_freshness(ts, unix_now(), auth.max_skew())?;

    let signature = hex::decode(sig).map_err(|_| AuthError::InvalidSignature)?;
    let mut mac = principal_mac(auth.secret())?;
    mac.update(signing_message(ts, caller).as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| AuthError::InvalidSignature)
}

/// The exact bytes a front-end signs.
pub fn signing_message(timestamp: &str, caller: &Caller) -> String {
    format!(
        "{}.{}.{}.{}",
        timestamp, caller.principal.user_id, caller.principal.level, caller.session
    )
}

/// Hex HMAC-SHA256 of `message`, as a front-end would send it.
pub fn sign_message(secret: &[u8], message: &[u8]) -> Result<String, AuthError> {
    let mut mac = principal_mac(secret)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn principal_mac(secret: &[u8]) -> Result<Hmac<Sha256>, AuthError> {
    Hmac::<Sha256>::new_from_slice(secret).map_err(|_| AuthError::InvalidSignature)
}

fn required_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, AuthError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingHeader(name))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Timestamps are unsigned Unix seconds within `max_skew` of `now`, in
/// either direction.
fn check_freshness(ts: &str, now: u64, max_skew: Duration) -> Result<(), AuthError> {
    let timestamp = ts
        .trim()
        .parse::<u64>()
        .map_err(|_| AuthError::InvalidHeader(HEADER_TIMESTAMP))?;
    if timestamp.abs_diff(now) > max_skew.as_secs() {
        return Err(AuthError::Skew);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn now() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .to_string()
    }

    #[test]
    fn test_absent_user_is_anonymous() {
        assert_eq!(read_caller(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn test_read_caller() {
        let map = headers(&[(HEADER_USER, "17"), (HEADER_LEVEL, "3"), (HEADER_SESSION, "abc")]);
        let caller = read_caller(&map).unwrap().unwrap();
        assert_eq!(caller.principal, Principal { user_id: 17, level: 3 });
        assert_eq!(caller.session, "abc");

        let map = headers(&[(HEADER_USER, "x"), (HEADER_LEVEL, "3"), (HEADER_SESSION, "abc")]);
        assert!(matches!(read_caller(&map), Err(AuthError::InvalidHeader(HEADER_USER))));

        let map = headers(&[(HEADER_USER, "17"), (HEADER_LEVEL, "3")]);
        assert!(matches!(read_caller(&map), Err(AuthError::MissingHeader(HEADER_SESSION))));
    }

    #[test]
    fn test_signature_round_trip() {
        let auth = AuthConfig::new(b"secret", Duration::from_secs(60));
        let ts = now();
        let map = headers(&[(HEADER_USER, "17"), (HEADER_LEVEL, "2"), (HEADER_SESSION, "s1")]);
        let caller = read_caller(&map).unwrap().unwrap();
        let sig = sign_message(b"secret", signing_message(&ts, &caller).as_bytes()).unwrap();

        let mut signed = map.clone();
        signed.insert(HEADER_TIMESTAMP, HeaderValue::from_str(&ts).unwrap());
        signed.insert(HEADER_SIGNATURE, HeaderValue::from_str(&sig).unwrap());
        assert!(verify_caller(&signed, &caller, &auth).is_ok());

        // A raised level no longer matches the signature.
        let forged = Caller {
            principal: Principal { user_id: 17, level: 9 },
            ..caller
        };
        assert!(matches!(
            verify_caller(&signed, &forged, &auth),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let auth = AuthConfig::new(b"secret", Duration::from_secs(60));
        let caller = Caller {
            principal: Principal { user_id: 1, level: 2 },
            session: "s".into(),
        };
        let ts = "1000";
        let sig = sign_message(b"secret", signing_message(ts, &caller).as_bytes()).unwrap();
        let map = headers(&[(HEADER_TIMESTAMP, ts), (HEADER_SIGNATURE, sig.as_str())]);

        assert!(matches!(verify_caller(&map, &caller, &auth), Err(AuthError::Skew)));
    }

    #[test]
    fn test_freshness_window() {
        let skew = Duration::from_secs(60);
        assert!(check_freshness("1000", 1060, skew).is_ok());
        assert!(check_freshness("1120", 1060, skew).is_ok());
        assert!(matches!(check_freshness("999", 1060, skew), Err(AuthError::Skew)));
        assert!(matches!(
            check_freshness("-5", 1060, skew),
            Err(AuthError::InvalidHeader(HEADER_TIMESTAMP))
        ));
        // Far-future values saturate instead of wrapping into range.
        assert!(matches!(
            check_freshness(&u64::MAX.to_string(), 1060, skew),
            Err(AuthError::Skew)
        ));
    }
}
