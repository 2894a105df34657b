use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use url::Url;

use crate::services::billing_calendar::MonthKey;

type HmacSha256 = Hmac<Sha256>;

/// Identity of a tenant-facing statement link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingToken {
    pub tenant_id: i64,
    pub rent_unit_id: i64,
    pub statement_id: String,
}

impl TrackingToken {
    fn signing_input(&self) -> String {
        format!("{}:{}:{}", self.tenant_id, self.rent_unit_id, self.statement_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderLinks {
    pub click_url: String,
    pub pixel_url: String,
}

/// Builds signed click-through and open-pixel URLs for reminder payloads.
#[derive(Debug, Clone)]
pub struct TrackingLinks {
    secret: String,
    api_base_url: String,
    landing_url: String,
}

/// Statement identifier for one billing period of a unit, e.g. `12:2024-03`.
pub fn statement_id(rent_unit_id: i64, period: MonthKey) -> String {
    format!("{rent_unit_id}:{period}")
}

/// Billing period embedded in a statement identifier.
pub fn statement_period(statement_id: &str) -> Option<&str> {
    statement_id.split_once(':').map(|(_, period)| period)
}

pub fn sign(secret: &str, token: &TrackingToken) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(token.signing_input().as_bytes());
    hex_encode(&mac.finalize().into_bytes())
}

/// Constant-time signature check.
pub fn verify(secret: &str, token: &TrackingToken, signature_hex: &str) -> bool {
    let Ok(expected) = hex_decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(token.signing_input().as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Only same-origin redirects into the tenant app are honored.
pub fn is_allowed_redirect(target: &str, app_public_url: &str) -> bool {
    let (Ok(target), Ok(app)) = (Url::parse(target), Url::parse(app_public_url)) else {
        return false;
    };
    target.scheme() == app.scheme()
        && target.host_str() == app.host_str()
        && target.port_or_known_default() == app.port_or_known_default()
}

impl TrackingLinks {
    pub fn new(secret: &str, api_base_url: &str, app_public_url: &str) -> Self {
        Self {
            secret: secret.to_string(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            landing_url: format!("{}/tenant/payments", app_public_url.trim_end_matches('/')),
        }
    }

    pub fn for_token(&self, token: &TrackingToken) -> Option<ReminderLinks> {
        let signature = sign(&self.secret, token);
        let click_url = self.signed_url("track/click", token, &signature, true)?;
        let pixel_url = self.signed_url("track/open.gif", token, &signature, false)?;
        Some(ReminderLinks {
            click_url,
            pixel_url,
        })
    }

    fn signed_url(
        &self,
        path: &str,
        token: &TrackingToken,
        signature: &str,
        with_landing: bool,
    ) -> Option<String> {
        let mut url = Url::parse(&format!("{}/{path}", self.api_base_url)).ok()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("tenant_id", &token.tenant_id.to_string())
                .append_pair("rent_unit_id", &token.rent_unit_id.to_string())
                .append_pair("statement_id", &token.statement_id)
                .append_pair("sig", signature);
            if with_landing {
                query.append_pair("to", &self.landing_url);
            }
        }
        Some(url.into())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::{
        is_allowed_redirect, sign, statement_id, statement_period, verify, TrackingLinks,
        TrackingToken,
    };
    use crate::services::billing_calendar::MonthKey;

    fn token() -> TrackingToken {
        TrackingToken {
            tenant_id: 5,
            rent_unit_id: 12,
            statement_id: "12:2024-03".to_string(),
        }
    }

    #[test]
    fn signatures_verify_and_reject_tampering() {
        let signature = sign("s3cret", &token());
        assert_eq!(signature.len(), 64);
        assert!(verify("s3cret", &token(), &signature));
        assert!(!verify("other", &token(), &signature));

        let tampered = TrackingToken {
            tenant_id: 6,
            ..token()
        };
        assert!(!verify("s3cret", &tampered, &signature));
        assert!(!verify("s3cret", &token(), "zz"));
        assert!(!verify("s3cret", &token(), ""));
    }

    #[test]
    fn statement_ids_carry_the_period() {
        let period = MonthKey::parse("2024-03").expect("valid month");
        let id = statement_id(12, period);
        assert_eq!(id, "12:2024-03");
        assert_eq!(statement_period(&id), Some("2024-03"));
        assert_eq!(statement_period("legacy"), None);
    }

    #[test]
    fn redirects_are_limited_to_app_origin() {
        let app = "https://app.example.com";
        assert!(is_allowed_redirect("https://app.example.com/tenant/payments", app));
        assert!(!is_allowed_redirect("https://evil.example.com/", app));
        assert!(!is_allowed_redirect("http://app.example.com/", app));
        assert!(!is_allowed_redirect("javascript:alert(1)", app));
        assert!(!is_allowed_redirect("/relative", app));
    }

    #[test]
    fn links_embed_signed_query() {
        let links = TrackingLinks::new("s3cret", "https://api.example.com/v1/", "https://app.example.com")
            .for_token(&token())
            .expect("links build");

        let click = Url::parse(&links.click_url).expect("valid url");
        assert_eq!(click.path(), "/v1/track/click");
        let pairs = click.query_pairs().into_owned().collect::<Vec<_>>();
        assert!(pairs.contains(&("statement_id".to_string(), "12:2024-03".to_string())));
        assert!(pairs.contains(&(
            "to".to_string(),
            "https://app.example.com/tenant/payments".to_string()
        )));
        let sig = pairs
            .iter()
            .find(|(key, _)| key == "sig")
            .map(|(_, value)| value.clone())
            .expect("signature present");
        assert!(verify("s3cret", &token(), &sig));

        let pixel = Url::parse(&links.pixel_url).expect("valid url");
        assert_eq!(pixel.path(), "/v1/track/open.gif");
        assert!(pixel.query_pairs().all(|(key, _)| key != "to"));
    }
}
