//! Provider response normalization
//!
//! The pairing provider's endpoints answer with inconsistent JSON: a
//! bare object or a one-element array, fields at the top level or
//! nested under `result`/`instance`, several spellings per field, QR
//! payloads with or without a `data:` prefix. Everything raw is
//! canonicalized here; the rest of the system only ever sees
//! [`PairingCode`] and [`StatusPayload`].
//!
//! These functions never fail on shape: a payload with nothing usable
//! yields `None`/an empty [`StatusPayload`], so the polling loop can
//! treat a malformed response as "not yet ready" and keep going.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::connection::model::{ChannelProfile, PairingCode, StatusPayload};

/// Keys that may hold the QR image payload.
const IMAGE_KEYS: &[&str] = &["base64", "qrcode", "qr", "image"];

/// Keys that may hold the human-typable pairing code.
const PAIRING_TEXT_KEYS: &[&str] = &["pairingCode", "pairing_code", "code"];

/// Keys that may hold the provider-assigned instance identifier.
const INSTANCE_ID_KEYS: &[&str] = &["instanceId", "instance_id", "id", "instanceName", "name"];

/// Status strings that count as an established session.
const CONNECTED_STATES: &[&str] = &["open", "connected", "ready", "active"];

/// Extract a renderable pairing code from a fetch-pairing payload.
pub fn normalize_pairing(
    raw: &Value,
    issued_at: DateTime<Utc>,
    lifetime: std::time::Duration,
) -> Option<PairingCode> {
    let root = unwrap_element(raw);
    let image = containers(root)
        .into_iter()
        .find_map(|c| IMAGE_KEYS.iter().find_map(|k| image_string(c, k)))?;

    let pairing_text = containers(root).into_iter().find_map(|c| {
        PAIRING_TEXT_KEYS
            .iter()
            .find_map(|k| non_empty_str(c, k).map(str::to_string))
    });

    Some(PairingCode::issue(image, pairing_text, issued_at, lifetime))
}

/// Canonicalize a status-check payload.
///
/// The connected predicate, checked in priority order:
/// 1. a boolean `connected` flag;
/// 2. a `status`/`state` string (top level or under `instance`)
///    matching `{open, connected, ready, active}` case-insensitively;
/// 3. any non-empty profile field — some provider responses omit an
///    explicit status and embed profile data only once paired.
pub fn normalize_status(raw: &Value) -> StatusPayload {
    let root = unwrap_element(raw);
    let profile = containers(root).into_iter().find_map(extract_profile);
    let state = containers(root).into_iter().find_map(|c| {
        non_empty_str(c, "status")
            .or_else(|| non_empty_str(c, "state"))
            .map(str::to_string)
    });

    let connected = match containers(root)
        .into_iter()
        .find_map(|c| c.get("connected").and_then(Value::as_bool))
    {
        Some(flag) => flag,
        None => match &state {
            Some(s) => CONNECTED_STATES.contains(&s.to_ascii_lowercase().as_str()),
            None => profile.is_some(),
        },
    };

    StatusPayload {
        connected,
        state,
        profile,
    }
}

/// Pull the provider-assigned instance identifier out of a create
/// payload, if one is present.
pub fn extract_instance_id(raw: &Value) -> Option<String> {
    let root = unwrap_element(raw);
    containers(root).into_iter().find_map(|c| {
        INSTANCE_ID_KEYS
            .iter()
            .find_map(|k| non_empty_str(c, k).map(str::to_string))
    })
}

/// One-element arrays unwrap to their first element.
fn unwrap_element(raw: &Value) -> &Value {
    match raw {
        Value::Array(items) => items.first().unwrap_or(raw),
        _ => raw,
    }
}

/// Candidate objects to probe: the root, then known sub-objects.
fn containers(root: &Value) -> Vec<&Value> {
    let mut found = vec![root];
    for key in ["result", "instance", "qrcode"] {
        if let Some(nested) = root.get(key).filter(|v| v.is_object()) {
            found.push(nested);
        }
    }
    found
}

fn non_empty_str<'a>(container: &'a Value, key: &str) -> Option<&'a str> {
    container
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Accept pre-prefixed data URLs as-is; raw payloads must decode as
/// base64 before being wrapped into a renderable URL.
fn image_string(container: &Value, key: &str) -> Option<String> {
    let raw = non_empty_str(container, key)?;
    if raw.starts_with("data:image/") {
        return Some(raw.to_string());
    }
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if BASE64.decode(&compact).is_err() {
        return None;
    }
    Some(format!("data:image/png;base64,{compact}"))
}

fn extract_profile(container: &Value) -> Option<ChannelProfile> {
    let profile_name = non_empty_str(container, "profileName")
        .or_else(|| non_empty_str(container, "profile_name"))
        .or_else(|| non_empty_str(container, "pushName"))
        .map(str::to_string);
    let phone = non_empty_str(container, "owner")
        .or_else(|| non_empty_str(container, "contact"))
        .or_else(|| non_empty_str(container, "phone"))
        .map(strip_jid);
    let avatar_url = non_empty_str(container, "profilePictureUrl")
        .or_else(|| non_empty_str(container, "profile_picture_url"))
        .map(str::to_string);

    let profile = ChannelProfile {
        profile_name,
        phone,
        avatar_url,
    };
    if profile.is_empty() {
        None
    } else {
        Some(profile)
    }
}

/// `owner` often arrives as a JID like `5511999990000@s.whatsapp.net`.
fn strip_jid(raw: &str) -> String {
    raw.split('@').next().unwrap_or(raw).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LIFETIME: std::time::Duration = std::time::Duration::from_secs(60);

    // "QUJD" = base64("ABC")
    #[test]
    fn pairing_from_raw_base64() {
        let raw = json!({ "base64": "QUJD" });
        let code = normalize_pairing(&raw, Utc::now(), LIFETIME).unwrap();
        assert_eq!(code.image, "data:image/png;base64,QUJD");
        assert_eq!(code.pairing_text, None);
    }

    #[test]
    fn pairing_keeps_existing_data_url() {
        let raw = json!({ "qrcode": "data:image/png;base64,QUJD" });
        let code = normalize_pairing(&raw, Utc::now(), LIFETIME).unwrap();
        assert_eq!(code.image, "data:image/png;base64,QUJD");
    }

    #[test]
    fn pairing_found_in_nested_qrcode_object() {
        let raw = json!({ "qrcode": { "base64": "QUJD", "pairingCode": "ABCD-1234" } });
        let code = normalize_pairing(&raw, Utc::now(), LIFETIME).unwrap();
        assert_eq!(code.image, "data:image/png;base64,QUJD");
        assert_eq!(code.pairing_text.as_deref(), Some("ABCD-1234"));
    }

    #[test]
    fn pairing_unwraps_one_element_arrays() {
        let raw = json!([{ "result": { "qr": "QUJD" } }]);
        assert!(normalize_pairing(&raw, Utc::now(), LIFETIME).is_some());
    }

    #[test]
    fn pairing_rejects_garbage_base64() {
        let raw = json!({ "base64": "not valid base64!!!" });
        assert!(normalize_pairing(&raw, Utc::now(), LIFETIME).is_none());
    }

    #[test]
    fn pairing_missing_fields_yields_none() {
        assert!(normalize_pairing(&json!({}), Utc::now(), LIFETIME).is_none());
        assert!(normalize_pairing(&json!(null), Utc::now(), LIFETIME).is_none());
        assert!(normalize_pairing(&json!([]), Utc::now(), LIFETIME).is_none());
    }

    #[test]
    fn status_boolean_flag_wins() {
        let payload = normalize_status(&json!({ "connected": true }));
        assert!(payload.connected);

        // An explicit false flag overrides a connected-looking state.
        let payload = normalize_status(&json!({ "connected": false, "state": "open" }));
        assert!(!payload.connected);
    }

    #[test]
    fn status_string_shapes_all_connect() {
        for raw in [
            json!({ "status": "open" }),
            json!({ "state": "CONNECTED" }),
            json!([{ "state": "ready" }]),
            json!({ "instance": { "status": "Active" } }),
        ] {
            let payload = normalize_status(&raw);
            assert!(payload.connected, "expected connected for {raw}");
        }
    }

    #[test]
    fn status_profile_only_shape_connects() {
        let raw = json!({
            "instance": {
                "owner": "5511999990000@s.whatsapp.net",
                "profileName": "Ana",
                "profilePictureUrl": "https://cdn.example/ana.jpg"
            }
        });
        let payload = normalize_status(&raw);
        assert!(payload.connected);

        let profile = payload.profile.unwrap();
        assert_eq!(profile.phone.as_deref(), Some("5511999990000"));
        assert_eq!(profile.profile_name.as_deref(), Some("Ana"));
        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://cdn.example/ana.jpg")
        );
    }

    #[test]
    fn status_pending_state_is_not_connected() {
        for raw in [
            json!({ "state": "connecting" }),
            json!({ "status": "close" }),
            json!({}),
            json!(null),
            json!({ "instance": { "state": "qrcode" } }),
        ] {
            let payload = normalize_status(&raw);
            assert!(!payload.connected, "expected not connected for {raw}");
        }
    }

    #[test]
    fn status_explicit_state_beats_profile_presence() {
        // A profile echo while the session is still closing must not
        // read as connected.
        let raw = json!({ "state": "close", "profileName": "Ana" });
        assert!(!normalize_status(&raw).connected);
    }

    #[test]
    fn instance_id_spellings() {
        for (raw, want) in [
            (json!({ "instanceId": "abc-1" }), "abc-1"),
            (json!({ "instance": { "instanceId": "abc-2" } }), "abc-2"),
            (json!([{ "id": "abc-3" }]), "abc-3"),
            (json!({ "instance": { "instanceName": "sales" } }), "sales"),
        ] {
            assert_eq!(extract_instance_id(&raw).as_deref(), Some(want));
        }
        assert_eq!(extract_instance_id(&json!({})), None);
    }
}
