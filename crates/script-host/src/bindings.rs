//! Value marshaling between host records and script objects

use courier_protocol::{LoginEvent, MessageParams};
use rquickjs::{Ctx, Object, Value};

/// Message payload, resolved once at the script boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MessageBody {
    /// Plain text, including numbers rendered as decimal
    Text(String),
    /// An object payload, serialized to JSON
    Json(String),
}

impl MessageBody {
    pub(crate) fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) | Self::Json(s) => s.as_bytes(),
        }
    }
}

/// Read an unsigned integer field; absent or wrong-typed values read as 0
pub(crate) fn get_uint(obj: &Object<'_>, key: &str) -> u32 {
    obj.get::<_, Option<f64>>(key)
        .ok()
        .flatten()
        .map(|v| v as u32)
        .unwrap_or(0)
}

pub(crate) fn get_uint64(obj: &Object<'_>, key: &str) -> u64 {
    obj.get::<_, Option<f64>>(key)
        .ok()
        .flatten()
        .map(|v| v as u64)
        .unwrap_or(0)
}

/// Read a string field; absent, null, or non-string values read as `None`
pub(crate) fn get_string(obj: &Object<'_>, key: &str) -> Option<String> {
    obj.get::<_, Option<rquickjs::String>>(key)
        .ok()
        .flatten()
        .and_then(|s| s.to_string().ok())
}

/// Build the script-side view of message parameters
pub(crate) fn params_to_object<'js>(
    ctx: &Ctx<'js>,
    p: &MessageParams,
) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;
    obj.set("aid", p.aid)?;
    obj.set("id", p.id)?;
    obj.set("refid", p.refid)?;
    obj.set("groupid", p.groupid)?;
    obj.set("flags", p.flags)?;
    obj.set("type", p.kind)?;
    obj.set("expiry", p.expiry)?;
    obj.set("status", p.status)?;
    obj.set("toOnline", p.to_online)?;
    if let Some(to) = &p.to {
        obj.set("to", to.as_str())?;
    }
    if let Some(from) = &p.from {
        obj.set("from", from.as_str())?;
    }
    Ok(obj)
}

/// Parameters plus the message body, as `courier.onmessage` receives them
pub(crate) fn message_to_object<'js>(
    ctx: &Ctx<'js>,
    p: &MessageParams,
    body: &[u8],
) -> rquickjs::Result<Object<'js>> {
    let obj = params_to_object(ctx, p)?;
    obj.set("message", String::from_utf8_lossy(body).into_owned())?;
    Ok(obj)
}

pub(crate) fn login_to_object<'js>(
    ctx: &Ctx<'js>,
    event: &LoginEvent,
) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;
    obj.set("address", event.address.as_str())?;
    obj.set("online", event.online)?;
    obj.set("flags", event.flags)?;
    Ok(obj)
}

/// Read message parameters back out of a script object. Absent fields read
/// as zero / `None`; validation of required fields happens at the send site.
pub(crate) fn params_from_object(obj: &Object<'_>) -> MessageParams {
    MessageParams {
        aid: get_uint(obj, "aid"),
        id: get_uint(obj, "id"),
        refid: get_uint(obj, "refid"),
        groupid: get_uint(obj, "groupid"),
        flags: get_uint(obj, "flags"),
        kind: get_uint(obj, "type"),
        expiry: get_uint(obj, "expiry"),
        status: get_uint(obj, "status"),
        to_online: get_uint(obj, "toOnline"),
        to: get_string(obj, "to"),
        from: get_string(obj, "from"),
    }
}

/// Resolve a script value into a sendable message body.
///
/// Strings pass through, numbers render as decimal text, plain objects are
/// JSON-serialized. Typed arrays are refused; raw byte payloads have no
/// place on this path.
pub(crate) fn body_from_value<'js>(
    ctx: &Ctx<'js>,
    value: &Value<'js>,
) -> Result<MessageBody, String> {
    if let Some(s) = value.as_string() {
        return s
            .to_string()
            .map(MessageBody::Text)
            .map_err(|e| e.to_string());
    }
    if let Some(i) = value.as_int() {
        return Ok(MessageBody::Text(i.to_string()));
    }
    if let Some(n) = value.as_number() {
        if n.fract() == 0.0 {
            return Ok(MessageBody::Text(format!("{}", n as i64)));
        }
        return Ok(MessageBody::Text(n.to_string()));
    }
    if let Some(obj) = value.as_object() {
        // Typed array instances expose BYTES_PER_ELEMENT via their prototype
        let typed = obj
            .get::<_, Option<f64>>("BYTES_PER_ELEMENT")
            .ok()
            .flatten();
        if typed.is_some() {
            return Err("typed-array payloads are not supported".into());
        }
        return match ctx.json_stringify(value.clone()) {
            Ok(Some(s)) => s
                .to_string()
                .map(MessageBody::Json)
                .map_err(|e| e.to_string()),
            Ok(None) => Err("payload is not JSON-serializable".into()),
            Err(e) => Err(e.to_string()),
        };
    }
    Err(format!(
        "unsupported message payload of type {:?}",
        value.type_of()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    fn with_ctx(f: impl FnOnce(&Ctx<'_>)) {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| f(&ctx));
    }

    #[test]
    fn params_roundtrip_identity() {
        let params = MessageParams {
            aid: 3,
            id: 1001,
            refid: 7,
            groupid: 12,
            flags: 0xb,
            kind: 2,
            expiry: 3600,
            status: 0,
            to_online: 1,
            to: Some("bob".into()),
            from: Some("alice".into()),
        };
        with_ctx(|ctx| {
            let obj = params_to_object(ctx, &params).unwrap();
            assert_eq!(params_from_object(&obj), params);
        });
    }

    #[test]
    fn absent_fields_read_as_defaults() {
        with_ctx(|ctx| {
            let obj = Object::new(ctx.clone()).unwrap();
            let params = params_from_object(&obj);
            assert_eq!(params, MessageParams::default());
        });
    }

    #[test]
    fn message_object_carries_body_text() {
        with_ctx(|ctx| {
            let params = MessageParams::default();
            let obj = message_to_object(ctx, &params, b"hello").unwrap();
            assert_eq!(get_string(&obj, "message").as_deref(), Some("hello"));
        });
    }

    #[test]
    fn body_string_passes_through() {
        with_ctx(|ctx| {
            let v = ctx.eval::<Value, _>("'hi'").unwrap();
            assert_eq!(
                body_from_value(ctx, &v).unwrap(),
                MessageBody::Text("hi".into())
            );
        });
    }

    #[test]
    fn body_integer_renders_decimal() {
        with_ctx(|ctx| {
            let v = ctx.eval::<Value, _>("42").unwrap();
            assert_eq!(
                body_from_value(ctx, &v).unwrap(),
                MessageBody::Text("42".into())
            );
        });
    }

    #[test]
    fn body_object_serializes_to_json() {
        with_ctx(|ctx| {
            let v = ctx.eval::<Value, _>("({a: 1})").unwrap();
            assert_eq!(
                body_from_value(ctx, &v).unwrap(),
                MessageBody::Json("{\"a\":1}".into())
            );
        });
    }

    #[test]
    fn body_typed_array_rejected() {
        with_ctx(|ctx| {
            let v = ctx.eval::<Value, _>("new Uint8Array(4)").unwrap();
            assert!(body_from_value(ctx, &v).is_err());
        });
    }

    #[test]
    fn login_object_fields() {
        with_ctx(|ctx| {
            let event = LoginEvent {
                address: "carol".into(),
                online: true,
                flags: 4,
            };
            let obj = login_to_object(ctx, &event).unwrap();
            assert_eq!(get_string(&obj, "address").as_deref(), Some("carol"));
            assert_eq!(obj.get::<_, bool>("online").unwrap(), true);
            assert_eq!(get_uint(&obj, "flags"), 4);
        });
    }
}
