use serde_json::Value;

/// A JSON-RPC id as carried on the wire: string, integer, or absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    Str(String),
    Num(i64),
}

impl RequestId {
    pub fn as_value(&self) -> Value {
        match self {
            RequestId::Str(s) => Value::String(s.clone()),
            RequestId::Num(n) => Value::from(*n),
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Str(s) => write!(f, "{s}"),
            RequestId::Num(n) => write!(f, "{n}"),
        }
    }
}

/// Canonical lookup key a decoded or locally-generated id normalizes to.
///
/// Strings and numbers live in disjoint families so they never collide, and
/// unsigned/negative/float-valued-integer numeric ids that denote the same
/// value normalize to the same key (an outbound `42` matches a wire-decoded
/// `42.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKey {
    Str(String),
    Uint(u64),
    Int(i64),
    /// Non-integral numbers or ids that otherwise can't be normalized; used
    /// only for diagnostics, never matches a locally generated id.
    Raw(String),
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

/// Normalizes a decoded JSON id value into a canonical lookup key.
///
/// Total and side-effect free: every `Value` produces a key, including ids
/// this protocol would never generate locally (those land in `Raw`).
pub fn normalize(value: &Value) -> IdKey {
    if let Some(s) = value.as_str() {
        return IdKey::Str(s.to_string());
    }

    if let Some(n) = value.as_u64() {
        return IdKey::Uint(n);
    }

    if let Some(n) = value.as_i64() {
        return if n >= 0 {
            IdKey::Uint(n as u64)
        } else {
            IdKey::Int(n)
        };
    }

    if let Some(f) = value.as_f64() {
        if f.abs() < MAX_SAFE_INTEGER && f.fract() == 0.0 {
            return if f >= 0.0 {
                IdKey::Uint(f as u64)
            } else {
                IdKey::Int(f as i64)
            };
        }
        return IdKey::Raw(f.to_string());
    }

    IdKey::Raw(value.to_string())
}

/// Normalizes the key for a locally-generated, non-negative 64-bit request id.
pub fn key_for_local_id(id: &RequestId) -> IdKey {
    match id {
        RequestId::Str(s) => IdKey::Str(s.clone()),
        RequestId::Num(n) if *n >= 0 => IdKey::Uint(*n as u64),
        RequestId::Num(n) => IdKey::Int(*n),
    }
}
