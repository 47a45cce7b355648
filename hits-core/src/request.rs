use {
    std::borrow::Cow,
    http::Uri,
};

pub const QUERY_PARAM_SEQUENCE: &str = "sequence";

/// Counter request, reduced to the only input the handler reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterRequest {
    sequence: Option<String>,
}

impl CounterRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = Some(sequence.into());
        self
    }

    pub fn from_uri(uri: &Uri) -> Self {
        Self::from_query(uri.query())
    }

    /// When the parameter is repeated, the first occurrence wins.
    pub fn from_query(query: Option<&str>) -> Self {
        Self {
            sequence: query.and_then(|query| first_query_param(query, QUERY_PARAM_SEQUENCE)),
        }
    }

    /// Sequence name, or `None` if it is absent or blank.
    pub fn sequence(&self) -> Option<&str> {
        self.sequence.as_deref().filter(|v| !v.trim().is_empty())
    }
}

fn first_query_param(query: &str, name: &str) -> Option<String> {
    query.split('&')
        .filter(|pair| !pair.is_empty())
        .find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if decode_component(key) == name {
                Some(decode_component(value).into_owned())
            } else {
                None
            }
        })
}

fn decode_component(v: &str) -> Cow<'_, str> {
    if !v.contains('+') && !v.contains('%') {
        return Cow::Borrowed(v);
    }

    // malformed escapes are kept as is, invalid utf-8 becomes U+FFFD
    let v = v.replace('+', " ");
    Cow::Owned(String::from_utf8_lossy(&urlencoding::decode_binary(v.as_bytes())).into_owned())
}
