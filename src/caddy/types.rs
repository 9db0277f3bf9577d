// ABOUTME: Wire types for the Caddy admin API.
// ABOUTME: Routes, matcher sets, and the tagged handler union.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The full admin configuration document.
///
/// Only the HTTP app is interpreted; everything else round-trips untouched
/// as raw JSON so reconciliation never clobbers apps it does not own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub apps: BTreeMap<String, Value>,

    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

/// The "http" app within the admin configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpApp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_port: Option<u16>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub servers: BTreeMap<String, Server>,

    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

/// A single HTTP server within the app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listen: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

/// A routing rule: matchers plus handlers, optionally terminal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,

    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matcher_sets: Vec<MatcherSet>,

    #[serde(rename = "handle", default, skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<Handler>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub terminal: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One matcher set; host and path conditions are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatcherSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

/// A route handler, discriminated by the "handler" field on the wire.
///
/// Handlers installed by users that this engine does not understand are
/// preserved verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Handler {
    Known(KnownHandler),
    Unknown(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
pub enum KnownHandler {
    ReverseProxy {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        upstreams: Vec<Upstream>,
    },
    StaticResponse {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        body: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        status_code: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dial: String,
}

impl Handler {
    pub fn reverse_proxy(upstreams: Vec<Upstream>) -> Self {
        Handler::Known(KnownHandler::ReverseProxy { upstreams })
    }

    pub fn static_response(body: &str, status_code: &str) -> Self {
        Handler::Known(KnownHandler::StaticResponse {
            body: body.to_string(),
            status_code: status_code.to_string(),
        })
    }
}
