//! Strict URL parsing.

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Exception, Function, Object};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::{BuiltinModule, ModuleEnv};

/// Malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid URL: {input}")]
pub struct UrlError {
    /// The rejected input
    pub input: String,
}

/// Components of a parsed absolute URL, rendered the way browsers expose
/// them: `protocol` keeps its `:`, non-empty `search` and `hash` keep their
/// `?`/`#`, and default ports render empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUrl {
    /// Scheme with its trailing `:`
    pub protocol: String,
    /// Host without port
    pub hostname: String,
    /// Explicit non-default port, or empty
    pub port: String,
    /// Path, always starting with `/` for hierarchical URLs
    pub pathname: String,
    /// `?query`, or empty
    pub search: String,
    /// `#fragment`, or empty
    pub hash: String,
}

fn prefixed(prefix: char, part: Option<&str>) -> String {
    match part {
        Some(part) if !part.is_empty() => format!("{}{}", prefix, part),
        _ => String::new(),
    }
}

/// Parse an absolute URL. Relative or malformed input is an error, never a
/// partial result.
pub fn parse_url(input: &str) -> Result<ParsedUrl, UrlError> {
    let url = Url::parse(input).map_err(|_| UrlError {
        input: input.to_string(),
    })?;
    Ok(ParsedUrl {
        protocol: format!("{}:", url.scheme()),
        hostname: url.host_str().unwrap_or_default().to_string(),
        port: url.port().map(|p| p.to_string()).unwrap_or_default(),
        pathname: url.path().to_string(),
        search: prefixed('?', url.query()),
        hash: prefixed('#', url.fragment()),
    })
}

/// The `url` module.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlModule;

impl BuiltinModule for UrlModule {
    fn name(&self) -> &'static str {
        "url"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["parse"]
    }

    fn instantiate<'js>(&self, ctx: &Ctx<'js>, _env: &ModuleEnv) -> rquickjs::Result<Object<'js>> {
        let module = Object::new(ctx.clone())?;
        let parse = Function::new(ctx.clone(), |ctx: Ctx<'js>, input: Coerced<String>| {
            let parsed = parse_url(&input.0).map_err(|e| Exception::throw_message(&ctx, &e.to_string()))?;
            let object = Object::new(ctx.clone())?;
            object.set("protocol", parsed.protocol)?;
            object.set("hostname", parsed.hostname)?;
            object.set("port", parsed.port)?;
            object.set("pathname", parsed.pathname)?;
            object.set("search", parsed.search)?;
            object.set("hash", parsed.hash)?;
            rquickjs::Result::Ok(object)
        })?;
        module.set("parse", parse.with_name("parse")?)?;
        Ok(module)
    }
}
