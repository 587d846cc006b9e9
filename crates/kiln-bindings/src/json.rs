//! `json.encode` / `json.decode`

use kiln_sdk::BridgeResult;

use crate::args::{arg, check_str, opt_bool};
use crate::config::JsonConfig;
use crate::convert::{from_document, to_document_limited};
use crate::document::{decode, encode, Format};
use crate::namespace::Namespace;

/// Add `encode(value [, pretty])` and `decode(text)` to `ns`
pub fn register(ns: Namespace, config: &JsonConfig) -> BridgeResult<Namespace> {
    let default_pretty = config.pretty;
    let max_depth = config.max_depth;
    Ok(ns
        .function("encode", move |ctx, args| {
            let node = to_document_limited(ctx, arg(args, 0), max_depth)?;
            let format = if opt_bool(args, 1).unwrap_or(default_pretty) {
                Format::Pretty
            } else {
                Format::Compact
            };
            Ok(encode(&node, format)?.into())
        })
        .function("decode", |ctx, args| {
            let node = decode(check_str(args, 0, "decode")?)?;
            from_document(ctx, &node)
        }))
}
