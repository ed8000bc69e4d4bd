use std::ffi::{OsStr, OsString};

use crate::context::{LaunchContext, Platform};

/// Engine argument vector: `argv0`, injected flags, then the user's own arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedArgs {
    tokens: Vec<OsString>,
    user_start: usize,
}

impl NormalizedArgs {
    pub fn tokens(&self) -> &[OsString] {
        &self.tokens
    }

    pub fn program(&self) -> &OsStr {
        &self.tokens[0]
    }

    /// Everything after `argv0`, as forwarded to the engine.
    pub fn engine_args(&self) -> &[OsString] {
        &self.tokens[1..]
    }

    /// The caller's original arguments, untouched.
    pub fn user_args(&self) -> &[OsString] {
        &self.tokens[self.user_start..]
    }
}

/// `bundle_win64`, `bundle_win32`, `bundle_mac`, otherwise `bundle_<os>`.
pub fn dist_type(platform: Platform, bitness: u32) -> String {
    match platform {
        Platform::Windows => format!("bundle_win{bitness}"),
        other => format!("bundle_{}", other.name()),
    }
}

/// Prepend the canonical flags after `argv0`.
///
/// User arguments stay last: the engine takes the last occurrence of a
/// repeated flag, so anything the user passed overrides what is injected here.
pub fn normalize_args(raw: &[OsString], ctx: &LaunchContext, open_browser: bool) -> NormalizedArgs {
    let (program, user) = match raw.split_first() {
        Some((program, rest)) => (program.clone(), rest),
        None => (ctx.executable.clone().into_os_string(), &[][..]),
    };

    let mut tokens = Vec::with_capacity(raw.len() + 5);
    tokens.push(program);
    if open_browser {
        tokens.push("--open_browser".into());
        tokens.push("default_browser".into());
    }
    tokens.push("--dist_type".into());
    tokens.push(dist_type(ctx.platform, ctx.bitness).into());

    let user_start = tokens.len();
    tokens.extend(user.iter().cloned());

    NormalizedArgs { tokens, user_start }
}
