use std::collections::HashMap;

use rand::seq::SliceRandom;
use tracing::warn;

use crate::models::embed::Embed;

/// Expansion passes allowed over one command body. Backstop against macro
/// output that keeps introducing new calls.
const MAX_PASSES: usize = 100;

const DEFAULT_EMBED_COLOR: i64 = 0x808080;

/// Everything a macro function may read about the message that triggered the
/// command.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Whitespace-split arguments after the command name.
    pub args: Vec<String>,
    /// Message content after prefix and command name.
    pub raw_text: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author_id: String,
    pub author_username: String,
    /// The dispatch payload as received, for functions that need more.
    pub raw_event: serde_json::Value,
}

/// Response being accumulated while a command body expands.
#[derive(Debug)]
pub struct ResponseState {
    pub embed: Embed,
    pub has_embed: bool,
}

impl ResponseState {
    pub fn new() -> Self {
        Self {
            embed: Embed {
                color: Some(DEFAULT_EMBED_COLOR),
                ..Embed::default()
            },
            has_embed: false,
        }
    }
}

impl Default for ResponseState {
    fn default() -> Self {
        Self::new()
    }
}

pub type MacroFn = fn(&[String], &ExecutionContext, &mut ResponseState) -> String;

/// Named macro functions available to command bodies. Owned by the caller and
/// passed in wherever expansion happens; nothing here is process-global, so
/// independent client instances can carry different registries.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, MacroFn>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("randomText", random_text);
        registry.register("title", title);
        registry.register("description", description);
        registry.register("color", color);
        registry
    }

    /// Names are case-insensitive.
    pub fn register(&mut self, name: &str, function: MacroFn) {
        self.functions.insert(name.to_lowercase(), function);
    }

    pub fn get(&self, name: &str) -> Option<MacroFn> {
        self.functions.get(&name.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Final result of expanding a command body. An embed, plain content, or
/// nothing worth sending.
#[derive(Debug)]
pub struct CommandResponse {
    pub content: Option<String>,
    pub embed: Option<Embed>,
}

impl CommandResponse {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.embed.is_none()
    }
}

/// Expand a command body against a message context.
pub fn execute(
    code: &str,
    ctx: &ExecutionContext,
    registry: &FunctionRegistry,
) -> CommandResponse {
    let mut state = ResponseState::new();
    let expanded = process_text(code, ctx, &mut state, registry);
    let content = expanded.trim();

    if state.has_embed {
        CommandResponse {
            content: None,
            embed: Some(state.embed),
        }
    } else if content.is_empty() {
        CommandResponse {
            content: None,
            embed: None,
        }
    } else {
        CommandResponse {
            content: Some(content.to_string()),
            embed: None,
        }
    }
}

/// Expand every `$name[...]` call in `text`, innermost arguments first.
pub fn process_text(
    text: &str,
    ctx: &ExecutionContext,
    state: &mut ResponseState,
    registry: &FunctionRegistry,
) -> String {
    let mut result = text.to_string();

    for _ in 0..MAX_PASSES {
        if !result.contains('$') {
            break;
        }
        let Some(call) = find_call(&result) else {
            // A literal `$` with no function call after it.
            break;
        };

        let args: Vec<String> = split_args(&result[call.args_start..call.args_end])
            .iter()
            .map(|arg| process_text(arg, ctx, state, registry))
            .collect();

        let expanded = match registry.get(&call.name) {
            Some(function) => function(&args, ctx, state),
            None => {
                warn!("unknown function: ${}", call.name);
                String::new()
            }
        };

        let mut next = String::with_capacity(result.len() + expanded.len());
        next.push_str(&result[..call.start]);
        next.push_str(&expanded);
        next.push_str(&result[call.after..]);
        result = next;
    }

    result
}

struct Call {
    name: String,
    start: usize,
    args_start: usize,
    args_end: usize,
    after: usize,
}

/// Locate the first `$name[` in `text` and its matching closing bracket.
/// Scanning is byte-wise; every delimiter is ASCII, so the offsets always
/// land on character boundaries.
fn find_call(text: &str) -> Option<Call> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        let name_start = i + 1;
        let mut j = name_start;
        while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
            j += 1;
        }
        let named = j > name_start
            && (bytes[name_start].is_ascii_alphabetic() || bytes[name_start] == b'_');
        if !named || j >= bytes.len() || bytes[j] != b'[' {
            i += 1;
            continue;
        }

        let mut depth = 1u32;
        let mut k = j + 1;
        while k < bytes.len() && depth > 0 {
            match bytes[k] {
                b'[' => depth += 1,
                b']' => depth -= 1,
                _ => {}
            }
            k += 1;
        }
        // An unclosed call swallows the rest of the text as its argument.
        let args_end = if depth == 0 { k - 1 } else { bytes.len() };
        return Some(Call {
            name: text[name_start..j].to_string(),
            start: i,
            args_start: j + 1,
            args_end,
            after: k,
        });
    }
    None
}

/// Split an argument list on `;`, ignoring separators inside nested `[...]`.
fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0u32;

    for c in text.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ';' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }

    args
}

// Built-in functions.

/// `$randomText[a;b;...]` — one of the arguments at random.
fn random_text(args: &[String], _ctx: &ExecutionContext, _state: &mut ResponseState) -> String {
    if args.len() < 2 {
        warn!("$randomText requires at least 2 arguments");
        return args.first().cloned().unwrap_or_default();
    }
    args.choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_default()
}

/// `$title[text]` — sets the embed title.
fn title(args: &[String], _ctx: &ExecutionContext, state: &mut ResponseState) -> String {
    match args.first().filter(|a| !a.is_empty()) {
        Some(text) => {
            state.embed.title = Some(text.clone());
            state.has_embed = true;
        }
        None => warn!("$title requires 1 argument"),
    }
    String::new()
}

/// `$description[text]` — sets the embed description.
fn description(args: &[String], _ctx: &ExecutionContext, state: &mut ResponseState) -> String {
    match args.first().filter(|a| !a.is_empty()) {
        Some(text) => {
            state.embed.description = Some(text.clone());
            state.has_embed = true;
        }
        None => warn!("$description requires 1 argument"),
    }
    String::new()
}

/// `$color[#hex;#hex;...]` — sets the embed color, picking at random when
/// several valid colors are given.
fn color(args: &[String], _ctx: &ExecutionContext, state: &mut ResponseState) -> String {
    let colors: Vec<i64> = args
        .iter()
        .filter_map(|a| a.strip_prefix('#'))
        .filter_map(|hex| i64::from_str_radix(hex, 16).ok())
        .collect();

    match colors.choose(&mut rand::thread_rng()) {
        Some(value) => state.embed.color = Some(*value),
        None => warn!("$color requires valid hex colors starting with #"),
    }
    String::new()
}
