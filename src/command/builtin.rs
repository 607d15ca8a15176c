//! The default commands.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use super::{Command, Invocation, Reply};
use crate::config::ReplOptions;
use crate::error::ReplError;
use crate::host::Host;
use crate::value::{self, build_path, deep_merge, reach};

static SET_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+)\s+(\S+)").expect("set pattern is valid"));

static ALIAS_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+)\s+(.+)").expect("alias pattern is valid"));

static LOG_MATCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*match\s+(.*)").expect("log pattern is valid"));

const REPL_OPTIONS_PREFIX: &str = "repl";

/// Commands every session starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Hello,
    Get,
    Set,
    Depth,
    Plain,
    Quit,
    List,
    Find,
    Prior,
    History,
    Log,
    Alias,
    Trace,
    Help,
    Delegate,
}

impl Builtin {
    pub const ALL: [Builtin; 15] = [
        Builtin::Hello,
        Builtin::Get,
        Builtin::Set,
        Builtin::Depth,
        Builtin::Plain,
        Builtin::Quit,
        Builtin::List,
        Builtin::Find,
        Builtin::Prior,
        Builtin::History,
        Builtin::Log,
        Builtin::Alias,
        Builtin::Trace,
        Builtin::Help,
        Builtin::Delegate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Hello => "hello",
            Builtin::Get => "get",
            Builtin::Set => "set",
            Builtin::Depth => "depth",
            Builtin::Plain => "plain",
            Builtin::Quit => "quit",
            Builtin::List => "list",
            Builtin::Find => "find",
            Builtin::Prior => "prior",
            Builtin::History => "history",
            Builtin::Log => "log",
            Builtin::Alias => "alias",
            Builtin::Trace => "trace",
            Builtin::Help => "help",
            Builtin::Delegate => "delegate",
        }
    }
}

#[async_trait]
impl Command for Builtin {
    fn usage(&self) -> &str {
        match self {
            Builtin::Hello => "hello: host identity, version and time",
            Builtin::Get => "get <path>: read an option",
            Builtin::Set => "set <path> <value>: merge an option",
            Builtin::Depth => "depth <n>: set inspection depth",
            Builtin::Plain => "plain: toggle plain JSON output",
            Builtin::Quit => "quit: end the session",
            Builtin::List => "list [plugins | <pattern>]: list plugins or matching patterns",
            Builtin::Find => "find <pattern>: describe the matching action",
            Builtin::Prior => "prior <pattern>: the action's prior definitions",
            Builtin::History => "history: commands entered so far",
            Builtin::Log => "log [match <text>]: toggle log capture",
            Builtin::Alias => "alias <name> <command>: define an alias",
            Builtin::Trace => "trace: toggle act tracing",
            Builtin::Help => "help: this list",
            Builtin::Delegate => {
                "delegate [list | create <name> [fields] | use <name>]: manage delegates"
            }
        }
    }

    async fn invoke(&self, call: Invocation<'_>) {
        debug!("Builtin {} {:?}", self.name(), call.args);
        match self {
            Builtin::Hello => hello(call),
            Builtin::Get => get(call),
            Builtin::Set => set(call),
            Builtin::Depth => depth(call),
            Builtin::Plain => {
                call.context.plain = !call.context.plain;
                call.respond.ok(Reply::Empty);
            }
            Builtin::Quit => call.context.request_close(),
            Builtin::List => list(call),
            Builtin::Find => find(call),
            Builtin::Prior => prior(call),
            Builtin::History => {
                let text = call.context.history().join("\n");
                call.respond.ok(Reply::Text(text));
            }
            Builtin::Log => log(call),
            Builtin::Alias => alias(call),
            Builtin::Trace => {
                call.context.trace = !call.context.trace;
                call.respond.ok(Reply::Empty);
            }
            Builtin::Help => help(call),
            Builtin::Delegate => delegate(call),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn hello(call: Invocation<'_>) {
    let identity = call.host.identity();
    let out = json!({
        "version": identity.version,
        "id": identity.id,
        "when": now_millis(),
        "address": call.context.address(),
    });
    call.respond.ok(Reply::Text(out.to_string()));
}

fn get(call: Invocation<'_>) {
    let options = call.host.options();
    let out = reach(&options, call.args.trim()).cloned();
    call.respond.ok(Reply::from(out));
}

fn set(call: Invocation<'_>) {
    let Some(caps) = SET_ARGS.captures(call.args) else {
        return call
            .respond
            .error(ReplError::CommandArgument("set <path> <value>".into()));
    };
    let path = &caps[1];

    let value = match value::parse_value(&caps[2]) {
        Ok(value) => value,
        Err(e) => return call.respond.error(format!("ERROR: {}", e)),
    };
    let Some(patch) = build_path(path, value) else {
        return call
            .respond
            .error(ReplError::CommandArgument("set <path> <value>".into()));
    };

    let repl_patch = patch.get(REPL_OPTIONS_PREFIX).cloned();
    call.host.set_options(patch);

    if let Some(repl_patch) = repl_patch {
        match merge_repl_options(call.options, repl_patch) {
            Ok(()) => {
                call.context.depth = call.options.depth;
                call.context.trace = call.options.trace;
                call.context
                    .aliases
                    .extend(call.options.alias.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Err(e) => return call.respond.error(format!("ERROR: {}", e)),
        }
    }

    call.respond.ok(Reply::Empty);
}

fn merge_repl_options(options: &mut ReplOptions, patch: Value) -> Result<(), serde_json::Error> {
    let mut merged = serde_json::to_value(&*options)?;
    deep_merge(&mut merged, patch);
    *options = serde_json::from_value(merged)?;
    Ok(())
}

fn depth(call: Invocation<'_>) {
    let depth = call.args.trim().parse::<usize>().ok();
    call.context.depth = depth;
    let shown = depth.map_or_else(|| "null".to_string(), |d| d.to_string());
    call.respond
        .ok(Reply::Text(format!("Inspection depth set to {}", shown)));
}

/// Parse narrowing text; anything but an object is an argument error.
fn narrow(args: &str, usage: &str) -> Result<Value, String> {
    match value::parse(args) {
        Ok(narrow @ Value::Object(_)) => Ok(narrow),
        Ok(_) => Err(ReplError::CommandArgument(usage.to_string()).to_string()),
        Err(e) => Err(format!("ERROR: {}", e)),
    }
}

fn list(call: Invocation<'_>) {
    let mut tokens = call.args.split_whitespace();
    if tokens.next() == Some("plugins") && tokens.next().is_none() {
        return list_plugins(call.host.as_ref(), call.respond);
    }
    list_patterns(call.host.as_ref(), call.args, call.respond);
}

fn list_plugins(host: &dyn Host, respond: super::Respond) {
    respond.ok(Reply::Value(json!(host.plugins())));
}

fn list_patterns(host: &dyn Host, args: &str, respond: super::Respond) {
    let result = narrow(args, "list <pattern>").map(|narrow| Reply::Value(json!(host.list(&narrow))));
    respond.result(result);
}

fn find(call: Invocation<'_>) {
    let host = call.host;
    call.respond.result(
        narrow(call.args, "find <pattern>")
            .map(|narrow| Reply::from(host.find(&narrow).map(|info| info.to_value()))),
    );
}

fn prior(call: Invocation<'_>) {
    let host = call.host;
    call.respond.result(narrow(call.args, "prior <pattern>").map(|narrow| {
        Reply::from(host.find(&narrow).map(|info| {
            let chain: Vec<Value> = info.chain().iter().map(|a| a.to_value()).collect();
            Value::Array(chain)
        }))
    }));
}

fn log(call: Invocation<'_>) {
    let context = call.context;
    context.log_capture = !context.log_capture;
    if !context.log_capture {
        context.log_match = None;
    }
    if let Some(caps) = LOG_MATCH.captures(call.args) {
        context.log_capture = true;
        context.log_match = Some(caps[1].trim_end().to_string());
    }
    call.respond.ok(Reply::Empty);
}

fn alias(call: Invocation<'_>) {
    if call.args.trim().is_empty() {
        return call.respond.ok(Reply::Value(json!(call.context.aliases)));
    }
    let Some(caps) = ALIAS_ARGS.captures(call.args) else {
        return call
            .respond
            .error(ReplError::CommandArgument("alias <name> <command>".into()));
    };
    call.context
        .aliases
        .insert(caps[1].to_string(), caps[2].trim_end().to_string());
    call.respond.ok(Reply::Empty);
}

fn help(call: Invocation<'_>) {
    let lines: Vec<String> = call
        .commands
        .iter()
        .map(|(name, command)| {
            let usage = command.usage();
            if usage.starts_with(name) {
                usage.to_string()
            } else {
                format!("{}: {}", name, usage)
            }
        })
        .collect();
    call.respond.ok(Reply::Text(lines.join("\n")));
}

fn delegate(call: Invocation<'_>) {
    let context = call.context;
    let mut parts = call.args.trim().splitn(3, char::is_whitespace);
    let result = match (parts.next().filter(|s| !s.is_empty()), parts.next()) {
        (None, _) => Ok(Reply::Text(context.delegate_name().to_string())),
        (Some("list"), None) => Ok(Reply::Value(json!(context.delegate_names()))),
        (Some("create"), Some(name)) => {
            let fields = parts.next().unwrap_or("");
            narrow(fields, "delegate create <name> [fields]").and_then(|fixed| {
                let Value::Object(fixed) = fixed else {
                    return Ok(Reply::Empty);
                };
                context.create_delegate(name, fixed).map(|()| Reply::Empty)
            })
        }
        (Some("use"), Some(name)) => context.use_delegate(name).map(|()| Reply::Empty),
        _ => Err(ReplError::CommandArgument(
            "delegate [list | create <name> [fields] | use <name>]".into(),
        )
        .to_string()),
    };
    call.respond.result(result);
}
