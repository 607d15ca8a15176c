//! In-process host: pattern-matched actions, options, entities and events.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::{ActMeta, ActionInfo, Canon, EntityOp, Host, HostError, HostEvent, Identity, Pattern};
use crate::value::{deep_merge, Map};

/// An action handler.
pub type ActionFn =
    Arc<dyn Fn(Value, ActMeta) -> BoxFuture<'static, Result<Value, HostError>> + Send + Sync>;

/// Work run once when the host closes.
pub type CloseHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

const EVENT_CAPACITY: usize = 1024;

struct ActionDef {
    id: String,
    pattern: Pattern,
    plugin: String,
    handler: ActionFn,
    prior: Option<Arc<ActionDef>>,
}

impl ActionDef {
    fn info(&self) -> ActionInfo {
        ActionInfo {
            id: self.id.clone(),
            pattern: self.pattern.to_string(),
            plugin: self.plugin.clone(),
            prior: self.prior.as_ref().map(|p| Box::new(p.info())),
        }
    }
}

#[derive(Default)]
struct ActStats {
    calls: AtomicU64,
    done: AtomicU64,
    fails: AtomicU64,
    by_pattern: Mutex<BTreeMap<String, u64>>,
}

impl ActStats {
    fn record(&self, pattern: &str) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut map = self.by_pattern.lock().unwrap_or_else(|e| e.into_inner());
        *map.entry(pattern.to_string()).or_default() += 1;
    }

    fn to_value(&self, start: u64, summary: bool) -> Value {
        let mut out = json!({
            "start": start,
            "now": now_millis(),
            "act": {
                "calls": self.calls.load(Ordering::Relaxed),
                "done": self.done.load(Ordering::Relaxed),
                "fails": self.fails.load(Ordering::Relaxed),
            },
        });
        if !summary {
            let map = self.by_pattern.lock().unwrap_or_else(|e| e.into_inner());
            out["actmap"] = json!(*map);
        }
        out
    }
}

#[derive(Default)]
struct EntityStore {
    tables: HashMap<String, Vec<Map>>,
    next_id: u64,
}

impl EntityStore {
    fn apply(&mut self, op: EntityOp, canon: &Canon, query: Value) -> Result<Value, HostError> {
        let key = canon.to_string();
        match op {
            EntityOp::Save => {
                let Value::Object(data) = query else {
                    return Err(HostError::new(
                        "entity_invalid",
                        format!("save$ on {} expects an object", key),
                    ));
                };
                let id = data.get("id").and_then(id_text);
                let table = self.tables.entry(key).or_default();

                if let Some(existing) = id
                    .as_deref()
                    .and_then(|id| table.iter_mut().find(|e| has_id(e, id)))
                {
                    let mut merged = Value::Object(std::mem::take(existing));
                    deep_merge(&mut merged, Value::Object(data));
                    if let Value::Object(map) = merged {
                        *existing = map;
                    }
                    return Ok(Value::Object(existing.clone()));
                }

                let id = match id {
                    Some(id) => id,
                    None => {
                        self.next_id += 1;
                        self.next_id.to_string()
                    }
                };
                let mut entity = Map::new();
                entity.insert("id".to_string(), Value::String(id));
                entity.extend(data.into_iter().filter(|(k, _)| k != "id"));
                table.push(entity.clone());
                Ok(Value::Object(entity))
            }
            EntityOp::Load => {
                let table = self.tables.get(&key).map(Vec::as_slice).unwrap_or(&[]);
                Ok(table
                    .iter()
                    .find(|e| selects(e, &query))
                    .cloned()
                    .map(Value::Object)
                    .unwrap_or(Value::Null))
            }
            EntityOp::List => {
                let table = self.tables.get(&key).map(Vec::as_slice).unwrap_or(&[]);
                Ok(Value::Array(
                    table
                        .iter()
                        .filter(|e| selects(e, &query))
                        .cloned()
                        .map(Value::Object)
                        .collect(),
                ))
            }
            EntityOp::Remove => {
                let Some(table) = self.tables.get_mut(&key) else {
                    return Ok(Value::Null);
                };
                match table.iter().position(|e| selects(e, &query)) {
                    Some(i) => Ok(Value::Object(table.remove(i))),
                    None => Ok(Value::Null),
                }
            }
        }
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn has_id(entity: &Map, id: &str) -> bool {
    entity.get("id").and_then(id_text).as_deref() == Some(id)
}

/// Whether `query` selects `entity`: a bare id, or an object whose fields
/// (other than `$`-suffixed directives) all match.
fn selects(entity: &Map, query: &Value) -> bool {
    match query {
        Value::Null => true,
        Value::String(_) | Value::Number(_) => {
            id_text(query).is_some_and(|id| has_id(entity, &id))
        }
        Value::Object(fields) => fields
            .iter()
            .filter(|(k, _)| !k.ends_with('$'))
            .all(|(k, v)| match k.as_str() {
                "id" => id_text(v).is_some_and(|id| has_id(entity, &id)),
                _ => entity.get(k) == Some(v),
            }),
        _ => false,
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A self-contained host running in the same process as the REPL.
pub struct LocalHost {
    identity: Identity,
    start: u64,
    actions: RwLock<BTreeMap<Pattern, Arc<ActionDef>>>,
    plugins: RwLock<Vec<String>>,
    options: RwLock<Value>,
    entities: Mutex<EntityStore>,
    stats: Arc<ActStats>,
    events: broadcast::Sender<HostEvent>,
    close_hooks: Mutex<Vec<CloseHook>>,
    closed: AtomicBool,
    next_act: AtomicU64,
    next_action: AtomicU64,
}

impl LocalHost {
    /// Create a host with the given options tree and the built-in actions.
    pub fn new(options: Value) -> Arc<Self> {
        let start = now_millis();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let host = Arc::new(Self {
            identity: Identity {
                id: format!("{:x}/{}", start, std::process::id()),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            start,
            actions: RwLock::new(BTreeMap::new()),
            plugins: RwLock::new(Vec::new()),
            options: RwLock::new(if options.is_object() { options } else { json!({}) }),
            entities: Mutex::new(EntityStore::default()),
            stats: Arc::new(ActStats::default()),
            events,
            close_hooks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            next_act: AtomicU64::new(0),
            next_action: AtomicU64::new(0),
        });
        host.install_builtins();
        host
    }

    fn install_builtins(&self) {
        self.register_plugin("root");

        let echo = self.add("sys:repl,echo:true", "root", |msg, _meta| async move { Ok(msg) });

        let stats = Arc::clone(&self.stats);
        let start = self.start;
        let stats = self.add("role:seneca,stats:true", "root", move |msg, _meta| {
            let summary = !matches!(msg.get("summary"), Some(Value::Bool(false)))
                && msg.get("summary").and_then(Value::as_str) != Some("false");
            let out = stats.to_value(start, summary);
            async move { Ok(out) }
        });

        for result in [echo, stats] {
            if let Err(e) = result {
                error!("Failed to install built-in action: {}", e);
            }
        }
    }

    /// Register an action under `pattern`; an existing action with the same
    /// pattern becomes its prior. Returns the new action id.
    pub fn add<F, Fut>(&self, pattern: &str, plugin: &str, handler: F) -> Result<String, HostError>
    where
        F: Fn(Value, ActMeta) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HostError>> + Send + 'static,
    {
        let pattern = Pattern::parse(pattern)?;
        let handler: ActionFn = Arc::new(move |msg, meta| handler(msg, meta).boxed());
        let id = format!(
            "{}/{}",
            plugin,
            self.next_action.fetch_add(1, Ordering::Relaxed)
        );

        let mut actions = self.actions.write().unwrap_or_else(|e| e.into_inner());
        let prior = actions.get(&pattern).cloned();
        debug!("Adding action {} for {}", id, pattern);
        actions.insert(
            pattern.clone(),
            Arc::new(ActionDef {
                id: id.clone(),
                pattern,
                plugin: plugin.to_string(),
                handler,
                prior,
            }),
        );
        Ok(id)
    }

    /// Record a plugin name for `list plugins`.
    pub fn register_plugin(&self, name: &str) {
        let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
        if !plugins.iter().any(|p| p == name) {
            plugins.push(name.to_string());
        }
    }

    /// Run `hook` when the host closes.
    pub fn on_close(&self, hook: CloseHook) {
        self.close_hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(hook);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn resolve(&self, message: &Value) -> Option<Arc<ActionDef>> {
        let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
        actions
            .iter()
            .filter(|(pattern, _)| pattern.matches(message))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, def)| Arc::clone(def))
    }

    fn emit(&self, event: HostEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Host for LocalHost {
    fn identity(&self) -> Identity {
        self.identity.clone()
    }

    async fn act(&self, message: Value, meta: ActMeta) -> Result<Value, HostError> {
        if self.is_closed() {
            return Err(HostError::new("closed", "host is closed"));
        }

        let Some(def) = self.resolve(&message) else {
            return Err(HostError::new(
                "act_not_found",
                format!("No matching action pattern found for {}", message),
            ));
        };

        let act_id = format!("{:x}", self.next_act.fetch_add(1, Ordering::Relaxed));
        let pattern = def.pattern.to_string();
        self.stats.record(&pattern);

        self.emit(HostEvent::ActIn {
            act_id: act_id.clone(),
            session: meta.session.clone(),
            pattern: pattern.clone(),
            action_id: def.id.clone(),
            message: message.clone(),
        });

        let session = meta.session.clone();
        let result = (def.handler)(message, meta).await;

        match &result {
            Ok(out) => {
                self.stats.done.fetch_add(1, Ordering::Relaxed);
                self.emit(HostEvent::ActOut {
                    act_id: act_id.clone(),
                    session: session.clone(),
                    result: out.clone(),
                });
                self.log(session.as_deref(), &format!("act {} OUT {}", act_id, pattern));
            }
            Err(e) => {
                self.stats.fails.fetch_add(1, Ordering::Relaxed);
                self.emit(HostEvent::ActErr {
                    act_id: act_id.clone(),
                    session: session.clone(),
                    message: e.message.clone(),
                });
                self.log(
                    session.as_deref(),
                    &format!("act {} ERR {} {}", act_id, pattern, e),
                );
            }
        }
        result
    }

    fn options(&self) -> Value {
        self.options
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_options(&self, patch: Value) -> Value {
        let mut options = self.options.write().unwrap_or_else(|e| e.into_inner());
        deep_merge(&mut options, patch);
        options.clone()
    }

    fn list(&self, narrow: &Value) -> Vec<Value> {
        let narrow = Pattern::from_value(narrow).unwrap_or_default();
        let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
        actions
            .keys()
            .filter(|pattern| pattern.contains(&narrow))
            .map(Pattern::to_value)
            .collect()
    }

    fn find(&self, narrow: &Value) -> Option<ActionInfo> {
        let pattern = Pattern::from_value(narrow)?;
        let exact = {
            let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
            actions.get(&pattern).cloned()
        };
        exact.or_else(|| self.resolve(narrow)).map(|def| def.info())
    }

    fn plugins(&self) -> Vec<String> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn entity(&self, op: EntityOp, canon: &Canon, query: Value) -> Result<Value, HostError> {
        let result = {
            let mut store = self.entities.lock().unwrap_or_else(|e| e.into_inner());
            store.apply(op, canon, query)
        };
        result
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    fn log(&self, session: Option<&str>, line: &str) {
        self.emit(HostEvent::Log {
            session: session.map(str::to_string),
            line: line.to_string(),
        });
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let hooks: Vec<CloseHook> =
            std::mem::take(&mut *self.close_hooks.lock().unwrap_or_else(|e| e.into_inner()));
        info!("Closing host ({} close hooks)", hooks.len());
        for hook in hooks {
            hook().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Arc<LocalHost> {
        LocalHost::new(json!({"tag": "test"}))
    }

    #[tokio::test]
    async fn test_echo_preserves_field_order() {
        let host = host();
        let msg = crate::value::parse("sys:repl,echo:true,x:1").unwrap();
        let out = host.act(msg, ActMeta::default()).await.unwrap();
        assert_eq!(out.to_string(), r#"{"sys":"repl","echo":true,"x":1}"#);
    }

    #[tokio::test]
    async fn test_act_not_found() {
        let host = host();
        let err = host.act(json!({"zed": 1}), ActMeta::default()).await.unwrap_err();
        assert_eq!(err.code, "act_not_found");
    }

    #[tokio::test]
    async fn test_most_specific_wins() {
        let host = host();
        host.add("a:1", "t", |_, _| async { Ok(json!("general")) }).unwrap();
        host.add("a:1,b:2", "t", |_, _| async { Ok(json!("specific")) }).unwrap();

        let out = host.act(json!({"a": 1, "b": 2}), ActMeta::default()).await.unwrap();
        assert_eq!(out, json!("specific"));
        let out = host.act(json!({"a": 1, "b": 3}), ActMeta::default()).await.unwrap();
        assert_eq!(out, json!("general"));
    }

    #[tokio::test]
    async fn test_prior_chain_and_find() {
        let host = host();
        host.add("a:1", "first", |_, _| async { Ok(json!(1)) }).unwrap();
        host.add("a:1", "second", |_, _| async { Ok(json!(2)) }).unwrap();

        let info = host.find(&json!({"a": 1})).unwrap();
        let plugins: Vec<&str> = info.chain().iter().map(|a| a.plugin.as_str()).collect();
        assert_eq!(plugins, vec!["second", "first"]);

        let out = host.act(json!({"a": 1}), ActMeta::default()).await.unwrap();
        assert_eq!(out, json!(2));
    }

    #[test]
    fn test_list_narrows() {
        let host = host();
        let all = host.list(&json!({}));
        assert_eq!(all.len(), 2);
        let narrowed = host.list(&json!({"role": "seneca"}));
        assert_eq!(narrowed, vec![json!({"role": "seneca", "stats": "true"})]);
    }

    #[test]
    fn test_options_merge() {
        let host = host();
        host.set_options(json!({"a": {"b": {"c": 5}}}));
        let opts = host.options();
        assert_eq!(opts["a"]["b"]["c"], json!(5));
        assert_eq!(opts["tag"], json!("test"));
    }

    #[tokio::test]
    async fn test_events_attributed_to_session() {
        let host = host();
        let mut rx = host.subscribe();
        host.act(json!({"sys": "repl", "echo": true}), ActMeta::for_session("s1"))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, HostEvent::ActIn { .. }));
        assert_eq!(first.session(), Some("s1"));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, HostEvent::ActOut { .. }));
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let host = host();
        host.act(json!({"sys": "repl", "echo": true}), ActMeta::default())
            .await
            .unwrap();
        let out = host
            .act(json!({"role": "seneca", "stats": true, "summary": false}), ActMeta::default())
            .await
            .unwrap();
        assert_eq!(out["act"]["done"], json!(1));
        assert!(out["actmap"].is_object());
    }

    #[tokio::test]
    async fn test_entity_crud() {
        let host = host();
        let (canon, _) = Canon::parse_with_query("sys/user").unwrap();

        let saved = host
            .entity(EntityOp::Save, &canon, json!({"name": "alice"}))
            .await
            .unwrap();
        let id = saved["id"].as_str().unwrap().to_string();

        let loaded = host.entity(EntityOp::Load, &canon, json!(id)).await.unwrap();
        assert_eq!(loaded["name"], "alice");

        host.entity(EntityOp::Save, &canon, json!({"id": id, "age": 3}))
            .await
            .unwrap();
        let listed = host
            .entity(EntityOp::List, &canon, json!({"name": "alice"}))
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["age"], 3);

        let removed = host
            .entity(EntityOp::Remove, &canon, json!({"id": id}))
            .await
            .unwrap();
        assert_eq!(removed["name"], "alice");
        let gone = host.entity(EntityOp::Load, &canon, json!(id)).await.unwrap();
        assert!(gone.is_null());
    }

    #[tokio::test]
    async fn test_save_requires_object() {
        let host = host();
        let (canon, _) = Canon::parse_with_query("foo").unwrap();
        let err = host
            .entity(EntityOp::Save, &canon, json!("x"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "entity_invalid");
    }

    #[tokio::test]
    async fn test_close_runs_hooks_once() {
        let host = host();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        host.on_close(Box::new(move || {
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }));

        host.close().await;
        host.close().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(host.is_closed());
    }
}
