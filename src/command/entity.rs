//! Entity shortcuts: `list$`, `load$`, `save$`, `remove$` and `entity$`.

use async_trait::async_trait;
use serde_json::json;

use super::{Command, Invocation, Reply};
use crate::host::{Canon, EntityOp};
use crate::value;

/// An entity shortcut command taking `[[zone/]base/]name [query]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityCommand {
    /// Run a persistence operation.
    Op(EntityOp),
    /// Describe an empty entity of the given type.
    Describe,
}

impl EntityCommand {
    pub const ALL: [EntityCommand; 5] = [
        EntityCommand::Op(EntityOp::List),
        EntityCommand::Op(EntityOp::Load),
        EntityCommand::Op(EntityOp::Save),
        EntityCommand::Op(EntityOp::Remove),
        EntityCommand::Describe,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EntityCommand::Op(op) => op.as_str(),
            EntityCommand::Describe => "entity$",
        }
    }

    fn expected(&self) -> String {
        format!("ERROR: expected: {} [[zone/]base/]name [query]", self.name())
    }
}

#[async_trait]
impl Command for EntityCommand {
    fn usage(&self) -> &str {
        match self {
            EntityCommand::Op(EntityOp::List) => "list$ [[zone/]base/]name [query]",
            EntityCommand::Op(EntityOp::Load) => "load$ [[zone/]base/]name [query]",
            EntityCommand::Op(EntityOp::Save) => "save$ [[zone/]base/]name [data]",
            EntityCommand::Op(EntityOp::Remove) => "remove$ [[zone/]base/]name [query]",
            EntityCommand::Describe => "entity$ [[zone/]base/]name",
        }
    }

    async fn invoke(&self, call: Invocation<'_>) {
        let Some((canon, query)) = Canon::parse_with_query(call.args) else {
            return call.respond.error(self.expected());
        };

        let op = match self {
            EntityCommand::Op(op) => *op,
            EntityCommand::Describe => {
                return call
                    .respond
                    .ok(Reply::Value(json!({ "entity$": canon.to_string() })));
            }
        };

        let query = match value::parse(&query) {
            Ok(query) => query,
            Err(e) => return call.respond.error(format!("ERROR: entity {}: {}", op, e)),
        };

        match call.host.entity(op, &canon, query).await {
            Ok(out) => call.respond.ok(Reply::Value(out)),
            Err(e) => call
                .respond
                .error(format!("ERROR: entity {}: {}", op, e.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;

    #[tokio::test]
    async fn test_save_then_load_and_list() {
        let mut h = Harness::new();
        h.context.plain = true;

        let saved = h.run("save$", " sys/user id:u1,name:alice").await;
        assert!(saved.contains("\"name\":\"alice\""), "{}", saved);

        let loaded = h.run("load$", " sys/user id:u1").await;
        assert!(loaded.contains("alice"), "{}", loaded);

        let listed = h.run("list$", " sys/user").await;
        assert!(listed.starts_with('['), "{}", listed);
        assert!(listed.contains("u1"), "{}", listed);

        h.run("remove$", " sys/user id:u1").await;
        let listed = h.run("list$", " sys/user").await;
        assert_eq!(listed, "[]\0");
    }

    #[tokio::test]
    async fn test_entity_describe() {
        let mut h = Harness::new();
        h.context.plain = true;
        assert_eq!(
            h.run("entity$", " z/b/n").await,
            "{\"entity$\":\"z/b/n\"}\0"
        );
    }

    #[tokio::test]
    async fn test_usage_and_host_errors() {
        let mut h = Harness::new();
        assert_eq!(
            h.run("list$", "").await,
            "ERROR: expected: list$ [[zone/]base/]name [query]\0"
        );

        let out = h.run("save$", " sys/user [1,2]").await;
        assert!(out.starts_with("ERROR: entity save$: "), "{}", out);
    }
}
