use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;
use bridge_proto::{parse_invocation, PluginArgs};
use serde_json::Value;

/// Runs one native command. Errors are plain messages; they are forwarded to
/// the server verbatim.
#[async_trait]
pub trait NativeDispatcher: Send + Sync {
    async fn dispatch(&self, invocation: &str, args: &PluginArgs) -> Result<Value, String>;
}

#[async_trait]
impl<F> NativeDispatcher for F
where
    F: Fn(&str, &PluginArgs) -> Result<Value, String> + Send + Sync,
{
    async fn dispatch(&self, invocation: &str, args: &PluginArgs) -> Result<Value, String> {
        (self)(invocation, args)
    }
}

type BoxedReply = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

#[derive(Clone)]
enum Handler {
    Sync(Arc<dyn Fn(&PluginArgs) -> Result<Value, String> + Send + Sync>),
    Async(Arc<dyn Fn(PluginArgs) -> BoxedReply + Send + Sync>),
}

/// Dispatcher keyed by `(plugin, command)`.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<(String, String), Handler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, plugin: &str, command: &str, handler: F) -> Self
    where
        F: Fn(&PluginArgs) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(
            (plugin.to_string(), command.to_string()),
            Handler::Sync(Arc::new(handler)),
        );
        self
    }

    pub fn register_async<F, Fut>(mut self, plugin: &str, command: &str, handler: F) -> Self
    where
        F: Fn(PluginArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.handlers.insert(
            (plugin.to_string(), command.to_string()),
            Handler::Async(Arc::new(move |args: PluginArgs| -> BoxedReply {
                Box::pin(handler(args))
            })),
        );
        self
    }
}

#[async_trait]
impl NativeDispatcher for DispatchTable {
    async fn dispatch(&self, invocation: &str, args: &PluginArgs) -> Result<Value, String> {
        let handler = parse_invocation(invocation).and_then(|(plugin, command)| {
            self.handlers
                .get(&(plugin.to_string(), command.to_string()))
                .cloned()
        });
        match handler {
            Some(Handler::Sync(handler)) => handler(args),
            Some(Handler::Async(handler)) => handler(args.clone()).await,
            None => Err(format!("unsupported plugin command {invocation}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> DispatchTable {
        DispatchTable::new()
            .register("vibration", "vibrate", |args| {
                Ok(json!({ "vibrated": args.get("duration").cloned().unwrap_or(Value::Null) }))
            })
            .register_async("storage", "keys", |_| async { Ok(json!({ "keys": ["a"] })) })
            .register("camera", "takePhoto", |_| Err("camera unavailable".to_string()))
    }

    #[tokio::test]
    async fn routes_by_plugin_and_command() {
        let table = table();
        let mut args = PluginArgs::new();
        args.insert("duration".into(), json!(300));
        assert_eq!(
            table.dispatch("plugin:vibration|vibrate", &args).await,
            Ok(json!({ "vibrated": 300 }))
        );
        assert_eq!(
            table.dispatch("plugin:storage|keys", &PluginArgs::new()).await,
            Ok(json!({ "keys": ["a"] }))
        );
        assert_eq!(
            table
                .dispatch("plugin:camera|takePhoto", &PluginArgs::new())
                .await,
            Err("camera unavailable".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_commands_are_reported() {
        let table = table();
        assert_eq!(
            table.dispatch("plugin:storage|clear", &PluginArgs::new()).await,
            Err("unsupported plugin command plugin:storage|clear".to_string())
        );
        assert_eq!(
            table.dispatch("garbage", &PluginArgs::new()).await,
            Err("unsupported plugin command garbage".to_string())
        );
    }

    #[tokio::test]
    async fn closures_dispatch_directly() {
        let echo = |invocation: &str, _: &PluginArgs| -> Result<Value, String> {
            Ok(json!(invocation))
        };
        assert_eq!(
            echo.dispatch("plugin:test|echo", &PluginArgs::new()).await,
            Ok(json!("plugin:test|echo"))
        );
    }
}
