//! Lifecycle hooks the runner calls at fixed points of a run.
//!
//! Hooks are plain callbacks registered at startup. They see the stage, the
//! provider being processed (for `PrePush`) and the queue, and may veto the
//! stage by returning an error.

use std::fmt;
use thiserror::Error;
use tracing::{debug, error};

use crate::queue::QueueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Before provider discovery
    Init,
    /// Before each provider's dispatcher starts
    PrePush,
    /// After the last provider
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::PrePush => "pre-push",
            Stage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

pub struct HookContext<'a> {
    pub stage: Stage,
    pub provider: Option<&'a str>,
    pub queue: &'a QueueStore,
}

pub type HookResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type HookFn = Box<dyn Fn(&HookContext<'_>) -> HookResult + Send + Sync>;

#[derive(Debug, Error)]
#[error("{stage} hook '{name}' failed: {source}")]
pub struct HookError {
    pub stage: Stage,
    pub name: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

struct Hook {
    stage: Stage,
    name: String,
    callback: HookFn,
}

/// Ordered set of callbacks per stage
#[derive(Default)]
pub struct Hooks {
    hooks: Vec<Hook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| (h.stage, h.name.as_str())))
            .finish()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, stage: Stage, name: impl Into<String>, callback: F)
    where
        F: Fn(&HookContext<'_>) -> HookResult + Send + Sync + 'static,
    {
        self.hooks.push(Hook {
            stage,
            name: name.into(),
            callback: Box::new(callback),
        });
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the hooks of `ctx.stage` in registration order; the first error stops the stage
    pub fn run(&self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        for hook in self.hooks.iter().filter(|h| h.stage == ctx.stage) {
            debug!(stage = %ctx.stage, hook = %hook.name, provider = ?ctx.provider, "Running hook");
            (hook.callback)(ctx).map_err(|source| {
                error!(stage = %ctx.stage, hook = %hook.name, error = %source, "Hook failed");
                HookError {
                    stage: ctx.stage,
                    name: hook.name.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_hooks_run_per_stage_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = Hooks::new();

        for (stage, name) in [
            (Stage::Init, "first"),
            (Stage::PrePush, "push"),
            (Stage::Init, "second"),
        ] {
            let calls = calls.clone();
            hooks.register(stage, name, move |ctx| {
                calls.lock().unwrap().push(format!("{}:{}", ctx.stage, name));
                Ok(())
            });
        }

        let queue = QueueStore::open("/nonexistent");
        hooks
            .run(&HookContext {
                stage: Stage::Init,
                provider: None,
                queue: &queue,
            })
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["init:first", "init:second"]);
    }

    #[test]
    fn test_failing_hook_stops_stage() {
        let ran_after = Arc::new(Mutex::new(false));
        let mut hooks = Hooks::new();
        hooks.register(Stage::Finalize, "broken", |_| Err("disk full".into()));
        {
            let ran_after = ran_after.clone();
            hooks.register(Stage::Finalize, "after", move |_| {
                *ran_after.lock().unwrap() = true;
                Ok(())
            });
        }

        let queue = QueueStore::open("/nonexistent");
        let err = hooks
            .run(&HookContext {
                stage: Stage::Finalize,
                provider: None,
                queue: &queue,
            })
            .unwrap_err();

        assert_eq!(err.stage, Stage::Finalize);
        assert_eq!(err.name, "broken");
        assert_eq!(err.to_string(), "finalize hook 'broken' failed: disk full");
        assert!(!*ran_after.lock().unwrap());
    }
}
