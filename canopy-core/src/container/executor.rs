//! Effect Executor
//!
//! Sequences one effect invocation:
//!
//! 1. Resolve the effect name through the merged effects view, picking the
//!    instance that declares it.
//! 2. Run the outer stage with that instance's effects view and the call
//!    arguments, and await it.
//! 3. On a [`Resolution::Transform`], apply the transform to the state
//!    current *now*, not at call time, and merge the result.
//! 4. Resolve the call with the post-patch snapshot, or with the plain
//!    value on a [`Resolution::Value`].
//!
//! # Concurrency
//!
//! There is no lock around steps 1 to 3 by default. Concurrent invocations
//! apply their patches in the order they resolve, so the last one to
//! resolve wins on overlapping keys. [`EffectMode::Serialized`] queues
//! externally dispatched invocations per instance instead.
//!
//! # Errors
//!
//! An outer stage that fails leaves state untouched and rejects only this
//! call. Nothing is retried.

use futures_util::future::{BoxFuture, FutureExt};

use super::instance::Container;
use super::view::EffectsView;
use crate::config::EffectMode;
use crate::error::EffectError;
use crate::hooks::EffectPhase;
use crate::template::{EffectFn, Resolution};
use crate::value::{EffectOutcome, Value};

/// Where an invocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Dispatched from outside any effect.
    External,

    /// Called from inside another effect's outer stage.
    Nested,
}

/// Invoke `effect` as seen from `caller`.
pub(crate) fn invoke(
    caller: Container,
    effect: String,
    args: Vec<Value>,
    origin: Origin,
) -> BoxFuture<'static, Result<EffectOutcome, EffectError>> {
    async move {
        let Some((target, run)) = caller.resolve_effect(&effect) else {
            tracing::debug!(container = %caller.id(), effect = %effect, "unknown effect");
            return Err(EffectError::UnknownEffect {
                container: caller.id(),
                effect,
            });
        };

        execute(target, effect, run, args, origin).await
    }
    .boxed()
}

async fn execute(
    target: Container,
    effect: String,
    run: EffectFn,
    args: Vec<Value>,
    origin: Origin,
) -> Result<EffectOutcome, EffectError> {
    if !target.is_mounted() {
        target.report_stale(&effect);
        target.emit_effect(&effect, &args, EffectPhase::Dropped);
        return Err(EffectError::Detached {
            container: target.id(),
            effect,
        });
    }

    let _queued = match (origin, target.config().effect_mode) {
        (Origin::External, EffectMode::Serialized) => Some(target.serial_queue().lock().await),
        _ => None,
    };

    target.emit_effect(&effect, &args, EffectPhase::Started);
    tracing::debug!(
        container = %target.id(),
        effect = %effect,
        args = args.len(),
        ?origin,
        "running effect"
    );

    let view = EffectsView::new(target.clone(), Origin::Nested);
    let resolution = match run(view, args.clone()).await {
        Ok(resolution) => resolution,
        Err(source) => {
            tracing::debug!(container = %target.id(), effect = %effect, error = %source, "effect rejected");
            target.emit_effect(&effect, &args, EffectPhase::Failed);
            return Err(EffectError::Rejected {
                container: target.id(),
                effect,
                source,
            });
        }
    };

    match resolution {
        Resolution::Value(value) => {
            target.emit_effect(&effect, &args, EffectPhase::Settled);
            Ok(EffectOutcome::Value(value))
        }
        Resolution::Transform(transform) => match target.apply_transform(&effect, transform) {
            Ok(state) => {
                target.emit_effect(&effect, &args, EffectPhase::Settled);
                Ok(EffectOutcome::State(state))
            }
            Err(_) => {
                target.report_stale(&effect);
                target.emit_effect(&effect, &args, EffectPhase::Dropped);
                Err(EffectError::Detached {
                    container: target.id(),
                    effect,
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::template::ContainerTemplate;
    use crate::value::record;
    use crate::Runtime;
    use serde_json::json;
    use std::time::Duration;

    fn counter() -> ContainerTemplate {
        ContainerTemplate::builder("counter")
            .initial_state(|| record([("count", json!(0))]))
            .effect_sync("increment", |_, _| {
                Ok(Resolution::transform(|state| {
                    let count = state["count"].as_i64().unwrap_or(0);
                    record([("count", json!(count + 1))])
                }))
            })
            .effect_sync("peek", |view, _| {
                Ok(Resolution::Value(view.get("count").unwrap_or(Value::Null)))
            })
            .effect("slow_set", |_, args| async move {
                let delay = args.first().and_then(Value::as_u64).unwrap_or(0);
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(Resolution::patch(record([("count", value)])))
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn transform_resolves_to_snapshot() {
        let container = Runtime::default().attach(&counter(), None).unwrap();

        let outcome = container.dispatch("increment", vec![]).await.unwrap();

        assert_eq!(outcome.state_value::<i64>("count"), Some(1));
        assert_eq!(container.get_state("count"), Some(json!(1)));
    }

    #[tokio::test]
    async fn value_resolution_leaves_state() {
        let container = Runtime::default().attach(&counter(), None).unwrap();
        let before = container.snapshot();

        let outcome = container.dispatch("peek", vec![]).await.unwrap();

        assert_eq!(outcome, EffectOutcome::Value(json!(0)));
        assert_eq!(container.snapshot(), before);
    }

    #[tokio::test]
    async fn unknown_effect_is_an_error() {
        let container = Runtime::default().attach(&counter(), None).unwrap();

        let err = container.dispatch("missing", vec![]).await.unwrap_err();

        assert!(matches!(err, EffectError::UnknownEffect { ref effect, .. } if effect == "missing"));
    }

    #[tokio::test]
    async fn serialized_mode_applies_in_arrival_order() {
        let runtime = Runtime::new(RuntimeConfig::default().effect_mode(EffectMode::Serialized));
        let container = runtime.attach(&counter(), None).unwrap();

        // The first call is slower but arrives first, so it runs to
        // completion before the second one starts.
        let first = tokio::spawn(container.dispatch("slow_set", vec![json!(60), json!("first")]));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = container.dispatch("slow_set", vec![json!(5), json!("second")]);

        second.await.unwrap();
        assert!(first.is_finished());
        first.await.unwrap().unwrap();

        assert_eq!(container.get_state("count"), Some(json!("second")));
    }

    #[tokio::test]
    async fn concurrent_mode_applies_in_resolution_order() {
        let container = Runtime::default().attach(&counter(), None).unwrap();

        let first = tokio::spawn(container.dispatch("slow_set", vec![json!(60), json!("first")]));
        tokio::time::sleep(Duration::from_millis(10)).await;
        container
            .dispatch("slow_set", vec![json!(5), json!("second")])
            .await
            .unwrap();

        // The second call resolved first; the first call lands last
        first.await.unwrap().unwrap();
        assert_eq!(container.get_state("count"), Some(json!("first")));
    }

    #[tokio::test]
    async fn detached_target_drops_call() {
        let runtime = Runtime::default();
        let container = runtime.attach(&counter(), None).unwrap();
        runtime.detach(&container);

        let err = container.dispatch("increment", vec![]).await.unwrap_err();

        assert!(matches!(err, EffectError::Detached { .. }));
        assert_eq!(*container.snapshot(), record([("count", json!(0))]));
    }
}
