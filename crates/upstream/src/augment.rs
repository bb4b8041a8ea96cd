use relay_protocol::NodeId;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_AUGMENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Optional source of extra node attributes (e.g. a design-tool plugin channel).
///
/// Implementations may block while they wait for their peer; callers bound the wait with
/// [`augment_bounded`].
pub trait Augmenter: Send + Sync + 'static {
    fn augment(&self, node_id: &NodeId) -> Option<Value>;
}

/// Runs `augment` on a blocking thread and gives up after `timeout`.
///
/// A timeout or a panicking augmenter yields `None`; the abandoned blocking call is left to
/// finish on its own.
pub async fn augment_bounded(
    augmenter: Arc<dyn Augmenter>,
    node_id: NodeId,
    timeout: Duration,
) -> Option<Value> {
    let label = node_id.clone();
    let task = tokio::task::spawn_blocking(move || augmenter.augment(&node_id));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(extra)) => extra,
        Ok(Err(err)) => {
            log::warn!("augment {label} failed: {err}");
            None
        }
        Err(_) => {
            log::warn!("augment {label} timed out after {timeout:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Augmenter for Echo {
        fn augment(&self, node_id: &NodeId) -> Option<Value> {
            Some(serde_json::json!({ "segments": [node_id.as_str()] }))
        }
    }

    struct Stuck;

    impl Augmenter for Stuck {
        fn augment(&self, _node_id: &NodeId) -> Option<Value> {
            std::thread::sleep(Duration::from_millis(500));
            Some(Value::Null)
        }
    }

    #[tokio::test]
    async fn returns_extra_attributes() {
        let extra = augment_bounded(Arc::new(Echo), NodeId::from("1:2"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(extra["segments"][0], "1:2");
    }

    #[tokio::test]
    async fn slow_augmenter_times_out() {
        let extra =
            augment_bounded(Arc::new(Stuck), NodeId::from("1:2"), Duration::from_millis(20)).await;
        assert!(extra.is_none());
    }
}
