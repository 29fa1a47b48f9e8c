//! MediatorConfig - デコレータの既定値
//!
//! JSON から読み込める。欠けたフィールドは既定値になる。
//!
//! ```ignore
//! let config = MediatorConfig::from_json_str(r#"{ "timeout_ms": 250 }"#)?;
//! let handler = config.decorate(handler, target);
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MediatorError, Result};
use crate::handler::{CallbackHandler, HandlerDecorators};
use crate::types::Expando;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Property flagged by `guard`.
    pub guard_property: String,
    /// Calls shorter than this are not counted by `activity`.
    pub activity_delay_ms: u64,
    pub activity_property: String,
    /// Applied by `decorate` when present.
    pub timeout_ms: Option<u64>,
    /// Fallback for `observability::init_tracing` when `RUST_LOG` is unset.
    pub log_directive: String,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            guard_property: "guarded".to_string(),
            activity_delay_ms: 50,
            activity_property: "$$activity".to_string(),
            timeout_ms: None,
            log_directive: "info".to_string(),
        }
    }
}

impl MediatorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MediatorError::InvalidConfig(e.to_string()))
    }

    pub fn activity_delay(&self) -> Duration {
        Duration::from_millis(self.activity_delay_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Guard and track `handler` on `target`, then apply the timeout if any.
    pub fn decorate(
        &self,
        handler: Arc<dyn CallbackHandler>,
        target: Arc<Expando>,
    ) -> Arc<dyn CallbackHandler> {
        let handler = handler
            .guard(target.clone(), &self.guard_property)
            .activity(target, self.activity_delay(), &self.activity_property);
        match self.timeout() {
            Some(timeout) => handler.timeout(timeout, None),
            None => handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Outcome;
    use crate::handler::{Handler, HandlerExt};
    use rstest::rstest;

    #[rstest]
    #[case::empty("{}", MediatorConfig::default())]
    #[case::partial(
        r#"{ "timeout_ms": 250, "guard_property": "busy" }"#,
        MediatorConfig { timeout_ms: Some(250), guard_property: "busy".to_string(), ..MediatorConfig::default() }
    )]
    fn missing_fields_take_defaults(#[case] json: &str, #[case] expected: MediatorConfig) {
        assert_eq!(MediatorConfig::from_json_str(json).unwrap(), expected);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = MediatorConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, MediatorError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn decorate_applies_the_configured_aspects() {
        let config = MediatorConfig {
            timeout_ms: Some(100),
            ..MediatorConfig::default()
        };
        let target = Arc::new(Expando::new());
        let handler = config.decorate(
            Handler::providing("answer", |_, _| Ok(Outcome::value(1_u32))).unwrap(),
            target.clone(),
        );
        let answer = handler.resolve("answer").unwrap().settle().await.unwrap();
        assert!(answer.is_some());
        assert!(!target.has("guarded"));
        assert!(!target.has("$$activity"));
    }
}
