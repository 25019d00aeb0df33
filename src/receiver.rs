//! The cloud-deploy webhook flow: authenticate, resolve, store, publish.

use std::sync::Arc;

use serde::Serialize;
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::config::DeploymentWebhookSection;
use crate::content::{ContentScope, ContentStore, SYSTEM_USER_ID};
use crate::error::{StoreError, WebhookError};
use crate::logging::{EventSink, WebhookEvent};
use crate::utils::{describe_token, verify_token};

const EMPTY_PAYLOAD: &str = "{}";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A well-formed JSON document, kept as the exact text it arrived as
#[derive(Debug)]
pub struct Payload(Box<RawValue>);

impl Payload {
    /// Parse a request body. An empty or blank body is the empty object.
    /// A leading UTF-8 byte order mark is skipped.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
        if body.iter().all(u8::is_ascii_whitespace) {
            return Self::from_text(EMPTY_PAYLOAD);
        }
        serde_json::from_slice::<Box<RawValue>>(body).map(Payload)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Box<RawValue>>(text).map(Payload)
    }

    /// The document text without surrounding whitespace
    pub fn raw_text(&self) -> &str {
        self.0.get()
    }
}

/// Body returned to the caller on success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Acknowledgement {
    pub ok: bool,
}

impl Default for Acknowledgement {
    fn default() -> Self {
        Self { ok: true }
    }
}

/// Handles deployment notifications against one content store
pub struct WebhookReceiver<S> {
    store: S,
    settings: DeploymentWebhookSection,
    events: Arc<dyn EventSink>,
}

impl<S: ContentStore> WebhookReceiver<S> {
    pub fn new(store: S, settings: DeploymentWebhookSection, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            settings,
            events,
        }
    }

    pub fn settings(&self) -> &DeploymentWebhookSection {
        &self.settings
    }

    /// Store `payload` on the configured record and publish it.
    ///
    /// The scope is completed before the publish outcome is inspected, so a
    /// refused publish still leaves the saved value in place. A hard store
    /// fault inside the scope drops it uncompleted.
    pub async fn handle(
        &self,
        payload: &Payload,
        token: Option<&str>,
    ) -> Result<Acknowledgement, WebhookError> {
        let secret = self.settings.secret();
        self.events.info(WebhookEvent::Received {
            token: describe_token(token),
            secret_configured: !secret.is_empty(),
        });

        if !verify_token(secret, token) {
            self.events.warn(WebhookEvent::Unauthorized);
            return Err(WebhookError::Unauthorized);
        }

        let Some(content_key) = self.settings.content_key() else {
            self.events.error(WebhookEvent::InvalidContentKey {
                raw: self.settings.raw_content_key().map(str::to_string),
            });
            return Err(WebhookError::InvalidContentKey);
        };
        let property_alias = self.settings.property_alias();

        let content = self
            .store
            .get_by_id(content_key)
            .await
            .map_err(|e| self.fault(Some(content_key), e))?;
        let Some(mut content) = content else {
            self.events
                .error(WebhookEvent::ContentNotFound { key: content_key });
            return Err(WebhookError::ContentNotFound(content_key));
        };

        let (result, cultures) = {
            let mut scope = self
                .store
                .create_scope()
                .await
                .map_err(|e| self.fault(Some(content_key), e))?;

            content
                .set_value(property_alias, payload.raw_text())
                .map_err(|e| self.fault(Some(content_key), e))?;
            scope
                .save(&content)
                .await
                .map_err(|e| self.fault(Some(content_key), e))?;

            let cultures = content.publish_cultures();
            let result = scope
                .publish(&content, &cultures, SYSTEM_USER_ID)
                .await
                .map_err(|e| self.fault(Some(content_key), e))?;
            scope
                .complete()
                .await
                .map_err(|e| self.fault(Some(content_key), e))?;
            (result, cultures)
        };

        if !result.success() {
            self.events.error(WebhookEvent::PublishFailed {
                key: content_key,
                status: result.status.clone(),
            });
            return Err(WebhookError::PublishFailed {
                key: content_key,
                status: result.status,
            });
        }

        self.events.info(WebhookEvent::Published {
            key: content_key,
            property_alias: property_alias.to_string(),
            cultures,
        });
        Ok(Acknowledgement::default())
    }

    fn fault(&self, key: Option<Uuid>, err: StoreError) -> WebhookError {
        self.events.error(WebhookEvent::StoreFault {
            key,
            message: err.to_string(),
        });
        WebhookError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use tracing::Level;

    use crate::content::{
        Content, ContentType, CultureSelection, MemoryContentStore, PublishStatus,
    };
    use crate::logging::MemoryEventLog;

    const SECRET: &str = "deploy-secret";

    struct Fixture {
        store: MemoryContentStore,
        log: MemoryEventLog,
        key: Uuid,
    }

    impl Fixture {
        fn new(content_type: ContentType, cultures: &[&str]) -> Self {
            let store = MemoryContentStore::new();
            let key = Uuid::now_v7();
            store.insert(
                Content::new(key, "Deployments", content_type)
                    .with_cultures(cultures.iter().copied()),
            );
            Self {
                store,
                log: MemoryEventLog::new(),
                key,
            }
        }

        fn invariant() -> Self {
            Self::new(
                ContentType::new("deploymentStatus", false).with_property("deploymentData"),
                &["en-US"],
            )
        }

        fn settings(&self) -> DeploymentWebhookSection {
            DeploymentWebhookSection {
                secret: Some(SECRET.to_string()),
                content_key: Some(self.key.to_string()),
                property_alias: None,
            }
        }

        fn receiver(&self) -> WebhookReceiver<MemoryContentStore> {
            self.receiver_with(self.settings())
        }

        fn receiver_with(
            &self,
            settings: DeploymentWebhookSection,
        ) -> WebhookReceiver<MemoryContentStore> {
            WebhookReceiver::new(self.store.clone(), settings, Arc::new(self.log.clone()))
        }

        async fn stored_value(&self, alias: &str) -> Option<String> {
            self.store
                .get_by_id(self.key)
                .await
                .unwrap()
                .unwrap()
                .get_value(alias)
                .map(str::to_string)
        }
    }

    fn payload(text: &str) -> Payload {
        Payload::from_text(text).unwrap()
    }

    #[test]
    fn test_payload_keeps_raw_text() {
        let p = Payload::from_body(b"  {\"b\": 2,  \"a\":[1, 2]}\n").unwrap();
        assert_eq!(p.raw_text(), "{\"b\": 2,  \"a\":[1, 2]}");
    }

    #[test]
    fn test_empty_body_is_empty_object() {
        assert_eq!(Payload::from_body(b"").unwrap().raw_text(), "{}");
        assert_eq!(Payload::from_body(b" \r\n").unwrap().raw_text(), "{}");
    }

    #[test]
    fn test_leading_bom_is_skipped() {
        let p = Payload::from_body(b"\xEF\xBB\xBF{\"state\":\"ok\"}").unwrap();
        assert_eq!(p.raw_text(), "{\"state\":\"ok\"}");
        assert_eq!(Payload::from_body(b"\xEF\xBB\xBF").unwrap().raw_text(), "{}");
        assert!(Payload::from_body(b"{}\xEF\xBB\xBF").is_err());
    }

    #[test]
    fn test_malformed_body_is_rejected() {
        assert!(Payload::from_body(b"{\"a\":").is_err());
        assert!(Payload::from_body(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_wrong_tokens_are_unauthorized() {
        let fixture = Fixture::invariant();
        let receiver = fixture.receiver();

        for token in [None, Some(""), Some("  "), Some("DEPLOY-SECRET"), Some("deploy-secret2")] {
            let result = receiver.handle(&payload("{}"), token).await;
            assert!(matches!(result, Err(WebhookError::Unauthorized)), "{:?}", token);
        }

        assert!(fixture.store.publish_calls().is_empty());
        assert_eq!(fixture.log.get_logs_by_level(Level::WARN).len(), 5);
    }

    #[tokio::test]
    async fn test_auth_is_checked_before_configuration() {
        let fixture = Fixture::invariant();
        let receiver = fixture.receiver_with(DeploymentWebhookSection {
            secret: Some(SECRET.to_string()),
            content_key: Some("garbage".to_string()),
            property_alias: None,
        });

        let result = receiver.handle(&payload("{}"), Some("nope")).await;
        assert!(matches!(result, Err(WebhookError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_unset_secret_rejects_every_call() {
        let fixture = Fixture::invariant();
        let receiver = fixture.receiver_with(DeploymentWebhookSection {
            secret: None,
            ..fixture.settings()
        });

        assert!(matches!(
            receiver.handle(&payload("{}"), None).await,
            Err(WebhookError::Unauthorized)
        ));
        assert!(matches!(
            receiver.handle(&payload("{}"), Some("")).await,
            Err(WebhookError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_invalid_content_key_is_misconfiguration() {
        let fixture = Fixture::invariant();

        for content_key in [None, Some("not-a-uuid".to_string())] {
            let receiver = fixture.receiver_with(DeploymentWebhookSection {
                content_key,
                ..fixture.settings()
            });
            let result = receiver.handle(&payload("{}"), Some(SECRET)).await;
            assert!(matches!(result, Err(WebhookError::InvalidContentKey)));
        }

        let errors = fixture.log.get_logs_by_level(Level::ERROR);
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[1].event,
            WebhookEvent::InvalidContentKey {
                raw: Some("not-a-uuid".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_missing_content_is_not_found() {
        let fixture = Fixture::invariant();
        let missing = Uuid::now_v7();
        let receiver = fixture.receiver_with(DeploymentWebhookSection {
            content_key: Some(missing.to_string()),
            ..fixture.settings()
        });

        let result = receiver.handle(&payload("{}"), Some(SECRET)).await;
        assert!(matches!(result, Err(WebhookError::ContentNotFound(key)) if key == missing));
        assert_eq!(fixture.store.commit_count(), 0);

        let errors = fixture.log.get_logs_by_level(Level::ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event, WebhookEvent::ContentNotFound { key: missing });
    }

    #[tokio::test]
    async fn test_success_stores_raw_payload_and_publishes() {
        let fixture = Fixture::invariant();
        let receiver = fixture.receiver();
        let body = r#"{"deploymentId": "abc", "state":"completed" , "n": 1.50}"#;

        let ack = receiver.handle(&payload(body), Some(SECRET)).await.unwrap();

        assert_eq!(ack, Acknowledgement { ok: true });
        assert_eq!(fixture.stored_value("deploymentData").await.as_deref(), Some(body));
        let live = fixture.store.publication(fixture.key, "").unwrap();
        assert_eq!(live.values.get("deploymentData").unwrap(), body);
        assert_eq!(fixture.store.save_count(), 1);
        assert_eq!(fixture.store.publish_calls().len(), 1);
        assert_eq!(fixture.store.publish_calls()[0].user_id, SYSTEM_USER_ID);
    }

    #[tokio::test]
    async fn test_configured_property_alias_is_used() {
        let fixture = Fixture::new(
            ContentType::new("deploymentStatus", false)
                .with_property("deploymentData")
                .with_property("buildInfo"),
            &[],
        );
        let receiver = fixture.receiver_with(DeploymentWebhookSection {
            property_alias: Some("buildInfo".to_string()),
            ..fixture.settings()
        });

        receiver.handle(&payload("[1,2,3]"), Some(SECRET)).await.unwrap();

        assert_eq!(fixture.stored_value("buildInfo").await.as_deref(), Some("[1,2,3]"));
        assert_eq!(fixture.stored_value("deploymentData").await, None);
    }

    #[tokio::test]
    async fn test_refused_publish_keeps_saved_value() {
        let fixture = Fixture::invariant();
        fixture
            .store
            .force_publish_status(PublishStatus::FailedTrashed);
        let receiver = fixture.receiver();

        let result = receiver.handle(&payload(r#"{"v":2}"#), Some(SECRET)).await;

        assert!(matches!(
            result,
            Err(WebhookError::PublishFailed { status: PublishStatus::FailedTrashed, .. })
        ));
        assert_eq!(fixture.stored_value("deploymentData").await.as_deref(), Some(r#"{"v":2}"#));
        assert_eq!(fixture.store.commit_count(), 1);
        assert_eq!(fixture.store.publication_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_fault_discards_scope() {
        let fixture = Fixture::invariant();
        fixture.store.fail_publish_with("connection reset");
        let receiver = fixture.receiver();

        let result = receiver.handle(&payload(r#"{"v":3}"#), Some(SECRET)).await;

        assert!(matches!(result, Err(WebhookError::Store(StoreError::Injected(_)))));
        assert_eq!(fixture.stored_value("deploymentData").await, None);
        assert_eq!(fixture.store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_property_alias_is_store_fault() {
        let fixture = Fixture::invariant();
        let receiver = fixture.receiver_with(DeploymentWebhookSection {
            property_alias: Some("missing".to_string()),
            ..fixture.settings()
        });

        let result = receiver.handle(&payload("{}"), Some(SECRET)).await;

        assert!(matches!(
            result,
            Err(WebhookError::Store(StoreError::UnknownProperty { .. }))
        ));
        assert_eq!(fixture.store.commit_count(), 0);
        assert!(fixture.store.publish_calls().is_empty());
    }

    #[tokio::test]
    async fn test_variant_content_publishes_available_cultures() {
        let fixture = Fixture::new(
            ContentType::new("site", true).with_property("deploymentData"),
            &["en-US", "da-DK"],
        );
        let receiver = fixture.receiver();

        receiver.handle(&payload("{}"), Some(SECRET)).await.unwrap();

        let calls = fixture.store.publish_calls();
        let expected: BTreeSet<String> = ["da-DK".to_string(), "en-US".to_string()].into();
        assert_eq!(calls[0].cultures, CultureSelection::Cultures(expected));
        assert!(fixture.store.publication(fixture.key, "da-DK").is_some());
        assert!(fixture.store.publication(fixture.key, "en-US").is_some());
        assert!(fixture.store.publication(fixture.key, "").is_none());
    }

    #[tokio::test]
    async fn test_variant_content_without_cultures_still_attempts_publish() {
        let fixture = Fixture::new(
            ContentType::new("site", true).with_property("deploymentData"),
            &[],
        );
        let receiver = fixture.receiver();

        let result = receiver.handle(&payload(r#"{"x":1}"#), Some(SECRET)).await;

        let calls = fixture.store.publish_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].cultures, CultureSelection::Cultures(BTreeSet::new()));
        assert!(matches!(
            result,
            Err(WebhookError::PublishFailed { status: PublishStatus::FailedNothingToPublish, .. })
        ));
        assert_eq!(fixture.stored_value("deploymentData").await.as_deref(), Some(r#"{"x":1}"#));
    }

    #[tokio::test]
    async fn test_invariant_content_ignores_available_cultures() {
        let fixture = Fixture::new(
            ContentType::new("status", false).with_property("deploymentData"),
            &["en-US", "fr-FR"],
        );
        let receiver = fixture.receiver();

        receiver.handle(&payload("{}"), Some(SECRET)).await.unwrap();

        assert_eq!(
            fixture.store.publish_calls()[0].cultures,
            CultureSelection::Invariant
        );
    }

    #[tokio::test]
    async fn test_repeated_call_is_idempotent() {
        let fixture = Fixture::invariant();
        let receiver = fixture.receiver();
        let body = r#"{"release":"2024.1"}"#;

        for _ in 0..2 {
            let ack = receiver.handle(&payload(body), Some(SECRET)).await.unwrap();
            assert!(ack.ok);
        }

        assert_eq!(fixture.stored_value("deploymentData").await.as_deref(), Some(body));
        assert_eq!(fixture.store.publication_count(), 1);
        assert_eq!(fixture.store.commit_count(), 2);
    }

    #[tokio::test]
    async fn test_log_line_per_outcome() {
        let fixture = Fixture::invariant();
        let receiver = fixture.receiver();

        receiver.handle(&payload("{}"), Some(SECRET)).await.unwrap();

        let entries = fixture.log.entries();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].event, WebhookEvent::Received { secret_configured: true, .. }));
        assert!(matches!(entries[1].event, WebhookEvent::Published { .. }));
        assert!(entries.iter().all(|e| e.level == Level::INFO));
        assert!(entries.iter().all(|e| !e.event.to_string().contains(SECRET)));
    }
}
