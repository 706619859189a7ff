//! crates/engagement_core/src/share_links.rs
//!
//! Creation, resolution and patching of share links, plus the opaque share
//! code handed to viewers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{NewShareLink, ShareLink, ShareLinkPatch, ShareType};
use crate::error::{EngagementError, EngagementResult};
use crate::ports::TrackingStore;

/// Encodes a share link id into the code embedded in viewer URLs.
/// Reversible and not meant to hide anything.
pub fn encode_share_code(share_link_id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(share_link_id.as_bytes())
}

pub fn decode_share_code(code: &str) -> Option<Uuid> {
    let bytes = URL_SAFE_NO_PAD.decode(code.trim()).ok()?;
    Uuid::from_slice(&bytes).ok()
}

/// `{base_url}/view/{code}` with any trailing slash on the base removed.
pub fn viewer_url(base_url: &str, share_link_id: Uuid) -> String {
    format!(
        "{}/view/{}",
        base_url.trim().trim_end_matches('/'),
        encode_share_code(share_link_id)
    )
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"))
}

/// `local@domain.tld` shape check, after trimming.
pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email.trim())
}

/// One recipient's slot in a batch email share.
#[derive(Debug)]
pub struct RecipientLink {
    pub email: String,
    pub link: EngagementResult<ShareLink>,
}

#[derive(Clone)]
pub struct ShareLinkRegistry {
    store: Arc<dyn TrackingStore>,
    clock: Arc<dyn Clock>,
}

impl ShareLinkRegistry {
    pub fn new(store: Arc<dyn TrackingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create_email_link(
        &self,
        document_id: Uuid,
        recipient_email: &str,
    ) -> EngagementResult<ShareLink> {
        let email = recipient_email.trim();
        if email.is_empty() {
            return Err(EngagementError::Validation(
                "recipient email is required".to_string(),
            ));
        }
        if !is_valid_email(email) {
            return Err(EngagementError::Validation(format!(
                "'{email}' is not a valid email address"
            )));
        }
        self.ensure_document(document_id).await?;
        self.insert_email_link(document_id, email).await
    }

    async fn insert_email_link(&self, document_id: Uuid, email: &str) -> EngagementResult<ShareLink> {
        let link = self
            .store
            .create_share_link(NewShareLink {
                document_id,
                recipient_email: Some(email.to_string()),
                client_label: None,
                share_type: ShareType::Email,
                expires_at: None,
            })
            .await?;
        info!(share_link_id = %link.id, %document_id, "Created email share link");
        Ok(link)
    }

    /// Creates an addressed email link for every recipient.
    ///
    /// Input is validated for the whole batch before anything is written.
    /// After that each recipient stands alone: a failed write lands in that
    /// recipient's slot and the links already created are kept. Fails
    /// outright only when no recipient got a link.
    pub async fn create_email_links(
        &self,
        document_id: Uuid,
        emails: &[String],
        base_url: &str,
    ) -> EngagementResult<Vec<RecipientLink>> {
        let emails: Vec<&str> = emails
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .collect();
        if emails.is_empty() {
            return Err(EngagementError::Validation(
                "at least one email is required".to_string(),
            ));
        }
        if let Some(bad) = emails.iter().find(|e| !is_valid_email(e)) {
            return Err(EngagementError::Validation(format!(
                "'{bad}' is not a valid email address"
            )));
        }
        if base_url.trim().is_empty() {
            return Err(EngagementError::Validation("base URL is required".to_string()));
        }
        self.ensure_document(document_id).await?;

        let mut outcomes = Vec::with_capacity(emails.len());
        for email in emails {
            let link = match self.insert_email_link(document_id, email).await {
                Ok(link) => self.attach_destination_url(link.id, base_url).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &link {
                warn!(recipient = %email, error = %e, "Could not create email share link");
            }
            outcomes.push(RecipientLink {
                email: email.to_string(),
                link,
            });
        }

        if !outcomes.is_empty() && outcomes.iter().all(|o| o.link.is_err()) {
            if let RecipientLink { link: Err(e), .. } = outcomes.swap_remove(0) {
                return Err(e);
            }
        }
        Ok(outcomes)
    }

    pub async fn create_anonymous_link(
        &self,
        document_id: Uuid,
        client_label: &str,
    ) -> EngagementResult<ShareLink> {
        let label = client_label.trim();
        if label.is_empty() {
            return Err(EngagementError::Validation(
                "client name is required".to_string(),
            ));
        }
        self.ensure_document(document_id).await?;

        let link = self
            .store
            .create_share_link(NewShareLink {
                document_id,
                recipient_email: None,
                client_label: Some(label.to_string()),
                share_type: ShareType::Link,
                expires_at: None,
            })
            .await?;
        info!(share_link_id = %link.id, %document_id, "Created anonymous share link");
        Ok(link)
    }

    /// Resolves a viewer-supplied share code to a usable link.
    pub async fn resolve(&self, code: &str) -> EngagementResult<ShareLink> {
        let share_link_id = decode_share_code(code).ok_or_else(|| {
            debug!(code, "Share code did not decode");
            EngagementError::NotFound("share link not found or expired".to_string())
        })?;
        self.resolve_id(share_link_id).await
    }

    /// Same checks as `resolve` for an already decoded id.
    pub async fn resolve_id(&self, share_link_id: Uuid) -> EngagementResult<ShareLink> {
        let now = self.clock.now();
        self.store
            .find_share_link(share_link_id)
            .await?
            .filter(|link| link.is_usable_at(now))
            .ok_or_else(|| EngagementError::NotFound("share link not found or expired".to_string()))
    }

    pub async fn attach_destination_url(
        &self,
        share_link_id: Uuid,
        base_url: &str,
    ) -> EngagementResult<ShareLink> {
        if base_url.trim().is_empty() {
            return Err(EngagementError::Validation("base URL is required".to_string()));
        }
        let url = viewer_url(base_url, share_link_id);
        let affected = self
            .store
            .set_share_link_destination(share_link_id, &url)
            .await?;
        if affected == 0 {
            return Err(EngagementError::NotFound(format!(
                "share link {share_link_id} not found"
            )));
        }
        self.fetch(share_link_id).await
    }

    pub async fn patch(
        &self,
        share_link_id: Uuid,
        patch: &ShareLinkPatch,
    ) -> EngagementResult<ShareLink> {
        let affected = self.store.patch_share_link(share_link_id, patch).await?;
        if affected == 0 {
            return Err(EngagementError::NotFound(format!(
                "share link {share_link_id} not found"
            )));
        }
        info!(%share_link_id, active = ?patch.active, expires_at = ?patch.expires_at, "Patched share link");
        self.fetch(share_link_id).await
    }

    async fn fetch(&self, share_link_id: Uuid) -> EngagementResult<ShareLink> {
        self.store
            .find_share_link(share_link_id)
            .await?
            .ok_or_else(|| EngagementError::NotFound(format!("share link {share_link_id} not found")))
    }

    async fn ensure_document(&self, document_id: Uuid) -> EngagementResult<()> {
        match self.store.find_document(document_id).await? {
            Some(_) => Ok(()),
            None => Err(EngagementError::NotFound(format!(
                "document {document_id} not found"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{ExpiryPatch, NewDocument};
    use crate::memory::InMemoryTrackingStore;
    use crate::test_support::{Fixture, FlakyStore};
    use chrono::{Duration, Utc};

    async fn setup() -> (ShareLinkRegistry, Arc<InMemoryTrackingStore>, Arc<ManualClock>, Uuid) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemoryTrackingStore::with_clock(clock.clone()));
        let document = store
            .create_document(NewDocument {
                name: "Quarterly plan".to_string(),
                content: "<p>plan</p>".to_string(),
                created_by: "ops".to_string(),
            })
            .await
            .unwrap();
        let registry = ShareLinkRegistry::new(store.clone(), clock.clone());
        (registry, store, clock, document.id)
    }

    #[test]
    fn share_codes_decode_back_to_the_id() {
        let id = Uuid::new_v4();
        let code = encode_share_code(id);
        assert_eq!(decode_share_code(&code), Some(id));
        assert_eq!(decode_share_code("not a code"), None);
        assert_eq!(decode_share_code(&URL_SAFE_NO_PAD.encode(b"short")), None);
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email(" reader@example.com"));
        assert!(!is_valid_email("reader@example"));
        assert!(!is_valid_email("two words@example.com"));
    }

    #[test]
    fn viewer_url_trims_trailing_slash() {
        let id = Uuid::new_v4();
        assert_eq!(
            viewer_url("https://docs.example.com/", id),
            format!("https://docs.example.com/view/{}", encode_share_code(id))
        );
    }

    #[tokio::test]
    async fn email_link_requires_known_document_and_valid_address() {
        let (registry, _, _, document_id) = setup().await;

        let link = registry
            .create_email_link(document_id, " reader@example.com ")
            .await
            .unwrap();
        assert_eq!(link.share_type, ShareType::Email);
        assert_eq!(link.recipient_email.as_deref(), Some("reader@example.com"));
        assert!(link.expires_at.is_none());

        assert!(matches!(
            registry.create_email_link(Uuid::new_v4(), "reader@example.com").await,
            Err(EngagementError::NotFound(_))
        ));
        assert!(matches!(
            registry.create_email_link(document_id, "nobody").await,
            Err(EngagementError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn anonymous_link_rejects_blank_label() {
        let (registry, _, _, document_id) = setup().await;
        assert!(matches!(
            registry.create_anonymous_link(document_id, "   ").await,
            Err(EngagementError::Validation(_))
        ));
        let link = registry.create_anonymous_link(document_id, "Acme").await.unwrap();
        assert_eq!(link.client_label.as_deref(), Some("Acme"));
        assert_eq!(link.share_type, ShareType::Link);
    }

    #[tokio::test]
    async fn expired_link_does_not_resolve_but_null_expiry_always_does() {
        let (registry, _, clock, document_id) = setup().await;
        let forever = registry.create_anonymous_link(document_id, "Acme").await.unwrap();
        let expiring = registry.create_anonymous_link(document_id, "Globex").await.unwrap();
        registry
            .patch(
                expiring.id,
                &ShareLinkPatch {
                    active: None,
                    expires_at: ExpiryPatch::At(clock.now() + Duration::hours(1)),
                },
            )
            .await
            .unwrap();

        assert!(registry.resolve(&encode_share_code(expiring.id)).await.is_ok());

        clock.advance(Duration::hours(2));
        assert!(matches!(
            registry.resolve(&encode_share_code(expiring.id)).await,
            Err(EngagementError::NotFound(_))
        ));

        clock.advance(Duration::days(365 * 20));
        assert!(registry.resolve(&encode_share_code(forever.id)).await.is_ok());
    }

    #[tokio::test]
    async fn inactive_or_garbled_links_do_not_resolve() {
        let (registry, _, _, document_id) = setup().await;
        let link = registry.create_anonymous_link(document_id, "Acme").await.unwrap();
        registry
            .patch(link.id, &ShareLinkPatch { active: Some(false), ..Default::default() })
            .await
            .unwrap();

        assert!(matches!(
            registry.resolve(&encode_share_code(link.id)).await,
            Err(EngagementError::NotFound(_))
        ));
        assert!(matches!(
            registry.resolve("%%%").await,
            Err(EngagementError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn destination_url_is_persisted() {
        let (registry, store, _, document_id) = setup().await;
        let link = registry.create_anonymous_link(document_id, "Acme").await.unwrap();
        let updated = registry
            .attach_destination_url(link.id, "https://view.example.com")
            .await
            .unwrap();
        let expected = viewer_url("https://view.example.com", link.id);
        assert_eq!(updated.destination_url.as_deref(), Some(expected.as_str()));

        let stored = store.find_share_link(link.id).await.unwrap().unwrap();
        assert_eq!(stored.destination_url, Some(expected));

        assert!(matches!(
            registry.attach_destination_url(Uuid::new_v4(), "https://x.example").await,
            Err(EngagementError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn batch_email_share_validates_everything_before_writing() {
        let (registry, store, _, document_id) = setup().await;
        let emails = vec!["reader@example.com".to_string(), "nope".to_string()];
        assert!(matches!(
            registry.create_email_links(document_id, &emails, "https://v.example").await,
            Err(EngagementError::Validation(_))
        ));
        assert!(store.list_share_links_for_document(document_id).await.unwrap().is_empty());

        let blank = vec![" ".to_string()];
        assert!(matches!(
            registry.create_email_links(document_id, &blank, "https://v.example").await,
            Err(EngagementError::Validation(_))
        ));
        let one = vec!["reader@example.com".to_string()];
        assert!(matches!(
            registry.create_email_links(Uuid::new_v4(), &one, "https://v.example").await,
            Err(EngagementError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn batch_email_share_keeps_links_created_before_a_failure() {
        let fx = Fixture::new().await;
        let flaky = Arc::new(FlakyStore::new(fx.store.clone()));
        let registry = ShareLinkRegistry::new(flaky.clone(), fx.clock.clone());
        let emails: Vec<String> = ["a@example.com", "b@example.com", "c@example.com"]
            .iter()
            .map(|e| e.to_string())
            .collect();

        // Document check plus three writes for the first recipient, then the
        // second recipient's insert fails.
        flaky.fail_after(4, 1);
        let outcomes = registry
            .create_email_links(fx.document.id, &emails, "https://v.example")
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].link.is_ok());
        assert!(matches!(
            outcomes[1].link,
            Err(EngagementError::StorageUnavailable(_))
        ));
        let third = outcomes[2].link.as_ref().unwrap();
        assert!(third.destination_url.is_some());
        assert_eq!(third.recipient_email.as_deref(), Some("c@example.com"));

        let stored = fx.store.list_share_links_for_document(fx.document.id).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn batch_email_share_fails_when_no_link_was_created() {
        let fx = Fixture::new().await;
        let flaky = Arc::new(FlakyStore::new(fx.store.clone()));
        let registry = ShareLinkRegistry::new(flaky.clone(), fx.clock.clone());
        let emails = vec!["a@example.com".to_string()];

        flaky.fail_after(1, 1);
        let err = registry
            .create_email_links(fx.document.id, &emails, "https://v.example")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
