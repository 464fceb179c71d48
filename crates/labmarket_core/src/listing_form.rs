//! crates/labmarket_core/src/listing_form.rs
//!
//! The listing form controller: decides create vs. edit, validates the draft,
//! enforces ownership before any data is shown, and issues the store write.

use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Listing, NewListing, SessionState};
use crate::error::{MarketError, MarketResult};
use crate::guard;
use crate::navigator::Route;
use crate::ports::EquipmentStore;
use crate::validation::{validate_listing, ListingDraft};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit { listing_id: Uuid },
}

/// Result of a successful submit: the stored record and where to go next.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    pub listing: Listing,
    pub redirect: Route,
}

/// An opened listing form. Construct with `open`.
pub struct ListingForm {
    store: Arc<dyn EquipmentStore>,
    mode: FormMode,
    draft: ListingDraft,
}

impl std::fmt::Debug for ListingForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingForm")
            .field("mode", &self.mode)
            .field("draft", &self.draft)
            .finish()
    }
}

impl ListingForm {
    /// Opens the form for `session`.
    ///
    /// With an edit target the record is fetched and its owner checked before
    /// the draft is populated, so another owner's data never reaches the form.
    pub async fn open(
        store: Arc<dyn EquipmentStore>,
        session: &SessionState,
        edit: Option<Uuid>,
    ) -> MarketResult<Self> {
        let user_id = session
            .user_id()
            .ok_or(MarketError::AuthenticationRequired)?;

        let Some(listing_id) = edit else {
            return Ok(Self {
                store,
                mode: FormMode::Create,
                draft: ListingDraft {
                    condition: "good".to_string(),
                    ..ListingDraft::default()
                },
            });
        };

        let listing = store
            .get(Some(user_id), listing_id)
            .await
            .map_err(|e| MarketError::from(e).with_fallback(Route::Dashboard))?;
        if !guard::is_owner(session, listing.owner_id) {
            warn!(
                "User {} tried to edit listing {} owned by {}",
                user_id, listing_id, listing.owner_id
            );
            return Err(MarketError::Unauthorized);
        }

        Ok(Self {
            store,
            mode: FormMode::Edit { listing_id },
            draft: ListingDraft::from_fields(&listing.fields),
        })
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    /// The values to prefill the form with.
    pub fn draft(&self) -> &ListingDraft {
        &self.draft
    }

    /// Validates `draft` and writes it. Nothing is sent if validation fails.
    ///
    /// Resolves only after the store confirms, so the caller never navigates
    /// to the dashboard on a write that did not happen. On failure the form's
    /// own draft is left as it was.
    pub async fn submit(&self, session: &SessionState, draft: &ListingDraft) -> MarketResult<Submitted> {
        let user_id = session
            .user_id()
            .ok_or(MarketError::AuthenticationRequired)?;
        let fields = validate_listing(draft)?;

        let result = match self.mode {
            FormMode::Create => {
                self.store
                    .insert(Some(user_id), NewListing::for_owner(fields, user_id))
                    .await
            }
            FormMode::Edit { listing_id } => {
                self.store.update(Some(user_id), listing_id, fields).await
            }
        };

        match result {
            Ok(listing) => {
                match self.mode {
                    FormMode::Create => info!("Listing {} created by {}", listing.id, user_id),
                    FormMode::Edit { .. } => info!("Listing {} updated by {}", listing.id, user_id),
                }
                Ok(Submitted {
                    listing,
                    redirect: Route::Dashboard,
                })
            }
            Err(e) => {
                error!("Failed to save listing: {:?}", e);
                Err(MarketError::from(e).with_fallback(Route::Dashboard))
            }
        }
    }
}
