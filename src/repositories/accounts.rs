//! Account repository: google_accounts and google_account_tokens rows.
//!
//! Token ciphertext never leaves this module undecrypted and plaintext never
//! enters it unencrypted; the crypto service is applied at the row boundary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tracing::warn;
use uuid::Uuid;

use crate::crypto::CryptoService;
use crate::models::google_account::{
    self, ActiveModel as AccountActiveModel, Entity as GoogleAccount,
};
use crate::models::google_account_token::{
    ActiveModel as TokenActiveModel, Entity as GoogleAccountToken,
};

use super::StoreError;

/// Plaintext view of an account's OAuth tokens.
#[derive(Debug, Clone)]
pub struct DecryptedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AccountRepository {
    db: Arc<DatabaseConnection>,
    crypto: Arc<CryptoService>,
}

impl AccountRepository {
    pub fn new(db: Arc<DatabaseConnection>, crypto: Arc<CryptoService>) -> Self {
        Self { db, crypto }
    }

    pub async fn get_google_account(
        &self,
        google_account_id: Uuid,
    ) -> Result<Option<google_account::Model>, StoreError> {
        Ok(GoogleAccount::find_by_id(google_account_id)
            .one(self.db.as_ref())
            .await?)
    }

    pub async fn get_google_accounts_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<google_account::Model>, StoreError> {
        Ok(GoogleAccount::find()
            .filter(google_account::Column::UserId.eq(user_id))
            .all(self.db.as_ref())
            .await?)
    }

    /// Fetches and decrypts the token row for an account. Only rows whose
    /// account belongs to `user_id` are returned.
    pub async fn get_decrypted_tokens(
        &self,
        user_id: Uuid,
        google_account_id: Uuid,
    ) -> Result<DecryptedTokens, StoreError> {
        let account = GoogleAccount::find_by_id(google_account_id)
            .filter(google_account::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?
            .ok_or(StoreError::NotFound {
                entity: "google account",
            })?;

        let row = GoogleAccountToken::find_by_id(account.id)
            .one(self.db.as_ref())
            .await?
            .ok_or(StoreError::NotFound {
                entity: "google account tokens",
            })?;

        let key = self.crypto.derive_key(user_id);
        let access_token = self
            .crypto
            .decrypt_with_key(&key, &row.access_token, user_id)?;
        let refresh_token = row
            .refresh_token
            .as_deref()
            .map(|ct| self.crypto.decrypt_with_key(&key, ct, user_id))
            .transpose()?;

        Ok(DecryptedTokens {
            access_token,
            refresh_token,
            expires_at: row.expires_at.with_timezone(&Utc),
        })
    }

    /// Persists a refreshed access token (and, when Google rotated it, the
    /// new refresh token). Expects ciphertext produced by the caller.
    pub async fn update_google_account_tokens(
        &self,
        google_account_id: Uuid,
        access_token_ciphertext: String,
        expires_at: DateTime<Utc>,
        refresh_token_ciphertext: Option<String>,
    ) -> Result<(), StoreError> {
        let mut row = TokenActiveModel {
            google_account_id: Set(google_account_id),
            access_token: Set(access_token_ciphertext),
            expires_at: Set(expires_at.into()),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        if let Some(refresh) = refresh_token_ciphertext {
            row.refresh_token = Set(Some(refresh));
        }
        row.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Flags the account as requiring a fresh user consent. Terminal until
    /// the user re-links; the sync engine refuses work for flagged accounts.
    pub async fn mark_needs_reauth(&self, google_account_id: Uuid) -> Result<(), StoreError> {
        warn!(%google_account_id, "Marking Google account as needing re-authentication");

        let update = AccountActiveModel {
            id: Set(google_account_id),
            needs_reauth: Set(true),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        update.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Encrypt-and-store helper used by the token manager.
    pub async fn store_refreshed_tokens(
        &self,
        user_id: Uuid,
        google_account_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
        refresh_token: Option<&str>,
    ) -> Result<(), StoreError> {
        let key = self.crypto.derive_key(user_id);
        let access_ct = self.crypto.encrypt_with_key(&key, access_token, user_id)?;
        let refresh_ct = refresh_token
            .map(|t| self.crypto.encrypt_with_key(&key, t, user_id))
            .transpose()?;

        self.update_google_account_tokens(google_account_id, access_ct, expires_at, refresh_ct)
            .await
    }
}

