//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the `EquipmentStore`, `ProfileStore` and `AccountService` ports from the
//! core crate. It handles all interactions with PostgreSQL using `sqlx`.
//!
//! Row-level authorization lives in the SQL itself: every write is scoped to
//! `user_id = caller`, and sold rows are only readable by their owner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labmarket_core::domain::{
    AvailabilityStatus, CertificationStatus, Condition, Listing, ListingFields, NewListing,
    Profile, ProfileFields, Session, UnknownVariant, User, UserCredentials,
};
use labmarket_core::ports::{
    AccountService, EquipmentStore, ListingQuery, PortError, PortResult, ProfileStore,
    SortDirection, SortField, SortOrder,
};
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every persistence port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Tells a missing row apart from a row owned by someone else after a
    /// scoped write matched nothing.
    async fn write_refused(&self, id: Uuid) -> PortError {
        match sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM equipment WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(_)) => {
                warn!("Refused write to equipment {} by a non-owner", id);
                PortError::Unauthorized
            }
            Ok(None) => PortError::NotFound(format!("Equipment {} not found", id)),
            Err(e) => unexpected(e),
        }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const EQUIPMENT_COLUMNS: &str = "id, user_id, name, brand, model, description, price, condition, \
     category, location, certification_status, availability_status, images, tags, created_at";

#[derive(FromRow)]
struct EquipmentRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    brand: String,
    model: Option<String>,
    description: Option<String>,
    price: f64,
    condition: String,
    category: String,
    location: Option<String>,
    certification_status: String,
    availability_status: String,
    images: Vec<String>,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
}

impl EquipmentRecord {
    fn to_domain(self) -> PortResult<Listing> {
        let id = self.id;
        let bad_row =
            |e: UnknownVariant| PortError::Unexpected(format!("Equipment {} has {}", id, e));
        let condition = self.condition.parse::<Condition>().map_err(bad_row)?;
        let certification_status = self
            .certification_status
            .parse::<CertificationStatus>()
            .map_err(bad_row)?;
        let availability_status = self
            .availability_status
            .parse::<AvailabilityStatus>()
            .map_err(bad_row)?;
        Ok(Listing {
            id: self.id,
            owner_id: self.user_id,
            fields: ListingFields {
                name: self.name,
                brand: self.brand,
                model: self.model,
                description: self.description,
                price: self.price,
                condition,
                category: self.category,
                location: self.location,
            },
            certification_status,
            availability_status,
            images: self.images,
            tags: self.tags,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ProfileRecord {
    user_id: Uuid,
    full_name: Option<String>,
    company: Option<String>,
    verified: bool,
    email: Option<String>,
    updated_at: DateTime<Utc>,
}

impl ProfileRecord {
    fn to_domain(self) -> Profile {
        Profile {
            user_id: self.user_id,
            full_name: self.full_name,
            company: self.company,
            verified: self.verified,
            email: self.email,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
}

impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: Some(self.email),
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}

#[derive(FromRow)]
struct AuthSessionRecord {
    user_id: Uuid,
    email: String,
    expires_at: DateTime<Utc>,
}

fn order_clause(order: SortOrder) -> &'static str {
    match (order.field, order.direction) {
        (SortField::CreatedAt, SortDirection::Descending) => "created_at DESC, seq ASC",
        (SortField::CreatedAt, SortDirection::Ascending) => "created_at ASC, seq ASC",
    }
}

//=========================================================================================
// `EquipmentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl EquipmentStore for DbAdapter {
    async fn list(
        &self,
        caller: Option<Uuid>,
        query: &ListingQuery,
        order: SortOrder,
    ) -> PortResult<Vec<Listing>> {
        let sql = format!(
            "SELECT {} FROM equipment \
             WHERE (availability_status = 'available' OR user_id = $1) \
               AND ($2::boolean IS NULL OR (availability_status = 'available') = $2) \
               AND ($3::uuid IS NULL OR user_id = $3) \
             ORDER BY {}",
            EQUIPMENT_COLUMNS,
            order_clause(order)
        );
        let records = sqlx::query_as::<_, EquipmentRecord>(&sql)
            .bind(caller)
            .bind(query.availability_status.map(|s| s == AvailabilityStatus::Available))
            .bind(query.owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        records.into_iter().map(EquipmentRecord::to_domain).collect()
    }

    async fn get(&self, caller: Option<Uuid>, id: Uuid) -> PortResult<Listing> {
        let sql = format!(
            "SELECT {} FROM equipment \
             WHERE id = $1 AND (availability_status = 'available' OR user_id = $2)",
            EQUIPMENT_COLUMNS
        );
        let record = sqlx::query_as::<_, EquipmentRecord>(&sql)
            .bind(id)
            .bind(caller)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => PortError::NotFound(format!("Equipment {} not found", id)),
                _ => unexpected(e),
            })?;
        record.to_domain()
    }

    async fn insert(&self, caller: Option<Uuid>, listing: NewListing) -> PortResult<Listing> {
        if caller != Some(listing.owner_id) {
            return Err(PortError::Unauthorized);
        }
        let fields = listing.fields;
        let sql = format!(
            "INSERT INTO equipment (id, user_id, name, brand, model, description, price, condition, \
             category, location, availability_status, images, tags) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {}",
            EQUIPMENT_COLUMNS
        );
        let record = sqlx::query_as::<_, EquipmentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(listing.owner_id)
            .bind(fields.name)
            .bind(fields.brand)
            .bind(fields.model)
            .bind(fields.description)
            .bind(fields.price)
            .bind(fields.condition.as_str())
            .bind(fields.category)
            .bind(fields.location)
            .bind(listing.availability_status.as_str())
            .bind(listing.images)
            .bind(listing.tags)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        record.to_domain()
    }

    async fn update(
        &self,
        caller: Option<Uuid>,
        id: Uuid,
        fields: ListingFields,
    ) -> PortResult<Listing> {
        let Some(caller) = caller else {
            return Err(PortError::Unauthorized);
        };
        let sql = format!(
            "UPDATE equipment SET name = $3, brand = $4, model = $5, description = $6, \
             price = $7, condition = $8, category = $9, location = $10 \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {}",
            EQUIPMENT_COLUMNS
        );
        let record = sqlx::query_as::<_, EquipmentRecord>(&sql)
            .bind(id)
            .bind(caller)
            .bind(fields.name)
            .bind(fields.brand)
            .bind(fields.model)
            .bind(fields.description)
            .bind(fields.price)
            .bind(fields.condition.as_str())
            .bind(fields.category)
            .bind(fields.location)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;

        match record {
            Some(record) => record.to_domain(),
            None => Err(self.write_refused(id).await),
        }
    }

    async fn delete(&self, caller: Option<Uuid>, id: Uuid) -> PortResult<()> {
        let Some(caller) = caller else {
            return Err(PortError::Unauthorized);
        };
        let result = sqlx::query("DELETE FROM equipment WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(caller)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(self.write_refused(id).await);
        }
        Ok(())
    }
}

//=========================================================================================
// `ProfileStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProfileStore for DbAdapter {
    async fn get(&self, user_id: Uuid) -> PortResult<Option<Profile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT p.user_id, p.full_name, p.company, p.verified, u.email, p.updated_at \
             FROM profiles p JOIN users u ON u.user_id = p.user_id \
             WHERE p.user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ProfileRecord::to_domain))
    }

    async fn update(
        &self,
        user_id: Uuid,
        fields: ProfileFields,
        updated_at: DateTime<Utc>,
    ) -> PortResult<Profile> {
        // `verified` is left out of the upsert so owners can never set it.
        let record = sqlx::query_as::<_, ProfileRecord>(
            "WITH saved AS ( \
                 INSERT INTO profiles (user_id, full_name, company, updated_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (user_id) DO UPDATE \
                 SET full_name = EXCLUDED.full_name, company = EXCLUDED.company, \
                     updated_at = EXCLUDED.updated_at \
                 RETURNING user_id, full_name, company, verified, updated_at \
             ) \
             SELECT s.user_id, s.full_name, s.company, s.verified, u.email, s.updated_at \
             FROM saved s JOIN users u ON u.user_id = s.user_id",
        )
        .bind(user_id)
        .bind(fields.full_name)
        .bind(fields.company)
        .bind(updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }
}

//=========================================================================================
// `AccountService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountService for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(UserCredentials {
            user_id: record.user_id,
            email: record.email,
            hashed_password: record.hashed_password,
        })
    }

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<Session> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT s.user_id, u.email, s.expires_at \
             FROM auth_sessions s JOIN users u ON u.user_id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound("Auth session not found".to_string()),
            _ => unexpected(e),
        })?;
        Ok(Session {
            user: User {
                user_id: record.user_id,
                email: Some(record.email),
            },
            expires_at: record.expires_at,
        })
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
