//! SQLite storage layer for Crunch.
//!
//! One table holds every registered member. Coordinates are stored as REAL
//! columns so that anything read back is already a valid number.

use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite};
use tracing::info;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::model::{Coordinate, Member, SeedMember};
use crate::validation::Registration;

/// Format used for the `registered` column.
pub const REGISTERED_FORMAT: &str = "%A, %B %d, %Y %I:%M %p";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:crunch.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to ":memory:" opens its own empty database
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS members (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                company TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                hash TEXT,
                registered TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a fully formed member record.
    pub async fn insert_member(&self, member: &Member) -> anyhow::Result<()> {
        insert_with(&self.pool, member).await
    }

    /// Store a validated registration, assigning an id, registration time and
    /// password digest.
    pub async fn register_member(&self, registration: &Registration) -> anyhow::Result<Member> {
        let member = Member {
            id: new_member_id(),
            first_name: registration.first_name.clone(),
            last_name: registration.last_name.clone(),
            company: registration.company.clone(),
            email: registration.email.clone(),
            latitude: registration.latitude,
            longitude: registration.longitude,
            hash: registration.password.as_deref().map(hash_password),
            registered: registered_now(),
        };

        self.insert_member(&member).await?;

        Ok(member)
    }

    /// Whether a member with this email is already registered.
    pub async fn email_exists(&self, email: &str) -> anyhow::Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM members WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.get("n");
        Ok(count > 0)
    }

    /// Look up the stored password digest for an email.
    ///
    /// Returns `None` both for unknown emails and members without a password.
    pub async fn password_hash_for(&self, email: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT hash FROM members WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|r| r.get::<Option<String>, _>("hash")))
    }

    /// All members in insertion order.
    pub async fn list_members(&self) -> anyhow::Result<Vec<Member>> {
        let rows = sqlx::query(
            r#"
            SELECT id, first_name, last_name, company, email, latitude, longitude, hash, registered
            FROM members
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(member_from_row).collect())
    }

    /// Coordinates of every registered member.
    pub async fn list_coordinates(&self) -> anyhow::Result<Vec<Coordinate>> {
        let rows = sqlx::query("SELECT latitude, longitude FROM members ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| Coordinate::new(r.get("latitude"), r.get("longitude")))
            .collect())
    }

    /// Delete every member.
    pub async fn clear_members(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM members")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Load members from a JSON seed file.
    ///
    /// The file holds an array of [`SeedMember`] records. With `clear` set,
    /// existing members are removed first. Returns the number of members loaded.
    pub async fn load_seed(&self, path: impl AsRef<Path>, clear: bool) -> anyhow::Result<usize> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let seeds: Vec<SeedMember> = serde_json::from_str(&raw)?;

        let mut tx = self.pool.begin().await?;
        if clear {
            sqlx::query("DELETE FROM members").execute(&mut *tx).await?;
        }

        for seed in &seeds {
            insert_with(&mut *tx, &member_from_seed(seed)).await?;
        }
        tx.commit().await?;

        info!(path = %path.display(), count = seeds.len(), clear, "Seed members loaded");

        Ok(seeds.len())
    }
}

async fn insert_with<'e, E>(executor: E, member: &Member) -> anyhow::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO members
            (id, first_name, last_name, company, email, latitude, longitude, hash, registered)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&member.id)
    .bind(&member.first_name)
    .bind(&member.last_name)
    .bind(&member.company)
    .bind(&member.email)
    .bind(member.latitude)
    .bind(member.longitude)
    .bind(&member.hash)
    .bind(&member.registered)
    .execute(executor)
    .await?;

    Ok(())
}

fn new_member_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn registered_now() -> String {
    Utc::now().format(REGISTERED_FORMAT).to_string()
}

fn member_from_seed(seed: &SeedMember) -> Member {
    Member {
        id: seed.id.clone().unwrap_or_else(new_member_id),
        first_name: seed.first_name.clone(),
        last_name: seed.last_name.clone(),
        company: seed.company.clone(),
        email: seed.email.clone(),
        latitude: seed.latitude,
        longitude: seed.longitude,
        hash: seed
            .password
            .as_deref()
            .map(hash_password)
            .or_else(|| seed.hash.clone()),
        registered: seed.registered.clone().unwrap_or_else(registered_now),
    }
}

fn member_from_row(row: &SqliteRow) -> Member {
    Member {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        company: row.get("company"),
        email: row.get("email"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        hash: row.get("hash"),
        registered: row.get("registered"),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::NaiveDateTime;

    use super::*;

    fn registration(email: &str, latitude: f64, longitude: f64) -> Registration {
        Registration {
            first_name: "Sal".to_string(),
            last_name: "Dibasio".to_string(),
            company: "Crunch".to_string(),
            email: email.to_string(),
            latitude,
            longitude,
            password: Some("abcd1234".to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        let member = storage
            .register_member(&registration("test@domain.com", 77.0, 33.0))
            .await
            .unwrap();

        let members = storage.list_members().await.unwrap();
        assert_eq!(members, vec![member.clone()]);
        assert_eq!(member.hash.as_deref(), Some(hash_password("abcd1234").as_str()));
        assert_eq!(member.id.len(), 32);

        let registered = NaiveDateTime::parse_from_str(&member.registered, REGISTERED_FORMAT).unwrap();
        let age = Utc::now().naive_utc() - registered;
        assert!(age.num_seconds().abs() < 120);
    }

    #[tokio::test]
    async fn test_email_exists() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        assert!(!storage.email_exists("test@domain.com").await.unwrap());

        storage
            .register_member(&registration("test@domain.com", 1.0, 2.0))
            .await
            .unwrap();

        assert!(storage.email_exists("test@domain.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_by_schema() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let dup = registration("dup@domain.com", 1.0, 2.0);

        storage.register_member(&dup).await.unwrap();

        assert!(storage.register_member(&dup).await.is_err());
    }

    #[tokio::test]
    async fn test_list_coordinates_preserves_values() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        assert!(storage.list_coordinates().await.unwrap().is_empty());

        storage
            .register_member(&registration("a@x.com", -23.6352, 110.3726))
            .await
            .unwrap();
        storage
            .register_member(&registration("b@x.com", 53.0917, -172.3206))
            .await
            .unwrap();

        assert_eq!(
            storage.list_coordinates().await.unwrap(),
            vec![
                Coordinate::new(-23.6352, 110.3726),
                Coordinate::new(53.0917, -172.3206)
            ]
        );
    }

    #[tokio::test]
    async fn test_load_seed() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        storage
            .register_member(&registration("old@x.com", 0.0, 0.0))
            .await
            .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"_id": "58507677f6d459c8468d12a9", "first_name": "Curtis", "last_name": "Russell",
                  "company": "Zilidium", "email": "Curtis.Russell@Zilidium.com",
                  "latitude": "4.8300", "longitude": "0.5632"}},
                {{"first_name": "Ada", "last_name": "Admin", "company": "Crunch",
                  "email": "admin@crunch.io", "latitude": 38.726, "longitude": -77.7197,
                  "password": "123456"}}
            ]"#
        )
        .unwrap();

        let loaded = storage.load_seed(file.path(), true).await.unwrap();
        assert_eq!(loaded, 2);

        let members = storage.list_members().await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].id, "58507677f6d459c8468d12a9");
        assert_eq!(members[0].hash, None);
        assert_eq!(
            storage.password_hash_for("admin@crunch.io").await.unwrap(),
            Some(hash_password("123456"))
        );
        assert!(!storage.email_exists("old@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_members() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        storage
            .register_member(&registration("a@x.com", 0.0, 0.0))
            .await
            .unwrap();

        assert_eq!(storage.clear_members().await.unwrap(), 1);
        assert!(storage.list_members().await.unwrap().is_empty());
    }
}
