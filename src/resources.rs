//! Domain collections
//!
//! Thin CRUD helpers over backend collections. Every operation is wrapped in
//! the client's retry policy, and each attempt runs the full request pipeline,
//! credential renewal included. Payload shapes are left to the caller.

use std::fmt::Display;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::transport::ApiClient;

/// A REST collection rooted at `path`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    path: &'static str,
}

/// Budget categories
pub const CATEGORIES: Collection = Collection::new("/budget/categories/");

/// People money is lent to or borrowed from
pub const CONTACTS: Collection = Collection::new("/lending/contacts/");

/// Lending transactions
pub const TRANSACTIONS: Collection = Collection::new("/lending/transactions/");

/// Recurring subscriptions
pub const SUBSCRIPTIONS: Collection = Collection::new("/subscriptions/");

impl Collection {
    pub const fn new(path: &'static str) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    /// Path of a single item, e.g. `/lending/contacts/7/`
    pub fn item_path(&self, id: impl Display) -> String {
        format!("{}/{}/", self.path.trim_end_matches('/'), id)
    }

    pub async fn list<T: DeserializeOwned>(&self, client: &ApiClient) -> Result<Vec<T>, ApiError> {
        client
            .retry_policy()
            .run(|_| client.get_json(self.path))
            .await
    }

    pub async fn create<B, T>(&self, client: &ApiClient, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        client
            .retry_policy()
            .run(|_| client.post_json(self.path, body))
            .await
    }

    pub async fn update<B, T>(
        &self,
        client: &ApiClient,
        id: impl Display,
        body: &B,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let path = self.item_path(id);
        let path = path.as_str();
        client
            .retry_policy()
            .run(|_| client.patch_json(path, body))
            .await
    }

    pub async fn remove(&self, client: &ApiClient, id: impl Display) -> Result<(), ApiError> {
        let path = self.item_path(id);
        let path = path.as_str();
        client
            .retry_policy()
            .run(|_| async move { client.delete(path).await.map(|_| ()) })
            .await
    }
}
