//! Minimal client for the hosted data API: table selects with filters,
//! inserts, upserts and deletes. Every call goes through [`Connection`] so the
//! signed-in user's token is attached.

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::connection::Connection;
use crate::database::error::{ApiErrorBody, StoreError, NO_ROWS_CODE};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Eq,
    Gte,
    Lt,
    Like,
}

impl Filter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Filter::Eq => "eq",
            Filter::Gte => "gte",
            Filter::Lt => "lt",
            Filter::Like => "like",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

pub struct Table<'a> {
    conn: &'a Connection,
    name: &'a str,
}

impl<'a> Table<'a> {
    pub fn new(conn: &'a Connection, name: &'a str) -> Self {
        Self { conn, name }
    }

    pub fn select(&self, columns: &str) -> Select<'a> {
        Select {
            conn: self.conn,
            table: self.name,
            params: vec![("select".to_string(), columns.to_string())],
        }
    }

    /// Inserts one row and returns it as stored.
    pub async fn insert<T, R>(&self, row: &T) -> Result<R, StoreError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(table = self.name, "insert");
        let req = self
            .conn
            .request(Method::POST, &self.conn.rest_url(self.name))
            .header("Prefer", "return=representation")
            .json(&[row]);
        first_row(self.name, send(req).await?).await
    }

    /// Insert-or-update keyed on `on_conflict` (comma separated columns).
    pub async fn upsert<T, R>(&self, row: &T, on_conflict: &str) -> Result<R, StoreError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(table = self.name, on_conflict, "upsert");
        let req = self
            .conn
            .request(Method::POST, &self.conn.rest_url(self.name))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[row]);
        first_row(self.name, send(req).await?).await
    }

    pub fn delete(&self) -> Delete<'a> {
        Delete {
            conn: self.conn,
            table: self.name,
            params: Vec::new(),
        }
    }
}

pub struct Select<'a> {
    conn: &'a Connection,
    table: &'a str,
    params: Vec<(String, String)>,
}

impl<'a> Select<'a> {
    pub fn filter(mut self, column: &str, op: Filter, value: impl std::fmt::Display) -> Self {
        self.params
            .push((column.to_string(), format!("{}.{}", op.as_str(), value)));
        self
    }

    pub fn eq(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, Filter::Eq, value)
    }

    pub fn gte(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, Filter::Gte, value)
    }

    pub fn lt(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, Filter::Lt, value)
    }

    pub fn like(self, column: &str, pattern: impl std::fmt::Display) -> Self {
        self.filter(column, Filter::Like, pattern)
    }

    pub fn order(mut self, column: &str, order: Order) -> Self {
        let dir = match order {
            Order::Ascending => "asc",
            Order::Descending => "desc",
        };
        self.params.push(("order".to_string(), format!("{column}.{dir}")));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.params.push(("limit".to_string(), n.to_string()));
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    fn request(&self) -> RequestBuilder {
        self.conn
            .request(Method::GET, &self.conn.rest_url(self.table))
            .query(&self.params)
    }

    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, StoreError> {
        debug!(table = self.table, params = ?self.params, "select");
        let response = send(self.request()).await?;
        decode(self.table, response).await
    }

    /// Exactly-one-row read; "no rows" comes back as `None`.
    pub async fn maybe_single<T: DeserializeOwned>(self) -> Result<Option<T>, StoreError> {
        debug!(table = self.table, params = ?self.params, "select single");
        let response = send(self.request().header("Accept", SINGLE_OBJECT)).await?;
        match decode(self.table, response).await {
            Ok(row) => Ok(Some(row)),
            Err(err) if err.code() == Some(NO_ROWS_CODE) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

pub struct Delete<'a> {
    conn: &'a Connection,
    table: &'a str,
    params: Vec<(String, String)>,
}

impl<'a> Delete<'a> {
    pub fn eq(mut self, column: &str, value: impl std::fmt::Display) -> Self {
        self.params
            .push((column.to_string(), format!("{}.{}", Filter::Eq.as_str(), value)));
        self
    }

    pub async fn execute(self) -> Result<(), StoreError> {
        debug!(table = self.table, params = ?self.params, "delete");
        let req = self
            .conn
            .request(Method::DELETE, &self.conn.rest_url(self.table))
            .query(&self.params);
        let response = send(req).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await?;
        Err(ApiErrorBody::into_error(self.table, status.as_u16(), &body))
    }
}

async fn send(req: RequestBuilder) -> Result<Response, StoreError> {
    Ok(req.send().await?)
}

async fn decode<T: DeserializeOwned>(table: &str, response: Response) -> Result<T, StoreError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiErrorBody::into_error(table, status.as_u16(), &body));
    }
    Ok(serde_json::from_str(&body)?)
}

async fn first_row<R: DeserializeOwned>(table: &str, response: Response) -> Result<R, StoreError> {
    let rows: Vec<R> = decode(table, response).await?;
    rows.into_iter().next().ok_or(StoreError::EmptyResponse)
}
