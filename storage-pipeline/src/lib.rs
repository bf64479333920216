//! This crate provides [`ClientWithMiddleware`], a wrapper around [`reqwest::Client`] that runs
//! a chain of middleware on every request, and [`Scope`], the cancellation and deadline handle
//! that bounds a call through that chain.
//!
//! Storage clients build a [`ClientWithMiddleware`] with [`ClientBuilder`], attach their stages
//! (credentials, retries, logging) using [`with`], and then send requests the same way as with
//! reqwest:
//!
//! ```
//! use http::Extensions;
//! use reqwest::{Client, Request, Response};
//! use std::time::Duration;
//! use storage_pipeline::{ClientBuilder, Middleware, Next, Result, Scope};
//!
//! struct VersionHeader;
//!
//! #[async_trait::async_trait]
//! impl Middleware for VersionHeader {
//!     async fn handle(
//!         &self,
//!         mut req: Request,
//!         extensions: &mut Extensions,
//!         next: Next<'_>,
//!     ) -> Result<Response> {
//!         req.headers_mut()
//!             .insert("x-ms-version", "2021-08-06".parse().unwrap());
//!         next.run(req, extensions).await
//!     }
//! }
//!
//! async fn run() {
//!     let client = ClientBuilder::new(Client::new())
//!         .with(VersionHeader)
//!         .build();
//!     let resp = client
//!         .get("https://account.blob.core.windows.net/container/blob")
//!         .scope(Scope::with_timeout(Duration::from_secs(30)))
//!         .send()
//!         .await
//!         .unwrap();
//!     println!("blob: {}", resp.text().await.unwrap());
//! }
//! ```
//!
//! [`with`]: ClientBuilder::with
mod client;
mod error;
mod middleware;
mod scope;

pub use client::{ClientBuilder, ClientWithMiddleware, Pending, RequestBuilder};
pub use error::{is_temporary_status, Error, Result};
pub use middleware::{BoxFuture, Middleware, Next};
pub use scope::{Scope, ScopeError, ScopeGuard};
