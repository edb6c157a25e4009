//! Authorization interceptor.

use crate::error::{self, TransportError};
use crate::protocol::{basic_auth, bearer};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::HeaderValue;
use std::fmt;
use std::sync::Arc;

/// Sets `Authorization` on every request, replacing any value already there.
pub struct AuthInterceptor {
    next: Arc<dyn Transport>,
    credentials: HeaderValue,
}

impl AuthInterceptor {
    /// Authenticate with `Bearer <token>`.
    pub fn bearer(next: Arc<dyn Transport>, token: &str) -> error::Result<Self> {
        Ok(Self {
            next,
            credentials: bearer(token)?,
        })
    }

    /// Authenticate with HTTP basic auth.
    pub fn basic(next: Arc<dyn Transport>, user: &str, password: &str) -> error::Result<Self> {
        Ok(Self {
            next,
            credentials: basic_auth(user, password)?,
        })
    }
}

#[async_trait]
impl Transport for AuthInterceptor {
    async fn round_trip(&self, mut request: HttpRequest) -> Result<HttpResponse, TransportError> {
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.credentials.clone());
        self.next.round_trip(request).await
    }
}

impl fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInterceptor").finish_non_exhaustive()
    }
}
