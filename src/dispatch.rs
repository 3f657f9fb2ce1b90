//! The execute contract shared by the async and blocking clients.
//!
//! Resource namespaces are generic over [`Dispatch`], so each endpoint is
//! described once and served by both clients. Only the associated output
//! types differ: futures for [`crate::Client`], plain values for
//! [`crate::blocking::Client`].

use crate::auth::Credentials;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::request::{RequestBuilder, RequestSpec};
use serde::de::DeserializeOwned;
use uuid::Uuid;

mod sealed {
    pub trait Sealed {}

    impl Sealed for crate::client::Client {}
    impl Sealed for crate::blocking::Client {}
}

/// A client able to run built requests.
///
/// Implemented by [`crate::Client`] and [`crate::blocking::Client`] only.
/// Every method accepts the request spec as a `Result` so that argument validation
/// failures flow through the same return type as network failures, without
/// any I/O.
pub trait Dispatch: sealed::Sealed {
    /// Result of a single buffered call.
    type Call<T: DeserializeOwned + Send + 'static>;
    /// Result of opening a streaming call.
    type Stream<T: DeserializeOwned + Send + 'static>;
    /// Result of starting a paginated listing.
    type Pages<T: DeserializeOwned + Send + 'static>;

    fn credentials(&self) -> &Credentials;

    fn config(&self) -> &ClientConfig;

    /// Finalize a request for this client.
    ///
    /// POST and PATCH requests without an idempotency key get a random one
    /// when [`ClientConfig::auto_idempotency`] is on, which makes them
    /// eligible for retries.
    fn prepare(&self, builder: RequestBuilder) -> Result<RequestSpec, Error> {
        let builder = if self.config().auto_idempotency
            && !builder.is_idempotent()
            && !builder.has_idempotency_key()
        {
            builder.idempotency_key(Uuid::new_v4().to_string())
        } else {
            builder
        };
        builder.build(self.credentials())
    }

    /// Run the request and decode the body as `T`.
    fn call<T: DeserializeOwned + Send + 'static>(
        &self,
        spec: Result<RequestSpec, Error>,
    ) -> Self::Call<T>;

    /// Open the request as a stream of `T` elements.
    fn stream<T: DeserializeOwned + Send + 'static>(
        &self,
        spec: Result<RequestSpec, Error>,
    ) -> Self::Stream<T>;

    /// Start a cursor over a paginated listing. Performs no I/O.
    fn paginate<T: DeserializeOwned + Send + 'static>(
        &self,
        spec: Result<RequestSpec, Error>,
    ) -> Self::Pages<T>;
}
